use chrono::{Datelike, Months, NaiveDate};
use rust_decimal::Decimal;
use sqlx::PgConnection;

use crate::error::{AppError, AppResult};

/// Due dates for a contract span.
///
/// Walks calendar months from the first day of the start month while the
/// cursor is strictly before the end date; each due date is the first day
/// of the following month, capped at the contract end date. The final
/// partial month is charged in full (no pro-rating).
pub fn monthly_due_dates(start_date: NaiveDate, end_date: NaiveDate) -> Vec<NaiveDate> {
    let mut due_dates = Vec::new();
    let Some(mut cursor) = start_date.with_day(1) else {
        return due_dates;
    };
    while cursor < end_date {
        let Some(next_month) = cursor.checked_add_months(Months::new(1)) else {
            break;
        };
        due_dates.push(next_month.min(end_date));
        cursor = next_month;
    }
    due_dates
}

/// Insert the pending invoices for a contract span.
///
/// Safe under repeated invocation: the (contract_id, due_date) unique key
/// absorbs retries, so only missing months are created. Returns the number
/// of rows actually inserted.
pub async fn ensure_monthly_invoices(
    conn: &mut PgConnection,
    contract_id: &str,
    amount: Decimal,
    start_date: NaiveDate,
    end_date: NaiveDate,
) -> AppResult<u64> {
    let mut created = 0u64;
    for due_date in monthly_due_dates(start_date, end_date) {
        let result = sqlx::query(
            "INSERT INTO invoices (contract_id, due_date, amount, status)
             VALUES ($1::uuid, $2, $3, 'pending')
             ON CONFLICT (contract_id, due_date) DO NOTHING",
        )
        .bind(contract_id)
        .bind(due_date)
        .bind(amount)
        .execute(&mut *conn)
        .await
        .map_err(|error| AppError::Dependency(format!("Failed to insert invoice: {error}")))?;
        created += result.rows_affected();
    }
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::monthly_due_dates;
    use chrono::NaiveDate;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    #[test]
    fn caps_final_due_date_at_contract_end() {
        // Three months, the last one partial: the cap replaces 2024-04-01.
        let due = monthly_due_dates(date(2024, 1, 1), date(2024, 3, 15));
        assert_eq!(
            due,
            vec![date(2024, 2, 1), date(2024, 3, 1), date(2024, 3, 15)]
        );
    }

    #[test]
    fn mid_month_start_bills_from_the_start_month() {
        let due = monthly_due_dates(date(2024, 1, 20), date(2024, 3, 15));
        assert_eq!(
            due,
            vec![date(2024, 2, 1), date(2024, 3, 1), date(2024, 3, 15)]
        );
    }

    #[test]
    fn end_on_first_of_month_is_exclusive() {
        let due = monthly_due_dates(date(2024, 1, 15), date(2024, 3, 1));
        assert_eq!(due, vec![date(2024, 2, 1), date(2024, 3, 1)]);
    }

    #[test]
    fn crosses_year_boundary() {
        let due = monthly_due_dates(date(2023, 11, 15), date(2024, 2, 10));
        assert_eq!(
            due,
            vec![
                date(2023, 12, 1),
                date(2024, 1, 1),
                date(2024, 2, 1),
                date(2024, 2, 10)
            ]
        );
    }

    #[test]
    fn zero_length_span_produces_nothing() {
        assert!(monthly_due_dates(date(2024, 1, 1), date(2024, 1, 1)).is_empty());
    }

    #[test]
    fn due_dates_are_strictly_increasing() {
        let due = monthly_due_dates(date(2022, 3, 7), date(2025, 6, 30));
        assert!(due.windows(2).all(|pair| pair[0] < pair[1]));
        assert_eq!(due.len(), 40);
    }
}
