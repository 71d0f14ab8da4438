use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use validator::Validate;

use crate::error::AppError;

pub fn validate_input<T: Validate>(input: &T) -> Result<(), AppError> {
    input
        .validate()
        .map_err(|errors| AppError::UnprocessableEntity(format!("Validation failed: {errors}")))
}

pub fn clamp_limit_in_range(limit: Option<i64>, min: i64, max: i64) -> i64 {
    limit.unwrap_or(100).clamp(min, max)
}

fn default_free() -> String {
    "free".to_string()
}
fn default_offline() -> String {
    "offline".to_string()
}
fn default_false() -> bool {
    false
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateUnitInput {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[serde(default = "default_free")]
    pub status: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateUnitStatusInput {
    pub status: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateTenantInput {
    #[validate(length(min = 1, max = 255))]
    pub full_name: String,
    #[validate(email)]
    pub email: Option<String>,
    pub phone_e164: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateContractInput {
    pub tenant_id: String,
    pub unit_id: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Monthly amount as a decimal value or string; never a binary float.
    pub amount: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChangeContractStatusInput {
    pub status: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateInvoiceInput {
    pub contract_id: String,
    pub due_date: NaiveDate,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatePaymentInput {
    pub invoice_id: String,
    #[serde(default = "default_offline")]
    pub method: String,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ArchiveInput {
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UnitsQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TenantsQuery {
    #[serde(default = "default_false")]
    pub include_archived: bool,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContractsQuery {
    pub status: Option<String>,
    pub tenant_id: Option<String>,
    pub unit_id: Option<String>,
    #[serde(default = "default_false")]
    pub include_archived: bool,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InvoicesQuery {
    pub contract_id: Option<String>,
    pub status: Option<String>,
    #[serde(default = "default_false")]
    pub include_archived: bool,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentsQuery {
    pub invoice_id: Option<String>,
    pub status: Option<String>,
    #[serde(default = "default_false")]
    pub include_archived: bool,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UnitPath {
    pub unit_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TenantPath {
    pub tenant_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContractPath {
    pub contract_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InvoicePath {
    pub invoice_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentPath {
    pub payment_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn clamps_limits() {
        assert_eq!(clamp_limit_in_range(None, 1, 500), 100);
        assert_eq!(clamp_limit_in_range(Some(0), 1, 500), 1);
        assert_eq!(clamp_limit_in_range(Some(9999), 1, 500), 500);
        assert_eq!(clamp_limit_in_range(Some(250), 1, 500), 250);
    }

    #[test]
    fn amounts_deserialize_from_strings_and_numbers() {
        let from_string: CreatePaymentInput = serde_json::from_str(
            r#"{"invoice_id": "i-1", "amount": "1000000.00"}"#,
        )
        .unwrap();
        assert_eq!(from_string.amount, dec!(1000000.00));
        assert_eq!(from_string.method, "offline");

        let from_number: CreatePaymentInput = serde_json::from_str(
            r#"{"invoice_id": "i-1", "method": "online", "amount": 1500.5}"#,
        )
        .unwrap();
        assert_eq!(from_number.amount, dec!(1500.5));
    }

    #[test]
    fn contract_dates_parse_iso() {
        let input: CreateContractInput = serde_json::from_str(
            r#"{
                "tenant_id": "t-1",
                "unit_id": "u-1",
                "start_date": "2024-01-01",
                "end_date": "2024-03-15",
                "amount": "1000000"
            }"#,
        )
        .unwrap();
        assert_eq!(input.start_date, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(input.end_date, NaiveDate::from_ymd_opt(2024, 3, 15).unwrap());
    }
}
