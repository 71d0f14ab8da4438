//! Typed rows and status enums for the financial engine.
//!
//! Statuses are stored as lowercase text; the enums here are the only
//! place that knows which transitions are legal.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitStatus {
    Free,
    Busy,
    Maintenance,
}

impl UnitStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            UnitStatus::Free => "free",
            UnitStatus::Busy => "busy",
            UnitStatus::Maintenance => "maintenance",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "free" => Some(UnitStatus::Free),
            "busy" => Some(UnitStatus::Busy),
            "maintenance" => Some(UnitStatus::Maintenance),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContractStatus {
    Draft,
    Active,
    Completed,
    Cancelled,
}

impl ContractStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ContractStatus::Draft => "draft",
            ContractStatus::Active => "active",
            ContractStatus::Completed => "completed",
            ContractStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "draft" => Some(ContractStatus::Draft),
            "active" => Some(ContractStatus::Active),
            "completed" => Some(ContractStatus::Completed),
            "cancelled" => Some(ContractStatus::Cancelled),
            _ => None,
        }
    }

    /// Legal next states. Completed and cancelled are terminal.
    pub fn allowed_transitions(self) -> &'static [ContractStatus] {
        match self {
            ContractStatus::Draft => &[ContractStatus::Active, ContractStatus::Cancelled],
            ContractStatus::Active => &[ContractStatus::Completed, ContractStatus::Cancelled],
            ContractStatus::Completed | ContractStatus::Cancelled => &[],
        }
    }

    pub fn can_transition(self, next: ContractStatus) -> bool {
        self.allowed_transitions().contains(&next)
    }

    /// Whether a contract in this status is holding its unit.
    pub fn occupies_unit(self) -> bool {
        matches!(self, ContractStatus::Draft | ContractStatus::Active)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Pending,
    Overdue,
    Paid,
}

impl InvoiceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            InvoiceStatus::Pending => "pending",
            InvoiceStatus::Overdue => "overdue",
            InvoiceStatus::Paid => "paid",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(InvoiceStatus::Pending),
            "overdue" => Some(InvoiceStatus::Overdue),
            "paid" => Some(InvoiceStatus::Paid),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Confirmed,
    Cancelled,
}

impl PaymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Confirmed => "confirmed",
            PaymentStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(PaymentStatus::Pending),
            "confirmed" => Some(PaymentStatus::Confirmed),
            "cancelled" => Some(PaymentStatus::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Online,
    Offline,
}

impl PaymentMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentMethod::Online => "online",
            PaymentMethod::Offline => "offline",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "online" => Some(PaymentMethod::Online),
            "offline" => Some(PaymentMethod::Offline),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Unit {
    pub id: String,
    pub name: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Tenant {
    pub id: String,
    pub full_name: String,
    pub email: Option<String>,
    pub phone_e164: Option<String>,
    pub is_archived: bool,
    pub archived_at: Option<DateTime<Utc>>,
    pub archive_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Contract {
    pub id: String,
    pub tenant_id: String,
    pub unit_id: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub amount: Decimal,
    pub status: String,
    pub is_archived: bool,
    pub archived_at: Option<DateTime<Utc>>,
    pub archive_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Invoice {
    pub id: String,
    pub contract_id: String,
    pub due_date: NaiveDate,
    pub amount: Decimal,
    pub status: String,
    pub is_archived: bool,
    pub archived_at: Option<DateTime<Utc>>,
    pub archive_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Payment {
    pub id: String,
    pub invoice_id: String,
    pub method: String,
    pub amount: Decimal,
    pub status: String,
    pub paid_at: Option<DateTime<Utc>>,
    pub is_archived: bool,
    pub archived_at: Option<DateTime<Utc>>,
    pub archive_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Balance {
    pub tenant_id: String,
    pub current: Decimal,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contract_transition_table() {
        use ContractStatus::*;

        assert!(Draft.can_transition(Active));
        assert!(Draft.can_transition(Cancelled));
        assert!(!Draft.can_transition(Completed));
        assert!(!Draft.can_transition(Draft));

        assert!(Active.can_transition(Completed));
        assert!(Active.can_transition(Cancelled));
        assert!(!Active.can_transition(Draft));
        assert!(!Active.can_transition(Active));

        for terminal in [Completed, Cancelled] {
            assert!(terminal.allowed_transitions().is_empty());
            for next in [Draft, Active, Completed, Cancelled] {
                assert!(!terminal.can_transition(next));
            }
        }
    }

    #[test]
    fn occupancy_follows_status() {
        assert!(ContractStatus::Draft.occupies_unit());
        assert!(ContractStatus::Active.occupies_unit());
        assert!(!ContractStatus::Completed.occupies_unit());
        assert!(!ContractStatus::Cancelled.occupies_unit());
    }

    #[test]
    fn status_strings_round_trip() {
        for status in ["draft", "active", "completed", "cancelled"] {
            assert_eq!(ContractStatus::parse(status).unwrap().as_str(), status);
        }
        for status in ["pending", "overdue", "paid"] {
            assert_eq!(InvoiceStatus::parse(status).unwrap().as_str(), status);
        }
        for status in ["pending", "confirmed", "cancelled"] {
            assert_eq!(PaymentStatus::parse(status).unwrap().as_str(), status);
        }
        for status in ["free", "busy", "maintenance"] {
            assert_eq!(UnitStatus::parse(status).unwrap().as_str(), status);
        }
        assert!(ContractStatus::parse("Draft").is_none());
        assert!(PaymentMethod::parse("cash").is_none());
    }
}
