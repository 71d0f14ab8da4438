use axum::{routing::get, Router};

use crate::state::AppState;

pub mod balances;
pub mod contracts;
pub mod health;
pub mod invoices;
pub mod payments;
pub mod tenants;
pub mod units;

pub fn v1_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .merge(units::router())
        .merge(tenants::router())
        .merge(contracts::router())
        .merge(invoices::router())
        .merge(payments::router())
        .merge(balances::router())
}
