//! Payment maintenance commands.
//!
//! `reconcile` asks PhonePe for the status of every order whose payment has
//! been pending longer than the threshold and applies the answer, the same
//! way the status endpoint does for a single order. Intended for a cron job
//! covering callbacks that never arrived.

use std::sync::Arc;

use chrono::Duration;
use restwell_storefront::{AppState, config::StorefrontConfig, db, phonepe::PhonePeClient};

/// Reconcile payments pending for at least `older_than_minutes`.
///
/// # Errors
///
/// Returns an error if configuration is incomplete, the database is
/// unreachable, or the pending-payment query fails. Individual gateway
/// failures are counted in the report instead.
pub async fn reconcile(older_than_minutes: i64) -> Result<(), Box<dyn std::error::Error>> {
    if older_than_minutes < 0 {
        return Err("--older-than-minutes must not be negative".into());
    }

    let config = StorefrontConfig::from_env()?;
    let pool = db::create_pool(&config.database_url).await?;
    let gateway = PhonePeClient::new(&config.phonepe)?;

    tracing::info!(
        environment = ?config.phonepe.environment,
        older_than_minutes,
        "Reconciling pending payments"
    );

    let state = AppState::new(config, pool, Arc::new(gateway));
    let report = state
        .payments()
        .reconcile_pending(Duration::minutes(older_than_minutes))
        .await?;

    tracing::info!(
        checked = report.checked,
        completed = report.completed,
        failed = report.failed,
        still_pending = report.still_pending,
        errors = report.errors,
        "Reconciliation finished"
    );

    if report.errors > 0 {
        tracing::warn!("{} orders could not be checked, see log above", report.errors);
    }
    Ok(())
}
