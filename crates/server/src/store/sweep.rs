//! Periodic removal of expired codes and tokens.

use super::{CredentialStore, SweepReport};
use crate::error::StoreError;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;

/// Run one sweep and log what it removed.
pub async fn sweep_expired(store: &dyn CredentialStore) -> Result<SweepReport, StoreError> {
    let report = store.delete_expired(OffsetDateTime::now_utc()).await?;
    if report.total() > 0 {
        tracing::info!(
            codes = report.codes,
            access_tokens = report.access_tokens,
            refresh_tokens = report.refresh_tokens,
            "Swept expired credentials"
        );
    } else {
        tracing::debug!("Expiry sweep found nothing to remove");
    }
    Ok(report)
}

pub fn spawn_expiry_sweep(store: Arc<dyn CredentialStore>, every: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            if let Err(e) = sweep_expired(store.as_ref()).await {
                tracing::error!("Expiry sweep failed: {}", e);
            }
        }
    });
}
