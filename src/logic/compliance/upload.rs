//! Compliance Upload
//!
//! Periodically pushes the device-level compliance rollup to the central
//! authority. Runs beside the scheduler and stops on the same shutdown
//! signal. Failures are logged and retried on the next tick.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{Instant, MissedTickBehavior};

use super::reporter::{ComplianceReporter, ComplianceSnapshot};
use crate::logic::error::FetchError;
use crate::logic::scheduler::ShutdownSignal;

/// Upstream receiver of compliance snapshots
#[async_trait]
pub trait ComplianceSink: Send + Sync {
    async fn upload(&self, hostname: &str, snapshot: &ComplianceSnapshot) -> Result<(), FetchError>;
}

/// Upload every `period` until shutdown. Nothing is sent before the first
/// cycle has reported.
pub async fn run_upload_loop(
    sink: Arc<dyn ComplianceSink>,
    reporter: Arc<ComplianceReporter>,
    hostname: String,
    period: Duration,
    mut shutdown: ShutdownSignal,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = shutdown.wait() => break,
            _ = ticker.tick() => {
                if reporter.is_empty() {
                    continue;
                }

                let snapshot = reporter.snapshot();
                match sink.upload(&hostname, &snapshot).await {
                    Ok(()) => log::debug!("Uploaded compliance: {}", snapshot.device.as_str()),
                    Err(FetchError::Unconfigured) => {
                        log::debug!("Compliance upload skipped: not configured");
                    }
                    Err(e) => log::warn!("Compliance upload failed: {}", e),
                }
            }
        }
    }

    log::debug!("Compliance upload loop stopped");
}
