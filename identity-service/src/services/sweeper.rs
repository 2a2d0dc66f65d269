use std::time::Duration;
use tokio::task::JoinHandle;

use crate::services::otp::OtpManager;

/// Periodically delete expired codes. Verification checks expiry itself, so
/// this only bounds table growth.
pub fn spawn_code_sweeper(otp: OtpManager, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // First tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match otp.sweep_expired().await {
                Ok(0) => {}
                Ok(removed) => tracing::info!(removed, "Expired verification codes swept"),
                Err(e) => tracing::warn!(error = %e, "Verification code sweep failed"),
            }
        }
    })
}
