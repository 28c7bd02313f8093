use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::{
    task::JoinHandle,
    time::{interval, MissedTickBehavior},
};
use tracing::{debug, info};

use super::session::SessionManager;

/// Sweep idle sessions and stale lockout records every `period`.
///
/// The returned handle should be aborted on shutdown.
#[must_use]
pub fn spawn_reaper(sessions: Arc<SessionManager>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let stats = sessions.reap_expired(Utc::now());
            if stats.sessions > 0 || stats.lockouts > 0 {
                info!(
                    sessions = stats.sessions,
                    lockouts = stats.lockouts,
                    "reaped expired admin state"
                );
            } else {
                debug!("reaper sweep found nothing to remove");
            }
        }
    })
}
