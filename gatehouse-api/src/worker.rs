use std::sync::Arc;

use chrono::Utc;
use gatehouse_tickets::ExpirySweep;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info};

/// Background expiry of overdue invitations. Each pass goes through the
/// same compare-and-swap as request handlers, so overlapping with lazy
/// expiry on the read path never double-releases a seat.
pub fn start_expiry_worker(sweep: Arc<ExpirySweep>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_secs = every.as_secs(), "Expiry worker started");

        loop {
            ticker.tick().await;
            if let Err(e) = sweep.run(Utc::now()).await {
                error!(error = %e, "Expiry sweep failed");
            }
        }
    })
}
