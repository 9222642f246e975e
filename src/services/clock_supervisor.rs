use std::time::Duration;

use tokio::{
    task::JoinHandle,
    time::{MissedTickBehavior, interval},
};
use tracing::{debug, info, warn};

use crate::state::SharedState;

/// Drive the authority's timers: confirmation deadlines, court cooldown and resting teams.
pub async fn run(state: SharedState, period: Duration) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(period_ms = period.as_millis() as u64, "clock supervisor started");

    loop {
        ticker.tick().await;
        let result = state
            .run_action(|authority, now| {
                let deltas = authority.tick(now);
                Ok((deltas.len(), deltas))
            })
            .await;
        match result {
            Ok(0) => {}
            Ok(count) => debug!(count, "timer sweep produced deltas"),
            Err(err) => warn!(error = %err, "timer sweep failed"),
        }
    }
}

/// Spawn [`run`] with the configured tick interval.
pub fn spawn(state: SharedState) -> JoinHandle<()> {
    let period = state.config().tick_interval;
    tokio::spawn(run(state, period))
}
