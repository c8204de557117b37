//! Background task driving periodic sweeps.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use crate::lifecycle::controller::LifecycleController;
use crate::lifecycle::events::{LifecycleEvent, SweepTick};
use crate::lifecycle::outbox::IntentOutbox;

/// Run a sweep every `period` and publish the resulting intents.
///
/// Ticks never overlap: a slow sweep delays the next one instead of
/// stacking up behind it.
pub fn spawn(
    controller: Arc<LifecycleController>,
    outbox: IntentOutbox,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(period_secs = period.as_secs(), "sweeper started");

        loop {
            ticker.tick().await;
            let tick = SweepTick { now: Utc::now() };
            // The failure is already logged; the next tick retries.
            if let Ok(intents) = controller.handle(LifecycleEvent::Sweep(tick)).await {
                outbox.publish(&intents);
            }
        }
    })
}
