//! Periodic re-evaluation.

use std::rc::Rc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::gateway::Gateway;
use crate::installation::Installation;

pub const DEFAULT_TICK_PERIOD: Duration = Duration::from_secs(60);

/// Tick `installation` every `period` until `shutdown` flips to `true` or
/// its sender is dropped. The first tick runs immediately.
///
/// The installation is `!Send`; run this on a current-thread runtime or
/// inside a `LocalSet`.
pub async fn run_timer<G: Gateway>(
    installation: Rc<Installation<G>>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tracing::info!(period_s = period.as_secs_f64(), "timer driver started");

    loop {
        if *shutdown.borrow() {
            break;
        }
        tokio::select! {
            biased;

            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }

            _ = interval.tick() => {
                installation.tick().await;
            }
        }
    }
    tracing::info!("timer driver stopped");
}
