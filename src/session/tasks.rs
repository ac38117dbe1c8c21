//! Local ticker and heartbeat scheduler.
//!
//! Both tasks belong to one generation of the running session. Stopping
//! them bumps the generation under the state lock, so a tick or heartbeat
//! response that loses the race with a stop is dropped instead of applied.

use super::manager::{Reconcile, Shared};
use crate::error::Result;
use std::sync::Weak;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Local ticker period. Each tick adds exactly one second.
pub(super) const TICK_PERIOD: Duration = Duration::from_secs(1);

/// Spawn the per-second duration ticker.
pub(super) fn spawn_ticker(
    shared: Weak<Shared>,
    generation: u64,
    token: CancellationToken,
) -> JoinHandle<()> {
    let start = Instant::now() + TICK_PERIOD;

    tokio::spawn(async move {
        let mut ticker = time::interval_at(start, TICK_PERIOD);

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let Some(shared) = shared.upgrade() else {
                break;
            };
            if !shared.tick(generation) {
                break;
            }
        }
    })
}

/// Spawn the heartbeat scheduler.
pub(super) fn spawn_heartbeat(
    shared: Weak<Shared>,
    generation: u64,
    token: CancellationToken,
    period: Duration,
) -> JoinHandle<()> {
    let start = Instant::now() + period;

    tokio::spawn(async move {
        let mut ticker = time::interval_at(start, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let Some(shared) = shared.upgrade() else {
                break;
            };

            let outcome = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                outcome = send_heartbeat(&shared, generation) => outcome,
            };

            match outcome {
                Ok(Reconcile::Applied | Reconcile::Superseded) => {}
                // Generation moved on: this scheduler is stale.
                Ok(Reconcile::Stopped) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "Heartbeat failed, retrying next cycle");
                }
            }
        }

        tracing::debug!(generation, "Heartbeat scheduler stopped");
    })
}

/// Send one heartbeat for `generation` and apply the reply.
///
/// Replies are applied in request order: a reply overtaken by the reply to
/// a later heartbeat is dropped, so the duration never moves back.
pub(super) async fn send_heartbeat(shared: &Shared, generation: u64) -> Result<Reconcile> {
    let Some((session_id, position, sequence)) = shared.heartbeat_request(generation) else {
        return Ok(Reconcile::Stopped);
    };

    let ack = shared.service.heartbeat(session_id, &position).await?;

    let outcome = shared.apply_heartbeat(generation, session_id, sequence, ack);
    match outcome {
        Reconcile::Applied => {
            tracing::debug!(
                session_id,
                duration = ack.duration_seconds,
                today = ack.today_duration,
                "Heartbeat reconciled"
            )
        }
        Reconcile::Superseded => {
            tracing::debug!(session_id, sequence, "Discarding overtaken heartbeat reply")
        }
        Reconcile::Stopped => {
            tracing::debug!(session_id, "Discarding heartbeat reply for stopped session")
        }
    }
    Ok(outcome)
}
