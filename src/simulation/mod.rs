use crate::error::AppError;
use crate::simulation::model::{Tick, tick};
use crate::simulation::random::RandomSource;
use crate::state::{AppState, CommitOutcome};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use time::{OffsetDateTime, UtcOffset};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub mod model;
pub mod random;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub updated: usize,
    pub stale: usize,
}

/// Run one simulation batch over every non-overridden sensor.
///
/// Ticks are computed from a snapshot taken under the read lock. Each result is
/// then committed under the write lock only if the sensor was not edited,
/// overridden or deleted in between.
pub fn run_simulation_batch<R: RandomSource + ?Sized>(
    state: &Arc<RwLock<AppState>>,
    rng: &mut R,
    now: OffsetDateTime,
) -> Result<BatchSummary, AppError> {
    let inputs = {
        let guard = state.read().map_err(|_| AppError::StateLock)?;
        guard.simulation_inputs()
    };

    let readings: Vec<_> = inputs
        .iter()
        .filter_map(|input| match tick(&input.snapshot, input.capacity, now, &mut *rng) {
            Tick::Updated(reading) => Some((input.sensor_id, input.revision, reading)),
            Tick::Skipped => None,
        })
        .collect();

    let mut summary = BatchSummary::default();
    let mut guard = state.write().map_err(|_| AppError::StateLock)?;
    for (sensor_id, revision, reading) in readings {
        match guard.commit_simulated(sensor_id, revision, reading) {
            CommitOutcome::Applied => summary.updated += 1,
            CommitOutcome::Stale => {
                debug!(sensor_id, "Sensor changed during simulation batch, skipping");
                summary.stale += 1;
            }
        }
    }
    Ok(summary)
}

/// Current time in the offset the day periods are evaluated in.
pub fn local_now(offset: UtcOffset) -> OffsetDateTime {
    OffsetDateTime::now_utc().to_offset(offset)
}

/// Spawn the periodic simulation task. It runs until `shutdown` turns true.
pub fn spawn_simulation_task<R>(
    state: Arc<RwLock<AppState>>,
    rng: Arc<Mutex<R>>,
    interval: Duration,
    offset: UtcOffset,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()>
where
    R: RandomSource + Send + 'static,
{
    tokio::spawn(async move {
        info!(
            interval_secs = interval.as_secs(),
            "Sensor simulation task started"
        );
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Sensor simulation task stopping");
                        break;
                    }
                }
                _ = ticker.tick() => {
                    let result = match rng.lock() {
                        Ok(mut rng) => run_simulation_batch(&state, &mut *rng, local_now(offset)),
                        Err(_) => Err(AppError::StateLock),
                    };
                    match result {
                        Ok(summary) => debug!(
                            updated = summary.updated,
                            stale = summary.stale,
                            "Simulation batch complete"
                        ),
                        Err(err) => warn!(error = %err, "Simulation batch failed"),
                    }
                }
            }
        }
    })
}
