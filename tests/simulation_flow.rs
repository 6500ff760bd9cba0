use quiet_spots::error::AppError;
use quiet_spots::model::SensorPatch;
use quiet_spots::simulation::random::RngSource;
use quiet_spots::simulation::run_simulation_batch;
use quiet_spots::state::AppState;
use quiet_spots::sync::{load_feed_from_path, sync_records};
use std::sync::{Arc, RwLock};
use time::OffsetDateTime;
use time::macros::datetime;

const NOW: OffsetDateTime = datetime!(2026-03-02 09:00 UTC);

fn seeded_state() -> Result<Arc<RwLock<AppState>>, Box<dyn std::error::Error>> {
    let records = load_feed_from_path("config/locations.json")?;
    let mut state = AppState::new();
    let mut rng = RngSource::seeded(7);
    let summary = sync_records(&mut state, &records, &mut rng, NOW);
    assert_eq!(summary.created, 4);
    Ok(Arc::new(RwLock::new(state)))
}

#[test]
fn repeated_batches_keep_readings_in_range() -> Result<(), Box<dyn std::error::Error>> {
    let state = seeded_state()?;
    let mut rng = RngSource::seeded(42);

    for step in 0..48_i64 {
        let now = NOW + time::Duration::minutes(30 * step);
        let summary = run_simulation_batch(&state, &mut rng, now)?;
        assert_eq!(summary.updated, 4);
        assert_eq!(summary.stale, 0);

        let guard = state.read().map_err(|_| AppError::StateLock)?;
        for sensor in guard.sensors() {
            let location = guard
                .location(sensor.location_id)
                .ok_or("sensor without location")?;
            assert!(sensor.noise_level <= 100);
            assert!(sensor.occupancy <= location.capacity.get());
            assert_eq!(sensor.last_updated, now);
        }
    }
    Ok(())
}

#[test]
fn overridden_sensor_is_left_untouched() -> Result<(), Box<dyn std::error::Error>> {
    let state = seeded_state()?;
    let pinned = {
        let mut guard = state.write().map_err(|_| AppError::StateLock)?;
        let sensor_id = guard.sensors().next().ok_or("no sensors")?.id;
        guard.update_sensor(
            sensor_id,
            SensorPatch {
                noise_level: Some(95),
                occupancy: Some(3),
                manual_override: Some(true),
            },
            NOW,
        )?
    };
    let mut rng = RngSource::seeded(9);

    for step in 1..=10_i64 {
        let summary =
            run_simulation_batch(&state, &mut rng, NOW + time::Duration::minutes(step))?;
        assert_eq!(summary.updated, 3);
    }

    let guard = state.read().map_err(|_| AppError::StateLock)?;
    let sensor = guard.sensor(pinned.id).ok_or("pinned sensor missing")?;
    assert_eq!(sensor.noise_level, 95);
    assert_eq!(sensor.occupancy, 3);
    assert_eq!(sensor.last_updated, NOW);
    Ok(())
}

#[test]
fn same_seed_gives_same_readings() -> Result<(), Box<dyn std::error::Error>> {
    let first = seeded_state()?;
    let second = seeded_state()?;

    run_simulation_batch(&first, &mut RngSource::seeded(3), NOW)?;
    run_simulation_batch(&second, &mut RngSource::seeded(3), NOW)?;

    let readings = |state: &Arc<RwLock<AppState>>| -> Result<Vec<(u8, u32)>, AppError> {
        let guard = state.read().map_err(|_| AppError::StateLock)?;
        Ok(guard
            .sensors()
            .map(|sensor| (sensor.noise_level, sensor.occupancy))
            .collect())
    };
    assert_eq!(readings(&first)?, readings(&second)?);
    Ok(())
}
