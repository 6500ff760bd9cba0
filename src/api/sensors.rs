use crate::api::auth::AdminUser;
use crate::api::error::{ApiError, ApiResult};
use crate::api::responses::{
    DeletedResponse, SensorView, SimulateResponse, format_timestamp, sensor_view,
};
use crate::api::{ApiContext, read_state, write_state};
use crate::error::StoreError;
use crate::model::{DeviceCredentials, LocationId, SensorId, SensorPatch};
use crate::simulation::random::RandomSource;
use crate::simulation::{local_now, run_simulation_batch};
use crate::state::AppState;
use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::Deserialize;
use std::sync::{Arc, RwLock};
use time::OffsetDateTime;
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct CreateSensorRequest {
    pub location_id: LocationId,
    #[serde(default)]
    pub noise_level: Option<i64>,
    #[serde(default)]
    pub occupancy: Option<i64>,
    #[serde(flatten)]
    pub device: DeviceCredentials,
}

pub async fn list_sensors(State(context): State<ApiContext>) -> ApiResult<Json<Vec<SensorView>>> {
    build_sensor_list(&context.state).map(Json)
}

pub async fn get_sensor(
    State(context): State<ApiContext>,
    Path(id): Path<SensorId>,
) -> ApiResult<Json<SensorView>> {
    build_sensor(&context.state, id).map(Json)
}

pub async fn create_sensor(
    State(context): State<ApiContext>,
    _admin: AdminUser,
    body: Result<Json<CreateSensorRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<SensorView>)> {
    let Json(request) = body?;
    let view = build_create_sensor(&context.state, request, OffsetDateTime::now_utc())?;
    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn update_sensor(
    State(context): State<ApiContext>,
    _admin: AdminUser,
    Path(id): Path<SensorId>,
    body: Result<Json<SensorPatch>, JsonRejection>,
) -> ApiResult<Json<SensorView>> {
    let Json(patch) = body?;
    build_update_sensor(&context.state, id, patch, OffsetDateTime::now_utc()).map(Json)
}

pub async fn delete_sensor(
    State(context): State<ApiContext>,
    _admin: AdminUser,
    Path(id): Path<SensorId>,
) -> ApiResult<Json<DeletedResponse>> {
    let mut guard = write_state(&context.state)?;
    guard.delete_sensor(id)?;
    Ok(Json(DeletedResponse::ok()))
}

pub async fn simulate(
    State(context): State<ApiContext>,
    _admin: AdminUser,
) -> ApiResult<Json<SimulateResponse>> {
    let mut rng = context
        .rng
        .lock()
        .map_err(|_| ApiError::Internal("rng lock poisoned".to_string()))?;
    build_simulate_response(&context.state, &mut *rng, local_now(context.utc_offset)).map(Json)
}

/// Most recently updated first.
pub fn build_sensor_list(state: &Arc<RwLock<AppState>>) -> ApiResult<Vec<SensorView>> {
    let guard = read_state(state)?;
    let mut views: Vec<SensorView> = guard
        .sensors()
        .map(|sensor| sensor_view(&guard, sensor))
        .collect();
    views.sort_by(|a, b| b.sensor.last_updated.cmp(&a.sensor.last_updated));
    Ok(views)
}

pub fn build_sensor(state: &Arc<RwLock<AppState>>, id: SensorId) -> ApiResult<SensorView> {
    let guard = read_state(state)?;
    let sensor = guard.sensor(id).ok_or(StoreError::SensorNotFound(id))?;
    Ok(sensor_view(&guard, sensor))
}

pub fn build_create_sensor(
    state: &Arc<RwLock<AppState>>,
    request: CreateSensorRequest,
    now: OffsetDateTime,
) -> ApiResult<SensorView> {
    let mut guard = write_state(state)?;
    let sensor = guard.insert_sensor(
        request.location_id,
        request.noise_level,
        request.occupancy,
        request.device,
        now,
    )?;
    info!(
        sensor_id = sensor.id,
        location_id = sensor.location_id,
        "Sensor created"
    );
    Ok(sensor_view(&guard, &sensor))
}

pub fn build_update_sensor(
    state: &Arc<RwLock<AppState>>,
    id: SensorId,
    patch: SensorPatch,
    now: OffsetDateTime,
) -> ApiResult<SensorView> {
    let mut guard = write_state(state)?;
    let sensor = guard.update_sensor(id, patch, now)?;
    Ok(sensor_view(&guard, &sensor))
}

pub fn build_simulate_response<R: RandomSource + ?Sized>(
    state: &Arc<RwLock<AppState>>,
    rng: &mut R,
    now: OffsetDateTime,
) -> ApiResult<SimulateResponse> {
    let summary = run_simulation_batch(state, rng, now)?;
    info!(
        updated = summary.updated,
        stale = summary.stale,
        "Manual simulation batch complete"
    );
    Ok(SimulateResponse {
        success: true,
        updated: summary.updated,
        timestamp: format_timestamp(now),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::{new_location, poisoned_state};
    use crate::simulation::random::ScriptedSource;
    use serde_json::json;
    use time::macros::datetime;

    const NOW: OffsetDateTime = datetime!(2026-01-11 12:00 UTC);

    fn state_with_location(capacity: i64) -> (Arc<RwLock<AppState>>, LocationId) {
        let mut app_state = AppState::new();
        let location = app_state
            .insert_location(new_location("Tweebronnen", 51.0445, 3.7265, capacity))
            .expect("insert location");
        (Arc::new(RwLock::new(app_state)), location.id)
    }

    fn create_request(location_id: LocationId, noise: i64, occupancy: i64) -> CreateSensorRequest {
        CreateSensorRequest {
            location_id,
            noise_level: Some(noise),
            occupancy: Some(occupancy),
            device: DeviceCredentials::default(),
        }
    }

    #[test]
    fn create_clamps_occupancy_to_capacity() -> Result<(), Box<dyn std::error::Error>> {
        let (state, location_id) = state_with_location(40);

        let view = build_create_sensor(&state, create_request(location_id, 55, 70), NOW)?;

        assert_eq!(view.sensor.occupancy, 40);
        let status = view.status.ok_or("missing status")?;
        assert_eq!(status.available_seats, 0);
        assert_eq!(view.location.ok_or("missing location")?.capacity, 40);
        Ok(())
    }

    #[test]
    fn create_rejects_out_of_range_noise() {
        let (state, location_id) = state_with_location(40);

        let result = build_create_sensor(&state, create_request(location_id, 101, 0), NOW);

        assert!(matches!(result, Err(ApiError::Validation(_))));
    }

    #[test]
    fn second_sensor_for_location_conflicts() -> Result<(), Box<dyn std::error::Error>> {
        let (state, location_id) = state_with_location(40);
        build_create_sensor(&state, create_request(location_id, 20, 0), NOW)?;

        let result = build_create_sensor(&state, create_request(location_id, 20, 0), NOW);

        assert!(matches!(result, Err(ApiError::Conflict(_))));
        Ok(())
    }

    #[test]
    fn create_for_missing_location_is_not_found() {
        let (state, _) = state_with_location(40);

        let result = build_create_sensor(&state, create_request(999, 20, 0), NOW);

        assert!(matches!(result, Err(ApiError::NotFound(_))));
    }

    #[test]
    fn create_request_reads_flat_device_fields() -> Result<(), Box<dyn std::error::Error>> {
        let request: CreateSensorRequest = serde_json::from_value(json!({
            "location_id": 3,
            "device_id": "tb-01",
            "port": 1883
        }))?;

        assert_eq!(request.location_id, 3);
        assert!(request.noise_level.is_none());
        assert_eq!(request.device.device_id.as_deref(), Some("tb-01"));
        assert_eq!(request.device.port, Some(1883));
        Ok(())
    }

    #[test]
    fn admin_update_sets_override_and_timestamp() -> Result<(), Box<dyn std::error::Error>> {
        let (state, location_id) = state_with_location(50);
        let created = build_create_sensor(&state, create_request(location_id, 20, 0), NOW)?;
        let later = datetime!(2026-01-11 12:05 UTC);

        let view = build_update_sensor(
            &state,
            created.sensor.id,
            SensorPatch {
                noise_level: Some(90),
                occupancy: Some(49),
                manual_override: Some(true),
            },
            later,
        )?;

        assert!(view.sensor.manual_override);
        assert_eq!(view.sensor.noise_level, 90);
        assert_eq!(view.sensor.last_updated, later);
        Ok(())
    }

    #[test]
    fn list_is_ordered_by_last_updated_desc() -> Result<(), Box<dyn std::error::Error>> {
        let mut app_state = AppState::new();
        let first = app_state.insert_location(new_location("Eerste", 51.04, 3.72, 10))?;
        let second = app_state.insert_location(new_location("Tweede", 51.05, 3.72, 10))?;
        let state = Arc::new(RwLock::new(app_state));
        build_create_sensor(&state, create_request(first.id, 10, 0), NOW)?;
        build_create_sensor(
            &state,
            create_request(second.id, 10, 0),
            datetime!(2026-01-11 13:00 UTC),
        )?;

        let locations: Vec<LocationId> = build_sensor_list(&state)?
            .iter()
            .map(|view| view.sensor.location_id)
            .collect();

        assert_eq!(locations, vec![second.id, first.id]);
        Ok(())
    }

    #[test]
    fn simulate_skips_overridden_sensors() -> Result<(), Box<dyn std::error::Error>> {
        let (state, location_id) = state_with_location(50);
        let created = build_create_sensor(&state, create_request(location_id, 20, 10), NOW)?;
        build_update_sensor(
            &state,
            created.sensor.id,
            SensorPatch {
                manual_override: Some(true),
                ..SensorPatch::default()
            },
            NOW,
        )?;
        let mut rng = ScriptedSource::default();

        let response = build_simulate_response(&state, &mut rng, NOW)?;

        assert_eq!(
            response,
            SimulateResponse {
                success: true,
                updated: 0,
                timestamp: "2026-01-11T12:00:00Z".to_string(),
            }
        );
        let view = build_sensor(&state, created.sensor.id)?;
        assert_eq!(view.sensor.noise_level, 20);
        Ok(())
    }

    #[test]
    fn simulate_updates_live_sensors() -> Result<(), Box<dyn std::error::Error>> {
        let (state, location_id) = state_with_location(50);
        build_create_sensor(&state, create_request(location_id, 20, 10), NOW)?;
        let mut rng = ScriptedSource::default();

        let response = build_simulate_response(&state, &mut rng, NOW)?;

        assert_eq!(response.updated, 1);
        Ok(())
    }

    #[test]
    fn sensors_return_internal_error_when_lock_poisoned() {
        let state = poisoned_state();

        assert!(matches!(build_sensor_list(&state), Err(ApiError::Internal(_))));
        assert!(matches!(
            build_simulate_response(&state, &mut ScriptedSource::default(), NOW),
            Err(ApiError::Internal(_))
        ));
    }
}
