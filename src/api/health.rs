use crate::api::error::ApiResult;
use crate::api::responses::{HealthResponse, HealthStatus, format_timestamp};
use crate::api::{ApiContext, read_state};
use crate::state::AppState;
use axum::Json;
use axum::extract::State;
use std::sync::{Arc, RwLock};
use time::OffsetDateTime;

pub async fn get_health(State(context): State<ApiContext>) -> ApiResult<Json<HealthResponse>> {
    build_health_response(&context.state, OffsetDateTime::now_utc()).map(Json)
}

/// Degraded while some location has no sensor to report status from.
pub fn build_health_response(
    state: &Arc<RwLock<AppState>>,
    now: OffsetDateTime,
) -> ApiResult<HealthResponse> {
    let guard = read_state(state)?;
    let locations = guard.locations().count();
    let sensors = guard.sensors().count();
    let overridden_sensors = guard
        .sensors()
        .filter(|sensor| sensor.manual_override)
        .count();
    let unsensored = guard
        .locations()
        .filter(|location| guard.sensor_for_location(location.id).is_none())
        .count();
    drop(guard);

    Ok(HealthResponse {
        status: if unsensored == 0 {
            HealthStatus::Ok
        } else {
            HealthStatus::Degraded
        },
        locations,
        sensors,
        overridden_sensors,
        timestamp: format_timestamp(now),
    })
}
