use crate::model::{Favorite, Location, LocationId, Sensor, StudyPlan};
use crate::recommendation::{Alternative, Warning};
use crate::state::AppState;
use crate::status::{AlertColor, LocationStatus, classify};
use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

#[derive(Debug, Serialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    Unauthorized,
    Forbidden,
    NotFound,
    Conflict,
    ValidationError,
    InternalError,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct ErrorResponse {
    pub error_code: ErrorCode,
    pub error_message: String,
    pub timestamp: String,
}

/// A location as shown to clients: stored fields plus freshly derived status.
#[derive(Debug, Serialize)]
pub struct LocationView {
    #[serde(flatten)]
    pub location: Location,
    pub sensor: Option<Sensor>,
    pub status: Option<LocationStatus>,
    pub alert: Option<AlertColor>,
    pub favorite_count: usize,
    pub plan_count: usize,
}

pub fn location_view(state: &AppState, location: &Location) -> LocationView {
    let sensor = state.sensor_for_location(location.id).cloned();
    let status = sensor
        .as_ref()
        .map(|sensor| classify(sensor.noise_level, sensor.occupancy, location.capacity));
    LocationView {
        location: location.clone(),
        sensor,
        alert: status.as_ref().map(LocationStatus::alert_color),
        status,
        favorite_count: state.favorite_count(location.id),
        plan_count: state.plan_count(location.id),
    }
}

#[derive(Debug, Serialize)]
pub struct LocationSummary {
    pub id: LocationId,
    pub name: String,
    pub address: String,
    pub capacity: u32,
}

#[derive(Debug, Serialize)]
pub struct SensorView {
    #[serde(flatten)]
    pub sensor: Sensor,
    pub location: Option<LocationSummary>,
    pub status: Option<LocationStatus>,
}

pub fn sensor_view(state: &AppState, sensor: &Sensor) -> SensorView {
    let location = state.location(sensor.location_id);
    SensorView {
        sensor: sensor.clone(),
        status: location
            .map(|location| classify(sensor.noise_level, sensor.occupancy, location.capacity)),
        location: location.map(|location| LocationSummary {
            id: location.id,
            name: location.name.clone(),
            address: location.address.clone(),
            capacity: location.capacity.get(),
        }),
    }
}

#[derive(Debug, Serialize)]
pub struct FavoriteView {
    #[serde(flatten)]
    pub favorite: Favorite,
    pub location: Option<LocationView>,
}

pub fn favorite_view(state: &AppState, favorite: &Favorite) -> FavoriteView {
    FavoriteView {
        favorite: favorite.clone(),
        location: state
            .location(favorite.location_id)
            .map(|location| location_view(state, location)),
    }
}

#[derive(Debug, Serialize)]
pub struct PlanView {
    #[serde(flatten)]
    pub plan: StudyPlan,
    pub location: Option<LocationView>,
}

pub fn plan_view(state: &AppState, plan: &StudyPlan) -> PlanView {
    PlanView {
        plan: plan.clone(),
        location: state
            .location(plan.location_id)
            .map(|location| location_view(state, location)),
    }
}

#[derive(Debug, Serialize)]
pub struct CreatePlanResponse {
    pub plan: PlanView,
    pub warnings: Vec<Warning>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub alternatives: Vec<Alternative>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct SimulateResponse {
    pub success: bool,
    pub updated: usize,
    pub timestamp: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct SyncResponse {
    pub success: bool,
    pub total: usize,
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct DeletedResponse {
    pub success: bool,
}

impl DeletedResponse {
    pub fn ok() -> Self {
        Self { success: true }
    }
}

#[derive(Debug, Serialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
    Degraded,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub locations: usize,
    pub sensors: usize,
    pub overridden_sensors: usize,
    pub timestamp: String,
}

pub fn format_timestamp(timestamp: OffsetDateTime) -> String {
    timestamp
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}
