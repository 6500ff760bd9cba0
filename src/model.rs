//! Entity snapshots held by the store and handed to the core computations.

use crate::error::DomainError;
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use time::OffsetDateTime;

pub type LocationId = u64;
pub type SensorId = u64;
pub type PlanId = u64;
pub type SyncLogId = u64;
pub type UserId = String;

pub const MAX_NOISE_LEVEL: u8 = 100;
pub const DEFAULT_CAPACITY: u32 = 50;
pub const DEFAULT_NOISE_LEVEL: u8 = 30;

const MIN_NAME_LEN: usize = 2;
const MIN_ADDRESS_LEN: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Location {
    pub id: LocationId,
    pub external_id: Option<String>,
    pub name: String,
    pub address: String,
    pub latitude: f64,
    pub longitude: f64,
    pub capacity: NonZeroU32,
    #[serde(rename = "type")]
    pub location_type: Option<String>,
    pub website: Option<String>,
    pub opening_hours: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
}

/// Administrative device metadata. Not used by any protocol.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceCredentials {
    pub device_id: Option<String>,
    pub port: Option<u16>,
    #[serde(skip_serializing, default)]
    pub secret: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sensor {
    pub id: SensorId,
    pub location_id: LocationId,
    pub noise_level: u8,
    pub occupancy: u32,
    #[serde(with = "time::serde::rfc3339")]
    pub last_updated: OffsetDateTime,
    pub manual_override: bool,
    #[serde(flatten)]
    pub device: DeviceCredentials,
    /// Bumped on every write; the simulation batch commits against it.
    #[serde(skip)]
    pub revision: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Favorite {
    pub user_id: UserId,
    pub location_id: LocationId,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudyPlan {
    pub id: PlanId,
    pub user_id: UserId,
    pub location_id: LocationId,
    #[serde(with = "time::serde::rfc3339")]
    pub start_time: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub end_time: OffsetDateTime,
    pub notes: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncLog {
    pub id: SyncLogId,
    pub sync_type: String,
    pub status: SyncStatus,
    pub record_count: usize,
    pub message: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Fields for a location that does not exist yet.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewLocation {
    #[serde(default)]
    pub external_id: Option<String>,
    pub name: String,
    pub address: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default = "default_capacity")]
    pub capacity: i64,
    #[serde(default, rename = "type")]
    pub location_type: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub opening_hours: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

fn default_capacity() -> i64 {
    i64::from(DEFAULT_CAPACITY)
}

impl NewLocation {
    pub fn validate(&self) -> Result<NonZeroU32, DomainError> {
        validate_name(&self.name)?;
        validate_address(&self.address)?;
        validate_coordinates(self.latitude, self.longitude)?;
        capacity_from(self.capacity)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct LocationPatch {
    pub name: Option<String>,
    pub address: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub capacity: Option<i64>,
    #[serde(rename = "type")]
    pub location_type: Option<String>,
    pub website: Option<String>,
    pub opening_hours: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
}

/// A location as published by an external feed, keyed by its external id.
///
/// Imports skip the form rules on name and address. An update replaces every
/// field, so optional fields missing from the feed are cleared.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportedLocation {
    pub external_id: String,
    pub name: String,
    pub address: String,
    pub latitude: f64,
    pub longitude: f64,
    pub capacity: NonZeroU32,
    pub location_type: Option<String>,
    pub website: Option<String>,
    pub opening_hours: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
}

impl LocationPatch {
    pub fn validate(&self) -> Result<Option<NonZeroU32>, DomainError> {
        if let Some(name) = &self.name {
            validate_name(name)?;
        }
        if let Some(address) = &self.address {
            validate_address(address)?;
        }
        if let Some(latitude) = self.latitude {
            validate_coordinates(latitude, 0.0)?;
        }
        if let Some(longitude) = self.longitude {
            validate_coordinates(0.0, longitude)?;
        }
        self.capacity.map(capacity_from).transpose()
    }
}

/// Admin edit of a sensor. Values and the override flag are applied together.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SensorPatch {
    pub noise_level: Option<i64>,
    pub occupancy: Option<i64>,
    pub manual_override: Option<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewPlan {
    pub user_id: UserId,
    pub location_id: LocationId,
    pub start_time: OffsetDateTime,
    pub end_time: OffsetDateTime,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PlanPatch {
    pub location_id: Option<LocationId>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub start_time: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub end_time: Option<OffsetDateTime>,
    pub notes: Option<String>,
}

pub fn capacity_from(value: i64) -> Result<NonZeroU32, DomainError> {
    u32::try_from(value)
        .ok()
        .and_then(NonZeroU32::new)
        .ok_or(DomainError::InvalidCapacity(value))
}

pub fn noise_from(value: i64) -> Result<u8, DomainError> {
    u8::try_from(value)
        .ok()
        .filter(|noise| *noise <= MAX_NOISE_LEVEL)
        .ok_or(DomainError::InvalidNoise(value))
}

/// Negative occupancy is rejected; values above capacity are clamped.
pub fn occupancy_from(value: i64, capacity: NonZeroU32) -> Result<u32, DomainError> {
    if value < 0 {
        return Err(DomainError::InvalidRange {
            occupancy: value,
            capacity: capacity.get(),
        });
    }
    Ok(u32::try_from(value)
        .unwrap_or(u32::MAX)
        .min(capacity.get()))
}

/// Start must precede end and must not lie before `now`.
pub fn validate_plan_window(
    start: OffsetDateTime,
    end: OffsetDateTime,
    now: OffsetDateTime,
) -> Result<(), DomainError> {
    if start >= end {
        return Err(DomainError::EndBeforeStart);
    }
    if start < now {
        return Err(DomainError::StartInPast);
    }
    Ok(())
}

fn validate_name(name: &str) -> Result<(), DomainError> {
    if name.trim().chars().count() < MIN_NAME_LEN {
        return Err(DomainError::Validation(format!(
            "name must contain at least {MIN_NAME_LEN} characters"
        )));
    }
    Ok(())
}

fn validate_address(address: &str) -> Result<(), DomainError> {
    if address.trim().chars().count() < MIN_ADDRESS_LEN {
        return Err(DomainError::Validation(format!(
            "address must contain at least {MIN_ADDRESS_LEN} characters"
        )));
    }
    Ok(())
}

pub fn validate_coordinates(latitude: f64, longitude: f64) -> Result<(), DomainError> {
    if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
        return Err(DomainError::Validation(
            "coordinates are outside the WGS84 range".to_string(),
        ));
    }
    Ok(())
}
