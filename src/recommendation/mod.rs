//! Booking-time advice: warn when the requested location is loud or crowded
//! and propose the nearest calmer alternatives.

use crate::model::{Location, LocationId};
use crate::status::{LocationStatus, NoiseLevel, OccupancyLevel};
use serde::{Serialize, Serializer};
use std::fmt;

pub mod geo;

pub const MAX_ALTERNATIVES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Warning {
    Loud,
    Full,
    Busy { available_seats: u32 },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::Loud => write!(f, "This location is currently loud"),
            Warning::Full => write!(
                f,
                "This location is currently full (no seats available)"
            ),
            Warning::Busy { available_seats } => write!(
                f,
                "This location is busy ({available_seats} seats remaining)"
            ),
        }
    }
}

impl Serialize for Warning {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alternative {
    pub id: LocationId,
    pub name: String,
    pub address: String,
    /// Meters, rounded.
    pub distance: u64,
    pub noise_level: NoiseLevel,
    pub available_seats: u32,
}

/// A location considered as an alternative, with its derived status if it has a sensor.
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub location: &'a Location,
    pub status: Option<LocationStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Recommendation {
    pub warnings: Vec<Warning>,
    pub alternatives: Vec<Alternative>,
}

pub fn warnings_for(status: &LocationStatus) -> Vec<Warning> {
    let mut warnings = Vec::new();
    if status.noise_level == NoiseLevel::Loud {
        warnings.push(Warning::Loud);
    }
    match status.occupancy_level {
        OccupancyLevel::Full => warnings.push(Warning::Full),
        OccupancyLevel::Busy => warnings.push(Warning::Busy {
            available_seats: status.available_seats,
        }),
        OccupancyLevel::Available => {}
    }
    warnings
}

/// Evaluate a booking target. Alternatives are only searched when at least one
/// warning applies; a target without a sensor yields neither.
pub fn evaluate(
    target: &Location,
    target_status: Option<&LocationStatus>,
    candidates: &[Candidate<'_>],
) -> Recommendation {
    let Some(status) = target_status else {
        return Recommendation::default();
    };
    let warnings = warnings_for(status);
    if warnings.is_empty() {
        return Recommendation::default();
    }

    let mut ranked: Vec<(f64, Alternative)> = candidates
        .iter()
        .filter(|candidate| candidate.location.id != target.id)
        .filter_map(|candidate| {
            let status = candidate.status?;
            if status.noise_level == NoiseLevel::Loud
                || status.occupancy_level == OccupancyLevel::Full
            {
                return None;
            }
            let meters = geo::haversine_meters(
                target.latitude,
                target.longitude,
                candidate.location.latitude,
                candidate.location.longitude,
            );
            Some((
                meters,
                Alternative {
                    id: candidate.location.id,
                    name: candidate.location.name.clone(),
                    address: candidate.location.address.clone(),
                    distance: meters.round() as u64,
                    noise_level: status.noise_level,
                    available_seats: status.available_seats,
                },
            ))
        })
        .collect();
    ranked.sort_by(|a, b| a.0.total_cmp(&b.0));

    Recommendation {
        warnings,
        alternatives: ranked
            .into_iter()
            .take(MAX_ALTERNATIVES)
            .map(|(_, alternative)| alternative)
            .collect(),
    }
}
