//! Classification of raw sensor values into display levels.
//!
//! Status is derived on every read from the stored noise/occupancy values and
//! is never persisted, so these thresholds are the only place the buckets live.

use serde::Serialize;
use std::num::NonZeroU32;

pub const QUIET_MAX_NOISE: u8 = 40;
pub const MODERATE_MAX_NOISE: u8 = 70;
pub const AVAILABLE_MAX_PERCENT: u32 = 60;
pub const BUSY_MAX_PERCENT: u32 = 90;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoiseLevel {
    Quiet,
    Moderate,
    Loud,
}

impl NoiseLevel {
    pub fn from_noise(noise: u8) -> Self {
        if noise <= QUIET_MAX_NOISE {
            Self::Quiet
        } else if noise <= MODERATE_MAX_NOISE {
            Self::Moderate
        } else {
            Self::Loud
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OccupancyLevel {
    Available,
    Busy,
    Full,
}

impl OccupancyLevel {
    pub fn from_percentage(percentage: u32) -> Self {
        if percentage <= AVAILABLE_MAX_PERCENT {
            Self::Available
        } else if percentage <= BUSY_MAX_PERCENT {
            Self::Busy
        } else {
            Self::Full
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertColor {
    Green,
    Yellow,
    Red,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LocationStatus {
    pub noise_level: NoiseLevel,
    pub occupancy_level: OccupancyLevel,
    pub noise_percentage: u8,
    pub occupancy_percentage: u32,
    pub available_seats: u32,
}

impl LocationStatus {
    pub fn alert_color(&self) -> AlertColor {
        alert_color(self.noise_level, self.occupancy_level)
    }
}

/// Callers guarantee `noise <= 100` and `occupancy <= capacity`.
pub fn classify(noise: u8, occupancy: u32, capacity: NonZeroU32) -> LocationStatus {
    let occupancy_percentage = occupancy_percentage(occupancy, capacity);
    LocationStatus {
        noise_level: NoiseLevel::from_noise(noise),
        occupancy_level: OccupancyLevel::from_percentage(occupancy_percentage),
        noise_percentage: noise,
        occupancy_percentage,
        available_seats: capacity.get().saturating_sub(occupancy),
    }
}

pub fn occupancy_percentage(occupancy: u32, capacity: NonZeroU32) -> u32 {
    (100.0 * f64::from(occupancy) / f64::from(capacity.get())).round() as u32
}

pub fn alert_color(noise: NoiseLevel, occupancy: OccupancyLevel) -> AlertColor {
    if noise == NoiseLevel::Loud || occupancy == OccupancyLevel::Full {
        AlertColor::Red
    } else if noise == NoiseLevel::Moderate || occupancy == OccupancyLevel::Busy {
        AlertColor::Yellow
    } else {
        AlertColor::Green
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cap(value: u32) -> NonZeroU32 {
        NonZeroU32::new(value).expect("non-zero capacity")
    }

    #[test]
    fn noise_thresholds_cover_the_whole_scale() {
        for noise in 0..=100u8 {
            let expected = match noise {
                0..=40 => NoiseLevel::Quiet,
                41..=70 => NoiseLevel::Moderate,
                _ => NoiseLevel::Loud,
            };
            assert_eq!(classify(noise, 0, cap(10)).noise_level, expected, "noise {noise}");
        }
    }

    #[test]
    fn occupancy_level_follows_rounded_percentage() {
        for capacity in [1u32, 7, 50, 100, 333] {
            for occupancy in 0..=capacity {
                let status = classify(0, occupancy, cap(capacity));
                let percentage =
                    (100.0 * f64::from(occupancy) / f64::from(capacity)).round() as u32;
                assert_eq!(status.occupancy_percentage, percentage);
                assert_eq!(
                    status.occupancy_level,
                    OccupancyLevel::from_percentage(percentage)
                );
                assert_eq!(status.available_seats, capacity - occupancy);
            }
        }
    }

    #[test]
    fn rounding_decides_the_bucket_edge() {
        // 60.4% rounds to 60 and stays available; 60.6% rounds to 61.
        assert_eq!(
            classify(0, 302, cap(500)).occupancy_level,
            OccupancyLevel::Available
        );
        assert_eq!(
            classify(0, 303, cap(500)).occupancy_level,
            OccupancyLevel::Busy
        );
        assert_eq!(
            classify(0, 91, cap(100)).occupancy_level,
            OccupancyLevel::Full
        );
        assert_eq!(
            classify(0, 90, cap(100)).occupancy_level,
            OccupancyLevel::Busy
        );
    }

    #[test]
    fn loud_and_full_location() {
        let status = classify(85, 95, cap(100));

        assert_eq!(status.noise_level, NoiseLevel::Loud);
        assert_eq!(status.occupancy_level, OccupancyLevel::Full);
        assert_eq!(status.available_seats, 5);
        assert_eq!(status.noise_percentage, 85);
        assert_eq!(status.occupancy_percentage, 95);
        assert_eq!(status.alert_color(), AlertColor::Red);
    }

    #[test]
    fn classify_is_repeatable() {
        assert_eq!(classify(55, 12, cap(20)), classify(55, 12, cap(20)));
    }

    #[test]
    fn red_dominates_yellow() {
        assert_eq!(
            alert_color(NoiseLevel::Quiet, OccupancyLevel::Full),
            AlertColor::Red
        );
        assert_eq!(
            alert_color(NoiseLevel::Loud, OccupancyLevel::Busy),
            AlertColor::Red
        );
        assert_eq!(
            alert_color(NoiseLevel::Moderate, OccupancyLevel::Available),
            AlertColor::Yellow
        );
        assert_eq!(
            alert_color(NoiseLevel::Quiet, OccupancyLevel::Busy),
            AlertColor::Yellow
        );
        assert_eq!(
            alert_color(NoiseLevel::Quiet, OccupancyLevel::Available),
            AlertColor::Green
        );
    }

    #[test]
    fn status_serializes_lowercase_levels() {
        let value = serde_json::to_value(classify(20, 1, cap(4))).expect("serialize status");
        assert_eq!(
            value,
            serde_json::json!({
                "noise_level": "quiet",
                "occupancy_level": "available",
                "noise_percentage": 20,
                "occupancy_percentage": 25,
                "available_seats": 3
            })
        );
    }
}
