//! Time-of-day aware random walk that stands in for real noise/occupancy sensors.
//!
//! Noise is drawn around a base level that depends on the hour, then pushed up
//! in proportion to how full the location is. Occupancy drifts by a small delta
//! whose range depends on the hour. Overridden sensors are never touched.

use crate::model::MAX_NOISE_LEVEL;
use crate::simulation::random::RandomSource;
use std::num::NonZeroU32;
use time::OffsetDateTime;

const OFF_HOURS_BASE_NOISE: i32 = 25;
const PEAK_BASE_NOISE: i32 = 45;
const WORKING_BASE_NOISE: i32 = 35;
const NOISE_FLUCTUATION_SPAN: u32 = 25;
const NOISE_FLUCTUATION_OFFSET: i32 = 10;
const OCCUPANCY_NOISE_WEIGHT: f64 = 20.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayPeriod {
    OffHours,
    Peak,
    Working,
}

impl DayPeriod {
    pub fn from_hour(hour: u8) -> Self {
        let working = (8..=22).contains(&hour);
        let peak = (10..=12).contains(&hour) || (14..=17).contains(&hour);
        match (working, peak) {
            (false, _) => Self::OffHours,
            (true, true) => Self::Peak,
            (true, false) => Self::Working,
        }
    }

    pub fn base_noise(self) -> i32 {
        match self {
            Self::OffHours => OFF_HOURS_BASE_NOISE,
            Self::Peak => PEAK_BASE_NOISE,
            Self::Working => WORKING_BASE_NOISE,
        }
    }

    /// Draw the occupancy change for one tick.
    ///
    /// Off hours: `[-4, 0]`. Peak: `[-3, +6]`. Other working hours: `[-3, +2]`.
    pub fn occupancy_delta<R: RandomSource + ?Sized>(self, rng: &mut R) -> i64 {
        match self {
            Self::OffHours => -i64::from(rng.draw(5)),
            Self::Peak => i64::from(rng.draw(10)) - 3,
            Self::Working => i64::from(rng.draw(6)) - 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorSnapshot {
    pub noise_level: u8,
    pub occupancy: u32,
    pub manual_override: bool,
    pub last_updated: OffsetDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulatedReading {
    pub noise_level: u8,
    pub occupancy: u32,
    pub last_updated: OffsetDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Sensor is under manual override; its state is left as it was.
    Skipped,
    Updated(SimulatedReading),
}

impl Tick {
    /// State of the sensor after this tick.
    pub fn resolve(self, sensor: &SensorSnapshot) -> SensorSnapshot {
        match self {
            Tick::Skipped => *sensor,
            Tick::Updated(reading) => SensorSnapshot {
                noise_level: reading.noise_level,
                occupancy: reading.occupancy,
                manual_override: sensor.manual_override,
                last_updated: reading.last_updated,
            },
        }
    }
}

/// Advance one sensor by a single step. The hour is read from `now` as given,
/// so callers pick the offset the day periods should follow.
pub fn tick<R: RandomSource + ?Sized>(
    sensor: &SensorSnapshot,
    capacity: NonZeroU32,
    now: OffsetDateTime,
    rng: &mut R,
) -> Tick {
    if sensor.manual_override {
        return Tick::Skipped;
    }

    let period = DayPeriod::from_hour(now.hour());
    let capacity = capacity.get();

    let fluctuation = rng.draw(NOISE_FLUCTUATION_SPAN) as i32 - NOISE_FLUCTUATION_OFFSET;
    let noise = clamp_noise(period.base_noise() + fluctuation);

    // Correlation term is added after the fluctuation clamp.
    let ratio = f64::from(sensor.occupancy.min(capacity)) / f64::from(capacity);
    let noise = clamp_noise(noise + (ratio * OCCUPANCY_NOISE_WEIGHT).round() as i32);

    let delta = period.occupancy_delta(rng);
    let occupancy = (i64::from(sensor.occupancy) + delta).clamp(0, i64::from(capacity)) as u32;

    Tick::Updated(SimulatedReading {
        noise_level: noise as u8,
        occupancy,
        last_updated: now,
    })
}

fn clamp_noise(value: i32) -> i32 {
    value.clamp(0, i32::from(MAX_NOISE_LEVEL))
}
