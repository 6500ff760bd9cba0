//! Import of study locations from the city's open-data block-location feed.
//!
//! Records are upserted by external id. New locations get a sensor seeded with
//! plausible starting values. Every run, successful or not, appends a sync log.

use crate::error::{AppError, StoreError};
use crate::model::{
    DEFAULT_CAPACITY, DeviceCredentials, ImportedLocation, SyncStatus, capacity_from,
    validate_coordinates,
};
use crate::simulation::random::RandomSource;
use crate::state::{AppState, ImportOutcome};
use serde::Deserialize;
use std::fmt;
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub const SYNC_TYPE_LOCATIONS: &str = "locations";
pub const EXTERNAL_ID_PREFIX: &str = "ghent-";
pub const DEFAULT_FEED_URL: &str =
    "https://data.stad.gent/api/explore/v2.1/catalog/datasets/bloklocaties-gent/records";
/// Records requested per fetch.
pub const FEED_PAGE_LIMIT: u32 = 100;

const UNKNOWN_NAME: &str = "Unknown Location";
const FALLBACK_ADDRESS: &str = "Ghent";
const FALLBACK_CAPACITY: NonZeroU32 = match NonZeroU32::new(DEFAULT_CAPACITY) {
    Some(capacity) => capacity,
    None => panic!("default capacity must be positive"),
};
const SEED_NOISE_MIN: u32 = 20;
const SEED_NOISE_SPAN: u32 = 40;

/// Where the feed is read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedSource {
    /// Open-data records endpoint, fetched over HTTP.
    Url(String),
    /// Local snapshot with the same payload, for offline runs.
    File(PathBuf),
}

impl fmt::Display for FeedSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedSource::Url(url) => f.write_str(url),
            FeedSource::File(path) => write!(f, "{}", path.display()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedResponse {
    #[serde(default)]
    pub results: Vec<FeedRecord>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

/// One block-location record as published by the feed.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedRecord {
    pub id: u64,
    #[serde(default)]
    pub titel: Option<String>,
    #[serde(default)]
    pub adres: Option<String>,
    #[serde(default)]
    pub totale_capaciteit: Option<i64>,
    #[serde(default)]
    pub label_1: Option<String>,
    #[serde(default)]
    pub openingsuren: Option<String>,
    #[serde(default)]
    pub teaser_text: Option<String>,
    #[serde(default)]
    pub teaser_img_url: Option<String>,
    #[serde(default)]
    pub lees_meer: Option<String>,
    #[serde(default)]
    pub geo_punt: Option<GeoPoint>,
}

impl FeedRecord {
    pub fn external_id(&self) -> String {
        format!("{EXTERNAL_ID_PREFIX}{}", self.id)
    }

    /// `None` when the record has no usable coordinates. A zero latitude or
    /// longitude marks an unplaced record in this feed.
    fn to_imported(&self) -> Option<ImportedLocation> {
        let point = self.geo_punt.as_ref()?;
        if point.lat == 0.0 || point.lon == 0.0 {
            return None;
        }
        validate_coordinates(point.lat, point.lon).ok()?;

        Some(ImportedLocation {
            external_id: self.external_id(),
            name: non_empty(&self.titel).unwrap_or_else(|| UNKNOWN_NAME.to_string()),
            address: non_empty(&self.adres).unwrap_or_else(|| FALLBACK_ADDRESS.to_string()),
            latitude: point.lat,
            longitude: point.lon,
            capacity: self
                .totale_capaciteit
                .and_then(|capacity| capacity_from(capacity).ok())
                .unwrap_or(FALLBACK_CAPACITY),
            location_type: non_empty(&self.label_1),
            website: non_empty(&self.lees_meer),
            opening_hours: non_empty(&self.openingsuren),
            description: non_empty(&self.teaser_text),
            image_url: non_empty(&self.teaser_img_url),
        })
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("failed to read feed: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to parse feed: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to fetch feed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("feed returned HTTP {status}")]
    Status { status: u16 },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub total: usize,
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
}

impl SyncSummary {
    pub fn message(&self) -> String {
        format!(
            "Created {}, Updated {}, Skipped {}",
            self.created, self.updated, self.skipped
        )
    }
}

pub fn load_feed_from_path(path: impl AsRef<Path>) -> Result<Vec<FeedRecord>, SyncError> {
    let contents = std::fs::read_to_string(path)?;
    let feed: FeedResponse = serde_json::from_str(&contents)?;
    Ok(feed.results)
}

/// Fetch one page of records. Any non-2xx status is an error.
pub async fn fetch_feed(
    client: &reqwest::Client,
    url: &str,
) -> Result<Vec<FeedRecord>, SyncError> {
    let response = client
        .get(url)
        .query(&[("limit", FEED_PAGE_LIMIT)])
        .send()
        .await?;
    let status = response.status();
    if !status.is_success() {
        return Err(SyncError::Status {
            status: status.as_u16(),
        });
    }
    let feed: FeedResponse = response.json().await?;
    Ok(feed.results)
}

pub async fn load_feed(
    client: &reqwest::Client,
    source: &FeedSource,
) -> Result<Vec<FeedRecord>, SyncError> {
    match source {
        FeedSource::Url(url) => fetch_feed(client, url).await,
        FeedSource::File(path) => load_feed_from_path(path),
    }
}

/// Upsert feed records into the store. Records without usable coordinates
/// are counted as skipped.
pub fn sync_records<R: RandomSource + ?Sized>(
    state: &mut AppState,
    records: &[FeedRecord],
    rng: &mut R,
    now: OffsetDateTime,
) -> SyncSummary {
    let mut summary = SyncSummary {
        total: records.len(),
        ..SyncSummary::default()
    };

    for record in records {
        let Some(imported) = record.to_imported() else {
            warn!(record_id = record.id, "Skipping feed record without coordinates");
            summary.skipped += 1;
            continue;
        };

        match import_record(state, imported, rng, now) {
            Ok(ImportOutcome::Created(_)) => summary.created += 1,
            Ok(ImportOutcome::Updated(_)) => summary.updated += 1,
            Err(err) => {
                warn!(record_id = record.id, error = %err, "Skipping feed record");
                summary.skipped += 1;
            }
        }
    }
    summary
}

fn import_record<R: RandomSource + ?Sized>(
    state: &mut AppState,
    imported: ImportedLocation,
    rng: &mut R,
    now: OffsetDateTime,
) -> Result<ImportOutcome, StoreError> {
    let outcome = state.import_location(imported);
    if let ImportOutcome::Created(location) = &outcome {
        let capacity = location.capacity.get();
        let noise = SEED_NOISE_MIN + rng.draw(SEED_NOISE_SPAN);
        let occupancy = rng.draw((capacity / 2).max(1));
        state.insert_sensor(
            location.id,
            Some(i64::from(noise)),
            Some(i64::from(occupancy)),
            DeviceCredentials::default(),
            now,
        )?;
    }
    Ok(outcome)
}

/// Apply an already loaded feed and record the outcome in the sync log.
pub fn apply_feed<R: RandomSource + ?Sized>(
    state: &Arc<RwLock<AppState>>,
    source: &FeedSource,
    loaded: Result<Vec<FeedRecord>, SyncError>,
    rng: &mut R,
    now: OffsetDateTime,
) -> Result<SyncSummary, AppError> {
    let mut guard = state.write().map_err(|_| AppError::StateLock)?;

    match loaded {
        Ok(records) => {
            let summary = sync_records(&mut guard, &records, rng, now);
            guard.append_sync_log(
                SYNC_TYPE_LOCATIONS,
                SyncStatus::Success,
                summary.total,
                summary.message(),
                now,
            );
            info!(
                source = %source,
                total = summary.total,
                created = summary.created,
                updated = summary.updated,
                skipped = summary.skipped,
                "Location sync complete"
            );
            Ok(summary)
        }
        Err(err) => {
            guard.append_sync_log(SYNC_TYPE_LOCATIONS, SyncStatus::Error, 0, err.to_string(), now);
            warn!(source = %source, error = %err, "Location sync failed");
            Err(err.into())
        }
    }
}

/// Load the feed, upsert it and record the outcome in the sync log.
///
/// The rng is locked only once the feed has been loaded.
pub async fn run_feed_sync<R: RandomSource + ?Sized>(
    state: &Arc<RwLock<AppState>>,
    source: &FeedSource,
    client: &reqwest::Client,
    rng: &Mutex<R>,
    now: OffsetDateTime,
) -> Result<SyncSummary, AppError> {
    let loaded = load_feed(client, source).await;
    let mut rng = rng.lock().map_err(|_| AppError::StateLock)?;
    apply_feed(state, source, loaded, &mut *rng, now)
}

/// Spawn the periodic feed sync. The first run happens one `interval` after
/// start; it stops when `shutdown` turns true.
pub fn spawn_sync_task<R>(
    state: Arc<RwLock<AppState>>,
    source: FeedSource,
    client: reqwest::Client,
    rng: Arc<Mutex<R>>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()>
where
    R: RandomSource + Send + 'static,
{
    tokio::spawn(async move {
        info!(
            source = %source,
            interval_secs = interval.as_secs(),
            "Location sync task started"
        );
        let start = tokio::time::Instant::now() + interval;
        let mut ticker = tokio::time::interval_at(start, interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Location sync task stopping");
                        break;
                    }
                }
                _ = ticker.tick() => {
                    match run_feed_sync(&state, &source, &client, &*rng, OffsetDateTime::now_utc()).await {
                        Ok(summary) => debug!(total = summary.total, "Scheduled location sync done"),
                        // Already logged and recorded by apply_feed
                        Err(err) => debug!(error = %err, "Scheduled location sync failed"),
                    }
                }
            }
        }
    })
}
