use crate::error::{DomainError, StoreError};
use crate::model::{
    DEFAULT_NOISE_LEVEL, DeviceCredentials, Favorite, ImportedLocation, Location, LocationId,
    LocationPatch, NewLocation, NewPlan, PlanId, PlanPatch, Sensor, SensorId, SensorPatch, StudyPlan,
    SyncLog, SyncStatus, UserId, noise_from, occupancy_from, validate_plan_window,
};
use crate::simulation::model::{SensorSnapshot, SimulatedReading};
use crate::status::{LocationStatus, classify};
use std::collections::BTreeMap;
use time::OffsetDateTime;

/// Outcome of writing one simulated reading back into the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    Applied,
    /// The sensor was edited, overridden or removed after the batch read it.
    Stale,
}

/// Sensor row paired with the capacity of its location, as read by a batch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationInput {
    pub sensor_id: SensorId,
    pub revision: u64,
    pub snapshot: SensorSnapshot,
    pub capacity: std::num::NonZeroU32,
}

/// Whether an import created a new location or overwrote an existing one.
#[derive(Debug, Clone, PartialEq)]
pub enum ImportOutcome {
    Created(Location),
    Updated(Location),
}

/// In-memory store for every entity the service owns.
#[derive(Debug, Default)]
pub struct AppState {
    locations: BTreeMap<LocationId, Location>,
    sensors: BTreeMap<SensorId, Sensor>,
    favorites: Vec<Favorite>,
    plans: BTreeMap<PlanId, StudyPlan>,
    sync_logs: Vec<SyncLog>,
    next_id: u64,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    // Locations

    pub fn locations(&self) -> impl Iterator<Item = &Location> {
        self.locations.values()
    }

    pub fn location(&self, id: LocationId) -> Option<&Location> {
        self.locations.get(&id)
    }

    pub fn location_by_external_id(&self, external_id: &str) -> Option<&Location> {
        self.locations
            .values()
            .find(|location| location.external_id.as_deref() == Some(external_id))
    }

    pub fn insert_location(&mut self, new: NewLocation) -> Result<Location, StoreError> {
        let capacity = new.validate()?;
        if let Some(external_id) = &new.external_id
            && self.location_by_external_id(external_id).is_some()
        {
            return Err(StoreError::Conflict(format!(
                "external id {external_id} already exists"
            )));
        }

        let location = Location {
            id: self.allocate_id(),
            external_id: new.external_id,
            name: new.name,
            address: new.address,
            latitude: new.latitude,
            longitude: new.longitude,
            capacity,
            location_type: new.location_type,
            website: new.website,
            opening_hours: new.opening_hours,
            description: new.description,
            image_url: new.image_url,
        };
        self.locations.insert(location.id, location.clone());
        Ok(location)
    }

    /// Create or overwrite the location carrying `imported.external_id`.
    pub fn import_location(&mut self, imported: ImportedLocation) -> ImportOutcome {
        let existing = self
            .location_by_external_id(&imported.external_id)
            .map(|location| location.id);
        let id = existing.unwrap_or_else(|| self.allocate_id());
        let location = Location {
            id,
            external_id: Some(imported.external_id),
            name: imported.name,
            address: imported.address,
            latitude: imported.latitude,
            longitude: imported.longitude,
            capacity: imported.capacity,
            location_type: imported.location_type,
            website: imported.website,
            opening_hours: imported.opening_hours,
            description: imported.description,
            image_url: imported.image_url,
        };
        self.locations.insert(id, location.clone());

        match existing {
            Some(_) => {
                self.clamp_sensor_occupancy(&location);
                ImportOutcome::Updated(location)
            }
            None => ImportOutcome::Created(location),
        }
    }

    /// Apply a partial update. Shrinking capacity clamps the sensor's occupancy.
    pub fn update_location(
        &mut self,
        id: LocationId,
        patch: LocationPatch,
    ) -> Result<Location, StoreError> {
        let capacity = patch.validate()?;
        let location = self
            .locations
            .get_mut(&id)
            .ok_or(StoreError::LocationNotFound(id))?;

        if let Some(name) = patch.name {
            location.name = name;
        }
        if let Some(address) = patch.address {
            location.address = address;
        }
        if let Some(latitude) = patch.latitude {
            location.latitude = latitude;
        }
        if let Some(longitude) = patch.longitude {
            location.longitude = longitude;
        }
        if let Some(capacity) = capacity {
            location.capacity = capacity;
        }
        if patch.location_type.is_some() {
            location.location_type = patch.location_type;
        }
        if patch.website.is_some() {
            location.website = patch.website;
        }
        if patch.opening_hours.is_some() {
            location.opening_hours = patch.opening_hours;
        }
        if patch.description.is_some() {
            location.description = patch.description;
        }
        if patch.image_url.is_some() {
            location.image_url = patch.image_url;
        }
        let location = location.clone();

        self.clamp_sensor_occupancy(&location);
        Ok(location)
    }

    fn clamp_sensor_occupancy(&mut self, location: &Location) {
        if let Some(sensor) = self.sensor_for_location_mut(location.id)
            && sensor.occupancy > location.capacity.get()
        {
            sensor.occupancy = location.capacity.get();
            sensor.revision += 1;
        }
    }

    /// Remove a location together with its sensor, favorites and plans.
    pub fn delete_location(&mut self, id: LocationId) -> Result<Location, StoreError> {
        let location = self
            .locations
            .remove(&id)
            .ok_or(StoreError::LocationNotFound(id))?;
        self.sensors.retain(|_, sensor| sensor.location_id != id);
        self.favorites.retain(|favorite| favorite.location_id != id);
        self.plans.retain(|_, plan| plan.location_id != id);
        Ok(location)
    }

    pub fn favorite_count(&self, id: LocationId) -> usize {
        self.favorites
            .iter()
            .filter(|favorite| favorite.location_id == id)
            .count()
    }

    pub fn plan_count(&self, id: LocationId) -> usize {
        self.plans
            .values()
            .filter(|plan| plan.location_id == id)
            .count()
    }

    /// Status derived from the current sensor values, `None` without a sensor.
    pub fn location_status(&self, id: LocationId) -> Option<LocationStatus> {
        let location = self.locations.get(&id)?;
        let sensor = self.sensor_for_location(id)?;
        Some(classify(sensor.noise_level, sensor.occupancy, location.capacity))
    }

    // Sensors

    pub fn sensors(&self) -> impl Iterator<Item = &Sensor> {
        self.sensors.values()
    }

    pub fn sensor(&self, id: SensorId) -> Option<&Sensor> {
        self.sensors.get(&id)
    }

    pub fn sensor_for_location(&self, location_id: LocationId) -> Option<&Sensor> {
        self.sensors
            .values()
            .find(|sensor| sensor.location_id == location_id)
    }

    fn sensor_for_location_mut(&mut self, location_id: LocationId) -> Option<&mut Sensor> {
        self.sensors
            .values_mut()
            .find(|sensor| sensor.location_id == location_id)
    }

    /// Attach a sensor to a location. Occupancy above capacity is clamped.
    pub fn insert_sensor(
        &mut self,
        location_id: LocationId,
        noise_level: Option<i64>,
        occupancy: Option<i64>,
        device: DeviceCredentials,
        now: OffsetDateTime,
    ) -> Result<Sensor, StoreError> {
        let capacity = self
            .locations
            .get(&location_id)
            .ok_or(StoreError::LocationNotFound(location_id))?
            .capacity;
        if self.sensor_for_location(location_id).is_some() {
            return Err(StoreError::Conflict(
                "location already has a sensor".to_string(),
            ));
        }

        let noise_level = match noise_level {
            Some(value) => noise_from(value)?,
            None => DEFAULT_NOISE_LEVEL,
        };
        let occupancy = occupancy_from(occupancy.unwrap_or(0), capacity)?;

        let sensor = Sensor {
            id: self.allocate_id(),
            location_id,
            noise_level,
            occupancy,
            last_updated: now,
            manual_override: false,
            device,
            revision: 0,
        };
        self.sensors.insert(sensor.id, sensor.clone());
        Ok(sensor)
    }

    /// Admin edit: values and override flag are written in one step.
    pub fn update_sensor(
        &mut self,
        id: SensorId,
        patch: SensorPatch,
        now: OffsetDateTime,
    ) -> Result<Sensor, StoreError> {
        let location_id = self
            .sensors
            .get(&id)
            .ok_or(StoreError::SensorNotFound(id))?
            .location_id;
        let capacity = self
            .locations
            .get(&location_id)
            .ok_or(StoreError::LocationNotFound(location_id))?
            .capacity;

        let noise_level = patch.noise_level.map(noise_from).transpose()?;
        let occupancy = patch
            .occupancy
            .map(|value| occupancy_from(value, capacity))
            .transpose()?;

        let sensor = self
            .sensors
            .get_mut(&id)
            .ok_or(StoreError::SensorNotFound(id))?;
        if let Some(noise_level) = noise_level {
            sensor.noise_level = noise_level;
        }
        if let Some(occupancy) = occupancy {
            sensor.occupancy = occupancy;
        }
        if let Some(manual_override) = patch.manual_override {
            sensor.manual_override = manual_override;
        }
        sensor.last_updated = now;
        sensor.revision += 1;
        Ok(sensor.clone())
    }

    pub fn update_device_credentials(
        &mut self,
        location_id: LocationId,
        device: DeviceCredentials,
    ) -> Option<&Sensor> {
        let sensor = self.sensor_for_location_mut(location_id)?;
        sensor.device = device;
        sensor.revision += 1;
        Some(&*sensor)
    }

    pub fn delete_sensor(&mut self, id: SensorId) -> Result<Sensor, StoreError> {
        self.sensors
            .remove(&id)
            .ok_or(StoreError::SensorNotFound(id))
    }

    /// Non-overridden sensors with their location capacity.
    pub fn simulation_inputs(&self) -> Vec<SimulationInput> {
        self.sensors
            .values()
            .filter(|sensor| !sensor.manual_override)
            .filter_map(|sensor| {
                let location = self.locations.get(&sensor.location_id)?;
                Some(SimulationInput {
                    sensor_id: sensor.id,
                    revision: sensor.revision,
                    snapshot: SensorSnapshot {
                        noise_level: sensor.noise_level,
                        occupancy: sensor.occupancy,
                        manual_override: sensor.manual_override,
                        last_updated: sensor.last_updated,
                    },
                    capacity: location.capacity,
                })
            })
            .collect()
    }

    /// Write a simulated reading if the sensor is unchanged since `revision`
    /// was read and is still not overridden.
    pub fn commit_simulated(
        &mut self,
        id: SensorId,
        revision: u64,
        reading: SimulatedReading,
    ) -> CommitOutcome {
        let capacity = match self
            .sensors
            .get(&id)
            .and_then(|sensor| self.locations.get(&sensor.location_id))
        {
            Some(location) => location.capacity.get(),
            None => return CommitOutcome::Stale,
        };
        match self.sensors.get_mut(&id) {
            Some(sensor) if sensor.revision == revision && !sensor.manual_override => {
                sensor.noise_level = reading.noise_level;
                sensor.occupancy = reading.occupancy.min(capacity);
                sensor.last_updated = reading.last_updated;
                sensor.revision += 1;
                CommitOutcome::Applied
            }
            _ => CommitOutcome::Stale,
        }
    }

    // Favorites

    /// Favorites of one user, newest first.
    pub fn favorites_for(&self, user_id: &str) -> Vec<&Favorite> {
        let mut favorites: Vec<&Favorite> = self
            .favorites
            .iter()
            .filter(|favorite| favorite.user_id == user_id)
            .collect();
        favorites.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        favorites
    }

    pub fn add_favorite(
        &mut self,
        user_id: UserId,
        location_id: LocationId,
        now: OffsetDateTime,
    ) -> Result<Favorite, StoreError> {
        if !self.locations.contains_key(&location_id) {
            return Err(StoreError::LocationNotFound(location_id));
        }
        if self
            .favorites
            .iter()
            .any(|favorite| favorite.user_id == user_id && favorite.location_id == location_id)
        {
            return Err(StoreError::Conflict(
                "location already in favorites".to_string(),
            ));
        }
        let favorite = Favorite {
            user_id,
            location_id,
            created_at: now,
        };
        self.favorites.push(favorite.clone());
        Ok(favorite)
    }

    pub fn remove_favorite(
        &mut self,
        user_id: &str,
        location_id: LocationId,
    ) -> Result<Favorite, StoreError> {
        let index = self
            .favorites
            .iter()
            .position(|favorite| {
                favorite.user_id == user_id && favorite.location_id == location_id
            })
            .ok_or(StoreError::FavoriteNotFound(location_id))?;
        Ok(self.favorites.remove(index))
    }

    // Study plans

    /// Plans of one user ordered by start time.
    pub fn plans_for(&self, user_id: &str) -> Vec<&StudyPlan> {
        let mut plans: Vec<&StudyPlan> = self
            .plans
            .values()
            .filter(|plan| plan.user_id == user_id)
            .collect();
        plans.sort_by(|a, b| a.start_time.cmp(&b.start_time));
        plans
    }

    /// A plan is only visible to its owner.
    pub fn plan_for(&self, user_id: &str, id: PlanId) -> Result<&StudyPlan, StoreError> {
        self.plans
            .get(&id)
            .filter(|plan| plan.user_id == user_id)
            .ok_or(StoreError::PlanNotFound(id))
    }

    pub fn insert_plan(
        &mut self,
        new: NewPlan,
        now: OffsetDateTime,
    ) -> Result<StudyPlan, StoreError> {
        validate_plan_window(new.start_time, new.end_time, now)?;
        if !self.locations.contains_key(&new.location_id) {
            return Err(StoreError::LocationNotFound(new.location_id));
        }
        let plan = StudyPlan {
            id: self.allocate_id(),
            user_id: new.user_id,
            location_id: new.location_id,
            start_time: new.start_time,
            end_time: new.end_time,
            notes: new.notes,
            created_at: now,
        };
        self.plans.insert(plan.id, plan.clone());
        Ok(plan)
    }

    pub fn update_plan(
        &mut self,
        user_id: &str,
        id: PlanId,
        patch: PlanPatch,
    ) -> Result<StudyPlan, StoreError> {
        let current = self.plan_for(user_id, id)?;
        let start_time = patch.start_time.unwrap_or(current.start_time);
        let end_time = patch.end_time.unwrap_or(current.end_time);
        if start_time >= end_time {
            return Err(DomainError::EndBeforeStart.into());
        }
        if let Some(location_id) = patch.location_id
            && !self.locations.contains_key(&location_id)
        {
            return Err(StoreError::LocationNotFound(location_id));
        }

        let plan = self
            .plans
            .get_mut(&id)
            .ok_or(StoreError::PlanNotFound(id))?;
        if let Some(location_id) = patch.location_id {
            plan.location_id = location_id;
        }
        plan.start_time = start_time;
        plan.end_time = end_time;
        if patch.notes.is_some() {
            plan.notes = patch.notes;
        }
        Ok(plan.clone())
    }

    pub fn delete_plan(&mut self, user_id: &str, id: PlanId) -> Result<StudyPlan, StoreError> {
        self.plan_for(user_id, id)?;
        self.plans.remove(&id).ok_or(StoreError::PlanNotFound(id))
    }

    // Sync log

    pub fn sync_logs(&self) -> impl DoubleEndedIterator<Item = &SyncLog> {
        self.sync_logs.iter()
    }

    pub fn append_sync_log(
        &mut self,
        sync_type: &str,
        status: SyncStatus,
        record_count: usize,
        message: String,
        now: OffsetDateTime,
    ) -> SyncLog {
        let log = SyncLog {
            id: self.allocate_id(),
            sync_type: sync_type.to_string(),
            status,
            record_count,
            message,
            created_at: now,
        };
        self.sync_logs.push(log.clone());
        log
    }
}
