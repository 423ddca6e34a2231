//! The cycle state machine over all endpoints.
//!
//! A `Cycle` owns the persistent [`Overview`] plus an in-memory set of
//! endpoint URIs already dispensed in this process lifetime, so `next()`
//! never hands the same endpoint to two workers. Workers share one `Cycle`
//! behind a mutex; every operation here assumes it is called serialised.
//!
//! Termination is signalled solely by [`Cycle::next`] returning `None`.

use std::collections::HashSet;
use std::path::PathBuf;

use chrono::{DateTime, Utc};

use crate::error::HarvestError;
use crate::overview::{CycleProperties, Endpoint, HarvestMode, Overview};

pub struct Cycle {
    overview: Overview,
    path: PathBuf,
    /// URIs already returned by `next()` in this process lifetime.
    dispensed: HashSet<String>,
}

impl Cycle {
    pub fn new(overview: Overview, path: PathBuf) -> Self {
        Self {
            overview,
            path,
            dispensed: HashSet::new(),
        }
    }

    pub fn load(path: PathBuf) -> Result<Self, HarvestError> {
        let overview = Overview::load(&path)?;
        Ok(Self::new(overview, path))
    }

    pub fn properties(&self) -> &CycleProperties {
        &self.overview.properties
    }

    pub fn set_mode(&mut self, mode: HarvestMode) {
        self.overview.properties.mode = mode;
    }

    pub fn set_from(&mut self, from: Option<DateTime<Utc>>) {
        if from.is_some() {
            self.overview.properties.from = from;
        }
    }

    pub fn endpoints(&self) -> &[Endpoint] {
        &self.overview.endpoints
    }

    /// Make sure an endpoint record exists for a configured provider.
    pub fn register(&mut self, uri: &str, group: Option<&str>) {
        self.overview.endpoint_or_insert(uri, group);
    }

    /// The next endpoint eligible for harvesting: not attempted today, not
    /// already dispensed, first in file order. `None` ends the cycle.
    pub fn next(&mut self, now: DateTime<Utc>) -> Option<Endpoint> {
        let today = now.date_naive();
        let pick = self
            .overview
            .endpoints
            .iter()
            .find(|ep| {
                ep.attempted.map(|a| a.date_naive()) != Some(today)
                    && !self.dispensed.contains(&ep.uri)
            })?
            .clone();
        self.dispensed.insert(pick.uri.clone());
        Some(pick)
    }

    /// Look up or create the endpoint matching `(uri, group)`. Used for
    /// targeted single-endpoint runs.
    pub fn next_for(&mut self, uri: &str, group: Option<&str>) -> Endpoint {
        self.overview.endpoint_or_insert(uri, group).clone()
    }

    /// Whether the cycle should contact this endpoint now, given its mode.
    pub fn do_harvest(&self, endpoint: &Endpoint) -> bool {
        match self.overview.properties.mode {
            HarvestMode::Normal | HarvestMode::Refresh => !endpoint.blocked,
            HarvestMode::Retry => {
                // only endpoints that failed after their last success
                endpoint.retry && endpoint.attempted != endpoint.harvested
            }
        }
    }

    /// The `from` date for selective harvesting of this endpoint. The epoch
    /// means an unrestricted harvest.
    pub fn request_date(&self, endpoint: &Endpoint) -> DateTime<Utc> {
        let epoch = DateTime::<Utc>::UNIX_EPOCH;
        if let Some(from) = self.overview.properties.from {
            return from;
        }
        match self.overview.properties.mode {
            HarvestMode::Normal => {
                if endpoint.blocked || !endpoint.allow_incremental {
                    epoch
                } else {
                    endpoint.harvested.unwrap_or(epoch)
                }
            }
            HarvestMode::Retry => {
                if !endpoint.retry || endpoint.attempted == endpoint.harvested {
                    epoch
                } else {
                    endpoint.attempted.unwrap_or(epoch)
                }
            }
            HarvestMode::Refresh => epoch,
        }
    }

    /// Record the outcome of a harvest attempt and flush the overview.
    ///
    /// The in-memory update happens before the flush, so an in-process retry
    /// still observes the attempt when persistence fails.
    pub fn record_attempt(
        &mut self,
        uri: &str,
        success: bool,
        now: DateTime<Utc>,
    ) -> Result<(), HarvestError> {
        let endpoint = self.overview.endpoint_or_insert(uri, None);
        endpoint.attempted = Some(now);
        if success {
            endpoint.harvested = Some(now);
        }
        self.overview.save(&self.path)
    }
}
