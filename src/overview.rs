//! The persistent endpoint overview.
//!
//! The overview is an XML file carrying the cycle properties and one
//! `<endpoint>` element per known provider:
//!
//! ```xml
//! <?xml version="1.0" encoding="UTF-8"?>
//! <overview>
//!   <properties mode="normal" scenario="ListRecords" workers="2"/>
//!   <endpoint uri="https://repo.example.org/oai" group="clarin"
//!             blocked="false" retry="false" incremental="true"
//!             attempted="2024-02-10T00:00:00Z" harvested="2024-02-01T00:00:00Z"/>
//! </overview>
//! ```
//!
//! Endpoints are created on first appearance in the configuration and are
//! never deleted here. For every endpoint at rest `harvested <= attempted`,
//! and the two are equal exactly when the last attempt succeeded.

use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::HarvestError;

/// Cycle-wide harvesting mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HarvestMode {
    /// Harvest every endpoint that is not blocked.
    #[default]
    Normal,
    /// Only endpoints whose last attempt failed after the last success.
    Retry,
    /// Harvest every unblocked endpoint from the epoch.
    Refresh,
}

/// Protocol scenario applied by each worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ScenarioKind {
    /// `ListIdentifiers` pages, then one `GetRecord` per identifier.
    ListIdentifiers,
    /// `ListRecords` pages of whole envelopes.
    #[default]
    ListRecords,
}

/// Cycle properties stored in the overview.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleProperties {
    #[serde(rename = "@mode", default)]
    pub mode: HarvestMode,
    #[serde(rename = "@scenario", default)]
    pub scenario: ScenarioKind,
    /// Concurrent endpoint harvest limit.
    #[serde(rename = "@workers", default = "default_workers")]
    pub workers: usize,
    /// Optional cycle-wide `from` override for selective harvesting.
    #[serde(rename = "@from", default, skip_serializing_if = "Option::is_none")]
    pub from: Option<DateTime<Utc>>,
}

fn default_workers() -> usize {
    1
}

impl Default for CycleProperties {
    fn default() -> Self {
        Self {
            mode: HarvestMode::default(),
            scenario: ScenarioKind::default(),
            workers: default_workers(),
            from: None,
        }
    }
}

/// Persistent per-endpoint harvest state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    #[serde(rename = "@uri")]
    pub uri: String,
    #[serde(rename = "@group", default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    /// A blocked endpoint is temporarily removed from the cycle.
    #[serde(rename = "@blocked", default)]
    pub blocked: bool,
    /// Whether a failed endpoint may be picked up by a retry cycle.
    #[serde(rename = "@retry", default)]
    pub retry: bool,
    /// Whether selective (from-dated) harvesting is allowed.
    #[serde(rename = "@incremental", default = "default_incremental")]
    pub allow_incremental: bool,
    /// Time of the most recent attempt, successful or not.
    #[serde(rename = "@attempted", default, skip_serializing_if = "Option::is_none")]
    pub attempted: Option<DateTime<Utc>>,
    /// Time of the most recent successful attempt.
    #[serde(rename = "@harvested", default, skip_serializing_if = "Option::is_none")]
    pub harvested: Option<DateTime<Utc>>,
}

fn default_incremental() -> bool {
    true
}

impl Endpoint {
    pub fn new(uri: impl Into<String>, group: Option<String>) -> Self {
        Self {
            uri: uri.into(),
            group,
            blocked: false,
            retry: false,
            allow_incremental: true,
            attempted: None,
            harvested: None,
        }
    }

    /// True when the most recent attempt ended in a successful harvest.
    pub fn last_attempt_succeeded(&self) -> bool {
        self.attempted.is_some() && self.attempted == self.harvested
    }
}

/// The whole overview file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Overview {
    #[serde(rename = "properties", default)]
    pub properties: CycleProperties,
    #[serde(rename = "endpoint", default)]
    pub endpoints: Vec<Endpoint>,
}

impl Overview {
    /// Read the overview from `path`. A missing file is an empty overview;
    /// a malformed one is a configuration error.
    pub fn load(path: &Path) -> Result<Self, HarvestError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path).map_err(|e| {
            HarvestError::Config(format!("cannot read overview {}: {e}", path.display()))
        })?;
        quick_xml::de::from_str(&text).map_err(|e| {
            HarvestError::Config(format!("malformed overview {}: {e}", path.display()))
        })
    }

    pub fn to_xml(&self) -> Result<String, HarvestError> {
        let mut body = String::new();
        let mut ser = quick_xml::se::Serializer::with_root(&mut body, Some("overview"))
            .map_err(|e| HarvestError::Persistence(e.to_string()))?;
        ser.indent(' ', 2);
        self.serialize(ser)
            .map_err(|e| HarvestError::Persistence(e.to_string()))?;
        Ok(format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{body}\n"))
    }

    /// Write the overview to `path` by writing a temp file in the same
    /// directory and renaming it over the target.
    pub fn save(&self, path: &Path) -> Result<(), HarvestError> {
        let xml = self.to_xml()?;
        let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
        let mut tmp = match dir {
            Some(dir) => NamedTempFile::new_in(dir),
            None => NamedTempFile::new(),
        }
        .map_err(|e| HarvestError::Persistence(e.to_string()))?;
        tmp.write_all(xml.as_bytes())
            .and_then(|_| tmp.flush())
            .map_err(|e| HarvestError::Persistence(e.to_string()))?;
        tmp.persist(path)
            .map_err(|e| HarvestError::Persistence(e.error.to_string()))?;
        Ok(())
    }

    pub fn endpoint(&self, uri: &str) -> Option<&Endpoint> {
        self.endpoints.iter().find(|e| e.uri == uri)
    }

    pub fn endpoint_mut(&mut self, uri: &str) -> Option<&mut Endpoint> {
        self.endpoints.iter_mut().find(|e| e.uri == uri)
    }

    /// Look up or create the endpoint for `(uri, group)`.
    pub fn endpoint_or_insert(&mut self, uri: &str, group: Option<&str>) -> &mut Endpoint {
        if let Some(i) = self.endpoints.iter().position(|e| e.uri == uri) {
            &mut self.endpoints[i]
        } else {
            self.endpoints
                .push(Endpoint::new(uri, group.map(|g| g.to_string())));
            self.endpoints.last_mut().unwrap()
        }
    }
}
