//! Providers: the data sources a cycle harvests.
//!
//! A provider is either a live OAI-PMH endpoint or a static one whose whole
//! repository is pre-materialised in a local XML archive. Both are driven by
//! the same scenario engine; only the harvesting strategies differ.

use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::error::HarvestError;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct Provider {
    /// Display name, also the first segment of the output tree.
    pub name: String,
    /// Base URL of the endpoint. Normalised; doubles as the provider identity.
    pub base_url: String,
    /// Optional allow-list of metadata prefixes this provider may be
    /// harvested with.
    pub prefixes: Option<Vec<String>>,
    /// Per-endpoint request timeout.
    pub timeout: Duration,
    /// Overview group the endpoint belongs to.
    pub group: Option<String>,
    /// Set for static providers: path of the local repository archive.
    pub archive: Option<PathBuf>,
}

impl Provider {
    pub fn new(name: impl Into<String>, base_url: &str) -> Result<Self, HarvestError> {
        Ok(Self {
            name: name.into(),
            base_url: normalize_base_url(base_url)?,
            prefixes: None,
            timeout: DEFAULT_TIMEOUT,
            group: None,
            archive: None,
        })
    }

    /// True when the provider is backed by a local archive instead of a
    /// network endpoint.
    pub fn is_static(&self) -> bool {
        self.archive.is_some()
    }

    /// Whether the provider's allow-list admits this prefix. No list admits
    /// everything.
    pub fn allows_prefix(&self, prefix: &str) -> bool {
        match &self.prefixes {
            Some(allowed) => allowed.iter().any(|p| p == prefix),
            None => true,
        }
    }
}

/// Normalise a base URL so it can serve as the provider identity: parsed,
/// host lowercased, trailing slash dropped.
pub fn normalize_base_url(raw: &str) -> Result<String, HarvestError> {
    let url = Url::parse(raw)
        .map_err(|e| HarvestError::Config(format!("invalid provider URL {raw}: {e}")))?;
    if !url.has_host() {
        return Err(HarvestError::Config(format!(
            "provider URL {raw} has no host"
        )));
    }
    Ok(url.as_str().trim_end_matches('/').to_string())
}
