//! TOML configuration: providers, action sequences, output tree.
//!
//! The configuration is intentionally declarative; everything that changes
//! between runs (modes, timestamps) lives in the overview file instead.
//!
//! ```toml
//! output = "output"
//! overview = "overview.xml"
//!
//! [xslt]
//! processor = "xsltproc"
//!
//! [[provider]]
//! name = "Example repository"
//! url = "https://repo.example.org/oai"
//! prefixes = ["oai_dc"]
//! timeout_secs = 30
//!
//! [[provider]]
//! name = "Static snapshot"
//! url = "https://static.example.org/oai"
//! archive = "snapshots/static.xml"
//!
//! [[sequence]]
//! prefix = "oai_dc"
//! actions = [
//!     { kind = "split" },
//!     { kind = "strip" },
//!     { kind = "transform", stylesheet = "style/dc.xsl" },
//!     { kind = "save" },
//! ]
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::action::Action;
use crate::error::HarvestError;
use crate::models::MetadataFormat;
use crate::provider::Provider;
use crate::sequence::ActionSequence;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Root of the save tree: `<output>/<provider>/<prefix>/<id>.xml`.
    pub output: PathBuf,
    /// Path of the persistent endpoint overview.
    pub overview: PathBuf,
    #[serde(default)]
    pub xslt: XsltConfig,
    #[serde(rename = "provider", default)]
    pub providers: Vec<ProviderConfig>,
    #[serde(rename = "sequence", default)]
    pub sequences: Vec<SequenceConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct XsltConfig {
    #[serde(default = "default_processor")]
    pub processor: String,
}

impl Default for XsltConfig {
    fn default() -> Self {
        Self {
            processor: default_processor(),
        }
    }
}

fn default_processor() -> String {
    "xsltproc".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProviderConfig {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub prefixes: Option<Vec<String>>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub group: Option<String>,
    /// When set, the provider is static: harvested from this local archive
    /// instead of the network.
    #[serde(default)]
    pub archive: Option<PathBuf>,
}

fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct SequenceConfig {
    pub prefix: String,
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default)]
    pub namespace: Option<String>,
    pub actions: Vec<ActionConfig>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ActionConfig {
    Split,
    Strip,
    Transform { stylesheet: PathBuf },
    Save,
}

pub fn load_config(path: &Path) -> Result<Config, HarvestError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        HarvestError::Config(format!("cannot read config {}: {e}", path.display()))
    })?;
    let config: Config = toml::from_str(&content)
        .map_err(|e| HarvestError::Config(format!("cannot parse config {}: {e}", path.display())))?;

    for provider in &config.providers {
        if provider.timeout_secs == 0 {
            return Err(HarvestError::Config(format!(
                "provider {}: timeout_secs must be > 0",
                provider.name
            )));
        }
    }
    Ok(config)
}

impl Config {
    /// Resolve the provider declarations, normalising URLs and rejecting
    /// duplicate identities.
    pub fn providers(&self) -> Result<Vec<Provider>, HarvestError> {
        let mut seen = HashSet::new();
        let mut providers = Vec::new();
        for declared in &self.providers {
            let mut provider = Provider::new(&declared.name, &declared.url)?;
            provider.prefixes = declared.prefixes.clone();
            provider.timeout = Duration::from_secs(declared.timeout_secs);
            provider.group = declared.group.clone();
            provider.archive = declared.archive.clone();
            if !seen.insert(provider.base_url.clone()) {
                return Err(HarvestError::Config(format!(
                    "duplicate provider URL {}",
                    provider.base_url
                )));
            }
            providers.push(provider);
        }
        Ok(providers)
    }

    /// Resolve the action sequences; the `save` action is bound to the
    /// configured output root.
    pub fn sequences(&self) -> Result<Vec<ActionSequence>, HarvestError> {
        let mut sequences = Vec::new();
        for declared in &self.sequences {
            let actions = declared
                .actions
                .iter()
                .map(|a| match a {
                    ActionConfig::Split => Action::Split,
                    ActionConfig::Strip => Action::Strip,
                    ActionConfig::Transform { stylesheet } => Action::Transform {
                        stylesheet: stylesheet.clone(),
                    },
                    ActionConfig::Save => Action::Save {
                        dir: self.output.clone(),
                    },
                })
                .collect();
            let input = MetadataFormat {
                prefix: declared.prefix.clone(),
                schema: declared.schema.clone(),
                namespace: declared.namespace.clone(),
            };
            sequences.push(ActionSequence::new(input, actions)?);
        }
        Ok(sequences)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
output = "out"
overview = "overview.xml"

[[provider]]
name = "Live"
url = "https://Repo.Example.org/oai/"
prefixes = ["oai_dc"]

[[provider]]
name = "Snapshot"
url = "https://static.example.org/oai"
archive = "repo.xml"

[[sequence]]
prefix = "oai_dc"
actions = [{ kind = "split" }, { kind = "strip" }, { kind = "save" }]
"#;

    fn write_config(text: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("harvest.toml");
        std::fs::write(&path, text).unwrap();
        (dir, path)
    }

    #[test]
    fn sample_config_resolves() {
        let (_dir, path) = write_config(SAMPLE);
        let config = load_config(&path).unwrap();
        let providers = config.providers().unwrap();
        assert_eq!(providers.len(), 2);
        assert_eq!(providers[0].base_url, "https://repo.example.org/oai");
        assert!(!providers[0].is_static());
        assert!(providers[1].is_static());

        let sequences = config.sequences().unwrap();
        assert_eq!(sequences.len(), 1);
        assert!(sequences[0].consumes_envelopes());
        assert_eq!(
            sequences[0].actions.last(),
            Some(&Action::Save {
                dir: PathBuf::from("out")
            })
        );
    }

    #[test]
    fn duplicate_provider_urls_are_rejected() {
        let text = r#"
output = "out"
overview = "overview.xml"
[[provider]]
name = "a"
url = "https://repo.example.org/oai"
[[provider]]
name = "b"
url = "https://REPO.example.org/oai/"
"#;
        let (_dir, path) = write_config(text);
        let config = load_config(&path).unwrap();
        assert!(matches!(config.providers(), Err(HarvestError::Config(_))));
    }

    #[test]
    fn unknown_action_kind_is_a_config_error() {
        let text = r#"
output = "out"
overview = "overview.xml"
[[sequence]]
prefix = "oai_dc"
actions = [{ kind = "explode" }]
"#;
        let (_dir, path) = write_config(text);
        assert!(matches!(load_config(&path), Err(HarvestError::Config(_))));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let text = r#"
output = "out"
overview = "overview.xml"
[[provider]]
name = "a"
url = "https://repo.example.org/oai"
timeout_secs = 0
"#;
        let (_dir, path) = write_config(text);
        assert!(matches!(load_config(&path), Err(HarvestError::Config(_))));
    }
}
