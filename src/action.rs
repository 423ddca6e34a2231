//! Post-processing actions applied to batches of harvested records.
//!
//! Actions are value types: two actions are equal exactly when they are the
//! same variant with the same parameters, so all Splits are equal and two
//! Saves are equal when they share an output root. Shared engine state (the
//! stylesheet processor) lives in [`ActionContext`] instead of the action
//! itself; every `perform` call creates its own XML readers, so sequences
//! can be cloned freely across workers.

use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{info, warn};
use tempfile::NamedTempFile;

use crate::error::HarvestError;
use crate::models::Record;
use crate::transform::StylesheetEngine;
use crate::xml;

/// Engine state shared by every action of a worker.
#[derive(Clone)]
pub struct ActionContext {
    pub engine: Arc<dyn StylesheetEngine>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Split a response envelope into one record per `<record>` element.
    Split,
    /// Drop the OAI wrapper, keeping the payload inside `<metadata>`.
    Strip,
    /// Apply a stylesheet to each record document.
    Transform { stylesheet: PathBuf },
    /// Persist each record under `<dir>/<provider>/<prefix>/<id>.xml`.
    Save { dir: PathBuf },
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Split => write!(f, "split"),
            Action::Strip => write!(f, "strip"),
            Action::Transform { stylesheet } => write!(f, "transform {}", stylesheet.display()),
            Action::Save { dir } => write!(f, "save {}", dir.display()),
        }
    }
}

impl Action {
    /// Apply the action to the batch in place.
    pub fn perform(
        &self,
        records: &mut Vec<Record>,
        ctx: &ActionContext,
    ) -> Result<(), HarvestError> {
        match self {
            Action::Split => split(records),
            Action::Strip => strip(records),
            Action::Transform { stylesheet } => transform(records, stylesheet, ctx),
            Action::Save { dir } => save(records, dir),
        }
    }
}

fn split(records: &mut Vec<Record>) -> Result<(), HarvestError> {
    let mut emitted = Vec::new();
    for record in records.iter() {
        let parts = xml::record_elements(&record.document)
            .map_err(|e| HarvestError::Content(format!("unreadable envelope: {e}")))?;
        if parts.is_empty() {
            return Err(HarvestError::Content(format!(
                "no content in envelope [{}]",
                record.origin
            )));
        }
        for part in parts {
            // the copy is its own document; nothing shares the envelope
            match xml::header_identifier(&part) {
                Some(id) if !id.is_empty() => {
                    emitted.push(Record::single(id, &record.prefix, part, &record.origin));
                }
                _ => warn!("skipping record without identifier from {}", record.origin),
            }
        }
    }
    *records = emitted;
    Ok(())
}

fn strip(records: &mut Vec<Record>) -> Result<(), HarvestError> {
    for record in records.iter_mut() {
        let payload = xml::metadata_payload(&record.document)
            .map_err(|e| HarvestError::Pipeline(format!("unreadable record [{}]: {e}", record.id)))?
            .ok_or_else(|| {
                HarvestError::Pipeline(format!("record [{}] has no metadata payload", record.id))
            })?;
        record.document = payload;
    }
    Ok(())
}

fn transform(
    records: &mut Vec<Record>,
    stylesheet: &Path,
    ctx: &ActionContext,
) -> Result<(), HarvestError> {
    for record in records.iter_mut() {
        record.document = ctx.engine.transform(stylesheet, &record.document)?;
    }
    Ok(())
}

fn save(records: &mut [Record], dir: &Path) -> Result<(), HarvestError> {
    for record in records.iter() {
        if record.id.is_empty() {
            return Err(HarvestError::Pipeline(
                "cannot save a record without an identifier".to_string(),
            ));
        }
        let target_dir = dir.join(&record.origin).join(&record.prefix);
        fs::create_dir_all(&target_dir).map_err(|e| {
            HarvestError::Pipeline(format!("cannot create {}: {e}", target_dir.display()))
        })?;
        let target = target_dir.join(format!("{}.xml", filename_for(&record.id)));
        write_atomically(&target, &record.document)?;
        info!("saved {} as {}", record.id, target.display());
    }
    Ok(())
}

/// Write through a temp file in the target directory, then rename.
fn write_atomically(target: &Path, content: &str) -> Result<(), HarvestError> {
    let dir = target.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)
        .map_err(|e| HarvestError::Pipeline(format!("cannot stage {}: {e}", target.display())))?;
    tmp.write_all(content.as_bytes())
        .and_then(|_| tmp.flush())
        .map_err(|e| HarvestError::Pipeline(format!("cannot write {}: {e}", target.display())))?;
    tmp.persist(target)
        .map_err(|e| HarvestError::Pipeline(format!("cannot persist {}: {e}", target.display())))?;
    Ok(())
}

/// Record identifiers become filesystem names; anything outside
/// `[A-Za-z0-9._-]` is folded to `_`.
pub fn filename_for(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}
