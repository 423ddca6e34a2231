//! Action sequences: typed chains from raw harvest output to saved records.
//!
//! A sequence is bound to one input format. Adjacent actions must be
//! type-compatible: Split is the only action that consumes a response
//! envelope and may therefore only open a chain; Strip and Transform work on
//! single records; Save finalises the chain and must close it. The rules are
//! enforced once at construction so a misconfigured chain is a startup
//! error, and re-checked against the batch shape at run time.

use log::debug;

use crate::action::{Action, ActionContext};
use crate::error::HarvestError;
use crate::models::{MetadataFormat, Record};

#[derive(Debug, Clone, PartialEq)]
pub struct ActionSequence {
    pub input: MetadataFormat,
    pub actions: Vec<Action>,
}

impl ActionSequence {
    pub fn new(input: MetadataFormat, actions: Vec<Action>) -> Result<Self, HarvestError> {
        validate(&actions)?;
        Ok(Self { input, actions })
    }

    /// Whether the chain starts by splitting envelopes.
    pub fn consumes_envelopes(&self) -> bool {
        matches!(self.actions.first(), Some(Action::Split))
    }

    /// Run the whole chain over the batch. Returns the number of records
    /// that reached the final Save.
    pub fn run(
        &self,
        records: &mut Vec<Record>,
        ctx: &ActionContext,
    ) -> Result<usize, HarvestError> {
        if records.iter().any(|r| r.is_envelope) && !self.consumes_envelopes() {
            return Err(HarvestError::Pipeline(format!(
                "sequence for {} cannot consume an envelope without a split",
                self.input.prefix
            )));
        }
        for action in &self.actions {
            action.perform(records, ctx)?;
            debug!("{action}: {} record(s)", records.len());
        }
        Ok(records.len())
    }
}

fn validate(actions: &[Action]) -> Result<(), HarvestError> {
    if actions.is_empty() {
        return Err(HarvestError::Config("empty action sequence".to_string()));
    }
    for (i, action) in actions.iter().enumerate() {
        match action {
            Action::Split if i != 0 => {
                return Err(HarvestError::Config(
                    "split must be the first action of a sequence".to_string(),
                ));
            }
            Action::Save { .. } if i != actions.len() - 1 => {
                return Err(HarvestError::Config(
                    "save must be the last action of a sequence".to_string(),
                ));
            }
            _ => {}
        }
    }
    if !matches!(actions.last(), Some(Action::Save { .. })) {
        return Err(HarvestError::Config(
            "a sequence must end with a save action".to_string(),
        ));
    }
    Ok(())
}
