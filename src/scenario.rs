//! The scenario engine: drives one harvesting strategy to exhaustion for one
//! provider and one action sequence.
//!
//! A scenario succeeds when at least one record made it through the whole
//! action sequence; page and record failures along the way only shrink the
//! harvest, they never abort it.

use log::{debug, error, info};

use crate::action::ActionContext;
use crate::harvesting::{Harvested, Harvesting};
use crate::provider::Provider;
use crate::sequence::ActionSequence;

pub struct Scenario<'a> {
    provider: &'a Provider,
    sequence: &'a ActionSequence,
    ctx: &'a ActionContext,
}

impl<'a> Scenario<'a> {
    pub fn new(provider: &'a Provider, sequence: &'a ActionSequence, ctx: &'a ActionContext) -> Self {
        Self {
            provider,
            sequence,
            ctx,
        }
    }

    /// Prefixes offered by the provider, intersected with the sequence's
    /// input format and the provider's allow-list. An empty result means
    /// this sequence is not applicable and no record request is made.
    pub async fn get_prefixes(&self, harvesting: &mut dyn Harvesting) -> Vec<String> {
        let mut prefixes = Vec::new();
        while harvesting.request().await {
            if !harvesting.process_response() {
                break;
            }
            while let Some(item) = harvesting.next().await {
                if let Harvested::Prefix(prefix) = item {
                    if prefix == self.sequence.input.prefix
                        && self.provider.allows_prefix(&prefix)
                        && !prefixes.contains(&prefix)
                    {
                        prefixes.push(prefix);
                    }
                }
            }
        }
        debug!(
            "{}: {} matching prefix(es) for [{}]",
            self.provider.name,
            prefixes.len(),
            self.sequence.input.prefix
        );
        prefixes
    }

    /// ListIdentifiers scenario: one record at a time through the pipeline.
    pub async fn list_identifiers(&self, harvesting: &mut dyn Harvesting) -> bool {
        self.drive(harvesting).await
    }

    /// ListRecords scenario: whole envelopes through the pipeline, which
    /// must start with a split.
    pub async fn list_records(&self, harvesting: &mut dyn Harvesting) -> bool {
        self.drive(harvesting).await
    }

    async fn drive(&self, harvesting: &mut dyn Harvesting) -> bool {
        let mut saved = 0usize;
        while harvesting.request().await {
            if !harvesting.process_response() {
                break;
            }
            while let Some(item) = harvesting.next().await {
                let Harvested::Record(record) = item else {
                    continue;
                };
                let mut batch = vec![record];
                match self.sequence.run(&mut batch, self.ctx) {
                    Ok(count) => saved += count,
                    Err(e) => error!("{}: {e}", self.provider.name),
                }
            }
        }
        info!(
            "{}: {saved} record(s) saved for [{}]",
            self.provider.name, self.sequence.input.prefix
        );
        saved > 0
    }
}
