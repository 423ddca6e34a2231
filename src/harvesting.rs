//! Harvesting strategies: stateful iterators over a provider.
//!
//! Every strategy walks the same state machine:
//!
//! ```text
//! READY ──▶ REQUESTING ──▶ PARSING ──▶ HAS_MORE ─┐
//!               ▲                         │       │
//!               └─────────────────────────┘       ▼
//!                                           DONE / FAILED
//! ```
//!
//! `DONE` and `FAILED` are absorbing. The scenario engine only ever calls
//! `request` / `process_response` / `next` in that order, so strategies keep
//! their protocol bookkeeping (prefix cursor, resumption token, pending
//! identifiers) private.
//!
//! Failures never propagate out of a strategy as errors: a failed page stops
//! pagination for its prefix and the cursor moves on, which is why every
//! method surfaces a bool. Whether the harvest as a whole succeeded is
//! decided by the scenario from the number of records actually saved.

use std::collections::VecDeque;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{error, info, warn};

use crate::error::HarvestError;
use crate::models::Record;
use crate::oai::{ListPage, OaiClient};
use crate::provider::Provider;
use crate::xml;

/// Strategy state. `Done` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Ready,
    Requesting,
    Parsing,
    HasMore,
    Done,
    Failed,
}

/// What a strategy yields: metadata prefixes or records.
#[derive(Debug, Clone)]
pub enum Harvested {
    Prefix(String),
    Record(Record),
}

#[async_trait]
pub trait Harvesting: Send {
    /// Perform the next protocol call. False once the strategy is exhausted
    /// or failed.
    async fn request(&mut self) -> bool;

    /// Parse the response populated by the last `request`.
    fn process_response(&mut self) -> bool;

    /// The next parsed item, if any. For identifier-based harvesting this is
    /// where the per-identifier `GetRecord` happens.
    async fn next(&mut self) -> Option<Harvested>;

    /// True when every item of the current response has been handed out.
    fn fully_parsed(&self) -> bool;

    /// Resumption token of the current page, if the provider returned one.
    fn resumption_token(&self) -> Option<String>;

    fn phase(&self) -> Phase;
}

fn log_page_failure(provider: &Provider, prefix: &str, err: &HarvestError) {
    if err.is_transient() {
        warn!("{} [{prefix}]: {err}", provider.base_url);
    } else {
        error!("{} [{prefix}]: {err}", provider.base_url);
    }
}

// ───────────────────────────────────────────────────────────────────────
// Live strategies
// ───────────────────────────────────────────────────────────────────────

/// One `ListMetadataFormats` call, yielding prefix strings.
pub struct FormatHarvesting<'a> {
    client: &'a OaiClient,
    provider: &'a Provider,
    response: Option<Vec<String>>,
    items: VecDeque<String>,
    phase: Phase,
}

impl<'a> FormatHarvesting<'a> {
    pub fn new(client: &'a OaiClient, provider: &'a Provider) -> Self {
        Self {
            client,
            provider,
            response: None,
            items: VecDeque::new(),
            phase: Phase::Ready,
        }
    }
}

#[async_trait]
impl Harvesting for FormatHarvesting<'_> {
    async fn request(&mut self) -> bool {
        if self.phase != Phase::Ready {
            return false;
        }
        self.phase = Phase::Requesting;
        match self.client.list_metadata_formats(self.provider).await {
            Ok(prefixes) => {
                self.response = Some(prefixes);
                self.phase = Phase::Parsing;
                true
            }
            Err(e) => {
                log_page_failure(self.provider, "ListMetadataFormats", &e);
                self.phase = Phase::Failed;
                false
            }
        }
    }

    fn process_response(&mut self) -> bool {
        match self.response.take() {
            Some(prefixes) => {
                self.items = prefixes.into();
                self.phase = Phase::Done;
                true
            }
            None => false,
        }
    }

    async fn next(&mut self) -> Option<Harvested> {
        self.items.pop_front().map(Harvested::Prefix)
    }

    fn fully_parsed(&self) -> bool {
        self.items.is_empty()
    }

    fn resumption_token(&self) -> Option<String> {
        None
    }

    fn phase(&self) -> Phase {
        self.phase
    }
}

/// Paged `ListRecords`, yielding one envelope record per response.
pub struct RecordListHarvesting<'a> {
    client: &'a OaiClient,
    provider: &'a Provider,
    prefixes: Vec<String>,
    from: DateTime<Utc>,
    cursor: usize,
    token: Option<String>,
    page: Option<ListPage>,
    items: VecDeque<Record>,
    any_page_ok: bool,
    any_page_failed: bool,
    phase: Phase,
}

impl<'a> RecordListHarvesting<'a> {
    pub fn new(
        client: &'a OaiClient,
        provider: &'a Provider,
        prefixes: Vec<String>,
        from: DateTime<Utc>,
    ) -> Self {
        Self {
            client,
            provider,
            prefixes,
            from,
            cursor: 0,
            token: None,
            page: None,
            items: VecDeque::new(),
            any_page_ok: false,
            any_page_failed: false,
            phase: Phase::Ready,
        }
    }

    fn finish(&mut self) -> bool {
        self.phase = if self.any_page_failed && !self.any_page_ok {
            Phase::Failed
        } else {
            Phase::Done
        };
        false
    }
}

#[async_trait]
impl Harvesting for RecordListHarvesting<'_> {
    async fn request(&mut self) -> bool {
        if matches!(self.phase, Phase::Done | Phase::Failed) {
            return false;
        }
        loop {
            let Some(prefix) = self.prefixes.get(self.cursor) else {
                return self.finish();
            };
            self.phase = Phase::Requesting;
            match self
                .client
                .list_records(self.provider, prefix, self.from, self.token.as_deref())
                .await
            {
                Ok(page) => {
                    info!(
                        "{} [{prefix}]: ListRecords page{}",
                        self.provider.base_url,
                        if self.token.is_some() { " (resumed)" } else { "" }
                    );
                    self.any_page_ok = true;
                    self.page = Some(page);
                    self.phase = Phase::Parsing;
                    return true;
                }
                Err(e) => {
                    // the page failed; stop paginating this prefix, go on
                    // with the next one
                    log_page_failure(self.provider, prefix, &e);
                    self.any_page_failed = true;
                    self.cursor += 1;
                    self.token = None;
                }
            }
        }
    }

    fn process_response(&mut self) -> bool {
        let Some(page) = self.page.take() else {
            return false;
        };
        let prefix = match self.prefixes.get(self.cursor) {
            Some(prefix) => prefix.clone(),
            None => return false,
        };
        if let Some(body) = page.body {
            self.items
                .push_back(Record::envelope(&prefix, body, &self.provider.name));
        }
        match page.resumption_token {
            Some(token) => self.token = Some(token),
            None => {
                self.cursor += 1;
                self.token = None;
            }
        }
        self.phase = Phase::HasMore;
        true
    }

    async fn next(&mut self) -> Option<Harvested> {
        self.items.pop_front().map(Harvested::Record)
    }

    fn fully_parsed(&self) -> bool {
        self.items.is_empty()
    }

    fn resumption_token(&self) -> Option<String> {
        self.token.clone()
    }

    fn phase(&self) -> Phase {
        self.phase
    }
}

/// Paged `ListIdentifiers`, then one `GetRecord` per identifier.
pub struct IdentifierListHarvesting<'a> {
    client: &'a OaiClient,
    provider: &'a Provider,
    prefixes: Vec<String>,
    from: DateTime<Utc>,
    cursor: usize,
    token: Option<String>,
    page: Option<ListPage>,
    /// `(prefix, identifier)` pairs still to be fetched individually.
    pending: VecDeque<(String, String)>,
    any_page_ok: bool,
    any_page_failed: bool,
    phase: Phase,
}

impl<'a> IdentifierListHarvesting<'a> {
    pub fn new(
        client: &'a OaiClient,
        provider: &'a Provider,
        prefixes: Vec<String>,
        from: DateTime<Utc>,
    ) -> Self {
        Self {
            client,
            provider,
            prefixes,
            from,
            cursor: 0,
            token: None,
            page: None,
            pending: VecDeque::new(),
            any_page_ok: false,
            any_page_failed: false,
            phase: Phase::Ready,
        }
    }

    fn finish(&mut self) -> bool {
        self.phase = if self.any_page_failed && !self.any_page_ok {
            Phase::Failed
        } else {
            Phase::Done
        };
        false
    }
}

#[async_trait]
impl Harvesting for IdentifierListHarvesting<'_> {
    async fn request(&mut self) -> bool {
        if matches!(self.phase, Phase::Done | Phase::Failed) {
            return false;
        }
        loop {
            let Some(prefix) = self.prefixes.get(self.cursor) else {
                return self.finish();
            };
            self.phase = Phase::Requesting;
            match self
                .client
                .list_identifiers(self.provider, prefix, self.from, self.token.as_deref())
                .await
            {
                Ok(page) => {
                    info!("{} [{prefix}]: ListIdentifiers page", self.provider.base_url);
                    self.any_page_ok = true;
                    self.page = Some(page);
                    self.phase = Phase::Parsing;
                    return true;
                }
                Err(e) => {
                    log_page_failure(self.provider, prefix, &e);
                    self.any_page_failed = true;
                    self.cursor += 1;
                    self.token = None;
                }
            }
        }
    }

    fn process_response(&mut self) -> bool {
        let Some(page) = self.page.take() else {
            return false;
        };
        let prefix = match self.prefixes.get(self.cursor) {
            Some(prefix) => prefix.clone(),
            None => return false,
        };
        if let Some(body) = page.body {
            match xml::header_identifiers(&body) {
                Ok(ids) => {
                    for id in ids {
                        self.pending.push_back((prefix.clone(), id));
                    }
                }
                Err(e) => {
                    error!("{} [{prefix}]: unreadable identifier list: {e}", self.provider.base_url);
                    self.any_page_failed = true;
                    self.cursor += 1;
                    self.token = None;
                    self.phase = Phase::HasMore;
                    return true;
                }
            }
        }
        match page.resumption_token {
            Some(token) => self.token = Some(token),
            None => {
                self.cursor += 1;
                self.token = None;
            }
        }
        self.phase = Phase::HasMore;
        true
    }

    async fn next(&mut self) -> Option<Harvested> {
        while let Some((prefix, id)) = self.pending.pop_front() {
            match self.client.get_record(self.provider, &id, &prefix).await {
                Ok(body) => match xml::record_elements(&body) {
                    Ok(parts) => match parts.into_iter().next() {
                        Some(doc) => {
                            return Some(Harvested::Record(Record::single(
                                id,
                                prefix,
                                doc,
                                &self.provider.name,
                            )));
                        }
                        None => {
                            warn!("{}: GetRecord {id} returned no record", self.provider.base_url)
                        }
                    },
                    Err(e) => warn!("{}: GetRecord {id} unreadable: {e}", self.provider.base_url),
                },
                Err(e) => log_page_failure(self.provider, &prefix, &e),
            }
        }
        None
    }

    fn fully_parsed(&self) -> bool {
        self.pending.is_empty()
    }

    fn resumption_token(&self) -> Option<String> {
        self.token.clone()
    }

    fn phase(&self) -> Phase {
        self.phase
    }
}

// ───────────────────────────────────────────────────────────────────────
// Static strategies
// ───────────────────────────────────────────────────────────────────────

fn read_archive(provider: &Provider) -> Result<String, HarvestError> {
    let path = provider.archive.as_ref().ok_or_else(|| {
        HarvestError::Config(format!("provider {} has no archive", provider.name))
    })?;
    std::fs::read_to_string(path).map_err(|e| {
        HarvestError::Content(format!("cannot read archive {}: {e}", path.display()))
    })
}

/// Prefix discovery over a static repository archive; no network, no
/// pagination.
pub struct StaticPrefixHarvesting<'a> {
    provider: &'a Provider,
    archive: Option<String>,
    items: VecDeque<String>,
    phase: Phase,
}

impl<'a> StaticPrefixHarvesting<'a> {
    pub fn new(provider: &'a Provider) -> Self {
        Self {
            provider,
            archive: None,
            items: VecDeque::new(),
            phase: Phase::Ready,
        }
    }
}

#[async_trait]
impl Harvesting for StaticPrefixHarvesting<'_> {
    async fn request(&mut self) -> bool {
        if self.phase != Phase::Ready {
            return false;
        }
        self.phase = Phase::Requesting;
        match read_archive(self.provider) {
            Ok(text) => {
                self.archive = Some(text);
                self.phase = Phase::Parsing;
                true
            }
            Err(e) => {
                error!("{}: {e}", self.provider.name);
                self.phase = Phase::Failed;
                false
            }
        }
    }

    fn process_response(&mut self) -> bool {
        let Some(archive) = self.archive.take() else {
            return false;
        };
        let mut prefixes = Vec::new();
        if let Ok(formats) = xml::elements_by_local_name(&archive, b"metadataFormat") {
            for format in formats {
                if let Some(prefix) = xml::first_text(&format, b"metadataPrefix") {
                    prefixes.push(prefix);
                }
            }
        }
        if prefixes.is_empty() {
            // archives without a format list still declare prefixes on
            // their ListRecords sections
            if let Ok(attrs) = xml::attribute_values(&archive, b"ListRecords", b"metadataPrefix") {
                prefixes = attrs;
            }
        }
        prefixes.dedup();
        self.items = prefixes.into();
        self.phase = Phase::Done;
        true
    }

    async fn next(&mut self) -> Option<Harvested> {
        self.items.pop_front().map(Harvested::Prefix)
    }

    fn fully_parsed(&self) -> bool {
        self.items.is_empty()
    }

    fn resumption_token(&self) -> Option<String> {
        None
    }

    fn phase(&self) -> Phase {
        self.phase
    }
}

/// Record harvesting over a static repository archive: each `ListRecords`
/// section becomes one envelope, exactly as a live response would.
pub struct StaticRecordListHarvesting<'a> {
    provider: &'a Provider,
    prefixes: Vec<String>,
    cursor: usize,
    archive: Option<String>,
    items: VecDeque<Record>,
    phase: Phase,
}

impl<'a> StaticRecordListHarvesting<'a> {
    pub fn new(provider: &'a Provider, prefixes: Vec<String>) -> Self {
        Self {
            provider,
            prefixes,
            cursor: 0,
            archive: None,
            items: VecDeque::new(),
            phase: Phase::Ready,
        }
    }
}

#[async_trait]
impl Harvesting for StaticRecordListHarvesting<'_> {
    async fn request(&mut self) -> bool {
        if matches!(self.phase, Phase::Done | Phase::Failed) {
            return false;
        }
        if self.cursor >= self.prefixes.len() {
            self.phase = Phase::Done;
            return false;
        }
        self.phase = Phase::Requesting;
        if self.archive.is_none() {
            match read_archive(self.provider) {
                Ok(text) => self.archive = Some(text),
                Err(e) => {
                    error!("{}: {e}", self.provider.name);
                    self.phase = Phase::Failed;
                    return false;
                }
            }
        }
        self.phase = Phase::Parsing;
        true
    }

    fn process_response(&mut self) -> bool {
        if self.phase != Phase::Parsing {
            return false;
        }
        let Some(archive) = self.archive.as_deref() else {
            return false;
        };
        let Some(prefix) = self.prefixes.get(self.cursor) else {
            return false;
        };
        match xml::element_with_attr(archive, b"ListRecords", b"metadataPrefix", prefix) {
            Ok(Some(section)) => {
                self.items
                    .push_back(Record::envelope(prefix, section, &self.provider.name));
            }
            Ok(None) => {
                warn!("{}: archive has no records for [{prefix}]", self.provider.name);
            }
            Err(e) => {
                error!("{}: unreadable archive: {e}", self.provider.name);
                self.phase = Phase::Failed;
                return false;
            }
        }
        self.cursor += 1;
        self.phase = if self.cursor < self.prefixes.len() {
            Phase::HasMore
        } else {
            Phase::Done
        };
        true
    }

    async fn next(&mut self) -> Option<Harvested> {
        self.items.pop_front().map(Harvested::Record)
    }

    fn fully_parsed(&self) -> bool {
        self.items.is_empty()
    }

    fn resumption_token(&self) -> Option<String> {
        None
    }

    fn phase(&self) -> Phase {
        self.phase
    }
}
