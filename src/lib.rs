//! # oai-harvest
//!
//! **A batch OAI-PMH metadata harvester.**
//!
//! Given a set of remote OAI providers and a declarative list of
//! post-processing action sequences, `oai-harvest` concurrently retrieves
//! metadata records from each provider, transforms them, and writes them to
//! a local tree. Per-endpoint attempt/success history is tracked across runs
//! in an XML overview, so incremental and retry harvesting work between
//! cycles.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐ next()/doHarvest ┌────────────┐   permits    ┌─────────┐
//! │  Cycle    │◀───────────────▶│ Controller │─────────────▶│ Workers │
//! │ overview  │  recordAttempt  └────────────┘  (semaphore) └────┬────┘
//! └──────────┘                                                   │
//!                      ┌────────────────────────────────────────┘
//!                      ▼
//!               ┌────────────┐  prefixes/records  ┌──────────────────┐
//!               │  Scenario  │◀──────────────────│ Harvesting       │
//!               │  engine    │                    │ strategies (5)   │
//!               └─────┬──────┘                    │ live / static    │
//!                     ▼                           └──────────────────┘
//!               ┌────────────┐
//!               │  Actions   │  split → strip → transform → save
//!               └────────────┘
//! ```
//!
//! ## Data Flow
//!
//! 1. The **controller** asks the [`cycle`] for the next endpoint; the cycle
//!    skips endpoints attempted today and never dispenses one twice in a
//!    process lifetime.
//! 2. Each endpoint is harvested by a **worker** ([`worker`]), gated by the
//!    pool semaphore, which tries the configured action sequences in order
//!    until one succeeds.
//! 3. A **scenario** ([`scenario`]) first lists the endpoint's metadata
//!    prefixes, then drives a record **harvesting strategy**
//!    ([`harvesting`]) — paged `ListRecords`, `ListIdentifiers`+`GetRecord`,
//!    or their static-archive equivalents.
//! 4. Every harvested record or envelope runs through the **action
//!    pipeline** ([`action`], [`sequence`]) and lands in the save tree as
//!    `<output>/<provider>/<prefix>/<id>.xml`.
//! 5. The outcome is recorded in the [`overview`] file: `attempted` moves on
//!    every attempt, `harvested` only on success, which is what incremental
//!    and retry cycles key on.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration: providers, sequences, output tree |
//! | [`models`] | `Record` and metadata format descriptors |
//! | [`xml`] | namespace-agnostic element capture over OAI documents |
//! | [`overview`] | persistent endpoint overview (XML) |
//! | [`cycle`] | cycle state machine: eligibility, request dates, outcomes |
//! | [`provider`] | live/static provider values with URL identity |
//! | [`oai`] | OAI-PMH verbs over HTTP, resumption tokens |
//! | [`harvesting`] | the five harvesting strategies |
//! | [`scenario`] | scenario engine feeding the action pipeline |
//! | [`action`] | Split, Strip, Transform, Save |
//! | [`sequence`] | typed action chains |
//! | [`transform`] | stylesheet engine seam (external XSLT processor) |
//! | [`worker`] | worker, pool semaphore, controller loop |
//! | [`logging`] | terminal logger setup |

pub mod action;
pub mod config;
pub mod cycle;
pub mod error;
pub mod harvesting;
pub mod logging;
pub mod models;
pub mod oai;
pub mod overview;
pub mod provider;
pub mod scenario;
pub mod sequence;
pub mod transform;
pub mod worker;
pub mod xml;
