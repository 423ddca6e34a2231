//! Workers and the controller loop.
//!
//! One worker handles one provider for one cycle iteration: it tries the
//! configured action sequences in order until one of them completes
//! successfully. The controller keeps asking the [`Cycle`] for the next
//! endpoint, gates each launch on the worker pool semaphore, and records
//! every outcome back into the cycle — also when the worker failed.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use log::{info, warn};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;

use crate::action::ActionContext;
use crate::cycle::Cycle;
use crate::error::HarvestError;
use crate::harvesting::{
    FormatHarvesting, IdentifierListHarvesting, RecordListHarvesting, StaticPrefixHarvesting,
    StaticRecordListHarvesting,
};
use crate::oai::OaiClient;
use crate::overview::ScenarioKind;
use crate::provider::Provider;
use crate::scenario::Scenario;
use crate::sequence::ActionSequence;

/// Bounds the number of concurrently harvested endpoints.
#[derive(Clone)]
pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
}

impl WorkerPool {
    pub fn new(limit: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(limit.max(1))),
        }
    }

    /// Wait for a free slot. Permits are granted in request order.
    pub async fn acquire(&self) -> OwnedSemaphorePermit {
        self.semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("worker pool semaphore closed")
    }
}

/// One (provider, cycle-iteration) harvest.
pub struct Worker {
    pub provider: Provider,
    pub sequences: Vec<ActionSequence>,
    pub scenario: ScenarioKind,
    pub from: DateTime<Utc>,
}

impl Worker {
    /// Run the worker to completion. True when at least one action sequence
    /// saved at least one record.
    pub async fn run(&self, client: &OaiClient, ctx: &ActionContext) -> bool {
        if !self.provider.is_static() {
            match client.identify(&self.provider).await {
                Ok(name) => info!("harvesting {} ({name})", self.provider.base_url),
                Err(e) => warn!("{}: Identify failed: {e}", self.provider.base_url),
            }
        }

        for sequence in &self.sequences {
            let scenario = Scenario::new(&self.provider, sequence, ctx);

            let done = if self.provider.is_static() {
                let mut formats = StaticPrefixHarvesting::new(&self.provider);
                let prefixes = scenario.get_prefixes(&mut formats).await;
                if prefixes.is_empty() {
                    false
                } else {
                    let mut records = StaticRecordListHarvesting::new(&self.provider, prefixes);
                    scenario.list_records(&mut records).await
                }
            } else {
                let mut formats = FormatHarvesting::new(client, &self.provider);
                let prefixes = scenario.get_prefixes(&mut formats).await;
                if prefixes.is_empty() {
                    false
                } else {
                    match self.scenario {
                        ScenarioKind::ListIdentifiers => {
                            let mut identifiers = IdentifierListHarvesting::new(
                                client,
                                &self.provider,
                                prefixes,
                                self.from,
                            );
                            scenario.list_identifiers(&mut identifiers).await
                        }
                        ScenarioKind::ListRecords => {
                            let mut records = RecordListHarvesting::new(
                                client,
                                &self.provider,
                                prefixes,
                                self.from,
                            );
                            scenario.list_records(&mut records).await
                        }
                    }
                }
            };

            // the first sequence that completes ends the worker
            if done {
                return true;
            }
        }
        false
    }
}

/// Outcome tally of a controller run.
#[derive(Debug, Default, Clone, Copy)]
pub struct CycleSummary {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Set when an overview flush failed; the run keeps going but exits
    /// with the persistence status.
    pub persistence_failure: bool,
}

/// Run a full cycle: dispense endpoints until the cycle is exhausted,
/// harvesting up to `properties.workers` endpoints concurrently.
pub async fn run_cycle(
    providers: &[Provider],
    sequences: &[ActionSequence],
    cycle: Arc<Mutex<Cycle>>,
    client: Arc<OaiClient>,
    ctx: ActionContext,
) -> Result<CycleSummary, HarvestError> {
    let (limit, scenario) = {
        let mut guard = cycle.lock().unwrap();
        // endpoints are created on first appearance in the configuration
        for provider in providers {
            guard.register(&provider.base_url, provider.group.as_deref());
        }
        let props = guard.properties();
        (props.workers, props.scenario)
    };

    let pool = WorkerPool::new(limit);
    let mut summary = CycleSummary::default();
    let mut tasks: JoinSet<(bool, Result<(), HarvestError>)> = JoinSet::new();

    loop {
        let endpoint = {
            let mut guard = cycle.lock().unwrap();
            guard.next(Utc::now())
        };
        let Some(endpoint) = endpoint else {
            break;
        };

        let Some(provider) = providers.iter().find(|p| p.base_url == endpoint.uri) else {
            warn!("{}: endpoint has no configured provider, skipping", endpoint.uri);
            summary.skipped += 1;
            continue;
        };

        let (harvest, from) = {
            let guard = cycle.lock().unwrap();
            (guard.do_harvest(&endpoint), guard.request_date(&endpoint))
        };
        if !harvest {
            info!("{}: not eligible in this cycle", endpoint.uri);
            summary.skipped += 1;
            continue;
        }

        summary.attempted += 1;
        info!("{}: attempt started", endpoint.uri);

        let permit = pool.acquire().await;
        let worker = Worker {
            provider: provider.clone(),
            sequences: sequences.to_vec(),
            scenario,
            from,
        };
        let cycle = Arc::clone(&cycle);
        let client = Arc::clone(&client);
        let ctx = ctx.clone();
        tasks.spawn(async move {
            let success = worker.run(&client, &ctx).await;
            let persisted = {
                let mut guard = cycle.lock().unwrap();
                guard.record_attempt(&worker.provider.base_url, success, Utc::now())
            };
            drop(permit);
            (success, persisted)
        });
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((success, persisted)) => {
                if success {
                    summary.succeeded += 1;
                } else {
                    summary.failed += 1;
                }
                if persisted.is_err() {
                    summary.persistence_failure = true;
                }
            }
            Err(e) => {
                warn!("worker task aborted: {e}");
                summary.failed += 1;
            }
        }
    }

    Ok(summary)
}

/// Targeted run of a single endpoint.
pub async fn run_endpoint(
    providers: &[Provider],
    sequences: &[ActionSequence],
    cycle: Arc<Mutex<Cycle>>,
    client: Arc<OaiClient>,
    ctx: ActionContext,
    uri: &str,
    group: Option<&str>,
) -> Result<CycleSummary, HarvestError> {
    let uri = crate::provider::normalize_base_url(uri)?;
    let provider = providers
        .iter()
        .find(|p| p.base_url == uri)
        .cloned()
        .ok_or_else(|| HarvestError::Config(format!("no configured provider for {uri}")))?;

    let (endpoint, scenario) = {
        let mut guard = cycle.lock().unwrap();
        let endpoint = guard.next_for(&uri, group);
        (endpoint, guard.properties().scenario)
    };

    let mut summary = CycleSummary::default();
    let (harvest, from) = {
        let guard = cycle.lock().unwrap();
        (guard.do_harvest(&endpoint), guard.request_date(&endpoint))
    };
    if !harvest {
        info!("{uri}: not eligible in this cycle");
        summary.skipped += 1;
        return Ok(summary);
    }

    summary.attempted += 1;
    info!("{uri}: attempt started");
    let worker = Worker {
        provider,
        sequences: sequences.to_vec(),
        scenario,
        from,
    };
    let success = worker.run(&client, &ctx).await;
    if success {
        summary.succeeded += 1;
    } else {
        summary.failed += 1;
    }
    let persisted = {
        let mut guard = cycle.lock().unwrap();
        guard.record_attempt(&uri, success, Utc::now())
    };
    if let Err(e) = persisted {
        summary.persistence_failure = true;
        return Err(e);
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn pool_never_exceeds_its_limit() {
        let pool = WorkerPool::new(2);
        let running = Arc::new(AtomicUsize::new(0));
        let high_water = Arc::new(AtomicUsize::new(0));

        let mut tasks = JoinSet::new();
        for _ in 0..5 {
            let pool = pool.clone();
            let running = Arc::clone(&running);
            let high_water = Arc::clone(&high_water);
            tasks.spawn(async move {
                let permit = pool.acquire().await;
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                high_water.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                drop(permit);
            });
        }
        while tasks.join_next().await.is_some() {}

        assert!(high_water.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn permit_is_released_after_drop() {
        let pool = WorkerPool::new(1);
        let first = pool.acquire().await;
        drop(first);
        // acquiring again must not hang
        let _second = tokio::time::timeout(Duration::from_secs(1), pool.acquire())
            .await
            .expect("permit was not released");
    }
}
