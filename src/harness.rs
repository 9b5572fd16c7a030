use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{info, warn};

use crate::source::{OrderSource, Submitter};
use crate::storage::{PickupOutcome, PlaceOutcome, StorageManager};

const SWEEP_INTERVAL_S: f64 = 1.0;
const DEFAULT_MAX_SUBMIT_ATTEMPTS: u32 = 3;
const SUBMIT_BACKOFF_BASE_MS: u64 = 200;

pub struct HarnessConfig {
    pub rate: f64, // orders per second
    pub pickup_min_s: u64,
    pub pickup_max_s: u64,
    pub rng_seed: Option<u64>,
    pub max_submit_attempts: u32,
}

impl HarnessConfig {
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.rate > 0.0, "rate must be > 0");
        anyhow::ensure!(
            self.pickup_min_s <= self.pickup_max_s,
            "pickup-min must be <= pickup-max"
        );
        Ok(())
    }
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            rate: 2.0,
            pickup_min_s: 4,
            pickup_max_s: 8,
            rng_seed: None,
            max_submit_attempts: DEFAULT_MAX_SUBMIT_ATTEMPTS,
        }
    }
}

pub struct ExecutionHarness {
    storage: Arc<StorageManager>,
    source: Arc<dyn OrderSource>,
    submitter: Arc<dyn Submitter>,
    config: HarnessConfig,
}

impl ExecutionHarness {
    pub fn new(
        storage: Arc<StorageManager>,
        source: Arc<dyn OrderSource>,
        submitter: Arc<dyn Submitter>,
        config: HarnessConfig,
    ) -> Self {
        Self {
            storage,
            source,
            submitter,
            config,
        }
    }

    // drains the order source, waits out every pickup, sweeps, submits. blocks the caller.
    pub fn run(&self) -> Result<()> {
        self.config.validate()?;

        let stop = Arc::new(AtomicBool::new(false));
        let sweeper = self.spawn_sweeper(stop.clone());

        let seed = self.config.rng_seed.unwrap_or_else(|| rand::rng().random());
        let mut rng = StdRng::seed_from_u64(seed);

        let inter_arrival = Duration::from_secs_f64(1.0 / self.config.rate);
        let mut pickup_handles: Vec<JoinHandle<()>> = Vec::new();
        let mut admitted_count = 0u64;
        let mut rejected_count = 0u64;

        // one-ahead lookahead so the inter-arrival sleep only happens
        // between orders, never after the last one
        let mut next_item = self.source.next();
        while let Some(item) = next_item.take() {
            match item {
                Err(err) => {
                    rejected_count += 1;
                    warn!(error = %err, "dropping invalid order record");
                }
                Ok(new_order) => {
                    let id = new_order.id.clone();
                    match self.storage.place(new_order) {
                        Ok(PlaceOutcome::Admitted(zone)) => {
                            admitted_count += 1;
                            info!(order_id = %id, zone = zone.as_str(), "order placed");
                            let delay_s = if self.config.pickup_min_s == self.config.pickup_max_s {
                                self.config.pickup_min_s
                            } else {
                                rng.random_range(
                                    self.config.pickup_min_s..=self.config.pickup_max_s,
                                )
                            };
                            pickup_handles.push(self.spawn_pickup(id, delay_s));
                        }
                        Err(err) => {
                            rejected_count += 1;
                            warn!(order_id = %id, error = %err, "dropping invalid order record");
                        }
                    }
                }
            }

            next_item = self.source.next();
            if next_item.is_some() {
                thread::sleep(inter_arrival);
            }
        }

        info!(
            admitted = admitted_count,
            rejected = rejected_count,
            "order source exhausted, waiting for outstanding pickups"
        );

        for handle in pickup_handles {
            let _ = handle.join();
        }

        stop.store(true, Ordering::Release);
        let _ = sweeper.join();

        // final sweep before submission catches anything the periodic
        // sweeper hadn't gotten to yet
        self.storage.expire_sweep();
        self.storage.log_snapshot();

        let snapshot = self.storage.ledger().snapshot();
        let summary = crate::ledger::summarize(&snapshot);
        info!(
            placed = summary.placed,
            moved = summary.moved,
            picked_up = summary.picked_up,
            discarded = summary.discarded,
            "run summary"
        );

        self.submit_with_retry(&snapshot)
    }

    fn spawn_sweeper(&self, stop: Arc<AtomicBool>) -> JoinHandle<()> {
        let storage = self.storage.clone();
        thread::spawn(move || {
            while !stop.load(Ordering::Acquire) {
                thread::sleep(Duration::from_secs_f64(SWEEP_INTERVAL_S));
                if stop.load(Ordering::Acquire) {
                    break;
                }
                storage.expire_sweep();
            }
        })
    }

    fn spawn_pickup(&self, order_id: String, delay_s: u64) -> JoinHandle<()> {
        let storage = self.storage.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_secs(delay_s));
            match storage.pickup(&order_id) {
                PickupOutcome::Picked(order) => {
                    info!(order_id = %order.id, zone = order.zone.as_str(), "order picked up");
                }
                PickupOutcome::NotFound => {
                    // the order may already have been discarded by expiry,
                    // not an error, the DISCARD already happened in the ledger
                    info!(order_id = %order_id, "pickup missed order (expired or already discarded)");
                }
            }
        })
    }

    fn submit_with_retry(&self, ledger: &[crate::ledger::Action]) -> Result<()> {
        let mut attempt = 1;
        loop {
            match self.submitter.submit(ledger) {
                Ok(()) => return Ok(()),
                Err(err) if attempt < self.config.max_submit_attempts => {
                    warn!(attempt, error = %err, "submit failed, retrying");
                    let backoff = Duration::from_millis(SUBMIT_BACKOFF_BASE_MS * 2u64.pow(attempt - 1));
                    thread::sleep(backoff);
                    attempt += 1;
                }
                Err(err) => {
                    return Err(crate::error::KitchenError::SubmitFailed {
                        attempts: attempt,
                        source: err,
                    }
                    .into());
                }
            }
        }
    }
}
