//! Address enrichment with a bounded worker pool
//!
//! Each batch spins up `min(max_workers, jobs)` workers that pull jobs from a
//! shared queue. Results travel back tagged with their input index and are
//! written into place, so the output keeps the input order regardless of
//! completion order. A failed lookup degrades that one row to
//! [`Address::Unavailable`]; it never fails the batch.
//!
//! Batches do not observe cancellation tokens. Dropping the `enrich` future
//! aborts the batch's workers along with any lookups they have in flight.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, instrument, warn};

use crate::error::ClientResult;
use crate::model::{Address, EnrichedResource, Resource};

/// Looks up the live address of a guest
#[async_trait]
pub trait AddressResolver: Send + Sync {
    /// Address of a running guest
    async fn resolve_address(&self, resource: &Resource) -> ClientResult<Address>;
}

#[async_trait]
impl<T: AddressResolver + ?Sized> AddressResolver for Arc<T> {
    async fn resolve_address(&self, resource: &Resource) -> ClientResult<Address> {
        (**self).resolve_address(resource).await
    }
}

/// Bounded-concurrency enrichment
#[derive(Debug, Clone, Copy)]
pub struct Enricher {
    max_workers: usize,
}

impl Default for Enricher {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_WORKERS)
    }
}

impl Enricher {
    /// Default upper bound on concurrent lookups
    pub const DEFAULT_MAX_WORKERS: usize = 10;

    /// Pool of at most `max_workers` concurrent lookups (minimum 1)
    pub fn new(max_workers: usize) -> Self {
        Self {
            max_workers: max_workers.max(1),
        }
    }

    /// Configured upper bound
    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Attach an address to every row
    ///
    /// Only guests in `running` state are looked up; everything else is
    /// [`Address::Skipped`]. Output order equals input order.
    #[instrument(skip_all, fields(rows = resources.len()))]
    pub async fn enrich<R>(&self, resolver: Arc<R>, resources: Vec<Resource>) -> Vec<EnrichedResource>
    where
        R: AddressResolver + ?Sized + 'static,
    {
        let jobs: Vec<(usize, Resource)> = resources
            .iter()
            .enumerate()
            .filter(|(_, r)| r.is_running_guest())
            .map(|(i, r)| (i, r.clone()))
            .collect();

        let mut out: Vec<EnrichedResource> = resources
            .into_iter()
            .map(|resource| {
                let address = if resource.is_running_guest() {
                    // Overwritten by the worker result; stays if a worker dies
                    Address::Unavailable
                } else {
                    Address::Skipped
                };
                EnrichedResource { resource, address }
            })
            .collect();

        if jobs.is_empty() {
            return out;
        }

        let workers = self.max_workers.min(jobs.len());
        debug!(jobs = jobs.len(), workers, "starting enrichment batch");

        // Sized to the job count so queuing never waits on a worker
        let (job_tx, job_rx) = async_channel::bounded(jobs.len());
        for job in jobs {
            if job_tx.send(job).await.is_err() {
                break;
            }
        }
        job_tx.close();

        let (result_tx, mut result_rx) = mpsc::channel::<(usize, Address)>(out.len());
        // Aborts every worker if this future is dropped mid-batch
        let mut pool = JoinSet::new();
        for worker in 0..workers {
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            let resolver = Arc::clone(&resolver);
            pool.spawn(async move {
                while let Ok((index, resource)) = job_rx.recv().await {
                    let address = match resolver.resolve_address(&resource).await {
                        Ok(address) => address,
                        Err(err) => {
                            warn!(
                                worker,
                                resource = %resource.id,
                                error = %err,
                                "address lookup failed"
                            );
                            Address::Unavailable
                        }
                    };
                    if result_tx.send((index, address)).await.is_err() {
                        break;
                    }
                }
            });
        }
        // Channel closes once the last worker drops its sender
        drop(result_tx);

        while let Some((index, address)) = result_rx.recv().await {
            if let Some(row) = out.get_mut(index) {
                row.address = address;
            }
        }
        while let Some(joined) = pool.join_next().await {
            if let Err(err) = joined {
                warn!(error = %err, "enrichment worker did not finish");
            }
        }
        out
    }
}
