//! Bulk create and delete against one collection.
//!
//! Creation is two-phase: every record is submitted, then the collection is
//! re-listed and resolved so callers work with server-assigned ids rather
//! than create responses. Neither operation is transactional and nothing is
//! retried or rolled back.

use std::sync::Arc;

use futures::future::join_all;
use serde_json::json;
use tracing::{info, instrument, warn};
use trustsec_common::{Collection, ErsResponse, ErsResult, ErsTransport};

use crate::fetcher::Fetcher;
use crate::report::{BatchReport, ItemFailure, Outcome};
use crate::resolver::DetailResolver;
use crate::types::Resource;

/// ERS answers a duplicate name with 400 and this text in the message.
const DUPLICATE_MARKER: &str = "already exist";

/// Authoritative state after a create pass.
#[derive(Debug)]
pub struct Created<T> {
    /// Per-record submission outcomes
    pub report: BatchReport,
    /// Every resource now in the collection, with real ids
    pub resources: Vec<T>,
    /// Ids whose detail could not be resolved during reconciliation
    pub detail_failures: Vec<ItemFailure>,
}

/// Classify a create response.
pub fn classify_create(response: &ErsResponse) -> Outcome {
    if response.is_success() {
        return Outcome::Created;
    }
    let reason = response.error_message();
    if response.status == 409 || (response.status == 400 && reason.contains(DUPLICATE_MARKER)) {
        Outcome::AlreadyExists { reason }
    } else {
        Outcome::Rejected {
            status: response.status,
            reason,
        }
    }
}

/// Classify a delete response.
pub fn classify_delete(response: &ErsResponse) -> Outcome {
    if response.is_success() {
        Outcome::Deleted
    } else {
        Outcome::Rejected {
            status: response.status,
            reason: response.error_message(),
        }
    }
}

/// Create-all / delete-all over the shared transport.
#[derive(Clone)]
pub struct BulkSynchronizer {
    transport: Arc<dyn ErsTransport>,
    fetcher: Fetcher,
    resolver: DetailResolver,
}

impl BulkSynchronizer {
    pub fn new(fetcher: Fetcher) -> Self {
        let transport = Arc::clone(fetcher.transport());
        Self {
            resolver: DetailResolver::new(Arc::clone(&transport)),
            transport,
            fetcher,
        }
    }

    /// Submit every record without reconciling.
    #[instrument(skip_all, fields(collection = %T::COLLECTION, count = records.len()))]
    pub async fn submit_all<T: Resource>(&self, records: &[T]) -> BatchReport {
        let collection = T::COLLECTION;
        let mut report = BatchReport::new(collection);

        for record in records {
            let outcome = match serde_json::to_value(record) {
                Ok(object) => {
                    let body = json!({ collection.object_name(): object });
                    match self.transport.post(collection.path(), &body).await {
                        Ok(response) => classify_create(&response),
                        Err(error) => Outcome::Failed {
                            reason: error.to_string(),
                        },
                    }
                }
                Err(error) => Outcome::Failed {
                    reason: error.to_string(),
                },
            };

            match &outcome {
                Outcome::Created => info!(name = record.name(), "Created {}", collection),
                Outcome::AlreadyExists { reason } => {
                    info!(name = record.name(), %reason, "{} already exists", collection)
                }
                other => warn!(name = record.name(), outcome = %other, "Failed to create {}", collection),
            }
            report.push(record.name(), outcome);
        }
        report
    }

    /// Submit every record, then re-fetch the collection.
    ///
    /// Fails only if the reconciling listing fails.
    pub async fn create_all<T: Resource>(&self, records: &[T]) -> ErsResult<Created<T>> {
        let report = self.submit_all(records).await;
        let resolved = self.resolver.fetch_resolved::<T>(&self.fetcher).await?;

        info!(
            created = report.succeeded(),
            conflicts = report.conflicts(),
            failed = report.failed(),
            total = resolved.resources.len(),
            "Reconciled {}",
            T::COLLECTION
        );
        Ok(Created {
            report,
            resources: resolved.resources,
            detail_failures: resolved.failures,
        })
    }

    /// Delete every id concurrently; continues past failures.
    #[instrument(skip(self, ids), fields(count = ids.len()))]
    pub async fn delete_all(&self, collection: Collection, ids: &[String]) -> BatchReport {
        let results = join_all(ids.iter().map(|id| {
            let path = collection.item_path(id);
            async move { self.transport.delete(&path).await }
        }))
        .await;

        let mut report = BatchReport::new(collection);
        for (id, result) in ids.iter().zip(results) {
            let outcome = match result {
                Ok(response) => classify_delete(&response),
                Err(error) => Outcome::Failed {
                    reason: error.to_string(),
                },
            };
            if outcome.is_success() {
                info!(%id, "Deleted {}", collection);
            } else {
                warn!(%id, outcome = %outcome, "Failed to delete {}", collection);
            }
            report.push(id.clone(), outcome);
        }
        report
    }

    pub fn fetcher(&self) -> &Fetcher {
        &self.fetcher
    }

    pub fn resolver(&self) -> &DetailResolver {
        &self.resolver
    }
}
