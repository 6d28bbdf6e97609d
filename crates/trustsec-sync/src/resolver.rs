//! Detail resolver.
//!
//! Expands listing summaries into full resource bodies, one GET per id.
//! The requests run concurrently under the transport's connection limit and
//! each one succeeds or fails on its own.

use std::sync::Arc;

use futures::future::join_all;
use serde_json::Value;
use tracing::{debug, instrument, warn};
use trustsec_common::{ErsError, ErsResult, ErsTransport};

use crate::fetcher::{strip_link, Fetcher};
use crate::report::ItemFailure;
use crate::types::{Resource, ResourceSummary};

/// Resources that resolved and the ids that did not.
#[derive(Debug)]
pub struct Resolved<T> {
    pub resources: Vec<T>,
    pub failures: Vec<ItemFailure>,
}

impl<T> Resolved<T> {
    /// Returns true if every summary resolved.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

impl<T> Default for Resolved<T> {
    fn default() -> Self {
        Self {
            resources: Vec::new(),
            failures: Vec::new(),
        }
    }
}

/// Fetches full bodies for listed resources.
#[derive(Clone)]
pub struct DetailResolver {
    transport: Arc<dyn ErsTransport>,
}

impl DetailResolver {
    pub fn new(transport: Arc<dyn ErsTransport>) -> Self {
        Self { transport }
    }

    /// Resolve every summary; failures are isolated per id.
    ///
    /// Results keep the order of `summaries`.
    #[instrument(skip_all, fields(collection = %T::COLLECTION, count = summaries.len()))]
    pub async fn resolve_details<T: Resource>(&self, summaries: &[ResourceSummary]) -> Resolved<T> {
        let results = join_all(summaries.iter().map(|s| self.resolve_one::<T>(&s.id))).await;

        let mut resolved = Resolved::default();
        for (summary, result) in summaries.iter().zip(results) {
            match result {
                Ok(resource) => resolved.resources.push(resource),
                Err(error) => {
                    warn!(id = %summary.id, name = %summary.name, %error, "Failed to resolve detail");
                    resolved.failures.push(ItemFailure::new(summary.id.clone(), error));
                }
            }
        }

        debug!(
            resolved = resolved.resources.len(),
            failed = resolved.failures.len(),
            "Resolved details"
        );
        resolved
    }

    /// List a collection and resolve every member.
    ///
    /// A failed listing is fatal; failed details are reported per id.
    pub async fn fetch_resolved<T: Resource>(&self, fetcher: &Fetcher) -> ErsResult<Resolved<T>> {
        let summaries = fetcher.fetch_all(T::COLLECTION).await?;
        Ok(self.resolve_details::<T>(&summaries).await)
    }

    async fn resolve_one<T: Resource>(&self, id: &str) -> ErsResult<T> {
        let path = T::COLLECTION.item_path(id);
        let response = self.transport.get(&path).await?;
        if !response.is_success() {
            return Err(ErsError::rejection(response.status, response.error_message()));
        }
        decode_detail(&path, T::COLLECTION.object_name(), response.body)
    }
}

fn decode_detail<T: Resource>(path: &str, object_name: &str, mut body: Value) -> ErsResult<T> {
    let mut object = body
        .get_mut(object_name)
        .map(Value::take)
        .ok_or_else(|| ErsError::decode(path, format!("missing {} envelope", object_name)))?;
    strip_link(&mut object);
    serde_json::from_value(object).map_err(|e| ErsError::decode(path, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Tag;
    use serde_json::json;

    #[test]
    fn test_decode_detail() {
        let body = json!({
            "Sgt": {
                "id": "t1",
                "name": "Guests",
                "value": 6,
                "generationId": "0",
                "link": { "rel": "self" }
            }
        });
        let tag: Tag = decode_detail("/ers/config/sgt/t1", "Sgt", body).unwrap();
        assert_eq!(tag.name, "Guests");
        assert_eq!(tag.value, 6);
    }

    #[test]
    fn test_decode_detail_wrong_envelope() {
        let result: ErsResult<Tag> = decode_detail("/x", "Sgt", json!({ "Sgacl": {} }));
        assert!(matches!(result, Err(ErsError::Decode { .. })));
    }

    #[test]
    fn test_decode_detail_bad_body() {
        let result: ErsResult<Tag> = decode_detail("/x", "Sgt", json!({ "Sgt": { "name": 1 } }));
        assert!(matches!(result, Err(ErsError::Decode { .. })));
    }
}
