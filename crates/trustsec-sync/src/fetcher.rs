//! Paginated collection fetcher.
//!
//! The first page is requested alone to learn the total; every remaining
//! page is then requested at once and the transport's connection limiter
//! decides how many are actually on the wire. Any failed page fails the
//! whole fetch, since callers act on the complete set.

use std::sync::Arc;

use futures::future::try_join_all;
use serde_json::Value;
use tracing::{debug, instrument};
use trustsec_common::endpoints::{envelope, REST_PAGE_SIZE_MAX};
use trustsec_common::{Collection, ErsError, ErsResult, ErsTransport};

use crate::types::ResourceSummary;

/// Remove the `link` attribute ERS attaches to every object.
pub fn strip_link(object: &mut Value) {
    if let Some(map) = object.as_object_mut() {
        map.remove(envelope::LINK);
    }
}

/// One decoded listing page.
struct Page {
    total: usize,
    resources: Vec<ResourceSummary>,
}

/// Retrieves complete collections through a shared transport.
#[derive(Clone)]
pub struct Fetcher {
    transport: Arc<dyn ErsTransport>,
    page_size: usize,
}

impl Fetcher {
    /// Creates a fetcher with the platform maximum page size.
    pub fn new(transport: Arc<dyn ErsTransport>) -> Self {
        Self::with_page_size(transport, REST_PAGE_SIZE_MAX)
    }

    /// Creates a fetcher with an explicit page size (clamped to 1..=100).
    pub fn with_page_size(transport: Arc<dyn ErsTransport>, page_size: usize) -> Self {
        Self {
            transport,
            page_size: page_size.clamp(1, REST_PAGE_SIZE_MAX),
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn transport(&self) -> &Arc<dyn ErsTransport> {
        &self.transport
    }

    /// Fetch every summary of `collection`.
    #[instrument(skip(self), fields(page_size = self.page_size))]
    pub async fn fetch_all(&self, collection: Collection) -> ErsResult<Vec<ResourceSummary>> {
        let first = self.fetch_page(collection, 1).await?;
        let pages = first.total.div_ceil(self.page_size);
        debug!(total = first.total, pages, "Fetched first page");

        let mut resources = first.resources;
        if pages > 1 {
            let rest = try_join_all((2..=pages).map(|page| self.fetch_page(collection, page))).await?;
            for page in rest {
                resources.extend(page.resources);
            }
        }

        debug!(count = resources.len(), "Fetched {}", collection);
        Ok(resources)
    }

    async fn fetch_page(&self, collection: Collection, page: usize) -> ErsResult<Page> {
        let path = collection.page_path(self.page_size, page);
        let response = self.transport.get(&path).await?;
        if response.status != 200 {
            return Err(ErsError::bad_status(path, response.status));
        }
        decode_page(&path, response.body)
    }
}

fn decode_page(path: &str, mut body: Value) -> ErsResult<Page> {
    let mut result = body
        .get_mut(envelope::SEARCH_RESULT)
        .map(Value::take)
        .ok_or_else(|| ErsError::decode(path, "missing SearchResult"))?;

    let total = result
        .get(envelope::TOTAL)
        .and_then(Value::as_u64)
        .ok_or_else(|| ErsError::decode(path, "missing total"))? as usize;

    let mut items = match result.get_mut(envelope::RESOURCES).map(Value::take) {
        Some(Value::Array(items)) => items,
        // ERS omits the array on an empty collection
        None | Some(Value::Null) => Vec::new(),
        Some(_) => return Err(ErsError::decode(path, "resources is not an array")),
    };

    let resources = items
        .iter_mut()
        .map(|item| {
            strip_link(item);
            serde_json::from_value(item.take()).map_err(|e| ErsError::decode(path, e.to_string()))
        })
        .collect::<ErsResult<Vec<ResourceSummary>>>()?;

    Ok(Page { total, resources })
}
