//! End-to-end synchronization passes.
//!
//! Each pass re-derives its state from the remote node or the input
//! workbook; nothing is carried between passes.

use std::sync::Arc;

use tracing::{info, instrument};
use trustsec_common::{Collection, ErsConfig, ErsResult, ErsTransport};

use crate::classify::colour_table;
use crate::fetcher::Fetcher;
use crate::matrix::{Matrix, SortKey};
use crate::report::{BatchReport, ItemFailure};
use crate::resolver::Resolved;
use crate::sync::BulkSynchronizer;
use crate::table::Workbook;
use crate::transcode::{
    acl_table, derive_acls, derive_tags, export_matrix, policy_records, policy_table,
    synthesize_cells, tag_table, PolicyRecord,
};
use crate::types::{Acl, Cell, Tag, RESERVED_ACL_NAMES, RESERVED_CELL_NAMES, RESERVED_TAG_NAMES};
use crate::version::{query_version, VersionInfo};

/// Remote state rendered for export.
#[derive(Debug)]
pub struct ExportReport {
    pub tags: Vec<Tag>,
    pub acls: Vec<Acl>,
    pub cells: Vec<Cell>,
    pub policies: Vec<PolicyRecord>,
    pub matrix: Matrix,
    /// Details that did not resolve and cells with dangling references
    pub failures: Vec<ItemFailure>,
}

impl ExportReport {
    /// Matrix plus flat ACL, tag, policy and colour tables.
    pub fn to_workbook(&self) -> Workbook {
        Workbook {
            matrix: self.matrix.to_table(),
            acls: acl_table(&self.acls),
            tags: tag_table(&self.tags),
            policies: policy_table(&self.policies),
            colours: colour_table(&self.matrix),
        }
    }
}

/// Per-collection outcomes of an import.
#[derive(Debug)]
pub struct ImportReport {
    pub tags: BatchReport,
    pub acls: BatchReport,
    pub cells: BatchReport,
    /// Matrix entries that could not become cells
    pub skipped_cells: Vec<ItemFailure>,
    /// Details that did not resolve while reconciling
    pub detail_failures: Vec<ItemFailure>,
}

impl ImportReport {
    pub fn is_clean(&self) -> bool {
        self.tags.is_clean()
            && self.acls.is_clean()
            && self.cells.is_clean()
            && self.skipped_cells.is_empty()
            && self.detail_failures.is_empty()
    }
}

/// Per-collection outcomes of a clear, in deletion order.
#[derive(Debug)]
pub struct ClearReport {
    pub cells: BatchReport,
    pub acls: BatchReport,
    pub tags: BatchReport,
}

impl ClearReport {
    pub fn is_clean(&self) -> bool {
        self.cells.is_clean() && self.acls.is_clean() && self.tags.is_clean()
    }
}

/// Export, import and clear over one node session.
pub struct TrustsecSync {
    transport: Arc<dyn ErsTransport>,
    sync: BulkSynchronizer,
}

impl TrustsecSync {
    pub fn new(transport: Arc<dyn ErsTransport>, config: &ErsConfig) -> Self {
        Self::with_page_size(transport, config.limits.page_size)
    }

    pub fn with_page_size(transport: Arc<dyn ErsTransport>, page_size: usize) -> Self {
        let fetcher = Fetcher::with_page_size(Arc::clone(&transport), page_size);
        Self {
            transport,
            sync: BulkSynchronizer::new(fetcher),
        }
    }

    pub fn synchronizer(&self) -> &BulkSynchronizer {
        &self.sync
    }

    /// Fetch and resolve all three collections and build the matrix.
    #[instrument(skip(self))]
    pub async fn export(&self, sort: SortKey) -> ErsResult<ExportReport> {
        let fetcher = self.sync.fetcher();
        let resolver = self.sync.resolver();
        let (tags, acls, cells) = tokio::try_join!(
            resolver.fetch_resolved::<Tag>(fetcher),
            resolver.fetch_resolved::<Acl>(fetcher),
            resolver.fetch_resolved::<Cell>(fetcher),
        )?;

        let mut failures = Vec::new();
        let tags = collect(tags, &mut failures);
        let acls = collect(acls, &mut failures);
        let cells = collect(cells, &mut failures);

        let (policies, unresolved) = policy_records(&tags, &acls, &cells);
        failures.extend(unresolved);
        let matrix = export_matrix(&tags, &policies, sort);

        info!(
            tags = tags.len(),
            acls = acls.len(),
            cells = cells.len(),
            failures = failures.len(),
            "Export complete"
        );
        Ok(ExportReport {
            tags,
            acls,
            cells,
            policies,
            matrix,
            failures,
        })
    }

    /// Create tags, then ACLs, then the cells the matrix describes.
    ///
    /// The workbook is fully validated before the first request.
    #[instrument(skip_all)]
    pub async fn import(&self, workbook: &Workbook) -> ErsResult<ImportReport> {
        let matrix = Matrix::from_table(&workbook.matrix)?;
        let acls = derive_acls(&workbook.acls)?;
        let tags = derive_tags(&matrix);
        info!(
            tags = tags.len(),
            acls = acls.len(),
            cells = matrix.non_empty_cells().len(),
            "Validated workbook"
        );

        let created_tags = self.sync.create_all(&tags).await?;
        let created_acls = self.sync.create_all(&acls).await?;

        let (cells, skipped_cells) =
            synthesize_cells(&matrix, &created_tags.resources, &created_acls.resources);
        let created_cells = self.sync.create_all(&cells).await?;

        let mut detail_failures = created_tags.detail_failures;
        detail_failures.extend(created_acls.detail_failures);
        detail_failures.extend(created_cells.detail_failures);

        Ok(ImportReport {
            tags: created_tags.report,
            acls: created_acls.report,
            cells: created_cells.report,
            skipped_cells,
            detail_failures,
        })
    }

    /// Delete cells, then ACLs, then tags, sparing platform objects.
    #[instrument(skip(self))]
    pub async fn clear(&self) -> ErsResult<ClearReport> {
        let cells = self.clear_collection(Collection::Cell).await?;
        let acls = self.clear_collection(Collection::Acl).await?;
        let tags = self.clear_collection(Collection::Tag).await?;
        Ok(ClearReport { cells, acls, tags })
    }

    async fn clear_collection(&self, collection: Collection) -> ErsResult<BatchReport> {
        let reserved: &[&str] = match collection {
            Collection::Tag => &RESERVED_TAG_NAMES,
            Collection::Acl => &RESERVED_ACL_NAMES,
            Collection::Cell => &RESERVED_CELL_NAMES,
        };
        let ids: Vec<String> = self
            .sync
            .fetcher()
            .fetch_all(collection)
            .await?
            .into_iter()
            .filter(|s| !reserved.contains(&s.name.as_str()))
            .map(|s| s.id)
            .collect();

        info!(count = ids.len(), "Deleting {}", collection);
        Ok(self.sync.delete_all(collection, &ids).await)
    }

    /// Query the node version.
    pub async fn version(&self) -> ErsResult<VersionInfo> {
        query_version(self.transport.as_ref()).await
    }
}

fn collect<T>(resolved: Resolved<T>, failures: &mut Vec<ItemFailure>) -> Vec<T> {
    failures.extend(resolved.failures);
    resolved.resources
}
