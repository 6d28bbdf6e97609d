//! TrustSec egress matrix synchronization
//!
//! Reconciles a dense tag-by-tag policy matrix with the three flat ERS
//! collections (security group tags, security group ACLs and egress matrix
//! cells). Export fetches and resolves the collections and renders the
//! matrix; import validates a workbook, creates tags and ACLs, then builds
//! and creates the cells that reference them. The same workbook can also be
//! exported from a Meraki dashboard's adaptive policy.

pub mod classify;
mod fetcher;
pub mod matrix;
pub mod meraki;
mod pipeline;
mod report;
mod resolver;
mod sync;
pub mod table;
pub mod transcode;
pub mod types;
mod version;

pub use classify::{classify, classify_matrix, colour_table, CellClass, ClassifiedCell};
pub use fetcher::{strip_link, Fetcher};
pub use matrix::{Matrix, MatrixRow, SortKey};
pub use meraki::{MerakiDashboard, MerakiExport};
pub use pipeline::{ClearReport, ExportReport, ImportReport, TrustsecSync};
pub use report::{BatchReport, ItemFailure, ItemReport, Outcome};
pub use resolver::{DetailResolver, Resolved};
pub use sync::{classify_create, classify_delete, BulkSynchronizer, Created};
pub use table::{Table, Workbook};
pub use types::{Acl, Cell, CellStatus, DefaultRule, IpVersion, Resource, ResourceSummary, Tag};
pub use version::{query_version, VersionInfo};
