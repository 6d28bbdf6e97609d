//! ERS collection endpoints and protocol constants

use std::fmt;

/// Largest page size accepted by the ERS list API
pub const REST_PAGE_SIZE_MAX: usize = 100;

/// Page size used by ERS when none is requested
pub const REST_PAGE_SIZE_DEFAULT: usize = 20;

/// Default number of simultaneous connections to the ERS node.
/// More than 5-10 gives no measurable speedup and risks connection refusals.
pub const TCP_CONNECTIONS_DEFAULT: usize = 5;

/// Hard upper bound on simultaneous connections (ERS concurrency limit)
pub const TCP_CONNECTIONS_MAX: usize = 30;

/// Per-request timeout in seconds
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Node version operation endpoint
pub const VERSION_PATH: &str = "/ers/config/op/systemconfig/iseversion";

/// Envelope keys used in ERS JSON bodies
pub mod envelope {
    /// List response wrapper
    pub const SEARCH_RESULT: &str = "SearchResult";

    /// Total resource count in a list response
    pub const TOTAL: &str = "total";

    /// Resource array in a list response
    pub const RESOURCES: &str = "resources";

    /// UI hyperlink attached to every resource
    pub const LINK: &str = "link";

    /// Error response wrapper
    pub const ERS_RESPONSE: &str = "ERSResponse";

    /// Operation result wrapper
    pub const OPERATION_RESULT: &str = "OperationResult";
}

/// Meraki dashboard API paths for adaptive policy
pub mod meraki {
    /// Default dashboard API base URL
    pub const BASE_URL: &str = "https://api.meraki.com/api/v1";

    /// Organizations visible to the API key
    pub const ORGANIZATIONS: &str = "/organizations";

    /// Adaptive policy groups (tags) of an organization
    pub fn groups(org_id: &str) -> String {
        format!("{}/{}/adaptivePolicy/groups", ORGANIZATIONS, org_id)
    }

    /// Adaptive policy ACLs of an organization
    pub fn acls(org_id: &str) -> String {
        format!("{}/{}/adaptivePolicy/acls", ORGANIZATIONS, org_id)
    }

    /// Adaptive policies (matrix cells) of an organization
    pub fn policies(org_id: &str) -> String {
        format!("{}/{}/adaptivePolicy/policies", ORGANIZATIONS, org_id)
    }
}

pub use meraki::BASE_URL as MERAKI_BASE_URL;

/// Remote TrustSec collections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    /// Security group tags
    Tag,
    /// Security group ACLs
    Acl,
    /// Egress matrix cells
    Cell,
}

impl Collection {
    /// All collections in creation order (cells reference tags and ACLs)
    pub const CREATE_ORDER: [Collection; 3] = [Collection::Tag, Collection::Acl, Collection::Cell];

    /// All collections in deletion order
    pub const DELETE_ORDER: [Collection; 3] = [Collection::Cell, Collection::Acl, Collection::Tag];

    /// Returns the REST collection path.
    pub fn path(&self) -> &'static str {
        match self {
            Collection::Tag => "/ers/config/sgt",
            Collection::Acl => "/ers/config/sgacl",
            Collection::Cell => "/ers/config/egressmatrixcell",
        }
    }

    /// Returns the key wrapping a single object in detail and create bodies.
    pub fn object_name(&self) -> &'static str {
        match self {
            Collection::Tag => "Sgt",
            Collection::Acl => "Sgacl",
            Collection::Cell => "EgressMatrixCell",
        }
    }

    /// Path of a single resource.
    pub fn item_path(&self, id: &str) -> String {
        format!("{}/{}", self.path(), id)
    }

    /// Path of one page of the listing.
    pub fn page_path(&self, size: usize, page: usize) -> String {
        if page <= 1 {
            format!("{}?size={}", self.path(), size)
        } else {
            format!("{}?size={}&page={}", self.path(), size, page)
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.object_name())
    }
}
