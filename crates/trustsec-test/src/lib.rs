//! Integration test infrastructure for TrustSec ERS synchronization
//!
//! Provides:
//! - An in-memory ERS node implementing `ErsTransport`
//! - An in-memory Meraki dashboard serving adaptive policy
//! - Failure injection per page, resource, create and delete
//! - Concurrency accounting for connection-limit tests
//! - Fixtures for platform defaults and matrix workbooks
//! - Verification helpers over the node state

mod fake_ers;
mod fake_meraki;
pub mod fixtures;
mod verification;

pub use fake_ers::{FakeErsServer, RequestRecord};
pub use fake_meraki::FakeMerakiDashboard;
pub use fixtures::*;
pub use verification::*;
