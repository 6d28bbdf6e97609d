//! Common infrastructure for TrustSec ERS synchronization.
//!
//! This crate provides the pieces shared by the synchronizer and its test
//! infrastructure:
//!
//! - [`error`]: the error taxonomy ([`ErsError`]) and result alias
//! - [`client`]: the [`ErsTransport`] seam, the `reqwest` implementation and
//!   the connection limiter
//! - [`config`]: session configuration from TOML, `ISE_*` and `MERAKI_*`
//!   variables
//! - [`endpoints`]: collection paths, envelope keys and protocol limits,
//!   plus the Meraki adaptive policy paths
//!
//! # Example
//!
//! ```ignore
//! use trustsec_common::{client, Collection, ErsConfig};
//!
//! let config = ErsConfig::load(None)?;
//! let transport = client::connect(&config)?;
//! let page = transport.get(&Collection::Tag.page_path(100, 1)).await?;
//! ```

pub mod client;
pub mod config;
pub mod endpoints;
pub mod error;

// Re-export commonly used items at crate root
pub use client::{
    connect, connect_meraki, extract_error_message, ErsResponse, ErsTransport, HttpTransport, LimitedTransport,
};
pub use config::{ErsConfig, LimitsConfig, MerakiConfig, ServerConfig};
pub use endpoints::Collection;
pub use error::{ErsError, ErsResult};
