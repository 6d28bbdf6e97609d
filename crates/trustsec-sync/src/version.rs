//! Node version query.

use std::fmt;

use serde::Deserialize;
use serde_json::Value;
use trustsec_common::endpoints::{envelope, VERSION_PATH};
use trustsec_common::{ErsError, ErsResult, ErsTransport};

/// Parsed `iseversion` operation result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionInfo {
    /// Full dotted version, e.g. `3.1.0.518`
    pub version: String,
    pub major: u32,
    pub minor: u32,
    pub maintenance: u32,
    pub build: u32,
    /// Installed patches, comma separated; empty when none
    pub patch: String,
}

impl VersionInfo {
    /// Parse the `OperationResult.resultValue` name/value list.
    pub fn from_body(body: &Value) -> ErsResult<Self> {
        #[derive(Deserialize)]
        struct Pair {
            name: String,
            #[serde(default)]
            value: String,
        }

        let pairs = body
            .get(envelope::OPERATION_RESULT)
            .and_then(|r| r.get("resultValue"))
            .cloned()
            .ok_or_else(|| ErsError::decode(VERSION_PATH, "missing OperationResult"))?;
        let pairs: Vec<Pair> = serde_json::from_value(pairs)
            .map_err(|e| ErsError::decode(VERSION_PATH, e.to_string()))?;

        let mut info = VersionInfo::default();
        for pair in pairs {
            match pair.name.as_str() {
                "version" => info.version = pair.value,
                "patch information" => info.patch = pair.value,
                _ => {}
            }
        }
        if info.version.is_empty() {
            return Err(ErsError::decode(VERSION_PATH, "no version in result"));
        }

        let mut parts = info
            .version
            .split('.')
            .map(|p| p.trim().parse::<u32>().unwrap_or(0));
        info.major = parts.next().unwrap_or(0);
        info.minor = parts.next().unwrap_or(0);
        info.maintenance = parts.next().unwrap_or(0);
        info.build = parts.next().unwrap_or(0);
        Ok(info)
    }
}

impl fmt::Display for VersionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.version)?;
        if !self.patch.is_empty() && self.patch != "0" {
            write!(f, " (patch {})", self.patch)?;
        }
        Ok(())
    }
}

/// Query the node version.
pub async fn query_version(transport: &dyn ErsTransport) -> ErsResult<VersionInfo> {
    let response = transport.get(VERSION_PATH).await?;
    if !response.is_success() {
        return Err(ErsError::bad_status(VERSION_PATH, response.status));
    }
    VersionInfo::from_body(&response.body)
}
