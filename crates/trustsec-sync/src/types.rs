//! TrustSec resource types.
//!
//! These mirror the ERS JSON bodies for security group tags, security group
//! ACLs and egress matrix cells. Field names follow the wire format via
//! serde renames; enum values replace the upper-case strings ERS uses.

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use trustsec_common::{Collection, ErsError, ErsResult};

/// Maximum length of tag, ACL and cell names.
pub const NAME_MAX_LEN: usize = 32;

/// Maximum length of descriptions.
pub const DESCRIPTION_MAX_LEN: usize = 256;

/// Name of the hidden wildcard tag.
pub const ANY_TAG_NAME: &str = "ANY";

/// Fixed id of the hidden wildcard tag.
pub const ANY_TAG_ID: &str = "92bb1950-8c01-11e6-996c-525400b48521";

/// Value of the hidden wildcard tag.
pub const ANY_TAG_VALUE: u16 = 65535;

/// Tags owned by the platform; never created or deleted in bulk.
pub const RESERVED_TAG_NAMES: [&str; 3] = ["Unknown", "TrustSec_Devices", ANY_TAG_NAME];

/// ACLs owned by the platform; never created or deleted in bulk.
pub const RESERVED_ACL_NAMES: [&str; 4] = ["Deny IP", "Deny_IP_Log", "Permit IP", "Permit_IP_Log"];

/// Cells owned by the platform; never deleted in bulk.
pub const RESERVED_CELL_NAMES: [&str; 1] = ["ANY-ANY"];

/// First tag value of the high reserved range.
pub const RESERVED_VALUE_HIGH_START: u16 = 65519;

/// Returns true for tag values reserved for network device use
/// (0-2 and 65519 and above).
pub fn is_reserved_value(value: u16) -> bool {
    value <= 2 || value >= RESERVED_VALUE_HIGH_START
}

/// Returns true if `name` is a platform tag.
pub fn is_reserved_tag(name: &str) -> bool {
    RESERVED_TAG_NAMES.contains(&name)
}

/// Returns true if `name` is a platform ACL.
pub fn is_reserved_acl(name: &str) -> bool {
    RESERVED_ACL_NAMES.contains(&name)
}

/// A remote object stored in one ERS collection.
pub trait Resource: Serialize + DeserializeOwned + Send + Sync {
    /// Collection holding this resource type.
    const COLLECTION: Collection;

    /// Server-assigned identifier (empty before creation).
    fn id(&self) -> &str;

    /// Unique human key.
    fn name(&self) -> &str;
}

/// List entry returned by a collection listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSummary {
    /// Resource identifier
    pub id: String,
    /// Resource name
    #[serde(default)]
    pub name: String,
    /// Resource description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// ACL IP version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum IpVersion {
    /// IPv4 only
    #[serde(rename = "IPV4")]
    Ipv4,
    /// IPv6 only
    #[serde(rename = "IPV6")]
    Ipv6,
    /// Both families; assumed when `ipVersion` is absent or empty.
    #[default]
    #[serde(rename = "IP_AGNOSTIC")]
    Agnostic,
}

impl fmt::Display for IpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ipv4 => write!(f, "IPV4"),
            Self::Ipv6 => write!(f, "IPV6"),
            Self::Agnostic => write!(f, "IP_AGNOSTIC"),
        }
    }
}

impl FromStr for IpVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "IPV4" => Ok(Self::Ipv4),
            "IPV6" => Ok(Self::Ipv6),
            "IP_AGNOSTIC" | "AGNOSTIC" | "" => Ok(Self::Agnostic),
            _ => Err(format!("Unknown IP version: {}", s)),
        }
    }
}

/// Matrix cell status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CellStatus {
    /// Policy enforced
    #[default]
    Enabled,
    /// Policy not applied
    Disabled,
    /// Policy logged but not enforced
    Monitor,
}

impl fmt::Display for CellStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Enabled => write!(f, "enabled"),
            Self::Disabled => write!(f, "disabled"),
            Self::Monitor => write!(f, "monitor"),
        }
    }
}

/// Action applied when a cell has no ACL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DefaultRule {
    /// No fallback
    #[default]
    #[serde(rename = "NONE")]
    None,
    /// Deny all IP traffic
    #[serde(rename = "DENY_IP", alias = "DENY IP")]
    DenyIp,
    /// Permit all IP traffic
    #[serde(rename = "PERMIT_IP", alias = "PERMIT IP")]
    PermitIp,
}

impl DefaultRule {
    /// Matrix text for this rule; empty for [`DefaultRule::None`].
    pub fn as_text(&self) -> &'static str {
        match self {
            Self::None => "",
            Self::DenyIp => "deny ip",
            Self::PermitIp => "permit ip",
        }
    }
}

impl fmt::Display for DefaultRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_text())
    }
}

impl FromStr for DefaultRule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', " ").as_str() {
            "none" => Ok(Self::None),
            "deny ip" => Ok(Self::DenyIp),
            "permit ip" => Ok(Self::PermitIp),
            _ => Err(format!("Unknown default rule: {}", s)),
        }
    }
}

/// Security group tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    /// Identifier (empty before creation)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    /// Unique name
    pub name: String,
    /// Free-form description
    #[serde(default)]
    pub description: String,
    /// Numeric tag value
    pub value: u16,
    /// Server-maintained revision counter
    #[serde(
        default,
        deserialize_with = "de_generation",
        skip_serializing_if = "Option::is_none"
    )]
    pub generation_id: Option<u64>,
    /// ERS spells it this way
    #[serde(default)]
    pub propogate_to_apic: bool,
}

impl Tag {
    /// Creates an uncreated tag.
    pub fn new(name: impl Into<String>, value: u16, description: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
            description: description.into(),
            value,
            generation_id: None,
            propogate_to_apic: false,
        }
    }

    /// The hidden wildcard tag. ERS does not list it, but the default
    /// ANY-ANY cell references it.
    pub fn any() -> Self {
        Self {
            id: ANY_TAG_ID.to_string(),
            generation_id: Some(0),
            ..Self::new(ANY_TAG_NAME, ANY_TAG_VALUE, ANY_TAG_NAME)
        }
    }
}

impl Resource for Tag {
    const COLLECTION: Collection = Collection::Tag;

    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Security group ACL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Acl {
    /// Identifier (empty before creation)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    /// Unique name
    pub name: String,
    /// Free-form description
    #[serde(default)]
    pub description: String,
    /// Address family
    #[serde(default)]
    pub ip_version: IpVersion,
    /// Ordered rule lines; not validated by the remote system
    #[serde(rename = "aclcontent", default, with = "acl_content")]
    pub rules: Vec<String>,
    /// Server-maintained revision counter
    #[serde(
        default,
        deserialize_with = "de_generation",
        skip_serializing_if = "Option::is_none"
    )]
    pub generation_id: Option<u64>,
}

impl Acl {
    /// Creates an uncreated ACL.
    pub fn new<I, S>(name: impl Into<String>, ip_version: IpVersion, rules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: String::new(),
            name: name.into(),
            description: String::new(),
            ip_version,
            rules: rules.into_iter().map(Into::into).collect(),
            generation_id: None,
        }
    }

    /// Sets the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Rules joined one per line, as stored remotely.
    pub fn content(&self) -> String {
        self.rules.join("\n")
    }
}

impl Resource for Acl {
    const COLLECTION: Collection = Collection::Acl;

    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Directional egress policy between two tags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cell {
    /// Identifier (empty before creation)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    /// `<source>-<destination>`
    pub name: String,
    /// Free-form description
    #[serde(default)]
    pub description: String,
    /// Source tag id
    #[serde(rename = "sourceSgtId")]
    pub source_tag_id: String,
    /// Destination tag id
    #[serde(rename = "destinationSgtId")]
    pub destination_tag_id: String,
    /// Enforcement status
    #[serde(rename = "matrixCellStatus", default)]
    pub status: CellStatus,
    /// Fallback when `acl_ids` is empty
    #[serde(default)]
    pub default_rule: DefaultRule,
    /// Ordered ACL ids
    #[serde(rename = "sgacls", default)]
    pub acl_ids: Vec<String>,
}

impl Cell {
    /// Builds the cell name for a source and destination.
    pub fn name_for(source: &str, destination: &str) -> String {
        format!("{}-{}", source, destination)
    }
}

impl Resource for Cell {
    const COLLECTION: Collection = Collection::Cell;

    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Check a name against the remote length limit.
pub fn validate_name(kind: &str, name: &str) -> ErsResult<()> {
    if name.is_empty() {
        return Err(ErsError::shape(format!("{} name is empty", kind)));
    }
    if name.chars().count() > NAME_MAX_LEN {
        return Err(ErsError::shape(format!(
            "{} name '{}' exceeds {} characters",
            kind, name, NAME_MAX_LEN
        )));
    }
    Ok(())
}

/// ERS returns `generationId` as a string on some objects and a number on
/// others.
fn de_generation<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Number(n)) => Ok(Some(n)),
        Some(Raw::Text(s)) => s.trim().parse().map(Some).map_err(serde::de::Error::custom),
        None => Ok(None),
    }
}

/// `aclcontent` is one string with a rule per line.
mod acl_content {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(rules: &[String], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&rules.join("\n"))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let content = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
        Ok(split_rules(&content))
    }

    pub fn split_rules(content: &str) -> Vec<String> {
        content
            .lines()
            .map(str::trim_end)
            .filter(|l| !l.trim().is_empty())
            .map(str::to_string)
            .collect()
    }
}

pub use acl_content::split_rules;
