//! Adaptive policy export from the Meraki dashboard.
//!
//! The dashboard keeps the same three collections as ERS under different
//! names: groups are tags, ACLs carry structured rules, and policies are
//! cells that reference groups and ACLs by name. Listings are unpaged JSON
//! arrays. The export renders the same workbook as an ERS export, with the
//! matrix ordered by tag value.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};
use trustsec_common::endpoints::meraki;
use trustsec_common::{ErsError, ErsResult, ErsTransport};

use crate::classify::colour_table;
use crate::matrix::{Matrix, SortKey};
use crate::table::{Table, Workbook};
use crate::transcode::{acl_table, export_matrix, tag_table};
use crate::types::{Acl, IpVersion, Tag};

/// Flat policy table headers of a dashboard export.
pub const MERAKI_POLICY_HEADERS: [&str; 6] = [
    "source",
    "sourceValue",
    "destination",
    "destinationValue",
    "acls",
    "lastEntryRule",
];

/// Adaptive policy group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MerakiGroup {
    pub group_id: String,
    pub name: String,
    pub sgt: u16,
    #[serde(default)]
    pub description: String,
}

impl From<&MerakiGroup> for Tag {
    fn from(group: &MerakiGroup) -> Self {
        Tag {
            id: group.group_id.clone(),
            ..Tag::new(group.name.clone(), group.sgt, group.description.clone())
        }
    }
}

/// One access control entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MerakiRule {
    pub policy: String,
    pub protocol: String,
    #[serde(default)]
    pub src_port: String,
    #[serde(default)]
    pub dst_port: String,
}

impl MerakiRule {
    /// `policy protocol srcPort dstPort`
    pub fn text(&self) -> String {
        format!(
            "{} {} {} {}",
            self.policy, self.protocol, self.src_port, self.dst_port
        )
    }
}

/// Adaptive policy ACL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MerakiAcl {
    pub acl_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub rules: Vec<MerakiRule>,
    /// `ipv4`, `ipv6` or `agnostic`
    #[serde(default)]
    pub ip_version: String,
}

impl From<&MerakiAcl> for Acl {
    fn from(acl: &MerakiAcl) -> Self {
        let ip_version = acl.ip_version.parse().unwrap_or_else(|_| {
            warn!(acl = %acl.name, ip_version = %acl.ip_version, "Unknown IP version, assuming agnostic");
            IpVersion::Agnostic
        });
        Acl {
            id: acl.acl_id.clone(),
            ..Acl::new(acl.name.clone(), ip_version, acl.rules.iter().map(MerakiRule::text))
                .with_description(acl.description.clone())
        }
    }
}

/// Group reference inside a policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRef {
    pub name: String,
    pub sgt: u16,
}

/// ACL reference inside a policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclRef {
    pub name: String,
}

/// Directional policy between two groups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MerakiPolicy {
    #[serde(default)]
    pub adaptive_policy_id: String,
    pub source_group: GroupRef,
    pub destination_group: GroupRef,
    #[serde(default)]
    pub acls: Vec<AclRef>,
    /// `allow`, `deny` or `default`
    #[serde(default)]
    pub last_entry_rule: String,
}

impl MerakiPolicy {
    /// Matrix text: comma-joined ACL names, else the last entry rule.
    pub fn cell_text(&self) -> String {
        if self.acls.is_empty() {
            self.last_entry_rule.clone()
        } else {
            self.acls
                .iter()
                .map(|a| a.name.as_str())
                .collect::<Vec<_>>()
                .join(",")
        }
    }
}

/// Dashboard state rendered for export.
#[derive(Debug)]
pub struct MerakiExport {
    pub org_id: String,
    pub tags: Vec<Tag>,
    pub acls: Vec<Acl>,
    pub policies: Vec<MerakiPolicy>,
    pub matrix: Matrix,
}

impl MerakiExport {
    /// Matrix plus flat ACL, tag, policy and colour tables.
    pub fn to_workbook(&self) -> Workbook {
        Workbook {
            matrix: self.matrix.to_table(),
            acls: acl_table(&self.acls),
            tags: tag_table(&self.tags),
            policies: meraki_policy_table(&self.policies),
            colours: colour_table(&self.matrix),
        }
    }
}

/// Flat policy table in dashboard order.
pub fn meraki_policy_table(policies: &[MerakiPolicy]) -> Table {
    let mut table = Table::new(MERAKI_POLICY_HEADERS);
    for policy in policies {
        table.push_row([
            policy.source_group.name.clone(),
            policy.source_group.sgt.to_string(),
            policy.destination_group.name.clone(),
            policy.destination_group.sgt.to_string(),
            policy
                .acls
                .iter()
                .map(|a| a.name.as_str())
                .collect::<Vec<_>>()
                .join(","),
            policy.last_entry_rule.clone(),
        ]);
    }
    table
}

/// Build the matrix from groups and policies.
pub fn meraki_matrix(tags: &[Tag], policies: &[MerakiPolicy], sort: SortKey) -> Matrix {
    let mut matrix = export_matrix(tags, &[], sort);
    for policy in policies {
        let text = policy.cell_text();
        if text.is_empty() {
            continue;
        }
        let source = &policy.source_group.name;
        let destination = &policy.destination_group.name;
        if !matrix.set(source, destination, text) {
            debug!(%source, %destination, "Policy has no matrix position");
        }
    }
    matrix
}

/// Read-only adaptive policy session against one organization.
pub struct MerakiDashboard {
    transport: Arc<dyn ErsTransport>,
    org_id: Option<String>,
}

impl MerakiDashboard {
    pub fn new(transport: Arc<dyn ErsTransport>) -> Self {
        Self {
            transport,
            org_id: None,
        }
    }

    /// Pin the organization; an empty id keeps the first accessible one.
    pub fn with_org_id(mut self, org_id: impl Into<String>) -> Self {
        let org_id = org_id.into();
        self.org_id = (!org_id.is_empty()).then_some(org_id);
        self
    }

    /// Configured organization, else the first one the key can see.
    pub async fn organization_id(&self) -> ErsResult<String> {
        if let Some(org_id) = &self.org_id {
            return Ok(org_id.clone());
        }

        #[derive(Deserialize)]
        struct Organization {
            id: String,
        }

        let orgs: Vec<Organization> = self.list(meraki::ORGANIZATIONS).await?;
        orgs.into_iter()
            .next()
            .map(|o| o.id)
            .ok_or_else(|| ErsError::lookup("organization", "any"))
    }

    async fn list<T: DeserializeOwned>(&self, path: &str) -> ErsResult<Vec<T>> {
        let response = self.transport.get(path).await?;
        if !response.is_success() {
            warn!(path, status = response.status, "Dashboard listing failed");
            return Err(ErsError::bad_status(path, response.status));
        }
        match response.body {
            Value::Array(_) => serde_json::from_value(response.body)
                .map_err(|e| ErsError::decode(path, e.to_string())),
            _ => Err(ErsError::decode(path, "expected a JSON array")),
        }
    }

    /// Fetch groups, ACLs and policies and build the matrix.
    #[instrument(skip(self))]
    pub async fn export(&self, sort: SortKey) -> ErsResult<MerakiExport> {
        let org_id = self.organization_id().await?;
        let groups_path = meraki::groups(&org_id);
        let acls_path = meraki::acls(&org_id);
        let policies_path = meraki::policies(&org_id);
        let (groups, acls, policies) = tokio::try_join!(
            self.list::<MerakiGroup>(&groups_path),
            self.list::<MerakiAcl>(&acls_path),
            self.list::<MerakiPolicy>(&policies_path),
        )?;

        let tags: Vec<Tag> = groups.iter().map(Tag::from).collect();
        let acls: Vec<Acl> = acls.iter().map(Acl::from).collect();
        let matrix = meraki_matrix(&tags, &policies, sort);

        info!(
            org_id = %org_id,
            groups = tags.len(),
            acls = acls.len(),
            policies = policies.len(),
            "Dashboard export complete"
        );
        Ok(MerakiExport {
            org_id,
            tags,
            acls,
            policies,
            matrix,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn policy(acls: &[&str], last_entry_rule: &str) -> MerakiPolicy {
        let acls: Vec<Value> = acls.iter().map(|a| json!({ "id": "444", "name": a })).collect();
        serde_json::from_value(json!({
            "adaptivePolicyId": "1284392014819",
            "sourceGroup": { "id": "222", "name": "IoT", "sgt": 50 },
            "destinationGroup": { "id": "333", "name": "Cameras", "sgt": 60 },
            "acls": acls,
            "lastEntryRule": last_entry_rule,
            "createdAt": "2024-01-01T00:00:00Z"
        }))
        .unwrap()
    }

    #[test]
    fn test_cell_text_prefers_acls() {
        assert_eq!(policy(&["Block web", "Audit"], "deny").cell_text(), "Block web,Audit");
        assert_eq!(policy(&[], "allow").cell_text(), "allow");
        assert_eq!(policy(&[], "").cell_text(), "");
    }

    #[test]
    fn test_acl_conversion() {
        let acl: MerakiAcl = serde_json::from_value(json!({
            "aclId": "12345678",
            "name": "Block sensitive web traffic",
            "description": "Blocks sensitive web traffic",
            "ipVersion": "ipv6",
            "rules": [
                { "policy": "deny", "protocol": "tcp", "srcPort": "1,33", "dstPort": "22-30" },
                { "policy": "allow", "protocol": "any", "srcPort": "any", "dstPort": "any" }
            ]
        }))
        .unwrap();

        let converted = Acl::from(&acl);
        assert_eq!(converted.id, "12345678");
        assert_eq!(converted.ip_version, IpVersion::Ipv6);
        assert_eq!(converted.content(), "deny tcp 1,33 22-30\nallow any any any");
        assert_eq!(converted.description, "Blocks sensitive web traffic");
    }

    #[test]
    fn test_acl_unknown_ip_version_is_agnostic() {
        let acl = MerakiAcl {
            acl_id: "1".into(),
            name: "Odd".into(),
            description: String::new(),
            rules: Vec::new(),
            ip_version: "ipx".into(),
        };
        assert_eq!(Acl::from(&acl).ip_version, IpVersion::Agnostic);
    }

    #[test]
    fn test_group_conversion() {
        let group: MerakiGroup = serde_json::from_value(json!({
            "groupId": "1234",
            "name": "IoT",
            "sgt": 50,
            "description": "Internet of things",
            "isDefaultGroup": false
        }))
        .unwrap();
        let tag = Tag::from(&group);
        assert_eq!(tag.id, "1234");
        assert_eq!(tag.value, 50);
        assert_eq!(tag.description, "Internet of things");
    }

    #[test]
    fn test_matrix_sorted_by_value() {
        let tags = vec![
            Tag::new("IoT", 50, ""),
            Tag::new("Cameras", 60, ""),
            Tag::new("Unknown", 0, ""),
        ];
        let matrix = meraki_matrix(&tags, &[policy(&[], "deny")], SortKey::Value);
        let columns: Vec<&str> = matrix.columns().iter().map(String::as_str).collect();
        assert_eq!(columns, vec!["Unknown", "IoT", "Cameras"]);
        assert_eq!(matrix.get("IoT", "Cameras"), Some("deny"));
        assert_eq!(matrix.non_empty_cells().len(), 1);
    }

    #[test]
    fn test_policy_table() {
        let table = meraki_policy_table(&[policy(&["Block web"], "allow")]);
        assert_eq!(table.headers, MERAKI_POLICY_HEADERS);
        assert_eq!(table.rows[0], vec!["IoT", "50", "Cameras", "60", "Block web", "allow"]);
    }
}
