//! Test fixtures for common TrustSec scenarios
//!
//! Provides JSON builders for the three ERS object kinds and seeders that
//! populate a [`FakeErsServer`] with platform defaults or bulk data, plus a
//! small adaptive policy organization for [`FakeMerakiDashboard`].

use serde_json::{json, Value};
use trustsec_common::Collection;

use crate::{FakeErsServer, FakeMerakiDashboard};

/// Fixed id of the hidden ANY tag
pub const ANY_TAG_ID: &str = "92bb1950-8c01-11e6-996c-525400b48521";

/// Platform ACLs present on every node
pub const PLATFORM_ACLS: [(&str, &str); 4] = [
    ("Deny IP", "deny ip"),
    ("Deny_IP_Log", "deny ip log"),
    ("Permit IP", "permit ip"),
    ("Permit_IP_Log", "permit ip log"),
];

/// Tag object body
pub fn tag_json(name: &str, value: u32, description: &str) -> Value {
    json!({
        "name": name,
        "value": value,
        "description": description,
        "propogateToApic": false,
    })
}

/// ACL object body with newline separated rules
pub fn acl_json(name: &str, ip_version: &str, rules: &[&str]) -> Value {
    json!({
        "name": name,
        "description": format!("{} SGACL", name),
        "ipVersion": ip_version,
        "aclcontent": rules.join("\n"),
    })
}

/// Egress matrix cell object body
pub fn cell_json(
    name: &str,
    source_id: &str,
    destination_id: &str,
    acl_ids: &[&str],
    default_rule: &str,
) -> Value {
    json!({
        "name": name,
        "description": "",
        "sourceSgtId": source_id,
        "destinationSgtId": destination_id,
        "matrixCellStatus": "ENABLED",
        "sgacls": acl_ids,
        "defaultRule": default_rule,
    })
}

/// Seed the objects a fresh node ships with: the Unknown and
/// TrustSec_Devices tags, the four platform ACLs and the ANY-ANY cell.
///
/// All of them refuse deletion. Returns the id of the "Permit IP" ACL.
pub fn seed_platform_defaults(server: &FakeErsServer) -> String {
    server.insert_protected(
        Collection::Tag,
        tag_json("Unknown", 0, "Unknown Security Group"),
    );
    server.insert_protected(
        Collection::Tag,
        tag_json("TrustSec_Devices", 2, "TrustSec Devices Security Group"),
    );

    let mut permit_id = String::new();
    for (name, rule) in PLATFORM_ACLS {
        let id = server.insert_protected(Collection::Acl, acl_json(name, "IP_AGNOSTIC", &[rule]));
        if name == "Permit IP" {
            permit_id = id;
        }
    }

    server.insert_protected(
        Collection::Cell,
        cell_json("ANY-ANY", ANY_TAG_ID, ANY_TAG_ID, &[&permit_id], "NONE"),
    );
    permit_id
}

/// Seed `count` tags named `Tag0000`.. with values starting at 3
pub fn seed_tags(server: &FakeErsServer, count: usize) -> Vec<String> {
    (0..count)
        .map(|i| {
            server.insert(
                Collection::Tag,
                tag_json(&format!("Tag{:04}", i), 3 + i as u32, "generated"),
            )
        })
        .collect()
}

/// Meraki organization id used by [`seed_meraki_policy`]
pub const MERAKI_ORG_ID: &str = "549236";

/// Seed a dashboard organization with the default groups, two custom
/// groups, two ACLs and four policies: two by ACL and two by last entry
/// rule only.
pub fn seed_meraki_policy(dashboard: &FakeMerakiDashboard) {
    dashboard.add_organization(MERAKI_ORG_ID, "DevNet Sandbox");
    dashboard.add_group(MERAKI_ORG_ID, "Unknown", 0, "Unknown group");
    dashboard.add_group(MERAKI_ORG_ID, "Infrastructure", 2, "Network devices");
    dashboard.add_group(MERAKI_ORG_ID, "Guests", 6, "Guest users");
    dashboard.add_group(MERAKI_ORG_ID, "Employees", 4, "Staff");

    dashboard.add_acl(
        MERAKI_ORG_ID,
        "BlockSSH",
        "agnostic",
        &[("deny", "tcp", "any", "22"), ("allow", "any", "any", "any")],
    );
    dashboard.add_acl(MERAKI_ORG_ID, "WebOnly", "ipv4", &[("allow", "tcp", "any", "443")]);

    dashboard.add_policy(MERAKI_ORG_ID, "Employees", "Guests", &["BlockSSH"], "allow");
    dashboard.add_policy(MERAKI_ORG_ID, "Guests", "Employees", &["WebOnly", "BlockSSH"], "deny");
    dashboard.add_policy(MERAKI_ORG_ID, "Guests", "Infrastructure", &[], "deny");
    dashboard.add_policy(MERAKI_ORG_ID, "Employees", "Employees", &[], "default");
}

/// Common matrix workbook fixtures
pub mod workbook_fixtures {
    use serde_json::{json, Value};

    /// Two tags with a single BlockMalware cell from Employees to Guests
    pub fn employees_guests() -> Value {
        json!({
            "Matrix": {
                "headers": ["SGT", "Value", "Description", "Employees", "Guests"],
                "rows": [
                    ["Employees", "4", "d1", "", "BlockMalware"],
                    ["Guests", "6", "d2", "", ""],
                ]
            },
            "Acls": {
                "headers": ["name", "description", "ipVersion", "aclcontent"],
                "rows": [
                    ["BlockMalware", "Block Malware", "IP_AGNOSTIC", "deny icmp\ndeny tcp dst eq 22"],
                ]
            }
        })
    }
}
