//! In-memory Meraki dashboard
//!
//! Serves the organization listing and the three adaptive policy
//! collections as plain JSON arrays, the way the dashboard API returns
//! them. Policies reference groups and ACLs by name and carry the group's
//! tag value, so fixtures only need to name things once. The dashboard is
//! read-only here: POST and DELETE answer 405.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use trustsec_common::endpoints::meraki;
use trustsec_common::{ErsResponse, ErsResult, ErsTransport};

use crate::RequestRecord;

#[derive(Default)]
struct Organization {
    id: String,
    name: String,
    groups: Vec<Value>,
    acls: Vec<Value>,
    policies: Vec<Value>,
}

#[derive(Default)]
struct State {
    organizations: Vec<Organization>,
    failures: HashMap<String, u16>,
    log: Vec<RequestRecord>,
    next_id: u64,
}

impl State {
    fn next_id(&mut self) -> String {
        self.next_id += 1;
        format!("{}", 1000 + self.next_id)
    }

    fn organization(&mut self, org_id: &str) -> &mut Organization {
        match self.organizations.iter().position(|o| o.id == org_id) {
            Some(index) => &mut self.organizations[index],
            None => panic!("unknown organization {}", org_id),
        }
    }
}

/// In-memory Meraki dashboard implementing [`ErsTransport`]
#[derive(Default)]
pub struct FakeMerakiDashboard {
    state: Mutex<State>,
}

impl FakeMerakiDashboard {
    /// Create a dashboard with no organizations
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an empty organization
    pub fn add_organization(&self, id: &str, name: &str) {
        self.state.lock().organizations.push(Organization {
            id: id.to_string(),
            name: name.to_string(),
            ..Default::default()
        });
    }

    /// Add an adaptive policy group and return its id
    pub fn add_group(&self, org_id: &str, name: &str, sgt: u16, description: &str) -> String {
        let mut state = self.state.lock();
        let id = state.next_id();
        state.organization(org_id).groups.push(json!({
            "groupId": id,
            "name": name,
            "sgt": sgt,
            "description": description,
            "policyObjects": [],
            "isDefaultGroup": sgt <= 2,
            "requiredIpMappings": [],
            "createdAt": "2024-01-01T00:00:00Z",
            "updatedAt": "2024-01-01T00:00:00Z",
        }));
        id
    }

    /// Add an adaptive policy ACL; each rule is `(policy, protocol, srcPort, dstPort)`
    pub fn add_acl(
        &self,
        org_id: &str,
        name: &str,
        ip_version: &str,
        rules: &[(&str, &str, &str, &str)],
    ) -> String {
        let mut state = self.state.lock();
        let id = state.next_id();
        let rules: Vec<Value> = rules
            .iter()
            .map(|(policy, protocol, src, dst)| {
                json!({ "policy": policy, "protocol": protocol, "srcPort": src, "dstPort": dst })
            })
            .collect();
        state.organization(org_id).acls.push(json!({
            "aclId": id,
            "name": name,
            "description": format!("{} ACL", name),
            "rules": rules,
            "ipVersion": ip_version,
            "createdAt": "2024-01-01T00:00:00Z",
            "updatedAt": "2024-01-01T00:00:00Z",
        }));
        id
    }

    /// Add a policy between two existing groups, referencing ACLs by name
    pub fn add_policy(
        &self,
        org_id: &str,
        source: &str,
        destination: &str,
        acls: &[&str],
        last_entry_rule: &str,
    ) -> String {
        let mut state = self.state.lock();
        let id = state.next_id();
        let org = state.organization(org_id);
        let group_ref = |name: &str| {
            org.groups
                .iter()
                .find(|g| g["name"] == name)
                .map(|g| json!({ "id": g["groupId"], "name": name, "sgt": g["sgt"] }))
                .unwrap_or_else(|| panic!("unknown group {}", name))
        };
        let acl_refs: Vec<Value> = acls
            .iter()
            .map(|name| {
                org.acls
                    .iter()
                    .find(|a| a["name"] == *name)
                    .map(|a| json!({ "id": a["aclId"], "name": name }))
                    .unwrap_or_else(|| panic!("unknown acl {}", name))
            })
            .collect();
        let policy = json!({
            "adaptivePolicyId": id,
            "sourceGroup": group_ref(source),
            "destinationGroup": group_ref(destination),
            "acls": acl_refs,
            "lastEntryRule": last_entry_rule,
            "createdAt": "2024-01-01T00:00:00Z",
            "updatedAt": "2024-01-01T00:00:00Z",
        });
        org.policies.push(policy);
        id
    }

    /// Answer GETs of `path` with `status` and a dashboard error body
    pub fn fail_path(&self, path: impl Into<String>, status: u16) {
        self.state.lock().failures.insert(path.into(), status);
    }

    /// All requests received so far
    pub fn requests(&self) -> Vec<RequestRecord> {
        self.state.lock().log.clone()
    }

    fn record(&self, method: &str, path: &str) {
        self.state.lock().log.push(RequestRecord {
            method: method.to_string(),
            path: path.to_string(),
        });
    }

    fn handle_get(&self, path: &str) -> ErsResponse {
        let state = self.state.lock();
        if let Some(status) = state.failures.get(path) {
            return errors(*status, "Injected failure");
        }

        if path == meraki::ORGANIZATIONS {
            let orgs: Vec<Value> = state
                .organizations
                .iter()
                .map(|o| json!({ "id": o.id, "name": o.name }))
                .collect();
            return ErsResponse::new(200, Value::Array(orgs));
        }

        for org in &state.organizations {
            let body = if path == meraki::groups(&org.id) {
                &org.groups
            } else if path == meraki::acls(&org.id) {
                &org.acls
            } else if path == meraki::policies(&org.id) {
                &org.policies
            } else {
                continue;
            };
            return ErsResponse::new(200, Value::Array(body.clone()));
        }
        errors(404, "Not found")
    }
}

fn errors(status: u16, message: &str) -> ErsResponse {
    ErsResponse::new(status, json!({ "errors": [message] }))
}

#[async_trait]
impl ErsTransport for FakeMerakiDashboard {
    async fn get(&self, path: &str) -> ErsResult<ErsResponse> {
        self.record("GET", path);
        Ok(self.handle_get(path))
    }

    async fn post(&self, path: &str, _body: &Value) -> ErsResult<ErsResponse> {
        self.record("POST", path);
        Ok(errors(405, "Method not allowed"))
    }

    async fn delete(&self, path: &str) -> ErsResult<ErsResponse> {
        self.record("DELETE", path);
        Ok(errors(405, "Method not allowed"))
    }
}
