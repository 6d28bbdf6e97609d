//! Verification helpers for testing synchronization passes
//!
//! Provides assertions over the state held by a [`FakeErsServer`].

use std::collections::{BTreeSet, HashMap};

use serde_json::Value;
use thiserror::Error;
use trustsec_common::Collection;

use crate::fixtures::ANY_TAG_ID;
use crate::FakeErsServer;

/// Verification error types
#[derive(Error, Debug)]
pub enum VerificationError {
    #[error("Expected {collection} named '{name}' not found")]
    NotFound { collection: String, name: String },

    #[error("Duplicate {collection} name '{name}'")]
    DuplicateName { collection: String, name: String },

    #[error("Cell '{cell}' references unknown {kind} id '{id}'")]
    DanglingReference {
        cell: String,
        kind: String,
        id: String,
    },

    #[error("Field mismatch for {name}.{field}: expected '{expected}', got '{actual}'")]
    ValueMismatch {
        name: String,
        field: String,
        expected: String,
        actual: String,
    },
}

/// Result type for verification operations
pub type VerifyResult<T> = Result<T, VerificationError>;

/// A cell reduced to (source name, destination name, ACL names)
pub type CellTriple = (String, String, Vec<String>);

/// Node state verification helper
pub struct ServerVerifier<'a> {
    server: &'a FakeErsServer,
}

impl<'a> ServerVerifier<'a> {
    /// Create a new verifier
    pub fn new(server: &'a FakeErsServer) -> Self {
        Self { server }
    }

    fn names_by_id(&self, collection: Collection) -> HashMap<String, String> {
        self.server
            .items(collection)
            .iter()
            .filter_map(|o| Some((str_field(o, "id")?, str_field(o, "name")?)))
            .collect()
    }

    /// Verify that an object with `name` exists
    pub fn assert_exists(&self, collection: Collection, name: &str) -> VerifyResult<Value> {
        self.server
            .find_by_name(collection, name)
            .ok_or_else(|| VerificationError::NotFound {
                collection: collection.to_string(),
                name: name.to_string(),
            })
    }

    /// Verify that a string field of the named object has `expected`
    pub fn assert_field(
        &self,
        collection: Collection,
        name: &str,
        field: &str,
        expected: &str,
    ) -> VerifyResult<()> {
        let object = self.assert_exists(collection, name)?;
        let actual = match object.get(field) {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        };
        if actual != expected {
            return Err(VerificationError::ValueMismatch {
                name: name.to_string(),
                field: field.to_string(),
                expected: expected.to_string(),
                actual,
            });
        }
        Ok(())
    }

    /// Verify that names are unique within a collection
    pub fn assert_unique_names(&self, collection: Collection) -> VerifyResult<()> {
        let mut seen = BTreeSet::new();
        for object in self.server.items(collection) {
            let name = str_field(&object, "name").unwrap_or_default();
            if !seen.insert(name.clone()) {
                return Err(VerificationError::DuplicateName {
                    collection: collection.to_string(),
                    name,
                });
            }
        }
        Ok(())
    }

    /// Resolve every cell to names, failing on dangling references.
    ///
    /// The hidden ANY tag resolves to "ANY".
    pub fn cell_triples(&self) -> VerifyResult<BTreeSet<CellTriple>> {
        let mut tags = self.names_by_id(Collection::Tag);
        tags.insert(ANY_TAG_ID.to_string(), "ANY".to_string());
        let acls = self.names_by_id(Collection::Acl);

        let mut triples = BTreeSet::new();
        for cell in self.server.items(Collection::Cell) {
            let cell_name = str_field(&cell, "name").unwrap_or_default();
            let tag_name = |field: &str| -> VerifyResult<String> {
                let id = str_field(&cell, field).unwrap_or_default();
                tags.get(&id)
                    .cloned()
                    .ok_or_else(|| VerificationError::DanglingReference {
                        cell: cell_name.clone(),
                        kind: "tag".into(),
                        id,
                    })
            };
            let source = tag_name("sourceSgtId")?;
            let destination = tag_name("destinationSgtId")?;

            let mut acl_names = Vec::new();
            for id in cell["sgacls"].as_array().into_iter().flatten() {
                let id = id.as_str().unwrap_or_default();
                let name = acls
                    .get(id)
                    .ok_or_else(|| VerificationError::DanglingReference {
                        cell: cell_name.clone(),
                        kind: "acl".into(),
                        id: id.to_string(),
                    })?;
                acl_names.push(name.clone());
            }
            triples.insert((source, destination, acl_names));
        }
        Ok(triples)
    }
}

fn str_field(object: &Value, field: &str) -> Option<String> {
    object.get(field).and_then(Value::as_str).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{cell_json, seed_platform_defaults, tag_json};

    #[test]
    fn test_cell_triples_resolve_any() {
        let server = FakeErsServer::new();
        seed_platform_defaults(&server);

        let triples = ServerVerifier::new(&server).cell_triples().unwrap();
        assert!(triples.contains(&(
            "ANY".to_string(),
            "ANY".to_string(),
            vec!["Permit IP".to_string()]
        )));
    }

    #[test]
    fn test_dangling_reference() {
        let server = FakeErsServer::new();
        let id = server.insert(Collection::Tag, tag_json("Guests", 6, ""));
        server.insert(Collection::Cell, cell_json("x", &id, "missing", &[], "DENY_IP"));

        let result = ServerVerifier::new(&server).cell_triples();
        assert!(matches!(
            result,
            Err(VerificationError::DanglingReference { .. })
        ));
    }

    #[test]
    fn test_assert_field() {
        let server = FakeErsServer::new();
        server.insert(Collection::Tag, tag_json("Guests", 6, "Guest Security Group"));
        let verifier = ServerVerifier::new(&server);
        assert!(verifier
            .assert_field(Collection::Tag, "Guests", "value", "6")
            .is_ok());
        assert!(verifier
            .assert_field(Collection::Tag, "Guests", "description", "other")
            .is_err());
    }
}
