//! Export rendering and export/import round trip

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use trustsec_common::{Collection, LimitedTransport};
use trustsec_sync::{classify, CellClass, SortKey, TrustsecSync, Workbook};
use trustsec_test::{
    acl_json, cell_json, seed_platform_defaults, tag_json, CellTriple, FakeErsServer,
    ServerVerifier, ANY_TAG_ID,
};

/// Three tags, two custom ACLs and four cells including a default-rule one
fn seed_policy(server: &FakeErsServer) {
    seed_platform_defaults(server);
    let unknown = server.id_of(Collection::Tag, "Unknown").unwrap();
    let employees = server.insert(Collection::Tag, tag_json("Employees", 4, "Employee Security Group"));
    let guests = server.insert(Collection::Tag, tag_json("Guests", 6, "Guest Security Group"));
    let contractors = server.insert(Collection::Tag, tag_json("Contractors", 5, "Contractors"));

    let block = server.insert(
        Collection::Acl,
        acl_json("BlockMalware", "IP_AGNOSTIC", &["deny icmp", "deny tcp dst eq 22"]),
    );
    let audit = server.insert(Collection::Acl, acl_json("Audit", "IPV4", &["permit ip log"]));

    server.insert(
        Collection::Cell,
        cell_json("Employees-Guests", &employees, &guests, &[&block], "NONE"),
    );
    server.insert(
        Collection::Cell,
        cell_json("Guests-Employees", &guests, &employees, &[&block, &audit], "NONE"),
    );
    server.insert(
        Collection::Cell,
        cell_json("Contractors-Employees", &contractors, &employees, &[], "DENY_IP"),
    );
    server.insert(
        Collection::Cell,
        cell_json("Employees-Unknown", &employees, &unknown, &[&audit], "NONE"),
    );
}

fn triples(server: &FakeErsServer) -> BTreeSet<CellTriple> {
    ServerVerifier::new(server).cell_triples().unwrap()
}

#[tokio::test]
async fn test_export_renders_matrix() {
    let server = Arc::new(FakeErsServer::new());
    seed_policy(&server);

    let export = TrustsecSync::with_page_size(server.clone(), 2)
        .export(SortKey::Name)
        .await
        .unwrap();

    assert!(export.failures.is_empty());
    assert_eq!(export.tags.len(), 5);
    assert_eq!(export.policies.len(), 5);

    let matrix = &export.matrix;
    let names: Vec<&str> = matrix.rows().iter().map(|r| r.name.as_str()).collect();
    assert_eq!(
        names,
        vec!["Contractors", "Employees", "Guests", "TrustSec_Devices", "Unknown"]
    );
    assert_eq!(matrix.get("Employees", "Guests"), Some("BlockMalware"));
    assert_eq!(matrix.get("Guests", "Employees"), Some("BlockMalware,Audit"));
    assert_eq!(matrix.get("Contractors", "Employees"), Some("deny ip"));
    assert_eq!(matrix.non_empty_cells().len(), 4);

    // ANY-ANY stays in the policy list but never becomes a row
    assert!(export.policies.iter().any(|p| p.source == "ANY"));
    assert!(matrix.row("ANY").is_none());

    assert_eq!(classify(matrix.get("Contractors", "Employees").unwrap()), CellClass::Deny);
    assert_eq!(classify(matrix.get("Employees", "Guests").unwrap()), CellClass::Custom);
}

#[tokio::test]
async fn test_export_sort_by_value() {
    let server = Arc::new(FakeErsServer::new());
    seed_policy(&server);

    let export = TrustsecSync::with_page_size(server.clone(), 100)
        .export(SortKey::Value)
        .await
        .unwrap();
    let values: Vec<u16> = export.matrix.rows().iter().map(|r| r.value).collect();
    assert_eq!(values, vec![0, 2, 4, 5, 6]);
    assert_eq!(export.matrix.columns()[2], "Employees");
}

#[tokio::test]
async fn test_export_workbook_carries_colours() {
    let server = Arc::new(FakeErsServer::new());
    seed_policy(&server);

    let export = TrustsecSync::with_page_size(server.clone(), 100)
        .export(SortKey::Value)
        .await
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("matrix.json");
    export.to_workbook().write(&path).unwrap();
    let colours = Workbook::read(&path).unwrap().colours;

    assert_eq!(colours.headers, vec!["SGT", "Destination", "Class", "Reserved", "Colour"]);
    assert_eq!(colours.rows.len(), 25);

    let row_of = |source: &str, destination: &str| {
        colours
            .rows
            .iter()
            .find(|r| r[0] == source && r[1] == destination)
            .cloned()
            .unwrap()
    };
    assert_eq!(
        row_of("Contractors", "Employees"),
        vec!["Contractors", "Employees", "deny", "false", "#EF7775"]
    );
    assert_eq!(
        row_of("Employees", "Guests"),
        vec!["Employees", "Guests", "custom", "false", "#64BBE3"]
    );
    // Reserved destination leaves the cell coloured by content
    assert_eq!(
        row_of("Employees", "Unknown"),
        vec!["Employees", "Unknown", "custom", "false", "#64BBE3"]
    );
    assert_eq!(
        row_of("Unknown", "Employees"),
        vec!["Unknown", "Employees", "empty", "true", "#F2F2F2"]
    );
    assert_eq!(
        row_of("Guests", "Contractors"),
        vec!["Guests", "Contractors", "empty", "false", "#F2F2F2"]
    );
}

#[tokio::test]
async fn test_export_detail_failure_reported() {
    let server = Arc::new(FakeErsServer::new());
    seed_policy(&server);
    let guests = server.id_of(Collection::Tag, "Guests").unwrap();
    server.fail_detail(guests);

    let export = TrustsecSync::with_page_size(server.clone(), 100)
        .export(SortKey::Name)
        .await
        .unwrap();

    assert_eq!(export.tags.len(), 4);
    // The missing tag fails its detail and both cells that reference it
    assert_eq!(export.failures.len(), 3);
    assert!(export.matrix.row("Guests").is_none());
}

#[tokio::test]
async fn test_round_trip_reproduces_cells() {
    let source = Arc::new(FakeErsServer::new());
    seed_policy(&source);

    let export = TrustsecSync::with_page_size(source.clone(), 3)
        .export(SortKey::Value)
        .await
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("matrix.json");
    export.to_workbook().write(&path).unwrap();
    let workbook = Workbook::read(&path).unwrap();
    assert_eq!(workbook.acls.rows.len(), 6);
    assert_eq!(workbook.policies.rows.len(), 4);

    let target = Arc::new(FakeErsServer::new());
    seed_platform_defaults(&target);
    let report = TrustsecSync::with_page_size(target.clone(), 3)
        .import(&workbook)
        .await
        .unwrap();

    assert!(report.is_clean());
    assert_eq!(report.tags.succeeded(), 3);
    assert_eq!(report.acls.succeeded(), 2);
    assert_eq!(report.cells.succeeded(), 4);
    assert_eq!(triples(&source), triples(&target));

    let contractors = target.id_of(Collection::Tag, "Contractors").unwrap();
    let denied = target
        .find_by_name(Collection::Cell, "Contractors-Employees")
        .unwrap();
    assert_eq!(denied["sourceSgtId"], contractors.as_str());
    assert_eq!(denied["defaultRule"], "DENY_IP");

    let verifier = ServerVerifier::new(&target);
    verifier
        .assert_field(Collection::Acl, "BlockMalware", "aclcontent", "deny icmp\ndeny tcp dst eq 22")
        .unwrap();
    verifier
        .assert_field(Collection::Acl, "Audit", "ipVersion", "IPV4")
        .unwrap();
    verifier
        .assert_field(Collection::Tag, "Contractors", "value", "5")
        .unwrap();
}

#[tokio::test]
async fn test_export_within_connection_limit() {
    let server = Arc::new(FakeErsServer::new().with_latency(Duration::from_millis(2)));
    seed_policy(&server);
    let limited = Arc::new(LimitedTransport::new(server.clone(), 2));

    let export = TrustsecSync::with_page_size(limited, 2)
        .export(SortKey::Name)
        .await
        .unwrap();

    assert!(export.failures.is_empty());
    assert!(server.peak_in_flight() <= 2);
}

#[test]
fn test_any_id_matches_fixture() {
    assert_eq!(trustsec_sync::types::ANY_TAG_ID, ANY_TAG_ID);
}
