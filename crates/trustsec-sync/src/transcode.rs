//! Matrix transcoding in both directions.
//!
//! Export turns resolved tags, ACLs and cells into policy records and a
//! square matrix. Import derives tag and ACL records from the workbook and,
//! once those exist remotely, synthesizes one cell per non-empty matrix
//! entry. A cell that cannot be synthesized fails alone.

use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};
use trustsec_common::{ErsError, ErsResult};

use crate::matrix::{Matrix, MatrixRow, SortKey};
use crate::report::ItemFailure;
use crate::table::Table;
use crate::types::{
    is_reserved_acl, is_reserved_tag, split_rules, validate_name, Acl, Cell, CellStatus,
    DefaultRule, IpVersion, Tag, ANY_TAG_NAME,
};

/// Flat ACL table headers.
pub const ACL_HEADERS: [&str; 4] = ["name", "description", "ipVersion", "aclcontent"];

/// Flat tag table headers.
pub const TAG_HEADERS: [&str; 4] = ["name", "value", "description", "id"];

/// Flat policy table headers.
pub const POLICY_HEADERS: [&str; 5] = ["source", "destination", "acls", "status", "defaultRule"];

/// A cell with its references resolved to names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyRecord {
    pub source: String,
    pub destination: String,
    pub acls: Vec<String>,
    pub status: CellStatus,
    pub default_rule: DefaultRule,
}

impl PolicyRecord {
    /// Matrix text: comma-joined ACL names, else the default-rule text.
    pub fn cell_text(&self) -> String {
        if self.acls.is_empty() {
            self.default_rule.as_text().to_string()
        } else {
            self.acls.join(",")
        }
    }
}

/// Resolve every cell's references to names.
///
/// The hidden ANY tag is always resolvable. A cell with a dangling
/// reference is reported and left out.
pub fn policy_records(
    tags: &[Tag],
    acls: &[Acl],
    cells: &[Cell],
) -> (Vec<PolicyRecord>, Vec<ItemFailure>) {
    let any = Tag::any();
    let tag_names: HashMap<&str, &str> = tags
        .iter()
        .chain(std::iter::once(&any))
        .map(|t| (t.id.as_str(), t.name.as_str()))
        .collect();
    let acl_names: HashMap<&str, &str> = acls
        .iter()
        .map(|a| (a.id.as_str(), a.name.as_str()))
        .collect();

    let mut records = Vec::new();
    let mut failures = Vec::new();
    for cell in cells {
        match policy_record(cell, &tag_names, &acl_names) {
            Ok(record) => records.push(record),
            Err(error) => {
                warn!(cell = %cell.name, %error, "Skipping unresolvable cell");
                failures.push(ItemFailure::new(cell.name.clone(), error));
            }
        }
    }
    (records, failures)
}

fn policy_record(
    cell: &Cell,
    tag_names: &HashMap<&str, &str>,
    acl_names: &HashMap<&str, &str>,
) -> ErsResult<PolicyRecord> {
    let tag = |id: &str| {
        tag_names
            .get(id)
            .map(|n| n.to_string())
            .ok_or_else(|| ErsError::lookup("tag id", id))
    };
    let acls = cell
        .acl_ids
        .iter()
        .map(|id| {
            acl_names
                .get(id.as_str())
                .map(|n| n.to_string())
                .ok_or_else(|| ErsError::lookup("acl id", id.as_str()))
        })
        .collect::<ErsResult<Vec<_>>>()?;

    Ok(PolicyRecord {
        source: tag(&cell.source_tag_id)?,
        destination: tag(&cell.destination_tag_id)?,
        acls,
        status: cell.status,
        default_rule: cell.default_rule,
    })
}

/// Build the visible matrix: every tag except ANY, one cell per policy.
pub fn export_matrix(tags: &[Tag], policies: &[PolicyRecord], sort: SortKey) -> Matrix {
    let rows = tags
        .iter()
        .filter(|t| t.name != ANY_TAG_NAME)
        .map(|t| MatrixRow::new(t.name.clone(), t.value, t.description.clone()))
        .collect();
    let mut matrix = Matrix::square(rows);
    matrix.sort_by(sort);

    for policy in policies {
        if policy.source == ANY_TAG_NAME {
            continue;
        }
        let text = policy.cell_text();
        if text.is_empty() {
            continue;
        }
        if !matrix.set(&policy.source, &policy.destination, text) {
            debug!(
                source = %policy.source,
                destination = %policy.destination,
                "Policy has no matrix position"
            );
        }
    }
    matrix
}

/// Flat tag table, sorted by name.
pub fn tag_table(tags: &[Tag]) -> Table {
    let mut sorted: Vec<&Tag> = tags.iter().filter(|t| t.name != ANY_TAG_NAME).collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));

    let mut table = Table::new(TAG_HEADERS);
    for tag in sorted {
        table.push_row([
            tag.name.clone(),
            tag.value.to_string(),
            tag.description.clone(),
            tag.id.clone(),
        ]);
    }
    table
}

/// Flat ACL table, sorted by name. Readable back by [`derive_acls`].
pub fn acl_table(acls: &[Acl]) -> Table {
    let mut sorted: Vec<&Acl> = acls.iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));

    let mut table = Table::new(ACL_HEADERS);
    for acl in sorted {
        table.push_row([
            acl.name.clone(),
            acl.description.clone(),
            acl.ip_version.to_string(),
            acl.content(),
        ]);
    }
    table
}

/// Flat policy table without ANY sources.
pub fn policy_table(policies: &[PolicyRecord]) -> Table {
    let mut table = Table::new(POLICY_HEADERS);
    for policy in policies.iter().filter(|p| p.source != ANY_TAG_NAME) {
        table.push_row([
            policy.source.clone(),
            policy.destination.clone(),
            policy.acls.join(","),
            policy.status.to_string(),
            policy.default_rule.to_string(),
        ]);
    }
    table
}

/// Tags to create from matrix rows, without platform tags.
pub fn derive_tags(matrix: &Matrix) -> Vec<Tag> {
    matrix
        .rows()
        .iter()
        .filter(|r| !is_reserved_tag(&r.name))
        .map(|r| Tag::new(r.name.clone(), r.value, r.description.clone()))
        .collect()
}

/// ACLs to create from the flat ACL table, without platform ACLs.
///
/// Only the `name` column is required.
pub fn derive_acls(table: &Table) -> ErsResult<Vec<Acl>> {
    if table.headers.is_empty() && table.rows.is_empty() {
        return Ok(Vec::new());
    }
    let name_col = table
        .column_index(ACL_HEADERS[0])
        .ok_or_else(|| ErsError::shape("ACL table has no 'name' column"))?;
    let description_col = table.column_index(ACL_HEADERS[1]);
    let version_col = table.column_index(ACL_HEADERS[2]);
    let content_col = table.column_index(ACL_HEADERS[3]);
    let text = |row: usize, col: Option<usize>| col.map(|c| table.cell(row, c)).unwrap_or("");

    let mut seen = HashSet::new();
    let mut acls = Vec::new();
    for row in 0..table.rows.len() {
        let name = table.cell(row, name_col).trim();
        if name.is_empty() {
            continue;
        }
        validate_name("acl", name)?;
        if !seen.insert(name.to_string()) {
            return Err(ErsError::shape(format!("duplicate acl '{}'", name)));
        }
        if is_reserved_acl(name) {
            debug!(name, "Skipping platform ACL");
            continue;
        }

        let ip_version: IpVersion = text(row, version_col)
            .parse()
            .map_err(|e: String| ErsError::shape(format!("acl '{}': {}", name, e)))?;
        acls.push(
            Acl::new(name, ip_version, split_rules(text(row, content_col)))
                .with_description(text(row, description_col).trim()),
        );
    }
    Ok(acls)
}

/// Build one cell per non-empty matrix entry against created tags and ACLs.
pub fn synthesize_cells(
    matrix: &Matrix,
    tags: &[Tag],
    acls: &[Acl],
) -> (Vec<Cell>, Vec<ItemFailure>) {
    let any = Tag::any();
    let tag_ids: HashMap<&str, &str> = tags
        .iter()
        .chain(std::iter::once(&any))
        .map(|t| (t.name.as_str(), t.id.as_str()))
        .collect();
    let acl_ids: HashMap<&str, &str> = acls
        .iter()
        .map(|a| (a.name.as_str(), a.id.as_str()))
        .collect();

    let mut cells = Vec::new();
    let mut failures = Vec::new();
    for (row, column, text) in matrix.non_empty_cells() {
        let name = Cell::name_for(row, column);
        match synthesize_cell(&name, row, column, text, &tag_ids, &acl_ids) {
            Ok(cell) => cells.push(cell),
            Err(error) => {
                warn!(cell = %name, %error, "Cannot build cell");
                failures.push(ItemFailure::new(name, error));
            }
        }
    }
    (cells, failures)
}

fn synthesize_cell(
    name: &str,
    source: &str,
    destination: &str,
    text: &str,
    tag_ids: &HashMap<&str, &str>,
    acl_ids: &HashMap<&str, &str>,
) -> ErsResult<Cell> {
    validate_name("cell", name)?;
    let tag_id = |tag: &str| {
        tag_ids
            .get(tag)
            .map(|id| id.to_string())
            .ok_or_else(|| ErsError::lookup("tag", tag))
    };
    let (acl_list, default_rule) = resolve_cell_text(text, acl_ids)?;

    Ok(Cell {
        id: String::new(),
        name: name.to_string(),
        description: String::new(),
        source_tag_id: tag_id(source)?,
        destination_tag_id: tag_id(destination)?,
        status: CellStatus::Enabled,
        default_rule,
        acl_ids: acl_list,
    })
}

/// ACL names win over default-rule keywords.
fn resolve_cell_text(
    text: &str,
    acl_ids: &HashMap<&str, &str>,
) -> ErsResult<(Vec<String>, DefaultRule)> {
    let names: Vec<&str> = text
        .split(',')
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .collect();
    let resolved: Vec<Option<&&str>> = names.iter().map(|n| acl_ids.get(n)).collect();

    if !names.is_empty() && resolved.iter().all(Option::is_some) {
        let ids = resolved.into_iter().flatten().map(|id| id.to_string()).collect();
        return Ok((ids, DefaultRule::None));
    }
    if let Ok(rule) = text.parse::<DefaultRule>() {
        return Ok((Vec::new(), rule));
    }

    let missing = names
        .iter()
        .zip(&resolved)
        .find(|(_, id)| id.is_none())
        .map(|(n, _)| *n)
        .unwrap_or(text);
    Err(ErsError::lookup("acl", missing))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ANY_TAG_ID;
    use pretty_assertions::assert_eq;

    fn tag(id: &str, name: &str, value: u16) -> Tag {
        Tag {
            id: id.into(),
            ..Tag::new(name, value, format!("{} group", name))
        }
    }

    fn acl(id: &str, name: &str) -> Acl {
        Acl {
            id: id.into(),
            ..Acl::new(name, IpVersion::Agnostic, ["deny ip"])
        }
    }

    fn cell(source: &str, destination: &str, acls: &[&str], rule: DefaultRule) -> Cell {
        Cell {
            id: format!("c-{}-{}", source, destination),
            name: format!("{}-{}", source, destination),
            description: String::new(),
            source_tag_id: source.into(),
            destination_tag_id: destination.into(),
            status: CellStatus::Enabled,
            default_rule: rule,
            acl_ids: acls.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_policy_records_resolve_any() {
        let tags = vec![tag("t4", "Employees", 4)];
        let acls = vec![acl("a1", "Permit IP")];
        let cells = vec![
            cell(ANY_TAG_ID, ANY_TAG_ID, &["a1"], DefaultRule::None),
            cell("t4", "t9", &[], DefaultRule::DenyIp),
        ];
        let (records, failures) = policy_records(&tags, &acls, &cells);

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].source, "ANY");
        assert_eq!(failures.len(), 1);
        assert!(matches!(failures[0].error, ErsError::Lookup { .. }));
    }

    #[test]
    fn test_export_matrix_default_rule_text() {
        let tags = vec![tag("t4", "Employees", 4), tag("t6", "Guests", 6)];
        let acls = vec![acl("a1", "BlockMalware"), acl("a2", "Audit")];
        let cells = vec![
            cell("t4", "t6", &["a1", "a2"], DefaultRule::None),
            cell("t6", "t4", &[], DefaultRule::DenyIp),
            cell("t6", "t6", &[], DefaultRule::None),
            cell(ANY_TAG_ID, "t4", &[], DefaultRule::PermitIp),
        ];
        let (records, _) = policy_records(&tags, &acls, &cells);
        let matrix = export_matrix(&tags, &records, SortKey::Name);

        assert_eq!(matrix.get("Employees", "Guests"), Some("BlockMalware,Audit"));
        assert_eq!(matrix.get("Guests", "Employees"), Some("deny ip"));
        assert_eq!(matrix.get("Guests", "Guests"), None);
        assert_eq!(matrix.non_empty_cells().len(), 2);
        assert!(matrix.row("ANY").is_none());
    }

    #[test]
    fn test_derive_tags_excludes_reserved() {
        let matrix = Matrix::square(vec![
            MatrixRow::new("Unknown", 0, ""),
            MatrixRow::new("TrustSec_Devices", 2, ""),
            MatrixRow::new("Employees", 4, "d1"),
        ]);
        let names: Vec<String> = derive_tags(&matrix).into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["Employees"]);
    }

    #[test]
    fn test_derive_acls() {
        let mut table = Table::new(ACL_HEADERS);
        table.push_row(["Permit IP", "", "IP_AGNOSTIC", "permit ip"]);
        table.push_row(["BlockMalware", "Block Malware", "IPV4", "deny icmp\ndeny tcp dst eq 22"]);
        table.push_row(["", "", "", ""]);

        let acls = derive_acls(&table).unwrap();
        assert_eq!(acls.len(), 1);
        assert_eq!(acls[0].ip_version, IpVersion::Ipv4);
        assert_eq!(acls[0].rules, vec!["deny icmp", "deny tcp dst eq 22"]);
        assert_eq!(acls[0].description, "Block Malware");
    }

    #[test]
    fn test_derive_acls_needs_name_column() {
        let table = Table::new(["description"]);
        assert!(matches!(derive_acls(&table), Err(ErsError::Shape { .. })));
        assert!(derive_acls(&Table::default()).unwrap().is_empty());
    }

    #[test]
    fn test_synthesize_cells() {
        let mut matrix = Matrix::square(vec![
            MatrixRow::new("Employees", 4, ""),
            MatrixRow::new("Guests", 6, ""),
        ]);
        matrix.set("Employees", "Guests", "BlockMalware");
        matrix.set("Guests", "Employees", "deny ip");
        matrix.set("Guests", "Guests", "Unheard");

        let tags = vec![tag("t4", "Employees", 4), tag("t6", "Guests", 6)];
        let acls = vec![acl("a1", "BlockMalware")];
        let (cells, failures) = synthesize_cells(&matrix, &tags, &acls);

        assert_eq!(cells.len(), 2);
        let blocked = cells.iter().find(|c| c.name == "Employees-Guests").unwrap();
        assert_eq!(blocked.source_tag_id, "t4");
        assert_eq!(blocked.destination_tag_id, "t6");
        assert_eq!(blocked.acl_ids, vec!["a1"]);
        assert_eq!(blocked.default_rule, DefaultRule::None);

        let denied = cells.iter().find(|c| c.name == "Guests-Employees").unwrap();
        assert!(denied.acl_ids.is_empty());
        assert_eq!(denied.default_rule, DefaultRule::DenyIp);

        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].key, "Guests-Guests");
        assert_eq!(failures[0].error.to_string(), "No acl named 'Unheard'");
    }

    #[test]
    fn test_acl_name_beats_keyword() {
        let acls: HashMap<&str, &str> = [("Deny IP", "a9")].into_iter().collect();
        let (ids, rule) = resolve_cell_text("Deny IP", &acls).unwrap();
        assert_eq!(ids, vec!["a9"]);
        assert_eq!(rule, DefaultRule::None);

        let (ids, rule) = resolve_cell_text("permit ip", &acls).unwrap();
        assert!(ids.is_empty());
        assert_eq!(rule, DefaultRule::PermitIp);
    }

    #[test]
    fn test_long_cell_name_fails_alone() {
        let long = "A".repeat(20);
        let mut matrix = Matrix::square(vec![
            MatrixRow::new(long.clone(), 10, ""),
            MatrixRow::new("B", 11, ""),
        ]);
        matrix.set(&long, &long, "deny ip");
        matrix.set("B", "B", "deny ip");

        let tags = vec![tag("t10", &long, 10), tag("t11", "B", 11)];
        let (cells, failures) = synthesize_cells(&matrix, &tags, &[]);
        assert_eq!(cells.len(), 1);
        assert_eq!(failures.len(), 1);
        assert!(matches!(failures[0].error, ErsError::Shape { .. }));
    }

    #[test]
    fn test_flat_tables() {
        let tags = vec![tag("t6", "Guests", 6), tag("t4", "Employees", 4)];
        let table = tag_table(&tags);
        assert_eq!(table.rows[0][0], "Employees");

        let policies = vec![
            PolicyRecord {
                source: "ANY".into(),
                destination: "ANY".into(),
                acls: vec!["Permit IP".into()],
                status: CellStatus::Enabled,
                default_rule: DefaultRule::None,
            },
            PolicyRecord {
                source: "Employees".into(),
                destination: "Guests".into(),
                acls: vec![],
                status: CellStatus::Monitor,
                default_rule: DefaultRule::DenyIp,
            },
        ];
        let table = policy_table(&policies);
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0], vec!["Employees", "Guests", "", "monitor", "deny ip"]);
    }
}
