//! Object collections of a KCIDB I/O document and their table rows.

use crate::error::{Result, StoreError};
use serde_json::Value;
use std::fmt;

/// The object collections a submission may carry, in load (dependency) order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ObjectKind {
    Checkout,
    Build,
    Test,
    Issue,
    Incident,
}

impl ObjectKind {
    /// All kinds, checkouts first: builds reference checkouts, tests reference builds.
    pub const ALL: [ObjectKind; 5] = [
        ObjectKind::Checkout,
        ObjectKind::Build,
        ObjectKind::Test,
        ObjectKind::Issue,
        ObjectKind::Incident,
    ];

    /// Name of the collection in the document (also the table name).
    pub fn collection(&self) -> &'static str {
        match self {
            ObjectKind::Checkout => "checkouts",
            ObjectKind::Build => "builds",
            ObjectKind::Test => "tests",
            ObjectKind::Issue => "issues",
            ObjectKind::Incident => "incidents",
        }
    }

    /// Issues are versioned; every other kind is keyed by `id` alone.
    pub fn is_versioned(&self) -> bool {
        matches!(self, ObjectKind::Issue)
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.collection())
    }
}

/// One row to be written: key columns plus the full object.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectRow<'a> {
    pub kind: ObjectKind,
    pub id: &'a str,
    pub origin: &'a str,
    pub version: Option<i64>,
    pub data: &'a Value,
}

/// Extract every row of `doc`, grouped by kind in load order.
///
/// Missing collections are empty; a collection that is not an array of
/// objects, or an object without a string `id`/`origin`, is a constraint error.
pub fn object_rows(doc: &Value) -> Result<Vec<ObjectRow<'_>>> {
    let root = doc
        .as_object()
        .ok_or_else(|| StoreError::constraint("document is not an object"))?;

    let mut rows = Vec::new();
    for kind in ObjectKind::ALL {
        let Some(collection) = root.get(kind.collection()) else {
            continue;
        };
        let items = collection.as_array().ok_or_else(|| {
            StoreError::constraint(format!("{} is not an array", kind.collection()))
        })?;

        for (index, item) in items.iter().enumerate() {
            let id = string_field(item, "id").ok_or_else(|| {
                StoreError::constraint(format!("{}[{}] has no string id", kind, index))
            })?;
            let origin = string_field(item, "origin").ok_or_else(|| {
                StoreError::constraint(format!("{}[{}] has no string origin", kind, index))
            })?;
            let version = if kind.is_versioned() {
                Some(item.get("version").and_then(Value::as_i64).ok_or_else(|| {
                    StoreError::constraint(format!("{}[{}] has no integer version", kind, index))
                })?)
            } else {
                None
            };

            rows.push(ObjectRow {
                kind,
                id,
                origin,
                version,
                data: item,
            });
        }
    }

    Ok(rows)
}

fn string_field<'a>(item: &'a Value, key: &str) -> Option<&'a str> {
    item.get(key).and_then(Value::as_str)
}

/// Per-kind count of rows written by one load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub checkouts: usize,
    pub builds: usize,
    pub tests: usize,
    pub issues: usize,
    pub incidents: usize,
}

impl LoadReport {
    pub fn record(&mut self, kind: ObjectKind) {
        match kind {
            ObjectKind::Checkout => self.checkouts += 1,
            ObjectKind::Build => self.builds += 1,
            ObjectKind::Test => self.tests += 1,
            ObjectKind::Issue => self.issues += 1,
            ObjectKind::Incident => self.incidents += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.checkouts + self.builds + self.tests + self.issues + self.incidents
    }

    pub(crate) fn from_rows(rows: &[ObjectRow<'_>]) -> Self {
        let mut report = Self::default();
        for row in rows {
            report.record(row.kind);
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rows_follow_dependency_order() {
        let doc = json!({
            "version": {"major": 5, "minor": 3},
            "tests": [{"id": "lab:t1", "origin": "lab", "build_id": "lab:b1"}],
            "builds": [{"id": "lab:b1", "origin": "lab", "checkout_id": "lab:c1"}],
            "checkouts": [{"id": "lab:c1", "origin": "lab"}],
        });

        let rows = object_rows(&doc).unwrap();
        let kinds: Vec<_> = rows.iter().map(|row| row.kind).collect();
        assert_eq!(kinds, vec![ObjectKind::Checkout, ObjectKind::Build, ObjectKind::Test]);
        assert_eq!(rows[1].id, "lab:b1");
        assert_eq!(rows[1].data["checkout_id"], "lab:c1");
    }

    #[test]
    fn test_issue_rows_need_version() {
        let doc = json!({"issues": [{"id": "lab:i1", "origin": "lab"}]});
        let err = object_rows(&doc).unwrap_err();
        assert!(matches!(err, StoreError::Constraint(msg) if msg.contains("issues[0]")));

        let doc = json!({"issues": [{"id": "lab:i1", "origin": "lab", "version": 2}]});
        let rows = object_rows(&doc).unwrap();
        assert_eq!(rows[0].version, Some(2));
    }

    #[test]
    fn test_missing_id_is_constraint_error() {
        let doc = json!({"builds": [{"origin": "lab"}]});
        assert!(matches!(object_rows(&doc), Err(StoreError::Constraint(_))));
    }

    #[test]
    fn test_collection_must_be_array() {
        let doc = json!({"checkouts": {"id": "lab:c1"}});
        assert!(matches!(object_rows(&doc), Err(StoreError::Constraint(_))));
    }

    #[test]
    fn test_load_report_counts() {
        let doc = json!({
            "checkouts": [{"id": "lab:c1", "origin": "lab"}],
            "builds": [
                {"id": "lab:b1", "origin": "lab"},
                {"id": "lab:b2", "origin": "lab"}
            ],
        });
        let rows = object_rows(&doc).unwrap();
        let report = LoadReport::from_rows(&rows);
        assert_eq!(report.checkouts, 1);
        assert_eq!(report.builds, 2);
        assert_eq!(report.total(), 3);
    }
}
