//! Schema validation and upgrade of I/O documents.

use crate::error::SchemaError;
use crate::submission::ObjectKind;
use regex::Regex;
use serde_json::{json, Map, Value};
use std::sync::LazyLock;

/// Validates documents and upgrades them to the latest version.
pub trait SchemaService: Send + Sync {
    fn validate(&self, doc: &Value) -> Result<(), SchemaError>;

    /// Return `doc` converted to the latest schema version.
    fn upgrade(&self, doc: Value) -> Result<Value, SchemaError>;
}

static ORIGIN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9_]+$").expect("valid regex"));

/// Structural checks for the KCIDB I/O format, versions 4.x and 5.x.
#[derive(Debug, Clone, Copy)]
pub struct IoSchema {
    pub latest_major: i64,
    pub latest_minor: i64,
    pub oldest_major: i64,
}

impl Default for IoSchema {
    fn default() -> Self {
        Self {
            latest_major: 5,
            latest_minor: 3,
            oldest_major: 4,
        }
    }
}

impl IoSchema {
    fn version(&self, root: &Map<String, Value>) -> Result<(i64, i64), SchemaError> {
        let version = root
            .get("version")
            .and_then(Value::as_object)
            .ok_or_else(|| SchemaError::invalid("/version", "missing version object"))?;
        let major = version
            .get("major")
            .and_then(Value::as_i64)
            .ok_or_else(|| SchemaError::invalid("/version/major", "expected integer"))?;
        let minor = version
            .get("minor")
            .and_then(Value::as_i64)
            .ok_or_else(|| SchemaError::invalid("/version/minor", "expected integer"))?;

        let supported = (self.oldest_major..=self.latest_major).contains(&major)
            && minor >= 0
            && (major < self.latest_major || minor <= self.latest_minor);
        if !supported {
            return Err(SchemaError::UnsupportedVersion { major, minor });
        }
        Ok((major, minor))
    }
}

impl SchemaService for IoSchema {
    fn validate(&self, doc: &Value) -> Result<(), SchemaError> {
        let root = doc
            .as_object()
            .ok_or_else(|| SchemaError::invalid("", "document is not an object"))?;
        self.version(root)?;

        for kind in ObjectKind::ALL {
            let Some(collection) = root.get(kind.collection()) else {
                continue;
            };
            let base = format!("/{}", kind.collection());
            let items = collection
                .as_array()
                .ok_or_else(|| SchemaError::invalid(&base, "expected array"))?;
            for (index, item) in items.iter().enumerate() {
                validate_object(kind, item, &format!("{base}/{index}"))?;
            }
        }
        Ok(())
    }

    fn upgrade(&self, mut doc: Value) -> Result<Value, SchemaError> {
        let root = doc
            .as_object_mut()
            .ok_or_else(|| SchemaError::invalid("", "document is not an object"))?;
        let (major, minor) = self.version(root)?;
        if (major, minor) != (self.latest_major, self.latest_minor) {
            root.insert(
                "version".to_string(),
                json!({"major": self.latest_major, "minor": self.latest_minor}),
            );
        }
        Ok(doc)
    }
}

fn validate_object(kind: ObjectKind, item: &Value, path: &str) -> Result<(), SchemaError> {
    let object = item
        .as_object()
        .ok_or_else(|| SchemaError::invalid(path, "expected object"))?;

    let origin = require_str(object, "origin", path)?;
    if !ORIGIN_RE.is_match(origin) {
        return Err(SchemaError::invalid(
            format!("{path}/origin"),
            format!("invalid origin '{origin}'"),
        ));
    }
    let id = require_str(object, "id", path)?;
    match id.split_once(':') {
        Some((prefix, local)) if prefix == origin && !local.is_empty() => {}
        _ => {
            return Err(SchemaError::invalid(
                format!("{path}/id"),
                format!("id '{id}' is not of the form '{origin}:<id>'"),
            ))
        }
    }

    match kind {
        ObjectKind::Checkout => {}
        ObjectKind::Build => {
            require_str(object, "checkout_id", path)?;
        }
        ObjectKind::Test => {
            require_str(object, "build_id", path)?;
        }
        ObjectKind::Issue => {
            require_int(object, "version", path)?;
        }
        ObjectKind::Incident => {
            require_str(object, "issue_id", path)?;
            require_int(object, "issue_version", path)?;
        }
    }

    if let Some(excerpt) = object.get("log_excerpt") {
        if !excerpt.is_string() {
            return Err(SchemaError::invalid(
                format!("{path}/log_excerpt"),
                "expected string",
            ));
        }
    }
    Ok(())
}

fn require_str<'a>(
    object: &'a Map<String, Value>,
    key: &str,
    path: &str,
) -> Result<&'a str, SchemaError> {
    object
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| SchemaError::invalid(format!("{path}/{key}"), "expected string"))
}

fn require_int(object: &Map<String, Value>, key: &str, path: &str) -> Result<i64, SchemaError> {
    object
        .get(key)
        .and_then(Value::as_i64)
        .ok_or_else(|| SchemaError::invalid(format!("{path}/{key}"), "expected integer"))
}
