//! Table layout shared by the SQL backends.
//!
//! Every collection gets one table holding the key columns, the origin, the
//! full object as JSON and the time it was last written.

use crate::objects::ObjectKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Dialect {
    Postgres,
    Sqlite,
}

impl Dialect {
    fn json_type(self) -> &'static str {
        match self {
            Dialect::Postgres => "JSONB",
            Dialect::Sqlite => "TEXT",
        }
    }

    fn timestamp_type(self) -> &'static str {
        match self {
            Dialect::Postgres => "TIMESTAMPTZ",
            Dialect::Sqlite => "TEXT",
        }
    }

    fn placeholder(self, index: usize) -> String {
        match self {
            Dialect::Postgres => format!("${index}"),
            Dialect::Sqlite => "?".to_string(),
        }
    }
}

fn key_columns(kind: ObjectKind) -> &'static [&'static str] {
    if kind.is_versioned() {
        &["id", "version"]
    } else {
        &["id"]
    }
}

fn columns(kind: ObjectKind) -> Vec<&'static str> {
    let mut columns = key_columns(kind).to_vec();
    columns.extend(["origin", "data", "_timestamp"]);
    columns
}

pub(crate) fn create_table_sql(kind: ObjectKind, dialect: Dialect) -> String {
    let version_column = if kind.is_versioned() {
        "version BIGINT NOT NULL, "
    } else {
        ""
    };
    format!(
        "CREATE TABLE IF NOT EXISTS {table} (\
         id TEXT NOT NULL, {version_column}\
         origin TEXT NOT NULL, \
         data {json} NOT NULL, \
         _timestamp {ts} NOT NULL, \
         PRIMARY KEY ({keys}))",
        table = kind.collection(),
        json = dialect.json_type(),
        ts = dialect.timestamp_type(),
        keys = key_columns(kind).join(", "),
    )
}

/// Insert-or-replace statement; binds follow [`columns`] order.
pub(crate) fn upsert_sql(kind: ObjectKind, dialect: Dialect) -> String {
    let columns = columns(kind);
    let placeholders: Vec<String> = (1..=columns.len())
        .map(|index| dialect.placeholder(index))
        .collect();
    let updates: Vec<String> = ["origin", "data", "_timestamp"]
        .iter()
        .map(|column| format!("{column} = excluded.{column}"))
        .collect();

    format!(
        "INSERT INTO {table} ({columns}) VALUES ({placeholders}) \
         ON CONFLICT ({keys}) DO UPDATE SET {updates}",
        table = kind.collection(),
        columns = columns.join(", "),
        placeholders = placeholders.join(", "),
        keys = key_columns(kind).join(", "),
        updates = updates.join(", "),
    )
}
