//! Core record types for the table catalogue.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SchemacatError;

// ---------------------------------------------------------------------------
// FieldRecord
// ---------------------------------------------------------------------------

/// One column of a documented table.
///
/// Textual attributes use the empty string for "absent". Flags are derived
/// from the presence of a checked marker in the source markup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRecord {
    /// Column name.
    #[serde(default, deserialize_with = "lenient::text")]
    pub name: String,
    /// Display name / short comment.
    #[serde(default, deserialize_with = "lenient::text")]
    pub comment: String,
    /// Declared SQL type.
    #[serde(rename = "type", default, deserialize_with = "lenient::text")]
    pub data_type: String,
    /// Declared length or precision.
    #[serde(default, deserialize_with = "lenient::text")]
    pub length: String,
    #[serde(default, deserialize_with = "lenient::flag")]
    pub nullable: bool,
    #[serde(default, deserialize_with = "lenient::flag")]
    pub is_foreign_key: bool,
    #[serde(default, deserialize_with = "lenient::flag")]
    pub is_auto_increment: bool,
    /// Default value expression.
    #[serde(default, deserialize_with = "lenient::text")]
    pub default: String,
    #[serde(default, deserialize_with = "lenient::flag")]
    pub is_primary_key: bool,
    /// Referenced table/column for foreign keys.
    #[serde(default, deserialize_with = "lenient::text")]
    pub foreign_key_info: String,
    /// Free-form description.
    #[serde(default, deserialize_with = "lenient::text")]
    pub description: String,
}

impl FieldRecord {
    /// Number of attributes carrying a value (non-empty text or a set flag).
    pub fn filled_count(&self) -> usize {
        let texts = [
            &self.name,
            &self.comment,
            &self.data_type,
            &self.length,
            &self.default,
            &self.foreign_key_info,
            &self.description,
        ];
        let flags = [
            self.nullable,
            self.is_foreign_key,
            self.is_auto_increment,
            self.is_primary_key,
        ];
        texts.iter().filter(|t| !t.is_empty()).count() + flags.iter().filter(|f| **f).count()
    }
}

// ---------------------------------------------------------------------------
// TableRecord
// ---------------------------------------------------------------------------

/// One catalogued table, keyed by `table_name`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRecord {
    /// Unique catalogue key. Empty means the record is not catalogue-eligible.
    #[serde(default, deserialize_with = "lenient::text")]
    pub table_name: String,
    /// Display (Chinese) name of the table.
    #[serde(default, deserialize_with = "lenient::text")]
    pub table_comment: String,
    /// Owning database.
    #[serde(default, deserialize_with = "lenient::text")]
    pub db_name: String,
    /// Owning module / service.
    #[serde(default, deserialize_with = "lenient::text")]
    pub module: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub description: String,
    /// Document the record was extracted from.
    #[serde(rename = "file", default, deserialize_with = "lenient::text")]
    pub source_file: String,
    /// When the record was last extracted. `None` for legacy records.
    #[serde(
        default,
        deserialize_with = "lenient::timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_updated: Option<DateTime<Utc>>,
    /// Columns, in source document order.
    #[serde(default, deserialize_with = "lenient::list")]
    pub fields: Vec<FieldRecord>,
}

impl TableRecord {
    /// Create an otherwise empty record for `table_name` extracted from `source_file`.
    pub fn new(table_name: impl Into<String>, source_file: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            source_file: source_file.into(),
            ..Self::default()
        }
    }

    /// Whether the record may enter the catalogue.
    pub fn is_catalogue_eligible(&self) -> bool {
        !self.table_name.trim().is_empty()
    }

    /// Number of attributes carrying a value, including every field's attributes.
    pub fn filled_count(&self) -> usize {
        let header = [
            &self.table_name,
            &self.table_comment,
            &self.db_name,
            &self.module,
            &self.description,
            &self.source_file,
        ]
        .iter()
        .filter(|t| !t.is_empty())
        .count();

        header
            + usize::from(self.last_updated.is_some())
            + self.fields.iter().map(FieldRecord::filled_count).sum::<usize>()
    }
}

// ---------------------------------------------------------------------------
// MergeStrategy
// ---------------------------------------------------------------------------

/// Conflict policy applied when two records share a `table_name`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeStrategy {
    /// Keep the record with the newer `last_updated`; ties keep the stored one.
    #[default]
    Latest,
    /// Keep whichever record arrived first.
    First,
    /// Fill the stored record's empty attributes from the incoming one.
    Merge,
}

impl fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Latest => "latest",
            Self::First => "first",
            Self::Merge => "merge",
        };
        f.write_str(s)
    }
}

impl FromStr for MergeStrategy {
    type Err = SchemacatError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "latest" => Ok(Self::Latest),
            "first" => Ok(Self::First),
            "merge" => Ok(Self::Merge),
            other => Err(SchemacatError::config(format!(
                "unknown merge strategy '{other}': expected 'latest', 'first', or 'merge'"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Lenient deserializers for catalogues written by older tooling
// ---------------------------------------------------------------------------

mod lenient {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer};

    /// Any JSON scalar an older catalogue may have used for an attribute.
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Scalar {
        Text(String),
        Flag(bool),
        Int(i64),
        Float(f64),
    }

    pub(super) fn text<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        Ok(match Option::<Scalar>::deserialize(d)? {
            None => String::new(),
            Some(Scalar::Text(s)) => s,
            Some(Scalar::Flag(b)) => b.to_string(),
            Some(Scalar::Int(n)) => n.to_string(),
            Some(Scalar::Float(n)) => n.to_string(),
        })
    }

    pub(super) fn flag<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
        Ok(match Option::<Scalar>::deserialize(d)? {
            None => false,
            Some(Scalar::Flag(b)) => b,
            Some(Scalar::Int(n)) => n != 0,
            Some(Scalar::Float(n)) => n != 0.0,
            Some(Scalar::Text(s)) => matches!(
                s.trim().to_ascii_lowercase().as_str(),
                "是" | "true" | "yes" | "y" | "1"
            ),
        })
    }

    pub(super) fn timestamp<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let Some(raw) = Option::<String>::deserialize(d)? else {
            return Ok(None);
        };
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(None);
        }
        if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
            return Ok(Some(ts.with_timezone(&Utc)));
        }
        // Naive ISO-8601 timestamps (no offset) are taken as UTC.
        let parsed = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
            .map(|naive| naive.and_utc());
        Ok(parsed)
    }

    pub(super) fn list<'de, D, T>(d: D) -> Result<Vec<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de>,
    {
        Ok(Option::<Vec<T>>::deserialize(d)?.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_table() -> TableRecord {
        TableRecord {
            table_name: "users".into(),
            table_comment: "用户表".into(),
            db_name: "core".into(),
            module: "account".into(),
            description: String::new(),
            source_file: "users(用户表)_1.html".into(),
            last_updated: Some(Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap()),
            fields: vec![FieldRecord {
                name: "id".into(),
                data_type: "bigint".into(),
                is_primary_key: true,
                ..FieldRecord::default()
            }],
        }
    }

    #[test]
    fn table_serialization_uses_catalogue_keys() {
        let json = serde_json::to_value(sample_table()).expect("serialize");
        assert_eq!(json["table_name"], "users");
        assert_eq!(json["file"], "users(用户表)_1.html");
        assert_eq!(json["fields"][0]["type"], "bigint");
        assert_eq!(json["fields"][0]["is_primary_key"], true);
        assert!(json.get("source_file").is_none());
    }

    #[test]
    fn table_roundtrip() {
        let table = sample_table();
        let json = serde_json::to_string_pretty(&table).expect("serialize");
        let parsed: TableRecord = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed, table);
    }

    #[test]
    fn legacy_record_is_accepted() {
        let json = r#"{
            "file": "orders.html",
            "table_name": "orders",
            "table_comment": null,
            "db_name": null,
            "module": "trade",
            "description": null,
            "last_updated": "2024-03-02T10:11:12.345678",
            "fields": [
                {"name": "id", "comment": "主键", "type": "int", "length": 11,
                 "nullable": "否", "is_foreign_key": "否", "is_auto_increment": "是",
                 "default": "", "is_primary_key": "是", "foreign_key_info": "", "description": ""}
            ]
        }"#;

        let parsed: TableRecord = serde_json::from_str(json).expect("deserialize legacy");
        assert_eq!(parsed.table_comment, "");
        assert_eq!(parsed.module, "trade");
        assert_eq!(parsed.fields[0].length, "11");
        assert!(parsed.fields[0].is_primary_key);
        assert!(parsed.fields[0].is_auto_increment);
        assert!(!parsed.fields[0].nullable);
        let ts = parsed.last_updated.expect("naive timestamp parsed");
        assert_eq!(ts.format("%Y-%m-%d %H:%M:%S").to_string(), "2024-03-02 10:11:12");
    }

    #[test]
    fn missing_fields_and_bad_timestamp_default() {
        let parsed: TableRecord =
            serde_json::from_str(r#"{"table_name": "t", "last_updated": "yesterday", "fields": null}"#)
                .expect("deserialize");
        assert!(parsed.fields.is_empty());
        assert!(parsed.last_updated.is_none());
        assert!(parsed.source_file.is_empty());
    }

    #[test]
    fn eligibility_requires_name() {
        assert!(sample_table().is_catalogue_eligible());
        assert!(!TableRecord::new("  ", "x.html").is_catalogue_eligible());
    }

    #[test]
    fn filled_count_covers_header_and_fields() {
        // 5 header texts + timestamp + field(name, type, pk)
        assert_eq!(sample_table().filled_count(), 9);
        assert_eq!(TableRecord::default().filled_count(), 0);
    }

    #[test]
    fn strategy_parsing() {
        assert_eq!("latest".parse::<MergeStrategy>().unwrap(), MergeStrategy::Latest);
        assert_eq!(" MERGE ".parse::<MergeStrategy>().unwrap(), MergeStrategy::Merge);
        assert!("newest".parse::<MergeStrategy>().is_err());
        assert_eq!(MergeStrategy::First.to_string(), "first");
    }
}
