//! In-memory catalogue keyed by table name, with duplicate resolution.

use std::collections::{BTreeMap, BTreeSet};
use std::collections::btree_map::Entry;
use std::fmt;

use tracing::{debug, warn};

use schemacat_shared::{FieldRecord, MergeStrategy, TableRecord};

// ---------------------------------------------------------------------------
// Outcomes & reports
// ---------------------------------------------------------------------------

/// What [`MergeStore::upsert`] did with an incoming record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// No record with that name existed.
    Inserted,
    /// The incoming record replaced the stored one.
    Replaced,
    /// The incoming record was folded into the stored one.
    Merged,
    /// The stored record was kept and the incoming one discarded.
    Kept,
    /// The record has no table name and cannot enter the catalogue.
    Rejected,
}

/// An integrity problem found by [`MergeStore::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub table_name: String,
    pub source_file: String,
    pub problem: Problem,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Problem {
    EmptyTableName,
    EmptySourceFile,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.problem {
            Problem::EmptyTableName => {
                write!(f, "record from '{}' has no table name", self.source_file)
            }
            Problem::EmptySourceFile => {
                write!(f, "table '{}' has no source file", self.table_name)
            }
        }
    }
}

/// Result of rebuilding a store from a raw record sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DedupReport {
    /// Records in the input sequence.
    pub original: usize,
    /// Catalogue-eligible records left after deduplication.
    pub retained: usize,
    /// Records without a table name, set aside.
    pub ineligible: usize,
    /// `(table_name, source_file)` of every record that lost to another.
    pub discarded: Vec<(String, String)>,
}

impl DedupReport {
    /// Whether rebuilding changed the record set.
    pub fn changed(&self) -> bool {
        !self.discarded.is_empty() || self.ineligible > 0
    }
}

// ---------------------------------------------------------------------------
// MergeStore
// ---------------------------------------------------------------------------

/// Table records keyed by name. Iterates in ascending name order.
#[derive(Debug, Clone, Default)]
pub struct MergeStore {
    records: BTreeMap<String, TableRecord>,
    ineligible: Vec<TableRecord>,
    /// Source documents seen per table name.
    sources: BTreeMap<String, BTreeSet<String>>,
}

impl MergeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from `records`, resolving duplicate names with `strategy`.
    pub fn from_records(
        records: impl IntoIterator<Item = TableRecord>,
        strategy: MergeStrategy,
    ) -> (Self, DedupReport) {
        let mut store = Self::new();
        let mut report = DedupReport::default();

        for record in records {
            report.original += 1;
            let identity = (record.table_name.clone(), record.source_file.clone());
            let displaced = store
                .get(&record.table_name)
                .map(|r| (r.table_name.clone(), r.source_file.clone()));

            match store.upsert(record, strategy) {
                UpsertOutcome::Replaced => report.discarded.extend(displaced),
                UpsertOutcome::Merged | UpsertOutcome::Kept => report.discarded.push(identity),
                UpsertOutcome::Rejected => report.ineligible += 1,
                UpsertOutcome::Inserted => {}
            }
        }

        report.retained = store.len();
        if report.changed() {
            debug!(
                original = report.original,
                retained = report.retained,
                ineligible = report.ineligible,
                "duplicates resolved"
            );
        }
        (store, report)
    }

    /// Insert `record`, resolving a name collision with `strategy`.
    pub fn upsert(&mut self, record: TableRecord, strategy: MergeStrategy) -> UpsertOutcome {
        if !record.is_catalogue_eligible() {
            warn!(file = %record.source_file, "record without table name set aside");
            self.ineligible.push(record);
            return UpsertOutcome::Rejected;
        }

        self.sources
            .entry(record.table_name.clone())
            .or_default()
            .insert(record.source_file.clone());

        let existing = match self.records.entry(record.table_name.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(record);
                return UpsertOutcome::Inserted;
            }
            Entry::Occupied(slot) => slot.into_mut(),
        };

        match strategy {
            // `None < Some(_)`, so legacy records without a timestamp lose.
            MergeStrategy::Latest if record.last_updated > existing.last_updated => {
                *existing = record;
                UpsertOutcome::Replaced
            }
            MergeStrategy::Latest | MergeStrategy::First => UpsertOutcome::Kept,
            MergeStrategy::Merge => {
                merge_into(existing, record);
                UpsertOutcome::Merged
            }
        }
    }

    pub fn get(&self, table_name: &str) -> Option<&TableRecord> {
        self.records.get(table_name)
    }

    /// Number of catalogue-eligible records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records set aside for lacking a table name.
    pub fn ineligible(&self) -> &[TableRecord] {
        &self.ineligible
    }

    /// Names declared by more than one source document, with the number of
    /// distinct documents. Re-merging the same document does not count.
    pub fn analyze(&self) -> BTreeMap<String, usize> {
        self.sources
            .iter()
            .filter(|(_, files)| files.len() > 1)
            .map(|(name, files)| (name.clone(), files.len()))
            .collect()
    }

    /// Integrity problems across stored and set-aside records.
    pub fn validate(&self) -> Vec<Violation> {
        self.records
            .values()
            .chain(&self.ineligible)
            .flat_map(|r| {
                let mut found = Vec::new();
                if !r.is_catalogue_eligible() {
                    found.push(Problem::EmptyTableName);
                }
                if r.source_file.trim().is_empty() {
                    found.push(Problem::EmptySourceFile);
                }
                found.into_iter().map(move |problem| Violation {
                    table_name: r.table_name.clone(),
                    source_file: r.source_file.clone(),
                    problem,
                })
            })
            .collect()
    }

    /// The catalogue: eligible records sorted by table name.
    pub fn into_records(self) -> Vec<TableRecord> {
        self.records.into_values().collect()
    }
}

/// Count names occurring more than once in a raw sequence.
pub fn analyze_records(records: &[TableRecord]) -> BTreeMap<String, usize> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for record in records.iter().filter(|r| r.is_catalogue_eligible()) {
        *counts.entry(record.table_name.clone()).or_default() += 1;
    }
    counts.retain(|_, count| *count > 1);
    counts
}

// ---------------------------------------------------------------------------
// Field-wise merge
// ---------------------------------------------------------------------------

/// Fill every empty attribute of `existing` from `incoming`.
///
/// Non-empty values are never overwritten. Fields pair up by name, each stored
/// field at most once; unpaired incoming fields are appended.
fn merge_into(existing: &mut TableRecord, incoming: TableRecord) {
    fill(&mut existing.table_comment, incoming.table_comment);
    fill(&mut existing.db_name, incoming.db_name);
    fill(&mut existing.module, incoming.module);
    fill(&mut existing.description, incoming.description);
    fill(&mut existing.source_file, incoming.source_file);

    if incoming.last_updated > existing.last_updated {
        existing.last_updated = incoming.last_updated;
    }

    let mut paired = vec![false; existing.fields.len()];
    for field in incoming.fields {
        let slot = existing
            .fields
            .iter()
            .enumerate()
            .position(|(i, f)| paired.get(i) == Some(&false) && f.name == field.name);

        match slot {
            Some(i) => {
                paired[i] = true;
                merge_field(&mut existing.fields[i], field);
            }
            None => existing.fields.push(field),
        }
    }
}

fn merge_field(existing: &mut FieldRecord, incoming: FieldRecord) {
    fill(&mut existing.comment, incoming.comment);
    fill(&mut existing.data_type, incoming.data_type);
    fill(&mut existing.length, incoming.length);
    fill(&mut existing.default, incoming.default);
    fill(&mut existing.foreign_key_info, incoming.foreign_key_info);
    fill(&mut existing.description, incoming.description);
    existing.nullable |= incoming.nullable;
    existing.is_foreign_key |= incoming.is_foreign_key;
    existing.is_auto_increment |= incoming.is_auto_increment;
    existing.is_primary_key |= incoming.is_primary_key;
}

fn fill(slot: &mut String, value: String) {
    if slot.is_empty() && !value.is_empty() {
        *slot = value;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(day: u32) -> Option<DateTime<Utc>> {
        Some(Utc.with_ymd_and_hms(2024, 3, day, 8, 0, 0).unwrap())
    }

    fn record(name: &str, file: &str, day: u32) -> TableRecord {
        TableRecord {
            last_updated: at(day),
            ..TableRecord::new(name, file)
        }
    }

    fn field(name: &str) -> FieldRecord {
        FieldRecord {
            name: name.into(),
            ..FieldRecord::default()
        }
    }

    #[test]
    fn latest_keeps_newer_record() {
        let mut store = MergeStore::new();
        assert_eq!(
            store.upsert(record("users", "a.html", 1), MergeStrategy::Latest),
            UpsertOutcome::Inserted
        );
        assert_eq!(
            store.upsert(record("users", "b.html", 2), MergeStrategy::Latest),
            UpsertOutcome::Replaced
        );
        assert_eq!(
            store.upsert(record("users", "c.html", 1), MergeStrategy::Latest),
            UpsertOutcome::Kept
        );

        let records = store.into_records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].source_file, "b.html");
        assert_eq!(records[0].last_updated, at(2));
    }

    #[test]
    fn latest_tie_keeps_stored_record() {
        let mut store = MergeStore::new();
        store.upsert(record("users", "a.html", 5), MergeStrategy::Latest);
        let outcome = store.upsert(record("users", "b.html", 5), MergeStrategy::Latest);
        assert_eq!(outcome, UpsertOutcome::Kept);
        assert_eq!(store.get("users").unwrap().source_file, "a.html");
    }

    #[test]
    fn latest_prefers_any_timestamp_over_none() {
        let mut store = MergeStore::new();
        let legacy = TableRecord::new("users", "old.html");
        store.upsert(legacy, MergeStrategy::Latest);
        store.upsert(record("users", "new.html", 1), MergeStrategy::Latest);
        assert_eq!(store.get("users").unwrap().source_file, "new.html");
    }

    #[test]
    fn first_discards_later_records() {
        let mut store = MergeStore::new();
        store.upsert(record("users", "a.html", 1), MergeStrategy::First);
        let outcome = store.upsert(record("users", "b.html", 9), MergeStrategy::First);
        assert_eq!(outcome, UpsertOutcome::Kept);
        assert_eq!(store.get("users").unwrap().source_file, "a.html");
    }

    #[test]
    fn merge_fills_gaps_without_overwriting() {
        let mut stored = record("users", "a.html", 1);
        stored.table_comment = "用户表".into();
        stored.fields = vec![FieldRecord {
            data_type: "bigint".into(),
            ..field("id")
        }];

        let mut incoming = record("users", "b.html", 2);
        incoming.table_comment = "users".into();
        incoming.db_name = "member_db".into();
        incoming.fields = vec![
            FieldRecord {
                data_type: "int".into(),
                comment: "主键".into(),
                is_primary_key: true,
                ..field("id")
            },
            field("email"),
        ];

        let mut store = MergeStore::new();
        store.upsert(stored, MergeStrategy::Merge);
        assert_eq!(store.upsert(incoming, MergeStrategy::Merge), UpsertOutcome::Merged);

        let merged = store.get("users").unwrap();
        assert_eq!(merged.table_comment, "用户表");
        assert_eq!(merged.db_name, "member_db");
        assert_eq!(merged.source_file, "a.html");
        assert_eq!(merged.last_updated, at(2));
        assert_eq!(merged.fields.len(), 2);
        assert_eq!(merged.fields[0].data_type, "bigint");
        assert_eq!(merged.fields[0].comment, "主键");
        assert!(merged.fields[0].is_primary_key);
        assert_eq!(merged.fields[1].name, "email");
    }

    #[test]
    fn merge_never_loses_information() {
        let mut stored = record("orders", "a.html", 3);
        stored.module = "trade".into();
        stored.fields = vec![field("id"), field("id")];

        let mut incoming = record("orders", "b.html", 1);
        incoming.description = "订单".into();
        incoming.fields = vec![
            FieldRecord {
                nullable: true,
                ..field("id")
            },
            field("amount"),
        ];

        let before = stored.filled_count();
        let mut store = MergeStore::new();
        store.upsert(stored, MergeStrategy::Merge);
        store.upsert(incoming, MergeStrategy::Merge);

        let merged = store.get("orders").unwrap();
        assert!(merged.filled_count() >= before);
        assert_eq!(merged.last_updated, at(3), "older incoming keeps stored timestamp");
        // Each stored field pairs at most once.
        assert!(merged.fields[0].nullable);
        assert!(!merged.fields[1].nullable);
        assert_eq!(merged.fields.len(), 3);
    }

    #[test]
    fn unnamed_records_are_rejected_but_reported() {
        let mut store = MergeStore::new();
        let outcome = store.upsert(TableRecord::new("  ", "broken.html"), MergeStrategy::Latest);
        assert_eq!(outcome, UpsertOutcome::Rejected);
        assert!(store.is_empty());
        assert_eq!(store.ineligible().len(), 1);

        let violations = store.validate();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].problem, Problem::EmptyTableName);
        assert_eq!(violations[0].source_file, "broken.html");
        assert!(store.into_records().is_empty());
    }

    #[test]
    fn validate_flags_missing_source_file() {
        let mut store = MergeStore::new();
        store.upsert(TableRecord::new("users", ""), MergeStrategy::Latest);
        let violations = store.validate();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].problem, Problem::EmptySourceFile);
        assert_eq!(violations[0].to_string(), "table 'users' has no source file");
    }

    #[test]
    fn analyze_counts_repeated_names() {
        let mut store = MergeStore::new();
        for (name, file, day) in [
            ("a", "a1.html", 1),
            ("b", "b.html", 1),
            ("a", "a2.html", 2),
            ("a", "a3.html", 3),
        ] {
            store.upsert(record(name, file, day), MergeStrategy::Latest);
        }
        let dups = store.analyze();
        assert_eq!(dups.len(), 1);
        assert_eq!(dups["a"], 3);
    }

    #[test]
    fn reparsing_same_document_is_not_a_duplicate() {
        let (mut store, _) =
            MergeStore::from_records(vec![record("users", "users.html", 1)], MergeStrategy::Latest);
        assert_eq!(
            store.upsert(record("users", "users.html", 2), MergeStrategy::Latest),
            UpsertOutcome::Replaced
        );
        assert!(store.analyze().is_empty());

        store.upsert(record("users", "legacy_users.html", 3), MergeStrategy::Latest);
        assert_eq!(store.analyze()["users"], 2);
    }

    #[test]
    fn from_records_reports_discards() {
        let records = vec![
            record("users", "u1.html", 1),
            record("orders", "o.html", 1),
            record("users", "u2.html", 2),
            TableRecord::new("", "blank.html"),
        ];
        assert_eq!(analyze_records(&records)["users"], 2);

        let (store, report) = MergeStore::from_records(records, MergeStrategy::Latest);
        assert_eq!(report.original, 4);
        assert_eq!(report.retained, 2);
        assert_eq!(report.ineligible, 1);
        assert_eq!(report.discarded, vec![("users".to_string(), "u1.html".to_string())]);
        assert!(report.changed());

        let names: Vec<String> = store.into_records().into_iter().map(|r| r.table_name).collect();
        assert_eq!(names, vec!["orders", "users"]);
    }

    #[test]
    fn clean_sequence_is_unchanged() {
        let records = vec![record("a", "a.html", 1), record("b", "b.html", 1)];
        let (_, report) = MergeStore::from_records(records, MergeStrategy::Merge);
        assert!(!report.changed());
        assert_eq!(report.retained, 2);
    }
}
