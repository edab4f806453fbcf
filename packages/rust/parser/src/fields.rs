//! Field detail rows inside the marked sub-table.

use std::sync::LazyLock;

use scraper::{ElementRef, Selector};

use schemacat_shared::FieldRecord;

use crate::cell_text;

static TR_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").expect("valid selector"));
static TD_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td").expect("valid selector"));

/// Minimum number of cells in a field row.
const FIELD_ROW_CELLS: usize = 13;

// Cell positions within a field row.
const ORDINAL: usize = 1;
const NAME: usize = 2;
const COMMENT: usize = 3;
const TYPE: usize = 4;
const LENGTH: usize = 5;
const NULLABLE: usize = 6;
const FOREIGN_KEY: usize = 7;
const AUTO_INCREMENT: usize = 8;
const DEFAULT: usize = 9;
const PRIMARY_KEY: usize = 10;
const FOREIGN_KEY_INFO: usize = 11;
const DESCRIPTION: usize = 12;

/// Collect field records from `table`, in row order.
///
/// Only rows whose ordinal cell holds a positive integer qualify; header and
/// decoration rows are skipped.
pub(crate) fn extract(table: &ElementRef<'_>, checked_marker: &str) -> Vec<FieldRecord> {
    table
        .select(&TR_SEL)
        .filter_map(|row| {
            let cells: Vec<ElementRef<'_>> = row.select(&TD_SEL).collect();
            if cells.len() < FIELD_ROW_CELLS || !is_ordinal(&cell_text(cells[ORDINAL])) {
                return None;
            }
            let checked = |i: usize| cells[i].html().contains(checked_marker);

            Some(FieldRecord {
                name: cell_text(cells[NAME]),
                comment: cell_text(cells[COMMENT]),
                data_type: cell_text(cells[TYPE]),
                length: cell_text(cells[LENGTH]),
                nullable: checked(NULLABLE),
                is_foreign_key: checked(FOREIGN_KEY),
                is_auto_increment: checked(AUTO_INCREMENT),
                default: cell_text(cells[DEFAULT]),
                is_primary_key: checked(PRIMARY_KEY),
                foreign_key_info: cell_text(cells[FOREIGN_KEY_INFO]),
                description: cell_text(cells[DESCRIPTION]),
            })
        })
        .collect()
}

fn is_ordinal(text: &str) -> bool {
    text.parse::<u32>().is_ok_and(|n| n > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::field_row;
    use scraper::Html;

    fn fields_of(html: &str) -> Vec<FieldRecord> {
        let doc = Html::parse_document(html);
        let sel = Selector::parse("table").unwrap();
        let table = doc.select(&sel).next().unwrap();
        extract(&table, "checked")
    }

    #[test]
    fn ordinal_must_be_positive_integer() {
        assert!(is_ordinal("1"));
        assert!(is_ordinal("42"));
        assert!(!is_ordinal("0"));
        assert!(!is_ordinal("-1"));
        assert!(!is_ordinal("序号"));
        assert!(!is_ordinal(""));
    }

    #[test]
    fn non_numeric_and_short_rows_skipped() {
        let html = format!(
            "<table>{}{}<tr><td>1</td><td>2</td></tr>{}</table>",
            field_row("No.", "header", [false; 4]),
            field_row("0", "zero", [false; 4]),
            field_row("3", "kept", [false; 4]),
        );
        let fields = fields_of(&html);
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].name, "kept");
    }

    #[test]
    fn rows_keep_document_order() {
        let html = format!(
            "<table>{}{}{}</table>",
            field_row("2", "b", [false; 4]),
            field_row("1", "a", [false; 4]),
            field_row("3", "c", [false; 4]),
        );
        let names: Vec<String> = fields_of(&html).into_iter().map(|f| f.name).collect();
        assert_eq!(names, vec!["b", "a", "c"]);
    }

    #[test]
    fn flags_follow_checked_marker() {
        let html = format!("<table>{}</table>", field_row("1", "x", [true, false, true, false]));
        let field = &fields_of(&html)[0];
        assert!(field.nullable);
        assert!(!field.is_foreign_key);
        assert!(field.is_auto_increment);
        assert!(!field.is_primary_key);
    }
}
