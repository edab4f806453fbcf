//! Header metadata rows: a label cell followed by its value cell.

use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};

use crate::cell_text;

static TR_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").expect("valid selector"));
static TD_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td").expect("valid selector"));

/// Table-level attributes found in header rows. Empty when absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct HeaderMeta {
    pub table_name: String,
    pub table_comment: String,
    pub db_name: String,
    pub module: String,
    pub description: String,
}

#[derive(Debug, Clone, Copy)]
enum Attr {
    TableName,
    Comment,
    DbName,
    Module,
    Description,
}

/// A label vocabulary entry: the label is looked for in `column`; its value
/// sits in the next cell.
struct Label {
    attr: Attr,
    texts: &'static [&'static str],
    column: usize,
}

const LABELS: &[Label] = &[
    Label {
        attr: Attr::TableName,
        texts: &["数据库表名", "table name"],
        column: 2,
    },
    Label {
        attr: Attr::DbName,
        texts: &["所属数据库", "owning database"],
        column: 2,
    },
    Label {
        attr: Attr::Module,
        texts: &["所属模块", "owning module"],
        column: 2,
    },
    Label {
        attr: Attr::Comment,
        texts: &["中文名词", "display name"],
        column: 5,
    },
    Label {
        attr: Attr::Description,
        texts: &["描述", "description"],
        column: 5,
    },
];

impl HeaderMeta {
    fn slot(&mut self, attr: Attr) -> &mut String {
        match attr {
            Attr::TableName => &mut self.table_name,
            Attr::Comment => &mut self.table_comment,
            Attr::DbName => &mut self.db_name,
            Attr::Module => &mut self.module,
            Attr::Description => &mut self.description,
        }
    }
}

/// Scan every row of the document for labelled header cells.
///
/// The first row matching a label wins.
pub(crate) fn extract(doc: &Html) -> HeaderMeta {
    let mut meta = HeaderMeta::default();
    let mut found = [false; LABELS.len()];

    for row in doc.select(&TR_SEL) {
        let cells: Vec<ElementRef<'_>> = row.select(&TD_SEL).collect();
        if cells.len() < 4 {
            continue;
        }

        for (i, label) in LABELS.iter().enumerate() {
            if found[i] || cells.len() <= label.column + 1 {
                continue;
            }
            let label_text = cell_text(cells[label.column]).to_lowercase();
            if label.texts.iter().any(|t| label_text.contains(t)) {
                *meta.slot(label.attr) = cell_text(cells[label.column + 1]);
                found[i] = true;
            }
        }

        if found.iter().all(|f| *f) {
            break;
        }
    }

    meta
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_rows_are_ignored() {
        let doc = Html::parse_document(
            "<table><tr><td>a</td><td>b</td><td>数据库表名</td></tr></table>",
        );
        assert_eq!(extract(&doc), HeaderMeta::default());
    }

    #[test]
    fn value_cell_text_is_trimmed_and_joined() {
        let doc = Html::parse_document(
            "<table><tr><td></td><td></td><td><b>所属数据库</b></td>\
             <td>\n  <span>order</span>_db \n</td></tr></table>",
        );
        assert_eq!(extract(&doc).db_name, "order_db");
    }

    #[test]
    fn label_without_value_cell_is_skipped() {
        // Seven cells are needed for a column-5 label.
        let doc = Html::parse_document(
            "<table><tr><td></td><td></td><td></td><td></td><td></td><td>描述</td></tr></table>",
        );
        assert!(extract(&doc).description.is_empty());
    }
}
