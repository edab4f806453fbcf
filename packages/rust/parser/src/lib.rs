//! Extraction of table documentation records from HTML documents.
//!
//! A table document is a semi-structured HTML layout with two independent
//! patterns the parser reads:
//! 1. header metadata rows: a label cell followed by its value cell
//! 2. field detail rows: inside a marked sub-table, one row per column
//!
//! [`TableDocumentParser::parse`] turns one normalized document into a
//! [`TableRecord`], or a [`ParseError`] when nothing usable was found.

mod fields;
mod header;

use std::path::Path;
use std::sync::LazyLock;

use chrono::Utc;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, instrument};

use schemacat_shared::{ParserConfig, TableRecord};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Why a document produced no catalogue record.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// Neither a table-name label nor any field row was found.
    #[error("no table-name label and no field rows in document")]
    NoContent,

    /// The table name resolved to an empty string.
    #[error("could not derive a table name from '{0}'")]
    EmptyTableName(String),

    /// The configured detail-table class does not form a valid selector.
    #[error("invalid detail table selector '{0}'")]
    Selector(String),
}

/// Options for extraction.
#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// CSS class of the sub-table that holds field rows.
    pub detail_table_class: String,
    /// Substring of a cell's markup that marks a flag as set.
    pub checked_marker: String,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self::from(&ParserConfig::default())
    }
}

impl From<&ParserConfig> for ParseOptions {
    fn from(config: &ParserConfig) -> Self {
        Self {
            detail_table_class: config.detail_table_class.clone(),
            checked_marker: config.checked_marker.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// Reusable parser holding pre-built selectors.
#[derive(Debug)]
pub struct TableDocumentParser {
    detail_table: Selector,
    checked_marker: String,
}

impl TableDocumentParser {
    /// Build a parser for the given options.
    pub fn new(opts: &ParseOptions) -> Result<Self, ParseError> {
        let class = opts.detail_table_class.trim();
        let detail_table = Selector::parse(&format!("table.{class}"))
            .map_err(|_| ParseError::Selector(class.to_string()))?;

        Ok(Self {
            detail_table,
            checked_marker: opts.checked_marker.clone(),
        })
    }

    /// Extract the table record described by `text`.
    ///
    /// `document_id` is the source file name; it becomes the record's
    /// provenance and the table-name fallback.
    #[instrument(skip(self, text), fields(len = text.len()))]
    pub fn parse(&self, document_id: &str, text: &str) -> Result<TableRecord, ParseError> {
        let doc = Html::parse_document(text);

        let header = header::extract(&doc);
        let fields = doc
            .select(&self.detail_table)
            .next()
            .map(|table| fields::extract(&table, &self.checked_marker))
            .unwrap_or_default();

        if header.table_name.is_empty() && fields.is_empty() {
            return Err(ParseError::NoContent);
        }

        let table_name = if header.table_name.is_empty() {
            table_name_from_document_id(document_id)
        } else {
            header.table_name
        };
        if table_name.is_empty() {
            return Err(ParseError::EmptyTableName(document_id.to_string()));
        }

        let table_comment = if header.table_comment.is_empty() {
            comment_from_title(&doc).unwrap_or_default()
        } else {
            header.table_comment
        };

        debug!(
            table = %table_name,
            fields = fields.len(),
            has_db = !header.db_name.is_empty(),
            "document parsed"
        );

        Ok(TableRecord {
            table_name,
            table_comment,
            db_name: header.db_name,
            module: header.module,
            description: header.description,
            source_file: document_id.to_string(),
            last_updated: Some(Utc::now()),
            fields,
        })
    }
}

/// Parse with default options.
pub fn parse(document_id: &str, text: &str) -> Result<TableRecord, ParseError> {
    TableDocumentParser::new(&ParseOptions::default())?.parse(document_id, text)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Derive a table name from a document file name.
///
/// The extension is dropped and anything from the first parenthesis on is
/// stripped: `t_user(用户表)_42.html` → `t_user`.
pub fn table_name_from_document_id(document_id: &str) -> String {
    let stem = Path::new(document_id)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    stem.split(['(', '（'])
        .next()
        .unwrap_or_default()
        .trim()
        .to_string()
}

/// Pull a parenthetical display name out of the `<title>`, e.g. `t_user(用户表)`.
fn comment_from_title(doc: &Html) -> Option<String> {
    static TITLE_SEL: LazyLock<Selector> =
        LazyLock::new(|| Selector::parse("title").expect("valid selector"));
    static PAREN_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"[(（]([^)）]+)[)）]").expect("valid regex"));

    let title = doc.select(&TITLE_SEL).next().map(cell_text)?;
    PAREN_RE
        .captures(&title)
        .map(|c| c[1].trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Text content of an element with each text node trimmed and joined.
pub(crate) fn cell_text(el: ElementRef<'_>) -> String {
    el.text().map(str::trim).collect::<String>()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
