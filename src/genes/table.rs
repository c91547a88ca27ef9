//! Parser for the tab-delimited gene-alias crosswalk.
//!
//! The source is the HGNC symbol export: one row per approved gene, with the
//! canonical id in one column and the accepted aliases spread across several
//! others. A fixed column table drives the mapping; per column there may be
//! an exact-length constraint, a multi-value delimiter, and a prefix applied
//! to every value.

use std::io::BufRead;

use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("missing column: {0:?}")]
    MissingColumn(&'static str),

    #[error("Line {line}: expected {expected} fields, found {found}")]
    FieldCount {
        line: usize,
        expected: usize,
        found: usize,
    },

    #[error("Line {line}: value {value:?} in column {column:?} is not {length} characters")]
    BadLength {
        line: usize,
        column: &'static str,
        value: String,
        length: usize,
    },
}

/// How one source column maps onto a record field
pub struct ColumnSpec {
    pub column: &'static str,
    pub field: &'static str,
    /// Exact length required of every non-empty value
    pub length: Option<usize>,
    /// Split multi-valued cells on this delimiter
    pub delimiter: Option<&'static str>,
    /// Prepended to every value as `prefix:value`
    pub prefix: Option<&'static str>,
}

const fn column(column: &'static str, field: &'static str) -> ColumnSpec {
    ColumnSpec {
        column,
        field,
        length: None,
        delimiter: None,
        prefix: None,
    }
}

/// Column mapping for the HGNC gene crosswalk
pub const GENE_COLUMNS: &[ColumnSpec] = &[
    ColumnSpec {
        length: Some(15),
        ..column("Ensembl ID(supplied by Ensembl)", "id")
    },
    column("Approved Name", "name"),
    column("Approved Symbol", "alt_id"),
    ColumnSpec {
        delimiter: Some(", "),
        ..column("Previous Symbols", "alt_id")
    },
    ColumnSpec {
        delimiter: Some(", "),
        ..column("Synonyms", "alt_id")
    },
    ColumnSpec {
        prefix: Some("NCBIGene"),
        ..column("Entrez Gene ID(supplied by NCBI)", "alt_id")
    },
    column("HGNC ID", "alt_id"),
];

/// One parsed crosswalk row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneRow {
    pub id: String,
    pub names: Vec<String>,
    pub alt_ids: Vec<String>,
}

/// Parse the whole crosswalk. Rows without a canonical id are skipped with a
/// warning; any malformed row fails the batch.
///
/// # Errors
///
/// Returns `ParseError` if the header is missing a mapped column, a row has
/// the wrong field count, or a length-constrained value is malformed.
pub fn parse_table(reader: impl BufRead, columns: &[ColumnSpec]) -> Result<Vec<GeneRow>, ParseError> {
    let mut lines = reader.lines();
    let Some(header) = lines.next().transpose()? else {
        return Ok(Vec::new());
    };
    let header_fields: Vec<&str> = header.trim_end_matches(['\r', '\n']).split('\t').collect();

    // Resolve each mapped column to its position up front
    let mut positions = Vec::with_capacity(columns.len());
    for spec in columns {
        let position = header_fields
            .iter()
            .position(|f| *f == spec.column)
            .ok_or(ParseError::MissingColumn(spec.column))?;
        positions.push(position);
    }

    let mut rows = Vec::new();
    for (i, line) in lines.enumerate() {
        let line = line?;
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            continue;
        }
        // Line numbers in errors are 1-based, counting the header
        let line_num = i + 2;

        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != header_fields.len() {
            return Err(ParseError::FieldCount {
                line: line_num,
                expected: header_fields.len(),
                found: fields.len(),
            });
        }

        let mut id = None;
        let mut names = Vec::new();
        let mut alt_ids = Vec::new();

        for (spec, &position) in columns.iter().zip(&positions) {
            let cell = fields[position].trim();
            let values = expand_cell(cell, spec, line_num)?;

            match spec.field {
                "id" => id = values.into_iter().next(),
                "name" => names.extend(values),
                _ => alt_ids.extend(values),
            }
        }

        match id {
            Some(id) => rows.push(GeneRow { id, names, alt_ids }),
            None => warn!("Line {line_num}: row has no canonical id, skipping"),
        }
    }

    Ok(rows)
}

/// Split, length-check, and prefix one cell per its column spec
fn expand_cell(cell: &str, spec: &ColumnSpec, line: usize) -> Result<Vec<String>, ParseError> {
    let raw: Vec<&str> = match spec.delimiter {
        Some(delimiter) => cell.split(delimiter).collect(),
        None => vec![cell],
    };

    let mut values = Vec::new();
    for value in raw {
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        if let Some(length) = spec.length {
            if value.len() != length {
                return Err(ParseError::BadLength {
                    line,
                    column: spec.column,
                    value: value.to_string(),
                    length,
                });
            }
        }
        match spec.prefix {
            Some(prefix) => values.push(format!("{prefix}:{value}")),
            None => values.push(value.to_string()),
        }
    }
    Ok(values)
}
