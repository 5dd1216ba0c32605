//! CSV acquisition for the rollup engine.
//!
//! Reads a header-keyed CSV stream into a fully materialized `Vec<Record>`. The first row names
//! the fields; each later row becomes one [`Record`] whose cells are typed dynamically (numbers,
//! booleans, blanks, text). Malformed input is an error: the aggregation engine must only ever see
//! complete datasets.

#![forbid(unsafe_code)]

mod typing;

use std::borrow::Cow;
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use csv::ByteRecord;
use encoding_rs::WINDOWS_1252;
use rollup_engine::Record;
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct CsvOptions {
    pub delimiter: u8,
    /// Infer numbers, booleans and blanks from cell text. When off, every cell is text.
    pub dynamic_typing: bool,
    /// Trim surrounding whitespace from header names.
    pub trim_headers: bool,
    /// How to decode raw CSV bytes into text fields.
    pub encoding: CsvTextEncoding,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            dynamic_typing: true,
            trim_headers: false,
            encoding: CsvTextEncoding::Auto,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CsvTextEncoding {
    /// Decode as UTF-8; a field that is not valid UTF-8 falls back to Windows-1252.
    #[default]
    Auto,
    /// Decode as UTF-8 and reject invalid byte sequences.
    Utf8,
    /// Decode as Windows-1252 (aka CP-1252).
    Windows1252,
}

#[derive(Debug, Error)]
pub enum CsvSourceError {
    #[error("csv input has no header row")]
    EmptyInput,
    #[error("csv row {row} has {actual} fields, expected {expected}")]
    FieldCount {
        row: u64,
        expected: usize,
        actual: usize,
    },
    #[error("csv row {row}: {reason}")]
    Syntax { row: u64, reason: String },
    #[error("csv row {row}, column {column} is not valid UTF-8")]
    Encoding { row: u64, column: usize },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CsvSourceError {
    /// `row` is used when the csv error carries no position of its own.
    fn from_csv(err: csv::Error, row: u64) -> Self {
        let row = err.position().map_or(row, |pos| pos.record() + 1);
        let reason = err.to_string();
        match err.into_kind() {
            csv::ErrorKind::Io(io) => CsvSourceError::Io(io),
            _ => CsvSourceError::Syntax { row, reason },
        }
    }
}

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Reads every record from a CSV stream. Row numbers in errors are 1-based and count the header.
pub fn read_records<R: Read>(reader: R, options: &CsvOptions) -> Result<Vec<Record>, CsvSourceError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .delimiter(options.delimiter)
        // Headers are handled here so blank/duplicate names can be normalized.
        .has_headers(false)
        // Field counts are checked below to report the offending row precisely.
        .flexible(true)
        .from_reader(reader);

    let mut raw = ByteRecord::new();
    let mut row: u64 = 1;
    if !csv_reader
        .read_byte_record(&mut raw)
        .map_err(|e| CsvSourceError::from_csv(e, row))?
    {
        return Err(CsvSourceError::EmptyInput);
    }
    let headers = read_header(&raw, options)?;
    log::debug!("csv header: [{}]", headers.join(", "));

    let mut records = Vec::new();
    while csv_reader
        .read_byte_record(&mut raw)
        .map_err(|e| CsvSourceError::from_csv(e, row + 1))?
    {
        row += 1;
        if is_blank_line(&raw) {
            continue;
        }
        if raw.len() != headers.len() {
            return Err(CsvSourceError::FieldCount {
                row,
                expected: headers.len(),
                actual: raw.len(),
            });
        }

        let mut record = Record::with_capacity(headers.len());
        for (column, (name, field)) in headers.iter().zip(raw.iter()).enumerate() {
            let cell = decode(field, options.encoding).ok_or(CsvSourceError::Encoding {
                row,
                column: column + 1,
            })?;
            record.push_unique(name.as_str(), typing::type_cell(&cell, options.dynamic_typing));
        }
        records.push(record);
    }

    log::info!("parsed {} records with {} fields", records.len(), headers.len());
    Ok(records)
}

pub fn read_path(path: impl AsRef<Path>, options: &CsvOptions) -> Result<Vec<Record>, CsvSourceError> {
    let file = File::open(path.as_ref())?;
    read_records(BufReader::new(file), options)
}

/// Decodes the header row (dropping a leading UTF-8 byte-order mark) and normalizes the names.
fn read_header(raw: &ByteRecord, options: &CsvOptions) -> Result<Vec<String>, CsvSourceError> {
    let names = raw
        .iter()
        .enumerate()
        .map(|(idx, field)| {
            let field = match idx {
                0 => field.strip_prefix(UTF8_BOM).unwrap_or(field),
                _ => field,
            };
            decode(field, options.encoding)
                .map(Cow::into_owned)
                .ok_or(CsvSourceError::Encoding {
                    row: 1,
                    column: idx + 1,
                })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(normalize_headers(names, options.trim_headers))
}

/// Makes header names non-empty and unique.
///
/// - A blank name becomes `Column{n}`, where `n` is the 1-based ordinal of the blank header.
/// - A name that repeats an earlier one gets `_1`, `_2`, ... appended until it is unique.
fn normalize_headers(headers: Vec<String>, trim: bool) -> Vec<String> {
    let mut out = Vec::with_capacity(headers.len());
    let mut used: HashSet<String> = HashSet::with_capacity(headers.len());
    let mut blank_counter = 0usize;

    for header in headers {
        let mut base = if trim {
            header.trim().to_string()
        } else {
            header
        };
        if base.is_empty() {
            blank_counter += 1;
            base = format!("Column{blank_counter}");
        }

        let mut name = base.clone();
        let mut suffix = 1usize;
        while used.contains(&name) {
            name = format!("{base}_{suffix}");
            suffix += 1;
        }

        used.insert(name.clone());
        out.push(name);
    }

    out
}

fn is_blank_line(raw: &ByteRecord) -> bool {
    raw.len() == 1 && raw.get(0).is_some_and(|field| field.is_empty())
}

/// `None` only for invalid UTF-8 under [`CsvTextEncoding::Utf8`].
fn decode(field: &[u8], encoding: CsvTextEncoding) -> Option<Cow<'_, str>> {
    let utf8 = std::str::from_utf8(field).map(Cow::Borrowed);
    match (encoding, utf8) {
        (CsvTextEncoding::Windows1252, _) => Some(WINDOWS_1252.decode(field).0),
        (_, Ok(text)) => Some(text),
        (CsvTextEncoding::Auto, Err(_)) => Some(WINDOWS_1252.decode(field).0),
        (CsvTextEncoding::Utf8, Err(_)) => None,
    }
}
