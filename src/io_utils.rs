//! CSV input/output helpers.
//!
//! - Delimiters resolve from the file extension (`.tsv` → tab, otherwise
//!   comma) unless given explicitly.
//! - Input bytes are decoded with `encoding_rs`, defaulting to UTF-8.
//! - The `-` path means stdin for inputs and stdout for outputs.

use std::{
    fs::File,
    io::{BufReader, BufWriter, Read, Write},
    path::Path,
};

use anyhow::{Context, Result, anyhow};
use csv::{ByteRecord, QuoteStyle};
use encoding_rs::{Encoding, UTF_8};

pub const DEFAULT_CSV_DELIMITER: u8 = b',';
pub const DEFAULT_TSV_DELIMITER: u8 = b'\t';

pub fn is_dash(path: &Path) -> bool {
    path == Path::new("-")
}

pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding> {
    match label.map(str::trim).filter(|l| !l.is_empty()) {
        Some(value) => Encoding::for_label(value.as_bytes())
            .ok_or_else(|| anyhow!("Unknown encoding '{value}'")),
        None => Ok(UTF_8),
    }
}

fn delimiter_for_extension(path: &Path) -> Option<u8> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") => Some(DEFAULT_TSV_DELIMITER),
        Some(ext) if ext.eq_ignore_ascii_case("csv") => Some(DEFAULT_CSV_DELIMITER),
        _ => None,
    }
}

pub fn resolve_input_delimiter(path: &Path, provided: Option<u8>) -> u8 {
    provided
        .or_else(|| delimiter_for_extension(path))
        .unwrap_or(DEFAULT_CSV_DELIMITER)
}

pub fn resolve_output_delimiter(path: Option<&Path>, provided: Option<u8>, fallback: u8) -> u8 {
    provided
        .or_else(|| path.and_then(delimiter_for_extension))
        .unwrap_or(fallback)
}

/// A CSV file opened for reading with its decoded header row.
pub struct CsvInput {
    reader: csv::Reader<Box<dyn Read>>,
    encoding: &'static Encoding,
    headers: Vec<String>,
}

impl CsvInput {
    pub fn open(path: &Path, delimiter: u8, encoding: &'static Encoding) -> Result<Self> {
        let source: Box<dyn Read> = if is_dash(path) {
            Box::new(std::io::stdin().lock())
        } else {
            Box::new(BufReader::new(
                File::open(path).with_context(|| format!("Opening input file {path:?}"))?,
            ))
        };
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .delimiter(delimiter)
            .double_quote(true)
            .flexible(false)
            .from_reader(source);
        let raw = reader
            .byte_headers()
            .with_context(|| format!("Reading header row of {path:?}"))?
            .clone();
        let headers = decode_record(&raw, encoding)?;
        Ok(Self {
            reader,
            encoding,
            headers,
        })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Decoded data rows; row numbers in errors are 1-based and count the
    /// header row.
    pub fn rows(&mut self) -> impl Iterator<Item = Result<Vec<String>>> + '_ {
        let encoding = self.encoding;
        self.reader
            .byte_records()
            .enumerate()
            .map(move |(idx, record)| {
                let record = record.with_context(|| format!("Reading row {}", idx + 2))?;
                decode_record(&record, encoding)
                    .with_context(|| format!("Decoding row {}", idx + 2))
            })
    }
}

pub fn open_csv_writer(path: Option<&Path>, delimiter: u8) -> Result<csv::Writer<Box<dyn Write>>> {
    let sink: Box<dyn Write> = match path {
        Some(p) if !is_dash(p) => Box::new(BufWriter::new(
            File::create(p).with_context(|| format!("Creating output file {p:?}"))?,
        )),
        _ => Box::new(std::io::stdout()),
    };
    Ok(csv::WriterBuilder::new()
        .delimiter(delimiter)
        .quote_style(QuoteStyle::Necessary)
        .from_writer(sink))
}

pub fn decode_bytes(bytes: &[u8], encoding: &'static Encoding) -> Result<String> {
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        Err(anyhow!(
            "Failed to decode text with encoding {}",
            encoding.name()
        ))
    } else {
        Ok(text.into_owned())
    }
}

pub fn decode_record(record: &ByteRecord, encoding: &'static Encoding) -> Result<Vec<String>> {
    record
        .iter()
        .map(|field| decode_bytes(field, encoding))
        .collect()
}
