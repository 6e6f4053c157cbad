//! Applies approved mappings to the rows of a legacy CSV file.
//!
//! Each target field reads the first source field of its mapping and converts
//! the raw cell with the same rules the generated script uses, so running
//! `migrate` locally previews exactly what the emitted script will write.

use std::fmt;

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, SecondsFormat};
use log::{debug, info, warn};

use crate::{
    cli::MigrateArgs,
    headers::normalize_headers,
    io_utils::{self, CsvInput},
    mapping::{DataType, Mapping},
    review::{ReviewSet, header_fingerprint},
};

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d", "%d-%m-%Y", "%B %d, %Y", "%b %d, %Y"];
const ZONED_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f%z",
];
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Null,
    Text(String),
    Boolean(bool),
    Integer(i64),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Timestamp(DateTime<FixedOffset>),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => Ok(()),
            FieldValue::Text(text) => f.write_str(text),
            FieldValue::Boolean(flag) => write!(f, "{flag}"),
            FieldValue::Integer(value) => write!(f, "{value}"),
            FieldValue::Date(date) => write!(f, "{}", date.format("%Y-%m-%d")),
            FieldValue::DateTime(datetime) => write!(f, "{}", datetime.format("%Y-%m-%dT%H:%M:%S")),
            FieldValue::Timestamp(stamp) => {
                f.write_str(&stamp.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
        }
    }
}

/// Integer parsing with JavaScript `parseInt(value, 10)` semantics: leading
/// whitespace is skipped, an optional sign is honoured and the longest run of
/// digits is used. Returns `None` when no digits are present or the value
/// does not fit in an `i64`.
pub fn parse_int_prefix(raw: &str) -> Option<i64> {
    let trimmed = raw.trim_start();
    let (negative, rest) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };
    let digits_len = rest.bytes().take_while(u8::is_ascii_digit).count();
    if digits_len == 0 {
        return None;
    }
    let magnitude = &rest[..digits_len];
    let signed = if negative {
        format!("-{magnitude}")
    } else {
        magnitude.to_string()
    };
    signed.parse::<i64>().ok()
}

/// Dates, local date-times and offset timestamps (RFC 3339 first). Offsets
/// are kept as written.
pub fn parse_date_value(raw: &str) -> Option<FieldValue> {
    let trimmed = raw.trim();
    DateTime::parse_from_rfc3339(trimmed)
        .ok()
        .or_else(|| {
            ZONED_FORMATS
                .iter()
                .find_map(|fmt| DateTime::parse_from_str(trimmed, fmt).ok())
        })
        .map(FieldValue::Timestamp)
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
                .map(FieldValue::Date)
        })
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
                .map(FieldValue::DateTime)
        })
}

/// Converts one raw cell. `None` means the source column is absent.
pub fn convert_value(data_type: DataType, raw: Option<&str>) -> FieldValue {
    match data_type {
        DataType::Boolean => {
            let lowered = raw.unwrap_or("").trim().to_lowercase();
            FieldValue::Boolean(matches!(lowered.as_str(), "yes" | "true" | "1"))
        }
        DataType::Integer => {
            FieldValue::Integer(parse_int_prefix(raw.unwrap_or("0")).unwrap_or(0))
        }
        DataType::Date => match raw.filter(|value| !value.is_empty()) {
            Some(value) => parse_date_value(value).unwrap_or_else(|| {
                debug!("Unparseable date '{value}' migrated as null");
                FieldValue::Null
            }),
            None => FieldValue::Null,
        },
        DataType::String => match raw.filter(|value| !value.is_empty()) {
            Some(value) => FieldValue::Text(value.to_string()),
            None => FieldValue::Null,
        },
    }
}

#[derive(Debug, Clone)]
struct Binding {
    target: String,
    source: String,
    data_type: DataType,
    column: Option<usize>,
}

/// Approved mappings bound to the column positions of one CSV header row.
#[derive(Debug, Clone)]
pub struct RowTransformer {
    bindings: Vec<Binding>,
}

impl RowTransformer {
    /// Mappings without a source field are skipped. A source missing from
    /// `headers` stays bound to nothing and yields the type's default.
    pub fn new<'a, I>(mappings: I, headers: &[String]) -> Self
    where
        I: IntoIterator<Item = &'a Mapping>,
    {
        let bindings = mappings
            .into_iter()
            .filter_map(|mapping| {
                let source = mapping.primary_source()?;
                let column = headers.iter().position(|header| header.trim() == source);
                Some(Binding {
                    target: mapping.target_field.clone(),
                    source: source.to_string(),
                    data_type: mapping.data_type,
                    column,
                })
            })
            .collect();
        Self { bindings }
    }

    pub fn targets(&self) -> Vec<&str> {
        self.bindings.iter().map(|b| b.target.as_str()).collect()
    }

    /// Source fields that are not present in the bound header row.
    pub fn unbound_sources(&self) -> Vec<&str> {
        self.bindings
            .iter()
            .filter(|b| b.column.is_none())
            .map(|b| b.source.as_str())
            .collect()
    }

    pub fn transform(&self, row: &[String]) -> Vec<FieldValue> {
        self.bindings
            .iter()
            .map(|binding| {
                let raw = binding
                    .column
                    .and_then(|idx| row.get(idx))
                    .map(String::as_str);
                convert_value(binding.data_type, raw)
            })
            .collect()
    }
}

pub fn execute(args: &MigrateArgs) -> Result<()> {
    let review = ReviewSet::load(&args.mappings)
        .with_context(|| format!("Loading review file {:?}", args.mappings))?;
    let delimiter = io_utils::resolve_input_delimiter(&args.input, args.delimiter);
    let encoding = io_utils::resolve_encoding(args.input_encoding.as_deref())?;
    let output_path = args.output.as_deref();
    let output_delimiter =
        io_utils::resolve_output_delimiter(output_path, args.output_delimiter, delimiter);

    let mut input = CsvInput::open(&args.input, delimiter, encoding)?;
    if let Some(source) = &review.source {
        let fingerprint = header_fingerprint(&normalize_headers(input.headers()));
        if fingerprint != source.header_fingerprint {
            warn!(
                "Headers of {:?} differ from those analyzed in '{}'",
                args.input, source.file
            );
        }
    }

    let transformer = RowTransformer::new(review.approved(), input.headers());
    for source in transformer.unbound_sources() {
        warn!("Source field '{source}' is not present in {:?}", args.input);
    }

    let mut writer = io_utils::open_csv_writer(output_path, output_delimiter)?;
    writer
        .write_record(transformer.targets())
        .context("Writing output headers")?;

    let mut written = 0usize;
    for row in input.rows() {
        let row = row?;
        let values = transformer
            .transform(&row)
            .iter()
            .map(FieldValue::to_string)
            .collect::<Vec<_>>();
        writer
            .write_record(&values)
            .with_context(|| format!("Writing output row {}", written + 2))?;
        written += 1;
    }
    writer.flush().context("Flushing output")?;

    info!(
        "Migrated {} row(s) into {} field(s) -> {}",
        written,
        transformer.targets().len(),
        output_path
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "stdout".into())
    );
    Ok(())
}
