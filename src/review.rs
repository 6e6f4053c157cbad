//! Human review of reconciled mappings.
//!
//! A [`ReviewSet`] pairs every mapping with an `approved` flag and is
//! persisted as JSON or YAML depending on the file extension. Only approved
//! mappings feed script emission and row migration.

use std::{
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::Path,
};

use anyhow::{Context, Result, anyhow, bail};
use log::info;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{
    cli::ReviewArgs,
    mapping::{Mapping, normalize_identifier},
    table::{Column, render_table},
};

pub const EMPTY_RESULT_MESSAGE: &str =
    "No custom fields were identified in that file. Try a richer export.";

const fn default_approved() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewedMapping {
    #[serde(flatten)]
    pub mapping: Mapping,
    #[serde(default = "default_approved")]
    pub approved: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceInfo {
    pub file: String,
    pub header_fingerprint: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewSet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceInfo>,
    #[serde(default)]
    pub mappings: Vec<ReviewedMapping>,
}

/// SHA-256 over the normalized headers, one per line.
pub fn header_fingerprint(headers: &[String]) -> String {
    let mut hasher = Sha256::new();
    for header in headers {
        hasher.update(header.as_bytes());
        hasher.update(b"\n");
    }
    hasher
        .finalize()
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReviewFormat {
    Json,
    Yaml,
}

impl ReviewFormat {
    fn for_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") => {
                ReviewFormat::Yaml
            }
            _ => ReviewFormat::Json,
        }
    }
}

impl ReviewSet {
    /// Every mapping starts out approved.
    pub fn from_mappings(mappings: Vec<Mapping>) -> Self {
        Self {
            source: None,
            mappings: mappings
                .into_iter()
                .map(|mapping| ReviewedMapping {
                    mapping,
                    approved: true,
                })
                .collect(),
        }
    }

    pub fn with_source(mut self, file: &str, headers: &[String]) -> Self {
        self.source = Some(SourceInfo {
            file: file.to_string(),
            header_fingerprint: header_fingerprint(headers),
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    pub fn approved(&self) -> impl Iterator<Item = &Mapping> {
        self.mappings
            .iter()
            .filter(|entry| entry.approved)
            .map(|entry| &entry.mapping)
    }

    pub fn approved_count(&self) -> usize {
        self.approved().count()
    }

    /// Sets the approval of the mapping whose target matches `target` after
    /// identifier normalization.
    pub fn set_approval(&mut self, target: &str, approved: bool) -> Result<()> {
        let wanted = normalize_identifier(target);
        let entry = self
            .mappings
            .iter_mut()
            .find(|entry| entry.mapping.target_field == wanted)
            .ok_or_else(|| anyhow!("No mapping targets field '{target}'"))?;
        entry.approved = approved;
        Ok(())
    }

    pub fn set_all(&mut self, approved: bool) {
        for entry in &mut self.mappings {
            entry.approved = approved;
        }
    }

    pub fn render(&self) -> String {
        let columns = vec![
            Column::left("Proposed Field"),
            Column::left("Legacy Source Fields (Consolidated)"),
            Column::left("Type"),
            Column::right("Approve"),
        ];
        let rows = self
            .mappings
            .iter()
            .map(|entry| {
                vec![
                    entry.mapping.target_field.clone(),
                    entry.mapping.source_fields.join(", "),
                    entry.mapping.data_type.to_string(),
                    if entry.approved { "yes" } else { "no" }.to_string(),
                ]
            })
            .collect::<Vec<_>>();
        let mut rendered = render_table(&columns, &rows);
        let notes = self
            .mappings
            .iter()
            .filter(|entry| !entry.mapping.reasoning.is_empty())
            .map(|entry| format!("{}: {}\n", entry.mapping.target_field, entry.mapping.reasoning))
            .collect::<Vec<_>>();
        if !notes.is_empty() {
            rendered.push('\n');
            rendered.extend(notes);
        }
        rendered
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening review file {path:?}"))?;
        let reader = BufReader::new(file);
        let review: ReviewSet = match ReviewFormat::for_path(path) {
            ReviewFormat::Json => {
                serde_json::from_reader(reader).context("Parsing review JSON")?
            }
            ReviewFormat::Yaml => {
                serde_yaml::from_reader(reader).context("Parsing review YAML")?
            }
        };
        review.ensure_unique_targets()?;
        Ok(review)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file =
            File::create(path).with_context(|| format!("Creating review file {path:?}"))?;
        let mut writer = BufWriter::new(file);
        match ReviewFormat::for_path(path) {
            ReviewFormat::Json => {
                serde_json::to_writer_pretty(&mut writer, self).context("Writing review JSON")?;
                writeln!(writer)?;
            }
            ReviewFormat::Yaml => {
                serde_yaml::to_writer(&mut writer, self).context("Writing review YAML")?;
            }
        }
        writer.flush().context("Flushing review file")
    }

    fn ensure_unique_targets(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for entry in &self.mappings {
            if !seen.insert(entry.mapping.target_field.as_str()) {
                bail!(
                    "Review file lists target field '{}' more than once",
                    entry.mapping.target_field
                );
            }
        }
        Ok(())
    }
}

pub fn execute(args: &ReviewArgs) -> Result<()> {
    let mut review = ReviewSet::load(&args.mappings)
        .with_context(|| format!("Loading review file {:?}", args.mappings))?;

    if args.approve_all {
        review.set_all(true);
    }
    if args.reject_all {
        review.set_all(false);
    }
    for target in split_targets(&args.approve) {
        review.set_approval(target, true)?;
    }
    for target in split_targets(&args.reject) {
        review.set_approval(target, false)?;
    }

    let changed = args.approve_all
        || args.reject_all
        || !args.approve.is_empty()
        || !args.reject.is_empty();
    if changed {
        review
            .save(&args.mappings)
            .with_context(|| format!("Writing review file {:?}", args.mappings))?;
    }

    if review.is_empty() {
        println!("{EMPTY_RESULT_MESSAGE}");
    } else {
        print!("{}", review.render());
    }
    info!(
        "{} of {} mapping(s) approved in {:?}",
        review.approved_count(),
        review.mappings.len(),
        args.mappings
    );
    Ok(())
}

fn split_targets(values: &[String]) -> impl Iterator<Item = &str> {
    values
        .iter()
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .filter(|value| !value.is_empty())
}
