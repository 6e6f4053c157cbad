//! Renders approved mappings as a TypeScript migration function.
//!
//! Only the first source field of a mapping feeds its assignment; any further
//! source fields are informational. The generated expressions mirror the row
//! semantics in [`crate::migrate`].

use std::{fmt::Write as _, fs, io::Write as _};

use anyhow::{Context, Result};
use heck::ToLowerCamelCase;
use log::{debug, info, warn};
use serde_json::Value;

use crate::{
    cli::EmitArgs,
    io_utils,
    mapping::{DataType, Mapping},
    review::ReviewSet,
};

pub const DEFAULT_FUNCTION_NAME: &str = "migrateLegacyData";
pub const DEFAULT_TABLE: &str = "candidates";
pub const DEFAULT_DB_MODULE: &str = "./db";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptOptions {
    pub function_name: String,
    pub table: String,
    pub db_module: String,
}

impl Default for ScriptOptions {
    fn default() -> Self {
        Self {
            function_name: DEFAULT_FUNCTION_NAME.to_string(),
            table: DEFAULT_TABLE.to_string(),
            db_module: DEFAULT_DB_MODULE.to_string(),
        }
    }
}

impl ScriptOptions {
    /// Builds options from user input, coercing names into identifiers.
    pub fn new(function_name: Option<&str>, table: Option<&str>, db_module: Option<&str>) -> Self {
        let defaults = Self::default();
        Self {
            function_name: identifier_or(function_name, defaults.function_name),
            table: identifier_or(table, defaults.table),
            db_module: db_module
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(str::to_string)
                .unwrap_or(defaults.db_module),
        }
    }
}

fn identifier_or(value: Option<&str>, fallback: String) -> String {
    value
        .map(|raw| raw.to_lower_camel_case())
        .filter(|ident| ident.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_'))
        .unwrap_or(fallback)
}

fn string_literal(value: &str) -> String {
    Value::String(value.to_string()).to_string()
}

fn object_key(target: &str) -> String {
    if target.starts_with(|c: char| c.is_ascii_digit()) {
        string_literal(target)
    } else {
        target.to_string()
    }
}

/// Right-hand side of one assignment for `source` interpreted as `data_type`.
pub fn assignment_expression(data_type: DataType, source: &str) -> String {
    let key = string_literal(source);
    match data_type {
        DataType::Boolean => format!(
            "['yes', 'true', '1'].includes(String(row[{key}] ?? '').trim().toLowerCase())"
        ),
        DataType::Integer => format!("Number.parseInt(String(row[{key}] ?? '0'), 10) || 0"),
        DataType::Date => format!("row[{key}] ? new Date(row[{key}]) : null"),
        DataType::String => format!("row[{key}] || null"),
    }
}

/// Renders the migration script for the given mappings, in order.
pub fn render_script<'a, I>(mappings: I, options: &ScriptOptions) -> String
where
    I: IntoIterator<Item = &'a Mapping>,
{
    let mut script = String::new();
    let _ = writeln!(script, "// Generated legacy data migration script");
    let _ = writeln!(
        script,
        "import {{ db, {} }} from {};",
        options.table,
        string_literal(&options.db_module)
    );
    script.push('\n');
    let _ = writeln!(
        script,
        "export async function {}(legacyData: any[]) {{",
        options.function_name
    );
    script.push_str("  console.log(\"Starting migration...\");\n\n");
    script.push_str("  const formattedData = legacyData.map((row) => {\n");
    script.push_str("    return {\n");

    for mapping in mappings {
        let Some(source) = mapping.primary_source() else {
            debug!("Skipping '{}': no source field", mapping.target_field);
            continue;
        };
        let _ = writeln!(
            script,
            "      {}: {},",
            object_key(&mapping.target_field),
            assignment_expression(mapping.data_type, source)
        );
    }

    script.push_str("    };\n");
    script.push_str("  });\n\n");
    script.push_str("  // Insert into the consolidated schema\n");
    let _ = writeln!(
        script,
        "  await db.insert({}).values(formattedData);",
        options.table
    );
    script.push_str("  console.log(`Successfully migrated ${formattedData.length} records!`);\n");
    script.push_str("}\n");
    script
}

pub fn execute(args: &EmitArgs) -> Result<()> {
    let review = ReviewSet::load(&args.mappings)
        .with_context(|| format!("Loading review file {:?}", args.mappings))?;
    let approved = review.approved().collect::<Vec<_>>();
    if approved.is_empty() {
        warn!("No approved mappings in {:?}; the script will copy no fields", args.mappings);
    }
    let options = ScriptOptions::new(
        args.function_name.as_deref(),
        args.table.as_deref(),
        args.db_module.as_deref(),
    );
    let script = render_script(approved.iter().copied(), &options);

    match args.output.as_deref() {
        Some(path) if !io_utils::is_dash(path) => {
            fs::write(path, &script).with_context(|| format!("Writing script to {path:?}"))?;
            info!(
                "Migration script for {} mapping(s) written to {:?}",
                approved.len(),
                path
            );
        }
        _ => {
            let mut stdout = std::io::stdout().lock();
            stdout
                .write_all(script.as_bytes())
                .context("Writing script to stdout")?;
            stdout.flush()?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping(target: &str, data_type: DataType, sources: &[&str]) -> Mapping {
        Mapping {
            target_field: target.to_string(),
            data_type,
            source_fields: sources.iter().map(|s| s.to_string()).collect(),
            reasoning: String::new(),
        }
    }

    #[test]
    fn boolean_assignment_uses_truthy_set() {
        let script = render_script(
            &[mapping("is_remote_ok", DataType::Boolean, &["Remote OK?"])],
            &ScriptOptions::default(),
        );
        assert!(script.contains(
            "      is_remote_ok: ['yes', 'true', '1'].includes(String(row[\"Remote OK?\"] ?? '').trim().toLowerCase()),\n"
        ));
    }

    #[test]
    fn each_type_gets_its_expression() {
        let mappings = vec![
            mapping("notice_weeks", DataType::Integer, &["Notice Period (Weeks)", "Notice"]),
            mapping("available_on", DataType::Date, &["Available to Start"]),
            mapping("clearance", DataType::String, &["Clearance Level"]),
        ];
        let script = render_script(&mappings, &ScriptOptions::default());
        assert!(script.contains(
            "notice_weeks: Number.parseInt(String(row[\"Notice Period (Weeks)\"] ?? '0'), 10) || 0,"
        ));
        assert!(!script.contains("row[\"Notice\"]"));
        assert!(script.contains(
            "available_on: row[\"Available to Start\"] ? new Date(row[\"Available to Start\"]) : null,"
        ));
        assert!(script.contains("clearance: row[\"Clearance Level\"] || null,"));
    }

    #[test]
    fn mappings_without_sources_are_skipped() {
        let script = render_script(
            &[mapping("orphan", DataType::String, &[])],
            &ScriptOptions::default(),
        );
        assert!(!script.contains("orphan"));
    }

    #[test]
    fn source_keys_are_escaped_and_numeric_targets_quoted() {
        let script = render_script(
            &[mapping("2nd_email", DataType::String, &["Quote \"here\""])],
            &ScriptOptions::default(),
        );
        assert!(script.contains(r#"      "2nd_email": row["Quote \"here\""] || null,"#));
    }

    #[test]
    fn options_are_coerced_to_identifiers() {
        let options = ScriptOptions::new(Some("migrate legacy candidates"), Some("Candidate Profiles"), Some("  "));
        assert_eq!(options.function_name, "migrateLegacyCandidates");
        assert_eq!(options.table, "candidateProfiles");
        assert_eq!(options.db_module, DEFAULT_DB_MODULE);
        let fallback = ScriptOptions::new(Some("123"), None, None);
        assert_eq!(fallback.function_name, DEFAULT_FUNCTION_NAME);
    }

    #[test]
    fn output_is_deterministic() {
        let mappings = vec![
            mapping("a", DataType::Boolean, &["A"]),
            mapping("b", DataType::Integer, &["B"]),
        ];
        let options = ScriptOptions::default();
        assert_eq!(render_script(&mappings, &options), render_script(&mappings, &options));
        let script = render_script(&mappings, &options);
        assert!(script.starts_with("// Generated legacy data migration script\nimport { db, candidates } from \"./db\";"));
        assert!(script.contains("export async function migrateLegacyData(legacyData: any[]) {"));
        assert!(script.find("      a:").unwrap() < script.find("      b:").unwrap());
    }
}
