mod common;

use common::{TestWorkspace, consolidator, fixture_path};
use predicates::str::contains;
use schema_consolidator::{mapping::DataType, review::ReviewSet};
use serde_json::Value;

fn analyze_fixture(workspace: &TestWorkspace, output: &str) -> std::path::PathBuf {
    let review_path = workspace.file(output);
    consolidator()
        .args([
            "analyze",
            "-i",
            fixture_path("legacy_export.csv").to_str().unwrap(),
            "--proposals",
            fixture_path("proposals.json").to_str().unwrap(),
            "-o",
            review_path.to_str().unwrap(),
        ])
        .assert()
        .success()
        .stdout(contains("relocation_flexibility"))
        .stdout(contains("Legacy Source Fields (Consolidated)"));
    review_path
}

#[test]
fn analyze_with_recorded_proposals_writes_review_file() {
    let workspace = TestWorkspace::new();
    let review_path = analyze_fixture(&workspace, "review.json");

    let review = ReviewSet::load(&review_path).expect("load review");
    let targets = review
        .mappings
        .iter()
        .map(|entry| entry.mapping.target_field.as_str())
        .collect::<Vec<_>>();
    assert_eq!(
        targets,
        vec![
            "relocation_flexibility",
            "current_base_salary",
            "is_remote_ok",
            "notice_weeks",
            "available_on",
            "clearance_level",
        ]
    );
    assert!(review.mappings.iter().all(|entry| entry.approved));

    let relocation = &review.mappings[0].mapping;
    assert_eq!(relocation.data_type, DataType::Boolean);
    assert_eq!(
        relocation.source_fields,
        vec!["Relo", "Willing to Relocate", "relocation?", "Will Move", "Open to Relo"]
    );
    assert_eq!(
        relocation.reasoning,
        "All capture whether the candidate is willing to relocate."
    );
    assert_eq!(review.mappings[2].mapping.source_fields, vec!["Remote OK?", "WFH"]);

    let source = review.source.expect("source info");
    assert!(source.file.ends_with("legacy_export.csv"));
    assert_eq!(source.header_fingerprint.len(), 64);
}

#[test]
fn analyze_writes_yaml_review_files() {
    let workspace = TestWorkspace::new();
    analyze_fixture(&workspace, "review.yaml");
    let yaml = workspace.read("review.yaml");
    assert!(yaml.contains("target_field: relocation_flexibility"));
    assert!(yaml.contains("approved: true"));
}

#[test]
fn analyze_without_credential_fails_before_network() {
    consolidator()
        .args([
            "analyze",
            "-i",
            fixture_path("legacy_export.csv").to_str().unwrap(),
        ])
        .assert()
        .failure()
        .stderr(contains("OPENAI_API_KEY is not configured."));
}

#[test]
fn analyze_with_only_standard_headers_skips_provider() {
    let workspace = TestWorkspace::new();
    let csv = workspace.write("standard.csv", "First Name,Email,ID,  \nAda,ada@example.com,1,\n");
    consolidator()
        .env("OPENAI_API_KEY", "test-key")
        .env("OPENAI_BASE_URL", "http://127.0.0.1:9/v1")
        .args(["analyze", "-i", csv.to_str().unwrap(), "--timeout-secs", "1"])
        .assert()
        .success()
        .stdout(contains("No custom fields were identified"));
}

#[test]
fn analyze_rejects_files_without_headers() {
    let workspace = TestWorkspace::new();
    let csv = workspace.write("empty.csv", "");
    consolidator()
        .args([
            "analyze",
            "-i",
            csv.to_str().unwrap(),
            "--proposals",
            fixture_path("proposals.json").to_str().unwrap(),
        ])
        .assert()
        .failure()
        .stderr(contains("No CSV headers were found"));
}

#[test]
fn analyze_fails_on_malformed_provider_output() {
    let workspace = TestWorkspace::new();
    let recorded = workspace.write("garbage.json", "Here are your mappings: relo -> relocation");
    consolidator()
        .args([
            "analyze",
            "-i",
            fixture_path("legacy_export.csv").to_str().unwrap(),
            "--proposals",
            recorded.to_str().unwrap(),
        ])
        .assert()
        .failure()
        .stderr(contains("malformed JSON"));
}

#[test]
fn request_mode_reports_missing_credential() {
    let workspace = TestWorkspace::new();
    let body = workspace.write("request.json", r#"{"headers": ["Relo"]}"#);
    let output = consolidator()
        .args(["analyze", "--request", body.to_str().unwrap()])
        .assert()
        .failure()
        .get_output()
        .stdout
        .clone();
    let reply: Value = serde_json::from_slice(&output).expect("json reply");
    assert_eq!(reply["error"], "OPENAI_API_KEY is not configured.");
}

#[test]
fn request_mode_with_no_usable_headers_returns_empty_mappings() {
    let workspace = TestWorkspace::new();
    let body = workspace.write("request.json", r#"{"headers": ["Email", " ", null, "id"]}"#);
    let output = consolidator()
        .env("OPENAI_API_KEY", "test-key")
        .env("OPENAI_BASE_URL", "http://127.0.0.1:9/v1")
        .args(["analyze", "--request", body.to_str().unwrap()])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let reply: Value = serde_json::from_slice(&output).expect("json reply");
    assert_eq!(reply, serde_json::json!({"mappings": []}));
}

#[test]
fn request_mode_reads_stdin_and_replays_proposals() {
    let output = consolidator()
        .args([
            "analyze",
            "--request",
            "-",
            "--proposals",
            fixture_path("proposals.json").to_str().unwrap(),
        ])
        .write_stdin(r#"{"headers": ["Relo", "relocation?", "Remote OK?", "WFH"]}"#)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let reply: Value = serde_json::from_slice(&output).expect("json reply");
    let mappings = reply["mappings"].as_array().expect("mappings array");
    assert_eq!(mappings.len(), 2);
    assert_eq!(mappings[0]["target_field"], "relocation_flexibility");
    assert_eq!(
        mappings[0]["source_fields"],
        serde_json::json!(["Relo", "relocation?"])
    );
    assert_eq!(mappings[1]["target_field"], "is_remote_ok");
    assert!(mappings[1].get("approved").is_none());
}

#[test]
fn request_mode_hides_provider_failures() {
    let workspace = TestWorkspace::new();
    let body = workspace.write("request.json", r#"{"headers": ["Relo"]}"#);
    let output = consolidator()
        .args([
            "analyze",
            "--request",
            body.to_str().unwrap(),
            "--proposals",
            workspace.file("missing.json").to_str().unwrap(),
        ])
        .assert()
        .failure()
        .get_output()
        .stdout
        .clone();
    let reply: Value = serde_json::from_slice(&output).expect("json reply");
    assert_eq!(reply["error"], "Failed to process schema.");
}

#[test]
fn review_toggles_are_persisted() {
    let workspace = TestWorkspace::new();
    let review_path = analyze_fixture(&workspace, "review.json");
    consolidator()
        .args([
            "review",
            "-m",
            review_path.to_str().unwrap(),
            "--reject",
            "is_remote_ok,Clearance Level",
        ])
        .assert()
        .success()
        .stdout(contains("is_remote_ok"));

    let review = ReviewSet::load(&review_path).expect("load review");
    let rejected = review
        .mappings
        .iter()
        .filter(|entry| !entry.approved)
        .map(|entry| entry.mapping.target_field.as_str())
        .collect::<Vec<_>>();
    assert_eq!(rejected, vec!["is_remote_ok", "clearance_level"]);
}

#[test]
fn review_rejects_unknown_targets() {
    let workspace = TestWorkspace::new();
    let review_path = analyze_fixture(&workspace, "review.json");
    consolidator()
        .args([
            "review",
            "-m",
            review_path.to_str().unwrap(),
            "--approve",
            "salary_expectation",
        ])
        .assert()
        .failure()
        .stderr(contains("No mapping targets field 'salary_expectation'"));
}

#[test]
fn emit_only_includes_approved_mappings() {
    let workspace = TestWorkspace::new();
    let review_path = analyze_fixture(&workspace, "review.json");
    consolidator()
        .args(["review", "-m", review_path.to_str().unwrap(), "--reject", "notice_weeks"])
        .assert()
        .success();

    let script_path = workspace.file("migrate.ts");
    consolidator()
        .args([
            "emit",
            "-m",
            review_path.to_str().unwrap(),
            "-o",
            script_path.to_str().unwrap(),
            "--table",
            "candidates",
        ])
        .assert()
        .success();

    let script = workspace.read("migrate.ts");
    assert!(script.contains(
        "is_remote_ok: ['yes', 'true', '1'].includes(String(row[\"Remote OK?\"] ?? '').trim().toLowerCase()),"
    ));
    assert!(script.contains(
        "current_base_salary: Number.parseInt(String(row[\"current salary\"] ?? '0'), 10) || 0,"
    ));
    assert!(!script.contains("notice_weeks"));
    assert!(!script.contains("row[\"WFH\"]"));
    assert!(script.contains("await db.insert(candidates).values(formattedData);"));
}

#[test]
fn emit_writes_to_stdout_by_default() {
    let workspace = TestWorkspace::new();
    let review_path = analyze_fixture(&workspace, "review.json");
    consolidator()
        .args([
            "emit",
            "-m",
            review_path.to_str().unwrap(),
            "--function-name",
            "migrate candidates",
        ])
        .assert()
        .success()
        .stdout(contains("export async function migrateCandidates(legacyData: any[])"));
}

#[test]
fn migrate_applies_approved_mappings_to_rows() {
    let workspace = TestWorkspace::new();
    let review_path = analyze_fixture(&workspace, "review.json");
    let output_path = workspace.file("consolidated.csv");
    consolidator()
        .args([
            "migrate",
            "-i",
            fixture_path("legacy_export.csv").to_str().unwrap(),
            "-m",
            review_path.to_str().unwrap(),
            "-o",
            output_path.to_str().unwrap(),
        ])
        .assert()
        .success();

    let output = workspace.read("consolidated.csv");
    let lines = output.lines().collect::<Vec<_>>();
    assert_eq!(
        lines,
        vec![
            "relocation_flexibility,current_base_salary,is_remote_ok,notice_weeks,available_on,clearance_level",
            "true,120000,true,2,2024-06-03T09:00:00Z,Top Secret",
            "false,140000,true,0,,None",
        ]
    );
}

#[test]
fn migrate_handles_missing_source_columns() {
    let workspace = TestWorkspace::new();
    let review_path = analyze_fixture(&workspace, "review.json");
    let csv = workspace.write("partial.csv", "Relo,Notice Period (Weeks)\nyes,abc\n");
    consolidator()
        .args([
            "migrate",
            "-i",
            csv.to_str().unwrap(),
            "-m",
            review_path.to_str().unwrap(),
        ])
        .assert()
        .success()
        .stdout(contains("true,0,false,0,,\n"));
}
