//! CLI test cases.
//!
//! Most of these run without Poppler or Tesseract installed. Tests which need
//! the real tools are ignored by default.

use std::process::Command;

use assert_cmd::prelude::*;
use predicates::prelude::*;

/// Create a new `Command` with our binary.
fn cmd() -> Command {
    Command::cargo_bin("region-scraper").unwrap()
}

#[test]
fn test_help() {
    cmd().arg("--help").assert().success();
}

#[test]
fn test_version() {
    cmd().arg("--version").assert().success();
}

#[test]
fn test_schema() {
    cmd()
        .args(["schema", "Template"])
        .assert()
        .success()
        .stdout(predicate::str::contains("format_version"));
    cmd()
        .args(["schema", "ExtractionRecord"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Page"));
}

#[test]
fn test_template_init_from_canvas() {
    cmd()
        .args(["template", "init", "--regions", "tests/fixtures/canvas.json"])
        .args(["--field", "Label", "--field", "Number"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""format_version": 1"#))
        .stdout(predicate::str::contains(r#""1": "Number""#))
        // The second rectangle was stretched 2x on the canvas.
        .stdout(predicate::str::contains(r#""width": 120.0"#));
}

#[test]
fn test_template_init_writes_file_for_show() {
    let dir = tempfile::TempDir::with_prefix("template").unwrap();
    let out = dir.path().join("template.json");
    cmd()
        .args(["template", "init", "--regions", "tests/fixtures/canvas.json"])
        .args(["--field", "Label", "-o"])
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
    cmd()
        .args(["template", "show"])
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""position":1,"id":0,"field_name":"Label""#))
        .stdout(predicate::str::contains(r#""position":2,"id":1,"field_name":"Field_2""#));
}

#[test]
fn test_template_init_rejects_extra_field_names() {
    cmd()
        .args(["template", "init", "--regions", "tests/fixtures/canvas.json"])
        .args(["--field", "A", "--field", "B", "--field", "C"])
        .assert()
        .failure();
}

#[test]
fn test_template_show() {
    cmd()
        .args(["template", "show", "tests/fixtures/template.json"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""position":1,"id":0,"field_name":"Label""#))
        .stdout(predicate::str::contains(r#""field_name":"Number""#));
}

#[test]
fn test_pages() {
    cmd()
        .args(["pages", "tests/fixtures/scan.png"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            r#"{"page":1,"width":200,"height":100,"canvas_width":800.0,"canvas_height":400.0}"#,
        ));
}

#[test]
fn test_preview() {
    let dir = tempfile::TempDir::with_prefix("preview").unwrap();
    let out = dir.path().join("preview.png");
    cmd()
        .args(["preview", "tests/fixtures/scan.png", "-o"])
        .arg(&out)
        .assert()
        .success();
    assert!(out.exists());
}

#[test]
fn test_extract_with_failing_ocr_still_writes_rows() {
    // Every region fails, so every cell is empty, but the pass completes.
    cmd()
        .env("TESSERACT_CMD", "/nonexistent/tesseract")
        .args(["extract", "tests/fixtures/scan.png"])
        .args(["--template", "tests/fixtures/template.json"])
        .assert()
        .success()
        .stdout(predicate::eq("Page,Label,Number\n1,,\n"));
}

#[test]
fn test_extract_rejects_page_zero() {
    cmd()
        .args(["extract", "tests/fixtures/scan.png"])
        .args(["--template", "tests/fixtures/template.json"])
        .args(["--template-page", "0"])
        .assert()
        .failure();
}

#[test]
fn test_extract_rejects_unknown_language() {
    cmd()
        .args(["extract", "tests/fixtures/scan.png"])
        .args(["--template", "tests/fixtures/template.json"])
        .args(["--language", "Klingon"])
        .assert()
        .failure();
}

#[test]
#[ignore = "Needs poppler-utils and tesseract installed"]
fn test_extract_pdf_jsonl() {
    cmd()
        .args(["extract", "tests/fixtures/two_pages.pdf"])
        .args(["--template", "tests/fixtures/template.json"])
        .args(["--language", "English + Hindi", "--preprocess", "grayscale"])
        .args(["--format", "jsonl"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#"{"Page":"2","#));
}
