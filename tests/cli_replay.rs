use std::path::PathBuf;

use predicates::prelude::*;

const BOOK: &str = r#"
contentId: 21
title: CLI book
chapters:
  - id: welcome
    title: Welcome
    sections:
      - id: hello
  - id: quiz
    title: Quiz
    sections:
      - id: q1
        maxScore: 2
  - id: goodbye
    title: Goodbye
    sections:
      - id: bye
"#;

const SCRIPT: &str = r#"
actions:
  - action: next
  - action: settle
  - action: content_event
    sub_content_id: q1
    score: 2
  - action: next
"#;

fn write_fixture(dir: &tempfile::TempDir, name: &str, body: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, body).unwrap();
    path
}

#[test]
fn validate_prints_one_line_per_chapter() {
    let dir = tempfile::tempdir().unwrap();
    let book = write_fixture(&dir, "book.yaml", BOOK);

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("interactive-book");
    cmd.args(["validate", "--book"])
        .arg(&book)
        .assert()
        .success()
        .stdout(predicate::str::contains("1\twelcome"))
        .stdout(predicate::str::contains("2\tquiz\t\"Quiz\"\tsections=1\ttasks=1\tmax_score=2"))
        .stdout(predicate::str::contains("3\tgoodbye"));
}

#[test]
fn validate_rejects_duplicate_chapter_ids() {
    let dir = tempfile::tempdir().unwrap();
    let book = write_fixture(
        &dir,
        "book.json",
        r#"{"contentId": 1, "chapters": [{"id": "a"}, {"id": "a"}]}"#,
    );

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("interactive-book");
    cmd.args(["validate", "--book"])
        .arg(&book)
        .assert()
        .failure()
        .stderr(predicate::str::contains("duplicate chapter id: a"));
}

#[test]
fn replay_prints_events_and_completes_the_book() {
    let dir = tempfile::tempdir().unwrap();
    let book = write_fixture(&dir, "book.yaml", BOOK);
    let script = write_fixture(&dir, "script.yaml", SCRIPT);

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("interactive-book");
    let output = cmd
        .args(["replay", "--report", "--book"])
        .arg(&book)
        .arg("--script")
        .arg(&script)
        .output()
        .unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    let lines: Vec<serde_json::Value> = stdout
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    let events: Vec<&str> = lines.iter().filter_map(|l| l["event"].as_str()).collect();

    assert_eq!(events.first(), Some(&"chapter_attached"));
    assert!(events.contains(&"address_bar_updated"));
    assert!(events.contains(&"transition_finished"));
    assert_eq!(events.iter().filter(|e| **e == "book_completed").count(), 1);

    let report = lines.last().unwrap();
    assert_eq!(report["statement"]["object"]["id"], "urn:h5p:21");
    assert_eq!(report["statement"]["result"]["score"]["raw"], 2);
}

#[test]
fn replay_follows_the_deep_link_in_the_page_url() {
    let dir = tempfile::tempdir().unwrap();
    let book = write_fixture(&dir, "book.yaml", BOOK);
    let script = write_fixture(&dir, "script.yaml", "actions:\n  - action: advance\n    ms: 1000\n");

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("interactive-book");
    cmd.args(["replay", "--book"])
        .arg(&book)
        .arg("--script")
        .arg(&script)
        .args(["--url", "https://lms.test/c#h5pbookid=21&chapter=quiz&section=q1"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            r#"{"event":"scroll_to_section","chapter":1,"section":"q1"}"#,
        ));
}

#[test]
fn rust_log_debug_emits_debug_line_to_stderr() {
    let dir = tempfile::tempdir().unwrap();
    let book = write_fixture(&dir, "book.yaml", BOOK);

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("interactive-book");
    cmd.env("RUST_LOG", "debug")
        .args(["validate", "--book"])
        .arg(&book)
        .assert()
        .success()
        .stderr(predicate::str::contains("parsed cli"));
}
