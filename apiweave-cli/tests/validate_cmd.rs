use assert_cmd::Command;
use tempfile::NamedTempFile;

fn write_temp(contents: &str) -> NamedTempFile {
    let mut f = NamedTempFile::new().expect("tempfile");
    std::io::Write::write_all(&mut f, contents.as_bytes()).expect("write");
    f
}

#[test]
fn validate_command_returns_0_for_valid_doc() {
    let doc = r#"
authType:
  type: basic
functions:
  status:
    url: https://example.com/status
    schedule:
      type: timer
      duration: 30
      unit: seconds
"#;
    let f = write_temp(doc);

    let bin = assert_cmd::cargo::cargo_bin!("apiweave");
    Command::new(bin)
        .args(["validate", f.path().to_string_lossy().as_ref()])
        .assert()
        .success();
}

#[test]
fn validate_command_fails_for_missing_dependency() {
    let doc = r#"
functions:
  status:
    url: https://example.com/status
    depends: login
"#;
    let f = write_temp(doc);

    let bin = assert_cmd::cargo::cargo_bin!("apiweave");
    Command::new(bin)
        .args(["validate", f.path().to_string_lossy().as_ref()])
        .assert()
        .code(2);
}

#[test]
fn inspect_prints_function_summaries() {
    let doc = r#"
functions:
  status:
    url: https://example.com/status
    actions:
      - action: tag
        type: jsonexpand
"#;
    let f = write_temp(doc);

    let bin = assert_cmd::cargo::cargo_bin!("apiweave");
    let assert = Command::new(bin)
        .args(["inspect", f.path().to_string_lossy().as_ref()])
        .assert()
        .success();
    let output = String::from_utf8_lossy(&assert.get_output().stdout).to_string();
    assert!(output.contains("status"));
    assert!(output.contains("tag"));
}
