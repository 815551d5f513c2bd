use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::io::Write;

fn markdown_file(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".md").tempfile().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

fn json_stdout(output: &[u8]) -> serde_json::Value {
    serde_json::from_slice(output).unwrap()
}

#[test]
fn lists_profiles() {
    let mut cmd = cargo_bin_cmd!("mdscan");
    cmd.arg("--list-profiles");
    cmd.assert().success().stdout(
        predicate::str::contains("strict (default)")
            .and(predicate::str::contains("moderate"))
            .and(predicate::str::contains("permissive")),
    );
}

#[test]
fn extracts_with_thread_isolation() {
    let file = markdown_file("# Title\n\nSee [docs](https://example.com).\n");
    let mut cmd = cargo_bin_cmd!("mdscan");
    cmd.arg(file.path()).arg("--profile").arg("moderate").arg("--compact");
    let output = cmd.assert().success().get_output().stdout.clone();

    let result = json_stdout(&output);
    assert_eq!(result["status"], "completed");
    assert_eq!(result["metadata"]["isolation"], "thread");
    assert_eq!(result["collectors"]["links"][0]["url"], "https://example.com");
    assert_eq!(result["collectors"]["headings"]["headings"][0]["text"], "Title");
}

#[test]
fn strict_profile_tokenizes_in_a_worker_process() {
    let file = markdown_file("# Title\n\n<script>alert(1)</script>\n");
    let mut cmd = cargo_bin_cmd!("mdscan");
    cmd.arg(file.path());
    let output = cmd.assert().success().get_output().stdout.clone();

    let result = json_stdout(&output);
    assert_eq!(result["metadata"]["profile"], "strict");
    assert_eq!(result["metadata"]["isolation"], "process");
    assert_eq!(result["metadata"]["warning_counts"]["html_dropped"], 1);
}

#[test]
fn strict_worker_handles_deeply_nested_images() {
    let depth = 100;
    let mut text = String::from("para ");
    text.push_str(&"![".repeat(depth));
    text.push('x');
    for i in 0..depth {
        text.push_str(&format!("](i{}.png)", i));
    }
    text.push('\n');
    let file = markdown_file(&text);
    let mut cmd = cargo_bin_cmd!("mdscan");
    cmd.arg(file.path()).arg("--compact");
    let output = cmd.assert().success().get_output().stdout.clone();

    let result = json_stdout(&output);
    assert_eq!(result["metadata"]["isolation"], "process");
    assert!(!result["collectors"]["images"].as_array().unwrap().is_empty());
}

#[test]
fn worker_serves_on_a_sized_stack() {
    let request = serde_json::json!({
        "text": "# Big stack\n",
        "options": {
            "gfm": true,
            "footnotes": true,
            "front_matter": true,
            "superscript": false,
            "max_input_bytes": null
        }
    });
    let mut cmd = cargo_bin_cmd!("mdscan");
    cmd.arg("worker").arg("--stack-bytes").arg("67108864");
    cmd.write_stdin(request.to_string());
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("\"Big stack\""));
}

#[test]
fn reads_standard_input() {
    let mut cmd = cargo_bin_cmd!("mdscan");
    cmd.arg("-").arg("--profile").arg("moderate");
    cmd.write_stdin("- [x] done\n");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("\"checked\": true"));
}

#[test]
fn worker_subcommand_speaks_json() {
    let mut cmd = cargo_bin_cmd!("mdscan");
    cmd.arg("worker");
    let request = serde_json::json!({
        "text": "# hi\n",
        "options": {
            "gfm": true,
            "footnotes": true,
            "front_matter": true,
            "superscript": false,
            "max_input_bytes": null
        }
    });
    cmd.write_stdin(request.to_string());
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("\"type\":\"heading_open\""));
}

#[test]
fn zero_budget_exits_with_timeout_code() {
    let config = markdown_file("[profiles.moderate]\ntimeout_secs = 0.0\n");
    let file = markdown_file("# a\n");
    let mut cmd = cargo_bin_cmd!("mdscan");
    cmd.arg(file.path())
        .arg("--profile")
        .arg("moderate")
        .arg("--config")
        .arg(config.path());
    cmd.assert()
        .code(2)
        .stdout(predicate::str::contains("\"status\": \"timed_out\""));
}

#[test]
fn unknown_profile_fails() {
    let file = markdown_file("text\n");
    let mut cmd = cargo_bin_cmd!("mdscan");
    cmd.arg(file.path()).arg("--profile").arg("lenient");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("unknown profile 'lenient'"));
}

#[test]
fn missing_file_fails() {
    let mut cmd = cargo_bin_cmd!("mdscan");
    cmd.arg("/nonexistent/doc.md").arg("--profile").arg("moderate");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Error reading"));
}
