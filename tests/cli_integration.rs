// CLI integration tests for write/read/get/stat flows and exit codes.
use std::io::Write;
use std::process::{Command, Stdio};

use serde_json::Value;

fn cmd() -> Command {
    let exe = env!("CARGO_BIN_EXE_fq");
    Command::new(exe)
}

fn parse_json(value: &str) -> Value {
    serde_json::from_str(value).expect("valid json")
}

fn parse_json_lines(output: &[u8]) -> Vec<Value> {
    let text = String::from_utf8_lossy(output);
    text.lines().map(parse_json).collect()
}

#[test]
fn write_read_get_stat_flow() {
    let temp = tempfile::tempdir().expect("tempdir");
    let dir = temp.path().to_str().unwrap();

    let write = cmd()
        .args([
            "--dir",
            dir,
            "write",
            "events",
            "hello world!",
            "the second line",
            "the last thing I'm going to write",
        ])
        .output()
        .expect("write");
    assert!(write.status.success());
    let appended = parse_json_lines(&write.stdout);
    assert_eq!(appended.len(), 3);
    assert_eq!(appended[0]["seq"], 0);
    assert_eq!(appended[0]["offset"], 0);
    assert_eq!(appended[1]["seq"], 1);
    assert_eq!(appended[1]["offset"], 20);
    assert_eq!(appended[2]["bytes"], 33);

    let read = cmd()
        .args(["--dir", dir, "read", "events"])
        .output()
        .expect("read");
    assert!(read.status.success());
    let records = parse_json_lines(&read.stdout);
    let data: Vec<&str> = records
        .iter()
        .map(|record| record["data"].as_str().unwrap())
        .collect();
    assert_eq!(
        data,
        ["hello world!", "the second line", "the last thing I'm going to write"]
    );

    let get = cmd()
        .args(["--dir", dir, "get", "events", "1"])
        .output()
        .expect("get");
    assert!(get.status.success());
    let get_json = parse_json(std::str::from_utf8(&get.stdout).expect("utf8"));
    assert_eq!(get_json["seq"], 1);
    assert_eq!(get_json["data"], "the second line");

    let stat = cmd()
        .args(["--dir", dir, "stat", "events"])
        .output()
        .expect("stat");
    assert!(stat.status.success());
    let stat_json = parse_json(std::str::from_utf8(&stat.stdout).expect("utf8"));
    assert_eq!(stat_json["records"], 3);
    assert_eq!(stat_json["index_bytes"], 24);
    assert_eq!(stat_json["log_bytes"], 8 * 3 + 12 + 15 + 33);
    assert!(stat_json["index"].as_str().unwrap().ends_with("events.index"));
}

#[test]
fn read_window_and_stdin_lines() {
    let temp = tempfile::tempdir().expect("tempdir");
    let dir = temp.path().to_str().unwrap();

    let mut child = cmd()
        .args(["--dir", dir, "write", "lines", "--lines"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .expect("spawn");
    child
        .stdin
        .take()
        .expect("stdin")
        .write_all(b"a\nb\nc\nd\n")
        .expect("write stdin");
    let output = child.wait_with_output().expect("wait");
    assert!(output.status.success());
    assert_eq!(parse_json_lines(&output.stdout).len(), 4);

    let read = cmd()
        .args(["--dir", dir, "read", "lines", "--from", "1", "--count", "2"])
        .output()
        .expect("read");
    assert!(read.status.success());
    let records = parse_json_lines(&read.stdout);
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["seq"], 1);
    assert_eq!(records[0]["data"], "b");
    assert_eq!(records[1]["seq"], 2);
    assert_eq!(records[1]["data"], "c");

    let past_end = cmd()
        .args(["--dir", dir, "read", "lines", "--from", "9"])
        .output()
        .expect("read");
    assert!(past_end.status.success());
    assert!(past_end.stdout.is_empty());
}

#[test]
fn end_of_stream_exit_code() {
    let temp = tempfile::tempdir().expect("tempdir");
    let dir = temp.path().to_str().unwrap();

    let write = cmd()
        .args(["--dir", dir, "write", "events", "only"])
        .output()
        .expect("write");
    assert!(write.status.success());

    let get = cmd()
        .args(["--dir", dir, "get", "events", "1"])
        .output()
        .expect("get");
    assert_eq!(get.status.code().unwrap(), 4);
    let err = parse_json(String::from_utf8_lossy(&get.stderr).trim());
    assert_eq!(err["error"]["kind"], "EndOfStream");
    assert_eq!(err["error"]["seq"], 1);
}

#[test]
fn not_found_exit_code() {
    let temp = tempfile::tempdir().expect("tempdir");
    let dir = temp.path().to_str().unwrap();

    let read = cmd()
        .args(["--dir", dir, "read", "missing"])
        .output()
        .expect("read");
    assert_eq!(read.status.code().unwrap(), 3);
}

#[test]
fn usage_exit_code() {
    let temp = tempfile::tempdir().expect("tempdir");
    let dir = temp.path().to_str().unwrap();

    let get = cmd()
        .args(["--dir", dir, "get", "events", "not-a-number"])
        .output()
        .expect("get");
    assert_eq!(get.status.code().unwrap(), 2);

    let index_ref = cmd()
        .args(["--dir", dir, "read", "events.index"])
        .output()
        .expect("read");
    assert_eq!(index_ref.status.code().unwrap(), 2);
}
