//! CLI tests spawning the `interp` binary.
//!
//! Verifies exit codes and that state written by one invocation is visible
//! to the next.

use std::fs;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Output, Stdio};

use interp::exit_codes;
use interp::test_support::{TestWorkspace, fenced};

fn interp(root: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_interp"))
        .current_dir(root)
        .args(args)
        .output()
        .expect("run interp")
}

fn dispatch_stdin(root: &Path, text: &str) -> Output {
    let mut child = Command::new(env!("CARGO_BIN_EXE_interp"))
        .current_dir(root)
        .arg("dispatch")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn interp");
    child
        .stdin
        .take()
        .expect("stdin")
        .write_all(text.as_bytes())
        .expect("write stdin");
    child.wait_with_output().expect("wait interp")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn init_creates_config_and_memory() {
    let ws = TestWorkspace::new().expect("workspace");
    let output = interp(ws.path(), &["init"]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert!(ws.path().join(".interp/config.toml").exists());
    assert!(ws.path().join(".interp/memory.json").exists());
}

#[test]
fn set_dispatch_get_round_trip() {
    let ws = TestWorkspace::new().expect("workspace");
    let root = ws.path();
    assert_eq!(interp(root, &["init"]).status.code(), Some(exit_codes::OK));

    let set = interp(root, &["set", "a", "10"]);
    assert_eq!(set.status.code(), Some(exit_codes::OK));

    let run = dispatch_stdin(root, &fenced("python", "a += 1\nnames = ['x', 'y']"));
    assert_eq!(run.status.code(), Some(exit_codes::OK));

    let get = interp(root, &["get", "a"]);
    assert_eq!(get.status.code(), Some(exit_codes::OK));
    assert_eq!(stdout(&get).trim(), "11");

    let names = interp(root, &["get", "names"]);
    let parsed: serde_json::Value = serde_json::from_str(&stdout(&names)).expect("json");
    assert_eq!(parsed, serde_json::json!(["x", "y"]));
}

#[test]
fn ask_exits_with_stop_code() {
    let ws = TestWorkspace::new().expect("workspace");
    let reply = ws.path().join("reply.md");
    fs::write(&reply, format!("Quick question.\n{}", fenced("ask", "who are you?"))).expect("reply");

    let output = interp(ws.path(), &["dispatch", "--file", "reply.md"]);
    assert_eq!(output.status.code(), Some(exit_codes::STOP));
    assert_eq!(stdout(&output), "who are you?\n");
}

#[test]
fn plan_then_memory_outline() {
    let ws = TestWorkspace::new().expect("workspace");
    let root = ws.path();
    let plan = dispatch_stdin(root, &fenced("runplan", "1.xxx\n    1.1 xxx\n\n2.xxx\n"));
    assert_eq!(plan.status.code(), Some(exit_codes::OK));
    assert_eq!(stdout(&plan), "");

    let memory = interp(root, &["memory"]);
    assert_eq!(
        stdout(&memory),
        "- [ ] system/plan: 1.xxx\n- [ ] system/plan: 2.xxx\n"
    );
}

#[test]
fn memory_steps_are_completed_across_invocations() {
    let ws = TestWorkspace::new().expect("workspace");
    let root = ws.path();
    dispatch_stdin(root, &fenced("runplan", "1.xxx\n    1.1 xxx\n\n2.xxx\n"));

    assert_eq!(stdout(&interp(root, &["memory", "--next"])), "1 1.xxx\n");
    let done = interp(root, &["memory", "--done", "1"]);
    assert_eq!(done.status.code(), Some(exit_codes::OK));
    assert_eq!(stdout(&interp(root, &["memory", "--next"])), "2 2.xxx\n");
    assert_eq!(
        stdout(&interp(root, &["memory", "--related", "2"])),
        "system/plan: 1.xxx\n1.1 xxx\nsystem/plan: 2.xxx\n"
    );

    let unknown = interp(root, &["memory", "--done", "42"]);
    assert_eq!(unknown.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&unknown.stderr).contains("memory node #42 does not exist"));
}

#[test]
fn missing_binding_is_invalid() {
    let ws = TestWorkspace::new().expect("workspace");
    let output = interp(ws.path(), &["get", "nope"]);
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("name 'nope' is not defined"));
}

#[test]
fn invalid_config_is_rejected() {
    let ws = TestWorkspace::new().expect("workspace");
    fs::create_dir_all(ws.path().join(".interp")).expect("dir");
    fs::write(ws.path().join(".interp/config.toml"), "max_plan_depth = 0\n").expect("config");
    let output = interp(ws.path(), &["prompt"]);
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
}

#[test]
fn prompt_covers_every_handler() {
    let ws = TestWorkspace::new().expect("workspace");
    let output = interp(ws.path(), &["prompt"]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let text = stdout(&output);
    for heading in [
        "## Planning",
        "## Asking the user",
        "## Editing files (line commands)",
        "## Editing files (heredoc commands)",
        "## Running code",
        "## Shell commands",
        "## AppleScript",
    ] {
        assert!(text.contains(heading), "missing {heading}");
    }
}
