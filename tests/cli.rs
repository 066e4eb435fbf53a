// tests/cli.rs
//
// Runs the built binary. The config directory points somewhere empty so a
// developer's own config file cannot change the outcome.

use std::process::{Command, Output};

use rexpect::session::spawn_command;

const BIN: &str = env!("CARGO_BIN_EXE_baudsim");

fn baudsim(args: &[&str]) -> Command {
    let mut command = Command::new(BIN);
    command
        .args(args)
        .env("XDG_CONFIG_HOME", "/nonexistent/baudsim-test-config")
        .env("RUST_LOG", "off");
    command
}

fn run(args: &[&str]) -> Output {
    baudsim(args).output().expect("failed to run baudsim")
}

#[test_log::test]
fn missing_baud_is_a_usage_error() {
    let output = run(&[]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Usage"), "stderr: {}", stderr);
}

#[test_log::test]
fn non_numeric_baud_is_a_usage_error() {
    let output = run(&["abc"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("BAUD"), "stderr: {}", stderr);
}

#[test_log::test]
fn out_of_range_baud_names_the_limits() {
    for baud in ["100", "200001"] {
        let output = run(&[baud]);
        assert_eq!(output.status.code(), Some(1));
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(
            stderr.contains("Minimum baudrate is 150 and maximum is 200000."),
            "stderr for {}: {}",
            baud,
            stderr
        );
    }
}

#[test_log::test]
fn interactive_session_echoes_and_quits_on_escape() {
    let command = baudsim(&["--shell", "/bin/sh", "200000"]);
    let mut session = spawn_command(command, Some(10_000)).expect("spawn baudsim");

    session.exp_string("Escape character is: ~").unwrap();
    session
        .exp_string("Writing 333 characters every 17 ms.")
        .unwrap();

    session.send_line("echo paced-$((6 * 7))").unwrap();
    session.exp_string("paced-42").unwrap();

    // send_line ended the line, so the escape is at column 0.
    session.send("~").unwrap();
    session.flush().unwrap();
    session.exp_eof().unwrap();
}
