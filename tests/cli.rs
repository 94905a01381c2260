use std::net::TcpListener;
use std::process::Command;
use std::thread;
use std::time::Duration;

use assert_cmd::prelude::*;
use chrono::{Datelike, Utc};
use predicates::str::contains;
use tempfile::TempDir;

fn free_addr() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind an ephemeral port");
    listener.local_addr().expect("local addr").to_string()
}

#[test]
fn client_cli_no_args() {
    Command::cargo_bin("shelf-client").unwrap().assert().failure();
}

#[test]
fn client_cli_invalid_subcommand() {
    Command::cargo_bin("shelf-client")
        .unwrap()
        .args(&["shelve", "IRO-2025-000001"])
        .assert()
        .failure();
}

#[test]
fn client_cli_invalid_addr() {
    Command::cargo_bin("shelf-client")
        .unwrap()
        .args(&["get", "IRO-2025-000001", "--addr", "invalid-addr"])
        .assert()
        .failure()
        .stderr(contains("could not parse"));
}

#[test]
fn client_cli_invalid_copies() {
    Command::cargo_bin("shelf-client")
        .unwrap()
        .args(&["add", "Dune", "--copies", "many"])
        .assert()
        .failure()
        .stderr(contains("--copies expects a number"));
}

#[test]
fn server_cli_invalid_engine() {
    let dir = TempDir::new().unwrap();
    Command::cargo_bin("shelf-server")
        .unwrap()
        .args(&["--engine", "mongo"])
        .current_dir(&dir)
        .assert()
        .failure();
}

#[test]
fn server_cli_zero_attempts() {
    let dir = TempDir::new().unwrap();
    Command::cargo_bin("shelf-server")
        .unwrap()
        .args(&["--max-attempts", "0", "--addr", free_addr().as_str()])
        .current_dir(&dir)
        .assert()
        .failure()
        .stderr(contains("--max-attempts"));
}

#[test]
fn server_cli_zero_threads() {
    let dir = TempDir::new().unwrap();
    Command::cargo_bin("shelf-server")
        .unwrap()
        .args(&["--threads", "0", "--addr", free_addr().as_str()])
        .current_dir(&dir)
        .assert()
        .failure()
        .stderr(contains("--threads"));
}

#[test]
fn cli_add_get_rm_ls() {
    let dir = TempDir::new().unwrap();
    let addr = free_addr();
    let mut server = Command::cargo_bin("shelf-server")
        .unwrap()
        .args(&["--addr", addr.as_str(), "--threads", "2"])
        .current_dir(&dir)
        .spawn()
        .unwrap();
    thread::sleep(Duration::from_secs(1));

    let prefix = format!("IRO-{}-", Utc::now().year());
    let first = format!("{}000001", prefix);

    Command::cargo_bin("shelf-client")
        .unwrap()
        .args(&["next", prefix.as_str(), "--addr", addr.as_str()])
        .assert()
        .success()
        .stdout(contains(first.as_str()));

    Command::cargo_bin("shelf-client")
        .unwrap()
        .args(&["add", "Dune", "--author", "Frank Herbert", "--year", "1965", "--copies", "2", "--addr", addr.as_str()])
        .assert()
        .success()
        .stdout(contains(first.as_str()));

    Command::cargo_bin("shelf-client")
        .unwrap()
        .args(&["add", "Emma", "--addr", addr.as_str()])
        .assert()
        .success()
        .stdout(contains(format!("{}000002", prefix).as_str()));

    Command::cargo_bin("shelf-client")
        .unwrap()
        .args(&["get", first.as_str(), "--addr", addr.as_str()])
        .assert()
        .success()
        .stdout(contains("Frank Herbert"));

    Command::cargo_bin("shelf-client")
        .unwrap()
        .args(&["rm", first.as_str(), "--addr", addr.as_str()])
        .assert()
        .success();

    Command::cargo_bin("shelf-client")
        .unwrap()
        .args(&["rm", first.as_str(), "--addr", addr.as_str()])
        .assert()
        .failure()
        .stderr(contains("Key not found"));

    Command::cargo_bin("shelf-client")
        .unwrap()
        .args(&["get", first.as_str(), "--addr", addr.as_str()])
        .assert()
        .success()
        .stdout(contains("Book not found"));

    Command::cargo_bin("shelf-client")
        .unwrap()
        .args(&["ls", prefix.as_str(), "--addr", addr.as_str()])
        .assert()
        .success()
        .stdout(contains("Emma"));

    server.kill().expect("server exited before killed");
    server.wait().expect("server did not exit");
}

#[test]
fn server_refuses_a_different_engine() {
    let dir = TempDir::new().unwrap();
    let addr = free_addr();
    let mut server = Command::cargo_bin("shelf-server")
        .unwrap()
        .args(&["--engine", "kvs", "--addr", addr.as_str()])
        .current_dir(&dir)
        .spawn()
        .unwrap();
    thread::sleep(Duration::from_secs(1));
    server.kill().expect("server exited before killed");
    server.wait().expect("server did not exit");

    Command::cargo_bin("shelf-server")
        .unwrap()
        .args(&["--engine", "sled", "--addr", free_addr().as_str()])
        .current_dir(&dir)
        .assert()
        .failure()
        .stderr(contains("does not match"));
}
