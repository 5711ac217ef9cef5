// SPDX-License-Identifier: MIT OR Apache-2.0
//! Argument and address validation through the real binary.

use assert_cmd::Command;
use predicates::prelude::*;

fn aurora() -> Command {
    Command::cargo_bin("aurora").expect("binary builds")
}

#[test]
fn http_address_is_rejected_without_the_insecure_flag() {
    aurora()
        .args(["get", "-a", "http://aurora.example.com/rpc/"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("--i-use-insecure-address"));
}

#[test]
fn unknown_scheme_is_rejected() {
    aurora()
        .args(["get", "-a", "ftp://aurora.example.com/rpc/"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("unexpected URL scheme"));
}

#[test]
fn address_without_path_is_rejected() {
    aurora()
        .args(["get", "-a", "https://aurora.example.com"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("URL path is not specified"));
}

#[test]
fn watch_requires_a_package() {
    aurora().arg("watch").assert().failure();
}

#[test]
fn help_lists_every_command() {
    let assert = aurora().arg("--help").assert().success();
    let output = String::from_utf8(assert.get_output().stdout.clone()).unwrap();

    for command in ["get", "add", "rm", "log", "watch", "whoami"] {
        assert!(output.contains(command), "help is missing {command:?}");
    }
}
