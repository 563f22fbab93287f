//! Tests for simulate, completions, man.

use super::parse;
use crate::cli::{Cli, CliCommand};
use clap::{CommandFactory, Parser};
use clap_complete::Shell;

#[test]
fn cli_parse_simulate() {
    match parse(&["dcm", "simulate", "retry.toml"]) {
        CliCommand::Simulate { path, json } => {
            assert_eq!(path.to_str(), Some("retry.toml"));
            assert!(!json);
        }
        _ => panic!("expected Simulate"),
    }
}

#[test]
fn cli_parse_simulate_json() {
    match parse(&["dcm", "simulate", "retry.json", "--json"]) {
        CliCommand::Simulate { json, .. } => assert!(json),
        _ => panic!("expected Simulate"),
    }
}

#[test]
fn cli_parse_completions() {
    match parse(&["dcm", "completions", "bash"]) {
        CliCommand::Completions { shell } => assert_eq!(shell, Shell::Bash),
        _ => panic!("expected Completions"),
    }
    assert!(Cli::try_parse_from(["dcm", "completions", "tcsh"]).is_err());
}

#[test]
fn cli_parse_man() {
    match parse(&["dcm", "man"]) {
        CliCommand::Man => {}
        _ => panic!("expected Man"),
    }
}

#[test]
fn cli_definition_is_consistent() {
    Cli::command().debug_assert();
}
