//! Tests for commands/mod.rs CLI parsing

use clap::{CommandFactory, Parser};
use std::path::PathBuf;
use vigil_cli::commands::{
    config::ConfigCommands, decode::HeaderEncoding, keys::KeysCommands, Cli, Commands,
};
use vigil_cli::OutputFormat;

#[test]
fn verify_cli() {
    Cli::command().debug_assert();
}

#[test]
fn test_parse_simulate_defaults() {
    let cli = Cli::parse_from(["vigil", "simulate"]);
    match cli.command {
        Commands::Simulate(args) => {
            assert_eq!(args.nodes, 4);
            assert_eq!(args.crash, vec![0]);
            assert_eq!(args.timeout_secs, 30);
            assert!(args.chain_id.is_none());
        }
        _ => panic!("Expected Simulate command"),
    }
}

#[test]
fn test_parse_simulate_crash_list() {
    let cli = Cli::parse_from(["vigil", "simulate", "--nodes", "7", "--crash", "0,3,5"]);
    match cli.command {
        Commands::Simulate(args) => {
            assert_eq!(args.nodes, 7);
            assert_eq!(args.crash, vec![0, 3, 5]);
        }
        _ => panic!("Expected Simulate command"),
    }
}

#[test]
fn test_parse_decode() {
    let cli = Cli::parse_from(["vigil", "decode", "0xabcd", "--kind", "tagged"]);
    match cli.command {
        Commands::Decode(args) => {
            assert_eq!(args.hex, "0xabcd");
            assert_eq!(args.kind, HeaderEncoding::Tagged);
        }
        _ => panic!("Expected Decode command"),
    }

    let cli = Cli::parse_from(["vigil", "decode", "00"]);
    assert!(matches!(
        cli.command,
        Commands::Decode(ref args) if args.kind == HeaderEncoding::ViewChange
    ));
}

#[test]
fn test_parse_keys_generate() {
    let cli = Cli::parse_from(["vigil", "keys", "generate"]);
    assert!(matches!(cli.command, Commands::Keys(KeysCommands::Generate(_))));
}

#[test]
fn test_parse_config_init() {
    let cli = Cli::parse_from(["vigil", "config", "init", "--members", "4"]);
    match cli.command {
        Commands::Config(ConfigCommands::Init(args)) => {
            assert_eq!(args.members, 4);
            assert_eq!(args.out, PathBuf::from("vigil.toml"));
            assert!(!args.force);
        }
        _ => panic!("Expected Config Init command"),
    }
}

#[test]
fn test_global_config_flag() {
    let cli = Cli::parse_from(["vigil", "simulate", "--config", "node.toml"]);
    assert_eq!(cli.config, Some(PathBuf::from("node.toml")));
}

#[test]
fn test_output_format() {
    let cli = Cli::parse_from(["vigil", "--output", "json", "version"]);
    assert!(matches!(cli.output, OutputFormat::Json));
}

#[test]
fn test_verbose_flags() {
    let cli = Cli::parse_from(["vigil", "-vv", "version"]);
    assert_eq!(cli.verbose, 2);

    let cli = Cli::parse_from(["vigil", "-q", "version"]);
    assert!(cli.quiet);
}
