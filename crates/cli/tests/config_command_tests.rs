//! Tests for commands/config.rs

use tempfile::tempdir;
use vigil_cli::commands::config::{execute, local_members, ConfigCommands, InitArgs, ValidateArgs};
use vigil_cli::commands::simulate::simulation_keys;
use vigil_cli::{CliError, OutputFormat};
use vigil_config::Config;

#[test]
fn test_local_members_match_simulation_keys() {
    let members = local_members(4).unwrap();
    let keys = simulation_keys(4).unwrap();
    assert_eq!(members.len(), 4);
    for (member, key) in members.iter().zip(&keys) {
        assert_eq!(member.public_key, key.public_key().to_hex());
        assert_eq!(member.weight, 1);
    }
    assert_eq!(members[3].address, "127.0.0.1:30303");
}

#[test]
fn test_init_writes_loadable_config() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("vigil.toml");

    execute(
        ConfigCommands::Init(InitArgs {
            out: out.clone(),
            members: 4,
            chain_id: Some("devnet".to_string()),
            force: false,
        }),
        OutputFormat::Json,
    )
    .unwrap();

    let config = Config::load(&out).unwrap();
    assert_eq!(config.view_change.chain_id, "devnet");
    assert_eq!(config.committee.parsed_members().unwrap().len(), 4);

    execute(
        ConfigCommands::Validate(ValidateArgs { path: out }),
        OutputFormat::Json,
    )
    .unwrap();
}

#[test]
fn test_init_refuses_to_overwrite() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("vigil.toml");
    std::fs::write(&out, "# existing").unwrap();

    let args = |force| InitArgs {
        out: out.clone(),
        members: 0,
        chain_id: None,
        force,
    };
    assert!(matches!(
        execute(ConfigCommands::Init(args(false)), OutputFormat::Json),
        Err(CliError::InvalidArgument(_))
    ));
    execute(ConfigCommands::Init(args(true)), OutputFormat::Json).unwrap();
    assert!(Config::load(&out).unwrap().committee.members.is_empty());
}

#[test]
fn test_validate_reports_bad_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("vigil.toml");
    std::fs::write(&path, "[logging]\nlevel = \"loud\"\n").unwrap();

    assert!(matches!(
        execute(ConfigCommands::Validate(ValidateArgs { path }), OutputFormat::Json),
        Err(CliError::Config(_))
    ));
}
