//! FitCheck - save and replay avatar parameter presets
//!
//! ## Commands
//!
//! - `list`: Presets grouped by avatar
//! - `save <preset>`: Snapshot the current avatar
//! - `apply <preset> [--avatar <avatarId>]`: Replay a preset, switching avatars if needed
//! - `rename <avatarId> <preset> <newName>`
//! - `delete <avatarId> <preset>`
//! - `name <avatarId> <displayName>`: Set an avatar's display name
//! - `status`: Discover the endpoint and show the active avatar
//!
//! Data lives in `$FITCHECK_DATA` (default: the platform data directory).

use anyhow::{bail, Context, Result};
use fitcheck_core::config::{
    config_path, default_data_root, load_config, presets_dir, save_config, settings_path,
    FitCheckConfig,
};
use fitcheck_core::notify::OverlayNotification;
use fitcheck_core::{
    ApplyReport, AvatarEndpoint, Endpoint, EndpointLocator, LiveEndpoint, PresetStore, Settings,
};
use std::path::Path;

const USAGE: &str = "\
Usage: fitcheck <command> [args]

Commands:
  list                                  List saved presets
  save <preset>                         Save the current avatar as a preset
  apply <preset> [--avatar <avatarId>]  Apply a preset
  rename <avatarId> <preset> <newName>  Rename a preset
  delete <avatarId> <preset>            Delete a preset
  name <avatarId> <displayName>         Set an avatar's display name
  status                                Show endpoint and active avatar";

#[derive(Debug, PartialEq, Eq)]
enum Command {
    List,
    Save {
        preset: String,
    },
    Apply {
        preset: String,
        avatar_id: Option<String>,
    },
    Rename {
        avatar_id: String,
        preset: String,
        new_name: String,
    },
    Delete {
        avatar_id: String,
        preset: String,
    },
    Name {
        avatar_id: String,
        display_name: String,
    },
    Status,
}

fn parse_args(args: &[String]) -> Result<Command> {
    let Some((command, rest)) = args.split_first() else {
        bail!("No command given\n\n{}", USAGE);
    };
    let rest: Vec<&str> = rest.iter().map(String::as_str).collect();

    let command = match (command.as_str(), rest.as_slice()) {
        ("list", []) => Command::List,
        ("status", []) => Command::Status,
        ("save", [preset]) => Command::Save {
            preset: preset.to_string(),
        },
        ("apply", [preset]) => Command::Apply {
            preset: preset.to_string(),
            avatar_id: None,
        },
        ("apply", [preset, "--avatar", avatar_id]) | ("apply", ["--avatar", avatar_id, preset]) => {
            Command::Apply {
                preset: preset.to_string(),
                avatar_id: Some(avatar_id.to_string()),
            }
        }
        ("rename", [avatar_id, preset, new_name]) => Command::Rename {
            avatar_id: avatar_id.to_string(),
            preset: preset.to_string(),
            new_name: new_name.to_string(),
        },
        ("delete", [avatar_id, preset]) => Command::Delete {
            avatar_id: avatar_id.to_string(),
            preset: preset.to_string(),
        },
        ("name", [avatar_id, display_name @ ..]) if !display_name.is_empty() => Command::Name {
            avatar_id: avatar_id.to_string(),
            display_name: display_name.join(" "),
        },
        (other, _) => bail!("Invalid arguments for '{}'\n\n{}", other, USAGE),
    };
    Ok(command)
}

fn main() -> Result<()> {
    // Initialize logger - set RUST_LOG=debug for verbose output
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.iter().any(|arg| arg == "--help" || arg == "-h") {
        println!("{}", USAGE);
        return Ok(());
    }
    let command = parse_args(&args)?;

    let data_root = default_data_root();
    let config = load_or_create_config(&config_path(&data_root));
    let settings_file = settings_path(&data_root);
    let mut settings = Settings::load(&settings_file)
        .with_context(|| format!("Failed to read settings from {:?}", settings_file))?;
    let mut store = PresetStore::open(presets_dir(&data_root), config.blacklist.clone())
        .context("Failed to load presets")?;

    match command {
        Command::List => print_presets(&store, &settings),

        Command::Status => {
            let (endpoint, mut live) = connect(&config)?;
            let avatar_id = live.avatar_id().context("Failed to query the active avatar")?;
            println!("Endpoint: {} ({})", endpoint.socket_addr(), endpoint.host);
            println!("Avatar:   {} [{}]", settings.display_name(&avatar_id), avatar_id);
            println!("Presets:  {}", store.presets_for(&avatar_id).len());
        }

        Command::Save { preset } => {
            let (_, mut live) = connect(&config)?;
            let saved = store
                .save(&mut live, &preset)
                .with_context(|| format!("Failed to save preset '{}'", preset))?;
            println!(
                "Saved '{}' for {} ({} parameters)",
                saved.name,
                settings.display_name(&saved.avatar_id),
                saved.parameters.len()
            );
            notify(&config, "Preset saved", &saved.name);
        }

        Command::Apply { preset, avatar_id } => {
            let (_, mut live) = connect(&config)?;
            let report = match &avatar_id {
                Some(avatar_id) => store.apply_preset(&mut live, avatar_id, &preset),
                None => store.apply(&mut live, &preset),
            }
            .with_context(|| format!("Failed to apply preset '{}'", preset))?;
            print_report(&report, &settings);
            notify(&config, "Preset applied", &report.preset);
        }

        Command::Rename {
            avatar_id,
            preset,
            new_name,
        } => {
            store
                .rename(&avatar_id, &preset, &new_name)
                .with_context(|| format!("Failed to rename '{}'", preset))?;
            println!("Renamed '{}' to '{}'", preset, new_name);
        }

        Command::Delete { avatar_id, preset } => {
            store
                .delete(&avatar_id, &preset)
                .with_context(|| format!("Failed to delete '{}'", preset))?;
            println!("Deleted '{}'", preset);
        }

        Command::Name {
            avatar_id,
            display_name,
        } => {
            settings.associate_name_to_avatar(display_name.as_str(), avatar_id.as_str());
            settings
                .save(&settings_file)
                .with_context(|| format!("Failed to write settings to {:?}", settings_file))?;
            println!("{} is now '{}'", avatar_id, display_name);
        }
    }

    Ok(())
}

/// Load the config, writing defaults on first run so they can be edited
fn load_or_create_config(path: &Path) -> FitCheckConfig {
    let config: FitCheckConfig = load_config(path);
    if !path.exists() {
        if let Err(e) = save_config(&config, path) {
            log::warn!("Could not write default config: {:#}", e);
        }
    }
    config
}

/// Discover the endpoint and connect to it
fn connect(config: &FitCheckConfig) -> Result<(Endpoint, LiveEndpoint)> {
    let mut locator = EndpointLocator::new(config.discovery.clone());
    let endpoint = locator
        .locate()
        .context("Could not find the application on the local network")?;
    let live = LiveEndpoint::connect(&endpoint, config).context("Failed to open control socket")?;
    Ok((endpoint, live))
}

fn notify(config: &FitCheckConfig, title: &str, content: &str) {
    if !config.notifications.enabled {
        return;
    }
    let notification =
        OverlayNotification::new(title, content).with_timeout(config.notifications.timeout_secs);
    if let Err(e) = notification.send(config.notifications.port) {
        log::warn!("Overlay notification failed: {}", e);
    }
}

fn print_presets(store: &PresetStore, settings: &Settings) {
    if store.is_empty() {
        println!("No presets saved yet in {}", store.root().display());
        return;
    }
    for avatar_id in store.avatar_ids() {
        println!("{} [{}]", settings.display_name(avatar_id), avatar_id);
        for preset in store.presets_for(avatar_id) {
            println!("  {} ({} parameters)", preset.name, preset.parameters.len());
        }
    }
}

fn print_report(report: &ApplyReport, settings: &Settings) {
    if report.switched {
        println!("Switched to {}", settings.display_name(&report.avatar_id));
    }
    println!(
        "Applied '{}': {} sent, {} skipped",
        report.preset,
        report.sent,
        report.skipped.len()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse_args(&args(&["list"])).unwrap(), Command::List);
        assert_eq!(
            parse_args(&args(&["apply", "Photo", "--avatar", "avtr_1"])).unwrap(),
            Command::Apply {
                preset: "Photo".to_string(),
                avatar_id: Some("avtr_1".to_string()),
            }
        );
        assert_eq!(
            parse_args(&args(&["name", "avtr_1", "Red", "Fox"])).unwrap(),
            Command::Name {
                avatar_id: "avtr_1".to_string(),
                display_name: "Red Fox".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_rejects_bad_arity() {
        assert!(parse_args(&args(&[])).is_err());
        assert!(parse_args(&args(&["save"])).is_err());
        assert!(parse_args(&args(&["delete", "avtr_1"])).is_err());
        assert!(parse_args(&args(&["name", "avtr_1"])).is_err());
        assert!(parse_args(&args(&["frobnicate"])).is_err());
    }
}
