//! Command-line interface definitions.

use addons_catalog::{Actor, AddonId};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Administer the add-on catalog: revision status, add-on details and the
/// derived-artifact cache.
#[derive(Debug, Parser)]
#[command(name = "addons", author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (TOML, or YAML with a .yaml/.yml extension)
    #[arg(short, long, global = true, env = "ADDONS_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Manage derived files such as resized images
    #[command(subcommand)]
    Cache(CacheCommand),
    /// List the revisions of an add-on and their status
    Revisions {
        #[arg(value_parser = parse_addon_id)]
        addon: AddonId,
        /// Show only what this user may see; without it, only approved
        /// revisions are listed
        #[arg(long)]
        user: Option<u64>,
        #[arg(long, requires = "user")]
        manager: bool,
    },
    /// List every add-on with its latest revision
    Latest,
    /// Change revision status flags and pick the latest revision
    Status {
        #[arg(value_parser = parse_addon_id)]
        addon: AddonId,
        /// Revision to mark as the only latest one
        #[arg(long, value_name = "REVISION")]
        latest: Option<u32>,
        /// Flag change such as `alpha-2=on` or `featured-1=off`
        #[arg(long = "set", value_name = "FIELD=on|off", value_parser = parse_flag_change)]
        changes: Vec<(String, bool)>,
        #[command(flatten)]
        actor: ActorArgs,
    },
    /// Toggle approval of one revision
    Approve {
        #[arg(value_parser = parse_addon_id)]
        addon: AddonId,
        revision: u32,
        #[command(flatten)]
        actor: ActorArgs,
    },
    /// Change the name, designer or description of an add-on
    Set {
        #[arg(value_parser = parse_addon_id)]
        addon: AddonId,
        field: String,
        /// New value; omit to clear the field
        value: Option<String>,
        #[command(flatten)]
        actor: ActorArgs,
    },
    /// Delete an add-on, its revisions and its cached files
    Remove {
        #[arg(value_parser = parse_addon_id)]
        addon: AddonId,
        #[command(flatten)]
        actor: ActorArgs,
    },
}

#[derive(Debug, Subcommand)]
pub enum CacheCommand {
    /// Delete every cached file except those matching the keep pattern
    Clear {
        /// Override the configured keep pattern
        #[arg(long, value_name = "REGEX")]
        keep: Option<String>,
    },
    /// Delete the cached files derived from one add-on
    ClearAddon {
        #[arg(value_parser = parse_addon_id)]
        addon: AddonId,
    },
    /// Show the index entry for a cached file
    Lookup { path: String },
}

/// Who is performing a change.
#[derive(Debug, Clone, Copy, Args)]
pub struct ActorArgs {
    /// User id of the person making the change
    #[arg(long)]
    pub user: u64,
    /// Act with the "manage add-ons" capability
    #[arg(long)]
    pub manager: bool,
}

impl From<ActorArgs> for Actor {
    fn from(args: ActorArgs) -> Self {
        Actor { user: args.user, manage_addons: args.manager }
    }
}

fn parse_addon_id(s: &str) -> Result<AddonId, String> {
    AddonId::parse(s).map_err(|e| e.to_string())
}

fn parse_flag_change(s: &str) -> Result<(String, bool), String> {
    let (field, value) = s.split_once('=').ok_or_else(|| format!("expected FIELD=on|off, got `{s}`"))?;
    let on = match value {
        "on" | "true" | "1" => true,
        "off" | "false" | "0" => false,
        _ => return Err(format!("expected on or off, got `{value}`")),
    };
    Ok((field.to_string(), on))
}
