use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;

use herdstore::cli::{Cli, Command};
use herdstore::{Health, JsonStore, SettingsStore, default_settings_path};

fn setup_logging() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Warn)
        .init();
    Ok(())
}

fn main() -> Result<()> {
    setup_logging().context("Failed to setup logging")?;

    let cli = Cli::parse();
    let path = cli.store.unwrap_or_else(default_settings_path);
    let store = JsonStore::open(&path).context("Failed to open settings store")?;

    info!("herdstore opened {}", path.display());

    match cli.command {
        Command::List => {
            let settings = store.load()?;
            if settings.repos.is_empty() {
                println!("No repositories");
            }
            for repo in &settings.repos {
                let health = settings.health.get(repo).copied().unwrap_or_default();
                let health = match health {
                    Health::Ok => health.to_string().green(),
                    Health::Errored => health.to_string().red(),
                };
                let hidden = if settings.hidden_repos.contains(repo) {
                    " (hidden)".dimmed().to_string()
                } else {
                    String::new()
                };
                println!("{} [{}]{}", repo.cyan(), health, hidden);
                if let Some(flags) = settings.branch_enabled.get(repo) {
                    for (branch, enabled) in flags {
                        let mark = if *enabled { "on".green() } else { "off".dimmed() };
                        println!("  {} {}", branch, mark);
                    }
                }
            }
        }
        Command::Get { repo, branch } => match store.branch_enabled(&repo, &branch)? {
            Some(enabled) => println!("{}", enabled),
            None => println!("{}", "unset".dimmed()),
        },
        Command::Set { repo, branch, enabled } => {
            store.set_branch_enabled(&repo, &branch, enabled)?;
            println!("{} {} = {}", "✓".green(), branch.cyan(), enabled);
        }
        Command::Health { repo, value } => match value {
            Some(value) => {
                let health: Health = value.parse().map_err(|e: String| eyre::eyre!(e))?;
                store.set_health(&repo, health)?;
                println!("{} {} is {}", "✓".green(), repo.display(), health);
            }
            None => {
                let health = store.health(&repo)?.unwrap_or_default();
                println!("{}", health);
            }
        },
    }

    Ok(())
}
