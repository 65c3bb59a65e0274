use anyhow::{Context, Result};
use clap::Subcommand;

use crate::cli::output::{Formatter, get_formatter};
use crate::models::{Config, OutputFormat};

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    #[command(about = "Initialize configuration file")]
    Init {
        #[arg(
            long,
            short = 'g',
            help = "Create global config instead of project config"
        )]
        global: bool,
        #[arg(long, short = 'f', help = "Force overwrite existing config")]
        force: bool,
    },
    #[command(about = "Show current configuration (secrets are never shown)")]
    Show,
    #[command(about = "Show configuration file paths")]
    Path,
}

pub async fn handle_config(cmd: ConfigCommand, format: OutputFormat, _verbose: bool) -> Result<()> {
    let formatter = get_formatter(format);

    match cmd {
        ConfigCommand::Init { global, force } => handle_init(global, force, formatter.as_ref()),
        ConfigCommand::Show => handle_show(format),
        ConfigCommand::Path => handle_path(format),
    }
}

fn handle_init(global: bool, force: bool, formatter: &dyn Formatter) -> Result<()> {
    let config_path = if global {
        Config::global_path()
            .ok_or_else(|| anyhow::anyhow!("could not determine config directory"))?
    } else {
        Config::project_path()
    };

    if config_path.exists() && !force {
        anyhow::bail!(
            "Config already exists at: {}\nUse --force to overwrite.",
            config_path.display()
        );
    }

    Config::default()
        .save(&config_path)
        .with_context(|| format!("failed to write {}", config_path.display()))?;
    print!(
        "{}",
        formatter.format_message(&format!("Created config at: {}", config_path.display()))
    );

    Ok(())
}

fn handle_show(format: OutputFormat) -> Result<()> {
    let config = Config::load()?;

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    match Config::active_path() {
        Some(path) => println!("# Loaded from: {}", path.display()),
        None => println!("# No config file found, using defaults"),
    }
    println!();
    print!("{}", toml::to_string_pretty(&config)?);

    Ok(())
}

fn handle_path(format: OutputFormat) -> Result<()> {
    let project = Config::project_path();
    let global = Config::global_path();
    let active = Config::active_path();

    if format == OutputFormat::Json {
        let output = serde_json::json!({
            "project": project,
            "global": global,
            "active": active,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let marker = |path: &std::path::Path| {
        if active.as_deref() == Some(path) {
            " (active)"
        } else if path.exists() {
            ""
        } else {
            " (not found)"
        }
    };

    println!("Project: {}{}", project.display(), marker(project.as_path()));
    match &global {
        Some(path) => println!("Global:  {}{}", path.display(), marker(path.as_path())),
        None => println!("Global:  <no config directory>"),
    }

    Ok(())
}
