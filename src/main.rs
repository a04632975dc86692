use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use budgetnav::navigate::Navigator;
use budgetnav::{config, nav, navigate};

#[derive(Parser, Debug)]
#[command(name = "budgetnav", version, about = "Budget Manager quick-access navigation")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Prints the Data Administration entries in display order.
    List {
        /// Base URL of the Budget Manager app. Overrides `budgetnav.json`.
        #[arg(long)]
        base: Option<String>,
    },
    /// Opens an entry's page in the default browser.
    Open {
        /// Base URL of the Budget Manager app. Overrides `budgetnav.json`.
        #[arg(long)]
        base: Option<String>,
        /// Entry id or label, e.g. "manageDeposits" or "Manage Deposits".
        entry: String,
    },
    /// Prints the URL an entry navigates to, without opening it.
    Url {
        /// Base URL of the Budget Manager app. Overrides `budgetnav.json`.
        #[arg(long)]
        base: Option<String>,
        /// Entry id or label.
        entry: String,
    },
    /// Checks the local setup and prints guidance.
    Doctor,
    /// Prints the config path that would be used (if any).
    ConfigPath,
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Command::List { base } => {
            let resolved = resolve_base(base.as_deref())?;
            for entry in nav::ENTRIES {
                let url = nav::resolve_url(&resolved.base_url, &entry)?;
                println!("[{}] {} -> {}", entry.id, entry.label, url);
            }
        }
        Command::Open { base, entry } => {
            let resolved = resolve_base(base.as_deref())?;
            let entry = nav::parse_entry(&entry)?;
            let url = nav::resolve_url(&resolved.base_url, entry)?;
            navigate::system()
                .open_url(&url)
                .with_context(|| format!("navigate to '{}'", entry.label))?;
            println!("{url}");
        }
        Command::Url { base, entry } => {
            let resolved = resolve_base(base.as_deref())?;
            let entry = nav::parse_entry(&entry)?;
            let url = nav::resolve_url(&resolved.base_url, entry)?;
            println!("{url}");
        }
        Command::Doctor => {
            let cfg = config::load_optional().context("load config")?;
            let resolved = config::resolve(cfg.as_ref(), None).context("resolve base URL")?;
            match config::resolve_config_path() {
                Some(path) if path.exists() => println!("config: {}", path.display()),
                Some(path) => println!("config: {} (not present, defaults in use)", path.display()),
                None => println!("config: <none> (set BUDGETNAV_CONFIG)"),
            }
            println!("base URL: {}", resolved.base_url);
            println!("entries: {}", nav::ENTRIES.len());
        }
        Command::ConfigPath => {
            if let Some(path) = config::resolve_config_path() {
                println!("{}", path.display());
            }
        }
    }

    Ok(())
}

fn resolve_base(base_arg: Option<&str>) -> Result<config::ResolvedConfig> {
    let cfg = config::load_optional()?;
    config::resolve(cfg.as_ref(), base_arg)
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}
