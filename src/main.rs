use clap::{Parser, Subcommand};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use fragbot::application::errors::BotError;
use fragbot::application::services::{BotRuntime, FragmentLoader};
use fragbot::fragments;
use fragbot::infrastructure::adapters::console::ConsoleAdapter;
use fragbot::infrastructure::config::Config;
use fragbot::infrastructure::storage::PersistenceStore;

#[derive(Parser)]
#[command(name = "fragbot")]
#[command(about = "A chat bot assembled from self-contained fragments", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "config.yaml")]
    config: String,

    /// Command prefix (overrides config)
    #[arg(short, long)]
    prefix: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the bot on the console
    Run,
    /// Show version
    Version,
    /// Generate default config
    InitConfig,
    /// List built-in fragments
    Fragments,
    /// Load the configured fragments and list their commands
    Commands,
}

fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run => load_config(&cli.config, cli.prefix).and_then(run_bot),
        Commands::Version => {
            println!("fragbot v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::InitConfig => init_config(),
        Commands::Fragments => {
            list_fragments();
            Ok(())
        }
        Commands::Commands => load_config(&cli.config, cli.prefix).and_then(|c| list_commands(&c)),
    };

    if let Err(e) = result {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

fn load_config(path: &str, prefix: Option<String>) -> Result<Config, BotError> {
    let mut config = if Path::new(path).exists() {
        Config::load(path)?
    } else {
        tracing::info!("No config at {}, using defaults", path);
        Config::load_env()
    };

    if let Some(prefix) = prefix {
        config.bot.prefix = prefix;
    }
    config.validate()?;
    Ok(config)
}

fn run_bot(config: Config) -> Result<(), BotError> {
    tracing::info!("Starting {}", config.bot.name);

    let console_enabled = config.adapters.console.as_ref().map_or(true, |c| c.enabled);
    if !console_enabled {
        return Err(BotError::Internal("No event source enabled".to_string()));
    }

    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| BotError::Internal(format!("Failed to start runtime: {}", e)))?;

    let result = rt.block_on(async {
        let bot = BotRuntime::from_config(&config, Arc::new(ConsoleAdapter::new()))?;
        println!(
            "{} ready, {} registrations. Type {}help, Ctrl-C to quit.",
            config.bot.name,
            bot.registry().len(),
            config.bot.prefix
        );

        let stats = bot
            .run_until(async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::warn!("Failed to listen for Ctrl-C: {}", e);
                    std::future::pending::<()>().await;
                }
            })
            .await?;
        tracing::info!(events = stats.events, failed = stats.failed, "Bot stopped");
        Ok::<(), BotError>(())
    });

    // stdin reads may still be parked on a blocking thread
    rt.shutdown_timeout(Duration::from_secs(1));
    result
}

fn init_config() -> Result<(), BotError> {
    let yaml = Config::default().to_yaml()?;
    println!("{}", yaml);
    Ok(())
}

fn list_fragments() {
    for name in fragments::BUILTIN {
        if let Some(fragment) = fragments::create(name) {
            println!("{:<8} {}", fragment.name(), fragment.description());
        }
    }
}

fn list_commands(config: &Config) -> Result<(), BotError> {
    let loaded = FragmentLoader::new(&config.bot.prefix, Arc::new(PersistenceStore::in_memory()))
        .load(&fragments::resolve(&config.fragments)?)?;

    let mut commands: Vec<_> = loaded.registry.commands().collect();
    commands.sort_by(|a, b| a.trigger.text().cmp(b.trigger.text()));
    for cmd in commands {
        println!(
            "{:<16} {:<8} {}",
            cmd.trigger.text(),
            cmd.owner,
            cmd.description.as_deref().unwrap_or("")
        );
    }
    Ok(())
}
