use clap::{Parser, Subcommand};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use chatlayer::infrastructure::adapters::{ConsoleAdapter, TelegramAdapter, TelegramTransport};
use chatlayer::infrastructure::config::Config;
use chatlayer::{BotSettings, ChatBot, LoggingMiddleware, Transport};

mod demo;

#[derive(Parser)]
#[command(name = "chatlayer")]
#[command(about = "Layered conversational Telegram bot", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "config.yaml")]
    config: String,

    /// Bot token (overrides config)
    #[arg(short, long)]
    token: Option<String>,

    /// Verbose logs and the JSON echo for unhandled events
    #[arg(short, long)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the bot
    Run,
    /// Show version
    Version,
    /// Generate default config
    InitConfig,
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let level = if cli.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .init();

    match cli.command {
        Commands::Run => {
            run_bot(cli.config, cli.token, cli.debug);
        }
        Commands::Version => {
            println!("chatlayer v{}", env!("CARGO_PKG_VERSION"));
        }
        Commands::InitConfig => {
            init_config();
        }
    }
}

fn load_config(path: &str) -> Config {
    if !std::path::Path::new(path).exists() {
        return Config::load_env();
    }

    match Config::load(path) {
        Ok(mut config) => {
            config.apply_env();
            config
        }
        Err(e) => {
            tracing::warn!("Failed to load config: {}, using defaults", e);
            Config::load_env()
        }
    }
}

fn run_bot(config_path: String, token_override: Option<String>, debug: bool) {
    let mut config = load_config(&config_path);
    if debug {
        config.bot.debug = true;
    }
    tracing::info!("Starting {}", config.bot.name);

    let transport: Arc<dyn Transport> =
        match token_override.or_else(|| config.telegram.token.clone()) {
            Some(token) => Arc::new(TelegramTransport::new(TelegramAdapter::new(
                token,
                &config.telegram,
            ))),
            None => {
                tracing::info!("No bot token configured, running on the console");
                Arc::new(ConsoleAdapter::new())
            }
        };

    let settings = match BotSettings::try_from(&config) {
        Ok(settings) => settings,
        Err(e) => {
            tracing::error!("{}", e);
            std::process::exit(1);
        }
    };

    let bot = ChatBot::builder(transport).settings(settings).build();
    bot.register_middleware(LoggingMiddleware);
    demo::JokeService::new(bot.clone()).register();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("Failed to start runtime: {}", e);
            std::process::exit(1);
        }
    };

    let result = rt.block_on(async {
        let cancel = CancellationToken::new();
        let on_signal = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Shutting down");
            }
            on_signal.cancel();
        });

        bot.start(cancel).await
    });

    if let Err(e) = result {
        tracing::error!("Bot failed: {}", e);
        std::process::exit(1);
    }
}

fn init_config() {
    match Config::default().to_yaml() {
        Ok(yaml) => {
            println!("{}", yaml);
            println!("\nSave this to config.yaml and adjust as needed.");
        }
        Err(e) => {
            eprintln!("Failed to render config: {}", e);
            std::process::exit(1);
        }
    }
}
