//! khotruyen CLI - talk to the khotruyen.vn API with a persistent login.

mod commands;
mod output;

use clap::{Parser, Subcommand};
use khotruyen_config::{init_logging, Config, Paths};
use tracing::debug;

/// khotruyen CLI - log in once and call the API with automatic token refresh.
#[derive(Parser)]
#[command(name = "khotruyen")]
#[command(about = "Command-line client for the khotruyen.vn API")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(short, long, default_value = "text", global = true)]
    format: output::OutputFormat,

    /// Log level (trace, debug, info, warn, error); defaults to the configured level
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// API base URL, overriding config and environment
    #[arg(long, global = true)]
    api_url: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Login with email and password
    Login {
        /// Account email (prompted when omitted)
        #[arg(short, long)]
        email: Option<String>,
    },

    /// Create an account and log in
    Register {
        /// Display name (prompted when omitted)
        #[arg(short, long)]
        name: Option<String>,
        /// Account email (prompted when omitted)
        #[arg(short, long)]
        email: Option<String>,
    },

    /// Logout and clear session
    Logout,

    /// Show the local session state
    Status,

    /// Fetch the logged-in user's profile
    Me,

    /// GET an API path with the current session, e.g. `/stories?page=2`
    Get {
        /// Path below the API base URL
        path: String,
    },
}

impl Commands {
    /// Whether the restored session should be checked against `/auth/me`
    /// before running the command.
    fn verifies_session(&self) -> bool {
        matches!(self, Commands::Get { .. })
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let paths = Paths::new()?;
    let mut config = Config::load(&paths)?;
    if let Some(url) = cli.api_url {
        config.api_base_url = url;
        config.validate()?;
    }

    let level = cli.log_level.as_deref().unwrap_or(&config.log_level);
    paths.ensure_dirs()?;
    init_logging("cli", level, Some(&paths), false);
    debug!(api_base_url = %config.api_base_url, "Configuration loaded");

    let verify = config.verify_profile_on_startup && cli.command.verifies_session();
    let ctx = commands::Context::open(&paths, &config, &cli.format, verify).await?;

    match cli.command {
        Commands::Login { email } => commands::login(&ctx, email).await,
        Commands::Register { name, email } => commands::register(&ctx, name, email).await,
        Commands::Logout => commands::logout(&ctx).await,
        Commands::Status => commands::status(&ctx),
        Commands::Me => commands::me(&ctx).await,
        Commands::Get { path } => commands::get(&ctx, &path).await,
    }
}
