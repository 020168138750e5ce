use adsight::commands::{self, account, ads, chat, connect, onboard, Context};
use adsight::console::Console;
use adsight::Config;
use adsight_api::SessionStore;
use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// AdSight: campaign insights for your ad accounts
#[derive(Parser)]
#[command(name = "adsight", version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true, env = "ADSIGHT_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an account
    Signup,
    /// Log in with email and password
    Login {
        #[arg(long)]
        email: Option<String>,
    },
    /// Log out and remove stored credentials
    Logout,
    /// Link a Google Ads account
    Connect,
    /// Show login and account connection status
    Status,
    /// Show the Google Ads account summary
    Summary,
    /// Sync Google Ads data
    Sync {
        /// Number of weeks to sync
        #[arg(long, default_value_t = 1)]
        weeks: u32,
    },
    /// Chat with the campaign assistant
    Chat {
        /// Continue an existing session
        #[arg(long)]
        session: Option<String>,
        /// Title for a new session
        #[arg(long)]
        title: Option<String>,
    },
    /// Manage chat sessions
    Sessions {
        #[command(subcommand)]
        command: chat::SessionCommands,
    },
    /// Guided setup: account, then ad platform connections
    Onboard,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("adsight=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    init_logging();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("{} {e:#}", "error:".red());
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let mut config = Config::load_or_default(&config_path);
    config.apply_env();

    let store = SessionStore::default_location()?;
    let mut ctx = Context::new(config, store, Console::stdin())?;

    let result = dispatch(&mut ctx, cli.command).await;
    match result {
        Err(e) => match commands::login_required(&e) {
            Some(required) => {
                eprintln!("{} {}", "✗".red().bold(), required.message());
                account::login(&mut ctx, None).await.map(|_| ())
            }
            None => Err(e),
        },
        ok => ok,
    }
}

async fn dispatch(ctx: &mut Context, command: Commands) -> Result<()> {
    match command {
        Commands::Signup => account::signup(ctx).await.map(|_| ()),
        Commands::Login { email } => account::login(ctx, email).await.map(|_| ()),
        Commands::Logout => account::logout(ctx).await,
        Commands::Connect => connect::run(ctx).await.map(|_| ()),
        Commands::Status => account::status(ctx).await,
        Commands::Summary => ads::summary(ctx).await,
        Commands::Sync { weeks } => ads::sync(ctx, weeks).await,
        Commands::Chat { session, title } => chat::run(ctx, session, title).await,
        Commands::Sessions { command } => chat::sessions(ctx, command).await,
        Commands::Onboard => onboard::run(ctx).await,
    }
}
