//! `ims`: command-line client for the IMS admin console.
//!
//! Signs in against the inventory API, inspects the session, works the
//! notification inbox and checks navigation the way the dashboard would.
//! The session lives in `~/.ims/storage.redb` between runs.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use ims_console::{Console, ConsoleConfig, LocalStorage};
use tracing::debug;

/// IMS console CLI.
#[derive(Parser, Debug)]
#[command(name = "ims", about = "IMS admin console client")]
struct Cli {
    /// Path to config file (default: ~/.ims/config.toml).
    #[arg(long = "config", global = true)]
    config: Option<String>,

    /// Output format: table or json.
    #[arg(long = "output", short = 'o', global = true, default_value = "table")]
    output: String,

    /// Keep the session in memory only; nothing is read from or written to disk.
    #[arg(long, global = true)]
    ephemeral: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Sign in and store the session.
    Login {
        /// Account email.
        #[arg(long)]
        email: Option<String>,
        /// Password (prefer the interactive prompt).
        #[arg(long)]
        password: Option<String>,
    },

    /// Sign out and clear the stored session.
    Logout,

    /// Show the stored session.
    Whoami,

    /// Re-fetch the profile from the API.
    Refresh,

    /// Notification inbox.
    #[command(alias = "notif")]
    Notifications {
        #[command(subcommand)]
        action: NotificationAction,
    },

    /// Check where navigating to a path would land.
    Navigate {
        /// Dashboard path, e.g. /inventory/ris/42.
        path: String,
    },

    /// List sidebar entries visible to the current session.
    Menu,

    /// Dark mode preference.
    #[command(name = "dark-mode")]
    DarkMode {
        #[command(subcommand)]
        action: DarkModeAction,
    },

    /// Show version.
    Version,
}

#[derive(Subcommand, Debug)]
enum NotificationAction {
    /// List the most recent notifications.
    List {
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Mark one notification read.
    Read { id: String },
    /// Mark every notification read.
    ReadAll,
    /// Delete one notification.
    Delete { id: String },
    /// Delete all read notifications.
    DeleteRead,
    /// Stream notifications as they arrive (Ctrl-C to stop).
    Watch,
}

#[derive(Subcommand, Debug)]
enum DarkModeAction {
    Show,
    Toggle,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Commands::Version = cli.command {
        println!("ims cli v{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let config_path = cli
        .config
        .map(PathBuf::from)
        .unwrap_or_else(ConsoleConfig::default_path);
    debug!(path = %config_path.display(), "loading config");
    let config = ConsoleConfig::load(&config_path)?;
    let console = if cli.ephemeral {
        Console::with_parts(
            config.clone(),
            LocalStorage::in_memory(),
            std::sync::Arc::new(ims_client::WsConnector::new(config.push_config())),
            std::sync::Arc::new(ims_console::TracingAudio),
        )?
    } else {
        Console::open(config)?
    };
    let out = commands::Output::parse(&cli.output)?;

    match cli.command {
        Commands::Login { email, password } => {
            let email = match email {
                Some(e) => e,
                None => {
                    eprint!("Email: ");
                    let mut s = String::new();
                    std::io::stdin().read_line(&mut s)?;
                    s.trim().to_string()
                }
            };
            let password = match password {
                Some(p) => p,
                None => rpassword::prompt_password("Password: ")?,
            };
            if email.is_empty() || password.is_empty() {
                anyhow::bail!("Email and password are required.");
            }
            commands::session::login(&console, email, password, out).await?;
        }

        Commands::Logout => commands::session::logout(&console),

        Commands::Whoami => commands::session::whoami(&console, out)?,

        Commands::Refresh => commands::session::refresh(&console, out).await?,

        Commands::Notifications { action } => match action {
            NotificationAction::List { limit } => {
                let limit = limit.unwrap_or(console.config().notifications.page_size);
                commands::notifications::list(&console, limit, out).await?;
            }
            NotificationAction::Read { id } => commands::notifications::read(&console, &id).await?,
            NotificationAction::ReadAll => commands::notifications::read_all(&console).await?,
            NotificationAction::Delete { id } => commands::notifications::delete(&console, &id).await?,
            NotificationAction::DeleteRead => commands::notifications::delete_read(&console).await?,
            NotificationAction::Watch => commands::notifications::watch(&console, out).await?,
        },

        Commands::Navigate { path } => commands::navigation::navigate(&console, &path, out)?,

        Commands::Menu => commands::navigation::menu(&console, out)?,

        Commands::DarkMode { action } => match action {
            DarkModeAction::Show => commands::prefs::show_dark_mode(&console, out)?,
            DarkModeAction::Toggle => commands::prefs::toggle_dark_mode(&console, out)?,
        },

        Commands::Version => {}
    }

    Ok(())
}
