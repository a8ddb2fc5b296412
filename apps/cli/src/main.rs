//! Hapien CLI - sign in and inspect the local auth session.

mod commands;
mod output;

use clap::{Parser, Subcommand};
use tracing::debug;

/// Hapien CLI - magic-link sign-in and session tools.
#[derive(Parser)]
#[command(name = "hapien")]
#[command(about = "Hapien CLI for authentication and session diagnostics")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(short, long, default_value = "text", global = true)]
    format: output::OutputFormat,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn", global = true, env = "HAPIEN_LOG_LEVEL")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Email a magic link
    Login {
        /// Email address to sign in with
        #[arg(short, long)]
        email: String,
        /// Where the link should land (defaults to the app's callback page)
        #[arg(long)]
        redirect_to: Option<String>,
    },

    /// Sign in with the code from the sign-in email
    Verify {
        #[arg(short, long)]
        email: String,
        /// One-time code from the email
        #[arg(short, long)]
        token: String,
    },

    /// Complete a magic-link redirect
    Callback {
        /// `code` query parameter from the redirect URL
        #[arg(short, long)]
        code: String,
        /// Treat this client as the installed app
        #[arg(long)]
        standalone: bool,
        /// Referrer reported by the platform
        #[arg(long)]
        referrer: Option<String>,
        /// Open the destination in a browser
        #[arg(long)]
        open: bool,
    },

    /// Show identity, profile and feed access
    Status,

    /// Compare provider and local session state
    Diagnose,

    /// Logout and clear session
    Logout,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    hapien_config_and_utils::init_logging("cli", &cli.log_level, None, false);
    debug!(log_level = %cli.log_level, "CLI started");

    let result = match cli.command {
        Commands::Login { email, redirect_to } => {
            commands::login(&email, redirect_to.as_deref(), &cli.format).await
        }
        Commands::Verify { email, token } => commands::verify(&email, &token, &cli.format).await,
        Commands::Callback {
            code,
            standalone,
            referrer,
            open,
        } => commands::callback(&code, standalone, referrer, open, &cli.format).await,
        Commands::Status => commands::status(&cli.format).await,
        Commands::Diagnose => commands::diagnose(&cli.format).await,
        Commands::Logout => commands::logout(&cli.format).await,
    };

    if let Err(e) = result {
        output::print_error(&format!("{:#}", e), &cli.format);
        std::process::exit(1);
    }
}
