//! # mailagent
//!
//! Command-line client for the mailagent backend: chat with the assistant,
//! draft emails over the realtime socket, and manage account settings over
//! REST.

#![deny(unsafe_code)]

mod commands;
mod context;
mod navigator;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use mailagent_api::{LogCategory, LogLevel};
use mailagent_core::logging::{LogFormat, init_subscriber};
use mailagent_settings::loader::{load_settings_from_path, settings_path};

use crate::context::AppContext;

/// mailagent command-line client.
#[derive(Parser, Debug)]
#[command(name = "mailagent", version, about = "Chat with mailagent and draft emails")]
struct Cli {
    /// Settings file (defaults to `~/.mailagent/settings.json`).
    #[arg(long, global = true, env = "MAILAGENT_CONFIG")]
    config: Option<PathBuf>,

    /// Log at debug level.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sign in and store the session token.
    Login {
        /// Account email.
        #[arg(long)]
        email: String,
        /// Account password.
        #[arg(long, env = "MAILAGENT_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Create an account; a verification code is emailed.
    Register {
        /// Account email.
        #[arg(long)]
        email: String,
        /// Display name.
        #[arg(long)]
        username: Option<String>,
        /// Account password.
        #[arg(long, env = "MAILAGENT_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Confirm registration with the emailed code, or request a new one.
    Verify {
        /// Account email.
        #[arg(long)]
        email: String,
        /// Six-digit code; omit to have a new code sent.
        #[arg(long)]
        code: Option<String>,
    },
    /// End the session.
    Logout,
    /// Show the signed-in account.
    Whoami,
    /// Send one chat message.
    Chat {
        /// Message text.
        message: String,
        /// Reply tone.
        #[arg(long)]
        tone: Option<String>,
        /// Keep the exchange in the chat transcript.
        #[arg(long)]
        save: bool,
    },
    /// Generate an email draft.
    Email {
        /// Recipient address.
        #[arg(long)]
        to: String,
        /// What the email should say.
        prompt: String,
        /// Writing tone.
        #[arg(long)]
        tone: Option<String>,
        /// Store the result as a draft.
        #[arg(long)]
        save: bool,
    },
    /// List saved drafts.
    Drafts,
    /// Browse or clear email (or chat) history.
    History(HistoryArgs),
    /// Show usage statistics.
    Stats,
    /// Manage sender mailboxes.
    #[command(subcommand)]
    Configs(ConfigsCommand),
    /// Manage environment variables.
    #[command(subcommand)]
    Vars(VarsCommand),
    /// Inspect backend activity logs.
    Logs(LogsArgs),
    /// Show or change preferences.
    #[command(subcommand)]
    Prefs(PrefsCommand),
    /// Password reset.
    #[command(subcommand)]
    Password(PasswordCommand),
    /// Account deletion.
    #[command(subcommand)]
    Account(AccountCommand),
    /// Check backend and socket health.
    Status,
}

#[derive(Args, Debug)]
struct HistoryArgs {
    /// Page size (1-100).
    #[arg(long, default_value = "20")]
    limit: u32,
    /// Only emails before this ISO-8601 time.
    #[arg(long)]
    before: Option<String>,
    /// Delete the whole history instead of listing it.
    #[arg(long)]
    clear: bool,
    /// The chat transcript instead of generated emails.
    #[arg(long)]
    chat: bool,
}

#[derive(Subcommand, Debug)]
enum ConfigsCommand {
    /// List mailboxes.
    List,
    /// Show the active mailbox.
    Active,
    /// Add or update a mailbox.
    Add {
        /// Mailbox address.
        email: String,
        /// App password.
        #[arg(long, env = "MAILAGENT_MAILBOX_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Remove a mailbox.
    Remove {
        /// Mailbox address.
        email: String,
    },
    /// Send new emails from this mailbox.
    Activate {
        /// Mailbox address.
        email: String,
    },
}

#[derive(Subcommand, Debug)]
enum VarsCommand {
    /// List variables.
    List,
    /// Show one variable.
    Get {
        /// Variable name.
        key: String,
    },
    /// Create or overwrite a variable.
    Set {
        /// Variable name.
        key: String,
        /// Value.
        value: String,
    },
    /// Delete a variable.
    Delete {
        /// Variable name.
        key: String,
    },
}

#[derive(Args, Debug)]
struct LogsArgs {
    /// Severity filter.
    #[arg(long)]
    level: Option<LogLevel>,
    /// Subsystem filter.
    #[arg(long)]
    category: Option<LogCategory>,
    /// Message substring.
    #[arg(long)]
    search: Option<String>,
    /// Entries to show.
    #[arg(long, default_value = "100")]
    limit: u32,
    /// Show counters instead of entries.
    #[arg(long, conflicts_with = "cleanup")]
    stats: bool,
    /// Delete entries older than this many days (30 if no value is given).
    #[arg(long, value_name = "DAYS", num_args = 0..=1, default_missing_value = "30")]
    cleanup: Option<u32>,
}

#[derive(Subcommand, Debug)]
enum PrefsCommand {
    /// Show preferences.
    Show,
    /// Change preferences.
    Set {
        /// Language code.
        #[arg(long)]
        language: Option<String>,
        /// Default tone.
        #[arg(long)]
        tone: Option<String>,
        /// Allow learning from past emails.
        #[arg(long)]
        ai_learning: Option<bool>,
        /// Keep history beyond 24 hours.
        #[arg(long)]
        save_history: Option<bool>,
    },
}

#[derive(Subcommand, Debug)]
enum PasswordCommand {
    /// Email a reset link.
    Forgot {
        /// Account email.
        #[arg(long)]
        email: String,
    },
    /// Set a new password with the reset token.
    Reset {
        /// Token from the reset email.
        #[arg(long)]
        token: String,
        /// New password.
        #[arg(long, env = "MAILAGENT_NEW_PASSWORD", hide_env_values = true)]
        new_password: String,
    },
}

#[derive(Subcommand, Debug)]
enum AccountCommand {
    /// Email a deletion confirmation code.
    RequestDeletion,
    /// Delete the account with the emailed code.
    Delete {
        /// Confirmation code.
        #[arg(long)]
        code: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let path = cli.config.clone().unwrap_or_else(settings_path);
    let settings = load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;

    let level = if cli.verbose { "debug" } else { settings.logging.level.as_str() };
    let format = if settings.logging.json { LogFormat::Json } else { LogFormat::Compact };
    init_subscriber(level, format);
    tracing::debug!(path = %path.display(), "settings loaded");

    let ctx = AppContext::new(settings)?;
    let result = commands::run(&ctx, cli.command).await;
    ctx.shutdown();
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_chat() {
        let cli = Cli::parse_from(["mailagent", "chat", "hello there", "--tone", "friendly"]);
        let Command::Chat { message, tone, save } = cli.command else {
            panic!("expected chat");
        };
        assert_eq!(message, "hello there");
        assert_eq!(tone.as_deref(), Some("friendly"));
        assert!(!save);
    }

    #[test]
    fn history_chat_clear() {
        let cli = Cli::parse_from(["mailagent", "history", "--chat", "--clear"]);
        let Command::History(args) = cli.command else {
            panic!("expected history");
        };
        assert!(args.chat);
        assert!(args.clear);
        assert_eq!(args.limit, 20);
    }

    #[test]
    fn parses_email_with_save() {
        let cli = Cli::parse_from([
            "mailagent", "email", "--to", "bob@example.com", "ask for the report", "--save",
        ]);
        let Command::Email { to, save, tone, .. } = cli.command else {
            panic!("expected email");
        };
        assert_eq!(to, "bob@example.com");
        assert!(save);
        assert_eq!(tone, None);
    }

    #[test]
    fn parses_log_filters() {
        let cli = Cli::parse_from(["mailagent", "logs", "--level", "error", "--category", "websocket"]);
        let Command::Logs(args) = cli.command else {
            panic!("expected logs");
        };
        assert_eq!(args.level, Some(LogLevel::Error));
        assert_eq!(args.category, Some(LogCategory::WebSocket));
        assert_eq!(args.limit, 100);
    }

    #[test]
    fn cleanup_defaults_to_retention_window() {
        let cli = Cli::parse_from(["mailagent", "logs", "--cleanup"]);
        let Command::Logs(args) = cli.command else {
            panic!("expected logs");
        };
        assert_eq!(args.cleanup, Some(mailagent_api::logs::DEFAULT_RETENTION_DAYS));

        let cli = Cli::parse_from(["mailagent", "logs", "--cleanup", "7"]);
        let Command::Logs(args) = cli.command else {
            panic!("expected logs");
        };
        assert_eq!(args.cleanup, Some(7));
    }

    #[test]
    fn rejects_unknown_log_level() {
        assert!(Cli::try_parse_from(["mailagent", "logs", "--level", "loud"]).is_err());
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::parse_from(["mailagent", "status", "-v", "--config", "/tmp/s.json"]);
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/s.json")));
    }

    #[test]
    fn configs_subcommands() {
        let cli = Cli::parse_from(["mailagent", "configs", "activate", "ann@example.com"]);
        assert!(matches!(
            cli.command,
            Command::Configs(ConfigsCommand::Activate { ref email }) if email == "ann@example.com"
        ));
    }

    #[test]
    fn verify_without_code_resends() {
        let cli = Cli::parse_from(["mailagent", "verify", "--email", "ann@example.com"]);
        assert!(matches!(cli.command, Command::Verify { code: None, .. }));
    }
}
