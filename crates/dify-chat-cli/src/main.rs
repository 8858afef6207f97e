//! `dify-chat`: terminal client for Dify chat apps.

mod commands;
mod config;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use dify_chat_core::LocalState;

use commands::Context;
use commands::app::AppCommand;
use commands::remote::RemoteCommand;

#[derive(Parser, Debug)]
#[command(name = "dify-chat", version, about = "Chat with Dify apps from the terminal")]
struct Args {
    /// Directory for local data (default ~/.dify-chat)
    #[arg(long, env = "DIFY_CHAT_DATA_DIR", global = true)]
    data_dir: Option<PathBuf>,

    /// Keep everything in memory for this run
    #[arg(long, global = true)]
    memory: bool,

    /// Default log filter when DIFY_CHAT_LOG_LEVEL and RUST_LOG are unset
    #[arg(long, default_value = "warn", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the administrator account
    Init {
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        password: Option<String>,
        #[arg(long)]
        confirm_password: Option<String>,
    },
    /// Sign in
    Login {
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        password: Option<String>,
    },
    /// Sign out
    Logout,
    /// Manage configured apps
    #[command(subcommand)]
    App(AppCommand),
    /// Start an interactive chat with the current app
    Chat {
        /// Continue a saved conversation
        #[arg(long)]
        conversation: Option<String>,
    },
    /// List saved conversations, or print one
    History { conversation: Option<String> },
    /// Manage conversations on the server
    #[command(subcommand)]
    Remote(RemoteCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    config::load_env();
    let args = Args::parse();
    dify_chat_core::init_observability(&args.log_level);

    let store = config::resolve_store(args.data_dir, args.memory);
    tracing::debug!(?store, "opening local state");
    let ctx = Context::new(LocalState::open(&store)?);
    if args.memory {
        commands::seed_ephemeral(&ctx)?;
    }

    match args.command {
        Command::Init {
            username,
            password,
            confirm_password,
        } => commands::account::init(&ctx, username, password, confirm_password),
        Command::Login { username, password } => commands::account::login(&ctx, username, password),
        Command::Logout => commands::account::logout(&ctx),
        Command::App(command) => commands::app::execute(&ctx, command).await,
        Command::Chat { conversation } => commands::chat::execute(&ctx, conversation).await,
        Command::History { conversation } => commands::history::execute(&ctx, conversation),
        Command::Remote(command) => commands::remote::execute(&ctx, command).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory as _;

    #[test]
    fn command_definition_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn parses_nested_commands_with_global_flags() {
        let args = Args::try_parse_from([
            "dify-chat",
            "remote",
            "rename",
            "c-1",
            "--auto",
            "--memory",
        ])
        .unwrap();
        assert!(args.memory);
        assert!(matches!(
            args.command,
            Command::Remote(RemoteCommand::Rename { auto: true, name: None, .. })
        ));

        assert!(
            Args::try_parse_from(["dify-chat", "remote", "rename", "c-1", "x", "--auto"]).is_err()
        );
    }
}
