//! Command implementations for the `dify-chat` binary.

pub mod account;
pub mod app;
pub mod chat;
pub mod history;
pub mod remote;

use std::io::{self, Write};

use anyhow::{Context as _, Result, anyhow};
use dify_chat_client::{ClientConfig, DifyClient};
use dify_chat_core::{App, LocalState, User};

/// Local state shared by every command.
pub struct Context {
    pub state: LocalState,
}

impl Context {
    pub fn new(state: LocalState) -> Self {
        Self { state }
    }

    pub fn require_user(&self) -> Result<User> {
        self.state
            .auth
            .current_user()?
            .ok_or_else(|| anyhow!("not logged in; run `dify-chat login` first"))
    }

    pub fn require_app(&self) -> Result<App> {
        self.state
            .apps
            .current()?
            .ok_or_else(|| anyhow!("no app configured; run `dify-chat app add` first"))
    }
}

/// Sets up a throwaway account and, when `DIFY_API_KEY` is set, an app from
/// the environment, so an in-memory run can chat right away.
pub fn seed_ephemeral(ctx: &Context) -> Result<()> {
    if !ctx.state.auth.is_initialized()? {
        let password = dify_chat_core::model::new_id();
        ctx.state.auth.initialize("guest", &password, &password)?;
        ctx.state.auth.login("guest", &password)?;
    }
    match ClientConfig::from_env() {
        Ok(config) if ctx.state.apps.list()?.is_empty() => {
            ctx.state
                .apps
                .add(App::new("env", "default", config.api_url, config.api_key))?;
        }
        Ok(_) => {}
        Err(e) => tracing::debug!(error = %e, "no app in environment"),
    }
    Ok(())
}

/// HTTP client for one configured app.
pub fn client_for(app: &App) -> Result<DifyClient> {
    DifyClient::new(ClientConfig::new(&app.api_url, &app.api_key))
        .with_context(|| format!("invalid settings for app {}", app.name))
}

/// Returns `given`, or asks for it on stdin.
pub fn value_or_prompt(given: Option<String>, label: &str) -> Result<String> {
    if let Some(value) = given {
        return Ok(value);
    }
    print!("{label}: ");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin()
        .read_line(&mut line)
        .with_context(|| format!("failed to read {label}"))?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}
