use anyhow::{Result, bail};
use clap::Subcommand;
use dify_chat_core::CoreError;

use super::{Context, client_for};

/// Conversations as stored by the backend.
#[derive(Subcommand, Debug)]
pub enum RemoteCommand {
    /// List conversations on the server
    List,
    /// Show a conversation's messages from the server
    Messages { conversation: String },
    /// Rename a conversation, or let the server pick a name with --auto
    Rename {
        conversation: String,
        name: Option<String>,
        #[arg(long, conflicts_with = "name")]
        auto: bool,
    },
    /// Delete a conversation on the server and locally
    Delete { conversation: String },
}

pub async fn execute(ctx: &Context, command: RemoteCommand) -> Result<()> {
    let user = ctx.require_user()?;
    let app = ctx.require_app()?;
    let client = client_for(&app)?;

    match command {
        RemoteCommand::List => {
            let page = client.conversations(&user.id).await?;
            if page.data.is_empty() {
                println!("No conversations on the server.");
            }
            for c in page.data {
                println!("{}  {}", c.id, c.name);
            }
            if page.has_more {
                println!("(more available)");
            }
        }
        RemoteCommand::Messages { conversation } => {
            let page = client.messages(&conversation, &user.id).await?;
            for m in page.data {
                println!("\n[you] {}", m.query);
                println!("[assistant] {}", m.answer);
            }
        }
        RemoteCommand::Rename {
            conversation,
            name,
            auto,
        } => {
            let renamed = match (name, auto) {
                (_, true) => client.auto_generate_name(&conversation, &user.id).await?,
                (Some(name), false) => {
                    client
                        .rename_conversation(&conversation, &name, &user.id)
                        .await?
                }
                (None, false) => bail!("give a new name or pass --auto"),
            };
            match ctx.state.conversations.rename(&conversation, &renamed.name) {
                Ok(()) | Err(CoreError::NotFound { .. }) => {}
                Err(e) => return Err(e.into()),
            }
            println!("Renamed to {:?}.", renamed.name);
        }
        RemoteCommand::Delete { conversation } => {
            client.delete_conversation(&conversation, &user.id).await?;
            match ctx.state.conversations.remove(&conversation) {
                Ok(()) | Err(CoreError::NotFound { .. }) => {}
                Err(e) => return Err(e.into()),
            }
            println!("Deleted {conversation}.");
        }
    }
    Ok(())
}
