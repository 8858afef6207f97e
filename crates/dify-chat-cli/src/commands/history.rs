use anyhow::{Result, bail};

use super::Context;
use super::chat::print_transcript;

/// Lists local conversations for the current user and app, or prints one.
pub fn execute(ctx: &Context, conversation: Option<String>) -> Result<()> {
    let user = ctx.require_user()?;
    if let Some(id) = conversation {
        let conversation = ctx.state.conversations.get(&id)?;
        if conversation.user_id != user.id {
            bail!("conversation {id} belongs to another user");
        }
        print_transcript(&conversation);
        return Ok(());
    }

    let app = ctx.require_app()?;
    let conversations = ctx.state.conversations.list_for(&user.id, &app.id)?;
    if conversations.is_empty() {
        println!("No saved conversations for {}.", app.name);
    }
    for c in conversations {
        let updated = chrono::DateTime::from_timestamp_millis(c.updated_at)
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        println!(
            "{}  {:<34} {:>3} msgs  {}",
            c.id,
            c.name,
            c.messages.len(),
            updated
        );
    }
    Ok(())
}
