use anyhow::Result;
use clap::Subcommand;
use dify_chat_core::App;

use super::{Context, client_for};

#[derive(Subcommand, Debug)]
pub enum AppCommand {
    /// Register a Dify app
    Add {
        #[arg(long)]
        name: String,
        /// Group shown in listings
        #[arg(long)]
        group: String,
        /// API base URL, e.g. https://api.dify.ai/v1
        #[arg(long)]
        url: String,
        /// App API key
        #[arg(long, env = "DIFY_API_KEY", hide_env_values = true)]
        key: String,
        /// Allow image attachments
        #[arg(long)]
        visual: bool,
    },
    /// List registered apps; `*` marks the current one
    List,
    /// Make an app current
    Use { app: String },
    /// Remove an app
    Remove { app: String },
    /// Show the current app's parameters from the backend
    Params,
}

pub async fn execute(ctx: &Context, command: AppCommand) -> Result<()> {
    match command {
        AppCommand::Add {
            name,
            group,
            url,
            key,
            visual,
        } => {
            let mut app = App::new(name, group, url, key);
            app.visual_enabled = visual;
            let app = ctx.state.apps.add(app)?;
            println!("Added {} ({}).", app.name, app.id);
        }
        AppCommand::List => {
            let current = ctx.state.apps.current()?.map(|a| a.id);
            let apps = ctx.state.apps.list()?;
            if apps.is_empty() {
                println!("No apps configured.");
            }
            for app in apps {
                let marker = if current.as_deref() == Some(app.id.as_str()) {
                    "*"
                } else {
                    " "
                };
                println!(
                    "{marker} {:<24} {:<16} {} [{}]",
                    app.name, app.group_name, app.api_url, app.id
                );
            }
        }
        AppCommand::Use { app } => {
            let app = ctx.state.apps.find(&app)?;
            ctx.state.apps.set_current(&app.id)?;
            println!("Now using {}.", app.name);
        }
        AppCommand::Remove { app } => {
            let app = ctx.state.apps.find(&app)?;
            ctx.state.apps.remove(&app.id)?;
            println!("Removed {}.", app.name);
        }
        AppCommand::Params => {
            let app = ctx.require_app()?;
            let params = client_for(&app)?.parameters().await?;
            println!("{}", serde_json::to_string_pretty(&params)?);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dify_chat_core::{LocalState, StoreConfig};

    #[tokio::test]
    async fn add_use_remove_by_name() {
        let ctx = Context::new(LocalState::open(&StoreConfig::Memory).unwrap());
        for name in ["alpha", "beta"] {
            execute(
                &ctx,
                AppCommand::Add {
                    name: name.into(),
                    group: "team".into(),
                    url: "https://api.dify.ai/v1/".into(),
                    key: "app-key".into(),
                    visual: false,
                },
            )
            .await
            .unwrap();
        }
        assert_eq!(ctx.require_app().unwrap().name, "alpha");

        execute(&ctx, AppCommand::Use { app: "beta".into() })
            .await
            .unwrap();
        assert_eq!(ctx.require_app().unwrap().name, "beta");

        execute(&ctx, AppCommand::Remove { app: "beta".into() })
            .await
            .unwrap();
        assert_eq!(ctx.require_app().unwrap().name, "alpha");
        assert!(
            execute(&ctx, AppCommand::Use { app: "beta".into() })
                .await
                .is_err()
        );
    }
}
