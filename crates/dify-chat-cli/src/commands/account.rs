use anyhow::Result;

use super::{Context, value_or_prompt};

/// Creates the administrator account and signs it in.
pub fn init(
    ctx: &Context,
    username: Option<String>,
    password: Option<String>,
    confirm: Option<String>,
) -> Result<()> {
    if ctx.state.auth.is_initialized()? {
        println!("An administrator account already exists. Use `dify-chat login`.");
        return Ok(());
    }
    let username = value_or_prompt(username, "Username")?;
    let password = value_or_prompt(password, "Password")?;
    let confirm = value_or_prompt(confirm, "Confirm password")?;
    ctx.state.auth.initialize(&username, &password, &confirm)?;
    let user = ctx.state.auth.login(&username, &password)?;
    println!("Account {} created and signed in.", user.username);
    Ok(())
}

pub fn login(ctx: &Context, username: Option<String>, password: Option<String>) -> Result<()> {
    let username = value_or_prompt(username, "Username")?;
    let password = value_or_prompt(password, "Password")?;
    let user = ctx.state.auth.login(&username, &password)?;
    println!("Signed in as {}.", user.username);
    Ok(())
}

pub fn logout(ctx: &Context) -> Result<()> {
    ctx.state.auth.logout()?;
    println!("Signed out.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dify_chat_core::{LocalState, StoreConfig};

    #[test]
    fn init_signs_in_and_logout_clears() {
        let ctx = Context::new(LocalState::open(&StoreConfig::Memory).unwrap());
        init(
            &ctx,
            Some("admin".into()),
            Some("pw".into()),
            Some("pw".into()),
        )
        .unwrap();
        assert_eq!(ctx.require_user().unwrap().username, "admin");

        logout(&ctx).unwrap();
        assert!(ctx.require_user().is_err());

        login(&ctx, Some("admin".into()), Some("pw".into())).unwrap();
        assert!(login(&ctx, Some("admin".into()), Some("bad".into())).is_err());
    }
}
