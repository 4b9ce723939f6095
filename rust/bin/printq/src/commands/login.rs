//! Login / logout / whoami commands.

use std::path::Path;

use anyhow::Result;

use super::with_session;

/// Interactive (device code) sign-in for the current context.
pub async fn login(config_path: &Path) -> Result<()> {
    with_session(config_path, |session| async move {
        let account = session.auth.login().await?;
        match &account.display_name {
            Some(name) => println!("Signed in as {name} <{}>.", account.username),
            None => println!("Signed in as {}.", account.username),
        }
        println!("Account saved to context \"{}\".", session.ctx.name);
        Ok(())
    })
    .await
}

/// Forget the signed-in account of the current context.
pub async fn logout(config_path: &Path) -> Result<()> {
    with_session(config_path, |session| async move {
        if !session.auth.is_authenticated().await {
            println!("Not signed in.");
            return Ok(());
        }
        session.auth.logout().await?;
        println!("Signed out from context \"{}\".", session.ctx.name);
        Ok(())
    })
    .await
}

pub async fn whoami(config_path: &Path) -> Result<()> {
    with_session(config_path, |session| async move {
        match session.auth.account().await {
            Some(account) => {
                println!("{}", account.username);
                if let Some(name) = account.display_name {
                    println!("  name:    {name}");
                }
                println!("  context: {}", session.ctx.name);
            }
            None => println!("Not signed in. Run `printq login`."),
        }
        Ok(())
    })
    .await
}
