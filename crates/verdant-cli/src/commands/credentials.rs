//! Credentials command - manage the stored API credentials.

use anyhow::{Result, bail};
use verdant_store::Credentials;

use super::CommandContext;
use crate::cli::CredentialsAction;
use crate::style;

/// Execute the credentials command.
pub async fn cmd_credentials(ctx: &CommandContext, action: CredentialsAction) -> Result<()> {
    let handle = ctx.coordinator()?;

    let message = match action {
        CredentialsAction::Set { user_id, token } => {
            let user_id = user_id.trim().to_string();
            if user_id.is_empty() || token.trim().is_empty() {
                bail!("User id and token must not be empty");
            }
            let credentials = Credentials::new(user_id.clone(), token.trim());
            handle
                .run(move |store| Ok(store.set_credentials(&credentials)?))
                .await?;
            style::format_success(&format!("Credentials stored for user {}", user_id), ctx.no_color)
        }
        CredentialsAction::Clear => {
            handle.run(|store| Ok(store.clear_credentials()?)).await?;
            style::format_success("Credentials removed", ctx.no_color)
        }
        CredentialsAction::Show => {
            let settings = handle.run(|store| Ok(store.sync_settings()?)).await?;
            match settings.credentials {
                Some(c) => style::format_info(&format!("User id: {}", c.user_id), ctx.no_color),
                None => style::format_warning("No credentials stored", ctx.no_color),
            }
        }
    };

    handle.shutdown().await?;
    if !ctx.quiet {
        println!("{}", message);
    }
    Ok(())
}
