//! Authentication commands.

use super::{describe, prompt_password, value_or_prompt, Context};
use crate::output::{self, OutputFormat};
use anyhow::Result;
use auth_session::User;
use serde_json::json;

/// Login with email and password.
pub async fn login(ctx: &Context, email: Option<String>) -> Result<()> {
    if let Some(user) = ctx.store.user().filter(|_| ctx.store.is_authenticated()) {
        output::print_success(&format!("Already logged in as {}", user.email), &ctx.format);
        return Ok(());
    }

    let email = value_or_prompt(email, "Email")?;
    let password = prompt_password("Password")?;

    if matches!(ctx.format, OutputFormat::Text) {
        println!("Logging in...");
    }

    match ctx.service.login(&email, &password).await {
        Ok(user) => {
            output::print_success(&format!("Logged in as {}", user.email), &ctx.format);
            Ok(())
        }
        Err(e) => anyhow::bail!("Login failed: {}", describe(&e)),
    }
}

/// Create an account and log in.
pub async fn register(ctx: &Context, name: Option<String>, email: Option<String>) -> Result<()> {
    if ctx.store.is_authenticated() {
        anyhow::bail!("Already logged in. Run `khotruyen logout` first");
    }

    let name = value_or_prompt(name, "Name")?;
    let email = value_or_prompt(email, "Email")?;
    let password = prompt_password("Password")?;
    let confirm = prompt_password("Confirm password")?;
    if password != confirm {
        anyhow::bail!("Passwords do not match");
    }

    match ctx.service.register(&name, &email, &password).await {
        Ok(user) => {
            output::print_success(
                &format!("Account created, logged in as {}", user.email),
                &ctx.format,
            );
            Ok(())
        }
        Err(e) => anyhow::bail!("Registration failed: {}", describe(&e)),
    }
}

/// Logout and clear session.
pub async fn logout(ctx: &Context) -> Result<()> {
    if !ctx.store.is_authenticated() {
        output::print_success("Not logged in", &ctx.format);
        return Ok(());
    }

    ctx.service.logout().await?;
    output::print_success("Logged out successfully", &ctx.format);
    Ok(())
}

/// Show the local session state.
pub fn status(ctx: &Context) -> Result<()> {
    let session = ctx.store.snapshot_view();
    let state = ctx.store.fsm_state();

    match ctx.format {
        OutputFormat::Text => {
            if let Some(user) = session.user().filter(|_| session.is_authenticated()) {
                println!("Auth:     logged in");
                println!("User:     {} <{}>", user.name, user.email);
                println!("Role:     {}", user.role);
            } else if session.is_authenticated() {
                println!("Auth:     logged in");
                println!("User:     unknown (run `khotruyen me`)");
            } else {
                println!("Auth:     not logged in");
            }
            if let Some(error) = session.error() {
                println!("Error:    {}", error);
            }
        }
        OutputFormat::Json => {
            let value = json!({
                "logged_in": session.is_authenticated(),
                "state": state,
                "user": session.user(),
                "error": session.error(),
            });
            output::print_value(&value, &ctx.format);
        }
    }

    Ok(())
}

/// Fetch and show the current user's profile.
pub async fn me(ctx: &Context) -> Result<()> {
    let user = match ctx.service.fetch_profile().await {
        Ok(user) => user,
        Err(e) => anyhow::bail!("{}", describe(&e)),
    };
    print_user(&user, &ctx.format)
}

fn print_user(user: &User, format: &OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            output::print_heading(&user.name);
            output::print_row("ID", &user.id);
            output::print_row("Email", &user.email);
            output::print_row("Role", &user.role.to_string());
            output::print_row("Avatar", user.avatar.as_deref().unwrap_or("-"));
            output::print_row("Joined", &user.created_at.format("%Y-%m-%d").to_string());
        }
        OutputFormat::Json => output::print_value(&serde_json::to_value(user)?, format),
    }
    Ok(())
}
