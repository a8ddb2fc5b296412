//! Authentication commands.

use super::load_runtime;
use crate::output::{self, or_dash, OutputFormat};
use anyhow::Result;
use hapien_auth::{FeedGate, SessionProvider};

/// Email a magic link.
pub async fn login(email: &str, redirect_to: Option<&str>, format: &OutputFormat) -> Result<()> {
    let email = email.trim();
    if email.is_empty() {
        anyhow::bail!("Email is required");
    }

    let runtime = load_runtime()?;
    let redirect_to = match redirect_to {
        Some(url) => url.to_string(),
        None => runtime.callback_url()?.to_string(),
    };

    runtime.auth().send_magic_link(email, &redirect_to).await?;

    output::print_success(
        &format!(
            "Magic link sent to {}. Open it on this device, then run 'hapien callback --code <code>'.",
            email
        ),
        format,
    );
    Ok(())
}

/// Sign in with an emailed one-time code.
pub async fn verify(email: &str, token: &str, format: &OutputFormat) -> Result<()> {
    let runtime = load_runtime()?;
    let session = runtime.auth().verify_email_otp(email.trim(), token.trim()).await?;

    let who = session.user.email.as_deref().unwrap_or(&session.user.id);
    output::print_success(&format!("Logged in as {}", who), format);
    Ok(())
}

/// Logout and clear session.
pub async fn logout(format: &OutputFormat) -> Result<()> {
    let runtime = load_runtime()?;
    runtime.auth().sign_out().await?;

    output::print_success("Logged out successfully", format);
    Ok(())
}

/// Show the settled auth view and what the feed page would do with it.
pub async fn status(format: &OutputFormat) -> Result<()> {
    let runtime = load_runtime()?;
    let tracker = runtime.track();

    let view = {
        let mut rx = tracker.watch();
        let settled = rx.wait_for(|view| !view.loading).await?;
        settled.clone()
    };
    tracker.deactivate();
    let gate = FeedGate::evaluate(&view);

    match format {
        OutputFormat::Text => {
            match &view.identity {
                Some(identity) => {
                    output::print_row("Auth", "logged in");
                    output::print_row("User ID", &identity.id);
                    output::print_row("Email", or_dash(identity.email.as_deref()));
                }
                None => output::print_row("Auth", "not logged in"),
            }
            let profile = match &view.profile {
                Some(profile) => profile.display_name().unwrap_or("(no display name)"),
                None => "none",
            };
            output::print_row("Profile", profile);
            let feed = match &gate {
                FeedGate::Loading => "loading".to_string(),
                FeedGate::Redirect { route } => format!("redirect to {}", route),
                FeedGate::Ready { display_name } => format!("ready as {}", display_name),
            };
            output::print_row("Feed", &feed);
        }
        OutputFormat::Json => {
            output::print_json(&serde_json::json!({
                "logged_in": view.is_authenticated(),
                "view": view,
                "feed": gate,
            }));
        }
    }

    Ok(())
}
