//! Session diagnostics command.

use super::load_runtime;
use crate::output::{self, or_dash, OutputFormat};
use anyhow::Result;

/// Print what the provider and local storage each believe about the session.
pub async fn diagnose(format: &OutputFormat) -> Result<()> {
    let runtime = load_runtime()?;
    let report = runtime.diagnostics().await;

    if let OutputFormat::Json = format {
        output::print_json(&report);
        return Ok(());
    }

    println!("Session diagnostics ({})", report.timestamp.to_rfc3339());

    output::print_heading("Identity provider");
    let provider = &report.provider;
    output::print_row("Session", if provider.has_session { "yes" } else { "no" });
    output::print_row("User ID", or_dash(provider.user_id.as_deref()));
    output::print_row("Email", or_dash(provider.email.as_deref()));
    let expires = provider.expires_at.map(|at| at.to_rfc3339());
    output::print_row("Expires", or_dash(expires.as_deref()));
    if let Some(error) = &provider.error {
        output::print_row("Error", error);
    }

    output::print_heading("Local storage");
    let storage = &report.storage;
    output::print_row("Backup", if storage.has_backup { "yes" } else { "no" });
    output::print_row("User ID", or_dash(storage.user_id.as_deref()));
    output::print_row("Expires", or_dash(storage.expires_at.as_deref()));
    output::print_row(
        "Pending link",
        if storage.pending_magic_link { "yes" } else { "no" },
    );
    output::print_row("Keys", &format!("{} ({})", storage.keys.len(), storage.keys.join(", ")));
    if let Some(error) = &storage.error {
        output::print_row("Error", error);
    }

    if report.is_inconsistent() {
        println!();
        println!("Provider and local storage disagree. Try 'hapien logout' and sign in again.");
    }

    Ok(())
}
