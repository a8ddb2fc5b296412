//! Magic-link callback command.

use super::load_runtime;
use crate::output::{self, OutputFormat};
use anyhow::Result;
use hapien_auth::{CallbackEvent, CallbackOutcome, DisplayContext, Navigator, Route};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use url::Url;

/// Resolves routes against the app URL and optionally opens them.
struct BrowserNavigator {
    app_url: Url,
    open_browser: bool,
    target: Mutex<Option<Url>>,
}

impl BrowserNavigator {
    fn target(&self) -> Option<Url> {
        self.target.lock().ok().and_then(|target| target.clone())
    }
}

impl Navigator for BrowserNavigator {
    fn navigate(&self, route: Route) {
        let url = match self.app_url.join(route.path()) {
            Ok(url) => url,
            Err(e) => {
                warn!(route = %route, error = %e, "Invalid navigation target");
                return;
            }
        };

        info!(url = %url, "Navigating");
        if self.open_browser {
            if let Err(e) = open::that(url.as_str()) {
                warn!(error = %e, "Failed to open browser");
            }
        }
        if let Ok(mut target) = self.target.lock() {
            *target = Some(url);
        }
    }
}

/// Redeem a redirect code and reconcile the resulting session.
pub async fn callback(
    code: &str,
    standalone: bool,
    referrer: Option<String>,
    open_browser: bool,
    format: &OutputFormat,
) -> Result<()> {
    let runtime = load_runtime()?;

    // The reconciler reports whatever session the provider ends up with.
    if let Err(e) = runtime.auth().exchange_code_for_session(code).await {
        warn!(error = %e, "Code exchange failed");
    }

    let navigator = Arc::new(BrowserNavigator {
        app_url: runtime.app_link("/")?,
        open_browser,
        target: Mutex::new(None),
    });
    let display = DisplayContext {
        display_mode_standalone: standalone,
        navigator_standalone: None,
        referrer,
    };

    let mut reconciler = runtime.reconciler(navigator.clone(), display);
    if let OutputFormat::Text = format {
        reconciler.set_listener(Box::new(|event: &CallbackEvent| {
            if let CallbackEvent::Status(status) = event {
                println!("{}", status.label());
            }
        }));
    }

    let cancel = CancellationToken::new();
    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let outcome = reconciler.run(&cancel).await;
    ctrl_c.abort();

    let Some(outcome) = outcome else {
        anyhow::bail!("Cancelled");
    };
    print_outcome(&outcome, navigator.target(), format);
    ensure_signed_in(&outcome)
}

/// Failed outcomes become a command error so `main` exits non-zero.
fn ensure_signed_in(outcome: &CallbackOutcome) -> Result<()> {
    match outcome {
        CallbackOutcome::TimedOut => anyhow::bail!("Sign-in timed out"),
        CallbackOutcome::SessionError(message) => anyhow::bail!("Sign-in failed: {}", message),
        CallbackOutcome::UnexpectedError => anyhow::bail!("Sign-in failed unexpectedly"),
        _ => Ok(()),
    }
}

fn print_outcome(outcome: &CallbackOutcome, target: Option<Url>, format: &OutputFormat) {
    match format {
        OutputFormat::Text => {
            if let Some(url) = &target {
                println!("Signed in. Continue at {}", url);
            }
            if let Some(message) = outcome.message() {
                println!();
                println!("{}", message);
            }
        }
        OutputFormat::Json => {
            output::print_json(&serde_json::json!({
                "result": outcome,
                "route": outcome.route().map(|route| route.path()),
                "url": target.map(|url| url.to_string()),
                "message": outcome.message(),
            }));
        }
    }
}
