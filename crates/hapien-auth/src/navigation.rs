//! App destinations and the feed page's access gate.

use crate::auth_state::AuthView;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Client-side destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    Onboarding,
    Feed,
    Login,
    Home,
}

impl Route {
    pub fn path(&self) -> &'static str {
        match self {
            Route::Onboarding => "/onboarding",
            Route::Feed => "/feed",
            Route::Login => "/auth/login",
            Route::Home => "/",
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// Performs client-side navigation.
pub trait Navigator: Send + Sync {
    fn navigate(&self, route: Route);
}

/// Decision for the feed page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "gate", rename_all = "snake_case")]
pub enum FeedGate {
    /// Auth state not determined yet; render a spinner.
    Loading,
    Redirect { route: Route },
    Ready { display_name: String },
}

impl FeedGate {
    pub fn evaluate(view: &AuthView) -> Self {
        if view.loading {
            return FeedGate::Loading;
        }
        if view.identity.is_none() {
            return FeedGate::Redirect {
                route: Route::Login,
            };
        }
        match view.profile.as_ref().and_then(|p| p.display_name()) {
            Some(name) => FeedGate::Ready {
                display_name: name.to_string(),
            },
            None => FeedGate::Redirect {
                route: Route::Onboarding,
            },
        }
    }
}
