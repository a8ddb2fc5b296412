//! Installed-app detection.
//!
//! Only used to pick which screen follows a successful sign-in. Never a
//! security boundary.

use serde::{Deserialize, Serialize};

/// Signals describing where the client is running.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayContext {
    /// `display-mode: standalone` matched.
    pub display_mode_standalone: bool,
    /// Platform-specific standalone flag, when the platform exposes one.
    pub navigator_standalone: Option<bool>,
    /// Document referrer.
    pub referrer: Option<String>,
}

impl DisplayContext {
    /// Context for a client known to run inside the installed app.
    pub fn installed() -> Self {
        Self {
            display_mode_standalone: true,
            ..Self::default()
        }
    }

    /// Context for a plain browser tab.
    pub fn browser() -> Self {
        Self::default()
    }

    pub fn is_installed_app(&self) -> bool {
        self.display_mode_standalone
            || self.navigator_standalone == Some(true)
            || self
                .referrer
                .as_deref()
                .is_some_and(|r| r.contains("android-app://"))
    }
}
