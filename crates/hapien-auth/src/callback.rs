//! Magic-link callback reconciliation.
//!
//! After the identity provider redirects back with a code, the session can
//! take a moment to appear. [`CallbackReconciler::run`] polls for it on a
//! fixed budget, then makes sure the user has a profile row and routes
//! them onward:
//!
//! - browser tab instead of the installed app: ask the user to return to
//!   the app, touch nothing
//! - no profile: insert a minimal one (insert-if-absent), go to onboarding
//! - profile without a display name: onboarding
//! - complete profile: feed
//!
//! Every step checks the [`CancellationToken`] before changing anything
//! observable. A cancelled run emits no events and never navigates.

use crate::callback_fsm::{CallbackMachine, CallbackMachineInput, CallbackMachineState};
use crate::clock::Clock;
use crate::navigation::{Navigator, Route};
use crate::platform::DisplayContext;
use crate::profile::{NewProfile, ProfileLookup, ProfileStore};
use crate::session::{Session, SessionProvider};
use crate::{AuthError, AuthResult};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Delay before the first poll and between polls.
pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Polls before giving up.
pub const MAX_POLL_ATTEMPTS: u32 = 10;

const TIMEOUT_MESSAGE: &str = "Could not verify your login. This can happen if:\n\n\
    \u{2022} You opened the link in a different browser\n\
    \u{2022} You opened the link in incognito/private mode\n\
    \u{2022} The link has expired (links expire after 1 hour)\n\n\
    Please request a new magic link from the login page.";

const RETURN_TO_APP_MESSAGE: &str = "You're now logged in! The magic link opened in your browser.\n\n\
    To continue in the Hapien app:\n\
    1. Go back to your home screen\n\
    2. Tap the Hapien app icon\n\
    3. Your login will be ready!\n\n\
    Your session has been saved. You can close this browser tab now.";

const UNEXPECTED_MESSAGE: &str = "Failed to set up your account. Please try again.";

/// Progress shown while the flow runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CallbackStatus {
    Verifying { attempt: u32, max_attempts: u32 },
    SettingUp,
}

impl CallbackStatus {
    pub fn label(&self) -> &'static str {
        match self {
            CallbackStatus::Verifying { .. } => "Verifying your login...",
            CallbackStatus::SettingUp => "Setting up your account...",
        }
    }
}

/// Terminal result of a callback run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum CallbackOutcome {
    /// A profile was just provisioned.
    NewProfile,
    /// Profile exists but has no display name.
    IncompleteProfile,
    CompleteProfile,
    /// Signed in from a browser tab rather than the installed app.
    ReturnToApp,
    /// No session appeared within the poll budget.
    TimedOut,
    /// The provider failed the session query; carries its message.
    SessionError(String),
    UnexpectedError,
}

impl CallbackOutcome {
    /// Destination for success outcomes.
    pub fn route(&self) -> Option<Route> {
        match self {
            CallbackOutcome::NewProfile | CallbackOutcome::IncompleteProfile => {
                Some(Route::Onboarding)
            }
            CallbackOutcome::CompleteProfile => Some(Route::Feed),
            _ => None,
        }
    }

    /// User-facing text for outcomes that stay on the callback screen.
    pub fn message(&self) -> Option<String> {
        match self {
            CallbackOutcome::NewProfile
            | CallbackOutcome::IncompleteProfile
            | CallbackOutcome::CompleteProfile => None,
            CallbackOutcome::ReturnToApp => Some(RETURN_TO_APP_MESSAGE.to_string()),
            CallbackOutcome::TimedOut => Some(TIMEOUT_MESSAGE.to_string()),
            CallbackOutcome::SessionError(msg) => Some(format!("Authentication error: {}", msg)),
            CallbackOutcome::UnexpectedError => Some(UNEXPECTED_MESSAGE.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.route().is_some()
    }

    fn from_state(state: &CallbackMachineState, session_error: Option<String>) -> AuthResult<Self> {
        let outcome = match state {
            CallbackMachineState::NewProfile => CallbackOutcome::NewProfile,
            CallbackMachineState::IncompleteProfile => CallbackOutcome::IncompleteProfile,
            CallbackMachineState::CompleteProfile => CallbackOutcome::CompleteProfile,
            CallbackMachineState::ReturnToApp => CallbackOutcome::ReturnToApp,
            CallbackMachineState::TimedOut => CallbackOutcome::TimedOut,
            CallbackMachineState::SessionError => {
                CallbackOutcome::SessionError(session_error.unwrap_or_default())
            }
            CallbackMachineState::UnexpectedError => CallbackOutcome::UnexpectedError,
            CallbackMachineState::Polling | CallbackMachineState::Reconciling => {
                return Err(AuthError::InvalidStateTransition(format!(
                    "{:?} is not a terminal state",
                    state
                )));
            }
        };
        Ok(outcome)
    }
}

/// Observable flow event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CallbackEvent {
    Status(CallbackStatus),
    Finished(CallbackOutcome),
}

/// Callback type for flow events.
pub type CallbackListener = Box<dyn Fn(&CallbackEvent) + Send + Sync>;

/// Runs one magic-link callback to completion.
pub struct CallbackReconciler {
    provider: Arc<dyn SessionProvider>,
    profiles: Arc<dyn ProfileStore>,
    navigator: Arc<dyn Navigator>,
    clock: Arc<dyn Clock>,
    display: DisplayContext,
    listener: Option<CallbackListener>,
}

impl CallbackReconciler {
    pub fn new(
        provider: Arc<dyn SessionProvider>,
        profiles: Arc<dyn ProfileStore>,
        navigator: Arc<dyn Navigator>,
        clock: Arc<dyn Clock>,
        display: DisplayContext,
    ) -> Self {
        Self {
            provider,
            profiles,
            navigator,
            clock,
            display,
            listener: None,
        }
    }

    /// Set a listener for status and outcome events.
    pub fn set_listener(&mut self, listener: CallbackListener) {
        self.listener = Some(listener);
    }

    /// Run the flow. Returns `None` if `cancel` fired before it finished.
    pub async fn run(&self, cancel: &CancellationToken) -> Option<CallbackOutcome> {
        info!(
            installed_app = self.display.is_installed_app(),
            "Auth callback started"
        );

        let mut machine = CallbackMachine::new();
        let outcome = match self.drive(&mut machine, cancel).await {
            Ok(Some(outcome)) => outcome,
            Ok(None) => {
                debug!("Auth callback cancelled");
                return None;
            }
            Err(e) => {
                error!(error = %e, "Auth callback failed");
                CallbackOutcome::UnexpectedError
            }
        };

        if cancel.is_cancelled() {
            debug!(outcome = ?outcome, "Auth callback cancelled before finishing");
            return None;
        }
        if let Some(route) = outcome.route() {
            self.navigator.navigate(route);
        }
        info!(outcome = ?outcome, "Auth callback finished");
        self.emit(cancel, CallbackEvent::Finished(outcome.clone()));
        Some(outcome)
    }

    async fn drive(
        &self,
        machine: &mut CallbackMachine,
        cancel: &CancellationToken,
    ) -> AuthResult<Option<CallbackOutcome>> {
        for attempt in 1..=MAX_POLL_ATTEMPTS {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(None),
                _ = self.clock.sleep(POLL_INTERVAL) => {}
            }

            self.emit(
                cancel,
                CallbackEvent::Status(CallbackStatus::Verifying {
                    attempt,
                    max_attempts: MAX_POLL_ATTEMPTS,
                }),
            );
            let result = self.provider.get_session().await;
            if cancel.is_cancelled() {
                return Ok(None);
            }

            match result {
                Ok(Some(session)) => {
                    info!(attempt, user_id = %session.user.id, "Session found");
                    transition(machine, &CallbackMachineInput::SessionFound)?;
                    return self.reconcile(machine, &session, cancel).await;
                }
                Ok(None) if attempt == MAX_POLL_ATTEMPTS => {
                    warn!(attempts = attempt, "No session after max attempts");
                    let state = transition(machine, &CallbackMachineInput::AttemptsExhausted)?;
                    return Ok(Some(CallbackOutcome::from_state(&state, None)?));
                }
                Ok(None) => {
                    debug!(attempt, "No session yet");
                    transition(machine, &CallbackMachineInput::SessionMissing)?;
                }
                Err(e) => {
                    error!(attempt, error = %e, "Session query failed");
                    let state = transition(machine, &CallbackMachineInput::SessionFailed)?;
                    return Ok(Some(CallbackOutcome::from_state(
                        &state,
                        Some(e.provider_message()),
                    )?));
                }
            }
        }

        // The last attempt always leaves Polling.
        Err(AuthError::InvalidStateTransition(
            "poll loop ended without an outcome".to_string(),
        ))
    }

    async fn reconcile(
        &self,
        machine: &mut CallbackMachine,
        session: &Session,
        cancel: &CancellationToken,
    ) -> AuthResult<Option<CallbackOutcome>> {
        self.emit(cancel, CallbackEvent::Status(CallbackStatus::SettingUp));

        if !self.display.is_installed_app() {
            info!("Opened in browser, showing return-to-app instructions");
            let state = transition(machine, &CallbackMachineInput::OutsideApp)?;
            return Ok(Some(CallbackOutcome::from_state(&state, None)?));
        }

        let lookup = self
            .profiles
            .fetch_profile(&session.user.id, &session.access_token)
            .await;
        if cancel.is_cancelled() {
            return Ok(None);
        }

        let existing = match lookup {
            ProfileLookup::Found(profile) => Some(profile),
            ProfileLookup::NotFound => None,
            ProfileLookup::FetchFailed(reason) => {
                warn!(
                    user_id = %session.user.id,
                    reason = %reason,
                    "Profile check failed, provisioning anyway"
                );
                None
            }
        };

        let input = match existing {
            Some(profile) if profile.has_display_name() => CallbackMachineInput::ProfileComplete,
            Some(_) => CallbackMachineInput::ProfileIncomplete,
            None => match self.provision(session).await {
                Ok(()) => CallbackMachineInput::ProfileCreated,
                Err(e) => {
                    error!(user_id = %session.user.id, error = %e, "Profile creation failed");
                    CallbackMachineInput::ReconcileFailed
                }
            },
        };
        if cancel.is_cancelled() {
            return Ok(None);
        }

        let state = transition(machine, &input)?;
        Ok(Some(CallbackOutcome::from_state(&state, None)?))
    }

    /// Insert a minimal profile unless one exists. A failed insert is not
    /// fatal: onboarding fills in the profile. Only a store that cannot be
    /// used at all aborts the flow.
    async fn provision(&self, session: &Session) -> AuthResult<()> {
        let profile = NewProfile::for_identity(&session.user);
        match self
            .profiles
            .upsert_profile(&profile, &session.access_token)
            .await
        {
            Ok(()) => {
                info!(user_id = %profile.id, "Profile provisioned");
                Ok(())
            }
            Err(e @ AuthError::Config(_)) => Err(e),
            Err(e) => {
                warn!(
                    user_id = %profile.id,
                    error = %e,
                    rejected = e.is_rejection(),
                    "Profile insert failed, continuing to onboarding"
                );
                Ok(())
            }
        }
    }

    fn emit(&self, cancel: &CancellationToken, event: CallbackEvent) {
        if cancel.is_cancelled() {
            return;
        }
        if let Some(listener) = &self.listener {
            listener(&event);
        }
    }
}

/// Apply `input`, logging the state change.
fn transition(
    machine: &mut CallbackMachine,
    input: &CallbackMachineInput,
) -> AuthResult<CallbackMachineState> {
    let old_state = machine.state().clone();

    machine.consume(input).map_err(|_| {
        AuthError::InvalidStateTransition(format!(
            "Cannot apply {:?} in state {:?}",
            input, old_state
        ))
    })?;

    let new_state = machine.state().clone();
    if old_state != new_state {
        debug!(
            old_state = ?old_state,
            new_state = ?new_state,
            "Callback state transition"
        );
    }
    Ok(new_state)
}
