//! Authentication and session reconciliation for Hapien clients.
//!
//! This crate provides:
//! - Supabase identity provider client (magic link with PKCE, email OTP,
//!   refresh with backoff, sign-out)
//! - Profile store over the Supabase REST API
//! - Reactive auth state with a bounded loading phase
//! - FSM-driven magic-link callback reconciliation
//! - Session diagnostics

mod auth_state;
mod callback;
mod callback_fsm;
mod clock;
mod diagnostics;
mod error;
mod navigation;
mod pkce;
mod platform;
mod profile;
mod runtime;
mod session;
mod supabase_auth;
mod supabase_client;

pub use auth_state::{AuthStateTracker, AuthView, SAFETY_TIMEOUT};
pub use callback::{
    CallbackEvent, CallbackListener, CallbackOutcome, CallbackReconciler, CallbackStatus,
    MAX_POLL_ATTEMPTS, POLL_INTERVAL,
};
pub use callback_fsm::callback_machine;
pub use callback_fsm::{CallbackMachine, CallbackMachineInput, CallbackMachineState};
pub use clock::{Clock, TokioClock};
pub use diagnostics::{ProviderCheck, SessionDiagnostics, StorageCheck};
pub use error::{AuthError, AuthResult};
pub use navigation::{FeedGate, Navigator, Route};
pub use platform::DisplayContext;
pub use profile::{NewProfile, Profile, ProfileFetcher, ProfileLookup, ProfileStore};
pub use runtime::{AuthRuntime, CALLBACK_PATH};
pub use session::{AuthChange, AuthEvent, Identity, Session, SessionProvider};
pub use supabase_auth::{RefreshConfig, SupabaseAuth};
pub use supabase_client::SupabaseProfileStore;
