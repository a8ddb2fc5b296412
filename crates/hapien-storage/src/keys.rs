//! Storage key constants.

/// Storage keys used by the session vault.
pub struct StorageKeys;

impl StorageKeys {
    /// Access token (JWT)
    pub const ACCESS_TOKEN: &'static str = "hapien_auth_access_token";

    /// Refresh token
    pub const REFRESH_TOKEN: &'static str = "hapien_auth_refresh_token";

    /// Session metadata (JSON)
    pub const SESSION_META: &'static str = "hapien_auth_session_meta";

    /// PKCE code verifier for a pending magic link
    pub const CODE_VERIFIER: &'static str = "hapien_auth_code_verifier";

    /// Every key the vault writes.
    pub const ALL: [&'static str; 4] = [
        Self::ACCESS_TOKEN,
        Self::REFRESH_TOKEN,
        Self::SESSION_META,
        Self::CODE_VERIFIER,
    ];
}
