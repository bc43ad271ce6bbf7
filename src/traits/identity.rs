//! Identity provider trait abstraction.
//!
//! The third-party identity provider issues short-lived bearer tokens after
//! interactive authentication and pushes identity-change notifications. The
//! session manager holds only a reference to the current [`Identity`]; the
//! provider remains the source of truth.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::ApiResult;

/// Capability to produce a current bearer token for an identity.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Return a current bearer token.
    ///
    /// With `force_refresh` set, any cached token is bypassed and a fresh one
    /// is minted from the provider. Errors classified as requiring re-auth
    /// (see [`crate::ApiError::requires_reauth`]) mean the identity itself is
    /// no longer valid.
    async fn bearer_token(&self, force_refresh: bool) -> ApiResult<String>;
}

/// A signed-in identity as reported by the provider.
///
/// Cloning is cheap; the token capability is shared.
#[derive(Clone)]
pub struct Identity {
    pub subject_id: String,
    pub email: String,
    pub display_name: String,
    pub tokens: Arc<dyn TokenSource>,
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("subject_id", &self.subject_id)
            .field("email", &self.email)
            .field("display_name", &self.display_name)
            .finish_non_exhaustive()
    }
}

/// Trait for the external identity provider.
///
/// Implementations wrap whatever SDK the host application uses. A scripted
/// mock implementation drives the session manager in tests.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Register the change listener.
    ///
    /// `Some(identity)` means signed in, `None` means signed out. The
    /// registration is single-shot: dropping the receiver unsubscribes.
    fn subscribe(&self) -> mpsc::UnboundedReceiver<Option<Identity>>;

    /// Run the provider's interactive sign-in flow.
    ///
    /// A misconfigured provider (e.g. invalid API key) fails with
    /// [`crate::ApiError::Configuration`].
    async fn sign_in(&self) -> ApiResult<Identity>;

    /// Provider-side sign-out. The provider is expected to follow up with a
    /// `None` change notification.
    async fn sign_out(&self) -> ApiResult<()>;
}
