//! Session lifecycle management.
//!
//! [`SessionManager`] is the single source of truth for the auth lifecycle
//! and navigation policy. It reconciles two independent identity surfaces:
//! the third-party provider issuing short-lived bearer tokens, and the
//! first-party cookie session established through the login exchange. The
//! provider's change notifications — never the cookie — are ground truth;
//! when the provider reports no identity, the server session is treated as
//! revoked even before the logout call completes.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::api::{ApiClient, CurrentIdentity};
use crate::error::{ApiError, ApiResult};
use crate::models::LoginResponse;
use crate::traits::{Identity, IdentityProvider, Navigator, View};

/// How often the background loop forces a token refresh while authenticated.
pub const TOKEN_REFRESH_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Authentication state, driven solely by provider callbacks and explicit
/// sign-in/out/disable actions.
#[derive(Debug, Clone, Default)]
pub enum AuthState {
    /// No provider callback observed yet.
    #[default]
    Unknown,
    /// The provider reports a signed-in identity.
    Authenticated(Identity),
    /// The provider reports no identity.
    Unauthenticated,
    /// The provider is misconfigured. Sticky until process re-initialization.
    Disabled,
}

impl PartialEq for AuthState {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (AuthState::Unknown, AuthState::Unknown)
            | (AuthState::Unauthenticated, AuthState::Unauthenticated)
            | (AuthState::Disabled, AuthState::Disabled) => true,
            (AuthState::Authenticated(a), AuthState::Authenticated(b)) => {
                a.subject_id == b.subject_id
            }
            _ => false,
        }
    }
}

impl AuthState {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthState::Authenticated(_))
    }
}

struct SessionInner {
    provider: Arc<dyn IdentityProvider>,
    api: ApiClient,
    navigator: Arc<dyn Navigator>,
    identity: CurrentIdentity,
    state: watch::Sender<AuthState>,
    last_error: Mutex<Option<String>>,
}

impl SessionInner {
    fn publish(&self, state: AuthState) {
        self.state.send_replace(state);
    }

    fn is_disabled(&self) -> bool {
        matches!(&*self.state.borrow(), AuthState::Disabled)
    }

    fn record_error(&self, message: impl Into<String>) {
        if let Ok(mut slot) = self.last_error.lock() {
            *slot = Some(message.into());
        }
    }

    fn disable(&self, err: &ApiError) {
        tracing::error!("identity provider disabled: {}", err);
        self.record_error(err.to_string());
        self.publish(AuthState::Disabled);
    }

    /// Provider reported a signed-in identity: mint a token and establish the
    /// cookie session. Token or exchange failures are recorded but do not
    /// block publishing the state — the request-level recovery path heals the
    /// session on first use.
    async fn reconcile_signed_in(&self, identity: Identity) {
        match identity.tokens.bearer_token(false).await {
            Ok(token) => {
                if let Err(e) = self.api.exchange_login(&token).await {
                    tracing::warn!("login exchange during reconcile failed: {}", e);
                    self.record_error(e.to_string());
                }
            }
            Err(e) if e.is_configuration() => {
                self.disable(&e);
                return;
            }
            Err(e) => {
                tracing::warn!("token mint during reconcile failed: {}", e);
                self.record_error(e.to_string());
            }
        }

        self.identity.set(Some(identity.clone())).await;
        tracing::info!(subject_id = %identity.subject_id, "authenticated");
        self.publish(AuthState::Authenticated(identity));

        if self.navigator.current() == View::Entry {
            self.navigator.go(View::Home);
        }
    }

    /// Provider reported sign-out: best-effort logout exchange, then clear
    /// local state. The session is treated as revoked regardless of whether
    /// the logout call succeeds.
    async fn reconcile_signed_out(&self) {
        if let Err(e) = self.api.logout().await {
            tracing::warn!("logout exchange during reconcile failed: {}", e);
        }
        self.identity.set(None).await;
        tracing::info!("unauthenticated");
        self.publish(AuthState::Unauthenticated);

        // The entry view never receives this signal; prevents redirect loops.
        if self.navigator.current().is_protected() {
            self.navigator.go(View::Entry);
        }
    }

    /// Full sign-out sequence. Each step is independently fault-tolerant so a
    /// failure in one does not skip the next; the logout exchange and the
    /// provider callback that follows are idempotent at the protocol level.
    async fn sign_out_flow(&self) {
        if let Err(e) = self.api.logout().await {
            tracing::warn!("logout exchange failed (continuing): {}", e);
        }
        if let Err(e) = self.provider.sign_out().await {
            tracing::warn!("provider sign-out failed (continuing): {}", e);
        }
        self.identity.set(None).await;
        self.publish(AuthState::Unauthenticated);
        if self.navigator.current().is_protected() {
            self.navigator.go(View::Entry);
        }
    }
}

async fn listen_loop(
    inner: Arc<SessionInner>,
    mut changes: mpsc::UnboundedReceiver<Option<Identity>>,
) {
    while let Some(change) = changes.recv().await {
        if inner.is_disabled() {
            continue;
        }
        match change {
            Some(identity) => inner.reconcile_signed_in(identity).await,
            None => inner.reconcile_signed_out().await,
        }
    }
}

async fn refresh_loop(inner: Arc<SessionInner>, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick completes immediately; consume it.
    ticker.tick().await;
    loop {
        ticker.tick().await;
        if inner.is_disabled() {
            break;
        }
        let Some(identity) = inner.identity.get().await else {
            continue;
        };
        if let Err(e) = identity.tokens.bearer_token(true).await {
            tracing::warn!("periodic token refresh failed: {}", e);
            if e.requires_reauth() {
                inner.sign_out_flow().await;
            }
        }
    }
}

/// Owner of the auth state machine, the token-freshness loop, and the
/// redirect policy.
///
/// Subscribes once to the provider's change notifications on construction;
/// both background tasks are cancelled on [`close`](Self::close) or drop and
/// never outlive the manager.
pub struct SessionManager {
    inner: Arc<SessionInner>,
    listener: JoinHandle<()>,
    refresher: JoinHandle<()>,
}

impl SessionManager {
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        api: ApiClient,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        Self::with_refresh_interval(provider, api, navigator, TOKEN_REFRESH_INTERVAL)
    }

    /// Like [`new`](Self::new) with a custom refresh period (shortened in
    /// tests).
    pub fn with_refresh_interval(
        provider: Arc<dyn IdentityProvider>,
        api: ApiClient,
        navigator: Arc<dyn Navigator>,
        refresh_interval: Duration,
    ) -> Self {
        let (state, _) = watch::channel(AuthState::Unknown);
        let inner = Arc::new(SessionInner {
            identity: api.identity_slot(),
            provider: Arc::clone(&provider),
            api,
            navigator,
            state,
            last_error: Mutex::new(None),
        });

        let changes = provider.subscribe();
        let listener = tokio::spawn(listen_loop(Arc::clone(&inner), changes));
        let refresher = tokio::spawn(refresh_loop(Arc::clone(&inner), refresh_interval));

        Self {
            inner,
            listener,
            refresher,
        }
    }

    /// Subscribe to auth state changes. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.inner.state.subscribe()
    }

    /// The most recently published state.
    pub fn current_state(&self) -> AuthState {
        self.inner.state.borrow().clone()
    }

    /// Message of the last tolerated failure, if any.
    pub fn last_error(&self) -> Option<String> {
        self.inner
            .last_error
            .lock()
            .ok()
            .and_then(|slot| slot.clone())
    }

    /// Run the provider's interactive sign-in flow and establish the cookie
    /// session. The provider's follow-up change notification completes the
    /// state transition and any redirect.
    ///
    /// A configuration-class failure (e.g. invalid API key) disables the
    /// manager permanently; all subsequent operations short-circuit.
    pub async fn sign_in(&self) -> ApiResult<LoginResponse> {
        if self.inner.is_disabled() {
            return Err(disabled_error());
        }

        let identity = match self.inner.provider.sign_in().await {
            Ok(identity) => identity,
            Err(e) => {
                if e.is_configuration() {
                    self.inner.disable(&e);
                }
                return Err(e);
            }
        };

        let token = match identity.tokens.bearer_token(false).await {
            Ok(token) => token,
            Err(e) => {
                if e.is_configuration() {
                    self.inner.disable(&e);
                }
                return Err(e);
            }
        };

        self.inner.api.login(&token).await
    }

    /// Sign out: logout exchange, provider sign-out, local cleanup. Each step
    /// tolerates failure of the previous one.
    pub async fn sign_out(&self) -> ApiResult<()> {
        if self.inner.is_disabled() {
            return Err(disabled_error());
        }
        self.inner.sign_out_flow().await;
        Ok(())
    }

    /// Cancel the change listener and the refresh loop.
    pub fn close(&self) {
        self.listener.abort();
        self.refresher.abort();
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.close();
    }
}

fn disabled_error() -> ApiError {
    ApiError::Configuration(
        "identity provider is disabled; restart the application to re-initialize".to_string(),
    )
}
