//! Shared test doubles for the integration suites.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};

use moodiary::{
    ApiError, ApiResult, AuthState, Identity, IdentityProvider, Navigator, TokenSource, View,
};

/// Token source returning a fixed token, with optional scripted failures.
#[derive(Default)]
pub struct StaticTokens {
    pub token: String,
    pub mints: AtomicUsize,
    pub force_refreshes: AtomicUsize,
    /// When set, every call fails with this error.
    pub fail_always: Mutex<Option<ApiError>>,
    /// When set, only forced refreshes fail with this error.
    pub fail_on_force: Mutex<Option<ApiError>>,
}

impl StaticTokens {
    pub fn new(token: &str) -> Arc<Self> {
        Arc::new(Self {
            token: token.to_string(),
            ..Self::default()
        })
    }

    pub fn failing_on_force(token: &str, err: ApiError) -> Arc<Self> {
        let tokens = Self::new(token);
        *tokens.fail_on_force.lock().unwrap() = Some(err);
        tokens
    }

    pub fn failing_always(err: ApiError) -> Arc<Self> {
        let tokens = Self::new("unused");
        *tokens.fail_always.lock().unwrap() = Some(err);
        tokens
    }
}

#[async_trait]
impl TokenSource for StaticTokens {
    async fn bearer_token(&self, force_refresh: bool) -> ApiResult<String> {
        self.mints.fetch_add(1, Ordering::SeqCst);
        if force_refresh {
            self.force_refreshes.fetch_add(1, Ordering::SeqCst);
        }
        if let Some(err) = self.fail_always.lock().unwrap().clone() {
            return Err(err);
        }
        if force_refresh {
            if let Some(err) = self.fail_on_force.lock().unwrap().clone() {
                return Err(err);
            }
        }
        Ok(self.token.clone())
    }
}

pub fn identity_with(subject_id: &str, tokens: Arc<dyn TokenSource>) -> Identity {
    Identity {
        subject_id: subject_id.to_string(),
        email: format!("{}@example.com", subject_id),
        display_name: subject_id.to_string(),
        tokens,
    }
}

pub fn identity(subject_id: &str, token: &str) -> Identity {
    identity_with(subject_id, StaticTokens::new(token))
}

/// Identity provider driven by the test: push change notifications, script
/// the interactive sign-in result, count provider-side sign-outs.
#[derive(Default)]
pub struct ScriptedProvider {
    sender: Mutex<Option<mpsc::UnboundedSender<Option<Identity>>>>,
    pub sign_in_result: Mutex<Option<ApiResult<Identity>>>,
    pub sign_in_calls: AtomicUsize,
    pub sign_outs: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Push a change notification to the subscribed listener.
    pub fn push(&self, change: Option<Identity>) {
        if let Some(sender) = self.sender.lock().unwrap().as_ref() {
            let _ = sender.send(change);
        }
    }

    pub fn script_sign_in(&self, result: ApiResult<Identity>) {
        *self.sign_in_result.lock().unwrap() = Some(result);
    }
}

#[async_trait]
impl IdentityProvider for ScriptedProvider {
    fn subscribe(&self) -> mpsc::UnboundedReceiver<Option<Identity>> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.sender.lock().unwrap() = Some(tx);
        rx
    }

    async fn sign_in(&self) -> ApiResult<Identity> {
        self.sign_in_calls.fetch_add(1, Ordering::SeqCst);
        self.sign_in_result
            .lock()
            .unwrap()
            .take()
            .unwrap_or(Err(ApiError::Network("no scripted sign-in".to_string())))
    }

    async fn sign_out(&self) -> ApiResult<()> {
        self.sign_outs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Navigator remembering the current view and every redirect it receives.
pub struct RecordingNavigator {
    current: Mutex<View>,
    pub visits: Mutex<Vec<View>>,
}

impl RecordingNavigator {
    pub fn starting_at(view: View) -> Arc<Self> {
        Arc::new(Self {
            current: Mutex::new(view),
            visits: Mutex::new(Vec::new()),
        })
    }

    pub fn visit_log(&self) -> Vec<View> {
        self.visits.lock().unwrap().clone()
    }
}

impl Navigator for RecordingNavigator {
    fn current(&self) -> View {
        *self.current.lock().unwrap()
    }

    fn go(&self, view: View) {
        *self.current.lock().unwrap() = view;
        self.visits.lock().unwrap().push(view);
    }
}

/// Wait until the published auth state satisfies `pred`, or panic after two
/// seconds.
pub async fn wait_for_state<F>(rx: &mut watch::Receiver<AuthState>, pred: F)
where
    F: Fn(&AuthState) -> bool,
{
    let waited = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if pred(&rx.borrow_and_update()) {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    })
    .await;
    assert!(waited.is_ok(), "timed out waiting for auth state");
}
