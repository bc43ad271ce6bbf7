//! Moodiary client core — session, request, and stream plumbing for a
//! personal diary service with AI-generated commentary.
//!
//! The crate reconciles two identity surfaces (a third-party provider
//! issuing short-lived bearer tokens and a first-party cookie session),
//! executes authenticated JSON requests that transparently self-heal from an
//! expired session exactly once, and consumes the server-pushed AI-feedback
//! event stream with correct partial-delivery semantics.

pub mod api;
pub mod datetime;
pub mod error;
pub mod models;
pub mod session;
pub mod stream;
pub mod traits;

pub use api::{ApiClient, CurrentIdentity, DiaryQuery, RequestState};
pub use error::{ApiError, ApiResult};
pub use session::{AuthState, SessionManager, TOKEN_REFRESH_INTERVAL};
pub use stream::{FeedbackEvent, StreamClient};
pub use traits::{Identity, IdentityProvider, Navigator, TokenSource, View};
