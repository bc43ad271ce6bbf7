//! API client for the Moodiary backend.
//!
//! One uniform operation — "execute an authenticated JSON request" — backed
//! by a cookie-bearing [`reqwest::Client`]. The session cookie is the only
//! credential attached to normal requests; bearer tokens appear solely in the
//! login exchange. A 401 triggers exactly one recovery cycle (forced-fresh
//! token, replayed login exchange, single replay of the original request)
//! before surfacing [`ApiError::Unauthorized`].

use std::sync::{Arc, Mutex};

use chrono::{Local, NaiveDate};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use urlencoding::encode;

use crate::datetime;
use crate::error::{ApiError, ApiResult};
use crate::models::{
    AiFeedback, Diary, DiaryCreate, DiaryUpdate, ErrorBody, HealthResponse, LoginResponse,
    MessageResponse, PresignedUrlResponse, UploadCompleteResponse, User,
};
use crate::traits::Identity;

const LOGIN_PATH: &str = "/api/v1/auth/login";
const LOGOUT_PATH: &str = "/api/v1/auth/logout";
const ME_PATH: &str = "/api/v1/auth/me";
const DIARIES_PATH: &str = "/api/v1/diaries/";

/// Shared loading/error pair observed by the UI layer.
///
/// `loading` is set for the duration of every call and cleared exactly once
/// on any terminal outcome; `error` holds the message of the last failure.
#[derive(Debug, Clone, Default)]
pub struct RequestState {
    pub loading: bool,
    pub error: Option<String>,
}

/// Shared slot holding the identity the session manager last reconciled.
///
/// The 401 recovery path reads it to mint a forced-fresh token; when it is
/// empty, recovery fails fast without a network replay.
#[derive(Clone, Default)]
pub struct CurrentIdentity(Arc<RwLock<Option<Identity>>>);

impl CurrentIdentity {
    pub async fn set(&self, identity: Option<Identity>) {
        *self.0.write().await = identity;
    }

    pub async fn get(&self) -> Option<Identity> {
        self.0.read().await.clone()
    }
}

/// Clears the loading flag when the call ends, on every path.
pub(crate) struct LoadGuard {
    state: Arc<Mutex<RequestState>>,
}

impl Drop for LoadGuard {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            state.loading = false;
        }
    }
}

/// Query parameters for listing diaries.
#[derive(Debug, Clone, Default)]
pub struct DiaryQuery {
    pub skip: Option<u32>,
    pub limit: Option<u32>,
    /// RFC 3339 UTC lower bound on `diary_date`.
    pub start_date: Option<String>,
    /// RFC 3339 UTC upper bound on `diary_date`.
    pub end_date: Option<String>,
}

impl DiaryQuery {
    fn to_query_string(&self) -> String {
        let mut pairs = Vec::new();
        if let Some(skip) = self.skip {
            pairs.push(format!("skip={}", skip));
        }
        if let Some(limit) = self.limit {
            pairs.push(format!("limit={}", limit));
        }
        if let Some(ref start) = self.start_date {
            pairs.push(format!("start_date={}", encode(start)));
        }
        if let Some(ref end) = self.end_date {
            pairs.push(format!("end_date={}", encode(end)));
        }
        pairs.join("&")
    }
}

/// Client for the Moodiary API.
///
/// Cloning is cheap and clones share the cookie jar, the identity slot, and
/// the loading/error pair.
#[derive(Clone)]
pub struct ApiClient {
    /// Base URL of the backend
    pub base_url: String,
    client: Client,
    identity: CurrentIdentity,
    state: Arc<Mutex<RequestState>>,
}

impl ApiClient {
    /// Create a new client for `base_url` with a fresh cookie store.
    pub fn new(base_url: impl Into<String>) -> ApiResult<Self> {
        let client = Client::builder()
            .cookie_store(true)
            .build()
            .map_err(|e| ApiError::Configuration(format!("HTTP client init failed: {}", e)))?;
        Ok(Self {
            base_url: base_url.into(),
            client,
            identity: CurrentIdentity::default(),
            state: Arc::new(Mutex::new(RequestState::default())),
        })
    }

    /// The identity slot shared with the session manager.
    pub fn identity_slot(&self) -> CurrentIdentity {
        self.identity.clone()
    }

    /// Snapshot of the shared loading/error pair.
    pub fn request_state(&self) -> RequestState {
        self.state
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    pub(crate) fn begin(&self) -> LoadGuard {
        if let Ok(mut state) = self.state.lock() {
            state.loading = true;
            state.error = None;
        }
        LoadGuard {
            state: Arc::clone(&self.state),
        }
    }

    pub(crate) fn record_error(&self, err: &ApiError) {
        if let Ok(mut state) = self.state.lock() {
            state.error = Some(err.to_string());
        }
    }

    /// Execute an authenticated JSON request.
    ///
    /// The session cookie is attached automatically. See the module docs for
    /// the 401 recovery contract.
    pub async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> ApiResult<T> {
        let _guard = self.begin();
        let result = self.request_inner(method, path, body).await;
        if let Err(ref err) = result {
            self.record_error(err);
        }
        result
    }

    async fn request_inner<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> ApiResult<T> {
        let response = self.execute(method.clone(), path, body.as_ref()).await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            return self.recover_and_replay(method, path, body).await;
        }
        Self::decode(response).await
    }

    async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> ApiResult<reqwest::Response> {
        let url = format!("{}{}", self.base_url, path);
        let mut builder = self
            .client
            .request(method, &url)
            .header(CONTENT_TYPE, "application/json");
        if let Some(body) = body {
            builder = builder.json(body);
        }
        Ok(builder.send().await?)
    }

    /// One-shot recovery: forced-fresh token, replayed login exchange, then a
    /// single replay of the original request. Any failure along the way is
    /// `Unauthorized`; there is no second attempt.
    async fn recover_and_replay<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> ApiResult<T> {
        tracing::debug!(path, "got 401, attempting session recovery");
        self.reestablish_session().await?;

        let response = self
            .execute(method, path, body.as_ref())
            .await
            .map_err(|_| ApiError::Unauthorized)?;
        if !response.status().is_success() {
            tracing::warn!(path, status = %response.status(), "replay after recovery failed");
            return Err(ApiError::Unauthorized);
        }
        response.json::<T>().await.map_err(Into::into)
    }

    /// Re-establish the cookie session from the current identity.
    ///
    /// Fails fast with `Unauthorized` when no identity is available.
    pub(crate) async fn reestablish_session(&self) -> ApiResult<()> {
        let identity = self.identity.get().await.ok_or(ApiError::Unauthorized)?;
        let token = identity
            .tokens
            .bearer_token(true)
            .await
            .map_err(|e| {
                tracing::warn!("token refresh during recovery failed: {}", e);
                ApiError::Unauthorized
            })?;
        self.exchange_login(&token).await.map_err(|e| {
            tracing::warn!("login exchange during recovery failed: {}", e);
            ApiError::Unauthorized
        })
    }

    /// The login exchange: trade a bearer token for the session cookie.
    ///
    /// Both the session manager's reconcile path and 401 recovery go through
    /// this same operation so neither can leave the cookie in a state the
    /// other does not produce.
    pub(crate) async fn exchange_login(&self, firebase_token: &str) -> ApiResult<()> {
        let body = json!({ "firebase_token": firebase_token });
        let response = self.execute(Method::POST, LOGIN_PATH, Some(&body)).await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Self::error_from_body(status, &text));
        }
        Ok(())
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> ApiResult<T> {
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Self::error_from_body(status, &text));
        }
        response.json::<T>().await.map_err(Into::into)
    }

    /// Classify a non-2xx response: prefer the structured `{detail}` payload,
    /// otherwise synthesize `"HTTP <status>: <status text>"`.
    fn error_from_body(status: StatusCode, body: &str) -> ApiError {
        if status == StatusCode::UNAUTHORIZED {
            return ApiError::Unauthorized;
        }
        let detail = serde_json::from_str::<ErrorBody>(body)
            .ok()
            .and_then(|b| b.detail);
        let message = detail.unwrap_or_else(|| {
            format!(
                "HTTP {}: {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown")
            )
        });
        ApiError::HttpStatus {
            status: status.as_u16(),
            message,
        }
    }

    /// Open the AI-feedback event stream, applying the same one-shot 401
    /// recovery as JSON requests to the initial handshake.
    pub(crate) async fn open_event_stream(&self, path: &str) -> ApiResult<reqwest::Response> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .header(ACCEPT, "text/event-stream")
            .send()
            .await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            tracing::debug!(path, "stream handshake got 401, attempting session recovery");
            self.reestablish_session().await?;
            let retry = self
                .client
                .get(&url)
                .header(ACCEPT, "text/event-stream")
                .send()
                .await
                .map_err(|_| ApiError::Unauthorized)?;
            if !retry.status().is_success() {
                return Err(ApiError::Unauthorized);
            }
            return Ok(retry);
        }

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Self::error_from_body(status, &text));
        }
        Ok(response)
    }

    // ---- auth ----

    /// POST /api/v1/auth/login
    ///
    /// Credentials-included so the response can set the session cookie.
    pub async fn login(&self, firebase_token: &str) -> ApiResult<LoginResponse> {
        self.request(
            Method::POST,
            LOGIN_PATH,
            Some(json!({ "firebase_token": firebase_token })),
        )
        .await
    }

    /// POST /api/v1/auth/logout
    pub async fn logout(&self) -> ApiResult<MessageResponse> {
        self.request(Method::POST, LOGOUT_PATH, None).await
    }

    /// GET /api/v1/auth/me
    pub async fn current_user(&self) -> ApiResult<User> {
        self.request(Method::GET, ME_PATH, None).await
    }

    /// GET /health
    pub async fn health_check(&self) -> ApiResult<HealthResponse> {
        self.request(Method::GET, "/health", None).await
    }

    // ---- diaries ----

    /// POST /api/v1/diaries/
    pub async fn create_diary(&self, diary: &DiaryCreate) -> ApiResult<Diary> {
        let body = serde_json::to_value(diary)
            .map_err(|e| ApiError::InvalidResponse(format!("request body: {}", e)))?;
        self.request(Method::POST, DIARIES_PATH, Some(body)).await
    }

    /// GET /api/v1/diaries/ with optional pagination and date bounds.
    pub async fn list_diaries(&self, query: &DiaryQuery) -> ApiResult<Vec<Diary>> {
        let qs = query.to_query_string();
        let path = if qs.is_empty() {
            DIARIES_PATH.to_string()
        } else {
            format!("{}?{}", DIARIES_PATH, qs)
        };
        self.request(Method::GET, &path, None).await
    }

    /// GET /api/v1/diaries/{id}
    pub async fn get_diary(&self, diary_id: i64) -> ApiResult<Diary> {
        self.request(Method::GET, &format!("/api/v1/diaries/{}", diary_id), None)
            .await
    }

    /// PUT /api/v1/diaries/{id}
    pub async fn update_diary(&self, diary_id: i64, update: &DiaryUpdate) -> ApiResult<Diary> {
        let body = serde_json::to_value(update)
            .map_err(|e| ApiError::InvalidResponse(format!("request body: {}", e)))?;
        self.request(
            Method::PUT,
            &format!("/api/v1/diaries/{}", diary_id),
            Some(body),
        )
        .await
    }

    /// DELETE /api/v1/diaries/{id}
    pub async fn delete_diary(&self, diary_id: i64) -> ApiResult<MessageResponse> {
        self.request(
            Method::DELETE,
            &format!("/api/v1/diaries/{}", diary_id),
            None,
        )
        .await
    }

    /// POST /api/v1/diaries/{id}/feedback — non-streaming AI feedback.
    pub async fn request_ai_feedback(&self, diary_id: i64) -> ApiResult<AiFeedback> {
        self.request(
            Method::POST,
            &format!("/api/v1/diaries/{}/feedback", diary_id),
            None,
        )
        .await
    }

    /// All entries whose stored instant falls within `date` as seen in the
    /// viewer's current time zone.
    pub async fn list_diaries_for_local_date(
        &self,
        date: NaiveDate,
        skip: Option<u32>,
        limit: Option<u32>,
    ) -> ApiResult<Vec<Diary>> {
        let (start, end) = datetime::local_day_range_as_utc(date);
        self.list_diaries(&DiaryQuery {
            skip,
            limit,
            start_date: Some(datetime::to_wire(start)),
            end_date: Some(datetime::to_wire(end)),
        })
        .await
    }

    /// Create an entry for a viewer-local calendar date.
    ///
    /// The entry instant is the chosen date at the current local time of day;
    /// the local day bounds ride along for the server's duplicate check.
    pub async fn create_diary_for_local_date(
        &self,
        date: NaiveDate,
        content: &str,
        mood: &str,
        photo_url: Option<String>,
    ) -> ApiResult<Diary> {
        let time_of_day = Local::now().time();
        let (start, end) = datetime::local_day_range_as_utc(date);
        let create = DiaryCreate {
            diary_date: datetime::to_wire(datetime::local_date_to_utc_instant(date, time_of_day)),
            content: content.to_string(),
            mood: mood.to_string(),
            photo_url,
            range_start_utc: Some(datetime::to_wire(start)),
            range_end_utc: Some(datetime::to_wire(end)),
        };
        self.create_diary(&create).await
    }

    // ---- uploads ----

    /// POST /api/v1/diaries/images/presigned-url
    ///
    /// The caller PUTs the raw bytes to the returned URL itself; that request
    /// goes to a different host and carries no cookie.
    pub async fn presigned_url(
        &self,
        filename: &str,
        content_type: &str,
    ) -> ApiResult<PresignedUrlResponse> {
        let path = format!(
            "/api/v1/diaries/images/presigned-url?filename={}&content_type={}",
            encode(filename),
            encode(content_type)
        );
        self.request(Method::POST, &path, None).await
    }

    /// POST /api/v1/diaries/images/upload-complete
    pub async fn upload_complete(&self, filename: &str) -> ApiResult<UploadCompleteResponse> {
        self.request(
            Method::POST,
            "/api/v1/diaries/images/upload-complete",
            Some(json!({ "filename": filename })),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diary_query_empty() {
        assert_eq!(DiaryQuery::default().to_query_string(), "");
    }

    #[test]
    fn test_diary_query_full() {
        let query = DiaryQuery {
            skip: Some(0),
            limit: Some(31),
            start_date: Some("2026-08-29T15:00:00.000Z".to_string()),
            end_date: Some("2026-08-30T14:59:59.999Z".to_string()),
        };
        let qs = query.to_query_string();
        assert!(qs.starts_with("skip=0&limit=31&start_date="));
        // Colons must be escaped for the query string.
        assert!(qs.contains("2026-08-29T15%3A00%3A00.000Z"));
    }

    #[test]
    fn test_error_from_body_prefers_detail() {
        let err = ApiClient::error_from_body(
            StatusCode::BAD_REQUEST,
            r#"{"detail":"mood is required"}"#,
        );
        assert_eq!(err.status(), Some(400));
        assert_eq!(err.to_string(), "mood is required");
    }

    #[test]
    fn test_error_from_body_synthesizes_on_empty_body() {
        let err = ApiClient::error_from_body(StatusCode::INTERNAL_SERVER_ERROR, "");
        assert_eq!(err.status(), Some(500));
        assert_eq!(err.to_string(), "HTTP 500: Internal Server Error");
    }

    #[test]
    fn test_error_from_body_synthesizes_on_non_json_body() {
        let err = ApiClient::error_from_body(StatusCode::BAD_GATEWAY, "<html>oops</html>");
        assert_eq!(err.to_string(), "HTTP 502: Bad Gateway");
    }

    #[test]
    fn test_error_from_body_401_classifies_as_unauthorized() {
        let err = ApiClient::error_from_body(StatusCode::UNAUTHORIZED, "");
        assert!(matches!(err, ApiError::Unauthorized));
        assert_eq!(err.status(), Some(401));
    }

    #[tokio::test]
    async fn test_current_identity_slot_roundtrip() {
        let slot = CurrentIdentity::default();
        assert!(slot.get().await.is_none());
        slot.set(None).await;
        assert!(slot.get().await.is_none());
    }

    #[tokio::test]
    async fn test_request_with_unreachable_server_is_network_error() {
        let api = ApiClient::new("http://127.0.0.1:1").unwrap();
        let err = api.health_check().await.unwrap_err();
        assert!(matches!(err, ApiError::Network(_)));
        // Loading flag is cleared and the error is recorded.
        let state = api.request_state();
        assert!(!state.loading);
        assert!(state.error.is_some());
    }
}
