//! Wire models for the Moodiary API.
//!
//! Datetime fields travel as RFC 3339 UTC strings. The server stores
//! instants, not local dates; conversion to and from the viewer's calendar
//! day happens in [`crate::datetime`].

use serde::{Deserialize, Serialize};

/// Server-side user projection (GET /api/v1/auth/me).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub firebase_uid: String,
    pub email: String,
    pub created_at: String,
}

/// A diary entry as returned by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diary {
    pub id: i64,
    pub content: String,
    pub mood: String,
    #[serde(default)]
    pub photo_url: Option<String>,
    /// The instant the author intended the entry for (UTC).
    pub diary_date: String,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default)]
    pub llm_feedback: Option<String>,
    pub owner_id: i64,
}

/// Payload for creating a diary entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiaryCreate {
    /// UTC instant the entry belongs to.
    pub diary_date: String,
    pub content: String,
    pub mood: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    /// Viewer-local day bounds in UTC, used by the server's duplicate check.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range_start_utc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range_end_utc: Option<String>,
}

/// Partial update payload; omitted fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiaryUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mood: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
}

/// Response from the login exchange (POST /api/v1/auth/login).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub message: String,
    pub user: User,
}

/// Generic `{message}` acknowledgement (logout, delete).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Non-streaming AI feedback response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiFeedback {
    pub feedback: String,
}

/// First step of the upload handshake.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresignedUrlResponse {
    pub presigned_url: String,
    pub filename: String,
}

/// Final step of the upload handshake.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadCompleteResponse {
    pub message: String,
    pub file_url: String,
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

/// Structured error body the server attaches to non-2xx responses.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub detail: Option<String>,
}
