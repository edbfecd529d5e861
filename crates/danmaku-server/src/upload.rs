//! `POST /upload`: stores background media and returns its public URL.
//!
//! Only the declared content type is checked, against a fixed list of
//! raster image and video formats. The stored name is generated and its
//! extension comes from that content type, so the client file name never
//! reaches the disk and a file is always served as the type it was
//! accepted as.

use std::path::Path;

use axum::extract::Multipart;
use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use metrics::counter;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::metrics::UPLOADS_TOTAL;

/// URL prefix stored files are served under.
pub const UPLOADS_ROUTE: &str = "/uploads";

/// Accepted content types and the extension each is stored with.
const ACCEPTED_TYPES: &[(&str, MediaKind, &str)] = &[
    ("image/png", MediaKind::Image, "png"),
    ("image/jpeg", MediaKind::Image, "jpg"),
    ("image/gif", MediaKind::Image, "gif"),
    ("image/webp", MediaKind::Image, "webp"),
    ("image/avif", MediaKind::Image, "avif"),
    ("image/bmp", MediaKind::Image, "bmp"),
    ("video/mp4", MediaKind::Video, "mp4"),
    ("video/webm", MediaKind::Video, "webm"),
    ("video/ogg", MediaKind::Video, "ogv"),
    ("video/quicktime", MediaKind::Video, "mov"),
];

/// Accepted media kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// Raster image.
    Image,
    /// Video.
    Video,
}

impl MediaKind {
    /// Classify a declared content type. Unlisted types are `None`.
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        accepted(content_type).map(|(kind, _)| kind)
    }

    /// Label used on the wire and in metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
        }
    }
}

/// Look up a content type, ignoring parameters and case.
fn accepted(content_type: &str) -> Option<(MediaKind, &'static str)> {
    let essence = content_type.split(';').next()?.trim().to_ascii_lowercase();
    ACCEPTED_TYPES
        .iter()
        .find(|(mime, _, _)| *mime == essence)
        .map(|&(_, kind, ext)| (kind, ext))
}

/// Success body.
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    /// Always `true`.
    pub ok: bool,
    /// Where the stored file is served.
    pub url: String,
    /// Media kind, suitable for `adminSetBackground`.
    pub kind: MediaKind,
}

#[derive(Serialize)]
struct UploadErrorBody {
    ok: bool,
    error: String,
}

/// Upload failures, each mapped to an HTTP status.
#[derive(Debug, Error)]
pub enum UploadError {
    /// The form had no file field.
    #[error("no file provided")]
    MissingFile,
    /// The declared content type is not an accepted image or video type.
    #[error("unsupported content type: {0}")]
    UnsupportedType(String),
    /// The multipart body could not be read, including when it is too large.
    #[error("invalid upload: {}", .0.body_text())]
    Multipart(#[from] MultipartError),
    /// Writing the file failed.
    #[error("failed to store upload")]
    Io(#[from] std::io::Error),
}

impl UploadError {
    fn status(&self) -> StatusCode {
        match self {
            Self::MissingFile | Self::UnsupportedType(_) => StatusCode::BAD_REQUEST,
            Self::Multipart(err) => err.status(),
            Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for UploadError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!(error = ?self, "upload failed");
        } else {
            info!(error = %self, %status, "upload rejected");
        }
        let body = UploadErrorBody {
            ok: false,
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Read the first file field from `multipart` and write it into `dir`.
pub async fn store_upload(
    dir: &Path,
    mut multipart: Multipart,
) -> Result<UploadResponse, UploadError> {
    while let Some(field) = multipart.next_field().await? {
        if field.file_name().is_none() {
            continue;
        }
        let content_type = field.content_type().unwrap_or_default().to_owned();
        let (kind, ext) = accepted(&content_type)
            .ok_or_else(|| UploadError::UnsupportedType(content_type.clone()))?;
        let data = field.bytes().await?;

        let name = stored_name(ext);
        tokio::fs::create_dir_all(dir).await?;
        tokio::fs::write(dir.join(&name), &data).await?;

        counter!(UPLOADS_TOTAL, "kind" => kind.as_str()).increment(1);
        info!(file = %name, kind = kind.as_str(), bytes = data.len(), "upload stored");
        return Ok(UploadResponse {
            ok: true,
            url: format!("{UPLOADS_ROUTE}/{name}"),
            kind,
        });
    }
    Err(UploadError::MissingFile)
}

/// Generated file name: a v7 UUID plus the content type's extension.
fn stored_name(ext: &str) -> String {
    format!("{}.{ext}", Uuid::now_v7())
}
