//! # GET /download/{filename}
//!
//! 永続ディレクトリの署名済みIPAを添付ファイルとして返す。
//! 拡張子チェックとファイル名の検証のみが唯一のアクセス制御（APIキー設定時を除く）。

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use tokio_util::io::ReaderStream;

use crate::config::GatewayState;
use crate::error::GatewayError;

/// GET /download/{filename} — 署名済みIPAのダウンロード。
pub async fn handle_download(
    State(state): State<Arc<GatewayState>>,
    Path(filename): Path<String>,
) -> Result<Response, GatewayError> {
    let path = state.artifacts.resolve(&filename).inspect_err(|e| {
        tracing::warn!(filename = %filename, error = %e, "ダウンロード要求を拒否");
    })?;

    let file = tokio::fs::File::open(&path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => GatewayError::NotFound(filename.clone()),
        _ => GatewayError::Internal(format!("Failed to open {filename}: {e}")),
    })?;
    let size = file
        .metadata()
        .await
        .map_err(|e| GatewayError::Internal(format!("Failed to stat {filename}: {e}")))?
        .len();

    tracing::debug!(filename = %filename, size, "署名済みIPAを送信");

    let headers = [
        (CONTENT_TYPE, "application/octet-stream".to_string()),
        (CONTENT_LENGTH, size.to_string()),
        (
            CONTENT_DISPOSITION,
            format!("attachment; filename=\"{filename}\""),
        ),
    ];
    Ok((headers, Body::from_stream(ReaderStream::new(file))).into_response())
}
