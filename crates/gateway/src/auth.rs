//! # APIキー認証
//!
//! `ISIGN_API_KEY` が設定されている場合、/sign と /download に
//! `Authorization: Bearer <key>` を要求するミドルウェア。
//! 未設定の場合は素通しする。

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use sha2::{Digest, Sha256};

use crate::config::GatewayState;
use crate::error::GatewayError;

pub async fn require_api_key(
    State(state): State<Arc<GatewayState>>,
    request: Request,
    next: Next,
) -> Result<Response, GatewayError> {
    let Some(expected) = state.config.api_key.as_deref() else {
        return Ok(next.run(request).await);
    };

    let provided = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim);

    match provided {
        Some(token) if keys_match(token, expected) => Ok(next.run(request).await),
        Some(_) => {
            tracing::warn!(path = %request.uri().path(), "APIキーが一致しません");
            Err(GatewayError::Unauthorized("Invalid API key".to_string()))
        }
        None => Err(GatewayError::Unauthorized(
            "Missing bearer token".to_string(),
        )),
    }
}

/// 長さに依存しない比較のため、両者のSHA-256をXORで比較する。
fn keys_match(provided: &str, expected: &str) -> bool {
    let a = Sha256::digest(provided.as_bytes());
    let b = Sha256::digest(expected.as_bytes());
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
