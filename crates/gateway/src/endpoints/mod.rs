//! # Gatewayエンドポイント
//!
//! - `GET /` — アップロードフォーム
//! - `GET /health` — 死活監視
//! - `POST /sign` — IPA署名
//! - `GET /download/{filename}` — 署名済みIPAのダウンロード

pub mod download;
pub mod index;
pub mod sign;

#[cfg(test)]
pub mod test_helpers;

pub use download::handle_download;
pub use index::{handle_health, handle_index};
pub use sign::handle_sign;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;

use crate::auth::require_api_key;
use crate::config::GatewayState;

/// ルーターを構築する。/sign と /download はAPIキー認証の対象。
pub fn router(state: Arc<GatewayState>) -> Router {
    let protected = Router::new()
        .route("/sign", post(handle_sign))
        .route("/download/{filename}", get(handle_download))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            require_api_key,
        ));

    Router::new()
        .route("/", get(handle_index))
        .route("/health", get(handle_health))
        .merge(protected)
        .layer(DefaultBodyLimit::max(state.config.max_request_bytes))
        .with_state(state)
}
