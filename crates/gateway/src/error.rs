//! # Gateway エラー型
//!
//! 全エンドポイントで共通のエラー型。レスポンスは常に
//! `{"success": false, "error": ..., "details": ...}` 形式のJSONになる。

use axum::http::StatusCode;
use axum::Json;
use isign_types::ErrorResponse;

/// Gatewayエラー型。
///
/// バリアントの中身はそのまま `details` としてクライアントに返される。
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// フォーム入力の欠落・拡張子不正
    #[error("不正な入力: {0}")]
    Validation(String),
    /// APIキー認証に失敗
    #[error("認証に失敗: {0}")]
    Unauthorized(String),
    /// IPAの展開またはInfo.plistの解析に失敗
    #[error("バンドル情報の抽出に失敗: {0}")]
    Extraction(String),
    /// 署名ツールが非ゼロで終了。中身はツールの出力そのもの
    #[error("署名ツールが失敗しました")]
    Signing(String),
    /// 署名済みIPAの永続化に失敗
    #[error("ストレージ操作に失敗: {0}")]
    Storage(String),
    /// ダウンロード対象が存在しない
    #[error("ファイルが見つかりません: {0}")]
    NotFound(String),
    /// 不正なリクエスト
    #[error("不正なリクエスト: {0}")]
    BadRequest(String),
    /// リクエストボディが上限を超えた
    #[error("リクエストボディが大きすぎます: {0}")]
    PayloadTooLarge(String),
    /// 内部エラー
    #[error("内部エラー: {0}")]
    Internal(String),
}

impl GatewayError {
    /// レスポンスの `error` フィールドに入る短い分類。
    pub fn classification(&self) -> &str {
        match self {
            GatewayError::Validation(msg) | GatewayError::BadRequest(msg) => msg,
            GatewayError::Unauthorized(_) => "Unauthorized",
            GatewayError::Extraction(_) => "Failed to extract bundle id and app name",
            GatewayError::Signing(_) => "Signing failed",
            GatewayError::Storage(_) => "Failed to store signed artifact",
            GatewayError::NotFound(_) => "File not found",
            GatewayError::PayloadTooLarge(_) => "Request body too large",
            GatewayError::Internal(_) => "Unexpected error occurred",
        }
    }

    /// 失敗したステージの診断テキスト。
    pub fn details(&self) -> &str {
        match self {
            GatewayError::Validation(d)
            | GatewayError::Unauthorized(d)
            | GatewayError::Extraction(d)
            | GatewayError::Signing(d)
            | GatewayError::Storage(d)
            | GatewayError::NotFound(d)
            | GatewayError::BadRequest(d)
            | GatewayError::PayloadTooLarge(d)
            | GatewayError::Internal(d) => d,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::Validation(_) | GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            GatewayError::Extraction(_)
            | GatewayError::Signing(_)
            | GatewayError::Storage(_)
            | GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl axum::response::IntoResponse for GatewayError {
    fn into_response(self) -> axum::response::Response {
        let body = ErrorResponse {
            success: false,
            error: self.classification().to_string(),
            details: self.details().to_string(),
        };
        (self.status_code(), Json(body)).into_response()
    }
}
