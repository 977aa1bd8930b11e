//! # isign 共有型定義
//!
//! 署名ゲートウェイのHTTP APIで送受信されるデータ構造をRust構造体として提供する。
//!
//! ## エンコーディング規則
//! - JSON: すべてのレスポンスボディ
//! - Hex: SHA-256ダイジェスト（小文字）

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// アプリ情報
// ---------------------------------------------------------------------------

/// Info.plistから抽出したバンドル情報。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleInfo {
    /// CFBundleIdentifier
    pub bundle_id: String,
    /// CFBundleDisplayName → CFBundleName → "UnknownApp" の順で解決した表示名
    pub name: String,
}

/// /sign レスポンスに含まれるアプリ情報。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppInfo {
    /// アプリの表示名
    pub name: String,
    /// バンドルID
    pub bundle_id: String,
    /// 署名済みIPAのサイズ（MB、小数第2位まで）
    pub size_mb: f64,
    /// 署名済みIPAのサイズ（バイト）
    pub size_bytes: u64,
    /// 署名済みIPAのSHA-256（Hex）
    pub sha256: String,
}

// ---------------------------------------------------------------------------
// POST /sign
// ---------------------------------------------------------------------------

/// POST /sign 成功レスポンス。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignResponse {
    /// 常にtrue
    pub success: bool,
    /// 人間向けメッセージ
    pub message: String,
    /// 署名済みIPAの直接ダウンロードパス（`/download/{filename}`）
    pub direct_download: String,
    /// OTAインストール用URL（リモートアップロード成功時のみ）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub itms_services_url: Option<String>,
    /// アプリ情報
    pub app_info: AppInfo,
    /// 直接ダウンロードのみの場合の補足
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    /// リモートアップロードをスキップ・失敗した理由
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload_error: Option<String>,
}

/// 全エンドポイント共通のエラーレスポンス。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// 常にfalse
    pub success: bool,
    /// エラー分類
    pub error: String,
    /// 失敗したステージの診断テキスト
    pub details: String,
}

// ---------------------------------------------------------------------------
// リモートファイルホスト
// ---------------------------------------------------------------------------

/// JSON形式のリモートファイルホストのアップロードレスポンス
/// （`{"status":"ok","data":{"downloadPage":...}}`）。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostUploadResponse {
    /// "ok" 以外はアプリケーションレベルのエラー
    pub status: String,
    /// エラー時のメッセージ
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// 成功時のデータ
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<HostUploadData>,
}

/// アップロード成功時のデータ部。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostUploadData {
    /// ダウンロードページURL
    #[serde(rename = "downloadPage", default, skip_serializing_if = "Option::is_none")]
    pub download_page: Option<String>,
}

// ---------------------------------------------------------------------------
// GET /health
// ---------------------------------------------------------------------------

/// GET /health レスポンス。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// "ok"
    pub status: String,
}
