//! # リモートファイルホスト
//!
//! 署名済みIPAとインストールマニフェストを公開URLで配布するための
//! アップロード先の抽象インターフェース。
//! HTTPアップロード型ホストの実装は `http`、S3互換ストレージ実装は `s3` サブモジュールを参照。
//!
//! アップロード失敗はリクエスト全体の失敗にはならない（直接ダウンロードに縮退する）ため、
//! `GatewayError` とは別の `UploadError` で表現する。

pub mod http;
#[cfg(feature = "vendor-aws")]
pub mod s3;

pub use self::http::HttpFileHost;
#[cfg(feature = "vendor-aws")]
pub use self::s3::S3FileHost;

use std::time::Duration;

use isign_types::HostUploadResponse;

use crate::config::{GatewayConfig, UploadBackend, MIB};

/// リモートアップロードの失敗理由。それぞれ異なる診断メッセージを持つ。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UploadError {
    /// HTTPステータスが200以外
    #[error("Upload service returned error {status}")]
    Status { status: u16, body: String },
    /// レスポンスボディを解釈できない
    #[error("Invalid response from upload service: {0}")]
    InvalidBody(String),
    /// ホストがアプリケーションレベルのエラーを返した
    #[error("Upload service reported an error: {0}")]
    Host(String),
    /// ダウンロードURLがレスポンスに含まれていない
    #[error("Unexpected response format from upload service")]
    MissingDownloadUrl,
    /// 通信エラー
    #[error("Network error: {0}")]
    Network(String),
    /// ローカルファイルの読み取り・マニフェスト生成の失敗
    #[error("Upload error: {0}")]
    Local(String),
}

/// ホストのレスポンス形式。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    /// `{"status":"ok","data":{"downloadPage":...}}`
    Json,
    /// ボディ中にURLがプレーンテキストで含まれる
    PlainText,
}

/// リモートファイルホストの抽象インターフェース。
///
/// アップロードしたファイルの公開ダウンロードURLを返す。
#[async_trait::async_trait]
pub trait RemoteHost: Send + Sync {
    async fn upload(
        &self,
        file_name: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<String, UploadError>;
}

/// ホストのレスポンスをダウンロードURLに変換する。
pub fn parse_host_response(shape: ResponseShape, status: u16, body: &str) -> Result<String, UploadError> {
    if status != 200 {
        return Err(UploadError::Status {
            status,
            body: body.to_string(),
        });
    }

    match shape {
        ResponseShape::Json => {
            let response: HostUploadResponse = serde_json::from_str(body)
                .map_err(|e| UploadError::InvalidBody(e.to_string()))?;
            if response.status != "ok" {
                return Err(UploadError::Host(
                    response
                        .error
                        .unwrap_or_else(|| format!("status \"{}\"", response.status)),
                ));
            }
            response
                .data
                .and_then(|data| data.download_page)
                .filter(|url| !url.trim().is_empty())
                .ok_or(UploadError::MissingDownloadUrl)
        }
        ResponseShape::PlainText => body
            .split_whitespace()
            .find(|token| token.starts_with("https://") || token.starts_with("http://"))
            .map(str::to_string)
            .ok_or(UploadError::MissingDownloadUrl),
    }
}

/// アップロードのタイムアウト。100MiBを超えるファイルは長めに待つ。
pub fn upload_timeout(size_bytes: u64) -> Duration {
    if size_bytes > 100 * MIB {
        Duration::from_secs(300)
    } else {
        Duration::from_secs(120)
    }
}

/// 設定に従ってリモートファイルホストを構築する。無効化されている場合はNone。
pub fn build_remote_host(config: &GatewayConfig) -> anyhow::Result<Option<Box<dyn RemoteHost>>> {
    let host: Box<dyn RemoteHost> = match config.upload_backend {
        UploadBackend::Disabled => {
            tracing::info!("リモートアップロードは無効です（直接ダウンロードのみ）");
            return Ok(None);
        }
        UploadBackend::Gofile => Box::new(HttpFileHost::new(
            reqwest::Client::new(),
            config.upload_endpoint.clone(),
            ResponseShape::Json,
        )),
        UploadBackend::Text => Box::new(HttpFileHost::new(
            reqwest::Client::new(),
            config.upload_endpoint.clone(),
            ResponseShape::PlainText,
        )),
        #[cfg(feature = "vendor-aws")]
        UploadBackend::S3 => Box::new(S3FileHost::from_settings(&config.s3)?),
        #[cfg(not(feature = "vendor-aws"))]
        UploadBackend::S3 => {
            anyhow::bail!("UPLOAD_BACKEND=s3にはvendor-aws featureが必要です")
        }
    };
    tracing::info!(backend = ?config.upload_backend, endpoint = %config.upload_endpoint, "リモートアップロード先を設定");
    Ok(Some(host))
}
