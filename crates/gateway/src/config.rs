//! # Gateway設定・共有状態
//!
//! 環境変数からの設定読み込みとGatewayの共有状態の定義。
//! 設定は起動時に一度だけ構築され、`GatewayState` 経由でハンドラに渡される。

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;

use crate::publish::ArtifactStore;
use crate::storage::RemoteHost;

/// 1MiB
pub const MIB: u64 = 1024 * 1024;

/// リモートファイルホストの種別。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadBackend {
    /// リモートアップロードを行わない（直接ダウンロードのみ）
    Disabled,
    /// JSON (`status` + `data.downloadPage`) を返すホスト
    Gofile,
    /// URLをプレーンテキストで返すホスト
    Text,
    /// S3互換バケット + 署名付きGET URL
    S3,
}

impl FromStr for UploadBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "disabled" | "off" => Ok(Self::Disabled),
            "gofile" | "json" => Ok(Self::Gofile),
            "text" | "plain" => Ok(Self::Text),
            "s3" => Ok(Self::S3),
            other => anyhow::bail!("未知のUPLOAD_BACKENDです: {other}"),
        }
    }
}

/// Gatewayの設定。
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// 待ち受けアドレス
    pub bind_addr: String,
    /// 署名ツール（zsign互換）の実行ファイルパス
    pub tool_path: PathBuf,
    /// 署名済みIPAを保持するディレクトリ
    pub artifact_dir: PathBuf,
    /// リクエストごとのスクラッチディレクトリを作成する親ディレクトリ
    pub scratch_dir: PathBuf,
    /// リモートファイルホストの種別
    pub upload_backend: UploadBackend,
    /// リモートファイルホストのアップロードURL（Gofile/Text）
    pub upload_endpoint: String,
    /// これを超えるサイズの署名済みIPAはリモートにアップロードしない（バイト）
    pub upload_size_limit: u64,
    /// 署名ツールの最大待ち時間
    pub sign_timeout: Duration,
    /// multipartリクエストボディの上限（バイト）
    pub max_request_bytes: usize,
    /// 設定されている場合、/sign と /download に Bearer 認証を要求する
    pub api_key: Option<String>,
    /// S3バックエンドの接続設定（UPLOAD_BACKEND=s3 のときのみ使用）
    pub s3: S3Settings,
}

/// S3互換ストレージの接続設定。
#[derive(Clone)]
pub struct S3Settings {
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,
    /// オブジェクトキーの接頭辞
    pub prefix: String,
    /// Noneならエンドポイントから推定する
    pub region: Option<String>,
    /// 署名付きURLの有効期限（秒）
    pub presign_expiry_secs: u32,
}

impl Default for S3Settings {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:9000".to_string(),
            access_key: "minioadmin".to_string(),
            secret_key: "minioadmin".to_string(),
            bucket: "isign-artifacts".to_string(),
            prefix: "signed".to_string(),
            region: None,
            // 署名付きURLの上限（7日）
            presign_expiry_secs: 7 * 24 * 3600,
        }
    }
}

impl S3Settings {
    fn from_lookup<G>(get: &G) -> anyhow::Result<Self>
    where
        G: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Ok(Self {
            endpoint: get("S3_ENDPOINT").unwrap_or(defaults.endpoint),
            access_key: get("S3_ACCESS_KEY").unwrap_or(defaults.access_key),
            secret_key: get("S3_SECRET_KEY").unwrap_or(defaults.secret_key),
            bucket: get("S3_BUCKET").unwrap_or(defaults.bucket),
            prefix: get("S3_PREFIX").unwrap_or(defaults.prefix),
            region: get("S3_REGION"),
            presign_expiry_secs: parse_or(get, "S3_PRESIGN_EXPIRY_SECS", defaults.presign_expiry_secs)?,
        })
    }
}

// 認証情報をログに出さない
impl std::fmt::Debug for S3Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Settings")
            .field("endpoint", &self.endpoint)
            .field("bucket", &self.bucket)
            .field("prefix", &self.prefix)
            .field("region", &self.region)
            .field("presign_expiry_secs", &self.presign_expiry_secs)
            .finish_non_exhaustive()
    }
}

impl GatewayConfig {
    /// 環境変数から構築する。
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 任意のキー参照関数から構築する。未設定・空文字の値はデフォルトを使う。
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let bind_addr = match get("BIND_ADDR") {
            Some(addr) => addr,
            None => {
                let port: u16 = parse_or(&get, "PORT", 5000)?;
                format!("0.0.0.0:{port}")
            }
        };

        let upload_backend = match get("UPLOAD_BACKEND") {
            Some(v) => v.parse()?,
            None => UploadBackend::Gofile,
        };

        let upload_size_limit_mb: u64 = parse_or(&get, "UPLOAD_SIZE_LIMIT_MB", 100)?;
        let sign_timeout_secs: u64 = parse_or(&get, "SIGN_TIMEOUT_SECS", 600)?;
        let max_request_mb: u64 = parse_or(&get, "MAX_REQUEST_MB", 1024)?;
        if sign_timeout_secs == 0 {
            anyhow::bail!("SIGN_TIMEOUT_SECSは1以上である必要があります");
        }

        Ok(Self {
            bind_addr,
            tool_path: get("ZSIGN_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./zsign")),
            artifact_dir: get("ARTIFACT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("/tmp")),
            scratch_dir: get("SCRATCH_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(std::env::temp_dir),
            upload_backend,
            upload_endpoint: get("UPLOAD_ENDPOINT")
                .unwrap_or_else(|| "https://store1.gofile.io/uploadFile".to_string()),
            upload_size_limit: upload_size_limit_mb
                .checked_mul(MIB)
                .context("UPLOAD_SIZE_LIMIT_MBが大きすぎます")?,
            sign_timeout: Duration::from_secs(sign_timeout_secs),
            max_request_bytes: max_request_mb
                .checked_mul(MIB)
                .and_then(|bytes| usize::try_from(bytes).ok())
                .context("MAX_REQUEST_MBが大きすぎます")?,
            api_key: get("ISIGN_API_KEY"),
            s3: S3Settings::from_lookup(&get)?,
        })
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{key}の値が不正です ({raw}): {e}")),
        None => Ok(default),
    }
}

/// Gatewayの共有状態。
pub struct GatewayState {
    /// 起動時に確定した設定
    pub config: GatewayConfig,
    /// 署名済みIPAの永続ストア
    pub artifacts: ArtifactStore,
    /// リモートファイルホスト（トレイトで抽象化）。Noneならアップロードしない
    pub remote_host: Option<Box<dyn RemoteHost>>,
}

impl GatewayState {
    pub fn new(config: GatewayConfig, remote_host: Option<Box<dyn RemoteHost>>) -> Self {
        let artifacts = ArtifactStore::new(config.artifact_dir.clone());
        Self {
            config,
            artifacts,
            remote_host,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = GatewayConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:5000");
        assert_eq!(config.tool_path, PathBuf::from("./zsign"));
        assert_eq!(config.artifact_dir, PathBuf::from("/tmp"));
        assert_eq!(config.upload_backend, UploadBackend::Gofile);
        assert_eq!(config.upload_endpoint, "https://store1.gofile.io/uploadFile");
        assert_eq!(config.upload_size_limit, 100 * MIB);
        assert_eq!(config.sign_timeout, Duration::from_secs(600));
        assert_eq!(config.max_request_bytes, 1024 * 1024 * 1024);
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = GatewayConfig::from_lookup(lookup_from(&[
            ("PORT", "8080"),
            ("ZSIGN_PATH", "/opt/zsign/bin/zsign"),
            ("ARTIFACT_DIR", "/var/lib/isign"),
            ("UPLOAD_BACKEND", "text"),
            ("UPLOAD_ENDPOINT", "https://transfer.example/"),
            ("UPLOAD_SIZE_LIMIT_MB", "250"),
            ("SIGN_TIMEOUT_SECS", "30"),
            ("ISIGN_API_KEY", "secret"),
        ]))
        .unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:8080");
        assert_eq!(config.tool_path, PathBuf::from("/opt/zsign/bin/zsign"));
        assert_eq!(config.upload_backend, UploadBackend::Text);
        assert_eq!(config.upload_size_limit, 250 * MIB);
        assert_eq!(config.sign_timeout, Duration::from_secs(30));
        assert_eq!(config.api_key.as_deref(), Some("secret"));
    }

    /// BIND_ADDRはPORTより優先される
    #[test]
    fn test_bind_addr_wins_over_port() {
        let config = GatewayConfig::from_lookup(lookup_from(&[
            ("BIND_ADDR", "127.0.0.1:9000"),
            ("PORT", "8080"),
        ]))
        .unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:9000");
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(GatewayConfig::from_lookup(lookup_from(&[("PORT", "http")])).is_err());
        assert!(GatewayConfig::from_lookup(lookup_from(&[("UPLOAD_BACKEND", "ftp")])).is_err());
        assert!(GatewayConfig::from_lookup(lookup_from(&[("SIGN_TIMEOUT_SECS", "0")])).is_err());
    }

    /// 空文字のUPLOAD_BACKENDは未設定扱い（デフォルトのgofile）
    #[test]
    fn test_empty_upload_backend_uses_default() {
        let config = GatewayConfig::from_lookup(lookup_from(&[("UPLOAD_BACKEND", "")])).unwrap();
        assert_eq!(config.upload_backend, UploadBackend::Gofile);
        let config = GatewayConfig::from_lookup(lookup_from(&[("UPLOAD_BACKEND", "  ")])).unwrap();
        assert_eq!(config.upload_backend, UploadBackend::Gofile);
    }

    /// MiB換算でオーバーフローする値はpanicせずエラーになる
    #[test]
    fn test_oversized_limits_rejected() {
        let huge = u64::MAX.to_string();
        let err = GatewayConfig::from_lookup(lookup_from(&[("UPLOAD_SIZE_LIMIT_MB", huge.as_str())]))
            .unwrap_err();
        assert!(err.to_string().contains("UPLOAD_SIZE_LIMIT_MB"));
        let err = GatewayConfig::from_lookup(lookup_from(&[("MAX_REQUEST_MB", huge.as_str())]))
            .unwrap_err();
        assert!(err.to_string().contains("MAX_REQUEST_MB"));
    }

    #[test]
    fn test_s3_settings() {
        let config = GatewayConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.s3.bucket, "isign-artifacts");
        assert_eq!(config.s3.prefix, "signed");
        assert_eq!(config.s3.presign_expiry_secs, 7 * 24 * 3600);
        assert!(config.s3.region.is_none());

        let config = GatewayConfig::from_lookup(lookup_from(&[
            ("UPLOAD_BACKEND", "s3"),
            ("S3_ENDPOINT", "https://s3.ap-northeast-1.amazonaws.com"),
            ("S3_BUCKET", "builds"),
            ("S3_SECRET_KEY", "very-secret"),
            ("S3_REGION", ""),
            ("S3_PRESIGN_EXPIRY_SECS", "3600"),
        ]))
        .unwrap();
        assert_eq!(config.upload_backend, UploadBackend::S3);
        assert_eq!(config.s3.endpoint, "https://s3.ap-northeast-1.amazonaws.com");
        assert_eq!(config.s3.bucket, "builds");
        assert!(config.s3.region.is_none());
        assert_eq!(config.s3.presign_expiry_secs, 3600);
        assert!(!format!("{:?}", config.s3).contains("very-secret"));

        assert!(GatewayConfig::from_lookup(lookup_from(&[("S3_PRESIGN_EXPIRY_SECS", "soon")])).is_err());
    }

    #[test]
    fn test_upload_backend_disabled_aliases() {
        for raw in ["none", "disabled", "OFF"] {
            assert_eq!(raw.parse::<UploadBackend>().unwrap(), UploadBackend::Disabled);
        }
        assert_eq!("S3".parse::<UploadBackend>().unwrap(), UploadBackend::S3);
    }
}
