//! # S3互換リモートファイルホスト実装
//!
//! AWS S3, MinIO, Cloudflare R2 等のS3互換APIにアップロードし、
//! 署名付きGET URLを公開ダウンロードURLとして返す。

use super::{RemoteHost, UploadError};
use crate::config::S3Settings;

/// S3互換ストレージによるリモートファイルホスト実装。
pub struct S3FileHost {
    bucket: s3::Bucket,
    /// オブジェクトキーの接頭辞
    prefix: String,
    /// 署名付きURLの有効期限（秒）
    presign_expiry_secs: u32,
}

impl S3FileHost {
    pub fn new(bucket: s3::Bucket, prefix: String, presign_expiry_secs: u32) -> Self {
        Self {
            bucket,
            prefix,
            presign_expiry_secs,
        }
    }

    /// S3互換バケットを初期化する。
    fn init_bucket(
        endpoint: &str,
        region: Option<String>,
        access_key: &str,
        secret_key: &str,
        bucket_name: &str,
    ) -> anyhow::Result<s3::Bucket> {
        let region = s3::Region::Custom {
            region: region.unwrap_or_else(|| detect_region(endpoint)),
            endpoint: endpoint.to_string(),
        };

        let credentials = s3::creds::Credentials::new(
            Some(access_key),
            Some(secret_key),
            None,
            None,
            None,
        )?;

        let bucket = s3::Bucket::new(bucket_name, region, credentials)?.with_path_style();

        Ok(*bucket)
    }

    /// 起動時に確定した設定から構築する。
    pub fn from_settings(settings: &S3Settings) -> anyhow::Result<Self> {
        let bucket = Self::init_bucket(
            &settings.endpoint,
            settings.region.clone(),
            &settings.access_key,
            &settings.secret_key,
            &settings.bucket,
        )?;
        tracing::info!(s3_endpoint = %settings.endpoint, bucket = %settings.bucket, "S3アップロード先を設定");

        Ok(Self::new(
            bucket,
            settings.prefix.clone(),
            settings.presign_expiry_secs,
        ))
    }

    fn object_key(&self, file_name: &str) -> String {
        format!(
            "{}/{}/{}",
            self.prefix.trim_end_matches('/'),
            uuid::Uuid::new_v4(),
            file_name
        )
    }
}

/// AWS S3エンドポイント（s3.REGION.amazonaws.com）からリージョンを推定する。
/// 非AWSエンドポイントではus-east-1を使う。
fn detect_region(endpoint: &str) -> String {
    endpoint
        .find("s3.")
        .and_then(|start| {
            let rest = &endpoint[start + 3..];
            rest.find(".amazonaws.com").map(|end| rest[..end].to_string())
        })
        .filter(|region| !region.is_empty())
        .unwrap_or_else(|| "us-east-1".to_string())
}

#[async_trait::async_trait]
impl RemoteHost for S3FileHost {
    async fn upload(
        &self,
        file_name: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<String, UploadError> {
        let key = self.object_key(file_name);

        let response = self
            .bucket
            .put_object_with_content_type(&key, &bytes, content_type)
            .await
            .map_err(|e| UploadError::Network(format!("S3 put failed: {e}")))?;

        let status = response.status_code();
        if status != 200 {
            return Err(UploadError::Status {
                status,
                body: String::from_utf8_lossy(response.as_slice()).into_owned(),
            });
        }

        self.bucket
            .presign_get(&key, self.presign_expiry_secs, None)
            .await
            .map_err(|e| UploadError::Host(format!("failed to presign download URL: {e}")))
    }
}
