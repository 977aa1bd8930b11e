//! # HTTPアップロード型リモートファイルホスト
//!
//! multipartの `file` フィールドでファイルを送り、レスポンスからダウンロードURLを得る。
//! gofile.io のようなJSON応答と、transfer.sh のようなプレーンテキスト応答の両方に対応する。

use reqwest::multipart::{Form, Part};

use super::{parse_host_response, upload_timeout, RemoteHost, ResponseShape, UploadError};

pub struct HttpFileHost {
    client: reqwest::Client,
    endpoint: String,
    shape: ResponseShape,
}

impl HttpFileHost {
    pub fn new(client: reqwest::Client, endpoint: String, shape: ResponseShape) -> Self {
        Self {
            client,
            endpoint,
            shape,
        }
    }
}

#[async_trait::async_trait]
impl RemoteHost for HttpFileHost {
    async fn upload(
        &self,
        file_name: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<String, UploadError> {
        let size = bytes.len() as u64;
        tracing::debug!(file_name, size, endpoint = %self.endpoint, "リモートホストにアップロード中");

        let part = Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str(content_type)
            .map_err(|e| UploadError::Local(format!("invalid content type {content_type}: {e}")))?;
        let form = Form::new().part("file", part);

        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .timeout(upload_timeout(size))
            .send()
            .await
            .map_err(|e| UploadError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| UploadError::Network(format!("failed to read response: {e}")))?;

        let result = parse_host_response(self.shape, status, &body);
        match &result {
            Ok(url) => tracing::debug!(file_name, url = %url, "アップロード完了"),
            Err(e) => tracing::warn!(file_name, status, body = %body, error = %e, "アップロードに失敗"),
        }
        result
    }
}
