//! # 署名済みIPAの公開
//!
//! 署名ツールの出力を永続ディレクトリにコピーし、アップロードポリシーに従って
//! リモートファイルホストへのミラーとインストールURLの構築を行う。
//!
//! リモート側の失敗はリクエストを失敗させない。直接ダウンロードのみの結果に縮退し、
//! 理由を `upload_error` に残す。

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use isign_types::BundleInfo;
use sha2::{Digest, Sha256};

use crate::config::{GatewayState, MIB};
use crate::error::GatewayError;
use crate::manifest::{build_install_manifest, itms_services_url};
use crate::storage::{RemoteHost, UploadError};
use crate::validate::has_extension;

/// 永続化されたアーティファクトの拡張子
pub const ARTIFACT_EXTENSION: &str = ".ipa";

/// 永続ディレクトリに置かれた署名済みIPA。
#[derive(Debug, Clone)]
pub struct SignedArtifact {
    /// `signed_<bundle id>_<unix millis>.ipa`
    pub filename: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    /// SHA-256（Hex）
    pub sha256: String,
}

impl SignedArtifact {
    /// MB単位のサイズ（小数第2位で丸め）
    pub fn size_mb(&self) -> f64 {
        (self.size_bytes as f64 / MIB as f64 * 100.0).round() / 100.0
    }

    pub fn direct_download_path(&self) -> String {
        format!("/download/{}", self.filename)
    }
}

/// 署名済みIPAの永続ストア。ファイル名をキーに書き込み・読み出しを行う。
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `source` を一意なファイル名で永続ディレクトリにコピーする。
    pub async fn persist(&self, source: &Path, bundle_id: &str) -> Result<SignedArtifact, GatewayError> {
        let dir = self.dir.clone();
        let source = source.to_path_buf();
        let bundle_id = bundle_id.to_string();
        tokio::task::spawn_blocking(move || persist_blocking(&dir, &source, &bundle_id, now_millis()))
            .await
            .map_err(|e| GatewayError::Internal(format!("persist task failed: {e}")))?
    }

    /// ダウンロード要求のファイル名を検証し、実ファイルのパスを返す。
    ///
    /// 拡張子が `.ipa` でないものは、同名ファイルが存在してもBadRequestとする。
    pub fn resolve(&self, filename: &str) -> Result<PathBuf, GatewayError> {
        if filename.is_empty()
            || filename.contains(['/', '\\', '\0'])
            || filename.starts_with('.')
        {
            return Err(GatewayError::BadRequest("Invalid filename".to_string()));
        }
        if !has_extension(filename, ARTIFACT_EXTENSION) {
            return Err(GatewayError::BadRequest(
                "Invalid file type requested".to_string(),
            ));
        }

        let path = self.dir.join(filename);
        if !path.is_file() {
            return Err(GatewayError::NotFound(filename.to_string()));
        }
        Ok(path)
    }
}

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
}

/// ファイル名に使えない文字を `_` に置き換える。
fn sanitize_component(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = cleaned.trim_matches('.');
    if trimmed.is_empty() {
        "app".to_string()
    } else {
        trimmed.to_string()
    }
}

pub fn artifact_filename(bundle_id: &str, millis: u128) -> String {
    format!("signed_{}_{millis}{ARTIFACT_EXTENSION}", sanitize_component(bundle_id))
}

/// create-newで排他的にファイルを確保する。同名が既にあればタイムスタンプを進めて再試行する。
fn persist_blocking(
    dir: &Path,
    source: &Path,
    bundle_id: &str,
    millis: u128,
) -> Result<SignedArtifact, GatewayError> {
    std::fs::create_dir_all(dir).map_err(|e| {
        GatewayError::Storage(format!("Failed to create {}: {e}", dir.display()))
    })?;

    let mut stamp = millis;
    let (filename, path, dest) = loop {
        let filename = artifact_filename(bundle_id, stamp);
        let path = dir.join(&filename);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => break (filename, path, file),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => stamp += 1,
            Err(e) => {
                return Err(GatewayError::Storage(format!(
                    "Failed to create {}: {e}",
                    path.display()
                )))
            }
        }
    };

    match copy_and_hash(source, dest) {
        Ok((size_bytes, digest)) => {
            tracing::info!(filename = %filename, size_bytes, "署名済みIPAを保存");
            Ok(SignedArtifact {
                filename,
                path,
                size_bytes,
                sha256: hex::encode(digest),
            })
        }
        Err(e) => {
            let _ = std::fs::remove_file(&path);
            Err(GatewayError::Storage(format!(
                "Failed to copy signed output to {}: {e}",
                path.display()
            )))
        }
    }
}

fn copy_and_hash(source: &Path, mut dest: File) -> io::Result<(u64, Vec<u8>)> {
    let mut reader = File::open(source)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];
    let mut total = 0u64;
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        dest.write_all(&buf[..n])?;
        total += n as u64;
    }
    dest.flush()?;
    Ok((total, hasher.finalize().to_vec()))
}

/// 公開処理の結果。
#[derive(Debug)]
pub struct PublishOutcome {
    pub artifact: SignedArtifact,
    /// リモートミラー成功時のみ
    pub itms_services_url: Option<String>,
    /// リモートアップロードをスキップ・失敗した理由
    pub upload_error: Option<String>,
}

/// 署名済みIPAを永続化し、ポリシーに従ってリモートにミラーする。
pub async fn publish(
    state: &GatewayState,
    signed_output: &Path,
    info: &BundleInfo,
) -> Result<PublishOutcome, GatewayError> {
    let artifact = state.artifacts.persist(signed_output, &info.bundle_id).await?;

    let Some(host) = state.remote_host.as_deref() else {
        return Ok(PublishOutcome {
            artifact,
            itms_services_url: None,
            upload_error: None,
        });
    };

    let limit = state.config.upload_size_limit;
    if artifact.size_bytes > limit {
        tracing::info!(size_bytes = artifact.size_bytes, limit, "サイズ上限超過のためリモートアップロードをスキップ");
        let reason = format!(
            "Signed IPA is {} MB, above the {} MB upload limit; remote upload skipped",
            artifact.size_mb(),
            limit / MIB
        );
        return Ok(PublishOutcome {
            artifact,
            itms_services_url: None,
            upload_error: Some(reason),
        });
    }

    match mirror_to_remote(host, &artifact, info).await {
        Ok(itms) => Ok(PublishOutcome {
            artifact,
            itms_services_url: Some(itms),
            upload_error: None,
        }),
        Err(e) => {
            tracing::warn!(error = %e, "リモートアップロードに失敗。直接ダウンロードに縮退します");
            Ok(PublishOutcome {
                artifact,
                itms_services_url: None,
                upload_error: Some(e.to_string()),
            })
        }
    }
}

/// IPAとマニフェストをアップロードし、インストールURLを返す。
async fn mirror_to_remote(
    host: &dyn RemoteHost,
    artifact: &SignedArtifact,
    info: &BundleInfo,
) -> Result<String, UploadError> {
    let bytes = tokio::fs::read(&artifact.path)
        .await
        .map_err(|e| UploadError::Local(format!("failed to read signed IPA: {e}")))?;
    let ipa_url = host
        .upload(&artifact.filename, "application/octet-stream", bytes)
        .await?;
    tracing::info!(url = %ipa_url, "IPAのアップロード完了");

    let manifest = build_install_manifest(info, &ipa_url)
        .map_err(|e| UploadError::Local(format!("failed to build install manifest: {e}")))?;
    let manifest_name = format!(
        "{}.plist",
        artifact
            .filename
            .strip_suffix(ARTIFACT_EXTENSION)
            .unwrap_or(&artifact.filename)
    );
    let manifest_url = host.upload(&manifest_name, "application/xml", manifest).await?;
    tracing::info!(url = %manifest_url, "マニフェストのアップロード完了");

    Ok(itms_services_url(&manifest_url))
}
