//! # スクラッチディレクトリ
//!
//! リクエストごとの一時ディレクトリ。正常系・エラー系のどちらでも
//! 呼び出し側が明示的に `close` し、削除失敗はログに残す。
//! リクエストがキャンセルされてfutureごと破棄された場合は `TempDir` のDropで削除される。

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::error::GatewayError;

pub struct ScratchDir {
    dir: TempDir,
}

impl ScratchDir {
    /// `parent` 配下に `prefix` で始まる一時ディレクトリを作成する。
    pub fn new_in(parent: &Path, prefix: &str) -> Result<Self, GatewayError> {
        std::fs::create_dir_all(parent).map_err(|e| {
            GatewayError::Internal(format!(
                "Failed to create scratch root {}: {e}",
                parent.display()
            ))
        })?;
        let dir = tempfile::Builder::new()
            .prefix(prefix)
            .tempdir_in(parent)
            .map_err(|e| GatewayError::Internal(format!("Failed to create temp directory: {e}")))?;
        tracing::debug!(path = %dir.path().display(), "スクラッチディレクトリを作成");
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn join(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// 同期コンテキスト（spawn_blocking内）から削除する。
    pub fn close_blocking(self) {
        let path = self.dir.path().to_path_buf();
        if let Err(e) = self.dir.close() {
            tracing::warn!(path = %path.display(), error = %e, "スクラッチディレクトリの削除に失敗");
        }
    }

    /// 非同期コンテキストから削除する。削除はブロッキングプールで行う。
    pub async fn close(self) {
        let path = self.dir.path().to_path_buf();
        if let Err(e) = tokio::task::spawn_blocking(move || self.close_blocking()).await {
            tracing::warn!(path = %path.display(), error = %e, "スクラッチディレクトリの削除タスクが異常終了");
        }
    }
}
