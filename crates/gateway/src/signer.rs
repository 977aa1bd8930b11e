//! # 署名ツール呼び出し
//!
//! zsign互換の外部ツールを子プロセスとして実行する。
//!
//! ```text
//! <tool> -k <key-path> -p <password> -m <profile-path> -o <output-path> <input-archive-path>
//! ```
//!
//! stdoutとstderrは同じログファイルに書かせ、ツール自身の出力順序のまま取り込む。
//! 非ゼロ終了時はその出力を一切加工せず `GatewayError::Signing` に載せる。
//! 待ち時間には上限があり、超過した子プロセスはkillされる。

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use crate::error::GatewayError;

/// 1回の署名に必要なステージ済みファイル群。
pub struct SignJob<'a> {
    pub key_path: &'a Path,
    pub password: &'a str,
    pub profile_path: &'a Path,
    pub input_path: &'a Path,
    pub output_path: &'a Path,
}

impl SignJob<'_> {
    /// ツールに渡す引数列。
    pub fn args(&self) -> Vec<OsString> {
        vec![
            "-k".into(),
            self.key_path.into(),
            "-p".into(),
            self.password.into(),
            "-m".into(),
            self.profile_path.into(),
            "-o".into(),
            self.output_path.into(),
            self.input_path.into(),
        ]
    }

    /// ログ用のコマンドライン表現。パスワードは伏せる。
    pub fn redacted_command_line(&self, tool: &Path) -> String {
        format!(
            "{} -k {} -p *** -m {} -o {} {}",
            tool.display(),
            self.key_path.display(),
            self.profile_path.display(),
            self.output_path.display(),
            self.input_path.display()
        )
    }
}

/// 外部署名ツールの呼び出し。
pub struct SignerInvoker {
    tool_path: PathBuf,
    timeout: Duration,
}

impl SignerInvoker {
    pub fn new(tool_path: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            tool_path: tool_path.into(),
            timeout,
        }
    }

    /// ツールを実行し、成功時は取り込んだ出力を返す。
    ///
    /// `log_path` はstdout/stderrの書き込み先で、呼び出し側のスクラッチディレクトリ内に置くこと。
    pub async fn run(&self, job: &SignJob<'_>, log_path: &Path) -> Result<String, GatewayError> {
        let log = std::fs::File::create(log_path)
            .map_err(|e| GatewayError::Internal(format!("Failed to create signing log: {e}")))?;
        let log_err = log
            .try_clone()
            .map_err(|e| GatewayError::Internal(format!("Failed to create signing log: {e}")))?;

        tracing::debug!(command = %job.redacted_command_line(&self.tool_path), "署名ツールを実行");

        let mut child = tokio::process::Command::new(&self.tool_path)
            .args(job.args())
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err))
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                GatewayError::Signing(format!(
                    "Failed to start signing tool {}: {e}",
                    self.tool_path.display()
                ))
            })?;

        let status = match tokio::time::timeout(self.timeout, child.wait()).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                return Err(GatewayError::Signing(format!(
                    "Failed to wait for signing tool: {e}"
                )))
            }
            Err(_) => {
                if let Err(e) = child.kill().await {
                    tracing::warn!(error = %e, "タイムアウトした署名ツールのkillに失敗");
                }
                let output = read_log(log_path).await;
                tracing::error!(timeout_secs = self.timeout.as_secs_f64(), "署名ツールがタイムアウトしました");
                return Err(GatewayError::Signing(format!(
                    "Signing tool timed out after {}s\n{output}",
                    self.timeout.as_secs_f64()
                )));
            }
        };

        let output = read_log(log_path).await;

        if !status.success() {
            tracing::error!(exit_code = ?status.code(), output = %output, "署名ツールが失敗しました");
            return Err(GatewayError::Signing(output));
        }

        if !tokio::fs::try_exists(job.output_path).await.unwrap_or(false) {
            return Err(GatewayError::Signing(format!(
                "Signing tool exited successfully but produced no output file\n{output}"
            )));
        }

        tracing::debug!(output = %output, "署名ツールが成功しました");
        Ok(output)
    }
}

async fn read_log(log_path: &Path) -> String {
    match tokio::fs::read(log_path).await {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) => {
            tracing::warn!(error = %e, "署名ログの読み取りに失敗");
            String::new()
        }
    }
}

/// 起動時に署名ツールへ実行権限を付与する。存在しない場合は警告のみ。
pub fn prepare_signing_tool(tool_path: &Path) {
    if !tool_path.exists() {
        tracing::warn!(path = %tool_path.display(), "署名ツールが見つかりません。/signは失敗します");
        return;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = std::fs::set_permissions(tool_path, std::fs::Permissions::from_mode(0o755)) {
            tracing::warn!(path = %tool_path.display(), error = %e, "署名ツールの実行権限付与に失敗");
        }
    }
}
