//! # isign Gateway
//!
//! iOSアプリ（IPA）の再署名を行うHTTPサービス。
//!
//! ## 役割
//! - multipartで受け取ったIPA・P12証明書・プロビジョニングプロファイルの検証
//! - IPAからのバンドル情報（bundle id・表示名）の抽出
//! - 外部署名ツール（zsign互換）による再署名
//! - 署名済みIPAの永続化と直接ダウンロード
//! - リモートファイルホストへのミラーとOTAインストール用マニフェストの発行（オプション）
//!
//! ## API エンドポイント
//! - `GET /` — アップロードフォーム
//! - `GET /health` — 死活監視
//! - `POST /sign` — IPA署名
//! - `GET /download/{filename}` — 署名済みIPAのダウンロード

mod auth;
mod config;
mod endpoints;
mod error;
mod inspect;
mod manifest;
mod publish;
mod scratch;
mod signer;
mod storage;
mod validate;

use std::sync::Arc;

use config::{GatewayConfig, GatewayState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = GatewayConfig::from_env()?;

    signer::prepare_signing_tool(&config.tool_path);

    tokio::fs::create_dir_all(&config.artifact_dir)
        .await
        .map_err(|e| {
            anyhow::anyhow!(
                "ARTIFACT_DIRを作成できません ({}): {e}",
                config.artifact_dir.display()
            )
        })?;

    let remote_host = storage::build_remote_host(&config)?;

    if config.api_key.is_none() {
        tracing::warn!("ISIGN_API_KEYが未設定です。/signと/downloadは認証なしで公開されます");
    }

    tracing::info!(
        tool = %config.tool_path.display(),
        artifact_dir = %config.artifact_dir.display(),
        scratch_dir = %config.scratch_dir.display(),
        sign_timeout_secs = config.sign_timeout.as_secs(),
        "Gateway設定を読み込みました"
    );

    let addr = config.bind_addr.clone();
    let state = Arc::new(GatewayState::new(config, remote_host));
    let app = endpoints::router(state);

    tracing::info!("Gatewayを {} で起動します", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
