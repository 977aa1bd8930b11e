//! POST /sign ハンドラ本体。

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, State};
use axum::Json;
use isign_types::{AppInfo, BundleInfo, SignResponse};
use tracing::Instrument;

use crate::config::GatewayState;
use crate::error::GatewayError;
use crate::inspect::inspect_archive;
use crate::publish::{publish, PublishOutcome};
use crate::scratch::ScratchDir;
use crate::signer::{SignJob, SignerInvoker};
use crate::validate::{rejected_form, SigningForm, SigningRequest};

/// ステージ済みファイルのスクラッチ内パス
struct StagedInputs {
    archive: PathBuf,
    signing_key: PathBuf,
    profile: PathBuf,
    output: PathBuf,
    log: PathBuf,
}

/// POST /sign — IPA署名。
///
/// multipartフィールド `ipa`, `p12`, `provision`, `password` を受け取る。
/// multipartでないリクエストも共通のエラーJSONで返す。
pub async fn handle_sign(
    State(state): State<Arc<GatewayState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<SignResponse>, GatewayError> {
    let request_id = uuid::Uuid::new_v4();
    let span = tracing::info_span!("sign", %request_id);

    async move {
        tracing::info!("署名リクエストを受信");
        let result = async {
            let multipart = multipart.map_err(rejected_form)?;
            let request = SigningForm::from_multipart(multipart).await?.validate()?;
            sign_workflow(&state, request).await
        }
        .await;

        match &result {
            Ok(response) => tracing::info!(
                bundle_id = %response.app_info.bundle_id,
                direct_download = %response.direct_download,
                remote = response.itms_services_url.is_some(),
                "署名完了"
            ),
            Err(e) => tracing::error!(error = %e, "署名リクエストが失敗しました"),
        }
        result.map(Json)
    }
    .instrument(span)
    .await
}

/// 検証済みリクエストを処理する。スクラッチディレクトリはどの経路でも閉じられる。
pub async fn sign_workflow(
    state: &GatewayState,
    request: SigningRequest,
) -> Result<SignResponse, GatewayError> {
    let scratch = ScratchDir::new_in(&state.config.scratch_dir, "isign-job-")?;
    let result = run_pipeline(state, request, &scratch).await;
    scratch.close().await;
    result
}

async fn run_pipeline(
    state: &GatewayState,
    request: SigningRequest,
    scratch: &ScratchDir,
) -> Result<SignResponse, GatewayError> {
    let staged = stage_inputs(&request, scratch).await?;
    let SigningRequest { password, .. } = request;

    let archive = staged.archive.clone();
    let scratch_parent = scratch.path().to_path_buf();
    let info = tokio::task::spawn_blocking(move || inspect_archive(&archive, &scratch_parent))
        .await
        .map_err(|e| GatewayError::Internal(format!("archive inspection task failed: {e}")))??;

    let invoker = SignerInvoker::new(&state.config.tool_path, state.config.sign_timeout);
    let job = SignJob {
        key_path: &staged.signing_key,
        password: &password,
        profile_path: &staged.profile,
        input_path: &staged.archive,
        output_path: &staged.output,
    };
    invoker.run(&job, &staged.log).await?;

    let outcome = publish(state, &staged.output, &info).await?;
    Ok(build_response(info, outcome))
}

/// アップロードされた3ファイルをスクラッチディレクトリに書き出す。
async fn stage_inputs(
    request: &SigningRequest,
    scratch: &ScratchDir,
) -> Result<StagedInputs, GatewayError> {
    let staged = StagedInputs {
        archive: scratch.join("input.ipa"),
        signing_key: scratch.join("cert.p12"),
        profile: scratch.join("profile.mobileprovision"),
        output: scratch.join("signed.ipa"),
        log: scratch.join("zsign.log"),
    };

    for (path, file) in [
        (&staged.archive, &request.archive),
        (&staged.signing_key, &request.signing_key),
        (&staged.profile, &request.profile),
    ] {
        tokio::fs::write(path, &file.bytes).await.map_err(|e| {
            GatewayError::Internal(format!("Failed to stage {}: {e}", file.file_name))
        })?;
    }

    tracing::debug!(
        archive_bytes = request.archive.bytes.len(),
        "入力ファイルをステージング"
    );
    Ok(staged)
}

fn build_response(info: BundleInfo, outcome: PublishOutcome) -> SignResponse {
    let PublishOutcome {
        artifact,
        itms_services_url,
        upload_error,
    } = outcome;

    let (message, note) = if itms_services_url.is_some() {
        ("App signed and uploaded successfully", None)
    } else {
        (
            "App signed successfully! Direct download is ready.",
            Some("Download the signed IPA file directly from the link above".to_string()),
        )
    };

    SignResponse {
        success: true,
        message: message.to_string(),
        direct_download: artifact.direct_download_path(),
        itms_services_url,
        app_info: AppInfo {
            name: info.name,
            bundle_id: info.bundle_id,
            size_mb: artifact.size_mb(),
            size_bytes: artifact.size_bytes,
            sha256: artifact.sha256,
        },
        note,
        upload_error,
    }
}
