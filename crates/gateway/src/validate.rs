//! # リクエスト検証
//!
//! POST /sign のmultipartフォームを読み取り、4つの必須入力
//! （IPA・P12・プロビジョニングプロファイル・パスワード）の有無と拡張子を検証する。
//! 検証は構文的なもの（拡張子チェック）に限り、内容は検証しない。
//! この段階ではディスクに何も書き込まない。

use axum::body::Bytes;
use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::Multipart;
use axum::http::StatusCode;

use crate::error::GatewayError;

/// multipartフィールド名
pub const FIELD_ARCHIVE: &str = "ipa";
pub const FIELD_SIGNING_KEY: &str = "p12";
pub const FIELD_PROFILE: &str = "provision";
pub const FIELD_PASSWORD: &str = "password";

/// アップロードされた1ファイル。
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// クライアントが送ったファイル名（未指定なら空文字）
    pub file_name: String,
    pub bytes: Bytes,
}

impl UploadedFile {
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes: bytes.into(),
        }
    }
}

/// 検証前のフォーム内容。
#[derive(Debug, Default)]
pub struct SigningForm {
    pub archive: Option<UploadedFile>,
    pub signing_key: Option<UploadedFile>,
    pub profile: Option<UploadedFile>,
    pub password: Option<String>,
}

/// 検証済みの署名リクエスト。ステージング後は破棄される。
pub struct SigningRequest {
    pub archive: UploadedFile,
    pub signing_key: UploadedFile,
    pub profile: UploadedFile,
    pub password: String,
}

// パスワードをログに出さない
impl std::fmt::Debug for SigningRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningRequest")
            .field("archive", &self.archive.file_name)
            .field("signing_key", &self.signing_key.file_name)
            .field("profile", &self.profile.file_name)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl SigningForm {
    /// multipartボディを読み取る。未知のフィールドは読み捨てる。
    pub async fn from_multipart(mut multipart: Multipart) -> Result<Self, GatewayError> {
        let mut form = SigningForm::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(form_error)?
        {
            let name = field.name().unwrap_or_default().to_string();
            let file_name = field.file_name().unwrap_or_default().to_string();

            match name.as_str() {
                FIELD_ARCHIVE | FIELD_SIGNING_KEY | FIELD_PROFILE => {
                    let bytes = field.bytes().await.map_err(form_error)?;
                    let file = UploadedFile { file_name, bytes };
                    match name.as_str() {
                        FIELD_ARCHIVE => form.archive = Some(file),
                        FIELD_SIGNING_KEY => form.signing_key = Some(file),
                        _ => form.profile = Some(file),
                    }
                }
                FIELD_PASSWORD => {
                    let text = field.text().await.map_err(form_error)?;
                    form.password = Some(text);
                }
                other => {
                    tracing::debug!(field = %other, "未知のフォームフィールドを無視");
                }
            }
        }

        Ok(form)
    }

    /// 必須入力の有無と拡張子を検証する。
    pub fn validate(self) -> Result<SigningRequest, GatewayError> {
        let (Some(archive), Some(signing_key), Some(profile), Some(password)) =
            (self.archive, self.signing_key, self.profile, self.password)
        else {
            return Err(invalid("Missing one or more required fields"));
        };
        if password.is_empty() {
            return Err(invalid("Missing one or more required fields"));
        }

        check_file(&archive, "No IPA file selected", "IPA file is empty")?;
        check_file(&signing_key, "No P12 certificate selected", "P12 certificate is empty")?;
        check_file(&profile, "No provisioning profile selected", "Provisioning profile is empty")?;

        if !has_extension(&archive.file_name, ".ipa") {
            return Err(invalid("IPA file must have .ipa extension"));
        }
        if !has_extension(&signing_key.file_name, ".p12") {
            return Err(invalid("Certificate must have .p12 extension"));
        }
        if !has_extension(&profile.file_name, ".mobileprovision") {
            return Err(invalid(
                "Provisioning profile must have .mobileprovision extension",
            ));
        }

        Ok(SigningRequest {
            archive,
            signing_key,
            profile,
            password,
        })
    }
}

/// multipartとして受け取れなかったリクエスト（Content-Typeの不一致など）。
pub fn rejected_form(rejection: MultipartRejection) -> GatewayError {
    GatewayError::Validation(format!("Malformed form data: {}", rejection.body_text()))
}

/// ボディ上限の超過は413、それ以外の読み取り失敗は不正な入力として扱う。
fn form_error(e: MultipartError) -> GatewayError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        GatewayError::PayloadTooLarge(e.body_text())
    } else {
        GatewayError::Validation(format!("Malformed form data: {}", e.body_text()))
    }
}

fn invalid(msg: &str) -> GatewayError {
    GatewayError::Validation(msg.to_string())
}

fn check_file(file: &UploadedFile, no_name: &str, empty: &str) -> Result<(), GatewayError> {
    if file.file_name.trim().is_empty() {
        return Err(invalid(no_name));
    }
    if file.bytes.is_empty() {
        return Err(invalid(empty));
    }
    Ok(())
}

/// 拡張子の比較はASCII大文字小文字を区別しない。
pub fn has_extension(file_name: &str, ext: &str) -> bool {
    file_name.len() > ext.len()
        && file_name
            .get(file_name.len() - ext.len()..)
            .is_some_and(|tail| tail.eq_ignore_ascii_case(ext))
}
