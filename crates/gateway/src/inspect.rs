//! # IPA解析
//!
//! ステージ済みのIPAを専用のスクラッチディレクトリに展開し、
//! `Payload/*.app/Info.plist` からバンドルIDと表示名を取り出す。
//! スクラッチディレクトリは成否にかかわらずこのステップの終わりで削除される。
//!
//! 展開とplist解析はブロッキング処理のため、呼び出し側で `spawn_blocking` すること。

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use isign_types::BundleInfo;
use zip::ZipArchive;

use crate::error::GatewayError;
use crate::scratch::ScratchDir;

/// 表示名が見つからない場合のプレースホルダ
pub const UNKNOWN_APP_NAME: &str = "UnknownApp";

/// IPAを `scratch_parent` 配下に展開してバンドル情報を返す。
pub fn inspect_archive(archive_path: &Path, scratch_parent: &Path) -> Result<BundleInfo, GatewayError> {
    let scratch = ScratchDir::new_in(scratch_parent, "isign-extract-")?;
    let result = extract_archive(archive_path, scratch.path())
        .and_then(|()| find_app_bundle(scratch.path()))
        .and_then(|app| read_bundle_info(&app.join("Info.plist")));
    scratch.close_blocking();

    if let Ok(info) = &result {
        tracing::info!(bundle_id = %info.bundle_id, name = %info.name, "バンドル情報を抽出");
    }
    result
}

/// ZIPを展開する。エントリ名は展開先の外に出ないよう正規化される。
fn extract_archive(archive_path: &Path, dest: &Path) -> Result<(), GatewayError> {
    let file = File::open(archive_path)
        .map_err(|e| GatewayError::Extraction(format!("Failed to open archive: {e}")))?;
    let mut archive = ZipArchive::new(file)
        .map_err(|e| GatewayError::Extraction(format!("Archive is not a valid zip file: {e}")))?;
    tracing::debug!(entries = archive.len(), "IPAを展開中");
    archive
        .extract(dest)
        .map_err(|e| GatewayError::Extraction(format!("Failed to extract archive: {e}")))
}

/// `Payload/` 直下の `.app` ディレクトリを探す。複数ある場合は名前順で最初のもの。
fn find_app_bundle(root: &Path) -> Result<PathBuf, GatewayError> {
    let payload = root.join("Payload");
    let entries = fs::read_dir(&payload)
        .map_err(|_| GatewayError::Extraction("No Payload folder found in archive".to_string()))?;

    let mut apps: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_dir() && path.extension().is_some_and(|ext| ext == "app"))
        .collect();
    apps.sort();

    if apps.len() > 1 {
        tracing::warn!(count = apps.len(), "Payload内に複数の.appがあります。最初のものを使用します");
    }
    apps.into_iter()
        .next()
        .ok_or_else(|| GatewayError::Extraction("No .app folder found in Payload".to_string()))
}

/// Info.plist（XML・バイナリどちらでも可）を読み取る。
pub fn read_bundle_info(info_plist: &Path) -> Result<BundleInfo, GatewayError> {
    let value = plist::Value::from_file(info_plist)
        .map_err(|e| GatewayError::Extraction(format!("Failed to parse Info.plist: {e}")))?;
    bundle_info_from_plist(&value)
}

fn bundle_info_from_plist(value: &plist::Value) -> Result<BundleInfo, GatewayError> {
    let dict = value
        .as_dictionary()
        .ok_or_else(|| GatewayError::Extraction("Info.plist root is not a dictionary".to_string()))?;

    let string_field = |key: &str| {
        dict.get(key)
            .and_then(plist::Value::as_string)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    let bundle_id = string_field("CFBundleIdentifier").ok_or_else(|| {
        GatewayError::Extraction("CFBundleIdentifier is missing from Info.plist".to_string())
    })?;
    let name = string_field("CFBundleDisplayName")
        .or_else(|| string_field("CFBundleName"))
        .unwrap_or_else(|| UNKNOWN_APP_NAME.to_string());

    Ok(BundleInfo { bundle_id, name })
}
