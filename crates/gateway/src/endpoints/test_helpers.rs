//! # テスト用共通ヘルパー
//!
//! テスト用IPAの生成、署名ツールの代役スクリプト、モックのリモートホストなど。

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use crate::config::{GatewayConfig, GatewayState, S3Settings, UploadBackend, MIB};
use crate::storage::{RemoteHost, UploadError};

/// 署名ツールの代役: `-o` の出力先に入力をコピーして成功する
pub const SUCCESS_TOOL: &str = r#"#!/bin/sh
out=""
while [ $# -gt 1 ]; do
  case "$1" in
    -o) out="$2"; shift 2 ;;
    -k|-p|-m) shift 2 ;;
    *) shift ;;
  esac
done
cp "$1" "$out" || exit 3
echo "Signed OK!"
"#;

/// 署名ツールの代役: stdoutとstderrに書いて終了コード1
pub const FAILING_TOOL: &str = r#"#!/bin/sh
printf '>>> Signing:\t/tmp/input.ipa\n'
printf ">>> Can't Load P12 File!\n" >&2
exit 1
"#;

/// 署名ツールの代役: 終了しない
pub const HANGING_TOOL: &str = "#!/bin/sh\necho starting\nexec sleep 30\n";

/// 実行権限付きのスクリプトを書き出す。
#[cfg(unix)]
pub fn write_tool(dir: &Path, name: &str, script: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, script).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Info.plist（XML）を生成する。Noneのキーは含めない。
pub fn info_plist_xml(
    bundle_id: Option<&str>,
    display_name: Option<&str>,
    bundle_name: Option<&str>,
) -> Vec<u8> {
    let mut dict = plist::Dictionary::new();
    if let Some(id) = bundle_id {
        dict.insert("CFBundleIdentifier".to_string(), plist::Value::String(id.to_string()));
    }
    if let Some(name) = display_name {
        dict.insert("CFBundleDisplayName".to_string(), plist::Value::String(name.to_string()));
    }
    if let Some(name) = bundle_name {
        dict.insert("CFBundleName".to_string(), plist::Value::String(name.to_string()));
    }
    dict.insert("CFBundleShortVersionString".to_string(), plist::Value::String("1.0".to_string()));

    let mut buf = Vec::new();
    plist::to_writer_xml(&mut buf, &plist::Value::Dictionary(dict)).unwrap();
    buf
}

/// `Payload/<app_name>.app/Info.plist` を含むIPAを生成する。
pub fn build_ipa(app_name: &str, info_plist: &[u8]) -> Vec<u8> {
    let mut zip = ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();

    zip.add_directory("Payload/", options).unwrap();
    zip.add_directory(format!("Payload/{app_name}.app/"), options).unwrap();
    zip.start_file(format!("Payload/{app_name}.app/Info.plist"), options)
        .unwrap();
    zip.write_all(info_plist).unwrap();
    zip.start_file(format!("Payload/{app_name}.app/{app_name}"), options)
        .unwrap();
    zip.write_all(b"MACHO_PLACEHOLDER").unwrap();

    zip.finish().unwrap().into_inner()
}

/// `com.example.app` / `Example` のIPA
pub fn example_ipa() -> Vec<u8> {
    build_ipa(
        "Example",
        &info_plist_xml(Some("com.example.app"), Some("Example"), Some("ExampleApp")),
    )
}

/// Payload/ はあるが .app が無いIPA
pub fn build_ipa_without_app() -> Vec<u8> {
    let mut zip = ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();
    zip.add_directory("Payload/", options).unwrap();
    zip.start_file("Payload/README.txt", options).unwrap();
    zip.write_all(b"no bundle here").unwrap();
    zip.finish().unwrap().into_inner()
}

/// `root/artifacts` と `root/scratch` を使うテスト用設定。リモートホストはテスト側で渡す。
pub fn test_config(root: &Path, tool_path: &Path) -> GatewayConfig {
    GatewayConfig {
        bind_addr: "127.0.0.1:0".to_string(),
        tool_path: tool_path.to_path_buf(),
        artifact_dir: root.join("artifacts"),
        scratch_dir: root.join("scratch"),
        upload_backend: UploadBackend::Disabled,
        upload_endpoint: String::new(),
        upload_size_limit: 100 * MIB,
        sign_timeout: Duration::from_secs(10),
        max_request_bytes: 64 * MIB as usize,
        api_key: None,
        s3: S3Settings::default(),
    }
}

pub fn test_state(config: GatewayConfig, remote_host: Option<Box<dyn RemoteHost>>) -> Arc<GatewayState> {
    Arc::new(GatewayState::new(config, remote_host))
}

/// ディレクトリ内のエントリ数（存在しなければ0）
pub fn entry_count(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|it| it.count()).unwrap_or(0)
}

/// モックホストが受け取った1回分のアップロード
#[derive(Debug, Clone)]
pub struct RecordedUpload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
    /// このアップロードに対して返したURL
    pub url: String,
}

/// アップロード内容を記録し、`https://files.example/<n>/<file_name>` を返すモックホスト。
pub struct MockRemoteHost {
    uploads: Arc<Mutex<Vec<RecordedUpload>>>,
    /// n回目（0始まり）のアップロードをこのエラーで失敗させる
    fail_on: Option<(usize, UploadError)>,
}

impl MockRemoteHost {
    pub fn new() -> Self {
        Self {
            uploads: Arc::new(Mutex::new(Vec::new())),
            fail_on: None,
        }
    }

    pub fn failing_on(index: usize, error: UploadError) -> Self {
        Self {
            fail_on: Some((index, error)),
            ..Self::new()
        }
    }

    pub fn uploads(&self) -> Arc<Mutex<Vec<RecordedUpload>>> {
        self.uploads.clone()
    }
}

#[async_trait::async_trait]
impl RemoteHost for MockRemoteHost {
    async fn upload(
        &self,
        file_name: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<String, UploadError> {
        let mut uploads = self.uploads.lock().unwrap();
        let index = uploads.len();
        if let Some((fail_index, error)) = &self.fail_on {
            if *fail_index == index {
                return Err(error.clone());
            }
        }
        let url = format!("https://files.example/{index}/{file_name}");
        uploads.push(RecordedUpload {
            file_name: file_name.to_string(),
            content_type: content_type.to_string(),
            bytes,
            url: url.clone(),
        });
        Ok(url)
    }
}

/// テスト用HTTPサーバーを起動し、ポート番号を返す。
pub async fn start_mock_server(app: axum::Router) -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    port
}
