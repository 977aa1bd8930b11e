//! # OTAインストールマニフェスト
//!
//! `itms-services` プロトコルが読むXML plistの生成と、
//! そのマニフェストを指すインストールURLの構築。

use isign_types::BundleInfo;
use plist::{Dictionary, Value};

/// インストールURLのスキーム
pub const ITMS_SCHEME: &str = "itms-services";
/// インストールURLの固定action
pub const ITMS_ACTION: &str = "download-manifest";

/// マニフェストに書く固定のbundle-version
const BUNDLE_VERSION: &str = "1.0";

/// 署名済みIPAのURLとバンドル情報からインストールマニフェスト（XML plist）を生成する。
pub fn build_install_manifest(info: &BundleInfo, ipa_url: &str) -> Result<Vec<u8>, plist::Error> {
    let mut asset = Dictionary::new();
    asset.insert("kind".to_string(), Value::String("software-package".to_string()));
    asset.insert("url".to_string(), Value::String(ipa_url.to_string()));

    let mut metadata = Dictionary::new();
    metadata.insert("bundle-identifier".to_string(), Value::String(info.bundle_id.clone()));
    metadata.insert("bundle-version".to_string(), Value::String(BUNDLE_VERSION.to_string()));
    metadata.insert("kind".to_string(), Value::String("software".to_string()));
    metadata.insert("title".to_string(), Value::String(info.name.clone()));

    let mut item = Dictionary::new();
    item.insert("assets".to_string(), Value::Array(vec![Value::Dictionary(asset)]));
    item.insert("metadata".to_string(), Value::Dictionary(metadata));

    let mut root = Dictionary::new();
    root.insert("items".to_string(), Value::Array(vec![Value::Dictionary(item)]));

    let mut buf = Vec::new();
    plist::to_writer_xml(&mut buf, &Value::Dictionary(root))?;
    Ok(buf)
}

/// マニフェストの公開URLから `itms-services://?action=download-manifest&url=...` を構築する。
/// `url` パラメータはパーセントエンコードされる。
pub fn itms_services_url(manifest_url: &str) -> String {
    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("action", ITMS_ACTION)
        .append_pair("url", manifest_url)
        .finish();
    format!("{ITMS_SCHEME}://?{query}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn example_info() -> BundleInfo {
        BundleInfo {
            bundle_id: "com.example.app".to_string(),
            name: "Example & Friends".to_string(),
        }
    }

    #[test]
    fn test_manifest_structure() {
        let xml = build_install_manifest(&example_info(), "https://files.example/d/abc/app.ipa").unwrap();
        let text = String::from_utf8(xml.clone()).unwrap();
        assert!(text.starts_with("<?xml"));
        // XMLエスケープされている
        assert!(text.contains("Example &amp; Friends"));

        let value: Value = plist::from_bytes(&xml).unwrap();
        let field = |dict: &Dictionary, key: &str| dict.get(key).cloned().unwrap();
        let root = value.as_dictionary().unwrap();
        let items = field(root, "items").into_array().unwrap();
        let item = items[0].as_dictionary().unwrap();
        let assets = field(item, "assets").into_array().unwrap();
        let asset = assets[0].as_dictionary().unwrap();
        assert_eq!(field(asset, "kind").as_string(), Some("software-package"));
        assert_eq!(
            field(asset, "url").as_string(),
            Some("https://files.example/d/abc/app.ipa")
        );

        let metadata = field(item, "metadata").into_dictionary().unwrap();
        assert_eq!(field(&metadata, "bundle-identifier").as_string(), Some("com.example.app"));
        assert_eq!(field(&metadata, "bundle-version").as_string(), Some("1.0"));
        assert_eq!(field(&metadata, "kind").as_string(), Some("software"));
        assert_eq!(field(&metadata, "title").as_string(), Some("Example & Friends"));
    }

    /// urlパラメータをデコードすると元のマニフェストURLに戻ること
    #[test]
    fn test_itms_url_round_trips_manifest_url() {
        let manifest_url = "https://files.example/d/x y/manifest.plist?token=a&b=c";
        let itms = itms_services_url(manifest_url);
        assert!(itms.starts_with("itms-services://?action=download-manifest&url="));
        assert!(!itms.contains("token=a&b"));

        let parsed = url::Url::parse(&itms).unwrap();
        assert_eq!(parsed.scheme(), "itms-services");
        let pairs: Vec<(String, String)> = parsed.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("action".to_string(), "download-manifest".to_string()),
                ("url".to_string(), manifest_url.to_string()),
            ]
        );
    }
}
