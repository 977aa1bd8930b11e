//! # GET / と GET /health

use axum::response::Html;
use axum::Json;
use isign_types::HealthResponse;

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <title>isign</title>
</head>
<body>
  <h1>isign</h1>
  <form id="sign-form" action="/sign" method="post" enctype="multipart/form-data">
    <p><label>IPA <input type="file" name="ipa" accept=".ipa" required></label></p>
    <p><label>Certificate (.p12) <input type="file" name="p12" accept=".p12" required></label></p>
    <p><label>Provisioning profile <input type="file" name="provision" accept=".mobileprovision" required></label></p>
    <p><label>Password <input type="password" name="password" required></label></p>
    <p><button type="submit">Sign</button></p>
  </form>
</body>
</html>
"#;

/// GET / — アップロードフォーム。
pub async fn handle_index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// GET /health — 死活監視。
pub async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}
