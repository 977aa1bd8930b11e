//! # POST /sign
//!
//! 検証 → ステージング → IPA解析 → 署名ツール実行 → 永続化・アップロード → レスポンス
//! の直線的なパイプライン。

mod handler;


pub use handler::{handle_sign, sign_workflow};
