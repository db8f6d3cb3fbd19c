//! スキャン診断のエラー型
//!
//! 入力画像の拒否・推論失敗など、診断が生成されないケースを表します。
//! 低信頼度による `UNKNOWN` 判定はエラーではないため、ここには含まれません。

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("スキャン画像を読み込めません {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("画像としてデコードできません: {0}")]
    Decode(#[from] image::ImageError),

    #[error("対応していない画像形式です: {0:?} (PNG / JPEG のみ)")]
    UnsupportedFormat(image::ImageFormat),

    #[error("推論エラー: {message}")]
    Inference { message: String },

    #[error("モデルのスコアが範囲外です: {0} (期待: 0.0〜1.0)")]
    ScoreOutOfRange(f64),

    #[error("設定エラー: {message}")]
    Config { message: String },
}

impl ScanError {
    pub fn inference(message: impl Into<String>) -> Self {
        Self::Inference {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// 入力画像そのものが原因で拒否されたかどうか
    pub fn is_rejected_input(&self) -> bool {
        matches!(
            self,
            Self::Read { .. } | Self::Decode(_) | Self::UnsupportedFormat(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ScanError>;
