//! モデルメタデータの定義
//!
//! tar.gz形式で重みと一緒に保存され、推論時のネットワーク再構築に使われます。

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// モデルメタデータ
///
/// tar.gz形式で保存される情報：
/// - metadata.json: このメタデータ（JSON形式）
/// - model.bin: モデルの重み（バイナリ）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// クラスラベル（[陰性, 陽性] の順、例: ["no", "yes"]）
    /// インデックス1が腫瘍クラスで、スコアはこのクラスの確率
    pub class_labels: Vec<String>,

    /// モデル入力サイズ（CNNへの入力解像度、通常150x150）
    pub image_size: usize,

    /// 全結合層のユニット数
    pub dense_units: usize,

    /// 学習エポック数
    pub num_epochs: u32,

    /// 学習に使用したサンプル数
    #[serde(default)]
    pub train_samples: usize,

    /// 検証に使用したサンプル数
    #[serde(default)]
    pub valid_samples: usize,

    /// モデルの学習時刻（ISO8601形式）
    pub trained_at: String,
}

impl ModelMetadata {
    /// 新しいメタデータを作成
    pub fn new(
        class_labels: Vec<String>,
        image_size: usize,
        dense_units: usize,
        num_epochs: u32,
        train_samples: usize,
        valid_samples: usize,
    ) -> Self {
        let trained_at = chrono::Local::now().to_rfc3339();

        Self {
            class_labels,
            image_size,
            dense_units,
            num_epochs,
            train_samples,
            valid_samples,
            trained_at,
        }
    }

    /// 腫瘍（陽性）クラスのラベル
    pub fn positive_label(&self) -> Option<&str> {
        self.class_labels.get(1).map(String::as_str)
    }

    /// メタデータの整合性を検証
    pub fn validate(&self) -> Result<()> {
        if self.class_labels.len() != 2 {
            anyhow::bail!(
                "二値分類モデルではありません: クラス数 {} ({})",
                self.class_labels.len(),
                self.class_labels.join(", ")
            );
        }
        if self.image_size < 22 {
            anyhow::bail!("入力サイズが小さすぎます: {} (最小22x22が必要)", self.image_size);
        }
        if self.dense_units == 0 {
            anyhow::bail!("全結合層のユニット数が0です");
        }
        Ok(())
    }

    /// メタデータをJSON文字列に変換
    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize metadata to JSON")
    }

    /// JSON文字列からメタデータを生成
    pub fn from_json_string(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to deserialize metadata from JSON")
    }
}
