//! アプリケーション設定管理モジュール
//!
//! 計算デバイスやモデル設定、信頼度ゲートなどをJSON形式で保存・読み込みします。

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::diagnosis::verdict::DEFAULT_MIN_CONFIDENCE;
use crate::preprocess::DEFAULT_INPUT_SIZE;

/// 計算デバイスの種類
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum DeviceType {
    /// WGPU (GPU) バックエンド
    Wgpu,
    /// NdArray (CPU) バックエンド
    #[default]
    Cpu,
}

impl std::fmt::Display for DeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceType::Wgpu => write!(f, "WGPU (GPU)"),
            DeviceType::Cpu => write!(f, "CPU (NdArray)"),
        }
    }
}

/// モデル設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSettings {
    /// 使用するモデルファイルのパス
    pub model_path: String,
    /// 入力画像サイズ（正方形）
    pub image_size: usize,
    /// 全結合層のユニット数
    pub dense_units: usize,
    /// ドロップアウト率
    pub dropout: f64,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            model_path: "models/brain_tumor_model.tar.gz".to_string(),
            image_size: DEFAULT_INPUT_SIZE,
            dense_units: 512,
            dropout: 0.5,
        }
    }
}

/// トレーニング設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingSettings {
    /// エポック数
    pub num_epochs: usize,
    /// バッチサイズ
    pub batch_size: usize,
    /// ワーカー数
    pub num_workers: usize,
    /// 学習率
    pub learning_rate: f64,
    /// ランダムシード
    pub seed: u64,
    /// トレーニングデータの割合
    pub train_ratio: f32,
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self {
            num_epochs: 10,
            batch_size: 32,
            num_workers: 1,
            learning_rate: 1e-3,
            seed: 42,
            train_ratio: 0.8,
        }
    }
}

/// 信頼度ゲート設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateSettings {
    /// これ未満の信頼度は UNKNOWN として扱う (0.5〜1.0)
    pub min_confidence: f64,
}

impl Default for GateSettings {
    fn default() -> Self {
        Self {
            min_confidence: DEFAULT_MIN_CONFIDENCE,
        }
    }
}

/// アプリケーション設定
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// 計算デバイスの種類
    #[serde(default)]
    pub device_type: DeviceType,
    /// モデル設定
    #[serde(default)]
    pub model: ModelSettings,
    /// トレーニング設定
    #[serde(default)]
    pub training: TrainingSettings,
    /// 信頼度ゲート設定
    #[serde(default)]
    pub gate: GateSettings,
    /// 最後に診断したスキャンのディレクトリ
    #[serde(default)]
    pub last_scan_dir: Option<String>,
}

impl AppConfig {
    /// 設定ファイルのデフォルトパス
    pub fn default_path() -> PathBuf {
        PathBuf::from("neuroscan.json")
    }

    /// 設定を読み込む
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: AppConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// 設定を読み込む、存在しない場合はデフォルト設定を返す
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        if path.exists() {
            match Self::load(path) {
                Ok(config) => {
                    tracing::info!("設定ファイルを読み込みました: {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!(
                        "設定ファイルの読み込みに失敗しました ({}): {}。デフォルト設定を使用します",
                        path.display(),
                        e
                    );
                    Self::default()
                }
            }
        } else {
            tracing::debug!("設定ファイルが存在しません。デフォルト設定を使用します");
            Self::default()
        }
    }

    /// 設定を保存する
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// 計算デバイスを設定
    pub fn set_device_type(&mut self, device_type: DeviceType) {
        self.device_type = device_type;
    }

    /// モデルパスを設定
    pub fn set_model_path(&mut self, path: String) {
        self.model.model_path = path;
    }

    /// 最後に診断したスキャンのディレクトリを更新
    pub fn update_last_scan_dir<P: AsRef<Path>>(&mut self, path: P) {
        self.last_scan_dir = Some(path.as_ref().to_string_lossy().to_string());
    }

    /// 設定情報を表示用の文字列にする
    pub fn summary(&self) -> String {
        let mut lines = vec![
            "=== アプリケーション設定 ===".to_string(),
            format!("計算デバイス: {}", self.device_type),
            format!("モデルパス: {}", self.model.model_path),
            format!("入力サイズ: {0}x{0}", self.model.image_size),
            format!("全結合ユニット数: {}", self.model.dense_units),
            format!("ドロップアウト率: {}", self.model.dropout),
            String::new(),
            "--- トレーニング設定 ---".to_string(),
            format!("エポック数: {}", self.training.num_epochs),
            format!("バッチサイズ: {}", self.training.batch_size),
            format!("学習率: {}", self.training.learning_rate),
            format!("シード: {}", self.training.seed),
            format!("学習データの割合: {}", self.training.train_ratio),
            String::new(),
            "--- 信頼度ゲート ---".to_string(),
            format!("最小信頼度: {:.0}%", self.gate.min_confidence * 100.0),
        ];
        if let Some(ref dir) = self.last_scan_dir {
            lines.push(String::new());
            lines.push(format!("最後に使用したスキャンディレクトリ: {}", dir));
        }
        lines.push("========================".to_string());
        lines.join("\n")
    }
}
