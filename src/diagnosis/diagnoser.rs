//! 前処理 → スコア算出 → 判定 の一連の流れ

use image::DynamicImage;
use std::path::Path;

use crate::diagnosis::verdict::{ConfidenceGate, DiagnosticResult};
use crate::error::{Result, ScanError};
use crate::preprocess::{decode_scan, load_scan, ScanTensor};

/// 正規化済み画像から腫瘍スコア (0.0〜1.0) を返す分類器
///
/// 二値分類器であれば実装は問いません。
pub trait ScoringFunction {
    /// 期待する入力画像サイズ（正方形の一辺）
    fn input_size(&self) -> usize;

    /// 腫瘍スコアを算出
    fn score(&self, batch: &ScanTensor) -> Result<f64>;
}

impl<S: ScoringFunction + ?Sized> ScoringFunction for Box<S> {
    fn input_size(&self) -> usize {
        (**self).input_size()
    }

    fn score(&self, batch: &ScanTensor) -> Result<f64> {
        (**self).score(batch)
    }
}

/// 診断器
///
/// 読み込み済みの分類器を保持し、リクエストごとに再読み込みはしません。
pub struct Diagnoser<S: ScoringFunction> {
    scorer: S,
    gate: ConfidenceGate,
}

impl<S: ScoringFunction> Diagnoser<S> {
    pub fn new(scorer: S, gate: ConfidenceGate) -> Self {
        Self { scorer, gate }
    }

    pub fn gate(&self) -> &ConfidenceGate {
        &self.gate
    }

    pub fn scorer(&self) -> &S {
        &self.scorer
    }

    /// 画像ファイルを診断
    pub fn diagnose_path(&self, path: &Path) -> Result<DiagnosticResult> {
        let image = load_scan(path)?;
        self.diagnose_image(&image)
    }

    /// アップロードされた画像データを診断
    pub fn diagnose_bytes(&self, bytes: &[u8]) -> Result<DiagnosticResult> {
        let image = decode_scan(bytes)?;
        self.diagnose_image(&image)
    }

    /// デコード済みの画像を診断
    pub fn diagnose_image(&self, image: &DynamicImage) -> Result<DiagnosticResult> {
        let batch = ScanTensor::from_image(image, self.scorer.input_size());
        let raw_score = self.scorer.score(&batch)?;

        if !(0.0..=1.0).contains(&raw_score) {
            return Err(ScanError::ScoreOutOfRange(raw_score));
        }

        let result = self.gate.decide(raw_score);
        tracing::debug!(
            raw_score,
            label = %result.label,
            confidence = result.confidence_percent,
            "判定しました"
        );
        Ok(result)
    }
}
