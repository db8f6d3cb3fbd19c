//! 信頼度ゲート付きの判定ロジック
//!
//! モデルの生スコア (0.0〜1.0、1.0に近いほど腫瘍らしい) から
//! ラベルと信頼度(%)を決定します。I/Oや内部状態を持たない純粋関数です。
//!
//! 1. スコア > 0.5 なら TUMOR (信頼度 = スコア)、それ以外は NORMAL (信頼度 = 1 - スコア)
//! 2. 信頼度が閾値 (既定 0.80) 未満なら UNKNOWN に置き換え、信頼度はそのまま残す
//! 3. 信頼度(%) は小数点以下2桁に丸める

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScanError};

/// 既定の最小信頼度
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.80;

/// TUMOR と NORMAL を分けるスコア境界 (境界値ちょうどは NORMAL)
pub const DECISION_BOUNDARY: f64 = 0.5;

/// 診断ラベル
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Label {
    Normal,
    Tumor,
    Unknown,
}

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Label::Normal => write!(f, "NORMAL"),
            Label::Tumor => write!(f, "TUMOR"),
            Label::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// 1回の推論に対する診断結果
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticResult {
    pub raw_score: f64,
    pub label: Label,
    pub confidence_percent: f64,
}

impl DiagnosticResult {
    /// ゲート適用前のラベル
    pub fn tentative_label(&self) -> Label {
        if self.raw_score > DECISION_BOUNDARY {
            Label::Tumor
        } else {
            Label::Normal
        }
    }

    /// 信頼度ゲートで UNKNOWN に置き換えられたかどうか
    pub fn is_gated(&self) -> bool {
        self.label == Label::Unknown
    }
}

/// 信頼度ゲート
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceGate {
    min_confidence: f64,
}

impl Default for ConfidenceGate {
    fn default() -> Self {
        Self {
            min_confidence: DEFAULT_MIN_CONFIDENCE,
        }
    }
}

impl ConfidenceGate {
    /// 閾値を指定してゲートを作成
    ///
    /// 0.5 未満の閾値ではゲートが働かないため、0.5〜1.0 の範囲のみ受け付けます。
    pub fn new(min_confidence: f64) -> Result<Self> {
        if !(DECISION_BOUNDARY..=1.0).contains(&min_confidence) {
            return Err(ScanError::config(format!(
                "最小信頼度は 0.5〜1.0 の範囲で指定してください: {}",
                min_confidence
            )));
        }
        Ok(Self { min_confidence })
    }

    pub fn min_confidence(&self) -> f64 {
        self.min_confidence
    }

    /// 生スコアから診断結果を決定
    ///
    /// `raw_score` は 0.0〜1.0 を前提とします (範囲チェックは呼び出し側の責務)。
    pub fn decide(&self, raw_score: f64) -> DiagnosticResult {
        let (tentative, confidence) = if raw_score > DECISION_BOUNDARY {
            (Label::Tumor, raw_score)
        } else {
            (Label::Normal, 1.0 - raw_score)
        };

        // 比較は丸め前の値で行う
        let label = if confidence < self.min_confidence {
            Label::Unknown
        } else {
            tentative
        };

        DiagnosticResult {
            raw_score,
            label,
            confidence_percent: round_to_hundredths(confidence * 100.0),
        }
    }
}

/// 既定の閾値 (0.80) で判定
pub fn decide(raw_score: f64) -> DiagnosticResult {
    ConfidenceGate::default().decide(raw_score)
}

/// 小数点以下2桁に丸める
///
/// `format!` の10進丸めを使います。`decide(0.87125)` は 87.12 になります。
fn round_to_hundredths(value: f64) -> f64 {
    format!("{:.2}", value).parse().unwrap_or(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_verdict(raw_score: f64, label: Label, confidence: f64) {
        let result = decide(raw_score);
        assert_eq!(result.label, label, "raw_score = {}", raw_score);
        assert_eq!(result.confidence_percent, confidence, "raw_score = {}", raw_score);
        assert_eq!(result.raw_score, raw_score);
    }

    #[test]
    fn test_boundary_scenarios() {
        assert_verdict(0.5, Label::Unknown, 50.0);
        assert_verdict(0.8, Label::Tumor, 80.0);
        assert_verdict(0.79, Label::Unknown, 79.0);
        assert_verdict(0.95, Label::Tumor, 95.0);
        assert_verdict(0.05, Label::Normal, 95.0);
        assert_verdict(0.3, Label::Unknown, 70.0);
    }

    #[test]
    fn test_normal_side_exact_threshold_is_not_gated() {
        // 1.0 - 0.2 は f64 でちょうど 0.8 になる
        assert_verdict(0.2, Label::Normal, 80.0);
        // 1.0 - 0.19999999 は 0.8 をわずかに超えるのでゲートされない
        assert_verdict(0.19999999, Label::Normal, 80.0);
        assert_verdict(0.0, Label::Normal, 100.0);
        assert_verdict(1.0, Label::Tumor, 100.0);
    }

    #[test]
    fn test_half_score_resolves_to_normal_branch() {
        let result = decide(0.5);
        assert_eq!(result.tentative_label(), Label::Normal);
        assert!(result.is_gated());
    }

    #[test]
    fn test_tentative_label_and_confidence_by_side() {
        for i in 0..=100 {
            let score = i as f64 / 100.0;
            let result = decide(score);
            if score > 0.5 {
                assert_eq!(result.tentative_label(), Label::Tumor);
                assert_eq!(result.confidence_percent, round_to_hundredths(score * 100.0));
            } else {
                assert_eq!(result.tentative_label(), Label::Normal);
                assert_eq!(
                    result.confidence_percent,
                    round_to_hundredths((1.0 - score) * 100.0)
                );
            }
        }
    }

    #[test]
    fn test_gate_keeps_confidence() {
        for i in 0..=100 {
            let score = i as f64 / 100.0;
            let result = decide(score);
            let confidence = if score > 0.5 { score } else { 1.0 - score };
            if confidence < DEFAULT_MIN_CONFIDENCE {
                assert_eq!(result.label, Label::Unknown);
                assert_eq!(result.confidence_percent, round_to_hundredths(confidence * 100.0));
            } else {
                assert_eq!(result.label, result.tentative_label());
            }
        }
    }

    #[test]
    fn test_decide_is_deterministic() {
        for score in [0.0, 0.123456, 0.5, 0.500001, 0.8, 0.999] {
            assert_eq!(decide(score), decide(score));
        }
    }

    #[test]
    fn test_rounds_to_two_decimals() {
        let result = decide(0.1234567);
        assert_eq!(result.label, Label::Normal);
        assert_eq!(result.confidence_percent, 87.65);

        let result = decide(0.987654);
        assert_eq!(result.confidence_percent, 98.77);
    }

    #[test]
    fn test_rounding_ties_follow_decimal_representation() {
        assert_eq!(decide(0.87125).confidence_percent, 87.12);
        assert_eq!(round_to_hundredths(0.375), 0.38);
    }

    #[test]
    fn test_custom_gate() {
        let strict = ConfidenceGate::new(0.95).unwrap();
        assert_eq!(strict.decide(0.9).label, Label::Unknown);
        assert_eq!(strict.decide(0.96).label, Label::Tumor);

        let lenient = ConfidenceGate::new(0.5).unwrap();
        assert_eq!(lenient.decide(0.5).label, Label::Normal);
        assert_eq!(lenient.decide(0.51).label, Label::Tumor);
    }

    #[test]
    fn test_gate_rejects_invalid_threshold() {
        assert!(ConfidenceGate::new(0.49).is_err());
        assert!(ConfidenceGate::new(1.01).is_err());
        assert!(ConfidenceGate::new(f64::NAN).is_err());
    }

    #[test]
    fn test_label_serialization() {
        assert_eq!(serde_json::to_string(&Label::Tumor).unwrap(), "\"TUMOR\"");
        assert_eq!(format!("{}", Label::Unknown), "UNKNOWN");
        let result = decide(0.95);
        let json = serde_json::to_value(result).unwrap();
        assert_eq!(json["label"], "TUMOR");
        assert_eq!(json["confidence_percent"], 95.0);
    }
}
