//! 診断結果の表示
//!
//! 判定ロジックとは独立した表示層です。表示形式は `VerdictRenderer` を
//! 実装することで差し替えられます。

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::diagnosis::verdict::{DiagnosticResult, Label};
use crate::error::ScanError;

/// 既定の患者ID
pub const DEFAULT_PATIENT_ID: &str = "PT-4920";

/// MRIシーケンスの種類（キャプション表示用）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MriSequence {
    #[default]
    #[serde(rename = "T1-Weighted")]
    T1Weighted,
    #[serde(rename = "T2-Weighted")]
    T2Weighted,
    #[serde(rename = "FLAIR")]
    Flair,
    #[serde(rename = "T1-Contrast")]
    T1Contrast,
    #[serde(rename = "T2-Contrast")]
    T2Contrast,
    #[serde(rename = "DWI")]
    Dwi,
    #[serde(rename = "SWI")]
    Swi,
}

impl MriSequence {
    pub const ALL: [MriSequence; 7] = [
        MriSequence::T1Weighted,
        MriSequence::T2Weighted,
        MriSequence::Flair,
        MriSequence::T1Contrast,
        MriSequence::T2Contrast,
        MriSequence::Dwi,
        MriSequence::Swi,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MriSequence::T1Weighted => "T1-Weighted",
            MriSequence::T2Weighted => "T2-Weighted",
            MriSequence::Flair => "FLAIR",
            MriSequence::T1Contrast => "T1-Contrast",
            MriSequence::T2Contrast => "T2-Contrast",
            MriSequence::Dwi => "DWI",
            MriSequence::Swi => "SWI",
        }
    }
}

impl std::fmt::Display for MriSequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MriSequence {
    type Err = String;

    /// 大文字小文字とハイフンの有無は区別しない (例: `t1weighted`, `Flair`)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalize = |v: &str| v.replace(['-', '_', ' '], "").to_ascii_lowercase();
        let wanted = normalize(s);
        Self::ALL
            .into_iter()
            .find(|seq| normalize(seq.as_str()) == wanted)
            .ok_or_else(|| {
                let names: Vec<_> = Self::ALL.iter().map(|s| s.as_str()).collect();
                format!("不明なMRIシーケンス: {} (候補: {})", s, names.join(", "))
            })
    }
}

/// 表示状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Success,
    Error,
    Warning,
}

impl From<Label> for Severity {
    fn from(label: Label) -> Self {
        match label {
            Label::Normal => Severity::Success,
            Label::Tumor => Severity::Error,
            Label::Unknown => Severity::Warning,
        }
    }
}

/// 1件のスキャンの表示用レポート
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanReport {
    /// 画像の出所（ファイル名など）
    pub source: String,
    pub patient_id: String,
    pub sequence: MriSequence,
    #[serde(flatten)]
    pub result: DiagnosticResult,
}

impl ScanReport {
    pub fn new(
        source: impl Into<String>,
        patient_id: impl Into<String>,
        sequence: MriSequence,
        result: DiagnosticResult,
    ) -> Self {
        Self {
            source: source.into(),
            patient_id: patient_id.into(),
            sequence,
            result,
        }
    }

    /// `ID: PT-4920 | T1-Weighted` 形式のキャプション
    pub fn caption(&self) -> String {
        format!("ID: {} | {}", self.patient_id, self.sequence)
    }
}

/// 診断結果の表示形式
pub trait VerdictRenderer {
    /// 診断結果を表示用文字列にする
    fn render(&self, report: &ScanReport) -> String;

    /// 入力拒否・推論失敗を表示用文字列にする
    fn render_failure(&self, source: &str, error: &ScanError) -> String;
}

/// 信頼度(%)を表示用に整形 (整数値でも小数点1桁は残す: 95.0, 87.65)
pub fn format_percent(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{:.1}", value)
    } else {
        format!("{}", value)
    }
}

/// 端末向けのテキスト表示
#[derive(Debug, Clone)]
pub struct TerminalRenderer {
    /// プログレスバーの幅（文字数）
    pub bar_width: usize,
}

impl Default for TerminalRenderer {
    fn default() -> Self {
        Self { bar_width: 30 }
    }
}

impl TerminalRenderer {
    fn marker(severity: Severity) -> &'static str {
        match severity {
            Severity::Success => "[ OK ]",
            Severity::Error => "[ALERT]",
            Severity::Warning => "[WARN]",
        }
    }

    fn progress_bar(&self, percent: f64) -> String {
        let filled = ((percent / 100.0) * self.bar_width as f64).round() as usize;
        let filled = filled.min(self.bar_width);
        format!("[{}{}]", "#".repeat(filled), "-".repeat(self.bar_width - filled))
    }
}

impl VerdictRenderer for TerminalRenderer {
    fn render(&self, report: &ScanReport) -> String {
        let result = &report.result;
        let percent = format_percent(result.confidence_percent);
        let marker = Self::marker(result.label.into());

        let mut lines = vec![format!("{}  ({})", report.source, report.caption())];
        match result.label {
            Label::Normal => {
                lines.push(format!("{} SCAN NORMAL", marker));
                lines.push(format!("  Confidence Score: {}%", percent));
                lines.push("  No pathological anomalies detected.".to_string());
            }
            Label::Tumor => {
                lines.push(format!("{} ABNORMALITY DETECTED", marker));
                lines.push(format!("  Confidence Score: {}%  (High Risk)", percent));
                lines.push(format!("  {}", self.progress_bar(result.confidence_percent)));
                lines.push("  Target area identified. Neurosurgery consult recommended.".to_string());
            }
            Label::Unknown => {
                lines.push(format!("{} IMAGE UNRECOGNIZED (Low Confidence: {}%)", marker, percent));
                lines.push(
                    "  The model is not confident this is a brain MRI. Please provide a clear medical scan."
                        .to_string(),
                );
            }
        }
        lines.join("\n")
    }

    fn render_failure(&self, source: &str, error: &ScanError) -> String {
        if error.is_rejected_input() {
            format!("{}\n[REJECTED] 画像として読み込めませんでした: {}", source, error)
        } else {
            format!("{}\n[ERROR] 診断に失敗しました: {}", source, error)
        }
    }
}

/// JSON形式の表示（1件1行）
#[derive(Debug, Clone, Default)]
pub struct JsonRenderer {
    pub pretty: bool,
}

impl JsonRenderer {
    fn to_string(&self, value: &serde_json::Value) -> String {
        let encoded = if self.pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        };
        // Value の直列化は失敗しない
        encoded.unwrap_or_default()
    }
}

impl VerdictRenderer for JsonRenderer {
    fn render(&self, report: &ScanReport) -> String {
        let mut value = serde_json::to_value(report).unwrap_or_default();
        if let Some(map) = value.as_object_mut() {
            map.insert("status".into(), "ok".into());
            map.insert("gated".into(), report.result.is_gated().into());
        }
        self.to_string(&value)
    }

    fn render_failure(&self, source: &str, error: &ScanError) -> String {
        let status = if error.is_rejected_input() { "rejected" } else { "error" };
        self.to_string(&serde_json::json!({
            "source": source,
            "status": status,
            "error": error.to_string(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnosis::verdict::decide;

    fn report(score: f64) -> ScanReport {
        ScanReport::new("scan_01.jpg", DEFAULT_PATIENT_ID, MriSequence::Flair, decide(score))
    }

    #[test]
    fn test_format_percent() {
        assert_eq!(format_percent(95.0), "95.0");
        assert_eq!(format_percent(87.65), "87.65");
        assert_eq!(format_percent(100.0), "100.0");
    }

    #[test]
    fn test_sequence_parsing() {
        assert_eq!("T2-Weighted".parse::<MriSequence>(), Ok(MriSequence::T2Weighted));
        assert_eq!("flair".parse::<MriSequence>(), Ok(MriSequence::Flair));
        assert_eq!("t1_contrast".parse::<MriSequence>(), Ok(MriSequence::T1Contrast));
        assert!("CT".parse::<MriSequence>().is_err());
        for seq in MriSequence::ALL {
            assert_eq!(seq.to_string().parse::<MriSequence>(), Ok(seq));
        }
    }

    #[test]
    fn test_severity_mapping() {
        assert_eq!(Severity::from(Label::Normal), Severity::Success);
        assert_eq!(Severity::from(Label::Tumor), Severity::Error);
        assert_eq!(Severity::from(Label::Unknown), Severity::Warning);
    }

    #[test]
    fn test_terminal_tumor() {
        let text = TerminalRenderer::default().render(&report(0.95));
        assert!(text.contains("ID: PT-4920 | FLAIR"));
        assert!(text.contains("[ALERT] ABNORMALITY DETECTED"));
        assert!(text.contains("Confidence Score: 95.0%  (High Risk)"));
        assert!(text.contains("Neurosurgery consult recommended"));
    }

    #[test]
    fn test_terminal_normal() {
        let text = TerminalRenderer::default().render(&report(0.05));
        assert!(text.contains("[ OK ] SCAN NORMAL"));
        assert!(text.contains("95.0%"));
        assert!(!text.contains("High Risk"));
    }

    #[test]
    fn test_terminal_unknown_reports_confidence() {
        let text = TerminalRenderer::default().render(&report(0.3));
        assert!(text.contains("[WARN] IMAGE UNRECOGNIZED (Low Confidence: 70.0%)"));
        assert!(text.contains("clear medical scan"));
    }

    #[test]
    fn test_progress_bar() {
        let renderer = TerminalRenderer { bar_width: 10 };
        assert_eq!(renderer.progress_bar(80.0), "[########--]");
        assert_eq!(renderer.progress_bar(100.0), "[##########]");
    }

    #[test]
    fn test_terminal_failure_distinguishes_rejection() {
        let renderer = TerminalRenderer::default();
        let rejected = ScanError::Decode(image::ImageError::IoError(std::io::Error::other("bad")));
        assert!(renderer.render_failure("a.png", &rejected).contains("[REJECTED]"));

        let failed = ScanError::inference("device lost");
        assert!(renderer.render_failure("a.png", &failed).contains("[ERROR]"));
    }

    #[test]
    fn test_json_render() {
        let line = JsonRenderer::default().render(&report(0.79));
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();

        assert_eq!(value["status"], "ok");
        assert_eq!(value["label"], "UNKNOWN");
        assert_eq!(value["confidence_percent"], 79.0);
        assert_eq!(value["gated"], true);
        assert_eq!(value["sequence"], "FLAIR");
        assert_eq!(value["patient_id"], "PT-4920");
        assert!(!line.contains('\n'));
    }

    #[test]
    fn test_json_pretty_spans_lines() {
        let text = JsonRenderer { pretty: true }.render(&report(0.95));
        assert!(text.lines().count() > 1);
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["label"], "TUMOR");
    }

    #[test]
    fn test_json_failure() {
        let line = JsonRenderer::default().render_failure("x.png", &ScanError::inference("boom"));
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["status"], "error");
        assert_eq!(value["source"], "x.png");
    }
}
