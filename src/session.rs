//! 対話セッションと一括診断
//!
//! どちらも読み込み済みの `Diagnoser` を1つ受け取り、1件ずつ順番に診断します。

use serde::Serialize;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use crate::diagnosis::render::DEFAULT_PATIENT_ID;
use crate::diagnosis::{Diagnoser, MriSequence, ScanReport, ScoringFunction, VerdictRenderer};
use crate::error::ScanError;
use crate::preprocess::has_scan_extension;

/// 診断件数の集計
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub normal: usize,
    pub tumor: usize,
    pub unknown: usize,
    pub rejected: usize,
    pub failed: usize,
}

impl SessionStats {
    fn record(&mut self, outcome: &Result<ScanReport, ScanError>) {
        use crate::diagnosis::Label;
        match outcome {
            Ok(report) => match report.result.label {
                Label::Normal => self.normal += 1,
                Label::Tumor => self.tumor += 1,
                Label::Unknown => self.unknown += 1,
            },
            Err(e) if e.is_rejected_input() => self.rejected += 1,
            Err(_) => self.failed += 1,
        }
    }

    pub fn diagnosed(&self) -> usize {
        self.normal + self.tumor + self.unknown
    }

    /// 診断できなかった入力があるかどうか
    pub fn has_failures(&self) -> bool {
        self.rejected + self.failed > 0
    }
}

/// 診断セッション
pub struct Session<S: ScoringFunction> {
    diagnoser: Diagnoser<S>,
    pub patient_id: String,
    pub sequence: MriSequence,
    stats: SessionStats,
}

impl<S: ScoringFunction> Session<S> {
    pub fn new(diagnoser: Diagnoser<S>) -> Self {
        Self {
            diagnoser,
            patient_id: DEFAULT_PATIENT_ID.to_string(),
            sequence: MriSequence::default(),
            stats: SessionStats::default(),
        }
    }

    pub fn with_caption(mut self, patient_id: impl Into<String>, sequence: MriSequence) -> Self {
        self.patient_id = patient_id.into();
        self.sequence = sequence;
        self
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// 1件診断して集計に加える
    pub fn diagnose(&mut self, path: &Path) -> Result<ScanReport, ScanError> {
        let source = path.display().to_string();
        let outcome = self
            .diagnoser
            .diagnose_path(path)
            .map(|result| ScanReport::new(source, self.patient_id.clone(), self.sequence, result));

        match &outcome {
            Ok(report) => tracing::info!(
                "{}: {} ({}%)",
                report.source,
                report.result.label,
                report.result.confidence_percent
            ),
            Err(e) => tracing::warn!("{}: 診断できませんでした: {}", path.display(), e),
        }
        self.stats.record(&outcome);
        outcome
    }

    /// 1件診断して表示文字列を返す
    pub fn diagnose_and_render(&mut self, path: &Path, renderer: &dyn VerdictRenderer) -> String {
        match self.diagnose(path) {
            Ok(report) => renderer.render(&report),
            Err(e) => renderer.render_failure(&path.display().to_string(), &e),
        }
    }

    /// 1行に1つの画像パスを読み込んで順に診断する
    ///
    /// `:patient <ID>`, `:sequence <名前>`, `:quit` を受け付けます。
    pub fn run_interactive<R: BufRead, W: Write>(
        &mut self,
        input: R,
        mut output: W,
        renderer: &dyn VerdictRenderer,
    ) -> std::io::Result<()> {
        writeln!(output, "画像パスを入力してください (:patient <ID>, :sequence <名前>, :quit)")?;
        for line in input.lines() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            if let Some(command) = line.strip_prefix(':') {
                let (name, arg) = command.split_once(' ').unwrap_or((command, ""));
                let arg = arg.trim();
                match name {
                    "quit" | "q" => break,
                    "patient" if !arg.is_empty() => {
                        self.patient_id = arg.to_string();
                        writeln!(output, "患者ID: {}", self.patient_id)?;
                    }
                    "sequence" => match arg.parse::<MriSequence>() {
                        Ok(sequence) => {
                            self.sequence = sequence;
                            writeln!(output, "シーケンス: {}", sequence)?;
                        }
                        Err(e) => writeln!(output, "{}", e)?,
                    },
                    _ => writeln!(output, "不明なコマンドです: {}", line)?,
                }
                continue;
            }

            let rendered = self.diagnose_and_render(Path::new(line), renderer);
            writeln!(output, "{}\n", rendered)?;
        }

        let stats = &self.stats;
        writeln!(
            output,
            "終了: NORMAL {} / TUMOR {} / UNKNOWN {} / 拒否 {} / 失敗 {}",
            stats.normal, stats.tumor, stats.unknown, stats.rejected, stats.failed
        )?;
        Ok(())
    }
}

/// ディレクトリ内のスキャン画像を列挙（ファイル名順）
pub fn collect_scans(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && has_scan_extension(&path) {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

/// 一括診断レポートの1行
#[derive(Debug, Serialize)]
struct BatchRow<'a> {
    file: &'a str,
    status: &'a str,
    label: String,
    confidence_percent: Option<f64>,
    raw_score: Option<f64>,
    error: String,
}

/// 複数の画像を診断し、結果をCSVに書き出す
pub fn write_batch_report<S: ScoringFunction, W: Write>(
    session: &mut Session<S>,
    paths: &[PathBuf],
    writer: W,
) -> anyhow::Result<SessionStats> {
    let mut csv_writer = csv::Writer::from_writer(writer);

    for path in paths {
        let file = path.display().to_string();
        let row = match session.diagnose(path) {
            Ok(report) => BatchRow {
                file: &file,
                status: "ok",
                label: report.result.label.to_string(),
                confidence_percent: Some(report.result.confidence_percent),
                raw_score: Some(report.result.raw_score),
                error: String::new(),
            },
            Err(e) => BatchRow {
                file: &file,
                status: if e.is_rejected_input() { "rejected" } else { "error" },
                label: String::new(),
                confidence_percent: None,
                raw_score: None,
                error: e.to_string(),
            },
        };
        csv_writer.serialize(row)?;
    }

    csv_writer.flush()?;
    Ok(session.stats().clone())
}
