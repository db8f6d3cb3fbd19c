//! 脳MRIの診断ロジックと表示

pub mod verdict;
pub mod diagnoser;
pub mod render;

pub use verdict::{decide, ConfidenceGate, DiagnosticResult, Label};
pub use diagnoser::{Diagnoser, ScoringFunction};
pub use render::{JsonRenderer, MriSequence, ScanReport, TerminalRenderer, VerdictRenderer};
