//! 脳MRI画像の腫瘍スクリーニング
//!
//! 学習済みCNNのスコアを信頼度ゲート付きで NORMAL / TUMOR / UNKNOWN に判定します。

pub mod error;
pub mod preprocess;
pub mod diagnosis;
pub mod model;
pub mod session;
pub mod logger;
#[cfg(feature = "ml")]
pub mod ml;

pub use diagnosis::{decide, ConfidenceGate, DiagnosticResult, Diagnoser, Label, ScoringFunction};
pub use error::ScanError;
pub use preprocess::ScanTensor;
