pub mod ml_model;
pub mod training;
pub mod inference;
pub mod provider;

pub use ml_model::{TumorClassifier, ModelConfig};
pub use training::{ScanDataset, ScanBatcher, TrainingJob, train_model};
pub use inference::{InferenceEngine, model_to_bytes};
pub use provider::{load_scorer, train_on};
