//! モデル推論機能

use anyhow::Result;
use std::path::Path;
use burn::{
    module::Module,
    record::{BinBytesRecorder, FullPrecisionSettings, Recorder},
    tensor::{backend::Backend, Tensor},
};

use crate::diagnosis::ScoringFunction;
use crate::error::ScanError;
use crate::ml::{ModelConfig, TumorClassifier};
use crate::model::{load_model_with_metadata, ModelMetadata};
use crate::preprocess::ScanTensor;

/// 推論エンジン
///
/// プロセス内で1度だけ読み込み、以降は読み取り専用で使い回します。
pub struct InferenceEngine<B: Backend> {
    model: TumorClassifier<B>,
    metadata: ModelMetadata,
    device: B::Device,
}

impl<B: Backend> InferenceEngine<B> {
    /// モデルを読み込んで推論エンジンを初期化
    pub fn load<P: AsRef<Path>>(model_path: P, device: B::Device) -> Result<Self> {
        let model_path = model_path.as_ref();
        let (metadata, model_binary) = load_model_with_metadata(model_path)?;
        metadata.validate()?;

        let engine = Self::from_parts(metadata, model_binary, device)?;
        tracing::info!(
            path = %model_path.display(),
            image_size = engine.metadata.image_size,
            "モデルを読み込みました"
        );
        Ok(engine)
    }

    /// メタデータと重みバイナリから推論エンジンを構築
    pub fn from_parts(metadata: ModelMetadata, model_binary: Vec<u8>, device: B::Device) -> Result<Self> {
        let model_config = ModelConfig::new()
            .with_image_size(metadata.image_size)
            .with_dense_units(metadata.dense_units)
            .with_dropout(0.0); // 推論時はドロップアウトなし

        let model = model_config.init::<B>(&device)?;

        // モデルの重みを復元
        let recorder = BinBytesRecorder::<FullPrecisionSettings>::default();
        let record = Recorder::<B>::load(&recorder, model_binary, &device)
            .map_err(|e| anyhow::anyhow!("モデル重みの読み込みエラー: {:?}", e))?;

        Ok(Self {
            model: model.load_record(record),
            metadata,
            device,
        })
    }

    /// メタデータへの参照を取得
    pub fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }
}

impl<B: Backend> ScoringFunction for InferenceEngine<B> {
    fn input_size(&self) -> usize {
        self.metadata.image_size
    }

    fn score(&self, batch: &ScanTensor) -> Result<f64, ScanError> {
        if batch.size() != self.metadata.image_size {
            return Err(ScanError::inference(format!(
                "入力サイズが一致しません: {}x{} (期待: {}x{})",
                batch.size(),
                batch.size(),
                self.metadata.image_size,
                self.metadata.image_size
            )));
        }

        let tensor = Tensor::<B, 1>::from_floats(batch.as_slice(), &self.device).reshape(batch.shape());
        let scores = self
            .model
            .score(tensor)
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| ScanError::inference(format!("推論結果の取得エラー: {:?}", e)))?;

        scores
            .first()
            .map(|score| *score as f64)
            .ok_or_else(|| ScanError::inference("推論結果が空です"))
    }
}

/// 学習済みモデルの重みをバイナリに変換
pub fn model_to_bytes<B: Backend>(model: TumorClassifier<B>) -> Result<Vec<u8>> {
    let recorder = BinBytesRecorder::<FullPrecisionSettings>::default();
    Recorder::<B>::record(&recorder, model.into_record(), ())
        .map_err(|e| anyhow::anyhow!("モデル重みの書き出しエラー: {:?}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::{NdArray, NdArrayDevice};
    use image::{DynamicImage, Rgb, RgbImage};

    type TestBackend = NdArray<f32>;

    fn small_metadata() -> ModelMetadata {
        ModelMetadata::new(vec!["no".into(), "yes".into()], 24, 4, 1, 8, 2)
    }

    fn small_engine() -> InferenceEngine<TestBackend> {
        let device = NdArrayDevice::default();
        let metadata = small_metadata();
        let model = ModelConfig::new()
            .with_image_size(metadata.image_size)
            .with_dense_units(metadata.dense_units)
            .init::<TestBackend>(&device)
            .unwrap();
        let bytes = model_to_bytes(model).unwrap();
        InferenceEngine::from_parts(metadata, bytes, device).unwrap()
    }

    fn sample_scan(size: usize) -> ScanTensor {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(60, 40, Rgb([90, 90, 90])));
        ScanTensor::from_image(&image, size)
    }

    #[test]
    fn test_score_is_probability() {
        let engine = small_engine();
        let score = engine.score(&sample_scan(24)).unwrap();
        assert!((0.0..=1.0).contains(&score), "score = {}", score);
    }

    #[test]
    fn test_score_is_stable_across_calls() {
        let engine = small_engine();
        let scan = sample_scan(24);
        assert_eq!(engine.score(&scan).unwrap(), engine.score(&scan).unwrap());
    }

    #[test]
    fn test_size_mismatch_is_inference_error() {
        let engine = small_engine();
        let err = engine.score(&sample_scan(32)).unwrap_err();
        assert!(matches!(err, ScanError::Inference { .. }));
        assert!(!err.is_rejected_input());
    }

    #[test]
    fn test_load_from_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let device = NdArrayDevice::default();
        let metadata = small_metadata();
        let model = ModelConfig::new()
            .with_image_size(metadata.image_size)
            .with_dense_units(metadata.dense_units)
            .init::<TestBackend>(&device)
            .unwrap();
        let bytes = model_to_bytes(model).unwrap();
        let path =
            crate::model::save_model_with_metadata(&dir.path().join("tiny"), &metadata, &bytes).unwrap();

        let engine = InferenceEngine::<TestBackend>::load(&path, device).unwrap();
        assert_eq!(engine.input_size(), 24);
        assert_eq!(engine.metadata().positive_label(), Some("yes"));
        assert!(engine.score(&sample_scan(24)).is_ok());
    }

    #[test]
    fn test_missing_artifact_fails_to_load() {
        let dir = tempfile::tempdir().unwrap();
        let result = InferenceEngine::<TestBackend>::load(dir.path().join("nope.tar.gz"), NdArrayDevice::default());
        assert!(result.is_err());
    }
}
