//! モデル学習機能
//!
//! クラスごとのサブフォルダ (例: `no/`, `yes/`) に分けられたMRI画像から
//! 二値分類モデルを学習し、メタデータ付きの tar.gz として保存します。

use anyhow::Result;
use std::path::{Path, PathBuf};

use burn::{
    data::dataloader::batcher::Batcher,
    data::dataset::Dataset,
    module::Module,
    tensor::{
        backend::{AutodiffBackend, Backend},
        Int, Tensor,
    },
    train::{ClassificationOutput, TrainOutput, TrainStep, ValidStep},
};

use crate::ml::{model_to_bytes, ModelConfig, TumorClassifier};
use crate::model::{save_model_with_metadata, ModelMetadata, ModelSettings, TrainingSettings};
use crate::preprocess::{has_scan_extension, load_scan, ScanTensor};

/// 学習データセット（パスのリストのみ保持）
#[derive(Debug)]
pub struct ScanDataset {
    samples: Vec<(PathBuf, usize)>, // (画像パス, クラスID)
    class_names: Vec<String>,
    // データセット分割用のインデックス範囲
    start_idx: usize,
    end_idx: usize,
}

impl ScanDataset {
    /// ディレクトリから学習データを読み込む
    ///
    /// サブフォルダ名をアルファベット順に並べてクラスIDを割り当てます。
    /// 二値分類のため、サブフォルダはちょうど2つである必要があります。
    /// デコードできない画像は警告を出して除外します。
    pub fn from_directory(data_dir: &Path) -> Result<Self> {
        let mut class_names = Vec::new();
        for entry in std::fs::read_dir(data_dir)? {
            let path = entry?.path();
            if path.is_dir() {
                let class_name = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .ok_or_else(|| anyhow::anyhow!("Invalid directory name: {:?}", path))?
                    .to_string();
                class_names.push(class_name);
            }
        }
        class_names.sort();

        if class_names.len() != 2 {
            anyhow::bail!(
                "クラスフォルダは2つ必要です ({}): {:?}",
                data_dir.display(),
                class_names
            );
        }

        let mut samples = Vec::new();
        let mut skipped = 0usize;
        for (class_id, class_name) in class_names.iter().enumerate() {
            let mut class_samples = Vec::new();
            for entry in std::fs::read_dir(data_dir.join(class_name))? {
                let path = entry?.path();
                if !path.is_file() || !has_scan_extension(&path) {
                    continue;
                }
                match load_scan(&path) {
                    Ok(_) => class_samples.push((path, class_id)),
                    Err(e) => {
                        skipped += 1;
                        tracing::warn!("学習データから除外します {}: {}", path.display(), e);
                    }
                }
            }
            if class_samples.is_empty() {
                anyhow::bail!("クラス '{}' に読み込める画像が1枚もありません", class_name);
            }
            // read_dir の順序はOS依存なので固定する
            class_samples.sort();
            tracing::info!("  クラス {}: {} ({} 枚)", class_id, class_name, class_samples.len());
            samples.extend(class_samples);
        }

        if skipped > 0 {
            tracing::warn!("読み込めない画像 {} 枚を除外しました", skipped);
        }

        let len = samples.len();
        Ok(Self {
            samples,
            class_names,
            start_idx: 0,
            end_idx: len,
        })
    }

    pub fn class_names(&self) -> &[String] {
        &self.class_names
    }

    /// データセットを学習用と検証用に分割（インデックス範囲のみ）
    ///
    /// `train_ratio` は 0.0〜1.0 に収めて扱います。
    pub fn split(self, train_ratio: f32, seed: u64) -> (Self, Self) {
        use rand::seq::SliceRandom;
        use rand::SeedableRng;

        let mut samples = self.samples[self.start_idx..self.end_idx].to_vec();
        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        samples.shuffle(&mut rng);

        let total_len = samples.len();
        let ratio = train_ratio.clamp(0.0, 1.0);
        let train_len = ((total_len as f32 * ratio) as usize).min(total_len);

        let train_dataset = Self {
            samples: samples.clone(),
            class_names: self.class_names.clone(),
            start_idx: 0,
            end_idx: train_len,
        };

        let val_dataset = Self {
            samples,
            class_names: self.class_names,
            start_idx: train_len,
            end_idx: total_len,
        };

        (train_dataset, val_dataset)
    }
}

/// データセットアイテム（画像パスのみ保持）
#[derive(Clone, Debug)]
pub struct ScanItem {
    pub path: PathBuf,
    pub label: usize,
}

impl Dataset<ScanItem> for ScanDataset {
    fn get(&self, index: usize) -> Option<ScanItem> {
        let actual_index = self.start_idx + index;
        if actual_index >= self.end_idx {
            return None;
        }

        let (path, label) = self.samples.get(actual_index)?;
        Some(ScanItem {
            path: path.clone(),
            label: *label,
        })
    }

    fn len(&self) -> usize {
        self.end_idx - self.start_idx
    }
}

/// バッチャー
///
/// 推論時と同じ前処理 (中央切り取り + 0〜1正規化) で画像を読み込みます。
#[derive(Clone, Debug)]
pub struct ScanBatcher {
    image_size: usize,
}

impl ScanBatcher {
    pub fn new(image_size: usize) -> Self {
        Self { image_size }
    }
}

/// バッチデータ
#[derive(Clone, Debug)]
pub struct ScanBatch<B: Backend> {
    pub images: Tensor<B, 4>,
    pub targets: Tensor<B, 1, Int>,
}

impl<B: Backend> Batcher<B, ScanItem, ScanBatch<B>> for ScanBatcher {
    fn batch(&self, items: Vec<ScanItem>, device: &B::Device) -> ScanBatch<B> {
        let batch_size = items.len();
        let size = self.image_size;
        let mut all_pixels = Vec::with_capacity(batch_size * 3 * size * size);
        let mut targets_vec = Vec::with_capacity(batch_size);

        for item in items {
            match ScanTensor::from_path(&item.path, size) {
                Ok(scan) => all_pixels.extend(scan.into_vec()),
                Err(e) => {
                    // データセット作成後にファイルが壊れた場合のみ
                    tracing::error!(
                        "画像読み込み失敗 {} (ゼロで埋めます): {}",
                        item.path.display(),
                        e
                    );
                    all_pixels.extend(std::iter::repeat(0.0f32).take(3 * size * size));
                }
            }
            targets_vec.push(item.label as i64);
        }

        let images = Tensor::<B, 1>::from_floats(all_pixels.as_slice(), device)
            .reshape([batch_size, 3, size, size]);
        let targets = Tensor::<B, 1, Int>::from_ints(targets_vec.as_slice(), device);

        ScanBatch { images, targets }
    }
}

/// TrainStep実装 (学習時の順伝播 + 逆伝播)
impl<B: AutodiffBackend> TrainStep<ScanBatch<B>, ClassificationOutput<B>> for TumorClassifier<B> {
    fn step(&self, batch: ScanBatch<B>) -> TrainOutput<ClassificationOutput<B>> {
        let item = self.forward_classification(batch.images, batch.targets);
        let grads = item.loss.backward();
        TrainOutput::new(self, grads, item)
    }
}

/// ValidStep実装 (検証時の順伝播のみ)
impl<B: Backend> ValidStep<ScanBatch<B>, ClassificationOutput<B>> for TumorClassifier<B> {
    fn step(&self, batch: ScanBatch<B>) -> ClassificationOutput<B> {
        self.forward_classification(batch.images, batch.targets)
    }
}

/// 学習データの割合は 0 より大きく 1 未満 (検証データが必ず残る)
fn check_train_ratio(train_ratio: f32) -> Result<()> {
    if !(train_ratio > 0.0 && train_ratio < 1.0) {
        anyhow::bail!(
            "学習データの割合は 0 より大きく 1 未満で指定してください: {}",
            train_ratio
        );
    }
    Ok(())
}

/// 学習ジョブの入力
#[derive(Debug, Clone)]
pub struct TrainingJob {
    pub data_dir: PathBuf,
    pub output_path: PathBuf,
    pub model: ModelSettings,
    pub training: TrainingSettings,
}

/// モデル学習を実行
///
/// 保存したモデルファイルのパスを返します。
pub fn train_model<B: AutodiffBackend>(job: &TrainingJob, device: B::Device) -> Result<PathBuf> {
    use burn::{
        data::dataloader::DataLoaderBuilder,
        optim::AdamConfig,
        train::{
            metric::{AccuracyMetric, LossMetric},
            LearnerBuilder, LearningStrategy,
        },
    };

    let settings = &job.training;
    check_train_ratio(settings.train_ratio)?;
    tracing::info!("学習データを読み込みます: {}", job.data_dir.display());
    let dataset = ScanDataset::from_directory(&job.data_dir)?;
    let class_labels = dataset.class_names().to_vec();

    let (dataset_train, dataset_val) = dataset.split(settings.train_ratio, settings.seed);
    if dataset_train.is_empty() || dataset_val.is_empty() {
        anyhow::bail!(
            "学習/検証データの分割が空です (学習 {} 枚, 検証 {} 枚, 割合 {})",
            dataset_train.len(),
            dataset_val.len(),
            settings.train_ratio
        );
    }
    let (train_samples, valid_samples) = (dataset_train.len(), dataset_val.len());
    tracing::info!("学習データ: {} 枚 / 検証データ: {} 枚", train_samples, valid_samples);

    let model_config = ModelConfig::new()
        .with_image_size(job.model.image_size)
        .with_dense_units(job.model.dense_units)
        .with_dropout(job.model.dropout);
    let model = model_config.init::<B>(&device)?;

    let batcher = ScanBatcher::new(job.model.image_size);
    let dataloader_train = DataLoaderBuilder::new(batcher.clone())
        .batch_size(settings.batch_size)
        .shuffle(settings.seed)
        .num_workers(settings.num_workers)
        .build(dataset_train);
    let dataloader_val = DataLoaderBuilder::new(batcher)
        .batch_size(settings.batch_size)
        .num_workers(settings.num_workers)
        .build(dataset_val);

    let artifact_dir = std::env::temp_dir().join(format!("neuroscan_training_{}", std::process::id()));
    std::fs::create_dir_all(&artifact_dir)?;
    let artifact_dir_str = artifact_dir.to_string_lossy().to_string();

    tracing::info!(
        "学習を開始します (エポック数: {}, バッチサイズ: {}, 学習率: {})",
        settings.num_epochs,
        settings.batch_size,
        settings.learning_rate
    );

    let learner = LearnerBuilder::new(&artifact_dir_str)
        .metric_train_numeric(AccuracyMetric::new())
        .metric_valid_numeric(AccuracyMetric::new())
        .metric_train_numeric(LossMetric::new())
        .metric_valid_numeric(LossMetric::new())
        .learning_strategy(LearningStrategy::SingleDevice(device.clone()))
        .num_epochs(settings.num_epochs)
        .summary()
        .build(model, AdamConfig::new().init(), settings.learning_rate);

    let model_trained = learner.fit(dataloader_train, dataloader_val);
    tracing::info!("学習が完了しました");

    let trained_model = model_trained.model;
    tracing::debug!("学習済みモデルの総パラメータ数: {}", trained_model.num_params());

    let model_binary = model_to_bytes(trained_model)?;
    let metadata = ModelMetadata::new(
        class_labels,
        job.model.image_size,
        job.model.dense_units,
        settings.num_epochs as u32,
        train_samples,
        valid_samples,
    );
    let written = save_model_with_metadata(&job.output_path, &metadata, &model_binary)?;

    std::fs::remove_dir_all(&artifact_dir).ok();
    tracing::info!("モデルを保存しました: {}", written.display());

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::{NdArray, NdArrayDevice};
    use image::{DynamicImage, Rgb, RgbImage};

    type TestBackend = NdArray<f32>;

    fn write_scan(path: &Path, value: u8) {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(30, 30, Rgb([value, value, value])))
            .save(path)
            .unwrap();
    }

    fn fixture(yes: usize, no: usize) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("yes")).unwrap();
        std::fs::create_dir_all(dir.path().join("no")).unwrap();
        for i in 0..yes {
            write_scan(&dir.path().join(format!("yes/Y{}.png", i)), 200);
        }
        for i in 0..no {
            write_scan(&dir.path().join(format!("no/N{}.jpg", i)), 20);
        }
        std::fs::write(dir.path().join("no/readme.txt"), "ignored").unwrap();
        dir
    }

    #[test]
    fn test_classes_are_sorted_alphabetically() {
        let dir = fixture(3, 2);
        let dataset = ScanDataset::from_directory(dir.path()).unwrap();

        assert_eq!(dataset.class_names(), ["no", "yes"]);
        assert_eq!(dataset.len(), 5);
        let yes_count = (0..dataset.len())
            .filter_map(|i| dataset.get(i))
            .filter(|item| item.label == 1)
            .count();
        assert_eq!(yes_count, 3);
    }

    #[test]
    fn test_requires_two_classes() {
        let dir = fixture(1, 1);
        std::fs::create_dir_all(dir.path().join("maybe")).unwrap();
        assert!(ScanDataset::from_directory(dir.path()).is_err());
    }

    #[test]
    fn test_empty_class_is_rejected() {
        let dir = fixture(2, 0);
        let err = ScanDataset::from_directory(dir.path()).unwrap_err();
        assert!(err.to_string().contains("'no'"));
    }

    #[test]
    fn test_split_is_seeded_and_disjoint() {
        let dir = fixture(6, 4);
        let (train, val) = ScanDataset::from_directory(dir.path()).unwrap().split(0.8, 42);
        assert_eq!(train.len(), 8);
        assert_eq!(val.len(), 2);

        let train_paths: Vec<_> = (0..train.len()).map(|i| train.get(i).unwrap().path).collect();
        let val_paths: Vec<_> = (0..val.len()).map(|i| val.get(i).unwrap().path).collect();
        assert!(val_paths.iter().all(|p| !train_paths.contains(p)));
        assert!(train.get(train.len()).is_none());

        let (train_again, _) = ScanDataset::from_directory(dir.path()).unwrap().split(0.8, 42);
        let again: Vec<_> = (0..train_again.len()).map(|i| train_again.get(i).unwrap().path).collect();
        assert_eq!(train_paths, again);
    }

    #[test]
    fn test_batcher_shapes() {
        let dir = fixture(1, 1);
        let dataset = ScanDataset::from_directory(dir.path()).unwrap();
        let items: Vec<_> = (0..dataset.len()).filter_map(|i| dataset.get(i)).collect();

        let batcher = ScanBatcher::new(24);
        let batch: ScanBatch<TestBackend> = batcher.batch(items, &NdArrayDevice::default());

        assert_eq!(batch.images.dims(), [2, 3, 24, 24]);
        let targets = batch.targets.into_data().to_vec::<i64>().unwrap();
        assert_eq!(targets, vec![0, 1]);
    }

    #[test]
    fn test_undecodable_images_are_excluded() {
        let dir = fixture(3, 2);
        std::fs::write(dir.path().join("yes/corrupt.png"), b"not a png").unwrap();
        std::fs::write(dir.path().join("no/truncated.jpg"), [0xFF, 0xD8, 0xFF]).unwrap();

        let dataset = ScanDataset::from_directory(dir.path()).unwrap();
        assert_eq!(dataset.len(), 5);
        let paths: Vec<_> = (0..dataset.len())
            .filter_map(|i| dataset.get(i))
            .map(|item| item.path)
            .collect();
        assert!(paths.iter().all(|p| {
            let name = p.file_name().unwrap().to_string_lossy();
            name != "corrupt.png" && name != "truncated.jpg"
        }));
    }

    #[test]
    fn test_class_with_only_broken_images_is_rejected() {
        let dir = fixture(2, 0);
        std::fs::write(dir.path().join("no/broken.png"), b"garbage").unwrap();
        let err = ScanDataset::from_directory(dir.path()).unwrap_err();
        assert!(err.to_string().contains("'no'"));
    }

    #[test]
    fn test_split_ratio_out_of_range_is_clamped() {
        let dir = fixture(6, 4);
        let (train, val) = ScanDataset::from_directory(dir.path()).unwrap().split(1.5, 42);
        assert_eq!(train.len(), 10);
        assert_eq!(val.len(), 0);
        assert!(val.get(0).is_none());

        let (train, val) = ScanDataset::from_directory(dir.path()).unwrap().split(-0.3, 42);
        assert_eq!(train.len(), 0);
        assert_eq!(val.len(), 10);
    }

    #[test]
    fn test_train_ratio_must_leave_both_splits() {
        assert!(check_train_ratio(0.8).is_ok());
        for bad in [0.0, 1.0, 1.5, -0.2, f32::NAN] {
            assert!(check_train_ratio(bad).is_err(), "ratio = {}", bad);
        }
    }
}
