//! 計算デバイスに応じたバックエンドの選択

use anyhow::Result;
use burn_autodiff::Autodiff;
use burn_ndarray::{NdArray, NdArrayDevice};
use burn_wgpu::{Wgpu, WgpuDevice};
use std::path::{Path, PathBuf};

use crate::diagnosis::ScoringFunction;
use crate::ml::{train_model, InferenceEngine, TrainingJob};
use crate::model::DeviceType;

/// モデルファイルを読み込み、分類器を返す
///
/// 起動時に1度だけ呼び出し、返した分類器をプロセス終了まで使い回します。
pub fn load_scorer(model_path: &Path, device_type: DeviceType) -> Result<Box<dyn ScoringFunction>> {
    tracing::info!("使用デバイス: {}", device_type);
    let scorer: Box<dyn ScoringFunction> = match device_type {
        DeviceType::Wgpu => Box::new(InferenceEngine::<Wgpu>::load(model_path, WgpuDevice::default())?),
        DeviceType::Cpu => Box::new(InferenceEngine::<NdArray<f32>>::load(
            model_path,
            NdArrayDevice::default(),
        )?),
    };
    Ok(scorer)
}

/// 指定デバイスで学習を実行
pub fn train_on(device_type: DeviceType, job: &TrainingJob) -> Result<PathBuf> {
    tracing::info!("{} モードで学習を開始します", device_type);
    match device_type {
        DeviceType::Wgpu => train_model::<Autodiff<Wgpu>>(job, WgpuDevice::default()),
        DeviceType::Cpu => train_model::<Autodiff<NdArray<f32>>>(job, NdArrayDevice::default()),
    }
}
