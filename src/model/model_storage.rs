//! モデルとメタデータの永続化
//!
//! Tar.gz形式でモデルとメタデータを1ファイルに統合して保存・読み込みします。
//!
//! ファイル構成（tar.gz内部）:
//! - metadata.json   - メタデータ（クラスラベル、入力サイズなど）
//! - model.bin       - モデルの重み（バイナリ）

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tar::{Archive, Builder};

use crate::model::model_metadata::ModelMetadata;

const METADATA_ENTRY: &str = "metadata.json";
const WEIGHTS_ENTRY: &str = "model.bin";

/// 保存先パスを `.tar.gz` に正規化
pub fn artifact_path(output_path: &Path) -> PathBuf {
    if output_path.extension().and_then(|s| s.to_str()) == Some("gz") {
        output_path.to_path_buf()
    } else {
        output_path.with_extension("tar.gz")
    }
}

/// メタデータと共にモデルをTar.gz形式で保存
///
/// 実際に書き込んだパスを返します。
pub fn save_model_with_metadata(
    output_path: &Path,
    metadata: &ModelMetadata,
    model_binary: &[u8],
) -> Result<PathBuf> {
    let tar_gz_path = artifact_path(output_path);

    // 親ディレクトリが存在しない場合は作成
    if let Some(parent) = tar_gz_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create parent directory: {:?}", parent))?;
    }

    let tar_gz_file = File::create(&tar_gz_path)
        .with_context(|| format!("Failed to create tar.gz file: {:?}", tar_gz_path))?;

    let encoder = GzEncoder::new(tar_gz_file, Compression::default());
    let mut tar_builder = Builder::new(encoder);

    let json_str = metadata.to_json_string()?;
    append_entry(&mut tar_builder, METADATA_ENTRY, json_str.as_bytes())?;
    append_entry(&mut tar_builder, WEIGHTS_ENTRY, model_binary)?;

    // gzストリームまで閉じる
    tar_builder
        .into_inner()
        .context("Failed to finalize tar archive")?
        .finish()
        .context("Failed to finalize gzip stream")?;

    Ok(tar_gz_path)
}

fn append_entry<W: std::io::Write>(builder: &mut Builder<W>, name: &str, bytes: &[u8]) -> Result<()> {
    let mut header = tar::Header::new_gnu();
    header.set_path(name)?;
    header.set_size(bytes.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder
        .append(&header, bytes)
        .with_context(|| format!("Failed to add {} to tar", name))
}

fn open_archive(tar_gz_path: &Path) -> Result<Archive<GzDecoder<File>>> {
    let tar_gz_file = File::open(tar_gz_path)
        .with_context(|| format!("Failed to open tar.gz file: {:?}", tar_gz_path))?;
    Ok(Archive::new(GzDecoder::new(tar_gz_file)))
}

/// Tar.gzからモデルメタデータを読み込む
pub fn load_metadata(tar_gz_path: &Path) -> Result<ModelMetadata> {
    let mut archive = open_archive(tar_gz_path)?;

    for entry in archive.entries()? {
        let mut entry = entry?;
        if entry.path()?.to_str() == Some(METADATA_ENTRY) {
            let mut json_str = String::new();
            entry.read_to_string(&mut json_str)?;
            return ModelMetadata::from_json_string(&json_str);
        }
    }

    Err(anyhow::anyhow!("metadata.json not found in tar.gz archive"))
}

/// メタデータとモデルバイナリを共に読み込む
pub fn load_model_with_metadata(tar_gz_path: &Path) -> Result<(ModelMetadata, Vec<u8>)> {
    let mut archive = open_archive(tar_gz_path)?;

    let mut metadata_opt: Option<ModelMetadata> = None;
    let mut model_binary_opt: Option<Vec<u8>> = None;

    for entry in archive.entries()? {
        let mut entry = entry?;
        let name = entry.path()?.to_str().map(str::to_string);

        match name.as_deref() {
            Some(METADATA_ENTRY) => {
                let mut json_str = String::new();
                entry.read_to_string(&mut json_str)?;
                metadata_opt = Some(ModelMetadata::from_json_string(&json_str)?);
            }
            Some(WEIGHTS_ENTRY) => {
                let mut buffer = Vec::new();
                entry.read_to_end(&mut buffer)?;
                model_binary_opt = Some(buffer);
            }
            _ => {}
        }
    }

    match (metadata_opt, model_binary_opt) {
        (Some(metadata), Some(binary)) => Ok((metadata, binary)),
        (None, _) => Err(anyhow::anyhow!("metadata.json not found in tar.gz archive")),
        (_, None) => Err(anyhow::anyhow!("model.bin not found in tar.gz archive")),
    }
}

/// メタデータを表示用の文字列にする
pub fn metadata_summary(metadata: &ModelMetadata) -> String {
    [
        "=== モデルメタデータ ===".to_string(),
        format!("クラスラベル: {}", metadata.class_labels.join(", ")),
        format!("腫瘍クラス: {}", metadata.positive_label().unwrap_or("-")),
        format!("モデル入力サイズ: {0}x{0}", metadata.image_size),
        format!("全結合ユニット数: {}", metadata.dense_units),
        format!("学習エポック数: {}", metadata.num_epochs),
        format!(
            "サンプル数: 学習 {} / 検証 {}",
            metadata.train_samples, metadata.valid_samples
        ),
        format!("学習日時: {}", metadata.trained_at),
        "========================".to_string(),
    ]
    .join("\n")
}
