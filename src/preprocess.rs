//! MRI画像の前処理
//!
//! 任意サイズ・任意カラーモードの画像を、モデル入力用の固定サイズ RGB テンソル
//! (値域 0.0〜1.0) に変換します。リサイズはアスペクト比を保ったまま拡大縮小し、
//! はみ出した部分を中央で切り取ります (Lanczos3)。単純な引き伸ばしはしません。

use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, ImageReader};
use std::io::Cursor;
use std::path::Path;

use crate::error::{Result, ScanError};

/// モデル入力サイズ (正方形、ピクセル)
pub const DEFAULT_INPUT_SIZE: usize = 150;

/// 受け付ける画像ファイルの拡張子
pub const SCAN_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// 正規化済みの入力バッチ (バッチサイズ1)
///
/// データは `[1, 3, size, size]` の順 (チャネル優先) で平坦化されています。
#[derive(Debug, Clone, PartialEq)]
pub struct ScanTensor {
    data: Vec<f32>,
    size: usize,
}

impl ScanTensor {
    /// 画像をリサイズ・正規化してテンソルを作成
    pub fn from_image(image: &DynamicImage, size: usize) -> Self {
        let side = size as u32;
        let fitted = image.resize_to_fill(side, side, FilterType::Lanczos3);
        let rgb = fitted.to_rgb8();

        let mut data = Vec::with_capacity(3 * size * size);
        for channel in 0..3 {
            for y in 0..side {
                for x in 0..side {
                    let pixel = rgb.get_pixel(x, y);
                    data.push(pixel[channel] as f32 / 255.0);
                }
            }
        }

        Self { data, size }
    }

    /// 画像ファイルを読み込んでテンソルを作成
    pub fn from_path(path: &Path, size: usize) -> Result<Self> {
        let image = load_scan(path)?;
        Ok(Self::from_image(&image, size))
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// テンソル形状 `[batch, channels, height, width]`
    pub fn shape(&self) -> [usize; 4] {
        [1, 3, self.size, self.size]
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }
}

/// 画像ファイルを読み込む
///
/// 形式は拡張子ではなく内容から判定します。
pub fn load_scan(path: &Path) -> Result<DynamicImage> {
    let bytes = std::fs::read(path).map_err(|source| ScanError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    decode_scan(&bytes)
}

/// メモリ上の画像データをデコード
///
/// PNG と JPEG 以外の形式は `UnsupportedFormat` で拒否します。
pub fn decode_scan(bytes: &[u8]) -> Result<DynamicImage> {
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| ScanError::Decode(image::ImageError::IoError(e)))?;
    match reader.format() {
        Some(ImageFormat::Png | ImageFormat::Jpeg) | None => Ok(reader.decode()?),
        Some(other) => Err(ScanError::UnsupportedFormat(other)),
    }
}

/// スキャン画像として扱う拡張子かどうか
pub fn has_scan_extension(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| SCAN_EXTENSIONS.contains(&ext.as_str()))
}
