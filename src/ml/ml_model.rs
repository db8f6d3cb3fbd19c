//! 機械学習モデルの共通定義
//!
//! 脳MRIの腫瘍有無を判定する二値分類CNNと関連する設定を提供します。

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        loss::CrossEntropyLossConfig,
        pool::{MaxPool2d, MaxPool2dConfig},
        Dropout, DropoutConfig, Linear, LinearConfig, Relu,
    },
    tensor::{activation::sigmoid, backend::Backend, Int, Tensor},
    train::ClassificationOutput,
};

/// モデル設定
#[derive(Config, Debug)]
pub struct ModelConfig {
    /// 入力画像サイズ（正方形）
    #[config(default = 150)]
    pub image_size: usize,
    /// 全結合層のユニット数
    #[config(default = 512)]
    pub dense_units: usize,
    /// ドロップアウト率
    #[config(default = 0.5)]
    pub dropout: f64,
}

impl ModelConfig {
    /// 3回の {Conv 3x3 + MaxPool 2x2} 後の特徴マップの一辺
    ///
    /// 入力が小さすぎる場合は `None` を返します。
    pub fn feature_map_size(&self) -> Option<usize> {
        let mut size = self.image_size;
        for _ in 0..3 {
            size = size.checked_sub(2)? / 2;
        }
        (size > 0).then_some(size)
    }

    /// モデルを初期化
    ///
    /// 入力サイズは事前に検証しておくこと (最小22x22)。
    pub fn init<B: Backend>(&self, device: &B::Device) -> anyhow::Result<TumorClassifier<B>> {
        let feature_map_size = self.feature_map_size().ok_or_else(|| {
            anyhow::anyhow!("入力サイズが小さすぎます: {} (最小22x22が必要)", self.image_size)
        })?;

        // 特徴次元 d = 128チャネル * feature_map_size * feature_map_size
        let d = 128 * feature_map_size * feature_map_size;

        tracing::debug!(
            image_size = self.image_size,
            feature_map_size,
            flatten = d,
            dense = self.dense_units,
            "モデルを初期化します"
        );

        let pool = || MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init();

        Ok(TumorClassifier {
            conv1: Conv2dConfig::new([3, 32], [3, 3]).init(device),
            pool1: pool(),
            conv2: Conv2dConfig::new([32, 64], [3, 3]).init(device),
            pool2: pool(),
            conv3: Conv2dConfig::new([64, 128], [3, 3]).init(device),
            pool3: pool(),
            fc1: LinearConfig::new(d, self.dense_units).init(device),
            dropout: DropoutConfig::new(self.dropout).init(),
            fc2: LinearConfig::new(self.dense_units, 1).init(device),
            activation: Relu::new(),
        })
    }
}

/// 腫瘍判定用CNNモデル
///
/// # アーキテクチャ
/// - {Conv 3x3 (no padding) + ReLU + MaxPool 2x2} x 3層 (32, 64, 128チャネル)
/// - Flatten
/// - FC: d -> dense_units + ReLU + Dropout
/// - FC: dense_units -> 1 (ロジット)
/// - Sigmoid (スコア算出時)
///
/// 150x150入力では 150 -> 148 -> 74 -> 72 -> 36 -> 34 -> 17 となり、
/// 特徴次元は 128 * 17 * 17 = 36992 です。
#[derive(Module, Debug)]
pub struct TumorClassifier<B: Backend> {
    conv1: Conv2d<B>, // 3 -> 32
    pool1: MaxPool2d,
    conv2: Conv2d<B>, // 32 -> 64
    pool2: MaxPool2d,
    conv3: Conv2d<B>, // 64 -> 128
    pool3: MaxPool2d,

    fc1: Linear<B>, // d -> dense_units
    dropout: Dropout,
    fc2: Linear<B>, // dense_units -> 1

    activation: Relu,
}

impl<B: Backend> TumorClassifier<B> {
    /// 順伝播
    ///
    /// # 引数
    /// - `images`: バッチ画像 [batch_size, 3, size, size]
    ///
    /// # 戻り値
    /// - 腫瘍クラスのロジット [batch_size, 1]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let [batch_size, _, _, _] = images.dims();

        let x = self.conv1.forward(images);
        let x = self.activation.forward(x);
        let x = self.pool1.forward(x);

        let x = self.conv2.forward(x);
        let x = self.activation.forward(x);
        let x = self.pool2.forward(x);

        let x = self.conv3.forward(x);
        let x = self.activation.forward(x);
        let x = self.pool3.forward(x);

        let [_, c, h, w] = x.dims();
        let x = x.reshape([batch_size, c * h * w]);

        let x = self.fc1.forward(x);
        let x = self.activation.forward(x);
        let x = self.dropout.forward(x);

        self.fc2.forward(x)
    }

    /// 腫瘍スコア (0.0〜1.0) を計算
    ///
    /// # 戻り値
    /// - スコア [batch_size, 1]
    pub fn score(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        sigmoid(self.forward(images))
    }

    /// 順伝播と損失計算（学習用）
    ///
    /// 単一ロジット z を2クラスのロジット [0, z] に展開します。
    /// softmax([0, z])[1] = sigmoid(z) なので、交差エントロピーは
    /// 二値交差エントロピーと一致し、精度メトリクスもそのまま使えます。
    pub fn forward_classification(
        &self,
        images: Tensor<B, 4>,
        targets: Tensor<B, 1, Int>,
    ) -> ClassificationOutput<B> {
        let logit = self.forward(images);
        let output = Tensor::cat(vec![logit.zeros_like(), logit], 1);
        let loss = CrossEntropyLossConfig::new()
            .init(&output.device())
            .forward(output.clone(), targets.clone());

        ClassificationOutput::new(loss, output, targets)
    }
}
