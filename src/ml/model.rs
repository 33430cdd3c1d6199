use anyhow::{bail, Result};
use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
        Dropout, DropoutConfig,
        Linear, LinearConfig,
        PaddingConfig2d, Relu,
    },
    prelude::*,
};

/// Output channels of the last conv layer
const CONV5_CHANNELS: usize = 256;

// ─── Feature network + classifier ────────────────────────────────────────────
// AlexNet layout (single tower, no LRN):
//
//   conv1 11×11/4  96  → relu → pool 3/2
//   conv2  5×5 p2 256  → relu → pool 3/2
//   conv3  3×3 p1 384  → relu
//   conv4  3×3 p1 384  → relu
//   conv5  3×3 p1 256  → relu → pool 3/2
//   fc6 → relu → dropout
//   fc7 → relu → dropout        = semantic features
//   fc8                         = class logits
#[derive(Config, Debug)]
pub struct FeatureNetConfig {
    pub num_classes: usize,
    pub image_size:  usize,
    pub feature_dim: usize,
    pub dropout:     f64,
}

impl FeatureNetConfig {
    /// Side length of the conv5 feature map after the last pool.
    pub fn spatial_size(&self) -> Result<usize> {
        fn pool(x: usize) -> Option<usize> {
            x.checked_sub(3).map(|v| v / 2 + 1)
        }

        let conv1 = self.image_size.checked_sub(11).map(|v| v / 4 + 1);
        let size  = conv1.and_then(pool).and_then(pool).and_then(pool);

        match size {
            Some(s) if s > 0 => Ok(s),
            _ => bail!(
                "image_size {} is too small for the AlexNet feature extractor (minimum 67)",
                self.image_size
            ),
        }
    }

    /// Number of inputs to fc6
    pub fn flatten_size(&self) -> Result<usize> {
        let s = self.spatial_size()?;
        Ok(CONV5_CHANNELS * s * s)
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<FeatureNet<B>> {
        let flatten = self.flatten_size()?;

        let conv = |c_in: usize, c_out: usize, k: usize, stride: usize, pad: usize| -> Conv2d<B> {
            Conv2dConfig::new([c_in, c_out], [k, k])
                .with_stride([stride, stride])
                .with_padding(PaddingConfig2d::Explicit(pad, pad))
                .init(device)
        };

        Ok(FeatureNet {
            conv1: conv(3, 96, 11, 4, 0),
            conv2: conv(96, 256, 5, 1, 2),
            conv3: conv(256, 384, 3, 1, 1),
            conv4: conv(384, 384, 3, 1, 1),
            conv5: conv(384, CONV5_CHANNELS, 3, 1, 1),
            pool:  MaxPool2dConfig::new([3, 3]).with_strides([2, 2]).init(),
            fc6:   LinearConfig::new(flatten, self.feature_dim).init(device),
            fc7:   LinearConfig::new(self.feature_dim, self.feature_dim).init(device),
            fc8:   LinearConfig::new(self.feature_dim, self.num_classes).init(device),
            dropout:    DropoutConfig::new(self.dropout).init(),
            activation: Relu::new(),
        })
    }
}

#[derive(Module, Debug)]
pub struct FeatureNet<B: Backend> {
    pub conv1: Conv2d<B>,
    pub conv2: Conv2d<B>,
    pub conv3: Conv2d<B>,
    pub conv4: Conv2d<B>,
    pub conv5: Conv2d<B>,
    pub pool:  MaxPool2d,
    pub fc6:   Linear<B>,
    pub fc7:   Linear<B>,
    pub fc8:   Linear<B>,
    pub dropout:    Dropout,
    pub activation: Relu,
}

pub struct ModelOutput<B: Backend> {
    /// fc7 activations — [batch, feature_dim]
    pub features: Tensor<B, 2>,
    /// fc8 outputs — [batch, num_classes]
    pub logits:   Tensor<B, 2>,
}

impl<B: Backend> FeatureNet<B> {
    /// images: [batch, 3, size, size] → features + logits
    pub fn forward(&self, images: Tensor<B, 4>) -> ModelOutput<B> {
        let x = self.pool.forward(self.activation.forward(self.conv1.forward(images)));
        let x = self.pool.forward(self.activation.forward(self.conv2.forward(x)));
        let x = self.activation.forward(self.conv3.forward(x));
        let x = self.activation.forward(self.conv4.forward(x));
        let x = self.pool.forward(self.activation.forward(self.conv5.forward(x)));

        let x = x.flatten::<2>(1, 3);

        let x = self.dropout.forward(self.activation.forward(self.fc6.forward(x)));
        let features = self.dropout.forward(self.activation.forward(self.fc7.forward(x)));
        let logits   = self.fc8.forward(features.clone());

        ModelOutput { features, logits }
    }
}

// ─── Metric embedding head ───────────────────────────────────────────────────
// Maps semantic features into the space where the triplet loss
// pulls same-class samples together across domains. Trained with
// its own optimiser and learning rate; never used for prediction.
#[derive(Config, Debug)]
pub struct MetricNetConfig {
    pub input_dim:  usize,
    pub hidden_dim: usize,
    pub embed_dim:  usize,
}

impl MetricNetConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> MetricNet<B> {
        MetricNet {
            fc1: LinearConfig::new(self.input_dim, self.hidden_dim).init(device),
            fc2: LinearConfig::new(self.hidden_dim, self.embed_dim).init(device),
            activation: Relu::new(),
        }
    }
}

#[derive(Module, Debug)]
pub struct MetricNet<B: Backend> {
    pub fc1: Linear<B>,
    pub fc2: Linear<B>,
    pub activation: Relu,
}

impl<B: Backend> MetricNet<B> {
    /// features: [batch, input_dim] → embeddings: [batch, embed_dim]
    pub fn forward(&self, features: Tensor<B, 2>) -> Tensor<B, 2> {
        self.fc2.forward(self.activation.forward(self.fc1.forward(features)))
    }
}
