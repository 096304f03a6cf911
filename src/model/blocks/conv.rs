use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::pool::{MaxPool2d, MaxPool2dConfig};
use burn::nn::{BatchNorm, BatchNormConfig, Dropout, DropoutConfig, PaddingConfig2d};
use burn::prelude::*;
use burn::tensor::activation;

/// Shape and regularisation of one [`ConvBlock`].
#[derive(Debug, Clone, PartialEq)]
pub struct ConvBlockConfig {
    pub in_channels: usize,
    pub out_channels: usize,
    pub kernel_size: usize,
    pub stride: usize,
    pub padding: usize,
    pub batch_norm: bool,
    pub dropout: f64,
    pub pool: Option<usize>,
}

impl ConvBlockConfig {
    pub fn new(in_channels: usize, out_channels: usize, kernel_size: usize) -> Self {
        Self {
            in_channels,
            out_channels,
            kernel_size,
            stride: 1,
            padding: 0,
            batch_norm: false,
            dropout: 0.0,
            pool: None,
        }
    }

    pub fn with_stride(mut self, stride: usize) -> Self {
        self.stride = stride;
        self
    }

    pub fn with_padding(mut self, padding: usize) -> Self {
        self.padding = padding;
        self
    }

    pub fn with_batch_norm(mut self) -> Self {
        self.batch_norm = true;
        self
    }

    pub fn with_dropout(mut self, prob: f64) -> Self {
        self.dropout = prob;
        self
    }

    pub fn with_pool(mut self, size: usize) -> Self {
        self.pool = Some(size);
        self
    }

    /// Side length of the output map for a square input of `size` pixels.
    pub fn output_size(&self, size: usize) -> usize {
        let out = (size + 2 * self.padding - self.kernel_size) / self.stride + 1;
        match self.pool {
            Some(pool) => out / pool,
            None => out,
        }
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> ConvBlock<B> {
        let conv = Conv2dConfig::new(
            [self.in_channels, self.out_channels],
            [self.kernel_size, self.kernel_size],
        )
        .with_stride([self.stride, self.stride])
        .with_padding(PaddingConfig2d::Explicit(self.padding, self.padding))
        .init(device);

        ConvBlock {
            conv,
            norm: self
                .batch_norm
                .then(|| BatchNormConfig::new(self.out_channels).init(device)),
            dropout: DropoutConfig::new(self.dropout).init(),
            pool: self.pool.map(|size| {
                MaxPool2dConfig::new([size, size])
                    .with_strides([size, size])
                    .init()
            }),
        }
    }
}

/// Convolution followed by optional batch norm, dropout, max pooling and a ReLU.
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    conv: Conv2d<B>,
    norm: Option<BatchNorm<B, 2>>,
    dropout: Dropout,
    pool: Option<MaxPool2d>,
}

impl<B: Backend> ConvBlock<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(x);
        let x = match &self.norm {
            Some(norm) => norm.forward(x),
            None => x,
        };
        let x = self.dropout.forward(x);
        let x = match &self.pool {
            Some(pool) => pool.forward(x),
            None => x,
        };
        activation::relu(x)
    }
}
