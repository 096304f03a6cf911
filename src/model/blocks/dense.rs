use burn::nn::{Dropout, DropoutConfig, Linear, LinearConfig};
use burn::prelude::*;
use burn::tensor::activation;

/// Fully connected layer with ReLU and dropout.
#[derive(Module, Debug)]
pub struct DenseBlock<B: Backend> {
    linear: Linear<B>,
    dropout: Dropout,
}

impl<B: Backend> DenseBlock<B> {
    pub fn new(device: &B::Device, in_features: usize, out_features: usize, dropout: f64) -> Self {
        Self {
            linear: LinearConfig::new(in_features, out_features).init(device),
            dropout: DropoutConfig::new(dropout).init(),
        }
    }

    pub fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = activation::relu(self.linear.forward(x));
        self.dropout.forward(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    #[test]
    fn maps_features_to_hidden_width() {
        let device = Default::default();
        let block = DenseBlock::<NdArray>::new(&device, 800, 500, 0.5);

        let y = block.forward(Tensor::zeros([3, 800], &device));

        assert_eq!(y.dims(), [3, 500]);
    }
}
