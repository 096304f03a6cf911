pub mod conv;
pub mod dense;

pub use conv::{ConvBlock, ConvBlockConfig};
pub use dense::DenseBlock;
