//! 工具函数

mod text;

pub use text::{mask_secret, truncate};
