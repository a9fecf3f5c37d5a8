pub mod attention;
pub mod image;
pub mod norm;
pub mod question;
pub mod recurrent;
pub mod san;

pub use attention::{
    AttentionLayer, AttentionLayerConfig, AttentionOutput, AttentionStack, AttentionStackConfig,
};
pub use image::{ImageEncoder, ImageEncoderConfig};
pub use norm::{BatchNorm, BatchNormConfig};
pub use question::{
    CnnEncoder, CnnEncoderConfig, LstmEncoder, LstmEncoderConfig, QuestionEncoder,
    QuestionEncoderConfig,
};
pub use recurrent::{Lstm, LstmConfig};
pub use san::{San, SanConfig, SanOutput};

use crate::error::InvalidConfig;

fn check_non_zero(name: &'static str, value: usize) -> Result<(), InvalidConfig> {
    match value {
        0 => Err(InvalidConfig::Zero { name }),
        _ => Ok(()),
    }
}

/// Dropout rates must leave some units alive.
fn check_rate(name: &'static str, rate: f64) -> Result<(), InvalidConfig> {
    if (0.0..1.0).contains(&rate) {
        Ok(())
    } else {
        Err(InvalidConfig::Rate { name, rate })
    }
}
