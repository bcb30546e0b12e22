use thiserror::Error;

use crate::config::ConfigError;
use crate::decoder::DecodeError;
use crate::output::OutputError;
use crate::predictor::PredictorError;

/// Unified crate errors.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Predictor: {0}")]
    Predictor(#[from] PredictorError),

    #[error("Decoding: {0}")]
    Decode(#[from] DecodeError),

    #[error("Output: {0}")]
    Output(#[from] OutputError),

    #[error("Config: {0}")]
    Config(#[from] ConfigError),
}

impl Error {
    /// Errors that only affect the current input; batch processing moves on.
    pub fn is_per_input(&self) -> bool {
        matches!(self, Self::Predictor(_) | Self::Decode(_))
    }
}
