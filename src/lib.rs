//! Decoding with ensembles of stateful next-symbol predictors.
//!
//! Decoders drive a [`PredictorEnsemble`] through
//! `initialize -> (apply -> consume)*` while each hypothesis carries an
//! explicit snapshot of the ensemble state. The resulting n-best lists are
//! written by the [`output`] handlers.

pub mod config;
pub mod decoder;
pub mod error;
pub mod output;
pub mod predictor;
pub mod symbols;

pub use config::{resolve_thread_count, DecoderConfig, DecoderKind, OutputSpec, RunConfig};
pub use decoder::{
    create_decoder, decode_batch, decode_batch_parallel, run, write_outputs, BatchOutcome,
    BeamDecoder, DecodeError, DecodeInput, Decoder, ForcedDecoder, FullHypothesis, NBestList,
    PartialHypothesis, ScoreAdjustment,
};
pub use error::Error;
pub use output::{OutputError, OutputHandler};
pub use predictor::{
    CandidatePolicy, EnsembleSnapshot, Posterior, Predictor, PredictorEnsemble, PredictorError,
    PredictorState, ScoreEntry,
};
pub use symbols::{IdDecoder, Symbol, SymbolDecoder, WordMap, EOS_ID, GO_ID, UNK_ID};
