use std::time::{Duration, Instant};

use crate::config::{DecoderConfig, DecoderKind};
use crate::predictor::{CandidateScores, PredictorEnsemble, PredictorError, ScoredCandidate};
use crate::symbols::Symbol;

pub mod batch;
pub mod beam;
pub mod forced;
pub mod hypothesis;

pub use batch::{decode_batch, decode_batch_parallel, run, write_outputs, BatchOutcome};
pub use beam::BeamDecoder;
pub use forced::ForcedDecoder;
pub use hypothesis::{FullHypothesis, NBestList, PartialHypothesis, ScoreAdjustment, ScoreEntry};

#[derive(thiserror::Error, Debug)]
pub enum DecodeError {
    #[error("Predictor: {0}")]
    Predictor(#[from] PredictorError),
    #[error("Required symbol {symbol} at position {position} was not scored by the ensemble")]
    SymbolNotScored { symbol: Symbol, position: usize },
    #[error("Forced decoding needs a target sequence")]
    MissingTarget,
    #[error("Decoding budget exhausted after {steps} steps without completing a hypothesis")]
    BudgetExceeded { steps: usize },
    #[error("Ensemble offered no candidates at position {position}")]
    NoCandidates { position: usize },
}

/// One sentence to decode. `target` is only used by forced decoding.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodeInput {
    pub source: Vec<Symbol>,
    pub target: Option<Vec<Symbol>>,
}

impl DecodeInput {
    pub fn new(source: Vec<Symbol>) -> Self {
        Self {
            source,
            target: None,
        }
    }

    pub fn with_target(mut self, target: Vec<Symbol>) -> Self {
        self.target = Some(target);
        self
    }
}

pub trait Decoder {
    /// Decodes one input with `ensemble`, which is re-initialized for it.
    fn decode(
        &mut self,
        ensemble: &mut PredictorEnsemble,
        input: &DecodeInput,
    ) -> Result<NBestList, DecodeError>;
}

pub fn create_decoder(config: &DecoderConfig) -> Box<dyn Decoder + Send> {
    match config.kind {
        DecoderKind::Forced => Box::new(ForcedDecoder::new(config.clone())),
        DecoderKind::Beam => Box::new(BeamDecoder::new(config.clone())),
    }
}

/// Step and wall-clock limits for one input.
pub(crate) struct Budget {
    max_steps: usize,
    started: Instant,
    time_limit: Option<Duration>,
}

impl Budget {
    pub(crate) fn new(config: &DecoderConfig, source_len: usize) -> Self {
        Self {
            max_steps: config.step_limit(source_len),
            started: Instant::now(),
            time_limit: config.time_limit(),
        }
    }

    pub(crate) fn with_steps(config: &DecoderConfig, max_steps: usize) -> Self {
        Self {
            max_steps,
            started: Instant::now(),
            time_limit: config.time_limit(),
        }
    }

    pub(crate) fn max_steps(&self) -> usize {
        self.max_steps
    }

    pub(crate) fn exhausted(&self, steps: usize) -> bool {
        steps >= self.max_steps
            || self
                .time_limit
                .is_some_and(|limit| self.started.elapsed() >= limit)
    }
}

/// Selects `hypo` on the ensemble and scores its next symbol.
pub(crate) fn score_next(
    ensemble: &mut PredictorEnsemble,
    hypo: &PartialHypothesis,
) -> Result<CandidateScores, DecodeError> {
    ensemble.restore(&hypo.state)?;
    Ok(ensemble.apply_predictors()?)
}

/// Builds the child of `hypo` that emits `candidate`.
pub(crate) fn expand(
    ensemble: &mut PredictorEnsemble,
    hypo: &PartialHypothesis,
    candidate: &ScoredCandidate,
) -> Result<PartialHypothesis, DecodeError> {
    ensemble.restore(&hypo.state)?;
    ensemble.consume(candidate.symbol)?;
    let mut child = PartialHypothesis {
        prefix: hypo.prefix.clone(),
        score: hypo.score,
        breakdown: hypo.breakdown.clone(),
        state: ensemble.snapshot(),
    };
    child.push(candidate);
    Ok(child)
}
