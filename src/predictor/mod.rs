//! Scoring models queried by the decoders.
//!
//! A predictor holds mutable state that depends on the symbols consumed so
//! far. Decoders never rely on that live state directly: they capture it with
//! [`Predictor::snapshot`] and put it back with [`Predictor::restore`] before
//! every scoring call made on behalf of a hypothesis.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::symbols::Symbol;

pub mod ensemble;

pub use ensemble::{
    CandidatePolicy, CandidateScores, EnsembleSnapshot, PredictorEnsemble, ScoreEntry,
    ScoredCandidate, StepBreakdown,
};

#[derive(thiserror::Error, Debug)]
pub enum PredictorError {
    #[error("Initialization failed: {0}")]
    Initialization(String),
    #[error("Symbol {symbol} was not offered as a candidate")]
    InvalidSymbol { symbol: Symbol },
    #[error("State does not belong to this predictor: {0}")]
    StateMismatch(String),
    #[error("Model error: {0}")]
    Model(String),
    #[error("Ensemble state is inconsistent: {0}")]
    StateConsistency(String),
}

/// Opaque, immutable snapshot of one predictor's internal state.
#[derive(Clone)]
pub struct PredictorState(Arc<dyn Any + Send + Sync>);

impl PredictorState {
    pub fn new<T: Any + Send + Sync>(state: T) -> Self {
        Self(Arc::new(state))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    /// Like [`downcast_ref`](Self::downcast_ref) but reports a mismatch as
    /// an error naming the `owner` predictor.
    pub fn expect_ref<T: Any>(&self, owner: &str) -> Result<&T, PredictorError> {
        self.downcast_ref::<T>().ok_or_else(|| {
            PredictorError::StateMismatch(format!(
                "{owner} expected {}",
                std::any::type_name::<T>()
            ))
        })
    }
}

impl fmt::Debug for PredictorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PredictorState(..)")
    }
}

/// Next-symbol log-scores, kept sorted by symbol id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Posterior {
    entries: Vec<(Symbol, f32)>,
}

impl Posterior {
    /// Full-vocabulary distribution: index `i` holds the score of symbol `i`.
    pub fn dense(scores: Vec<f32>) -> Self {
        Self {
            entries: scores
                .into_iter()
                .enumerate()
                .map(|(i, s)| (i as Symbol, s))
                .collect(),
        }
    }

    /// Sparse candidate set. Later duplicates replace earlier ones.
    pub fn sparse<I>(scores: I) -> Self
    where
        I: IntoIterator<Item = (Symbol, f32)>,
    {
        let mut entries: Vec<(Symbol, f32)> = scores.into_iter().collect();
        entries.reverse();
        entries.sort_by_key(|(id, _)| *id);
        entries.dedup_by_key(|(id, _)| *id);
        Self { entries }
    }

    pub fn get(&self, symbol: Symbol) -> Option<f32> {
        self.entries
            .binary_search_by_key(&symbol, |(id, _)| *id)
            .ok()
            .map(|idx| self.entries[idx].1)
    }

    pub fn contains(&self, symbol: Symbol) -> bool {
        self.get(symbol).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Symbol, f32)> + '_ {
        self.entries.iter().copied()
    }

    pub fn symbols(&self) -> impl Iterator<Item = Symbol> + '_ {
        self.entries.iter().map(|(id, _)| *id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Scoring contract every model plugged into a [`PredictorEnsemble`] implements.
pub trait Predictor: Send {
    /// Resets the predictor for a new source sequence.
    fn initialize(&mut self, source: &[Symbol]) -> Result<(), PredictorError>;

    /// Scores the next symbol given the current state. Must not mutate state.
    fn predict_next(&self) -> Result<Posterior, PredictorError>;

    /// Score for a symbol missing from `posterior` under the union policy.
    fn unk_score(&self, _posterior: &Posterior) -> f32 {
        f32::NEG_INFINITY
    }

    fn consume(&mut self, symbol: Symbol) -> Result<(), PredictorError>;

    fn snapshot(&self) -> PredictorState;

    fn restore(&mut self, state: &PredictorState) -> Result<(), PredictorError>;
}

impl<P: Predictor + ?Sized> Predictor for Box<P> {
    fn initialize(&mut self, source: &[Symbol]) -> Result<(), PredictorError> {
        (**self).initialize(source)
    }

    fn predict_next(&self) -> Result<Posterior, PredictorError> {
        (**self).predict_next()
    }

    fn unk_score(&self, posterior: &Posterior) -> f32 {
        (**self).unk_score(posterior)
    }

    fn consume(&mut self, symbol: Symbol) -> Result<(), PredictorError> {
        (**self).consume(symbol)
    }

    fn snapshot(&self) -> PredictorState {
        (**self).snapshot()
    }

    fn restore(&mut self, state: &PredictorState) -> Result<(), PredictorError> {
        (**self).restore(state)
    }
}
