use serde::{Deserialize, Serialize};

use crate::predictor::{EnsembleSnapshot, ScoredCandidate, StepBreakdown};
use crate::symbols::{Symbol, EOS_ID};

pub use crate::predictor::ScoreEntry;

/// Applied to the cumulative score when a hypothesis is completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreAdjustment {
    #[default]
    Identity,
    /// Divides by the number of emitted symbols, EOS included.
    LengthNormalized,
}

impl ScoreAdjustment {
    pub fn apply(&self, score: f32, len: usize) -> f32 {
        match self {
            Self::Identity => score,
            Self::LengthNormalized if len > 0 => score / len as f32,
            Self::LengthNormalized => score,
        }
    }
}

/// A search node: the prefix so far and the ensemble state that continues it.
#[derive(Debug, Clone)]
pub struct PartialHypothesis {
    pub prefix: Vec<Symbol>,
    pub score: f32,
    pub breakdown: Vec<StepBreakdown>,
    pub state: EnsembleSnapshot,
}

impl PartialHypothesis {
    pub fn new(state: EnsembleSnapshot) -> Self {
        Self {
            prefix: Vec::new(),
            score: 0.0,
            breakdown: Vec::new(),
            state,
        }
    }

    pub fn last_symbol(&self) -> Option<Symbol> {
        self.prefix.last().copied()
    }

    pub fn is_complete(&self) -> bool {
        self.last_symbol() == Some(EOS_ID)
    }

    pub fn len(&self) -> usize {
        self.prefix.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prefix.is_empty()
    }

    /// Appends `candidate` and its scores. The caller stores the new state.
    pub fn push(&mut self, candidate: &ScoredCandidate) {
        self.prefix.push(candidate.symbol);
        self.score += candidate.score;
        self.breakdown.push(candidate.breakdown.clone());
    }

    pub fn finalize(self, adjustment: ScoreAdjustment) -> FullHypothesis {
        let total_score = adjustment.apply(self.score, self.prefix.len());
        FullHypothesis {
            symbols: self.prefix,
            score: self.score,
            total_score,
            breakdown: self.breakdown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FullHypothesis {
    pub symbols: Vec<Symbol>,
    /// Unadjusted sum of the combined step scores.
    pub score: f32,
    pub total_score: f32,
    pub breakdown: Vec<StepBreakdown>,
}

impl FullHypothesis {
    /// Sum of predictor `idx`'s unweighted scores over all steps.
    pub fn predictor_total(&self, idx: usize) -> f32 {
        self.predictor_scores(idx).sum()
    }

    pub fn predictor_scores(&self, idx: usize) -> impl Iterator<Item = f32> + '_ {
        self.breakdown
            .iter()
            .map(move |step| step.get(idx).map(|e| e.score).unwrap_or(0.0))
    }
}

/// Completed hypotheses for one input, best `total_score` first.
///
/// Sorting is stable: equal scores keep discovery order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NBestList {
    hypos: Vec<FullHypothesis>,
}

impl NBestList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_hypos(mut hypos: Vec<FullHypothesis>) -> Self {
        hypos.sort_by(|a, b| b.total_score.total_cmp(&a.total_score));
        Self { hypos }
    }

    /// Inserts after every hypothesis scoring at least as well.
    pub fn insert(&mut self, hypo: FullHypothesis) {
        let pos = self
            .hypos
            .partition_point(|h| h.total_score.total_cmp(&hypo.total_score).is_ge());
        self.hypos.insert(pos, hypo);
    }

    pub fn truncate(&mut self, n: usize) {
        self.hypos.truncate(n);
    }

    pub fn best(&self) -> Option<&FullHypothesis> {
        self.hypos.first()
    }

    pub fn last(&self) -> Option<&FullHypothesis> {
        self.hypos.last()
    }

    pub fn get(&self, rank: usize) -> Option<&FullHypothesis> {
        self.hypos.get(rank)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FullHypothesis> {
        self.hypos.iter()
    }

    pub fn as_slice(&self) -> &[FullHypothesis] {
        &self.hypos
    }

    pub fn len(&self) -> usize {
        self.hypos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hypos.is_empty()
    }
}

impl<'a> IntoIterator for &'a NBestList {
    type Item = &'a FullHypothesis;
    type IntoIter = std::slice::Iter<'a, FullHypothesis>;

    fn into_iter(self) -> Self::IntoIter {
        self.hypos.iter()
    }
}

impl From<Vec<FullHypothesis>> for NBestList {
    fn from(hypos: Vec<FullHypothesis>) -> Self {
        Self::from_hypos(hypos)
    }
}
