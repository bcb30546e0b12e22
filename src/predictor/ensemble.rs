use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{Posterior, Predictor, PredictorError, PredictorState};
use crate::symbols::Symbol;

/// How the candidate sets of the individual predictors are merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidatePolicy {
    /// Keep only symbols scored by every predictor.
    #[default]
    Intersection,
    /// Keep symbols scored by any predictor; gaps are filled with
    /// [`Predictor::unk_score`].
    Union,
}

/// Score of one predictor at one step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreEntry {
    pub score: f32,
    pub weight: f32,
}

impl ScoreEntry {
    pub fn new(score: f32, weight: f32) -> Self {
        Self { score, weight }
    }

    pub fn weighted(&self) -> f32 {
        self.score * self.weight
    }
}

/// One entry per predictor, in ensemble order.
pub type StepBreakdown = Vec<ScoreEntry>;

pub fn combine(breakdown: &[ScoreEntry]) -> f32 {
    breakdown.iter().map(ScoreEntry::weighted).sum()
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    pub symbol: Symbol,
    pub score: f32,
    pub breakdown: StepBreakdown,
}

/// Result of [`PredictorEnsemble::apply_predictors`], sorted by symbol.
#[derive(Debug, Clone, Default)]
pub struct CandidateScores {
    candidates: Vec<ScoredCandidate>,
}

impl CandidateScores {
    pub fn find(&self, symbol: Symbol) -> Option<&ScoredCandidate> {
        self.candidates
            .binary_search_by_key(&symbol, |c| c.symbol)
            .ok()
            .map(|idx| &self.candidates[idx])
    }

    /// The `k` best candidates, best first. Equal scores keep symbol order.
    pub fn top(&self, k: usize) -> Vec<&ScoredCandidate> {
        let mut ranked: Vec<&ScoredCandidate> = self.candidates.iter().collect();
        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
        ranked.truncate(k);
        ranked
    }

    pub fn iter(&self) -> impl Iterator<Item = &ScoredCandidate> {
        self.candidates.iter()
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

/// Predictor states captured together, one per ensemble member.
#[derive(Debug, Clone)]
pub struct EnsembleSnapshot {
    states: Arc<[PredictorState]>,
}

impl EnsembleSnapshot {
    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn states(&self) -> &[PredictorState] {
        &self.states
    }
}

struct PredictorSlot {
    name: String,
    weight: f32,
    predictor: Box<dyn Predictor>,
}

/// Fixed, ordered set of weighted predictors driven as one unit.
///
/// The live predictor state is a cursor: it only reflects the hypothesis
/// most recently selected with [`restore`](Self::restore).
pub struct PredictorEnsemble {
    slots: Vec<PredictorSlot>,
    policy: CandidatePolicy,
    names: Arc<[String]>,
}

impl PredictorEnsemble {
    pub fn new(policy: CandidatePolicy) -> Self {
        Self {
            slots: Vec::new(),
            policy,
            names: Arc::from(Vec::new()),
        }
    }

    pub fn with_predictor<P>(mut self, name: impl Into<String>, weight: f32, predictor: P) -> Self
    where
        P: Predictor + 'static,
    {
        self.add_predictor(name, weight, predictor);
        self
    }

    pub fn add_predictor<P>(&mut self, name: impl Into<String>, weight: f32, predictor: P)
    where
        P: Predictor + 'static,
    {
        self.slots.push(PredictorSlot {
            name: name.into(),
            weight,
            predictor: Box::new(predictor),
        });
        self.names = self.slots.iter().map(|s| s.name.clone()).collect();
    }

    /// Predictor names in breakdown order. Shared with the output handlers.
    pub fn names(&self) -> Arc<[String]> {
        Arc::clone(&self.names)
    }

    pub fn weights(&self) -> Vec<f32> {
        self.slots.iter().map(|s| s.weight).collect()
    }

    pub fn policy(&self) -> CandidatePolicy {
        self.policy
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn initialize(&mut self, source: &[Symbol]) -> Result<(), PredictorError> {
        for slot in &mut self.slots {
            slot.predictor.initialize(source).map_err(|err| {
                log::error!("Predictor '{}' failed to initialize: {}", slot.name, err);
                err
            })?;
        }
        log::debug!(
            "Initialized {} predictors for source of length {}",
            self.slots.len(),
            source.len()
        );
        Ok(())
    }

    /// Scores the next symbol with every predictor and combines the results.
    pub fn apply_predictors(&self) -> Result<CandidateScores, PredictorError> {
        let posteriors = self
            .slots
            .iter()
            .map(|slot| slot.predictor.predict_next())
            .collect::<Result<Vec<Posterior>, _>>()?;

        let Some((first, rest)) = posteriors.split_first() else {
            return Ok(CandidateScores::default());
        };

        let ids: Vec<Symbol> = match self.policy {
            CandidatePolicy::Intersection => first
                .symbols()
                .filter(|id| rest.iter().all(|p| p.contains(*id)))
                .collect(),
            CandidatePolicy::Union => posteriors
                .iter()
                .flat_map(|p| p.symbols())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect(),
        };

        let unk_scores: Vec<Option<f32>> = match self.policy {
            CandidatePolicy::Intersection => vec![None; self.slots.len()],
            CandidatePolicy::Union => self
                .slots
                .iter()
                .zip(&posteriors)
                .map(|(slot, p)| Some(slot.predictor.unk_score(p)))
                .collect(),
        };

        let mut candidates = Vec::with_capacity(ids.len());
        for id in ids {
            let breakdown: StepBreakdown = self
                .slots
                .iter()
                .zip(&posteriors)
                .zip(&unk_scores)
                .map(|((slot, p), unk)| {
                    let score = p
                        .get(id)
                        .or(*unk)
                        .unwrap_or(f32::NEG_INFINITY);
                    ScoreEntry::new(score, slot.weight)
                })
                .collect();
            let score = combine(&breakdown);
            if score.is_nan() || score == f32::NEG_INFINITY {
                continue;
            }
            candidates.push(ScoredCandidate {
                symbol: id,
                score,
                breakdown,
            });
        }

        Ok(CandidateScores { candidates })
    }

    /// Advances every predictor by `symbol`.
    ///
    /// All-or-nothing: if a predictor rejects the symbol, the ones that
    /// already consumed it are put back and its error is returned.
    pub fn consume(&mut self, symbol: Symbol) -> Result<(), PredictorError> {
        let mut previous = Vec::with_capacity(self.slots.len());
        for idx in 0..self.slots.len() {
            let slot = &mut self.slots[idx];
            let before = slot.predictor.snapshot();
            if let Err(err) = slot.predictor.consume(symbol) {
                log::debug!(
                    "Predictor '{}' rejected symbol {}: {}",
                    slot.name,
                    symbol,
                    err
                );
                self.roll_back(&previous);
                return Err(err);
            }
            previous.push(before);
        }
        Ok(())
    }

    /// Restores the leading predictors from `states`, logging failures.
    fn roll_back(&mut self, states: &[PredictorState]) {
        for (slot, state) in self.slots.iter_mut().zip(states) {
            if let Err(err) = slot.predictor.restore(state) {
                log::error!("Rollback of predictor '{}' failed: {}", slot.name, err);
            }
        }
    }

    pub fn snapshot(&self) -> EnsembleSnapshot {
        EnsembleSnapshot {
            states: self.slots.iter().map(|s| s.predictor.snapshot()).collect(),
        }
    }

    /// Puts every predictor back into the snapshotted state.
    ///
    /// All-or-nothing: if any predictor rejects its state, the ones already
    /// restored are rolled back and `StateConsistency` is returned.
    pub fn restore(&mut self, snapshot: &EnsembleSnapshot) -> Result<(), PredictorError> {
        if snapshot.len() != self.slots.len() {
            return Err(PredictorError::StateConsistency(format!(
                "snapshot holds {} states for {} predictors",
                snapshot.len(),
                self.slots.len()
            )));
        }

        let mut previous = Vec::with_capacity(self.slots.len());
        for idx in 0..self.slots.len() {
            let slot = &mut self.slots[idx];
            let before = slot.predictor.snapshot();
            if let Err(err) = slot.predictor.restore(&snapshot.states[idx]) {
                let message = format!("predictor '{}' rejected its state: {}", slot.name, err);
                self.roll_back(&previous);
                return Err(PredictorError::StateConsistency(message));
            }
            previous.push(before);
        }
        Ok(())
    }
}
