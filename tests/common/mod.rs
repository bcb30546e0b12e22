#![allow(dead_code)]

use std::collections::HashMap;

use ensemble_decode::{Posterior, Predictor, PredictorError, PredictorState, Symbol, EOS_ID};

/// Scores looked up by the consumed history; unknown histories fall back
/// to `default_scores`.
#[derive(Clone, Default)]
pub struct TablePredictor {
    table: HashMap<Vec<Symbol>, Vec<(Symbol, f32)>>,
    default_scores: Vec<(Symbol, f32)>,
    history: Vec<Symbol>,
    pub require_source: bool,
}

impl TablePredictor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(mut self, history: &[Symbol], scores: &[(Symbol, f32)]) -> Self {
        self.table.insert(history.to_vec(), scores.to_vec());
        self
    }

    pub fn with_default(mut self, scores: &[(Symbol, f32)]) -> Self {
        self.default_scores = scores.to_vec();
        self
    }

    /// Scores `score` for each symbol of `target` in sequence, EOS appended.
    pub fn forcing(target: &[Symbol], score: f32) -> Self {
        let mut full = target.to_vec();
        full.push(EOS_ID);
        let mut predictor = Self::new();
        for pos in 0..full.len() {
            predictor = predictor.with_entry(&full[..pos], &[(full[pos], score)]);
        }
        predictor
    }
}

impl Predictor for TablePredictor {
    fn initialize(&mut self, source: &[Symbol]) -> Result<(), PredictorError> {
        if self.require_source && source.is_empty() {
            return Err(PredictorError::Initialization("empty source".into()));
        }
        self.history.clear();
        Ok(())
    }

    fn predict_next(&self) -> Result<Posterior, PredictorError> {
        let scores = self
            .table
            .get(&self.history)
            .unwrap_or(&self.default_scores);
        Ok(Posterior::sparse(scores.iter().copied()))
    }

    fn consume(&mut self, symbol: Symbol) -> Result<(), PredictorError> {
        self.history.push(symbol);
        Ok(())
    }

    fn snapshot(&self) -> PredictorState {
        PredictorState::new(self.history.clone())
    }

    fn restore(&mut self, state: &PredictorState) -> Result<(), PredictorError> {
        self.history = state.expect_ref::<Vec<Symbol>>("table")?.clone();
        Ok(())
    }
}

/// Dense posterior over `vocab` symbols that depends on the source and on
/// every consumed symbol, so a wrong state shows up as different scores.
pub struct HashingPredictor {
    vocab: u32,
    seed: u64,
    acc: u64,
    steps: usize,
}

impl HashingPredictor {
    pub fn new(vocab: u32) -> Self {
        Self {
            vocab,
            seed: 0,
            acc: 0,
            steps: 0,
        }
    }
}

impl Predictor for HashingPredictor {
    fn initialize(&mut self, source: &[Symbol]) -> Result<(), PredictorError> {
        self.seed = source
            .iter()
            .fold(17u64, |acc, &s| acc.wrapping_mul(31).wrapping_add(s as u64));
        self.acc = self.seed;
        self.steps = 0;
        Ok(())
    }

    fn predict_next(&self) -> Result<Posterior, PredictorError> {
        let scores = (0..self.vocab)
            .map(|s| {
                let h = self.acc.wrapping_mul(6364136223846793005).wrapping_add((s as u64).wrapping_mul(1442695040888963407));
                let bucket = (h >> 33) % 50;
                let mut score = -(bucket as f32) / 10.0 - 0.05;
                if s == EOS_ID {
                    score -= 2.0 / (self.steps as f32 + 1.0);
                }
                score
            })
            .collect();
        Ok(Posterior::dense(scores))
    }

    fn consume(&mut self, symbol: Symbol) -> Result<(), PredictorError> {
        if symbol >= self.vocab {
            return Err(PredictorError::InvalidSymbol { symbol });
        }
        self.acc = self.acc.wrapping_mul(1099511628211).wrapping_add(symbol as u64 + 1);
        self.steps += 1;
        Ok(())
    }

    fn snapshot(&self) -> PredictorState {
        PredictorState::new((self.acc, self.steps))
    }

    fn restore(&mut self, state: &PredictorState) -> Result<(), PredictorError> {
        let &(acc, steps) = state.expect_ref::<(u64, usize)>("hashing")?;
        self.acc = acc;
        self.steps = steps;
        Ok(())
    }
}
