//! Forced decoding: scores a known target sequence instead of searching.

use std::time::Instant;

use super::{score_next, Budget, DecodeError, DecodeInput, Decoder, NBestList, PartialHypothesis};
use crate::config::DecoderConfig;
use crate::predictor::PredictorEnsemble;
use crate::symbols::{Symbol, EOS_ID};

pub struct ForcedDecoder {
    config: DecoderConfig,
}

impl ForcedDecoder {
    pub fn new(config: DecoderConfig) -> Self {
        Self { config }
    }

    fn expand_forced(
        &self,
        ensemble: &mut PredictorEnsemble,
        hypo: &mut PartialHypothesis,
        target: &[Symbol],
    ) -> Result<(), DecodeError> {
        let position = hypo.len();
        let required = target[position];
        let scores = score_next(ensemble, hypo)?;
        let candidate = scores
            .find(required)
            .ok_or(DecodeError::SymbolNotScored {
                symbol: required,
                position,
            })?;

        hypo.push(candidate);
        ensemble.consume(required)?;
        hypo.state = ensemble.snapshot();
        Ok(())
    }
}

impl Decoder for ForcedDecoder {
    fn decode(
        &mut self,
        ensemble: &mut PredictorEnsemble,
        input: &DecodeInput,
    ) -> Result<NBestList, DecodeError> {
        let decode_start = Instant::now();
        let mut target = input.target.clone().ok_or(DecodeError::MissingTarget)?;
        if target.last() != Some(&EOS_ID) {
            target.push(EOS_ID);
        }
        if let Some(eos) = target.iter().position(|&s| s == EOS_ID) {
            target.truncate(eos + 1);
        }

        let budget = if self.config.max_len > 0 {
            Budget::new(&self.config, input.source.len())
        } else {
            Budget::with_steps(&self.config, target.len())
        };
        if target.len() > budget.max_steps() {
            log::warn!(
                "Target of length {} exceeds the step budget of {}",
                target.len(),
                budget.max_steps()
            );
            return Err(DecodeError::BudgetExceeded {
                steps: budget.max_steps(),
            });
        }

        ensemble.initialize(&input.source)?;
        let mut hypo = PartialHypothesis::new(ensemble.snapshot());
        while !hypo.is_complete() {
            if budget.exhausted(hypo.len()) {
                return Err(DecodeError::BudgetExceeded { steps: hypo.len() });
            }
            self.expand_forced(ensemble, &mut hypo, &target)?;
        }

        let full = hypo.finalize(self.config.adjustment);
        log::debug!(
            "Forced decode completed in {:?} (length: {}, score: {:.4})",
            decode_start.elapsed(),
            full.symbols.len(),
            full.total_score
        );
        Ok(NBestList::from_hypos(vec![full]))
    }
}
