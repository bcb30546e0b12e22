use std::time::Instant;

use super::{expand, score_next, Budget, DecodeError, DecodeInput, Decoder, NBestList, PartialHypothesis};
use crate::config::DecoderConfig;
use crate::decoder::ScoreAdjustment;
use crate::predictor::{PredictorEnsemble, ScoredCandidate};

/// Fixed-width beam search over the ensemble.
///
/// Every hypothesis carries its own ensemble snapshot; the ensemble is
/// restored to it before each scoring or consuming call.
pub struct BeamDecoder {
    config: DecoderConfig,
}

struct Proposal {
    parent: usize,
    candidate: ScoredCandidate,
    score: f32,
}

impl BeamDecoder {
    pub fn new(config: DecoderConfig) -> Self {
        Self { config }
    }

    fn beam_size(&self) -> usize {
        self.config.beam_size.max(1)
    }

    /// Once `nbest` completed hypotheses beat every live one, search may
    /// stop, provided no step score seen so far was positive: with
    /// non-positive steps and no adjustment a live hypothesis can only get
    /// worse. A positive score disables the cut for the rest of the input.
    fn can_stop_early(
        &self,
        completed: &NBestList,
        beam: &[PartialHypothesis],
        scores_non_positive: bool,
    ) -> bool {
        if !self.config.early_stopping
            || !scores_non_positive
            || self.config.adjustment != ScoreAdjustment::Identity
        {
            return false;
        }
        let Some(worst_kept) = completed.get(self.config.nbest.max(1) - 1) else {
            return false;
        };
        beam.iter().all(|h| h.score <= worst_kept.total_score)
    }
}

impl Decoder for BeamDecoder {
    fn decode(
        &mut self,
        ensemble: &mut PredictorEnsemble,
        input: &DecodeInput,
    ) -> Result<NBestList, DecodeError> {
        let decode_start = Instant::now();
        let beam_size = self.beam_size();
        let budget = Budget::new(&self.config, input.source.len());

        ensemble.initialize(&input.source)?;
        let mut beam = vec![PartialHypothesis::new(ensemble.snapshot())];
        let mut completed = NBestList::new();
        let mut steps = 0;
        let mut scores_non_positive = true;

        while !beam.is_empty() && !budget.exhausted(steps) {
            let mut proposals = Vec::new();
            for (parent, hypo) in beam.iter().enumerate() {
                let scores = score_next(ensemble, hypo)?;
                if scores.iter().any(|c| c.score > 0.0) {
                    scores_non_positive = false;
                }
                proposals.extend(scores.top(beam_size).into_iter().map(|c| Proposal {
                    parent,
                    candidate: c.clone(),
                    score: hypo.score + c.score,
                }));
            }
            if proposals.is_empty() && steps == 0 {
                return Err(DecodeError::NoCandidates { position: 0 });
            }

            proposals.sort_by(|a, b| b.score.total_cmp(&a.score));
            proposals.truncate(beam_size);

            let mut next = Vec::with_capacity(proposals.len());
            for proposal in &proposals {
                let child = expand(ensemble, &beam[proposal.parent], &proposal.candidate)?;
                if child.is_complete() {
                    completed.insert(child.finalize(self.config.adjustment));
                } else {
                    next.push(child);
                }
            }
            beam = next;
            steps += 1;

            log::debug!(
                "Beam step {}: {} live, {} completed",
                steps,
                beam.len(),
                completed.len()
            );

            if self.can_stop_early(&completed, &beam, scores_non_positive) {
                break;
            }
        }

        if completed.is_empty() {
            log::warn!(
                "No hypothesis reached EOS within {} steps; {} live hypotheses dropped",
                steps,
                beam.len()
            );
            return Err(DecodeError::BudgetExceeded { steps });
        }

        completed.truncate(self.config.nbest.max(1));
        log::debug!(
            "Beam decode completed in {:?} ({} steps, best score: {:.4})",
            decode_start.elapsed(),
            steps,
            completed.best().map(|h| h.total_score).unwrap_or(f32::NEG_INFINITY)
        );
        Ok(completed)
    }
}
