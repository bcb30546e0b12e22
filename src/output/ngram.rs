use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use super::{create_output_dir, sentence_file, OutputError};
use crate::decoder::NBestList;
use crate::symbols::{Symbol, EOS_ID, GO_ID};

/// `ln(Σ exp(x))`, stable for large magnitudes.
pub fn log_sum_exp(values: &[f32]) -> f32 {
    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    if max == f32::NEG_INFINITY {
        return f32::NEG_INFINITY;
    }
    max + values.iter().map(|v| (v - max).exp()).sum::<f32>().ln()
}

/// MBR n-gram posteriors over one n-best list.
///
/// Hypothesis scores are renormalized into a distribution; an n-gram's
/// posterior is the mass of the hypotheses containing it at least once,
/// capped at 1; an n-gram found in every hypothesis gets exactly 1.
/// Entries keep first-seen order.
pub fn ngram_posteriors(
    hypos: &NBestList,
    min_order: usize,
    max_order: usize,
) -> Vec<(Vec<Symbol>, f32)> {
    let totals: Vec<f32> = hypos.iter().map(|h| h.total_score).collect();
    let norm = log_sum_exp(&totals);

    let mut order: Vec<Vec<Symbol>> = Vec::new();
    let mut members: HashMap<Vec<Symbol>, Vec<usize>> = HashMap::new();
    for (hypo_idx, hypo) in hypos.iter().enumerate() {
        let mut padded = Vec::with_capacity(hypo.symbols.len() + 2);
        padded.push(GO_ID);
        padded.extend_from_slice(&hypo.symbols);
        if padded.last() != Some(&EOS_ID) {
            padded.push(EOS_ID);
        }

        for n in min_order.max(1)..=max_order {
            for ngram in padded.windows(n) {
                let hits = members.entry(ngram.to_vec()).or_insert_with(|| {
                    order.push(ngram.to_vec());
                    Vec::new()
                });
                if hits.last() != Some(&hypo_idx) {
                    hits.push(hypo_idx);
                }
            }
        }
    }

    order
        .into_iter()
        .map(|ngram| {
            let hits = &members[&ngram];
            if hits.len() == totals.len() {
                return (ngram, 1.0);
            }
            let log_masses: Vec<f32> = hits
                .iter()
                .map(|&idx| totals[idx] - norm)
                .collect();
            let posterior = log_sum_exp(&log_masses).exp().min(1.0);
            (ngram, posterior)
        })
        .collect()
}

pub struct NgramOutput {
    dir: PathBuf,
    min_order: usize,
    max_order: usize,
}

impl NgramOutput {
    pub fn new(dir: PathBuf, min_order: usize, max_order: usize) -> Self {
        Self {
            dir,
            min_order,
            max_order,
        }
    }

    pub fn write_hypos(
        &mut self,
        all_hypos: &[NBestList],
        sen_indices: &[usize],
    ) -> Result<(), OutputError> {
        create_output_dir(&self.dir, "ngram")?;
        for (&sen_idx, hypos) in sen_indices.iter().zip(all_hypos) {
            let path = sentence_file(&self.dir, sen_idx, "txt");
            let mut writer = BufWriter::new(File::create(&path)?);
            for (ngram, posterior) in ngram_posteriors(hypos, self.min_order, self.max_order) {
                let ngram: Vec<String> = ngram.iter().map(|s| s.to_string()).collect();
                writeln!(writer, "{} : {:.6}", ngram.join(" "), posterior)?;
            }
            writer.flush()?;
        }
        Ok(())
    }
}
