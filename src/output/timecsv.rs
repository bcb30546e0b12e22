use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use super::{create_output_dir, sentence_file, unique_predictor_names, OutputError};
use crate::decoder::NBestList;

/// One tab-separated file per sentence tracing every predictor's
/// accumulated score and weight over prefix positions.
pub struct TimeCsvOutput {
    dir: PathBuf,
    names: Vec<String>,
}

impl TimeCsvOutput {
    pub fn new(dir: PathBuf, predictor_names: &[String]) -> Self {
        Self {
            dir,
            names: unique_predictor_names(predictor_names),
        }
    }

    pub fn render(&self, hypos: &NBestList) -> String {
        let n_predictors = self.names.len();
        let placeholder = "\t-".repeat(n_predictors * 2);
        let mut out = String::from("Time");
        for rank in 1..=hypos.len() {
            for name in &self.names {
                out.push_str(&format!("\t{name}-{rank}"));
            }
            for name in &self.names {
                out.push_str(&format!("\t{name}-{rank}_weight"));
            }
        }
        out.push('\n');

        let max_len = hypos.iter().map(|h| h.symbols.len()).max().unwrap_or(0);
        for pos in 0..=max_len {
            out.push_str(&pos.to_string());
            for hypo in hypos {
                let Some(step) = hypo.breakdown.get(pos) else {
                    out.push_str(&placeholder);
                    continue;
                };
                for pred_idx in 0..n_predictors {
                    let accumulated: f32 = hypo.predictor_scores(pred_idx).take(pos + 1).sum();
                    out.push_str(&format!("\t{accumulated:.6}"));
                }
                for pred_idx in 0..n_predictors {
                    match step.get(pred_idx) {
                        Some(entry) => out.push_str(&format!("\t{:.6}", entry.weight)),
                        None => out.push_str("\t-"),
                    }
                }
            }
            out.push('\n');
        }
        out
    }

    pub fn write_hypos(
        &mut self,
        all_hypos: &[NBestList],
        sen_indices: &[usize],
    ) -> Result<(), OutputError> {
        create_output_dir(&self.dir, "TimeCSV")?;
        for (&sen_idx, hypos) in sen_indices.iter().zip(all_hypos) {
            let path = sentence_file(&self.dir, sen_idx, "csv");
            let mut writer = BufWriter::new(File::create(&path)?);
            writer.write_all(self.render(hypos).as_bytes())?;
            writer.flush()?;
        }
        log::info!(
            "Wrote {} score traces to {}",
            all_hypos.len(),
            self.dir.display()
        );
        Ok(())
    }
}
