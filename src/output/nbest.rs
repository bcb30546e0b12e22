use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;

use super::{unique_predictor_names, OutputError};
use crate::decoder::{FullHypothesis, NBestList};
use crate::symbols::SymbolDecoder;

/// Moses n-best format: `idx ||| text ||| name= score ... ||| total`.
///
/// The feature column holds each predictor's unweighted score summed over
/// the whole hypothesis. Sentence indices are written as given (0-based).
pub struct MosesNBestOutput {
    path: PathBuf,
    feature_names: Vec<String>,
    decoder: Arc<dyn SymbolDecoder>,
}

impl MosesNBestOutput {
    pub fn new(path: PathBuf, predictor_names: &[String], decoder: Arc<dyn SymbolDecoder>) -> Self {
        let feature_names = unique_predictor_names(predictor_names)
            .into_iter()
            .map(|name| name.replace('_', "0"))
            .collect();
        Self {
            path,
            feature_names,
            decoder,
        }
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn format_line(&self, sen_idx: usize, hypo: &FullHypothesis) -> String {
        let mut features = String::new();
        for (i, name) in self.feature_names.iter().enumerate() {
            if i > 0 {
                features.push(' ');
            }
            features.push_str(&format!("{}= {:.6}", name, hypo.predictor_total(i)));
        }
        format!(
            "{} ||| {} ||| {} ||| {:.6}",
            sen_idx,
            self.decoder.decode(&hypo.symbols),
            features,
            hypo.total_score
        )
    }

    pub fn write_hypos(
        &mut self,
        all_hypos: &[NBestList],
        sen_indices: &[usize],
    ) -> Result<(), OutputError> {
        let mut writer = BufWriter::new(File::create(&self.path)?);
        let mut lines = 0;
        for (&sen_idx, hypos) in sen_indices.iter().zip(all_hypos) {
            for hypo in hypos {
                writeln!(writer, "{}", self.format_line(sen_idx, hypo))?;
                lines += 1;
            }
        }
        writer.flush()?;
        log::info!("Wrote {} n-best entries to {}", lines, self.path.display());
        Ok(())
    }
}
