//! Serializers for n-best lists.
//!
//! Every handler receives the n-best lists of a batch together with the
//! 0-based sentence index of each list. Directory outputs name their files
//! by the 1-based index.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::{ConfigError, OutputSpec};
use crate::decoder::NBestList;
use crate::symbols::SymbolDecoder;

pub mod lattice;
pub mod nbest;
pub mod ngram;
pub mod text;
pub mod timecsv;

pub use lattice::{CombinedLatticeOutput, SparseLatticeOutput};
pub use nbest::MosesNBestOutput;
pub use ngram::NgramOutput;
pub use text::{NBestSeparateOutput, ScoreOutput, TextOutput};
pub use timecsv::TimeCsvOutput;

#[derive(thiserror::Error, Debug)]
pub enum OutputError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Lattice error: {0}")]
    Lattice(String),
    #[error("Got {lists} n-best lists but {indices} sentence indices")]
    Misaligned { lists: usize, indices: usize },
}

pub(crate) fn lattice_err(err: impl std::fmt::Display) -> OutputError {
    OutputError::Lattice(err.to_string())
}

/// Creates an output directory. An existing directory is only a warning.
pub(crate) fn create_output_dir(path: &Path, name: &str) -> Result<(), OutputError> {
    if path.is_dir() {
        log::warn!("Output {} directory '{}' already exists.", name, path.display());
        return Ok(());
    }
    match std::fs::create_dir_all(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
            log::warn!("Output {} directory '{}' already exists.", name, path.display());
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}

/// `dir/<sentence index + 1>.<ext>`
pub(crate) fn sentence_file(dir: &Path, sen_idx: usize, ext: &str) -> PathBuf {
    dir.join(format!("{}.{}", sen_idx + 1, ext))
}

/// Appends the occurrence count to repeated predictor names: `lm, lm2, lm3`.
pub fn unique_predictor_names(names: &[String]) -> Vec<String> {
    let mut counts: std::collections::HashMap<&str, usize> = std::collections::HashMap::new();
    names
        .iter()
        .map(|name| {
            let count = counts.entry(name.as_str()).or_insert(0);
            *count += 1;
            if *count == 1 {
                name.clone()
            } else {
                format!("{name}{count}")
            }
        })
        .collect()
}

/// The closed set of output formats.
pub enum OutputHandler {
    Text(TextOutput),
    Score(ScoreOutput),
    NBestSeparate(NBestSeparateOutput),
    Moses(MosesNBestOutput),
    TimeCsv(TimeCsvOutput),
    Ngram(NgramOutput),
    SparseLattice(SparseLatticeOutput),
    CombinedLattice(CombinedLatticeOutput),
}

impl OutputHandler {
    /// `predictor_names` must be the ensemble's name list, in breakdown order.
    pub fn from_spec(
        spec: &OutputSpec,
        predictor_names: Arc<[String]>,
        decoder: Arc<dyn SymbolDecoder>,
    ) -> Result<Self, ConfigError> {
        spec.validate()?;
        Ok(match spec {
            OutputSpec::Text { path } => Self::Text(TextOutput::new(path.clone(), decoder)),
            OutputSpec::Score { path } => Self::Score(ScoreOutput::new(path.clone())),
            OutputSpec::NBestSeparate { path, n } => {
                Self::NBestSeparate(NBestSeparateOutput::new(path, *n, decoder))
            }
            OutputSpec::Moses { path } => {
                Self::Moses(MosesNBestOutput::new(path.clone(), &predictor_names, decoder))
            }
            OutputSpec::TimeCsv { path } => {
                Self::TimeCsv(TimeCsvOutput::new(path.clone(), &predictor_names))
            }
            OutputSpec::Ngram {
                path,
                min_order,
                max_order,
            } => Self::Ngram(NgramOutput::new(path.clone(), *min_order, *max_order)),
            OutputSpec::SparseLattice { path, unk_id } => {
                Self::SparseLattice(SparseLatticeOutput::new(path.clone(), *unk_id))
            }
            OutputSpec::CombinedLattice { path, unk_id } => {
                Self::CombinedLattice(CombinedLatticeOutput::new(path.clone(), *unk_id))
            }
        })
    }

    pub fn write_hypos(
        &mut self,
        all_hypos: &[NBestList],
        sen_indices: &[usize],
    ) -> Result<(), OutputError> {
        if all_hypos.len() != sen_indices.len() {
            return Err(OutputError::Misaligned {
                lists: all_hypos.len(),
                indices: sen_indices.len(),
            });
        }
        match self {
            Self::Text(h) => h.write_hypos(all_hypos),
            Self::Score(h) => h.write_hypos(all_hypos),
            Self::NBestSeparate(h) => h.write_hypos(all_hypos),
            Self::Moses(h) => h.write_hypos(all_hypos, sen_indices),
            Self::TimeCsv(h) => h.write_hypos(all_hypos, sen_indices),
            Self::Ngram(h) => h.write_hypos(all_hypos, sen_indices),
            Self::SparseLattice(h) => h.write_hypos(all_hypos, sen_indices),
            Self::CombinedLattice(h) => h.write_hypos(all_hypos, sen_indices),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Score(_) => "score",
            Self::NBestSeparate(_) => "nbest_sep",
            Self::Moses(_) => "nbest",
            Self::TimeCsv(_) => "timecsv",
            Self::Ngram(_) => "ngram",
            Self::SparseLattice(_) => "sfst",
            Self::CombinedLattice(_) => "fst",
        }
    }
}
