use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::OutputError;
use crate::decoder::NBestList;
use crate::symbols::SymbolDecoder;

/// First-best text, one line per input.
///
/// Writes the whole file on each call unless [`open`](Self::open) was
/// called, in which case lines are appended and flushed one at a time.
pub struct TextOutput {
    path: PathBuf,
    decoder: Arc<dyn SymbolDecoder>,
    writer: Option<BufWriter<File>>,
}

impl TextOutput {
    pub fn new(path: PathBuf, decoder: Arc<dyn SymbolDecoder>) -> Self {
        Self {
            path,
            decoder,
            writer: None,
        }
    }

    pub fn open(&mut self) -> Result<(), OutputError> {
        self.writer = Some(BufWriter::new(File::create(&self.path)?));
        Ok(())
    }

    pub fn close(&mut self) -> Result<(), OutputError> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }
        Ok(())
    }

    pub fn write_hypos(&mut self, all_hypos: &[NBestList]) -> Result<(), OutputError> {
        let decoder = Arc::clone(&self.decoder);
        let line = |hypos: &NBestList| {
            hypos
                .best()
                .map(|h| decoder.decode(&h.symbols))
                .unwrap_or_default()
        };

        if let Some(writer) = self.writer.as_mut() {
            for hypos in all_hypos {
                writeln!(writer, "{}", line(hypos))?;
                writer.flush()?;
            }
            return Ok(());
        }

        let mut writer = BufWriter::new(File::create(&self.path)?);
        for hypos in all_hypos {
            writeln!(writer, "{}", line(hypos))?;
        }
        writer.flush()?;
        log::info!("Wrote {} lines to {}", all_hypos.len(), self.path.display());
        Ok(())
    }
}

/// Per-step scores of the first predictor for each first-best hypothesis.
pub struct ScoreOutput {
    path: PathBuf,
}

impl ScoreOutput {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn write_hypos(&mut self, all_hypos: &[NBestList]) -> Result<(), OutputError> {
        let mut writer = BufWriter::new(File::create(&self.path)?);
        for hypos in all_hypos {
            let scores: Vec<f32> = hypos
                .best()
                .map(|h| h.predictor_scores(0).collect())
                .unwrap_or_default();
            writeln!(writer, "{:?}", scores)?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// Rank `i` of every input goes to `<path>_<i>.txt`.
///
/// Inputs with fewer hypotheses repeat their last one so that every file
/// has exactly one line per input.
pub struct NBestSeparateOutput {
    paths: Vec<PathBuf>,
    decoder: Arc<dyn SymbolDecoder>,
}

impl NBestSeparateOutput {
    pub fn new(path: &Path, n: usize, decoder: Arc<dyn SymbolDecoder>) -> Self {
        let paths = (0..n)
            .map(|i| {
                let mut name = path.as_os_str().to_owned();
                name.push(format!("_{i}.txt"));
                PathBuf::from(name)
            })
            .collect();
        Self { paths, decoder }
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn write_hypos(&mut self, all_hypos: &[NBestList]) -> Result<(), OutputError> {
        let mut writers = self
            .paths
            .iter()
            .map(|p| File::create(p).map(BufWriter::new))
            .collect::<Result<Vec<_>, _>>()?;

        for hypos in all_hypos {
            for (rank, writer) in writers.iter_mut().enumerate() {
                let text = hypos
                    .get(rank)
                    .or_else(|| hypos.last())
                    .map(|h| self.decoder.decode(&h.symbols))
                    .unwrap_or_default();
                writeln!(writer, "{}", text)?;
            }
        }
        for writer in &mut writers {
            writer.flush()?;
        }
        Ok(())
    }
}
