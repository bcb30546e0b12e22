use std::collections::HashMap;
use std::path::Path;

pub type Symbol = u32;

pub const UNK_ID: Symbol = 0;
pub const GO_ID: Symbol = 1;
pub const EOS_ID: Symbol = 2;

/// Turns a symbol sequence into surface text for the text-based outputs.
pub trait SymbolDecoder: Send + Sync {
    fn decode(&self, symbols: &[Symbol]) -> String;
}

fn strip_eos(symbols: &[Symbol]) -> &[Symbol] {
    match symbols.split_last() {
        Some((&EOS_ID, rest)) => rest,
        _ => symbols,
    }
}

/// Writes raw ids separated by spaces.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdDecoder;

impl SymbolDecoder for IdDecoder {
    fn decode(&self, symbols: &[Symbol]) -> String {
        strip_eos(symbols)
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, Default)]
pub struct WordMap {
    words: HashMap<Symbol, String>,
}

impl WordMap {
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, Symbol)>,
        S: Into<String>,
    {
        Self {
            words: pairs.into_iter().map(|(w, id)| (id, w.into())).collect(),
        }
    }

    /// Loads a `word id` table, one entry per line.
    pub fn from_file(path: &Path) -> std::io::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut words = HashMap::new();
        for (line_no, line) in content.lines().enumerate() {
            let mut parts = line.split_whitespace();
            let (Some(word), Some(id)) = (parts.next(), parts.next()) else {
                continue;
            };
            match id.parse::<Symbol>() {
                Ok(id) => {
                    words.insert(id, word.to_string());
                }
                Err(err) => {
                    log::warn!(
                        "Skipping word map line {} in {}: {}",
                        line_no + 1,
                        path.display(),
                        err
                    );
                }
            }
        }
        log::debug!("Loaded {} words from {}", words.len(), path.display());
        Ok(Self { words })
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

impl SymbolDecoder for WordMap {
    fn decode(&self, symbols: &[Symbol]) -> String {
        strip_eos(symbols)
            .iter()
            .map(|s| match self.words.get(s) {
                Some(word) => word.clone(),
                None => s.to_string(),
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}
