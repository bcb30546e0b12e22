use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::decoder::ScoreAdjustment;
use crate::predictor::CandidatePolicy;
use crate::symbols::UNK_ID;

const THREAD_ENV: &str = "DECODE_THREADS";

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecoderKind {
    #[default]
    Forced,
    Beam,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    pub kind: DecoderKind,
    pub beam_size: usize,
    pub nbest: usize,
    /// Maximum number of emitted symbols, EOS included. 0 derives the
    /// limit from the source length.
    pub max_len: usize,
    pub max_seconds: Option<f32>,
    pub policy: CandidatePolicy,
    pub adjustment: ScoreAdjustment,
    /// Beam search only. Off by default; never applies once a positive
    /// step score has been seen.
    pub early_stopping: bool,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            kind: DecoderKind::Forced,
            beam_size: 4,
            nbest: 1,
            max_len: 0,
            max_seconds: None,
            policy: CandidatePolicy::Intersection,
            adjustment: ScoreAdjustment::Identity,
            early_stopping: false,
        }
    }
}

impl DecoderConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides("DECODE_");
        config
    }

    pub fn apply_env_overrides(&mut self, prefix: &str) {
        let parse_env = |suffix: &str| std::env::var(format!("{prefix}{suffix}")).ok();
        let apply = |suffix: &str, target: &mut usize| {
            if let Some(v) = parse_env(suffix) {
                match v.parse() {
                    Ok(parsed) => *target = parsed,
                    Err(err) => log::warn!("Ignoring invalid {prefix}{suffix} value '{v}': {err}"),
                }
            }
        };

        apply("MAX_LEN", &mut self.max_len);
        apply("NBEST", &mut self.nbest);
        apply("BEAM", &mut self.beam_size);
        self.beam_size = self.beam_size.max(1);
        self.nbest = self.nbest.max(1);

        if let Some(v) = parse_env("MAX_SECONDS") {
            match v.parse::<f32>() {
                Ok(secs) if secs > 0.0 => self.max_seconds = Some(secs),
                Ok(_) => self.max_seconds = None,
                Err(err) => log::warn!("Ignoring invalid {prefix}MAX_SECONDS value '{v}': {err}"),
            }
        }
    }

    /// Step limit for a source of `source_len` symbols.
    pub fn step_limit(&self, source_len: usize) -> usize {
        if self.max_len > 0 {
            self.max_len
        } else {
            2 * source_len + 10
        }
    }

    pub fn time_limit(&self) -> Option<Duration> {
        self.max_seconds
            .filter(|s| s.is_finite() && *s > 0.0)
            .map(Duration::from_secs_f32)
    }
}

/// One output serializer, selected by its `format` tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "snake_case")]
pub enum OutputSpec {
    Text {
        path: PathBuf,
    },
    Score {
        path: PathBuf,
    },
    #[serde(rename = "nbest_sep")]
    NBestSeparate {
        path: PathBuf,
        n: usize,
    },
    #[serde(rename = "nbest")]
    Moses {
        path: PathBuf,
    },
    #[serde(rename = "timecsv")]
    TimeCsv {
        path: PathBuf,
    },
    Ngram {
        path: PathBuf,
        #[serde(default = "default_min_order")]
        min_order: usize,
        #[serde(default = "default_max_order")]
        max_order: usize,
    },
    #[serde(rename = "sfst")]
    SparseLattice {
        path: PathBuf,
        #[serde(default = "default_unk_id")]
        unk_id: u32,
    },
    #[serde(rename = "fst")]
    CombinedLattice {
        path: PathBuf,
        #[serde(default = "default_unk_id")]
        unk_id: u32,
    },
}

fn default_min_order() -> usize {
    1
}

fn default_max_order() -> usize {
    4
}

fn default_unk_id() -> u32 {
    999_999_998
}

impl OutputSpec {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            Self::NBestSeparate { n: 0, .. } => Err(ConfigError::Invalid(
                "nbest_sep needs at least one rank".into(),
            )),
            Self::Ngram {
                min_order,
                max_order,
                ..
            } if *min_order == 0 || min_order > max_order => Err(ConfigError::Invalid(format!(
                "ngram orders must satisfy 1 <= min_order <= max_order, got {min_order}..{max_order}"
            ))),
            Self::SparseLattice { unk_id, .. } | Self::CombinedLattice { unk_id, .. }
                if *unk_id == UNK_ID =>
            {
                Err(ConfigError::Invalid(
                    "lattice unk_id must differ from the epsilon label 0".into(),
                ))
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub decoder: DecoderConfig,
    pub outputs: Vec<OutputSpec>,
}

impl RunConfig {
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = serde_json::from_str(&content)?;
        config.decoder.apply_env_overrides("DECODE_");
        for output in &config.outputs {
            output.validate()?;
        }
        log::info!(
            "Loaded run config from {} ({} outputs)",
            path.display(),
            config.outputs.len()
        );
        Ok(config)
    }
}

/// Worker count for parallel batches.
pub fn resolve_thread_count() -> usize {
    if let Ok(value) = std::env::var(THREAD_ENV) {
        match value.parse::<usize>() {
            Ok(parsed) if parsed > 0 => {
                log::info!("Using {THREAD_ENV} override: {} threads", parsed);
                return parsed;
            }
            Ok(_) => log::warn!("Ignoring {THREAD_ENV}=0"),
            Err(err) => {
                log::warn!("Ignoring invalid {THREAD_ENV} value '{}': {}", value, err);
            }
        }
    }

    let physical = num_cpus::get_physical();
    log::info!(
        "{THREAD_ENV} not set; defaulting to {} physical cores",
        physical
    );
    physical.max(1)
}
