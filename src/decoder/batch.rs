//! Decoding many inputs and handing the results to the output handlers.
//!
//! A failure on one input is logged and recorded, and the batch moves on.
//! Parallel batches give every worker its own ensemble; a live ensemble is
//! never shared between threads.

use std::sync::Arc;
use std::time::Instant;

use super::{create_decoder, DecodeError, DecodeInput, Decoder, NBestList};
use crate::config::RunConfig;
use crate::error::Error;
use crate::output::{OutputError, OutputHandler};
use crate::predictor::PredictorEnsemble;
use crate::symbols::SymbolDecoder;

#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub nbest: Vec<NBestList>,
    /// 0-based sentence index of each entry in `nbest`.
    pub indices: Vec<usize>,
    pub failures: Vec<(usize, DecodeError)>,
}

impl BatchOutcome {
    fn record(&mut self, idx: usize, result: Result<NBestList, DecodeError>) {
        match result {
            Ok(list) => {
                log::info!(
                    "Sentence {}: {} hypotheses, best score {:.4}",
                    idx + 1,
                    list.len(),
                    list.best()
                        .map(|h| h.total_score)
                        .unwrap_or(f32::NEG_INFINITY)
                );
                self.nbest.push(list);
                self.indices.push(idx);
            }
            Err(err) => {
                log::error!("Decoding sentence {} failed: {}", idx + 1, err);
                self.failures.push((idx, err));
            }
        }
    }

    fn append(&mut self, other: BatchOutcome) {
        self.nbest.extend(other.nbest);
        self.indices.extend(other.indices);
        self.failures.extend(other.failures);
    }
}

fn decode_range<D: Decoder + ?Sized>(
    decoder: &mut D,
    ensemble: &mut PredictorEnsemble,
    inputs: &[DecodeInput],
    first_index: usize,
) -> BatchOutcome {
    let mut outcome = BatchOutcome::default();
    for (offset, input) in inputs.iter().enumerate() {
        outcome.record(first_index + offset, decoder.decode(ensemble, input));
    }
    outcome
}

pub fn decode_batch<D: Decoder + ?Sized>(
    decoder: &mut D,
    ensemble: &mut PredictorEnsemble,
    inputs: &[DecodeInput],
) -> BatchOutcome {
    let start = Instant::now();
    let outcome = decode_range(decoder, ensemble, inputs, 0);
    log::info!(
        "Decoded {} sentences in {:?} ({} failed)",
        inputs.len(),
        start.elapsed(),
        outcome.failures.len()
    );
    outcome
}

/// Splits `inputs` into contiguous chunks, one per worker. `factory` builds
/// a fresh decoder and ensemble inside each worker.
pub fn decode_batch_parallel<F, E>(
    factory: F,
    inputs: &[DecodeInput],
    threads: usize,
) -> Result<BatchOutcome, E>
where
    F: Fn() -> Result<(Box<dyn Decoder + Send>, PredictorEnsemble), E> + Sync,
    E: Send,
{
    let start = Instant::now();
    if inputs.is_empty() {
        return Ok(BatchOutcome::default());
    }
    let workers = threads.clamp(1, inputs.len());
    let chunk_size = inputs.len().div_ceil(workers);
    let factory = &factory;

    let results: Vec<Result<BatchOutcome, E>> = std::thread::scope(|scope| {
        let handles: Vec<_> = inputs
            .chunks(chunk_size)
            .enumerate()
            .map(|(chunk_idx, chunk)| {
                scope.spawn(move || -> Result<BatchOutcome, E> {
                    let (mut decoder, mut ensemble) = factory()?;
                    Ok(decode_range(
                        decoder.as_mut(),
                        &mut ensemble,
                        chunk,
                        chunk_idx * chunk_size,
                    ))
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|handle| match handle.join() {
                Ok(result) => result,
                Err(panic) => std::panic::resume_unwind(panic),
            })
            .collect()
    });

    let mut outcome = BatchOutcome::default();
    for result in results {
        outcome.append(result?);
    }
    log::info!(
        "Decoded {} sentences on {} workers in {:?} ({} failed)",
        inputs.len(),
        workers,
        start.elapsed(),
        outcome.failures.len()
    );
    Ok(outcome)
}

/// Runs every handler over the same lists. Any output error aborts the run.
pub fn write_outputs(
    handlers: &mut [OutputHandler],
    outcome: &BatchOutcome,
) -> Result<(), OutputError> {
    for handler in handlers.iter_mut() {
        handler.write_hypos(&outcome.nbest, &outcome.indices)?;
    }
    Ok(())
}

/// Decodes `inputs` sequentially as configured by `config` and writes every
/// configured output. Handlers are built before decoding starts so a bad
/// output spec fails the run early.
pub fn run(
    config: &RunConfig,
    ensemble: &mut PredictorEnsemble,
    inputs: &[DecodeInput],
    symbols: Arc<dyn SymbolDecoder>,
) -> Result<BatchOutcome, Error> {
    let names = ensemble.names();
    let mut handlers = config
        .outputs
        .iter()
        .map(|spec| OutputHandler::from_spec(spec, Arc::clone(&names), Arc::clone(&symbols)))
        .collect::<Result<Vec<_>, _>>()?;

    let mut decoder = create_decoder(&config.decoder);
    let outcome = decode_batch(decoder.as_mut(), ensemble, inputs);
    write_outputs(&mut handlers, &outcome)?;
    Ok(outcome)
}
