mod common;

use common::{HashingPredictor, TablePredictor};
use ensemble_decode::{
    create_decoder, BeamDecoder, CandidatePolicy, DecodeError, DecodeInput, Decoder,
    DecoderConfig, DecoderKind, ForcedDecoder, Posterior, Predictor, PredictorEnsemble,
    PredictorError, PredictorState, Symbol, EOS_ID,
};

fn looping_table() -> TablePredictor {
    TablePredictor::new().with_default(&[(5, -0.5), (6, -1.0), (EOS_ID, -1.2)])
}

fn beam_config(beam_size: usize, nbest: usize) -> DecoderConfig {
    DecoderConfig {
        kind: DecoderKind::Beam,
        beam_size,
        nbest,
        ..Default::default()
    }
}

#[test]
fn beam_returns_sorted_nbest() {
    let mut ensemble =
        PredictorEnsemble::new(CandidatePolicy::Intersection).with_predictor("nmt", 1.0, looping_table());
    let mut decoder = BeamDecoder::new(beam_config(3, 3));

    let nbest = decoder
        .decode(&mut ensemble, &DecodeInput::new(vec![7]))
        .unwrap();
    assert!(!nbest.is_empty());
    assert!(nbest.len() <= 3);
    let best = nbest.best().unwrap();
    assert_eq!(best.symbols, vec![EOS_ID]);
    assert!((best.total_score - -1.2).abs() < 1e-6);
    for pair in nbest.as_slice().windows(2) {
        assert!(pair[0].total_score >= pair[1].total_score);
    }
    for hypo in &nbest {
        assert_eq!(hypo.symbols.last(), Some(&EOS_ID));
        assert_eq!(hypo.breakdown.len(), hypo.symbols.len());
    }
}

#[test]
fn beam_scores_agree_with_forced_decoding() {
    let build = || {
        PredictorEnsemble::new(CandidatePolicy::Intersection)
            .with_predictor("nmt", 1.0, looping_table())
            .with_predictor(
                "lm",
                0.5,
                TablePredictor::new()
                    .with_default(&[(5, -2.0), (6, -0.1), (EOS_ID, -0.3)])
                    .with_entry(&[], &[(5, -0.2), (6, -0.4), (EOS_ID, -3.0)]),
            )
    };
    let mut ensemble = build();
    let mut beam = BeamDecoder::new(beam_config(4, 4));
    let nbest = beam.decode(&mut ensemble, &DecodeInput::new(vec![1])).unwrap();

    let mut forced = ForcedDecoder::new(DecoderConfig::default());
    for hypo in &nbest {
        let input = DecodeInput::new(vec![1]).with_target(hypo.symbols.clone());
        let rescored = forced.decode(&mut ensemble, &input).unwrap();
        let rescored = rescored.best().unwrap();
        assert_eq!(rescored.symbols, hypo.symbols);
        assert!((rescored.total_score - hypo.total_score).abs() < 1e-5);
        assert_eq!(rescored.breakdown, hypo.breakdown);
    }
}

#[test]
fn beam_without_completion_reports_budget() {
    let never_ends = TablePredictor::new().with_default(&[(5, -0.1), (6, -0.2)]);
    let mut ensemble =
        PredictorEnsemble::new(CandidatePolicy::Intersection).with_predictor("nmt", 1.0, never_ends);
    let mut decoder = BeamDecoder::new(DecoderConfig {
        max_len: 4,
        ..beam_config(2, 1)
    });

    assert!(matches!(
        decoder.decode(&mut ensemble, &DecodeInput::new(vec![1])),
        Err(DecodeError::BudgetExceeded { steps: 4 })
    ));
}

#[test]
fn empty_candidate_set_is_reported() {
    let mut ensemble = PredictorEnsemble::new(CandidatePolicy::Intersection)
        .with_predictor("a", 1.0, TablePredictor::new().with_default(&[(5, -0.1)]))
        .with_predictor("b", 1.0, TablePredictor::new().with_default(&[(6, -0.1)]));
    let mut decoder = BeamDecoder::new(beam_config(2, 1));

    assert!(matches!(
        decoder.decode(&mut ensemble, &DecodeInput::new(vec![1])),
        Err(DecodeError::NoCandidates { position: 0 })
    ));
}

#[test]
fn union_policy_fills_gaps_with_unk_score() {
    struct Floor(TablePredictor);

    impl Predictor for Floor {
        fn initialize(&mut self, source: &[Symbol]) -> Result<(), PredictorError> {
            self.0.initialize(source)
        }

        fn predict_next(&self) -> Result<Posterior, PredictorError> {
            self.0.predict_next()
        }

        fn unk_score(&self, _posterior: &Posterior) -> f32 {
            -10.0
        }

        fn consume(&mut self, symbol: Symbol) -> Result<(), PredictorError> {
            self.0.consume(symbol)
        }

        fn snapshot(&self) -> PredictorState {
            self.0.snapshot()
        }

        fn restore(&mut self, state: &PredictorState) -> Result<(), PredictorError> {
            self.0.restore(state)
        }
    }

    let mut ensemble = PredictorEnsemble::new(CandidatePolicy::Union)
        .with_predictor("a", 1.0, Floor(TablePredictor::new().with_default(&[(5, -0.1)])))
        .with_predictor("b", 1.0, Floor(TablePredictor::new().with_default(&[(EOS_ID, -0.1)])));
    let mut decoder = BeamDecoder::new(beam_config(2, 2));

    let nbest = decoder
        .decode(&mut ensemble, &DecodeInput::new(vec![1]))
        .unwrap();
    let best = nbest.best().unwrap();
    assert_eq!(best.symbols, vec![EOS_ID]);
    assert!((best.total_score - -10.1).abs() < 1e-5);
    assert_eq!(best.breakdown[0][0].score, -10.0);
}

#[test]
fn factory_builds_decoder_per_kind() {
    let mut ensemble = PredictorEnsemble::new(CandidatePolicy::Intersection).with_predictor(
        "hash",
        1.0,
        HashingPredictor::new(10),
    );
    let input = DecodeInput::new(vec![3]).with_target(vec![4, 4]);

    let mut forced = create_decoder(&DecoderConfig::default());
    let hypo = forced.decode(&mut ensemble, &input).unwrap();
    assert_eq!(hypo.best().unwrap().symbols, vec![4, 4, EOS_ID]);

    let mut beam = create_decoder(&DecoderConfig {
        max_len: 3,
        ..beam_config(10, 2)
    });
    match beam.decode(&mut ensemble, &input) {
        Ok(nbest) => assert!(nbest.len() <= 2),
        Err(err) => assert!(matches!(err, DecodeError::BudgetExceeded { .. })),
    }
}

fn bonus_table() -> TablePredictor {
    TablePredictor::new()
        .with_entry(&[], &[(4, 0.2), (EOS_ID, -0.1)])
        .with_entry(&[4], &[(EOS_ID, -0.1), (5, -1.0)])
        .with_entry(&[4, 5], &[(6, 3.0)])
        .with_entry(&[4, 5, 6], &[(EOS_ID, 0.0)])
}

#[test]
fn positive_scores_disable_early_stopping() {
    let mut ensemble = PredictorEnsemble::new(CandidatePolicy::Intersection)
        .with_predictor("nmt", 1.0, bonus_table());
    let mut decoder = BeamDecoder::new(DecoderConfig {
        early_stopping: true,
        ..beam_config(2, 1)
    });

    // After two steps [4, EOS] (0.1) beats the only live prefix [4, 5]
    // (-0.8), but the bonus on 6 lifts that prefix to 2.2.
    let nbest = decoder
        .decode(&mut ensemble, &DecodeInput::new(vec![1]))
        .unwrap();
    let best = nbest.best().unwrap();
    assert_eq!(best.symbols, vec![4, 5, 6, EOS_ID]);
    assert!((best.total_score - 2.2).abs() < 1e-5);
}

#[test]
fn early_stopping_is_off_by_default() {
    assert!(!DecoderConfig::default().early_stopping);

    let mut ensemble = PredictorEnsemble::new(CandidatePolicy::Intersection)
        .with_predictor("nmt", 1.0, bonus_table());
    let mut decoder = BeamDecoder::new(beam_config(2, 1));
    let nbest = decoder
        .decode(&mut ensemble, &DecodeInput::new(vec![1]))
        .unwrap();
    assert_eq!(nbest.best().unwrap().symbols, vec![4, 5, 6, EOS_ID]);
}

#[test]
fn early_stopping_keeps_best_with_non_positive_scores() {
    let mut ensemble = PredictorEnsemble::new(CandidatePolicy::Intersection)
        .with_predictor("nmt", 1.0, looping_table());
    let mut decoder = BeamDecoder::new(DecoderConfig {
        early_stopping: true,
        max_len: 50,
        ..beam_config(3, 1)
    });

    let nbest = decoder
        .decode(&mut ensemble, &DecodeInput::new(vec![1]))
        .unwrap();
    assert_eq!(nbest.len(), 1);
    assert_eq!(nbest.best().unwrap().symbols, vec![EOS_ID]);
}

#[test]
fn expired_time_budget_stops_beam_search() {
    let mut ensemble = PredictorEnsemble::new(CandidatePolicy::Intersection)
        .with_predictor("nmt", 1.0, looping_table());
    let mut decoder = BeamDecoder::new(DecoderConfig {
        max_seconds: Some(1e-9),
        ..beam_config(2, 1)
    });

    assert!(matches!(
        decoder.decode(&mut ensemble, &DecodeInput::new(vec![1])),
        Err(DecodeError::BudgetExceeded { steps: 0 })
    ));
}
