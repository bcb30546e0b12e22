mod common;

use common::{HashingPredictor, TablePredictor};
use ensemble_decode::{
    CandidatePolicy, DecodeError, DecodeInput, Decoder, DecoderConfig, ForcedDecoder,
    PredictorEnsemble, ScoreAdjustment, EOS_ID,
};

fn single(predictor: TablePredictor) -> PredictorEnsemble {
    PredictorEnsemble::new(CandidatePolicy::Intersection).with_predictor("nmt", 1.0, predictor)
}

#[test]
fn forced_decode_sums_step_scores() {
    let mut ensemble = single(TablePredictor::forcing(&[5, 9], -0.1));
    let mut decoder = ForcedDecoder::new(DecoderConfig::default());
    let input = DecodeInput::new(vec![11, 12]).with_target(vec![5, 9]);

    let nbest = decoder.decode(&mut ensemble, &input).unwrap();
    assert_eq!(nbest.len(), 1);
    let hypo = nbest.best().unwrap();
    assert_eq!(hypo.symbols, vec![5, 9, EOS_ID]);
    assert_eq!(hypo.breakdown.len(), 3);
    assert!((hypo.score - -0.3).abs() < 1e-6);
    assert!((hypo.total_score - -0.3).abs() < 1e-6);
}

#[test]
fn explicit_eos_is_not_duplicated() {
    let mut ensemble = single(TablePredictor::forcing(&[5, 9], -0.1));
    let mut decoder = ForcedDecoder::new(DecoderConfig::default());
    let input = DecodeInput::new(vec![11]).with_target(vec![5, 9, EOS_ID]);

    let hypo = decoder.decode(&mut ensemble, &input).unwrap();
    assert_eq!(hypo.best().unwrap().symbols, vec![5, 9, EOS_ID]);
}

#[test]
fn cumulative_score_is_weighted_sum_over_predictors() {
    let mut ensemble = PredictorEnsemble::new(CandidatePolicy::Intersection)
        .with_predictor("nmt", 1.0, TablePredictor::forcing(&[4, 6, 8], -0.5))
        .with_predictor("lm", 0.5, TablePredictor::forcing(&[4, 6, 8], -1.0));
    let mut decoder = ForcedDecoder::new(DecoderConfig::default());
    let input = DecodeInput::new(vec![1]).with_target(vec![4, 6, 8]);

    let hypo = decoder.decode(&mut ensemble, &input).unwrap();
    let hypo = hypo.best().unwrap();
    assert_eq!(hypo.breakdown.len(), 4);
    let expected: f32 = hypo
        .breakdown
        .iter()
        .map(|step| step.iter().map(|e| e.score * e.weight).sum::<f32>())
        .sum();
    assert!((hypo.score - expected).abs() < 1e-6);
    assert!((hypo.score - -4.0).abs() < 1e-6);
    assert!((hypo.predictor_total(1) - -4.0).abs() < 1e-6);
}

#[test]
fn unscored_required_symbol_fails() {
    let predictor = TablePredictor::new()
        .with_entry(&[], &[(5, -0.1)])
        .with_entry(&[5], &[(7, -0.2)]);
    let mut ensemble = single(predictor);
    let mut decoder = ForcedDecoder::new(DecoderConfig::default());
    let input = DecodeInput::new(vec![1]).with_target(vec![5, 9]);

    let err = decoder.decode(&mut ensemble, &input).unwrap_err();
    assert!(matches!(
        err,
        DecodeError::SymbolNotScored {
            symbol: 9,
            position: 1
        }
    ));
}

#[test]
fn intersection_hides_symbols_missing_from_one_predictor() {
    let mut ensemble = PredictorEnsemble::new(CandidatePolicy::Intersection)
        .with_predictor("nmt", 1.0, TablePredictor::forcing(&[5], -0.1))
        .with_predictor("lm", 1.0, TablePredictor::new().with_default(&[(EOS_ID, -1.0)]));
    let mut decoder = ForcedDecoder::new(DecoderConfig::default());
    let input = DecodeInput::new(vec![1]).with_target(vec![5]);

    assert!(matches!(
        decoder.decode(&mut ensemble, &input),
        Err(DecodeError::SymbolNotScored { symbol: 5, position: 0 })
    ));
}

#[test]
fn missing_target_is_reported() {
    let mut ensemble = single(TablePredictor::forcing(&[5], -0.1));
    let mut decoder = ForcedDecoder::new(DecoderConfig::default());
    let err = decoder
        .decode(&mut ensemble, &DecodeInput::new(vec![1]))
        .unwrap_err();
    assert!(matches!(err, DecodeError::MissingTarget));
}

#[test]
fn target_longer_than_step_budget_is_rejected() {
    let mut ensemble = single(TablePredictor::forcing(&[5, 6, 7], -0.1));
    let mut decoder = ForcedDecoder::new(DecoderConfig {
        max_len: 3,
        ..Default::default()
    });
    let input = DecodeInput::new(vec![1]).with_target(vec![5, 6, 7]);
    assert!(matches!(
        decoder.decode(&mut ensemble, &input),
        Err(DecodeError::BudgetExceeded { .. })
    ));
}

#[test]
fn length_normalization_adjusts_total_only() {
    let mut ensemble = single(TablePredictor::forcing(&[5, 9], -0.3));
    let mut decoder = ForcedDecoder::new(DecoderConfig {
        adjustment: ScoreAdjustment::LengthNormalized,
        ..Default::default()
    });
    let input = DecodeInput::new(vec![1]).with_target(vec![5, 9]);

    let nbest = decoder.decode(&mut ensemble, &input).unwrap();
    let hypo = nbest.best().unwrap();
    assert!((hypo.score - -0.9).abs() < 1e-6);
    assert!((hypo.total_score - -0.3).abs() < 1e-6);
}

#[test]
fn forced_decode_is_repeatable_on_the_same_ensemble() {
    let mut ensemble = PredictorEnsemble::new(CandidatePolicy::Intersection).with_predictor(
        "hash",
        1.0,
        HashingPredictor::new(20),
    );
    let mut decoder = ForcedDecoder::new(DecoderConfig::default());
    let input = DecodeInput::new(vec![3, 4]).with_target(vec![7, 8, 9]);

    let first = decoder.decode(&mut ensemble, &input).unwrap();
    let other = DecodeInput::new(vec![9]).with_target(vec![10]);
    decoder.decode(&mut ensemble, &other).unwrap();
    let second = decoder.decode(&mut ensemble, &input).unwrap();
    assert_eq!(first, second);
}

#[test]
fn expired_time_budget_stops_forced_decoding() {
    let mut ensemble = single(TablePredictor::forcing(&[5, 9], -0.1));
    let mut decoder = ForcedDecoder::new(DecoderConfig {
        max_seconds: Some(1e-9),
        ..Default::default()
    });
    let input = DecodeInput::new(vec![1]).with_target(vec![5, 9]);
    assert!(matches!(
        decoder.decode(&mut ensemble, &input),
        Err(DecodeError::BudgetExceeded { steps: 0 })
    ));
}

#[test]
fn generous_time_budget_leaves_forced_decoding_alone() {
    let mut ensemble = single(TablePredictor::forcing(&[5, 9], -0.1));
    let mut decoder = ForcedDecoder::new(DecoderConfig {
        max_seconds: Some(3600.0),
        ..Default::default()
    });
    let input = DecodeInput::new(vec![1]).with_target(vec![5, 9]);
    let nbest = decoder.decode(&mut ensemble, &input).unwrap();
    assert_eq!(nbest.best().unwrap().symbols, vec![5, 9, EOS_ID]);
}
