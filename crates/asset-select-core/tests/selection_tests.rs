use asset_select_core::market_data::{InMemoryPriceProvider, PriceTable};
use asset_select_core::optimizer::{BranchAndBoundConfig, OptimizerConfig};
use asset_select_core::program::build_portfolio_program;
use asset_select_core::selection::{select_assets, SelectionRequest};
use asset_select_core::{AssetSelectError, AssetUniverse};
use chrono::NaiveDate;
use pretty_assertions::assert_eq;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

// ===========================================================================
// End-to-end selection from closing prices
// ===========================================================================

fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
}

/// Four assets over eight trading days: a trending high-volatility name, a
/// steady grower, a flat low-volatility name and one with a data gap.
fn market() -> PriceTable {
    let rows = vec![
        [Some(dec!(100)), Some(dec!(50.00)), Some(dec!(20.00)), Some(dec!(10.0))],
        [Some(dec!(108)), Some(dec!(50.50)), Some(dec!(20.02)), Some(dec!(10.1))],
        [Some(dec!(101)), Some(dec!(51.00)), Some(dec!(19.99)), None],
        [Some(dec!(112)), Some(dec!(51.60)), Some(dec!(20.01)), Some(dec!(10.3))],
        [Some(dec!(104)), Some(dec!(52.10)), Some(dec!(20.00)), Some(dec!(10.2))],
        [Some(dec!(118)), Some(dec!(52.70)), Some(dec!(20.03)), Some(dec!(10.4))],
        [Some(dec!(110)), Some(dec!(53.20)), Some(dec!(20.01)), Some(dec!(10.5))],
        [Some(dec!(125)), Some(dec!(53.80)), Some(dec!(20.02)), Some(dec!(10.6))],
    ];
    PriceTable::new(
        vec!["VOL".into(), "GROW".into(), "FLAT".into(), "GAP".into()],
        (1..=8).map(date).collect(),
        rows.into_iter().map(|r| r.to_vec()).collect(),
    )
    .unwrap()
}

fn request(json: &str) -> SelectionRequest {
    serde_json::from_str(json).unwrap()
}

// ---------------------------------------------------------------------------
// Happy path
// ---------------------------------------------------------------------------

#[test]
fn test_pipeline_produces_feasible_selection() {
    let provider = InMemoryPriceProvider::new(market());
    let req = request(r#"{"universe":["VOL","GROW","FLAT","GAP"],"budget":2,"risk_weight":0.5}"#);
    let out = select_assets(&req, &provider).unwrap();

    let selection = &out.result.selection;
    assert_eq!(selection.selected_symbols.len(), 2);
    assert_eq!(selection.assignment.iter().map(|&b| b as usize).sum::<usize>(), 2);
    assert_eq!(selection.optimizer, "exhaustive");

    // Two return rows touch the GAP hole and are dropped.
    assert_eq!(out.result.statistics.observations, 5);
    assert_eq!(out.result.prices.num_rows(), 8);
    assert_eq!(out.metadata.precision, "ieee754_f64");
    assert_eq!(out.assumptions["budget"], 2);
}

#[test]
fn test_pipeline_objective_matches_program() {
    let provider = InMemoryPriceProvider::new(market());
    let req = request(r#"{"universe":["VOL","GROW","FLAT"],"budget":1,"risk_weight":3.0}"#);
    let out = select_assets(&req, &provider).unwrap();

    let program = build_portfolio_program(
        &req.universe,
        &out.result.statistics,
        req.risk_weight,
        req.budget,
    )
    .unwrap();
    let selection = &out.result.selection;
    assert!((program.evaluate(&selection.assignment) - selection.objective_value).abs() < 1e-15);
    assert!(
        (selection.objective_value
            - (req.risk_weight * selection.variance - selection.expected_return))
            .abs()
            < 1e-12
    );
}

#[test]
fn test_exact_optimizers_agree_end_to_end() {
    let provider = InMemoryPriceProvider::new(market());
    let exhaustive = request(r#"{"universe":["VOL","GROW","FLAT","GAP"],"budget":3}"#);
    let bb = SelectionRequest {
        optimizer: OptimizerConfig::BranchAndBound(BranchAndBoundConfig::default()),
        ..exhaustive.clone()
    };
    let a = select_assets(&exhaustive, &provider).unwrap();
    let b = select_assets(&bb, &provider).unwrap();
    assert_eq!(a.result.selection.assignment, b.result.selection.assignment);
    assert_eq!(b.result.selection.optimizer, "branch_and_bound");
}

#[test]
fn test_pipeline_is_deterministic() {
    let provider = InMemoryPriceProvider::new(market());
    let req = request(r#"{"universe":["VOL","GROW","FLAT","GAP"]}"#);
    let first = select_assets(&req, &provider).unwrap();
    let second = select_assets(&req, &provider).unwrap();
    assert_eq!(first.result.selection, second.result.selection);
    assert_eq!(first.result.statistics, second.result.statistics);
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

#[test]
fn test_budget_bounds() {
    let provider = InMemoryPriceProvider::new(market());
    for budget in [0usize, 4] {
        let req = SelectionRequest {
            budget,
            ..SelectionRequest::new(AssetUniverse::new(["VOL", "GROW", "FLAT"]).unwrap())
        };
        match select_assets(&req, &provider).unwrap_err() {
            AssetSelectError::InvalidBudget {
                budget: b,
                universe_size,
            } => {
                assert_eq!(b, budget);
                assert_eq!(universe_size, 3);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}

#[test]
fn test_negative_risk_weight_rejected() {
    let provider = InMemoryPriceProvider::new(market());
    let req = request(r#"{"universe":["VOL","GROW"],"budget":1,"risk_weight":-0.1}"#);
    let err = select_assets(&req, &provider).unwrap_err();
    assert!(matches!(err, AssetSelectError::InvalidRiskWeight(q) if q == -0.1));
}

#[test]
fn test_single_date_is_insufficient() {
    let table = PriceTable::new(
        vec!["A".into(), "B".into()],
        vec![date(1)],
        vec![vec![Some(dec!(10)), Some(dec!(20))]],
    )
    .unwrap();
    let provider = InMemoryPriceProvider::new(table);
    let req = request(r#"{"universe":["A","B"],"budget":1}"#);
    let err = select_assets(&req, &provider).unwrap_err();
    assert!(matches!(err, AssetSelectError::InsufficientData(_)));
}

#[test]
fn test_unknown_symbol_is_insufficient() {
    let provider = InMemoryPriceProvider::new(market());
    let req = request(r#"{"universe":["VOL","NOPE"],"budget":1}"#);
    let err = select_assets(&req, &provider).unwrap_err();
    assert!(matches!(err, AssetSelectError::InsufficientData(_)));
}

#[test]
fn test_non_positive_price_rejected() {
    let table = PriceTable::new(
        vec!["A".into(), "B".into()],
        vec![date(1), date(2), date(3)],
        vec![
            vec![Some(dec!(10)), Some(dec!(20))],
            vec![Some(Decimal::ZERO), Some(dec!(21))],
            vec![Some(dec!(11)), Some(dec!(22))],
        ],
    )
    .unwrap();
    let provider = InMemoryPriceProvider::new(table);
    let req = request(r#"{"universe":["A","B"],"budget":1}"#);
    let err = select_assets(&req, &provider).unwrap_err();
    assert!(matches!(err, AssetSelectError::InvalidInput { .. }));
}

#[test]
fn test_duplicate_universe_rejected_at_parse() {
    let parsed = serde_json::from_str::<SelectionRequest>(r#"{"universe":["A","A"]}"#);
    assert!(parsed.is_err());
}
