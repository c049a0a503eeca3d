//! JSON request dispatch across every operation.

use serde_json::{Value, json};

use ferric_risk::api::{Engine, Request};
use ferric_risk::core::{EngineConfig, RiskError};

fn dispatch(request: Value) -> Result<Value, RiskError> {
    let engine = Engine::new(EngineConfig::default());
    let request = Request::from_json_str(&request.to_string())?;
    let response = engine.dispatch(request)?;
    Ok(serde_json::from_str(&response.to_json(false).unwrap()).unwrap())
}

fn returns(n: usize, phase: usize) -> Vec<f64> {
    (0..n)
        .map(|i| ((i * 37 + phase * 11) % 101) as f64 / 2_000.0 - 0.025)
        .collect()
}

fn market_portfolio() -> Value {
    json!({
        "positions": [
            { "name": "equity_us", "value": 1_000_000.0, "returns": returns(120, 0) },
            { "name": "equity_eu", "value": 500_000.0, "returns": returns(120, 3) },
            { "name": "govt_bond", "value": 400_000.0, "returns": returns(120, 7),
              "asset_class": "rates", "duration": 7.5 }
        ]
    })
}

fn credit_portfolio() -> Value {
    json!({
        "positions": [
            { "name": "Corp1", "exposure": 1_000_000.0, "probability_of_default": 0.02,
              "loss_given_default": 0.4 },
            { "name": "Corp2", "exposure": 500_000.0, "probability_of_default": 0.05 },
            { "name": "Corp3", "exposure": 250_000.0, "probability_of_default": 0.001,
              "rating": "A", "maturity": 3.0 }
        ]
    })
}

#[test]
fn var_response_carries_operation_and_fixed_keys() {
    let out = dispatch(json!({
        "operation": "calculate_var",
        "returns": returns(250, 1),
        "method": "historical",
        "confidence_level": 0.99,
        "time_horizon": 10
    }))
    .unwrap();
    assert_eq!(out["operation"], "calculate_var");
    assert_eq!(out["method"], "historical");
    for key in ["var", "scaled_var", "conditional_var", "scaled_cvar", "observations"] {
        assert!(out.get(key).is_some(), "missing {key}");
    }
}

#[test]
fn monte_carlo_defaults_come_from_config() {
    let request = json!({ "operation": "calculate_var", "returns": returns(250, 2),
                          "method": "monte_carlo" });
    let a = dispatch(request.clone()).unwrap();
    let b = dispatch(request).unwrap();
    assert_eq!(a, b);
    assert_eq!(a["observations"], 10_000);
    assert_eq!(a["confidence_level"], 0.95);
}

#[test]
fn market_operations_dispatch() {
    let out = dispatch(json!({
        "operation": "incremental_var",
        "portfolio": market_portfolio(),
        "new_position": { "name": "hedge", "value": -300_000.0, "returns": returns(120, 0) }
    }))
    .unwrap();
    assert!(out["incremental_var"].as_f64().unwrap() < 0.0);

    let out = dispatch(json!({
        "operation": "risk_attribution",
        "portfolio": market_portfolio(),
        "method": "factor",
        "confidence_level": 0.99
    }))
    .unwrap();
    assert_eq!(out["method"], "factor");
    assert_eq!(out["contributions"].as_array().unwrap().len(), 3);

    let out = dispatch(json!({
        "operation": "optimize_risk_budget",
        "portfolio": market_portfolio(),
        "risk_budget": [0.4, 0.3, 0.3]
    }))
    .unwrap();
    assert_eq!(out["weights"].as_array().unwrap().len(), 3);

    let out = dispatch(json!({
        "operation": "tail_risk_measures",
        "returns": returns(250, 4)
    }))
    .unwrap();
    assert_eq!(out["levels"].as_array().unwrap().len(), 2);

    let out = dispatch(json!({
        "operation": "backtest_var",
        "returns": returns(100, 5),
        "var_forecasts": vec![0.02; 100]
    }))
    .unwrap();
    assert_eq!(out["observations"], 100);

    let out = dispatch(json!({
        "operation": "market_stress_test",
        "portfolio": market_portfolio(),
        "scenarios": [{ "name": "rates_up", "interest_rate_shock": 0.02 }]
    }))
    .unwrap();
    let pnl = out["scenarios"]["rates_up"]["pnl"].as_f64().unwrap();
    assert!((pnl - (-7.5 * 400_000.0 * 0.02)).abs() < 1e-6);
}

#[test]
fn empty_risk_stress_list_runs_configured_scenarios() {
    let out = dispatch(json!({
        "operation": "risk_stress_test",
        "portfolio": credit_portfolio()
    }))
    .unwrap();
    let scenarios = out["scenarios"].as_object().unwrap();
    assert_eq!(scenarios.len(), 3);
    assert!(scenarios.contains_key("financial_crisis"));
}

#[test]
fn structural_credit_operations_dispatch() {
    let firm = json!({
        "asset_value": 100.0, "debt_value": 80.0, "asset_volatility": 0.3,
        "risk_free_rate": 0.05, "time_to_maturity": 1.0
    });

    let mut merton = firm.clone();
    merton["operation"] = json!("merton_pd");
    let out = dispatch(merton).unwrap();
    assert!((out["distance_to_default"].as_f64().unwrap() - 0.7605).abs() < 1e-4);

    let mut kmv = firm;
    kmv["operation"] = json!("kmv_pd");
    kmv["default_threshold"] = json!(0.8);
    let out = dispatch(kmv).unwrap();
    assert!((out["default_point"].as_f64().unwrap() - 64.0).abs() < 1e-12);

    let out = dispatch(json!({
        "operation": "estimate_asset_parameters",
        "equity_value": 30.0, "equity_volatility": 0.6, "debt_value": 80.0,
        "risk_free_rate": 0.05, "time_to_maturity": 1.0
    }))
    .unwrap();
    assert!(out["asset_value"].as_f64().unwrap() > 30.0);

    let out = dispatch(json!({
        "operation": "credit_spread",
        "risk_free_rate": 0.03, "probability_of_default": 0.02,
        "loss_given_default": 0.6, "maturity": 5.0
    }))
    .unwrap();
    assert!(out["spread_bps"].as_f64().unwrap() > 0.0);
}

#[test]
fn portfolio_credit_operations_dispatch() {
    let out = dispatch(json!({
        "operation": "portfolio_credit_risk",
        "portfolio": credit_portfolio()
    }))
    .unwrap();
    assert_eq!(out["num_positions"], 3);

    let out = dispatch(json!({
        "operation": "credit_metrics_var",
        "portfolio": credit_portfolio(),
        "num_trials": 2_000,
        "seed": 3
    }))
    .unwrap();
    assert_eq!(out["num_trials"], 2_000);
    assert!(out["credit_var"].as_f64().unwrap() >= 0.0);

    let out = dispatch(json!({
        "operation": "credit_stress_test",
        "portfolio": credit_portfolio(),
        "scenarios": [{ "name": "pd_only", "pd_stress_factor": 2.0 }]
    }))
    .unwrap();
    assert_eq!(out["scenarios"]["pd_only"]["scenario"]["lgd_stress_factor"], 1.0);
}

#[test]
fn trained_descriptor_replays_through_predict() {
    let records: Vec<Value> = [
        (0.20, 0.0), (0.30, 0.0), (0.35, 1.0), (0.40, 0.0), (0.45, 0.0), (0.50, 1.0),
        (0.55, 0.0), (0.60, 1.0), (0.65, 0.0), (0.70, 1.0), (0.80, 1.0), (0.90, 1.0),
    ]
    .iter()
    .map(|&(leverage, default)| json!({ "leverage": leverage, "default": default }))
    .collect();

    let model = dispatch(json!({
        "operation": "train_rating_model",
        "records": records,
        "label_column": "default",
        "model_type": "probit"
    }))
    .unwrap();
    assert_eq!(model["model_type"], "probit");

    let mut descriptor = model.clone();
    descriptor.as_object_mut().unwrap().remove("operation");
    let out = dispatch(json!({
        "operation": "predict_credit_rating",
        "financial_data": { "leverage": 0.85 },
        "model": descriptor
    }))
    .unwrap();
    let pd = out["probability_of_default"].as_f64().unwrap();
    assert!(pd > 0.5 && pd < 1.0);
    assert!(out["rating"].is_string());
}

#[test]
fn client_errors_are_classified() {
    let err = dispatch(json!({ "operation": "calculate_var", "returns": [], "method": "historical" }))
        .unwrap_err();
    assert!(matches!(err, RiskError::InsufficientData(_)));
    assert!(err.is_client_error());

    let err = dispatch(json!({
        "operation": "train_rating_model",
        "records": [{ "x": 1.0, "default": 1.0 }],
        "label_column": "default",
        "model_type": "random_forest"
    }))
    .unwrap_err();
    assert!(matches!(err, RiskError::InvalidMethod { .. }));

    let err = dispatch(json!({ "operation": "merton_pd", "asset_value": 100.0 })).unwrap_err();
    assert!(err.is_client_error());
}
