use stratforge::application::metrics_parser::{parse_stdout, render_block};
use stratforge::application::validation::{StaticValidator, check_request};
use stratforge::domain::market::timeframe::{HistoryWindow, Timeframe};
use stratforge::domain::performance::{PerformanceMetrics, Sanitize};
use stratforge::domain::validation::{FindingCategory, Severity};

const STRATEGY: &str = "position_size = 0.4
entry_price = 100
stop_loss = 101
take_profit = 105
data = load_ohlcv(interval='5m', period='60d')

for i in range(len(closes)):
    if closes[i] > closes[i - 1]:
        buy(size=position_size, sl=stop_loss, tp=take_profit)
    elif closes[i] < closes[i - 1]:
        position.close()
";

#[test]
fn test_validator_is_deterministic() {
    let validator = StaticValidator::standard();
    let first = validator.validate_source(1, STRATEGY);
    for _ in 0..20 {
        assert_eq!(validator.validate_source(1, STRATEGY), first);
    }
    // A second validator instance agrees with the first
    assert_eq!(StaticValidator::standard().validate_source(1, STRATEGY), first);
}

#[test]
fn test_long_stop_above_entry_is_rejected() {
    let report = StaticValidator::standard().validate_source(3, STRATEGY);
    assert!(!report.passed());
    let ordering: Vec<_> = report
        .errors()
        .filter(|f| f.category == FindingCategory::OrderingInvariant)
        .collect();
    assert_eq!(ordering.len(), 1);
    assert!(report.render_feedback().contains("stop-loss below"));
}

#[test]
fn test_fractional_sizing_passes_and_share_count_fails() {
    let validator = StaticValidator::standard();
    let fraction = "position_size = 0.4\nfor bar in bars:\n    if bar.up:\n        buy(size=position_size)\n    elif bar.down:\n        position.close()\n";
    let report = validator.validate_source(1, fraction);
    assert!(!report.errors().any(|f| f.category == FindingCategory::SizingInvariant));

    let shares = fraction.replace("0.4", "400000");
    let report = validator.validate_source(2, &shares);
    let sizing: Vec<_> = report
        .errors()
        .filter(|f| f.category == FindingCategory::SizingInvariant)
        .collect();
    assert_eq!(sizing.len(), 1);
    assert_eq!(sizing[0].line, Some(1));
}

#[test]
fn test_fine_granularity_multi_year_request_is_an_error() {
    let finding = check_request(Timeframe::FiveMin, HistoryWindow::Days(2 * 365), None).unwrap();
    assert_eq!(finding.severity, Severity::Error);
    assert_eq!(finding.category, FindingCategory::DataWindow);

    let near = check_request(Timeframe::FiveMin, HistoryWindow::Days(58), None).unwrap();
    assert_eq!(near.severity, Severity::Warning);
    assert!(check_request(Timeframe::OneDay, HistoryWindow::Days(3650), None).is_none());
}

#[test]
fn test_zero_trade_report_round_trips_as_explicit_nulls() {
    let stdout = "=== PERFORMANCE ===\nreturn_pct: 0.0\nsharpe: nan\nwin_rate: 0.0\nmax_drawdown: 0.0\ntrade_count: 0\nprofit_factor: inf\n=== END PERFORMANCE ===\n";
    let metrics = parse_stdout(stdout).unwrap();

    let json = serde_json::to_value(&metrics).unwrap();
    for field in ["return_pct", "sharpe", "win_rate", "max_drawdown", "profit_factor"] {
        assert!(json[field].is_null(), "{} should be null", field);
    }
    assert_eq!(json["trade_count"], 0);

    let back: PerformanceMetrics = serde_json::from_value(json).unwrap();
    assert_eq!(back, metrics);
}

#[test]
fn test_parse_render_parse_is_stable() {
    let stdout = "Return [%]                             18.4312\nMax. Drawdown [%]                     -11.2041\n# Trades                                    23\nWin Rate [%]                           56.5217\nSharpe Ratio                            0.8812\n";
    let once = parse_stdout(stdout).unwrap();
    let again = parse_stdout(&render_block(&once)).unwrap();
    assert_eq!(once, again);

    let mut sanitized = again.clone();
    sanitized.sanitize();
    assert_eq!(sanitized, again);
}
