use crate::application::metrics_parser::{BLOCK_BEGIN, BLOCK_END};
use crate::application::synthesis::{RepairFeedback, SynthesisRequest};
use crate::domain::strategy::{ParameterSet, StrategySpec};

pub const DATA_FILE: &str = "ohlcv.csv";

fn history_limit(spec: &StrategySpec) -> String {
    match spec.timeframe.max_lookback_days() {
        Some(days) => format!(
            "The provider serves at most {} days of {} bars; never request more.",
            days, spec.timeframe
        ),
        None => format!("The provider serves the full history for {} bars.", spec.timeframe),
    }
}

fn render_rules(rules: &[String]) -> String {
    rules.iter().map(|r| format!("  - {}", r)).collect::<Vec<_>>().join("\n")
}

fn render_parameters(parameters: &ParameterSet) -> String {
    parameters
        .iter()
        .map(|(name, value)| format!("{} = {}", name, value))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Contract every generated program must follow
pub fn system_prompt(spec: &StrategySpec) -> String {
    format!(
        r#"You write self-contained Python backtest programs. Reply with exactly one ```python fenced block and nothing else.

Contract:
1. Read market data from the file `{data_file}` in the working directory (columns: timestamp, open, high, low, close, volume; timestamp in Unix milliseconds). Do not download data.
2. Position size is a fraction of equity in [0, 1] (`position_size = 0.5`). Never compute share or contract counts.
3. For long entries stop_loss < entry_price < take_profit. For short entries take_profit < entry_price < stop_loss.
4. {limit}
5. Declare every tunable parameter as a top-level assignment `name = value` so it can be adjusted.
6. When the backtest finishes, print exactly this block with numeric values or `null`:
{begin}
return_pct: <total return in percent>
sharpe: <Sharpe ratio>
win_rate: <winning trades in percent>
max_drawdown: <max drawdown in percent, negative>
trade_count: <number of closed trades>
profit_factor: <gross profit / gross loss>
{end}
Print `null` for any statistic that is undefined (for example Sharpe with zero trades); never print nan or inf."#,
        data_file = DATA_FILE,
        limit = history_limit(spec),
        begin = BLOCK_BEGIN,
        end = BLOCK_END,
    )
}

fn describe_spec(spec: &StrategySpec) -> String {
    format!(
        "Strategy: {name}\nTicker: {ticker}\nTimeframe: {tf}\nHistory window: {window}\nDirection: {direction}\nInitial capital: {capital}\nEntry rules:\n{entry}\nExit rules:\n{exit}",
        name = spec.name,
        ticker = spec.ticker,
        tf = spec.timeframe,
        window = spec.history_window,
        direction = spec.direction,
        capital = spec.initial_capital,
        entry = render_rules(&spec.entry_rules),
        exit = render_rules(&spec.exit_rules),
    )
}

pub fn user_prompt(spec: &StrategySpec, request: &SynthesisRequest) -> String {
    let header = describe_spec(spec);
    match request {
        SynthesisRequest::Initial => format!(
            "{}\n\nParameters:\n{}\n\nWrite the complete program.",
            header,
            render_parameters(&spec.parameters)
        ),
        SynthesisRequest::Repair {
            previous,
            parameters,
            feedback,
        } => {
            let problem = match feedback {
                RepairFeedback::Findings(report) => format!(
                    "Static validation rejected the program:\n{}",
                    report.render_feedback()
                ),
                RepairFeedback::Execution { failure, output_tail } => format!(
                    "The program failed when run ({}). Output tail:\n{}",
                    failure, output_tail
                ),
                RepairFeedback::Synthesis(reason) => {
                    format!("The previous reply could not be used: {}", reason)
                }
            };
            let previous_source = previous
                .as_ref()
                .map(|a| format!("\n\nPrevious program (v{}):\n```python\n{}```", a.version(), a.source()))
                .unwrap_or_default();
            format!(
                "{}\n\nParameters:\n{}{}\n\n{}\n\nFix every problem above and return the complete corrected program.",
                header,
                render_parameters(parameters),
                previous_source,
                problem
            )
        }
        SynthesisRequest::Optimize {
            base,
            previous_metrics,
            parameters,
        } => {
            let changed = parameters.changed_from(base.parameters());
            format!(
                "{}\n\nCurrent program (v{}):\n```python\n{}```\n\nIt reported: return {:?}%, sharpe {:?}, win rate {:?}%, trades {:?}.\n\nRewrite it with these parameter values, keeping the logic otherwise unchanged:\n{}\n\nChanged: {}",
                header,
                base.version(),
                base.source(),
                previous_metrics.return_pct,
                previous_metrics.sharpe,
                previous_metrics.win_rate,
                previous_metrics.trade_count,
                render_parameters(parameters),
                changed.join(", ")
            )
        }
    }
}
