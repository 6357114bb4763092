use crate::domain::errors::{PipelineError, TranslationError};
use crate::domain::market::timeframe::{HistoryWindow, Timeframe};
use crate::domain::ports::LanguageModelService;
use crate::domain::strategy::{ParameterSet, StrategyIdea, StrategySpec, TradeDirection, slugify};
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

const DEFAULT_TARGET_RETURN_PCT: f64 = 10.0;
const DEFAULT_INITIAL_CAPITAL: u32 = 10_000;

const SYSTEM_PROMPT: &str = r#"You are a quantitative research assistant. Convert the trading idea into a single JSON object and output nothing else.

Schema:
{
  "name": string,
  "ticker": string,
  "timeframe": one of "1m","2m","5m","15m","30m","1h","90m","4h","1d","1wk","1mo",
  "history_window": string such as "60d", "2y", "ytd" or "max",
  "direction": "long" | "short" | "both",
  "entry_rules": [string, ...],
  "exit_rules": [string, ...],
  "initial_capital": number,
  "target_return_pct": number,
  "parameters": { name: number, ... }
}

Entry and exit rules must be concrete and testable. Parameters are the numeric knobs of the rules (thresholds, lookbacks, stop and target distances as fractions, position_size as a fraction of equity)."#;

/// Shape of the JSON object the model is asked for; everything optional so
/// missing fields become precise errors instead of a serde failure
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawSpec {
    name: Option<String>,
    ticker: Option<String>,
    timeframe: Option<String>,
    #[serde(alias = "period")]
    history_window: Option<String>,
    direction: Option<String>,
    entry_rules: Vec<String>,
    exit_rules: Vec<String>,
    initial_capital: Option<f64>,
    target_return_pct: Option<f64>,
    parameters: BTreeMap<String, f64>,
}

/// Turns a free-text idea into a structured `StrategySpec`
pub struct ResearchTranslator {
    llm: Arc<dyn LanguageModelService>,
}

impl ResearchTranslator {
    pub fn new(llm: Arc<dyn LanguageModelService>) -> Self {
        Self { llm }
    }

    /// `target_return_pct` from the caller overrides whatever the idea states
    pub async fn translate(
        &self,
        idea: &StrategyIdea,
        target_return_pct: Option<f64>,
    ) -> Result<StrategySpec, PipelineError> {
        if idea.text().trim().is_empty() {
            return Err(TranslationError::EmptyIdea.into());
        }

        info!("ResearchTranslator: translating {:?} idea ({} chars)", idea.origin(), idea.text().len());
        let user_prompt = format!("Trading idea:\n{}", idea.text().trim());
        let completion = self.llm.complete(SYSTEM_PROMPT, &user_prompt).await?;
        debug!("ResearchTranslator: completion of {} chars", completion.len());

        let spec = parse_spec(&completion, idea, target_return_pct)?;
        info!(
            "ResearchTranslator: spec '{}' for {} on {} ({}), target {:.1}%",
            spec.name, spec.ticker, spec.timeframe, spec.history_window, spec.target_return_pct
        );
        Ok(spec)
    }
}

/// Extracts the first JSON object: a fenced block when present, otherwise
/// the first balanced `{...}` span
pub fn extract_json_object(text: &str) -> Option<&str> {
    if let Some(start) = text.find("```") {
        let after = &text[start + 3..];
        let body_start = after.find('\n').map_or(0, |i| i + 1);
        if let Some(end) = after[body_start..].find("```") {
            let fenced = after[body_start..body_start + end].trim();
            if fenced.starts_with('{') {
                return Some(fenced);
            }
        }
    }

    let open = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, ch) in text[open..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[open..=open + i]);
                }
            }
            _ => {}
        }
    }
    None
}

fn parse_direction(raw: &str) -> Option<TradeDirection> {
    match raw.trim().to_lowercase().replace(['-', ' '], "_").as_str() {
        "long" | "long_only" | "buy" => Some(TradeDirection::Long),
        "short" | "short_only" | "sell" => Some(TradeDirection::Short),
        "both" | "long_short" | "long_and_short" => Some(TradeDirection::Both),
        _ => None,
    }
}

fn default_name(idea: &StrategyIdea) -> String {
    idea.text().split_whitespace().take(6).collect::<Vec<_>>().join(" ")
}

fn non_empty_rules(rules: Vec<String>) -> Vec<String> {
    rules
        .into_iter()
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty())
        .collect()
}

pub(crate) fn parse_spec(
    completion: &str,
    idea: &StrategyIdea,
    target_return_pct: Option<f64>,
) -> Result<StrategySpec, TranslationError> {
    let json = extract_json_object(completion).ok_or_else(|| TranslationError::NoStructuredOutput {
        excerpt: completion.chars().take(120).collect(),
    })?;
    let raw: RawSpec = serde_json::from_str(json).map_err(|e| TranslationError::MalformedSpec { reason: e.to_string() })?;

    let ticker = raw
        .ticker
        .map(|t| t.trim().to_uppercase())
        .filter(|t| !t.is_empty())
        .ok_or(TranslationError::MissingField { field: "ticker" })?;

    let timeframe_raw = raw
        .timeframe
        .filter(|t| !t.trim().is_empty())
        .ok_or(TranslationError::MissingField { field: "timeframe" })?;
    let timeframe = Timeframe::from_str(&timeframe_raw).map_err(|e| TranslationError::InvalidField {
        field: "timeframe",
        reason: e.to_string(),
    })?;

    let entry_rules = non_empty_rules(raw.entry_rules);
    if entry_rules.is_empty() {
        return Err(TranslationError::MissingField { field: "entry_rules" });
    }
    let exit_rules = non_empty_rules(raw.exit_rules);
    if exit_rules.is_empty() {
        return Err(TranslationError::MissingField { field: "exit_rules" });
    }

    let history_window = match raw.history_window.filter(|w| !w.trim().is_empty()) {
        Some(window) => HistoryWindow::from_str(&window).map_err(|e| TranslationError::InvalidField {
            field: "history_window",
            reason: e.to_string(),
        })?,
        None => HistoryWindow::default(),
    };

    let direction = match raw.direction {
        Some(d) => parse_direction(&d).ok_or_else(|| TranslationError::InvalidField {
            field: "direction",
            reason: format!("'{}' is not long, short or both", d),
        })?,
        None => TradeDirection::Long,
    };

    let initial_capital = match raw.initial_capital {
        Some(c) if c.is_finite() && c > 0.0 => Decimal::from_f64(c).ok_or_else(|| TranslationError::InvalidField {
            field: "initial_capital",
            reason: format!("{} is not representable", c),
        })?,
        Some(c) => {
            return Err(TranslationError::InvalidField {
                field: "initial_capital",
                reason: format!("{} must be a positive amount", c),
            });
        }
        None => Decimal::from(DEFAULT_INITIAL_CAPITAL),
    };

    let target_return_pct = target_return_pct
        .or(raw.target_return_pct)
        .unwrap_or(DEFAULT_TARGET_RETURN_PCT);
    if !target_return_pct.is_finite() {
        return Err(TranslationError::InvalidField {
            field: "target_return_pct",
            reason: "must be a finite percentage".to_string(),
        });
    }

    let mut parameters: ParameterSet = StrategySpec::default_parameters();
    for (name, value) in raw.parameters {
        parameters.insert(name, value);
    }

    let name = raw
        .name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| default_name(idea));

    Ok(StrategySpec {
        strategy_type: slugify(&name),
        name,
        entry_rules,
        exit_rules,
        ticker,
        timeframe,
        history_window,
        direction,
        initial_capital,
        target_return_pct,
        parameters,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::LlmServiceError;
    use crate::domain::strategy::IdeaOrigin;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CannedModel {
        reply: String,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LanguageModelService for CannedModel {
        async fn complete(&self, _system: &str, _user: &str) -> Result<String, LlmServiceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.reply.clone())
        }
    }

    fn idea() -> StrategyIdea {
        StrategyIdea::new("Buy AAPL when RSI dips below 30, sell above 70", IdeaOrigin::Text)
    }

    const REPLY: &str = r#"Here you go:
```json
{
  "name": "RSI Dip Buyer",
  "ticker": "aapl",
  "timeframe": "1d",
  "history_window": "2y",
  "entry_rules": ["RSI(14) < 30"],
  "exit_rules": ["RSI(14) > 70"],
  "target_return_pct": 15,
  "parameters": {"rsi_period": 14, "position_size": 0.3}
}
```"#;

    #[test]
    fn test_parse_spec_with_defaults() {
        let spec = parse_spec(REPLY, &idea(), None).unwrap();
        assert_eq!(spec.ticker, "AAPL");
        assert_eq!(spec.strategy_type, "rsi-dip-buyer");
        assert_eq!(spec.timeframe, Timeframe::OneDay);
        assert_eq!(spec.history_window, HistoryWindow::Days(730));
        assert_eq!(spec.direction, TradeDirection::Long);
        assert_eq!(spec.initial_capital, Decimal::from(10_000));
        assert_eq!(spec.target_return_pct, 15.0);
        assert_eq!(spec.parameters.get("position_size"), Some(0.3));
        assert_eq!(spec.parameters.get("rsi_period"), Some(14.0));
        assert_eq!(spec.parameters.get("stop_loss_pct"), Some(0.02));
    }

    #[test]
    fn test_caller_target_overrides_text() {
        let spec = parse_spec(REPLY, &idea(), Some(25.0)).unwrap();
        assert_eq!(spec.target_return_pct, 25.0);
    }

    #[test]
    fn test_missing_fields_are_reported() {
        let reply = r#"{"ticker": "MSFT", "timeframe": "1h", "entry_rules": ["x"], "exit_rules": []}"#;
        assert!(matches!(
            parse_spec(reply, &idea(), None),
            Err(TranslationError::MissingField { field: "exit_rules" })
        ));

        let reply = r#"{"ticker": "MSFT", "timeframe": "3h", "entry_rules": ["x"], "exit_rules": ["y"]}"#;
        assert!(matches!(
            parse_spec(reply, &idea(), None),
            Err(TranslationError::InvalidField { field: "timeframe", .. })
        ));

        assert!(matches!(
            parse_spec("I cannot help with that.", &idea(), None),
            Err(TranslationError::NoStructuredOutput { .. })
        ));
    }

    #[test]
    fn test_extract_balanced_object_ignores_braces_in_strings() {
        let text = r#"prefix {"a": "}{", "b": {"c": 1}} suffix"#;
        assert_eq!(extract_json_object(text), Some(r#"{"a": "}{", "b": {"c": 1}}"#));
    }

    #[tokio::test]
    async fn test_empty_idea_never_calls_the_model() {
        let model = Arc::new(CannedModel {
            reply: REPLY.to_string(),
            calls: AtomicUsize::new(0),
        });
        let translator = ResearchTranslator::new(model.clone());
        let result = translator
            .translate(&StrategyIdea::new("   ", IdeaOrigin::Note), None)
            .await;
        assert!(matches!(result, Err(PipelineError::Translation(TranslationError::EmptyIdea))));
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }
}
