use crate::domain::market::timeframe::{HistoryWindow, Timeframe};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Where a raw idea came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdeaOrigin {
    #[default]
    Text,
    Transcript,
    Note,
}

/// Raw strategy input. Immutable once ingested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyIdea {
    text: String,
    origin: IdeaOrigin,
    received_at: DateTime<Utc>,
}

impl StrategyIdea {
    pub fn new(text: impl Into<String>, origin: IdeaOrigin) -> Self {
        Self {
            text: text.into(),
            origin,
            received_at: Utc::now(),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn origin(&self) -> IdeaOrigin {
        self.origin
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeDirection {
    #[default]
    Long,
    Short,
    Both,
}

impl fmt::Display for TradeDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeDirection::Long => write!(f, "long"),
            TradeDirection::Short => write!(f, "short"),
            TradeDirection::Both => write!(f, "long and short"),
        }
    }
}

/// Tunable numeric parameters of a strategy.
///
/// Keys are kept sorted so signatures and serialized output are stable.
/// Non-finite values are refused at insertion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterSet(BTreeMap<String, f64>);

impl ParameterSet {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Inserts a value; returns false (and stores nothing) for NaN or infinity.
    pub fn insert(&mut self, name: impl Into<String>, value: f64) -> bool {
        if !value.is_finite() {
            return false;
        }
        self.0.insert(name.into(), value);
        true
    }

    pub fn with(mut self, name: impl Into<String>, value: f64) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &f64)> {
        self.0.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Drops any non-finite value that slipped in through deserialization
    pub fn retain_finite(&mut self) {
        self.0.retain(|_, value| value.is_finite());
    }

    /// Stable textual identity used to skip already-evaluated variations
    pub fn signature(&self) -> String {
        self.0
            .iter()
            .map(|(name, value)| format!("{}={:.6}", name, value))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Names whose values differ from `other` (including names missing on either side)
    pub fn changed_from(&self, other: &ParameterSet) -> Vec<String> {
        let mut changed: Vec<String> = self
            .0
            .iter()
            .filter(|(name, value)| other.get(name) != Some(**value))
            .map(|(name, _)| name.clone())
            .collect();
        for name in other.names() {
            if !self.0.contains_key(name) {
                changed.push(name.clone());
            }
        }
        changed.sort();
        changed
    }
}

impl fmt::Display for ParameterSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self
            .0
            .iter()
            .map(|(name, value)| format!("{} = {}", name, value))
            .collect();
        write!(f, "{}", rendered.join(", "))
    }
}

/// Structured strategy specification. Derived once per run; immutable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategySpec {
    pub name: String,
    /// Slug of the name, used in run identifiers
    pub strategy_type: String,
    pub entry_rules: Vec<String>,
    pub exit_rules: Vec<String>,
    pub ticker: String,
    pub timeframe: Timeframe,
    pub history_window: HistoryWindow,
    pub direction: TradeDirection,
    pub initial_capital: Decimal,
    pub target_return_pct: f64,
    pub parameters: ParameterSet,
}

impl StrategySpec {
    /// Parameters every generated strategy exposes when the idea names none
    pub fn default_parameters() -> ParameterSet {
        ParameterSet::new()
            .with("entry_threshold", 1.0)
            .with("stop_loss_pct", 0.02)
            .with("take_profit_pct", 0.04)
            .with("position_size", 0.5)
    }
}

/// Lowercase, dash-separated slug of `text`, limited to 40 characters
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut last_dash = true;
    for ch in text.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
        if slug.len() >= 40 {
            break;
        }
    }
    let trimmed = slug.trim_matches('-');
    if trimmed.is_empty() {
        "strategy".to_string()
    } else {
        trimmed.to_string()
    }
}
