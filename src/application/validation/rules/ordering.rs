use super::{OrderCall, ValidationRule, order_calls, sort_by_line};
use crate::application::validation::source::{SourceModel, binding_key, keyword_arguments};
use crate::domain::strategy::TradeDirection;
use crate::domain::validation::{FindingCategory, ValidationFinding};
use regex::Regex;
use std::sync::LazyLock;

const REFERENCE: &str = r"[A-Za-z_][\w.]*(?:\[[^\]]*\])?";

static BARE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"^({})$", REFERENCE)).expect("reference pattern is valid"));
static SCALED_RIGHT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"^({})\*(.+)$", REFERENCE)).expect("scaled pattern is valid"));
static SCALED_LEFT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"^(.+)\*({})$", REFERENCE)).expect("scaled pattern is valid"));
static OFFSET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"^({})([+-])(.+)$", REFERENCE)).expect("offset pattern is valid"));
static ONE_PLUS_MINUS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\(1(?:\.0*)?([+-])(.+)\)$").expect("factor pattern is valid"));

const ENTRY_NAMES: [&str; 2] = ["entry_price", "entry"];
const STOP_NAMES: [&str; 5] = ["stop_loss", "stop_loss_price", "stop_price", "sl_price", "sl"];
const TARGET_NAMES: [&str; 5] = ["take_profit", "take_profit_price", "target_price", "tp_price", "tp"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Relation {
    Below,
    Equal,
    Above,
}

impl Relation {
    fn from_sign(value: f64) -> Self {
        if value > 0.0 {
            Relation::Above
        } else if value < 0.0 {
            Relation::Below
        } else {
            Relation::Equal
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            Relation::Below => "below",
            Relation::Equal => "equal to",
            Relation::Above => "above",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Level {
    Relative { reference: String, relation: Relation },
    Absolute(f64),
}

/// What the order is entered at, as far as the source tells
#[derive(Debug, Default)]
struct Entry {
    references: Vec<String>,
    value: Option<f64>,
}

/// Stop-loss and take-profit must bracket the entry on the correct sides
pub struct OrderingRule;

impl OrderingRule {
    fn reference_key(reference: &str) -> String {
        match reference.find('[') {
            Some(_) => reference.to_string(),
            None => binding_key(reference).to_string(),
        }
    }

    fn classify(source: &SourceModel, expr: &str, line: usize, entry: &Entry, depth: usize) -> Option<Level> {
        if depth > 4 {
            return None;
        }
        if let Some(value) = source.evaluate(expr, line) {
            return Some(Level::Absolute(value));
        }
        let compact: String = expr.chars().filter(|c| !c.is_whitespace()).collect();

        // Bare names resolve only through the entry or a binding
        if let Some(caps) = BARE.captures(&compact) {
            let reference = Self::reference_key(&caps[1]);
            if entry.references.contains(&reference) {
                return Some(Level::Relative {
                    reference,
                    relation: Relation::Equal,
                });
            }
            let binding = source.binding_before(&caps[1], line)?;
            return Self::classify(source, &binding.expr, binding.line, entry, depth + 1);
        }

        if let Some(caps) = SCALED_RIGHT.captures(&compact) {
            if let Some(relation) = Self::factor_relation(source, &caps[2], line) {
                return Some(Level::Relative {
                    reference: Self::reference_key(&caps[1]),
                    relation,
                });
            }
        }
        if let Some(caps) = SCALED_LEFT.captures(&compact) {
            if let Some(relation) = Self::factor_relation(source, &caps[1], line) {
                return Some(Level::Relative {
                    reference: Self::reference_key(&caps[2]),
                    relation,
                });
            }
        }
        if let Some(caps) = OFFSET.captures(&compact) {
            let sign = if &caps[2] == "+" { 1.0 } else { -1.0 };
            let magnitude = Self::magnitude(source, &caps[3], line)?;
            return Some(Level::Relative {
                reference: Self::reference_key(&caps[1]),
                relation: Relation::from_sign(sign * magnitude),
            });
        }
        None
    }

    /// Relation of `reference * factor` to `reference`
    fn factor_relation(source: &SourceModel, factor: &str, line: usize) -> Option<Relation> {
        if let Some(k) = source.evaluate(factor, line) {
            return Some(Relation::from_sign(k - 1.0));
        }
        let caps = ONE_PLUS_MINUS.captures(factor)?;
        let sign = if &caps[1] == "+" { 1.0 } else { -1.0 };
        let magnitude = Self::magnitude(source, &caps[2], line)?;
        Some(Relation::from_sign(sign * magnitude))
    }

    /// Resolved value of an offset; named distances without a sign are taken as positive
    fn magnitude(source: &SourceModel, expr: &str, line: usize) -> Option<f64> {
        match source.evaluate(expr, line) {
            Some(value) => Some(value),
            None if !expr.contains('-') => Some(1.0),
            None => None,
        }
    }

    fn entry_for(source: &SourceModel, explicit: Option<&str>, line: usize) -> Entry {
        let mut entry = Entry::default();
        let named = match explicit {
            Some(expr) => Some((expr.to_string(), line)),
            None => ENTRY_NAMES
                .iter()
                .find(|name| source.binding_before(name, line).is_some())
                .map(|name| (name.to_string(), line)),
        };
        let Some((expr, at)) = named else {
            return entry;
        };

        entry.value = source.evaluate(&expr, at);
        let compact: String = expr.chars().filter(|c| !c.is_whitespace()).collect();
        if BARE.is_match(&compact) {
            entry.references.push(Self::reference_key(&compact));
            if let Some(binding) = source.binding_before(&compact, at) {
                let aliased: String = binding.expr.chars().filter(|c| !c.is_whitespace()).collect();
                if BARE.is_match(&aliased) {
                    entry.references.push(Self::reference_key(&aliased));
                }
            }
        }
        entry
    }

    fn relation_to_entry(level: &Level, entry: &Entry, implicit: Option<&str>) -> Option<Relation> {
        match level {
            Level::Relative { reference, relation } => {
                if entry.references.contains(reference) || implicit == Some(reference.as_str()) {
                    Some(*relation)
                } else {
                    None
                }
            }
            Level::Absolute(value) => entry.value.map(|e| Relation::from_sign(value - e)),
        }
    }

    fn judge(
        direction: TradeDirection,
        stop: Option<Level>,
        target: Option<Level>,
        entry: &Entry,
        line: usize,
    ) -> Vec<ValidationFinding> {
        // Without a known entry, the base a level is scaled or offset from stands in for it
        let anchor = |level: &Option<Level>| match level {
            Some(Level::Relative { reference, relation }) if *relation != Relation::Equal => Some(reference.clone()),
            _ => None,
        };
        let implicit = if entry.references.is_empty() && entry.value.is_none() {
            match (anchor(&stop), anchor(&target)) {
                (Some(a), Some(b)) => (a == b).then_some(a),
                (Some(a), None) | (None, Some(a)) => Some(a),
                (None, None) => None,
            }
        } else {
            None
        };

        let stop_rel = stop.as_ref().and_then(|l| Self::relation_to_entry(l, entry, implicit.as_deref()));
        let target_rel = target.as_ref().and_then(|l| Self::relation_to_entry(l, entry, implicit.as_deref()));

        let (side, stop_must, target_must) = match direction {
            TradeDirection::Short => ("short", Relation::Above, Relation::Below),
            _ => ("long", Relation::Below, Relation::Above),
        };

        let mut findings = Vec::new();
        for (label, relation, required) in [
            ("stop-loss", stop_rel, stop_must),
            ("take-profit", target_rel, target_must),
        ] {
            if let Some(actual) = relation
                && actual != required
            {
                findings.push(ValidationFinding::error(
                    FindingCategory::OrderingInvariant,
                    format!(
                        "{} entry requires the {} {} the entry price, but it is {} it",
                        side,
                        label,
                        required.describe(),
                        actual.describe()
                    ),
                    Some(line),
                ));
            }
        }
        findings
    }

    fn check_call(source: &SourceModel, call: &OrderCall) -> Vec<ValidationFinding> {
        let kwargs = keyword_arguments(&call.args);
        let find = |keys: &[&str]| {
            kwargs
                .iter()
                .find(|(k, _)| keys.contains(k))
                .map(|(_, v)| v.to_string())
        };
        let stop_expr = find(&["sl", "stop_loss", "stop"]);
        let target_expr = find(&["tp", "take_profit", "limit_exit"]);
        if stop_expr.is_none() && target_expr.is_none() {
            return Vec::new();
        }

        let entry_expr = find(&["limit", "price", "entry"]);
        let entry = Self::entry_for(source, entry_expr.as_deref(), call.line);
        let stop = stop_expr.and_then(|e| Self::classify(source, &e, call.line, &entry, 0));
        let target = target_expr.and_then(|e| Self::classify(source, &e, call.line, &entry, 0));
        Self::judge(call.direction, stop, target, &entry, call.line)
    }

    fn check_bindings(source: &SourceModel, direction: TradeDirection) -> Vec<ValidationFinding> {
        let last = |names: &[&str]| {
            names
                .iter()
                .filter_map(|n| source.assignments(n).last())
                .max_by_key(|b| b.line)
                .cloned()
        };
        let (Some(stop), Some(target)) = (last(&STOP_NAMES), last(&TARGET_NAMES)) else {
            return Vec::new();
        };

        let line = stop.line.max(target.line);
        let entry = Self::entry_for(source, None, line + 1);
        let stop_level = Self::classify(source, &stop.expr, stop.line, &entry, 0);
        let target_level = Self::classify(source, &target.expr, target.line, &entry, 0);
        Self::judge(direction, stop_level, target_level, &entry, stop.line)
    }
}

impl ValidationRule for OrderingRule {
    fn name(&self) -> &str {
        "order-ordering"
    }

    fn priority(&self) -> u8 {
        20
    }

    fn check(&self, source: &SourceModel) -> Vec<ValidationFinding> {
        let calls = order_calls(source);
        let mut findings: Vec<ValidationFinding> = calls.iter().flat_map(|c| Self::check_call(source, c)).collect();

        let bracketed = calls.iter().any(|c| {
            keyword_arguments(&c.args)
                .iter()
                .any(|(k, _)| matches!(*k, "sl" | "tp" | "stop_loss" | "take_profit" | "stop"))
        });
        if !bracketed {
            let direction = calls.first().map_or(TradeDirection::Long, |c| c.direction);
            findings.extend(Self::check_bindings(source, direction));
        }

        sort_by_line(&mut findings);
        findings
    }
}
