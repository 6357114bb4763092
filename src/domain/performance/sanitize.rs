use crate::domain::performance::metrics::PerformanceMetrics;
use crate::domain::strategy::ParameterSet;

/// Replaces non-finite numbers with explicit nulls, recursively.
///
/// Implemented by every type that crosses a persistence boundary; stores call
/// it before writing so no NaN or infinity can ever reach disk.
pub trait Sanitize {
    fn sanitize(&mut self);
}

pub fn finite_or_null(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

fn null_if_non_finite(value: &mut Option<f64>) {
    *value = finite_or_null(*value);
}

impl Sanitize for PerformanceMetrics {
    fn sanitize(&mut self) {
        null_if_non_finite(&mut self.return_pct);
        null_if_non_finite(&mut self.sharpe);
        null_if_non_finite(&mut self.win_rate);
        null_if_non_finite(&mut self.max_drawdown);
        null_if_non_finite(&mut self.profit_factor);
        self.extra.values_mut().for_each(null_if_non_finite);
        self.apply_zero_trade_rule();
    }
}

impl Sanitize for ParameterSet {
    fn sanitize(&mut self) {
        self.retain_finite();
    }
}

impl<T: Sanitize> Sanitize for Option<T> {
    fn sanitize(&mut self) {
        if let Some(inner) = self {
            inner.sanitize();
        }
    }
}

impl<T: Sanitize> Sanitize for Vec<T> {
    fn sanitize(&mut self) {
        for item in self.iter_mut() {
            item.sanitize();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_nested_metrics() {
        let mut metrics = vec![Some(PerformanceMetrics {
            return_pct: Some(f64::NEG_INFINITY),
            sharpe: Some(1.2),
            trade_count: Some(4),
            ..Default::default()
        })];
        metrics[0]
            .as_mut()
            .unwrap()
            .extra
            .insert("sortino".to_string(), Some(f64::NAN));

        metrics.sanitize();

        let inner = metrics[0].as_ref().unwrap();
        assert_eq!(inner.return_pct, None);
        assert_eq!(inner.sharpe, Some(1.2));
        assert_eq!(inner.extra.get("sortino"), Some(&None));
    }
}
