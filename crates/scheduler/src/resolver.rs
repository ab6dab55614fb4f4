//! Derived-point evaluation: pure arithmetic over the state store.
//!
//! Dependencies that have never been read resolve to 0 so a derived
//! point can always produce a value. Because the registry rejects
//! forward references, a single pass in registry order always sees
//! dependencies updated first.

use registry::{DerivedExpr, Registry};
use types::Value;

use crate::state::StateStore;

pub fn resolve(expr: &DerivedExpr, registry: &Registry, states: &StateStore) -> Value {
    let value_of = |name: &str| -> f64 {
        registry
            .position(name)
            .and_then(|position| states.value(position))
            .and_then(Value::as_f64)
            .unwrap_or(0.0)
    };

    let result = match expr {
        DerivedExpr::Product { a, b } => value_of(a) * value_of(b),
        DerivedExpr::Sum { terms } => terms.iter().map(|term| value_of(term)).sum(),
        DerivedExpr::Difference { minuend, subtrahend } => {
            value_of(minuend) - value_of(subtrahend)
        }
    };

    Value::Float(round_one_decimal(result))
}

fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::round_one_decimal;

    #[test]
    fn rounding_is_one_decimal() {
        assert_eq!(round_one_decimal(512.04), 512.0);
        assert_eq!(round_one_decimal(512.05), 512.1);
        assert_eq!(round_one_decimal(-10.54), -10.5);
    }
}
