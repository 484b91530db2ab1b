//! Strength specifications
//!
//! A strength is either a plain number (`"0.73"`) or an inclusive range
//! (`"0.4-0.8"`, `"-0.8--0.3"`) from which one value on the 0.1 grid is drawn.

use once_cell::sync::Lazy;
use rand::seq::SliceRandom;
use rand::Rng;
use regex::Regex;
use roulette_core::{Outcome, Warning};
use tracing::debug;

/// Strength used when a specification cannot be read
pub const FALLBACK_STRENGTH: f64 = 1.0;

/// Default absolute bound for range ends
pub const DEFAULT_BOUND: f64 = 10.0;

static RANGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(-?\d+\.?\d*)\s*-\s*(-?\d+\.?\d*)$").expect("range pattern is valid")
});

fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}

/// Parses strength specifications
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrengthParser {
    bound: f64,
}

impl StrengthParser {
    /// Create a parser accepting range ends within `±bound`
    pub fn new(bound: f64) -> Self {
        Self { bound }
    }

    /// Range bound
    pub fn bound(&self) -> f64 {
        self.bound
    }

    /// Resolve a specification to one strength
    ///
    /// A range makes exactly one draw from `rng`; a plain number makes none.
    /// Anything unreadable resolves to [`FALLBACK_STRENGTH`] with a warning.
    pub fn parse<R: Rng + ?Sized>(&self, spec: &str, rng: &mut R) -> Outcome<f64> {
        let spec = spec.trim();

        if let Some(caps) = RANGE.captures(spec) {
            return match self.range_values(&caps[1], &caps[2]) {
                Ok(values) => {
                    let value = values.choose(rng).copied().unwrap_or(FALLBACK_STRENGTH);
                    debug!(spec, value, "Drew strength from range");
                    Outcome::clean(value)
                }
                Err(reason) => self.fallback(spec, reason),
            };
        }

        match spec.parse::<f64>() {
            Ok(value) if value.is_finite() => Outcome::clean(round_to(value, 2)),
            _ => self.fallback(spec, "not a number or range".to_string()),
        }
    }

    /// Every value on the 0.1 grid between the rounded ends
    fn range_values(&self, min: &str, max: &str) -> Result<Vec<f64>, String> {
        let parse = |s: &str| {
            s.parse::<f64>()
                .map(|v| round_to(v, 1))
                .map_err(|_| format!("'{}' is not a number", s))
        };
        let (min, max) = (parse(min)?, parse(max)?);

        if min < -self.bound || max > self.bound {
            return Err(format!(
                "range must lie within -{0:.1} to {0:.1}",
                self.bound
            ));
        }
        if min > max {
            return Err("minimum is greater than maximum".to_string());
        }

        let first = (min * 10.0).round() as i64;
        let last = (max * 10.0).round() as i64;
        Ok((first..=last).map(|tenths| tenths as f64 / 10.0).collect())
    }

    fn fallback(&self, spec: &str, reason: String) -> Outcome<f64> {
        Outcome::warned(
            FALLBACK_STRENGTH,
            Warning::InvalidStrength {
                spec: spec.to_string(),
                reason,
            },
        )
    }
}

impl Default for StrengthParser {
    fn default() -> Self {
        Self::new(DEFAULT_BOUND)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampler::seeded_rng;

    fn parse(spec: &str, seed: u64) -> Outcome<f64> {
        StrengthParser::default().parse(spec, &mut seeded_rng(seed))
    }

    #[test]
    fn test_scalar() {
        assert_eq!(parse("0.73", 0).value, 0.73);
        assert_eq!(parse(" 1 ", 0).value, 1.0);
        assert_eq!(parse("0.456", 0).value, 0.46);
        assert_eq!(parse("-0.5", 0).value, -0.5);
        assert!(!parse("0.73", 0).has_warnings());
    }

    #[test]
    fn test_range_values() {
        let allowed = [0.4, 0.5, 0.6, 0.7, 0.8];
        let mut seen = Vec::new();
        for seed in 0..100 {
            let value = parse("0.4-0.8", seed).value;
            assert!(allowed.contains(&value), "{} not allowed", value);
            if !seen.contains(&value) {
                seen.push(value);
            }
        }
        assert_eq!(seen.len(), allowed.len());
    }

    #[test]
    fn test_range_rounds_ends() {
        let allowed = [0.4, 0.5, 0.6, 0.7, 0.8];
        for seed in 0..30 {
            assert!(allowed.contains(&parse("0.44 - 0.82", seed).value));
        }
    }

    #[test]
    fn test_negative_ranges() {
        for seed in 0..30 {
            let value = parse("-0.8--0.3", seed).value;
            assert!((-0.8..=-0.3).contains(&value));

            let value = parse("-0.5-0.5", seed).value;
            assert!((-0.5..=0.5).contains(&value));
        }
    }

    #[test]
    fn test_single_point_range() {
        assert_eq!(parse("0.7-0.7", 3).value, 0.7);
    }

    #[test]
    fn test_range_deterministic() {
        assert_eq!(parse("0.1-2.0", 11).value, parse("0.1-2.0", 11).value);
    }

    #[test]
    fn test_invalid_falls_back() {
        for spec in ["abc", "", "0.8-0.4", "-11-0", "0-10.5", "1-2-3"] {
            let outcome = parse(spec, 0);
            assert_eq!(outcome.value, FALLBACK_STRENGTH, "{}", spec);
            assert!(
                matches!(outcome.warnings[..], [Warning::InvalidStrength { .. }]),
                "{}",
                spec
            );
        }
    }

    #[test]
    fn test_custom_bound() {
        let parser = StrengthParser::new(2.0);
        assert_eq!(parser.parse("3-4", &mut seeded_rng(0)).value, FALLBACK_STRENGTH);
        assert!(!parser.parse("1-2", &mut seeded_rng(0)).has_warnings());
    }
}
