use crate::aggregation::WindowAggregator;
use core_types::{Color, ColorRule, TemporalWindow};
use serde::Serialize;

/// The outcome of classifying one region under the current window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    /// The window mean, `None` when it could not be computed.
    pub value: Option<f64>,
    pub color: Color,
    /// Index of the rule that produced `color`, if any matched.
    pub matched_rule: Option<usize>,
}

/// Maps a scalar to a color through an ordered rule list. First match wins.
#[derive(Debug, Default, Clone, Copy)]
pub struct ColorRuleEngine {
    aggregator: WindowAggregator,
}

impl ColorRuleEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of the first rule matching `value`. No value never matches.
    pub fn first_match(&self, value: Option<f64>, rules: &[ColorRule]) -> Option<usize> {
        let value = value?;
        rules.iter().position(|rule| rule.matches(value))
    }

    /// The color for `value`, or the neutral color when no rule matches.
    pub fn classify(&self, value: Option<f64>, rules: &[ColorRule]) -> Color {
        self.first_match(value, rules)
            .map(|index| rules[index].color.clone())
            .unwrap_or_else(Color::neutral)
    }

    /// Aggregates `values` over `window` and classifies the result.
    pub fn evaluate(
        &self,
        values: &[f64],
        window: TemporalWindow,
        rules: &[ColorRule],
    ) -> Classification {
        let value = self.aggregator.mean(values, window);
        let matched_rule = self.first_match(value, rules);
        let color = matched_rule
            .map(|index| rules[index].color.clone())
            .unwrap_or_else(Color::neutral);
        Classification {
            value,
            color,
            matched_rule,
        }
    }
}
