use crate::error::AnalyticsError;
use core_types::{Color, ColorRule, ComparisonOp};
use serde::{Deserialize, Serialize};

/// A partial edit to one rule in a draft. `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RulePatch {
    pub operator: Option<ComparisonOp>,
    pub threshold: Option<f64>,
    pub color: Option<Color>,
}

/// An editable copy of a region's rule list.
///
/// The committed rules are untouched while a draft exists; `into_rules` yields the list to hand
/// to the store as a replacement. Dropping the draft discards the edits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDraft {
    rules: Vec<ColorRule>,
}

impl RuleDraft {
    /// Starts a draft from a snapshot of the committed rules.
    pub fn start(committed: &[ColorRule]) -> Self {
        Self {
            rules: committed.to_vec(),
        }
    }

    pub fn rules(&self) -> &[ColorRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn update_rule(&mut self, index: usize, patch: RulePatch) -> Result<(), AnalyticsError> {
        let len = self.rules.len();
        let rule = self
            .rules
            .get_mut(index)
            .ok_or(AnalyticsError::RuleIndexOutOfRange { index, len })?;

        if let Some(threshold) = patch.threshold {
            if !threshold.is_finite() {
                return Err(AnalyticsError::InvalidEdit(format!(
                    "threshold must be a finite number, got {}",
                    threshold
                )));
            }
            rule.threshold = threshold;
        }
        if let Some(operator) = patch.operator {
            rule.operator = operator;
        }
        if let Some(color) = patch.color {
            rule.color = color;
        }
        Ok(())
    }

    /// Appends a catch-all placeholder (`>= 0 -> neutral`) and returns its index.
    pub fn add_rule(&mut self) -> usize {
        self.rules
            .push(ColorRule::new(ComparisonOp::Ge, 0.0, Color::neutral()));
        self.rules.len() - 1
    }

    pub fn remove_rule(&mut self, index: usize) -> Result<ColorRule, AnalyticsError> {
        if index >= self.rules.len() {
            return Err(AnalyticsError::RuleIndexOutOfRange {
                index,
                len: self.rules.len(),
            });
        }
        Ok(self.rules.remove(index))
    }

    /// Moves the rule at `from` so that it ends up at index `to`.
    pub fn move_rule(&mut self, from: usize, to: usize) -> Result<(), AnalyticsError> {
        let len = self.rules.len();
        for index in [from, to] {
            if index >= len {
                return Err(AnalyticsError::RuleIndexOutOfRange { index, len });
            }
        }
        let rule = self.rules.remove(from);
        self.rules.insert(to, rule);
        Ok(())
    }

    pub fn into_rules(self) -> Vec<ColorRule> {
        self.rules
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edits_do_not_touch_the_committed_list() {
        let committed = ColorRule::default_set();
        let mut draft = RuleDraft::start(&committed);
        draft
            .update_rule(
                0,
                RulePatch {
                    threshold: Some(5.0),
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!(committed[0].threshold, 10.0);
        assert_eq!(draft.rules()[0].threshold, 5.0);
        assert_eq!(draft.rules()[0].id, committed[0].id);
    }

    #[test]
    fn add_remove_and_move() {
        let committed = ColorRule::default_set();
        let mut draft = RuleDraft::start(&committed);

        let index = draft.add_rule();
        assert_eq!(index, 4);
        assert_eq!(draft.rules()[4].operator, ComparisonOp::Ge);
        assert_eq!(draft.rules()[4].color, Color::neutral());

        let removed = draft.remove_rule(0).unwrap();
        assert_eq!(removed.id, committed[0].id);

        draft.move_rule(2, 0).unwrap();
        let ids: Vec<_> = draft.rules().iter().map(|r| r.id).collect();
        assert_eq!(ids[0], committed[3].id);
        assert_eq!(ids[1], committed[1].id);
        assert_eq!(ids[2], committed[2].id);

        assert_eq!(draft.into_rules().len(), 4);
    }

    #[test]
    fn out_of_range_and_invalid_edits_are_rejected() {
        let mut draft = RuleDraft::start(&ColorRule::default_set());
        assert_eq!(
            draft.remove_rule(9),
            Err(AnalyticsError::RuleIndexOutOfRange { index: 9, len: 4 })
        );
        assert!(draft.move_rule(0, 4).is_err());
        assert!(matches!(
            draft.update_rule(
                1,
                RulePatch {
                    threshold: Some(f64::NAN),
                    ..Default::default()
                }
            ),
            Err(AnalyticsError::InvalidEdit(_))
        ));
        assert_eq!(draft.rules()[1].threshold, 10.0);
    }
}
