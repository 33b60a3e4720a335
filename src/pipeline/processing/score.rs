use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::common::constants::EMPTY_PLACEHOLDER;
use crate::domain::{doctorate_year, DegreeEntry, OriginFlag, ScoreKey, ScoringRule};
use crate::observability::metrics;
use crate::pipeline::processing::enrich::RuleMatch;

pub const RECENT_DOCTORATE_BONUS: f64 = 12.0;
pub const DOCTORATE_BONUS: f64 = 8.0;
/// A doctorate at most this many years before the reference year is recent
pub const DOCTORATE_RECENCY_YEARS: i32 = 5;
pub const EVALUATION_WEIGHT: f64 = 0.25;
pub const EVALUATION_MINIMUM: f64 = 2.0;

/// One (kind, nature, origin) group of a researcher's production.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreGroup {
    pub kind: String,
    pub nature: String,
    pub origin: OriginFlag,
    pub category: String,
    /// Distinct sequence identifiers in the group
    pub count: usize,
    pub points_per_item: f64,
    pub cap: Option<f64>,
    pub raw_score: f64,
    pub capped_score: f64,
    pub rule_found: bool,
}

/// Score components of one researcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreCard {
    /// Sorted by group key
    pub groups: Vec<ScoreGroup>,
    pub raw_production_score: f64,
    pub production_score: f64,
    pub doctorate_year: Option<i32>,
    pub doctorate_bonus: f64,
    pub external_evaluation_bonus: f64,
    pub composite_score: f64,
}

impl ScoreCard {
    /// All components zero, for researchers with nothing to score.
    pub fn empty() -> Self {
        Self {
            groups: Vec::new(),
            raw_production_score: 0.0,
            production_score: 0.0,
            doctorate_year: None,
            doctorate_bonus: 0.0,
            external_evaluation_bonus: 0.0,
            composite_score: 0.0,
        }
    }
}

/// `raw` when uncapped or within the cap, else the cap.
pub fn capped_score(raw: f64, cap: Option<f64>) -> f64 {
    match cap {
        Some(cap) if raw > cap => cap,
        _ => raw,
    }
}

/// 12 for a doctorate within the recency window, 8 for an older one, 0 without.
pub fn doctorate_bonus(doctorate_year: Option<i32>, reference_year: i32) -> f64 {
    match doctorate_year {
        Some(year) if reference_year.saturating_sub(year) <= DOCTORATE_RECENCY_YEARS => RECENT_DOCTORATE_BONUS,
        Some(_) => DOCTORATE_BONUS,
        None => 0.0,
    }
}

/// `max(0.25 * count, 2)` for researchers present in the evaluation table, else 0.
pub fn external_evaluation_bonus(evaluations: Option<f64>) -> f64 {
    match evaluations {
        Some(count) => (EVALUATION_WEIGHT * count).max(EVALUATION_MINIMUM),
        None => 0.0,
    }
}

/// Groups, counts, caps and sums one researcher's production.
#[derive(Debug, Clone)]
pub struct ScoreAggregator {
    reference_year: i32,
}

impl ScoreAggregator {
    pub fn new(reference_year: i32) -> Self {
        Self { reference_year }
    }

    pub fn reference_year(&self) -> i32 {
        self.reference_year
    }

    /// Groups are keyed and ordered by [`ScoreKey`], so the result is
    /// deterministic. Groups without a rule stay in the breakdown at zero.
    pub fn aggregate(
        &self,
        matches: &[RuleMatch],
        degrees: &[DegreeEntry],
        evaluations: Option<f64>,
    ) -> ScoreCard {
        let mut grouped: BTreeMap<&ScoreKey, (Option<&ScoringRule>, BTreeSet<&str>)> =
            BTreeMap::new();
        for m in matches {
            let sequence = if m.item.sequence.is_empty() {
                EMPTY_PLACEHOLDER
            } else {
                m.item.sequence.as_str()
            };
            grouped
                .entry(&m.key)
                .or_insert_with(|| (m.rule.as_ref(), BTreeSet::new()))
                .1
                .insert(sequence);
        }

        let groups: Vec<ScoreGroup> = grouped
            .into_iter()
            .map(|(key, (rule, sequences))| group_score(key, rule, sequences.len()))
            .collect();

        let raw_production_score = groups.iter().map(|g| g.raw_score).sum();
        let production_score = groups.iter().map(|g| g.capped_score).sum();
        let capped = groups.iter().filter(|g| g.capped_score < g.raw_score).count();
        metrics::score::capped_groups(capped as u64);

        let doctorate_year = doctorate_year(degrees);
        let doctorate_bonus = doctorate_bonus(doctorate_year, self.reference_year);
        let external_evaluation_bonus = external_evaluation_bonus(evaluations);
        let composite_score = production_score + doctorate_bonus + external_evaluation_bonus;

        debug!(
            groups = groups.len(),
            production_score,
            doctorate_bonus,
            external_evaluation_bonus,
            composite_score,
            "Score aggregated"
        );

        ScoreCard {
            groups,
            raw_production_score,
            production_score,
            doctorate_year,
            doctorate_bonus,
            external_evaluation_bonus,
            composite_score,
        }
    }
}

fn group_score(key: &ScoreKey, rule: Option<&ScoringRule>, count: usize) -> ScoreGroup {
    match rule {
        Some(rule) => {
            let raw = count as f64 * rule.points_per_item;
            ScoreGroup {
                kind: key.kind.clone(),
                nature: key.nature.clone(),
                origin: key.origin,
                category: rule.category.clone(),
                count,
                points_per_item: rule.points_per_item,
                cap: rule.cap,
                raw_score: raw,
                capped_score: capped_score(raw, rule.cap),
                rule_found: true,
            }
        }
        None => ScoreGroup {
            kind: key.kind.clone(),
            nature: key.nature.clone(),
            origin: key.origin,
            category: String::new(),
            count,
            points_per_item: 0.0,
            cap: None,
            raw_score: 0.0,
            capped_score: 0.0,
            rule_found: false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ProductionItem, ScoreSource};
    use proptest::prelude::*;

    fn rule(points: f64, cap: Option<f64>) -> ScoringRule {
        ScoringRule {
            category: "A".to_string(),
            points_per_item: points,
            cap,
        }
    }

    fn matched(sequence: &str, rule: Option<ScoringRule>) -> RuleMatch {
        RuleMatch {
            item: ProductionItem {
                source: ScoreSource::Bibliographic,
                kind: "ARTIGO".to_string(),
                nature: "COMPLETO".to_string(),
                subtype: String::new(),
                year: "2020".to_string(),
                country: "Brasil".to_string(),
                sequence: sequence.to_string(),
                title: String::new(),
                extras: Default::default(),
            },
            key: ScoreKey::new("ARTIGO", "COMPLETO", OriginFlag::Domestic),
            rule,
        }
    }

    #[test]
    fn test_distinct_sequences_count_once() {
        let r = Some(rule(10.0, Some(50.0)));
        // basic and detail record of the same item
        let card = ScoreAggregator::new(2020).aggregate(
            &[matched("1", r.clone()), matched("1", r)],
            &[],
            None,
        );
        assert_eq!(card.groups[0].count, 1);
        assert_eq!(card.production_score, 10.0);
    }

    #[test]
    fn test_cap_limits_group() {
        let r = Some(rule(10.0, Some(15.0)));
        let card = ScoreAggregator::new(2020).aggregate(
            &[matched("1", r.clone()), matched("2", r)],
            &[],
            None,
        );
        assert_eq!(card.raw_production_score, 20.0);
        assert_eq!(card.production_score, 15.0);
    }

    #[test]
    fn test_unmatched_group_is_zero_but_reported() {
        let card = ScoreAggregator::new(2020).aggregate(&[matched("1", None)], &[], None);
        assert_eq!(card.groups.len(), 1);
        assert!(!card.groups[0].rule_found);
        assert_eq!(card.groups[0].count, 1);
        assert_eq!(card.composite_score, 0.0);
    }

    #[test]
    fn test_doctorate_bonus_boundary() {
        assert_eq!(doctorate_bonus(Some(2015), 2020), 12.0);
        assert_eq!(doctorate_bonus(Some(2014), 2020), 8.0);
        assert_eq!(doctorate_bonus(None, 2020), 0.0);
    }

    #[test]
    fn test_absurd_doctorate_year_does_not_overflow() {
        assert_eq!(doctorate_bonus(Some(-2_147_483_000), 2020), 8.0);
        assert_eq!(doctorate_bonus(Some(i32::MIN), i32::MAX), 8.0);
    }

    #[test]
    fn test_external_bonus_has_minimum() {
        assert_eq!(external_evaluation_bonus(None), 0.0);
        assert_eq!(external_evaluation_bonus(Some(0.0)), 2.0);
        assert_eq!(external_evaluation_bonus(Some(4.0)), 2.0);
        assert_eq!(external_evaluation_bonus(Some(12.0)), 3.0);
    }

    #[test]
    fn test_empty_input_scores_zero() {
        let card = ScoreAggregator::new(2020).aggregate(&[], &[], None);
        assert_eq!(card, ScoreCard::empty());
    }

    #[test]
    fn test_unsequenced_items_share_one_slot() {
        let r = Some(rule(1.0, None));
        let card = ScoreAggregator::new(2020).aggregate(
            &[matched("", r.clone()), matched("", r)],
            &[],
            None,
        );
        assert_eq!(card.groups[0].count, 1);
    }

    proptest! {
        #[test]
        fn capped_never_exceeds_raw(raw in -1.0e6f64..1.0e6, cap in proptest::option::of(-1.0e6f64..1.0e6)) {
            let capped = capped_score(raw, cap);
            prop_assert!(capped <= raw);
            match cap {
                None => prop_assert_eq!(capped, raw),
                Some(c) if raw <= c => prop_assert_eq!(capped, raw),
                Some(c) => prop_assert_eq!(capped, c),
            }
        }
    }
}
