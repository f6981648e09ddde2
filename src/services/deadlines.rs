// src/services/deadlines.rs

//! Deadline rule resolution, due-date arithmetic and urgency tiers.

use std::collections::BTreeSet;

use chrono::{Datelike, Days, NaiveDate, Weekday};

use crate::models::{DeadlineConfig, DeadlinePriority, DeadlineRule, Urgency};

/// Days remaining at or below which a deadline is critical.
pub const CRITICAL_WITHIN_DAYS: i64 = 3;

/// Days remaining at or below which a deadline is urgent.
pub const URGENT_WITHIN_DAYS: i64 = 7;

/// Pick the rule for an event type: highest priority, then lowest id.
pub fn select_rule<'a>(
    rules: &'a [DeadlineRule],
    org_id: &str,
    event_type: &str,
) -> Option<&'a DeadlineRule> {
    rules
        .iter()
        .filter(|r| r.event_type == event_type && r.applies_to(org_id))
        .min_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.id.cmp(&b.id)))
}

/// Due date computed from a rule, before it is persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadlinePlan {
    pub rule_id: String,
    pub title: String,
    pub due_on: NaiveDate,
    pub priority: DeadlinePriority,
}

/// Business-day calendar plus rule evaluation.
#[derive(Debug, Clone, Default)]
pub struct DeadlineEngine {
    holidays: BTreeSet<NaiveDate>,
}

impl DeadlineEngine {
    pub fn new(config: &DeadlineConfig) -> Self {
        Self {
            holidays: config.holidays.iter().copied().collect(),
        }
    }

    pub fn is_business_day(&self, date: NaiveDate) -> bool {
        !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) && !self.holidays.contains(&date)
    }

    /// Walk forward one day at a time, counting only business days.
    pub fn add_business_days(&self, start: NaiveDate, days: u32) -> NaiveDate {
        let mut current = start;
        let mut counted = 0;
        while counted < days {
            current = match current.succ_opt() {
                Some(next) => next,
                None => return current,
            };
            if self.is_business_day(current) {
                counted += 1;
            }
        }
        current
    }

    pub fn due_date(&self, rule: &DeadlineRule, published_on: NaiveDate) -> NaiveDate {
        if rule.business_days {
            self.add_business_days(published_on, rule.days)
        } else {
            published_on
                .checked_add_days(Days::new(u64::from(rule.days)))
                .unwrap_or(NaiveDate::MAX)
        }
    }

    /// Resolve the rule for an event and compute its deadline.
    ///
    /// Returns `None` when no active rule matches or the winning rule does
    /// not auto-create deadlines.
    pub fn plan(
        &self,
        rules: &[DeadlineRule],
        org_id: &str,
        event_type: &str,
        published_on: NaiveDate,
    ) -> Option<DeadlinePlan> {
        let rule = select_rule(rules, org_id, event_type)?;
        if !rule.auto_create {
            log::debug!("Rule {} matched {} but does not auto-create", rule.id, event_type);
            return None;
        }
        Some(DeadlinePlan {
            rule_id: rule.id.clone(),
            title: rule.deadline_title(),
            due_on: self.due_date(rule, published_on),
            priority: rule.default_urgency.deadline_priority(),
        })
    }
}

/// Urgency from time remaining, recomputed on every read.
pub struct UrgencyCalculator;

impl UrgencyCalculator {
    /// Urgency of a deadline due on `due_on`, seen from `today`.
    pub fn calculate(due_on: NaiveDate, today: NaiveDate) -> Urgency {
        let remaining = (due_on - today).num_days();
        if remaining <= CRITICAL_WITHIN_DAYS {
            Urgency::Critical
        } else if remaining <= URGENT_WITHIN_DAYS {
            Urgency::Urgent
        } else {
            Urgency::Normal
        }
    }
}
