use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier used for tracking rules in the engine and in persisted state.
pub type RuleId = Uuid;

/// Condition family a rule evaluates each tick.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum RuleKind {
    /// Bid whenever the price sits more than one increment below the ceiling.
    LimitPrice,
    /// Bid once remaining time drops inside the threshold window.
    TimeTrigger { threshold_secs: i64 },
    /// Composite price/time urgency score with a probabilistic gate.
    Adaptive { total_duration_secs: i64 },
}

impl RuleKind {
    pub fn label(&self) -> &'static str {
        match self {
            RuleKind::LimitPrice => "limit_price",
            RuleKind::TimeTrigger { .. } => "time_trigger",
            RuleKind::Adaptive { .. } => "adaptive",
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum RuleError {
    #[error("auction slug must not be empty")]
    EmptyAuction,

    #[error("{0} must be a finite number greater than zero")]
    NonPositive(&'static str),

    #[error("missing rule parameter: {0}")]
    MissingParameter(&'static str),

    #[error("unknown rule: {0}")]
    UnknownRule(RuleId),
}

/// Lifecycle state of a rule at a given instant.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum RuleState {
    Disabled,
    Enabled,
    Cooling,
}

/// A user-declared bidding rule. Owned exclusively by the engine's rule book;
/// mutated only through [`Rule::apply`] / enable toggles, removed explicitly.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Rule {
    pub id: RuleId,
    pub auction_slug: String,
    pub kind: RuleKind,
    /// Hard ceiling: no proposed bid may exceed this.
    pub max_amount: f64,
    /// Step added to the current price when bidding.
    pub increment: f64,
    pub enabled: bool,
    pub last_fired_at: Option<DateTime<Utc>>,
}

impl Rule {
    /// Build a validated rule. New rules start disabled, mirroring the
    /// enable-toggle lifecycle; callers flip `enabled` explicitly.
    pub fn new(
        auction_slug: String,
        kind: RuleKind,
        max_amount: f64,
        increment: f64,
    ) -> Result<Self, RuleError> {
        if auction_slug.trim().is_empty() {
            return Err(RuleError::EmptyAuction);
        }
        validate_amounts(max_amount, increment)?;
        validate_kind(&kind)?;

        Ok(Self {
            id: Uuid::new_v4(),
            auction_slug,
            kind,
            max_amount,
            increment,
            enabled: false,
            last_fired_at: None,
        })
    }

    /// Apply a partial update. All candidate values are validated before any
    /// field is mutated, so a rejected update leaves the rule untouched.
    pub fn apply(&mut self, update: RuleUpdate) -> Result<(), RuleError> {
        let max_amount = update.max_amount.unwrap_or(self.max_amount);
        let increment = update.increment.unwrap_or(self.increment);
        validate_amounts(max_amount, increment)?;
        if let Some(kind) = &update.kind {
            validate_kind(kind)?;
        }

        self.max_amount = max_amount;
        self.increment = increment;
        if let Some(kind) = update.kind {
            self.kind = kind;
        }
        if let Some(enabled) = update.enabled {
            self.enabled = enabled;
        }
        Ok(())
    }

    /// True while the rule sits inside its post-fire cooldown window.
    pub fn is_cooling(&self, now: DateTime<Utc>, cooldown: Duration) -> bool {
        self.last_fired_at
            .map_or(false, |fired| now - fired < cooldown)
    }

    pub fn state(&self, now: DateTime<Utc>, cooldown: Duration) -> RuleState {
        if !self.enabled {
            RuleState::Disabled
        } else if self.is_cooling(now, cooldown) {
            RuleState::Cooling
        } else {
            RuleState::Enabled
        }
    }

    /// Runtime portion persisted across restarts.
    pub fn runtime_state(&self) -> RuleRuntimeState {
        RuleRuntimeState {
            enabled: self.enabled,
            last_fired_at: self.last_fired_at,
        }
    }
}

/// Partial update applied through the engine; `None` fields keep their value.
#[derive(Clone, Debug, Default)]
pub struct RuleUpdate {
    pub max_amount: Option<f64>,
    pub increment: Option<f64>,
    pub kind: Option<RuleKind>,
    pub enabled: Option<bool>,
}

/// Mutable runtime state mirrored to Redis so cooldown stamps survive a
/// restart for rules with pinned ids.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RuleRuntimeState {
    pub enabled: bool,
    pub last_fired_at: Option<DateTime<Utc>>,
}

fn validate_amounts(max_amount: f64, increment: f64) -> Result<(), RuleError> {
    if !max_amount.is_finite() || max_amount <= 0.0 {
        return Err(RuleError::NonPositive("max_amount"));
    }
    if !increment.is_finite() || increment <= 0.0 {
        return Err(RuleError::NonPositive("increment"));
    }
    Ok(())
}

fn validate_kind(kind: &RuleKind) -> Result<(), RuleError> {
    match kind {
        RuleKind::LimitPrice => Ok(()),
        RuleKind::TimeTrigger { threshold_secs } if *threshold_secs <= 0 => {
            Err(RuleError::NonPositive("threshold_secs"))
        }
        RuleKind::TimeTrigger { .. } => Ok(()),
        RuleKind::Adaptive {
            total_duration_secs,
        } if *total_duration_secs <= 0 => Err(RuleError::NonPositive("total_duration_secs")),
        RuleKind::Adaptive { .. } => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limit_rule() -> Rule {
        Rule::new("punk-7804".to_string(), RuleKind::LimitPrice, 0.10, 0.01).unwrap()
    }

    #[test]
    fn new_rule_starts_disabled_and_unfired() {
        let rule = limit_rule();
        assert!(!rule.enabled);
        assert!(rule.last_fired_at.is_none());
    }

    #[test]
    fn rejects_bad_parameters_at_construction() {
        let bad_max = Rule::new("a".into(), RuleKind::LimitPrice, 0.0, 0.01);
        assert_eq!(bad_max.unwrap_err(), RuleError::NonPositive("max_amount"));

        let bad_incr = Rule::new("a".into(), RuleKind::LimitPrice, 0.1, f64::NAN);
        assert_eq!(bad_incr.unwrap_err(), RuleError::NonPositive("increment"));

        let bad_threshold = Rule::new(
            "a".into(),
            RuleKind::TimeTrigger { threshold_secs: 0 },
            0.1,
            0.01,
        );
        assert_eq!(
            bad_threshold.unwrap_err(),
            RuleError::NonPositive("threshold_secs")
        );

        let empty = Rule::new("  ".into(), RuleKind::LimitPrice, 0.1, 0.01);
        assert_eq!(empty.unwrap_err(), RuleError::EmptyAuction);
    }

    #[test]
    fn rejected_update_leaves_rule_untouched() {
        let mut rule = limit_rule();
        let err = rule.apply(RuleUpdate {
            max_amount: Some(-1.0),
            increment: Some(0.02),
            ..Default::default()
        });
        assert!(err.is_err());
        assert!((rule.max_amount - 0.10).abs() < f64::EPSILON);
        assert!((rule.increment - 0.01).abs() < f64::EPSILON);
    }

    #[test]
    fn state_machine_transitions() {
        let cooldown = Duration::milliseconds(3_000);
        let now = Utc::now();

        let mut rule = limit_rule();
        assert_eq!(rule.state(now, cooldown), RuleState::Disabled);

        rule.enabled = true;
        assert_eq!(rule.state(now, cooldown), RuleState::Enabled);

        rule.last_fired_at = Some(now);
        assert_eq!(rule.state(now, cooldown), RuleState::Cooling);
        assert_eq!(
            rule.state(now + Duration::milliseconds(3_001), cooldown),
            RuleState::Enabled
        );

        rule.enabled = false;
        assert_eq!(rule.state(now, cooldown), RuleState::Disabled);
    }
}
