//! # Insight Rule Engine
//!
//! Fixed threshold rules over already computed summary numbers. Rules are
//! evaluated in a fixed order and each one fires independently; a metric
//! that is absent skips its rule.

use std::collections::HashMap;
use std::fmt;

use serde::{Serialize, Serializer};

use crate::aggregate::round2;

/// Loss ratio (percent) above which the portfolio is high-risk.
pub const HIGH_LOSS_RATIO: f64 = 80.0;
/// Loss ratio (percent) below which the portfolio is low-risk.
pub const LOW_LOSS_RATIO: f64 = 30.0;
/// Claims per payment above which claim frequency is high.
pub const HIGH_CLAIM_FREQUENCY: f64 = 0.5;
/// Claims per payment below which claim frequency is low.
pub const LOW_CLAIM_FREQUENCY: f64 = 0.1;
/// Absolute count correlation above which the relationship is strong.
pub const STRONG_CORRELATION: f64 = 0.7;

/// Activity consistency below this calls for dynamic load balancing.
pub const LOW_CONSISTENCY: f64 = 50.0;
/// Activity consistency above this allows stable capacity planning.
pub const HIGH_CONSISTENCY: f64 = 80.0;
/// Peak-to-mean multiplier above which auto-scaling must be aggressive.
pub const AGGRESSIVE_PEAK_MULTIPLIER: f64 = 3.0;

// =============================================================================
// CLAIMS / PAYMENTS INSIGHTS
// =============================================================================

/// Inputs of [`derive_insights`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InsightMetrics {
    pub loss_ratio: Option<f64>,
    pub claims_to_payments_ratio: Option<f64>,
    pub count_correlation: Option<f64>,
}

impl InsightMetrics {
    /// Read the known metric names from a `name -> number` map.
    #[must_use]
    pub fn from_map(metrics: &HashMap<String, f64>) -> Self {
        let get = |name: &str| metrics.get(name).copied().filter(|v| v.is_finite());
        Self {
            loss_ratio: get("loss_ratio"),
            claims_to_payments_ratio: get("claims_to_payments_ratio"),
            count_correlation: get("count_correlation"),
        }
    }
}

/// A fired rule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Insight {
    HighLossRatio(f64),
    LowLossRatio(f64),
    ModerateLossRatio(f64),
    HighClaimFrequency,
    LowClaimFrequency,
    StrongCorrelation(f64),
}

impl fmt::Display for Insight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HighLossRatio(r) => write!(
                f,
                "High loss ratio ({r}%) - review underwriting policies"
            ),
            Self::LowLossRatio(r) => write!(
                f,
                "Low loss ratio ({r}%) - risk is well controlled"
            ),
            Self::ModerateLossRatio(r) => write!(
                f,
                "Moderate loss ratio ({r}%) - within normal ranges"
            ),
            Self::HighClaimFrequency => f.write_str(
                "High claim frequency - consider reviewing customer satisfaction processes",
            ),
            Self::LowClaimFrequency => f.write_str(
                "Low claim frequency - good customer experience or possible under-reporting",
            ),
            Self::StrongCorrelation(r) => {
                let kind = if *r > 0.0 { "direct" } else { "inverse" };
                write!(f, "Strong {kind} correlation between claim and payment volume ({r})")
            }
        }
    }
}

impl Serialize for Insight {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Rules that fire for `metrics`, in evaluation order.
#[must_use]
pub fn evaluate(metrics: &InsightMetrics) -> Vec<Insight> {
    let mut insights = Vec::new();

    if let Some(loss) = metrics.loss_ratio {
        insights.push(if loss > HIGH_LOSS_RATIO {
            Insight::HighLossRatio(loss)
        } else if loss < LOW_LOSS_RATIO {
            Insight::LowLossRatio(loss)
        } else {
            Insight::ModerateLossRatio(loss)
        });
    }

    if let Some(frequency) = metrics.claims_to_payments_ratio {
        if frequency > HIGH_CLAIM_FREQUENCY {
            insights.push(Insight::HighClaimFrequency);
        } else if frequency < LOW_CLAIM_FREQUENCY {
            insights.push(Insight::LowClaimFrequency);
        }
    }

    if let Some(corr) = metrics.count_correlation {
        if corr.abs() > STRONG_CORRELATION {
            insights.push(Insight::StrongCorrelation(corr));
        }
    }

    insights
}

/// Human-readable findings for `metrics`.
#[must_use]
pub fn derive_insights(metrics: &InsightMetrics) -> Vec<String> {
    evaluate(metrics).iter().map(ToString::to_string).collect()
}

// =============================================================================
// ACTIVITY RECOMMENDATIONS
// =============================================================================

/// Inputs of [`derive_activity_recommendations`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActivityMetrics {
    pub peak_hours: Vec<u32>,
    pub consistency_score: Option<f64>,
    pub busiest_day: Option<String>,
    pub peak_multiplier: Option<f64>,
}

/// A fired capacity rule.
#[derive(Debug, Clone, PartialEq)]
pub enum ActivityRecommendation {
    ScaleOutWindow { from: u32, to: u32 },
    DynamicLoadBalancing,
    StableCapacityPlanning,
    ExtraResources(String),
    AggressiveAutoScaling(f64),
}

impl fmt::Display for ActivityRecommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ScaleOutWindow { from, to } => {
                write!(f, "Consider automatic scale-out during peak hours ({from}:00-{to}:00)")
            }
            Self::DynamicLoadBalancing => f.write_str(
                "High variability in activity patterns - implement dynamic load balancing",
            ),
            Self::StableCapacityPlanning => f.write_str(
                "Very consistent activity patterns - well suited to capacity planning",
            ),
            Self::ExtraResources(day) => write!(f, "Plan additional resources for {day}"),
            Self::AggressiveAutoScaling(m) => write!(
                f,
                "Activity peaks at {m}x the average - implement aggressive auto-scaling"
            ),
        }
    }
}

impl Serialize for ActivityRecommendation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Capacity recommendations, in evaluation order.
#[must_use]
pub fn derive_activity_recommendations(metrics: &ActivityMetrics) -> Vec<ActivityRecommendation> {
    let mut found = Vec::new();

    if let (Some(&from), Some(&to)) = (metrics.peak_hours.iter().min(), metrics.peak_hours.iter().max()) {
        found.push(ActivityRecommendation::ScaleOutWindow { from, to });
    }

    if let Some(score) = metrics.consistency_score {
        if score < LOW_CONSISTENCY {
            found.push(ActivityRecommendation::DynamicLoadBalancing);
        } else if score > HIGH_CONSISTENCY {
            found.push(ActivityRecommendation::StableCapacityPlanning);
        }
    }

    if let Some(day) = &metrics.busiest_day {
        found.push(ActivityRecommendation::ExtraResources(day.clone()));
    }

    if let Some(multiplier) = metrics.peak_multiplier.filter(|m| *m > AGGRESSIVE_PEAK_MULTIPLIER) {
        found.push(ActivityRecommendation::AggressiveAutoScaling(round2(multiplier)));
    }

    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::percentage;

    #[test]
    fn test_loss_ratio_90_is_high_risk() {
        let loss = percentage(90.0, 100.0);
        assert_eq!(loss.value, 90.0);

        let insights = evaluate(&InsightMetrics {
            loss_ratio: loss.get(),
            ..InsightMetrics::default()
        });
        assert_eq!(insights, vec![Insight::HighLossRatio(90.0)]);
        assert!(insights[0].to_string().contains("90%"));
    }

    #[test]
    fn test_rules_fire_in_fixed_order() {
        let metrics = InsightMetrics {
            loss_ratio: Some(45.0),
            claims_to_payments_ratio: Some(0.05),
            count_correlation: Some(-0.92),
        };
        let insights = evaluate(&metrics);
        assert_eq!(
            insights,
            vec![
                Insight::ModerateLossRatio(45.0),
                Insight::LowClaimFrequency,
                Insight::StrongCorrelation(-0.92),
            ]
        );
        assert!(derive_insights(&metrics)[2].contains("inverse"));
    }

    #[test]
    fn test_absent_metrics_skip_rules() {
        assert!(evaluate(&InsightMetrics::default()).is_empty());

        let mut map = HashMap::new();
        map.insert("loss_ratio".to_string(), 12.0);
        map.insert("claims_to_payments_ratio".to_string(), 0.3);
        map.insert("count_correlation".to_string(), 0.5);
        let insights = evaluate(&InsightMetrics::from_map(&map));
        assert_eq!(insights, vec![Insight::LowLossRatio(12.0)]);
    }

    #[test]
    fn test_high_frequency_and_direct_correlation() {
        let insights = derive_insights(&InsightMetrics {
            loss_ratio: None,
            claims_to_payments_ratio: Some(0.8),
            count_correlation: Some(0.75),
        });
        assert_eq!(insights.len(), 2);
        assert!(insights[0].starts_with("High claim frequency"));
        assert!(insights[1].contains("direct"));
    }

    #[test]
    fn test_activity_recommendations() {
        let found = derive_activity_recommendations(&ActivityMetrics {
            peak_hours: vec![14, 9, 11],
            consistency_score: Some(35.0),
            busiest_day: Some("Tuesday".to_string()),
            peak_multiplier: Some(3.456),
        });
        assert_eq!(
            found,
            vec![
                ActivityRecommendation::ScaleOutWindow { from: 9, to: 14 },
                ActivityRecommendation::DynamicLoadBalancing,
                ActivityRecommendation::ExtraResources("Tuesday".to_string()),
                ActivityRecommendation::AggressiveAutoScaling(3.46),
            ]
        );
        assert_eq!(found[0].to_string(), "Consider automatic scale-out during peak hours (9:00-14:00)");

        let calm = derive_activity_recommendations(&ActivityMetrics {
            consistency_score: Some(85.0),
            ..ActivityMetrics::default()
        });
        assert_eq!(calm, vec![ActivityRecommendation::StableCapacityPlanning]);
    }
}
