use serde::{Deserialize, Serialize};
use thiserror::Error;

/// `max` value a score type uses when it is pass/fail or otherwise unscored.
pub const UNSCORED_MAX: f64 = -1.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasureType {
    pub id: String,
    pub name: String,
    /// Raw percentage as published by the district (e.g. 40 for 40%).
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreBoundary {
    pub low_score: f64,
    pub mark: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportCardScoreType {
    pub id: String,
    pub max: f64,
    #[serde(default)]
    pub boundaries: Vec<ScoreBoundary>,
}

impl ReportCardScoreType {
    pub fn is_unscored(&self) -> bool {
        self.max == UNSCORED_MAX
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradingPolicy {
    pub measure_types: Vec<MeasureType>,
    pub score_types: Vec<ReportCardScoreType>,
    pub default_score_type_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyLookupError {
    #[error("report card score type not found: {0}")]
    MissingScoreType(String),
    #[error("measure type not found: {0}")]
    MissingMeasureType(String),
}

impl PolicyLookupError {
    pub fn code(&self) -> &'static str {
        "policy_lookup_failed"
    }

    pub fn missing_id(&self) -> &str {
        match self {
            Self::MissingScoreType(id) | Self::MissingMeasureType(id) => id,
        }
    }
}

impl GradingPolicy {
    pub fn score_type(&self, id: &str) -> Result<&ReportCardScoreType, PolicyLookupError> {
        self.score_types
            .iter()
            .find(|s| s.id == id)
            .ok_or_else(|| PolicyLookupError::MissingScoreType(id.to_string()))
    }

    pub fn measure_type(&self, id: &str) -> Result<&MeasureType, PolicyLookupError> {
        self.measure_types
            .iter()
            .find(|m| m.id == id)
            .ok_or_else(|| PolicyLookupError::MissingMeasureType(id.to_string()))
    }
}

/// District family whose grading rules are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyVariant {
    #[default]
    Generic,
    /// Montgomery County Public Schools: fixed A-E cutoffs, fixed category weights.
    Mcps,
}

impl PolicyVariant {
    pub fn as_str(self) -> &'static str {
        match self {
            PolicyVariant::Generic => "generic",
            PolicyVariant::Mcps => "mcps",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "generic" => Some(PolicyVariant::Generic),
            "mcps" => Some(PolicyVariant::Mcps),
            _ => None,
        }
    }

    pub fn from_host(host: &str) -> Self {
        if host.to_ascii_lowercase().contains("mcps") {
            PolicyVariant::Mcps
        } else {
            PolicyVariant::Generic
        }
    }
}

/// Read-only view of the grading rules every computation runs against.
#[derive(Debug, Clone, Copy)]
pub struct PolicyContext<'a> {
    pub policy: &'a GradingPolicy,
    pub variant: PolicyVariant,
}

impl<'a> PolicyContext<'a> {
    pub fn new(policy: &'a GradingPolicy, variant: PolicyVariant) -> Self {
        Self { policy, variant }
    }

    pub fn weight_of(&self, measure_type: &MeasureType) -> f64 {
        compute_weight(self.variant, measure_type)
    }
}

/// Category weight as a fraction of 1.
pub fn compute_weight(variant: PolicyVariant, measure_type: &MeasureType) -> f64 {
    if variant == PolicyVariant::Mcps {
        match measure_type.name.as_str() {
            "All Tasks / Assessments" => return 0.9,
            "Practice / Preparation" => return 0.1,
            _ => {}
        }
    }
    // f64::max drops NaN, so a garbage weight resolves to 0.
    (measure_type.weight / 100.0).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn measure(name: &str, weight: f64) -> MeasureType {
        MeasureType {
            id: name.to_ascii_lowercase(),
            name: name.to_string(),
            weight,
        }
    }

    #[test]
    fn generic_weight_is_raw_percentage() {
        assert_eq!(
            compute_weight(PolicyVariant::Generic, &measure("Tests", 40.0)),
            0.4
        );
        assert_eq!(
            compute_weight(
                PolicyVariant::Generic,
                &measure("All Tasks / Assessments", 50.0)
            ),
            0.5
        );
    }

    #[test]
    fn mcps_overrides_only_the_two_named_categories() {
        let v = PolicyVariant::Mcps;
        assert_eq!(compute_weight(v, &measure("All Tasks / Assessments", 50.0)), 0.9);
        assert_eq!(compute_weight(v, &measure("Practice / Preparation", 50.0)), 0.1);
        assert_eq!(compute_weight(v, &measure("Homework", 25.0)), 0.25);
    }

    #[test]
    fn weight_never_negative() {
        assert_eq!(compute_weight(PolicyVariant::Generic, &measure("X", -10.0)), 0.0);
        assert_eq!(compute_weight(PolicyVariant::Generic, &measure("X", f64::NAN)), 0.0);
    }

    #[test]
    fn variant_resolves_from_host() {
        assert_eq!(
            PolicyVariant::from_host("md-MCPS-psv.edupoint.com"),
            PolicyVariant::Mcps
        );
        assert_eq!(
            PolicyVariant::from_host("ca-example.edupoint.com"),
            PolicyVariant::Generic
        );
        assert_eq!(PolicyVariant::parse(" MCPS "), Some(PolicyVariant::Mcps));
        assert_eq!(PolicyVariant::parse("district-b"), None);
    }

    #[test]
    fn lookup_errors_name_the_missing_id() {
        let policy = GradingPolicy {
            measure_types: vec![],
            score_types: vec![],
            default_score_type_id: "st".to_string(),
        };
        let e = policy.score_type("st").expect_err("missing");
        assert_eq!(e.missing_id(), "st");
        assert_eq!(e.to_string(), "report card score type not found: st");
        assert!(policy.measure_type("m9").is_err());
    }
}
