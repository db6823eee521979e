use crate::marks::{calculate_score_style, try_calculate_mark, ScoreStyle};
use crate::model::Assignment;
use crate::policy::{PolicyContext, PolicyLookupError};
use crate::store::{CourseStore, ViewSource};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Hypothetical `(extra_earned, extra_possible)` points per measure type id.
pub type Adjustments = HashMap<String, (f64, f64)>;

#[derive(Debug, Clone, Serialize)]
pub struct CalcError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl CalcError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            details: None,
        }
    }
}

impl From<PolicyLookupError> for CalcError {
    fn from(e: PolicyLookupError) -> Self {
        let details = serde_json::json!({ "missingId": e.missing_id() });
        Self {
            code: e.code().to_string(),
            message: e.to_string(),
            details: Some(details),
        }
    }
}

/// An assignment counts when it is flagged for grading and has a score.
fn counts_toward_grade(a: &Assignment, measure_type_id: Option<&str>) -> bool {
    if !a.is_for_grading || a.score.is_none() {
        return false;
    }
    measure_type_id
        .map(|id| a.measure_type_id == id)
        .unwrap_or(true)
}

pub fn sum_assignments<F>(assignments: &[&Assignment], measure_type_id: Option<&str>, value: F) -> f64
where
    F: Fn(&Assignment) -> f64,
{
    assignments
        .iter()
        .filter(|a| counts_toward_grade(a, measure_type_id))
        .map(|a| value(a))
        .sum()
}

pub fn total_earned_points(assignments: &[&Assignment], measure_type_id: Option<&str>) -> f64 {
    sum_assignments(assignments, measure_type_id, Assignment::earned_points)
}

/// Ungraded work is left out of the denominator too.
pub fn total_possible_points(assignments: &[&Assignment], measure_type_id: Option<&str>) -> f64 {
    sum_assignments(assignments, measure_type_id, Assignment::possible_points)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryBreakdown {
    pub measure_type_id: String,
    pub name: String,
    pub weight: f64,
    pub earned: f64,
    pub possible: f64,
    pub extra_earned: f64,
    pub extra_possible: f64,
    /// Unweighted category ratio; NaN for skipped categories.
    pub ratio: f64,
    pub included: bool,
}

pub fn category_breakdown(
    ctx: &PolicyContext<'_>,
    assignments: &[&Assignment],
    adjustments: Option<&Adjustments>,
) -> Vec<CategoryBreakdown> {
    ctx.policy
        .measure_types
        .iter()
        .map(|m| {
            let weight = ctx.weight_of(m);
            let possible = total_possible_points(assignments, Some(&m.id));
            let earned = total_earned_points(assignments, Some(&m.id));
            let (extra_earned, extra_possible) = adjustments
                .and_then(|adj| adj.get(&m.id).copied())
                .unwrap_or((0.0, 0.0));

            // Zero (or unparseable) possible points drops the category outright.
            let skipped = possible == 0.0 || possible.is_nan();
            let ratio = if skipped {
                f64::NAN
            } else {
                (earned + extra_earned) / (possible + extra_possible)
            };

            CategoryBreakdown {
                measure_type_id: m.id.clone(),
                name: m.name.clone(),
                weight,
                earned,
                possible,
                extra_earned,
                extra_possible,
                ratio,
                included: !(ratio * weight).is_nan(),
            }
        })
        .collect()
}

/// Weighted ratio normalized against the categories that contributed.
/// NaN when no category contributed.
pub fn weighted_point_ratio(
    ctx: &PolicyContext<'_>,
    assignments: &[&Assignment],
    adjustments: Option<&Adjustments>,
) -> f64 {
    let mut weight_sum = 0.0_f64;
    let mut weighted_sum = 0.0_f64;
    for c in category_breakdown(ctx, assignments, adjustments) {
        if !c.included {
            continue;
        }
        weight_sum += c.weight;
        weighted_sum += c.ratio * c.weight;
    }
    weighted_sum / weight_sum
}

/// Ratio for one stored course. `assignments` overrides the stored list;
/// otherwise the shadow copy is used.
pub fn calculate_weighted_point_ratio(
    ctx: &PolicyContext<'_>,
    store: &CourseStore,
    period: &str,
    course_id: &str,
    adjustments: Option<&Adjustments>,
    assignments: Option<&[Assignment]>,
) -> f64 {
    let selected: Vec<&Assignment> = match assignments {
        Some(list) => list.iter().collect(),
        None => store.assignments(period, course_id, ViewSource::Modified),
    };
    weighted_point_ratio(ctx, &selected, adjustments)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseSummary {
    pub period: String,
    pub course_id: String,
    pub source: ViewSource,
    pub score_type_id: String,
    pub ratio: f64,
    pub mark: String,
    pub style: ScoreStyle,
    pub needs_rollback: bool,
    pub categories: Vec<CategoryBreakdown>,
}

/// Ratio, mark, style and per-category detail for one stored course.
pub fn summarize_course(
    ctx: &PolicyContext<'_>,
    store: &CourseStore,
    period: &str,
    course_id: &str,
    score_type_id: Option<&str>,
    adjustments: Option<&Adjustments>,
    source: ViewSource,
) -> Result<CourseSummary, CalcError> {
    if store.course(period, course_id).is_none() {
        return Err(CalcError::new("not_found", "course not loaded for period"));
    }
    let score_type_id = score_type_id.unwrap_or(&ctx.policy.default_score_type_id);
    let assignments = store.assignments(period, course_id, source);
    let ratio = weighted_point_ratio(ctx, &assignments, adjustments);
    let mark = try_calculate_mark(ctx, score_type_id, ratio)?;

    Ok(CourseSummary {
        period: period.to_string(),
        course_id: course_id.to_string(),
        source,
        score_type_id: score_type_id.to_string(),
        ratio,
        mark,
        style: calculate_score_style(ctx, score_type_id, ratio),
        needs_rollback: store
            .modified_course(period, course_id)
            .map(|m| m.needs_rollback)
            .unwrap_or(false),
        categories: category_breakdown(ctx, &assignments, adjustments),
    })
}
