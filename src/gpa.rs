use crate::calc::calculate_weighted_point_ratio;
use crate::marks::calculate_mark;
use crate::model::{parse_points, CourseMetadata};
use crate::policy::PolicyContext;
use crate::store::CourseStore;
use serde::Serialize;

const WEIGHTED_COURSE_KEYWORDS: [&str; 8] =
    ["AP", "Hon", "Honors", "Adv", "Advanced", "Mag", "Magnet", "IB"];

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GpaResult {
    pub weighted: f64,
    pub unweighted: f64,
    pub counted: usize,
}

/// Case-sensitive substring match against the course name.
pub fn is_weighted_course(name: &str) -> bool {
    WEIGHTED_COURSE_KEYWORDS.iter().any(|k| name.contains(k))
}

pub fn mark_points(mark: &str) -> Option<f64> {
    match mark.trim() {
        "A" => Some(4.0),
        "B" => Some(3.0),
        "C" => Some(2.0),
        "D" => Some(1.0),
        "E" => Some(0.0),
        _ => None,
    }
}

/// Mark for one course: recomputed from the shadow copy when there is one,
/// otherwise taken from the server's preview.
pub fn resolve_course_mark(
    ctx: &PolicyContext<'_>,
    store: &CourseStore,
    period: &str,
    course: &CourseMetadata,
) -> String {
    let score_type_id = ctx.policy.default_score_type_id.as_str();
    if store.modified_course(period, &course.id).is_some() {
        let ratio = calculate_weighted_point_ratio(ctx, store, period, &course.id, None, None);
        return calculate_mark(ctx, score_type_id, ratio);
    }

    let preview = course.mark_preview.trim();
    if !preview.chars().any(|c| c.is_ascii_digit()) {
        return preview.to_string();
    }
    let percent = parse_points(preview.trim_end_matches('%'));
    calculate_mark(ctx, score_type_id, percent / 100.0)
}

/// Mean grade points over the period's courses. NaN when nothing counted.
pub fn calculate_mcps_gpa(
    ctx: &PolicyContext<'_>,
    store: &CourseStore,
    period: &str,
    ordering: &[CourseMetadata],
) -> GpaResult {
    let mut weighted_sum = 0.0_f64;
    let mut unweighted_sum = 0.0_f64;
    let mut counted = 0_usize;

    for course in ordering {
        let mark = resolve_course_mark(ctx, store, period, course);
        let Some(points) = mark_points(&mark) else {
            tracing::trace!(course = %course.id, mark = %mark, "course left out of gpa");
            continue;
        };
        let bonus = if is_weighted_course(&course.name) { 1.0 } else { 0.0 };
        weighted_sum += points + bonus;
        unweighted_sum += points;
        counted += 1;
    }

    GpaResult {
        weighted: weighted_sum / counted as f64,
        unweighted: unweighted_sum / counted as f64,
        counted,
    }
}
