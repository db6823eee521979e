use crate::policy::{PolicyContext, PolicyLookupError, PolicyVariant};
use serde::{Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;

pub const NO_MARK: &str = "N/A";

const MCPS_CUTOFFS: [(f64, &str); 4] = [(0.895, "A"), (0.795, "B"), (0.695, "C"), (0.595, "D")];

/// Visual tier for a ratio: `fg` (no styling) or `scale-0` (worst) .. `scale-6` (best).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreStyle {
    Fg,
    Scale(u8),
}

impl ScoreStyle {
    pub const TOP: ScoreStyle = ScoreStyle::Scale(6);
    pub const BOTTOM: ScoreStyle = ScoreStyle::Scale(0);
}

impl fmt::Display for ScoreStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScoreStyle::Fg => f.write_str("fg"),
            ScoreStyle::Scale(n) => write!(f, "scale-{}", n),
        }
    }
}

impl Serialize for ScoreStyle {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Letter/text mark for `ratio` under the given score type.
///
/// Missing score types surface as [`PolicyLookupError`]; callers that only
/// display the mark should use [`calculate_mark`].
pub fn try_calculate_mark(
    ctx: &PolicyContext<'_>,
    score_type_id: &str,
    ratio: f64,
) -> Result<String, PolicyLookupError> {
    let score_type = ctx.policy.score_type(score_type_id)?;
    if ratio.is_nan() || score_type.is_unscored() {
        return Ok(NO_MARK.to_string());
    }

    if ctx.variant == PolicyVariant::Mcps {
        let mark = MCPS_CUTOFFS
            .iter()
            .find(|(cutoff, _)| ratio >= *cutoff)
            .map(|(_, mark)| *mark)
            .unwrap_or("E");
        return Ok(mark.to_string());
    }

    let mut boundaries: Vec<_> = score_type.boundaries.iter().collect();
    boundaries.sort_by(|a, b| {
        b.low_score
            .partial_cmp(&a.low_score)
            .unwrap_or(Ordering::Equal)
    });
    Ok(boundaries
        .into_iter()
        .find(|b| b.low_score / score_type.max <= ratio)
        .map(|b| b.mark.clone())
        .unwrap_or_else(|| NO_MARK.to_string()))
}

pub fn calculate_mark(ctx: &PolicyContext<'_>, score_type_id: &str, ratio: f64) -> String {
    try_calculate_mark(ctx, score_type_id, ratio).unwrap_or_else(|e| {
        tracing::debug!(error = %e, "mark lookup fell back to N/A");
        NO_MARK.to_string()
    })
}

fn round_4_decimals(x: f64) -> f64 {
    (x * 10_000.0).round() / 10_000.0
}

pub fn calculate_score_style(ctx: &PolicyContext<'_>, score_type_id: &str, ratio: f64) -> ScoreStyle {
    let score_type = match ctx.policy.score_type(score_type_id) {
        Ok(s) => s,
        Err(e) => {
            tracing::debug!(error = %e, "style lookup fell back to fg");
            return ScoreStyle::Fg;
        }
    };
    if score_type.is_unscored() {
        return ScoreStyle::Fg;
    }
    if ratio >= 1.0 {
        return ScoreStyle::TOP;
    }
    if ratio <= 0.0 {
        return ScoreStyle::BOTTOM;
    }

    if ctx.variant == PolicyVariant::Mcps {
        if ratio.is_nan() {
            return ScoreStyle::Fg;
        }
        let tier = MCPS_CUTOFFS
            .iter()
            .zip([5_u8, 4, 3, 2])
            .find(|((cutoff, _), _)| ratio >= *cutoff)
            .map(|(_, tier)| tier)
            .unwrap_or(1);
        return ScoreStyle::Scale(tier);
    }

    // Source boundaries are hundredths of a percent; rounding keeps e.g.
    // 0.8999999 from missing a 90.00 cutoff. Walked in policy order, unsorted.
    let rounded = round_4_decimals(ratio);
    let mut tier: u8 = 5;
    for b in &score_type.boundaries {
        if b.low_score / score_type.max <= rounded {
            return ScoreStyle::Scale(tier);
        }
        tier = tier.saturating_sub(1).max(1);
    }
    ScoreStyle::Fg
}
