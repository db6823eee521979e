use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradingPeriod {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub is_default: bool,
}

/// Per-course descriptor used for ordering and for the server's last known mark.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseMetadata {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub mark_preview: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentInfo {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistrictInfo {
    pub name: String,
    #[serde(default)]
    pub address: String,
    pub host: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// `None` means not graded yet.
    #[serde(default)]
    pub score: Option<String>,
    pub max_score: String,
    #[serde(default)]
    pub due_date: Option<String>,
    pub measure_type_id: String,
    #[serde(default = "default_true")]
    pub is_for_grading: bool,
}

fn default_true() -> bool {
    true
}

impl Assignment {
    /// Earned points; NaN when the score is missing or not numeric.
    pub fn earned_points(&self) -> f64 {
        self.score.as_deref().map(parse_points).unwrap_or(f64::NAN)
    }

    pub fn possible_points(&self) -> f64 {
        parse_points(&self.max_score)
    }

    pub fn due_at(&self) -> Option<NaiveDateTime> {
        self.due_date.as_deref().and_then(parse_due_date)
    }
}

/// Server-sourced course record for one grading period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub class_id: String,
    #[serde(default)]
    pub assignments: Vec<Assignment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomAssignment {
    #[serde(flatten)]
    pub assignment: Assignment,
    #[serde(default)]
    pub is_custom: bool,
}

/// Locally editable shadow of a [`Course`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModifiedCourse {
    pub assignments: Vec<CustomAssignment>,
    #[serde(default)]
    pub needs_rollback: bool,
}

impl ModifiedCourse {
    /// Copies the server assignments, newest due date first.
    pub fn from_course(course: &Course) -> Self {
        let mut assignments: Vec<CustomAssignment> = course
            .assignments
            .iter()
            .cloned()
            .map(|assignment| CustomAssignment {
                assignment,
                is_custom: false,
            })
            .collect();
        sort_by_due_date_desc(&mut assignments);
        Self {
            assignments,
            needs_rollback: false,
        }
    }

    pub fn assignment_refs(&self) -> Vec<&Assignment> {
        self.assignments.iter().map(|c| &c.assignment).collect()
    }
}

// Stable: undated rows keep their relative order after every dated row.
pub fn sort_by_due_date_desc(assignments: &mut [CustomAssignment]) {
    assignments.sort_by(|a, b| {
        match (a.assignment.due_at(), b.assignment.due_at()) {
            (Some(x), Some(y)) => y.cmp(&x),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    });
}

/// Reads the leading decimal number and ignores whatever follows it
/// (`"8.5 pts"` is 8.5). No leading number gives NaN.
pub fn parse_points(raw: &str) -> f64 {
    let t = raw.trim_start();
    let bytes = t.as_bytes();
    let digits_from = |start: usize| bytes[start.min(bytes.len())..].iter().take_while(|b| b.is_ascii_digit()).count();

    let mut end = usize::from(matches!(bytes.first(), Some(b'+' | b'-')));
    let int_digits = digits_from(end);
    end += int_digits;
    let mut frac_digits = 0;
    if bytes.get(end) == Some(&b'.') {
        frac_digits = digits_from(end + 1);
        if int_digits + frac_digits > 0 {
            end += 1 + frac_digits;
        }
    }
    if int_digits + frac_digits == 0 {
        return f64::NAN;
    }
    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exp = end + 1;
        if matches!(bytes.get(exp), Some(b'+' | b'-')) {
            exp += 1;
        }
        let exp_digits = digits_from(exp);
        if exp_digits > 0 {
            end = exp + exp_digits;
        }
    }
    t[..end].parse::<f64>().unwrap_or(f64::NAN)
}

pub fn parse_due_date(raw: &str) -> Option<NaiveDateTime> {
    let t = raw.trim();
    if t.is_empty() {
        return None;
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%m/%d/%Y %H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(t, fmt) {
            return Some(dt);
        }
    }
    for fmt in ["%Y-%m-%d", "%m/%d/%Y"] {
        if let Ok(d) = NaiveDate::parse_from_str(t, fmt) {
            return d.and_hms_opt(0, 0, 0);
        }
    }
    None
}
