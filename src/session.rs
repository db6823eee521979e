use crate::model::{CourseMetadata, GradingPeriod, StudentInfo};
use crate::policy::{GradingPolicy, PolicyContext, PolicyVariant};
use crate::store::CourseStore;
use crate::transport::SessionPayload;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Persistable part of a session. The auth token is never included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub host: String,
    pub student: StudentInfo,
    pub policy: GradingPolicy,
    pub variant: PolicyVariant,
    pub grading_periods: BTreeMap<String, GradingPeriod>,
    pub course_ordering: Vec<CourseMetadata>,
}

/// Explicit context handed to every store and computation call.
#[derive(Debug)]
pub struct Session {
    pub host: String,
    pub token: Option<String>,
    pub student: StudentInfo,
    pub policy: GradingPolicy,
    pub variant: PolicyVariant,
    pub grading_periods: BTreeMap<String, GradingPeriod>,
    pub course_ordering: Vec<CourseMetadata>,
    pub store: CourseStore,
}

impl Session {
    pub fn from_payload(host: &str, payload: SessionPayload, variant: PolicyVariant) -> Self {
        Self {
            host: host.to_string(),
            token: Some(payload.token),
            student: payload.student,
            policy: payload.policy,
            variant,
            grading_periods: payload.grading_periods,
            course_ordering: payload.course_ordering,
            store: CourseStore::new(),
        }
    }

    /// Offline session: calculations work, transport calls need a new login.
    pub fn from_snapshot(snapshot: SessionSnapshot) -> Self {
        Self {
            host: snapshot.host,
            token: None,
            student: snapshot.student,
            policy: snapshot.policy,
            variant: snapshot.variant,
            grading_periods: snapshot.grading_periods,
            course_ordering: snapshot.course_ordering,
            store: CourseStore::new(),
        }
    }

    /// Keeps the store; replaces everything the server re-sent.
    pub fn apply_refresh(&mut self, payload: SessionPayload) {
        self.token = Some(payload.token);
        self.student = payload.student;
        self.policy = payload.policy;
        self.grading_periods = payload.grading_periods;
        self.course_ordering = payload.course_ordering;
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            host: self.host.clone(),
            student: self.student.clone(),
            policy: self.policy.clone(),
            variant: self.variant,
            grading_periods: self.grading_periods.clone(),
            course_ordering: self.course_ordering.clone(),
        }
    }

    pub fn policy_context(&self) -> PolicyContext<'_> {
        PolicyContext::new(&self.policy, self.variant)
    }

    pub fn period(&self, id: &str) -> Option<&GradingPeriod> {
        self.grading_periods.get(id)
    }

    /// Flagged default period, else the first one by id.
    pub fn default_period(&self) -> Option<&GradingPeriod> {
        self.grading_periods
            .values()
            .find(|p| p.is_default)
            .or_else(|| self.grading_periods.values().next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Course;

    fn payload(token: &str) -> SessionPayload {
        let mut periods = BTreeMap::new();
        for (id, default) in [("q1", false), ("q2", true)] {
            periods.insert(
                id.to_string(),
                GradingPeriod {
                    id: id.to_string(),
                    name: id.to_uppercase(),
                    is_default: default,
                },
            );
        }
        SessionPayload {
            token: token.to_string(),
            student: StudentInfo {
                id: "s1".to_string(),
                name: "Pat".to_string(),
            },
            policy: GradingPolicy {
                measure_types: vec![],
                score_types: vec![],
                default_score_type_id: "st".to_string(),
            },
            grading_periods: periods,
            course_ordering: vec![],
        }
    }

    #[test]
    fn default_period_prefers_flag() {
        let s = Session::from_payload("h", payload("t"), PolicyVariant::Generic);
        assert_eq!(s.default_period().map(|p| p.id.as_str()), Some("q2"));
    }

    #[test]
    fn snapshot_drops_token_and_store() {
        let mut s = Session::from_payload("h", payload("secret"), PolicyVariant::Mcps);
        s.store.populate_all_courses(
            "q1",
            vec![Course {
                class_id: "c1".to_string(),
                assignments: vec![],
            }],
        );
        let text = serde_json::to_string(&s.snapshot()).expect("ser");
        assert!(!text.contains("secret"));

        let restored = Session::from_snapshot(s.snapshot());
        assert_eq!(restored.token, None);
        assert_eq!(restored.variant, PolicyVariant::Mcps);
        assert!(restored.store.periods().is_empty());
    }

    #[test]
    fn refresh_keeps_store() {
        let mut s = Session::from_payload("h", payload("t1"), PolicyVariant::Generic);
        s.store.populate_all_courses(
            "q1",
            vec![Course {
                class_id: "c1".to_string(),
                assignments: vec![],
            }],
        );
        s.apply_refresh(payload("t2"));
        assert_eq!(s.token.as_deref(), Some("t2"));
        assert_eq!(s.store.periods(), vec!["q1".to_string()]);
    }
}
