use crate::model::{Assignment, Course, CustomAssignment, ModifiedCourse};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::mpsc::{channel, Receiver};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseKey {
    pub period: String,
    pub course_id: String,
}

impl CourseKey {
    pub fn new(period: &str, course_id: &str) -> Self {
        Self {
            period: period.to_string(),
            course_id: course_id.to_string(),
        }
    }
}

impl fmt::Display for CourseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.period, self.course_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewSource {
    Live,
    #[default]
    Modified,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    PeriodPopulated { period: String, course_ids: Vec<String> },
    ShadowChanged(CourseKey),
    ShadowRolledBack(CourseKey),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("course not found: {0}")]
    CourseNotFound(CourseKey),
    #[error("assignment not found: {assignment_id} in {key}")]
    AssignmentNotFound { key: CourseKey, assignment_id: String },
    #[error("assignment {0} came from the server and cannot be removed")]
    NotCustom(String),
    #[error("invalid edit: {0}")]
    BadPatch(String),
}

impl StoreError {
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::CourseNotFound(_) | StoreError::AssignmentNotFound { .. } => "not_found",
            StoreError::NotCustom(_) => "not_custom",
            StoreError::BadPatch(_) => "bad_params",
        }
    }
}

/// Partial update for one shadow assignment. `score: Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentPatch {
    #[serde(default, deserialize_with = "deserialize_present")]
    pub score: Option<Option<String>>,
    pub max_score: Option<String>,
    pub is_for_grading: Option<bool>,
    pub measure_type_id: Option<String>,
}

fn deserialize_present<'de, D>(d: D) -> Result<Option<Option<String>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<String>::deserialize(d).map(Some)
}

impl AssignmentPatch {
    pub fn is_empty(&self) -> bool {
        self.score.is_none()
            && self.max_score.is_none()
            && self.is_for_grading.is_none()
            && self.measure_type_id.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAssignment {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub score: Option<String>,
    pub max_score: String,
    pub measure_type_id: String,
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(default)]
    pub is_for_grading: Option<bool>,
}

type Listener = Box<dyn FnMut(&StoreEvent)>;

/// Live (server) and modified (shadow) courses keyed by period + course id.
#[derive(Default)]
pub struct CourseStore {
    live: HashMap<CourseKey, Course>,
    modified: HashMap<CourseKey, ModifiedCourse>,
    listeners: Vec<Listener>,
}

impl fmt::Debug for CourseStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CourseStore")
            .field("live", &self.live.len())
            .field("modified", &self.modified.len())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl CourseStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&mut self, listener: F)
    where
        F: FnMut(&StoreEvent) + 'static,
    {
        self.listeners.push(Box::new(listener));
    }

    pub fn subscribe_channel(&mut self) -> Receiver<StoreEvent> {
        let (tx, rx) = channel();
        self.subscribe(move |e| {
            let _ = tx.send(e.clone());
        });
        rx
    }

    fn notify(&mut self, event: StoreEvent) {
        for listener in self.listeners.iter_mut() {
            listener(&event);
        }
    }

    /// Replaces every course of `period`; nothing from an earlier fetch survives.
    pub fn populate_all_courses(&mut self, period: &str, courses: Vec<Course>) {
        self.live.retain(|k, _| k.period != period);
        self.modified.retain(|k, _| k.period != period);

        let mut course_ids = Vec::with_capacity(courses.len());
        for course in courses {
            let key = CourseKey::new(period, &course.class_id);
            course_ids.push(course.class_id.clone());
            self.modified.insert(key.clone(), ModifiedCourse::from_course(&course));
            self.live.insert(key, course);
        }
        tracing::debug!(period, courses = course_ids.len(), "period populated");
        self.notify(StoreEvent::PeriodPopulated {
            period: period.to_string(),
            course_ids,
        });
    }

    pub fn course(&self, period: &str, course_id: &str) -> Option<&Course> {
        self.live.get(&CourseKey::new(period, course_id))
    }

    pub fn modified_course(&self, period: &str, course_id: &str) -> Option<&ModifiedCourse> {
        self.modified.get(&CourseKey::new(period, course_id))
    }

    pub fn assignments(&self, period: &str, course_id: &str, source: ViewSource) -> Vec<&Assignment> {
        match source {
            ViewSource::Live => self
                .course(period, course_id)
                .map(|c| c.assignments.iter().collect())
                .unwrap_or_default(),
            ViewSource::Modified => self
                .modified_course(period, course_id)
                .map(|m| m.assignment_refs())
                .unwrap_or_default(),
        }
    }

    /// Course ids of a period in key order.
    pub fn course_ids(&self, period: &str) -> Vec<String> {
        let mut ids: Vec<String> = self
            .live
            .keys()
            .filter(|k| k.period == period)
            .map(|k| k.course_id.clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn periods(&self) -> Vec<String> {
        let mut periods: Vec<String> = self.live.keys().map(|k| k.period.clone()).collect();
        periods.sort();
        periods.dedup();
        periods
    }

    pub fn diverged(&self) -> Vec<(&CourseKey, &ModifiedCourse)> {
        let mut out: Vec<_> = self.modified.iter().filter(|(_, m)| m.needs_rollback).collect();
        out.sort_by(|a, b| a.0.cmp(b.0));
        out
    }

    fn modified_mut(&mut self, key: &CourseKey) -> Result<&mut ModifiedCourse, StoreError> {
        self.modified
            .get_mut(key)
            .ok_or_else(|| StoreError::CourseNotFound(key.clone()))
    }

    pub fn edit_assignment(
        &mut self,
        key: &CourseKey,
        assignment_id: &str,
        patch: &AssignmentPatch,
    ) -> Result<&CustomAssignment, StoreError> {
        if patch.is_empty() {
            return Err(StoreError::BadPatch("patch has no fields".to_string()));
        }
        let shadow = self.modified_mut(key)?;
        let Some(idx) = shadow
            .assignments
            .iter()
            .position(|a| a.assignment.id == assignment_id)
        else {
            return Err(StoreError::AssignmentNotFound {
                key: key.clone(),
                assignment_id: assignment_id.to_string(),
            });
        };

        let target = &mut shadow.assignments[idx].assignment;
        if let Some(score) = &patch.score {
            target.score = score.clone();
        }
        if let Some(max_score) = &patch.max_score {
            target.max_score = max_score.clone();
        }
        if let Some(flag) = patch.is_for_grading {
            target.is_for_grading = flag;
        }
        if let Some(measure_type_id) = &patch.measure_type_id {
            target.measure_type_id = measure_type_id.clone();
        }
        shadow.needs_rollback = true;

        tracing::debug!(%key, assignment_id, "shadow assignment edited");
        self.notify(StoreEvent::ShadowChanged(key.clone()));
        Ok(&self.modified[key].assignments[idx])
    }

    /// Adds a locally fabricated assignment at the top of the shadow list.
    pub fn add_custom_assignment(
        &mut self,
        key: &CourseKey,
        draft: NewAssignment,
    ) -> Result<&CustomAssignment, StoreError> {
        let shadow = self.modified_mut(key)?;
        let assignment = Assignment {
            id: Uuid::new_v4().to_string(),
            name: draft.name,
            score: draft.score,
            max_score: draft.max_score,
            due_date: draft.due_date,
            measure_type_id: draft.measure_type_id,
            is_for_grading: draft.is_for_grading.unwrap_or(true),
        };
        let id = assignment.id.clone();
        shadow.assignments.insert(
            0,
            CustomAssignment {
                assignment,
                is_custom: true,
            },
        );
        shadow.needs_rollback = true;

        tracing::debug!(%key, assignment_id = %id, "custom assignment added");
        self.notify(StoreEvent::ShadowChanged(key.clone()));
        Ok(&self.modified[key].assignments[0])
    }

    pub fn remove_custom_assignment(
        &mut self,
        key: &CourseKey,
        assignment_id: &str,
    ) -> Result<CustomAssignment, StoreError> {
        let shadow = self.modified_mut(key)?;
        let Some(idx) = shadow
            .assignments
            .iter()
            .position(|a| a.assignment.id == assignment_id)
        else {
            return Err(StoreError::AssignmentNotFound {
                key: key.clone(),
                assignment_id: assignment_id.to_string(),
            });
        };
        if !shadow.assignments[idx].is_custom {
            return Err(StoreError::NotCustom(assignment_id.to_string()));
        }
        let removed = shadow.assignments.remove(idx);
        shadow.needs_rollback = true;

        self.notify(StoreEvent::ShadowChanged(key.clone()));
        Ok(removed)
    }

    /// Restores the shadow from the live copy, discarding every local edit.
    pub fn rollback(&mut self, key: &CourseKey) -> Result<(), StoreError> {
        let course = self
            .live
            .get(key)
            .ok_or_else(|| StoreError::CourseNotFound(key.clone()))?;
        let fresh = ModifiedCourse::from_course(course);
        self.modified.insert(key.clone(), fresh);

        tracing::debug!(%key, "shadow rolled back");
        self.notify(StoreEvent::ShadowRolledBack(key.clone()));
        Ok(())
    }

    pub fn rollback_period(&mut self, period: &str) -> Vec<CourseKey> {
        let keys: Vec<CourseKey> = self
            .course_ids(period)
            .into_iter()
            .map(|id| CourseKey::new(period, &id))
            .collect();
        for key in &keys {
            if let Some(course) = self.live.get(key) {
                self.modified.insert(key.clone(), ModifiedCourse::from_course(course));
                self.notify(StoreEvent::ShadowRolledBack(key.clone()));
            }
        }
        tracing::debug!(period, courses = keys.len(), "period shadows rolled back");
        keys
    }

    /// Installs a previously saved shadow. Only accepted for courses the live
    /// copy knows about.
    pub fn restore_shadow(&mut self, key: &CourseKey, shadow: ModifiedCourse) -> Result<(), StoreError> {
        if !self.live.contains_key(key) {
            return Err(StoreError::CourseNotFound(key.clone()));
        }
        self.modified.insert(key.clone(), shadow);
        self.notify(StoreEvent::ShadowChanged(key.clone()));
        Ok(())
    }
}
