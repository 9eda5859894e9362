use std::collections::HashSet;

use serde::Serialize;
use tracing::debug;

use crate::model::{Task, TimelineState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Issue {
    pub severity: Severity,
    pub subject: String,
    pub message: String,
}

impl Issue {
    fn error(subject: &str, message: String) -> Self {
        Self {
            severity: Severity::Error,
            subject: subject.to_string(),
            message,
        }
    }

    fn warning(subject: &str, message: String) -> Self {
        Self {
            severity: Severity::Warning,
            subject: subject.to_string(),
            message,
        }
    }
}

/// Checks the invariants the layout code relies on: only leaf tasks own
/// activities, ids are unique, and type references resolve.
#[tracing::instrument(skip(state))]
pub fn check_state(state: &TimelineState) -> Vec<Issue> {
    let mut issues = Vec::new();

    let mut type_ids = HashSet::new();
    for ty in &state.types {
        if !type_ids.insert(ty.id.as_str()) {
            issues.push(Issue::error(&ty.id, format!("duplicate type id {:?}", ty.id)));
        }
    }

    let mut task_ids = HashSet::new();
    let mut activity_ids = HashSet::new();
    let mut stack: Vec<&Task> = state.tasks.iter().rev().collect();
    while let Some(task) = stack.pop() {
        if !task_ids.insert(task.id.as_str()) {
            issues.push(Issue::error(&task.id, format!("duplicate task id {:?}", task.id)));
        }
        if !task.is_leaf() && !task.activities.is_empty() {
            issues.push(Issue::error(
                &task.id,
                format!(
                    "task {:?} has sub-tasks and {} activities; only leaf tasks may own activities",
                    task.name,
                    task.activities.len()
                ),
            ));
        }
        for act in &task.activities {
            if !activity_ids.insert(act.id.as_str()) {
                issues.push(Issue::error(&act.id, format!("duplicate activity id {:?}", act.id)));
            }
        }
        for id in &task.type_ids {
            if !type_ids.contains(id.as_str()) {
                issues.push(Issue::warning(
                    &task.id,
                    format!("task {:?} references unknown type {:?}", task.name, id),
                ));
            }
        }
        stack.extend(task.children.iter().rev());
    }

    for id in &state.settings.filter_type_ids {
        if !type_ids.contains(id.as_str()) {
            issues.push(Issue::warning(id, format!("filter references unknown type {id:?}")));
        }
    }

    debug!(count = issues.len(), "checked timeline state");
    issues
}

pub fn has_errors(issues: &[Issue]) -> bool {
    issues.iter().any(|issue| issue.severity == Severity::Error)
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::{Severity, check_state, has_errors};
    use crate::model::{Task, TimelineState};

    #[test]
    fn sample_state_is_clean() {
        let now = Utc.with_ymd_and_hms(2026, 2, 16, 5, 0, 0).unwrap();
        let issues = check_state(&TimelineState::sample(now));
        assert!(issues.is_empty(), "{issues:?}");
    }

    #[test]
    fn reports_parent_activities_and_dangling_types() {
        let now = Utc.with_ymd_and_hms(2026, 2, 16, 5, 0, 0).unwrap();
        let mut state = TimelineState::sample(now);
        let stray = state.tasks[1].activities[0].clone();
        state.tasks[0].activities.push(stray);
        state.tasks[1].type_ids.push("type-missing".to_string());
        state.tasks.push(Task::new("task-2", "Duplicate"));
        state.settings.filter_type_ids = vec!["nope".to_string()];

        let issues = check_state(&state);
        assert!(has_errors(&issues));

        let errors: Vec<_> = issues
            .iter()
            .filter(|i| i.severity == Severity::Error)
            .map(|i| i.subject.as_str())
            .collect();
        assert_eq!(errors, vec!["task-1", "act-301", "task-2"]);

        let warnings: Vec<_> = issues
            .iter()
            .filter(|i| i.severity == Severity::Warning)
            .map(|i| i.subject.as_str())
            .collect();
        assert_eq!(warnings, vec!["task-2", "nope"]);
    }
}
