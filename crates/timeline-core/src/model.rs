use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::calendar::{add_days, iso_date_serde, today_utc};

pub const FALLBACK_TASK_COLOR: &str = "#64748b";

const NEW_TASK_NAME: &str = "New Task";
const NEW_SUBTASK_NAME: &str = "New Sub-task";
const UNTITLED_TASK_NAME: &str = "Untitled";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EditError {
    #[error("unknown task id: {0}")]
    UnknownTask(String),
    #[error("unknown type id: {0}")]
    UnknownType(String),
    #[error("unknown activity id {activity} on task {task}")]
    UnknownActivity { task: String, activity: String },
    #[error("task {0} has sub-tasks; activities live on leaf tasks")]
    NotALeaf(String),
    #[error("sub-tasks can only be added to top-level tasks, {0} is nested")]
    NestedParent(String),
    #[error("type name must not be empty")]
    EmptyTypeName,
}

/// What happens to a parent's own activities when its first sub-task is
/// added.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActivityTransfer {
    /// Hand them to the new sub-task.
    #[default]
    Move,
    /// Drop them.
    Clear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum Zoom {
    Day,
    #[default]
    Week,
    Month,
    Quarter,
}

impl Zoom {
    pub const ALL: [Zoom; 4] = [Zoom::Day, Zoom::Week, Zoom::Month, Zoom::Quarter];

    pub fn from_key(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "day" => Some(Zoom::Day),
            "week" => Some(Zoom::Week),
            "month" => Some(Zoom::Month),
            "quarter" => Some(Zoom::Quarter),
            _ => None,
        }
    }

    pub fn as_key(self) -> &'static str {
        match self {
            Zoom::Day => "day",
            Zoom::Week => "week",
            Zoom::Month => "month",
            Zoom::Quarter => "quarter",
        }
    }
}

/// Stored documents may carry zoom keys this build does not know; those
/// render at week density.
impl From<String> for Zoom {
    fn from(raw: String) -> Self {
        Zoom::from_key(&raw).unwrap_or_else(|| {
            warn!(zoom = %raw, "unknown zoom level; falling back to week");
            Zoom::Week
        })
    }
}

impl std::fmt::Display for Zoom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_key())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskType {
    pub id: String,
    pub name: String,
    pub color: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Activity {
    pub id: String,

    #[serde(with = "iso_date_serde")]
    pub date: NaiveDate,

    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,

    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub type_ids: Vec<String>,

    #[serde(default)]
    pub children: Vec<Task>,

    #[serde(default)]
    pub activities: Vec<Activity>,
}

impl Task {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            type_ids: vec![],
            children: vec![],
            activities: vec![],
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Color of the task's first type, or the neutral fallback.
    pub fn primary_color<'a>(&self, types: &'a [TaskType]) -> &'a str {
        self.type_ids
            .first()
            .and_then(|id| types.iter().find(|t| &t.id == id))
            .map(|t| t.color.as_str())
            .unwrap_or(FALLBACK_TASK_COLOR)
    }

    pub fn has_any_type(&self, type_ids: &[String]) -> bool {
        self.type_ids.iter().any(|id| type_ids.contains(id))
    }
}

fn default_scale() -> f64 {
    1.0
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default)]
    pub zoom: Zoom,

    #[serde(default = "default_scale")]
    pub scale: f64,

    #[serde(default)]
    pub filter_type_ids: Vec<String>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            zoom: Zoom::Week,
            scale: default_scale(),
            filter_type_ids: vec![],
            extra: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TimelineState {
    #[serde(default)]
    pub types: Vec<TaskType>,

    #[serde(default)]
    pub tasks: Vec<Task>,

    #[serde(default)]
    pub settings: Settings,
}

impl TimelineState {
    /// Starter document written into a fresh data directory.
    pub fn sample(now: DateTime<Utc>) -> Self {
        let today = today_utc(now);
        let act = |id: &str, offset: i64, description: &str| Activity {
            id: id.to_string(),
            date: add_days(today, offset),
            description: description.to_string(),
        };
        let typed = |mut task: Task, type_ids: &[&str]| {
            task.type_ids = type_ids.iter().map(|id| id.to_string()).collect();
            task
        };

        let mut alignment = typed(
            Task::new("task-1-1", "Stakeholder alignment"),
            &["type-planning"],
        );
        alignment.description = "Sessions with team leads".to_string();
        alignment.activities = vec![act("act-101", 0, "Kickoff"), act("act-102", 3, "Alignment review")];

        let mut budget = typed(
            Task::new("task-1-2", "Budget adjustments"),
            &["type-finance"],
        );
        budget.description = "Reallocate based on priorities".to_string();
        budget.activities = vec![act("act-201", 5, "Initial proposal")];

        let mut planning = typed(
            Task::new("task-1", "Quarterly Planning"),
            &["type-planning", "type-strategic"],
        );
        planning.description = "High-level planning for Q1".to_string();
        planning.children = vec![alignment, budget];

        let mut hiring = typed(Task::new("task-2", "Team Hiring"), &["type-strategic"]);
        hiring.description = "Pipeline & interviews".to_string();
        hiring.activities = vec![act("act-301", -2, "JD finalized"), act("act-302", 10, "Panel interview")];

        let ty = |id: &str, name: &str, color: &str| TaskType {
            id: id.to_string(),
            name: name.to_string(),
            color: color.to_string(),
        };

        Self {
            types: vec![
                ty("type-planning", "Planning", "#3A86FF"),
                ty("type-strategic", "Strategic", "#8338EC"),
                ty("type-finance", "Finance", "#FF006E"),
            ],
            tasks: vec![planning, hiring],
            settings: Settings::default(),
        }
    }

    pub fn type_by_id(&self, id: &str) -> Option<&TaskType> {
        self.types.iter().find(|t| t.id == id)
    }

    /// Locates a task anywhere in the tree together with its direct parent.
    pub fn find_task(&self, id: &str) -> Option<(&Task, Option<&Task>)> {
        let mut stack: Vec<(&Task, Option<&Task>)> =
            self.tasks.iter().rev().map(|t| (t, None)).collect();
        while let Some((task, parent)) = stack.pop() {
            if task.id == id {
                return Some((task, parent));
            }
            stack.extend(task.children.iter().rev().map(|child| (child, Some(task))));
        }
        None
    }

    pub fn find_task_mut(&mut self, id: &str) -> Option<&mut Task> {
        find_task_in(&mut self.tasks, id)
    }

    fn task_mut(&mut self, id: &str) -> Result<&mut Task, EditError> {
        self.find_task_mut(id)
            .ok_or_else(|| EditError::UnknownTask(id.to_string()))
    }

    /// `{prefix}-{n}` not yet used by any type, task or activity.
    fn fresh_id(&self, prefix: &str) -> String {
        let mut taken: HashSet<&str> = self.types.iter().map(|t| t.id.as_str()).collect();
        let mut stack: Vec<&Task> = self.tasks.iter().collect();
        while let Some(task) = stack.pop() {
            taken.insert(task.id.as_str());
            taken.extend(task.activities.iter().map(|a| a.id.as_str()));
            stack.extend(task.children.iter());
        }

        let mut n = taken.len() + 1;
        loop {
            let candidate = format!("{prefix}-{n}");
            if !taken.contains(candidate.as_str()) {
                return candidate;
            }
            n += 1;
        }
    }

    pub fn add_type(&mut self, name: &str, color: &str) -> Result<String, EditError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(EditError::EmptyTypeName);
        }
        let id = self.fresh_id("type");
        self.types.push(TaskType {
            id: id.clone(),
            name: name.to_string(),
            color: color.trim().to_string(),
        });
        Ok(id)
    }

    /// An empty or missing name keeps the current one.
    pub fn edit_type(
        &mut self,
        id: &str,
        name: Option<&str>,
        color: Option<&str>,
    ) -> Result<(), EditError> {
        let ty = self
            .types
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| EditError::UnknownType(id.to_string()))?;
        if let Some(name) = name.map(str::trim).filter(|n| !n.is_empty()) {
            ty.name = name.to_string();
        }
        if let Some(color) = color {
            ty.color = color.trim().to_string();
        }
        Ok(())
    }

    /// Removes the type and every reference to it, in tasks at any depth
    /// and in the type filter.
    pub fn delete_type(&mut self, id: &str) -> Result<TaskType, EditError> {
        let pos = self
            .types
            .iter()
            .position(|t| t.id == id)
            .ok_or_else(|| EditError::UnknownType(id.to_string()))?;
        let removed = self.types.remove(pos);

        let mut stack: Vec<&mut Task> = self.tasks.iter_mut().collect();
        while let Some(task) = stack.pop() {
            task.type_ids.retain(|existing| existing != id);
            stack.extend(task.children.iter_mut());
        }
        self.settings.filter_type_ids.retain(|existing| existing != id);
        Ok(removed)
    }

    /// Appends an untyped top-level task and returns its id.
    pub fn add_task(&mut self, name: &str) -> String {
        let id = self.fresh_id("task");
        let name = match name.trim() {
            "" => NEW_TASK_NAME,
            trimmed => trimmed,
        };
        self.tasks.push(Task::new(id.clone(), name));
        id
    }

    /// Adds a sub-task that copies the parent's type ids. A parent stops
    /// owning activities once it has children, so `transfer` decides
    /// whether they move to the new sub-task or are dropped.
    pub fn add_subtask(
        &mut self,
        parent_id: &str,
        transfer: ActivityTransfer,
    ) -> Result<String, EditError> {
        match self.find_task(parent_id) {
            None => return Err(EditError::UnknownTask(parent_id.to_string())),
            Some((_, Some(_))) => return Err(EditError::NestedParent(parent_id.to_string())),
            Some((_, None)) => {}
        }

        let id = self.fresh_id("task");
        let parent = self.task_mut(parent_id)?;
        let mut child = Task::new(id.clone(), NEW_SUBTASK_NAME);
        child.type_ids = parent.type_ids.clone();
        let activities = std::mem::take(&mut parent.activities);
        if transfer == ActivityTransfer::Move {
            child.activities = activities;
        }
        parent.children.push(child);
        Ok(id)
    }

    /// An empty name becomes "Untitled"; the description is trimmed.
    pub fn update_task(
        &mut self,
        id: &str,
        name: Option<&str>,
        description: Option<&str>,
    ) -> Result<(), EditError> {
        let task = self.task_mut(id)?;
        if let Some(name) = name {
            task.name = task_name(name);
        }
        if let Some(description) = description {
            task.description = description.trim().to_string();
        }
        Ok(())
    }

    /// Removes the task, and its sub-tasks with it, from wherever it sits.
    pub fn delete_task(&mut self, id: &str) -> Result<Task, EditError> {
        remove_task_in(&mut self.tasks, id).ok_or_else(|| EditError::UnknownTask(id.to_string()))
    }

    /// Appends `type_id` to the task's types unless it is already there.
    pub fn add_task_type(&mut self, task_id: &str, type_id: &str) -> Result<(), EditError> {
        if self.type_by_id(type_id).is_none() {
            return Err(EditError::UnknownType(type_id.to_string()));
        }
        let task = self.task_mut(task_id)?;
        if !task.type_ids.iter().any(|existing| existing == type_id) {
            task.type_ids.push(type_id.to_string());
        }
        Ok(())
    }

    pub fn remove_task_type(&mut self, task_id: &str, type_id: &str) -> Result<(), EditError> {
        let task = self.task_mut(task_id)?;
        let before = task.type_ids.len();
        task.type_ids.retain(|existing| existing != type_id);
        if task.type_ids.len() == before {
            return Err(EditError::UnknownType(type_id.to_string()));
        }
        Ok(())
    }

    /// Swaps the type with the one before it. Raising the second type
    /// makes it the task's color.
    pub fn raise_task_type(&mut self, task_id: &str, type_id: &str) -> Result<(), EditError> {
        let task = self.task_mut(task_id)?;
        let idx = task
            .type_ids
            .iter()
            .position(|existing| existing == type_id)
            .ok_or_else(|| EditError::UnknownType(type_id.to_string()))?;
        if idx > 0 {
            task.type_ids.swap(idx - 1, idx);
        }
        Ok(())
    }

    pub fn add_activity(
        &mut self,
        task_id: &str,
        date: NaiveDate,
        description: &str,
    ) -> Result<String, EditError> {
        let id = self.fresh_id("act");
        let task = self.task_mut(task_id)?;
        if !task.is_leaf() {
            return Err(EditError::NotALeaf(task_id.to_string()));
        }
        task.activities.push(Activity {
            id: id.clone(),
            date,
            description: description.to_string(),
        });
        Ok(id)
    }

    pub fn edit_activity(
        &mut self,
        task_id: &str,
        activity_id: &str,
        date: Option<NaiveDate>,
        description: Option<&str>,
    ) -> Result<(), EditError> {
        let task = self.task_mut(task_id)?;
        let activity = task
            .activities
            .iter_mut()
            .find(|a| a.id == activity_id)
            .ok_or_else(|| EditError::UnknownActivity {
                task: task_id.to_string(),
                activity: activity_id.to_string(),
            })?;
        if let Some(date) = date {
            activity.date = date;
        }
        if let Some(description) = description {
            activity.description = description.to_string();
        }
        Ok(())
    }

    pub fn remove_activity(&mut self, task_id: &str, activity_id: &str) -> Result<Activity, EditError> {
        let task = self.task_mut(task_id)?;
        let pos = task
            .activities
            .iter()
            .position(|a| a.id == activity_id)
            .ok_or_else(|| EditError::UnknownActivity {
                task: task_id.to_string(),
                activity: activity_id.to_string(),
            })?;
        Ok(task.activities.remove(pos))
    }
}

fn task_name(raw: &str) -> String {
    let name = raw.trim();
    if name.is_empty() {
        UNTITLED_TASK_NAME.to_string()
    } else {
        name.to_string()
    }
}

fn find_task_in<'a>(tasks: &'a mut [Task], id: &str) -> Option<&'a mut Task> {
    for task in tasks {
        if task.id == id {
            return Some(task);
        }
        if let Some(found) = find_task_in(&mut task.children, id) {
            return Some(found);
        }
    }
    None
}

fn remove_task_in(tasks: &mut Vec<Task>, id: &str) -> Option<Task> {
    if let Some(pos) = tasks.iter().position(|t| t.id == id) {
        return Some(tasks.remove(pos));
    }
    tasks
        .iter_mut()
        .find_map(|task| remove_task_in(&mut task.children, id))
}
