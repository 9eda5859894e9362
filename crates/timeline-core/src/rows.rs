use serde::Serialize;
use tracing::trace;

use crate::model::{
  Activity,
  Task
};

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize
)]
#[serde(rename_all = "lowercase")]
pub enum RowKind {
  Parent,
  Child
}

/// One renderable line of the task
/// list.
#[derive(Debug, Clone, Copy)]
pub struct VisibleRow<'a> {
  pub kind:           RowKind,
  pub task:           &'a Task,
  pub parent_task:    Option<&'a Task>,
  /// Top-level leaf shown as both a
  /// header and a data row.
  pub is_leaf_parent: bool,
  pub depth:          usize
}

impl VisibleRow<'_> {
  #[must_use]
  pub fn is_header(&self) -> bool {
    self.kind == RowKind::Parent
      && !self.is_leaf_parent
  }
}

fn passes_filter(
  task: &Task,
  filter_type_ids: &[String]
) -> bool {
  filter_type_ids.is_empty()
    || task.has_any_type(filter_type_ids)
}

struct Frame<'a> {
  task:   &'a Task,
  parent: Option<&'a Task>,
  depth:  usize,
  next:   usize,
  rows:   Vec<VisibleRow<'a>>
}

impl<'a> Frame<'a> {
  fn new(
    task: &'a Task,
    parent: Option<&'a Task>,
    depth: usize
  ) -> Self {
    Self {
      task,
      parent,
      depth,
      next: 0,
      rows: Vec::new()
    }
  }

  /// Header plus the surviving rows,
  /// or nothing when no row survived.
  fn finish(self) -> Vec<VisibleRow<'a>> {
    if self.rows.is_empty() {
      return self.rows;
    }
    let mut out =
      Vec::with_capacity(self.rows.len() + 1);
    out.push(VisibleRow {
      kind:           RowKind::Parent,
      task:           self.task,
      parent_task:    self.parent,
      is_leaf_parent: false,
      depth:          self.depth
    });
    out.extend(self.rows);
    out
  }
}

/// Flattens the task tree into display
/// order.
///
/// A top-level leaf is shown when it
/// passes the type filter. A task with
/// children is shown as a header only
/// when at least one of its
/// descendants survives the filter;
/// its own types do not matter. The
/// walk uses an explicit stack, so
/// deeply nested trees are fine.
#[tracing::instrument(skip(tasks))]
pub fn flatten_visible_rows<'a>(
  tasks: &'a [Task],
  filter_type_ids: &[String]
) -> Vec<VisibleRow<'a>> {
  let mut out = Vec::new();

  for top in tasks {
    if top.is_leaf() {
      if passes_filter(
        top,
        filter_type_ids
      ) {
        out.push(VisibleRow {
          kind:           RowKind::Parent,
          task:           top,
          parent_task:    None,
          is_leaf_parent: true,
          depth:          0
        });
      }
      continue;
    }

    let mut stack =
      vec![Frame::new(top, None, 0)];
    while let Some(frame) =
      stack.last_mut()
    {
      let task: &'a Task = frame.task;
      if let Some(child) =
        task.children.get(frame.next)
      {
        frame.next += 1;
        if !child.is_leaf() {
          let nested = Frame::new(
            child,
            Some(task),
            frame.depth + 1
          );
          stack.push(nested);
        } else if passes_filter(
          child,
          filter_type_ids
        ) {
          let row = VisibleRow {
            kind:           RowKind::Child,
            task:           child,
            parent_task:    Some(task),
            is_leaf_parent: false,
            depth:          frame.depth + 1
          };
          frame.rows.push(row);
        }
        continue;
      }

      let Some(done) = stack.pop() else {
        break;
      };
      let rows = done.finish();
      match stack.last_mut() {
        | Some(outer) => {
          outer.rows.extend(rows)
        }
        | None => out.extend(rows)
      }
    }
  }

  trace!(
    count = out.len(),
    "flattened visible rows"
  );
  out
}

/// Activities drawn on a row. Headers
/// of tasks with children carry none.
#[must_use]
pub fn row_activities<'a>(
  row: &VisibleRow<'a>
) -> &'a [Activity] {
  if row.is_header() {
    &[]
  } else {
    &row.task.activities
  }
}

#[cfg(test)]
mod tests {
  use chrono::NaiveDate;

  use super::{
    RowKind,
    flatten_visible_rows,
    row_activities
  };
  use crate::model::{
    Activity,
    Task
  };

  fn typed(
    id: &str,
    types: &[&str]
  ) -> Task {
    let mut task = Task::new(id, id);
    task.type_ids = types
      .iter()
      .map(|t| t.to_string())
      .collect();
    task
  }

  fn ids(
    rows: &[super::VisibleRow<'_>]
  ) -> Vec<(String, RowKind)> {
    rows
      .iter()
      .map(|r| (r.task.id.clone(), r.kind))
      .collect()
  }

  fn filter(ids: &[&str]) -> Vec<String> {
    ids.iter().map(|s| s.to_string()).collect()
  }

  #[test]
  fn no_filter_shows_everything_in_order()
  {
    let mut parent = typed("p", &[]);
    parent.children = vec![
      typed("c1", &[]),
      typed("c2", &[]),
    ];
    let tasks = vec![
      typed("solo", &[]),
      parent,
    ];
    let rows =
      flatten_visible_rows(&tasks, &[]);
    assert_eq!(
      ids(&rows),
      vec![
        ("solo".to_string(), RowKind::Parent),
        ("p".to_string(), RowKind::Parent),
        ("c1".to_string(), RowKind::Child),
        ("c2".to_string(), RowKind::Child),
      ]
    );
    assert!(rows[0].is_leaf_parent);
    assert!(!rows[1].is_leaf_parent);
    assert_eq!(
      rows[2]
        .parent_task
        .map(|p| p.id.as_str()),
      Some("p")
    );
  }

  #[test]
  fn header_follows_children_not_itself()
  {
    let mut parent = typed("p", &["other"]);
    parent.children = vec![
      typed("match", &["a"]),
      typed("miss", &["b"]),
    ];
    let tasks = vec![parent];
    let rows = flatten_visible_rows(
      &tasks,
      &filter(&["a"])
    );
    assert_eq!(
      ids(&rows),
      vec![
        ("p".to_string(), RowKind::Parent),
        ("match".to_string(), RowKind::Child),
      ]
    );

    let rows = flatten_visible_rows(
      &tasks,
      &filter(&["other"])
    );
    assert!(rows.is_empty());
  }

  #[test]
  fn leaf_top_level_tasks_are_filtered() {
    let tasks = vec![
      typed("a", &["x"]),
      typed("b", &["y"]),
      typed("c", &["x", "y"]),
    ];
    let rows = flatten_visible_rows(
      &tasks,
      &filter(&["x"])
    );
    assert_eq!(
      ids(&rows),
      vec![
        ("a".to_string(), RowKind::Parent),
        ("c".to_string(), RowKind::Parent),
      ]
    );
  }

  #[test]
  fn nested_headers_use_the_same_rule() {
    let mut inner = typed("inner", &[]);
    inner.children =
      vec![typed("deep", &["x"])];
    let mut empty_inner =
      typed("empty", &["x"]);
    empty_inner.children =
      vec![typed("skip", &["y"])];
    let mut top = typed("top", &[]);
    top.children = vec![
      empty_inner,
      typed("sibling", &["x"]),
      inner,
    ];
    let tasks = vec![top];

    let rows = flatten_visible_rows(
      &tasks,
      &filter(&["x"])
    );
    assert_eq!(
      ids(&rows),
      vec![
        ("top".to_string(), RowKind::Parent),
        (
          "sibling".to_string(),
          RowKind::Child
        ),
        ("inner".to_string(), RowKind::Parent),
        ("deep".to_string(), RowKind::Child),
      ]
    );
    assert_eq!(rows[2].depth, 1);
    assert_eq!(rows[3].depth, 2);
    assert_eq!(
      rows[2]
        .parent_task
        .map(|p| p.id.as_str()),
      Some("top")
    );
  }

  #[test]
  fn very_deep_trees_do_not_recurse() {
    let mut node = typed("leaf", &["x"]);
    for depth in 0..2_000 {
      let mut parent =
        typed(&format!("n{depth}"), &[]);
      parent.children = vec![node];
      node = parent;
    }
    let tasks = vec![node];
    let rows = flatten_visible_rows(
      &tasks,
      &filter(&["x"])
    );
    assert_eq!(rows.len(), 2_001);
    assert_eq!(
      rows.last().map(|r| r.kind),
      Some(RowKind::Child)
    );

    // Dropping a 2000-deep tree uses
    // the recursive drop glue.
    std::mem::forget(tasks);
  }

  #[test]
  fn headers_carry_no_activities() {
    let date = NaiveDate::from_ymd_opt(
      2024, 1, 1
    )
    .expect("valid date");
    let act = Activity {
      id: "a".to_string(),
      date,
      description: String::new()
    };
    let mut child = typed("c", &[]);
    child.activities = vec![act.clone()];
    let mut parent = typed("p", &[]);
    parent.children = vec![child];
    let mut solo = typed("s", &[]);
    solo.activities = vec![act];
    let tasks = vec![parent, solo];

    let rows =
      flatten_visible_rows(&tasks, &[]);
    assert!(row_activities(&rows[0]).is_empty());
    assert_eq!(row_activities(&rows[1]).len(), 1);
    assert_eq!(row_activities(&rows[2]).len(), 1);
  }
}
