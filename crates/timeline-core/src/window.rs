use std::fs;
use std::path::Path;

use chrono::{
  DateTime,
  NaiveDate,
  Utc
};
use serde::{
  Deserialize,
  Serialize
};
use tracing::{
  debug,
  trace
};

use crate::calendar::{
  add_days,
  days_between,
  today_utc
};
use crate::model::{
  Activity,
  Task
};

pub const TIMELINE_CONFIG_FILE: &str =
  "timeline.toml";

/// Visible date span. Both bounds are
/// whole UTC days.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize
)]
pub struct Window {
  pub min_date: NaiveDate,
  pub max_date: NaiveDate
}

impl Window {
  #[must_use]
  pub fn span_days(&self) -> i64 {
    days_between(
      self.max_date,
      self.min_date
    )
  }

  #[must_use]
  pub fn contains(
    &self,
    date: NaiveDate
  ) -> bool {
    self.min_date <= date
      && date <= self.max_date
  }
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize
)]
pub struct WindowPolicy {
  #[serde(default = "default_days")]
  pub default_days:    i64,
  #[serde(
    default = "default_pad_before_days"
  )]
  pub pad_before_days: i64,
  #[serde(
    default = "default_pad_after_days"
  )]
  pub pad_after_days:  i64,
  #[serde(default = "default_min_days")]
  pub min_days:        i64,
  /// Caps how many timeline elements
  /// a render can produce.
  #[serde(default = "default_max_days")]
  pub max_days:        i64
}

/// Ceiling for every policy field,
/// about a century of days.
const MAX_POLICY_DAYS: i64 = 36_525;

fn default_days() -> i64 {
  90
}

fn default_pad_before_days() -> i64 {
  15
}

fn default_pad_after_days() -> i64 {
  30
}

fn default_min_days() -> i64 {
  180
}

fn default_max_days() -> i64 {
  365 * 3
}

impl Default for WindowPolicy {
  fn default() -> Self {
    Self {
      default_days:    default_days(),
      pad_before_days:
        default_pad_before_days(),
      pad_after_days:
        default_pad_after_days(),
      min_days:        default_min_days(),
      max_days:        default_max_days()
    }
  }
}

#[derive(Debug, Default, Deserialize)]
struct TimelineConfig {
  #[serde(default)]
  window: Option<WindowPolicy>
}

impl WindowPolicy {
  /// Reads the `[window]` table of a
  /// `timeline.toml`. Missing or
  /// unreadable files yield the
  /// defaults.
  #[tracing::instrument]
  pub fn load(path: &Path) -> Self {
    if !path.exists() {
      tracing::info!(
        file = %path.display(),
        "timeline config file not found; using default window policy"
      );
      return Self::default();
    }

    let raw = match fs::read_to_string(
      path
    ) {
      | Ok(raw) => raw,
      | Err(err) => {
        tracing::error!(
          file = %path.display(),
          error = %err,
          "failed reading timeline config file"
        );
        return Self::default();
      }
    };

    Self::from_toml(&raw)
  }

  pub fn from_toml(raw: &str) -> Self {
    match toml::from_str::<
      TimelineConfig
    >(raw)
    {
      | Ok(parsed) => {
        let mut policy = parsed
          .window
          .unwrap_or_default();
        policy.sanitize();
        tracing::info!(
          min_days = policy.min_days,
          max_days = policy.max_days,
          "loaded window policy"
        );
        policy
      }
      | Err(error) => {
        tracing::error!(%error, "failed parsing timeline config; using defaults");
        Self::default()
      }
    }
  }

  fn sanitize(&mut self) {
    if self.default_days <= 0 {
      self.default_days =
        default_days();
    }
    if self.pad_before_days < 0 {
      self.pad_before_days =
        default_pad_before_days();
    }
    if self.pad_after_days < 0 {
      self.pad_after_days =
        default_pad_after_days();
    }
    if self.min_days <= 0 {
      self.min_days = default_min_days();
    }
    if self.max_days <= 0 {
      self.max_days = default_max_days();
    }
    self.default_days =
      self.default_days.min(MAX_POLICY_DAYS);
    self.pad_before_days = self
      .pad_before_days
      .min(MAX_POLICY_DAYS);
    self.pad_after_days = self
      .pad_after_days
      .min(MAX_POLICY_DAYS);
    self.min_days =
      self.min_days.min(MAX_POLICY_DAYS);
    self.max_days =
      self.max_days.min(MAX_POLICY_DAYS);
    if self.max_days < self.min_days {
      self.max_days = self.min_days;
    }
  }
}

/// Every activity in the tree, in
/// depth-first order. Type filters
/// are not applied.
pub fn collect_activities(
  tasks: &[Task]
) -> Vec<&Activity> {
  let mut out = Vec::new();
  let mut stack: Vec<&Task> =
    tasks.iter().rev().collect();
  while let Some(task) = stack.pop() {
    out.extend(task.activities.iter());
    stack.extend(
      task.children.iter().rev()
    );
  }
  out
}

#[tracing::instrument(skip(tasks))]
pub fn compute_window(
  tasks: &[Task],
  now: DateTime<Utc>
) -> Window {
  compute_window_with(
    tasks,
    now,
    &WindowPolicy::default()
  )
}

#[tracing::instrument(skip(
  tasks, policy
))]
pub fn compute_window_with(
  tasks: &[Task],
  now: DateTime<Utc>,
  policy: &WindowPolicy
) -> Window {
  let activities =
    collect_activities(tasks);
  let lower = activities
    .iter()
    .map(|a| a.date)
    .min();
  let upper = activities
    .iter()
    .map(|a| a.date)
    .max();

  let (Some(lower), Some(upper)) =
    (lower, upper)
  else {
    let today = today_utc(now);
    debug!(%today, "no activities; using default forward window");
    return Window {
      min_date: today,
      max_date: add_days(
        today,
        policy.default_days
      )
    };
  };

  let lower = add_days(
    lower,
    -policy.pad_before_days
  );
  let upper = add_days(
    upper,
    policy.pad_after_days
  );
  let span = days_between(upper, lower);
  trace!(%lower, %upper, span, "padded activity range");

  let window = if span < policy.min_days
  {
    recenter(
      lower,
      span,
      policy.min_days
    )
  } else if span > policy.max_days {
    recenter(
      lower,
      span,
      policy.max_days
    )
  } else {
    Window {
      min_date: lower,
      max_date: upper
    }
  };

  debug!(
    activities = activities.len(),
    min = %window.min_date,
    max = %window.max_date,
    "computed timeline window"
  );
  window
}

/// Keeps the midpoint of
/// `[lower, lower + span]` (to within
/// half a day) and forces the span to
/// `target` days.
fn recenter(
  lower: NaiveDate,
  span: i64,
  target: i64
) -> Window {
  let shift =
    (span - target).div_euclid(2);
  let min_date = add_days(lower, shift);
  Window {
    min_date,
    max_date: add_days(min_date, target)
  }
}

#[cfg(test)]
mod tests {
  use chrono::{
    NaiveDate,
    TimeZone,
    Utc
  };

  use super::{
    Window,
    WindowPolicy,
    collect_activities,
    compute_window,
    compute_window_with
  };
  use crate::calendar::{
    add_days,
    days_between
  };
  use crate::model::{
    Activity,
    Task
  };

  fn ymd(
    y: i32,
    m: u32,
    d: u32
  ) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d)
      .expect("valid date")
  }

  fn leaf(
    id: &str,
    dates: &[NaiveDate]
  ) -> Task {
    let mut task = Task::new(id, id);
    task.activities = dates
      .iter()
      .enumerate()
      .map(|(idx, date)| Activity {
        id:          format!(
          "{id}-act-{idx}"
        ),
        date:        *date,
        description: String::new()
      })
      .collect();
    task
  }

  fn now() -> chrono::DateTime<Utc> {
    Utc
      .with_ymd_and_hms(
        2026, 2, 17, 18, 30, 0
      )
      .single()
      .expect("valid now")
  }

  #[test]
  fn empty_tree_uses_forward_default() {
    let window = compute_window(&[], now());
    assert_eq!(
      window,
      Window {
        min_date: ymd(2026, 2, 17),
        max_date: ymd(2026, 5, 18)
      }
    );
    assert_eq!(window.span_days(), 90);
  }

  #[test]
  fn short_ranges_widen_to_minimum_span()
  {
    let tasks = vec![leaf(
      "a",
      &[ymd(2024, 3, 1), ymd(2024, 3, 10)]
    )];
    let window =
      compute_window(&tasks, now());
    assert_eq!(window.span_days(), 180);

    // padded range: 2024-02-15 ..
    // 2024-04-09
    let padded_mid = add_days(
      ymd(2024, 2, 15),
      days_between(
        ymd(2024, 4, 9),
        ymd(2024, 2, 15)
      ) / 2
    );
    let mid = add_days(
      window.min_date,
      window.span_days() / 2
    );
    assert!(
      days_between(mid, padded_mid).abs()
        <= 1
    );
  }

  #[test]
  fn natural_span_is_kept_after_padding()
  {
    let tasks = vec![leaf(
      "a",
      &[ymd(2024, 1, 1), ymd(2024, 12, 1)]
    )];
    let window =
      compute_window(&tasks, now());
    assert_eq!(
      window,
      Window {
        min_date: ymd(2023, 12, 17),
        max_date: ymd(2024, 12, 31)
      }
    );
  }

  #[test]
  fn long_ranges_clamp_to_three_years() {
    let tasks = vec![
      leaf("a", &[ymd(2018, 1, 1)]),
      leaf("b", &[ymd(2026, 1, 1)]),
    ];
    let window =
      compute_window(&tasks, now());
    assert_eq!(window.span_days(), 1095);

    let padded_lower = ymd(2017, 12, 17);
    let padded_upper = ymd(2026, 1, 31);
    let padded_mid = add_days(
      padded_lower,
      days_between(
        padded_upper,
        padded_lower
      ) / 2
    );
    let mid = add_days(
      window.min_date,
      window.span_days() / 2
    );
    assert!(
      days_between(mid, padded_mid).abs()
        <= 1
    );
  }

  #[test]
  fn window_ignores_nesting_and_today() {
    let mut parent = Task::new("p", "P");
    parent.children = vec![
      leaf("c1", &[ymd(2030, 6, 1)]),
      leaf("c2", &[ymd(2030, 1, 1)]),
    ];
    let tasks = vec![parent];
    assert_eq!(
      collect_activities(&tasks).len(),
      2
    );
    let window =
      compute_window(&tasks, now());
    assert!(
      window.contains(ymd(2030, 1, 1))
    );
    assert!(
      window.contains(ymd(2030, 6, 1))
    );
    assert!(
      !window.contains(ymd(2026, 2, 17))
    );
  }

  #[test]
  fn policy_from_toml_is_sanitized() {
    let policy = WindowPolicy::from_toml(
      "[window]\nmin_days = 400\nmax_days \
       = 30\npad_after_days = -1\n"
    );
    assert_eq!(policy.min_days, 400);
    assert_eq!(policy.max_days, 400);
    assert_eq!(policy.pad_after_days, 30);
    assert_eq!(policy.pad_before_days, 15);

    let tasks =
      vec![leaf("a", &[ymd(2024, 3, 1)])];
    let window = compute_window_with(
      &tasks,
      now(),
      &policy
    );
    assert_eq!(window.span_days(), 400);
  }

  #[test]
  fn oversized_policy_values_are_capped()
  {
    let policy = WindowPolicy::from_toml(
      "[window]\npad_after_days = \
       9223372036854775807\n"
    );
    assert_eq!(
      policy.pad_after_days,
      36_525
    );

    let tasks =
      vec![leaf("a", &[ymd(2024, 1, 1)])];
    let window = compute_window_with(
      &tasks,
      now(),
      &policy
    );
    assert_eq!(
      window.span_days(),
      policy.max_days
    );

    let raw = WindowPolicy {
      pad_before_days: i64::MAX,
      pad_after_days: i64::MAX,
      ..WindowPolicy::default()
    };
    let window =
      compute_window_with(&tasks, now(), &raw);
    assert!(window.min_date <= window.max_date);
  }

  #[test]
  fn broken_toml_falls_back_to_defaults()
  {
    assert_eq!(
      WindowPolicy::from_toml(
        "[window\nmin_days ="
      ),
      WindowPolicy::default()
    );
  }
}
