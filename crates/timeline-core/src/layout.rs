use chrono::{
  DateTime,
  NaiveDate,
  Utc
};
use serde::Serialize;
use tracing::debug;

use crate::calendar::{
  add_days,
  is_weekend,
  today_utc
};
use crate::model::{
  Settings,
  TimelineState,
  Zoom
};
use crate::rows::{
  RowKind,
  flatten_visible_rows,
  row_activities
};
use crate::scale::{
  clamp_scale,
  pixels_per_day,
  timeline_width,
  x_offset
};
use crate::ticks::{
  TickLabel,
  generate_ticks,
  tick_label
};
use crate::window::{
  Window,
  WindowPolicy,
  compute_window_with
};

#[derive(Debug, Clone, Serialize)]
pub struct TickMark {
  pub date:  NaiveDate,
  pub x:     f64,
  pub label: TickLabel
}

#[derive(Debug, Clone, Serialize)]
pub struct ActivityMarker {
  pub activity_id: String,
  pub date:        NaiveDate,
  pub x:           f64,
  pub color:       String,
  pub description: String
}

#[derive(Debug, Clone, Serialize)]
pub struct RowGeometry {
  pub index:       usize,
  pub kind:        RowKind,
  pub task_id:     String,
  pub name:        String,
  pub parent_id:   Option<String>,
  pub depth:       usize,
  pub type_colors: Vec<String>,
  pub markers:     Vec<ActivityMarker>
}

/// Everything a front-end needs to draw
/// one render pass.
#[derive(Debug, Clone, Serialize)]
pub struct TimelineLayout {
  pub window:          Window,
  pub zoom:            Zoom,
  pub scale:           f64,
  pub pixels_per_day:  f64,
  pub width:           f64,
  pub today:           NaiveDate,
  pub today_x:         f64,
  pub ticks:           Vec<TickMark>,
  pub rows:            Vec<RowGeometry>,
  /// Left edges of Saturday/Sunday
  /// columns; only filled at day zoom.
  pub weekend_columns: Vec<f64>
}

impl TimelineLayout {
  pub fn build(
    state: &TimelineState,
    now: DateTime<Utc>
  ) -> Self {
    Self::build_with(
      state,
      &state.settings,
      now,
      &WindowPolicy::default()
    )
  }

  #[tracing::instrument(skip(
    state, settings, policy
  ))]
  pub fn build_with(
    state: &TimelineState,
    settings: &Settings,
    now: DateTime<Utc>,
    policy: &WindowPolicy
  ) -> Self {
    let zoom = settings.zoom;
    let scale = clamp_scale(settings.scale);
    let window = compute_window_with(
      &state.tasks,
      now,
      policy
    );
    let px_per_day =
      pixels_per_day(zoom, scale);
    let x_of = |date: NaiveDate| {
      x_offset(
        date,
        window.min_date,
        zoom,
        scale
      )
    };

    let ticks = generate_ticks(
      &window, zoom
    )
    .into_iter()
    .map(|date| {
      TickMark {
        date,
        x: x_of(date),
        label: tick_label(date, zoom)
      }
    })
    .collect::<Vec<_>>();

    let rows = flatten_visible_rows(
      &state.tasks,
      &settings.filter_type_ids
    )
    .iter()
    .enumerate()
    .map(|(index, row)| {
      let task = row.task;
      let color = task
        .primary_color(&state.types)
        .to_string();
      let type_colors = task
        .type_ids
        .iter()
        .map(|id| {
          state
            .type_by_id(id)
            .map(|t| t.color.clone())
            .unwrap_or_else(|| {
              color.clone()
            })
        })
        .collect();
      let markers = row_activities(row)
        .iter()
        .map(|act| {
          ActivityMarker {
            activity_id: act.id.clone(),
            date:        act.date,
            x:           x_of(act.date),
            color:       color.clone(),
            description: act
              .description
              .clone()
          }
        })
        .collect();
      RowGeometry {
        index,
        kind: row.kind,
        task_id: task.id.clone(),
        name: task.name.clone(),
        parent_id: row
          .parent_task
          .map(|p| p.id.clone()),
        depth: row.depth,
        type_colors,
        markers
      }
    })
    .collect::<Vec<_>>();

    let weekend_columns = if zoom
      == Zoom::Day
    {
      (0..=window.span_days())
        .map(|i| {
          add_days(window.min_date, i)
        })
        .filter(|d| is_weekend(*d))
        .map(x_of)
        .collect()
    } else {
      vec![]
    };

    let today = today_utc(now);
    let layout = Self {
      window,
      zoom,
      scale,
      pixels_per_day: px_per_day,
      width: timeline_width(
        &window, zoom, scale
      ),
      today,
      today_x: x_of(today),
      ticks,
      rows,
      weekend_columns
    };

    debug!(
      rows = layout.rows.len(),
      ticks = layout.ticks.len(),
      width = layout.width,
      "built timeline layout"
    );
    layout
  }

  /// Horizontal scroll that puts today
  /// in the middle of the viewport.
  #[must_use]
  pub fn initial_scroll(
    &self,
    viewport_width: f64
  ) -> f64 {
    (self.today_x - viewport_width / 2.0)
      .floor()
      .max(0.0)
  }
}

/// Remembers the zoom and scale of the
/// previous render so a host re-centers
/// on today only when they change.
///
/// Meant for interactive front ends
/// that keep one across renders; the
/// one-shot CLI starts fresh each run
/// and always centers `chart today`.
#[derive(Debug, Clone, Default)]
pub struct ViewportTracker {
  last: Option<(Zoom, f64)>
}

impl ViewportTracker {
  #[must_use]
  pub fn new() -> Self {
    Self::default()
  }

  pub fn should_recenter(
    &mut self,
    zoom: Zoom,
    scale: f64
  ) -> bool {
    let changed = match self.last {
      | None => true,
      | Some((last_zoom, last_scale)) => {
        last_zoom != zoom
          || last_scale != scale
      }
    };
    if changed {
      self.last = Some((zoom, scale));
    }
    changed
  }
}
