use chrono::{
  Datelike,
  NaiveDate
};
use serde::Serialize;
use tracing::trace;

use crate::calendar::{
  add_days,
  add_months,
  iso_week_number,
  quarter_of,
  start_of_iso_week,
  start_of_month,
  start_of_quarter
};
use crate::model::Zoom;
use crate::window::Window;

/// Divisor for the day-zoom step; a
/// window yields at most one more tick
/// than this.
pub const MAX_DAY_TICKS: i64 = 400;

/// Ascending, duplicate-free tick
/// dates covering `window` at `zoom`.
///
/// Week, month and quarter ticks are
/// calendar anchors starting at the
/// anchor that contains the window's
/// first day, so the first tick may
/// precede `window.min_date`. Day
/// ticks start exactly at
/// `window.min_date` and step by
/// `ceil(span / MAX_DAY_TICKS)` days.
/// Both ends are inclusive, so a
/// window yields at most
/// `MAX_DAY_TICKS + 1` ticks; with a
/// step above one day they are not
/// calendar aligned.
#[tracing::instrument(level = "debug")]
pub fn generate_ticks(
  window: &Window,
  zoom: Zoom
) -> Vec<NaiveDate> {
  let (first, step) = match zoom {
    | Zoom::Week => {
      (
        start_of_iso_week(
          window.min_date
        ),
        Step::Days(7)
      )
    }
    | Zoom::Month => {
      (
        start_of_month(window.min_date),
        Step::Months(1)
      )
    }
    | Zoom::Quarter => {
      (
        start_of_quarter(
          window.min_date
        ),
        Step::Months(3)
      )
    }
    | Zoom::Day => {
      (
        window.min_date,
        Step::Days(day_tick_step(window))
      )
    }
  };

  let mut ticks = Vec::new();
  let mut tick = first;
  while tick <= window.max_date {
    ticks.push(tick);
    let next = step.advance(tick);
    if next <= tick {
      break;
    }
    tick = next;
  }

  trace!(
    count = ticks.len(),
    "generated ticks"
  );
  ticks
}

#[derive(Debug, Clone, Copy)]
enum Step {
  Days(i64),
  Months(u32)
}

impl Step {
  fn advance(
    self,
    date: NaiveDate
  ) -> NaiveDate {
    match self {
      | Step::Days(days) => {
        add_days(date, days)
      }
      | Step::Months(months) => {
        add_months(date, months)
      }
    }
  }
}

/// Day-zoom sampling interval.
#[must_use]
pub fn day_tick_step(
  window: &Window
) -> i64 {
  let span = window.span_days().max(1);
  let step = (span + MAX_DAY_TICKS - 1)
    / MAX_DAY_TICKS;
  step.max(1)
}

#[derive(
  Debug, Clone, PartialEq, Eq, Serialize,
)]
pub struct TickLabel {
  pub text:       String,
  /// Set on the 1st of a month at day
  /// zoom.
  pub month_text: Option<String>,
  /// Set on January 1st at day zoom.
  pub year_text:  Option<String>
}

#[must_use]
pub fn tick_label(
  date: NaiveDate,
  zoom: Zoom
) -> TickLabel {
  let text = match zoom {
    | Zoom::Week => {
      format!(
        "W{} {}",
        iso_week_number(date),
        date.year()
      )
    }
    | Zoom::Month => {
      date.format("%b %Y").to_string()
    }
    | Zoom::Quarter => {
      format!(
        "Q{} {}",
        quarter_of(date),
        date.year()
      )
    }
    | Zoom::Day => date.day().to_string()
  };

  let first_of_month =
    zoom == Zoom::Day && date.day() == 1;
  TickLabel {
    text,
    month_text: first_of_month.then(
      || date.format("%b").to_string()
    ),
    year_text: (first_of_month
      && date.month() == 1)
      .then(|| date.year().to_string())
  }
}
