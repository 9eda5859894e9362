use chrono::NaiveDate;

use crate::calendar::days_between;
use crate::model::Zoom;
use crate::window::Window;

pub const MIN_SCALE: f64 = 0.25;
pub const MAX_SCALE: f64 = 8.0;

const WHEEL_SENSITIVITY: f64 = 0.0015;

#[must_use]
pub fn base_pixels_per_day(
  zoom: Zoom
) -> f64 {
  match zoom {
    | Zoom::Day => 40.0,
    | Zoom::Week => 14.0,
    | Zoom::Month => 5.0,
    | Zoom::Quarter => 2.5
  }
}

#[must_use]
pub fn pixels_per_day(
  zoom: Zoom,
  scale: f64
) -> f64 {
  base_pixels_per_day(zoom) * scale
}

/// Horizontal offset of `date` from
/// the window's left edge.
#[must_use]
pub fn x_offset(
  date: NaiveDate,
  window_start: NaiveDate,
  zoom: Zoom,
  scale: f64
) -> f64 {
  days_between(date, window_start)
    as f64
    * pixels_per_day(zoom, scale)
}

/// Full timeline width; the last day
/// gets its own column.
#[must_use]
pub fn timeline_width(
  window: &Window,
  zoom: Zoom,
  scale: f64
) -> f64 {
  (window.span_days() + 1) as f64
    * pixels_per_day(zoom, scale)
}

#[must_use]
pub fn clamp_scale(scale: f64) -> f64 {
  if !scale.is_finite() || scale <= 0.0
  {
    return 1.0;
  }
  scale.clamp(MIN_SCALE, MAX_SCALE)
}

/// Scale after a horizontal-zoom
/// wheel gesture. Positive deltas
/// zoom out.
#[must_use]
pub fn apply_wheel(
  scale: f64,
  delta_y: f64
) -> f64 {
  let factor =
    (-delta_y * WHEEL_SENSITIVITY).exp();
  clamp_scale(clamp_scale(scale) * factor)
}
