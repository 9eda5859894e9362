use std::sync::OnceLock;

use chrono::{
  DateTime,
  Datelike,
  Months,
  NaiveDate,
  TimeDelta,
  Utc,
  Weekday
};
use regex::Regex;

/// Raised when a date string is not a
/// real `YYYY-MM-DD` calendar date.
#[derive(
  Debug,
  Clone,
  PartialEq,
  Eq,
  thiserror::Error
)]
pub enum FormatError {
  #[error(
    "expected a YYYY-MM-DD date, got \
     {input:?}"
  )]
  Pattern { input: String },
  #[error(
    "{input:?} is not a valid \
     calendar date"
  )]
  OutOfRange { input: String }
}

fn iso_date_pattern()
-> Option<&'static Regex> {
  static PATTERN: OnceLock<
    Option<Regex>
  > = OnceLock::new();
  PATTERN
    .get_or_init(|| {
      Regex::new(
        r"^(?P<year>\d{4})-(?P<month>\d{2})-(?P<day>\d{2})$"
      )
      .ok()
    })
    .as_ref()
}

#[tracing::instrument(level = "trace")]
pub fn parse_iso_date(
  input: &str
) -> Result<NaiveDate, FormatError> {
  let pattern_err = || {
    FormatError::Pattern {
      input: input.to_string()
    }
  };
  let range_err = || {
    FormatError::OutOfRange {
      input: input.to_string()
    }
  };

  let caps = iso_date_pattern()
    .and_then(|re| re.captures(input))
    .ok_or_else(pattern_err)?;

  let year: i32 = caps["year"]
    .parse()
    .map_err(|_| pattern_err())?;
  let month: u32 = caps["month"]
    .parse()
    .map_err(|_| pattern_err())?;
  let day: u32 = caps["day"]
    .parse()
    .map_err(|_| pattern_err())?;

  NaiveDate::from_ymd_opt(
    year, month, day
  )
  .ok_or_else(range_err)
}

#[must_use]
pub fn format_iso_date(
  date: NaiveDate
) -> String {
  format!(
    "{:04}-{:02}-{:02}",
    date.year(),
    date.month(),
    date.day()
  )
}

/// Day-granular UTC "today" for an
/// instant.
#[must_use]
pub fn today_utc(
  now: DateTime<Utc>
) -> NaiveDate {
  now.date_naive()
}

#[must_use]
pub fn add_days(
  date: NaiveDate,
  days: i64
) -> NaiveDate {
  TimeDelta::try_days(days)
    .and_then(|delta| {
      date.checked_add_signed(delta)
    })
    .unwrap_or(date)
}

/// Calendar-month step. The day is
/// clamped to the target month's
/// length.
#[must_use]
pub fn add_months(
  date: NaiveDate,
  months: u32
) -> NaiveDate {
  date
    .checked_add_months(Months::new(
      months
    ))
    .unwrap_or(date)
}

#[must_use]
pub fn days_between(
  date: NaiveDate,
  start: NaiveDate
) -> i64 {
  date
    .signed_duration_since(start)
    .num_days()
}

/// Monday of the week containing
/// `date`, independent of locale.
#[must_use]
pub fn start_of_iso_week(
  date: NaiveDate
) -> NaiveDate {
  let dow = date
    .weekday()
    .num_days_from_sunday()
    as i64;
  let days_from_monday = (dow + 6) % 7;
  add_days(date, -days_from_monday)
}

#[must_use]
pub fn start_of_month(
  date: NaiveDate
) -> NaiveDate {
  date.with_day(1).unwrap_or(date)
}

#[must_use]
pub fn start_of_quarter(
  date: NaiveDate
) -> NaiveDate {
  let quarter_month =
    ((date.month() - 1) / 3) * 3 + 1;
  NaiveDate::from_ymd_opt(
    date.year(),
    quarter_month,
    1
  )
  .unwrap_or(date)
}

/// 1-based quarter index of the
/// month.
#[must_use]
pub fn quarter_of(
  date: NaiveDate
) -> u32 {
  (date.month() - 1) / 3 + 1
}

/// ISO 8601 week number. Dates near
/// a year boundary may belong to a
/// week of the neighbouring year;
/// see [`iso_week_year`].
#[must_use]
pub fn iso_week_number(
  date: NaiveDate
) -> u32 {
  date.iso_week().week()
}

/// Year of the Thursday that decides
/// the week's numbering.
#[must_use]
pub fn iso_week_year(
  date: NaiveDate
) -> i32 {
  date.iso_week().year()
}

#[must_use]
pub fn is_weekend(
  date: NaiveDate
) -> bool {
  matches!(
    date.weekday(),
    Weekday::Sat | Weekday::Sun
  )
}

#[cfg(test)]
mod tests {
  use chrono::{
    NaiveDate,
    TimeZone,
    Utc
  };

  use super::{
    FormatError,
    add_days,
    add_months,
    days_between,
    format_iso_date,
    iso_week_number,
    iso_week_year,
    parse_iso_date,
    start_of_iso_week,
    start_of_month,
    start_of_quarter,
    today_utc
  };

  fn ymd(
    y: i32,
    m: u32,
    d: u32
  ) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d)
      .expect("valid date")
  }

  #[test]
  fn parses_and_formats_iso_dates() {
    let date =
      parse_iso_date("2024-02-29")
        .expect("leap day");
    assert_eq!(date, ymd(2024, 2, 29));
    assert_eq!(
      format_iso_date(ymd(2024, 3, 5)),
      "2024-03-05"
    );
    assert_eq!(
      parse_iso_date(&format_iso_date(
        ymd(1999, 12, 31)
      )),
      Ok(ymd(1999, 12, 31))
    );
  }

  #[test]
  fn every_day_round_trips_through_text()
  {
    // 1999-12-01 .. 2005-03-01 crosses
    // 2000-02-29 and 2004-02-29.
    let mut day = ymd(1999, 12, 1);
    let end = ymd(2005, 3, 1);
    let mut seen = 0;
    while day <= end {
      assert_eq!(
        parse_iso_date(&format_iso_date(
          day
        )),
        Ok(day)
      );
      day = add_days(day, 1);
      seen += 1;
    }
    assert_eq!(
      seen,
      days_between(end, ymd(1999, 12, 1))
        + 1
    );
  }

  #[test]
  fn add_days_out_of_range_keeps_date() {
    let date = ymd(2024, 1, 1);
    assert_eq!(
      add_days(date, i64::MAX),
      date
    );
    assert_eq!(
      add_days(date, i64::MIN),
      date
    );
    assert_eq!(
      add_days(date, 366),
      ymd(2025, 1, 1)
    );
  }

  #[test]
  fn rejects_malformed_and_impossible_dates()
  {
    assert!(matches!(
      parse_iso_date("2024-2-05"),
      Err(FormatError::Pattern { .. })
    ));
    assert!(matches!(
      parse_iso_date(" 2024-02-05"),
      Err(FormatError::Pattern { .. })
    ));
    assert!(matches!(
      parse_iso_date(
        "2024-02-05T00:00"
      ),
      Err(FormatError::Pattern { .. })
    ));
    assert!(matches!(
      parse_iso_date("2023-02-29"),
      Err(
        FormatError::OutOfRange { .. }
      )
    ));
    assert!(matches!(
      parse_iso_date("2023-13-01"),
      Err(
        FormatError::OutOfRange { .. }
      )
    ));
  }

  #[test]
  fn week_starts_on_monday() {
    // 2024-03-10 is a Sunday.
    assert_eq!(
      start_of_iso_week(ymd(
        2024, 3, 10
      )),
      ymd(2024, 3, 4)
    );
    assert_eq!(
      start_of_iso_week(ymd(
        2024, 3, 4
      )),
      ymd(2024, 3, 4)
    );
    assert_eq!(
      start_of_iso_week(ymd(
        2024, 1, 3
      )),
      ymd(2024, 1, 1)
    );
    assert_eq!(
      start_of_iso_week(ymd(
        2021, 1, 1
      )),
      ymd(2020, 12, 28)
    );
  }

  #[test]
  fn month_and_quarter_anchors() {
    assert_eq!(
      start_of_month(ymd(2023, 11, 15)),
      ymd(2023, 11, 1)
    );
    assert_eq!(
      start_of_quarter(ymd(
        2023, 11, 15
      )),
      ymd(2023, 10, 1)
    );
    assert_eq!(
      start_of_quarter(ymd(2024, 3, 31)),
      ymd(2024, 1, 1)
    );
    assert_eq!(
      start_of_quarter(ymd(2024, 4, 1)),
      ymd(2024, 4, 1)
    );
  }

  #[test]
  fn month_steps_roll_over_years() {
    assert_eq!(
      add_months(ymd(2023, 12, 1), 1),
      ymd(2024, 1, 1)
    );
    assert_eq!(
      add_months(ymd(2023, 11, 1), 3),
      ymd(2024, 2, 1)
    );
    assert_eq!(
      add_months(ymd(2024, 1, 31), 1),
      ymd(2024, 2, 29)
    );
  }

  #[test]
  fn iso_week_numbers_follow_thursday_rule()
  {
    assert_eq!(
      iso_week_number(ymd(2024, 1, 1)),
      1
    );
    assert_eq!(
      iso_week_number(ymd(2023, 1, 1)),
      52
    );
    assert_eq!(
      iso_week_year(ymd(2023, 1, 1)),
      2022
    );
    assert_eq!(
      iso_week_number(ymd(2015, 1, 1)),
      1
    );
    assert_eq!(
      iso_week_number(ymd(2020, 12, 31)),
      53
    );
    assert_eq!(
      iso_week_number(ymd(2024, 12, 30)),
      1
    );
    assert_eq!(
      iso_week_year(ymd(2024, 12, 30)),
      2025
    );
  }

  #[test]
  fn today_truncates_time_of_day() {
    let now = Utc
      .with_ymd_and_hms(
        2026, 2, 17, 23, 59, 59
      )
      .single()
      .expect("valid now");
    assert_eq!(
      today_utc(now),
      ymd(2026, 2, 17)
    );
  }
}

pub mod iso_date_serde {
  use chrono::NaiveDate;
  use serde::{
    Deserialize,
    Deserializer,
    Serializer
  };

  pub fn serialize<S>(
    date: &NaiveDate,
    serializer: S
  ) -> Result<S::Ok, S::Error>
  where
    S: Serializer
  {
    serializer.serialize_str(
      &super::format_iso_date(*date)
    )
  }

  pub fn deserialize<'de, D>(
    deserializer: D
  ) -> Result<NaiveDate, D::Error>
  where
    D: Deserializer<'de>
  {
    let raw = String::deserialize(
      deserializer
    )?;
    super::parse_iso_date(&raw)
      .map_err(serde::de::Error::custom)
  }
}
