use std::fs;
use std::path::PathBuf;
use std::sync::OnceLock;

use anyhow::anyhow;
use chrono::{
  Duration,
  NaiveDate,
  Utc
};
use chrono_tz::Tz;
use regex::Regex;
use serde::Deserialize;

const TIMEZONE_CONFIG_FILE: &str =
  "gantt-time.toml";
const TIMEZONE_ENV_VAR: &str =
  "GANTT_TIMEZONE";
const TIMEZONE_CONFIG_ENV_VAR: &str =
  "GANTT_TIME_CONFIG";

#[derive(Debug, Deserialize)]
struct TimezoneConfig {
  timezone: Option<String>,
  time:     Option<TimezoneSection>
}

#[derive(Debug, Deserialize)]
struct TimezoneSection {
  timezone: Option<String>
}

pub fn project_timezone() -> &'static Tz
{
  static PROJECT_TZ: OnceLock<Tz> =
    OnceLock::new();
  PROJECT_TZ.get_or_init(
    resolve_project_timezone
  )
}

/// Calendar date of "now" in the project
/// timezone; drives the today marker.
#[must_use]
pub fn today() -> NaiveDate {
  Utc::now()
    .with_timezone(project_timezone())
    .date_naive()
}

fn resolve_project_timezone() -> Tz {
  if let Ok(raw) =
    std::env::var(TIMEZONE_ENV_VAR)
    && let Some(tz) = parse_timezone(
      &raw,
      TIMEZONE_ENV_VAR
    )
  {
    return tz;
  }

  if let Some(path) =
    timezone_config_path()
    && let Some(tz) =
      load_timezone_from_file(&path)
  {
    return tz;
  }

  tracing::debug!(
    "no project timezone configured; \
     using UTC"
  );
  chrono_tz::UTC
}

fn timezone_config_path()
-> Option<PathBuf> {
  if let Ok(raw) = std::env::var(
    TIMEZONE_CONFIG_ENV_VAR
  ) {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
      return Some(PathBuf::from(
        trimmed
      ));
    }
  }

  std::env::current_dir().ok().map(
    |dir| {
      dir.join(TIMEZONE_CONFIG_FILE)
    }
  )
}

fn load_timezone_from_file(
  path: &PathBuf
) -> Option<Tz> {
  if !path.exists() {
    tracing::debug!(
      file = %path.display(),
      "timezone config file not found"
    );
    return None;
  }

  let raw = match fs::read_to_string(
    path
  ) {
    | Ok(raw) => raw,
    | Err(err) => {
      tracing::error!(
        file = %path.display(),
        error = %err,
        "failed reading timezone config file"
      );
      return None;
    }
  };

  let parsed = match toml::from_str::<
    TimezoneConfig
  >(&raw)
  {
    | Ok(parsed) => parsed,
    | Err(err) => {
      tracing::error!(
        file = %path.display(),
        error = %err,
        "failed parsing timezone config file"
      );
      return None;
    }
  };

  let timezone =
    parsed.timezone.or_else(|| {
      parsed.time.and_then(|section| {
        section.timezone
      })
    });
  let Some(timezone) = timezone else {
    tracing::warn!(
      file = %path.display(),
      "timezone config had no timezone field"
    );
    return None;
  };

  parse_timezone(
    timezone.as_str(),
    &format!("file:{}", path.display())
  )
}

fn parse_timezone(
  raw: &str,
  source: &str
) -> Option<Tz> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    tracing::warn!(
      source,
      "timezone source was empty"
    );
    return None;
  }

  match trimmed.parse::<Tz>() {
    | Ok(tz) => {
      tracing::info!(
        source,
        timezone = %trimmed,
        "configured project timezone"
      );
      Some(tz)
    }
    | Err(err) => {
      tracing::error!(
        source,
        timezone = %trimmed,
        error = %err,
        "failed to parse timezone id"
      );
      None
    }
  }
}

fn relative_offset_re() -> &'static Regex
{
  static RE: OnceLock<Regex> =
    OnceLock::new();
  RE.get_or_init(|| {
    Regex::new(
      r"^([+-]\d{1,4})([dw])$"
    )
    .expect("static regex is valid")
  })
}

/// Parses the date expressions accepted
/// on the command line: `today`,
/// `yesterday`, `tomorrow`, `YYYY-MM-DD`,
/// and offsets like `+3d` or `-2w`.
pub fn parse_date_expr(
  raw: &str,
  today: NaiveDate
) -> anyhow::Result<NaiveDate> {
  let text =
    raw.trim().to_ascii_lowercase();

  match text.as_str() {
    | "today" | "now" => {
      return Ok(today);
    }
    | "yesterday" => {
      return Ok(
        today - Duration::days(1)
      );
    }
    | "tomorrow" => {
      return Ok(
        today + Duration::days(1)
      );
    }
    | _ => {}
  }

  if let Some(caps) =
    relative_offset_re().captures(&text)
  {
    let amount: i64 = caps[1]
      .parse()
      .map_err(|err| {
        anyhow!(
          "invalid offset {raw:?}: {err}"
        )
      })?;
    let days = match &caps[2] {
      | "w" => amount.checked_mul(7),
      | _ => Some(amount)
    };
    return days
      .and_then(Duration::try_days)
      .and_then(|offset| {
        today.checked_add_signed(offset)
      })
      .ok_or_else(|| {
        anyhow!(
          "date offset {raw:?} is out \
           of range"
        )
      });
  }

  crate::task::parse_optional_date(
    Some(text.as_str())
  )?
  .ok_or_else(|| {
    anyhow!("empty date expression")
  })
}

#[cfg(test)]
mod tests {
  use chrono::NaiveDate;

  use super::parse_date_expr;

  fn day(
    y: i32,
    m: u32,
    d: u32
  ) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d)
      .expect("valid date")
  }

  #[test]
  fn parses_named_days() {
    let today = day(2024, 3, 1);
    assert_eq!(
      parse_date_expr("Tomorrow", today)
        .expect("tomorrow"),
      day(2024, 3, 2)
    );
    assert_eq!(
      parse_date_expr("yesterday", today)
        .expect("yesterday"),
      day(2024, 2, 29)
    );
  }

  #[test]
  fn parses_relative_offsets() {
    let today = day(2024, 1, 10);
    assert_eq!(
      parse_date_expr("-2w", today)
        .expect("weeks back"),
      day(2023, 12, 27)
    );
    assert_eq!(
      parse_date_expr("+5d", today)
        .expect("days ahead"),
      day(2024, 1, 15)
    );
  }

  #[test]
  fn huge_offsets_are_errors() {
    let today = day(2024, 1, 10);
    assert!(
      parse_date_expr("+999999999w", today)
        .is_err()
    );
    assert!(
      parse_date_expr(
        "-9000000000000000000d",
        today
      )
      .is_err()
    );
  }

  #[test]
  fn parses_iso_and_rejects_garbage() {
    let today = day(2024, 1, 10);
    assert_eq!(
      parse_date_expr(
        "2024-02-03",
        today
      )
      .expect("iso"),
      day(2024, 2, 3)
    );
    assert!(
      parse_date_expr("soonish", today)
        .is_err()
    );
    assert!(
      parse_date_expr("   ", today)
        .is_err()
    );
  }
}
