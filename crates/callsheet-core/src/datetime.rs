use std::fs;
use std::path::PathBuf;
use std::sync::OnceLock;

use chrono::{
  DateTime,
  LocalResult,
  NaiveDate,
  NaiveDateTime,
  TimeZone,
  Utc
};
use chrono_tz::Tz;
use serde::Deserialize;

const TIMEZONE_CONFIG_FILE: &str =
  "callsheet-time.toml";
const TIMEZONE_ENV_VAR: &str =
  "CALLSHEET_TIMEZONE";
const TIMEZONE_CONFIG_ENV_VAR: &str =
  "CALLSHEET_TIME_CONFIG";
const SYSTEM_TIMEZONE_ENV_VAR: &str =
  "TZ";

const NAIVE_FORMATS: [&str; 5] = [
  "%Y-%m-%dT%H:%M:%S%.f",
  "%Y-%m-%d %H:%M:%S%.f",
  "%Y-%m-%dT%H:%M",
  "%Y-%m-%d %H:%M",
  "%Y%m%dT%H%M%S"
];

#[derive(Debug, Deserialize)]
struct TimezoneConfig {
  timezone: Option<String>,
  time:     Option<TimezoneSection>
}

#[derive(Debug, Deserialize)]
struct TimezoneSection {
  timezone: Option<String>
}

/// Zone used to render reminder times
/// and to interpret timestamps that
/// carry no offset.
pub fn display_timezone() -> &'static Tz
{
  static DISPLAY_TZ: OnceLock<Tz> =
    OnceLock::new();
  DISPLAY_TZ.get_or_init(
    resolve_display_timezone
  )
}

fn resolve_display_timezone() -> Tz {
  if let Ok(raw) =
    std::env::var(TIMEZONE_ENV_VAR)
    && let Some(tz) =
      parse_timezone(&raw, TIMEZONE_ENV_VAR)
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

  if let Ok(raw) = std::env::var(
    SYSTEM_TIMEZONE_ENV_VAR
  ) && let Some(tz) = parse_timezone(
    raw.trim_start_matches(':'),
    SYSTEM_TIMEZONE_ENV_VAR
  ) {
    return tz;
  }

  tracing::info!(
    "no display timezone configured; \
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

pub fn parse_timezone(
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
        "configured display timezone"
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

fn to_utc_from_local(
  local_naive: NaiveDateTime,
  tz: &Tz
) -> Option<DateTime<Utc>> {
  match tz
    .from_local_datetime(&local_naive)
  {
    | LocalResult::Single(local_dt) => {
      Some(local_dt.with_timezone(&Utc))
    }
    | LocalResult::Ambiguous(
      first,
      second
    ) => {
      tracing::debug!(
        first = %first,
        second = %second,
        "ambiguous local datetime; using earliest"
      );
      Some(
        first
          .min(second)
          .with_timezone(&Utc)
      )
    }
    | LocalResult::None => None
  }
}

/// Parses the timestamp shapes the
/// backend emits for `scheduled_at`.
///
/// Values with an explicit offset are
/// taken as-is. Date-time values without
/// one are read in `tz`; bare dates are
/// UTC midnight.
#[must_use]
pub fn parse_timestamp(
  raw: &str,
  tz: &Tz
) -> Option<DateTime<Utc>> {
  let token = raw.trim();
  if token.is_empty() {
    return None;
  }

  if let Ok(dt) =
    DateTime::parse_from_rfc3339(token)
  {
    return Some(dt.with_timezone(&Utc));
  }

  for fmt in [
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f%#z"
  ] {
    if let Ok(dt) =
      DateTime::parse_from_str(token, fmt)
    {
      return Some(
        dt.with_timezone(&Utc)
      );
    }
  }

  if let Some(stripped) =
    token.strip_suffix('Z')
    && let Ok(naive) =
      NaiveDateTime::parse_from_str(
        stripped,
        "%Y%m%dT%H%M%S"
      )
  {
    return Some(
      DateTime::<Utc>::from_naive_utc_and_offset(
        naive, Utc
      )
    );
  }

  for fmt in NAIVE_FORMATS {
    if let Ok(naive) =
      NaiveDateTime::parse_from_str(
        token, fmt
      )
    {
      return to_utc_from_local(
        naive, tz
      );
    }
  }

  NaiveDate::parse_from_str(
    token, "%Y-%m-%d"
  )
  .ok()
  .and_then(|date| {
    date.and_hms_opt(0, 0, 0)
  })
  .map(|naive| {
    DateTime::<Utc>::from_naive_utc_and_offset(
      naive, Utc
    )
  })
}

/// `1/15/2025, 12:00:30 PM`
#[must_use]
pub fn format_us_locale(
  dt: DateTime<Utc>,
  tz: &Tz
) -> String {
  dt.with_timezone(tz)
    .format("%-m/%-d/%Y, %-I:%M:%S %p")
    .to_string()
}

/// `15/01/2025, 12:00:30`
#[must_use]
pub fn format_gb_locale(
  dt: DateTime<Utc>,
  tz: &Tz
) -> String {
  dt.with_timezone(tz)
    .format("%d/%m/%Y, %H:%M:%S")
    .to_string()
}
