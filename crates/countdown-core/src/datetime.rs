use std::fs;
use std::path::{
  Path,
  PathBuf
};
use std::sync::OnceLock;

use anyhow::{
  Context,
  anyhow
};
use chrono::{
  DateTime,
  Duration,
  Local,
  LocalResult,
  NaiveDate,
  NaiveDateTime,
  TimeZone,
  Utc
};
use chrono_tz::Tz;
use regex::Regex;
use serde::Deserialize;

use crate::error::{
  CountdownError,
  CountdownResult
};

const TIMEZONE_CONFIG_FILE: &str =
  "countdown-time.toml";
const TIMEZONE_ENV_VAR: &str =
  "COUNTDOWN_TIMEZONE";
const TIMEZONE_CONFIG_ENV_VAR: &str =
  "COUNTDOWN_TIME_CONFIG";

const LOCAL_FORMATS: [&str; 4] = [
  "%Y-%m-%dT%H:%M:%S",
  "%Y-%m-%dT%H:%M",
  "%Y-%m-%d %H:%M:%S",
  "%Y-%m-%d %H:%M"
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

/// The zone that floating (non-UTC)
/// timestamps are interpreted in.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default,
)]
pub enum LocalZone {
  /// Whatever zone the process runs in.
  #[default]
  System,
  Named(Tz)
}

impl LocalZone {
  /// Resolution order: the
  /// `COUNTDOWN_TIMEZONE` env var, the
  /// configured value, the
  /// `countdown-time.toml` file, then
  /// the system zone.
  #[tracing::instrument]
  pub fn resolve(
    configured: Option<&str>
  ) -> Self {
    if let Ok(raw) =
      std::env::var(TIMEZONE_ENV_VAR)
      && let Some(tz) = parse_timezone(
        &raw,
        TIMEZONE_ENV_VAR
      )
    {
      return LocalZone::Named(tz);
    }

    if let Some(raw) = configured
      && let Some(tz) =
        parse_timezone(raw, "config")
    {
      return LocalZone::Named(tz);
    }

    if let Some(path) =
      timezone_config_path()
      && let Some(tz) =
        load_timezone_from_file(&path)
    {
      return LocalZone::Named(tz);
    }

    tracing::debug!(
      "no timezone configured; using \
       system local zone"
    );
    LocalZone::System
  }

  /// Maps a wall-clock time in this
  /// zone to an instant. Ambiguous
  /// times pick the earliest instant.
  pub fn to_utc(
    &self,
    local_naive: NaiveDateTime,
    context: &str
  ) -> CountdownResult<DateTime<Utc>> {
    match self {
      | LocalZone::System => {
        earliest_utc(
          Local.from_local_datetime(
            &local_naive
          ),
          context
        )
      }
      | LocalZone::Named(tz) => {
        earliest_utc(
          tz.from_local_datetime(
            &local_naive
          ),
          context
        )
      }
    }
  }

  #[must_use]
  pub fn to_naive_local(
    &self,
    dt: DateTime<Utc>
  ) -> NaiveDateTime {
    match self {
      | LocalZone::System => {
        dt.with_timezone(&Local)
          .naive_local()
      }
      | LocalZone::Named(tz) => {
        dt.with_timezone(tz)
          .naive_local()
      }
    }
  }

  #[must_use]
  pub fn local_date(
    &self,
    dt: DateTime<Utc>
  ) -> NaiveDate {
    self.to_naive_local(dt).date()
  }

  #[must_use]
  pub fn format_local(
    &self,
    dt: DateTime<Utc>,
    fmt: &str
  ) -> String {
    self
      .to_naive_local(dt)
      .format(fmt)
      .to_string()
  }

  /// Local midnight of the given
  /// calendar date.
  pub fn midnight(
    &self,
    date: NaiveDate,
    context: &str
  ) -> CountdownResult<DateTime<Utc>> {
    let naive = date
      .and_hms_opt(0, 0, 0)
      .ok_or_else(|| {
        CountdownError::InvalidDate(
          context.to_string()
        )
      })?;
    self.to_utc(naive, context)
  }
}

fn earliest_utc<Z: TimeZone>(
  result: LocalResult<DateTime<Z>>,
  context: &str
) -> CountdownResult<DateTime<Utc>> {
  match result {
    | LocalResult::Single(local_dt) => {
      Ok(local_dt.with_timezone(&Utc))
    }
    | LocalResult::Ambiguous(
      first,
      second
    ) => {
      let first =
        first.with_timezone(&Utc);
      let second =
        second.with_timezone(&Utc);
      tracing::warn!(
        context,
        first = %first,
        second = %second,
        "ambiguous local datetime; using earliest"
      );
      Ok(first.min(second))
    }
    | LocalResult::None => {
      Err(
        CountdownError::NonexistentLocalTime(
          context.to_string()
        )
      )
    }
  }
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
  path: &Path
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
        "configured local timezone"
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

/// Parses an absolute timestamp as
/// stored on countdown items or typed
/// by a user. Offsets and a trailing
/// `Z` are honored; everything else is
/// read in `zone`.
pub fn parse_timestamp(
  input: &str,
  zone: &LocalZone
) -> CountdownResult<DateTime<Utc>> {
  let token = input.trim();

  if let Ok(ndt) =
    NaiveDateTime::parse_from_str(
      token,
      "%Y%m%dT%H%M%SZ"
    )
  {
    return Ok(ndt.and_utc());
  }

  if let Ok(dt) =
    DateTime::parse_from_rfc3339(token)
  {
    return Ok(dt.with_timezone(&Utc));
  }

  if let Ok(date) =
    NaiveDate::parse_from_str(
      token, "%Y-%m-%d"
    )
  {
    return zone.midnight(date, token);
  }

  for fmt in LOCAL_FORMATS {
    if let Ok(ndt) =
      NaiveDateTime::parse_from_str(
        token, fmt
      )
    {
      return zone.to_utc(ndt, token);
    }
  }

  Err(CountdownError::InvalidDate(
    input.to_string()
  ))
}

fn relative_re() -> Option<&'static Regex>
{
  static RELATIVE: OnceLock<
    Option<Regex>
  > = OnceLock::new();
  RELATIVE
    .get_or_init(|| {
      Regex::new(
        r"^(?P<sign>[+-])(?P<num>\d+)(?P<unit>[dhm])$"
      )
      .ok()
    })
    .as_ref()
}

/// Parses the date expressions
/// accepted on the command line.
#[tracing::instrument(skip(now, zone), fields(input = input))]
pub fn parse_date_expr(
  input: &str,
  now: DateTime<Utc>,
  zone: &LocalZone
) -> anyhow::Result<DateTime<Utc>> {
  let token = input.trim();
  let lower =
    token.to_ascii_lowercase();

  match lower.as_str() {
    | "now" => return Ok(now),
    | "today" => {
      let today = zone.midnight(
        zone.local_date(now),
        "today"
      )?;
      return Ok(today);
    }
    | "tomorrow" => {
      let today = parse_date_expr(
        "today", now, zone
      )?;
      return Ok(
        today + Duration::days(1)
      );
    }
    | "yesterday" => {
      let today = parse_date_expr(
        "today", now, zone
      )?;
      return Ok(
        today - Duration::days(1)
      );
    }
    | _ => {}
  }

  let rel_re = relative_re()
    .ok_or_else(|| {
      anyhow!(
        "internal regex compile \
         failure"
      )
    })?;

  if let Some(caps) =
    rel_re.captures(token)
  {
    let sign = caps
      .name("sign")
      .map(|m| m.as_str())
      .ok_or_else(|| {
        anyhow!("missing relative sign")
      })?;
    let num: i64 = caps
      .name("num")
      .map(|m| m.as_str())
      .ok_or_else(|| {
        anyhow!(
          "missing relative amount"
        )
      })?
      .parse()
      .context(
        "invalid relative number"
      )?;
    let unit = caps
      .name("unit")
      .map(|m| m.as_str())
      .ok_or_else(|| {
        anyhow!("missing relative unit")
      })?;

    let duration = match unit {
      | "d" => Duration::try_days(num),
      | "h" => Duration::try_hours(num),
      | "m" => {
        Duration::try_minutes(num)
      }
      | _ => {
        return Err(anyhow!(
          "unknown relative unit: \
           {unit}"
        ));
      }
    };

    let shifted =
      duration.and_then(|duration| {
        if sign == "-" {
          now.checked_sub_signed(
            duration
          )
        } else {
          now.checked_add_signed(
            duration
          )
        }
      });
    return shifted.ok_or_else(|| {
      anyhow!(
        "relative offset out of \
         range: {token}"
      )
    });
  }

  parse_timestamp(token, zone)
    .map_err(anyhow::Error::from)
    .with_context(|| {
      "supported formats: \
       now/today/tomorrow/yesterday, \
       +Nd/+Nh/+Nm, RFC3339, \
       YYYY-MM-DD, YYYY-MM-DDTHH:MM, \
       YYYY-MM-DDTHH:MM:SS, \
       YYYY-MM-DD HH:MM, \
       YYYYMMDDTHHMMSSZ"
    })
}
