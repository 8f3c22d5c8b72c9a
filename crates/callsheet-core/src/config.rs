use std::collections::HashMap;
use std::fs;
use std::path::{
  Path,
  PathBuf
};
use std::time::Duration;

use anyhow::{
  Context,
  anyhow
};
use chrono_tz::Tz;
use tracing::{
  debug,
  info,
  trace,
  warn
};

use crate::detector::DEFAULT_LOOKAHEAD_MS;
use crate::registry::{
  DEFAULT_CAPACITY,
  DEFAULT_RETENTION_MS
};

const RC_ENV_VAR: &str = "CALLSHEETRC";
const RC_FILE_NAME: &str =
  ".callsheetrc";

const DEFAULTS: [(&str, &str); 9] = [
  ("api.base", "http://localhost:5000/api"),
  ("auth.token.file", "~/.callsheet/token"),
  ("auth.token.env", "CALLSHEET_TOKEN"),
  ("reminder.lookahead", "60000"),
  ("poll.popup.interval", "10000"),
  ("poll.board.interval", "60000"),
  ("registry.capacity", "4096"),
  ("registry.retention", "86400000"),
  ("color", "on")
];

#[derive(Debug, Clone)]
pub struct Config {
  map:              HashMap<String, String>,
  pub loaded_files: Vec<PathBuf>
}

impl Config {
  #[tracing::instrument(skip(
    rc_override
  ))]
  pub fn load(
    rc_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Config::defaults();

    let rc = resolve_rc_path(
      rc_override
    )?;
    if let Some(path) = rc {
      info!(callrc = %path.display(), "loading callrc");
      cfg.load_file(&path)?;
    } else {
      debug!(
        "no callrc found; using \
         defaults"
      );
    }

    Ok(cfg)
  }

  pub fn defaults() -> Self {
    Config {
      map:          DEFAULTS
        .iter()
        .map(|(k, v)| {
          (k.to_string(), v.to_string())
        })
        .collect(),
      loaded_files: vec![]
    }
  }

  #[tracing::instrument(skip(
    self, overrides
  ))]
  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (k, v) in overrides {
      let key = k
        .strip_prefix("rc.")
        .unwrap_or(&k)
        .to_string();
      debug!(key = %key, value = %v, "applying override");
      self.map.insert(key, v);
    }
  }

  pub fn get(
    &self,
    key: &str
  ) -> Option<String> {
    self
      .map
      .get(key)
      .map(|v| v.trim().to_string())
      .filter(|v| !v.is_empty())
  }

  pub fn get_millis(
    &self,
    key: &str
  ) -> anyhow::Result<Option<u64>> {
    self
      .get(key)
      .map(|raw| {
        raw.parse::<u64>().map_err(|e| {
          anyhow!(
            "invalid millisecond value \
             for {key}: {raw} ({e})"
          )
        })
      })
      .transpose()
  }

  pub fn get_path(
    &self,
    key: &str
  ) -> Option<PathBuf> {
    self
      .get(key)
      .map(|raw| expand_tilde(Path::new(&raw)))
  }

  #[tracing::instrument(skip(self))]
  fn load_file(
    &mut self,
    path: &Path
  ) -> anyhow::Result<()> {
    let path = expand_tilde(path);
    let text =
      fs::read_to_string(&path)
        .with_context(|| {
          format!(
            "failed to read {}",
            path.display()
          )
        })?;

    self
      .loaded_files
      .push(path.clone());

    let base_dir = path
      .parent()
      .map(|p| p.to_path_buf())
      .unwrap_or_else(|| {
        PathBuf::from(".")
      });

    for (line_num, raw_line) in
      text.lines().enumerate()
    {
      let mut line = raw_line.trim();
      if line.is_empty()
        || line.starts_with('#')
      {
        continue;
      }

      if let Some((before, _)) =
        line.split_once('#')
      {
        line = before.trim();
      }

      if line.is_empty() {
        continue;
      }

      if let Some(include_rest) =
        line.strip_prefix("include ")
      {
        let include_path =
          resolve_include_path(
            &base_dir,
            include_rest.trim()
          )?;
        debug!(
            file = %path.display(),
            include = %include_path.display(),
            line = line_num + 1,
            "processing include"
        );

        if self
          .loaded_files
          .contains(&include_path)
        {
          warn!(include = %include_path.display(), "include cycle detected; skipping");
        } else if include_path.exists() {
          self
            .load_file(&include_path)?;
        } else {
          warn!(include = %include_path.display(), "include file does not exist; skipping");
        }
        continue;
      }

      let (k, v) = line
        .split_once('=')
        .ok_or_else(|| {
          anyhow!(
            "invalid config line \
             {}:{}: {}",
            path.display(),
            line_num + 1,
            raw_line
          )
        })?;

      let key = k.trim().to_string();
      let value = v.trim().to_string();
      trace!(key = %key, value = %value, "loaded config key");
      self.map.insert(key, value);
    }

    Ok(())
  }
}

/// Where to reach the backend and how
/// to authenticate.
#[derive(Debug, Clone)]
pub struct ClientSettings {
  pub api_base:   String,
  pub token_file: Option<PathBuf>,
  pub token_env:  Option<String>,
  pub timeout:    Option<Duration>
}

impl ClientSettings {
  pub fn from_config(
    cfg: &Config
  ) -> anyhow::Result<Self> {
    let api_base =
      cfg.get("api.base").ok_or_else(
        || anyhow!("api.base is not set")
      )?;

    Ok(Self {
      api_base,
      token_file: cfg
        .get_path("auth.token.file"),
      token_env: cfg
        .get("auth.token.env"),
      timeout: cfg
        .get_millis("http.timeout")?
        .map(Duration::from_millis)
    })
  }
}

#[derive(Debug, Clone)]
pub struct ReminderSettings {
  pub lookahead:          chrono::Duration,
  pub popup_interval:     Duration,
  pub board_interval:     Duration,
  pub registry_capacity:  usize,
  pub registry_retention: chrono::Duration,
  pub timezone:           Tz
}

impl ReminderSettings {
  pub fn from_config(
    cfg: &Config,
    timezone: Tz
  ) -> anyhow::Result<Self> {
    let millis = |key: &str, default: u64| {
      cfg
        .get_millis(key)
        .map(|v| v.unwrap_or(default))
    };

    let lookahead = millis(
      "reminder.lookahead",
      DEFAULT_LOOKAHEAD_MS as u64
    )?;
    let popup_interval =
      millis("poll.popup.interval", 10_000)?;
    let board_interval =
      millis("poll.board.interval", 60_000)?;
    let retention = millis(
      "registry.retention",
      DEFAULT_RETENTION_MS as u64
    )?;

    if popup_interval == 0
      || board_interval == 0
    {
      return Err(anyhow!(
        "poll intervals must be \
         greater than zero"
      ));
    }

    let registry_capacity = cfg
      .get("registry.capacity")
      .map(|raw| {
        raw.parse::<usize>().map_err(|e| {
          anyhow!(
            "invalid registry.capacity: \
             {raw} ({e})"
          )
        })
      })
      .transpose()?
      .unwrap_or(DEFAULT_CAPACITY);

    // A remembered message must outlive the window that can raise it.
    if retention < lookahead {
      return Err(anyhow!(
        "registry.retention ({retention}) \
         must be at least \
         reminder.lookahead ({lookahead})"
      ));
    }
    if registry_capacity == 0 {
      return Err(anyhow!(
        "registry.capacity must be \
         greater than zero"
      ));
    }

    Ok(Self {
      lookahead: chrono::Duration::milliseconds(
        lookahead as i64
      ),
      popup_interval: Duration::from_millis(
        popup_interval
      ),
      board_interval: Duration::from_millis(
        board_interval
      ),
      registry_capacity,
      registry_retention:
        chrono::Duration::milliseconds(
          retention as i64
        ),
      timezone
    })
  }
}

impl Default for ReminderSettings {
  fn default() -> Self {
    Self {
      lookahead:          chrono::Duration::milliseconds(
        DEFAULT_LOOKAHEAD_MS
      ),
      popup_interval:     Duration::from_secs(10),
      board_interval:     Duration::from_secs(60),
      registry_capacity:  DEFAULT_CAPACITY,
      registry_retention:
        chrono::Duration::milliseconds(
          DEFAULT_RETENTION_MS
        ),
      timezone:           chrono_tz::UTC
    }
  }
}

#[tracing::instrument(skip(
  override_path
))]
fn resolve_rc_path(
  override_path: Option<&Path>
) -> anyhow::Result<Option<PathBuf>> {
  if let Some(path) = override_path {
    return Ok(Some(path.to_path_buf()));
  }

  if let Ok(rc_env) =
    std::env::var(RC_ENV_VAR)
  {
    if rc_env == "/dev/null" {
      return Ok(None);
    }
    return Ok(Some(PathBuf::from(
      rc_env
    )));
  }

  let Some(home) = dirs::home_dir()
  else {
    warn!(
      "cannot determine home \
       directory; skipping callrc"
    );
    return Ok(None);
  };
  let candidate = home.join(RC_FILE_NAME);
  if candidate.exists() {
    return Ok(Some(candidate));
  }

  Ok(None)
}

fn resolve_include_path(
  base_dir: &Path,
  include: &str
) -> anyhow::Result<PathBuf> {
  if include.trim().is_empty() {
    return Err(anyhow!(
      "include path cannot be empty"
    ));
  }

  let raw = PathBuf::from(include);
  let expanded = expand_tilde(&raw);
  if expanded.is_absolute() {
    Ok(expanded)
  } else {
    Ok(base_dir.join(expanded))
  }
}

pub fn expand_tilde(
  path: &Path
) -> PathBuf {
  let text = path.to_string_lossy();
  if let Some(rest) =
    text.strip_prefix("~/")
    && let Some(home) = dirs::home_dir()
  {
    return home.join(rest);
  }
  path.to_path_buf()
}
