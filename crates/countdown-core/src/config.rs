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
use tracing::{
  debug,
  info,
  trace,
  warn
};

use crate::board::DEFAULT_IMPORT_FOLDER;

const RC_ENV_VAR: &str = "COUNTDOWNRC";
const RC_FILE_NAME: &str =
  ".countdownrc";
const DEFAULT_DATA_DIR: &str =
  "~/.countdown";

#[derive(Debug, Clone)]
pub struct Config {
  map: HashMap<String, String>,
  pub loaded_files: Vec<PathBuf>
}

impl Config {
  /// Built-in defaults only; no
  /// files are read.
  pub fn defaults() -> Self {
    let mut map = HashMap::new();
    for (k, v) in [
      ("data.location", DEFAULT_DATA_DIR),
      ("color", "on"),
      ("tick.interval", "1"),
      (
        "import.folder",
        DEFAULT_IMPORT_FOLDER
      )
    ] {
      map.insert(
        k.to_string(),
        v.to_string()
      );
    }

    Config {
      map,
      loaded_files: vec![]
    }
  }

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
      info!(rc = %path.display(), "loading countdownrc");
      cfg.load_file(&path)?;
    } else {
      debug!(
        "no countdownrc found; using \
         defaults"
      );
    }

    Ok(cfg)
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
    self.map.get(key).cloned()
  }

  /// Strict on/off reading; anything
  /// else is an error naming the key.
  pub fn get_bool(
    &self,
    key: &str
  ) -> anyhow::Result<Option<bool>> {
    let Some(raw) = self.map.get(key)
    else {
      return Ok(None);
    };
    match raw
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "on" | "yes" | "true" | "1" => {
        Ok(Some(true))
      }
      | "off" | "no" | "false"
      | "0" => Ok(Some(false)),
      | other => Err(anyhow!(
        "invalid {key} setting: \
         {other}"
      ))
    }
  }

  /// Seconds between countdown
  /// refreshes; at least one.
  pub fn tick_interval(
    &self
  ) -> anyhow::Result<Duration> {
    let raw = self
      .get("tick.interval")
      .unwrap_or_else(|| {
        "1".to_string()
      });
    let secs: u64 =
      raw.trim().parse().with_context(
        || {
          format!(
            "invalid tick.interval: \
             {raw}"
          )
        }
      )?;
    Ok(Duration::from_secs(
      secs.max(1)
    ))
  }

  pub fn import_folder(&self) -> String {
    self
      .get("import.folder")
      .filter(|name| {
        !name.trim().is_empty()
      })
      .unwrap_or_else(|| {
        DEFAULT_IMPORT_FOLDER
          .to_string()
      })
  }

  pub fn iter(
    &self
  ) -> impl Iterator<Item = (&String, &String)>
  {
    self.map.iter()
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
      let line = raw_line
        .split_once('#')
        .map_or(raw_line, |(before, _)| {
          before
        })
        .trim();
      if line.is_empty() {
        continue;
      }

      if let Some(include) = line
        .strip_prefix("include ")
        .map(str::trim)
      {
        if include.is_empty() {
          return Err(anyhow!(
            "empty include at {}:{}",
            path.display(),
            line_num + 1
          ));
        }
        let include_path = base_dir
          .join(expand_tilde(
            Path::new(include)
          ));
        debug!(
          include = %include_path.display(),
          line = line_num + 1,
          "processing include"
        );

        if include_path.exists() {
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

#[tracing::instrument(skip(
  cfg,
  override_dir
))]
pub fn resolve_data_dir(
  cfg: &Config,
  override_dir: Option<&Path>
) -> anyhow::Result<PathBuf> {
  let dir = match override_dir {
    | Some(path) => path.to_path_buf(),
    | None => {
      let raw = cfg
        .get("data.location")
        .unwrap_or_else(|| {
          DEFAULT_DATA_DIR.to_string()
        });
      expand_tilde(Path::new(&raw))
    }
  };

  if !dir.exists() {
    info!(dir = %dir.display(), "creating data directory");
    fs::create_dir_all(&dir)
      .with_context(|| {
        format!(
          "failed to create {}",
          dir.display()
        )
      })?;
  }

  Ok(dir)
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
       directory; skipping \
       countdownrc"
    );
    return Ok(None);
  };
  let candidate = home.join(RC_FILE_NAME);
  if candidate.exists() {
    return Ok(Some(candidate));
  }

  Ok(None)
}

fn expand_tilde(
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

#[cfg(test)]
mod tests {
  use std::fs;
  use std::time::Duration;

  use super::Config;

  #[test]
  fn rc_file_with_include_and_overrides()
  {
    let dir = tempfile::tempdir()
      .expect("tempdir");
    let extra = dir.path().join("extra");
    fs::write(
      &extra,
      "tick.interval = 5\n"
    )
    .expect("write include");
    let rc = dir.path().join("rc");
    fs::write(
      &rc,
      "# countdown settings\n\
       color = off  # no ansi\n\
       include extra\n\
       import.folder = 课程\n"
    )
    .expect("write rc");

    let mut cfg = Config::load(Some(&rc))
      .expect("load rc");
    assert_eq!(
      cfg
        .get_bool("color")
        .expect("bool"),
      Some(false)
    );
    assert_eq!(
      cfg
        .tick_interval()
        .expect("interval"),
      Duration::from_secs(5)
    );
    assert_eq!(
      cfg.import_folder(),
      "课程"
    );
    assert_eq!(cfg.loaded_files.len(), 2);

    cfg.apply_overrides([(
      "rc.tick.interval".to_string(),
      "0".to_string()
    )]);
    assert_eq!(
      cfg
        .tick_interval()
        .expect("interval"),
      Duration::from_secs(1)
    );
  }

  #[test]
  fn malformed_line_is_an_error() {
    let dir = tempfile::tempdir()
      .expect("tempdir");
    let rc = dir.path().join("rc");
    fs::write(&rc, "just words\n")
      .expect("write rc");
    let err = Config::load(Some(&rc))
      .expect_err("bad line");
    assert!(
      err
        .to_string()
        .contains("invalid config line")
    );
  }

  #[test]
  fn bad_bool_names_the_key() {
    let mut cfg = Config::defaults();
    cfg.apply_overrides([(
      "color".to_string(),
      "sometimes".to_string()
    )]);
    let err = cfg
      .get_bool("color")
      .expect_err("not a bool");
    assert!(
      err
        .to_string()
        .contains("invalid color setting")
    );
    assert_eq!(
      cfg
        .get_bool("missing")
        .expect("absent"),
      None
    );
  }

  #[test]
  fn defaults_cover_import_folder() {
    let cfg = Config::defaults();
    assert_eq!(
      cfg.import_folder(),
      "导入事件"
    );
    assert_eq!(
      cfg.get("data.location")
        .as_deref(),
      Some("~/.countdown")
    );
  }
}
