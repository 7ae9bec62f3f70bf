use std::fs;
use std::path::{
  Path,
  PathBuf
};
use std::time::Duration;

use anyhow::{
  Context,
  anyhow,
  bail
};
use tracing::{
  debug,
  info,
  trace,
  warn
};

const RC_ENV_VAR: &str = "TICKLISTRC";
const RC_FILE_NAME: &str = ".ticklistrc";
const MAX_INCLUDE_DEPTH: usize = 8;

/// Settings from the rc file and `--rc` overrides, already validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
  pub data_location: PathBuf,
  pub color: bool,
  pub refresh_interval: Duration,
  pub export_location: PathBuf
}

impl Default for Config {
  fn default() -> Self {
    Self {
      data_location: expand_tilde(
        "~/.ticklist"
      ),
      color: true,
      refresh_interval:
        Duration::from_secs(60),
      export_location: PathBuf::from(
        "."
      )
    }
  }
}

impl Config {
  #[tracing::instrument(skip(
    rc_override
  ))]
  pub fn load(
    rc_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Config::default();

    match resolve_rc_path(rc_override) {
      | Some(path) => {
        info!(rc = %path.display(), "loading rc file");
        cfg.read_rc(&path, 0)?;
      }
      | None => {
        debug!(
          "no rc file found; using \
           defaults"
        );
      }
    }

    Ok(cfg)
  }

  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) -> anyhow::Result<()>
  where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (key, value) in overrides {
      let key = key
        .strip_prefix("rc.")
        .unwrap_or(&key);
      debug!(key, value = %value, "applying override");
      self.set(key, &value).with_context(
        || {
          format!(
            "invalid --rc {key}={value}"
          )
        }
      )?;
    }
    Ok(())
  }

  /// Applies one setting. Unknown keys are logged and ignored so older
  /// rc files keep working.
  pub fn set(
    &mut self,
    key: &str,
    value: &str
  ) -> anyhow::Result<()> {
    let value = value.trim();
    match key {
      | "data.location" => {
        self.data_location =
          expand_tilde(value);
      }
      | "export.location" => {
        self.export_location =
          expand_tilde(value);
      }
      | "color" => {
        self.color = parse_switch(value)
          .ok_or_else(|| {
            anyhow!(
              "color must be on or off, \
               got '{value}'"
            )
          })?;
      }
      | "refresh.interval" => {
        let secs = value
          .parse::<u64>()
          .ok()
          .filter(|secs| *secs > 0)
          .ok_or_else(|| {
            anyhow!(
              "refresh.interval must be \
               a positive number of \
               seconds, got '{value}'"
            )
          })?;
        self.refresh_interval =
          Duration::from_secs(secs);
      }
      | other => {
        warn!(key = other, "ignoring unknown config key");
      }
    }
    Ok(())
  }

  /// `--data` wins over `data.location`.
  pub fn data_dir(
    &self,
    override_dir: Option<&Path>
  ) -> PathBuf {
    override_dir
      .map(Path::to_path_buf)
      .unwrap_or_else(|| {
        self.data_location.clone()
      })
  }

  /// Reads `key = value` lines, following `include <path>` relative to
  /// the including file. Later lines override earlier ones.
  fn read_rc(
    &mut self,
    path: &Path,
    depth: usize
  ) -> anyhow::Result<()> {
    if depth > MAX_INCLUDE_DEPTH {
      bail!(
        "includes nested too deeply at \
         {}",
        path.display()
      );
    }

    let text = fs::read_to_string(path)
      .with_context(|| {
        format!(
          "failed to read {}",
          path.display()
        )
      })?;
    let base_dir = path
      .parent()
      .unwrap_or_else(|| Path::new("."));

    for (idx, raw_line) in
      text.lines().enumerate()
    {
      let line = raw_line
        .split('#')
        .next()
        .unwrap_or_default()
        .trim();
      if line.is_empty() {
        continue;
      }
      let origin = format!(
        "{}:{}",
        path.display(),
        idx + 1
      );

      if let Some(target) =
        line.strip_prefix("include ")
      {
        let target = base_dir
          .join(expand_tilde(target.trim()));
        if target.is_file() {
          self.read_rc(&target, depth + 1)?;
        } else {
          warn!(%origin, include = %target.display(), "include file does not exist; skipping");
        }
        continue;
      }

      let Some((key, value)) =
        line.split_once('=')
      else {
        bail!(
          "{origin}: expected \
           `key = value`, got \
           '{raw_line}'"
        );
      };
      trace!(%origin, key = key.trim(), "rc setting");
      self
        .set(key.trim(), value)
        .with_context(|| origin.clone())?;
    }

    Ok(())
  }
}

fn resolve_rc_path(
  override_path: Option<&Path>
) -> Option<PathBuf> {
  if let Some(path) = override_path {
    return Some(expand_tilde(
      &path.to_string_lossy()
    ));
  }

  if let Ok(rc_env) =
    std::env::var(RC_ENV_VAR)
  {
    return (rc_env != "/dev/null")
      .then(|| expand_tilde(&rc_env));
  }

  let Some(home) = dirs::home_dir()
  else {
    warn!(
      "cannot determine home \
       directory; skipping rc file"
    );
    return None;
  };
  let candidate = home.join(RC_FILE_NAME);
  candidate.is_file().then_some(candidate)
}

fn expand_tilde(raw: &str) -> PathBuf {
  match (
    raw.strip_prefix("~/"),
    dirs::home_dir()
  ) {
    | (Some(rest), Some(home)) => {
      home.join(rest)
    }
    | _ => PathBuf::from(raw)
  }
}

fn parse_switch(
  raw: &str
) -> Option<bool> {
  match raw
    .to_ascii_lowercase()
    .as_str()
  {
    | "on" | "yes" | "true" | "1" => {
      Some(true)
    }
    | "off" | "no" | "false" | "0" => {
      Some(false)
    }
    | _ => None
  }
}

#[cfg(test)]
mod tests {
  use std::fs;
  use std::path::{
    Path,
    PathBuf
  };
  use std::time::Duration;

  use tempfile::tempdir;

  use super::Config;

  #[test]
  fn defaults_cover_known_keys() {
    let cfg = Config::default();
    assert!(cfg.color);
    assert_eq!(
      cfg.refresh_interval,
      Duration::from_secs(60)
    );
    assert_eq!(
      cfg.export_location,
      PathBuf::from(".")
    );
    assert!(
      cfg
        .data_location
        .ends_with(".ticklist")
    );
  }

  #[test]
  fn loads_rc_file_with_include() {
    let temp =
      tempdir().expect("tempdir");
    fs::write(
      temp.path().join("extra.rc"),
      "refresh.interval = 5\n\
       export.location = /tmp/out\n"
    )
    .expect("write include");
    let rc = temp.path().join("main.rc");
    fs::write(
      &rc,
      "# comment\ncolor = off  # inline\n\
       include extra.rc\n\
       include missing.rc\n\
       refresh.interval = 7\n\
       theme = dark\n"
    )
    .expect("write rc");

    let cfg = Config::load(Some(&rc))
      .expect("load config");
    assert!(!cfg.color);
    assert_eq!(
      cfg.refresh_interval,
      Duration::from_secs(7)
    );
    assert_eq!(
      cfg.export_location,
      PathBuf::from("/tmp/out")
    );
  }

  #[test]
  fn rejects_malformed_lines_and_values() {
    let temp =
      tempdir().expect("tempdir");
    for (name, body) in [
      ("bad.rc", "color on\n"),
      ("color.rc", "color = purple\n"),
      ("zero.rc", "refresh.interval = 0\n"),
      ("loop.rc", "include loop.rc\n")
    ] {
      let rc = temp.path().join(name);
      fs::write(&rc, body)
        .expect("write rc");
      assert!(
        Config::load(Some(&rc)).is_err(),
        "{name} should be rejected"
      );
    }
  }

  #[test]
  fn overrides_strip_rc_prefix() {
    let mut cfg = Config::default();
    cfg
      .apply_overrides(vec![
        (
          "rc.refresh.interval"
            .to_string(),
          "30".to_string()
        ),
        (
          "export.location".to_string(),
          "/tmp/backups".to_string()
        ),
      ])
      .expect("apply overrides");
    assert_eq!(
      cfg.refresh_interval,
      Duration::from_secs(30)
    );
    assert_eq!(
      cfg.export_location,
      PathBuf::from("/tmp/backups")
    );

    assert!(
      cfg
        .apply_overrides(vec![(
          "color".to_string(),
          "maybe".to_string()
        )])
        .is_err()
    );
  }

  #[test]
  fn data_flag_beats_config() {
    let mut cfg = Config::default();
    cfg
      .set("data.location", "/srv/tasks")
      .expect("set");
    assert_eq!(
      cfg.data_dir(None),
      PathBuf::from("/srv/tasks")
    );
    assert_eq!(
      cfg.data_dir(Some(Path::new(
        "/tmp/override"
      ))),
      PathBuf::from("/tmp/override")
    );
  }
}
