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
use chrono::NaiveDate;
use tracing::{
  debug,
  info,
  trace,
  warn
};

use crate::gesture::PointerGesture;
use crate::layout::{
  DEFAULT_CELL_WIDTH,
  DEFAULT_MARKER_SPACING,
  DEFAULT_UNIT_COUNT,
  Granularity,
  MAX_UNIT_COUNT,
  TimelineWindow
};

const RC_ENV_VAR: &str = "GANTTRC";
const RC_FILE_NAME: &str = ".ganttrc";

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
      info!(rc = %path.display(), "loading ganttrc");
      cfg.load_file(&path)?;
    } else {
      warn!(
        "no ganttrc found; using \
         defaults"
      );
    }

    Ok(cfg)
  }

  pub fn defaults() -> Self {
    let mut map = HashMap::new();
    for (key, value) in [
      ("data.location", "~/.gantt"),
      ("timeline.units", "120"),
      ("timeline.granularity", "day"),
      ("timeline.cell_width", "30"),
      ("timeline.padding", "0"),
      ("timeline.marker_spacing", "24"),
      ("gesture.drag_threshold", "5"),
      ("gesture.double_click_ms", "250"),
      ("color", "on")
    ] {
      map.insert(
        key.to_string(),
        value.to_string()
      );
    }

    Config {
      map,
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
      .filter(|v| !v.trim().is_empty())
      .cloned()
  }

  pub fn get_bool(
    &self,
    key: &str
  ) -> Option<bool> {
    self
      .map
      .get(key)
      .map(|v| parse_bool(v))
  }

  pub fn get_parsed<T>(
    &self,
    key: &str
  ) -> anyhow::Result<Option<T>>
  where
    T: std::str::FromStr,
    T::Err: std::fmt::Display
  {
    let Some(raw) = self.get(key) else {
      return Ok(None);
    };
    raw
      .trim()
      .parse::<T>()
      .map(Some)
      .map_err(|err| {
        anyhow!(
          "invalid value for {key}: \
           {raw:?} ({err})"
        )
      })
  }

  pub fn iter(
    &self
  ) -> impl Iterator<Item = (&String, &String)>
  {
    self.map.iter()
  }

  /// Grid geometry starting at `start`.
  pub fn timeline_window(
    &self,
    start: NaiveDate
  ) -> anyhow::Result<TimelineWindow> {
    let units = self
      .get_parsed::<usize>(
        "timeline.units"
      )?
      .unwrap_or(DEFAULT_UNIT_COUNT);
    if !(1..=MAX_UNIT_COUNT)
      .contains(&units)
    {
      return Err(anyhow!(
        "timeline.units must be \
         between 1 and \
         {MAX_UNIT_COUNT}, got {units}"
      ));
    }
    let cell_width = self
      .get_parsed::<f32>(
        "timeline.cell_width"
      )?
      .unwrap_or(DEFAULT_CELL_WIDTH);
    let padding = self
      .get_parsed::<f32>(
        "timeline.padding"
      )?
      .unwrap_or(0.0);
    let spacing = self
      .get_parsed::<f32>(
        "timeline.marker_spacing"
      )?
      .unwrap_or(DEFAULT_MARKER_SPACING);

    let granularity = match self
      .get("timeline.granularity")
    {
      | Some(raw) => {
        Granularity::parse(&raw)
          .ok_or_else(|| {
            anyhow!(
              "invalid \
               timeline.granularity: \
               {raw}"
            )
          })?
      }
      | None => Granularity::Day
    };

    let window = match granularity {
      | Granularity::Day => {
        TimelineWindow::new(
          start,
          units,
          granularity,
          cell_width
        )
      }
      | Granularity::Week => {
        TimelineWindow::week_aligned(
          start, units, cell_width
        )
      }
    };

    Ok(
      window
        .with_padding(padding)
        .with_marker_spacing(spacing)
    )
  }

  pub fn pointer_gesture(
    &self
  ) -> anyhow::Result<PointerGesture> {
    let threshold = self
      .get_parsed::<f32>(
        "gesture.drag_threshold"
      )?
      .unwrap_or(
        crate::gesture::DEFAULT_DRAG_THRESHOLD
      );
    let window = self
      .get_parsed::<u64>(
        "gesture.double_click_ms"
      )?
      .map(Duration::from_millis)
      .unwrap_or(
        crate::gesture::DEFAULT_DOUBLE_CLICK_WINDOW
      );
    Ok(PointerGesture::new(
      threshold, window
    ))
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
  let dir = if let Some(path) =
    override_dir
  {
    path.to_path_buf()
  } else if let Some(cfg_value) =
    cfg.get("data.location")
  {
    expand_tilde(Path::new(&cfg_value))
  } else {
    default_data_dir()?
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
       directory; skipping ganttrc"
    );
    return Ok(None);
  };
  let candidate = home.join(RC_FILE_NAME);
  if candidate.exists() {
    return Ok(Some(candidate));
  }

  Ok(None)
}

fn default_data_dir()
-> anyhow::Result<PathBuf> {
  let home = dirs::home_dir()
    .ok_or_else(|| {
      anyhow!(
        "cannot determine home \
         directory"
      )
    })?;
  Ok(home.join(".gantt"))
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

fn parse_bool(s: &str) -> bool {
  matches!(
    s.trim()
      .to_ascii_lowercase()
      .as_str(),
    "1" | "y" | "yes" | "on" | "true"
  )
}
