//! Settings for the `strata` binary.
//!
//! Read from an optional TOML file and then from `STRATA_*` environment
//! variables, which win. Nested keys use a double underscore, e.g.
//! `STRATA_SNAPSHOT__DATASET_ID`.

use std::{
  path::{Path, PathBuf},
  time::Duration,
};

use anyhow::Context as _;
use serde::Deserialize;
use strata_core::{change::ChangePolicy, record::Field};
use strata_etl::{PipelineConfig, SourceSpec};

/// A dataset as written in the config file.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceSettings {
  pub name:       String,
  pub dataset_id: String,
}

impl From<SourceSettings> for SourceSpec {
  fn from(s: SourceSettings) -> Self {
    SourceSpec { name: s.name, dataset_id: s.dataset_id }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
  pub store_path:            PathBuf,
  pub storage_dir:           PathBuf,
  pub portal_url:            String,
  pub snapshot:              SourceSettings,
  #[serde(default)]
  pub reference:             Option<SourceSettings>,
  /// Overrides the default tracked field set when present.
  #[serde(default)]
  pub tracked_fields:        Option<Vec<Field>>,
  #[serde(default)]
  pub stage_timeout_secs:    Option<u64>,
  pub download_timeout_secs: u64,
  pub host:                  String,
  pub port:                  u16,
}

impl Settings {
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    let settings = config::Config::builder()
      .set_default("store_path", "strata.db")?
      .set_default("storage_dir", "downloads")?
      .set_default("portal_url", "https://data.cityofchicago.org")?
      .set_default("snapshot.name", "chicago-crime")?
      .set_default("snapshot.dataset_id", "ijzp-q8t2")?
      .set_default("download_timeout_secs", 600)?
      .set_default("host", "127.0.0.1")?
      .set_default("port", 8080)?
      .add_source(config::File::from(path).required(false))
      .add_source(
        config::Environment::with_prefix("STRATA")
          .prefix_separator("_")
          .separator("__")
          .try_parsing(true)
          .list_separator(",")
          .with_list_parse_key("tracked_fields"),
      )
      .build()
      .with_context(|| format!("failed to read config from {}", path.display()))?;

    let mut settings: Settings = settings
      .try_deserialize()
      .context("failed to deserialise settings")?;
    settings.store_path = expand_tilde(&settings.store_path);
    settings.storage_dir = expand_tilde(&settings.storage_dir);
    Ok(settings)
  }

  pub fn policy(&self) -> anyhow::Result<ChangePolicy> {
    match &self.tracked_fields {
      Some(fields) => ChangePolicy::new(fields.iter().copied())
        .context("invalid tracked_fields"),
      None => Ok(ChangePolicy::default()),
    }
  }

  pub fn pipeline(&self) -> anyhow::Result<PipelineConfig> {
    Ok(PipelineConfig {
      snapshot:  self.snapshot.clone().into(),
      reference: self.reference.clone().map(Into::into),
      policy:    self.policy()?,
    })
  }

  pub fn stage_timeout(&self) -> Option<Duration> {
    self.stage_timeout_secs.map(Duration::from_secs)
  }

  pub fn download_timeout(&self) -> Duration {
    Duration::from_secs(self.download_timeout_secs)
  }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_apply_without_a_file() {
    let s = Settings::load(Path::new("/nonexistent/strata.toml")).unwrap();
    assert_eq!(s.snapshot.dataset_id, "ijzp-q8t2");
    assert_eq!(s.port, 8080);
    assert!(s.reference.is_none());
    assert_eq!(s.policy().unwrap(), ChangePolicy::default());
  }

  #[test]
  fn file_overrides_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("strata.toml");
    std::fs::write(
      &path,
      r#"
        port = 9000
        tracked_fields = ["arrest", "domestic"]

        [reference]
        name = "iucr"
        dataset_id = "qimd-vs49"
      "#,
    )
    .unwrap();

    let s = Settings::load(&path).unwrap();
    assert_eq!(s.port, 9000);
    assert_eq!(s.policy().unwrap().tracked(), &[Field::Arrest, Field::Domestic]);
    let pipeline = s.pipeline().unwrap();
    assert_eq!(pipeline.reference.unwrap().dataset_id, "qimd-vs49");
  }

  #[test]
  fn empty_tracked_fields_are_rejected() {
    let s = Settings {
      tracked_fields: Some(Vec::new()),
      ..Settings::load(Path::new("/nonexistent/strata.toml")).unwrap()
    };
    assert!(s.policy().is_err());
  }

  #[test]
  fn tilde_is_expanded() {
    let Ok(home) = std::env::var("HOME") else { return };
    assert_eq!(expand_tilde(Path::new("~/x.db")), PathBuf::from(home).join("x.db"));
    assert_eq!(expand_tilde(Path::new("/abs/x.db")), PathBuf::from("/abs/x.db"));
  }
}
