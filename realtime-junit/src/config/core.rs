// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::RealtimeJunitOptions;
use crate::{
    errors::{ConfigParseError, ConfigParseErrorKind},
    host::BuildOutcome,
};
use camino::Utf8Path;
use config::{Config, ConfigBuilder, ConfigError, File, FileFormat, builder::DefaultState};
use indexmap::IndexMap;
use serde::Deserialize;
use std::{collections::BTreeSet, time::Duration};
use tracing::warn;

/// Overall configuration for realtime-junit.
///
/// The configuration is layered: the embedded [`Self::DEFAULT_CONFIG`] comes first, and the
/// repository's config file is merged on top of it.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RealtimeConfig {
    refresh: RefreshConfig,
    baseline: BaselineConfig,
    #[serde(default)]
    jobs: IndexMap<String, JobConfig>,
}

impl RealtimeConfig {
    /// The default location of the config within a workspace root.
    pub const CONFIG_PATH: &'static str = ".config/realtime-junit.toml";

    /// Contains the default config as a TOML file.
    pub const DEFAULT_CONFIG: &'static str = include_str!("../../default-config.toml");

    /// Reads the config from the given file, or if not specified from
    /// `.config/realtime-junit.toml` in the workspace root.
    ///
    /// If no config file is specified and the workspace root doesn't have one, the default config
    /// is used.
    pub fn from_sources(
        workspace_root: &Utf8Path,
        config_file: Option<&Utf8Path>,
    ) -> Result<Self, ConfigParseError> {
        let (config_file, source) = match config_file {
            Some(file) => (file.to_owned(), File::new(file.as_str(), FileFormat::Toml)),
            None => {
                let config_file = workspace_root.join(Self::CONFIG_PATH);
                let source = File::new(config_file.as_str(), FileFormat::Toml).required(false);
                (config_file, source)
            }
        };

        let builder = Self::make_default_config().add_source(source);
        let (config, unknown) = Self::build_and_deserialize_config(&builder)
            .map_err(|kind| ConfigParseError::new(&config_file, kind))?;

        if !unknown.is_empty() {
            warn!(
                "ignoring unknown configuration keys in {config_file}: {}",
                unknown.into_iter().collect::<Vec<_>>().join(", ")
            );
        }

        Ok(config)
    }

    /// Returns the default config.
    pub fn default_config() -> Self {
        let (config, _unknown) = Self::build_and_deserialize_config(&Self::make_default_config())
            .expect("default config is always valid");
        config
    }

    /// Reads a config from a TOML string layered over the defaults. Used in tests.
    #[cfg(test)]
    pub(crate) fn from_toml(toml: &str) -> Result<Self, ConfigParseError> {
        let builder =
            Self::make_default_config().add_source(File::from_str(toml, FileFormat::Toml));
        let (config, _unknown) = Self::build_and_deserialize_config(&builder)
            .map_err(|kind| ConfigParseError::new("<inline>", kind))?;
        Ok(config)
    }

    /// The refresh settings.
    pub fn refresh(&self) -> &RefreshConfig {
        &self.refresh
    }

    /// The baseline lookup settings.
    pub fn baseline(&self) -> &BaselineConfig {
        &self.baseline
    }

    /// The settings of the named job. Jobs without settings are not reported in realtime.
    pub fn job(&self, name: &str) -> JobConfig {
        self.jobs.get(name).cloned().unwrap_or_default()
    }

    /// Overrides the refresh mode.
    pub fn set_refresh_mode(&mut self, mode: RefreshMode) -> &mut Self {
        self.refresh.mode = mode;
        self
    }

    /// Sets the settings of the named job.
    pub fn set_job(&mut self, name: impl Into<String>, config: JobConfig) -> &mut Self {
        self.jobs.insert(name.into(), config);
        self
    }

    /// Iterates over all jobs with explicit settings.
    pub fn jobs(&self) -> impl Iterator<Item = (&str, &JobConfig)> + '_ {
        self.jobs.iter().map(|(name, config)| (name.as_str(), config))
    }

    // ---
    // Helper methods
    // ---

    fn make_default_config() -> ConfigBuilder<DefaultState> {
        Config::builder().add_source(File::from_str(Self::DEFAULT_CONFIG, FileFormat::Toml))
    }

    /// This returns a tuple of (config, ignored paths).
    fn build_and_deserialize_config(
        builder: &ConfigBuilder<DefaultState>,
    ) -> Result<(Self, BTreeSet<String>), ConfigParseErrorKind> {
        let config = builder
            .build_cloned()
            .map_err(|error| ConfigParseErrorKind::BuildError(Box::new(error)))?;

        let mut ignored = BTreeSet::new();
        let mut cb = |path: serde_ignored::Path| {
            ignored.insert(path.to_string());
        };
        let ignored_de = serde_ignored::Deserializer::new(config, &mut cb);
        let config: RealtimeConfig =
            serde_path_to_error::deserialize(ignored_de).map_err(|error| {
                // The config crate also reports the key, so drop it from the inner error.
                let path = error.path().clone();
                let error = match error.into_inner() {
                    ConfigError::At { error, .. } => *error,
                    other => other,
                };
                ConfigParseErrorKind::DeserializeError(Box::new(serde_path_to_error::Error::new(
                    path, error,
                )))
            })?;

        config.validate()?;
        Ok((config, ignored))
    }

    fn validate(&self) -> Result<(), ConfigParseErrorKind> {
        if self.refresh.duration_divisor == 0 {
            return Err(ConfigParseErrorKind::InvalidValue {
                key: "refresh.duration-divisor",
                reason: "must be at least 1",
            });
        }
        if self.baseline.search_limit == 0 {
            return Err(ConfigParseErrorKind::InvalidValue {
                key: "baseline.search-limit",
                reason: "must be at least 1",
            });
        }
        Ok(())
    }
}

/// How often reports are reparsed.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RefreshConfig {
    #[serde(with = "humantime_serde")]
    minimum_interval: Duration,
    duration_divisor: u32,
    mode: RefreshMode,
}

impl RefreshConfig {
    /// The minimum time between two parses of the same report.
    pub fn minimum_interval(&self) -> Duration {
        self.minimum_interval
    }

    /// The expected duration of a build is divided by this to get its refresh interval.
    pub fn duration_divisor(&self) -> u32 {
        self.duration_divisor
    }

    /// The refresh mode.
    pub fn mode(&self) -> RefreshMode {
        self.mode
    }
}

/// Whether lookups may be served from the cache.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RefreshMode {
    /// Serve cached results within the refresh interval.
    #[default]
    Interval,

    /// Reparse on every lookup.
    Always,
}

/// How baselines are looked up.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BaselineConfig {
    search_limit: usize,
    acceptable_outcomes: Vec<BuildOutcome>,
}

impl BaselineConfig {
    /// How many earlier builds are looked through.
    pub fn search_limit(&self) -> usize {
        self.search_limit
    }

    /// Returns true if a build with this outcome can serve as a baseline.
    pub fn is_acceptable(&self, outcome: BuildOutcome) -> bool {
        self.acceptable_outcomes.contains(&outcome)
    }
}

/// Realtime reporting settings of a single job.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct JobConfig {
    /// Whether results of running builds of this job are reported in realtime.
    #[serde(default)]
    pub report_in_realtime: bool,

    /// The JUnit publisher configured for the job, if any.
    #[serde(default)]
    pub junit: Option<RealtimeJunitOptions>,
}

impl JobConfig {
    /// Creates settings for a job reported in realtime with the given publisher options.
    pub fn realtime(junit: RealtimeJunitOptions) -> Self {
        Self {
            report_in_realtime: true,
            junit: Some(junit),
        }
    }

    /// Returns true if running builds of this job should be reported in realtime.
    pub fn is_active(&self) -> bool {
        self.report_in_realtime
    }
}
