use crate::opts::EngineOpts;
use crate::source::ClockOverrides;
use crate::types::RetryDurationUs;
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming a configuration file to load when the
/// command line doesn't provide one.
pub const CONFIG_ENV_VAR: &str = "CTF_ENGINE_CONFIG";

#[derive(Clone, Debug, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct EngineConfig {
    /// When the graph needs to retry to run later, retry in
    /// retry-duration-us microseconds
    pub retry_duration_us: RetryDurationUs,

    #[serde(flatten)]
    pub read: ReadConfig,

    #[serde(flatten)]
    pub trim: TrimConfig,
}

#[derive(Clone, Debug, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ReadConfig {
    /// Path to the TOML trace layout descriptor
    pub layout: Option<PathBuf>,

    /// Add clock-class-offset-ns nanoseconds to the offset of the clock
    /// class that the packet source creates
    pub clock_class_offset_ns: Option<i64>,

    /// Add clock-class-offset-s seconds to the offset of the clock class
    /// that the packet source creates
    pub clock_class_offset_s: Option<i64>,

    /// Force the origin of the clock class that the packet source creates
    /// to the Unix epoch
    pub force_clock_class_origin_unix_epoch: Option<bool>,
}

#[derive(Clone, Debug, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct TrimConfig {
    /// Discard messages with times before begin-ns
    pub begin_ns: Option<i64>,

    /// Discard messages with times after end-ns
    pub end_ns: Option<i64>,
}

impl EngineConfig {
    /// Load the configuration file named by the options, else by
    /// `CTF_ENGINE_CONFIG`, else start from the defaults, then apply the
    /// command line values on top.
    pub fn load_merge_with_opts(opts: &EngineOpts) -> Result<Self, Box<dyn std::error::Error>> {
        let mut cfg = if let Some(cfg_path) = &opts.config_file {
            Self::from_file(cfg_path)?
        } else if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
            Self::from_file(Path::new(&env_path))?
        } else {
            Self::default()
        };
        if let Some(d) = opts.retry_duration_us {
            cfg.retry_duration_us = d;
        }
        Ok(cfg)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Ok(toml::from_str(&content)?)
    }

    pub fn retry_duration(&self) -> Duration {
        Duration::from_micros(self.retry_duration_us.0)
    }

    pub fn clock_overrides(&self) -> ClockOverrides {
        ClockOverrides {
            offset_seconds: self.read.clock_class_offset_s,
            offset_ns: self.read.clock_class_offset_ns,
            force_unix_epoch_origin: self.read.force_clock_class_origin_unix_epoch.unwrap_or(false),
        }
    }

    /// `None` when no trimming was requested at all.
    pub fn trim_range(&self) -> Option<(Option<i64>, Option<i64>)> {
        if self.trim.begin_ns.is_none() && self.trim.end_ns.is_none() {
            None
        } else {
            Some((self.trim.begin_ns, self.trim.end_ns))
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::{fs::File, io::Write};

    const CONFIG: &str = r#"retry-duration-us = 100
layout = 'path/layout.toml'
clock-class-offset-ns = -1
clock-class-offset-s = 2
force-clock-class-origin-unix-epoch = true
begin-ns = 10
end-ns = 200
"#;

    #[test]
    fn engine_cfg() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("my_config.toml");
        {
            let mut f = File::create(&path).unwrap();
            f.write_all(CONFIG.as_bytes()).unwrap();
            f.flush().unwrap();
        }

        let cfg = EngineConfig::load_merge_with_opts(&EngineOpts {
            config_file: Some(path.to_path_buf()),
            ..Default::default()
        })
        .unwrap();

        env::set_var(CONFIG_ENV_VAR, path);
        let env_cfg = EngineConfig::load_merge_with_opts(&Default::default()).unwrap();
        env::remove_var(CONFIG_ENV_VAR);
        assert_eq!(cfg, env_cfg);

        assert_eq!(
            cfg,
            EngineConfig {
                retry_duration_us: 100.into(),
                read: ReadConfig {
                    layout: Some(PathBuf::from("path/layout.toml")),
                    clock_class_offset_ns: Some(-1),
                    clock_class_offset_s: Some(2),
                    force_clock_class_origin_unix_epoch: Some(true),
                },
                trim: TrimConfig {
                    begin_ns: Some(10),
                    end_ns: Some(200),
                },
            }
        );
        assert_eq!(cfg.trim_range(), Some((Some(10), Some(200))));
    }

    #[test]
    fn opts_override_file_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("my_config.toml");
        std::fs::write(&path, CONFIG).unwrap();

        let cfg = EngineConfig::load_merge_with_opts(&EngineOpts {
            config_file: Some(path),
            retry_duration_us: Some(42.into()),
        })
        .unwrap();
        assert_eq!(cfg.retry_duration_us, 42.into());
        assert_eq!(cfg.retry_duration(), Duration::from_micros(42));
    }

    #[test]
    fn defaults_mean_no_trimming() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.trim_range(), None);
        assert_eq!(cfg.retry_duration(), Duration::from_micros(100000));
    }
}
