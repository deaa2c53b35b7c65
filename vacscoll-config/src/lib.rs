//! Loader for vacscoll configuration with YAML + environment overlays.
//!
//! Sources are merged in the order they are added, then `VACSCOLL__SECTION__KEY`
//! environment variables win over everything (e.g. `VACSCOLL__PROVIDER__RATE_DELAY=0.5`).
//! String values may reference `${VAR}`; expansion is applied after merging.
//!
//! ```yaml
//! version: "1"
//! provider:
//!   base_url: https://api.hh.ru
//!   endpoint: vacancies
//!   query_params: [["per_page", "100"], ["no_magic", "true"]]
//!   filters: [noExperience]
//!   rate_delay: 0.2
//! cache:
//!   path: ~/.local/share/vacscoll/seen.db
//!   max_age_days: 7
//! logging:
//!   format: text
//!   emit_stderr: true
//! ```
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use vacscoll_common::{LogConfig, LogFormat};

pub use vacscoll_collector::PageIndexing;

const MAXIMUM_ENV_EXPANSION_DEPTH: usize = 8;
const APP_DIR: &str = "vacscoll";

#[derive(Debug, Clone, Deserialize)]
pub struct VacscollConfig {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub base_url: String,
    pub endpoint: String,
    /// Ordered `[name, value]` pairs; order is kept in request URLs.
    pub query_params: Vec<(String, String)>,
    /// Experience/employment category ids to exclude.
    pub filters: Vec<String>,
    /// Minimum seconds between dispatched requests.
    pub rate_delay: f64,
    pub page_indexing: PageIndexing,
    pub areas_endpoint: String,
    pub detail_endpoint: String,
    pub detail_params: Vec<(String, String)>,
    pub user_agent: Option<String>,
    pub request_timeout_secs: Option<u64>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.hh.ru".into(),
            endpoint: "vacancies".into(),
            query_params: vec![
                ("per_page".into(), "100".into()),
                ("no_magic".into(), "true".into()),
            ],
            filters: Vec::new(),
            rate_delay: 0.2,
            page_indexing: PageIndexing::ZeroBased,
            areas_endpoint: "areas".into(),
            detail_endpoint: "vacancies".into(),
            detail_params: vec![("host".into(), "hh.ru".into())],
            user_agent: None,
            request_timeout_secs: None,
        }
    }
}

impl ProviderConfig {
    /// Values too large for a `Duration` saturate; negative or NaN ones
    /// mean no delay. `load` rejects both up front.
    pub fn rate_delay(&self) -> Duration {
        if self.rate_delay.is_nan() || self.rate_delay <= 0.0 {
            return Duration::ZERO;
        }
        Duration::try_from_secs_f64(self.rate_delay).unwrap_or(Duration::MAX)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Store file; `~` is expanded. Defaults to the platform data dir.
    pub path: Option<String>,
    pub max_age_days: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: None,
            max_age_days: 7,
        }
    }
}

impl CacheConfig {
    pub fn store_path(&self) -> PathBuf {
        match &self.path {
            Some(p) => PathBuf::from(shellexpand::tilde(p).into_owned()),
            None => default_store_path(),
        }
    }
}

fn default_store_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join("seen.db")
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub dir: Option<String>,
    pub format: LogFormat,
    pub emit_stderr: bool,
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: None,
            format: LogFormat::Text,
            emit_stderr: true,
            filter: "info".into(),
        }
    }
}

impl LoggingConfig {
    pub fn to_log_config(&self) -> LogConfig {
        LogConfig {
            log_dir: self
                .dir
                .as_deref()
                .map(|d| PathBuf::from(shellexpand::tilde(d).into_owned())),
            emit_stderr: self.emit_stderr,
            format: self.format,
            default_filter: self.filter.clone(),
            ..LogConfig::default()
        }
    }
}

fn expand_env_in_value(v: &mut Value) {
    match v {
        Value::String(s) => {
            if s.contains('$') {
                let mut cur = std::mem::take(s);
                for _ in 0..MAXIMUM_ENV_EXPANSION_DEPTH {
                    let expanded = match shellexpand::env(&cur) {
                        Ok(cow) => cow.into_owned(),
                        Err(_) => cur.clone(),
                    };
                    if expanded == cur {
                        break;
                    }
                    cur = expanded;
                }
                *s = cur;
            }
        }
        Value::Array(arr) => arr.iter_mut().for_each(expand_env_in_value),
        Value::Object(obj) => obj.values_mut().for_each(expand_env_in_value),
        _ => {}
    }
}

fn validate(cfg: &VacscollConfig) -> Result<(), ConfigError> {
    let delay = cfg.provider.rate_delay;
    if Duration::try_from_secs_f64(delay).is_err() {
        return Err(ConfigError::Message(format!(
            "provider.rate_delay must be a non-negative number of seconds that fits a duration, got {delay}"
        )));
    }
    if cfg.provider.base_url.trim().is_empty() {
        return Err(ConfigError::Message("provider.base_url is empty".into()));
    }
    Ok(())
}

/// Builder hiding the `config` crate wiring.
pub struct VacscollConfigLoader {
    builder: config::ConfigBuilder<config::builder::DefaultState>,
    files: Vec<config::File<config::FileSourceFile, config::FileFormat>>,
    inline: Vec<String>,
}

impl Default for VacscollConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl VacscollConfigLoader {
    /// Start with no file sources; built-in defaults apply.
    ///
    /// ```
    /// use vacscoll_config::VacscollConfigLoader;
    ///
    /// let cfg = VacscollConfigLoader::new()
    ///     .with_yaml_str("version: '1'")
    ///     .load()
    ///     .expect("valid config");
    ///
    /// assert_eq!(cfg.version.as_deref(), Some("1"));
    /// assert_eq!(cfg.provider.base_url, "https://api.hh.ru");
    /// assert_eq!(cfg.cache.max_age_days, 7);
    /// ```
    pub fn new() -> Self {
        Self {
            builder: Config::builder(),
            files: Vec::new(),
            inline: Vec::new(),
        }
    }

    /// Attach a config file that must exist; format is inferred by suffix.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.files.push(File::from(path.as_ref()).required(true));
        self
    }

    /// Attach a config file that may be absent (env-only deployments).
    pub fn with_optional_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.files.push(File::from(path.as_ref()).required(false));
        self
    }

    /// Merge an inline YAML snippet.
    ///
    /// ```
    /// use vacscoll_config::{PageIndexing, VacscollConfigLoader};
    ///
    /// let cfg = VacscollConfigLoader::new()
    ///     .with_yaml_str(
    ///         r#"
    /// provider:
    ///   base_url: "https://api.example.com"
    ///   query_params: [["text", "rust"], ["area", "1"]]
    ///   filters: ["noExperience"]
    ///   page_indexing: one_based
    /// "#,
    ///     )
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(cfg.provider.query_params[0], ("text".to_string(), "rust".to_string()));
    /// assert_eq!(cfg.provider.page_indexing, PageIndexing::OneBased);
    /// ```
    pub fn with_yaml_str(mut self, yaml: &str) -> Self {
        self.inline.push(yaml.to_string());
        self
    }

    /// Merge all sources, expand `${VAR}` placeholders and deserialize.
    pub fn load(self) -> Result<VacscollConfig, ConfigError> {
        let mut builder = self.builder;
        for file in self.files {
            builder = builder.add_source(file);
        }
        for yaml in &self.inline {
            builder = builder.add_source(File::from_str(yaml, config::FileFormat::Yaml));
        }
        builder = builder.add_source(
            Environment::with_prefix("VACSCOLL")
                .separator("__")
                .try_parsing(true),
        );

        let cfg = builder.build()?;
        let mut v: Value = cfg.try_deserialize()?;
        expand_env_in_value(&mut v);

        let typed: VacscollConfig =
            serde_json::from_value(v).map_err(|e| ConfigError::Message(e.to_string()))?;
        validate(&typed)?;
        Ok(typed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn expands_simple_string() {
        temp_env::with_var("CONTACT", Some("ops@example.com"), || {
            let mut v = json!("vacscoll (${CONTACT})");
            expand_env_in_value(&mut v);
            assert_eq!(v, json!("vacscoll (ops@example.com)"));
        });
    }

    #[test]
    fn expands_inside_param_pairs() {
        temp_env::with_var("SEARCH_AREA", Some("113"), || {
            let mut v = json!({ "query_params": [["area", "${SEARCH_AREA}"], ["per_page", "100"]] });
            expand_env_in_value(&mut v);
            assert_eq!(
                v,
                json!({ "query_params": [["area", "113"], ["per_page", "100"]] })
            );
        });
    }

    #[test]
    fn stops_on_cycles() {
        temp_env::with_vars([("A", Some("${B}")), ("B", Some("${A}"))], || {
            let mut v = json!("x=${A}-y");
            expand_env_in_value(&mut v);
            let s = v.as_str().unwrap();
            assert!(s.starts_with("x=") && s.ends_with("-y"));
            assert!(s.contains("${"));
        });
    }

    #[test]
    fn unknown_vars_are_left_as_is() {
        let mut v = json!("hi-${VACSCOLL_DOES_NOT_EXIST}");
        expand_env_in_value(&mut v);
        assert_eq!(v, json!("hi-${VACSCOLL_DOES_NOT_EXIST}"));
    }

    #[test]
    fn negative_rate_delay_is_rejected() {
        let err = VacscollConfigLoader::new()
            .with_yaml_str("provider:\n  rate_delay: -1.0\n")
            .load()
            .unwrap_err();
        assert!(err.to_string().contains("rate_delay"));
    }

    #[test]
    fn oversized_rate_delay_is_rejected() {
        let err = VacscollConfigLoader::new()
            .with_yaml_str("provider:\n  rate_delay: 1.0e30\n")
            .load()
            .unwrap_err();
        assert!(err.to_string().contains("rate_delay"));
    }

    #[test]
    fn page_indexing_reads_into_collector_enum() {
        let cfg = VacscollConfigLoader::new()
            .with_yaml_str("provider:\n  page_indexing: one_based\n")
            .load()
            .unwrap();
        assert_eq!(cfg.provider.page_indexing, vacscoll_collector::PageIndexing::OneBased);
    }

    #[test]
    fn rate_delay_never_panics() {
        for raw in [1.0e30, f64::INFINITY, f64::NAN, -2.0] {
            let provider = ProviderConfig {
                rate_delay: raw,
                ..ProviderConfig::default()
            };
            let delay = provider.rate_delay();
            assert!(delay == Duration::ZERO || delay == Duration::MAX, "{raw} -> {delay:?}");
        }
        let provider = ProviderConfig {
            rate_delay: 0.25,
            ..ProviderConfig::default()
        };
        assert_eq!(provider.rate_delay(), Duration::from_millis(250));
    }

    #[test]
    fn explicit_store_path_expands_tilde() {
        let cache = CacheConfig {
            path: Some("~/vacscoll/seen.db".into()),
            max_age_days: 7,
        };
        let p = cache.store_path();
        assert!(p.ends_with("vacscoll/seen.db"));
        assert!(!p.to_string_lossy().starts_with('~'));
    }
}
