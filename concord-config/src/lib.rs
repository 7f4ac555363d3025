//! Loader for Concord configuration with YAML + environment overlays.
//!
//! Precedence, lowest first: inline YAML / files in the order they are added,
//! then `CONCORD__*` environment variables (`__` separates nesting levels, so
//! `CONCORD__TARGET__PAGE_URL` sets `target.page_url`). `${VAR}` placeholders
//! in any string value are expanded after merging.
//!
//! Only `target.page_url` is required; everything else has a default.
use concord_common::observability::{LogConfig, LogFormat};
use concord_common::{ApiContent, LinkCheckPolicy, LinkScope, SectionScope, ThemeMarker};
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use url::Url;

const MAXIMUM_ENV_EXPANSION_DEPTH: usize = 8;

const DEFAULT_CONTENT_ROOT: &str = "#mw-content-text .mw-parser-output";
const DEFAULT_WEBDRIVER_URL: &str = "http://localhost:9515";
const DEFAULT_THEME_CLASS: &str = "skin-theme-clientpref-night";

#[derive(Debug, Deserialize)]
pub struct ConcordConfig {
    pub version: Option<String>,
    pub target: TargetConfig,
    #[serde(default)]
    pub sections: Vec<SectionCheckSpec>,
    #[serde(default)]
    pub links: Option<LinkCheckSpec>,
    #[serde(default)]
    pub theme: Option<ThemeCheckSpec>,
    #[serde(default)]
    pub webdriver: WebDriverSettings,
    #[serde(default)]
    pub http: HttpSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// The page under test and where its API lives.
#[derive(Debug, Deserialize)]
pub struct TargetConfig {
    pub page_url: String,
    /// Defaults to `<scheme>://<host>/w/api.php`.
    #[serde(default)]
    pub api_endpoint: Option<String>,
    /// Defaults to the title encoded in `page_url` (`/wiki/<title>`).
    #[serde(default)]
    pub page_title: Option<String>,
    #[serde(default = "default_content_root")]
    pub content_root: String,
    #[serde(default = "default_text_tags")]
    pub text_tags: Vec<String>,
}

impl TargetConfig {
    /// Explicit API endpoint, or the conventional MediaWiki one on the page's host.
    pub fn resolved_api_endpoint(&self) -> Result<String, ConfigError> {
        if let Some(endpoint) = &self.api_endpoint {
            return Ok(endpoint.clone());
        }
        let url = Url::parse(&self.page_url)
            .map_err(|e| ConfigError::Message(format!("target.page_url: {e}")))?;
        let host = url
            .host_str()
            .ok_or_else(|| ConfigError::Message("target.page_url has no host".into()))?;
        let port = url.port().map(|p| format!(":{p}")).unwrap_or_default();
        Ok(format!("{}://{host}{port}/w/api.php", url.scheme()))
    }
}

#[derive(Debug, Deserialize)]
pub struct SectionCheckSpec {
    pub title: String,
    #[serde(default)]
    pub scope: SectionScope,
    #[serde(default)]
    pub content: ApiContent,
}

/// Links to audit: either a CSS `container` or a rendered `section` title.
#[derive(Debug, Deserialize)]
pub struct LinkCheckSpec {
    #[serde(default)]
    pub container: Option<String>,
    #[serde(default)]
    pub section: Option<String>,
    #[serde(default)]
    pub policy: LinkCheckPolicy,
}

impl LinkCheckSpec {
    pub fn scope(&self) -> Result<LinkScope, ConfigError> {
        match (&self.container, &self.section) {
            (Some(container), None) => Ok(LinkScope::Container(container.clone())),
            (None, Some(section)) => Ok(LinkScope::Section(section.clone())),
            (Some(_), Some(_)) => Err(ConfigError::Message(
                "links: set either container or section, not both".into(),
            )),
            (None, None) => Err(ConfigError::Message(
                "links: one of container or section is required".into(),
            )),
        }
    }
}

/// Theme toggle; omitted fields fall back to the Vector 2022 night-mode controls.
#[derive(Debug, Deserialize)]
pub struct ThemeCheckSpec {
    #[serde(default = "default_theme_triggers")]
    pub triggers: Vec<String>,
    #[serde(default = "default_theme_marker")]
    pub marker: ThemeMarker,
}

#[derive(Debug, Deserialize)]
pub struct WebDriverSettings {
    #[serde(default = "default_webdriver_url")]
    pub url: String,
    #[serde(default = "default_true")]
    pub headless: bool,
}

impl Default for WebDriverSettings {
    fn default() -> Self {
        Self {
            url: default_webdriver_url(),
            headless: true,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct HttpSettings {
    /// Per-request bound; unset means requests are not bounded.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Zero by default: retrying is a caller decision.
    #[serde(default)]
    pub retries: usize,
    #[serde(default)]
    pub user_agent: Option<String>,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_secs: None,
            retries: 0,
            user_agent: None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LoggingSettings {
    #[serde(default)]
    pub format: LogFormat,
    #[serde(default = "default_true")]
    pub emit_stderr: bool,
    #[serde(default = "default_filter")]
    pub filter: String,
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            format: LogFormat::Text,
            emit_stderr: true,
            filter: default_filter(),
            dir: None,
        }
    }
}

impl LoggingSettings {
    pub fn to_log_config(&self, app_name: &str) -> LogConfig {
        LogConfig {
            app_name: app_name.to_string(),
            log_dir: self.dir.clone(),
            emit_stderr: self.emit_stderr,
            format: self.format,
            default_filter: self.filter.clone(),
        }
    }
}

fn default_content_root() -> String {
    DEFAULT_CONTENT_ROOT.into()
}
fn default_text_tags() -> Vec<String> {
    ["p", "ul", "ol", "dl", "blockquote", "pre"]
        .into_iter()
        .map(String::from)
        .collect()
}
fn default_theme_triggers() -> Vec<String> {
    vec![
        "#vector-appearance-dropdown-checkbox".into(),
        "#skin-client-pref-skin-theme-value-night".into(),
    ]
}
fn default_theme_marker() -> ThemeMarker {
    ThemeMarker::Class {
        selector: "html".into(),
        class: DEFAULT_THEME_CLASS.into(),
    }
}
fn default_webdriver_url() -> String {
    DEFAULT_WEBDRIVER_URL.into()
}
fn default_filter() -> String {
    "info".into()
}
fn default_true() -> bool {
    true
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

/// Builder hides the `config` crate wiring (YAML + env overrides).
pub struct ConcordConfigLoader {
    builder: config::ConfigBuilder<config::builder::DefaultState>,
}

impl Default for ConcordConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConcordConfigLoader {
    /// Empty loader; `CONCORD__` env overrides are layered over every file at [`load`](Self::load).
    ///
    /// ```
    /// use concord_config::ConcordConfigLoader;
    ///
    /// let config = ConcordConfigLoader::new()
    ///     .with_yaml_str("target:\n  page_url: https://en.wikipedia.org/wiki/Rust")
    ///     .load()
    ///     .expect("valid config");
    ///
    /// assert!(config.sections.is_empty());
    /// assert_eq!(config.http.retries, 0);
    /// ```
    pub fn new() -> Self {
        Self {
            builder: Config::builder(),
        }
    }

    /// Attach a required YAML/TOML/JSON file; the `config` crate infers format by suffix.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(true));
        self
    }

    /// Attach a file that may be absent, so deployments can rely purely on
    /// environment variables.
    pub fn with_optional_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(false));
        self
    }

    /// Allow tests to merge inline YAML snippets.
    ///
    /// ```
    /// use concord_common::SectionScope;
    /// use concord_config::ConcordConfigLoader;
    ///
    /// let cfg = ConcordConfigLoader::new()
    ///     .with_yaml_str(
    ///         r#"
    /// target:
    ///   page_url: "https://en.wikipedia.org/wiki/Playwright_(software)"
    /// sections:
    ///   - title: "Debugging features"
    ///     scope: immediate
    /// "#,
    ///     )
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(cfg.sections[0].scope, SectionScope::Immediate);
    /// ```
    pub fn with_yaml_str(mut self, yaml: &str) -> Self {
        self.builder = self
            .builder
            .add_source(File::from_str(yaml, config::FileFormat::Yaml));
        self
    }

    /// Consume the builder and deserialize the merged sources into strongly typed config.
    pub fn load(self) -> Result<ConcordConfig, ConfigError> {
        let cfg = self
            .builder
            .add_source(
                Environment::with_prefix("CONCORD")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut v: Value = cfg.try_deserialize()?;
        expand_env_in_value(&mut v);

        let cfg: ConcordConfig =
            serde_json::from_value(v).map_err(|e| ConfigError::Message(e.to_string()))?;
        if let Some(links) = &cfg.links {
            links.scope()?;
        }
        Ok(cfg)
    }
}
