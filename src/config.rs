use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

const ENV_FILE: &str = ".env";
pub const DEFAULT_CONFIG_FILE: &str = "ogs-dev.toml";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub livereload: LiveReloadConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub locale: LocaleConfig,
    #[serde(default)]
    pub template: TemplateConfig,
    #[serde(default)]
    pub style: StyleConfig,
    #[serde(default)]
    pub watch: WatchConfig,
    #[serde(default)]
    pub bundler: BundlerConfig,
    #[serde(default)]
    pub lint: LintConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_server_port")]
    pub port: u16,
    /// Hostname printed in the startup banner.
    #[serde(default = "default_public_host")]
    pub public_host: String,
    /// Directories served as-is, checked in order before any other route.
    #[serde(default = "default_static_dirs")]
    pub static_dirs: Vec<PathBuf>,
}

fn default_server_port() -> u16 { 8080 }
fn default_public_host() -> String { "dev.beta.online-go.com".to_string() }
fn default_static_dirs() -> Vec<PathBuf> {
    vec![PathBuf::from("dist"), PathBuf::from("assets")]
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_server_port(),
            public_host: default_public_host(),
            static_dirs: default_static_dirs(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LiveReloadConfig {
    #[serde(default = "default_livereload_port")]
    pub port: u16,
}

fn default_livereload_port() -> u16 { 35701 }

impl Default for LiveReloadConfig {
    fn default() -> Self {
        Self { port: default_livereload_port() }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProxyConfig {
    /// Origin used by routes that don't name their own.
    #[serde(default = "default_proxy_origin")]
    pub origin: String,
    #[serde(default = "default_proxy_routes")]
    pub routes: Vec<RouteConfig>,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct RouteConfig {
    pub prefix: String,
    pub origin: Option<String>,
    /// Defaults to `prefix` when omitted.
    pub remote_prefix: Option<String>,
}

fn default_proxy_origin() -> String { "https://beta.online-go.com".to_string() }

fn default_proxy_routes() -> Vec<RouteConfig> {
    [
        "/api",
        "/termination-api",
        "/merchant",
        "/sso",
        "/oauth2",
        "/complete",
        "/disconnect",
        "/OGSScoreEstimator",
    ]
    .iter()
    .map(|prefix| RouteConfig {
        prefix: prefix.to_string(),
        origin: None,
        remote_prefix: None,
    })
    .collect()
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            origin: default_proxy_origin(),
            routes: default_proxy_routes(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LocaleConfig {
    #[serde(default = "default_locale_prefix")]
    pub prefix: String,
    #[serde(default = "default_locale_origin")]
    pub origin: String,
}

fn default_locale_prefix() -> String { "/locale".to_string() }
fn default_locale_origin() -> String {
    "http://storage.googleapis.com/ogs-site-files/dev".to_string()
}

impl Default for LocaleConfig {
    fn default() -> Self {
        Self {
            prefix: default_locale_prefix(),
            origin: default_locale_origin(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct TemplateConfig {
    #[serde(default = "default_index_path")]
    pub index: PathBuf,
    #[serde(default = "default_languages_path")]
    pub languages: PathBuf,
    #[serde(default = "default_websocket_host")]
    pub websocket_host: String,
    /// Additional literal placeholders for the development table.
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

fn default_index_path() -> PathBuf { PathBuf::from("src/index.html") }
fn default_languages_path() -> PathBuf { PathBuf::from("i18n/languages.json") }
fn default_websocket_host() -> String { "https://beta.online-go.com".to_string() }

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            index: default_index_path(),
            languages: default_languages_path(),
            websocket_host: default_websocket_host(),
            extra: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SvgEncoding {
    #[default]
    Uri,
    Base64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StyleConfig {
    #[serde(default = "default_style_entry")]
    pub entry: PathBuf,
    #[serde(default = "default_style_out_dir")]
    pub out_dir: PathBuf,
    /// Output file stem: `<stem>.css` / `<stem>.<version>.css`.
    #[serde(default = "default_style_stem")]
    pub stem: String,
    /// Compiler for non-`.css` entries. `.css` entries, or an empty
    /// command, use the built-in bundler.
    #[serde(default = "default_style_compiler")]
    pub compiler: Vec<String>,
    #[serde(default = "default_version_command")]
    pub version_command: Vec<String>,
    #[serde(default = "default_version_fallback")]
    pub version_fallback: String,
    #[serde(default)]
    pub svg_encoding: SvgEncoding,
}

fn default_style_entry() -> PathBuf { PathBuf::from("src/ogs.styl") }
fn default_style_out_dir() -> PathBuf { PathBuf::from("dist") }
fn default_style_stem() -> String { "ogs".to_string() }
fn default_style_compiler() -> Vec<String> {
    ["npx", "stylus", "--include-css", "--print"].iter().map(|s| s.to_string()).collect()
}
fn default_version_command() -> Vec<String> {
    vec!["git".to_string(), "describe".to_string(), "--long".to_string()]
}
fn default_version_fallback() -> String { "min".to_string() }

impl Default for StyleConfig {
    fn default() -> Self {
        Self {
            entry: default_style_entry(),
            out_dir: default_style_out_dir(),
            stem: default_style_stem(),
            compiler: default_style_compiler(),
            version_command: default_version_command(),
            version_fallback: default_version_fallback(),
            svg_encoding: SvgEncoding::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct WatchConfig {
    #[serde(default = "default_reload_globs")]
    pub reload: Vec<String>,
    #[serde(default = "default_style_globs")]
    pub styles: Vec<String>,
    #[serde(default = "default_lint_globs")]
    pub lint: Vec<String>,
}

fn default_reload_globs() -> Vec<String> {
    vec!["dist/*.js".to_string(), "src/*.html".to_string()]
}
fn default_style_globs() -> Vec<String> {
    vec!["src/**/*.styl".to_string(), "src/*.styl".to_string()]
}
fn default_lint_globs() -> Vec<String> {
    vec!["src/**/*.ts".to_string(), "src/**/*.tsx".to_string()]
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            reload: default_reload_globs(),
            styles: default_style_globs(),
            lint: default_lint_globs(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct BundlerConfig {
    #[serde(default = "default_bundler_command")]
    pub command: Vec<String>,
    /// Delay between an exit and the next spawn. Unset respawns immediately.
    #[serde(default)]
    pub restart_backoff_ms: Option<u64>,
}

fn default_bundler_command() -> Vec<String> {
    [
        "node",
        "node_modules/webpack/bin/webpack.js",
        "--watch",
        "--progress",
        "--colors",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for BundlerConfig {
    fn default() -> Self {
        Self {
            command: default_bundler_command(),
            restart_backoff_ms: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LintConfig {
    #[serde(default = "default_lint_command")]
    pub command: Vec<String>,
    #[serde(default = "default_lint_debounce")]
    pub debounce_ms: u64,
}

fn default_lint_command() -> Vec<String> {
    [
        "npx",
        "tslint",
        "--project",
        "tsconfig.json",
        "--format",
        "stylish",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
fn default_lint_debounce() -> u64 { 50 }

impl Default for LintConfig {
    fn default() -> Self {
        Self {
            command: default_lint_command(),
            debounce_ms: default_lint_debounce(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .with_context(|| "Failed to parse config TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Missing file means stock settings; a file that exists but doesn't
    /// parse is still an error.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            Ok(Self::default())
        }
    }

    fn validate(&self) -> Result<()> {
        for route in &self.proxy.routes {
            if !route.prefix.starts_with('/') {
                anyhow::bail!("proxy route prefix must start with '/': {:?}", route.prefix);
            }
        }
        if !self.locale.prefix.starts_with('/') {
            anyhow::bail!("locale prefix must start with '/': {:?}", self.locale.prefix);
        }
        if self.bundler.command.is_empty() {
            anyhow::bail!("bundler.command cannot be empty");
        }
        if self.lint.command.is_empty() {
            anyhow::bail!("lint.command cannot be empty");
        }
        Ok(())
    }

    /// Load .env file into process environment. Real env vars take precedence.
    pub fn load_env_file() {
        let content = match std::fs::read_to_string(ENV_FILE) {
            Ok(c) => c,
            Err(_) => return,
        };
        for (key, value) in parse_env(&content) {
            if std::env::var(&key).is_err() {
                std::env::set_var(key, value);
            }
        }
    }
}

/// Parse `KEY=VALUE` lines, skipping blanks and `#` comments.
fn parse_env(content: &str) -> Vec<(String, String)> {
    // Strip BOM if present (common on Windows-created files)
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let mut out = Vec::new();
    for line in content.lines() {
        let line = line.trim().trim_matches('\r');
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            let key = sanitize_value(key);
            let value = sanitize_value(value.trim().trim_matches('"').trim_matches('\''));
            if !key.is_empty() {
                out.push((key, value));
            }
        }
    }
    out
}

/// Strip carriage returns, BOM, and other invisible chars.
fn sanitize_value(raw: &str) -> String {
    raw.replace(['\r', '\u{feff}', '\u{200b}'], "")
        .trim()
        .to_string()
}
