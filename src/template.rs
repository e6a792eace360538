//! `{{NAME}}` placeholder substitution for the SPA entry template.
//!
//! A token is `{{`, optional whitespace, one or more `[A-Za-z0-9_]`, optional
//! whitespace, `}}`. Tokens whose name has no value are copied through
//! untouched so newer templates keep working against older tables.

use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::sync::LazyLock;

/// How a placeholder gets its value.
#[derive(Debug, Clone, PartialEq)]
pub enum Placeholder {
    Literal(String),
    /// Read from the environment at render time, `suffix` appended.
    Env {
        var: String,
        suffix: String,
        fallback: String,
    },
}

impl Placeholder {
    pub fn literal(value: impl Into<String>) -> Self {
        Placeholder::Literal(value.into())
    }

    pub fn resolve(&self) -> String {
        match self {
            Placeholder::Literal(v) => v.clone(),
            Placeholder::Env { var, suffix, fallback } => {
                let base = std::env::var(var).unwrap_or_else(|_| fallback.clone());
                format!("{}{}", base, suffix)
            }
        }
    }
}

/// Request-derived inputs for the development table. Rebuilt per request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub hostname: String,
    pub port: u16,
    pub livereload_port: u16,
    /// Contents of the language-support file, already parsed.
    pub supported_languages: serde_json::Value,
    pub websocket_host: String,
}

#[derive(Debug, Clone, Default)]
pub struct PlaceholderTable {
    entries: BTreeMap<String, Placeholder>,
}

impl PlaceholderTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Placeholder) -> &mut Self {
        self.entries.insert(name.into(), value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Placeholder> {
        self.entries.get(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn render(&self, template: &str) -> String {
        substitute(template, |name| self.get(name).map(Placeholder::resolve))
    }

    /// Table used by the dev server's SPA handler.
    pub fn development(ctx: &RequestContext, extra: &BTreeMap<String, String>) -> Self {
        let mut table = Self::new();
        table
            .insert("CDN_SERVICE", Placeholder::literal(format!("//{}:{}/", ctx.hostname, ctx.port)))
            .insert(
                "LIVE_RELOAD",
                Placeholder::literal(format!(
                    "<script async src=\"//{}:{}/livereload.js\"></script>",
                    ctx.hostname, ctx.livereload_port
                )),
            )
            .insert(
                "SUPPORTED_LANGUAGES",
                Placeholder::literal(ctx.supported_languages.to_string()),
            )
            .insert(
                "EXTRA_CONFIG",
                Placeholder::literal(format!(
                    "<script>window['websocket_host'] = \"{}\";</script>",
                    ctx.websocket_host
                )),
            );

        for name in [
            "MIN",
            "OG_TITLE",
            "OG_URL",
            "OG_IMAGE",
            "OG_DESCRIPTION",
            "RELEASE",
            "VERSION",
            "LANGUAGE_VERSION",
        ] {
            table.insert(name, Placeholder::literal(""));
        }
        for name in [
            "VENDOR_HASH_DOTJS",
            "VERSION_DOTJS",
            "OGS_VERSION_HASH_DOTJS",
            "LANGUAGE_VERSION_DOTJS",
        ] {
            table.insert(name, Placeholder::literal("js"));
        }
        table.insert("VERSION_DOTCSS", Placeholder::literal("css"));

        for (name, value) in extra {
            table.insert(name.clone(), Placeholder::literal(value.clone()));
        }
        table
    }

    /// Table for the production index: only the bundle hashes are filled,
    /// every other token is left for the deployment step.
    pub fn production() -> Self {
        let mut table = Self::new();
        table
            .insert("VENDOR_HASH_DOTJS", env_js("VENDOR_HASH"))
            .insert("OGS_VERSION_HASH_DOTJS", env_js("OGS_VERSION_HASH"));
        table
    }
}

fn env_js(var: &str) -> Placeholder {
    Placeholder::Env {
        var: var.to_string(),
        suffix: ".js".to_string(),
        fallback: "undefined".to_string(),
    }
}

static TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[{][{]\s*([A-Za-z0-9_]+)\s*[}][}]").expect("token regex compiles"));

/// Replace every `{{NAME}}` token in one left-to-right pass. `lookup`
/// returning `None` keeps the token's original text, whitespace included.
pub fn substitute<F>(template: &str, mut lookup: F) -> String
where
    F: FnMut(&str) -> Option<String>,
{
    TOKEN
        .replace_all(template, |caps: &Captures| {
            lookup(&caps[1]).unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(pairs: &[(&str, &str)]) -> PlaceholderTable {
        let mut t = PlaceholderTable::new();
        for (k, v) in pairs {
            t.insert(*k, Placeholder::literal(*v));
        }
        t
    }

    #[test]
    fn test_known_replaced_unknown_kept() {
        let t = table(&[("MIN", "")]);
        assert_eq!(t.render("{{MIN}} and {{UNKNOWN}}"), " and {{UNKNOWN}}");
    }

    #[test]
    fn test_every_occurrence_replaced() {
        let t = table(&[("A", "x")]);
        assert_eq!(t.render("{{A}}-{{A}}-{{ A }}"), "x-x-x");
    }

    #[test]
    fn test_whitespace_tolerated_and_preserved_when_unknown() {
        let t = table(&[("NAME", "v")]);
        assert_eq!(t.render("{{  NAME\t}}"), "v");
        assert_eq!(t.render("{{ OTHER }}"), "{{ OTHER }}");
    }

    #[test]
    fn test_malformed_tokens_pass_through() {
        let t = table(&[("A", "x")]);
        assert_eq!(t.render("{{}} {{A-B}} {{A"), "{{}} {{A-B}} {{A");
        assert_eq!(t.render("{{{A}}}"), "{x}");
    }

    #[test]
    fn test_adjacent_and_wrapped_tokens() {
        let t = table(&[("A", "x")]);
        assert_eq!(t.render("{{A}}{{A}}"), "xx");
        assert_eq!(t.render("{{ {{A}} }}"), "{{ x }}");
    }

    #[test]
    fn test_single_pass_does_not_rescan_values() {
        let t = table(&[("A", "{{B}}"), ("B", "nope")]);
        assert_eq!(t.render("{{A}}"), "{{B}}");
    }

    #[test]
    fn test_multibyte_text_untouched() {
        let t = table(&[("A", "ok")]);
        assert_eq!(t.render("囲碁 {{A}} ✓"), "囲碁 ok ✓");
    }

    #[test]
    fn test_development_table() {
        let ctx = RequestContext {
            hostname: "dev.example".to_string(),
            port: 8080,
            livereload_port: 35701,
            supported_languages: serde_json::json!({"en": "English"}),
            websocket_host: "https://beta.example".to_string(),
        };
        let mut extra = BTreeMap::new();
        extra.insert("AMEX_ENV".to_string(), "qa".to_string());
        let t = PlaceholderTable::development(&ctx, &extra);

        assert_eq!(t.render("{{CDN_SERVICE}}"), "//dev.example:8080/");
        assert_eq!(
            t.render("{{LIVE_RELOAD}}"),
            "<script async src=\"//dev.example:35701/livereload.js\"></script>"
        );
        assert_eq!(t.render("{{SUPPORTED_LANGUAGES}}"), r#"{"en":"English"}"#);
        assert_eq!(t.render("a.{{VERSION_DOTJS}} b.{{VERSION_DOTCSS}}"), "a.js b.css");
        assert_eq!(t.render("[{{OG_TITLE}}]"), "[]");
        assert_eq!(t.render("{{AMEX_ENV}}"), "qa");
        assert!(t.render("{{EXTRA_CONFIG}}").contains("\"https://beta.example\""));
    }

    #[test]
    fn test_production_table_reads_env() {
        std::env::set_var("OGS_VERSION_HASH", "abc123");
        let t = PlaceholderTable::production();
        assert_eq!(t.render("ogs.{{OGS_VERSION_HASH_DOTJS}}"), "ogs.abc123.js");
        assert_eq!(t.render("{{MIN}}"), "{{MIN}}");
    }

    #[test]
    fn test_env_placeholder_fallback() {
        let p = Placeholder::Env {
            var: "OGS_DEV_TEST_SURELY_UNSET".to_string(),
            suffix: ".js".to_string(),
            fallback: "undefined".to_string(),
        };
        assert_eq!(p.resolve(), "undefined.js");
    }
}
