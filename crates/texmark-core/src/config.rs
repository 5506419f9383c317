use std::collections::BTreeMap;
use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::engine::{CachedEngine, LatexEngine, MacroTable};
use crate::render::{MathFallback, MathRenderer};

/// Number of distinct (source, style) pairs kept by the default cache.
pub const DEFAULT_CACHE_SIZE: usize = 256;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid configuration: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("macro definition `{0}` must look like NAME=EXPANSION")]
    MacroArg(String),
}

/// Settings read from `texmark.toml`.
///
/// ```toml
/// fallback = "source"
/// sanitize = true
/// cache_size = 128
///
/// [macros]
/// R = "\\mathbb{R}"
/// ```
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub fallback: MathFallback,
    pub sanitize: bool,
    /// Zero disables caching.
    pub cache_size: usize,
    pub macros: BTreeMap<String, String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            fallback: MathFallback::default(),
            sanitize: false,
            cache_size: DEFAULT_CACHE_SIZE,
            macros: BTreeMap::new(),
        }
    }
}

impl Config {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        debug!(path = %path.display(), macros = config.macros.len(), "loaded config");
        Ok(config)
    }

    /// Adds a `NAME=EXPANSION` definition, replacing any earlier one.
    pub fn define_macro(&mut self, definition: &str) -> Result<(), ConfigError> {
        let (name, expansion) = parse_macro_arg(definition)?;
        self.macros.insert(name.to_string(), expansion.to_string());
        Ok(())
    }

    pub fn macro_table(&self) -> MacroTable {
        MacroTable::new(
            self.macros
                .iter()
                .map(|(name, expansion)| (name.clone(), expansion.clone())),
        )
    }

    /// Builds a renderer backed by [`LatexEngine`], cached unless
    /// `cache_size` is zero.
    pub fn renderer(&self) -> MathRenderer {
        let engine = LatexEngine::with_macros(self.macro_table());
        let renderer = match NonZeroUsize::new(self.cache_size) {
            Some(capacity) => MathRenderer::new(CachedEngine::new(engine, capacity)),
            None => MathRenderer::new(engine),
        };
        renderer.with_fallback(self.fallback)
    }
}

/// Splits `NAME=EXPANSION`. The name may carry a leading backslash.
pub fn parse_macro_arg(definition: &str) -> Result<(&str, &str), ConfigError> {
    let Some((name, expansion)) = definition.split_once('=') else {
        return Err(ConfigError::MacroArg(definition.to_string()));
    };
    let name = name.trim();
    let bare = name.strip_prefix('\\').unwrap_or(name);
    if bare.is_empty() || !bare.chars().all(|ch| ch.is_ascii_alphabetic()) {
        return Err(ConfigError::MacroArg(definition.to_string()));
    }
    Ok((bare, expansion))
}

#[cfg(test)]
mod tests {
    use super::{Config, ConfigError, DEFAULT_CACHE_SIZE, parse_macro_arg};
    use crate::render::MathFallback;

    #[test]
    fn empty_file_is_default() {
        let config = Config::from_toml_str("").expect("parse");
        assert_eq!(config, Config::default());
        assert_eq!(config.cache_size, DEFAULT_CACHE_SIZE);
    }

    #[test]
    fn reads_all_keys() {
        let config = Config::from_toml_str(
            "fallback = \"empty\"\nsanitize = true\ncache_size = 0\n\n[macros]\nR = '\\mathbb{R}'\n",
        )
        .expect("parse");
        assert_eq!(config.fallback, MathFallback::Empty);
        assert!(config.sanitize);
        assert_eq!(config.cache_size, 0);
        assert_eq!(config.macro_table().get("R"), Some("\\mathbb{R}"));
    }

    #[test]
    fn rejects_unknown_keys() {
        let err = Config::from_toml_str("theme = \"dark\"\n").expect_err("unknown key");
        assert!(matches!(err, ConfigError::Toml(_)));
        let err = Config::from_toml_str("fallback = \"loud\"\n").expect_err("bad value");
        assert!(matches!(err, ConfigError::Toml(_)));
    }

    #[test]
    fn macro_args() {
        assert_eq!(parse_macro_arg("R=\\mathbb{R}").ok(), Some(("R", "\\mathbb{R}")));
        assert_eq!(parse_macro_arg("\\eps=\\varepsilon").ok(), Some(("eps", "\\varepsilon")));
        // Only the first `=` separates.
        assert_eq!(parse_macro_arg("eq=a=b").ok(), Some(("eq", "a=b")));
        assert!(parse_macro_arg("novalue").is_err());
        assert!(parse_macro_arg("=x").is_err());
        assert!(parse_macro_arg("a1=x").is_err());
    }

    #[test]
    fn command_line_macros_override_file() {
        let mut config = Config::from_toml_str("[macros]\nR = 'x'\n").expect("parse");
        config.define_macro("R=y").expect("define");
        assert_eq!(config.macro_table().get("R"), Some("y"));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = Config::load(std::path::Path::new("/nonexistent/texmark.toml"))
            .expect_err("missing");
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn renderer_uses_macros() {
        let mut config = Config::default();
        config.define_macro("R=\\mathbb{R}").expect("define");
        let renderer = config.renderer();
        let unit = crate::math::MathUnit::new("\\R", crate::delimiter::Flavor::INLINE_DOLLAR);
        let markup = renderer.render(&unit).expect("render");
        assert!(markup.contains("<math"));
        assert!(markup.contains("ℝ") || markup.contains("mathvariant"));
    }
}
