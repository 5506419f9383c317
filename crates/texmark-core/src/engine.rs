//! TeX to MathML conversion backends.
//!
//! The parser never converts math itself. A [`MathEngine`] receives the raw
//! TeX of one region and returns markup for it, either in text style (inline
//! regions) or display style.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, PoisonError};

use lru::LruCache;
use pulldown_latex::{
    Parser, Storage, config::DisplayMode, config::RenderConfig, mathml::push_mathml,
};
use thiserror::Error;

/// Failure to convert one math region.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum RenderError {
    #[error("invalid TeX: {message}")]
    InvalidTex { message: String },
    #[error("failed to write MathML: {message}")]
    Write { message: String },
}

/// Converts TeX source into markup.
pub trait MathEngine {
    fn text_style(&self, tex: &str) -> Result<String, RenderError>;
    fn display_style(&self, tex: &str) -> Result<String, RenderError>;
}

impl<E: MathEngine + ?Sized> MathEngine for Box<E> {
    fn text_style(&self, tex: &str) -> Result<String, RenderError> {
        (**self).text_style(tex)
    }

    fn display_style(&self, tex: &str) -> Result<String, RenderError> {
        (**self).display_style(tex)
    }
}

/// Macro name to expansion, fixed at construction and shared read-only.
///
/// Expansion is one textual pass over the input: every control word
/// `\name` with an entry in the table is replaced by its expansion. The
/// replacement text is not rescanned and macros take no arguments.
#[derive(Clone, Debug, Default)]
pub struct MacroTable {
    macros: Arc<HashMap<String, String>>,
}

impl MacroTable {
    pub fn new<I, K, V>(macros: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let macros = macros
            .into_iter()
            .map(|(name, expansion)| {
                let name = name.into();
                let name = name.strip_prefix('\\').map(str::to_string).unwrap_or(name);
                (name, expansion.into())
            })
            .collect();
        Self {
            macros: Arc::new(macros),
        }
    }

    pub fn len(&self) -> usize {
        self.macros.len()
    }

    pub fn is_empty(&self) -> bool {
        self.macros.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.macros.get(name).map(String::as_str)
    }

    pub fn expand(&self, tex: &str) -> String {
        if self.macros.is_empty() || !tex.contains('\\') {
            return tex.to_string();
        }
        let bytes = tex.as_bytes();
        let mut out = String::with_capacity(tex.len());
        let mut last = 0;
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] != b'\\' {
                i += 1;
                continue;
            }
            let name_start = i + 1;
            let mut name_end = name_start;
            while name_end < bytes.len() && bytes[name_end].is_ascii_alphabetic() {
                name_end += 1;
            }
            if name_end == name_start {
                // Control symbol such as `\\` or `\{`; never a macro name.
                i = (name_start + 1).min(bytes.len());
                continue;
            }
            if let Some(expansion) = self.macros.get(&tex[name_start..name_end]) {
                out.push_str(&tex[last..i]);
                out.push_str(expansion);
                last = name_end;
            }
            i = name_end;
        }
        out.push_str(&tex[last..]);
        out
    }
}

/// MathML engine backed by `pulldown-latex`.
#[derive(Clone, Debug, Default)]
pub struct LatexEngine {
    macros: MacroTable,
}

impl LatexEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_macros(macros: MacroTable) -> Self {
        Self { macros }
    }

    fn convert(&self, tex: &str, display_mode: DisplayMode) -> Result<String, RenderError> {
        let expanded = self.macros.expand(tex);
        let storage = Storage::new();
        let parser = Parser::new(&expanded, &storage);
        let config = RenderConfig {
            display_mode,
            ..Default::default()
        };

        let events: Vec<_> = parser.collect();
        let errors: Vec<String> = events
            .iter()
            .filter_map(|event| event.as_ref().err().map(|err| err.to_string()))
            .collect();
        if !errors.is_empty() {
            return Err(RenderError::InvalidTex {
                message: errors.join("; "),
            });
        }

        let mut mathml = String::new();
        push_mathml(&mut mathml, events.into_iter(), config).map_err(|err| {
            RenderError::Write {
                message: err.to_string(),
            }
        })?;
        Ok(mathml)
    }
}

impl MathEngine for LatexEngine {
    fn text_style(&self, tex: &str) -> Result<String, RenderError> {
        self.convert(tex, DisplayMode::Inline)
    }

    fn display_style(&self, tex: &str) -> Result<String, RenderError> {
        self.convert(tex, DisplayMode::Block)
    }
}

type CacheKey = (String, bool); // (source, is_display_mode)

/// Memoizes successful conversions of an inner engine.
///
/// The cache belongs to this instance; two documents rendered with two
/// engines never observe each other's entries.
pub struct CachedEngine<E> {
    inner: E,
    cache: Mutex<LruCache<CacheKey, String>>,
}

impl<E: MathEngine> CachedEngine<E> {
    pub fn new(inner: E, capacity: NonZeroUsize) -> Self {
        Self {
            inner,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn inner(&self) -> &E {
        &self.inner
    }

    fn cached(
        &self,
        tex: &str,
        display: bool,
        render: impl FnOnce(&E, &str) -> Result<String, RenderError>,
    ) -> Result<String, RenderError> {
        let key = (tex.to_string(), display);
        if let Some(hit) = self.lock().get(&key) {
            return Ok(hit.clone());
        }
        let rendered = render(&self.inner, tex)?;
        self.lock().put(key, rendered.clone());
        Ok(rendered)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LruCache<CacheKey, String>> {
        // Entries are complete strings, so a poisoned cache is still usable.
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<E: MathEngine> MathEngine for CachedEngine<E> {
    fn text_style(&self, tex: &str) -> Result<String, RenderError> {
        self.cached(tex, false, |engine, tex| engine.text_style(tex))
    }

    fn display_style(&self, tex: &str) -> Result<String, RenderError> {
        self.cached(tex, true, |engine, tex| engine.display_style(tex))
    }
}
