//! Renderer configuration.

use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderConfig {
    /// Panic on pool consistency violations instead of logging them.
    pub strict_pools: bool,
    /// Nesting depth after which key hashing falls back to identity tokens.
    pub max_key_depth: usize,
    /// Thunks nested deeper than this fail the render.
    pub max_thunk_depth: usize,
    /// Detached units retained per content slot; `None` keeps all of them.
    pub detached_capacity: Option<usize>,
    /// Record the ordered mutation journal on the tree.
    pub record_mutations: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            strict_pools: cfg!(debug_assertions),
            max_key_depth: 32,
            max_thunk_depth: 64,
            detached_capacity: None,
            record_mutations: false,
        }
    }
}

impl RenderConfig {
    /// Defaults overlaid with `WEAVE_*` environment variables.
    ///
    /// Unparseable values are logged and ignored.
    pub fn from_env() -> Self {
        Self::default().overlay(|name| std::env::var(name).ok())
    }

    fn overlay(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(v) = parse_var(&lookup, "WEAVE_STRICT_POOLS", parse_flag) {
            self.strict_pools = v;
        }
        if let Some(v) = parse_var(&lookup, "WEAVE_MAX_KEY_DEPTH", usize::from_str) {
            self.max_key_depth = v;
        }
        if let Some(v) = parse_var(&lookup, "WEAVE_MAX_THUNK_DEPTH", usize::from_str) {
            self.max_thunk_depth = v;
        }
        if let Some(raw) = lookup("WEAVE_DETACHED_CAPACITY") {
            match raw.trim() {
                "" | "none" | "unbounded" => self.detached_capacity = None,
                other => match other.parse() {
                    Ok(v) => self.detached_capacity = Some(v),
                    Err(_) => log::warn!("ignoring WEAVE_DETACHED_CAPACITY={raw:?}"),
                },
            }
        }
        if let Some(v) = parse_var(&lookup, "WEAVE_RECORD_MUTATIONS", parse_flag) {
            self.record_mutations = v;
        }
        self
    }

    pub fn with_strict_pools(mut self, strict: bool) -> Self {
        self.strict_pools = strict;
        self
    }

    pub fn with_max_key_depth(mut self, depth: usize) -> Self {
        self.max_key_depth = depth;
        self
    }

    pub fn with_max_thunk_depth(mut self, depth: usize) -> Self {
        self.max_thunk_depth = depth;
        self
    }

    pub fn with_detached_capacity(mut self, capacity: Option<usize>) -> Self {
        self.detached_capacity = capacity;
        self
    }

    pub fn with_record_mutations(mut self, record: bool) -> Self {
        self.record_mutations = record;
        self
    }
}

fn parse_flag(raw: &str) -> Result<bool, ()> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(()),
    }
}

fn parse_var<T, E>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    parse: impl Fn(&str) -> Result<T, E>,
) -> Option<T> {
    let raw = lookup(name)?;
    match parse(raw.trim()) {
        Ok(value) => Some(value),
        Err(_) => {
            log::warn!("ignoring {name}={raw:?}");
            None
        }
    }
}
