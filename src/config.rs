//! Interpreter limits and switches.
//!
//! [`InterpreterConfig::from_env`] reads overrides from the environment:
//!
//! - `MICHELSON_GAS_LIMIT`: gas available to one run
//! - `MICHELSON_TRACE`: `1`/`true` to record every executed instruction
//! - `MICHELSON_MAX_DEPTH`: deepest nesting of blocks and lambdas
//! - `MICHELSON_LOG`: least severe log level printed (`info`, `warn`, `error`)

use crate::micheline::MAX_NESTING;
use crate::utils::log::{self, Level};
use crate::warn;
use std::env;
use std::str::FromStr;

/// Gas available to a run unless configured otherwise.
pub const DEFAULT_GAS_LIMIT: u64 = 1_040_000;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InterpreterConfig {
    pub gas_limit: u64,
    pub trace: bool,
    pub max_depth: usize,
    pub log_level: Level,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            gas_limit: DEFAULT_GAS_LIMIT,
            trace: false,
            max_depth: MAX_NESTING,
            log_level: Level::Info,
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

fn parse_num<T: FromStr>(raw: &str) -> Option<T> {
    raw.trim().parse().ok()
}

/// Applies `parse` to `raw`, keeping `current` (with a warning) when it fails.
fn override_with<T>(name: &str, raw: Option<String>, current: T, parse: impl Fn(&str) -> Option<T>) -> T {
    let Some(raw) = raw else {
        return current;
    };
    match parse(&raw) {
        Some(value) => value,
        None => {
            warn!("ignoring invalid {}={:?}", name, raw);
            current
        }
    }
}

impl InterpreterConfig {
    /// Defaults overridden by the `MICHELSON_*` environment variables.
    ///
    /// Also applies the configured log level to the process logger.
    pub fn from_env() -> Self {
        let config = Self::from_lookup(|name| env::var(name).ok());
        log::set_min_level(config.log_level);
        config
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            gas_limit: override_with(
                "MICHELSON_GAS_LIMIT",
                lookup("MICHELSON_GAS_LIMIT"),
                defaults.gas_limit,
                parse_num,
            ),
            trace: override_with("MICHELSON_TRACE", lookup("MICHELSON_TRACE"), defaults.trace, parse_bool),
            max_depth: override_with(
                "MICHELSON_MAX_DEPTH",
                lookup("MICHELSON_MAX_DEPTH"),
                defaults.max_depth,
                |raw| parse_num(raw).filter(|d: &usize| *d > 0),
            ),
            log_level: override_with("MICHELSON_LOG", lookup("MICHELSON_LOG"), defaults.log_level, |raw| {
                raw.parse().ok()
            }),
        }
    }

    pub fn with_gas_limit(mut self, gas_limit: u64) -> Self {
        self.gas_limit = gas_limit;
        self
    }

    pub fn with_trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn defaults_without_overrides() {
        assert_eq!(InterpreterConfig::from_lookup(lookup(&[])), InterpreterConfig::default());
    }

    #[test]
    fn reads_every_variable() {
        let config = InterpreterConfig::from_lookup(lookup(&[
            ("MICHELSON_GAS_LIMIT", "500"),
            ("MICHELSON_TRACE", "true"),
            ("MICHELSON_MAX_DEPTH", "12"),
            ("MICHELSON_LOG", "warn"),
        ]));
        assert_eq!(config.gas_limit, 500);
        assert!(config.trace);
        assert_eq!(config.max_depth, 12);
        assert_eq!(config.log_level, Level::Warn);
    }

    #[test]
    fn invalid_values_keep_defaults() {
        let config = InterpreterConfig::from_lookup(lookup(&[
            ("MICHELSON_GAS_LIMIT", "lots"),
            ("MICHELSON_TRACE", "maybe"),
            ("MICHELSON_MAX_DEPTH", "0"),
            ("MICHELSON_LOG", "chatty"),
        ]));
        assert_eq!(config, InterpreterConfig::default());
    }
}
