//! Cost-safety gates
//!
//! The pause switch and daily cap are operator-mutable at runtime, so they
//! sit behind a trait the loop consults on every iteration instead of a
//! value captured at startup. Gate states are backpressure, not errors: a
//! paused or capped worker idles while search and browse stay fully
//! functional.

use tagboard_common::config::env_var;

/// Per-iteration policy checks for the worker loop.
pub trait WorkerGates: Send + Sync {
    /// When true the loop claims nothing and sleeps.
    fn paused(&self) -> bool;

    /// Maximum jobs allowed to finish per UTC day.
    fn daily_cap(&self) -> u32;
}

/// Environment-backed gates: `TAGBOARD_PAUSED` and `TAGBOARD_DAILY_CAP`,
/// re-read on every call so an operator can flip them without a restart.
pub struct EnvGates {
    default_cap: u32,
}

impl EnvGates {
    pub fn new(default_cap: u32) -> Self {
        Self { default_cap }
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

impl WorkerGates for EnvGates {
    fn paused(&self) -> bool {
        env_var("TAGBOARD_PAUSED").is_some_and(|v| is_truthy(&v))
    }

    fn daily_cap(&self) -> u32 {
        env_var("TAGBOARD_DAILY_CAP")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(self.default_cap)
    }
}

/// Fixed-value gates for tests.
#[derive(Debug, Clone, Copy)]
pub struct StaticGates {
    pub paused: bool,
    pub daily_cap: u32,
}

impl WorkerGates for StaticGates {
    fn paused(&self) -> bool {
        self.paused
    }

    fn daily_cap(&self) -> u32 {
        self.daily_cap
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthy_values() {
        for v in ["1", "true", "TRUE", "yes", "On"] {
            assert!(is_truthy(v), "{v} should pause");
        }
        for v in ["0", "false", "off", "", "no"] {
            assert!(!is_truthy(v), "{v} should not pause");
        }
    }

    #[test]
    fn env_gates_fall_back_to_default_cap() {
        std::env::remove_var("TAGBOARD_DAILY_CAP");
        let gates = EnvGates::new(200);
        assert_eq!(gates.daily_cap(), 200);
    }
}
