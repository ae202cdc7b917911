//! Environment variable-based configuration for the coroutine runtime.
//!
//! ## `WAYMARK_STACK_SIZE`
//!
//! Sets the stack size for request-handling coroutines. Accepts values in:
//! - Decimal: `65536` (64 KB)
//! - Hexadecimal: `0x10000` (64 KB)
//!
//! Default: `0x10000` (64 KB). Larger stacks support deeper call chains in
//! handlers; smaller stacks reduce memory for many concurrent connections.

use std::env;

/// Runtime configuration loaded from environment variables.
///
/// Load this at startup using [`RuntimeConfig::from_env()`] before starting
/// the server.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeConfig {
    /// Stack size for coroutines in bytes (default: 64 KB / 0x10000)
    pub stack_size: usize,
}

impl RuntimeConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let stack_size = match env::var("WAYMARK_STACK_SIZE") {
            Ok(val) => {
                if let Some(hex) = val.strip_prefix("0x") {
                    usize::from_str_radix(hex, 16).unwrap_or(0x10000)
                } else {
                    val.parse().unwrap_or(0x10000)
                }
            }
            Err(_) => 0x10000,
        };

        RuntimeConfig { stack_size }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            stack_size: 0x10000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_stack_size() {
        assert_eq!(RuntimeConfig::default().stack_size, 0x10000);
    }
}
