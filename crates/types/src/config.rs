//! Environment-driven configuration, read once at startup.
//!
//! The engine owns its configuration explicitly; nothing in the workspace
//! consults the environment after construction.

use crate::{DEFAULT_MAX_PAYLOAD_SIZE, DEFAULT_MAX_STRING_LENGTH};

/// How inspect results flagged sensitive are framed on the way out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// Wrap in a NaCl-box envelope when an output key is configured.
    #[default]
    Encrypted,
    /// Always emit plaintext.
    Raw,
    /// Delegate to a policy hook.
    Custom,
}

impl OutputMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "encrypted" => Some(Self::Encrypted),
            "raw" => Some(Self::Raw),
            "custom" => Some(Self::Custom),
            _ => None,
        }
    }
}

/// Keys and output policy for the envelope layer. Either key may be absent;
/// absence disables that direction.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Base64, 32 bytes: enables decryption of incoming envelopes.
    pub input_private_key: Option<String>,
    /// Base64, 32 bytes: enables encryption of sensitive outbound payloads.
    pub output_public_key: Option<String>,
    pub output_mode: OutputMode,
}

/// Router-edge policy: sender allowlist and payload caps.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Lowercase addresses; empty means allow all (development mode).
    pub authorized_senders: Vec<String>,
    pub max_payload_size: usize,
    pub max_string_length: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            authorized_senders: Vec::new(),
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            max_string_length: DEFAULT_MAX_STRING_LENGTH,
        }
    }
}

/// Full node configuration.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Host base URL for `/finish`, `/notice`, `/report`, `/voucher`.
    pub rollup_url: String,
    pub engine: EngineConfig,
    pub router: RouterConfig,
}

impl NodeConfig {
    /// Reads the configuration from the process environment. Invalid numeric
    /// overrides fall back to the defaults rather than failing startup.
    pub fn from_env() -> Self {
        let env = |k: &str| std::env::var(k).ok().filter(|v| !v.is_empty());

        let output_mode = env("LCORE_OUTPUT_MODE")
            .and_then(|v| OutputMode::parse(&v))
            .unwrap_or_default();

        let authorized_senders = env("AUTHORIZED_SENDERS")
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_ascii_lowercase())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let parse_size = |k: &str, default: usize| {
            env(k).and_then(|v| v.parse().ok()).unwrap_or(default)
        };

        Self {
            rollup_url: env("ROLLUP_HTTP_SERVER_URL")
                .unwrap_or_else(|| "http://127.0.0.1:5004".to_string()),
            engine: EngineConfig {
                input_private_key: env("LCORE_INPUT_PRIVATE_KEY"),
                output_public_key: env("LCORE_ADMIN_PUBLIC_KEY"),
                output_mode,
            },
            router: RouterConfig {
                authorized_senders,
                max_payload_size: parse_size("MAX_PAYLOAD_SIZE", DEFAULT_MAX_PAYLOAD_SIZE),
                max_string_length: parse_size("MAX_STRING_LENGTH", DEFAULT_MAX_STRING_LENGTH),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_mode_parses() {
        assert_eq!(OutputMode::parse("encrypted"), Some(OutputMode::Encrypted));
        assert_eq!(OutputMode::parse("raw"), Some(OutputMode::Raw));
        assert_eq!(OutputMode::parse("custom"), Some(OutputMode::Custom));
        assert_eq!(OutputMode::parse("loud"), None);
    }

    #[test]
    fn router_defaults() {
        let cfg = RouterConfig::default();
        assert!(cfg.authorized_senders.is_empty());
        assert_eq!(cfg.max_payload_size, 100 * 1024);
        assert_eq!(cfg.max_string_length, 10 * 1024);
    }
}
