//! Engine configuration
//!
//! Configuration files are `KEY=VALUE` lines; `#` starts a comment line.
//!
//! ```text
//! # carve on either of the DVR stream headers
//! CARVE_SIGNAT=DHII|\x00\x00\x01[\xBA\xB3]
//! DEBUG=False
//! ```

use regex::bytes::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::OnceLock;
use thiserror::Error;

/// Carving inspects this many leading bytes of each free fragment
pub const CARVE_WINDOW: usize = 32;

/// Stream header written by the DVR at the start of each recording
pub const DEFAULT_CARVE_SIGNATURE: &str = r"\x44\x48\x49\x49";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Line {line}: expected KEY=VALUE, got {text:?}")]
    InvalidLine { line: usize, text: String },

    #[error("Invalid value {value:?} for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

/// Byte regex searched at offset 0 of a fragment's carving window.
///
/// The pattern is compiled as `^` followed by the configured text with
/// Unicode disabled, so `\xHH` escapes match raw bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CarveSignature {
    pattern: String,
    regex: Regex,
}

impl CarveSignature {
    pub fn parse(pattern: &str) -> Result<Self, String> {
        if pattern.is_empty() {
            return Err("signature is empty".to_string());
        }

        let regex = RegexBuilder::new(&format!("(?-u)^{}", pattern))
            .build()
            .map_err(|e| e.to_string())?;

        Ok(Self {
            pattern: pattern.to_string(),
            regex,
        })
    }

    /// Pattern text as configured, without the implicit anchor
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// True when the signature matches at the start of `fragment`
    pub fn matches(&self, fragment: &[u8]) -> bool {
        let window = &fragment[..fragment.len().min(CARVE_WINDOW)];
        self.regex.is_match(window)
    }
}

/// Compiled once on first use via OnceLock
fn default_regex() -> &'static Regex {
    static DEFAULT_REGEX: OnceLock<Regex> = OnceLock::new();
    DEFAULT_REGEX.get_or_init(|| {
        Regex::new(r"(?-u)^\x44\x48\x49\x49").expect("Invalid default carve regex")
    })
}

impl Default for CarveSignature {
    fn default() -> Self {
        Self {
            pattern: DEFAULT_CARVE_SIGNATURE.to_string(),
            regex: default_regex().clone(),
        }
    }
}

impl PartialEq for CarveSignature {
    fn eq(&self, other: &Self) -> bool {
        self.pattern == other.pattern
    }
}

impl Eq for CarveSignature {}

impl TryFrom<String> for CarveSignature {
    type Error = String;

    fn try_from(pattern: String) -> Result<Self, Self::Error> {
        Self::parse(&pattern)
    }
}

impl From<CarveSignature> for String {
    fn from(signature: CarveSignature) -> Self {
        signature.pattern
    }
}

impl fmt::Display for CarveSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.pattern)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DhfsConfig {
    pub carve_signature: CarveSignature,
    /// Emit classification diagnostics through progress callbacks
    pub debug: bool,
}

/// Non-fatal problem found while parsing a config file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    pub line: usize,
    pub message: String,
}

impl fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

impl DhfsConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<(Self, Vec<ConfigWarning>), ConfigError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        tracing::info!("Loading config from {}", path.as_ref().display());
        Self::parse(&text)
    }

    /// Parse config text on top of the defaults
    pub fn parse(text: &str) -> Result<(Self, Vec<ConfigWarning>), ConfigError> {
        let mut config = DhfsConfig::default();
        let mut warnings = Vec::new();

        for (number, line) in text.lines().enumerate() {
            let line_no = number + 1;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (key, value) = match line.split_once('=') {
                Some((key, value)) if !key.trim().is_empty() => (key.trim(), value.trim()),
                _ => {
                    return Err(ConfigError::InvalidLine {
                        line: line_no,
                        text: line.to_string(),
                    })
                }
            };

            let invalid = |reason: String| ConfigError::InvalidValue {
                key: key.to_string(),
                value: value.to_string(),
                reason,
            };

            match key {
                "CARVE_SIGNAT" => {
                    config.carve_signature = CarveSignature::parse(value).map_err(invalid)?;
                }
                "DEBUG" => {
                    config.debug = parse_bool(value)
                        .ok_or_else(|| invalid("expected True or False".to_string()))?;
                }
                unknown => {
                    let warning = ConfigWarning {
                        line: line_no,
                        message: format!("unknown key {}", unknown),
                    };
                    tracing::warn!("Config {}", warning);
                    warnings.push(warning);
                }
            }
        }

        tracing::debug!(
            "Config: carve signature {}, debug {}",
            config.carve_signature,
            config.debug
        );

        Ok((config, warnings))
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DhfsConfig::default();
        assert_eq!(config.carve_signature.pattern(), DEFAULT_CARVE_SIGNATURE);
        assert!(config.carve_signature.matches(b"DHII\x01\x02"));
        assert!(!config.debug);
    }

    #[test]
    fn test_parse_file() {
        let text = "# comment\n\nCARVE_SIGNAT=\\x00\\x00\\x01\\xBA\nDEBUG = True\nCOLOR=blue\n";
        let (config, warnings) = DhfsConfig::parse(text).unwrap();

        assert_eq!(config.carve_signature.pattern(), r"\x00\x00\x01\xBA");
        assert!(config.carve_signature.matches(&[0x00, 0x00, 0x01, 0xBA, 0xFF]));
        assert!(config.debug);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].line, 5);
        assert_eq!(warnings[0].to_string(), "line 5: unknown key COLOR");
    }

    #[test]
    fn test_signature_is_anchored() {
        let sig = CarveSignature::default();
        assert!(sig.matches(b"DHII\x01\x02"));
        assert!(!sig.matches(b"xDHII"));
        assert!(!sig.matches(b"DH"));
    }

    #[test]
    fn test_signature_character_class() {
        let sig = CarveSignature::parse(r"\x00\x00\x01[\xBA\xB3]").unwrap();
        assert!(sig.matches(&[0x00, 0x00, 0x01, 0xBA, 0x44]));
        assert!(sig.matches(&[0x00, 0x00, 0x01, 0xB3]));
        assert!(!sig.matches(&[0x00, 0x00, 0x01, 0xE0]));
        assert!(!sig.matches(b"\x00\x00\x01[\xBA\xB3]"));
    }

    #[test]
    fn test_signature_alternation() {
        let sig = CarveSignature::parse("DHII|DHAV").unwrap();
        assert!(sig.matches(b"DHAV\x00\x00\x00\x00"));
        assert!(sig.matches(b"DHII\x00\x00\x00\x00"));
        assert!(!sig.matches(b"DHAX\x00\x00\x00\x00"));
    }

    #[test]
    fn test_signature_window() {
        // The pattern only sees the first 32 bytes of the fragment
        let sig = CarveSignature::parse(r"[\x00]{32}\x01").unwrap();
        let mut fragment = vec![0u8; 64];
        fragment[32] = 0x01;
        assert!(!sig.matches(&fragment));

        let sig = CarveSignature::parse(r"[\x00]{31}\x01").unwrap();
        fragment[31] = 0x01;
        assert!(sig.matches(&fragment));
    }

    #[test]
    fn test_signature_serde() {
        let config = DhfsConfig {
            carve_signature: CarveSignature::parse("DHAV").unwrap(),
            debug: true,
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"DHAV\""));
        assert_eq!(serde_json::from_str::<DhfsConfig>(&json).unwrap(), config);
    }

    #[test]
    fn test_invalid_entries() {
        assert!(matches!(
            DhfsConfig::parse("DEBUG"),
            Err(ConfigError::InvalidLine { line: 1, .. })
        ));
        assert!(matches!(
            DhfsConfig::parse("DEBUG=maybe"),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            DhfsConfig::parse("CARVE_SIGNAT=\\x00[\\xBA"),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(CarveSignature::parse("").is_err());
    }
}
