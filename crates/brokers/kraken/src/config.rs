use crate::signer::{PrivateKey, SignError};
use chrono::Duration;
use krakenwatch_core::{CorruptSnapshotPolicy, Mode};
use reqwest::Url;
use serde::Deserialize;
use std::fmt;

pub const DEFAULT_BASE_URL: &str = "https://api.kraken.com";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("apikey is a required field")]
    MissingApiKey,
    #[error("privatekey is a required field")]
    MissingPrivateKey,
    #[error("privatekey could not be decoded: {0}")]
    InvalidPrivateKey(#[source] SignError),
    #[error("if provided, {field} must be true or false (got {value})")]
    InvalidBoolean { field: &'static str, value: String },
    #[error(
        "Please provide 'expected_receive_period_in_days' to indicate how many days can pass \
         before this Agent is considered to be not working (got {0})"
    )]
    InvalidReceivePeriod(String),
    #[error("Invalid base_url: {0}")]
    InvalidBaseUrl(String),
    #[error("Failed to parse options: {0}")]
    Parse(#[from] toml::de::Error),
}

/// An option value as written in the options file.
///
/// Older agent configs stored every option as a string (`"true"`, `"2"`), so
/// both typed and string forms are accepted.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Bool(bool),
    Int(i64),
    Text(String),
}

impl OptionValue {
    fn boolify(&self, field: &'static str) -> Result<bool, ConfigError> {
        match self {
            OptionValue::Bool(b) => Ok(*b),
            OptionValue::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" => Ok(true),
                "false" => Ok(false),
                _ => Err(ConfigError::InvalidBoolean {
                    field,
                    value: s.clone(),
                }),
            },
            OptionValue::Int(n) => Err(ConfigError::InvalidBoolean {
                field,
                value: n.to_string(),
            }),
        }
    }

    fn positive_int(&self) -> Option<u32> {
        let n = match self {
            OptionValue::Int(n) => *n,
            OptionValue::Text(s) => s.trim().parse().ok()?,
            OptionValue::Bool(_) => return None,
        };
        u32::try_from(n).ok().filter(|n| *n > 0)
    }
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionValue::Bool(b) => write!(f, "{}", b),
            OptionValue::Int(n) => write!(f, "{}", n),
            OptionValue::Text(s) => write!(f, "{:?}", s),
        }
    }
}

/// Raw options of the Kraken open-orders agent, as read from TOML.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct OpenOrderAgentOptions {
    pub apikey: String,
    /// Base64-encoded API private key.
    pub privatekey: String,
    /// Log raw responses and per-order decisions.
    pub debug: OptionValue,
    /// Liveness window used by the status check.
    pub expected_receive_period_in_days: OptionValue,
    /// Emit only orders not seen on the previous poll.
    pub changes_only: OptionValue,
    pub base_url: String,
    pub on_corrupt_snapshot: CorruptSnapshotPolicy,
}

impl Default for OpenOrderAgentOptions {
    fn default() -> Self {
        Self {
            apikey: String::new(),
            privatekey: String::new(),
            debug: OptionValue::Bool(false),
            expected_receive_period_in_days: OptionValue::Int(2),
            changes_only: OptionValue::Bool(true),
            base_url: DEFAULT_BASE_URL.to_string(),
            on_corrupt_snapshot: CorruptSnapshotPolicy::default(),
        }
    }
}

impl fmt::Debug for OpenOrderAgentOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenOrderAgentOptions")
            .field("apikey", &self.apikey)
            .field("privatekey", &"[REDACTED]")
            .field("debug", &self.debug)
            .field(
                "expected_receive_period_in_days",
                &self.expected_receive_period_in_days,
            )
            .field("changes_only", &self.changes_only)
            .field("base_url", &self.base_url)
            .field("on_corrupt_snapshot", &self.on_corrupt_snapshot)
            .finish()
    }
}

/// API key pair used to sign private requests.
#[derive(Debug)]
pub struct Credentials {
    pub api_key: String,
    pub private_key: PrivateKey,
}

impl Credentials {
    pub fn new(api_key: impl Into<String>, private_key: PrivateKey) -> Self {
        Self {
            api_key: api_key.into(),
            private_key,
        }
    }
}

/// Options that passed validation. Only this form reaches the client.
#[derive(Debug)]
pub struct ValidatedOptions {
    pub credentials: Credentials,
    pub mode: Mode,
    pub debug: bool,
    pub expected_receive_period: Duration,
    pub base_url: Url,
    pub on_corrupt_snapshot: CorruptSnapshotPolicy,
}

impl OpenOrderAgentOptions {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Check every option and decode the private key.
    pub fn validate(&self) -> Result<ValidatedOptions, ConfigError> {
        let api_key = self.apikey.trim();
        if api_key.is_empty() {
            return Err(ConfigError::MissingApiKey);
        }
        if self.privatekey.trim().is_empty() {
            return Err(ConfigError::MissingPrivateKey);
        }

        let changes_only = self.changes_only.boolify("changes_only")?;
        let debug = self.debug.boolify("debug")?;

        let days = self
            .expected_receive_period_in_days
            .positive_int()
            .ok_or_else(|| {
                ConfigError::InvalidReceivePeriod(self.expected_receive_period_in_days.to_string())
            })?;

        let base_url = Url::parse(&self.base_url)
            .map_err(|e| ConfigError::InvalidBaseUrl(format!("{}: {}", self.base_url, e)))?;

        let private_key =
            PrivateKey::from_base64(&self.privatekey).map_err(ConfigError::InvalidPrivateKey)?;

        Ok(ValidatedOptions {
            credentials: Credentials::new(api_key, private_key),
            mode: Mode::from_changes_only(changes_only),
            debug,
            expected_receive_period: Duration::days(i64::from(days)),
            base_url,
            on_corrupt_snapshot: self.on_corrupt_snapshot,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> OpenOrderAgentOptions {
        OpenOrderAgentOptions {
            apikey: "my-api-key".to_string(),
            privatekey: "c2VjcmV0".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults() {
        let validated = valid().validate().unwrap();
        assert_eq!(validated.mode, Mode::EmitChangesOnly);
        assert!(!validated.debug);
        assert_eq!(validated.expected_receive_period, Duration::days(2));
        assert_eq!(validated.base_url.as_str(), "https://api.kraken.com/");
        assert_eq!(validated.on_corrupt_snapshot, CorruptSnapshotPolicy::Fail);
        assert_eq!(validated.credentials.api_key, "my-api-key");
    }

    #[test]
    fn test_missing_credentials() {
        let mut options = valid();
        options.apikey = "  ".to_string();
        assert!(matches!(options.validate(), Err(ConfigError::MissingApiKey)));

        let mut options = valid();
        options.privatekey = String::new();
        assert!(matches!(options.validate(), Err(ConfigError::MissingPrivateKey)));
    }

    #[test]
    fn test_undecodable_private_key() {
        let mut options = valid();
        options.privatekey = "%%%".to_string();
        assert!(matches!(
            options.validate(),
            Err(ConfigError::InvalidPrivateKey(SignError::InvalidKey(_)))
        ));
    }

    #[test]
    fn test_string_booleans_accepted() {
        let options = OpenOrderAgentOptions::from_toml_str(
            r#"
            apikey = "k"
            privatekey = "c2VjcmV0"
            changes_only = "false"
            debug = "true"
            expected_receive_period_in_days = "5"
            "#,
        )
        .unwrap();

        let validated = options.validate().unwrap();
        assert_eq!(validated.mode, Mode::EmitAll);
        assert!(validated.debug);
        assert_eq!(validated.expected_receive_period, Duration::days(5));
    }

    #[test]
    fn test_bad_boolean_rejected() {
        let mut options = valid();
        options.changes_only = OptionValue::Text("maybe".to_string());
        match options.validate() {
            Err(ConfigError::InvalidBoolean { field, value }) => {
                assert_eq!(field, "changes_only");
                assert_eq!(value, "maybe");
            }
            other => panic!("Expected InvalidBoolean, got {:?}", other),
        }

        let mut options = valid();
        options.debug = OptionValue::Int(1);
        assert!(matches!(
            options.validate(),
            Err(ConfigError::InvalidBoolean { field: "debug", .. })
        ));
    }

    #[test]
    fn test_receive_period_must_be_positive() {
        for bad in [
            OptionValue::Int(0),
            OptionValue::Int(-3),
            OptionValue::Text("".to_string()),
            OptionValue::Text("soon".to_string()),
            OptionValue::Bool(true),
        ] {
            let mut options = valid();
            options.expected_receive_period_in_days = bad;
            assert!(matches!(
                options.validate(),
                Err(ConfigError::InvalidReceivePeriod(_))
            ));
        }
    }

    #[test]
    fn test_corrupt_snapshot_policy_from_toml() {
        let options = OpenOrderAgentOptions::from_toml_str(
            r#"
            apikey = "k"
            privatekey = "c2VjcmV0"
            on_corrupt_snapshot = "cold_start"
            "#,
        )
        .unwrap();
        assert_eq!(
            options.validate().unwrap().on_corrupt_snapshot,
            CorruptSnapshotPolicy::ColdStart
        );
    }

    #[test]
    fn test_debug_output_redacts_private_key() {
        let rendered = format!("{:?}", valid());
        assert!(rendered.contains("my-api-key"));
        assert!(!rendered.contains("c2VjcmV0"));
    }
}
