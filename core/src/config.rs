use std::time::Duration;

use crate::error::ConfigError;

pub const DEFAULT_MAX_ROUND_TRIPS: u32 = 8;
pub const DEFAULT_QUESTION_TIMEOUT_SECS: u64 = 120;

/// Model endpoint settings. The endpoint speaks the OpenAI chat-completions
/// surface; `MODEL_BASE_URL` wins, otherwise the URL is derived from
/// `GENAI_REGION` (OCI Generative AI inference).
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: String,
    /// Optional tenancy compartment, sent as a request header when present.
    pub compartment_id: Option<String>,
}

/// Loop termination limits. The round-trip budget bounds
/// AWAIT_MODEL→DISPATCH_TOOLS cycles; the timeout bounds the whole
/// question-answer exchange.
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    pub max_round_trips: u32,
    pub question_timeout: Duration,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_round_trips: DEFAULT_MAX_ROUND_TRIPS,
            question_timeout: Duration::from_secs(DEFAULT_QUESTION_TIMEOUT_SECS),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub model: ModelConfig,
    pub limits: Limits,
}

impl Config {
    /// Validate the full environment before anything executes. All missing
    /// variables are reported in one error, not one at a time.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut missing = Vec::new();

        let database_url = require(&lookup, "DATABASE_URL", &mut missing);
        let model_name = require(&lookup, "MODEL_NAME", &mut missing);
        let api_key = require(&lookup, "MODEL_API_KEY", &mut missing);

        let base_url = match lookup("MODEL_BASE_URL") {
            Some(url) if !url.trim().is_empty() => Some(url.trim().to_string()),
            _ => lookup("GENAI_REGION")
                .filter(|r| !r.trim().is_empty())
                .map(|region| oci_inference_url(region.trim())),
        };
        if base_url.is_none() {
            missing.push("MODEL_BASE_URL (or GENAI_REGION)".to_string());
        }

        if !missing.is_empty() {
            return Err(ConfigError::MissingVariables(missing));
        }

        let max_round_trips = parse_or_default(
            &lookup,
            "DOCTOR_MAX_ROUND_TRIPS",
            DEFAULT_MAX_ROUND_TRIPS,
        )?;
        if max_round_trips == 0 {
            return Err(ConfigError::InvalidVariable {
                name: "DOCTOR_MAX_ROUND_TRIPS".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        let timeout_secs = parse_or_default(
            &lookup,
            "DOCTOR_QUESTION_TIMEOUT_SECS",
            DEFAULT_QUESTION_TIMEOUT_SECS,
        )?;

        Ok(Self {
            database_url: database_url.unwrap_or_default(),
            model: ModelConfig {
                base_url: base_url.unwrap_or_default(),
                model: model_name.unwrap_or_default(),
                api_key: api_key.unwrap_or_default(),
                compartment_id: lookup("COMPARTMENT_ID").filter(|v| !v.trim().is_empty()),
            },
            limits: Limits {
                max_round_trips,
                question_timeout: Duration::from_secs(timeout_secs),
            },
        })
    }
}

fn require(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    missing: &mut Vec<String>,
) -> Option<String> {
    match lookup(name) {
        Some(value) if !value.trim().is_empty() => Some(value.trim().to_string()),
        _ => {
            missing.push(name.to_string());
            None
        }
    }
}

fn parse_or_default<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidVariable {
                name: name.to_string(),
                reason: format!("could not parse '{}'", raw.trim()),
            }),
        None => Ok(default),
    }
}

fn oci_inference_url(region: &str) -> String {
    format!("https://inference.generativeai.{region}.oci.oraclecloud.com/20231130/actions/v1")
}
