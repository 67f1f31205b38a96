//! Per-call delay overrides carried as string metadata.
//!
//! The server decodes call metadata into a [`DelayOverride`]; the client
//! encodes its own strategy state into the same keys so the server replays
//! the client's sequence.

use crate::error::DelayError;
use crate::strategy::{DelayKind, DelayStrategy};

pub const STRATEGY_KEY: &str = "x-delay-strategy";
pub const INITIAL_MS_KEY: &str = "x-delay-initial-ms";
pub const LINEAR_INCREMENT_MS_KEY: &str = "x-delay-linear-increment-ms";
pub const MULTIPLIER_KEY: &str = "x-delay-multiplier";
pub const EXPONENTIAL_BASE_KEY: &str = "x-delay-exponential-base";
pub const MAX_MS_KEY: &str = "x-delay-max-ms";

/// Every metadata key that participates in an override.
pub const OVERRIDE_KEYS: [&str; 6] = [
    STRATEGY_KEY,
    INITIAL_MS_KEY,
    LINEAR_INCREMENT_MS_KEY,
    MULTIPLIER_KEY,
    EXPONENTIAL_BASE_KEY,
    MAX_MS_KEY,
];

/// A subset of strategy parameters to replace.
///
/// `None` means "keep the base strategy's value".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DelayOverride {
    pub strategy: Option<DelayKind>,
    pub initial_ms: Option<f64>,
    pub linear_increment_ms: Option<f64>,
    pub multiplier: Option<f64>,
    pub exponential_base: Option<f64>,
    pub max_ms: Option<f64>,
}

impl DelayOverride {
    /// Decode an override from call metadata.
    ///
    /// Keys are matched case-insensitively; when a key repeats the last
    /// value wins. Returns `Ok(None)` when none of the override keys is
    /// present. An empty `x-delay-strategy` still counts as present but keeps
    /// the base kind.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Option<Self>, DelayError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut found = false;
        let mut overrides = DelayOverride::default();

        for (key, value) in pairs {
            let key = key.as_ref().to_ascii_lowercase();
            let value = value.as_ref();

            let slot = match key.as_str() {
                STRATEGY_KEY => {
                    found = true;
                    overrides.strategy = if value.is_empty() {
                        None
                    } else {
                        Some(value.parse()?)
                    };
                    continue;
                }
                INITIAL_MS_KEY => &mut overrides.initial_ms,
                LINEAR_INCREMENT_MS_KEY => &mut overrides.linear_increment_ms,
                MULTIPLIER_KEY => &mut overrides.multiplier,
                EXPONENTIAL_BASE_KEY => &mut overrides.exponential_base,
                MAX_MS_KEY => &mut overrides.max_ms,
                _ => continue,
            };

            found = true;
            *slot = Some(parse_float(&key, value)?);
        }

        Ok(found.then_some(overrides))
    }

    /// True if no field would replace anything.
    pub fn is_empty(&self) -> bool {
        self == &DelayOverride::default()
    }
}

fn parse_float(key: &str, value: &str) -> Result<f64, DelayError> {
    value
        .trim()
        .parse::<f64>()
        .map_err(|_| DelayError::InvalidOverride {
            key: key.to_string(),
            value: value.to_string(),
        })
}

/// Encode a client strategy as override metadata for the next call.
///
/// `current_delay_secs` is the value the client just drew from `strategy`;
/// it is sent as the seed so the server applies the same delay. Only the
/// tunable that matters for the strategy's kind is included.
pub fn override_metadata(
    strategy: &DelayStrategy,
    current_delay_secs: f64,
) -> Vec<(&'static str, String)> {
    let delay_ms = (current_delay_secs * 1000.0).max(0.0);

    let mut metadata = vec![
        (STRATEGY_KEY, strategy.kind().to_string()),
        (INITIAL_MS_KEY, format!("{:.3}", delay_ms)),
    ];

    match strategy.kind() {
        DelayKind::Fixed => {}
        DelayKind::Linear => metadata.push((
            LINEAR_INCREMENT_MS_KEY,
            format!("{:.3}", strategy.linear_increment_ms()),
        )),
        DelayKind::Multiplier => {
            metadata.push((MULTIPLIER_KEY, format!("{:.6}", strategy.multiplier())))
        }
        DelayKind::Exponential => metadata.push((
            EXPONENTIAL_BASE_KEY,
            format!("{:.6}", strategy.exponential_base()),
        )),
    }

    if let Some(max_ms) = strategy.max_ms() {
        metadata.push((MAX_MS_KEY, format!("{:.3}", max_ms)));
    }

    metadata
}
