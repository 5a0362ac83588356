//! Universal Flag Configuration: the configuration payload served by the control plane.
use std::collections::HashMap;

use derive_more::From;
use serde::{Deserialize, Serialize};

use crate::AssignmentValue;

/// Absolute point in time used for allocation validity windows.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Universal Flag Configuration. This is the response format of the configuration endpoint.
#[derive(Debug, Default, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct UniversalFlagConfig {
    /// Flags configuration.
    ///
    /// Value is wrapped in `TryParse` so that if we fail to parse one flag (e.g., new server
    /// format), we can still serve other flags.
    pub flags: HashMap<String, TryParse<Flag>>,
}

impl UniversalFlagConfig {
    /// Build a configuration out of already parsed flags, keyed by their flag key.
    pub fn from_flags(flags: impl IntoIterator<Item = Flag>) -> UniversalFlagConfig {
        UniversalFlagConfig {
            flags: flags
                .into_iter()
                .map(|flag| (flag.key.clone(), TryParse::Parsed(flag)))
                .collect(),
        }
    }
}

/// `TryParse` allows the subfield to fail parsing without failing the parsing of the whole
/// structure.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(untagged)]
pub enum TryParse<T> {
    /// Successfully parsed.
    Parsed(T),
    /// Parsing failed.
    ParseFailed(serde_json::Value),
}
impl<T> From<TryParse<T>> for Option<T> {
    fn from(value: TryParse<T>) -> Self {
        match value {
            TryParse::Parsed(v) => Some(v),
            TryParse::ParseFailed(_) => None,
        }
    }
}

/// Configuration of a single flag.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct Flag {
    pub key: String,
    pub enabled: bool,
    pub variation_type: VariationType,
    pub variations: HashMap<String, Variation>,
    /// Allocations are evaluated in order and the first matching one wins.
    pub allocations: Vec<Allocation>,
    /// Always positive in parsed flags.
    #[serde(
        default = "default_total_shards",
        deserialize_with = "deserialize_total_shards"
    )]
    pub total_shards: u64,
}

fn default_total_shards() -> u64 {
    10_000
}

fn deserialize_total_shards<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let total_shards = u64::deserialize(deserializer)?;
    if total_shards == 0 {
        return Err(serde::de::Error::custom("totalShards must be positive"));
    }
    Ok(total_shards)
}

/// Type of the variation.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[allow(missing_docs)]
pub enum VariationType {
    String,
    Integer,
    Numeric,
    Boolean,
    Json,
}

/// Subset of [`serde_json::Value`].
///
/// Unlike [`AssignmentValue`], `Value` is untagged, so we don't know the exact type until we
/// combine it with [`VariationType`] from the flag level.
#[derive(Debug, Serialize, Deserialize, PartialEq, From, Clone)]
#[serde(untagged)]
pub enum Value {
    /// Boolean maps to [`AssignmentValue::Boolean`].
    Boolean(bool),
    /// Number maps to either [`AssignmentValue::Integer`] or [`AssignmentValue::Numeric`].
    Number(f64),
    /// String maps to either [`AssignmentValue::String`] or [`AssignmentValue::Json`].
    String(String),
}

impl Value {
    /// Try to convert `Value` to [`AssignmentValue`] under the given [`VariationType`].
    pub(crate) fn to_assignment_value(&self, ty: VariationType) -> Option<AssignmentValue> {
        Some(match ty {
            VariationType::String => AssignmentValue::String(self.as_string()?.to_owned()),
            VariationType::Integer => AssignmentValue::Integer(self.as_integer()?),
            VariationType::Numeric => AssignmentValue::Numeric(self.as_number()?),
            VariationType::Boolean => AssignmentValue::Boolean(self.as_boolean()?),
            VariationType::Json => AssignmentValue::Json(self.to_json()?),
        })
    }

    fn as_boolean(&self) -> Option<bool> {
        match self {
            Self::Boolean(value) => Some(*value),
            _ => None,
        }
    }

    pub(crate) fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value),
            _ => None,
        }
    }

    fn as_integer(&self) -> Option<i64> {
        let f = self.as_number()?;
        let i = f as i64;
        if i as f64 == f {
            Some(i)
        } else {
            None
        }
    }

    pub(crate) fn as_string(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value),
            _ => None,
        }
    }

    fn to_json(&self) -> Option<serde_json::Value> {
        serde_json::from_str(self.as_string()?).ok()
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct Variation {
    pub key: String,
    pub value: Value,
}

/// A named, time-bounded, rule-gated bucket of splits.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct Allocation {
    pub key: String,
    /// Rules are OR'd. An allocation without rules applies to everyone.
    #[serde(default)]
    pub rules: Vec<Rule>,
    /// Inclusive start of the validity window. `None` means open.
    #[serde(default)]
    pub start_at: Option<Timestamp>,
    /// Exclusive end of the validity window. `None` means open.
    #[serde(default)]
    pub end_at: Option<Timestamp>,
    pub splits: Vec<Split>,
    #[serde(default = "default_do_log")]
    pub do_log: bool,
}

fn default_do_log() -> bool {
    true
}

/// A set of conditions that must all match.
#[derive(Debug, Serialize, Deserialize, Clone, From)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct Rule {
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct Condition {
    pub operator: ConditionOperator,
    pub attribute: String,
    pub value: ConditionValue,
}

/// Condition operator.
///
/// Unknown operators are kept as [`ConditionOperator::Unrecognized`] instead of failing the
/// whole flag, and surface as [`Error::MalformedOperator`](crate::Error::MalformedOperator)
/// when a request evaluates them.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(from = "String", into = "String")]
#[allow(missing_docs)]
pub enum ConditionOperator {
    Matches,
    OneOf,
    NotOneOf,
    Gte,
    Gt,
    Lte,
    Lt,
    Unrecognized(String),
}

impl From<String> for ConditionOperator {
    fn from(value: String) -> Self {
        match value.as_str() {
            "MATCHES" => Self::Matches,
            "ONE_OF" => Self::OneOf,
            "NOT_ONE_OF" => Self::NotOneOf,
            "GTE" | "GE" => Self::Gte,
            "GT" => Self::Gt,
            "LTE" | "LE" => Self::Lte,
            "LT" => Self::Lt,
            _ => Self::Unrecognized(value),
        }
    }
}

impl From<ConditionOperator> for String {
    fn from(value: ConditionOperator) -> Self {
        match value {
            ConditionOperator::Matches => "MATCHES".to_owned(),
            ConditionOperator::OneOf => "ONE_OF".to_owned(),
            ConditionOperator::NotOneOf => "NOT_ONE_OF".to_owned(),
            ConditionOperator::Gte => "GTE".to_owned(),
            ConditionOperator::Gt => "GT".to_owned(),
            ConditionOperator::Lte => "LTE".to_owned(),
            ConditionOperator::Lt => "LT".to_owned(),
            ConditionOperator::Unrecognized(s) => s,
        }
    }
}

/// Value a condition compares against.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum ConditionValue {
    /// Candidate list for `ONE_OF` and `NOT_ONE_OF`.
    Multiple(Vec<String>),
    /// Threshold or pattern for other operators.
    Single(Value),
}

impl<T: Into<Value>> From<T> for ConditionValue {
    fn from(value: T) -> Self {
        Self::Single(value.into())
    }
}
impl From<Vec<String>> for ConditionValue {
    fn from(value: Vec<String>) -> Self {
        Self::Multiple(value)
    }
}
impl From<Vec<&str>> for ConditionValue {
    fn from(value: Vec<&str>) -> Self {
        Self::Multiple(value.into_iter().map(ToOwned::to_owned).collect())
    }
}

/// A shard-range-gated mapping to one variation.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct Split {
    #[serde(default)]
    pub shards: Vec<Shard>,
    pub variation_key: String,
    #[serde(default = "HashMap::new")]
    pub extra_logging: HashMap<String, String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct Shard {
    pub salt: String,
    pub ranges: Vec<Range>,
}

/// Half-open shard interval `[start, end)`.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct Range {
    pub start: u64,
    pub end: u64,
}
impl Range {
    /// Return `true` if `v` lies within `[start, end)`.
    pub fn contains(&self, v: u64) -> bool {
        self.start <= v && v < self.end
    }
}
