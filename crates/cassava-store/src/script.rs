//! Typed script request/result model
//!
//! A script call addresses exactly one key and carries an ordered
//! argument list with per-argument declared types, plus the expected
//! result type. The `kind` tag identifies which of the core's atomic
//! protocols the text implements; a networked store sends the text
//! verbatim, while `MemoryStore` dispatches on the tag and emulates the
//! same semantics.

use serde::{Deserialize, Serialize};

/// Declared type of one script argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptArgType {
    Text,
    Integer,
    Double,
    Boolean,
}

/// One positional script argument with its declared type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptArg {
    pub value: String,
    pub arg_type: ScriptArgType,
}

impl ScriptArg {
    pub fn text(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            arg_type: ScriptArgType::Text,
        }
    }

    pub fn integer(value: i64) -> Self {
        Self {
            value: value.to_string(),
            arg_type: ScriptArgType::Integer,
        }
    }

    pub fn double(value: f64) -> Self {
        Self {
            value: value.to_string(),
            arg_type: ScriptArgType::Double,
        }
    }

    pub fn boolean(value: bool) -> Self {
        Self {
            value: if value { "1" } else { "0" }.to_string(),
            arg_type: ScriptArgType::Boolean,
        }
    }
}

/// Expected result type of a script call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptResultType {
    Boolean,
    Integer,
    OptionalText,
}

/// Which atomic protocol a script text implements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptKind {
    /// Scalar compare-and-swap (GET / SET / DEL)
    CasValue,
    /// List element compare-and-swap by index (LINDEX / LSET / LREM)
    CasListElement,
    /// Hash field compare-and-swap (HGET / HSET / HDEL)
    CasHashField,
    /// Sorted-set member score compare-and-swap (ZSCORE / ZADD / ZREM)
    CasScoredMember,
    /// Multi-member lock acquisition: absent-or-elapsed deadline field
    AcquireMemberDeadline,
    /// Value-lock renewal: token match extends the key's TTL
    RenewValueLease,
    /// Deadline renewal: stored deadline match writes the new deadline
    RenewFieldDeadline,
    /// Transaction commit: snapshot-exists + monotonicity guard
    TxnCommit,
    /// Transaction commit that also sets key TTL on success
    TxnCommitWithTtl,
    /// Transaction read with optional explicit version
    TxnRead,
}

/// One atomic script call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptRequest {
    pub kind: ScriptKind,
    /// Server-side scripting-language source, sent verbatim by networked
    /// stores
    pub source: String,
    /// The single addressed key
    pub key: String,
    /// Ordered argument list with declared types
    pub args: Vec<ScriptArg>,
    /// Positional extra arguments appended after `args`
    pub extra_args: Vec<String>,
    pub result_type: ScriptResultType,
}

impl ScriptRequest {
    /// All argument values in wire order
    pub fn argv(&self) -> Vec<&str> {
        self.args
            .iter()
            .map(|a| a.value.as_str())
            .chain(self.extra_args.iter().map(|s| s.as_str()))
            .collect()
    }
}

/// Result of a script call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScriptValue {
    Bool(bool),
    Int(i64),
    Text(String),
    Nil,
}

impl ScriptValue {
    pub fn as_bool(&self) -> bool {
        match self {
            ScriptValue::Bool(b) => *b,
            ScriptValue::Int(i) => *i != 0,
            ScriptValue::Text(t) => !t.is_empty(),
            ScriptValue::Nil => false,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ScriptValue::Int(i) => Some(*i),
            ScriptValue::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }

    pub fn into_text(self) -> Option<String> {
        match self {
            ScriptValue::Text(t) => Some(t),
            _ => None,
        }
    }
}
