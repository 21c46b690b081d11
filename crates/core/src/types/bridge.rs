use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

// =============================================================================
// Bridge Contract
// =============================================================================

/// One of the six contract operations every module exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operation {
    Init,
    Start,
    Reset,
    ReadState,
    DispatchInput,
    ReadMeta,
}

impl Operation {
    /// Contract order.
    pub const ALL: [Operation; 6] = [
        Self::Init,
        Self::Start,
        Self::Reset,
        Self::ReadState,
        Self::DispatchInput,
        Self::ReadMeta,
    ];

    /// Name as it must appear in module source.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Start => "start",
            Self::Reset => "reset",
            Self::ReadState => "readState",
            Self::DispatchInput => "dispatchInput",
            Self::ReadMeta => "readMeta",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|op| op.name() == s)
            .ok_or_else(|| format!("unknown operation '{}'", s))
    }
}

/// The closed set of input actions a module accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Up,
    Down,
    Left,
    Right,
    /// Primary action (fire, jump, confirm).
    Action,
    /// Secondary action (alternate fire, cancel).
    Secondary,
    Pause,
}

impl Action {
    pub const ALL: [Action; 7] = [
        Self::Up,
        Self::Down,
        Self::Left,
        Self::Right,
        Self::Action,
        Self::Secondary,
        Self::Pause,
    ];

    pub fn token(&self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
            Self::Left => "left",
            Self::Right => "right",
            Self::Action => "action",
            Self::Secondary => "secondary",
            Self::Pause => "pause",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|a| a.token() == s)
            .ok_or_else(|| format!("unknown action token '{}'", s))
    }
}

/// Structurally validated result of `readState`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameState {
    /// Non-negative score.
    pub score: f64,
    /// Whether the game has reached an end condition.
    pub ended: bool,
    /// Any additional fields the module reports.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl GameState {
    pub fn new(score: f64, ended: bool) -> Self {
        Self {
            score,
            ended,
            extra: Map::new(),
        }
    }

    /// Validate a raw `readState` result.
    pub fn from_value(value: Value) -> std::result::Result<Self, String> {
        let Value::Object(mut map) = value else {
            return Err("readState must return an object".to_string());
        };
        let score = match map.remove("score") {
            Some(Value::Number(n)) => n
                .as_f64()
                .filter(|s| s.is_finite())
                .ok_or_else(|| "score must be a finite number".to_string())?,
            Some(_) => return Err("score must be a number".to_string()),
            None => return Err("readState result is missing 'score'".to_string()),
        };
        if score < 0.0 {
            return Err(format!("score must be >= 0, got {}", score));
        }
        let ended = match map.remove("ended") {
            Some(Value::Bool(b)) => b,
            Some(_) => return Err("ended must be a boolean".to_string()),
            None => return Err("readState result is missing 'ended'".to_string()),
        };
        Ok(Self {
            score,
            ended,
            extra: map,
        })
    }
}

/// Structurally validated result of `readMeta`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameMeta {
    pub name: String,
    pub description: String,
    /// Free-form description of the controls (object or list).
    pub controls: Value,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl GameMeta {
    /// Validate a raw `readMeta` result.
    pub fn from_value(value: Value) -> std::result::Result<Self, String> {
        let Value::Object(mut map) = value else {
            return Err("readMeta must return an object".to_string());
        };
        let name = match map.remove("name") {
            Some(Value::String(s)) => s,
            _ => return Err("readMeta result needs a string 'name'".to_string()),
        };
        let description = match map.remove("description") {
            Some(Value::String(s)) => s,
            _ => return Err("readMeta result needs a string 'description'".to_string()),
        };
        let controls = match map.remove("controls") {
            Some(Value::Null) | None => {
                return Err("readMeta result is missing 'controls'".to_string())
            }
            Some(v) => v,
        };
        Ok(Self {
            name,
            description,
            controls,
            extra: map,
        })
    }
}

// =============================================================================
// Bridge Messages
// =============================================================================

/// Why a bridge call did not produce a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BridgeErrorKind {
    /// Arguments do not fit the operation.
    InvalidArguments,
    /// The module raised or panicked while handling the call.
    ModuleException,
    /// The module returned a structurally invalid result.
    InvalidResult,
    /// No response arrived within the bounded timeout.
    Timeout,
    /// The instance was destroyed while the call was in flight.
    Cancelled,
    /// The instance is no longer running.
    InstanceGone,
}

impl BridgeErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidArguments => "invalid_arguments",
            Self::ModuleException => "module_exception",
            Self::InvalidResult => "invalid_result",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::InstanceGone => "instance_gone",
        }
    }
}

impl fmt::Display for BridgeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Host to instance message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeRequest {
    pub correlation_id: u64,
    pub operation: Operation,
    #[serde(default)]
    pub args: Value,
}

/// Instance to host message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeResponse {
    pub correlation_id: u64,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<BridgeErrorKind>,
    /// Diagnostic for logs; never forwarded to session callers.
    #[serde(skip)]
    pub detail: Option<String>,
}

impl BridgeResponse {
    pub fn success(correlation_id: u64, result: Value) -> Self {
        Self {
            correlation_id,
            ok: true,
            result: Some(result),
            error_kind: None,
            detail: None,
        }
    }

    pub fn failure(correlation_id: u64, kind: BridgeErrorKind, detail: impl Into<String>) -> Self {
        Self {
            correlation_id,
            ok: false,
            result: None,
            error_kind: Some(kind),
            detail: Some(detail.into()),
        }
    }
}
