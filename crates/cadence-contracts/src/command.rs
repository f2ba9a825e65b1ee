//! Write-intent requests and their results.
//!
//! A `Command` carries its payload as JSON so the bus can route, log, and
//! validate it without knowing the concrete type. Collaborators that own a
//! concrete payload type implement [`TypedCommand`] and convert at the edges.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::{CadenceError, CadenceResult};

/// Caller-supplied context attached to a command.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandMetadata {
    pub user_id: Option<String>,
    /// Submission time. The validation middleware stamps it when absent.
    pub timestamp: Option<DateTime<Utc>>,
    pub correlation_id: Option<String>,
    /// Free-form extra context (roles, client address, ...).
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A write-intent request routed to exactly one handler by `command_type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Command {
    #[serde(rename = "type")]
    pub command_type: String,
    pub payload: serde_json::Value,
    #[serde(default)]
    pub metadata: CommandMetadata,
}

impl Command {
    /// Build an untyped command.
    pub fn new(command_type: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            command_type: command_type.into(),
            payload,
            metadata: CommandMetadata::default(),
        }
    }

    /// Build a command from a typed payload, using its declared type name.
    pub fn typed<C: TypedCommand>(command: &C) -> CadenceResult<Self> {
        Ok(Self::new(C::TYPE, serde_json::to_value(command)?))
    }

    /// Decode the payload into its typed form.
    ///
    /// Fails with `Validation` when the command type does not match `C::TYPE`
    /// and with `Serialization` when the payload does not fit the type.
    pub fn decode<C: TypedCommand>(&self) -> CadenceResult<C> {
        if self.command_type != C::TYPE {
            return Err(CadenceError::validation(format!(
                "command type '{}' cannot be decoded as '{}'",
                self.command_type,
                C::TYPE
            )));
        }
        Ok(serde_json::from_value(self.payload.clone())?)
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.metadata.user_id = Some(user_id.into());
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.metadata.correlation_id = Some(correlation_id.into());
        self
    }

    /// Attach an extra metadata entry.
    pub fn with_meta(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.extra.insert(key.into(), value);
        self
    }
}

/// A concrete command payload type with a stable wire name.
///
/// ```rust,ignore
/// #[derive(Serialize, Deserialize)]
/// struct CreateArtist { name: String }
///
/// impl TypedCommand for CreateArtist {
///     const TYPE: &'static str = "CREATE_ARTIST";
/// }
/// ```
pub trait TypedCommand: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// The `command_type` this payload is routed under.
    const TYPE: &'static str;
}

/// Timing information attached to every bus result.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionMetadata {
    /// Wall time spent inside the bus, in milliseconds.
    pub execution_time: f64,
    pub timestamp: DateTime<Utc>,
}

/// The outcome of `CommandBus::execute`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub metadata: ExecutionMetadata,
}

impl CommandResult {
    pub fn ok(data: serde_json::Value, execution_time: f64) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            metadata: ExecutionMetadata { execution_time, timestamp: Utc::now() },
        }
    }

    pub fn failed(error: impl Into<String>, execution_time: f64) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            metadata: ExecutionMetadata { execution_time, timestamp: Utc::now() },
        }
    }

    /// Decode `data` into a typed value.
    pub fn data_as<T: DeserializeOwned>(&self) -> CadenceResult<Option<T>> {
        match &self.data {
            Some(v) => Ok(Some(serde_json::from_value(v.clone())?)),
            None => Ok(None),
        }
    }
}
