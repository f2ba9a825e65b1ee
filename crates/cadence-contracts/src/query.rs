//! Read-intent requests and their (possibly cached) results.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::{CadenceError, CadenceResult};

/// Caller-supplied context attached to a query.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryMetadata {
    pub user_id: Option<String>,
    /// Explicit cache key. When absent the bus derives one from type + params.
    pub cache_key: Option<String>,
    /// Cache time-to-live in milliseconds. Absent means the bus default.
    #[serde(rename = "cacheTTL")]
    pub cache_ttl: Option<u64>,
}

/// A read-intent request routed to one handler by `query_type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Query {
    #[serde(rename = "type")]
    pub query_type: String,
    pub params: serde_json::Value,
    #[serde(default)]
    pub metadata: QueryMetadata,
}

impl Query {
    pub fn new(query_type: impl Into<String>, params: serde_json::Value) -> Self {
        Self {
            query_type: query_type.into(),
            params,
            metadata: QueryMetadata::default(),
        }
    }

    /// Build a query from typed params, using the declared type name.
    pub fn typed<Q: TypedQuery>(query: &Q) -> CadenceResult<Self> {
        Ok(Self::new(Q::TYPE, serde_json::to_value(query)?))
    }

    /// Decode the params into their typed form.
    pub fn decode<Q: TypedQuery>(&self) -> CadenceResult<Q> {
        if self.query_type != Q::TYPE {
            return Err(CadenceError::validation(format!(
                "query type '{}' cannot be decoded as '{}'",
                self.query_type,
                Q::TYPE
            )));
        }
        Ok(serde_json::from_value(self.params.clone())?)
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.metadata.user_id = Some(user_id.into());
        self
    }

    pub fn with_cache_key(mut self, key: impl Into<String>) -> Self {
        self.metadata.cache_key = Some(key.into());
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.metadata.cache_ttl = Some(ttl.as_millis() as u64);
        self
    }

    /// The requested TTL, if any.
    pub fn cache_ttl(&self) -> Option<Duration> {
        self.metadata.cache_ttl.map(Duration::from_millis)
    }
}

/// A concrete query params type with a stable wire name.
pub trait TypedQuery: Serialize + DeserializeOwned + Send + Sync + 'static {
    const TYPE: &'static str;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResultMetadata {
    /// Wall time spent inside the bus, in milliseconds.
    pub execution_time: f64,
    pub from_cache: bool,
    pub timestamp: DateTime<Utc>,
}

/// The outcome of `QueryBus::execute`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub metadata: QueryResultMetadata,
}

impl QueryResult {
    pub fn ok(data: serde_json::Value, execution_time: f64, from_cache: bool) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            metadata: QueryResultMetadata {
                execution_time,
                from_cache,
                timestamp: Utc::now(),
            },
        }
    }

    pub fn failed(error: impl Into<String>, execution_time: f64) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            metadata: QueryResultMetadata {
                execution_time,
                from_cache: false,
                timestamp: Utc::now(),
            },
        }
    }

    pub fn from_cache(&self) -> bool {
        self.metadata.from_cache
    }

    pub fn data_as<T: DeserializeOwned>(&self) -> CadenceResult<Option<T>> {
        match &self.data {
            Some(v) => Ok(Some(serde_json::from_value(v.clone())?)),
            None => Ok(None),
        }
    }
}
