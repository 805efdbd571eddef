use serde::{Deserialize, Serialize};

use crate::constants::{ServiceName, ServiceOperation, status};

/// A single remote call inside a [`RequestPacket`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerCall {
    pub service: ServiceName,
    pub operation: ServiceOperation,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub data: serde_json::Value,
}

impl ServerCall {
    /// Builds a call for `operation`, routed to its owning service.
    pub fn new<T: Serialize>(
        operation: ServiceOperation,
        data: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            service: operation.service(),
            operation,
            data: serde_json::to_value(data)?,
        })
    }
}

/// Batch of calls posted to the dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestPacket {
    pub packet_id: u64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub session_id: String,
    pub app_id: String,
    pub messages: Vec<ServerCall>,
}

/// Result of one [`ServerCall`].
///
/// `data` is kept as raw JSON so callers decode it into the payload type
/// of the operation they issued.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerResponse {
    pub status: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Box<serde_json::value::RawValue>>,
}

impl ServerResponse {
    /// Creates a successful response carrying `data`.
    pub fn ok<T: Serialize>(data: &T) -> Result<Self, serde_json::Error> {
        let json = serde_json::to_string(data)?;
        Ok(Self {
            status: status::OK,
            reason_code: None,
            status_message: None,
            data: Some(serde_json::value::RawValue::from_string(json)?),
        })
    }

    /// Creates an error response.
    pub fn error(status: i32, reason_code: i32, message: impl Into<String>) -> Self {
        Self {
            status,
            reason_code: Some(reason_code),
            status_message: Some(message.into()),
            data: None,
        }
    }

    /// Returns `true` for a 200 status.
    pub fn is_ok(&self) -> bool {
        self.status == status::OK
    }

    /// Reason code, or 0 when the server sent none.
    pub fn reason(&self) -> i32 {
        self.reason_code.unwrap_or(0)
    }

    /// Deserializes `data` into the given type.
    pub fn parse_data<T: for<'de> Deserialize<'de>>(&self) -> Result<Option<T>, serde_json::Error> {
        match &self.data {
            Some(raw) => Ok(Some(serde_json::from_str(raw.get())?)),
            None => Ok(None),
        }
    }

    /// Serializes the response to a JSON string.
    ///
    /// Serializing this type cannot fail, so an empty object is returned
    /// in the unreachable error case.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".into())
    }
}

/// Dispatcher reply: one response per call, in request order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponsePacket {
    pub packet_id: u64,
    pub responses: Vec<ServerResponse>,
}
