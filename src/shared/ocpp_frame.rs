//! OCPP-J message framing
//!
//! Implements the OCPP-J (JSON over WebSocket) transport framing, which is
//! identical across OCPP 1.6 and 2.0.1:
//!
//! - **Call**       `[2, "<messageId>", "<action>", {<payload>}]`
//! - **CallResult** `[3, "<messageId>", {<payload>}]`
//! - **CallError**  `[4, "<messageId>", "<errorCode>", "<errorDescription>", {<errorDetails>}]`
//!
//! The codec is pure: no I/O, decode and encode are exact inverses.

use serde_json::Value;
use std::fmt;

use crate::domain::OcppVersion;

// ── Message-type constants ─────────────────────────────────────

const MSG_TYPE_CALL: u64 = 2;
const MSG_TYPE_CALL_RESULT: u64 = 3;
const MSG_TYPE_CALL_ERROR: u64 = 4;

// ── Error codes ────────────────────────────────────────────────

/// The closed set of OCPP-J CALLERROR codes.
///
/// Shared codes exist in both versions; `MessageTypeNotSupported` and
/// `RequestNotSupported` are 1.6-only, `RpcFrameworkError` and
/// `FormatViolation` are 2.0.1-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OcppErrorCode {
    NotImplemented,
    NotSupported,
    InternalError,
    ProtocolError,
    SecurityError,
    FormationViolation,
    PropertyConstraintViolation,
    OccurrenceConstraintViolation,
    TypeConstraintViolation,
    GenericError,
    // 1.6 only
    MessageTypeNotSupported,
    RequestNotSupported,
    // 2.0.1 only
    RpcFrameworkError,
    FormatViolation,
}

impl OcppErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotImplemented => "NotImplemented",
            Self::NotSupported => "NotSupported",
            Self::InternalError => "InternalError",
            Self::ProtocolError => "ProtocolError",
            Self::SecurityError => "SecurityError",
            Self::FormationViolation => "FormationViolation",
            Self::PropertyConstraintViolation => "PropertyConstraintViolation",
            Self::OccurrenceConstraintViolation => "OccurrenceConstraintViolation",
            Self::TypeConstraintViolation => "TypeConstraintViolation",
            Self::GenericError => "GenericError",
            Self::MessageTypeNotSupported => "MessageTypeNotSupported",
            Self::RequestNotSupported => "RequestNotSupported",
            Self::RpcFrameworkError => "RPCFrameworkError",
            Self::FormatViolation => "FormatViolation",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "NotImplemented" => Some(Self::NotImplemented),
            "NotSupported" => Some(Self::NotSupported),
            "InternalError" => Some(Self::InternalError),
            "ProtocolError" => Some(Self::ProtocolError),
            "SecurityError" => Some(Self::SecurityError),
            "FormationViolation" => Some(Self::FormationViolation),
            "PropertyConstraintViolation" => Some(Self::PropertyConstraintViolation),
            "OccurrenceConstraintViolation" => Some(Self::OccurrenceConstraintViolation),
            "TypeConstraintViolation" => Some(Self::TypeConstraintViolation),
            "GenericError" => Some(Self::GenericError),
            "MessageTypeNotSupported" => Some(Self::MessageTypeNotSupported),
            "RequestNotSupported" => Some(Self::RequestNotSupported),
            "RPCFrameworkError" => Some(Self::RpcFrameworkError),
            "FormatViolation" => Some(Self::FormatViolation),
            _ => None,
        }
    }

    /// The "payload failed schema validation" code for a given version.
    pub fn formation_violation(version: OcppVersion) -> Self {
        match version {
            OcppVersion::V16 => Self::FormationViolation,
            OcppVersion::V201 => Self::FormatViolation,
        }
    }
}

impl fmt::Display for OcppErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── OcppFrame ──────────────────────────────────────────────────

/// A decoded OCPP-J frame, tagged with the session's negotiated version.
#[derive(Debug, Clone, PartialEq)]
pub enum OcppFrame {
    /// `[2, messageId, action, payload]`
    Call {
        message_id: String,
        action: String,
        payload: Value,
    },
    /// `[3, messageId, payload]`
    CallResult { message_id: String, payload: Value },
    /// `[4, messageId, errorCode, errorDescription, errorDetails]`
    CallError {
        message_id: String,
        error_code: String,
        error_description: String,
        error_details: Value,
    },
}

impl OcppFrame {
    // ── Decoding ───────────────────────────────────────────

    /// Decode a raw JSON text into an `OcppFrame`.
    pub fn decode(text: &str) -> Result<Self, OcppFrameError> {
        let arr: Vec<Value> =
            serde_json::from_str(text).map_err(|e| OcppFrameError::InvalidJson(e.to_string()))?;

        if arr.is_empty() {
            return Err(OcppFrameError::EmptyArray);
        }

        let msg_type = arr[0].as_u64().ok_or(OcppFrameError::InvalidMessageType)?;

        match msg_type {
            MSG_TYPE_CALL => Self::decode_call(&arr),
            MSG_TYPE_CALL_RESULT => Self::decode_call_result(&arr),
            MSG_TYPE_CALL_ERROR => Self::decode_call_error(&arr),
            _ => Err(OcppFrameError::UnknownMessageType(msg_type)),
        }
    }

    fn decode_call(arr: &[Value]) -> Result<Self, OcppFrameError> {
        if arr.len() < 4 {
            return Err(OcppFrameError::MissingFields {
                expected: 4,
                got: arr.len(),
            });
        }

        let message_id = arr[1]
            .as_str()
            .ok_or(OcppFrameError::FieldTypeMismatch("messageId must be a string"))?
            .to_string();
        let action = arr[2]
            .as_str()
            .ok_or(OcppFrameError::FieldTypeMismatch("action must be a string"))?
            .to_string();
        let payload = arr[3].clone();

        Ok(Self::Call {
            message_id,
            action,
            payload,
        })
    }

    fn decode_call_result(arr: &[Value]) -> Result<Self, OcppFrameError> {
        if arr.len() < 2 {
            return Err(OcppFrameError::MissingFields {
                expected: 3,
                got: arr.len(),
            });
        }

        let message_id = arr[1]
            .as_str()
            .ok_or(OcppFrameError::FieldTypeMismatch("messageId must be a string"))?
            .to_string();
        // Some stations send a truncated `[3,"id"]` or a null payload.
        let payload = match arr.get(2) {
            Some(Value::Null) | None => Value::Object(Default::default()),
            Some(v) => v.clone(),
        };

        Ok(Self::CallResult { message_id, payload })
    }

    fn decode_call_error(arr: &[Value]) -> Result<Self, OcppFrameError> {
        if arr.len() < 2 {
            return Err(OcppFrameError::MissingFields {
                expected: 5,
                got: arr.len(),
            });
        }

        let message_id = arr[1]
            .as_str()
            .ok_or(OcppFrameError::FieldTypeMismatch("messageId must be a string"))?
            .to_string();
        // Truncated CALLERRORs like [4,"id"] occur in the wild; pad them.
        let error_code = arr
            .get(2)
            .and_then(|v| v.as_str())
            .unwrap_or("GenericError")
            .to_string();
        let error_description = arr
            .get(3)
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();
        let error_details = match arr.get(4) {
            Some(Value::Null) | None => Value::Object(Default::default()),
            Some(v) => v.clone(),
        };

        Ok(Self::CallError {
            message_id,
            error_code,
            error_description,
            error_details,
        })
    }

    // ── Encoding ───────────────────────────────────────────

    /// Encode this frame to its JSON wire form.
    pub fn encode(&self) -> String {
        let arr: Value = match self {
            Self::Call {
                message_id,
                action,
                payload,
            } => Value::Array(vec![
                Value::Number(MSG_TYPE_CALL.into()),
                Value::String(message_id.clone()),
                Value::String(action.clone()),
                payload.clone(),
            ]),

            Self::CallResult { message_id, payload } => Value::Array(vec![
                Value::Number(MSG_TYPE_CALL_RESULT.into()),
                Value::String(message_id.clone()),
                payload.clone(),
            ]),

            Self::CallError {
                message_id,
                error_code,
                error_description,
                error_details,
            } => Value::Array(vec![
                Value::Number(MSG_TYPE_CALL_ERROR.into()),
                Value::String(message_id.clone()),
                Value::String(error_code.clone()),
                Value::String(error_description.clone()),
                error_details.clone(),
            ]),
        };

        // serde_json::to_string on a Value never fails
        serde_json::to_string(&arr).unwrap()
    }

    // ── Helpers ────────────────────────────────────────────

    pub fn message_id(&self) -> &str {
        match self {
            Self::Call { message_id, .. }
            | Self::CallResult { message_id, .. }
            | Self::CallError { message_id, .. } => message_id,
        }
    }

    /// Build a CALLERROR response frame for a given message ID.
    pub fn error_response(message_id: impl Into<String>, error: &crate::shared::errors::OcppError) -> Self {
        Self::CallError {
            message_id: message_id.into(),
            error_code: error.code.as_str().to_string(),
            error_description: error.description.clone(),
            error_details: error.details.clone(),
        }
    }

    pub fn is_call(&self) -> bool {
        matches!(self, Self::Call { .. })
    }
}

// ── Errors ─────────────────────────────────────────────────────

/// Errors that can occur when decoding an OCPP-J frame.
#[derive(Debug)]
pub enum OcppFrameError {
    InvalidJson(String),
    EmptyArray,
    InvalidMessageType,
    UnknownMessageType(u64),
    MissingFields { expected: usize, got: usize },
    FieldTypeMismatch(&'static str),
}

impl OcppFrameError {
    /// The CALLERROR code a malformed inbound frame maps to.
    pub fn error_code(&self, version: OcppVersion) -> OcppErrorCode {
        match self {
            Self::UnknownMessageType(_) => match version {
                OcppVersion::V16 => OcppErrorCode::MessageTypeNotSupported,
                OcppVersion::V201 => OcppErrorCode::RpcFrameworkError,
            },
            _ => OcppErrorCode::formation_violation(version),
        }
    }
}

impl fmt::Display for OcppFrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidJson(msg) => write!(f, "Invalid JSON: {}", msg),
            Self::EmptyArray => write!(f, "Empty OCPP message array"),
            Self::InvalidMessageType => write!(f, "Message type is not a number"),
            Self::UnknownMessageType(t) => write!(f, "Unknown message type: {}", t),
            Self::MissingFields { expected, got } => {
                write!(f, "Expected at least {} fields, got {}", expected, got)
            }
            Self::FieldTypeMismatch(msg) => write!(f, "Field type mismatch: {}", msg),
        }
    }
}

impl std::error::Error for OcppFrameError {}
