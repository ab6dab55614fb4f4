use std::fmt;
use std::future::Future;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod topics;

/// Last observed or resolved value of a point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Float(f64),
    Int(i64),
    Text(String),
}

impl Value {
    /// Numeric view used by derived-point arithmetic. Text values have
    /// no numeric meaning and yield `None`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(value) => Some(*value),
            Value::Int(value) => Some(*value as f64),
            Value::Text(_) => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Float(value) => write!(f, "{value}"),
            Value::Int(value) => write!(f, "{value}"),
            Value::Text(value) => write!(f, "{value}"),
        }
    }
}

/// Identity block attached to every discovery record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub name: String,
    pub identifiers: Vec<String>,
    pub manufacturer: String,
    pub model: String,
    pub serial_number: String,
}

/// A write request received from the command channel, forwarded
/// verbatim to the scheduler.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteCommand {
    pub point: String,
    pub payload: String,
}

/// An outbound state publish produced by the scheduler.
#[derive(Debug, Clone, PartialEq)]
pub struct Publication {
    pub topic: String,
    pub payload: String,
}

#[derive(Debug, Error)]
pub enum BusError {
    #[error("request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("modbus transport error: {0}")]
    Transport(String),
    #[error("serial port error: {0}")]
    Serial(String),
}

/// One half-duplex register transaction at a time. Implementations own
/// their timeout and retry policy; failures come back as `BusError`,
/// never as a panic.
pub trait RegisterBus {
    fn read_registers(
        &mut self,
        address: u16,
        count: u16,
    ) -> impl Future<Output = Result<Vec<u16>, BusError>> + Send;

    fn write_register(
        &mut self,
        address: u16,
        value: u16,
    ) -> impl Future<Output = Result<(), BusError>> + Send;
}
