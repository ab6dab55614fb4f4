//! Pure translation between raw register words and point values.
//!
//! Nothing here performs I/O; the scheduler feeds in whatever the bus
//! returned and malformed payloads are rejected before any transaction
//! is attempted.

use thiserror::Error;

use types::Value;

use crate::{ReadKind, ReadOp, WriteOp};

/// Scaling constants resolved once at startup and passed explicitly to
/// every decode/encode call that needs them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleContext {
    /// Battery system voltage divided by 12 (1.0 for a 12V bank, 4.0
    /// for 48V); scales every battery voltage threshold register.
    pub battery_rate: f64,
}

impl Default for ScaleContext {
    fn default() -> Self {
        Self { battery_rate: 1.0 }
    }
}

impl ScaleContext {
    /// Builds the context from the rate-voltage register (0xE003).
    pub fn from_rate_voltage(raw: u16) -> Self {
        Self { battery_rate: f64::from(raw) / 12.0 }
    }
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("short response for register {register:#06x}: expected {expected} words, got {got}")]
    ShortResponse { register: u16, expected: u16, got: usize },
    #[error("malformed payload '{0}'")]
    Malformed(String),
    #[error("value {value} outside allowed range {min}..={max}")]
    OutOfRange { value: f64, min: f64, max: f64 },
    #[error("unknown option '{0}'")]
    UnknownOption(String),
    #[error("register {register:#06x} returned unmapped value {raw}")]
    UnknownVariant { register: u16, raw: u16 },
}

/// Result of encoding a write payload.
#[derive(Debug, Clone, PartialEq)]
pub enum EncodedWrite {
    /// One register transaction on the bus. `applied` is the typed view
    /// of the accepted payload, used for optimistic state updates once
    /// the transaction succeeds; triggers carry none.
    Register { register: u16, value: u16, applied: Option<Value> },
    /// No bus traffic; the value is stored directly (interlock).
    Local { value: Value },
}

pub fn decode(op: &ReadOp, registers: &[u16], scale: &ScaleContext) -> Result<Value, CodecError> {
    if registers.len() < op.count as usize {
        return Err(CodecError::ShortResponse {
            register: op.register,
            expected: op.count,
            got: registers.len(),
        });
    }

    match &op.kind {
        ReadKind::Scaled { scale: factor, signed, decimals } => {
            let raw = if *signed {
                f64::from(registers[0] as i16)
            } else {
                f64::from(registers[0])
            };
            Ok(Value::Float(round_to(raw * factor, *decimals)))
        }
        ReadKind::Integer { signed } => {
            let raw = if *signed {
                i64::from(registers[0] as i16)
            } else {
                i64::from(registers[0])
            };
            Ok(Value::Int(raw))
        }
        ReadKind::Text => {
            let mut bytes = Vec::with_capacity(op.count as usize * 2);
            for word in &registers[..op.count as usize] {
                bytes.push((word >> 8) as u8);
                bytes.push((word & 0xFF) as u8);
            }
            let text: String = bytes
                .into_iter()
                .take_while(|byte| *byte != 0)
                .map(char::from)
                .collect();
            Ok(Value::Text(text.trim().to_string()))
        }
        ReadKind::Version { word } => {
            let raw = registers.get(*word).copied().ok_or(CodecError::ShortResponse {
                register: op.register,
                expected: op.count,
                got: registers.len(),
            })?;
            Ok(Value::Text(format!("v{:.2}", f64::from(raw) / 100.0)))
        }
        ReadKind::Enum { options } => {
            let raw = registers[0];
            options
                .iter()
                .find(|(value, _)| *value == raw)
                .map(|(_, label)| Value::Text(label.clone()))
                .ok_or(CodecError::UnknownVariant { register: op.register, raw })
        }
        ReadKind::RateScaled => {
            let volts = f64::from(registers[0]) / 10.0 * scale.battery_rate;
            Ok(Value::Float(round_to(volts, 1)))
        }
        ReadKind::DateTime => {
            let year = (registers[0] >> 8) & 0xFF;
            let month = registers[0] & 0xFF;
            let day = (registers[1] >> 8) & 0xFF;
            let hour = registers[1] & 0xFF;
            let minute = (registers[2] >> 8) & 0xFF;
            let second = registers[2] & 0xFF;
            Ok(Value::Text(format!(
                "20{year:02}-{month:02}-{day:02} {hour:02}:{minute:02}:{second:02}"
            )))
        }
    }
}

pub fn encode(op: &WriteOp, payload: &str, scale: &ScaleContext) -> Result<EncodedWrite, CodecError> {
    let payload = payload.trim();
    match op {
        WriteOp::Number { register, scale: factor, rate_scaled, min, max } => {
            if payload.is_empty() {
                return Err(CodecError::Malformed(payload.to_string()));
            }
            let value: f64 = payload
                .parse()
                .map_err(|_| CodecError::Malformed(payload.to_string()))?;
            if value < *min || value > *max {
                return Err(CodecError::OutOfRange { value, min: *min, max: *max });
            }
            let divisor = if *rate_scaled { scale.battery_rate } else { 1.0 };
            let raw = (value / divisor / factor).round();
            if !(0.0..=f64::from(u16::MAX)).contains(&raw) {
                return Err(CodecError::OutOfRange { value, min: *min, max: *max });
            }
            Ok(EncodedWrite::Register {
                register: *register,
                value: raw as u16,
                applied: Some(Value::Float(value)),
            })
        }
        WriteOp::Select { register, options } => options
            .iter()
            .find(|(_, label)| label == payload)
            .map(|(value, label)| EncodedWrite::Register {
                register: *register,
                value: *value,
                applied: Some(Value::Text(label.clone())),
            })
            .ok_or_else(|| CodecError::UnknownOption(payload.to_string())),
        WriteOp::Switch { register } => {
            let value = match payload {
                "1" | "ON" | "on" | "true" => 1,
                "0" | "OFF" | "off" | "false" => 0,
                _ => return Err(CodecError::Malformed(payload.to_string())),
            };
            Ok(EncodedWrite::Register {
                register: *register,
                value,
                applied: Some(Value::Int(i64::from(value))),
            })
        }
        WriteOp::Trigger { register, value } => {
            Ok(EncodedWrite::Register { register: *register, value: *value, applied: None })
        }
        WriteOp::Arm { options, armed: _ } => {
            if options.iter().any(|option| option == payload) {
                Ok(EncodedWrite::Local { value: Value::Text(payload.to_string()) })
            } else {
                Err(CodecError::UnknownOption(payload.to_string()))
            }
        }
    }
}

fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}
