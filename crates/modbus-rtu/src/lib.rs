use std::cmp::min;
use std::time::Duration;

use tokio::time::{sleep, timeout};
use tokio_modbus::client::rtu;
use tokio_modbus::client::Context;
use tokio_modbus::prelude::{Reader, Slave, Writer};
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, warn};

use types::{BusError, RegisterBus};

/// Configuration for the serial Modbus-RTU link.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    pub device: String,
    pub baud_rate: u32,
    pub slave_id: u8,
    /// Per-request timeout in milliseconds.
    pub timeout_ms: u64,
    /// Number of retries per request after the initial attempt.
    pub retry_count: usize,
    /// Base delay between retries in milliseconds (exponential backoff).
    pub retry_backoff_ms: u64,
    /// Upper bound for retry backoff delay in milliseconds.
    pub retry_max_backoff_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            device: "/dev/ttyUSB0".to_string(),
            baud_rate: 9_600,
            slave_id: 1,
            timeout_ms: 1_000,
            retry_count: 2,
            retry_backoff_ms: 100,
            retry_max_backoff_ms: 2_000,
        }
    }
}

/// Exclusive handle to the serial link. The bus is half duplex, so the
/// device is owned by a single caller and every transaction runs to
/// completion before the next one starts.
#[derive(Debug)]
pub struct RtuDevice {
    config: SerialConfig,
    context: Context,
}

impl RtuDevice {
    /// Opens the serial port and attaches an RTU context. Must run on
    /// a tokio runtime.
    pub fn connect(config: SerialConfig) -> Result<Self, BusError> {
        let builder = tokio_serial::new(&config.device, config.baud_rate);
        let port = builder
            .open_native_async()
            .map_err(|err| BusError::Serial(err.to_string()))?;
        let context = rtu::attach_slave(port, Slave(config.slave_id));
        Ok(Self { config, context })
    }

    fn retry_delay_ms(&self, attempt: usize) -> u64 {
        retry_delay_ms(&self.config, attempt)
    }
}

fn retry_delay_ms(config: &SerialConfig, attempt: usize) -> u64 {
    let base = config.retry_backoff_ms.max(1);
    let shift = u32::try_from(attempt).unwrap_or(u32::MAX).min(31);
    let factor = 1u64 << shift;
    let delay = base.saturating_mul(factor);
    min(delay, config.retry_max_backoff_ms.max(base))
}

impl RegisterBus for RtuDevice {
    async fn read_registers(&mut self, address: u16, count: u16) -> Result<Vec<u16>, BusError> {
        if count == 0 {
            return Ok(Vec::new());
        }

        let mut attempts = 0usize;
        loop {
            let request = self.context.read_holding_registers(address, count);
            let result = timeout(Duration::from_millis(self.config.timeout_ms), request).await;
            let last_error = match result {
                Ok(Ok(values)) => {
                    debug!(address, count, "modbus read ok");
                    return Ok(values);
                }
                Ok(Err(err)) => {
                    warn!(address, count, error = %err, "modbus read error");
                    BusError::Transport(err.to_string())
                }
                Err(_) => {
                    warn!(address, count, "modbus read timeout");
                    BusError::Timeout {
                        timeout_ms: self.config.timeout_ms,
                    }
                }
            };

            if attempts >= self.config.retry_count {
                return Err(last_error);
            }

            let delay_ms = self.retry_delay_ms(attempts);
            attempts += 1;
            sleep(Duration::from_millis(delay_ms)).await;
        }
    }

    async fn write_register(&mut self, address: u16, value: u16) -> Result<(), BusError> {
        let mut attempts = 0usize;
        loop {
            let request = self.context.write_single_register(address, value);
            let result = timeout(Duration::from_millis(self.config.timeout_ms), request).await;
            let last_error = match result {
                Ok(Ok(())) => {
                    debug!(address, value, "modbus write ok");
                    return Ok(());
                }
                Ok(Err(err)) => {
                    warn!(address, value, error = %err, "modbus write error");
                    BusError::Transport(err.to_string())
                }
                Err(_) => {
                    warn!(address, value, "modbus write timeout");
                    BusError::Timeout {
                        timeout_ms: self.config.timeout_ms,
                    }
                }
            };

            if attempts >= self.config.retry_count {
                return Err(last_error);
            }

            let delay_ms = self.retry_delay_ms(attempts);
            attempts += 1;
            sleep(Duration::from_millis(delay_ms)).await;
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_delay_doubles_and_caps() {
        let config = SerialConfig {
            retry_backoff_ms: 100,
            retry_max_backoff_ms: 2_000,
            ..SerialConfig::default()
        };
        assert_eq!(retry_delay_ms(&config, 0), 100);
        assert_eq!(retry_delay_ms(&config, 1), 200);
        assert_eq!(retry_delay_ms(&config, 2), 400);
        assert_eq!(retry_delay_ms(&config, 10), 2_000);
    }

    #[test]
    fn retry_delay_never_zero() {
        let config = SerialConfig {
            retry_backoff_ms: 0,
            retry_max_backoff_ms: 0,
            ..SerialConfig::default()
        };
        assert_eq!(retry_delay_ms(&config, 0), 1);
    }
}
