//! Modbus TCP transport for FoxESS inverters
//!
//! Talks to the inverter directly over its LAN port or through an RS485/TCP
//! gateway. Connection management is explicit: a failed I/O operation drops
//! the connection and the host decides when to call [`ModbusClient::connect`]
//! again.

use crate::config::ModbusConfig;
use crate::error::{Result, SolarmapError, TransportError};
use crate::logging::{StructuredLogger, get_logger};
use crate::registers::RegisterKind;
use crate::transport::Transport;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::time::timeout;
use tokio_modbus::client::tcp;
use tokio_modbus::prelude::*;

/// Modbus TCP client for one inverter
pub struct ModbusClient {
    /// Modbus TCP client connection
    client: Option<tokio_modbus::client::Context>,

    /// Configuration
    config: ModbusConfig,

    /// Connection timeout
    connection_timeout: Duration,

    /// Operation timeout
    operation_timeout: Duration,

    /// Logger
    logger: StructuredLogger,
}

impl ModbusClient {
    /// Create a new Modbus client
    pub fn new(config: &ModbusConfig) -> Self {
        Self {
            client: None,
            config: config.clone(),
            connection_timeout: Duration::from_millis(config.connect_timeout_ms),
            operation_timeout: Duration::from_millis(config.operation_timeout_ms),
            logger: get_logger("modbus"),
        }
    }

    fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.config.ip, self.config.port)
            .parse()
            .map_err(|e| SolarmapError::Transport(TransportError::Address {
                message: format!("Invalid socket address: {}", e),
            }))
    }

    /// Connect to the Modbus server
    pub async fn connect(&mut self) -> Result<()> {
        let socket_addr = self.socket_addr()?;
        self.logger.info(&format!(
            "Connecting to Modbus server at {} (unit {})",
            socket_addr, self.config.unit_id
        ));

        let slave = Slave(self.config.unit_id);
        match timeout(self.connection_timeout, tcp::connect_slave(socket_addr, slave)).await {
            Ok(Ok(client)) => {
                self.client = Some(client);
                self.logger.info("Successfully connected to Modbus server");
                Ok(())
            }
            Ok(Err(e)) => {
                let error_msg = format!("Failed to connect to Modbus server: {}", e);
                self.logger.error(&error_msg);
                Err(TransportError::io(error_msg).into())
            }
            Err(_) => {
                self.logger.error("Connection timeout");
                Err(TransportError::timeout("connect").into())
            }
        }
    }

    /// Disconnect from the Modbus server
    pub fn disconnect(&mut self) {
        if self.client.take().is_some() {
            self.logger.info("Disconnecting from Modbus server");
        }
    }

    /// Check if connected
    pub fn connected(&self) -> bool {
        self.client.is_some()
    }

    /// Get client reference or error if not connected
    fn get_client(&mut self) -> std::result::Result<&mut tokio_modbus::client::Context, TransportError> {
        self.client.as_mut().ok_or(TransportError::NotConnected)
    }

    /// Flatten a timed-out tokio-modbus result. Transport-level failures
    /// drop the connection; Modbus exceptions keep it.
    fn map_response<T>(
        &mut self,
        operation: &str,
        result: std::result::Result<tokio_modbus::Result<T>, tokio::time::error::Elapsed>,
    ) -> std::result::Result<T, TransportError> {
        let error = match result {
            Ok(Ok(Ok(value))) => return Ok(value),
            Ok(Ok(Err(exception))) => TransportError::Exception {
                code: format!("{:?}", exception),
            },
            Ok(Err(e)) => {
                self.client = None;
                TransportError::io(format!("{} failed: {}", operation, e))
            }
            Err(_) => {
                self.client = None;
                TransportError::timeout(operation)
            }
        };
        self.logger.warn(&format!("{}: {}", operation, error));
        Err(error)
    }
}

#[async_trait::async_trait]
impl Transport for ModbusClient {
    fn is_connected(&self) -> Option<bool> {
        Some(self.connected())
    }

    async fn read(
        &mut self,
        kind: RegisterKind,
        address: u16,
        count: u16,
    ) -> std::result::Result<Vec<u16>, TransportError> {
        let timeout_duration = self.operation_timeout;
        self.logger.debug(&format!(
            "Reading {} {} registers from address {}",
            count, kind, address
        ));

        let client = self.get_client()?;
        let result = match kind {
            RegisterKind::Holding => {
                timeout(timeout_duration, client.read_holding_registers(address, count)).await
            }
            RegisterKind::Input => {
                timeout(timeout_duration, client.read_input_registers(address, count)).await
            }
        };
        let words = self.map_response("read", result)?;
        if words.len() < usize::from(count) {
            return Err(TransportError::ShortResponse {
                expected: usize::from(count),
                actual: words.len(),
            });
        }
        self.logger
            .trace(&format!("Read {} registers: {:?}", words.len(), words));
        Ok(words)
    }

    async fn write(&mut self, address: u16, words: &[u16]) -> std::result::Result<(), TransportError> {
        let timeout_duration = self.operation_timeout;
        self.logger.debug(&format!(
            "Writing {} registers starting at {}: {:?}",
            words.len(),
            address,
            words
        ));

        let client = self.get_client()?;
        let result = match words {
            [] => return Ok(()),
            [word] => timeout(timeout_duration, client.write_single_register(address, *word)).await,
            _ => timeout(timeout_duration, client.write_multiple_registers(address, words)).await,
        };
        self.map_response("write", result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modbus_client_creation() {
        let config = ModbusConfig::default();
        let client = ModbusClient::new(&config);
        assert!(!client.connected());
        assert_eq!(client.is_connected(), Some(false));
        assert_eq!(client.operation_timeout, Duration::from_millis(3000));
    }

    #[tokio::test]
    async fn test_operations_require_connection() {
        let mut client = ModbusClient::new(&ModbusConfig::default());
        assert_eq!(
            client.read(RegisterKind::Input, 31000, 4).await,
            Err(TransportError::NotConnected)
        );
        assert_eq!(
            client.write(41000, &[1]).await,
            Err(TransportError::NotConnected)
        );
    }

    #[tokio::test]
    async fn test_invalid_address_is_rejected() {
        let config = ModbusConfig {
            ip: "not an ip".to_string(),
            ..ModbusConfig::default()
        };
        let mut client = ModbusClient::new(&config);
        let err = client.connect().await.unwrap_err();
        assert!(matches!(
            err,
            SolarmapError::Transport(TransportError::Address { .. })
        ));
    }
}
