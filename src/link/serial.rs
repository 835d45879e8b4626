//! Serial implementation of the instrument link.
//!
//! Line-oriented command/response over `tokio-serial`: commands are written
//! with a `\n` terminator, responses are read up to the next `\n` with a
//! configurable timeout. Port settings are the instrument's fixed 8N1, no
//! flow control.

use crate::error::{PsuError, PsuResult};
use crate::link::InstrumentLink;
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::task::spawn_blocking;
use tokio_serial::{SerialPortBuilderExt, SerialStream};

/// Serial port link to the power supply.
pub struct SerialLink {
    port: BufReader<SerialStream>,
    read_timeout: Duration,
}

impl SerialLink {
    /// Open the serial port at `address` (a device path such as
    /// `/dev/ttyUSB0`). Opening happens on the blocking pool so the runtime
    /// is not stalled by slow device initialization.
    pub async fn open(address: &str, baud_rate: u32, read_timeout: Duration) -> PsuResult<Self> {
        let address_owned = address.to_string();
        let port = spawn_blocking(move || {
            tokio_serial::new(&address_owned, baud_rate)
                .data_bits(tokio_serial::DataBits::Eight)
                .parity(tokio_serial::Parity::None)
                .stop_bits(tokio_serial::StopBits::One)
                .flow_control(tokio_serial::FlowControl::None)
                .open_native_async()
                .map_err(|e| {
                    PsuError::Connection(format!(
                        "failed to open serial port {}: {}",
                        address_owned, e
                    ))
                })
        })
        .await
        .map_err(|e| PsuError::Connection(format!("serial open task failed: {}", e)))??;

        Ok(Self {
            port: BufReader::new(port),
            read_timeout,
        })
    }

    async fn write_command(&mut self, command: &str) -> PsuResult<()> {
        let framed = format!("{}\n", command);
        self.port
            .get_mut()
            .write_all(framed.as_bytes())
            .await
            .map_err(|e| PsuError::Communication(format!("serial write failed: {}", e)))?;
        self.port
            .get_mut()
            .flush()
            .await
            .map_err(|e| PsuError::Communication(format!("serial flush failed: {}", e)))
    }
}

#[async_trait]
impl InstrumentLink for SerialLink {
    async fn send(&mut self, command: &str) -> PsuResult<()> {
        log::debug!("serial send: {}", command);
        self.write_command(command).await
    }

    async fn query(&mut self, command: &str) -> PsuResult<String> {
        self.write_command(command).await?;

        let mut response = String::new();
        match tokio::time::timeout(self.read_timeout, self.port.read_line(&mut response)).await {
            Ok(Ok(0)) => Err(PsuError::Communication(
                "unexpected EOF from serial port".into(),
            )),
            Ok(Ok(_)) => {
                log::debug!("serial query: {} -> {}", command, response.trim());
                Ok(response.trim().to_string())
            }
            Ok(Err(e)) => Err(PsuError::Communication(format!("serial read failed: {}", e))),
            Err(_) => Err(PsuError::Communication(format!(
                "no response to '{}' within {:?}",
                command, self.read_timeout
            ))),
        }
    }
}
