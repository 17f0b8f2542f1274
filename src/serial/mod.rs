//! # Serial Communication Module
//!
//! Handles the serial links to the transceiver and the rotator.
//!
//! This module handles:
//! - Opening a port at the configured baud rate (8N1, no flow control)
//! - Async read/write operations through the [`SerialLink`] trait
//! - Idempotent open/close so a controller can be restarted on the same link

pub mod port_trait;

pub use port_trait::SerialLink;

use async_trait::async_trait;
use std::io;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info, warn};

/// Baud rates accepted by the supported radios and rotator interfaces
pub const SUPPORTED_BAUD_RATES: &[u32] = &[4800, 9600, 19200, 38400, 57600, 115200];

/// Serial link backed by `tokio_serial`
///
/// The port is opened lazily by [`SerialLink::open`] and released by
/// [`SerialLink::close`], so the same value can be reused across controller
/// restarts.
pub struct TokioSerialLink {
    /// Device path (e.g., /dev/ttyUSB0)
    device_path: String,
    /// Baud rate
    baud_rate: u32,
    /// Serial port handle while open
    port: Option<tokio_serial::SerialStream>,
}

impl std::fmt::Debug for TokioSerialLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokioSerialLink")
            .field("device_path", &self.device_path)
            .field("baud_rate", &self.baud_rate)
            .field("open", &self.port.is_some())
            .finish_non_exhaustive()
    }
}

impl TokioSerialLink {
    /// Create a closed link for `device_path` at `baud_rate`
    ///
    /// # Examples
    ///
    /// ```
    /// use orbit_rig::serial::{SerialLink, TokioSerialLink};
    ///
    /// let link = TokioSerialLink::new("/dev/ttyUSB0", 9600);
    /// assert!(!link.is_open());
    /// assert_eq!(link.device_path(), "/dev/ttyUSB0");
    /// ```
    pub fn new(device_path: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            device_path: device_path.into(),
            baud_rate,
            port: None,
        }
    }

    /// Open a specific serial port with 8N1 settings
    ///
    /// # Arguments
    ///
    /// * `path` - Device path (e.g., "/dev/ttyUSB0")
    /// * `baud_rate` - Line speed
    ///
    /// # Returns
    ///
    /// * `io::Result<SerialStream>` - Opened serial port
    fn open_port(path: &str, baud_rate: u32) -> io::Result<tokio_serial::SerialStream> {
        tokio_serial::new(path, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|e| {
                io::Error::new(io::ErrorKind::NotFound, format!("Failed to open {}: {}", path, e))
            })
    }

    fn port_mut(&mut self) -> io::Result<&mut tokio_serial::SerialStream> {
        let path = &self.device_path;
        self.port.as_mut().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotConnected, format!("{} is not open", path))
        })
    }
}

#[async_trait]
impl SerialLink for TokioSerialLink {
    async fn open(&mut self) -> io::Result<()> {
        if self.port.is_some() {
            debug!("Serial port {} already open", self.device_path);
            return Ok(());
        }

        debug!("Trying to open serial port: {}", self.device_path);
        match Self::open_port(&self.device_path, self.baud_rate) {
            Ok(port) => {
                info!("Opened {} at {} baud", self.device_path, self.baud_rate);
                self.port = Some(port);
                Ok(())
            }
            Err(e) => {
                warn!("{}", e);
                Err(e)
            }
        }
    }

    async fn close(&mut self) -> io::Result<()> {
        if let Some(mut port) = self.port.take() {
            port.flush().await?;
            info!("Closed {}", self.device_path);
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    async fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.port_mut()?.write_all(data).await
    }

    async fn flush(&mut self) -> io::Result<()> {
        self.port_mut()?.flush().await
    }

    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port_mut()?.read(buf).await
    }

    fn device_path(&self) -> &str {
        &self.device_path
    }
}
