//! Trait abstraction for serial link operations to enable testing

use async_trait::async_trait;
use std::io;

/// Byte-oriented serial link owned by exactly one controller at a time.
#[async_trait]
pub trait SerialLink: Send + Sync {
    /// Open the underlying port. Opening an already open link is a no-op.
    async fn open(&mut self) -> io::Result<()>;

    /// Close the underlying port. Closing a closed link is a no-op.
    async fn close(&mut self) -> io::Result<()>;

    /// Whether the port is currently open
    fn is_open(&self) -> bool;

    /// Write all data to the port
    async fn write_all(&mut self, data: &[u8]) -> io::Result<()>;

    /// Flush the output buffer
    async fn flush(&mut self) -> io::Result<()>;

    /// Read whatever bytes are available into `buf`.
    ///
    /// Controllers call this inside `tokio::select!`, so implementations
    /// must be cancel safe: dropping the future must not lose bytes.
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Device path this link talks to
    fn device_path(&self) -> &str;
}
