//! Link abstraction and the MTU-bounded send buffer.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::config::DEFAULT_MTU;
use crate::error::{Error, Result};
use crate::protocol::chunk_data;

/// Byte sink for the printer link (BLE characteristic, capture buffer, mock).
///
/// Writes must reach the printer in call order.
#[async_trait]
pub trait Sink: Send {
    /// Write one block of bytes to the printer.
    async fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Largest block the link accepts in one write.
    fn mtu(&self) -> usize {
        DEFAULT_MTU
    }
}

/// Capture sink, every write is appended. Handy for dry runs.
#[async_trait]
impl Sink for Vec<u8> {
    async fn write(&mut self, data: &[u8]) -> Result<()> {
        self.extend_from_slice(data);
        Ok(())
    }
}

/// Shared pause flag.
///
/// Cloning gives another handle to the same flag, so whoever reads printer
/// notifications can hold the transport while a flush is waiting.
#[derive(Debug, Clone, Default)]
pub struct PauseFlag(Arc<AtomicBool>);

impl PauseFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, paused: bool) {
        self.0.store(paused, Ordering::Release);
    }

    #[inline]
    pub fn is_paused(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Suspends until the flag is clear, re-checking every `poll`.
    pub async fn wait_until_clear(&self, poll: Duration) {
        if !self.is_paused() {
            return;
        }
        log::warn!("printer paused, holding writes");
        while self.is_paused() {
            tokio::time::sleep(poll).await;
        }
        log::debug!("printer resumed");
    }
}

/// Accumulates encoded frames and hands them to the sink in MTU-sized writes.
pub struct TransportBuffer<S> {
    sink: S,
    buf: Vec<u8>,
    mtu: usize,
    write_delay: Duration,
    poll_interval: Duration,
    paused: PauseFlag,
}

impl<S: Sink> TransportBuffer<S> {
    /// Fails if `mtu` is zero.
    pub fn new(
        sink: S,
        mtu: usize,
        write_delay: Duration,
        poll_interval: Duration,
    ) -> Result<Self> {
        if mtu == 0 {
            return Err(Error::Configuration("mtu must be at least 1".into()));
        }
        Ok(Self {
            sink,
            buf: Vec::with_capacity(mtu),
            mtu,
            write_delay,
            poll_interval,
            paused: PauseFlag::new(),
        })
    }

    pub fn mtu(&self) -> usize {
        self.mtu
    }

    /// Bytes waiting for the next flush.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn pause_flag(&self) -> PauseFlag {
        self.paused.clone()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Drops anything still buffered and returns the sink.
    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Appends `data`, flushing first if it would not fit.
    ///
    /// Data larger than the whole buffer is written through in MTU-sized
    /// blocks right away.
    pub async fn enqueue(&mut self, data: &[u8]) -> Result<()> {
        if self.buf.len() + data.len() > self.mtu {
            self.flush().await?;
        }
        if data.len() > self.mtu {
            log::warn!(
                "{} byte block exceeds mtu {}, writing through",
                data.len(),
                self.mtu
            );
            for chunk in chunk_data(data, self.mtu) {
                self.buf.extend_from_slice(chunk);
                self.flush().await?;
            }
            return Ok(());
        }
        self.buf.extend_from_slice(data);
        Ok(())
    }

    /// Writes the buffered bytes to the sink as one block.
    ///
    /// No-op when empty. Waits while the printer is paused, and sleeps for
    /// the write delay afterwards. On a failed write the buffered bytes are
    /// discarded and the error returned.
    pub async fn flush(&mut self) -> Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        self.paused.wait_until_clear(self.poll_interval).await;
        self.write_now().await?;
        tokio::time::sleep(self.write_delay).await;
        Ok(())
    }

    /// Writes `data` straight to the sink, ahead of anything buffered.
    pub async fn write_direct(&mut self, data: &[u8]) -> Result<()> {
        log::trace!("write direct({}): {:02x?}", data.len(), data);
        self.sink.write(data).await?;
        tokio::time::sleep(self.write_delay).await;
        Ok(())
    }

    async fn write_now(&mut self) -> Result<()> {
        log::trace!(
            "write({}): {:02x?}",
            self.buf.len(),
            &self.buf[..self.buf.len().min(16)]
        );
        let res = self.sink.write(&self.buf).await;
        self.buf.clear();
        res
    }
}
