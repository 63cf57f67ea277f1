//! In-process loopback bus
//!
//! Routes published alerts and mailbox requests onto unbounded channels the
//! creator holds the receiving ends of. Used by the bundled binary (where a
//! transport adapter drains the channels) and by the test suite (where
//! assertions do).

use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use super::{BusClient, BusError, BusResult};
use crate::Alert;

/// A mailbox request captured by the loopback bus.
#[derive(Debug, Clone)]
pub struct MailboxRequest {
    pub address: String,
    pub subject: String,
    pub frames: Vec<String>,
}

#[derive(Default)]
struct Inner {
    connected: bool,
    consumers: Vec<(String, String)>,
    producers: Vec<String>,
}

/// In-process [`BusClient`] implementation.
pub struct ChannelBus {
    inner: Mutex<Inner>,
    alert_tx: mpsc::UnboundedSender<(String, Alert)>,
    request_tx: mpsc::UnboundedSender<MailboxRequest>,
}

impl ChannelBus {
    /// Create a loopback bus plus the receivers for everything sent
    /// through it.
    pub fn new() -> (
        Self,
        mpsc::UnboundedReceiver<(String, Alert)>,
        mpsc::UnboundedReceiver<MailboxRequest>,
    ) {
        let (alert_tx, alert_rx) = mpsc::unbounded_channel();
        let (request_tx, request_rx) = mpsc::unbounded_channel();

        (
            Self {
                inner: Mutex::new(Inner::default()),
                alert_tx,
                request_tx,
            },
            alert_rx,
            request_rx,
        )
    }

    fn ensure_connected(&self) -> BusResult<()> {
        if self.inner.lock().unwrap_or_else(|e| e.into_inner()).connected {
            Ok(())
        } else {
            Err(BusError::NotConnected)
        }
    }
}

#[async_trait]
impl BusClient for ChannelBus {
    async fn connect(&self, endpoint: &str, address: &str) -> BusResult<()> {
        debug!("connect: {endpoint}/{address}");
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .connected = true;
        Ok(())
    }

    async fn set_consumer(&self, stream: &str, pattern: &str) -> BusResult<()> {
        self.ensure_connected()?;
        debug!("consumer: {stream}/{pattern}");
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .consumers
            .push((stream.to_string(), pattern.to_string()));
        Ok(())
    }

    async fn set_producer(&self, stream: &str) -> BusResult<()> {
        self.ensure_connected()?;
        debug!("producer: {stream}");
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .producers
            .push(stream.to_string());
        Ok(())
    }

    async fn publish(&self, subject: &str, alert: &Alert) -> BusResult<()> {
        self.ensure_connected()?;
        trace!("publish: {subject}");
        self.alert_tx
            .send((subject.to_string(), alert.clone()))
            .map_err(|e| BusError::PublishFailed(e.to_string()))
    }

    async fn request(&self, address: &str, subject: &str, frames: Vec<String>) -> BusResult<()> {
        self.ensure_connected()?;
        trace!("request to {address}: {subject}");
        self.request_tx
            .send(MailboxRequest {
                address: address.to_string(),
                subject: subject.to_string(),
                frames,
            })
            .map_err(|e| BusError::RequestFailed(e.to_string()))
    }
}
