//! Mock transport for testing plaintext exchanges.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use super::traits::{Transport, TransportError};

/// Which transport call produced a captured frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Query,
    SendOnly,
}

/// Mock transport with scripted replies and captured writes.
pub struct MockTransport {
    /// Queued replies returned by `query`.
    reply_queue: Arc<Mutex<VecDeque<Result<Vec<u8>, TransportError>>>>,
    /// Captured frames.
    write_log: Arc<Mutex<Vec<(FrameKind, Vec<u8>)>>>,
    /// Whether device is "connected".
    connected: Arc<Mutex<bool>>,
    /// Number of `close` calls.
    close_count: Arc<Mutex<usize>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            reply_queue: Arc::new(Mutex::new(VecDeque::new())),
            write_log: Arc::new(Mutex::new(Vec::new())),
            connected: Arc::new(Mutex::new(true)),
            close_count: Arc::new(Mutex::new(0)),
        }
    }

    /// Queue a reply to be returned by the next `query`.
    pub fn queue_reply(&self, reply: &[u8]) {
        self.reply_queue
            .lock()
            .unwrap()
            .push_back(Ok(reply.to_vec()));
    }

    /// Queue an error to be returned by the next `query`.
    pub fn queue_error(&self, err: TransportError) {
        self.reply_queue.lock().unwrap().push_back(Err(err));
    }

    /// Get all captured frames, in order.
    pub fn get_writes(&self) -> Vec<Vec<u8>> {
        self.write_log
            .lock()
            .unwrap()
            .iter()
            .map(|(_, data)| data.clone())
            .collect()
    }

    /// Get captured frames together with how they were sent.
    pub fn get_frames(&self) -> Vec<(FrameKind, Vec<u8>)> {
        self.write_log.lock().unwrap().clone()
    }

    /// Simulate device disconnect.
    pub fn disconnect(&self) {
        *self.connected.lock().unwrap() = false;
    }

    /// Number of times `close` was called.
    pub fn close_count(&self) -> usize {
        *self.close_count.lock().unwrap()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for MockTransport {
    fn send_frame(&self, data: &[u8]) -> Result<(), TransportError> {
        if !*self.connected.lock().unwrap() {
            return Err(TransportError::Disconnected);
        }
        self.write_log
            .lock()
            .unwrap()
            .push((FrameKind::SendOnly, data.to_vec()));
        Ok(())
    }

    fn query(&self, data: &[u8]) -> Result<Vec<u8>, TransportError> {
        if !*self.connected.lock().unwrap() {
            return Err(TransportError::Disconnected);
        }
        self.write_log
            .lock()
            .unwrap()
            .push((FrameKind::Query, data.to_vec()));
        self.reply_queue
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(TransportError::Timeout { timeout_ms: 5000 }))
    }

    fn close(&self) {
        *self.connected.lock().unwrap() = false;
        *self.close_count.lock().unwrap() += 1;
    }
}
