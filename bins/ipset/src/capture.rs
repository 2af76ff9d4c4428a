//! Transport that records requests instead of sending them.

use std::io;
use std::sync::{Mutex, PoisonError};

use nfset::netlink::Transport;

/// Collects every message handed to it. Used by `--dry-run`.
#[derive(Debug, Default)]
pub struct Capture {
    sent: Mutex<Vec<Vec<u8>>>,
}

impl Capture {
    /// Take the recorded messages, oldest first.
    pub fn take(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut *self.sent.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl Transport for Capture {
    fn send(&self, msg: &[u8]) -> io::Result<()> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(msg.to_vec());
        Ok(())
    }
}
