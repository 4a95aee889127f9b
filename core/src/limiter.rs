//! Byte-capped collection of a child output stream.
//!
//! The cap is enforced at the wire, not by collect-then-truncate: the first
//! chunk that pushes the cumulative count past the cap is trimmed to fit, the
//! overflow is reported exactly once, and everything after it is dropped. The
//! runner turns that one report into an immediate kill of the process group,
//! so a pathological stream stops costing memory and CPU right away.

/// Default per-stream cap: 1 MiB.
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 1024 * 1024;

#[derive(Debug)]
pub struct StreamLimiter {
    cap: usize,
    total_read: usize,
    overflowed: bool,
    buf: Vec<u8>,
}

impl StreamLimiter {
    pub fn new(cap: usize) -> Self {
        Self {
            cap,
            total_read: 0,
            overflowed: false,
            buf: Vec::new(),
        }
    }

    /// Feed one chunk read from the wire.
    ///
    /// Returns `true` exactly once: on the call that first exceeds the cap.
    /// Exactly `cap` cumulative bytes is not an overflow.
    pub fn push(&mut self, chunk: &[u8]) -> bool {
        let before = self.total_read;
        self.total_read += chunk.len();
        if self.overflowed {
            return false;
        }

        if self.total_read <= self.cap {
            self.buf.extend_from_slice(chunk);
            false
        } else {
            self.buf.extend_from_slice(&chunk[..self.cap - before]);
            self.overflowed = true;
            true
        }
    }

    /// Cumulative bytes seen on the wire, including dropped ones.
    pub fn total_read(&self) -> usize {
        self.total_read
    }

    /// Whether the cap was ever exceeded.
    pub fn overflowed(&self) -> bool {
        self.overflowed
    }

    /// Bytes retained (never more than the cap).
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Consume the limiter and take the collected bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Collected bytes decoded leniently.
    pub fn into_string_lossy(self) -> String {
        String::from_utf8_lossy(&self.buf).into_owned()
    }
}
