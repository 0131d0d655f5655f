//! Splitting the feed body into records.

/// ASCII record separator between feed records.
pub const RECORD_SEPARATOR: u8 = 0x1E;

/// Longest record kept by default. Anything longer is dropped whole.
pub const MAX_RECORD_LEN: usize = 1 << 20;

/// Buffers body chunks and yields complete records.
///
/// Chunks from the HTTP body don't line up with records: one chunk may
/// carry several records, or a record may span chunks. An empty record
/// is a heartbeat.
#[derive(Debug)]
pub struct RecordSplitter {
    buffer: Vec<u8>,
    limit: usize,
    /// Skipping the rest of an oversized record.
    discarding: bool,
}

impl Default for RecordSplitter {
    fn default() -> Self {
        Self::with_limit(MAX_RECORD_LEN)
    }
}

impl RecordSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            buffer: Vec::new(),
            limit,
            discarding: false,
        }
    }

    /// Appends `chunk` and drains every record it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        let mut records = Vec::new();
        let mut rest = chunk;
        while let Some(end) = rest.iter().position(|&b| b == RECORD_SEPARATOR) {
            let head = &rest[..end];
            rest = &rest[end + 1..];
            if std::mem::take(&mut self.discarding) {
                continue;
            }
            if self.buffer.len() + head.len() > self.limit {
                self.drop_oversized(self.buffer.len() + head.len());
                continue;
            }
            self.buffer.extend_from_slice(head);
            records.push(std::mem::take(&mut self.buffer));
        }
        if !self.discarding {
            if self.buffer.len() + rest.len() > self.limit {
                self.drop_oversized(self.buffer.len() + rest.len());
                self.discarding = true;
            } else {
                self.buffer.extend_from_slice(rest);
            }
        }
        records
    }

    /// Bytes of an unfinished record still waiting for its separator.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    fn drop_oversized(&mut self, len: usize) {
        tracing::warn!(len, limit = self.limit, "feed record too long, dropping it");
        self.buffer = Vec::new();
    }
}
