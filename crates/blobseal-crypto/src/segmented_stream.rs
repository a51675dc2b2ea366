use std::{
    collections::VecDeque,
    io::{self, Cursor, ErrorKind, Read},
};

use blobseal_core::provider::ByteStream;
use tracing::trace;

/// One source of a [`SegmentedStream`], optionally with a known remaining length.
pub struct Segment {
    reader: ByteStream,
    remaining: Option<u64>,
}

impl Segment {
    /// A source whose length is not known up front.
    pub fn new(reader: ByteStream) -> Self {
        Self {
            reader,
            remaining: None,
        }
    }

    pub fn sized(reader: ByteStream, len: u64) -> Self {
        Self {
            reader,
            remaining: Some(len),
        }
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let len = bytes.len() as u64;
        Self::sized(Box::new(Cursor::new(bytes)), len)
    }

    fn is_drained(&self) -> bool {
        self.remaining == Some(0)
    }
}

/// Forward-only concatenation of independent sources.
///
/// Sources are pulled lazily in order and each one is dropped as soon as it is
/// exhausted, so a long read releases resources incrementally.
pub struct SegmentedStream {
    segments: VecDeque<Segment>,
    position: u64,
    /// Error hit after bytes were already handed out; reported by the next `read`.
    deferred: Option<io::Error>,
}

impl SegmentedStream {
    pub fn new(segments: impl IntoIterator<Item = Segment>) -> Self {
        let mut stream = Self {
            segments: segments.into_iter().collect(),
            position: 0,
            deferred: None,
        };
        stream.drop_drained_head();
        stream
    }

    /// Bytes still to come, if every remaining source reports a length.
    pub fn len(&self) -> Option<u64> {
        self.segments
            .iter()
            .try_fold(0u64, |acc, segment| Some(acc + segment.remaining?))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == Some(0)
    }

    /// False once the last source has been exhausted and dropped.
    pub fn can_read(&self) -> bool {
        !self.segments.is_empty()
    }

    /// Total bytes handed out so far.
    pub fn position(&self) -> u64 {
        self.position
    }

    fn drop_drained_head(&mut self) {
        while self.segments.front().is_some_and(Segment::is_drained) {
            self.advance();
        }
    }

    fn advance(&mut self) {
        if self.segments.pop_front().is_some() {
            trace!(left = self.segments.len(), "segment exhausted");
        }
    }
}

impl Read for SegmentedStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if let Some(err) = self.deferred.take() {
            return Err(err);
        }
        let mut total = 0;

        while total < buf.len() {
            let Some(head) = self.segments.front_mut() else {
                break;
            };

            let read = match head.reader.read(&mut buf[total..]) {
                Ok(read) => read,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if total > 0 => {
                    self.deferred = Some(err);
                    break;
                }
                Err(err) => return Err(err),
            };

            if read == 0 {
                // End of this source; drop it before moving on.
                self.advance();
                continue;
            }

            if let Some(remaining) = head.remaining.as_mut() {
                *remaining = remaining.saturating_sub(read as u64);
            }
            total += read;
            self.drop_drained_head();
        }

        self.position += total as u64;
        Ok(total)
    }
}
