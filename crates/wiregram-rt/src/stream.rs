//! Append-only chunked byte stream and offset-addressed views.
//!
//! Chunks keep their absolute offsets; a view is just a pair of
//! offsets, so it stays valid across `append` (it may see more bytes)
//! and across `trim` (it must not reach below the trim watermark —
//! that is the caller's contract, enforced by the driver which only
//! trims below every live cursor).

use wiregram_core::{ParseError, Result};

#[derive(Clone, Debug)]
struct Chunk {
    offset: u64,
    data: Vec<u8>,
}

impl Chunk {
    fn end(&self) -> u64 {
        self.offset + self.data.len() as u64
    }
}

/// Ordered, append-only sequence of byte chunks with absolute offsets.
///
/// Gaps (from sink `gap`/`skip` reporting) occupy offset space without
/// data; reading across one is a recoverable parse error.
#[derive(Clone, Debug, Default)]
pub struct Stream {
    chunks: Vec<Chunk>,
    /// Offset of the first byte still buffered (trim watermark).
    start: u64,
    /// One past the last appended byte.
    end: u64,
    frozen: bool,
}

/// Result of a resumable search over a stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FindOutcome {
    /// Pattern found at this absolute offset.
    Found(u64),
    /// Not found and no more data can arrive inside the searched range.
    NotFound,
    /// Not found yet; resume the search at this offset once the stream
    /// has grown.
    Partial(u64),
}

impl Stream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk. Empty appends are ignored.
    pub fn append(&mut self, bytes: impl Into<Vec<u8>>) -> Result<()> {
        if self.frozen {
            return Err(ParseError::Frozen);
        }
        let data = bytes.into();
        if data.is_empty() {
            return Ok(());
        }
        let offset = self.end;
        self.end += data.len() as u64;
        self.chunks.push(Chunk { offset, data });
        Ok(())
    }

    /// Advance the end offset without supplying data. Reads across the
    /// hole fail recoverably.
    pub fn append_gap(&mut self, len: u64) -> Result<()> {
        if self.frozen {
            return Err(ParseError::Frozen);
        }
        self.end += len;
        Ok(())
    }

    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn unfreeze(&mut self) {
        self.frozen = false;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn start_offset(&self) -> u64 {
        self.start
    }

    pub fn end_offset(&self) -> u64 {
        self.end
    }

    /// A view over the currently unconsumed extent.
    pub fn view(&self) -> View {
        View {
            start: self.start,
            end: None,
        }
    }

    /// Release chunks strictly below `offset`. The caller must ensure
    /// no live view starts below it.
    pub fn trim(&mut self, offset: u64) {
        let keep = self.chunks.partition_point(|c| c.end() <= offset);
        self.chunks.drain(..keep);
        self.start = self.start.max(offset.min(self.end));
    }

    fn chunk_at(&self, offset: u64) -> Option<&Chunk> {
        let idx = self.chunks.partition_point(|c| c.end() <= offset);
        self.chunks
            .get(idx)
            .filter(|c| c.offset <= offset && offset < c.end())
    }

    /// Copy `[start, end)` into a vector. Fails with a recoverable
    /// error if the range crosses a gap or trimmed region.
    pub fn slice(&self, start: u64, end: u64) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity((end - start) as usize);
        let mut pos = start;
        while pos < end {
            let Some(chunk) = self.chunk_at(pos) else {
                return Err(ParseError::recoverable("gap in input data", pos));
            };
            let from = (pos - chunk.offset) as usize;
            let take = ((end - pos) as usize).min(chunk.data.len() - from);
            out.extend_from_slice(&chunk.data[from..from + take]);
            pos += take as u64;
        }
        Ok(out)
    }

    /// Contiguous slices covering `[start, end)`, in order. Stops early
    /// at a gap.
    pub fn slices(&self, start: u64, end: u64) -> impl Iterator<Item = &[u8]> {
        let mut pos = start;
        std::iter::from_fn(move || {
            if pos >= end {
                return None;
            }
            let chunk = self.chunk_at(pos)?;
            let from = (pos - chunk.offset) as usize;
            let take = ((end - pos) as usize).min(chunk.data.len() - from);
            pos += take as u64;
            Some(&chunk.data[from..from + take])
        })
    }

    /// Search for a byte needle in `[from, limit)`, resumable.
    pub fn find_bytes(&self, needle: &[u8], from: u64, limit: Option<u64>) -> FindOutcome {
        if needle.is_empty() {
            return FindOutcome::Found(from);
        }
        let hard_end = limit.unwrap_or(u64::MAX);
        let scan_end = self.end.min(hard_end);
        let mut pos = from;
        'outer: while pos + needle.len() as u64 <= scan_end {
            for (i, &b) in needle.iter().enumerate() {
                match self.byte_at(pos + i as u64) {
                    Some(have) if have == b => {}
                    _ => {
                        pos += 1;
                        continue 'outer;
                    }
                }
            }
            return FindOutcome::Found(pos);
        }
        let exhausted = hard_end <= self.end || self.frozen;
        if exhausted {
            FindOutcome::NotFound
        } else {
            // Re-scan from the first position that could still match.
            FindOutcome::Partial(pos)
        }
    }

    pub fn byte_at(&self, offset: u64) -> Option<u8> {
        self.chunk_at(offset)
            .map(|c| c.data[(offset - c.offset) as usize])
    }
}

/// A live cursor range over a stream: `(start, optional end bound)`.
///
/// Views are plain offsets and therefore cheap to copy; every access
/// locates the physical chunk through the stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct View {
    start: u64,
    /// Exclusive upper bound installed by `&size`-style boundaries.
    end: Option<u64>,
}

impl View {
    pub fn new(start: u64, end: Option<u64>) -> Self {
        Self { start, end }
    }

    /// Absolute offset of the next unread byte.
    pub fn offset(&self) -> u64 {
        self.start
    }

    pub fn limit(&self) -> Option<u64> {
        self.end
    }

    pub fn with_limit(self, end: u64) -> Self {
        Self {
            start: self.start,
            end: Some(end),
        }
    }

    pub fn without_limit(self) -> Self {
        Self {
            start: self.start,
            end: None,
        }
    }

    /// Bytes currently readable: appended, not past the bound.
    pub fn size(&self, stream: &Stream) -> u64 {
        let end = self.readable_end(stream);
        end.saturating_sub(self.start)
    }

    fn readable_end(&self, stream: &Stream) -> u64 {
        match self.end {
            Some(end) => end.min(stream.end_offset()),
            None => stream.end_offset(),
        }
    }

    /// True iff no byte can ever become readable again.
    pub fn at_eod(&self, stream: &Stream) -> bool {
        self.size(stream) == 0 && self.exhausted(stream)
    }

    /// True iff the view cannot grow: the stream is frozen or the
    /// bound lies within already-appended data.
    pub fn exhausted(&self, stream: &Stream) -> bool {
        stream.is_frozen() || self.end.is_some_and(|end| end <= stream.end_offset())
    }

    /// Require `n` readable bytes, or report why they are not there:
    /// `MissingData` while more input may arrive, a recoverable parse
    /// error once it cannot.
    pub fn require(&self, stream: &Stream, n: u64) -> Result<()> {
        if n <= self.size(stream) {
            return Ok(());
        }
        if self.exhausted(stream) {
            Err(ParseError::recoverable("insufficient input", self.start))
        } else {
            Err(ParseError::MissingData {
                offset: self.readable_end(stream),
            })
        }
    }

    /// A view starting `n` bytes later.
    pub fn advance(self, stream: &Stream, n: u64) -> Result<View> {
        self.require(stream, n)?;
        Ok(View {
            start: self.start + n,
            end: self.end,
        })
    }

    /// Absolute advance; same failure semantics as `advance`.
    pub fn advance_to(self, stream: &Stream, offset: u64) -> Result<View> {
        if offset < self.start {
            return Err(ParseError::Internal(format!(
                "advance_to({offset}) would move view at {} backwards",
                self.start
            )));
        }
        self.advance(stream, offset - self.start)
    }

    /// A sub-view over `[start, end)` in absolute offsets.
    pub fn sub(self, start: u64, end: u64) -> View {
        View {
            start,
            end: Some(end),
        }
    }

    /// Whether the view begins with the given bytes. `None` means not
    /// decidable yet (suspend and retry).
    pub fn starts_with(&self, stream: &Stream, needle: &[u8]) -> Option<bool> {
        let n = needle.len() as u64;
        if self.size(stream) < n {
            if self.exhausted(stream) {
                return Some(false);
            }
            // A shorter prefix mismatch is already decisive.
            let avail = self.size(stream) as usize;
            let have = stream
                .slice(self.start, self.start + avail as u64)
                .unwrap_or_default();
            if have != needle[..avail.min(needle.len())] {
                return Some(false);
            }
            return None;
        }
        match stream.slice(self.start, self.start + n) {
            Ok(have) => Some(have == needle),
            Err(_) => Some(false),
        }
    }
}
