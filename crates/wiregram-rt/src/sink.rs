//! Sinks: reassembly of arbitrary-offset chunks feeding a sub-parser.
//!
//! A sink accepts writes at any offset, orders them, resolves overlaps
//! according to its policy, and forwards the maximal in-order prefix to
//! the connected parser. Bytes reach the sub-parser in strictly
//! increasing offset order, each byte at most once.

use std::collections::BTreeMap;

use wiregram_core::{ParseError, Result, UnitValue};

use crate::driver::Driver;

/// How overlapping writes are resolved.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SinkPolicy {
    /// Keep the bytes that arrived first.
    #[default]
    FirstWins,
    /// Newer bytes overwrite older ones.
    LastWins,
    /// Overlaps must agree byte-for-byte; a mismatch is a parse error.
    Strict,
}

/// Transforms bytes on their way from reassembly to the sub-parser.
pub trait Filter {
    fn transform(&mut self, chunk: &[u8]) -> Result<Vec<u8>>;

    /// Final output once the sink closes.
    fn finish(&mut self) -> Result<Vec<u8>> {
        Ok(Vec::new())
    }
}

/// The no-op filter.
#[derive(Clone, Copy, Debug, Default)]
pub struct IdentityFilter;

impl Filter for IdentityFilter {
    fn transform(&mut self, chunk: &[u8]) -> Result<Vec<u8>> {
        Ok(chunk.to_vec())
    }
}

#[derive(Default)]
pub struct Sink {
    policy: SinkPolicy,
    initial_seq: u64,
    /// Next offset (normalized) the sub-parser is waiting for.
    expected: u64,
    /// Non-overlapping buffered chunks above `expected`.
    buffer: BTreeMap<u64, Vec<u8>>,
    /// Recorded holes that have not reached `expected` yet.
    gaps: BTreeMap<u64, u64>,
    driver: Option<Driver>,
    filters: Vec<Box<dyn Filter>>,
    auto_trim: bool,
    /// Total bytes forwarded to the sub-parser.
    delivered: u64,
    /// Position for offset-less sequential writes.
    append_cursor: u64,
    closed: bool,
}

impl Sink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_policy(&mut self, policy: SinkPolicy) {
        self.policy = policy;
    }

    /// Offsets in `write`/`gap`/`skip`/`trim` are interpreted relative
    /// to this number. Must be set before the first write.
    pub fn set_initial_sequence_number(&mut self, n: u64) {
        self.initial_seq = n;
    }

    pub fn set_auto_trim(&mut self, auto_trim: bool) {
        self.auto_trim = auto_trim;
    }

    pub fn connect(&mut self, driver: Driver) {
        self.driver = Some(driver);
    }

    pub fn connect_filter(&mut self, filter: Box<dyn Filter>) {
        self.filters.push(filter);
    }

    /// Connect the parser registered for a MIME type.
    pub fn connect_mime_type(&mut self, mime: &str) -> Result<()> {
        let driver = crate::runtime::driver_for_mime(mime)?;
        self.driver = Some(driver);
        Ok(())
    }

    /// Bytes forwarded to the sub-parser so far.
    pub fn size(&self) -> u64 {
        self.delivered
    }

    /// Next absolute offset the sink is waiting for.
    pub fn expected_offset(&self) -> u64 {
        self.initial_seq + self.expected
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Write a chunk. Without an offset the chunk continues after the
    /// highest write so far.
    pub fn write(&mut self, data: &[u8], offset: Option<u64>) -> Result<()> {
        self.check_open()?;
        if data.is_empty() {
            return Ok(());
        }

        let off = match offset {
            Some(absolute) => absolute.checked_sub(self.initial_seq).ok_or_else(|| {
                ParseError::ContextMismatch(format!(
                    "write at {absolute} below initial sequence number {}",
                    self.initial_seq
                ))
            })?,
            None => self.append_cursor,
        };
        let end = off + data.len() as u64;
        self.append_cursor = self.append_cursor.max(end);

        if end <= self.expected {
            // Entirely stale. Matching content cannot be verified once
            // delivered, so strict mode rejects it.
            if self.policy == SinkPolicy::Strict {
                return Err(ParseError::recoverable(
                    "write below the already-delivered offset",
                    self.initial_seq + off,
                ));
            }
            return Ok(());
        }

        let (off, data) = if off < self.expected {
            if self.policy == SinkPolicy::Strict {
                return Err(ParseError::recoverable(
                    "write starts below the already-delivered offset",
                    self.initial_seq + off,
                ));
            }
            let clip = (self.expected - off) as usize;
            (self.expected, data[clip..].to_vec())
        } else {
            (off, data.to_vec())
        };

        self.insert(off, data)?;
        self.flush()
    }

    /// Record a hole of `len` bytes at `offset`.
    pub fn gap(&mut self, offset: u64, len: u64) -> Result<()> {
        self.check_open()?;
        let off = offset.saturating_sub(self.initial_seq);
        if off + len <= self.expected {
            return Ok(());
        }
        self.gaps.insert(off.max(self.expected), len);
        self.flush()
    }

    /// Discard everything below `offset` and continue from there,
    /// reporting the skipped range to the sub-parser as a hole.
    pub fn skip(&mut self, offset: u64) -> Result<()> {
        self.check_open()?;
        let target = offset.saturating_sub(self.initial_seq);
        if target <= self.expected {
            return Ok(());
        }
        let skipped = target - self.expected;
        self.drop_below(target);
        if let Some(driver) = &mut self.driver {
            driver.process_gap(skipped)?;
        }
        self.expected = target;
        self.flush()
    }

    /// Release buffered bytes below `offset` without delivering them.
    pub fn trim(&mut self, offset: u64) {
        let target = offset.saturating_sub(self.initial_seq);
        self.drop_below(target);
    }

    /// Freeze the sub-parser's input and collect its result.
    pub fn close(&mut self) -> Result<Option<UnitValue>> {
        if self.closed {
            return Err(ParseError::ContextMismatch("sink already closed".to_string()));
        }
        self.flush()?;
        for filter in &mut self.filters {
            let tail = filter.finish()?;
            if !tail.is_empty() {
                if let Some(driver) = &mut self.driver {
                    driver.process(tail)?;
                }
            }
        }
        self.closed = true;
        match &mut self.driver {
            Some(driver) => driver.finish().map(Some),
            None => Ok(None),
        }
    }

    fn check_open(&self) -> Result<()> {
        if self.closed {
            return Err(ParseError::ContextMismatch("sink is closed".to_string()));
        }
        Ok(())
    }

    fn drop_below(&mut self, target: u64) {
        let keys: Vec<u64> = self.buffer.range(..target).map(|(&k, _)| k).collect();
        for key in keys {
            let chunk = self.buffer.remove(&key).expect("key just seen");
            let end = key + chunk.len() as u64;
            if end > target {
                self.buffer
                    .insert(target, chunk[(target - key) as usize..].to_vec());
            }
        }
        self.gaps.retain(|&off, &mut len| off + len > target);
    }

    /// Insert a chunk above `expected`, resolving overlaps per policy.
    fn insert(&mut self, off: u64, data: Vec<u8>) -> Result<()> {
        let end = off + data.len() as u64;
        let overlapping: Vec<u64> = self
            .buffer
            .range(..end)
            .filter(|&(&s, d)| s + d.len() as u64 > off)
            .map(|(&s, _)| s)
            .collect();

        if self.policy == SinkPolicy::LastWins {
            for s in overlapping {
                let existing = self.buffer.remove(&s).expect("key just seen");
                let e = s + existing.len() as u64;
                if s < off {
                    self.buffer
                        .insert(s, existing[..(off - s) as usize].to_vec());
                }
                if e > end {
                    self.buffer
                        .insert(end, existing[(end - s) as usize..].to_vec());
                }
            }
            self.buffer.insert(off, data);
            return Ok(());
        }

        // First-wins and strict: keep existing bytes, insert only the
        // uncovered pieces; strict additionally verifies agreement.
        let mut pos = off;
        let mut pieces: Vec<(u64, Vec<u8>)> = Vec::new();
        for s in overlapping {
            let existing = &self.buffer[&s];
            let e = s + existing.len() as u64;
            if pos < s {
                pieces.push((pos, data[(pos - off) as usize..(s - off) as usize].to_vec()));
            }
            if self.policy == SinkPolicy::Strict {
                let from = pos.max(s);
                let to = end.min(e);
                if from < to {
                    let new_part = &data[(from - off) as usize..(to - off) as usize];
                    let old_part = &existing[(from - s) as usize..(to - s) as usize];
                    if new_part != old_part {
                        return Err(ParseError::recoverable(
                            "overlapping write disagrees with buffered data",
                            self.initial_seq + from,
                        ));
                    }
                }
            }
            pos = pos.max(e.min(end));
            if pos >= end {
                break;
            }
        }
        if pos < end {
            pieces.push((pos, data[(pos - off) as usize..].to_vec()));
        }
        for (at, piece) in pieces {
            self.buffer.insert(at, piece);
        }
        Ok(())
    }

    /// Forward the maximal in-order prefix to the sub-parser.
    fn flush(&mut self) -> Result<()> {
        loop {
            // A hole at the delivery point is reported as a skip.
            if let Some((&gap_off, &gap_len)) = self.gaps.first_key_value() {
                if gap_off <= self.expected {
                    self.gaps.pop_first();
                    let gap_end = gap_off + gap_len;
                    if gap_end > self.expected {
                        let skipped = gap_end - self.expected;
                        if let Some(driver) = &mut self.driver {
                            driver.process_gap(skipped)?;
                        }
                        self.expected = gap_end;
                        self.drop_below(gap_end);
                    }
                    continue;
                }
            }

            let Some((&start, _)) = self.buffer.first_key_value() else {
                return Ok(());
            };
            if start > self.expected {
                return Ok(());
            }
            let (start, chunk) = self.buffer.pop_first().expect("key just seen");
            let end = start + chunk.len() as u64;
            if end <= self.expected {
                continue;
            }
            let payload = chunk[(self.expected - start) as usize..].to_vec();
            self.expected = end;
            self.deliver(payload)?;
        }
    }

    fn deliver(&mut self, mut data: Vec<u8>) -> Result<()> {
        for filter in &mut self.filters {
            data = filter.transform(&data)?;
        }
        self.delivered += data.len() as u64;
        if let Some(driver) = &mut self.driver {
            driver.process(data)?;
        }
        Ok(())
    }
}
