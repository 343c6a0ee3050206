//! Streaming regex matching over chunked input.
//!
//! Patterns compile to dense DFAs and are driven byte by byte, so a
//! match can span chunk boundaries and a partially advanced state can
//! be parked across a suspension and resumed without re-scanning bytes
//! the matcher has already seen.

use regex_automata::dfa::{dense, Automaton, StartKind};
use regex_automata::util::primitives::StateID;
use regex_automata::{Anchored, Input, MatchKind};

use wiregram_core::{ParseError, Result};

use crate::stream::{Stream, View};

/// A compiled pattern usable for anchored streaming matches.
#[derive(Debug)]
pub struct StreamRegex {
    pattern: String,
    dfa: dense::DFA<Vec<u32>>,
}

/// Resumable matcher state: the DFA state plus how far it has read.
#[derive(Clone, Debug)]
pub struct MatchState {
    state: StateID,
    /// Bytes fed so far, relative to the match start.
    consumed: u64,
    /// Length of the longest match seen so far.
    longest: Option<u64>,
    dead: bool,
    finished: bool,
}

impl MatchState {
    pub fn longest(&self) -> Option<u64> {
        self.longest
    }

    /// True once no further input can change the outcome.
    pub fn is_settled(&self) -> bool {
        self.dead || self.finished
    }

    pub fn consumed(&self) -> u64 {
        self.consumed
    }
}

impl StreamRegex {
    pub fn new(pattern: &str) -> Result<Self> {
        // MatchKind::All keeps the DFA alive past earlier alternation
        // matches, which the longest-match bookkeeping relies on.
        let dfa = dense::Builder::new()
            .configure(
                dense::Config::new()
                    .start_kind(StartKind::Anchored)
                    .match_kind(MatchKind::All),
            )
            .build(pattern)
            .map_err(|err| {
                ParseError::Internal(format!("cannot compile regex /{pattern}/: {err}"))
            })?;
        Ok(Self {
            pattern: pattern.to_string(),
            dfa,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Fresh matcher state anchored at the current position.
    pub fn start(&self) -> Result<MatchState> {
        let input = Input::new(&[][..]).anchored(Anchored::Yes);
        let state = self
            .dfa
            .start_state_forward(&input)
            .map_err(|err| ParseError::Internal(format!("regex start state: {err}")))?;
        Ok(MatchState {
            state,
            consumed: 0,
            longest: None,
            dead: false,
            finished: false,
        })
    }

    /// Feed bytes into the matcher. Matches are delayed by one byte in
    /// the DFA, so the longest-match bookkeeping records the length
    /// *before* the byte that triggered the match state.
    pub fn advance(&self, st: &mut MatchState, bytes: &[u8]) {
        if st.is_settled() {
            return;
        }
        for &b in bytes {
            let next = self.dfa.next_state(st.state, b);
            st.state = next;
            if self.dfa.is_special_state(next) {
                if self.dfa.is_match_state(next) {
                    st.longest = Some(st.consumed);
                } else if self.dfa.is_dead_state(next) {
                    st.dead = true;
                    return;
                }
            }
            st.consumed += 1;
        }
    }

    /// Tell the matcher no more input is coming.
    pub fn finish(&self, st: &mut MatchState) {
        if st.is_settled() {
            return;
        }
        let eoi = self.dfa.next_eoi_state(st.state);
        if self.dfa.is_match_state(eoi) {
            st.longest = Some(st.consumed);
        }
        st.finished = true;
    }

    /// Drive the matcher over everything readable through `view`.
    /// Returns the matched length, or `None` when undecided
    /// (the caller should suspend and retry after the stream grows).
    ///
    /// `st.consumed` tracks how much of the view has been fed, so
    /// repeated calls after appends never re-read bytes.
    pub fn advance_view(
        &self,
        st: &mut MatchState,
        stream: &Stream,
        view: View,
    ) -> Result<Option<u64>> {
        let readable = view.size(stream);
        if st.consumed < readable {
            let from = view.offset() + st.consumed;
            let to = view.offset() + readable;
            for slice in stream.slices(from, to) {
                self.advance(st, slice);
                if st.is_settled() {
                    break;
                }
            }
        }

        if !st.is_settled() && view.exhausted(stream) {
            self.finish(st);
        }

        if st.is_settled() {
            match st.longest {
                Some(len) => Ok(Some(len)),
                None => Err(ParseError::recoverable(
                    format!("expected /{}/", self.pattern),
                    view.offset(),
                )),
            }
        } else {
            Ok(None)
        }
    }
}
