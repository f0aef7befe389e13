// Copyright 2020 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Sequence map: correlates a 16-bit ICMP sequence number back to the
//! `(host, ping_index)` that sent it.
//!
//! The table is sized to the full `u16` range so `add` never has to search
//! for a free slot; wrap-around is benign as long as the retention window
//! is shorter than the time it takes the counter to wrap back around to a
//! still-outstanding entry (see `spec` §9).

use crate::clock::TimeNs;

#[derive(Debug, Clone, Copy)]
pub struct SeqEntry {
    pub host_idx: usize,
    pub ping_index: u64,
    pub send_ns: TimeNs,
}

#[derive(Debug)]
pub struct SequenceMap {
    entries: Vec<Option<SeqEntry>>,
    next_seq: u16,
    max_age_ns: TimeNs,
}

impl SequenceMap {
    pub fn new(max_age_ns: TimeNs) -> Self {
        Self {
            entries: vec![None; 1 << 16],
            next_seq: 0,
            max_age_ns,
        }
    }

    /// Assign the next sequence number, recording the send. Returns the
    /// assigned sequence (network byte order is handled by the wire layer,
    /// not here).
    pub fn add(&mut self, host_idx: usize, ping_index: u64, send_ns: TimeNs) -> u16 {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        self.entries[seq as usize] = Some(SeqEntry {
            host_idx,
            ping_index,
            send_ns,
        });
        seq
    }

    /// Look up `seq`. Returns `None` if never assigned, or if the entry is
    /// older than the retention window (treated as garbage, eligible to be
    /// overwritten by a future `add`).
    pub fn fetch(&self, seq: u16, now_ns: TimeNs) -> Option<SeqEntry> {
        match self.entries[seq as usize] {
            Some(e) if now_ns.saturating_sub(e.send_ns) <= self.max_age_ns => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_then_fetch_roundtrips() {
        let mut m = SequenceMap::new(1_000_000_000);
        let seq = m.add(3, 7, 1000);
        let e = m.fetch(seq, 1500).unwrap();
        assert_eq!(e.host_idx, 3);
        assert_eq!(e.ping_index, 7);
        assert_eq!(e.send_ns, 1000);
    }

    #[test]
    fn fetch_absent_returns_none() {
        let m = SequenceMap::new(1_000_000_000);
        assert!(m.fetch(42, 0).is_none());
    }

    #[test]
    fn fetch_expired_returns_none() {
        let mut m = SequenceMap::new(100);
        let seq = m.add(0, 0, 0);
        assert!(m.fetch(seq, 50).is_some());
        assert!(m.fetch(seq, 200).is_none());
    }

    #[test]
    fn sequence_counter_wraps() {
        let mut m = SequenceMap::new(1_000_000_000);
        m.next_seq = u16::MAX;
        let a = m.add(0, 0, 0);
        let b = m.add(0, 1, 0);
        assert_eq!(a, u16::MAX);
        assert_eq!(b, 0);
    }

    #[test]
    fn overwritten_entry_reflects_latest_add() {
        let mut m = SequenceMap::new(1_000_000_000);
        m.next_seq = 5;
        m.add(0, 0, 0);
        m.next_seq = 5;
        m.add(1, 9, 100);
        let e = m.fetch(5, 100).unwrap();
        assert_eq!(e.host_idx, 1);
        assert_eq!(e.ping_index, 9);
    }
}
