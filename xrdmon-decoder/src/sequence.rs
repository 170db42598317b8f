/*
 * Copyright 2025 Security Union LLC
 *
 * Licensed under either of
 *
 * * Apache License, Version 2.0
 *   (http://www.apache.org/licenses/LICENSE-2.0)
 * * MIT license
 *   (http://opensource.org/licenses/MIT)
 *
 * at your option.
 *
 * Unless you explicitly state otherwise, any contribution intentionally
 * submitted for inclusion in the work by you, as defined in the Apache-2.0
 * license, shall be dual licensed as above, without any additional terms or
 * conditions.
 */

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Sequence numbers are a single byte on the wire
pub const SEQUENCE_MODULUS: u32 = 256;

/// Raw value older collectors used to mean "no sender". It is never a valid id.
pub const LEGACY_NO_SENDER: u16 = 65500;

/// Identity of the server process that emitted a packet.
///
/// The absence of a sender (single-server decoding) is `Option::<SenderId>::None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SenderId(u16);

impl SenderId {
    /// Returns `None` for values at or above [`LEGACY_NO_SENDER`]
    pub fn new(raw: u16) -> Option<Self> {
        (raw < LEGACY_NO_SENDER).then_some(Self(raw))
    }

    pub fn get(self) -> u16 {
        self.0
    }
}

impl fmt::Display for SenderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sender#{}", self.0)
    }
}

/// A detected gap in a sender's sequence numbers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LossEvent {
    pub sender: Option<SenderId>,
    pub last_seen: u8,
    pub received: u8,
    /// Number of sequence values skipped between `last_seen` and `received`
    pub lost: u32,
}

/// Outcome of checking one packet's sequence number
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceCheck {
    /// First packet seen from this sender
    First,
    InOrder,
    /// Same sequence number as the previous packet
    Duplicate,
    Gap(LossEvent),
}

impl SequenceCheck {
    pub fn lost(&self) -> u32 {
        match self {
            SequenceCheck::Gap(event) => event.lost,
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct SenderSequence {
    last: u8,
    received: u64,
    lost: u64,
}

/// Per-sender loss detection
#[derive(Debug, Default)]
pub struct SequenceTracker {
    senders: HashMap<Option<SenderId>, SenderSequence>,
    total_lost: u64,
}

impl SequenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compare `seq` against the last value recorded for `sender`.
    ///
    /// The stored value always moves to `seq`, so one gap is reported once.
    pub fn check(&mut self, sender: Option<SenderId>, seq: u8) -> SequenceCheck {
        let Some(state) = self.senders.get_mut(&sender) else {
            self.senders.insert(
                sender,
                SenderSequence {
                    last: seq,
                    received: 1,
                    lost: 0,
                },
            );
            return SequenceCheck::First;
        };

        let last = state.last;
        state.last = seq;
        state.received += 1;

        let distance = seq.wrapping_sub(last);
        match distance {
            0 => {
                log::warn!("Duplicate sequence number {seq} from {}", describe(sender));
                SequenceCheck::Duplicate
            }
            1 => SequenceCheck::InOrder,
            _ => {
                let lost = u32::from(distance) - 1;
                if seq < last {
                    log::debug!(
                        "Sequence wrapped for {}: {last} -> {seq}",
                        describe(sender)
                    );
                }
                if lost >= SEQUENCE_MODULUS / 2 {
                    log::warn!(
                        "Sequence {seq} from {} is far behind {last}; may be a reordered packet",
                        describe(sender)
                    );
                }
                log::warn!(
                    "Lost {lost} packets from {} (last {last}, received {seq})",
                    describe(sender)
                );
                state.lost += u64::from(lost);
                self.total_lost += u64::from(lost);
                SequenceCheck::Gap(LossEvent {
                    sender,
                    last_seen: last,
                    received: seq,
                    lost,
                })
            }
        }
    }

    pub fn last_seq(&self, sender: Option<SenderId>) -> Option<u8> {
        self.senders.get(&sender).map(|s| s.last)
    }

    pub fn lost_for(&self, sender: Option<SenderId>) -> u64 {
        self.senders.get(&sender).map_or(0, |s| s.lost)
    }

    pub fn received_for(&self, sender: Option<SenderId>) -> u64 {
        self.senders.get(&sender).map_or(0, |s| s.received)
    }

    pub fn total_lost(&self) -> u64 {
        self.total_lost
    }

    pub fn sender_count(&self) -> usize {
        self.senders.len()
    }

    pub fn reset(&mut self) {
        self.senders.clear();
        self.total_lost = 0;
    }
}

fn describe(sender: Option<SenderId>) -> String {
    sender.map_or_else(|| "default sender".to_string(), |s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_packet_reports_no_loss() {
        let mut tracker = SequenceTracker::new();
        assert_eq!(tracker.check(None, 42), SequenceCheck::First);
        assert_eq!(tracker.last_seq(None), Some(42));
        assert_eq!(tracker.total_lost(), 0);
    }

    #[test]
    fn test_consecutive_across_wraparound() {
        let mut tracker = SequenceTracker::new();
        let sender = SenderId::new(3);

        tracker.check(sender, 250);
        for seq in (251..=255).chain(0..=10) {
            assert_eq!(tracker.check(sender, seq), SequenceCheck::InOrder);
        }
        assert_eq!(tracker.lost_for(sender), 0);
        assert_eq!(tracker.received_for(sender), 17);
    }

    #[test]
    fn test_gap_counts_skipped_values() {
        let mut tracker = SequenceTracker::new();
        tracker.check(None, 10);

        let check = tracker.check(None, 14);
        assert_eq!(check.lost(), 3);
        assert_eq!(
            check,
            SequenceCheck::Gap(LossEvent {
                sender: None,
                last_seen: 10,
                received: 14,
                lost: 3,
            })
        );

        // Not double-reported on the next in-order packet
        assert_eq!(tracker.check(None, 15), SequenceCheck::InOrder);
        assert_eq!(tracker.total_lost(), 3);
    }

    #[test]
    fn test_gap_across_wraparound() {
        let mut tracker = SequenceTracker::new();
        tracker.check(None, 253);
        assert_eq!(tracker.check(None, 2).lost(), 4); // 254, 255, 0, 1
    }

    #[test]
    fn test_duplicate_is_not_loss() {
        let mut tracker = SequenceTracker::new();
        tracker.check(None, 9);
        assert_eq!(tracker.check(None, 9), SequenceCheck::Duplicate);
        assert_eq!(tracker.total_lost(), 0);
    }

    #[test]
    fn test_loss_total_matches_modular_skips() {
        let mut tracker = SequenceTracker::new();
        let seqs: [u8; 9] = [0, 1, 5, 200, 201, 3, 4, 4, 250];

        let mut expected = 0u64;
        for pair in seqs.windows(2) {
            let distance = pair[1].wrapping_sub(pair[0]) as u64;
            if distance > 1 {
                expected += distance - 1;
            }
        }

        for seq in seqs {
            tracker.check(None, seq);
        }
        assert_eq!(tracker.total_lost(), expected);
    }

    #[test]
    fn test_senders_are_tracked_independently() {
        let mut tracker = SequenceTracker::new();
        let a = SenderId::new(1);
        let b = SenderId::new(2);

        tracker.check(a, 1);
        tracker.check(b, 100);
        assert_eq!(tracker.check(a, 2), SequenceCheck::InOrder);
        assert_eq!(tracker.check(b, 101), SequenceCheck::InOrder);
        assert_eq!(tracker.sender_count(), 2);
    }

    #[test]
    fn test_legacy_sentinel_is_not_a_sender() {
        assert_eq!(SenderId::new(LEGACY_NO_SENDER), None);
        assert_eq!(SenderId::new(65499).map(SenderId::get), Some(65499));
    }

    #[test]
    fn test_reset_forgets_senders() {
        let mut tracker = SequenceTracker::new();
        tracker.check(None, 1);
        tracker.check(None, 5);
        tracker.reset();
        assert_eq!(tracker.total_lost(), 0);
        assert_eq!(tracker.check(None, 77), SequenceCheck::First);
    }
}
