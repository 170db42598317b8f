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
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::record::DictId;
use crate::sequence::SenderId;
use crate::{DecodeError, Result};

/// Inclusive range of dictionary ids valid for a monitoring session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DictIdRange {
    min: DictId,
    max: DictId,
}

impl DictIdRange {
    pub const ALL: DictIdRange = DictIdRange {
        min: DictId::MIN,
        max: DictId::MAX,
    };

    pub fn new(min: DictId, max: DictId) -> Result<Self> {
        if min > max {
            return Err(DecodeError::InvalidRange { min, max });
        }
        Ok(Self { min, max })
    }

    pub fn min(&self) -> DictId {
        self.min
    }

    pub fn max(&self) -> DictId {
        self.max
    }

    pub fn contains(&self, id: DictId) -> bool {
        (self.min..=self.max).contains(&id)
    }
}

/// Lifecycle of a decoder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecoderPhase {
    /// No `init()` since construction or the last `reset()`
    Uninitialized,
    Active,
    /// Replay bound reached or stop requested; sticky until `reset()`
    Stopped,
}

/// Cooperative cancellation flag shared between a decoder and its driving loop
#[derive(Debug, Clone, Default)]
pub struct StopToken(Arc<AtomicBool>);

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone)]
struct SenderSession {
    range: DictIdRange,
    host_port: String,
}

/// Per-session decoder state: dictionary ranges, sender bindings, stop flag
#[derive(Debug, Default)]
pub struct DecoderState {
    /// Session established by `init`, used for any sender without its own
    default_session: Option<SenderSession>,
    senders: HashMap<SenderId, SenderSession>,
    stop: StopToken,
}

impl DecoderState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Establish the default range and bind the session to `host_port`.
    ///
    /// Re-initialising replaces the previous default session. A pending stop
    /// request survives; only `reset()` clears it.
    pub fn init(&mut self, range: DictIdRange, host_port: &str) {
        self.default_session = Some(SenderSession {
            range,
            host_port: host_port.to_string(),
        });
    }

    /// Give one sender its own range, partitioned from the default session
    pub fn init_sender(&mut self, sender: SenderId, range: DictIdRange, host_port: &str) {
        self.senders.insert(
            sender,
            SenderSession {
                range,
                host_port: host_port.to_string(),
            },
        );
    }

    fn session(&self, sender: Option<SenderId>) -> Option<&SenderSession> {
        sender
            .and_then(|s| self.senders.get(&s))
            .or(self.default_session.as_ref())
    }

    pub fn range_for(&self, sender: Option<SenderId>) -> Option<DictIdRange> {
        self.session(sender).map(|s| s.range)
    }

    pub fn host_port(&self, sender: Option<SenderId>) -> Option<&str> {
        self.session(sender).map(|s| s.host_port.as_str())
    }

    pub fn phase(&self) -> DecoderPhase {
        if self.default_session.is_none() && self.senders.is_empty() {
            DecoderPhase::Uninitialized
        } else if self.stop.is_cancelled() {
            DecoderPhase::Stopped
        } else {
            DecoderPhase::Active
        }
    }

    pub fn stop_token(&self) -> StopToken {
        self.stop.clone()
    }

    pub fn request_stop(&self) {
        self.stop.cancel();
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.is_cancelled()
    }

    pub fn reset(&mut self) {
        self.default_session = None;
        self.senders.clear();
        self.stop.clear();
    }
}
