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

use std::collections::HashMap;
use std::net::SocketAddr;

use tracing::{info, warn};
use xrdmon_decoder::sequence::LEGACY_NO_SENDER;
use xrdmon_decoder::SenderId;

/// Result of looking up a peer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Known(SenderId),
    New(SenderId),
    /// Every id is taken; the peer shares the anonymous sender
    Exhausted,
}

impl Registration {
    pub fn sender(self) -> Option<SenderId> {
        match self {
            Registration::Known(id) | Registration::New(id) => Some(id),
            Registration::Exhausted => None,
        }
    }
}

/// Assigns a stable `SenderId` to each server address seen on the socket
#[derive(Debug, Default)]
pub struct SenderRegistry {
    by_addr: HashMap<SocketAddr, SenderId>,
    next: u16,
}

impl SenderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolve(&mut self, peer: SocketAddr) -> Registration {
        if let Some(id) = self.by_addr.get(&peer) {
            return Registration::Known(*id);
        }

        let Some(id) = SenderId::new(self.next) else {
            if self.next == LEGACY_NO_SENDER {
                warn!("Sender ids exhausted; {peer} is decoded without one");
                // Only warn once
                self.next += 1;
            }
            return Registration::Exhausted;
        };
        self.next += 1;
        self.by_addr.insert(peer, id);
        info!("New monitoring sender {peer} registered as {id}");
        Registration::New(id)
    }

    pub fn len(&self) -> usize {
        self.by_addr.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_addr.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([10, 0, 0, 1], port))
    }

    #[test]
    fn test_same_peer_keeps_its_id() {
        let mut registry = SenderRegistry::new();
        let first = registry.resolve(addr(1094));
        assert!(matches!(first, Registration::New(_)));
        assert_eq!(registry.resolve(addr(1094)), Registration::Known(first.sender().unwrap()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_distinct_peers_get_distinct_ids() {
        let mut registry = SenderRegistry::new();
        let a = registry.resolve(addr(1)).sender();
        let b = registry.resolve(addr(2)).sender();
        assert_ne!(a, b);
    }

    #[test]
    fn test_exhaustion_falls_back_to_anonymous() {
        let mut registry = SenderRegistry {
            by_addr: HashMap::new(),
            next: LEGACY_NO_SENDER - 1,
        };
        assert!(matches!(registry.resolve(addr(1)), Registration::New(_)));
        assert_eq!(registry.resolve(addr(2)), Registration::Exhausted);
        assert_eq!(registry.resolve(addr(3)), Registration::Exhausted);
        assert_eq!(registry.resolve(addr(2)).sender(), None);
    }
}
