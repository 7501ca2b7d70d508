//! Same-thread transport.

use std::cell::RefCell;
use std::rc::Rc;

use super::{replies_from, FullState, HostBridge, Transport, TransportStats};
use crate::error::TransportError;

/// Calls the host directly. The host stays reachable by its owner through
/// the shared handle between ticks.
pub struct DirectTransport<H: HostBridge> {
    host: Rc<RefCell<H>>,
    stats: TransportStats,
}

impl<H: HostBridge> DirectTransport<H> {
    /// Creates a transport over a shared host.
    pub fn new(host: Rc<RefCell<H>>) -> Self {
        Self {
            host,
            stats: TransportStats::default(),
        }
    }

    /// The shared host handle.
    pub fn host(&self) -> &Rc<RefCell<H>> {
        &self.host
    }
}

impl<H: HostBridge> Transport for DirectTransport<H> {
    fn send_batch(&mut self, batch: &[u8]) -> Result<Vec<Vec<u8>>, TransportError> {
        let reply = self.host.borrow_mut().exchange(batch);
        let replies = replies_from(reply);
        self.stats.record_exchange(batch.len(), &replies);
        Ok(replies)
    }

    fn full_state(&mut self) -> Result<FullState, TransportError> {
        self.stats.full_state_requests += 1;
        Ok(self.host.borrow_mut().full_state())
    }

    fn stats(&self) -> TransportStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct EchoHost {
        received: Vec<Vec<u8>>,
    }

    impl HostBridge for EchoHost {
        fn exchange(&mut self, batch: &[u8]) -> Vec<u8> {
            self.received.push(batch.to_vec());
            batch.iter().rev().copied().collect()
        }

        fn full_state(&mut self) -> FullState {
            FullState {
                data: vec![vec![7]],
                has_entities: true,
            }
        }
    }

    #[test]
    fn test_exchange_and_stats() {
        let host = Rc::new(RefCell::new(EchoHost::default()));
        let mut transport = DirectTransport::new(Rc::clone(&host));

        assert_eq!(transport.send_batch(&[1, 2, 3]).unwrap(), vec![vec![3, 2, 1]]);
        assert!(transport.send_batch(&[]).unwrap().is_empty());
        assert!(transport.full_state().unwrap().has_entities);

        let stats = transport.stats();
        assert_eq!(stats.batches_sent, 2);
        assert_eq!(stats.batches_received, 1);
        assert_eq!(stats.bytes_sent, 3);
        assert_eq!(stats.full_state_requests, 1);
        assert_eq!(host.borrow().received.len(), 2);
    }
}
