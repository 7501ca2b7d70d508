//! Threaded transport over two bounded crossbeam channels.
//!
//! Every request carries a sequence number and the reply echoes it, so a
//! reply that arrives after its request timed out never answers the next
//! request. A late exchange reply still carries host state the scene has not
//! seen; it is kept and returned ahead of the next exchange's reply.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, SendTimeoutError, Sender};
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::{replies_from, FullState, HostBridge, Transport, TransportStats};
use crate::error::TransportError;

#[derive(Debug)]
enum Request {
    Exchange(Vec<u8>),
    FullState,
}

#[derive(Debug)]
enum Reply {
    Exchange(Vec<u8>),
    FullState(FullState),
}

/// Creates a connected transport/endpoint pair.
///
/// `capacity` bounds each direction; `timeout` bounds how long the sandbox
/// waits to send a request and to receive its reply.
#[must_use]
pub fn channel_transport(capacity: usize, timeout: Duration) -> (ChannelTransport, HostEndpoint) {
    let (request_tx, request_rx) = bounded(capacity.max(1));
    let (reply_tx, reply_rx) = bounded(capacity.max(1));
    (
        ChannelTransport {
            requests: request_tx,
            replies: reply_rx,
            timeout,
            next_seq: 0,
            late: Vec::new(),
            stats: TransportStats::default(),
        },
        HostEndpoint {
            requests: request_rx,
            replies: reply_tx,
        },
    )
}

/// Sandbox end of a channel pair.
pub struct ChannelTransport {
    requests: Sender<(u64, Request)>,
    replies: Receiver<(u64, Reply)>,
    timeout: Duration,
    next_seq: u64,
    /// Host batches from exchanges that timed out.
    late: Vec<Vec<u8>>,
    stats: TransportStats,
}

impl ChannelTransport {
    fn request(&mut self, request: Request) -> Result<Reply, TransportError> {
        let seq = self.next_seq;
        self.next_seq += 1;

        self.requests
            .send_timeout((seq, request), self.timeout)
            .map_err(|err| match err {
                SendTimeoutError::Timeout(_) => TransportError::Timeout(self.timeout),
                SendTimeoutError::Disconnected(_) => TransportError::Disconnected,
            })?;

        let deadline = Instant::now() + self.timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.replies.recv_timeout(remaining) {
                Ok((reply_seq, reply)) if reply_seq == seq => return Ok(reply),
                Ok((stale, Reply::Exchange(batch))) => {
                    debug!(stale, expected = seq, bytes = batch.len(), "Keeping late host reply");
                    self.late.extend(replies_from(batch));
                }
                Ok((stale, Reply::FullState(_))) => {
                    debug!(stale, expected = seq, "Discarding late full state");
                }
                Err(RecvTimeoutError::Timeout) => return Err(TransportError::Timeout(self.timeout)),
                Err(RecvTimeoutError::Disconnected) => return Err(TransportError::Disconnected),
            }
        }
    }
}

impl Transport for ChannelTransport {
    fn send_batch(&mut self, batch: &[u8]) -> Result<Vec<Vec<u8>>, TransportError> {
        match self.request(Request::Exchange(batch.to_vec()))? {
            Reply::Exchange(reply) => {
                let mut replies = std::mem::take(&mut self.late);
                replies.extend(replies_from(reply));
                self.stats.record_exchange(batch.len(), &replies);
                Ok(replies)
            }
            Reply::FullState(_) => Err(TransportError::UnexpectedReply("exchange")),
        }
    }

    fn full_state(&mut self) -> Result<FullState, TransportError> {
        self.stats.full_state_requests += 1;
        match self.request(Request::FullState)? {
            Reply::FullState(state) => Ok(state),
            Reply::Exchange(_) => Err(TransportError::UnexpectedReply("full state")),
        }
    }

    fn stats(&self) -> TransportStats {
        self.stats
    }
}

/// Host end of a channel pair.
pub struct HostEndpoint {
    requests: Receiver<(u64, Request)>,
    replies: Sender<(u64, Reply)>,
}

impl HostEndpoint {
    /// Blocks until one request arrives and answers it.
    ///
    /// # Errors
    ///
    /// [`TransportError::Disconnected`] once the sandbox end is dropped.
    pub fn serve_one<H: HostBridge>(&self, host: &mut H) -> Result<(), TransportError> {
        let (seq, request) = self.requests.recv().map_err(|_| TransportError::Disconnected)?;
        let reply = answer(host, request);
        self.replies
            .send((seq, reply))
            .map_err(|_| TransportError::Disconnected)
    }

    /// Serves requests on a new thread until the sandbox end is dropped.
    /// The host is locked only while a single request is answered, so its
    /// owner can inspect or mutate it between exchanges.
    ///
    /// The thread returns the number of requests it answered.
    ///
    /// # Errors
    ///
    /// Fails if the OS refuses to spawn the thread.
    pub fn spawn<H>(self, host: Arc<Mutex<H>>) -> std::io::Result<JoinHandle<u64>>
    where
        H: HostBridge + Send + 'static,
    {
        thread::Builder::new()
            .name("meridian-host".into())
            .spawn(move || {
                let mut served = 0u64;
                while let Ok((seq, request)) = self.requests.recv() {
                    let reply = answer(&mut *host.lock(), request);
                    if self.replies.send((seq, reply)).is_err() {
                        warn!(seq, "Sandbox dropped before the host replied");
                        break;
                    }
                    served += 1;
                }
                debug!(served, "Host endpoint closed");
                served
            })
    }
}

fn answer<H: HostBridge>(host: &mut H, request: Request) -> Reply {
    match request {
        Request::Exchange(batch) => Reply::Exchange(host.exchange(&batch)),
        Request::FullState => Reply::FullState(host.full_state()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingHost {
        exchanges: usize,
    }

    impl HostBridge for CountingHost {
        fn exchange(&mut self, batch: &[u8]) -> Vec<u8> {
            self.exchanges += 1;
            vec![batch.len() as u8]
        }

        fn full_state(&mut self) -> FullState {
            FullState {
                data: Vec::new(),
                has_entities: false,
            }
        }
    }

    #[test]
    fn test_threaded_exchange() {
        let host = Arc::new(Mutex::new(CountingHost { exchanges: 0 }));
        let (mut transport, endpoint) = channel_transport(1, Duration::from_secs(5));
        let handle = endpoint.spawn(Arc::clone(&host)).unwrap();

        assert_eq!(transport.send_batch(&[0; 4]).unwrap(), vec![vec![4]]);
        assert!(!transport.full_state().unwrap().has_entities);
        assert_eq!(host.lock().exchanges, 1);

        drop(transport);
        assert_eq!(handle.join().unwrap(), 2);
    }

    #[test]
    fn test_timeout_without_host() {
        let (mut transport, _endpoint) = channel_transport(1, Duration::from_millis(10));
        let err = transport.send_batch(&[1]).unwrap_err();
        assert_eq!(err, TransportError::Timeout(Duration::from_millis(10)));
    }

    #[test]
    fn test_disconnected_host() {
        let (mut transport, endpoint) = channel_transport(1, Duration::from_millis(10));
        drop(endpoint);
        assert_eq!(transport.full_state().unwrap_err(), TransportError::Disconnected);
    }

    #[test]
    fn test_late_reply_is_returned_with_next_exchange() {
        let (mut transport, endpoint) = channel_transport(2, Duration::from_millis(20));
        // The first request times out because nobody serves it yet.
        assert!(transport.send_batch(&[1]).is_err());

        let mut host = CountingHost { exchanges: 0 };
        let server = thread::spawn(move || {
            endpoint.serve_one(&mut host).unwrap();
            endpoint.serve_one(&mut host).unwrap();
            host.exchanges
        });
        transport.timeout = Duration::from_secs(5);
        assert_eq!(
            transport.send_batch(&[1, 2]).unwrap(),
            vec![vec![1], vec![2]]
        );
        assert_eq!(server.join().unwrap(), 2);
        assert_eq!(transport.stats().batches_received, 2);
    }
}
