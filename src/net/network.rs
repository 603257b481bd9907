//! In-process network for running a process group inside one binary.
//!
//! Uses crossbeam channels to connect processes. Each endpoint is split into
//! an [`EndpointSender`] (the process's [`Transport`]) and an [`Inbox`] (read
//! by the process's dispatcher thread).
//!
//! Delivery is reliable and FIFO per sender/receiver pair. With a non-zero
//! latency range every link gets a forwarder thread that holds each frame for
//! a random delay; since a link's frames pass through one forwarder in order,
//! per-pair FIFO still holds while different links interleave freely.

use std::collections::HashMap;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use log::debug;
use rand::Rng;

use super::message::Message;
use super::transport::{Transport, TransportError};
use crate::ProcessId;

/// A frame as carried by the network: sender id plus encoded bytes.
pub type Envelope = (ProcessId, Vec<u8>);

/// One outbound link.
enum Link {
    /// Straight into the peer's inbox.
    Direct(Sender<Envelope>),
    /// Through a forwarder that releases each frame at its deadline.
    Delayed(Sender<(Instant, Envelope)>),
}

/// Outbound half of an endpoint.
pub struct EndpointSender {
    /// This process's ID.
    process_id: ProcessId,
    /// Links to other processes (keyed by process id).
    tx_map: HashMap<ProcessId, Link>,
    /// Per-message delay range for delayed links.
    latency: (Duration, Duration),
}

impl EndpointSender {
    fn deliver(&self, target: ProcessId, link: &Link, frame: Vec<u8>) -> Result<(), TransportError> {
        let envelope = (self.process_id, frame);
        let sent = match link {
            Link::Direct(tx) => tx.send(envelope).is_ok(),
            Link::Delayed(tx) => {
                let (min, max) = self.latency;
                let delay = if min >= max {
                    min
                } else {
                    rand::thread_rng().gen_range(min..=max)
                };
                tx.send((Instant::now() + delay, envelope)).is_ok()
            }
        };
        if sent {
            Ok(())
        } else {
            Err(TransportError::Disconnected(target))
        }
    }

    /// This endpoint's process id.
    pub fn process_id(&self) -> ProcessId {
        self.process_id
    }

    /// Ids of every peer this endpoint can reach.
    pub fn peers(&self) -> impl Iterator<Item = ProcessId> + '_ {
        self.tx_map.keys().copied()
    }
}

impl Transport for EndpointSender {
    fn send_to(&self, target: ProcessId, message: Message) -> Result<(), TransportError> {
        let link = self
            .tx_map
            .get(&target)
            .ok_or(TransportError::UnknownPeer(target))?;
        self.deliver(target, link, message.encode())
    }

    fn broadcast_to_others(&self, message: Message) -> Result<usize, TransportError> {
        let frame = message.encode();
        let mut count = 0;
        for (&target, link) in &self.tx_map {
            self.deliver(target, link, frame.clone())?;
            count += 1;
        }
        Ok(count)
    }
}

/// Inbound half of an endpoint.
pub struct Inbox {
    /// This process's ID.
    process_id: ProcessId,
    /// Receiver for incoming frames.
    rx: Receiver<Envelope>,
}

impl Inbox {
    pub fn process_id(&self) -> ProcessId {
        self.process_id
    }

    /// Try to receive a frame (non-blocking).
    pub fn try_recv(&self) -> Option<Envelope> {
        self.rx.try_recv().ok()
    }

    /// Receive with timeout.
    ///
    /// `Err(RecvTimeoutError::Disconnected)` once every sender is gone.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Envelope, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// Mock network that connects a fixed set of processes via channels.
pub struct MockNetwork {
    /// Member ids, in creation order.
    ids: Vec<ProcessId>,
    /// Senders for each process's inbox.
    inbox_senders: HashMap<ProcessId, Sender<Envelope>>,
    /// Receivers for each process's inbox (taken when the endpoint is created).
    inbox_receivers: HashMap<ProcessId, Receiver<Envelope>>,
    /// Per-message delay range; zero means direct delivery.
    latency: (Duration, Duration),
}

impl MockNetwork {
    /// Create a network with direct delivery between `ids`.
    pub fn new(ids: &[ProcessId]) -> Self {
        Self::with_latency(ids, (Duration::ZERO, Duration::ZERO))
    }

    /// Create a network that delays every frame by a random duration in `latency`.
    pub fn with_latency(ids: &[ProcessId], latency: (Duration, Duration)) -> Self {
        let mut inbox_senders = HashMap::new();
        let mut inbox_receivers = HashMap::new();

        for &id in ids {
            let (tx, rx) = unbounded();
            inbox_senders.insert(id, tx);
            inbox_receivers.insert(id, rx);
        }

        MockNetwork {
            ids: ids.to_vec(),
            inbox_senders,
            inbox_receivers,
            latency,
        }
    }

    /// Member ids.
    pub fn ids(&self) -> &[ProcessId] {
        &self.ids
    }

    /// Create the endpoint for a specific process.
    ///
    /// This consumes the inbox receiver, so can only be called once per process.
    pub fn create_endpoint(&mut self, process_id: ProcessId) -> Option<(EndpointSender, Inbox)> {
        let rx = self.inbox_receivers.remove(&process_id)?;

        let mut tx_map = HashMap::new();
        for (&id, inbox) in &self.inbox_senders {
            if id == process_id {
                continue;
            }
            let link = if self.latency.1.is_zero() {
                Link::Direct(inbox.clone())
            } else {
                Link::Delayed(spawn_delayed_link(inbox.clone()))
            };
            tx_map.insert(id, link);
        }

        Some((
            EndpointSender {
                process_id,
                tx_map,
                latency: self.latency,
            },
            Inbox { process_id, rx },
        ))
    }
}

/// Spawn a forwarder that holds each frame on one link until its deadline.
///
/// The thread exits when the sending endpoint is dropped.
fn spawn_delayed_link(inbox: Sender<Envelope>) -> Sender<(Instant, Envelope)> {
    let (tx, rx) = unbounded::<(Instant, Envelope)>();
    thread::spawn(move || {
        while let Ok((deliver_at, envelope)) = rx.recv() {
            let now = Instant::now();
            if deliver_at > now {
                thread::sleep(deliver_at - now);
            }
            if inbox.send(envelope).is_err() {
                debug!("receiver gone, closing delayed link");
                return;
            }
        }
    });
    tx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::message::MessageTag;

    #[test]
    fn test_mock_network_basic() {
        let mut network = MockNetwork::new(&[0, 1, 2]);

        let (tx0, _in0) = network.create_endpoint(0).unwrap();
        let (_tx1, in1) = network.create_endpoint(1).unwrap();
        let (_tx2, _in2) = network.create_endpoint(2).unwrap();

        tx0.send_to(1, Message::request(3)).unwrap();

        let (from, frame) = in1.recv_timeout(Duration::from_millis(100)).unwrap();
        assert_eq!(from, 0);
        let msg = Message::decode(&frame).unwrap();
        assert_eq!(msg.tag, MessageTag::Request);
        assert_eq!(msg.timestamp, 3);
    }

    #[test]
    fn test_broadcast_skips_self() {
        let mut network = MockNetwork::new(&[1, 2, 3]);
        let (tx1, in1) = network.create_endpoint(1).unwrap();
        let (_tx2, in2) = network.create_endpoint(2).unwrap();
        let (_tx3, in3) = network.create_endpoint(3).unwrap();

        assert_eq!(tx1.broadcast_to_others(Message::request(1)).unwrap(), 2);
        assert!(in2.recv_timeout(Duration::from_millis(100)).is_ok());
        assert!(in3.recv_timeout(Duration::from_millis(100)).is_ok());
        assert!(in1.try_recv().is_none());
    }

    #[test]
    fn test_unknown_peer() {
        let mut network = MockNetwork::new(&[0, 1]);
        let (tx0, _in0) = network.create_endpoint(0).unwrap();
        assert_eq!(
            tx0.send_to(7, Message::reply(1)),
            Err(TransportError::UnknownPeer(7))
        );
    }

    #[test]
    fn test_endpoint_created_once() {
        let mut network = MockNetwork::new(&[0, 1]);
        assert!(network.create_endpoint(0).is_some());
        assert!(network.create_endpoint(0).is_none());
    }

    #[test]
    fn test_delayed_link_preserves_pair_order() {
        let latency = (Duration::from_millis(0), Duration::from_millis(3));
        let mut network = MockNetwork::with_latency(&[0, 1], latency);
        let (tx0, _in0) = network.create_endpoint(0).unwrap();
        let (_tx1, in1) = network.create_endpoint(1).unwrap();

        for ts in 1..=50 {
            tx0.send_to(1, Message::request(ts)).unwrap();
        }

        for expected in 1..=50 {
            let (from, frame) = in1.recv_timeout(Duration::from_secs(2)).unwrap();
            assert_eq!(from, 0);
            assert_eq!(Message::decode(&frame).unwrap().timestamp, expected);
        }
    }
}
