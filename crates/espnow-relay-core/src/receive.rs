//! Radio receive handler
//!
//! Called once per inbound ESP-NOW frame from the receive task. The handler
//! decodes, optionally requests an indicator pulse and hands the message to
//! the relay queue. It never awaits and never touches the network.

use core::fmt;

use log::{debug, info, warn};

use crate::indicator::IndicatorSignal;
use crate::message::{DecodeError, SensorMessage};
use crate::queue::{EnqueueOutcome, RELAY_QUEUE_CAPACITY, RelayProducer};
use crate::stats::RelayStats;

/// MAC address of the peer that sent a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PeerAddress(pub [u8; 6]);

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

impl From<[u8; 6]> for PeerAddress {
    fn from(mac: [u8; 6]) -> Self {
        Self(mac)
    }
}

/// What happened to one inbound frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReceiveOutcome {
    /// Decoded and accepted by the relay queue
    Queued(SensorMessage),
    /// Decoded, but the queue was full
    Dropped(SensorMessage),
    /// The payload did not decode
    Rejected(DecodeError),
}

pub struct ReceiveHandler<'a, const N: usize = RELAY_QUEUE_CAPACITY> {
    producer: RelayProducer<'a, N>,
    indicator: Option<&'a IndicatorSignal>,
    stats: &'a RelayStats,
}

impl<'a, const N: usize> ReceiveHandler<'a, N> {
    pub fn new(producer: RelayProducer<'a, N>, stats: &'a RelayStats) -> Self {
        Self {
            producer,
            indicator: None,
            stats,
        }
    }

    /// Request an indicator pulse for every decoded frame.
    pub fn with_indicator(mut self, indicator: &'a IndicatorSignal) -> Self {
        self.indicator = Some(indicator);
        self
    }

    /// Handle one frame. Bounded work, never blocks.
    pub fn on_frame(&self, peer: PeerAddress, payload: &[u8]) -> ReceiveOutcome {
        self.stats.record_received();

        let message = match SensorMessage::decode(payload) {
            Ok(message) => message,
            Err(e) => {
                warn!("Rejected frame from {}: {}", peer, e);
                self.stats.record_rejected();
                return ReceiveOutcome::Rejected(e);
            }
        };

        info!(
            "Received from {}: id={} temperature={} humidity={}",
            peer, message.id, message.temperature, message.humidity
        );

        if let Some(indicator) = self.indicator {
            indicator.request_pulse();
        }

        match self.producer.try_enqueue(message) {
            EnqueueOutcome::Queued => {
                self.stats.record_queued();
                ReceiveOutcome::Queued(message)
            }
            EnqueueOutcome::Dropped => {
                debug!("Relay queue full, dropping message id={}", message.id);
                self.stats.record_dropped();
                ReceiveOutcome::Dropped(message)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::RelayQueue;

    const PEER: PeerAddress = PeerAddress([0x24, 0x6f, 0x28, 0xab, 0xcd, 0xef]);

    #[test]
    fn test_peer_address_display() {
        let mut text = heapless::String::<17>::new();
        core::fmt::write(&mut text, format_args!("{}", PEER)).unwrap();
        assert_eq!(text.as_str(), "24:6f:28:ab:cd:ef");
    }

    #[test]
    fn test_valid_frame_is_queued() {
        let queue: RelayQueue = RelayQueue::new();
        let stats = RelayStats::new();
        let handler = ReceiveHandler::new(queue.producer(), &stats);

        let message = SensorMessage::new(3, 19.5, 40.0);
        assert_eq!(handler.on_frame(PEER, &message.to_bytes()), ReceiveOutcome::Queued(message));

        let consumer = queue.take_consumer().unwrap();
        assert_eq!(consumer.try_dequeue(), Some(message));
        assert_eq!(stats.snapshot().queued, 1);
    }

    #[test]
    fn test_bad_length_is_rejected_without_pulse() {
        let queue: RelayQueue = RelayQueue::new();
        let stats = RelayStats::new();
        let indicator = IndicatorSignal::new();
        let handler = ReceiveHandler::new(queue.producer(), &stats).with_indicator(&indicator);

        let outcome = handler.on_frame(PEER, &[1, 2, 3]);

        assert_eq!(
            outcome,
            ReceiveOutcome::Rejected(DecodeError::LengthMismatch {
                expected: 12,
                actual: 3
            })
        );
        assert!(queue.is_empty());
        assert!(!indicator.is_pending());
        let snapshot = stats.snapshot();
        assert_eq!((snapshot.received, snapshot.rejected), (1, 1));
    }

    #[test]
    fn test_decoded_frame_requests_pulse() {
        let queue: RelayQueue = RelayQueue::new();
        let stats = RelayStats::new();
        let indicator = IndicatorSignal::new();
        let handler = ReceiveHandler::new(queue.producer(), &stats).with_indicator(&indicator);

        let _ = handler.on_frame(PEER, &SensorMessage::default().to_bytes());
        assert!(indicator.is_pending());
    }

    #[test]
    fn test_full_queue_reports_dropped() {
        let queue: RelayQueue<1> = RelayQueue::new();
        let stats = RelayStats::new();
        let handler = ReceiveHandler::new(queue.producer(), &stats);

        let first = SensorMessage::new(1, 0.0, 0.0);
        let second = SensorMessage::new(2, 0.0, 0.0);
        assert_eq!(handler.on_frame(PEER, &first.to_bytes()), ReceiveOutcome::Queued(first));
        assert_eq!(handler.on_frame(PEER, &second.to_bytes()), ReceiveOutcome::Dropped(second));

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.received, 2);
        assert_eq!(snapshot.queued, 1);
        assert_eq!(snapshot.dropped, 1);
    }
}
