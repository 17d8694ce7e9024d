//! Bounded relay queue between the radio receive context and the delivery task
//!
//! The queue wraps an embassy-sync [`Channel`] guarded by a
//! [`CriticalSectionRawMutex`], so an enqueue from the radio context and a
//! dequeue from the delivery task are each atomic with respect to one another
//! and can never tear a [`SensorMessage`].
//!
//! ## Backpressure
//!
//! Producers never wait. When the queue is full the *incoming* message is
//! dropped and the messages already queued are kept, so under sustained
//! overload the earliest `N` samples survive.

use core::sync::atomic::{AtomicBool, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, TrySendError};

use crate::message::SensorMessage;

/// Number of messages buffered between the receive handler and the delivery task
pub const RELAY_QUEUE_CAPACITY: usize = 5;

/// Result of a non-blocking enqueue
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// The message was accepted
    Queued,
    /// The queue was full and the message was discarded
    Dropped,
}

/// Fixed-capacity FIFO of sensor messages.
///
/// Intended to live in a `static` for the whole run:
///
/// ```rust,ignore
/// static RELAY_QUEUE: RelayQueue = RelayQueue::new();
///
/// let producer = RELAY_QUEUE.producer();
/// let consumer = RELAY_QUEUE.take_consumer().unwrap();
/// ```
pub struct RelayQueue<const N: usize = RELAY_QUEUE_CAPACITY> {
    channel: Channel<CriticalSectionRawMutex, SensorMessage, N>,
    consumer_taken: AtomicBool,
}

impl<const N: usize> RelayQueue<N> {
    pub const fn new() -> Self {
        Self {
            channel: Channel::new(),
            consumer_taken: AtomicBool::new(false),
        }
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// Number of messages currently waiting for delivery
    pub fn len(&self) -> usize {
        self.channel.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channel.is_empty()
    }

    /// Get a producer handle. Any number of producers may exist.
    pub fn producer(&self) -> RelayProducer<'_, N> {
        RelayProducer {
            channel: &self.channel,
        }
    }

    /// Take the single consumer handle.
    ///
    /// Returns `None` on every call after the first, which keeps draining
    /// strictly single-threaded.
    pub fn take_consumer(&self) -> Option<RelayConsumer<'_, N>> {
        if self.consumer_taken.swap(true, Ordering::AcqRel) {
            return None;
        }
        Some(RelayConsumer {
            channel: &self.channel,
        })
    }
}

impl<const N: usize> Default for RelayQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Non-blocking enqueue side of a [`RelayQueue`]
#[derive(Clone, Copy)]
pub struct RelayProducer<'q, const N: usize = RELAY_QUEUE_CAPACITY> {
    channel: &'q Channel<CriticalSectionRawMutex, SensorMessage, N>,
}

impl<const N: usize> RelayProducer<'_, N> {
    /// Enqueue without waiting; a full queue drops `message`.
    pub fn try_enqueue(&self, message: SensorMessage) -> EnqueueOutcome {
        match self.channel.try_send(message) {
            Ok(()) => EnqueueOutcome::Queued,
            Err(TrySendError::Full(_)) => EnqueueOutcome::Dropped,
        }
    }
}

/// Dequeue side of a [`RelayQueue`]; only one exists per queue
pub struct RelayConsumer<'q, const N: usize = RELAY_QUEUE_CAPACITY> {
    channel: &'q Channel<CriticalSectionRawMutex, SensorMessage, N>,
}

impl<const N: usize> RelayConsumer<'_, N> {
    /// Wait until a message is available and remove it.
    ///
    /// The calling task is parked by the executor while the queue is empty.
    pub async fn dequeue(&self) -> SensorMessage {
        self.channel.receive().await
    }

    /// Remove the oldest message if one is waiting
    pub fn try_dequeue(&self) -> Option<SensorMessage> {
        self.channel.try_receive().ok()
    }
}
