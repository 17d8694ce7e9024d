//! The single consumer of the relay queue

use log::{error, info, warn};

use super::{DeliveryClient, DeliveryError, DeliveryReport, HttpsTransport};
use crate::queue::{RELAY_QUEUE_CAPACITY, RelayConsumer};
use crate::stats::RelayStats;

/// Dequeues messages one at a time and delivers each exactly once.
pub struct DeliveryTask<'a, T, const N: usize = RELAY_QUEUE_CAPACITY> {
    consumer: RelayConsumer<'a, N>,
    client: DeliveryClient<'a, T>,
    stats: &'a RelayStats,
}

impl<'a, T: HttpsTransport, const N: usize> DeliveryTask<'a, T, N> {
    pub fn new(consumer: RelayConsumer<'a, N>, client: DeliveryClient<'a, T>, stats: &'a RelayStats) -> Self {
        Self {
            consumer,
            client,
            stats,
        }
    }

    /// Wait for the next message and deliver it.
    ///
    /// The outcome is logged and counted here; it is returned for callers that
    /// want to inspect it, but the message is gone either way.
    pub async fn process_next(&mut self) -> Result<DeliveryReport, DeliveryError> {
        let message = self.consumer.dequeue().await;
        let result = self.client.deliver(&message).await;

        match &result {
            Ok(report) if report.is_success() => {
                info!(
                    "Delivered id={}: HTTP {} {}",
                    message.id,
                    report.status,
                    report.body_text()
                );
                self.stats.record_delivered();
            }
            Ok(report) => {
                warn!(
                    "Endpoint answered id={} with HTTP {} {}",
                    message.id,
                    report.status,
                    report.body_text()
                );
                self.stats.record_delivered();
            }
            Err(DeliveryError::Transport(e)) if e.is_certificate() => {
                error!(
                    "Delivery of id={} aborted: server certificate failed validation against the trust anchor",
                    message.id
                );
                self.stats.record_failed();
            }
            Err(e) => {
                error!("Delivery of id={} failed: {}", message.id, e);
                self.stats.record_failed();
            }
        }

        result
    }

    /// Serve the queue forever.
    pub async fn run(mut self) -> ! {
        let target = self.client.target();
        info!("Delivery task started for {}:{}", target.host, target.port);
        loop {
            let _ = self.process_next().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::{EndpointConfig, TlsTarget, TransportError};
    use crate::http::{Request, ResponseSummary};
    use crate::message::SensorMessage;
    use crate::queue::RelayQueue;

    /// Answers every request with the id echoed as status 200, or fails ids
    /// listed in `fail_ids`.
    struct EchoTransport {
        fail_ids: &'static [&'static str],
    }

    impl HttpsTransport for EchoTransport {
        async fn exchange(
            &mut self,
            _target: &TlsTarget<'_>,
            request: &Request<'_>,
            body_out: &mut [u8],
        ) -> Result<ResponseSummary, TransportError> {
            let body = core::str::from_utf8(request.body).unwrap();
            if self.fail_ids.iter().any(|id| body.contains(id)) {
                return Err(TransportError::Connect);
            }
            body_out[..request.body.len()].copy_from_slice(request.body);
            Ok(ResponseSummary {
                status: 200,
                body_len: request.body.len(),
                truncated: false,
            })
        }
    }

    #[test]
    fn test_messages_are_delivered_in_order_once() {
        let queue: RelayQueue = RelayQueue::new();
        let stats = RelayStats::new();
        let producer = queue.producer();
        for id in 1..=3 {
            let _ = producer.try_enqueue(SensorMessage::new(id, 20.0, 50.0));
        }

        let config = EndpointConfig::new("https://relay.example.com/ingest", b"ca");
        let client = DeliveryClient::new(EchoTransport { fail_ids: &[] }, &config).unwrap();
        let mut task = DeliveryTask::new(queue.take_consumer().unwrap(), client, &stats);

        for id in 1..=3 {
            let report = embassy_futures::block_on(task.process_next()).unwrap();
            let expected = std::format!("\"class_name\":{id},");
            assert!(report.body_text().contains(&expected));
        }
        assert!(queue.is_empty());
        assert_eq!(stats.snapshot().delivered, 3);
    }

    #[test]
    fn test_failure_is_counted_and_not_retried() {
        let queue: RelayQueue = RelayQueue::new();
        let stats = RelayStats::new();
        let producer = queue.producer();
        let _ = producer.try_enqueue(SensorMessage::new(1, 20.0, 50.0));
        let _ = producer.try_enqueue(SensorMessage::new(2, 20.0, 50.0));

        let config = EndpointConfig::new("https://relay.example.com", b"ca");
        let transport = EchoTransport {
            fail_ids: &["\"class_name\":1,"],
        };
        let client = DeliveryClient::new(transport, &config).unwrap();
        let mut task = DeliveryTask::new(queue.take_consumer().unwrap(), client, &stats);

        let first = embassy_futures::block_on(task.process_next());
        assert_eq!(first, Err(DeliveryError::Transport(TransportError::Connect)));

        let second = embassy_futures::block_on(task.process_next()).unwrap();
        assert!(second.body_text().contains("\"class_name\":2,"));

        let snapshot = stats.snapshot();
        assert_eq!((snapshot.delivered, snapshot.failed), (1, 1));
    }
}
