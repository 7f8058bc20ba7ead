//! Delivery of a single batch with partial-failure retry.

use crate::batcher::Batch;
use crate::client::{PutRecordResult, StreamClient};
use std::time::Duration;
use streamgen_core::DeliveryReport;
use tracing::{debug, warn};

/// Delivers one batch until every record is acknowledged or a hard error occurs.
///
/// Each round resubmits only the records without a shard id, in their
/// original order. A round in which any record was rejected for exceeding
/// shard throughput is followed by `throttle_backoff`; other rejections are
/// resubmitted right away. There is no attempt limit: a request that fails
/// outright, or whose response does not line up with the request, abandons
/// the remaining records.
pub async fn deliver_batch(
    client: &dyn StreamClient,
    stream: &str,
    batch: Batch,
    throttle_backoff: Duration,
) -> DeliveryReport {
    let mut report = DeliveryReport {
        records: batch.len(),
        bytes: batch.size_bytes() as u64,
        ..Default::default()
    };
    let mut pending = batch.into_records();

    while !pending.is_empty() {
        report.rounds += 1;

        let output = match client.put_records(stream, &pending).await {
            Ok(output) => output,
            Err(e) => {
                warn!(
                    stream,
                    records = pending.len(),
                    code = e.code(),
                    "Abandoning batch: {}",
                    e
                );
                report.abandoned = true;
                return report;
            }
        };

        if output.records.len() != pending.len() {
            warn!(
                stream,
                records = pending.len(),
                results = output.records.len(),
                "Abandoning batch: response does not match request"
            );
            report.abandoned = true;
            return report;
        }

        let submitted = pending.len();
        let mut throttled = false;
        pending = pending
            .into_iter()
            .zip(output.records)
            .filter_map(|(record, result)| match result {
                PutRecordResult::Delivered { .. } => None,
                failed => {
                    throttled |= failed.is_throttled();
                    Some(record)
                }
            })
            .collect();
        report.delivered += submitted - pending.len();

        if pending.is_empty() {
            break;
        }

        if throttled {
            report.throttled_rounds += 1;
            debug!(
                stream,
                records = pending.len(),
                round = report.rounds,
                "Throughput exceeded, backing off for {:?}",
                throttle_backoff
            );
            tokio::time::sleep(throttle_backoff).await;
        } else {
            debug!(
                stream,
                records = pending.len(),
                round = report.rounds,
                "Resubmitting rejected records"
            );
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::PutRecordsOutput;
    use crate::error::StreamError;
    use crate::testing::ScriptedStreamClient;
    use streamgen_core::Record;
    use tokio::time::Instant;

    const BACKOFF: Duration = Duration::from_millis(250);

    fn batch(n: usize) -> Batch {
        (0..n).map(|i| Record::new(vec![b'x'; 10], i.to_string())).collect()
    }

    fn delivered() -> PutRecordResult {
        PutRecordResult::Delivered {
            shard_id: "shardId-000000000001".into(),
            sequence_number: "1".into(),
        }
    }

    fn failed(code: &str) -> PutRecordResult {
        PutRecordResult::Failed {
            error_code: code.into(),
            error_message: "rejected".into(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_delivered_single_round() {
        let client = ScriptedStreamClient::new();
        let start = Instant::now();

        let report = deliver_batch(&client, "s", batch(5), BACKOFF).await;

        assert_eq!(report.rounds, 1);
        assert_eq!(report.delivered, 5);
        assert_eq!(report.bytes, 5 * 11);
        assert!(!report.abandoned);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttled_round_resubmits_identical_set_after_backoff() {
        let client = ScriptedStreamClient::new();
        client.push_throttled(3);
        let input = batch(3);
        let start = Instant::now();

        let report = deliver_batch(&client, "s", input.clone(), BACKOFF).await;

        let requests = client.put_requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0], input.records());
        assert_eq!(requests[1], input.records());
        assert_eq!(report.throttled_rounds, 1);
        assert_eq!(report.delivered, 3);
        assert!(start.elapsed() >= BACKOFF);
    }

    #[tokio::test(start_paused = true)]
    async fn test_only_rejected_records_resubmitted() {
        let client = ScriptedStreamClient::new();
        client.push_put_records(Ok(PutRecordsOutput {
            failed_record_count: 2,
            records: vec![
                delivered(),
                failed("InternalFailure"),
                delivered(),
                failed("InternalFailure"),
            ],
        }));
        let input = batch(4);
        let start = Instant::now();

        let report = deliver_batch(&client, "s", input.clone(), BACKOFF).await;

        let requests = client.put_requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(
            requests[1],
            vec![input.records()[1].clone(), input.records()[3].clone()]
        );
        assert_eq!(report.rounds, 2);
        assert_eq!(report.throttled_rounds, 0);
        // non-throttled rejections are retried without sleeping
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mixed_throttle_marks_round() {
        let client = ScriptedStreamClient::new();
        client.push_put_records(Ok(PutRecordsOutput {
            failed_record_count: 1,
            records: vec![delivered(), failed(crate::client::THROUGHPUT_EXCEEDED)],
        }));

        let report = deliver_batch(&client, "s", batch(2), BACKOFF).await;

        assert_eq!(report.throttled_rounds, 1);
        assert_eq!(client.put_requests()[1].len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_rejection_keeps_retrying() {
        let client = ScriptedStreamClient::new();
        for _ in 0..5 {
            client.push_put_records(Ok(PutRecordsOutput {
                failed_record_count: 1,
                records: vec![failed("InvalidArgumentException")],
            }));
        }

        let report = deliver_batch(&client, "s", batch(1), BACKOFF).await;

        assert_eq!(report.rounds, 6);
        assert_eq!(report.delivered, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_error_abandons_batch() {
        let client = ScriptedStreamClient::new();
        client.push_throttled(2);
        client.push_put_records(Err(StreamError::Service {
            code: "InternalFailure".into(),
            message: "boom".into(),
        }));

        let report = deliver_batch(&client, "s", batch(2), BACKOFF).await;

        assert!(report.abandoned);
        assert_eq!(report.rounds, 2);
        assert_eq!(report.delivered, 0);
        assert_eq!(client.put_requests().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mismatched_response_abandons_batch() {
        let client = ScriptedStreamClient::new();
        client.push_put_records(Ok(PutRecordsOutput {
            failed_record_count: 0,
            records: vec![delivered()],
        }));

        let report = deliver_batch(&client, "s", batch(3), BACKOFF).await;

        assert!(report.abandoned);
        assert_eq!(report.rounds, 1);
    }
}
