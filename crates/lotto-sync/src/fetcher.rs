//! Bounded batch log fetching with adaptive window shrink
//!
//! Ranges are walked in fixed-size windows. When the provider rejects
//! a window as too large, the window is split in half and both halves
//! are retried, down to single-block queries. A single block that
//! still trips the limit is surfaced as an error; there is nothing
//! left to shrink.

use crate::{Error, LogFilter, LogSource, Result};
use lotto_core::RawLog;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Default window width in blocks.
pub const DEFAULT_BATCH_SIZE: u64 = 2_000;

/// Fetcher configuration
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Contract address logs are fetched from
    pub address: String,
    /// Window width in blocks
    pub batch_size: u64,
}

impl FetchConfig {
    /// Config with the default window width.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

/// Windowed log fetcher over a [`LogSource`].
pub struct BatchFetcher<S: LogSource> {
    source: Arc<S>,
    config: FetchConfig,
    // Non-durable progress marker; the durable cursor is the caller's.
    furthest: AtomicU64,
}

impl<S: LogSource> BatchFetcher<S> {
    /// Create a fetcher over a log source.
    pub fn new(source: Arc<S>, config: FetchConfig) -> Self {
        Self {
            source,
            config,
            furthest: AtomicU64::new(0),
        }
    }

    /// Highest block any successful query has covered so far.
    pub fn furthest_fetched(&self) -> u64 {
        self.furthest.load(Ordering::Acquire)
    }

    /// The underlying log source.
    pub fn source(&self) -> &Arc<S> {
        &self.source
    }

    /// Contract address this fetcher queries.
    pub fn address(&self) -> &str {
        &self.config.address
    }

    /// Split an inclusive range into inclusive windows of at most
    /// `batch_size` blocks, in ascending order.
    pub fn windows(&self, from: u64, to: u64) -> Vec<(u64, u64)> {
        let mut out = Vec::new();
        if from > to {
            return out;
        }
        let mut start = from;
        while start <= to {
            let end = to.min(start.saturating_add(self.config.batch_size - 1));
            out.push((start, end));
            start = end + 1;
        }
        out
    }

    /// Fetch all logs for the given signature topics over one window,
    /// shrinking on provider range-limit rejections. Returned logs are
    /// ordered by block, then log index.
    pub async fn fetch_window(
        &self,
        topic0: Vec<String>,
        from: u64,
        to: u64,
    ) -> Result<Vec<RawLog>> {
        self.fetch_filtered(LogFilter::for_topics(&self.config.address, from, to, topic0))
            .await
    }

    /// Fetch all logs for an arbitrary filter, shrinking its block
    /// range on provider rejections.
    pub async fn fetch_filtered(&self, filter: LogFilter) -> Result<Vec<RawLog>> {
        let mut logs = Vec::new();
        let mut worklist: VecDeque<(u64, u64)> = VecDeque::new();
        worklist.push_back((filter.from_block, filter.to_block));

        while let Some((from, to)) = worklist.pop_front() {
            let mut sub = filter.clone();
            sub.from_block = from;
            sub.to_block = to;

            match self.source.get_logs(&sub).await {
                Ok(mut batch) => {
                    debug!(from, to, count = batch.len(), "fetched window");
                    self.furthest.fetch_max(to, Ordering::AcqRel);
                    logs.append(&mut batch);
                }
                Err(Error::RangeTooLarge(message)) => {
                    if from == to {
                        return Err(Error::RangeTooLarge(message));
                    }
                    let mid = from + (to - from) / 2;
                    warn!(from, to, mid, "window rejected, splitting");
                    // Front-load both halves so block order is preserved.
                    worklist.push_front((mid + 1, to));
                    worklist.push_front((from, mid));
                }
                Err(e) => return Err(e),
            }
        }

        logs.sort_by_key(|l| (l.block_number, l.log_index));
        Ok(logs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Source that rejects any range wider than `max_width` blocks and
    /// returns one log per block otherwise.
    struct NarrowSource {
        max_width: u64,
        queries: AtomicUsize,
    }

    #[async_trait]
    impl LogSource for NarrowSource {
        async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<RawLog>> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            let width = filter.to_block - filter.from_block + 1;
            if width > self.max_width {
                return Err(Error::RangeTooLarge("query returned more than".into()));
            }
            Ok((filter.from_block..=filter.to_block)
                .map(|b| RawLog {
                    address: filter.address.clone(),
                    topics: vec!["0xt0".to_string()],
                    data: "0x".to_string(),
                    block_number: b,
                    transaction_hash: format!("0xtx{}", b),
                    log_index: 0,
                })
                .collect())
        }

        async fn block_number(&self) -> Result<u64> {
            Ok(u64::MAX)
        }

        async fn block_timestamp(&self, _block: u64) -> Result<u64> {
            Ok(0)
        }
    }

    fn fetcher(max_width: u64) -> BatchFetcher<NarrowSource> {
        BatchFetcher::new(
            Arc::new(NarrowSource {
                max_width,
                queries: AtomicUsize::new(0),
            }),
            FetchConfig::new("0xcontract"),
        )
    }

    #[test]
    fn test_windows_cover_range_inclusively() {
        let f = fetcher(u64::MAX);
        assert_eq!(
            f.windows(0, 4_999),
            vec![(0, 1_999), (2_000, 3_999), (4_000, 4_999)]
        );
        assert_eq!(f.windows(10, 10), vec![(10, 10)]);
        assert!(f.windows(5, 4).is_empty());
    }

    #[tokio::test]
    async fn test_shrinks_to_single_blocks() {
        let f = fetcher(1);
        let logs = f
            .fetch_window(vec!["0xt0".to_string()], 1, 5)
            .await
            .unwrap();

        let blocks: Vec<u64> = logs.iter().map(|l| l.block_number).collect();
        assert_eq!(blocks, vec![1, 2, 3, 4, 5]);
        // One query per block once fully shrunk, plus the four
        // rejected split attempts along the way.
        assert_eq!(f.source().queries.load(Ordering::SeqCst), 9);
    }

    #[tokio::test]
    async fn test_wide_range_fetched_whole() {
        let f = fetcher(u64::MAX);
        let logs = f
            .fetch_window(vec!["0xt0".to_string()], 100, 104)
            .await
            .unwrap();
        assert_eq!(logs.len(), 5);
        assert_eq!(f.source().queries.load(Ordering::SeqCst), 1);
        assert_eq!(f.furthest_fetched(), 104);
    }

    #[tokio::test]
    async fn test_single_block_rejection_is_fatal() {
        let f = fetcher(0);
        let err = f
            .fetch_window(vec!["0xt0".to_string()], 7, 7)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RangeTooLarge(_)));
    }
}
