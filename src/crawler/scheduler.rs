//! Id producer for the crawl pipeline
//!
//! This module handles:
//! - Enumerating the configured id range
//! - Dropping ids known not to be stories
//! - Feeding the fetch stage and closing its channel when done

use crate::config::CrawlConfig;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Scheduler hands out the story ids of one crawl
#[derive(Debug, Clone)]
pub struct Scheduler {
    ids: Vec<u64>,
}

impl Scheduler {
    /// Builds the id list for `first_id..last_id` minus the skipped ids
    pub fn new(crawl: &CrawlConfig) -> Self {
        let ids: Vec<u64> = (crawl.first_id..crawl.last_id)
            .filter(|id| !crawl.is_skipped(*id))
            .collect();
        debug!(
            "scheduling {} ids in {}..{}",
            ids.len(),
            crawl.first_id,
            crawl.last_id
        );
        Self { ids }
    }

    /// Ids in emission order
    pub fn ids(&self) -> &[u64] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Spawns the producer task
    ///
    /// The task owns the sender, so the channel closes as soon as every id
    /// has been sent. A send to a closed channel means the fetch stage has
    /// gone away; the producer stops early.
    ///
    /// # Returns
    ///
    /// A handle resolving to the number of ids sent.
    pub fn spawn_producer(self, tx: UnboundedSender<u64>) -> JoinHandle<usize> {
        tokio::spawn(async move {
            let mut sent = 0;
            for id in self.ids {
                if tx.send(id).is_err() {
                    debug!("fetch stage closed after {} ids", sent);
                    break;
                }
                sent += 1;
            }
            info!("producer finished after {} ids", sent);
            sent
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn crawl(first: u64, last: u64, skip: Vec<u64>) -> CrawlConfig {
        CrawlConfig {
            first_id: first,
            last_id: last,
            skip_ids: skip,
            ..CrawlConfig::default()
        }
    }

    #[test]
    fn test_range_is_half_open() {
        let scheduler = Scheduler::new(&crawl(3, 7, Vec::new()));
        assert_eq!(scheduler.ids(), &[3, 4, 5, 6]);
        assert_eq!(scheduler.len(), 4);
    }

    #[test]
    fn test_skipped_ids_are_never_emitted() {
        let scheduler = Scheduler::new(&crawl(670, 682, vec![675]));
        assert!(!scheduler.ids().contains(&672));
        assert!(!scheduler.ids().contains(&675));
        assert!(!scheduler.ids().contains(&680));
        assert_eq!(scheduler.len(), 9);
    }

    #[test]
    fn test_empty_range() {
        assert!(Scheduler::new(&crawl(5, 5, Vec::new())).is_empty());
    }

    #[tokio::test]
    async fn test_producer_closes_channel() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = Scheduler::new(&crawl(1, 6, Vec::new())).spawn_producer(tx);

        let mut received = Vec::new();
        while let Some(id) = rx.recv().await {
            received.push(id);
        }
        assert_eq!(received, vec![1, 2, 3, 4, 5]);
        assert_eq!(handle.await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_producer_stops_when_receiver_dropped() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let handle = Scheduler::new(&crawl(1, 100, Vec::new())).spawn_producer(tx);
        assert_eq!(handle.await.unwrap(), 0);
    }
}
