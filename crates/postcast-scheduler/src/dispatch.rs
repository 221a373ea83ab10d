//! Delivery fan-out: one due post to every active destination.
//!
//! Destinations are chunked into fixed-size batches. Sends within a batch run
//! concurrently; the inter-batch delay applies only between batches, never
//! after the last one. Each destination gets its own bounded retry, and one
//! destination's terminal failure never blocks the others.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use tracing::{info, warn};

use postcast_core::config::DeliveryConfig;
use postcast_core::error::Result;
use postcast_core::traits::DestinationSender;
use postcast_core::types::{Destination, Post};

use crate::retry::{linear_backoff, with_retry};
use crate::store::PostStore;

pub struct Dispatcher {
    sender: Arc<dyn DestinationSender>,
    store: Arc<PostStore>,
    cfg: DeliveryConfig,
}

impl Dispatcher {
    pub fn new(sender: Arc<dyn DestinationSender>, store: Arc<PostStore>, cfg: DeliveryConfig) -> Self {
        Self { sender, store, cfg }
    }

    /// Fan a post out to the current active destination set and close it.
    ///
    /// The post is marked delivered exactly once, whatever the success count,
    /// so a fully failed fan-out still records `0/n` instead of being retried
    /// forever. Returns the number of destinations reached.
    pub async fn deliver(&self, post: &Post) -> Result<u32> {
        let destinations = self.store.active_destinations()?;
        let total = destinations.len();

        if total == 0 {
            warn!("📭 post {} has no active destinations, closing as 0/0", post.id);
            self.store.mark_delivered(post.id, 0, Utc::now())?;
            return Ok(0);
        }

        let batch_size = self.cfg.batch_size.max(1);
        let mut delivered: u32 = 0;

        for (batch_index, batch) in destinations.chunks(batch_size).enumerate() {
            if batch_index > 0 {
                tokio::time::sleep(Duration::from_secs(self.cfg.batch_delay_secs)).await;
            }
            let sends = batch.iter().map(|dest| self.send_one(post, dest));
            for ok in join_all(sends).await {
                if ok {
                    delivered += 1;
                }
            }
        }

        self.store.mark_delivered(post.id, delivered, Utc::now())?;
        info!("📬 post {}: delivered to {delivered}/{total} destinations", post.id);
        Ok(delivered)
    }

    async fn send_one(&self, post: &Post, dest: &Destination) -> bool {
        let result = with_retry(
            self.cfg.max_attempts,
            linear_backoff(Duration::from_secs(self.cfg.backoff_unit_secs)),
            || self.sender.send(&dest.id, &post.payload),
        )
        .await;

        match result {
            Ok(()) => true,
            Err(err) => {
                warn!("❌ post {} → destination {}: {err}", post.id, dest.id);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use postcast_core::error::SendError;
    use postcast_core::types::{DeliveryState, PostPayload};
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    /// Scripted sender: per-destination number of failures before success,
    /// or always-terminal.
    struct MockSender {
        fail_retryable: HashMap<String, u32>,
        terminal: Vec<String>,
        attempts: Mutex<HashMap<String, u32>>,
        send_instants: Mutex<Vec<(String, Instant)>>,
    }

    impl MockSender {
        fn reliable() -> Self {
            Self {
                fail_retryable: HashMap::new(),
                terminal: Vec::new(),
                attempts: Mutex::new(HashMap::new()),
                send_instants: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl DestinationSender for MockSender {
        async fn send(
            &self,
            destination_id: &str,
            _payload: &PostPayload,
        ) -> std::result::Result<(), SendError> {
            self.send_instants
                .lock()
                .unwrap()
                .push((destination_id.to_string(), Instant::now()));
            if self.terminal.iter().any(|d| d == destination_id) {
                return Err(SendError::Terminal("chat not found".into()));
            }
            let mut attempts = self.attempts.lock().unwrap();
            let seen = attempts.entry(destination_id.to_string()).or_insert(0);
            *seen += 1;
            let budget = self.fail_retryable.get(destination_id).copied().unwrap_or(0);
            if *seen <= budget {
                Err(SendError::Retryable("timed out".into()))
            } else {
                Ok(())
            }
        }
    }

    fn cfg() -> DeliveryConfig {
        DeliveryConfig {
            batch_size: 20,
            batch_delay_secs: 2,
            max_attempts: 5,
            backoff_unit_secs: 3,
            send_timeout_secs: 60,
        }
    }

    fn setup(n_dests: usize) -> (Arc<PostStore>, Post) {
        let store = Arc::new(PostStore::open_in_memory().unwrap());
        for i in 0..n_dests {
            store.add_or_reactivate(&format!("-100{i:03}"), None).unwrap();
        }
        let at = Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap();
        let id = store
            .create(&PostPayload::Text("hello".into()), at, n_dests as u32)
            .unwrap();
        let post = store.due(at, 10).unwrap().into_iter().find(|p| p.id == id).unwrap();
        (store, post)
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_success_marks_delivered_once() {
        let (store, post) = setup(3);
        let dispatcher = Dispatcher::new(Arc::new(MockSender::reliable()), store.clone(), cfg());

        let delivered = dispatcher.deliver(&post).await.unwrap();
        assert_eq!(delivered, 3);

        let stats = store.stats().unwrap();
        assert_eq!(stats.delivered, 1);
        assert_eq!(stats.pending, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_batches_spaced_by_delay_only_between() {
        // 25 destinations with batch size 20: two batches, one 2s gap.
        let (store, post) = setup(25);
        let sender = Arc::new(MockSender::reliable());
        let dispatcher = Dispatcher::new(sender.clone(), store, cfg());

        let start = Instant::now();
        let delivered = dispatcher.deliver(&post).await.unwrap();
        assert_eq!(delivered, 25);
        assert_eq!(start.elapsed(), Duration::from_secs(2));

        let instants = sender.send_instants.lock().unwrap();
        let first_batch = instants.iter().filter(|(_, t)| *t == start).count();
        let second_batch = instants
            .iter()
            .filter(|(_, t)| *t == start + Duration::from_secs(2))
            .count();
        assert_eq!(first_batch, 20);
        assert_eq!(second_batch, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mixed_failures_count_successes() {
        let (store, post) = setup(4);
        let dests = store.active_destinations().unwrap();
        let mut sender = MockSender::reliable();
        // One destination recovers on the third try, one is terminally gone.
        sender.fail_retryable.insert(dests[1].id.clone(), 2);
        sender.terminal.push(dests[3].id.clone());
        let dispatcher = Dispatcher::new(Arc::new(sender), store.clone(), cfg());

        let delivered = dispatcher.deliver(&post).await.unwrap();
        assert_eq!(delivered, 3);

        let stats = store.stats().unwrap();
        assert_eq!(stats.delivered, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_total_failure_still_closes_post() {
        let (store, post) = setup(2);
        let dests = store.active_destinations().unwrap();
        let mut sender = MockSender::reliable();
        for d in &dests {
            sender.terminal.push(d.id.clone());
        }
        let dispatcher = Dispatcher::new(Arc::new(sender), store.clone(), cfg());

        let delivered = dispatcher.deliver(&post).await.unwrap();
        assert_eq!(delivered, 0);
        // Closed as 0/2 rather than left pending.
        assert!(store.due(post.scheduled_at + chrono::Duration::days(1), 10).unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_destinations_closes_as_zero() {
        let store = Arc::new(PostStore::open_in_memory().unwrap());
        let at = Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap();
        store.create(&PostPayload::Text("orphan".into()), at, 0).unwrap();
        let post = store.due(at, 10).unwrap().remove(0);
        let dispatcher = Dispatcher::new(Arc::new(MockSender::reliable()), store.clone(), cfg());

        assert_eq!(dispatcher.deliver(&post).await.unwrap(), 0);
        assert_eq!(store.stats().unwrap().delivered, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reads_destination_set_at_dispatch_time() {
        // A destination added after the post was created still receives it.
        let (store, post) = setup(1);
        store.add_or_reactivate("-100999", None).unwrap();
        let counter = Arc::new(AtomicU32::new(0));

        struct Counting(Arc<AtomicU32>);
        #[async_trait]
        impl DestinationSender for Counting {
            async fn send(&self, _: &str, _: &PostPayload) -> std::result::Result<(), SendError> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }

        let dispatcher = Dispatcher::new(Arc::new(Counting(counter.clone())), store, cfg());
        assert_eq!(dispatcher.deliver(&post).await.unwrap(), 2);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }
}
