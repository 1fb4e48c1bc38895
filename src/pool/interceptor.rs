//! # Interceptor: recipient selection across several pools.
//!
//! An [`Interceptor`] starts from one pool (all instances) and is refined
//! with a builder chain. `not`, `only` and `any` always act on the
//! most recently added pool.
//!
//! ```text
//! thread.to("workers")?        workers: {1,2,3,4}
//!       .not([2])              workers: {1,3,4}
//!       .and("db")?            workers: {1,3,4}  db: {1,2}
//!       .any()                 workers: {1,3,4}  db: {random one}
//!       .send("flush", payload, &opts)
//! ```
//!
//! ## Example
//! ```rust,no_run
//! use serde_json::json;
//! use threadvisor::{SendOptions, Thread, UnitError};
//!
//! async fn fan_out(thread: Thread) -> Result<(), UnitError> {
//!     let report = thread
//!         .to("workers")?
//!         .not([1])
//!         .and("db")?
//!         .only([2])?
//!         .send("reload", json!({ "force": true }), &SendOptions::default());
//!     assert_eq!(report.dropped(), 0);
//!     Ok(())
//! }
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use indexmap::IndexMap;
use rand::Rng;

use crate::channel::{Channel, Payload, PostOptions, Reply, SendOptions};
use crate::error::ChannelError;
use crate::pool::pool::Pool;
use crate::pool::report::{PostBatch, SendReport};
use crate::topology::Addressee;

/// Composed recipient selector over one or more pools.
#[derive(Clone)]
pub struct Interceptor {
    pools: Arc<BTreeMap<String, Pool>>,
    targets: IndexMap<String, Vec<u32>>,
}

impl Interceptor {
    pub(crate) fn new(pools: Arc<BTreeMap<String, Pool>>, first: &str) -> Result<Self, ChannelError> {
        Self {
            pools,
            targets: IndexMap::new(),
        }
        .and(first)
    }

    fn pool(&self, name: &str) -> Result<&Pool, ChannelError> {
        self.pools
            .get(name)
            .ok_or_else(|| ChannelError::ThreadPoolNotExists {
                pool: name.to_string(),
            })
    }

    /// Adds a pool with all of its instances selected.
    ///
    /// Re-adding a pool resets its selection and makes it the current one.
    pub fn and(mut self, pool: &str) -> Result<Self, ChannelError> {
        let numbers: Vec<u32> = self.pool(pool)?.numbers().collect();
        self.targets.shift_remove(pool);
        self.targets.insert(pool.to_string(), numbers);
        Ok(self)
    }

    /// Removes instances from the current pool's selection.
    pub fn not(mut self, numbers: impl IntoIterator<Item = u32>) -> Self {
        let excluded: Vec<u32> = numbers.into_iter().collect();
        if let Some((_, selected)) = self.targets.last_mut() {
            selected.retain(|n| !excluded.contains(n));
        }
        self
    }

    /// Restricts the current pool's selection to exactly `numbers`.
    ///
    /// Fails with `ThreadNotExists` if any number is not an instance of the pool.
    pub fn only(mut self, numbers: impl IntoIterator<Item = u32>) -> Result<Self, ChannelError> {
        let Some(name) = self.targets.last().map(|(name, _)| name.clone()) else {
            return Ok(self);
        };
        let pool = self.pool(&name)?;
        let mut chosen = Vec::new();
        for number in numbers {
            pool.get(number)?;
            if !chosen.contains(&number) {
                chosen.push(number);
            }
        }
        if let Some((_, selected)) = self.targets.last_mut() {
            *selected = chosen;
        }
        Ok(self)
    }

    /// Collapses the current pool's selection to one random instance.
    pub fn any(mut self) -> Self {
        if let Some((_, selected)) = self.targets.last_mut() {
            if !selected.is_empty() {
                let pick = selected[rand::rng().random_range(0..selected.len())];
                *selected = vec![pick];
            }
        }
        self
    }

    /// Selected recipients, pool by pool in the order they were added.
    pub fn recipients(&self) -> Vec<Addressee> {
        self.channels().map(|c| c.peer().clone()).collect()
    }

    fn channels(&self) -> impl Iterator<Item = &Channel> {
        self.targets.iter().flat_map(move |(name, numbers)| {
            let pool = self.pools.get(name);
            numbers
                .iter()
                .filter_map(move |n| pool.and_then(|p| p.channel(*n)))
        })
    }

    /// Fire-and-forget send to every selected instance.
    pub fn send(&self, event: &str, payload: Payload, opts: &SendOptions) -> SendReport {
        let mut report = SendReport::default();
        for channel in self.channels() {
            let status = channel.send(event, payload.clone(), opts);
            report.push(channel.peer().clone(), status);
        }
        report
    }

    /// Request/response to every selected instance, aggregated.
    pub fn post(&self, event: &str, payload: Payload, opts: &PostOptions) -> PostBatch {
        let replies = self
            .channels()
            .map(|channel| channel.post(event, payload.clone(), opts))
            .collect();
        PostBatch::new(replies)
    }

    /// Request/response to one selected instance (random if several are selected).
    pub fn request(&self, event: &str, payload: Payload, opts: &PostOptions) -> Result<Reply, ChannelError> {
        let channels: Vec<&Channel> = self.channels().collect();
        if channels.is_empty() {
            let pool = self.targets.last().map(|(n, _)| n.clone()).unwrap_or_default();
            return Err(ChannelError::ThreadNotExists { pool, number: 0 });
        }
        let channel = channels[rand::rng().random_range(0..channels.len())];
        Ok(channel.post(event, payload, opts))
    }
}
