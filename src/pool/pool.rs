//! # Pool: the numbered instances of one group, as seen from one unit.
//!
//! A [`Pool`] maps instance numbers to the local [`Channel`]s and resolves a
//! [`Target`] into concrete recipients:
//!
//! ```text
//! Target::Instance(n) ─► channel n        (ThreadNotExists if absent)
//! Target::All         ─► every channel    (send fans out, post aggregates)
//! Target::Any         ─► one channel, uniformly at random
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use rand::Rng;

use crate::channel::{Channel, Payload, PostOptions, Reply, SendOptions};
use crate::error::ChannelError;
use crate::pool::report::{PostBatch, SendReport};

/// Recipient selector inside one pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Target {
    /// Every instance.
    All,
    /// One instance chosen at random.
    Any,
    /// A specific instance number.
    Instance(u32),
}

impl From<u32> for Target {
    fn from(number: u32) -> Self {
        Target::Instance(number)
    }
}

/// Named set of channels, one per instance of a group.
#[derive(Clone)]
pub struct Pool {
    name: Arc<str>,
    channels: Arc<BTreeMap<u32, Channel>>,
}

impl Pool {
    pub(crate) fn new(name: Arc<str>, channels: BTreeMap<u32, Channel>) -> Self {
        Self {
            name,
            channels: Arc::new(channels),
        }
    }

    /// Group name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of instances.
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// True if the pool has no instances.
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Instance numbers, ascending.
    pub fn numbers(&self) -> impl Iterator<Item = u32> + '_ {
        self.channels.keys().copied()
    }

    /// Channel to one instance.
    pub fn channel(&self, number: u32) -> Option<&Channel> {
        self.channels.get(&number)
    }

    /// All channels, by ascending instance number.
    pub fn channels(&self) -> impl Iterator<Item = &Channel> {
        self.channels.values()
    }

    pub(crate) fn get(&self, number: u32) -> Result<&Channel, ChannelError> {
        self.channels
            .get(&number)
            .ok_or_else(|| ChannelError::ThreadNotExists {
                pool: self.name.to_string(),
                number,
            })
    }

    /// Picks one channel among `numbers` (all instances when `None`).
    pub(crate) fn pick_any(&self, numbers: Option<&[u32]>) -> Result<&Channel, ChannelError> {
        let number = match numbers {
            Some(numbers) if !numbers.is_empty() => {
                numbers[rand::rng().random_range(0..numbers.len())]
            }
            Some(_) => 0,
            None if self.channels.is_empty() => 0,
            None => {
                let idx = rand::rng().random_range(0..self.channels.len());
                self.channels.keys().nth(idx).copied().unwrap_or(0)
            }
        };
        self.get(number)
    }

    fn resolve(&self, target: Target) -> Result<Vec<&Channel>, ChannelError> {
        match target {
            Target::All => Ok(self.channels.values().collect()),
            Target::Any => Ok(vec![self.pick_any(None)?]),
            Target::Instance(n) => Ok(vec![self.get(n)?]),
        }
    }

    /// Fire-and-forget send to the selected instances.
    pub fn send(
        &self,
        target: impl Into<Target>,
        event: &str,
        payload: Payload,
        opts: &SendOptions,
    ) -> Result<SendReport, ChannelError> {
        let mut report = SendReport::default();
        for channel in self.resolve(target.into())? {
            let status = channel.send(event, payload.clone(), opts);
            report.push(channel.peer().clone(), status);
        }
        Ok(report)
    }

    /// Request/response to the selected instances, aggregated.
    pub fn post(
        &self,
        target: impl Into<Target>,
        event: &str,
        payload: Payload,
        opts: &PostOptions,
    ) -> Result<PostBatch, ChannelError> {
        let replies = self
            .resolve(target.into())?
            .into_iter()
            .map(|channel| channel.post(event, payload.clone(), opts))
            .collect();
        Ok(PostBatch::new(replies))
    }

    /// Request/response to exactly one instance; `All` picks one at random.
    pub fn request(
        &self,
        target: impl Into<Target>,
        event: &str,
        payload: Payload,
        opts: &PostOptions,
    ) -> Result<Reply, ChannelError> {
        let channel = match target.into() {
            Target::Instance(n) => self.get(n)?,
            Target::All | Target::Any => self.pick_any(None)?,
        };
        Ok(channel.post(event, payload, opts))
    }
}
