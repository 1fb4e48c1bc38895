//! # Aggregated results of fan-out operations.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::FutureExt;
use futures::future::{BoxFuture, join_all};

use crate::channel::{Payload, Reply, SendStatus};
use crate::error::ChannelError;
use crate::topology::Addressee;

/// Per-recipient status of a fan-out `send`, in recipient order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SendReport {
    /// `(recipient, status)` pairs.
    pub outcomes: Vec<(Addressee, SendStatus)>,
}

impl SendReport {
    pub(crate) fn push(&mut self, to: Addressee, status: SendStatus) {
        self.outcomes.push((to, status));
    }

    fn count(&self, status: SendStatus) -> usize {
        self.outcomes.iter().filter(|(_, s)| *s == status).count()
    }

    /// Recipients the send was transmitted to.
    pub fn delivered(&self) -> usize {
        self.count(SendStatus::Delivered)
    }

    /// Recipients the send is queued for.
    pub fn queued(&self) -> usize {
        self.count(SendStatus::Queued)
    }

    /// Recipients the send was dropped for.
    pub fn dropped(&self) -> usize {
        self.count(SendStatus::Dropped)
    }

    /// Status for one recipient.
    pub fn status_of(&self, unit: &Addressee) -> Option<SendStatus> {
        self.outcomes
            .iter()
            .find(|(to, _)| to == unit)
            .map(|(_, status)| *status)
    }
}

/// Aggregate of a fan-out `post`.
#[derive(Debug, Default)]
pub struct PostReport {
    /// Number of answers received.
    pub ok: usize,
    /// Number of failed recipients.
    pub errors: usize,
    /// `(recipient, answer or error)` pairs, in recipient order.
    pub outcomes: Vec<(Addressee, Result<Payload, ChannelError>)>,
}

impl PostReport {
    fn collect(outcomes: Vec<(Addressee, Result<Payload, ChannelError>)>) -> Self {
        let ok = outcomes.iter().filter(|(_, r)| r.is_ok()).count();
        Self {
            ok,
            errors: outcomes.len() - ok,
            outcomes,
        }
    }

    /// Received answers, in recipient order.
    pub fn answers(&self) -> impl Iterator<Item = &Payload> {
        self.outcomes.iter().filter_map(|(_, r)| r.as_ref().ok())
    }

    /// True if every recipient answered.
    pub fn is_ok(&self) -> bool {
        self.errors == 0
    }
}

/// Future resolving to the [`PostReport`] of a fan-out `post`.
#[must_use = "a PostBatch does nothing unless awaited"]
pub struct PostBatch {
    fut: BoxFuture<'static, PostReport>,
}

impl PostBatch {
    pub(crate) fn new(replies: Vec<Reply>) -> Self {
        let fut = async move {
            let peers: Vec<Addressee> = replies.iter().map(|r| r.peer().clone()).collect();
            let results = join_all(replies).await;
            PostReport::collect(peers.into_iter().zip(results).collect())
        }
        .boxed();
        Self { fut }
    }
}

impl Future for PostBatch {
    type Output = PostReport;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.get_mut().fut.as_mut().poll(cx)
    }
}
