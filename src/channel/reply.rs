//! # Pending answer of a `post`.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::channel::envelope::Payload;
use crate::error::ChannelError;
use crate::topology::Addressee;

pub(crate) type AnswerTx = oneshot::Sender<Result<Payload, ChannelError>>;

/// Future resolving to the answer of one `post`.
///
/// Resolves to `Err(NotActive)` immediately if the channel was inactive when
/// the `post` was issued, and to `Err(TimeoutExpired)` if no answer arrived
/// within the deadline.
#[must_use = "a Reply does nothing unless awaited"]
pub struct Reply {
    peer: Addressee,
    state: State,
}

enum State {
    Ready(Option<Result<Payload, ChannelError>>),
    Waiting(oneshot::Receiver<Result<Payload, ChannelError>>),
}

impl Reply {
    pub(crate) fn failed(peer: Addressee, err: ChannelError) -> Self {
        Self {
            peer,
            state: State::Ready(Some(Err(err))),
        }
    }

    pub(crate) fn waiting(
        peer: Addressee,
        rx: oneshot::Receiver<Result<Payload, ChannelError>>,
    ) -> Self {
        Self {
            peer,
            state: State::Waiting(rx),
        }
    }

    /// Unit the `post` was addressed to.
    pub fn peer(&self) -> &Addressee {
        &self.peer
    }
}

impl Future for Reply {
    type Output = Result<Payload, ChannelError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match &mut this.state {
            State::Ready(result) => Poll::Ready(result.take().unwrap_or_else(|| {
                Err(ChannelError::Destroyed {
                    peer: this.peer.clone(),
                })
            })),
            State::Waiting(rx) => match Pin::new(rx).poll(cx) {
                Poll::Ready(Ok(result)) => Poll::Ready(result),
                // Resolver dropped without an outcome: the channel went away.
                Poll::Ready(Err(_)) => Poll::Ready(Err(ChannelError::Destroyed {
                    peer: this.peer.clone(),
                })),
                Poll::Pending => Poll::Pending,
            },
        }
    }
}
