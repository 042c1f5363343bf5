//! Result adapters
//!
//! An adapter turns the result stream of a request into whatever shape its
//! consumer wants, without changing order or content of the events.

use crate::error::LiveboxError;
use crate::flight::LiveboxStream;
use futures_util::future::{BoxFuture, FutureExt};
use futures_util::stream::{self, BoxStream, StreamExt};

/// Maps a result stream into another consumption shape
pub trait ResultAdapter<O> {
    type Output;

    fn adapt(&self, stream: LiveboxStream<O>) -> Self::Output;
}

/// Observable request state
#[derive(Debug, Clone)]
pub enum State<O> {
    Loading,
    Success(O),
    Failure(LiveboxError),
}

impl<O> State<O> {
    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    pub fn value(&self) -> Option<&O> {
        match self {
            Self::Success(value) => Some(value),
            _ => None,
        }
    }
}

/// Emits `Loading`, then one `Success` per value or a final `Failure`
#[derive(Debug, Clone, Copy, Default)]
pub struct StateAdapter;

impl<O: Send + 'static> ResultAdapter<O> for StateAdapter {
    type Output = BoxStream<'static, State<O>>;

    fn adapt(&self, results: LiveboxStream<O>) -> Self::Output {
        stream::once(async { State::Loading })
            .chain(results.map(|result| match result {
                Ok(value) => State::Success(value),
                Err(e) => State::Failure(e),
            }))
            .boxed()
    }
}

/// Collects every event into a `Vec`
#[derive(Debug, Clone, Copy, Default)]
pub struct CollectAdapter;

impl<O: Send + 'static> ResultAdapter<O> for CollectAdapter {
    type Output = BoxFuture<'static, Vec<Result<O, LiveboxError>>>;

    fn adapt(&self, results: LiveboxStream<O>) -> Self::Output {
        results.collect::<Vec<_>>().boxed()
    }
}
