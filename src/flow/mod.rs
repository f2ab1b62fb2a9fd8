//! Cold flows.
//!
//! A [`Flow`] is a recipe, not a running producer: nothing executes until a
//! collector pulls it, and every collection starts the producer from
//! scratch. Operators wrap the recipe, so a chain of `map`/`filter`/
//! `transform` builds a new recipe without running anything.

pub mod stream;

mod filter;
mod map;
mod transform;
mod unfold;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::cx::Cx;
use crate::error::Result;

pub use stream::{Next, Stream};
pub use transform::Emitter;

use filter::Filter;
use map::Map;
use stream::Iter;
use transform::Transform;
use unfold::Unfold;

/// A freshly instantiated producer pipeline.
pub type FlowStream<T> = Pin<Box<dyn Stream<Item = Result<T>> + Send>>;

/// A cold, restartable asynchronous sequence.
pub struct Flow<T> {
    factory: Arc<dyn Fn() -> FlowStream<T> + Send + Sync>,
}

impl<T> Clone for Flow<T> {
    fn clone(&self) -> Self {
        Self {
            factory: Arc::clone(&self.factory),
        }
    }
}

impl<T> std::fmt::Debug for Flow<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Flow").finish_non_exhaustive()
    }
}

impl<T: Send + 'static> Flow<T> {
    /// Builds a flow from a stream factory.
    pub fn new<F, S>(factory: F) -> Self
    where
        F: Fn() -> S + Send + Sync + 'static,
        S: Stream<Item = Result<T>> + Send + 'static,
    {
        Self {
            factory: Arc::new(move || Box::pin(factory())),
        }
    }

    /// A flow over a cloneable collection of ready items.
    pub fn from_iter<I>(items: I) -> Self
    where
        I: IntoIterator<Item = T> + Clone + Send + Sync + 'static,
        I::IntoIter: Send + Unpin + 'static,
    {
        Self::new(move || Iter::new(items.clone().into_iter().map(Ok as fn(T) -> Result<T>)))
    }

    /// A flow driven by a seed and an async step function.
    ///
    /// The step returns `Ok(Some((item, next_seed)))` to yield an item,
    /// `Ok(None)` to end the flow, or `Err` to fail it.
    pub fn unfold<S, Step, Fut>(seed: S, step: Step) -> Self
    where
        S: Clone + Send + Sync + Unpin + 'static,
        Step: Fn(S) -> Fut + Clone + Send + Sync + Unpin + 'static,
        Fut: Future<Output = Result<Option<(T, S)>>> + Send + 'static,
    {
        Self::new(move || Unfold::new(seed.clone(), step.clone()))
    }

    /// Instantiates the producer pipeline. Mostly useful for driving a flow
    /// by hand; prefer [`Flow::collect`].
    #[must_use]
    pub fn open(&self) -> FlowStream<T> {
        (self.factory)()
    }

    /// Maps every item through `f`.
    #[must_use]
    pub fn map<U, F>(self, f: F) -> Flow<U>
    where
        U: Send + 'static,
        F: FnMut(T) -> U + Clone + Send + Sync + Unpin + 'static,
    {
        let factory = self.factory;
        Flow {
            factory: Arc::new(move || Box::pin(Map::new(factory(), f.clone()))),
        }
    }

    /// Keeps only items satisfying `predicate`.
    #[must_use]
    pub fn filter<P>(self, predicate: P) -> Self
    where
        P: FnMut(&T) -> bool + Clone + Send + Sync + Unpin + 'static,
    {
        let factory = self.factory;
        Self {
            factory: Arc::new(move || Box::pin(Filter::new(factory(), predicate.clone()))),
        }
    }

    /// Expands every item into zero or more downstream items via an
    /// [`Emitter`], preserving emission order.
    #[must_use]
    pub fn transform<U, F>(self, f: F) -> Flow<U>
    where
        U: Send + Unpin + 'static,
        F: FnMut(T, &mut Emitter<'_, U>) -> Result<()> + Clone + Send + Sync + Unpin + 'static,
    {
        let factory = self.factory;
        Flow {
            factory: Arc::new(move || Box::pin(Transform::new(factory(), f.clone()))),
        }
    }

    /// Runs the flow to completion, feeding each item to `sink`.
    ///
    /// Checks the collector's cancellation between items and stops at the
    /// first upstream error.
    pub async fn collect<F>(&self, cx: &Cx, mut sink: F) -> Result<()>
    where
        F: FnMut(T),
    {
        let mut stream = self.open();
        loop {
            cx.checkpoint()?;
            match Next::new(&mut stream).await {
                Some(Ok(item)) => sink(item),
                Some(Err(err)) => return Err(err),
                None => return Ok(()),
            }
        }
    }

    /// Collects the whole flow into a vector.
    pub async fn collect_values(&self, cx: &Cx) -> Result<Vec<T>> {
        let mut values = Vec::new();
        self.collect(cx, |item| values.push(item)).await?;
        Ok(values)
    }
}
