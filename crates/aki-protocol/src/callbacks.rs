//! Caller-supplied handlers.
//!
//! A handler is tagged at construction as either immediate (a plain closure)
//! or suspending (a closure returning a future). [`Handler::invoke`] dispatches
//! on that tag, awaiting only suspending handlers, so one job session drives
//! both kinds in the order snapshots are produced.

use std::future::Future;

use futures::future::BoxFuture;

use crate::types::{Outcome, ProgressSnapshot};

/// A callback taking one argument of type `A`.
pub enum Handler<A> {
    /// Runs to completion on the calling task.
    Immediate(Box<dyn FnMut(A) + Send>),
    /// Returns a future that is awaited before the session continues.
    Suspending(Box<dyn FnMut(A) -> BoxFuture<'static, ()> + Send>),
}

impl<A: Send + 'static> Handler<A> {
    pub fn immediate<F>(f: F) -> Self
    where
        F: FnMut(A) + Send + 'static,
    {
        Self::Immediate(Box::new(f))
    }

    pub fn suspending<F, Fut>(mut f: F) -> Self
    where
        F: FnMut(A) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self::Suspending(Box::new(move |arg| Box::pin(f(arg))))
    }

    /// Calls the handler, awaiting it only when it is suspending.
    pub async fn invoke(&mut self, arg: A) {
        match self {
            Self::Immediate(f) => f(arg),
            Self::Suspending(f) => f(arg).await,
        }
    }
}

impl<A> std::fmt::Debug for Handler<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Immediate(_) => f.write_str("Handler::Immediate"),
            Self::Suspending(_) => f.write_str("Handler::Suspending"),
        }
    }
}

/// Invokes `handler` if present; absence is a no-op.
pub async fn invoke<A: Send + 'static>(handler: Option<&mut Handler<A>>, arg: A) {
    if let Some(handler) = handler {
        handler.invoke(arg).await;
    }
}

/// Receives every non-terminal snapshot of a job.
pub type ProgressHandler = Handler<ProgressSnapshot>;

/// Receives the terminal [`Outcome`] of a job.
pub type ResultHandler = Handler<Outcome>;

/// The handlers of one callback-driven call.
///
/// Registering a progress handler is what makes a call deferred: without one
/// the service is asked to block until the result is ready.
#[derive(Debug, Default)]
pub struct Handlers {
    pub progress: Option<ProgressHandler>,
    pub result: Option<ResultHandler>,
}

impl Handlers {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn on_progress(mut self, handler: ProgressHandler) -> Self {
        self.progress = Some(handler);
        self
    }

    #[must_use]
    pub fn on_result(mut self, handler: ResultHandler) -> Self {
        self.result = Some(handler);
        self
    }

    pub(crate) async fn progress(&mut self, snapshot: ProgressSnapshot) {
        invoke(self.progress.as_mut(), snapshot).await;
    }

    pub(crate) async fn result(&mut self, outcome: Outcome) {
        invoke(self.result.as_mut(), outcome).await;
    }
}
