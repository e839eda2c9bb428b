//! Handler trait and type erasure.
//!
//! The router stores handlers of different concrete types in one table, so
//! each is erased behind `Arc<dyn ErasedHandler>` and a boxed future. The
//! chain from user code to vtable call:
//!
//! ```text
//! async fn show(ex: Exchange) -> Finished { ex.ok("hi") }   ← user writes this
//!        ↓ router.get("/hi", show)
//! show.into_boxed_handler()                                 ← Handler blanket impl
//!        ↓ stored as BoxedHandler = Arc<dyn ErasedHandler>
//! handler.call(ex)  at request time                         ← one vtable dispatch
//! ```
//!
//! A handler must return [`Finished`], and the only way to get one is to
//! run a finisher. Responding without logging and metering is therefore
//! not expressible.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::finish::Finished;
use crate::lifecycle::Exchange;

pub(crate) type BoxFuture = Pin<Box<dyn Future<Output = Finished> + Send + 'static>>;

/// Internal dispatch interface.
///
/// `#[doc(hidden)] pub` rather than `pub(crate)` because it appears in the
/// return type of the public `Handler` trait's `into_boxed_handler`.
#[doc(hidden)]
pub trait ErasedHandler {
    fn call(&self, ex: Exchange) -> BoxFuture;
}

#[doc(hidden)]
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

/// Implemented for every valid route handler.
///
/// You never implement this yourself. It is automatically satisfied for any
/// `async fn(ex: Exchange) -> Finished`. The trait is sealed: only the
/// blanket impl below can satisfy it.
pub trait Handler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

mod private {
    pub trait Sealed {}
}

impl<F, Fut> private::Sealed for F
where
    F: Fn(Exchange) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Finished> + Send + 'static,
{
}

impl<F, Fut> Handler for F
where
    F: Fn(Exchange) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Finished> + Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(FnHandler(self))
    }
}

/// Bridges a concrete handler `F` into the trait-object world.
struct FnHandler<F>(F);

impl<F, Fut> ErasedHandler for FnHandler<F>
where
    F: Fn(Exchange) -> Fut + Send + Sync,
    Fut: Future<Output = Finished> + Send + 'static,
{
    fn call(&self, ex: Exchange) -> BoxFuture {
        Box::pin((self.0)(ex))
    }
}
