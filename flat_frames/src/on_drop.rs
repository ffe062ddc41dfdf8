use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use pin_project_lite::pin_project;

/// Trait allowing you to attach a function to a [Future] that will be called when
/// the future is dropped.
pub trait OnDropFutureExt
where
    Self: Future + Sized,
{
    /// Wraps the future with an [OnDropFuture] that will execute the given function
    /// when the future is dropped.  The function *always* runs exactly once: after the
    /// future completes, or when it is abandoned before completing.
    fn on_drop<D: FnMut()>(self, on_drop: D) -> OnDropFuture<Self, D>;
}

impl<F: Future> OnDropFutureExt for F {
    fn on_drop<D: FnMut()>(self, on_drop: D) -> OnDropFuture<Self, D> {
        OnDropFuture {
            inner: self,
            on_drop,
        }
    }
}

pin_project! {
    #[must_use = "futures do nothing unless polled"]
    pub struct OnDropFuture<F, D: FnMut()> {
        #[pin]
        inner: F,
        on_drop: D,
    }

    impl<F, D: FnMut()> PinnedDrop for OnDropFuture<F, D> {
        fn drop(this: Pin<&mut Self>) {
            let this = this.project();
            (this.on_drop)();
        }
    }
}

impl<F: Future, D: FnMut()> Future for OnDropFuture<F, D> {
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<F::Output> {
        self.project().inner.poll(cx)
    }
}
