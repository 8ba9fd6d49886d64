use crate::baggage::Baggage;
use crate::trace::SpanContext;
use pin_project_lite::pin_project;
use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::{BuildHasherDefault, Hasher};
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};

thread_local! {
    static CURRENT_CONTEXT: RefCell<Context> = RefCell::new(Context::default());
}

/// An execution-scoped, immutable collection of values.
///
/// A `Context` carries cross-cutting state (the current [`SpanContext`], the
/// current [`Baggage`], and arbitrary typed entries) along a logical unit of
/// work. Contexts are never mutated: every "write" operation returns a
/// derived context, and the derived context only becomes visible to other
/// code once it is [attached](Context::attach) to the current thread of
/// execution.
///
/// The ambient ("current") context is bound per thread. Crossing to another
/// task or thread re-establishes it via [`FutureExt::with_context`], which
/// wraps a future so the context is current at every poll.
///
/// # Examples
///
/// ```
/// use otel::Context;
///
/// #[derive(Debug, PartialEq)]
/// struct ValueA(&'static str);
///
/// let _guard = Context::new().with_value(ValueA("a")).attach();
/// assert_eq!(Context::current().get::<ValueA>(), Some(&ValueA("a")));
/// ```
#[derive(Clone, Default)]
pub struct Context {
    pub(crate) span_context: Option<SpanContext>,
    pub(crate) baggage: Option<Arc<Baggage>>,
    entries: HashMap<TypeId, Arc<dyn Any + Sync + Send>, BuildHasherDefault<IdHasher>>,
}

impl Context {
    /// Creates an empty `Context`.
    pub fn new() -> Self {
        Context::default()
    }

    /// Returns an immutable snapshot of the current thread's context.
    pub fn current() -> Self {
        Context::map_current(|cx| cx.clone())
    }

    /// Applies a function to the current context, returning its value.
    ///
    /// Cheaper than [`Context::current`] when only a read is needed.
    pub fn map_current<T>(f: impl FnOnce(&Context) -> T) -> T {
        CURRENT_CONTEXT.with(|cx| f(&cx.borrow()))
    }

    /// Returns a clone of the current context with the given value set.
    pub fn current_with_value<T: 'static + Send + Sync>(value: T) -> Self {
        Context::current().with_value(value)
    }

    /// Returns a reference to the entry of the corresponding value type.
    pub fn get<T: 'static>(&self) -> Option<&T> {
        self.entries
            .get(&TypeId::of::<T>())
            .and_then(|rc| rc.downcast_ref())
    }

    /// Returns a derived context with the given value set.
    ///
    /// Entries are keyed by type, so storing application state should use
    /// application-specific newtypes to avoid collisions.
    pub fn with_value<T: 'static + Send + Sync>(&self, value: T) -> Self {
        let mut new_context = self.clone();
        new_context
            .entries
            .insert(TypeId::of::<T>(), Arc::new(value));
        new_context
    }

    /// Returns a derived context with the span context slot replaced.
    pub fn with_span_context(&self, span_context: SpanContext) -> Self {
        Context {
            span_context: Some(span_context),
            ..self.clone()
        }
    }

    /// The span context slot, if one has been set.
    pub fn span_context(&self) -> Option<&SpanContext> {
        self.span_context.as_ref()
    }

    /// Returns `true` if the context carries a valid span context.
    pub fn has_active_span(&self) -> bool {
        self.span_context
            .as_ref()
            .map(SpanContext::is_valid)
            .unwrap_or(false)
    }

    /// Binds this context as current for the duration of the given closure,
    /// restoring the previous context on all exit paths, including panics.
    pub fn with_current<T>(self, f: impl FnOnce() -> T) -> T {
        let _guard = self.attach();
        f()
    }

    /// Binds this context as the current thread's context.
    ///
    /// The previous context is restored when the returned guard is dropped.
    /// Guards restore in reverse order of attachment; dropping them out of
    /// order leaves the context of the still-live guard in place.
    pub fn attach(self) -> ContextGuard {
        let previous_cx = CURRENT_CONTEXT
            .try_with(|current| current.replace(self))
            .ok();

        ContextGuard {
            previous_cx,
            _marker: PhantomData,
        }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("span_context", &self.span_context)
            .field("baggage", &self.baggage)
            .field("entries", &self.entries.len())
            .finish()
    }
}

/// A guard that resets the current context to the prior one on drop.
#[allow(missing_debug_implementations)]
pub struct ContextGuard {
    previous_cx: Option<Context>,
    // ensure this type is !Send, as it relies on thread locals
    _marker: PhantomData<*const ()>,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        if let Some(previous_cx) = self.previous_cx.take() {
            let _ = CURRENT_CONTEXT.try_with(|current| current.replace(previous_cx));
        }
    }
}

/// With TypeIds as keys, there's no need to hash them. They are already
/// hashes themselves, coming from the compiler. The IdHasher just holds the
/// u64 of the TypeId and returns it.
#[derive(Clone, Default, Debug)]
struct IdHasher(u64);

impl Hasher for IdHasher {
    fn write(&mut self, _: &[u8]) {
        unreachable!("TypeId calls write_u64");
    }

    #[inline]
    fn write_u64(&mut self, id: u64) {
        self.0 = id;
    }

    #[inline]
    fn finish(&self) -> u64 {
        self.0
    }
}

pin_project! {
    /// A future that re-establishes a [`Context`] at every poll.
    ///
    /// This is how span context and baggage cross detached execution units:
    /// the wrapped future observes `inner` as current regardless of which
    /// worker thread polls it.
    #[derive(Clone, Debug)]
    pub struct WithContext<T> {
        #[pin]
        inner: T,
        otel_cx: Context,
    }
}

impl<T: Future> Future for WithContext<T> {
    type Output = T::Output;

    fn poll(self: Pin<&mut Self>, task_cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let _guard = this.otel_cx.clone().attach();
        this.inner.poll(task_cx)
    }
}

/// Extension trait allowing futures to be marked with a [`Context`].
pub trait FutureExt: Sized {
    /// Attach the given context to this future.
    ///
    /// The context is made current every time the future is polled, and the
    /// previous context is restored afterwards.
    fn with_context(self, otel_cx: Context) -> WithContext<Self> {
        WithContext {
            inner: self,
            otel_cx,
        }
    }

    /// Attach a snapshot of the current context to this future.
    fn with_current_context(self) -> WithContext<Self> {
        self.with_context(Context::current())
    }
}

impl<T: Future> FutureExt for T {}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct ValueA(u64);
    #[derive(Debug, PartialEq)]
    struct ValueB(u64);

    #[test]
    fn nested_contexts() {
        #[derive(Debug, PartialEq)]
        struct Outer(u8);
        #[derive(Debug, PartialEq)]
        struct Inner(u8);

        let _outer = Context::new().with_value(Outer(1)).attach();
        {
            let _inner = Context::current_with_value(Inner(2)).attach();
            let current = Context::current();
            assert_eq!(current.get::<Outer>(), Some(&Outer(1)));
            assert_eq!(current.get::<Inner>(), Some(&Inner(2)));
        }
        let current = Context::current();
        assert_eq!(current.get::<Outer>(), Some(&Outer(1)));
        assert_eq!(current.get::<Inner>(), None);
    }

    #[test]
    fn restores_on_panic() {
        let result = std::panic::catch_unwind(|| {
            Context::new().with_value(ValueA(1)).with_current(|| {
                assert_eq!(Context::current().get::<ValueA>(), Some(&ValueA(1)));
                panic!("boom");
            })
        });
        assert!(result.is_err());
        assert_eq!(Context::current().get::<ValueA>(), None);
    }

    #[test]
    fn values_are_type_scoped() {
        let cx = Context::new().with_value(ValueA(1)).with_value(ValueB(2));
        assert_eq!(cx.get::<ValueA>(), Some(&ValueA(1)));
        assert_eq!(cx.get::<ValueB>(), Some(&ValueB(2)));
        // later writes replace earlier ones of the same type
        let cx = cx.with_value(ValueA(3));
        assert_eq!(cx.get::<ValueA>(), Some(&ValueA(3)));
    }

    #[test]
    fn future_carries_context() {
        use std::future::Future;
        use std::task::{Context as TaskContext, Poll, RawWaker, RawWakerVTable, Waker};

        fn noop_waker() -> Waker {
            fn raw() -> RawWaker {
                RawWaker::new(std::ptr::null(), &VTABLE)
            }
            static VTABLE: RawWakerVTable =
                RawWakerVTable::new(|_| raw(), |_| {}, |_| {}, |_| {});
            unsafe { Waker::from_raw(raw()) }
        }

        let fut = async {
            Context::map_current(|cx| cx.get::<ValueA>().map(|v| v.0))
        }
        .with_context(Context::new().with_value(ValueA(7)));

        let waker = noop_waker();
        let mut task_cx = TaskContext::from_waker(&waker);
        let mut fut = Box::pin(fut);
        match fut.as_mut().poll(&mut task_cx) {
            Poll::Ready(observed) => assert_eq!(observed, Some(7)),
            Poll::Pending => panic!("future should be ready"),
        }
        // the wrapped context does not leak into the polling thread
        assert_eq!(Context::current().get::<ValueA>(), None);
    }
}
