use futures::future::{BoxFuture, FutureExt, Shared};
use std::future::Future;
use tokio::task::JoinError;

/// An in-progress fetch that any number of callers can await.
///
/// The work runs on its own task, so a waiter that gives up (timeout, dropped
/// request) never cancels the fetch for the others. Whoever owns the slot
/// holding a `Flight` clears it when the work finishes.
pub struct Flight<T, E> {
    inner: Shared<BoxFuture<'static, Result<T, E>>>,
}

impl<T, E> Clone for Flight<T, E>
where
    T: Clone,
    E: Clone,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T, E> Flight<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + From<JoinError> + 'static,
{
    /// Start `work` on the runtime. Must be called from inside a tokio runtime.
    pub fn spawn<Fut>(work: Fut) -> Self
    where
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let handle = tokio::spawn(work);
        let inner = handle
            .map(|joined| joined.unwrap_or_else(|err| Err(E::from(err))))
            .boxed()
            .shared();
        Self { inner }
    }

    pub async fn wait(self) -> Result<T, E> {
        self.inner.await
    }

    pub fn same_as(&self, other: &Self) -> bool {
        self.inner.ptr_eq(&other.inner)
    }

    /// Callers currently holding this flight, the slot included.
    pub fn waiters(&self) -> usize {
        self.inner.strong_count().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::FetchError;
    use std::time::Duration;

    #[tokio::test]
    async fn every_waiter_sees_the_same_outcome() {
        let flight: Flight<u32, FetchError> = Flight::spawn(async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(7)
        });
        let waiters: Vec<_> = (0..4).map(|_| tokio::spawn(flight.clone().wait())).collect();
        for waiter in waiters {
            assert_eq!(waiter.await.unwrap(), Ok(7));
        }
    }

    #[tokio::test]
    async fn dropped_waiter_does_not_cancel_work() {
        let flight: Flight<u32, FetchError> = Flight::spawn(async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(1)
        });
        let impatient = tokio::time::timeout(Duration::from_millis(5), flight.clone().wait()).await;
        assert!(impatient.is_err());
        assert_eq!(flight.wait().await, Ok(1));
    }

    #[tokio::test]
    async fn panicking_work_resolves_as_aborted() {
        let flight: Flight<u32, FetchError> = Flight::spawn(async {
            let value: Option<u32> = None;
            Ok(value.expect("provider blew up"))
        });
        assert!(matches!(flight.wait().await, Err(FetchError::Aborted(_))));
    }

    #[tokio::test]
    async fn clones_are_the_same_flight() {
        let a: Flight<u32, FetchError> = Flight::spawn(async { Ok(1) });
        let b = a.clone();
        let c: Flight<u32, FetchError> = Flight::spawn(async { Ok(1) });
        assert!(a.same_as(&b));
        assert!(!a.same_as(&c));
        assert!(a.waiters() >= 2);
    }
}
