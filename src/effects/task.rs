//! Effects backed by async tasks on a tokio runtime.

use crate::effects::disposable::Disposable;
use crate::effects::effect::Effect;
use crate::effects::error::EffectError;
use crate::effects::observable::{Observable, Subscriber};
use std::fmt::Display;
use std::future::Future;
use stillwater::effect::BoxedEffect;
use stillwater::effect::Effect as StillwaterEffect;
use tokio::runtime::Handle;
use tokio::task::JoinError;

impl<A: Send + 'static> Effect<A> {
    /// Spawn the future built by `factory` on `handle` and emit its output.
    ///
    /// Disposing the subscription aborts the task. A panic inside the task
    /// surfaces as an effect error.
    pub fn task<F, Fut>(handle: Handle, factory: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = A> + Send + 'static,
    {
        Self::try_task(handle, move || {
            let work = factory();
            async move { Ok::<_, std::convert::Infallible>(work.await) }
        })
    }

    /// Like [`task`](Self::task) for fallible work; `Err` becomes an effect
    /// error.
    pub fn try_task<F, Fut, E>(handle: Handle, factory: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<A, E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        Observable::create(move |subscriber: Subscriber<A>| {
            let work = handle.spawn(factory());
            let abort = work.abort_handle();
            let watcher = handle.spawn(async move {
                match work.await {
                    Ok(Ok(action)) => {
                        subscriber.next(action);
                        subscriber.complete();
                    }
                    Ok(Err(error)) => subscriber.error(EffectError::failed(error)),
                    Err(error) => finish_aborted(&subscriber, error),
                }
            });
            Disposable::new(move || {
                abort.abort();
                watcher.abort();
            })
        })
        .into()
    }

    /// Run a stillwater effect against `env` and emit its output.
    ///
    /// `factory` is called once per subscription, so every run gets a fresh
    /// effect value.
    ///
    /// ```
    /// use stillwater::prelude::*;
    /// use stillwater::BoxedEffect;
    /// use tka::effects::Effect as StoreEffect;
    ///
    /// #[derive(Clone)]
    /// struct Api;
    ///
    /// fn fetch_count() -> BoxedEffect<u32, String, Api> {
    ///     pure(42).boxed()
    /// }
    ///
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() {
    /// let fetch = StoreEffect::from_stillwater(tokio::runtime::Handle::current(), Api, fetch_count);
    /// # let _ = fetch;
    /// # }
    /// ```
    pub fn from_stillwater<F, E, Env>(handle: Handle, env: Env, factory: F) -> Self
    where
        F: Fn() -> BoxedEffect<A, E, Env> + Send + Sync + 'static,
        E: Display + Send + 'static,
        Env: Clone + Send + Sync + 'static,
    {
        Self::try_task(handle, move || {
            let effect = factory();
            let env = env.clone();
            async move { effect.run(&env).await }
        })
    }
}

fn finish_aborted<A>(subscriber: &Subscriber<A>, error: JoinError) {
    if error.is_panic() {
        subscriber.error(EffectError::from_panic(error.into_panic()));
    } else {
        subscriber.complete();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::effect::Effect;
    use crate::effects::observable::Event;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::time::Duration;
    use stillwater::prelude::*;
    use tokio::sync::mpsc;

    fn forward<A: Send + 'static>(effect: &Effect<A>) -> (mpsc::UnboundedReceiver<Event<A>>, Disposable) {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = effect.as_observable().subscribe(move |event| {
            let _ = tx.send(event);
        });
        (rx, subscription)
    }

    #[tokio::test]
    async fn task_emits_future_output() {
        let effect = Effect::task(Handle::current(), || async { 7 });

        let (mut events, _subscription) = forward(&effect);

        assert_eq!(events.recv().await, Some(Event::Next(7)));
        assert_eq!(events.recv().await, Some(Event::Completed));
    }

    #[tokio::test]
    async fn try_task_error_is_reported() {
        let effect = Effect::<i32>::try_task(Handle::current(), || async { Err("timeout") });

        let (mut events, _subscription) = forward(&effect);

        assert_eq!(
            events.recv().await,
            Some(Event::Error(EffectError::Failed("timeout".into())))
        );
    }

    #[tokio::test]
    async fn disposing_aborts_task() {
        let finished = Arc::new(Mutex::new(false));
        let flag = Arc::clone(&finished);
        let effect = Effect::task(Handle::current(), move || {
            let flag = Arc::clone(&flag);
            async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                *flag.lock() = true;
            }
        });

        let (_events, subscription) = forward(&effect);
        subscription.dispose();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(!*finished.lock());
    }

    #[derive(Clone)]
    struct Env;

    fn lookup() -> BoxedEffect<i32, String, Env> {
        pure(1).boxed()
    }

    fn denied() -> BoxedEffect<i32, String, Env> {
        fail("denied".to_string()).boxed()
    }

    #[tokio::test]
    async fn stillwater_effect_runs_against_env() {
        let effect = Effect::from_stillwater(Handle::current(), Env, lookup).map(|n| n + 1);

        let (mut events, _subscription) = forward(&effect);

        assert_eq!(events.recv().await, Some(Event::Next(2)));
        assert_eq!(events.recv().await, Some(Event::Completed));
    }

    #[tokio::test]
    async fn stillwater_failure_is_effect_error() {
        let effect = Effect::from_stillwater(Handle::current(), Env, denied);

        let (mut events, _subscription) = forward(&effect);

        assert_eq!(
            events.recv().await,
            Some(Event::Error(EffectError::Failed("denied".into())))
        );
    }
}
