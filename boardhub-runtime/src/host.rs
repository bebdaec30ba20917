//! Host server lifecycle as seen by the orchestrator.
//!
//! The host emits `stop` exactly once. Everything that must be torn down with
//! the host (boards, the broker endpoint) registers a hook via [`Host::on_stop`].
//! Hooks run concurrently as separate tasks, so a slow or panicking hook
//! never holds up the others.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;
use tokio::task::JoinSet;

type StopFuture = Pin<Box<dyn Future<Output = ()> + Send>>;
type StopHook = Box<dyn FnOnce() -> StopFuture + Send>;

/// Cloneable handle to the host lifecycle.
#[derive(Clone)]
pub struct Host {
    inner: Arc<HostInner>,
}

struct HostInner {
    /// `None` once `stop` has run.
    hooks: Mutex<Option<Vec<StopHook>>>,
    stopped: watch::Sender<bool>,
}

impl Host {
    pub fn new() -> Self {
        let (stopped, _) = watch::channel(false);
        Self {
            inner: Arc::new(HostInner {
                hooks: Mutex::new(Some(Vec::new())),
                stopped,
            }),
        }
    }

    /// Registers a hook to run when the host stops.
    ///
    /// Hooks registered after the host has stopped run immediately on the
    /// current tokio runtime, or are dropped if there is none.
    pub fn on_stop<F, Fut>(&self, hook: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let boxed: StopHook = Box::new(move || -> StopFuture { Box::pin(hook()) });
        {
            let mut hooks = self.inner.hooks.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(pending) = hooks.as_mut() {
                pending.push(boxed);
                return;
            }
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(boxed());
            }
            Err(_) => tracing::warn!("stop hook registered after host stop; dropped"),
        }
    }

    /// Runs every registered hook concurrently and waits for all of them,
    /// then marks the host stopped. Only the first call does anything.
    pub async fn stop(&self) {
        let hooks = {
            let mut guard = self.inner.hooks.lock().unwrap_or_else(PoisonError::into_inner);
            guard.take()
        };
        let Some(hooks) = hooks else { return };

        tracing::info!(hooks = hooks.len(), "host stopping");
        let mut running = JoinSet::new();
        for hook in hooks {
            running.spawn(hook());
        }
        while let Some(joined) = running.join_next().await {
            if let Err(err) = joined {
                tracing::warn!(error = %err, "stop hook panicked");
            }
        }
        self.inner.stopped.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.inner.stopped.borrow()
    }

    /// Resolves once [`stop`](Self::stop) has finished running hooks.
    pub async fn stopped(&self) {
        let mut rx = self.inner.stopped.subscribe();
        let _ = rx.wait_for(|stopped| *stopped).await;
    }
}

impl Default for Host {
    fn default() -> Self {
        Self::new()
    }
}
