//! Post-commit effect execution.
//!
//! Effects run on the tokio runtime, detached from the caller. The returned
//! [`EffectHandle`] lets a caller (usually a test) wait for them; dropping the
//! handle does not cancel anything.

use crate::effect::Effect;
use std::future::Future;
use std::pin::Pin;
use tokio::task::JoinHandle;

type BoxedRun<A> = Pin<Box<dyn Future<Output = Vec<A>> + Send>>;

/// Handle to effects spawned by [`execute`].
pub struct EffectHandle<A> {
    tasks: Vec<JoinHandle<Vec<A>>>,
}

impl<A> EffectHandle<A> {
    /// A handle with nothing left to wait for
    #[must_use]
    pub const fn completed() -> Self {
        Self { tasks: Vec::new() }
    }

    /// Number of spawned effect tasks
    #[must_use]
    pub fn pending(&self) -> usize {
        self.tasks.len()
    }

    /// Wait for every spawned effect and collect the actions they fed back.
    ///
    /// A task that panicked or was cancelled is logged and skipped.
    pub async fn wait(self) -> Vec<A> {
        let mut feedback = Vec::new();
        for task in self.tasks {
            match task.await {
                Ok(actions) => feedback.extend(actions),
                Err(error) => tracing::warn!(%error, "Effect task did not complete"),
            }
        }
        feedback
    }
}

/// Combines several handles into one that waits for all of them.
impl<A> FromIterator<EffectHandle<A>> for EffectHandle<A> {
    fn from_iter<I: IntoIterator<Item = EffectHandle<A>>>(handles: I) -> Self {
        Self {
            tasks: handles.into_iter().flat_map(|handle| handle.tasks).collect(),
        }
    }
}

impl<A> std::fmt::Debug for EffectHandle<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectHandle")
            .field("pending_effects", &self.tasks.len())
            .finish()
    }
}

/// Spawn every effect onto the current tokio runtime.
///
/// No-op effects are skipped without spawning a task.
///
/// # Panics
///
/// Panics if called outside a tokio runtime (via `tokio::spawn`).
pub fn execute<A, I>(effects: I) -> EffectHandle<A>
where
    A: Send + 'static,
    I: IntoIterator<Item = Effect<A>>,
{
    let tasks: Vec<_> = effects
        .into_iter()
        .filter(|effect| !effect.is_noop())
        .map(|effect| tokio::spawn(run(effect)))
        .collect();

    tracing::debug!(spawned = tasks.len(), "Dispatched post-commit effects");
    EffectHandle { tasks }
}

fn run<A: Send + 'static>(effect: Effect<A>) -> BoxedRun<A> {
    Box::pin(async move {
        match effect {
            Effect::None => Vec::new(),
            Effect::Future(future) => future.await.into_iter().collect(),
            Effect::Sequential(effects) => {
                let mut feedback = Vec::new();
                for effect in effects {
                    feedback.extend(run(effect).await);
                }
                feedback
            },
            Effect::Parallel(effects) => futures::future::join_all(effects.into_iter().map(run))
                .await
                .into_iter()
                .flatten()
                .collect(),
        }
    })
}
