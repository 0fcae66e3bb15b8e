//! Ambient conversation context for events recorded deep inside a task
//!
//! A context id set with [`with_context_id`] is visible to everything the
//! scoped future runs, so crash events can be linked to the conversation
//! without threading the id through every call. Tasks spawned from inside
//! the scope do not inherit it.

use std::future::Future;

tokio::task_local! {
    static CONTEXT_ID: u64;
}

/// Run `future` with `context_id` as the ambient context id.
pub async fn with_context_id<F>(context_id: u64, future: F) -> F::Output
where
    F: Future,
{
    CONTEXT_ID.scope(context_id, future).await
}

/// Run `f` with `context_id` as the ambient context id.
pub fn sync_with_context_id<F, R>(context_id: u64, f: F) -> R
where
    F: FnOnce() -> R,
{
    CONTEXT_ID.sync_scope(context_id, f)
}

/// The ambient context id, or `None` outside any scope.
///
/// `Some(0)` is a real id, distinct from no id at all.
pub fn current_context_id() -> Option<u64> {
    CONTEXT_ID.try_with(|id| *id).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unset_outside_scope() {
        assert_eq!(current_context_id(), None);
    }

    #[tokio::test]
    async fn test_zero_is_a_real_id() {
        let seen = with_context_id(0, async { current_context_id() }).await;
        assert_eq!(seen, Some(0));
        assert_eq!(current_context_id(), None);
    }

    #[tokio::test]
    async fn test_inner_scope_shadows_outer() {
        let (inner, outer) = with_context_id(7, async {
            let inner = with_context_id(9, async { current_context_id() }).await;
            (inner, current_context_id())
        })
        .await;
        assert_eq!(inner, Some(9));
        assert_eq!(outer, Some(7));
    }

    #[tokio::test]
    async fn test_scope_survives_await_points() {
        let seen = with_context_id(42, async {
            tokio::task::yield_now().await;
            current_context_id()
        })
        .await;
        assert_eq!(seen, Some(42));
    }

    #[test]
    fn test_sync_scope() {
        assert_eq!(sync_with_context_id(3, current_context_id), Some(3));
        assert_eq!(current_context_id(), None);
    }

    #[tokio::test]
    async fn test_spawned_tasks_do_not_inherit() {
        let seen = with_context_id(5, async {
            tokio::spawn(async { current_context_id() }).await.unwrap()
        })
        .await;
        assert_eq!(seen, None);
    }
}
