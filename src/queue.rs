//! Per-agent-type FIFO ordering over arbitrary concurrent submissions.
//!
//! Every submission is tagged with a monotonic sequence number and an
//! [`AgentKind`]. A submission becomes eligible to run only when no
//! earlier unfinished submission with the same kind exists; different
//! kinds never block each other. Completion removes the entry and wakes
//! all waiters, so there is no polling loop.
//!
//! Cancellation is cooperative: dropping the future returned by
//! [`MessageQueue::run`] (for example when the caller's deadline fires)
//! removes the queue entry whether or not it had started, so later
//! submissions of the same kind are not wedged.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::Notify;

use crate::agents::AgentKind;
use crate::error::AgentError;
use crate::llm::message::{ChatRequest, ChatResponse};
use crate::llm::provider::LlmProvider;

#[derive(Debug)]
struct Entry {
    seq: u64,
    kind: AgentKind,
}

#[derive(Debug, Default)]
struct QueueState {
    next_seq: u64,
    entries: Vec<Entry>,
}

#[derive(Debug, Default)]
struct Inner {
    state: Mutex<QueueState>,
    notify: Notify,
}

/// FIFO ordering layer over the per-agent dispatch path.
///
/// Cloning is cheap; all clones share one queue.
#[derive(Debug, Clone, Default)]
pub struct MessageQueue {
    inner: Arc<Inner>,
}

/// Removes its entry from the queue when dropped, finished or not.
struct EntryGuard {
    inner: Arc<Inner>,
    seq: u64,
}

impl Drop for EntryGuard {
    fn drop(&mut self) {
        let mut state = self
            .inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        state.entries.retain(|e| e.seq != self.seq);
        drop(state);
        self.inner.notify.notify_waiters();
    }
}

impl MessageQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of in-flight submissions (waiting or running).
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    /// Returns `true` if nothing is queued or running.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Runs `work` under the queue's ordering guarantee for `kind`.
    ///
    /// Blocks (asynchronously) until every earlier submission of the
    /// same kind has completed, then runs the future to completion. The
    /// entry is removed afterwards; different kinds proceed in parallel
    /// throughout.
    pub async fn run<T, F>(&self, kind: AgentKind, work: F) -> T
    where
        F: Future<Output = T>,
    {
        let seq = {
            let mut state = self
                .inner
                .state
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let seq = state.next_seq;
            state.next_seq += 1;
            state.entries.push(Entry { seq, kind });
            seq
        };
        let guard = EntryGuard {
            inner: Arc::clone(&self.inner),
            seq,
        };

        // Condvar-style wait: register interest before checking so a
        // completion between the check and the await cannot be lost.
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let blocked = self
                .inner
                .state
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .entries
                .iter()
                .any(|e| e.seq < seq && e.kind == kind);
            if !blocked {
                break;
            }
            notified.await;
        }

        let result = work.await;
        drop(guard);
        result
    }

    /// Sends one chat request under the ordering guarantee for `kind`.
    ///
    /// Provider failure is part of the returned pair rather than an
    /// early return so that callers always learn which agent type the
    /// response belongs to.
    pub async fn send(
        &self,
        provider: &dyn LlmProvider,
        request: ChatRequest,
        kind: AgentKind,
    ) -> (Result<ChatResponse, AgentError>, AgentKind) {
        let result = self.run(kind, provider.chat(&request)).await;
        (result, kind)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    use crate::llm::message::user_message;
    use crate::llm::providers::ScriptedProvider;

    fn request(text: &str) -> ChatRequest {
        ChatRequest {
            model: "scripted".to_string(),
            messages: vec![user_message(text)],
            temperature: None,
            max_tokens: None,
            tools: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_same_kind_is_fifo_even_when_later_is_faster() {
        let queue = MessageQueue::new();
        let provider = Arc::new(ScriptedProvider::new());
        // F1 slow, F2 fast, S1 fast.
        provider.push_text_with_latency("F1", Duration::from_millis(80));
        provider.push_text_with_latency("F2", Duration::from_millis(5));
        provider.push_text_with_latency("S1", Duration::from_millis(5));

        let order: Arc<StdMutex<Vec<&'static str>>> = Arc::new(StdMutex::new(Vec::new()));

        let submit = |label: &'static str, kind: AgentKind, text: &'static str| {
            let queue = queue.clone();
            let provider = Arc::clone(&provider);
            let order = Arc::clone(&order);
            tokio::spawn(async move {
                let (result, _) = queue.send(provider.as_ref(), request(text), kind).await;
                result.unwrap_or_else(|e| panic!("send failed: {e}"));
                order
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(label);
            })
        };

        let f1 = submit("F1", AgentKind::EpisodicMemory, "f1");
        // Give F1 the first scripted response.
        tokio::time::sleep(Duration::from_millis(10)).await;
        let f2 = submit("F2", AgentKind::EpisodicMemory, "f2");
        let s1 = submit("S1", AgentKind::SemanticMemory, "s1");

        for handle in [f1, f2, s1] {
            handle.await.unwrap_or_else(|e| panic!("join failed: {e}"));
        }

        let order = order.lock().unwrap_or_else(PoisonError::into_inner).clone();
        // Cross-kind: S1 did not wait for the slow F1. Same-kind: F2
        // finished after F1 despite being much faster.
        assert_eq!(order, vec!["S1", "F1", "F2"]);
    }

    #[tokio::test]
    async fn test_completed_entries_are_removed() {
        let queue = MessageQueue::new();
        let provider = ScriptedProvider::new();
        assert!(queue.is_empty());
        let (result, kind) = queue
            .send(&provider, request("x"), AgentKind::Chat)
            .await;
        result.unwrap_or_else(|e| panic!("send failed: {e}"));
        assert_eq!(kind, AgentKind::Chat);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_waiter_does_not_wedge_the_kind() {
        let queue = MessageQueue::new();
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_text_with_latency("slow", Duration::from_millis(60));
        provider.push_text("after-cancel");

        let first = {
            let queue = queue.clone();
            let provider = Arc::clone(&provider);
            tokio::spawn(async move {
                queue
                    .send(provider.as_ref(), request("slow"), AgentKind::Chat)
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        // A queued-but-not-started submission gets cancelled.
        let cancelled = {
            let queue = queue.clone();
            let provider = Arc::clone(&provider);
            tokio::spawn(async move {
                queue
                    .send(provider.as_ref(), request("cancelled"), AgentKind::Chat)
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        cancelled.abort();
        let _ = cancelled.await;

        first
            .await
            .unwrap_or_else(|e| panic!("join failed: {e}"))
            .0
            .unwrap_or_else(|e| panic!("send failed: {e}"));

        // A later submission of the same kind still runs.
        let (result, _) = queue
            .send(provider.as_ref(), request("next"), AgentKind::Chat)
            .await;
        let response = result.unwrap_or_else(|e| panic!("send failed: {e}"));
        assert_eq!(response.content, "after-cancel");
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_many_concurrent_kinds_make_progress() {
        let queue = MessageQueue::new();
        let provider = Arc::new(ScriptedProvider::new());

        let mut handles = Vec::new();
        for kind in AgentKind::MEMORY_AGENTS {
            for i in 0..3 {
                let queue = queue.clone();
                let provider = Arc::clone(&provider);
                handles.push(tokio::spawn(async move {
                    let (result, _) = queue
                        .send(provider.as_ref(), request(&format!("{kind}-{i}")), kind)
                        .await;
                    result.unwrap_or_else(|e| panic!("send failed: {e}"));
                }));
            }
        }
        for handle in handles {
            handle.await.unwrap_or_else(|e| panic!("join failed: {e}"));
        }
        assert!(queue.is_empty());
    }
}
