//! Pick-one-from-a-list prompts as a request/response pair.
//!
//! # Design
//! A page that needs the user to pick, say, a doctor calls `request`, which
//! returns an event for the UI to render and a `PendingSelection` to await.
//! The UI answers by `request_id`. No callback is stored: the waiting side
//! owns a oneshot receiver, the broker only keeps the matching sender.
//! Dropping the waiting side withdraws the prompt.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::debug;
use uuid::Uuid;

/// Emitted for the UI: show `items` under `title`, answer with `request_id`.
#[derive(Debug, Clone)]
pub struct SelectionRequested<T> {
    pub request_id: Uuid,
    pub title: String,
    pub items: Vec<T>,
}

type Waiting<T> = Mutex<HashMap<Uuid, oneshot::Sender<Option<T>>>>;

/// Resolves to the chosen item, or `None` if the prompt was dismissed or the
/// broker went away.
#[derive(Debug)]
pub struct PendingSelection<T> {
    request_id: Uuid,
    receiver: oneshot::Receiver<Option<T>>,
    waiting: Weak<Waiting<T>>,
}

impl<T> Drop for PendingSelection<T> {
    fn drop(&mut self) {
        if let Some(waiting) = self.waiting.upgrade() {
            if waiting.lock().remove(&self.request_id).is_some() {
                debug!(request_id = %self.request_id, "selection abandoned");
            }
        }
    }
}

impl<T> Future for PendingSelection<T> {
    type Output = Option<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|result| result.ok().flatten())
    }
}

#[derive(Debug)]
pub struct SelectionBroker<T> {
    waiting: Arc<Waiting<T>>,
}

impl<T> Default for SelectionBroker<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SelectionBroker<T> {
    pub fn new() -> Self {
        Self {
            waiting: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn request(&self, title: impl Into<String>, items: Vec<T>) -> (SelectionRequested<T>, PendingSelection<T>) {
        let request_id = Uuid::new_v4();
        let (sender, receiver) = oneshot::channel();
        self.waiting.lock().insert(request_id, sender);
        debug!(%request_id, "selection requested");
        (
            SelectionRequested {
                request_id,
                title: title.into(),
                items,
            },
            PendingSelection {
                request_id,
                receiver,
                waiting: Arc::downgrade(&self.waiting),
            },
        )
    }

    /// Complete `request_id` with `item`. False if it is unknown or already
    /// answered.
    pub fn resolve(&self, request_id: Uuid, item: T) -> bool {
        self.complete(request_id, Some(item))
    }

    /// Close `request_id` without a choice.
    pub fn dismiss(&self, request_id: Uuid) -> bool {
        self.complete(request_id, None)
    }

    pub fn outstanding(&self) -> usize {
        self.waiting.lock().len()
    }

    fn complete(&self, request_id: Uuid, choice: Option<T>) -> bool {
        let Some(sender) = self.waiting.lock().remove(&request_id) else {
            return false;
        };
        // The waiter may have stopped listening; the prompt is closed either way.
        let _ = sender.send(choice);
        true
    }
}
