//! A subscriber that emits batch frames on a channel.

use crate::subscriber::{StopCallback, StopSignal, Subscriber};
use docsync_core::{DocumentId, FieldDelta, Fields};
use docsync_protocol::{ChangeMessage, Frame};
use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::{debug, error};

/// Encodes published notifications as batch frames.
///
/// Each notification becomes a one-message batch. Notifications between
/// `begin_snapshot` and `end_snapshot` of a collection are collected into a
/// single batch instead. The subscriber stops itself when the receiving
/// side of the channel is dropped.
pub struct FrameSubscriber {
    tx: mpsc::UnboundedSender<Frame>,
    snapshots: Mutex<HashMap<String, Vec<ChangeMessage>>>,
    signal: StopSignal,
}

impl FrameSubscriber {
    /// Creates a subscriber and the receiving end of its frame channel.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Frame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscriber = Self {
            tx,
            snapshots: Mutex::new(HashMap::new()),
            signal: StopSignal::new(),
        };
        (subscriber, rx)
    }

    /// Stops the subscription, running registered stop callbacks.
    pub fn stop(&self) {
        if self.signal.stop() {
            debug!("frame subscriber stopped");
        }
    }

    /// Returns true once stopped.
    pub fn is_stopped(&self) -> bool {
        self.signal.is_stopped()
    }

    fn emit(&self, collection: &str, message: ChangeMessage) {
        if self.is_stopped() {
            return;
        }
        {
            let mut snapshots = self.snapshots.lock();
            if let Some(buffer) = snapshots.get_mut(collection) {
                buffer.push(message);
                return;
            }
        }
        self.send_batch(collection, vec![message]);
    }

    fn send_batch(&self, collection: &str, messages: Vec<ChangeMessage>) {
        match Frame::batch(collection, false, messages) {
            Ok(frames) => self.send(frames),
            Err(err) => {
                error!(collection, error = %err, "cannot frame batch");
                self.stop();
            }
        }
    }

    fn send(&self, frames: Vec<Frame>) {
        for frame in frames {
            if self.tx.send(frame).is_err() {
                self.stop();
                return;
            }
        }
    }
}

impl Subscriber for FrameSubscriber {
    fn added(&self, collection: &str, id: &DocumentId, fields: &Fields) {
        self.emit(collection, ChangeMessage::added(id.clone(), fields.clone()));
    }

    fn changed(&self, collection: &str, id: &DocumentId, fields: &FieldDelta) {
        self.emit(collection, ChangeMessage::changed(id.clone(), fields.clone()));
    }

    fn removed(&self, collection: &str, id: &DocumentId) {
        self.emit(collection, ChangeMessage::removed(id.clone()));
    }

    fn on_stop(&self, callback: StopCallback) {
        self.signal.register(callback);
    }

    fn begin_snapshot(&self, collection: &str) {
        self.snapshots
            .lock()
            .insert(collection.to_string(), Vec::new());
    }

    fn end_snapshot(&self, collection: &str) {
        let buffered = self.snapshots.lock().remove(collection);
        if let Some(messages) = buffered {
            if !messages.is_empty() && !self.is_stopped() {
                self.send_batch(collection, messages);
            }
        }
    }
}

impl std::fmt::Debug for FrameSubscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameSubscriber")
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docsync_core::Value;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn drain(rx: &mut mpsc::UnboundedReceiver<Frame>) -> Vec<Frame> {
        let mut frames = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            frames.push(frame);
        }
        frames
    }

    #[test]
    fn single_notifications_are_one_message_batches() {
        let (subscriber, mut rx) = FrameSubscriber::new();
        subscriber.removed("tasks", &DocumentId::text("1"));
        assert_eq!(
            drain(&mut rx),
            vec![
                Frame::begin("tasks", 1, false),
                Frame::update("tasks", ChangeMessage::removed("1")),
                Frame::end("tasks"),
            ]
        );
    }

    #[test]
    fn snapshot_is_one_batch() {
        let (subscriber, mut rx) = FrameSubscriber::new();
        let mut fields = Fields::new();
        fields.insert("a".into(), Value::from(1));

        subscriber.begin_snapshot("tasks");
        subscriber.added("tasks", &DocumentId::text("1"), &fields);
        subscriber.added("tasks", &DocumentId::text("2"), &fields);
        subscriber.removed("other", &DocumentId::text("x"));
        subscriber.end_snapshot("tasks");

        let frames = drain(&mut rx);
        assert_eq!(frames.len(), 3 + 4);
        assert_eq!(frames[0], Frame::begin("other", 1, false));
        assert_eq!(frames[3], Frame::begin("tasks", 2, false));
        assert_eq!(frames[6], Frame::end("tasks"));
    }

    #[test]
    fn empty_snapshot_emits_nothing() {
        let (subscriber, mut rx) = FrameSubscriber::new();
        subscriber.begin_snapshot("tasks");
        subscriber.end_snapshot("tasks");
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn closed_channel_stops_subscriber() {
        let (subscriber, rx) = FrameSubscriber::new();
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        subscriber.on_stop(Box::new(move || flag.store(true, Ordering::SeqCst)));

        drop(rx);
        subscriber.removed("tasks", &DocumentId::text("1"));
        assert!(subscriber.is_stopped());
        assert!(fired.load(Ordering::SeqCst));
    }
}
