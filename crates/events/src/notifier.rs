//! The outbound notification seam.

use std::sync::Arc;

use crate::bus::PipelineEvent;

/// Receives pipeline events.
///
/// `notify` must not block and cannot fail from the caller's point of view:
/// delivery problems are the implementation's to log and swallow.
pub trait Notifier: Send + Sync {
    fn notify(&self, event: PipelineEvent);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn notify(&self, _event: PipelineEvent) {}
}

impl<T: Notifier + ?Sized> Notifier for Arc<T> {
    fn notify(&self, event: PipelineEvent) {
        (**self).notify(event);
    }
}

/// Forwards each event to several notifiers.
#[derive(Clone, Default)]
pub struct FanoutNotifier {
    sinks: Vec<Arc<dyn Notifier>>,
}

impl FanoutNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn Notifier>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn push(&mut self, sink: Arc<dyn Notifier>) {
        self.sinks.push(sink);
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl Notifier for FanoutNotifier {
    fn notify(&self, event: PipelineEvent) {
        if let Some((last, rest)) = self.sinks.split_last() {
            for sink in rest {
                sink.notify(event.clone());
            }
            last.notify(event);
        }
    }
}
