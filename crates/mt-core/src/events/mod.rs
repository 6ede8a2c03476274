use std::sync::Arc;
use parking_lot::Mutex;
use ahash::AHashMap;

/// Directed publish/subscribe bus keyed by event kind.
///
/// The track model publishes here after it has finished its own ordered
/// reactions; subscribers never call back into the model. Handlers run while
/// the bus is locked, so a handler must not publish on the same bus.
pub struct EventBus {
    handlers: Arc<Mutex<AHashMap<std::any::TypeId, Vec<Box<dyn EventHandler>>>>>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus").finish_non_exhaustive()
    }
}

/// Event trait that all events must implement
pub trait Event: Send + Sync + 'static {
    fn as_any(&self) -> &dyn std::any::Any;
}

impl dyn Event {
    /// Downcast to a concrete event kind
    pub fn downcast_ref<E: Event>(&self) -> Option<&E> {
        self.as_any().downcast_ref::<E>()
    }
}

/// Handler trait for event handlers
pub trait EventHandler: Send + Sync {
    fn handle(&mut self, event: &dyn Event);
}

/// Track model events
pub mod events {
    use super::Event;
    use crate::TrackId;

    /// A data clip's start index, stride or clip length changed
    #[derive(Debug, Clone, PartialEq)]
    pub struct DataClipChanged {
        pub track: TrackId,
        pub start_index: usize,
        pub stride: usize,
        pub clip_length: usize,
    }

    /// A track's steps were repopulated
    #[derive(Debug, Clone, PartialEq)]
    pub struct StepsChanged {
        pub track: TrackId,
    }

    /// A data track's start frame moved
    #[derive(Debug, Clone, PartialEq)]
    pub struct StartFrameChanged {
        pub track: TrackId,
        pub frame: usize,
    }

    /// The video clip's playable range changed
    #[derive(Debug, Clone, PartialEq)]
    pub struct VideoClipChanged {
        pub end_frame: usize,
        pub last_frame: usize,
        pub extra_frames: usize,
    }

    /// A track was added to the session
    #[derive(Debug, Clone, PartialEq)]
    pub struct TrackAdded {
        pub track: TrackId,
        pub name: String,
    }

    /// A track was removed from the session
    #[derive(Debug, Clone, PartialEq)]
    pub struct TrackDeleted {
        pub track: TrackId,
    }

    /// External data was committed to a track
    #[derive(Debug, Clone, PartialEq)]
    pub struct DataImported {
        pub source_name: String,
        pub row_count: usize,
        pub point_count: usize,
    }

    /// External data could not be committed
    #[derive(Debug, Clone, PartialEq)]
    pub struct DataImportFailed {
        pub source_name: String,
        pub error: String,
    }

    /// Dismissible, non-blocking message for the user
    #[derive(Debug, Clone, PartialEq)]
    pub struct Notice {
        pub title: String,
        pub message: String,
    }

    // Implement Event trait for all event types
    macro_rules! impl_event {
        ($($t:ty),*) => {
            $(
                impl Event for $t {
                    fn as_any(&self) -> &dyn std::any::Any {
                        self
                    }
                }
            )*
        }
    }

    impl_event!(
        DataClipChanged,
        StepsChanged,
        StartFrameChanged,
        VideoClipChanged,
        TrackAdded,
        TrackDeleted,
        DataImported,
        DataImportFailed,
        Notice
    );
}

impl EventBus {
    /// Create a new event bus
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(Mutex::new(AHashMap::new())),
        }
    }

    /// Subscribe to events of a specific type
    pub fn subscribe<E: Event>(&self, handler: Box<dyn EventHandler>) {
        let type_id = std::any::TypeId::of::<E>();
        let mut handlers = self.handlers.lock();
        handlers.entry(type_id).or_insert_with(Vec::new).push(handler);
    }

    /// Publish an event
    pub fn publish<E: Event>(&self, event: E) {
        let type_id = std::any::TypeId::of::<E>();
        let mut handlers = self.handlers.lock();

        if let Some(event_handlers) = handlers.get_mut(&type_id) {
            for handler in event_handlers.iter_mut() {
                handler.handle(&event);
            }
        }
    }

    /// Number of handlers subscribed to an event kind
    #[cfg(test)]
    pub(crate) fn subscriber_count<E: Event>(&self) -> usize {
        self.handlers
            .lock()
            .get(&std::any::TypeId::of::<E>())
            .map(Vec::len)
            .unwrap_or(0)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Helper struct for creating event handlers from closures
pub struct ClosureEventHandler<F> {
    handler: F,
}

impl<F> EventHandler for ClosureEventHandler<F>
where
    F: FnMut(&dyn Event) + Send + Sync,
{
    fn handle(&mut self, event: &dyn Event) {
        (self.handler)(event);
    }
}

/// Create an event handler from a closure
pub fn handler_from_fn<F>(f: F) -> Box<dyn EventHandler>
where
    F: FnMut(&dyn Event) + Send + Sync + 'static,
{
    Box::new(ClosureEventHandler { handler: f })
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::events::{Notice, StepsChanged};
    use crate::TrackId;

    #[test]
    fn test_publish_reaches_only_matching_kind() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = seen.clone();
        bus.subscribe::<Notice>(handler_from_fn(move |event| {
            if let Some(notice) = event.downcast_ref::<Notice>() {
                sink.lock().push(notice.title.clone());
            }
        }));

        bus.publish(StepsChanged { track: TrackId::new() });
        bus.publish(Notice {
            title: "No new data".to_string(),
            message: "nothing appended".to_string(),
        });

        assert_eq!(*seen.lock(), vec!["No new data".to_string()]);
        assert_eq!(bus.subscriber_count::<Notice>(), 1);
        assert_eq!(bus.subscriber_count::<StepsChanged>(), 0);
    }
}
