//! Events - 故事事件推送

mod publisher;

pub use publisher::{EventPublisher, PublishingObserver, StoryEvent};
