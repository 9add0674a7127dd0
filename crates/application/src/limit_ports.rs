mod cache;
mod directory;
mod events;
mod repository;

pub use cache::LimitCacheStore;
pub use directory::{LimitDirectory, ServiceRecord};
pub use events::{LimitEventPublisher, LimitExceededEvent};
pub use repository::{LimitRepository, SubjectRef};
