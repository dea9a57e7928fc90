//! Shared test doubles and an in-memory event store for Warden.

mod clock;
mod memory;
mod repository;

pub use clock::FixedClock;
pub use memory::InMemoryEventRepository;
pub use repository::{EmptyEventRepository, FailingEventRepository, RecordingEventRepository};
