pub mod lifecycle;
pub mod memory;
pub mod rates;
pub mod store;

pub use lifecycle::LifecycleController;
pub use memory::InMemorySessionStore;
pub use rates::RateCard;
pub use store::{SessionStore, TransitionError};
