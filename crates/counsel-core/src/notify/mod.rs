pub mod coordinator;

pub use coordinator::NotificationCoordinator;
