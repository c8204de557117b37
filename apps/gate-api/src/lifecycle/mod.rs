pub mod controller;
pub mod events;
pub mod outbox;
pub mod sweeper;

pub use controller::LifecycleController;
pub use events::{Intent, LifecycleEvent};
pub use outbox::IntentOutbox;
