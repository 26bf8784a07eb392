pub mod bus;
pub mod event;
pub mod hub;

pub use bus::{EventBus, Subscription, SubscriptionHandle, Versioned};
pub use event::Event;
pub use hub::{HubError, SubscriptionHub};
