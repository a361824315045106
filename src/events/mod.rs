mod hub;

pub use hub::{publish, subscribe, subscribe_filtered, ChangeKind, EventMessage, SubscriptionToken};
