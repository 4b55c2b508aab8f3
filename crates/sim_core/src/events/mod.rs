//! Deferred message passing between components and systems
//!
//! Senders never call receivers directly. Messages wait in a queue until the
//! scene relays them between system steps, which keeps every handler running
//! at a known point of the frame.

pub mod bus;
pub mod messages;

pub use bus::{Mailbox, Message, MessageBus, SubscriptionId};
pub use messages::{
    Collision, CollisionAdjusted, CollisionNorm, ComponentAdded, ComponentRemoved, SpatialTransformed,
};
