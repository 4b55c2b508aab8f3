//! Deferred, typed message bus
//!
//! Messages are queued by `send` and delivered only when the owner calls
//! [`MessageBus::relay`]. Relaying swaps the queue out first, so anything a
//! handler sends goes into the next batch instead of the one being delivered.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;

use log::trace;

use crate::ecs::entity::EntityId;

/// Marker for payload types that can travel on the bus
pub trait Message: Any + fmt::Debug {}

/// Identifies one registered handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

/// A queued message with its routing data
#[derive(Debug)]
struct Envelope {
    seq: u64,
    target: Option<EntityId>,
    type_id: TypeId,
    type_name: &'static str,
    payload: Box<dyn Any>,
}

/// Queue of undelivered messages.
///
/// Handlers receive the mailbox of the bus being relayed; what they send is
/// delivered on the following relay.
#[derive(Debug, Default)]
pub struct Mailbox {
    queue: Vec<Envelope>,
    next_seq: u64,
}

impl Mailbox {
    /// Queue `message`, optionally addressed to one entity
    pub fn send<M: Message>(&mut self, target: Option<EntityId>, message: M) {
        let seq = self.stamp();
        self.queue.push(Envelope {
            seq,
            target,
            type_id: TypeId::of::<M>(),
            type_name: std::any::type_name::<M>(),
            payload: Box::new(message),
        });
    }

    /// Number of queued messages
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Whether nothing is queued
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Next value of the ordering counter shared by messages and subscriptions
    fn stamp(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }
}

type ErasedHandler<C> = Box<dyn FnMut(&dyn Any, &mut C, &mut Mailbox)>;

struct Subscriber<C> {
    id: SubscriptionId,
    /// Only messages stamped after this are delivered
    seq: u64,
    handler: ErasedHandler<C>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Route {
    Global(TypeId),
    Scoped(EntityId, TypeId),
}

/// Typed publish/subscribe with explicit delivery points.
///
/// `C` is the context handed to handlers on relay; a scene relays its bus with
/// its `World`.
pub struct MessageBus<C> {
    mailbox: Mailbox,
    global: HashMap<TypeId, Vec<Subscriber<C>>>,
    scoped: HashMap<(EntityId, TypeId), Vec<Subscriber<C>>>,
    routes: HashMap<SubscriptionId, Route>,
    next_id: u64,
}

impl<C> MessageBus<C> {
    /// Create an empty bus
    pub fn new() -> Self {
        Self {
            mailbox: Mailbox::default(),
            global: HashMap::new(),
            scoped: HashMap::new(),
            routes: HashMap::new(),
            next_id: 0,
        }
    }

    /// Queue a message for the next relay
    pub fn send<M: Message>(&mut self, target: Option<EntityId>, message: M) {
        self.mailbox.send(target, message);
    }

    /// The pending queue
    pub fn mailbox_mut(&mut self) -> &mut Mailbox {
        &mut self.mailbox
    }

    /// Number of messages waiting for the next relay
    pub fn pending(&self) -> usize {
        self.mailbox.len()
    }

    /// Number of registered handlers
    pub fn subscriber_count(&self) -> usize {
        self.routes.len()
    }

    /// Register `handler` for messages of type `M`.
    ///
    /// With `Some(entity)` only messages addressed to that entity are
    /// received; with `None` every `M` is. The handler only sees messages
    /// sent after this call.
    pub fn subscribe<M, F>(&mut self, target: Option<EntityId>, mut handler: F) -> SubscriptionId
    where
        M: Message,
        F: FnMut(&M, &mut C, &mut Mailbox) + 'static,
    {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        let type_id = TypeId::of::<M>();
        let subscriber = Subscriber {
            id,
            seq: self.mailbox.stamp(),
            handler: Box::new(move |payload: &dyn Any, ctx: &mut C, mailbox: &mut Mailbox| {
                if let Some(message) = payload.downcast_ref::<M>() {
                    handler(message, ctx, mailbox);
                }
            }),
        };

        let route = match target {
            Some(entity) => {
                self.scoped.entry((entity, type_id)).or_default().push(subscriber);
                Route::Scoped(entity, type_id)
            }
            None => {
                self.global.entry(type_id).or_default().push(subscriber);
                Route::Global(type_id)
            }
        };
        self.routes.insert(id, route);
        id
    }

    /// Remove a handler. Returns false if it was already gone.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let Some(route) = self.routes.remove(&id) else { return false };
        let list = match route {
            Route::Global(type_id) => self.global.get_mut(&type_id),
            Route::Scoped(entity, type_id) => self.scoped.get_mut(&(entity, type_id)),
        };
        if let Some(list) = list {
            list.retain(|sub| sub.id != id);
        }
        true
    }

    /// Drop every handler scoped to `entity`
    pub fn forget_entity(&mut self, entity: EntityId) {
        self.scoped.retain(|&(owner, _), _| owner != entity);
        self.routes
            .retain(|_, route| !matches!(route, Route::Scoped(owner, _) if *owner == entity));
    }

    /// Deliver everything queued so far. Entity-scoped handlers run before
    /// global ones for each message. Returns the number of handler calls.
    pub fn relay(&mut self, ctx: &mut C) -> usize {
        let batch = std::mem::take(&mut self.mailbox.queue);
        if batch.is_empty() {
            return 0;
        }

        let messages = batch.len();
        let mut deliveries = 0;
        for envelope in batch {
            if let Some(entity) = envelope.target {
                if let Some(subscribers) = self.scoped.get_mut(&(entity, envelope.type_id)) {
                    deliveries += deliver(subscribers, &envelope, ctx, &mut self.mailbox);
                }
            }
            if let Some(subscribers) = self.global.get_mut(&envelope.type_id) {
                deliveries += deliver(subscribers, &envelope, ctx, &mut self.mailbox);
            }
        }

        trace!("Relayed {} messages with {} deliveries", messages, deliveries);
        deliveries
    }

    /// Discard queued messages without delivering them
    pub fn clear_pending(&mut self) {
        self.mailbox.queue.clear();
    }
}

fn deliver<C>(subscribers: &mut [Subscriber<C>], envelope: &Envelope, ctx: &mut C, mailbox: &mut Mailbox) -> usize {
    let mut count = 0;
    for subscriber in subscribers.iter_mut().filter(|sub| sub.seq < envelope.seq) {
        trace!("Delivering {} to {:?}", envelope.type_name, subscriber.id);
        (subscriber.handler)(envelope.payload.as_ref(), ctx, mailbox);
        count += 1;
    }
    count
}

impl<C> Default for MessageBus<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> fmt::Debug for MessageBus<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageBus")
            .field("pending", &self.mailbox.len())
            .field("subscribers", &self.routes.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    #[derive(Debug, Clone, PartialEq)]
    struct Ping(u32);
    impl Message for Ping {}

    #[derive(Debug, Clone, PartialEq)]
    struct Pong(u32);
    impl Message for Pong {}

    fn entities(n: usize) -> Vec<EntityId> {
        let mut map: SlotMap<EntityId, ()> = SlotMap::with_key();
        (0..n).map(|_| map.insert(())).collect()
    }

    #[test]
    fn nothing_is_delivered_before_relay() {
        let mut bus: MessageBus<Vec<u32>> = MessageBus::new();
        bus.subscribe::<Ping, _>(None, |msg, log, _| log.push(msg.0));
        bus.send(None, Ping(1));

        let mut log = Vec::new();
        assert_eq!(bus.pending(), 1);
        assert!(log.is_empty());
        assert_eq!(bus.relay(&mut log), 1);
        assert_eq!(log, vec![1]);
        assert_eq!(bus.pending(), 0);
    }

    #[test]
    fn fifo_order_and_handler_sends_wait_for_next_relay() {
        let mut bus: MessageBus<Vec<String>> = MessageBus::new();
        bus.subscribe::<Ping, _>(None, |msg, log, mailbox| {
            log.push(format!("ping {}", msg.0));
            mailbox.send(None, Pong(msg.0));
        });
        bus.subscribe::<Pong, _>(None, |msg, log, _| log.push(format!("pong {}", msg.0)));

        bus.send(None, Ping(1));
        bus.send(None, Ping(2));

        let mut log = Vec::new();
        assert_eq!(bus.relay(&mut log), 2);
        assert_eq!(log, vec!["ping 1", "ping 2"]);
        assert_eq!(bus.pending(), 2);

        assert_eq!(bus.relay(&mut log), 2);
        assert_eq!(log, vec!["ping 1", "ping 2", "pong 1", "pong 2"]);
    }

    #[test]
    fn scoped_handlers_run_before_global_ones() {
        let ids = entities(2);
        let mut bus: MessageBus<Vec<&'static str>> = MessageBus::new();
        bus.subscribe::<Ping, _>(None, |_, log, _| log.push("global"));
        bus.subscribe::<Ping, _>(Some(ids[0]), |_, log, _| log.push("scoped"));

        bus.send(Some(ids[0]), Ping(0));
        bus.send(Some(ids[1]), Ping(0));
        bus.send(None, Ping(0));

        let mut log = Vec::new();
        bus.relay(&mut log);
        assert_eq!(log, vec!["scoped", "global", "global", "global"]);
    }

    #[test]
    fn late_subscribers_miss_earlier_messages() {
        let mut bus: MessageBus<u32> = MessageBus::new();
        bus.send(None, Ping(1));
        bus.subscribe::<Ping, _>(None, |msg, total, _| *total += msg.0);
        bus.send(None, Ping(10));

        let mut total = 0;
        assert_eq!(bus.relay(&mut total), 1);
        assert_eq!(total, 10);
    }

    #[test]
    fn unsubscribe_and_forget_entity() {
        let ids = entities(1);
        let mut bus: MessageBus<u32> = MessageBus::new();
        let global = bus.subscribe::<Ping, _>(None, |_, count, _| *count += 1);
        bus.subscribe::<Ping, _>(Some(ids[0]), |_, count, _| *count += 100);
        assert_eq!(bus.subscriber_count(), 2);

        assert!(bus.unsubscribe(global));
        assert!(!bus.unsubscribe(global));

        let mut count = 0;
        bus.send(Some(ids[0]), Ping(0));
        bus.relay(&mut count);
        assert_eq!(count, 100);

        bus.forget_entity(ids[0]);
        assert_eq!(bus.subscriber_count(), 0);
        bus.send(Some(ids[0]), Ping(0));
        assert_eq!(bus.relay(&mut count), 0);
        assert_eq!(count, 100);
    }

    #[test]
    fn handlers_only_see_their_type() {
        let mut bus: MessageBus<Vec<u32>> = MessageBus::new();
        bus.subscribe::<Pong, _>(None, |msg, log, _| log.push(msg.0));
        bus.send(None, Ping(1));
        bus.send(None, Pong(2));

        let mut log = Vec::new();
        assert_eq!(bus.relay(&mut log), 1);
        assert_eq!(log, vec![2]);
    }
}
