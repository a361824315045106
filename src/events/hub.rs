//! Process-wide publish/subscribe for entity change notifications.
//!
//! Receivers are weakly held: a dropped subscriber is equivalent to an
//! explicit unsubscribe and is swept on the next delivery attempt. The
//! subscription list is guarded by one mutex; the critical section is
//! the copy of the filtered delivery list, never the delivery itself.

use std::any::{Any, TypeId};
use std::sync::{Arc, Mutex, Weak};

use lazy_static::lazy_static;

use crate::model::Persistent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Changed,
    Deleted,
}

impl ChangeKind {
    pub fn code(self) -> i32 {
        match self {
            Self::Added => 1,
            Self::Changed => 2,
            Self::Deleted => 3,
        }
    }
}

/// One delivered change: the entity snapshot, its registered entity id,
/// and the change kind.
#[derive(Clone)]
pub struct EventMessage {
    pub entity: Arc<dyn Any + Send + Sync>,
    pub entity_type: TypeId,
    pub entity_id: u32,
    pub kind: ChangeKind,
}

impl EventMessage {
    pub fn new<T: Persistent>(entity: T, entity_id: u32, kind: ChangeKind) -> Self {
        Self {
            entity: Arc::new(entity),
            entity_type: TypeId::of::<T>(),
            entity_id,
            kind,
        }
    }

    pub fn downcast<T: Persistent>(&self) -> Option<&T> {
        self.entity.downcast_ref::<T>()
    }
}

type Receiver = Arc<dyn Any + Send + Sync>;
type DeliveryFn = Arc<dyn Fn(&Receiver, &Receiver, ChangeKind, i32) + Send + Sync>;
type PredicateFn = Box<dyn Fn(&EventMessage) -> bool + Send>;

struct Subscription {
    id: u64,
    receiver: Weak<dyn Any + Send + Sync>,
    target: TypeId,
    deliver: DeliveryFn,
    predicate: Option<PredicateFn>,
}

#[derive(Default)]
struct HubInner {
    next_id: u64,
    subscriptions: Vec<Subscription>,
}

lazy_static! {
    static ref HUB: Mutex<HubInner> = Mutex::new(HubInner::default());
}

/// Unsubscribes on drop.
pub struct SubscriptionToken {
    id: u64,
}

impl Drop for SubscriptionToken {
    fn drop(&mut self) {
        if let Ok(mut inner) = HUB.lock() {
            inner.subscriptions.retain(|s| s.id != self.id);
        }
    }
}

fn register(
    receiver: Weak<dyn Any + Send + Sync>,
    target: TypeId,
    deliver: DeliveryFn,
    predicate: Option<PredicateFn>,
) -> SubscriptionToken {
    let mut inner = HUB.lock().expect("event hub mutex poisoned");
    inner.next_id += 1;
    let id = inner.next_id;
    inner.subscriptions.push(Subscription {
        id,
        receiver,
        target,
        deliver,
        predicate,
    });
    SubscriptionToken { id }
}

fn make_delivery<T, R, F>(handler: F) -> DeliveryFn
where
    T: Persistent,
    R: Send + Sync + 'static,
    F: Fn(&R, &T, ChangeKind, i32) + Send + Sync + 'static,
{
    Arc::new(move |receiver, entity, kind, code| {
        if let (Some(receiver), Some(entity)) =
            (receiver.downcast_ref::<R>(), entity.downcast_ref::<T>())
        {
            handler(receiver, entity, kind, code);
        }
    })
}

/// Subscribe `receiver` to changes of entity type `T`.
///
/// The hub holds the receiver weakly; dropping the receiver ends the
/// deliveries, dropping the token unsubscribes explicitly.
pub fn subscribe<T, R, F>(receiver: &Arc<R>, handler: F) -> SubscriptionToken
where
    T: Persistent,
    R: Send + Sync + 'static,
    F: Fn(&R, &T, ChangeKind, i32) + Send + Sync + 'static,
{
    let weak = Arc::downgrade(&(Arc::clone(receiver) as Receiver));
    register(weak, TypeId::of::<T>(), make_delivery(handler), None)
}

/// Subscribe with an additional message predicate.
pub fn subscribe_filtered<T, R, F, P>(receiver: &Arc<R>, predicate: P, handler: F) -> SubscriptionToken
where
    T: Persistent,
    R: Send + Sync + 'static,
    F: Fn(&R, &T, ChangeKind, i32) + Send + Sync + 'static,
    P: Fn(&EventMessage) -> bool + Send + 'static,
{
    let weak = Arc::downgrade(&(Arc::clone(receiver) as Receiver));
    register(
        weak,
        TypeId::of::<T>(),
        make_delivery(handler),
        Some(Box::new(predicate)),
    )
}

/// Deliver a message synchronously, in subscription-insertion order.
/// Dead receivers found along the way are swept.
pub fn publish(message: &EventMessage) {
    let pending: Vec<(Receiver, DeliveryFn)> = {
        let mut inner = HUB.lock().expect("event hub mutex poisoned");
        inner.subscriptions.retain(|s| s.receiver.strong_count() > 0);
        inner
            .subscriptions
            .iter()
            .filter(|s| s.target == message.entity_type)
            .filter(|s| s.predicate.as_ref().map_or(true, |p| p(message)))
            .filter_map(|s| s.receiver.upgrade().map(|r| (r, Arc::clone(&s.deliver))))
            .collect()
    };

    // Delivery happens outside the lock; handlers may subscribe or drop
    // tokens themselves.
    for (receiver, deliver) in pending {
        deliver(&receiver, &message.entity, message.kind, message.kind.code());
    }
}
