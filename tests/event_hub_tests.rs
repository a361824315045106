//! Event hub contract: weak receivers, token unsubscribe, predicate
//! filtering, and delivery order.
//!
//! Run with: cargo test --test event_hub_tests

mod common;

use std::sync::{Arc, Mutex};

use rustormdb::core::{Result, Value};
use rustormdb::events::{self, ChangeKind, EventMessage};
use rustormdb::{DbError, EntityCore, FieldDesc, FieldRole, HostType, Persistent, TypeDesc, TypeDescBuilder};

// A dedicated entity type keeps this binary's hub traffic away from the
// other fixtures.
#[derive(Debug, Default, Clone)]
struct Beacon {
    core: EntityCore,
    pub label: String,
}

impl Persistent for Beacon {
    fn describe() -> TypeDescBuilder {
        TypeDesc::table("HUB_BEACON", 930, 1)
            .field(FieldDesc::new("SYS_ID", HostType::Guid).role(FieldRole::PrimaryKey))
            .field(FieldDesc::new("SYS_CREATED", HostType::DateTime).role(FieldRole::TimestampCreated))
            .field(FieldDesc::new("SYS_CHANGED", HostType::DateTime).role(FieldRole::TimestampChanged))
            .field(FieldDesc::new("LABEL", HostType::Text))
    }

    fn core(&self) -> &EntityCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut EntityCore {
        &mut self.core
    }

    fn get(&self, field: &str) -> Result<Value> {
        match field {
            "LABEL" => Ok(self.label.clone().into()),
            other => Err(DbError::Structural(format!("unknown field {}", other))),
        }
    }

    fn set_value(&mut self, field: &str, value: Value) -> Result<()> {
        match field {
            "LABEL" => {
                self.label = value.into_string().unwrap_or_default();
                Ok(())
            }
            other => Err(DbError::Structural(format!("unknown field {}", other))),
        }
    }
}

fn beacon(label: &str) -> Beacon {
    Beacon {
        label: label.to_string(),
        ..Beacon::default()
    }
}

fn publish(entity: Beacon, kind: ChangeKind) {
    events::publish(&EventMessage::new(entity, 930, kind));
}

#[derive(Default)]
struct Sink {
    seen: Mutex<Vec<(String, ChangeKind, i32)>>,
}

impl Sink {
    fn labels(&self) -> Vec<String> {
        self.seen.lock().unwrap().iter().map(|(l, _, _)| l.clone()).collect()
    }
}

fn listen(sink: &Arc<Sink>) -> events::SubscriptionToken {
    events::subscribe::<Beacon, _, _>(sink, |sink, entity, kind, code| {
        sink.seen.lock().unwrap().push((entity.label.clone(), kind, code));
    })
}

#[test]
fn test_delivery_with_kind_and_code() {
    let sink = Arc::new(Sink::default());
    let _token = listen(&sink);

    publish(beacon("one"), ChangeKind::Added);
    publish(beacon("two"), ChangeKind::Deleted);

    let seen = sink.seen.lock().unwrap();
    let ours: Vec<_> = seen.iter().filter(|(l, _, _)| l == "one" || l == "two").collect();
    assert_eq!(ours.len(), 2);
    assert_eq!(ours[0], &("one".to_string(), ChangeKind::Added, 1));
    assert_eq!(ours[1], &("two".to_string(), ChangeKind::Deleted, 3));
}

#[test]
fn test_token_drop_unsubscribes() {
    let sink = Arc::new(Sink::default());
    let token = listen(&sink);

    publish(beacon("before-drop"), ChangeKind::Changed);
    drop(token);
    publish(beacon("after-drop"), ChangeKind::Changed);

    let labels = sink.labels();
    assert!(labels.contains(&"before-drop".to_string()));
    assert!(!labels.contains(&"after-drop".to_string()));
}

#[test]
fn test_dead_receiver_is_swept() {
    let sink = Arc::new(Sink::default());
    let _token = listen(&sink);

    publish(beacon("alive"), ChangeKind::Changed);
    assert!(sink.labels().contains(&"alive".to_string()));

    let weak_probe = Arc::downgrade(&sink);
    drop(sink);
    // The receiver is gone; delivery must neither panic nor resurrect it.
    publish(beacon("orphan"), ChangeKind::Changed);
    assert!(weak_probe.upgrade().is_none());
}

#[test]
fn test_predicate_filters_messages() {
    let sink = Arc::new(Sink::default());
    let _token = events::subscribe_filtered::<Beacon, _, _, _>(
        &sink,
        |message| message.kind == ChangeKind::Deleted,
        |sink, entity, kind, code| {
            sink.seen.lock().unwrap().push((entity.label.clone(), kind, code));
        },
    );

    publish(beacon("pred-add"), ChangeKind::Added);
    publish(beacon("pred-del"), ChangeKind::Deleted);

    let labels = sink.labels();
    assert!(!labels.contains(&"pred-add".to_string()));
    assert!(labels.contains(&"pred-del".to_string()));
}

#[test]
fn test_subscription_order_preserved() {
    let order = Arc::new(Mutex::new(Vec::new()));

    struct Tagged {
        tag: &'static str,
        order: Arc<Mutex<Vec<&'static str>>>,
    }

    let first = Arc::new(Tagged {
        tag: "first",
        order: Arc::clone(&order),
    });
    let second = Arc::new(Tagged {
        tag: "second",
        order: Arc::clone(&order),
    });

    let _token_a = events::subscribe::<Beacon, _, _>(&first, |receiver, entity, _, _| {
        if entity.label == "ordered" {
            receiver.order.lock().unwrap().push(receiver.tag);
        }
    });
    let _token_b = events::subscribe::<Beacon, _, _>(&second, |receiver, entity, _, _| {
        if entity.label == "ordered" {
            receiver.order.lock().unwrap().push(receiver.tag);
        }
    });

    publish(beacon("ordered"), ChangeKind::Changed);
    assert_eq!(*order.lock().unwrap(), vec!["first", "second"]);
}

#[test]
fn test_message_downcast() {
    let message = EventMessage::new(beacon("cast"), 930, ChangeKind::Added);
    assert_eq!(message.entity_id, 930);
    assert_eq!(message.downcast::<Beacon>().unwrap().label, "cast");
}
