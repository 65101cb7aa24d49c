//! Publisher tests against random table mutations.

use docsync_core::{Cursor, Document, DocumentId, DocumentTable, Fields, Selector, Value};
use docsync_server::{
    publish_cursor, PublisherConfig, RecordingSubscriber, SubscriberEvent,
};
use proptest::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
enum Mutation {
    Insert(u8, i64),
    Update(u8, i64),
    Unset(u8),
    Remove(u8),
    Clear,
}

fn mutation() -> impl Strategy<Value = Mutation> {
    prop_oneof![
        4 => (any::<u8>(), 0i64..3).prop_map(|(i, v)| Mutation::Insert(i, v)),
        4 => (any::<u8>(), 0i64..3).prop_map(|(i, v)| Mutation::Update(i, v)),
        1 => any::<u8>().prop_map(Mutation::Unset),
        2 => any::<u8>().prop_map(Mutation::Remove),
        1 => Just(Mutation::Clear),
    ]
}

fn doc_id(n: u8) -> DocumentId {
    DocumentId::text(format!("d{}", n % 6))
}

fn status(v: i64) -> Fields {
    let mut fields = Fields::new();
    fields.insert("status".into(), Value::Integer(v));
    fields
}

fn apply(table: &DocumentTable, mutation: &Mutation) {
    // Failures (duplicate insert, update of a missing doc) leave the table
    // unchanged and are part of the input space.
    match mutation {
        Mutation::Insert(i, v) => {
            let _ = table.insert(Document::new(doc_id(*i), status(*v)));
        }
        Mutation::Update(i, v) => {
            let _ = table.update(&doc_id(*i), status(*v), &[]);
        }
        Mutation::Unset(i) => {
            let _ = table.update(&doc_id(*i), Fields::new(), &["status".to_string()]);
        }
        Mutation::Remove(i) => {
            table.remove(&doc_id(*i));
        }
        Mutation::Clear => {
            table.clear();
        }
    }
}

fn replay(mirror: &mut BTreeMap<DocumentId, Fields>, events: Vec<SubscriberEvent>) {
    for event in events {
        match event {
            SubscriberEvent::Added { id, fields, .. } => {
                assert!(mirror.insert(id, fields).is_none(), "added twice");
            }
            SubscriberEvent::Changed { id, fields, .. } => {
                let doc = mirror.get_mut(&id).expect("changed before added");
                for (k, v) in fields {
                    match v {
                        Some(v) => doc.insert(k, v),
                        None => doc.remove(&k),
                    };
                }
            }
            SubscriberEvent::Removed { id, .. } => {
                assert!(mirror.remove(&id).is_some(), "removed unknown document");
            }
            _ => {}
        }
    }
}

proptest! {
    #[test]
    fn subscriber_mirror_tracks_cursor(
        seed in prop::collection::vec(mutation(), 0..10),
        ops in prop::collection::vec(mutation(), 0..40),
        paused in any::<bool>(),
    ) {
        let table = Arc::new(DocumentTable::new("items"));
        for m in &seed {
            apply(&table, m);
        }

        let cursor = Cursor::new(Arc::clone(&table), Selector::fields(status(1)));
        let subscriber = Arc::new(RecordingSubscriber::new());
        let handle =
            publish_cursor(&cursor, subscriber.clone(), &PublisherConfig::default()).unwrap();

        if paused {
            table.pause_observers();
        }
        for m in &ops {
            apply(&table, m);
        }
        if paused {
            table.resume_observers();
        }

        let mut mirror = BTreeMap::new();
        replay(&mut mirror, subscriber.take());
        let expected: BTreeMap<DocumentId, Fields> =
            cursor.fetch().into_iter().map(|d| d.into_parts()).collect();
        prop_assert_eq!(mirror, expected);

        handle.stop();
        apply(&table, &Mutation::Insert(99, 1));
        prop_assert!(subscriber.take().is_empty());
    }
}

#[test]
fn forwarded_documents_are_not_modified() {
    let table = Arc::new(DocumentTable::new("items"));
    table
        .insert(Document::new(DocumentId::text("1"), status(1)))
        .unwrap();
    let subscriber = Arc::new(RecordingSubscriber::new());
    let _handle = publish_cursor(
        &Cursor::all(Arc::clone(&table)),
        subscriber.clone(),
        &PublisherConfig::default(),
    )
    .unwrap();

    let events = subscriber.take();
    assert!(events.contains(&SubscriberEvent::Added {
        collection: "items".into(),
        id: DocumentId::text("1"),
        fields: status(1),
    }));
    assert_eq!(
        table.get(&DocumentId::text("1")).unwrap().fields(),
        &status(1)
    );
}
