//! Buffer lifetimes and diagnostics, observed through the log.
//!
//! `ForeignString` traces every marshal and release with its buffer
//! address, and `RecordingLibrary` traces every call it receives. With both
//! captured in order, a session's exact sequence of buffer and handle
//! events can be checked on each of its exit paths.

use log::Level;
use pgcoll::{Collection, Error, NativeLibrary, Session};
use pgcoll_test_utils::capture::{self, Event};
use pgcoll_test_utils::{RecordingLibrary, CALL_TARGET};
use proptest::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq)]
enum Seen {
    Marshalled(String),
    Released(String),
    Call(String),
}

fn timeline(events: &[Event]) -> Vec<Seen> {
    events
        .iter()
        .filter_map(|e| {
            if e.target == CALL_TARGET {
                return Some(Seen::Call(e.message.clone()));
            }
            let addr = e.message.strip_prefix("foreign string ")?;
            if let Some(addr) = addr.strip_suffix(" marshalled") {
                Some(Seen::Marshalled(addr.to_owned()))
            } else {
                addr.strip_suffix(" released")
                    .map(|addr| Seen::Released(addr.to_owned()))
            }
        })
        .collect()
}

fn start() {
    capture::install();
    capture::take_thread_events();
}

/// Every buffer address alternates marshalled, released, and ends released.
fn check_balanced(seen: &[Seen]) -> Result<(), String> {
    let mut live = std::collections::HashSet::new();
    for s in seen {
        match s {
            Seen::Marshalled(a) if !live.insert(a.clone()) => {
                return Err(format!("{a} marshalled while still live"));
            }
            Seen::Released(a) if !live.remove(a) => {
                return Err(format!("{a} released without a live marshal"));
            }
            _ => {}
        }
    }
    if live.is_empty() {
        Ok(())
    } else {
        Err(format!("never released: {live:?}"))
    }
}

/// The session name is the first buffer marshalled, and it is released
/// exactly once, after the collection's single delete.
fn check_name_outlives_delete(seen: &[Seen]) -> Result<(), String> {
    let name = match seen.first() {
        Some(Seen::Marshalled(a)) => a.clone(),
        other => return Err(format!("session did not start by marshalling: {other:?}")),
    };
    let released: Vec<_> = seen
        .iter()
        .enumerate()
        .filter(|(_, s)| **s == Seen::Released(name.clone()))
        .map(|(i, _)| i)
        .collect();
    let deletes: Vec<_> = seen
        .iter()
        .enumerate()
        .filter(|(_, s)| matches!(s, Seen::Call(c) if c.starts_with("Delete(")))
        .map(|(i, _)| i)
        .collect();
    match (released.as_slice(), deletes.as_slice()) {
        ([r], [d]) if r > d => Ok(()),
        ([r], [d]) => Err(format!("name released at {r}, before delete at {d}")),
        (r, d) => Err(format!("{} name releases, {} deletes", r.len(), d.len())),
    }
}

#[test]
fn name_released_once_after_delete_on_success() {
    start();
    let lib = RecordingLibrary::new();
    let n = Session::new(&lib)
        .run("inventory", |c| {
            c.upsert_document("doc1", "test1")?;
            c.upsert_documents([("doc2", "test2"), ("doc3", "test3")])?;
            c.document_count()
        })
        .unwrap();
    assert_eq!(n, 3);
    let seen = timeline(&capture::take_thread_events());
    check_balanced(&seen).unwrap();
    check_name_outlives_delete(&seen).unwrap();
    assert_eq!(
        seen.get(1),
        Some(&Seen::Call(r#"New { name: "inventory" }"#.into()))
    );
    // Name plus one id and body, plus two of each in the batch.
    let marshals = seen
        .iter()
        .filter(|s| matches!(s, Seen::Marshalled(_)))
        .count();
    assert_eq!(marshals, 7);
    let Seen::Marshalled(name) = &seen[0] else {
        panic!("unexpected first event {:?}", seen[0]);
    };
    assert_eq!(seen.last(), Some(&Seen::Released(name.clone())));
    lib.assert_clean();
}

#[test]
fn name_released_once_after_delete_on_closure_error() {
    start();
    let lib = RecordingLibrary::new();
    let err = Session::new(&lib)
        .run("inventory", |c| {
            c.upsert_document("doc1", "test1")?;
            c.upsert_document("", "x")
        })
        .unwrap_err();
    assert!(matches!(err, Error::Status { .. }));
    let seen = timeline(&capture::take_thread_events());
    check_balanced(&seen).unwrap();
    check_name_outlives_delete(&seen).unwrap();
    lib.assert_clean();
}

#[test]
fn name_released_once_after_delete_on_closure_panic() {
    start();
    let lib = RecordingLibrary::new();
    let outcome = std::panic::catch_unwind(|| {
        let _ = Session::new(&lib).run("inventory", |c| -> Result<(), Error> {
            c.upsert_document("doc1", "test1")?;
            panic!("closure failed");
        });
    });
    assert!(outcome.is_err());
    let seen = timeline(&capture::take_thread_events());
    check_balanced(&seen).unwrap();
    check_name_outlives_delete(&seen).unwrap();
    lib.assert_clean();
}

#[test]
fn failed_create_releases_the_name_without_delete() {
    start();
    let lib = RecordingLibrary::new();
    lib.set_fail_creates(true);
    let err = Session::new(&lib)
        .run("inventory", |_| Ok::<_, Error>(()))
        .unwrap_err();
    assert!(matches!(err, Error::AllocationFailure { .. }));
    let seen = timeline(&capture::take_thread_events());
    check_balanced(&seen).unwrap();
    assert_eq!(seen.len(), 3);
    assert!(matches!(&seen[1], Seen::Call(c) if c.starts_with("New ")));
    assert!(matches!(&seen[2], Seen::Released(_)));
}

#[test]
fn clones_are_released_independently() {
    start();
    let a = pgcoll::ForeignString::new("inventory").unwrap();
    let b = a.clone();
    drop(a);
    b.release();
    let seen = timeline(&capture::take_thread_events());
    check_balanced(&seen).unwrap();
    let releases = seen
        .iter()
        .filter(|s| matches!(s, Seen::Released(_)))
        .count();
    assert_eq!(releases, 2);
}

#[test]
fn rejected_handle_is_logged_with_label_and_handle() {
    start();
    let lib = RecordingLibrary::new();
    let mut c = Collection::open(&lib, "inventory").unwrap();
    let raw = c.raw_handle();
    // The library forgets the handle behind the host's back.
    assert_eq!(lib.collection_delete(raw), 0);
    capture::take_thread_events();

    assert_eq!(
        c.document_count().unwrap_err(),
        Error::InvalidHandle {
            op: "document_count"
        }
    );
    let errors: Vec<_> = capture::take_thread_events()
        .into_iter()
        .filter(|e| e.level == Level::Error)
        .collect();
    assert_eq!(errors.len(), 1, "{errors:?}");
    let message = &errors[0].message;
    assert!(message.starts_with("document_count:"), "{message}");
    assert!(message.contains(r#""inventory""#), "{message}");
    assert!(message.contains(&format!("{raw:#x}")), "{message}");

    // Drop still tries once more, and says which collection it was.
    drop(c);
    let errors: Vec<_> = capture::take_thread_events()
        .into_iter()
        .filter(|e| e.level == Level::Error)
        .collect();
    let handle = format!("{raw:#x}");
    assert!(errors
        .iter()
        .any(|e| e.message.starts_with("collection_delete:") && e.message.contains(&handle)));
    assert!(errors
        .iter()
        .any(|e| e.message.starts_with(r#"dropping collection "inventory""#)));
}

#[derive(Clone, Debug)]
enum Step {
    Upsert(String, String),
    Batch(Vec<(String, String)>),
    Get(String),
    Name,
    Fail,
    Panic,
}

fn step() -> impl Strategy<Value = Step> {
    let id = "[a-c]{0,2}";
    prop_oneof![
        (id, "[a-z ]{0,8}").prop_map(|(i, b)| Step::Upsert(i, b)),
        prop::collection::vec((id, "[a-z]{0,4}"), 0..4).prop_map(Step::Batch),
        id.prop_map(Step::Get),
        Just(Step::Name),
        Just(Step::Fail),
        Just(Step::Panic),
    ]
}

proptest! {
    #[test]
    fn every_session_releases_each_buffer_once(steps in prop::collection::vec(step(), 0..16)) {
        start();
        let lib = RecordingLibrary::new();
        let _ = std::panic::catch_unwind(|| {
            Session::new(&lib).run("inventory", |c| {
                for s in &steps {
                    match s {
                        Step::Upsert(id, body) => c.upsert_document(id, body)?,
                        Step::Batch(docs) => c.upsert_documents(docs.iter().cloned())?,
                        Step::Get(id) => {
                            c.get_document(id)?;
                        }
                        Step::Name => {
                            c.name()?;
                        }
                        Step::Fail => return Err(Error::Status { op: "test", code: -2 }),
                        Step::Panic => panic!("closure failed"),
                    }
                }
                Ok(())
            })
        });
        let seen = timeline(&capture::take_thread_events());
        prop_assert_eq!(check_balanced(&seen), Ok(()));
        prop_assert_eq!(check_name_outlives_delete(&seen), Ok(()));
        prop_assert_eq!(lib.outstanding_strings(), 0);
        prop_assert!(lib.violations().is_empty());
    }
}
