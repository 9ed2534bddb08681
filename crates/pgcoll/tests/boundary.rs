//! Every call across the boundary, instrumented with a recording library.

use pgcoll::{Collection, CollectionConfig, Error, Session};
use pgcoll_ffi::PgcollStatus;
use pgcoll_test_utils::{Call, RecordingLibrary};
use proptest::prelude::*;

#[test]
fn session_creates_and_destroys_once() {
    let lib = RecordingLibrary::new();
    let n = Session::new(&lib)
        .run("inventory", |c| {
            c.upsert_document("doc1", "test1")?;
            c.document_count()
        })
        .unwrap();
    assert_eq!(n, 1);
    assert_eq!(lib.creates(), 1);
    assert_eq!(lib.destroys(), 1);
    let calls = lib.calls();
    assert_eq!(
        calls.first(),
        Some(&Call::New {
            name: "inventory".into()
        })
    );
    assert!(matches!(calls.last(), Some(Call::Delete(_))));
    lib.assert_clean();
}

#[test]
fn failed_create_makes_no_further_calls() {
    let lib = RecordingLibrary::new();
    lib.set_fail_creates(true);
    let mut called = false;
    let err = Session::new(&lib)
        .run("inventory", |_| {
            called = true;
            Ok::<_, Error>(())
        })
        .unwrap_err();
    assert!(matches!(err, Error::AllocationFailure { ref name } if name == "inventory"));
    assert!(!called);
    assert_eq!(lib.calls().len(), 1);
    lib.assert_clean();
}

#[test]
fn failed_configured_create_makes_no_further_calls() {
    let lib = RecordingLibrary::new();
    lib.set_fail_creates(true);
    let err = Collection::open_with(&lib, "inventory", &CollectionConfig::new()).unwrap_err();
    assert!(matches!(err, Error::AllocationFailure { .. }));
    assert_eq!(lib.calls().len(), 1);
    lib.assert_clean();
}

#[test]
fn empty_name_is_refused_without_destroy() {
    let lib = RecordingLibrary::new();
    let err = Collection::open(&lib, "").unwrap_err();
    assert_eq!(err, Error::AllocationFailure { name: String::new() });
    assert_eq!(lib.calls(), vec![Call::New { name: String::new() }]);
    lib.assert_clean();
}

#[test]
fn nul_in_name_makes_no_calls() {
    let lib = RecordingLibrary::new();
    let err = Session::new(&lib)
        .run("inv\0", |_| Ok::<_, Error>(()))
        .unwrap_err();
    assert!(matches!(err, Error::Encoding(v) if v.offset == 3));
    assert!(lib.calls().is_empty());
}

#[test]
fn closure_error_still_destroys() {
    let lib = RecordingLibrary::new();
    let err = Session::new(&lib)
        .run("inventory", |c| {
            c.archive()?;
            c.upsert_document("doc1", "test1")
        })
        .unwrap_err();
    assert_eq!(err.status(), Some(PgcollStatus::Archived));
    assert_eq!(lib.destroys(), 1);
    lib.assert_clean();
}

#[test]
fn closure_panic_still_destroys() {
    let lib = RecordingLibrary::new();
    let outcome = std::panic::catch_unwind(|| {
        let _ = Session::new(&lib).run("inventory", |c| -> Result<(), Error> {
            c.upsert_document("doc1", "test1")?;
            panic!("closure failed");
        });
    });
    assert!(outcome.is_err());
    assert_eq!(lib.creates(), 1);
    assert_eq!(lib.destroys(), 1);
    lib.assert_clean();
}

#[test]
fn closure_error_wins_over_destroy_error() {
    let lib = RecordingLibrary::new();
    lib.set_fail_destroys(true);
    let err = Session::new(&lib)
        .run("inventory", |c| c.upsert_document("", "x"))
        .unwrap_err();
    assert_eq!(err.status(), Some(PgcollStatus::InvalidArgument));
    assert_eq!(lib.destroys(), 1);
}

#[test]
fn destroy_error_is_reported_by_close() {
    let lib = RecordingLibrary::new();
    lib.set_fail_destroys(true);
    let c = Collection::open(&lib, "inventory").unwrap();
    let err = c.close().unwrap_err();
    assert_eq!(err.status(), Some(PgcollStatus::InternalError));
    // Drop after close does not destroy again.
    assert_eq!(lib.destroys(), 1);
    assert!(lib.violations().is_empty());
}

#[test]
fn drop_swallows_destroy_error() {
    let lib = RecordingLibrary::new();
    lib.set_fail_destroys(true);
    drop(Collection::open(&lib, "inventory").unwrap());
    assert_eq!(lib.destroys(), 1);
    assert!(lib.violations().is_empty());
}

#[test]
fn every_returned_string_is_freed_once() {
    let lib = RecordingLibrary::new();
    Session::new(&lib)
        .run("inventory", |c| {
            c.upsert_documents([("a", "1"), ("b", "2")])?;
            assert_eq!(c.name()?, "inventory");
            assert_eq!(c.get_document("a")?.as_deref(), Some("1"));
            assert_eq!(c.get_document("missing")?, None);
            assert_eq!(c.get_documents()?, vec!["1", "2"]);
            Ok::<_, Error>(())
        })
        .unwrap();
    assert_eq!(lib.string_frees(), 2);
    let array_frees = lib
        .calls()
        .iter()
        .filter(|c| matches!(c, Call::FreeStringArray(2)))
        .count();
    assert_eq!(array_frees, 1);
    lib.assert_clean();
}

#[test]
fn invalid_utf8_is_an_error_and_still_freed() {
    let lib = RecordingLibrary::new();
    let mut c = Collection::open(&lib, "inventory").unwrap();
    c.upsert_document("a", "1").unwrap();
    lib.set_invalid_utf8(true);
    assert_eq!(
        c.get_document("a").unwrap_err(),
        Error::InvalidUtf8 { op: "get_document" }
    );
    assert_eq!(
        c.name().unwrap_err(),
        Error::InvalidUtf8 {
            op: "collection_name"
        }
    );
    assert_eq!(lib.outstanding_strings(), 0);
    c.close().unwrap();
    lib.assert_clean();
}

#[test]
fn empty_collection_returns_no_array() {
    let lib = RecordingLibrary::new();
    let mut c = Collection::open(&lib, "inventory").unwrap();
    assert!(c.get_documents().unwrap().is_empty());
    assert!(!lib.calls().contains(&Call::FreeStringArray(0)));
    drop(c);
    lib.assert_clean();
}

#[test]
fn operations_target_only_the_live_handle() {
    let lib = RecordingLibrary::new();
    let mut c = Collection::open(&lib, "inventory").unwrap();
    let raw = c.raw_handle();
    c.upsert_document("a", "1").unwrap();
    assert!(c.delete_document("a").unwrap());
    assert!(!c.delete_document("a").unwrap());
    c.close().unwrap();
    let targeted: Vec<_> = lib.calls().iter().filter_map(Call::handle).collect();
    assert!(targeted.iter().all(|&h| h == raw));
    lib.assert_clean();
}

#[derive(Clone, Debug)]
enum Step {
    Upsert(String, String),
    Get(String),
    Delete(String),
    Count,
    List,
    Fail,
}

fn step() -> impl Strategy<Value = Step> {
    let id = "[a-c]{1,2}";
    prop_oneof![
        (id, "[a-z ]{0,8}").prop_map(|(i, b)| Step::Upsert(i, b)),
        id.prop_map(Step::Get),
        id.prop_map(Step::Delete),
        Just(Step::Count),
        Just(Step::List),
        Just(Step::Fail),
    ]
}

proptest! {
    #[test]
    fn any_session_is_leak_free(steps in prop::collection::vec(step(), 0..24)) {
        let lib = RecordingLibrary::new();
        let _ = Session::new(&lib).run("inventory", |c| {
            for s in &steps {
                match s {
                    Step::Upsert(id, body) => c.upsert_document(id, body)?,
                    Step::Get(id) => {
                        c.get_document(id)?;
                    }
                    Step::Delete(id) => {
                        c.delete_document(id)?;
                    }
                    Step::Count => {
                        c.document_count()?;
                    }
                    Step::List => {
                        c.get_documents()?;
                    }
                    Step::Fail => return Err(Error::Status { op: "test", code: -2 }),
                }
            }
            Ok(())
        });
        prop_assert_eq!(lib.creates(), 1);
        prop_assert_eq!(lib.destroys(), 1);
        prop_assert!(lib.violations().is_empty());
        prop_assert_eq!(lib.outstanding_strings(), 0);
        prop_assert!(lib.live_handles().is_empty());
    }

    #[test]
    fn nul_free_names_reach_the_library_unchanged(name in "[^\\x00]{1,20}") {
        let lib = RecordingLibrary::new();
        // Names over the byte limit are refused; either way nothing leaks.
        let opened = Collection::open(&lib, &name);
        prop_assert_eq!(lib.calls()[0].clone(), Call::New { name: name.clone() });
        if let Ok(c) = opened {
            prop_assert_eq!(c.label(), name.as_str());
        }
        prop_assert_eq!(lib.creates(), lib.destroys());
        prop_assert!(lib.violations().is_empty());
    }
}
