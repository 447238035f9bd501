//! Several writers sharing one store file.

use std::thread;
use std::time::Duration;
use sts_babel::xref::{AdvisoryLock, LockSettings, XrefEntry, XrefStore};
use sts_babel::StoreError;

const WRITERS: usize = 6;
const PUTS: usize = 15;

#[test]
fn concurrent_writers_lose_no_entries() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("xrefs.json");

    thread::scope(|scope| {
        for writer in 0..WRITERS {
            let path = path.clone();
            scope.spawn(move || {
                // One store handle per writer, as separate processes would have.
                let store = XrefStore::open(&path, LockSettings::default()).unwrap();
                for n in 0..PUTS {
                    let entry = XrefEntry::new(format!("sec_{n}"), "body", format!("DOC-{writer}"));
                    store.put(&format!("w{writer}-{n}"), entry).unwrap();
                }
            });
        }
    });

    let store = XrefStore::open(&path, LockSettings::default()).unwrap();
    let entries = store.get_all().unwrap();
    assert_eq!(entries.len(), WRITERS * PUTS);
    assert_eq!(entries["w3-7"].remark, "DOC-3");
    assert!(!store.lock_path().exists());
}

#[test]
fn held_lock_times_out_other_writers() {
    let dir = tempfile::tempdir().unwrap();
    let settings = LockSettings {
        timeout: Duration::from_millis(60),
        stale_after: Duration::from_secs(60),
        initial_backoff: Duration::from_millis(2),
        max_backoff: Duration::from_millis(10),
    };
    let store = XrefStore::open(dir.path().join("xrefs.json"), settings.clone()).unwrap();
    let held = AdvisoryLock::acquire(store.lock_path(), &settings).unwrap();

    let err = store
        .put("k", XrefEntry::new("sec_1", "body", "DOC"))
        .unwrap_err();
    assert!(matches!(err, StoreError::LockTimeout { .. }));

    held.release().unwrap();
    store.put("k", XrefEntry::new("sec_1", "body", "DOC")).unwrap();
    assert_eq!(store.get("k").unwrap().unwrap().anchor_id, "sec_1");
}
