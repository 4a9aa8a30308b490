//! Test doubles for hosts and integration tests.

#[cfg(test)]
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use uuid::Uuid;

use reelhouse_core::Subject;

/// A subject whose liveness can be toggled.
#[derive(Debug)]
pub struct TestSubject {
    id: Uuid,
    name: String,
    online: AtomicBool,
}

impl TestSubject {
    /// A connected subject with a random id.
    pub fn online(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4(),
            name: name.into(),
            online: AtomicBool::new(true),
        })
    }

    /// A subject that has already disconnected.
    pub fn offline(name: impl Into<String>) -> Arc<Self> {
        let subject = Self::online(name);
        subject.set_online(false);
        subject
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }
}

impl Subject for TestSubject {
    fn id(&self) -> Uuid {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}

/// Open a read transaction on an archive that is still being written.
///
/// While the returned connection lives, the writer cannot commit, so
/// sealing fails once its busy timeout expires.
#[cfg(test)]
pub(crate) fn hold_read_lock(path: &Path) -> rusqlite::Connection {
    let conn = rusqlite::Connection::open(path).unwrap();
    conn.execute_batch("BEGIN").unwrap();
    conn.query_row("SELECT count(*) FROM members", [], |row| row.get::<_, i64>(0))
        .unwrap();
    conn
}
