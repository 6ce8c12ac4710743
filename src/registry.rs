//! Handle identities and the per-session tables that map them to live objects.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

macro_rules! handle_type {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u64);

        impl $name {
            /// Raw id of the handle. Ids are unique across every kind of
            /// handle issued by one client.
            pub fn id(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($label, "#{}"), self.0)
            }
        }
    };
}

handle_type!(
    /// Identifies an open result future.
    FutureHandle,
    "future"
);
handle_type!(
    /// Identifies an asynchronous mutator bound to a future.
    MutatorHandle,
    "mutator"
);
handle_type!(
    /// Identifies an asynchronous scanner bound to a future.
    ScannerHandle,
    "scanner"
);
handle_type!(
    /// Identifies a synchronous table mutator.
    TableMutatorHandle,
    "table-mutator"
);
handle_type!(
    /// Identifies a synchronous table scanner.
    TableScannerHandle,
    "table-scanner"
);

/// Issues handle ids. Ids start at 1 and are never reused.
#[derive(Debug)]
pub(crate) struct IdAllocator(AtomicU64);

impl IdAllocator {
    pub(crate) fn new() -> Self {
        Self(AtomicU64::new(1))
    }

    fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn future(&self) -> FutureHandle {
        FutureHandle(self.next())
    }

    pub(crate) fn mutator(&self) -> MutatorHandle {
        MutatorHandle(self.next())
    }

    pub(crate) fn scanner(&self) -> ScannerHandle {
        ScannerHandle(self.next())
    }

    pub(crate) fn table_mutator(&self) -> TableMutatorHandle {
        TableMutatorHandle(self.next())
    }

    pub(crate) fn table_scanner(&self) -> TableScannerHandle {
        TableScannerHandle(self.next())
    }
}

/// Live objects of one kind, keyed by raw handle id.
pub(crate) struct HandleRegistry<T> {
    entries: Mutex<HashMap<u64, Arc<T>>>,
}

impl<T> HandleRegistry<T> {
    pub(crate) fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u64, Arc<T>>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn insert(&self, id: u64, entry: Arc<T>) {
        self.lock().insert(id, entry);
    }

    pub(crate) fn get(&self, id: u64) -> Option<Arc<T>> {
        self.lock().get(&id).cloned()
    }

    pub(crate) fn remove(&self, id: u64) -> Option<Arc<T>> {
        self.lock().remove(&id)
    }

    /// Removes and returns every entry.
    pub(crate) fn drain(&self) -> Vec<Arc<T>> {
        self.lock().drain().map(|(_, entry)| entry).collect()
    }
}
