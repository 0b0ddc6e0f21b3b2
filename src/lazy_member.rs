/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use once_cell::sync::{Lazy, OnceCell};
use rand::rngs::OsRng;
use rand::RngCore;

/// A member whose value is produced on first access and then cached.
///
/// The factory runs at most once even under concurrent first access; every
/// caller observes the same value.
pub struct LazyMember<T> {
    cell: OnceCell<T>,
    factory: Box<dyn Fn() -> T + Send + Sync>,
}

impl<T> LazyMember<T> {
    pub fn new(factory: impl Fn() -> T + Send + Sync + 'static) -> Self {
        LazyMember {
            cell: OnceCell::new(),
            factory: Box::new(factory),
        }
    }

    /// The member value, evaluating the factory if no access has happened
    /// yet.
    pub fn member(&self) -> &T {
        self.cell.get_or_init(|| (self.factory)())
    }

    /// Whether the factory has run.
    pub fn is_evaluated(&self) -> bool {
        self.cell.get().is_some()
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for LazyMember<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.cell.get() {
            Some(value) => f.debug_tuple("LazyMember").field(value).finish(),
            None => f.write_str("LazyMember(<unevaluated>)"),
        }
    }
}

/// A process-wide 256-bit random key, generated from the operating system's
/// entropy source on first use and stable for the lifetime of the process.
pub fn session_key() -> &'static [u8; 32] {
    static SESSION_KEY: Lazy<[u8; 32]> = Lazy::new(|| {
        let mut key = [0u8; 32];
        OsRng.fill_bytes(&mut key);
        key
    });

    &SESSION_KEY
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    #[test]
    fn factory_runs_once_and_only_on_access() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = calls.clone();
        let member = LazyMember::new(move || {
            counted.fetch_add(1, Ordering::SeqCst);
            7
        });

        assert!(!member.is_evaluated());
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        assert_eq!(*member.member(), 7);
        assert_eq!(*member.member(), 7);
        assert!(member.is_evaluated());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn concurrent_first_access_evaluates_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = calls.clone();
        let member = Arc::new(LazyMember::new(move || {
            counted.fetch_add(1, Ordering::SeqCst);
            42u64
        }));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let member = member.clone();
                std::thread::spawn(move || *member.member())
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), 42);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn session_key_is_stable_within_the_process() {
        let first = *session_key();
        let second = *session_key();

        assert_eq!(first, second);
        assert_ne!(first, [0u8; 32]);
    }
}
