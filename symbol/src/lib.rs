//! Interned symbol crate. Creating a symbol will either create a new one, or return a
//! "hidden reference" to an existing symbol. This allows reusing allocations and is
//! useful in contexts where the same string might be reused multiple times, which is
//! constantly the case for signature resolution: the same parameter, protocol and
//! member names appear in almost every requirement of a signature.

use std::collections::HashSet;
use std::fmt::{Debug, Display, Formatter};
use std::sync::Mutex;

use lazy_static::lazy_static;

lazy_static! {
    static ref SYMBOLS: Mutex<HashSet<&'static str>> = Mutex::new(HashSet::new());
}

/// An interned name. Copying a [`Symbol`] copies a thin reference, never the string
/// itself, so symbols can be compared and hashed cheaply.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(&'static str);

impl Symbol {
    #[must_use]
    /// # Panics
    ///
    /// This function panics if the underlying mutex is poisoned
    pub fn new(inner: String) -> Symbol {
        let mut set = SYMBOLS.lock().unwrap();

        if let Some(existing) = set.get(inner.as_str()) {
            return Symbol(existing);
        }

        // first time we see this name: the string is leaked into the set and lives
        // for the remainder of the process, which all resolution runs share
        let interned: &'static str = Box::leak(inner.into_boxed_str());
        set.insert(interned);

        Symbol(interned)
    }

    pub fn access(&self) -> &str {
        self.0
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Symbol {
        Symbol::new(String::from(s))
    }
}

impl From<String> for Symbol {
    fn from(s: String) -> Symbol {
        Symbol::new(s)
    }
}

impl Display for Symbol {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Debug for Symbol {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Symbol({:?})", self.0)
    }
}
