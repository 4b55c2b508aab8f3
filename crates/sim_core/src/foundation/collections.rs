//! Specialized collection types

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

pub use slotmap::{Key, SlotMap};

/// Typed handle over a generational slotmap key.
///
/// The type parameter only records what the key points at; it is never
/// stored, so the handle stays `Copy` whatever `T` is.
pub struct TypedHandle<K: Key, T: ?Sized> {
    key: K,
    _phantom: PhantomData<fn() -> T>,
}

impl<K: Key, T: ?Sized> TypedHandle<K, T> {
    /// Create a new typed handle from a key
    pub fn new(key: K) -> Self {
        Self {
            key,
            _phantom: PhantomData,
        }
    }

    /// Get the underlying key
    pub fn key(&self) -> K {
        self.key
    }
}

impl<K: Key, T: ?Sized> Clone for TypedHandle<K, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K: Key, T: ?Sized> Copy for TypedHandle<K, T> {}

impl<K: Key, T: ?Sized> PartialEq for TypedHandle<K, T> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl<K: Key, T: ?Sized> Eq for TypedHandle<K, T> {}

impl<K: Key, T: ?Sized> PartialOrd for TypedHandle<K, T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K: Key, T: ?Sized> Ord for TypedHandle<K, T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}

impl<K: Key, T: ?Sized> Hash for TypedHandle<K, T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl<K: Key, T: ?Sized> fmt::Debug for TypedHandle<K, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypedHandle({:?})", self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::DefaultKey;

    struct NotCopy;

    #[test]
    fn handles_compare_by_key() {
        let mut map: SlotMap<DefaultKey, u32> = SlotMap::new();
        let a = map.insert(1);
        let b = map.insert(2);
        let ha: TypedHandle<DefaultKey, NotCopy> = TypedHandle::new(a);
        let ha2 = ha;
        assert_eq!(ha, ha2);
        assert_ne!(ha, TypedHandle::new(b));
        assert_eq!(ha.key(), a);
    }

    #[test]
    fn stale_keys_do_not_resolve() {
        let mut map: SlotMap<DefaultKey, u32> = SlotMap::new();
        let old = map.insert(7);
        map.remove(old);
        let reused = map.insert(8);
        assert!(map.get(old).is_none());
        assert_ne!(old, reused);
    }
}
