//! Ergonomic wrapper for the cashew set.
//!
//! This module provides [`CashewSet<K, L, O, A>`], a wrapper around
//! [`AllocatedCashewSet`] that owns an allocator, making it safe and
//! ergonomic to use.

use core::fmt;
use core::mem::ManuallyDrop;

#[cfg(feature = "std")]
use alloc::boxed::Box;
#[cfg(feature = "std")]
use alloc::string::String;
#[cfg(feature = "std")]
use std::error::Error;

use allocated::DropIn;
use allocator_api2::alloc::{Allocator, Global};

use crate::error::{CashewResultExt, Result};
use crate::layout::{CacheLine, CacheLine64, FitsCacheLine};
use crate::order::{KeyOrder, NaturalOrder};

use super::AllocatedCashewSet;

/// A cashew set that owns its allocator.
///
/// This is the recommended type for most use cases. It wraps
/// [`AllocatedCashewSet`] and provides safe methods without requiring
/// `unsafe` blocks or passing allocators manually.
///
/// # Example
///
/// ```
/// use cashew_set::CashewSet;
///
/// let mut set: CashewSet<u32> = CashewSet::new();
/// assert!(set.insert(7)?);
/// assert!(!set.insert(7)?);
///
/// assert_eq!(set.count(&7), 1);
/// assert_eq!(set.len(), 1);
/// # Ok::<(), cashew_set::CashewError>(())
/// ```
pub struct CashewSet<
    K: FitsCacheLine<L>,
    L: CacheLine = CacheLine64,
    O = NaturalOrder,
    A: Allocator = Global,
> {
    alloc: A,
    raw: ManuallyDrop<AllocatedCashewSet<K, L, O>>,
}

impl<K: FitsCacheLine<L> + Ord, L: CacheLine> CashewSet<K, L> {
    /// Creates an empty set ordered by `K`'s [`Ord`], using the global
    /// allocator.
    #[inline]
    pub fn new() -> Self {
        Self::with_order(NaturalOrder)
    }
}

impl<K: FitsCacheLine<L>, L: CacheLine, O: KeyOrder<K>> CashewSet<K, L, O> {
    /// Creates an empty set with a custom ordering, using the global
    /// allocator.
    pub fn with_order(order: O) -> Self {
        Self::with_order_in(order, Global)
    }
}

impl<K: FitsCacheLine<L> + Ord, L: CacheLine, A: Allocator> CashewSet<K, L, NaturalOrder, A> {
    /// Creates an empty set ordered by `K`'s [`Ord`], allocating from `alloc`.
    pub fn new_in(alloc: A) -> Self {
        Self::with_order_in(NaturalOrder, alloc)
    }
}

impl<K: FitsCacheLine<L> + Ord, L: CacheLine> Default for CashewSet<K, L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: FitsCacheLine<L>, L: CacheLine, O, A: Allocator> Drop for CashewSet<K, L, O, A> {
    fn drop(&mut self) {
        // SAFETY: `self.raw` was allocated by `self.alloc`
        unsafe {
            self.raw.drop_in(&self.alloc);
        }
    }
}

impl<K: FitsCacheLine<L>, L: CacheLine, O: KeyOrder<K>, A: Allocator> CashewSet<K, L, O, A> {
    /// Creates an empty set with a custom ordering, allocating from `alloc`.
    ///
    /// Nothing is allocated until the set outgrows its root node.
    pub fn with_order_in(order: O, alloc: A) -> Self {
        Self {
            alloc,
            raw: ManuallyDrop::new(AllocatedCashewSet::new(order)),
        }
    }

    /// Returns the number of keys in the set.
    #[inline]
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    /// Returns `true` if the set contains no keys.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// Number of node levels; a fresh set has depth 1.
    #[inline]
    pub fn depth(&self) -> usize {
        self.raw.depth()
    }

    /// Returns 1 if the set contains `key`, 0 otherwise.
    pub fn count(&self, key: &K) -> usize {
        self.raw.count(key)
    }

    /// Returns `true` if the set contains `key`.
    pub fn contains(&self, key: &K) -> bool {
        self.raw.contains(key)
    }

    /// Adds `key` to the set.
    ///
    /// Returns `true` if the key was inserted and `false` if an equal key
    /// was already present, in which case `key` is dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if a child family cannot be allocated, comes back
    /// misaligned, or the tree is found to be corrupted. The set is empty
    /// after any error.
    pub fn insert(&mut self, key: K) -> Result<bool> {
        // SAFETY: `self.alloc` was used to allocate `self.raw`
        unsafe { self.raw.insert_in(&self.alloc, key) }
    }

    /// Removes every key, returning the set to depth 1.
    pub fn clear(&mut self) {
        // SAFETY: `self.alloc` was used to allocate `self.raw`
        unsafe { self.raw.clear_in(&self.alloc) }
    }

    /// Audits the tree structure.
    ///
    /// # Errors
    ///
    /// Returns the first invariant violation found.
    pub fn check(&self) -> Result<()> {
        self.raw.check()
    }

    /// Returns the ordering used by this set.
    pub fn order(&self) -> &O {
        self.raw.order()
    }

    /// Returns the allocator used by this set.
    pub fn allocator(&self) -> &A {
        &self.alloc
    }
}

#[cfg(feature = "std")]
impl<K: FitsCacheLine<L> + fmt::Debug, L: CacheLine, O, A: Allocator> CashewSet<K, L, O, A> {
    /// Renders the tree in Graphviz `dot` syntax.
    ///
    /// # Errors
    ///
    /// Returns an error if a key's `Debug` output is not valid UTF-8.
    pub fn to_dot(&self) -> core::result::Result<String, Box<dyn Error>> {
        self.raw.to_dot()
    }
}

impl<K: FitsCacheLine<L>, L: CacheLine, O, A: Allocator> fmt::Debug for CashewSet<K, L, O, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CashewSet")
            .field("len", &self.raw.len())
            .field("depth", &self.raw.depth())
            .finish_non_exhaustive()
    }
}

impl<K: FitsCacheLine<L> + Ord, L: CacheLine> FromIterator<K> for CashewSet<K, L> {
    /// # Panics
    ///
    /// Panics if an insert fails.
    fn from_iter<T: IntoIterator<Item = K>>(iter: T) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}

impl<K: FitsCacheLine<L>, L: CacheLine, O: KeyOrder<K>, A: Allocator> Extend<K>
    for CashewSet<K, L, O, A>
{
    /// # Panics
    ///
    /// Panics if an insert fails. Keys inserted before the failure are lost
    /// along with the rest of the tree.
    fn extend<T: IntoIterator<Item = K>>(&mut self, iter: T) {
        for key in iter {
            self.insert(key).handle_error();
        }
    }
}
