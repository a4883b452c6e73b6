//! The cashew set: a B-tree of cache-line sized nodes.
//!
//! Nodes keep their keys unsorted and find the child to descend into by
//! counting how many keys are less than the probe. A full node is always
//! split around the key being inserted, never around a median, so trees can
//! contain empty nodes and chains of them.

#[cfg(feature = "std")]
use alloc::boxed::Box;
#[cfg(feature = "std")]
use alloc::string::String;
#[cfg(feature = "std")]
use alloc::vec::Vec;
#[cfg(feature = "std")]
use std::error::Error;
#[cfg(feature = "std")]
use std::io::Write;

use core::mem::ManuallyDrop;

use allocated::{DropGuard, DropIn};
use allocator_api2::alloc::Allocator;

use crate::error::{CashewError, Result};
use crate::layout::{CacheLine, CacheLine64, FitsCacheLine};
use crate::order::{KeyOrder, NaturalOrder};

mod family;
mod node;
mod wrapper;


use family::Family;
use node::{Node, Scan};
pub use wrapper::CashewSet;

/// A cashew set using the allocated pattern.
///
/// This is the low-level type: it does not own an allocator, so every call
/// that may allocate or free takes one, and the caller must pass the same
/// allocator every time. Prefer the [`CashewSet`] wrapper.
///
/// # Type Parameters
///
/// - `K`: key type, stored by value in the nodes
/// - `L`: cache line geometry, [`CacheLine64`] by default
/// - `O`: key ordering, the key's [`Ord`] by default
///
/// # Examples
///
/// ```
/// use allocated::{CountingAllocator, DropIn};
/// use cashew_set::AllocatedCashewSet;
///
/// let alloc = CountingAllocator::default();
/// let mut set = AllocatedCashewSet::<u32>::default();
///
/// unsafe {
///     for key in 0..100 {
///         set.insert_in(&alloc, key)?;
///     }
/// }
/// assert_eq!(set.len(), 100);
/// assert_eq!(set.count(&42), 1);
///
/// unsafe { set.drop_in(&alloc) };
/// assert_eq!(alloc.net_allocations(), 0);
/// # Ok::<(), cashew_set::CashewError>(())
/// ```
pub struct AllocatedCashewSet<K: FitsCacheLine<L>, L: CacheLine = CacheLine64, O = NaturalOrder>
{
    root: Node<K, L>,
    order: O,
    depth: usize,
    len: usize,
}

impl<K: FitsCacheLine<L>, L: CacheLine, O: Default> Default for AllocatedCashewSet<K, L, O> {
    fn default() -> Self {
        Self::new(O::default())
    }
}

impl<K: FitsCacheLine<L>, L: CacheLine, O> AllocatedCashewSet<K, L, O> {
    /// Creates an empty set. Nothing is allocated until the root first splits.
    pub fn new(order: O) -> Self {
        AllocatedCashewSet {
            root: Node::new(),
            order,
            depth: 1,
            len: 0,
        }
    }

    /// Returns the number of keys in the set.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the set holds no keys.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of node levels, counting the root as 1.
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn order(&self) -> &O {
        &self.order
    }

    /// Empties the set, freeing every family.
    ///
    /// # Safety
    ///
    /// `alloc` MUST be the allocator used to allocate this object.
    pub unsafe fn clear_in<A: Allocator>(&mut self, alloc: &A) {
        // SAFETY: requirements match function requirements.
        unsafe { self.root.drop_in(alloc) };
        self.depth = 1;
        self.len = 0;
    }
}

impl<K: FitsCacheLine<L>, L: CacheLine, O: KeyOrder<K>> AllocatedCashewSet<K, L, O> {
    /// Returns 1 if `key` is in the set, 0 otherwise.
    pub fn count(&self, key: &K) -> usize {
        let mut node = &self.root;
        loop {
            match node.scan(key, &self.order) {
                Scan::Found => return 1,
                Scan::Missing { less_count } => match node.family().children() {
                    Some(children) => node = &children[less_count],
                    None => return 0,
                },
            }
        }
    }

    /// Returns `true` if `key` is in the set.
    pub fn contains(&self, key: &K) -> bool {
        self.count(key) == 1
    }

    /// Inserts `key`, returning `false` if an equal key was already present.
    ///
    /// # Safety
    ///
    /// `alloc` MUST be the allocator used to allocate this object.
    ///
    /// # Errors
    ///
    /// On any error the whole tree is discarded first: the set is left empty
    /// at depth 1 and `key` is dropped. The same happens if the ordering
    /// panics, before the panic propagates.
    pub unsafe fn insert_in<A: Allocator>(&mut self, alloc: &A, key: K) -> Result<bool> {
        let mut guard = DiscardOnFailure {
            set: self,
            alloc,
            armed: true,
        };
        let inserted = guard.set.try_insert(alloc, key)?;
        guard.armed = false;
        Ok(inserted)
    }

    fn try_insert<A: Allocator>(&mut self, alloc: &A, key: K) -> Result<bool> {
        let inserter = Inserter {
            alloc,
            order: &self.order,
            depth: self.depth,
        };
        match inserter.insert(&mut self.root, 1, key)? {
            Outcome::Present => Ok(false),
            Outcome::Done => {
                self.len += 1;
                Ok(true)
            }
            Outcome::FamilySplit { key, lower, upper } => {
                self.split_root(alloc, key, lower, upper)?;
                self.len += 1;
                Ok(true)
            }
        }
    }

    /// The only place the tree grows taller: the root's keys move into two
    /// new children that take over `lower` and `upper`, and `key` becomes
    /// the root's only key.
    fn split_root<A: Allocator>(
        &mut self,
        alloc: &A,
        key: K,
        lower: DropGuard<Family<K, L>, &A>,
        upper: DropGuard<Family<K, L>, &A>,
    ) -> Result<()> {
        // SAFETY: the family was just allocated from `alloc`.
        let mut family = unsafe { DropGuard::new(Family::allocate_in(alloc)?, alloc) };
        let children = family.expect_children_mut()?;
        let (left, right) = children.split_at_mut(1);
        left[0].set_family(ManuallyDrop::into_inner(lower.into_inner()));
        right[0].set_family(ManuallyDrop::into_inner(upper.into_inner()));
        self.root
            .split_elts(&mut left[0], &mut right[0], &key, &self.order);

        self.root.set_family(ManuallyDrop::into_inner(family.into_inner()));
        self.root.add_elt(key);
        self.depth += 1;
        tracing::debug!(depth = self.depth, len = self.len + 1, "split cashew set root");
        Ok(())
    }

    /// Audits the whole tree: node counts, leaf depth, family alignment,
    /// empty inactive children, key ordering between levels and the total
    /// key count.
    ///
    /// # Errors
    ///
    /// Returns the first violation found.
    pub fn check(&self) -> Result<()> {
        let mut total = 0;
        self.check_node(&self.root, 1, None, None, &mut total)?;
        if total != self.len {
            tracing::error!(total, len = self.len, "cashew set count mismatch");
            return Err(CashewError::Corrupted("element count does not match the tree"));
        }
        Ok(())
    }

    fn check_node<'n>(
        &'n self,
        node: &'n Node<K, L>,
        node_depth: usize,
        lo: Option<&'n K>,
        hi: Option<&'n K>,
        total: &mut usize,
    ) -> Result<()> {
        if node.len() > Node::<K, L>::CAPACITY {
            return Err(CashewError::Corrupted("node holds more elements than fit"));
        }

        let order = &self.order;
        let elts = node.elts();

        if node_depth > self.depth {
            return Err(CashewError::Corrupted("node below the tree depth"));
        }
        if node_depth == self.depth && node.family().is_some() {
            return Err(CashewError::Corrupted("leaf-depth node owns a family"));
        }
        if node_depth < self.depth && node.family().is_none() && !elts.is_empty() {
            return Err(CashewError::Corrupted("non-leaf node with elements has no family"));
        }

        for (i, elt) in elts.iter().enumerate() {
            if lo.is_some_and(|lo| !order.less(lo, elt)) || hi.is_some_and(|hi| !order.less(elt, hi)) {
                return Err(CashewError::Corrupted("element outside its parent's bounds"));
            }
            if elts[i + 1..].iter().any(|other| order.equal(elt, other)) {
                return Err(CashewError::Corrupted("duplicate element in node"));
            }
        }
        *total += elts.len();

        if let Some(children) = node.family().children() {
            if let Some(addr) = node.family().addr().filter(|addr| addr % L::BYTES != 0) {
                return Err(CashewError::Misaligned {
                    addr,
                    align: L::BYTES,
                });
            }
            if !children[elts.len() + 1..].iter().all(Node::is_empty) {
                return Err(CashewError::Corrupted("inactive child node is not empty"));
            }
            for (i, child) in children[..=elts.len()].iter().enumerate() {
                let child_lo = match i {
                    0 => lo,
                    _ => Some(nth_smallest(elts, i - 1, order)?),
                };
                let child_hi = match i {
                    i if i == elts.len() => hi,
                    _ => Some(nth_smallest(elts, i, order)?),
                };
                self.check_node(child, node_depth + 1, child_lo, child_hi, total)?;
            }
        }

        Ok(())
    }
}

/// The element with exactly `rank` smaller elements.
fn nth_smallest<'e, K, O: KeyOrder<K>>(elts: &'e [K], rank: usize, order: &O) -> Result<&'e K> {
    elts.iter()
        .find(|elt| elts.iter().filter(|other| order.less(other, elt)).count() == rank)
        .ok_or(CashewError::Corrupted("node elements are not totally ordered"))
}

impl<K: FitsCacheLine<L>, L: CacheLine, O> DropIn for AllocatedCashewSet<K, L, O> {
    /// # Safety
    ///
    /// `alloc` MUST be the allocator used to allocate this object.
    unsafe fn drop_in<A: Allocator>(&mut self, alloc: &A) {
        // SAFETY: requirements match function requirements.
        unsafe { self.clear_in(alloc) }
    }
}

#[cfg(feature = "std")]
impl<K: FitsCacheLine<L> + core::fmt::Debug, L: CacheLine, O> AllocatedCashewSet<K, L, O> {
    /// Renders the tree in Graphviz `dot` syntax.
    ///
    /// # Errors
    ///
    /// Returns an error if the output is not valid UTF-8, which only happens
    /// if a key's `Debug` output is not.
    pub fn to_dot(&self) -> core::result::Result<String, Box<dyn Error>> {
        let mut data = Vec::default();

        data.write_all(b"digraph G {\n")?;
        data.write_all(b"rankdir=\"TB\";\n")?;
        self.root.to_dot(&mut data)?;
        data.write_all(b"}\n")?;

        Ok(String::from_utf8(data)?)
    }
}

/// Clears the set unless disarmed, so that an insert that fails or unwinds
/// part way never leaves a half-rebuilt tree behind.
struct DiscardOnFailure<'s, 'a, K: FitsCacheLine<L>, L: CacheLine, O, A: Allocator> {
    set: &'s mut AllocatedCashewSet<K, L, O>,
    alloc: &'a A,
    armed: bool,
}

impl<K: FitsCacheLine<L>, L: CacheLine, O, A: Allocator> Drop for DiscardOnFailure<'_, '_, K, L, O, A> {
    fn drop(&mut self) {
        if self.armed {
            tracing::warn!(
                len = self.set.len,
                depth = self.set.depth,
                "insert failed, discarding cashew set"
            );
            // SAFETY: `insert_in` requires `alloc` to own the set's families.
            unsafe { self.set.clear_in(self.alloc) };
        }
    }
}

/// Result of inserting into one subtree.
enum Outcome<'a, K: FitsCacheLine<L>, L: CacheLine, A: Allocator> {
    /// An equal key was already present.
    Present,
    /// The key was stored somewhere in the subtree.
    Done,
    /// The subtree's root was full. Its family has been cut in two around
    /// `key`, and the caller must place `key` and rehome both families.
    /// Either family is empty when the full node was a leaf.
    FamilySplit {
        key: K,
        lower: DropGuard<Family<K, L>, &'a A>,
        upper: DropGuard<Family<K, L>, &'a A>,
    },
}

/// What every level of one insert shares.
struct Inserter<'a, 'o, A, O> {
    alloc: &'a A,
    order: &'o O,
    depth: usize,
}

impl<'a, A: Allocator, O> Inserter<'a, '_, A, O> {
    fn insert<K: FitsCacheLine<L>, L: CacheLine>(
        &self,
        node: &mut Node<K, L>,
        node_depth: usize,
        key: K,
    ) -> Result<Outcome<'a, K, L, A>>
    where
        O: KeyOrder<K>,
    {
        if node.len() > Node::<K, L>::CAPACITY {
            tracing::error!(len = node.len(), "node count exceeds capacity");
            return Err(CashewError::Corrupted("node holds more elements than fit"));
        }
        if node_depth > self.depth {
            tracing::error!(node_depth, depth = self.depth, "node below the tree depth");
            return Err(CashewError::Corrupted("node below the tree depth"));
        }
        if node_depth == self.depth && node.family().is_some() {
            tracing::error!(node_depth, "leaf-depth node owns a family");
            return Err(CashewError::Corrupted("leaf-depth node owns a family"));
        }

        let less_count = match node.scan(&key, self.order) {
            Scan::Found => return Ok(Outcome::Present),
            Scan::Missing { less_count } => less_count,
        };

        if node.is_full() {
            self.insert_full(node, node_depth, key, less_count)
        } else {
            self.insert_spacious(node, node_depth, key, less_count)
        }
    }

    /// Inserts below a node with room for one more key. Never reports a
    /// family split to the caller.
    fn insert_spacious<K: FitsCacheLine<L>, L: CacheLine>(
        &self,
        node: &mut Node<K, L>,
        node_depth: usize,
        key: K,
        less_count: usize,
    ) -> Result<Outcome<'a, K, L, A>>
    where
        O: KeyOrder<K>,
    {
        let key = if node_depth < self.depth {
            if node.family().is_none() {
                node.set_family(Family::allocate_in(self.alloc)?);
            }

            let child_count = node.len() + 1;
            let children = node.family.expect_children_mut()?;
            let (key, lower, upper) =
                match self.insert(&mut children[less_count], node_depth + 1, key)? {
                    Outcome::FamilySplit { key, lower, upper } => (key, lower, upper),
                    done => return Ok(done),
                };

            // Open a slot right after the split child. The slot rotated in
            // comes from past the last active child, so it is empty.
            if !children[child_count].is_empty() {
                return Err(CashewError::Corrupted("inactive child node is not empty"));
            }
            children[less_count + 1..=child_count].rotate_right(1);

            let (lt, gt) = children.split_at_mut(less_count + 1);
            let (lt_node, gt_node) = (&mut lt[less_count], &mut gt[0]);
            lt_node.set_family(ManuallyDrop::into_inner(lower.into_inner()));
            gt_node.set_family(ManuallyDrop::into_inner(upper.into_inner()));
            lt_node.split_elts_into(gt_node, &key, self.order);
            key
        } else {
            key
        };

        node.add_elt(key);
        Ok(Outcome::Done)
    }

    /// Inserts below a full node. If the child it descends into splits, the
    /// node's own family is cut in two and the split is passed up.
    fn insert_full<K: FitsCacheLine<L>, L: CacheLine>(
        &self,
        node: &mut Node<K, L>,
        node_depth: usize,
        key: K,
        less_count: usize,
    ) -> Result<Outcome<'a, K, L, A>>
    where
        O: KeyOrder<K>,
    {
        if node_depth == self.depth {
            // SAFETY: empty families own no memory.
            let (lower, upper) = unsafe {
                (
                    DropGuard::new(Family::none(), self.alloc),
                    DropGuard::new(Family::none(), self.alloc),
                )
            };
            return Ok(Outcome::FamilySplit { key, lower, upper });
        }

        let child_count = node.len() + 1;
        let Some(children) = node.family.children_mut() else {
            tracing::error!(node_depth, depth = self.depth, "full non-leaf node has no family");
            return Err(CashewError::Corrupted("full non-leaf node has no family"));
        };
        let (key, lower, upper) = match self.insert(&mut children[less_count], node_depth + 1, key)? {
            Outcome::FamilySplit { key, lower, upper } => (key, lower, upper),
            done => return Ok(done),
        };

        // SAFETY: the family was just allocated from `self.alloc`.
        let mut nibling = unsafe { DropGuard::new(Family::allocate_in(self.alloc)?, self.alloc) };
        let adopted = nibling.expect_children_mut()?;

        // Children after the split one move over to the new family.
        for (slot, child) in adopted[1..]
            .iter_mut()
            .zip(&mut children[less_count + 1..child_count])
        {
            // SAFETY: the slot is empty and both families use `self.alloc`.
            unsafe { slot.assign_in(self.alloc, child) };
        }

        let lt_node = &mut children[less_count];
        let gt_node = &mut adopted[0];
        lt_node.set_family(ManuallyDrop::into_inner(lower.into_inner()));
        gt_node.set_family(ManuallyDrop::into_inner(upper.into_inner()));
        lt_node.split_elts_into(gt_node, &key, self.order);

        // SAFETY: the family belongs to `node`, allocated from `self.alloc`.
        let lower = unsafe { DropGuard::new(node.family.take(), self.alloc) };
        Ok(Outcome::FamilySplit {
            key,
            lower,
            upper: nibling,
        })
    }
}
