use core::fmt;
use core::mem::{self, align_of, size_of, MaybeUninit};

use allocated::DropIn;
use allocator_api2::alloc::Allocator;
use generic_array::GenericArray;
use typenum::Unsigned;

#[cfg(feature = "std")]
use alloc::boxed::Box;
#[cfg(feature = "std")]
use alloc::format;
#[cfg(feature = "std")]
use alloc::vec::Vec;
#[cfg(feature = "std")]
use std::error::Error;
#[cfg(feature = "std")]
use std::io::Write;

use crate::common::{drop_slots, live_slots, Drain, Retain};
use crate::layout::{elt_count_max, CacheLine, ChildrenPerNode, EltCountMax, FitsCacheLine};
use crate::order::KeyOrder;

use super::family::Family;

type Elts<K, L> = GenericArray<MaybeUninit<K>, EltCountMax<K, L>>;

/// Result of scanning one node for a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scan {
    Found,
    /// Not in this node; `less_count` elements are smaller, which is also
    /// the index of the child to descend into.
    Missing { less_count: usize },
}

/// One cache line: a family handle, a count byte and up to `EltCountMax`
/// keys in arrival order.
///
/// Elements `[0, len)` are live. The node never drops anything by itself;
/// it must be released with [`DropIn::drop_in`].
#[repr(C)]
pub struct Node<K: FitsCacheLine<L>, L: CacheLine> {
    _align: [L::Align; 0],
    pub(super) family: Family<K, L>,
    len: u8,
    elts: Elts<K, L>,
}

impl<K: FitsCacheLine<L>, L: CacheLine> Node<K, L> {
    const LAYOUT: () = {
        assert!(
            size_of::<Self>() == L::BYTES,
            "tree nodes do not match the cache line size"
        );
        assert!(align_of::<Self>() == L::BYTES, "tree nodes are not line aligned");
        assert!(
            <EltCountMax<K, L> as Unsigned>::USIZE
                == elt_count_max(size_of::<K>(), size_of::<usize>(), L::BYTES),
            "FitsCacheLine::EltCountMax is not the largest capacity that fits"
        );
        assert!(
            <ChildrenPerNode<K, L> as Unsigned>::USIZE == <EltCountMax<K, L> as Unsigned>::USIZE + 1,
            "FitsCacheLine::ChildrenPerNode must be EltCountMax + 1"
        );
        assert!(
            <EltCountMax<K, L> as Unsigned>::USIZE < u8::MAX as usize,
            "node capacity does not fit the count byte"
        );
    };

    pub const CAPACITY: usize = <EltCountMax<K, L> as Unsigned>::USIZE;

    pub fn new() -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::LAYOUT;
        Node {
            _align: [],
            family: Family::none(),
            len: 0,
            elts: GenericArray::uninit(),
        }
    }

    pub fn len(&self) -> usize {
        usize::from(self.len)
    }

    /// Overwrites the element count without touching the slots.
    #[cfg(test)]
    pub(super) unsafe fn set_len(&mut self, len: u8) {
        self.len = len;
    }

    pub fn is_full(&self) -> bool {
        self.len() == Self::CAPACITY
    }

    /// No elements and no family.
    pub fn is_empty(&self) -> bool {
        self.len == 0 && self.family.is_none()
    }

    pub fn elts(&self) -> &[K] {
        // SAFETY: slots `[0, len)` are initialised.
        unsafe { live_slots(&self.elts[..self.len()]) }
    }

    pub fn family(&self) -> &Family<K, L> {
        &self.family
    }

    /// Installs `family`. The node must not own one already.
    pub fn set_family(&mut self, family: Family<K, L>) {
        debug_assert!(self.family.is_none(), "overwriting a live family");
        self.family = family;
    }

    /// Linear scan: reports an equal element, or how many elements are less
    /// than `key`.
    pub fn scan<O: KeyOrder<K>>(&self, key: &K, order: &O) -> Scan {
        let mut less_count = 0;
        for elt in self.elts() {
            if order.equal(elt, key) {
                return Scan::Found;
            }
            if order.less(elt, key) {
                less_count += 1;
            }
        }
        Scan::Missing { less_count }
    }

    /// Appends `key`. The node must have room.
    pub fn add_elt(&mut self, key: K) {
        debug_assert!(!self.is_full(), "add_elt on a full node");
        let len = self.len();
        self.elts[len].write(key);
        self.len += 1;
    }

    /// Moves every element into `left` (less than `pivot`) or `right`,
    /// keeping arrival order, and leaves this node without elements.
    ///
    /// `left` and `right` must start without elements and no element may
    /// equal `pivot`. If `order` panics, `left` and `right` keep what was
    /// moved so far and the rest is dropped.
    pub fn split_elts<O: KeyOrder<K>>(
        &mut self,
        left: &mut Self,
        right: &mut Self,
        pivot: &K,
        order: &O,
    ) {
        debug_assert_eq!(left.len(), 0);
        debug_assert_eq!(right.len(), 0);

        let n = self.len();
        self.len = 0;
        // SAFETY: `[0, n)` was live and this node no longer counts it.
        let mut drain = unsafe { Drain::new(&mut self.elts[..n]) };
        while let Some(elt) = drain.peek() {
            debug_assert!(!order.equal(elt, pivot));
            let goes_left = order.less(elt, pivot);
            let Some(elt) = drain.take() else { break };
            if goes_left {
                left.add_elt(elt);
            } else {
                right.add_elt(elt);
            }
        }
    }

    /// Keeps elements less than `pivot` (compacted, in order) and appends
    /// the rest to `other`, which may already hold elements.
    ///
    /// Same precondition and panic behaviour as [`Self::split_elts`].
    pub fn split_elts_into<O: KeyOrder<K>>(&mut self, other: &mut Self, pivot: &K, order: &O) {
        // SAFETY: `elts[..len]` is live and owned by this node.
        let mut retain = unsafe { Retain::new(&mut self.elts, &mut self.len) };
        while let Some(elt) = retain.peek() {
            debug_assert!(!order.equal(elt, pivot));
            if order.less(elt, pivot) {
                retain.keep();
            } else {
                other.add_elt(retain.take());
            }
        }
    }

    /// Moves the node out, leaving an empty node behind.
    pub fn take(&mut self) -> Self {
        mem::take(self)
    }

    /// Move assignment: releases this node's contents and takes over the
    /// elements and family of `source`, which is left empty.
    ///
    /// # Safety
    ///
    /// `alloc` must be the allocator used for this node's family.
    pub unsafe fn assign_in<A: Allocator>(&mut self, alloc: &A, source: &mut Self) {
        // SAFETY: requirements match function requirements.
        unsafe { self.drop_in(alloc) };
        *self = source.take();
    }
}

impl<K: FitsCacheLine<L>, L: CacheLine> Default for Node<K, L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: FitsCacheLine<L>, L: CacheLine> DropIn for Node<K, L> {
    /// # Safety
    ///
    /// `alloc` must be the allocator used to allocate this node's family.
    unsafe fn drop_in<A: Allocator>(&mut self, alloc: &A) {
        let n = self.len();
        self.len = 0;
        // SAFETY: `[0, n)` was live and is no longer counted.
        unsafe { drop_slots(&mut self.elts[..n]) };
        // SAFETY: requirements match function requirements.
        unsafe { self.family.drop_in(alloc) };
    }
}

impl<K: FitsCacheLine<L> + fmt::Debug, L: CacheLine> fmt::Debug for Node<K, L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("family", &self.family)
            .field("len", &self.len)
            .field("elts", &self.elts())
            .finish()
    }
}

#[cfg(feature = "std")]
impl<K: FitsCacheLine<L> + fmt::Debug, L: CacheLine> Node<K, L> {
    /// Writes this node and its active descendants as Graphviz records.
    pub fn to_dot(&self, data: &mut Vec<u8>) -> Result<(), Box<dyn Error>> {
        let this = core::ptr::from_ref(self);
        data.write_all(format!("\"p{:?}\" [shape=\"record\"; label=\"{:?} ({})|{{", this, this, self.len).as_bytes())?;

        if self.len == 0 {
            data.write_all(b"}\"];\n")?;
        }

        for (i, elt) in self.elts().iter().enumerate() {
            data.write_all(format!("{elt:?}").as_bytes())?;

            if i != self.len() - 1 {
                data.write_all(b"|")?;
            } else {
                data.write_all(b"}\"];\n")?;
            }
        }

        if let Some(children) = self.family.children() {
            for child in &children[..=self.len()] {
                let that = core::ptr::from_ref(child);
                data.write_all(format!("\"p{:?}\" -> \"p{:?}\";\n", this, that).as_bytes())?;

                child.to_dot(data)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use crate::layout::{CacheLine128, CacheLine64};
    use crate::order::NaturalOrder;
    use alloc::vec::Vec;
    use allocator_api2::alloc::Global;
    use core::cell::Cell;
    use std::panic::{catch_unwind, AssertUnwindSafe};

    std::thread_local! {
        static LIVE: Cell<isize> = const { Cell::new(0) };
    }

    /// Key that counts how many instances are alive on this thread.
    #[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
    struct Tracked(u32);

    impl Tracked {
        fn new(v: u32) -> Self {
            LIVE.with(|c| c.set(c.get() + 1));
            Tracked(v)
        }
    }

    impl Drop for Tracked {
        fn drop(&mut self) {
            LIVE.with(|c| c.set(c.get() - 1));
        }
    }

    impl FitsCacheLine<CacheLine64> for Tracked {
        type EltCountMax = EltCountMax<u32, CacheLine64>;
        type ChildrenPerNode = ChildrenPerNode<u32, CacheLine64>;
    }

    fn live() -> isize {
        LIVE.with(Cell::get)
    }

    /// Natural order that panics on the `n`th comparison.
    struct PanicAfter(Cell<usize>);

    impl KeyOrder<Tracked> for PanicAfter {
        fn less(&self, a: &Tracked, b: &Tracked) -> bool {
            let left = self.0.get();
            assert!(left > 0, "comparison budget exhausted");
            self.0.set(left - 1);
            a < b
        }

        fn equal(&self, a: &Tracked, b: &Tracked) -> bool {
            a == b
        }
    }

    fn node_of(values: &[u32]) -> Node<Tracked, CacheLine64> {
        let mut node = Node::new();
        for v in values {
            node.add_elt(Tracked::new(*v));
        }
        node
    }

    fn values(node: &Node<Tracked, CacheLine64>) -> Vec<u32> {
        node.elts().iter().map(|t| t.0).collect()
    }

    #[test]
    fn test_node_is_one_cache_line() {
        assert_eq!(size_of::<Node<u8, CacheLine64>>(), 64);
        assert_eq!(size_of::<Node<u16, CacheLine64>>(), 64);
        assert_eq!(size_of::<Node<u32, CacheLine64>>(), 64);
        assert_eq!(size_of::<Node<u64, CacheLine64>>(), 64);
        assert_eq!(size_of::<Node<u128, CacheLine64>>(), 64);
        assert_eq!(size_of::<Node<char, CacheLine64>>(), 64);
        assert_eq!(size_of::<Node<u32, CacheLine128>>(), 128);
        assert_eq!(size_of::<Node<i64, CacheLine128>>(), 128);
        assert_eq!(align_of::<Node<u32, CacheLine64>>(), 64);
        assert_eq!(align_of::<Node<u8, CacheLine128>>(), 128);

        // Forces the layout assertion for a few instantiations.
        let _ = Node::<i8, CacheLine64>::new();
        let _ = Node::<u128, CacheLine128>::new();
    }

    #[test]
    fn test_scan() {
        let mut node = Node::<u32, CacheLine64>::new();
        for v in [50, 10, 30] {
            node.add_elt(v);
        }

        assert_eq!(node.scan(&30, &NaturalOrder), Scan::Found);
        assert_eq!(node.scan(&5, &NaturalOrder), Scan::Missing { less_count: 0 });
        assert_eq!(node.scan(&40, &NaturalOrder), Scan::Missing { less_count: 2 });
        assert_eq!(node.scan(&99, &NaturalOrder), Scan::Missing { less_count: 3 });
        assert_eq!(Node::<u32, CacheLine64>::new().scan(&1, &NaturalOrder), Scan::Missing { less_count: 0 });
    }

    #[test]
    fn test_add_elt_until_full() {
        let mut node = Node::<u64, CacheLine64>::new();
        for v in 0..Node::<u64, CacheLine64>::CAPACITY as u64 {
            assert!(!node.is_full());
            node.add_elt(v * 7);
        }
        assert!(node.is_full());
        assert_eq!(node.elts()[2], 14);
    }

    #[test]
    fn test_split_elts_keeps_arrival_order() {
        let mut node = node_of(&[9, 2, 7, 4, 12, 1]);
        let mut left = Node::new();
        let mut right = Node::new();

        node.split_elts(&mut left, &mut right, &Tracked::new(5), &NaturalOrder);

        assert_eq!(node.len(), 0);
        assert_eq!(values(&left), [2, 4, 1]);
        assert_eq!(values(&right), [9, 7, 12]);

        unsafe {
            left.drop_in(&Global);
            right.drop_in(&Global);
        }
        assert_eq!(live(), 0);
    }

    #[test]
    fn test_split_elts_pivot_outside_range() {
        let mut node = node_of(&[3, 1, 2]);
        let mut left = Node::new();
        let mut right = Node::new();

        node.split_elts(&mut left, &mut right, &Tracked::new(100), &NaturalOrder);

        assert_eq!(values(&left), [3, 1, 2]);
        assert_eq!(right.len(), 0);
        unsafe {
            left.drop_in(&Global);
            right.drop_in(&Global);
        }
        assert_eq!(live(), 0);
    }

    #[test]
    fn test_split_elts_into_appends() {
        let mut node = node_of(&[8, 3, 6, 1]);
        let mut other = node_of(&[20]);

        node.split_elts_into(&mut other, &Tracked::new(5), &NaturalOrder);

        assert_eq!(values(&node), [3, 1]);
        assert_eq!(values(&other), [20, 8, 6]);
        unsafe {
            node.drop_in(&Global);
            other.drop_in(&Global);
        }
        assert_eq!(live(), 0);
    }

    #[test]
    fn test_split_elts_panic_keeps_moved_prefix() {
        let mut node = node_of(&[9, 2, 7, 4, 12]);
        let mut left = Node::new();
        let mut right = Node::new();
        let order = PanicAfter(Cell::new(3));

        let pivot = Tracked::new(5);
        let result = catch_unwind(AssertUnwindSafe(|| {
            node.split_elts(&mut left, &mut right, &pivot, &order);
        }));

        assert!(result.is_err());
        assert_eq!(node.len(), 0);
        assert_eq!(values(&left), [2]);
        assert_eq!(values(&right), [9, 7]);

        unsafe {
            node.drop_in(&Global);
            left.drop_in(&Global);
            right.drop_in(&Global);
        }
        drop(pivot);
        assert_eq!(live(), 0);
    }

    #[test]
    fn test_split_elts_into_panic_keeps_compacted_prefix() {
        let mut node = node_of(&[1, 9, 2, 8, 3]);
        let mut other = Node::new();
        let order = PanicAfter(Cell::new(4));

        let pivot = Tracked::new(5);
        let result = catch_unwind(AssertUnwindSafe(|| {
            node.split_elts_into(&mut other, &pivot, &order);
        }));

        assert!(result.is_err());
        assert_eq!(values(&node), [1, 2]);
        assert_eq!(values(&other), [9, 8]);

        unsafe {
            node.drop_in(&Global);
            other.drop_in(&Global);
        }
        drop(pivot);
        assert_eq!(live(), 0);
    }

    #[test]
    fn test_assign_in_replaces_contents() {
        let mut dest = node_of(&[1, 2]);
        let mut source = node_of(&[7, 8, 9]);

        unsafe { dest.assign_in(&Global, &mut source) };

        assert!(source.is_empty());
        assert_eq!(values(&dest), [7, 8, 9]);
        assert_eq!(live(), 3);

        unsafe { dest.drop_in(&Global) };
        assert_eq!(live(), 0);
    }

    #[test]
    fn test_take_leaves_empty_node() {
        let mut node = node_of(&[4]);
        let mut taken = node.take();
        assert!(node.is_empty());
        assert_eq!(values(&taken), [4]);
        unsafe { taken.drop_in(&Global) };
        assert_eq!(live(), 0);
    }
}
