use core::fmt;
use core::ptr::NonNull;

use allocated::DropIn;
use allocator_api2::alloc::{Allocator, Layout};
use generic_array::GenericArray;

use crate::error::{CashewError, Result};
use crate::layout::{CacheLine, ChildrenPerNode, FitsCacheLine};

use super::node::Node;

/// The child array owned by a non-leaf node.
pub type Children<K, L> = GenericArray<Node<K, L>, ChildrenPerNode<K, L>>;

/// Exclusive, possibly empty, handle to a family of child nodes.
///
/// A `Family` is move-only and pointer sized. It does not free itself: the
/// owner must call [`DropIn::drop_in`] with the allocator the family came
/// from, or wrap it in an [`allocated::DropGuard`] while it is in flight.
#[repr(transparent)]
pub struct Family<K: FitsCacheLine<L>, L: CacheLine> {
    ptr: Option<NonNull<Children<K, L>>>,
}

// SAFETY: a family uniquely owns its children, so it can move between
// threads whenever the keys can.
unsafe impl<K: FitsCacheLine<L> + Send, L: CacheLine> Send for Family<K, L> {}

// SAFETY: shared access only hands out shared references to the children.
unsafe impl<K: FitsCacheLine<L> + Sync, L: CacheLine> Sync for Family<K, L> {}

impl<K: FitsCacheLine<L>, L: CacheLine> Family<K, L> {
    pub const fn none() -> Self {
        Self { ptr: None }
    }

    pub fn layout() -> Layout {
        Layout::new::<Children<K, L>>()
    }

    /// Allocates a family of empty nodes.
    ///
    /// The memory comes from [`Allocator::allocate_zeroed`]; an all-zero
    /// node is a valid empty node. A block that is not aligned to the cache
    /// line is returned to the allocator and reported as
    /// [`CashewError::Misaligned`].
    pub fn allocate_in<A: Allocator>(alloc: &A) -> Result<Self> {
        let layout = Self::layout();
        let block = alloc
            .allocate_zeroed(layout)
            .map_err(|_| CashewError::AllocFailed { layout })?;
        let ptr = block.cast::<Children<K, L>>();

        let addr = ptr.as_ptr() as usize;
        if addr % L::BYTES != 0 {
            // SAFETY: `block` was just allocated by `alloc` with `layout`.
            unsafe { alloc.deallocate(block.cast(), layout) };
            tracing::error!(addr, align = L::BYTES, "allocator returned a misaligned family");
            return Err(CashewError::Misaligned {
                addr,
                align: L::BYTES,
            });
        }

        tracing::trace!(addr, bytes = layout.size(), "allocated family");
        Ok(Self { ptr: Some(ptr) })
    }

    pub fn is_some(&self) -> bool {
        self.ptr.is_some()
    }

    pub fn is_none(&self) -> bool {
        self.ptr.is_none()
    }

    /// Address of the child array, if any.
    pub fn addr(&self) -> Option<usize> {
        self.ptr.map(|p| p.as_ptr() as usize)
    }

    /// Moves the handle out, leaving `self` empty.
    pub fn take(&mut self) -> Self {
        Self {
            ptr: self.ptr.take(),
        }
    }

    pub fn children(&self) -> Option<&Children<K, L>> {
        // SAFETY: the pointer is live and uniquely owned by this handle.
        self.ptr.as_ref().map(|p| unsafe { p.as_ref() })
    }

    pub fn children_mut(&mut self) -> Option<&mut Children<K, L>> {
        // SAFETY: the pointer is live and uniquely owned by this handle;
        // `&mut self` makes the borrow exclusive.
        self.ptr.as_mut().map(|p| unsafe { p.as_mut() })
    }

    /// Like [`Self::children_mut`], for families the caller just allocated or
    /// otherwise knows to be present.
    pub fn expect_children_mut(&mut self) -> Result<&mut Children<K, L>> {
        self.children_mut()
            .ok_or(CashewError::Corrupted("expected a family, found none"))
    }
}

impl<K: FitsCacheLine<L>, L: CacheLine> DropIn for Family<K, L> {
    /// # Safety
    ///
    /// `alloc` must be the allocator used to allocate this family.
    unsafe fn drop_in<A: Allocator>(&mut self, alloc: &A) {
        if let Some(mut ptr) = self.ptr.take() {
            // SAFETY: the family is live and uniquely owned.
            let children = unsafe { ptr.as_mut() };
            for child in children.iter_mut() {
                // SAFETY: children were allocated from `alloc` as well.
                unsafe { child.drop_in(alloc) };
            }
            // SAFETY: `ptr` was allocated by `alloc` with this layout and
            // every child has been dropped.
            unsafe { alloc.deallocate(ptr.cast(), Self::layout()) };
        }
    }
}

impl<K: FitsCacheLine<L>, L: CacheLine> fmt::Debug for Family<K, L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ptr {
            Some(p) => write!(f, "Family({:p})", p),
            None => f.write_str("Family(none)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{CacheLine128, CacheLine64};
    use allocated::CountingAllocator;
    use core::mem::size_of;
    use typenum::Unsigned;

    #[test]
    fn test_family_is_pointer_sized() {
        assert_eq!(size_of::<Family<u32, CacheLine64>>(), size_of::<usize>());
    }

    #[test]
    fn test_allocate_is_aligned_and_empty() -> core::result::Result<(), CashewError> {
        let alloc = CountingAllocator::default();
        let mut family = Family::<u64, CacheLine64>::allocate_in(&alloc)?;

        assert_eq!(family.addr().unwrap() % CacheLine64::BYTES, 0);
        let children = family.children().unwrap();
        assert_eq!(children.len(), ChildrenPerNode::<u64, CacheLine64>::USIZE);
        assert!(children.iter().all(|c| c.is_empty()));

        unsafe { family.drop_in(&alloc) };
        assert!(family.is_none());
        assert_eq!(alloc.n_allocations(), 1);
        assert_eq!(alloc.net_allocations(), 0);
        Ok(())
    }

    #[test]
    fn test_allocate_128_byte_lines() -> core::result::Result<(), CashewError> {
        let alloc = CountingAllocator::default();
        let mut family = Family::<u16, CacheLine128>::allocate_in(&alloc)?;
        assert_eq!(family.addr().unwrap() % CacheLine128::BYTES, 0);
        assert_eq!(
            alloc.n_bytes_allocated(),
            ChildrenPerNode::<u16, CacheLine128>::USIZE * CacheLine128::BYTES
        );
        unsafe { family.drop_in(&alloc) };
        assert_eq!(alloc.net_bytes_allocated(), 0);
        Ok(())
    }

    #[test]
    fn test_take_moves_ownership() -> core::result::Result<(), CashewError> {
        let alloc = CountingAllocator::default();
        let mut family = Family::<u32, CacheLine64>::allocate_in(&alloc)?;
        let addr = family.addr();

        let mut moved = family.take();
        assert!(family.is_none());
        assert_eq!(moved.addr(), addr);

        unsafe {
            family.drop_in(&alloc);
            moved.drop_in(&alloc);
        }
        assert_eq!(alloc.net_allocations(), 0);
        Ok(())
    }
}
