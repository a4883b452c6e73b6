//! A cache-friendly ordered set using the _allocated_ pattern.
//!
//! A cashew set is a B-tree whose nodes are exactly one cache line: a single
//! pointer to a family of child nodes, one count byte, and as many keys as
//! fit in the rest of the line. With 64-byte lines and 64-bit pointers a node
//! holds 13 `u32` keys or 6 `u64` keys.
//!
//! Keys inside a node are not kept sorted. Lookups scan the whole node,
//! stop on an equal key, and otherwise descend into the child whose index is
//! the number of keys less than the probe. The set only supports insertion
//! and membership queries: there is no removal and no iteration.
//!
//! # Quick Start
//!
//! ```
//! use cashew_set::CashewSet;
//!
//! let mut set: CashewSet<u32> = CashewSet::new();
//! for key in [5, 1, 9, 1] {
//!     set.insert(key)?;
//! }
//!
//! assert_eq!(set.len(), 3);
//! assert!(set.contains(&9));
//! assert_eq!(set.count(&4), 0);
//! # Ok::<(), cashew_set::CashewError>(())
//! ```
//!
//! # Line geometry and key types
//!
//! The line size is a type parameter, [`CacheLine64`] by default or
//! [`CacheLine128`]. Keys must implement [`FitsCacheLine`] for the chosen
//! line, which supplies the node capacity at the type level. The primitive
//! integer, float, `bool` and `char` types are covered.
//!
//! # The Allocated Pattern
//!
//! - [`CashewSet<K, L, O, A>`] owns its allocator and needs no `unsafe`.
//! - [`AllocatedCashewSet<K, L, O>`] does not; every allocating call takes
//!   the allocator explicitly. Use it to embed sets in other allocated
//!   structures.
//!
//! ```
//! use allocated::{CountingAllocator, DropIn};
//! use cashew_set::AllocatedCashewSet;
//!
//! let alloc = CountingAllocator::default();
//! let mut set = AllocatedCashewSet::<u64>::default();
//!
//! unsafe {
//!     for key in 0..50 {
//!         set.insert_in(&alloc, key)?;
//!     }
//! }
//!
//! // Track memory usage
//! println!("Allocations: {}", alloc.n_allocations());
//!
//! unsafe { set.drop_in(&alloc) };
//! # Ok::<(), cashew_set::CashewError>(())
//! ```
//!
//! # Failures
//!
//! An insert that fails (allocation failure, a misaligned family from the
//! allocator, or detected corruption) discards the whole tree before
//! returning the error. An ordering that panics has the same effect before
//! the panic propagates. Nothing leaks either way.

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]

#[cfg(any(feature = "std", test))]
extern crate std;

extern crate alloc;

mod common;
mod error;
pub mod layout;
mod order;
mod set;

pub use error::{CashewError, CashewResultExt, Result};
pub use layout::{CacheLine, CacheLine128, CacheLine64, FitsCacheLine};
pub use order::{FnOrder, KeyOrder, NaturalOrder};
pub use set::{AllocatedCashewSet, CashewSet};
