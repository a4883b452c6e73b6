//! Compile-time node capacity for cache-line sized nodes.
//!
//! A node is laid out as `{family pointer, one count byte, N keys}` and must
//! fill exactly one cache line. [`elt_count_max`] computes `N`; the
//! [`FitsCacheLine`] trait carries the same number as a `typenum` type so it
//! can size a [`GenericArray`](generic_array::GenericArray).
//!
//! Implementations are provided for the primitive scalar types. A key type of
//! your own can implement [`FitsCacheLine`] by hand; a wrong capacity is
//! rejected at compile time when the first node of that type is built.
//!
//! ```
//! use cashew_set::layout::{elt_count_max, CacheLine, CacheLine64, FitsCacheLine};
//! use typenum::Unsigned;
//!
//! let expected = elt_count_max(4, core::mem::size_of::<usize>(), CacheLine64::BYTES);
//! assert_eq!(<<u32 as FitsCacheLine<CacheLine64>>::EltCountMax as Unsigned>::USIZE, expected);
//! ```

use core::mem::size_of;

use generic_array::ArrayLength;

const _: () = assert!(
    size_of::<usize>() == 4 || size_of::<usize>() == 8,
    "cashew-set only supports 32-bit or 64-bit pointers"
);

/// Size in bytes of the per-node element count field.
pub const COUNT_BYTES: usize = size_of::<u8>();

/// Number of keys of `key_bytes` each that fit in one `line_bytes` node next
/// to a `pointer_bytes` family pointer and the count byte.
pub const fn elt_count_max(key_bytes: usize, pointer_bytes: usize, line_bytes: usize) -> usize {
    assert!(key_bytes > 0, "zero-sized keys cannot be stored in a cashew set");
    assert!(
        line_bytes > pointer_bytes + COUNT_BYTES,
        "cache line too small for a node header"
    );
    (line_bytes - pointer_bytes - COUNT_BYTES) / key_bytes
}

/// Number of child slots in a family of nodes holding `key_bytes` keys.
pub const fn children_per_node(key_bytes: usize, pointer_bytes: usize, line_bytes: usize) -> usize {
    elt_count_max(key_bytes, pointer_bytes, line_bytes) + 1
}

/// A hardware cache line geometry.
pub trait CacheLine: 'static {
    /// Line size in bytes.
    const BYTES: usize;

    /// Zero-sized marker whose alignment equals [`Self::BYTES`]. Nodes embed
    /// `[Self::Align; 0]` to pick up the alignment.
    type Align: Copy + 'static;
}

/// Alignment marker for 64-byte lines.
#[derive(Clone, Copy, Debug)]
#[repr(C, align(64))]
pub struct Align64;

/// Alignment marker for 128-byte lines.
#[derive(Clone, Copy, Debug)]
#[repr(C, align(128))]
pub struct Align128;

/// 64-byte cache lines: current x86-64, AMD and most ARM cores.
#[derive(Clone, Copy, Debug, Default)]
pub struct CacheLine64;

/// 128-byte cache lines, as on IBM POWER and Apple M-series L2.
#[derive(Clone, Copy, Debug, Default)]
pub struct CacheLine128;

impl CacheLine for CacheLine64 {
    const BYTES: usize = 64;
    type Align = Align64;
}

impl CacheLine for CacheLine128 {
    const BYTES: usize = 128;
    type Align = Align128;
}

/// Key types whose node capacity for line geometry `L` is known.
///
/// `EltCountMax` must equal
/// `elt_count_max(size_of::<Self>(), size_of::<usize>(), L::BYTES)` and
/// `ChildrenPerNode` must be one more. Both are verified at compile time.
pub trait FitsCacheLine<L: CacheLine>: Sized {
    /// Maximum number of keys per node.
    type EltCountMax: ArrayLength;
    /// Number of child slots per family.
    type ChildrenPerNode: ArrayLength;
}

/// Maximum number of keys per node for key `K` and line `L`.
pub type EltCountMax<K, L> = <K as FitsCacheLine<L>>::EltCountMax;

/// Number of child slots per family for key `K` and line `L`.
pub type ChildrenPerNode<K, L> = <K as FitsCacheLine<L>>::ChildrenPerNode;

macro_rules! fits_cache_line {
    ($line:ty { $($key:ty => $max:ty),* $(,)? }) => {
        $(
            impl FitsCacheLine<$line> for $key {
                type EltCountMax = $max;
                type ChildrenPerNode = Add1<$max>;
            }
        )*
    };
}

#[cfg(target_pointer_width = "64")]
mod impls {
    use super::{CacheLine128, CacheLine64, FitsCacheLine};
    use typenum::{Add1, U119, U13, U14, U27, U29, U3, U55, U59, U6, U7};

    // 64 - 8 - 1 = 55 bytes of key storage.
    fits_cache_line!(CacheLine64 {
        u8 => U55, i8 => U55, bool => U55,
        u16 => U27, i16 => U27,
        u32 => U13, i32 => U13, f32 => U13, char => U13,
        u64 => U6, i64 => U6, f64 => U6, usize => U6, isize => U6,
        u128 => U3, i128 => U3,
    });

    // 128 - 8 - 1 = 119 bytes of key storage.
    fits_cache_line!(CacheLine128 {
        u8 => U119, i8 => U119, bool => U119,
        u16 => U59, i16 => U59,
        u32 => U29, i32 => U29, f32 => U29, char => U29,
        u64 => U14, i64 => U14, f64 => U14, usize => U14, isize => U14,
        u128 => U7, i128 => U7,
    });
}

#[cfg(target_pointer_width = "32")]
mod impls {
    use super::{CacheLine128, CacheLine64, FitsCacheLine};
    use typenum::{Add1, U123, U14, U15, U29, U3, U30, U59, U61, U7};

    // 64 - 4 - 1 = 59 bytes of key storage.
    fits_cache_line!(CacheLine64 {
        u8 => U59, i8 => U59, bool => U59,
        u16 => U29, i16 => U29,
        u32 => U14, i32 => U14, f32 => U14, char => U14, usize => U14, isize => U14,
        u64 => U7, i64 => U7, f64 => U7,
        u128 => U3, i128 => U3,
    });

    // 128 - 4 - 1 = 123 bytes of key storage.
    fits_cache_line!(CacheLine128 {
        u8 => U123, i8 => U123, bool => U123,
        u16 => U61, i16 => U61,
        u32 => U30, i32 => U30, f32 => U30, char => U30, usize => U30, isize => U30,
        u64 => U15, i64 => U15, f64 => U15,
        u128 => U7, i128 => U7,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::mem::align_of;
    use typenum::Unsigned;

    fn assert_capacity<K: FitsCacheLine<L>, L: CacheLine>() {
        let expected = elt_count_max(size_of::<K>(), size_of::<usize>(), L::BYTES);
        assert_eq!(<EltCountMax<K, L> as Unsigned>::USIZE, expected);
        assert_eq!(<ChildrenPerNode<K, L> as Unsigned>::USIZE, expected + 1);
        // One more key would not fit.
        assert!(size_of::<usize>() + COUNT_BYTES + (expected + 1) * size_of::<K>() > L::BYTES);
    }

    #[test]
    fn test_elt_count_max_64_bit_pointers() {
        assert_eq!(elt_count_max(1, 8, 64), 55);
        assert_eq!(elt_count_max(4, 8, 64), 13);
        assert_eq!(elt_count_max(8, 8, 64), 6);
        assert_eq!(elt_count_max(16, 8, 64), 3);
        assert_eq!(children_per_node(4, 8, 64), 14);
    }

    #[test]
    fn test_elt_count_max_32_bit_pointers() {
        assert_eq!(elt_count_max(4, 4, 64), 14);
        assert_eq!(elt_count_max(8, 4, 64), 7);
        assert_eq!(elt_count_max(2, 4, 128), 61);
    }

    #[test]
    fn test_primitive_capacities_64() {
        assert_capacity::<u8, CacheLine64>();
        assert_capacity::<i16, CacheLine64>();
        assert_capacity::<u32, CacheLine64>();
        assert_capacity::<char, CacheLine64>();
        assert_capacity::<f64, CacheLine64>();
        assert_capacity::<usize, CacheLine64>();
        assert_capacity::<u128, CacheLine64>();
    }

    #[test]
    fn test_primitive_capacities_128() {
        assert_capacity::<bool, CacheLine128>();
        assert_capacity::<u16, CacheLine128>();
        assert_capacity::<i32, CacheLine128>();
        assert_capacity::<i64, CacheLine128>();
        assert_capacity::<i128, CacheLine128>();
    }

    #[test]
    fn test_align_markers() {
        assert_eq!(align_of::<Align64>(), CacheLine64::BYTES);
        assert_eq!(align_of::<Align128>(), CacheLine128::BYTES);
        assert_eq!(size_of::<[Align64; 0]>(), 0);
    }
}
