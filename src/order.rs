//! Ordering and equality predicates used by the set.

use core::fmt;

/// Caller-supplied ordering for keys.
///
/// Both predicates must be consistent with one total order and must give the
/// same answer every time they are asked about the same pair. They are called
/// many times per insert, so they should be cheap.
pub trait KeyOrder<K> {
    /// Returns `true` if `a` sorts strictly before `b`.
    fn less(&self, a: &K, b: &K) -> bool;

    /// Returns `true` if `a` and `b` are the same key.
    fn equal(&self, a: &K, b: &K) -> bool;
}

/// Ordering given by the key's own [`Ord`] implementation.
#[derive(Clone, Copy, Debug, Default)]
pub struct NaturalOrder;

impl<K: Ord> KeyOrder<K> for NaturalOrder {
    #[inline]
    fn less(&self, a: &K, b: &K) -> bool {
        a < b
    }

    #[inline]
    fn equal(&self, a: &K, b: &K) -> bool {
        a == b
    }
}

/// Ordering given by a strict "less than" closure. Two keys are equal when
/// neither is less than the other.
///
/// ```
/// use cashew_set::{CashewSet, CacheLine64, FnOrder};
///
/// // Largest first.
/// let order = FnOrder::new(|a: &i32, b: &i32| a > b);
/// let mut set: CashewSet<i32, CacheLine64, _> = CashewSet::with_order(order);
/// assert!(set.insert(3)?);
/// assert!(!set.insert(3)?);
/// # Ok::<(), cashew_set::CashewError>(())
/// ```
#[derive(Clone, Copy, Default)]
pub struct FnOrder<F>(F);

impl<F> FnOrder<F> {
    pub const fn new(less: F) -> Self {
        Self(less)
    }
}

impl<F> fmt::Debug for FnOrder<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FnOrder").field(&"<closure>").finish()
    }
}

impl<K, F: Fn(&K, &K) -> bool> KeyOrder<K> for FnOrder<F> {
    #[inline]
    fn less(&self, a: &K, b: &K) -> bool {
        (self.0)(a, b)
    }

    #[inline]
    fn equal(&self, a: &K, b: &K) -> bool {
        !(self.0)(a, b) && !(self.0)(b, a)
    }
}

impl<K, O: KeyOrder<K> + ?Sized> KeyOrder<K> for &O {
    #[inline]
    fn less(&self, a: &K, b: &K) -> bool {
        (**self).less(a, b)
    }

    #[inline]
    fn equal(&self, a: &K, b: &K) -> bool {
        (**self).equal(a, b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_natural_order() {
        assert!(NaturalOrder.less(&1, &2));
        assert!(!NaturalOrder.less(&2, &2));
        assert!(NaturalOrder.equal(&'a', &'a'));
        assert!(!NaturalOrder.equal(&'a', &'b'));
    }

    #[test]
    fn test_fn_order_derives_equality() {
        let by_abs = FnOrder::new(|a: &i32, b: &i32| a.abs() < b.abs());
        assert!(by_abs.less(&1, &-2));
        assert!(by_abs.equal(&-3, &3));
        assert!(!by_abs.equal(&-3, &4));
    }

    #[test]
    fn test_order_by_reference() {
        let order = NaturalOrder;
        let by_ref = &order;
        assert!(KeyOrder::<u8>::less(&by_ref, &1, &2));
    }
}
