use core::mem::MaybeUninit;
use core::ptr;

/// Drops the initialised values in `slots`.
///
/// # Safety
///
/// Every slot must be initialised and must not be read or dropped again.
pub unsafe fn drop_slots<V>(slots: &mut [MaybeUninit<V>]) {
    // SAFETY: MaybeUninit<V> has the same layout as V and the caller
    // guarantees every slot holds a live value.
    unsafe {
        ptr::drop_in_place(ptr::from_mut(slots) as *mut [V]);
    }
}

/// Views the initialised prefix of a slot array.
///
/// # Safety
///
/// Every slot in `slots` must be initialised.
pub unsafe fn live_slots<V>(slots: &[MaybeUninit<V>]) -> &[V] {
    // SAFETY: MaybeUninit<V> has the same layout as V; caller guarantees
    // the values are initialised.
    unsafe { &*(ptr::from_ref(slots) as *const [V]) }
}

/// Moves values out of a run of initialised slots, front to back.
///
/// The slots handed to a `Drain` are owned by it: values not taken by the
/// time it is dropped (for example because a comparison panicked) are
/// dropped in place, so each value is either moved out once or dropped once.
pub struct Drain<'a, V> {
    slots: &'a mut [MaybeUninit<V>],
    next: usize,
}

impl<'a, V> Drain<'a, V> {
    /// # Safety
    ///
    /// Every slot must be initialised, and the previous owner must have
    /// stopped counting them as live.
    pub unsafe fn new(slots: &'a mut [MaybeUninit<V>]) -> Self {
        Self { slots, next: 0 }
    }

    pub fn peek(&self) -> Option<&V> {
        let slot = self.slots.get(self.next)?;
        // SAFETY: slots at or after `next` have not been taken yet.
        Some(unsafe { slot.assume_init_ref() })
    }

    pub fn take(&mut self) -> Option<V> {
        let slot = self.slots.get(self.next)?;
        self.next += 1;
        // SAFETY: the slot was live, and advancing `next` first hands
        // ownership to the caller.
        Some(unsafe { slot.assume_init_read() })
    }
}

impl<V> Drop for Drain<'_, V> {
    fn drop(&mut self) {
        // SAFETY: slots at or after `next` are still live and nobody else
        // will touch them.
        unsafe { drop_slots(&mut self.slots[self.next..]) }
    }
}

/// Stable in-place partition of a run of initialised slots.
///
/// Values accepted by [`Retain::keep`] are compacted to the front; values
/// passed over by [`Retain::take`] are moved out to the caller. The live
/// count is written back through `len` on drop: on an early exit the kept
/// prefix stays counted and the unvisited tail is dropped.
pub struct Retain<'a, V> {
    slots: &'a mut [MaybeUninit<V>],
    len: &'a mut u8,
    read: usize,
    kept: usize,
    end: usize,
}

impl<'a, V> Retain<'a, V> {
    /// # Safety
    ///
    /// `slots[..*len]` must be initialised and owned by whoever owns `len`.
    pub unsafe fn new(slots: &'a mut [MaybeUninit<V>], len: &'a mut u8) -> Self {
        let end = usize::from(*len);
        *len = 0;
        Self {
            slots,
            len,
            read: 0,
            kept: 0,
            end,
        }
    }

    pub fn peek(&self) -> Option<&V> {
        if self.read == self.end {
            return None;
        }
        // SAFETY: `read < end`, and slots in `read..end` are untouched.
        Some(unsafe { self.slots[self.read].assume_init_ref() })
    }

    /// Keeps the current value, moving it down to the compacted prefix.
    pub fn keep(&mut self) {
        debug_assert!(self.read < self.end);
        // SAFETY: `read` is live and `kept <= read`; `copy` tolerates the
        // two being equal.
        unsafe {
            let base = self.slots.as_mut_ptr();
            ptr::copy(base.add(self.read), base.add(self.kept), 1);
        }
        self.read += 1;
        self.kept += 1;
    }

    /// Moves the current value out.
    pub fn take(&mut self) -> V {
        debug_assert!(self.read < self.end);
        // SAFETY: `read` is live; advancing it hands ownership to the caller.
        let value = unsafe { self.slots[self.read].assume_init_read() };
        self.read += 1;
        value
    }
}

impl<V> Drop for Retain<'_, V> {
    fn drop(&mut self) {
        // SAFETY: `read..end` was never visited and is still live.
        unsafe { drop_slots(&mut self.slots[self.read..self.end]) }
        // `kept <= end <= u8::MAX` because `end` came from a u8.
        *self.len = self.kept as u8;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::rc::Rc;
    use alloc::vec::Vec;

    fn filled(values: &[Rc<u32>]) -> Vec<MaybeUninit<Rc<u32>>> {
        values.iter().map(|v| MaybeUninit::new(Rc::clone(v))).collect()
    }

    #[test]
    fn test_drain_drops_untaken() {
        let values: Vec<_> = (0..4).map(Rc::new).collect();
        let mut slots = filled(&values);

        {
            let mut drain = unsafe { Drain::new(&mut slots) };
            assert_eq!(drain.peek().map(|v| **v), Some(0));
            let first = drain.take().unwrap();
            assert_eq!(*first, 0);
        }

        assert!(values.iter().all(|v| Rc::strong_count(v) == 1));
    }

    #[test]
    fn test_retain_partitions_stably() {
        let values: Vec<_> = (0..6).map(Rc::new).collect();
        let mut slots = filled(&values);
        let mut len = 6u8;
        let mut taken = Vec::new();

        {
            let mut retain = unsafe { Retain::new(&mut slots, &mut len) };
            while let Some(v) = retain.peek() {
                if **v % 2 == 0 {
                    retain.keep();
                } else {
                    taken.push(retain.take());
                }
            }
        }

        assert_eq!(len, 3);
        let kept: Vec<u32> = unsafe { live_slots(&slots[..3]) }.iter().map(|v| **v).collect();
        assert_eq!(kept, [0, 2, 4]);
        assert_eq!(taken.iter().map(|v| **v).collect::<Vec<_>>(), [1, 3, 5]);

        unsafe { drop_slots(&mut slots[..3]) };
        drop(taken);
        assert!(values.iter().all(|v| Rc::strong_count(v) == 1));
    }

    #[test]
    fn test_retain_early_exit_keeps_prefix() {
        let values: Vec<_> = (0..5).map(Rc::new).collect();
        let mut slots = filled(&values);
        let mut len = 5u8;

        {
            let mut retain = unsafe { Retain::new(&mut slots, &mut len) };
            retain.keep();
            let _ = retain.take();
            retain.keep();
        }

        assert_eq!(len, 2);
        let kept: Vec<u32> = unsafe { live_slots(&slots[..2]) }.iter().map(|v| **v).collect();
        assert_eq!(kept, [0, 2]);
        unsafe { drop_slots(&mut slots[..2]) };
        assert!(values.iter().all(|v| Rc::strong_count(v) == 1));
    }
}
