use rand::Rng;

use allocated::{CountingAllocator, DropIn};

use cashew_set::{AllocatedCashewSet, CashewError};

fn main() -> Result<(), CashewError> {
    let mut rng = rand::thread_rng();

    for i in 0..20 {
        let alloc = CountingAllocator::default();
        let mut set = AllocatedCashewSet::<u32>::default();

        for _ in 0..10_000 {
            let k: u32 = rng.gen();

            unsafe {
                set.insert_in(&alloc, k)?;
            }

            println!(
                "{},{},{},{},{}",
                i,
                set.len(),
                set.depth(),
                alloc.n_allocations(),
                alloc.n_bytes_allocated()
            );
        }

        set.check()?;
        unsafe { set.drop_in(&alloc) };

        assert_eq!(alloc.net_allocations(), 0);
        assert_eq!(alloc.net_bytes_allocated(), 0);
    }

    Ok(())
}
