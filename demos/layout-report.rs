//! Prints node capacities and sizes for the supported key types.

use std::mem::size_of;

use typenum::Unsigned;

use cashew_set::layout::{
    elt_count_max, CacheLine, CacheLine128, CacheLine64, ChildrenPerNode, EltCountMax,
    FitsCacheLine,
};

fn row<K: FitsCacheLine<L>, L: CacheLine>(name: &str) {
    let computed = elt_count_max(size_of::<K>(), size_of::<usize>(), L::BYTES);
    let declared = <EltCountMax<K, L> as Unsigned>::USIZE;
    assert_eq!(computed, declared, "{name} on {}-byte lines", L::BYTES);

    let children = <ChildrenPerNode<K, L> as Unsigned>::USIZE;
    println!(
        "{:>5} {:>4} {:>8} {:>9} {:>12}",
        L::BYTES,
        name,
        declared,
        children,
        children * L::BYTES
    );
}

fn report<L: CacheLine>()
where
    u8: FitsCacheLine<L>,
    u16: FitsCacheLine<L>,
    u32: FitsCacheLine<L>,
    u64: FitsCacheLine<L>,
    u128: FitsCacheLine<L>,
    char: FitsCacheLine<L>,
    f64: FitsCacheLine<L>,
{
    row::<u8, L>("u8");
    row::<u16, L>("u16");
    row::<u32, L>("u32");
    row::<u64, L>("u64");
    row::<u128, L>("u128");
    row::<char, L>("char");
    row::<f64, L>("f64");
}

fn main() {
    println!("pointer width: {} bytes\n", size_of::<usize>());
    println!(" line  key capacity  children family bytes");
    report::<CacheLine64>();
    report::<CacheLine128>();
}
