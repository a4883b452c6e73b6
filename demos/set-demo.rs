//! Walk through the wrapper API, with the set's own logging turned on.
//!
//! Run with `RUST_LOG=cashew_set=debug cargo run --example set-demo` to see
//! root splits, or `trace` to see every family allocation.

use cashew_set::{CacheLine128, CashewError, CashewSet, FnOrder};
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;

fn main() -> Result<(), CashewError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).with_target(false).init();

    println!("=== Basic usage ===\n");

    let mut set: CashewSet<u32> = CashewSet::new();
    for key in [42, 7, 19, 7] {
        let inserted = set.insert(key)?;
        println!("insert({key}) -> {inserted}");
    }
    println!("len = {}, count(19) = {}, count(20) = {}", set.len(), set.count(&19), set.count(&20));

    println!("\n=== Growing the tree ===\n");

    for key in 0..5_000 {
        set.insert(key * 2 + 1)?;
        if key % 1_000 == 0 {
            println!("len = {:>5}, depth = {}", set.len(), set.depth());
        }
    }
    set.check()?;
    println!("audit passed at len = {}", set.len());

    println!("\n=== Custom order, 128-byte lines ===\n");

    let by_len = FnOrder::new(|a: &u64, b: &u64| a.count_ones() < b.count_ones());
    let mut popcounts: CashewSet<u64, CacheLine128, _> = CashewSet::with_order(by_len);
    for key in [0b1, 0b10, 0b11, 0b101, 0b111, u64::MAX] {
        popcounts.insert(key)?;
    }
    println!("keys with distinct popcounts: {}", popcounts.len());

    println!("\n=== Graphviz ===\n");

    let small: CashewSet<u8> = (0..20).collect();
    match small.to_dot() {
        Ok(dot) => println!("{dot}"),
        Err(err) => eprintln!("to_dot failed: {err}"),
    }

    Ok(())
}
