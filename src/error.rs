use allocator_api2::alloc::Layout;
use thiserror::Error;

/// Failures reported by the set.
///
/// Every failure that reaches the caller of `insert` has already discarded
/// the whole tree: the set is empty and usable again.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CashewError {
    /// A node violated the depth, count or leaf invariants.
    #[error("cashew set corrupted: {0}")]
    Corrupted(&'static str),

    /// The allocator returned a child family that is not aligned to the
    /// cache line.
    #[error("allocator returned family at {addr:#x}, not aligned to {align} bytes")]
    Misaligned { addr: usize, align: usize },

    /// The allocator could not provide a child family.
    #[error("failed to allocate {} bytes for a child family", .layout.size())]
    AllocFailed { layout: Layout },
}

pub type Result<T> = core::result::Result<T, CashewError>;

/// Turns a failed set operation into a panic, for the infallible std traits.
pub trait CashewResultExt<T> {
    /// Unwraps the value. Allocation failures go to
    /// [`alloc::alloc::handle_alloc_error`]; anything else panics.
    fn handle_error(self) -> T;
}

impl<T> CashewResultExt<T> for Result<T> {
    #[track_caller]
    fn handle_error(self) -> T {
        match self {
            Ok(value) => value,
            Err(CashewError::AllocFailed { layout }) => alloc::alloc::handle_alloc_error(layout),
            Err(err) => panic!("{err}"),
        }
    }
}
