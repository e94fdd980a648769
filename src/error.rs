use thiserror::Error;

/// Errors reported by the pool backed containers.
///
/// The raw layers ([`crate::hook`], [`crate::FixedSizeBlocks`], [`crate::ObjectPool`])
/// report a missing block with `None` instead, this type only exists for the
/// containers built on top of them.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Every node of the container's pool is in use.
    #[error("node pool exhausted: all {capacity} entries are in use")]
    Exhausted {
        /// Fixed capacity of the container.
        capacity: usize,
    },

    /// The backing region of the container's pool could not be obtained.
    #[error("backing region of {size} bytes could not be obtained")]
    RegionUnavailable {
        /// Bytes the pool asked its allocator for.
        size: usize,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
