//! Fixed capacity memory pools and the containers built on them.
//!
//! Everything starts at the [`hook`]: a pair of process wide handlers that say
//! where memory comes from and where it goes back to. On top of it:
//!
//! - [`FixedSizeBlocks`] carves one region into equally sized blocks kept on an
//!   embedded free list, so allocating and freeing a block are O(1).
//! - [`ObjectPool`] does the same for blocks sized and aligned for one type.
//! - [`construct`] and [`destroy`] place single values in hook memory, and
//!   [`HookBox`] owns one.
//! - [`List`] and [`Dictionary`] take every node from their own pool, so their
//!   capacity is fixed when they are created.
//!
//! Pools draw their region through the [`Allocator`] trait. The default,
//! [`HookAllocator`], goes through the hook; [`PageAllocator`] maps pages from
//! the kernel directly.
//!
//! ```
//! use blockpool::{hook, Dictionary};
//!
//! hook::install_system_handlers();
//!
//! let mut ports = Dictionary::new(4)?;
//! ports.insert("http", 80)?;
//! ports.insert("ssh", 22)?;
//!
//! assert_eq!(Some(&22), ports.get("ssh"));
//! # Ok::<(), blockpool::Error>(())
//! ```

pub mod allocator;
pub mod blocks;
pub mod config;
pub mod construct;
pub mod dictionary;
pub mod error;
pub mod hook;
pub mod kernel;
pub mod list;
pub mod pool;
pub mod utils;

pub use allocator::{Allocator, HookAllocator};
pub use blocks::FixedSizeBlocks;
pub use config::PoolConfig;
pub use construct::{FactoryToken, HookBox, Restricted, construct, construct_restricted, construct_with, destroy};
pub use dictionary::Dictionary;
pub use error::{Error, Result};
pub use kernel::{PageAllocator, page_size};
pub use list::{CursorMut, List};
pub use pool::ObjectPool;
pub use utils::{DEFAULT_ALIGNMENT, align};
