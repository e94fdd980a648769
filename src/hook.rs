//! Process wide allocation hook.
//!
//! The embedding application decides where memory comes from by installing an
//! allocate and a release handler, usually once at start up. Until both are
//! installed every [`allocate`] returns None and every [`release`] does nothing.
//!
//! ```text
//!   FixedSizeBlocks ---> HookAllocator ---+
//!                                         |---> allocate handler ---> memory
//!   construct / destroy ------------------+---> release handler
//! ```
//!
//! Handlers are stored as atomics only so the statics are `Sync`. Nothing else in
//! the crate is thread safe, and swapping handlers while memory obtained from the
//! previous ones is still alive is the caller's business: that memory must be
//! released through a handler able to take it.

use std::{
    mem,
    ptr::{self, NonNull},
    sync::atomic::{AtomicPtr, Ordering},
};

use log::debug;

use crate::kernel;

/// Function that hands out `size` bytes, or None if it can't.
///
/// Returned memory must be aligned to at least [`crate::utils::DEFAULT_ALIGNMENT`].
pub type AllocateHandler = fn(size: usize) -> Option<NonNull<u8>>;

/// Function that takes back memory produced by the matching [`AllocateHandler`].
pub type ReleaseHandler = unsafe fn(memory: NonNull<u8>);

static ALLOCATE_HANDLER: AtomicPtr<()> = AtomicPtr::new(ptr::null_mut());
static RELEASE_HANDLER: AtomicPtr<()> = AtomicPtr::new(ptr::null_mut());

#[inline]
fn load_allocate(raw: *mut ()) -> Option<AllocateHandler> {
    if raw.is_null() {
        return None;
    }
    // Only ever stored from an `AllocateHandler` in `set_allocate_handler`.
    Some(unsafe { mem::transmute::<*mut (), AllocateHandler>(raw) })
}

#[inline]
fn load_release(raw: *mut ()) -> Option<ReleaseHandler> {
    if raw.is_null() {
        return None;
    }
    // Only ever stored from a `ReleaseHandler` in `set_release_handler`.
    Some(unsafe { mem::transmute::<*mut (), ReleaseHandler>(raw) })
}

/// Installs `handler` as the process wide allocate function, replacing the
/// previous one, which is returned. Passing None removes it.
///
/// Memory already handed out is not affected.
pub fn set_allocate_handler(handler: Option<AllocateHandler>) -> Option<AllocateHandler> {
    let raw = handler.map_or(ptr::null_mut(), |handler| handler as *mut ());
    debug!("allocate handler {}", if raw.is_null() { "removed" } else { "installed" });

    load_allocate(ALLOCATE_HANDLER.swap(raw, Ordering::AcqRel))
}

/// Installs `handler` as the process wide release function, replacing the
/// previous one, which is returned. Passing None removes it.
pub fn set_release_handler(handler: Option<ReleaseHandler>) -> Option<ReleaseHandler> {
    let raw = handler.map_or(ptr::null_mut(), |handler| handler as *mut ());
    debug!("release handler {}", if raw.is_null() { "removed" } else { "installed" });

    load_release(RELEASE_HANDLER.swap(raw, Ordering::AcqRel))
}

/// Tells whether both an allocate and a release handler are installed.
pub fn is_configured() -> bool {
    !ALLOCATE_HANDLER.load(Ordering::Acquire).is_null()
        && !RELEASE_HANDLER.load(Ordering::Acquire).is_null()
}

/// Allocates `size` bytes through the installed handler.
///
/// Returns None if no handler is installed or if the handler itself fails.
#[inline]
pub fn allocate(size: usize) -> Option<NonNull<u8>> {
    load_allocate(ALLOCATE_HANDLER.load(Ordering::Acquire)).and_then(|handler| handler(size))
}

/// Releases `memory` through the installed handler. Does nothing if there is none.
///
/// **SAFETY**: `memory` must have been returned by [`allocate`] while a compatible
/// allocate handler was installed, and must not be used or released again.
#[inline]
pub unsafe fn release(memory: NonNull<u8>) {
    if let Some(handler) = load_release(RELEASE_HANDLER.load(Ordering::Acquire)) {
        unsafe { handler(memory) }
    }
}

/// Allocate handler backed by the process heap (`malloc` / `HeapAlloc`).
pub fn system_allocate(size: usize) -> Option<NonNull<u8>> {
    kernel::heap_allocate(size)
}

/// Release handler matching [`system_allocate`].
///
/// **SAFETY**: `memory` must come from [`system_allocate`].
pub unsafe fn system_release(memory: NonNull<u8>) {
    unsafe { kernel::heap_release(memory) }
}

/// Installs [`system_allocate`] and [`system_release`] as the process wide handlers.
pub fn install_system_handlers() {
    set_allocate_handler(Some(system_allocate));
    set_release_handler(Some(system_release));
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::cell::Cell;

    thread_local! {
        static RELEASED: Cell<usize> = const { Cell::new(0) };
    }

    fn failing_allocate(_size: usize) -> Option<NonNull<u8>> {
        None
    }

    unsafe fn counting_release(memory: NonNull<u8>) {
        RELEASED.with(|released| released.set(released.get() + 1));
        unsafe { system_release(memory) }
    }

    /// Runs `f` with both handlers removed and puts the previous ones back afterwards.
    fn without_handlers(f: impl FnOnce()) {
        let allocate = set_allocate_handler(None);
        let release = set_release_handler(None);
        f();
        set_allocate_handler(allocate);
        set_release_handler(release);
    }

    #[test]
    #[serial(hook)]
    fn unconfigured_hook_fails_closed() {
        without_handlers(|| {
            assert!(!is_configured());
            assert!(allocate(16).is_none());

            // Releasing with no handler is a no-op, so handing in a dangling
            // pointer is harmless here.
            unsafe { release(NonNull::dangling()) };
        });
    }

    #[test]
    #[serial(hook)]
    fn system_handlers_allocate_usable_memory() {
        install_system_handlers();
        assert!(is_configured());

        let memory = allocate(64).expect("system allocation failed");
        unsafe {
            memory.cast::<u64>().as_ptr().write(23);
            assert_eq!(23, *memory.cast::<u64>().as_ptr());
            release(memory);
        }
    }

    #[test]
    #[serial(hook)]
    fn failing_handler_yields_none() {
        install_system_handlers();
        let previous = set_allocate_handler(Some(failing_allocate));

        assert!(previous.is_some());
        assert!(allocate(8).is_none());

        set_allocate_handler(previous);
        assert!(allocate(8).map(|memory| unsafe { release(memory) }).is_some());
    }

    #[test]
    #[serial(hook)]
    fn release_is_delegated_to_the_installed_handler() {
        install_system_handlers();
        let previous = set_release_handler(Some(counting_release));

        let before = RELEASED.with(Cell::get);
        let memory = allocate(8).expect("system allocation failed");
        unsafe { release(memory) };
        assert_eq!(before + 1, RELEASED.with(Cell::get));

        set_release_handler(previous);
    }
}
