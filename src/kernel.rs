//! Platform memory. Everything that talks to the operating system lives here so the
//! rest of the crate only sees [`Allocator`] and the [`crate::hook`] handlers.

use std::{
    ptr::NonNull,
    sync::atomic::{AtomicUsize, Ordering},
};

use crate::{allocator::Allocator, utils::checked_align};

/// Virtual memory page size of the computer, cached after the first query.
/// This value should be a constant, but we can't do that since we
/// don't know the value at compile time.
static PAGE_SIZE: AtomicUsize = AtomicUsize::new(0);

/// Zero sized handle the platform implementations hang off.
pub(crate) struct Kernel;

/// This trait provides an abstraction to handle low level memory operations
/// and syscalls. The pools have nothing to do with the concrete
/// implementations / APIs offered by each kernel.
trait PlatformMemory {
    /// Request a memory region of size `len`. It returns a pointer to the
    /// given location or None if the underlying syscall fails.
    unsafe fn request_memory(len: usize) -> Option<NonNull<u8>>;

    /// Returns the memory of size `len` starting from `addr` back to the kernel.
    unsafe fn return_memory(addr: NonNull<u8>, len: usize);

    /// Returns the virtual memory page size of the computer in bytes.
    unsafe fn page_size() -> usize;

    /// Takes `size` bytes from the process heap.
    unsafe fn heap_allocate(size: usize) -> Option<NonNull<u8>>;

    /// Gives memory obtained through [`PlatformMemory::heap_allocate`] back to the process heap.
    unsafe fn heap_release(addr: NonNull<u8>);
}

/// Wrapper to calculate the computer's page size.
#[inline]
pub fn page_size() -> usize {
    match PAGE_SIZE.load(Ordering::Relaxed) {
        0 => {
            let size = unsafe { Kernel::page_size() };
            PAGE_SIZE.store(size, Ordering::Relaxed);
            size
        }
        size => size,
    }
}

/// Wrapper to use [`PlatformMemory::heap_allocate`]
#[inline]
pub(crate) fn heap_allocate(size: usize) -> Option<NonNull<u8>> {
    unsafe { Kernel::heap_allocate(size) }
}

/// Wrapper to use [`PlatformMemory::heap_release`]
#[inline]
pub(crate) unsafe fn heap_release(addr: NonNull<u8>) {
    unsafe { Kernel::heap_release(addr) }
}

#[cfg(unix)]
mod unix {
    use super::{Kernel, PlatformMemory};

    use libc::{mmap, munmap, off_t, size_t};

    use std::{
        os::raw::{c_int, c_void},
        ptr::NonNull,
    };

    impl PlatformMemory for Kernel {
        unsafe fn request_memory(len: usize) -> Option<NonNull<u8>> {
            // mmap parameters.
            const ADDR: *mut c_void = std::ptr::null_mut::<c_void>();
            // Read-Write only memory.
            const PROT: c_int = libc::PROT_READ | libc::PROT_WRITE;
            const FLAGS: c_int = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS;
            const FD: c_int = -1;
            const OFFSET: off_t = 0;

            unsafe {
                match mmap(ADDR, len as size_t, PROT, FLAGS, FD, OFFSET) {
                    libc::MAP_FAILED => None,
                    addr => NonNull::new(addr.cast::<u8>()),
                }
            }
        }

        unsafe fn return_memory(addr: NonNull<u8>, len: usize) {
            unsafe {
                munmap(addr.as_ptr().cast::<c_void>(), len as size_t);
            }
        }

        unsafe fn page_size() -> usize {
            unsafe { libc::sysconf(libc::_SC_PAGE_SIZE) as usize }
        }

        unsafe fn heap_allocate(size: usize) -> Option<NonNull<u8>> {
            unsafe { NonNull::new(libc::malloc(size as size_t).cast::<u8>()) }
        }

        unsafe fn heap_release(addr: NonNull<u8>) {
            unsafe { libc::free(addr.as_ptr().cast::<c_void>()) }
        }
    }
}

#[cfg(windows)]
mod windows {
    use std::{mem::MaybeUninit, os::raw::c_void, ptr::NonNull};

    use super::{Kernel, PlatformMemory};

    use ::windows::Win32::System::{Memory, SystemInformation};

    impl PlatformMemory for Kernel {
        unsafe fn request_memory(len: usize) -> Option<NonNull<u8>> {
            // Read-Write only.
            let protection = Memory::PAGE_READWRITE;

            let flags = Memory::MEM_RESERVE | Memory::MEM_COMMIT;

            unsafe {
                let addr = Memory::VirtualAlloc(None, len, flags, protection);

                NonNull::new(addr.cast())
            }
        }

        unsafe fn return_memory(addr: NonNull<u8>, _len: usize) {
            unsafe {
                let _ = Memory::VirtualFree(addr.as_ptr().cast::<c_void>(), 0, Memory::MEM_RELEASE);
            }
        }

        unsafe fn page_size() -> usize {
            unsafe {
                let mut system_info = MaybeUninit::uninit();
                SystemInformation::GetSystemInfo(system_info.as_mut_ptr());

                system_info.assume_init().dwPageSize as usize
            }
        }

        unsafe fn heap_allocate(size: usize) -> Option<NonNull<u8>> {
            unsafe {
                let heap = Memory::GetProcessHeap().ok()?;

                NonNull::new(Memory::HeapAlloc(heap, Memory::HEAP_NONE, size).cast())
            }
        }

        unsafe fn heap_release(addr: NonNull<u8>) {
            unsafe {
                if let Ok(heap) = Memory::GetProcessHeap() {
                    let _ = Memory::HeapFree(
                        heap,
                        Memory::HEAP_NONE,
                        Some(addr.as_ptr().cast_const().cast::<c_void>()),
                    );
                }
            }
        }
    }
}

/// An [`Allocator`] that maps whole pages straight from the kernel.
///
/// Every request is rounded up to a multiple of [`page_size`], so this is only
/// worth it for the large single region a pool asks for once. The returned memory
/// is page aligned, which covers any block alignment a pool can ask for up to a page.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PageAllocator;

impl Allocator for PageAllocator {
    fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
        if size == 0 {
            return None;
        }

        let len = checked_align(size, page_size())?;
        unsafe { Kernel::request_memory(len) }
    }

    unsafe fn deallocate(&self, memory: NonNull<u8>, size: usize) {
        // `allocate` only succeeds for sizes that round up without overflowing.
        if let Some(len) = checked_align(size, page_size()) {
            unsafe { Kernel::return_memory(memory, len) }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::is_aligned;

    #[test]
    fn page_size_is_a_cached_power_of_two() {
        let size = page_size();

        assert!(size.is_power_of_two());
        assert_eq!(size, page_size());
    }

    #[test]
    fn page_allocation_is_writable_and_page_aligned() {
        let allocator = PageAllocator;

        unsafe {
            let memory = allocator.allocate(100).expect("mmap failed");
            assert!(is_aligned(memory, page_size()));

            // The whole rounded up page is usable.
            memory.as_ptr().write(23);
            memory.as_ptr().add(page_size() - 1).write(45);
            assert_eq!(23, *memory.as_ptr());
            assert_eq!(45, *memory.as_ptr().add(page_size() - 1));

            allocator.deallocate(memory, 100);
        }
    }

    #[test]
    fn empty_page_request_fails() {
        assert!(PageAllocator.allocate(0).is_none());
    }

    #[test]
    fn request_past_the_last_page_fails() {
        assert!(PageAllocator.allocate(usize::MAX).is_none());
        assert!(PageAllocator.allocate(usize::MAX - page_size() + 2).is_none());
    }

    #[test]
    fn heap_round_trip() {
        let memory = heap_allocate(32).expect("heap allocation failed");

        unsafe {
            memory.cast::<u64>().as_ptr().write(0xFEED);
            assert_eq!(0xFEED, *memory.cast::<u64>().as_ptr());
            heap_release(memory);
        }
    }
}
