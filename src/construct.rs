//! Typed construction on top of the [`crate::hook`].
//!
//! [`construct`] takes exactly enough storage for one `T` from the hook and moves
//! the value in; [`destroy`] drops it in place, releases the storage and clears
//! the caller's pointer. [`HookBox`] wraps the pair into an owning pointer.
//!
//! Types that should only ever live in hook memory implement [`Restricted`].
//! Their constructor takes a [`FactoryToken`], which only this module can mint,
//! so [`construct_restricted`] is the one way to build them.

use std::{
    fmt, mem,
    ops::{Deref, DerefMut},
    ptr::NonNull,
};

use log::warn;

use crate::{
    hook,
    utils::{DEFAULT_ALIGNMENT, align, is_aligned},
};

/// Bytes requested from the hook for one `T`.
#[inline]
const fn storage_size<T>() -> usize {
    align(if mem::size_of::<T>() == 0 { 1 } else { mem::size_of::<T>() }, DEFAULT_ALIGNMENT)
}

/// Hands the storage back to the hook if the initializer unwinds.
struct ReleaseOnUnwind(NonNull<u8>);

impl Drop for ReleaseOnUnwind {
    fn drop(&mut self) {
        unsafe { hook::release(self.0) }
    }
}

/// Moves `value` into storage obtained from the hook.
///
/// Returns None if the hook has no memory to give, in which case `value` is dropped.
pub fn construct<T>(value: T) -> Option<NonNull<T>> {
    construct_with(|| value)
}

/// Obtains storage for one `T` from the hook and, only if that worked, runs
/// `init` to build the value in it.
///
/// `init` can capture any number of constructor arguments:
///
/// ```
/// # blockpool::hook::install_system_handlers();
/// let mut pair = blockpool::construct_with(|| (String::from("id"), 4u8));
/// assert!(pair.is_some());
/// unsafe { blockpool::destroy(&mut pair) };
/// ```
///
/// Types aligned beyond [`DEFAULT_ALIGNMENT`] are refused with None unless the
/// handler happens to return suitably aligned memory.
pub fn construct_with<T, F: FnOnce() -> T>(init: F) -> Option<NonNull<T>> {
    let memory = hook::allocate(storage_size::<T>())?;

    if !is_aligned(memory, mem::align_of::<T>()) {
        warn!(
            "hook returned {memory:p}, which can't hold a {} (align {})",
            std::any::type_name::<T>(),
            mem::align_of::<T>()
        );
        unsafe { hook::release(memory) };
        return None;
    }

    let guard = ReleaseOnUnwind(memory);
    let value = init();
    mem::forget(guard);

    let instance = memory.cast::<T>();
    unsafe { instance.as_ptr().write(value) };

    Some(instance)
}

/// Drops the instance held by `instance`, releases its storage to the hook and
/// sets `instance` to None. Does nothing if `instance` is already None, so
/// destroying twice through the same handle is harmless.
///
/// **SAFETY**: a `Some` handle must come from one of the `construct` functions and
/// must not be aliased by any other live pointer.
pub unsafe fn destroy<T>(instance: &mut Option<NonNull<T>>) {
    if let Some(object) = instance.take() {
        unsafe {
            object.as_ptr().drop_in_place();
            hook::release(object.cast());
        }
    }
}

/// Proof that the value is being built by [`construct_restricted`].
///
/// The private field keeps anything outside this module from creating one.
#[derive(Debug)]
pub struct FactoryToken {
    _private: (),
}

/// A type that can only be created through [`construct_restricted`].
///
/// ```
/// use blockpool::{FactoryToken, Restricted};
///
/// pub struct Session {
///     id: u32,
/// }
///
/// impl Restricted for Session {
///     type Args = u32;
///
///     fn build(_token: FactoryToken, id: u32) -> Self {
///         Session { id }
///     }
/// }
///
/// # blockpool::hook::install_system_handlers();
/// let session = blockpool::HookBox::<Session>::new_restricted(7).unwrap();
/// assert_eq!(7, session.id);
/// ```
pub trait Restricted: Sized {
    /// Constructor arguments, a tuple when there are several.
    type Args;

    fn build(token: FactoryToken, args: Self::Args) -> Self;
}

/// Builds a [`Restricted`] type in hook memory.
pub fn construct_restricted<T: Restricted>(args: T::Args) -> Option<NonNull<T>> {
    construct_with(|| T::build(FactoryToken { _private: () }, args))
}

/// Owning pointer to a `T` living in hook memory.
///
/// Dropping it is the same as calling [`destroy`].
pub struct HookBox<T> {
    instance: Option<NonNull<T>>,
}

impl<T> HookBox<T> {
    /// None if the hook has no memory to give.
    pub fn new(value: T) -> Option<Self> {
        Self::new_with(|| value)
    }

    pub fn new_with<F: FnOnce() -> T>(init: F) -> Option<Self> {
        construct_with(init).map(|instance| Self { instance: Some(instance) })
    }

    /// Takes ownership of a pointer produced by [`construct`] or one of its siblings.
    ///
    /// **SAFETY**: `instance` must not be destroyed or owned by anything else.
    pub unsafe fn from_raw(instance: NonNull<T>) -> Self {
        Self { instance: Some(instance) }
    }

    /// Gives up ownership. The caller becomes responsible for calling [`destroy`].
    pub fn into_raw(mut self) -> NonNull<T> {
        // `new*` and `from_raw` always fill the handle, only `into_raw` and
        // `drop` empty it.
        let instance = self.instance.take();
        mem::forget(self);
        match instance {
            Some(instance) => instance,
            None => unreachable!("HookBox without an instance"),
        }
    }

    #[inline]
    fn pointer(&self) -> NonNull<T> {
        match self.instance {
            Some(instance) => instance,
            None => unreachable!("HookBox without an instance"),
        }
    }
}

impl<T: Restricted> HookBox<T> {
    pub fn new_restricted(args: T::Args) -> Option<Self> {
        construct_restricted(args).map(|instance| Self { instance: Some(instance) })
    }
}

impl<T> Deref for HookBox<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        unsafe { self.pointer().as_ref() }
    }
}

impl<T> DerefMut for HookBox<T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        unsafe { self.pointer().as_mut() }
    }
}

impl<T> Drop for HookBox<T> {
    fn drop(&mut self) {
        unsafe { destroy(&mut self.instance) }
    }
}

impl<T: fmt::Debug> fmt::Debug for HookBox<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}
