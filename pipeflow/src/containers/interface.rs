//! Attribute container interface and shared container references.

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::any::Any;
use std::fmt::{self, Debug};
use std::sync::Arc;

/// A typed unit of data exchanged between modules through the store.
///
/// The type tag is fixed per Rust type, never per instance, and must be
/// unique across all container types used in one store.
///
/// ```rust,ignore
/// #[derive(Debug, Clone, PartialEq)]
/// struct Hostname { value: String }
///
/// impl AttributeContainer for Hostname {
///     const CONTAINER_TYPE: &'static str = "hostname";
/// }
/// ```
pub trait AttributeContainer: Any + Send + Sync + Debug {
    /// Tag identifying this kind of container.
    const CONTAINER_TYPE: &'static str;
}

/// A shared, mutable handle to a stored container.
///
/// Cloning the handle clones the reference, not the payload: a mutation
/// made through any clone is visible to every other holder and to the
/// store. Each individual read or write is serialized by the handle's own
/// lock; anything spanning several calls needs caller-side coordination.
pub struct ContainerRef<T> {
    inner: Arc<RwLock<T>>,
}

impl<T: AttributeContainer> ContainerRef<T> {
    /// Wraps a freshly created container.
    #[must_use]
    pub fn new(container: T) -> Self {
        Self {
            inner: Arc::new(RwLock::new(container)),
        }
    }

    pub(crate) fn from_shared(inner: Arc<RwLock<T>>) -> Self {
        Self { inner }
    }

    pub(crate) fn erased(&self) -> Arc<dyn Any + Send + Sync> {
        self.inner.clone()
    }

    /// Returns the container type tag.
    #[must_use]
    pub fn container_type(&self) -> &'static str {
        T::CONTAINER_TYPE
    }

    /// Locks the container for reading.
    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        self.inner.read()
    }

    /// Locks the container for writing.
    pub fn write(&self) -> RwLockWriteGuard<'_, T> {
        self.inner.write()
    }

    /// Returns true if both handles point at the same stored instance.
    #[must_use]
    pub fn same_instance(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Returns a debug rendering of the current payload.
    #[must_use]
    pub fn describe(&self) -> String {
        format!("{:?}", *self.inner.read())
    }

    pub(crate) fn is_instance(&self, erased: &Arc<dyn Any + Send + Sync>) -> bool {
        std::ptr::eq(
            Arc::as_ptr(&self.inner).cast::<()>(),
            Arc::as_ptr(erased).cast::<()>(),
        )
    }
}

impl<T: AttributeContainer + Clone> ContainerRef<T> {
    /// Returns a detached copy of the current payload.
    #[must_use]
    pub fn snapshot(&self) -> T {
        self.inner.read().clone()
    }
}

impl<T> Clone for ContainerRef<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Equality compares payloads, not identity.
impl<T: AttributeContainer + PartialEq> PartialEq for ContainerRef<T> {
    fn eq(&self, other: &Self) -> bool {
        if Arc::ptr_eq(&self.inner, &other.inner) {
            return true;
        }
        *self.inner.read() == *other.inner.read()
    }
}

impl<T: AttributeContainer + Eq> Eq for ContainerRef<T> {}

impl<T: AttributeContainer> Debug for ContainerRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContainerRef")
            .field("container_type", &T::CONTAINER_TYPE)
            .field("payload", &*self.inner.read())
            .finish()
    }
}

impl<T: AttributeContainer> From<T> for ContainerRef<T> {
    fn from(container: T) -> Self {
        Self::new(container)
    }
}
