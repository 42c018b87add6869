//! Typed attribute map for per-call and per-pipeline state.
//!
//! `Attributes` stores one value per [`AttributeKey`]. A key is identified by
//! its name together with the value type, so two features that happen to pick
//! the same name for different types never observe each other's values.
//! Values live in `Arc<dyn Any + Send + Sync>` so lookups hand out cheap
//! shared references, and the map uses interior mutability so it can be
//! updated through a shared `&ApplicationCall`.

use std::{
    any::{Any, TypeId},
    collections::HashMap,
    fmt,
    marker::PhantomData,
    sync::{Arc, Mutex, MutexGuard},
};

/// Typed key addressing a value of type `T` in an [`Attributes`] map.
///
/// # Examples
///
/// ```
/// use weft::attributes::{AttributeKey, Attributes};
///
/// const HITS: AttributeKey<u32> = AttributeKey::new("hits");
///
/// let attributes = Attributes::default();
/// attributes.put(&HITS, 3);
/// assert_eq!(attributes.get(&HITS).as_deref(), Some(&3));
/// ```
pub struct AttributeKey<T> {
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> AttributeKey<T> {
    /// Create a key with the given diagnostic name.
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    /// Name used when the key was declared.
    #[must_use]
    pub const fn name(&self) -> &'static str { self.name }
}

impl<T> Clone for AttributeKey<T> {
    fn clone(&self) -> Self { *self }
}

impl<T> Copy for AttributeKey<T> {}

impl<T> fmt::Debug for AttributeKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AttributeKey").field(&self.name).finish()
    }
}

type Slot = (&'static str, TypeId);

/// Concurrent map from [`AttributeKey`] to value.
#[derive(Default)]
pub struct Attributes {
    values: Mutex<HashMap<Slot, Arc<dyn Any + Send + Sync>>>,
}

impl Attributes {
    fn slot<T: 'static>(key: &AttributeKey<T>) -> Slot { (key.name, TypeId::of::<T>()) }

    fn lock(&self) -> MutexGuard<'_, HashMap<Slot, Arc<dyn Any + Send + Sync>>> {
        // A panic while holding the lock cannot leave the map half-updated:
        // every critical section is a single `HashMap` call.
        self.values
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Store `value` under `key`, replacing any previous value.
    pub fn put<T>(&self, key: &AttributeKey<T>, value: T)
    where
        T: Send + Sync + 'static,
    {
        self.put_arc(key, Arc::new(value));
    }

    /// Store an already shared value under `key`.
    pub fn put_arc<T>(&self, key: &AttributeKey<T>, value: Arc<T>)
    where
        T: Send + Sync + 'static,
    {
        self.lock()
            .insert(Self::slot(key), value as Arc<dyn Any + Send + Sync>);
    }

    /// Fetch the value stored under `key`.
    #[must_use]
    pub fn get<T>(&self, key: &AttributeKey<T>) -> Option<Arc<T>>
    where
        T: Send + Sync + 'static,
    {
        self.lock()
            .get(&Self::slot(key))
            .and_then(|value| Arc::clone(value).downcast::<T>().ok())
    }

    /// Returns `true` when a value is stored under `key`.
    #[must_use]
    pub fn contains<T: 'static>(&self, key: &AttributeKey<T>) -> bool {
        self.lock().contains_key(&Self::slot(key))
    }

    /// Remove and return the value stored under `key`.
    pub fn remove<T>(&self, key: &AttributeKey<T>) -> Option<Arc<T>>
    where
        T: Send + Sync + 'static,
    {
        self.lock()
            .remove(&Self::slot(key))
            .and_then(|value| value.downcast::<T>().ok())
    }

    /// Return the value under `key`, inserting the result of `init` first if
    /// the key is vacant.
    pub fn compute_if_absent<T, F>(&self, key: &AttributeKey<T>, init: F) -> Arc<T>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> T,
    {
        let mut values = self.lock();
        let entry = values
            .entry(Self::slot(key))
            .or_insert_with(|| Arc::new(init()) as Arc<dyn Any + Send + Sync>);
        match Arc::clone(entry).downcast::<T>() {
            Ok(value) => value,
            // The slot includes the `TypeId`, so the stored value is always a `T`.
            Err(_) => unreachable!("attribute slot holds a value of a different type"),
        }
    }

    /// Number of stored values.
    #[must_use]
    pub fn len(&self) -> usize { self.lock().len() }

    /// Returns `true` when no values are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.lock().is_empty() }
}

impl fmt::Debug for Attributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let values = self.lock();
        f.debug_set().entries(values.keys().map(|(name, _)| name)).finish()
    }
}
