//! # Pool
//!
//! Growable slot storage with a free list and generational handles.

/// Handle to an object stored in a [`Pool`].
///
/// Cheap to copy, stable for the lifetime of the object, and detectably
/// stale once the object has been freed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PoolHandle {
    /// Index into the pool.
    index: u32,
    /// Generation of the slot when the handle was issued.
    generation: u32,
}

impl PoolHandle {
    /// Slot index. Dense, usable to index side tables.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.index as usize
    }

    /// Generation the handle was issued with.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// A pool of objects addressed by [`PoolHandle`].
///
/// Freed slots are recycled through a free list; the slot generation is
/// bumped on every free so old handles stop resolving.
///
/// # Thread Safety
///
/// This pool is NOT thread-safe. Use one pool per thread or wrap in a mutex.
///
/// # Example
///
/// ```rust
/// use sightline_core::Pool;
///
/// let mut pool: Pool<&str> = Pool::with_capacity(16);
/// let handle = pool.allocate("node");
/// assert_eq!(pool.get(handle), Some(&"node"));
///
/// pool.free(handle);
/// assert!(pool.get(handle).is_none());
/// ```
pub struct Pool<T> {
    /// The storage array.
    slots: Vec<Slot<T>>,
    /// Free list - indices of available slots.
    free_list: Vec<u32>,
    /// Number of allocated objects.
    allocated_count: usize,
}

impl<T> Pool<T> {
    /// Creates an empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Creates an empty pool with room for `capacity` objects before growing.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free_list: Vec::new(),
            allocated_count: 0,
        }
    }

    /// Returns the number of currently allocated objects.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.allocated_count
    }

    /// True when nothing is allocated.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.allocated_count == 0
    }

    /// Number of slots ever created; every handle index is below this.
    #[inline]
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Stores `value` and returns its handle.
    ///
    /// Reuses a freed slot when one is available.
    ///
    /// # Panics
    ///
    /// Panics if more than `u32::MAX` slots are requested.
    pub fn allocate(&mut self, value: T) -> PoolHandle {
        self.allocated_count += 1;

        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(value);
            return PoolHandle {
                index,
                generation: slot.generation,
            };
        }

        let index = u32::try_from(self.slots.len()).expect("pool exhausted u32 handle space");
        self.slots.push(Slot {
            generation: 0,
            value: Some(value),
        });
        PoolHandle {
            index,
            generation: 0,
        }
    }

    /// Frees an allocated object.
    ///
    /// # Returns
    ///
    /// The freed object, or None if the handle was stale or invalid.
    pub fn free(&mut self, handle: PoolHandle) -> Option<T> {
        let slot = self.slots.get_mut(handle.index())?;
        if slot.generation != handle.generation {
            return None;
        }

        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free_list.push(handle.index);
        self.allocated_count -= 1;

        Some(value)
    }

    /// Gets a reference to an allocated object.
    #[inline]
    #[must_use]
    pub fn get(&self, handle: PoolHandle) -> Option<&T> {
        let slot = self.slots.get(handle.index())?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.value.as_ref()
    }

    /// Gets a mutable reference to an allocated object.
    #[inline]
    #[must_use]
    pub fn get_mut(&mut self, handle: PoolHandle) -> Option<&mut T> {
        let slot = self.slots.get_mut(handle.index())?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.value.as_mut()
    }

    /// True if the handle still resolves.
    #[inline]
    #[must_use]
    pub fn contains(&self, handle: PoolHandle) -> bool {
        self.get(handle).is_some()
    }

    /// Iterates over live objects with their handles.
    // slot_count never exceeds u32::MAX, see allocate
    #[allow(clippy::cast_possible_truncation)]
    pub fn iter(&self) -> impl Iterator<Item = (PoolHandle, &T)> {
        self.slots.iter().enumerate().filter_map(|(i, slot)| {
            slot.value.as_ref().map(|value| {
                (
                    PoolHandle {
                        index: i as u32,
                        generation: slot.generation,
                    },
                    value,
                )
            })
        })
    }
}

impl<T> Default for Pool<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("len", &self.allocated_count)
            .field("slots", &self.slot_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_allocation() {
        let mut pool: Pool<u32> = Pool::with_capacity(4);

        let h1 = pool.allocate(1);
        let h2 = pool.allocate(2);

        assert_eq!(pool.len(), 2);
        assert_eq!(pool.get(h1), Some(&1));
        assert_eq!(pool.get(h2), Some(&2));
    }

    #[test]
    fn test_pool_free_and_reuse() {
        let mut pool: Pool<u32> = Pool::new();

        let h1 = pool.allocate(1);
        assert_eq!(pool.free(h1), Some(1));
        assert!(pool.is_empty());

        let h2 = pool.allocate(2);
        assert_eq!(pool.slot_count(), 1);
        assert_eq!(h2.index(), h1.index());
        assert_ne!(h2.generation(), h1.generation());
        assert!(pool.get(h1).is_none(), "stale handle must not resolve");
        assert_eq!(pool.free(h1), None);
        assert_eq!(pool.get(h2), Some(&2));
    }

    #[test]
    fn test_pool_iter_skips_free_slots() {
        let mut pool: Pool<u32> = Pool::new();
        let a = pool.allocate(10);
        let _b = pool.allocate(20);
        pool.free(a);

        let live: Vec<u32> = pool.iter().map(|(_, v)| *v).collect();
        assert_eq!(live, vec![20]);
    }

    #[test]
    fn test_pool_get_mut() {
        let mut pool: Pool<u32> = Pool::new();
        let h = pool.allocate(1);
        *pool.get_mut(h).unwrap() = 5;
        assert_eq!(pool.get(h), Some(&5));
    }
}
