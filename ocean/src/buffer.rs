//! Ring of per-frame slots with explicit flipping.
//!
//! Slot `current()` is written this frame, `previous(k)` holds what was
//! current `k` flips ago. Grids flip exactly once per tick; skipping or
//! doubling a flip breaks the "previous is the last resolved frame" rule that
//! advection and temporal blending rely on.

#[derive(Debug, Clone)]
pub struct BufferedData<T> {
    slots: Vec<T>,
    current: usize,
    flips: u64,
}

impl<T> BufferedData<T> {
    /// Builds `count` slots from `factory`. `count` is 1 or 2 in practice.
    pub fn new(count: usize, mut factory: impl FnMut() -> T) -> Self {
        debug_assert!(count > 0, "buffered data needs at least one slot");
        let count = count.max(1);
        Self {
            slots: (0..count).map(|_| factory()).collect(),
            current: 0,
            flips: 0,
        }
    }

    /// Fallible variant of [`BufferedData::new`]. Stops at the first error.
    pub fn try_new<E>(
        count: usize,
        mut factory: impl FnMut() -> Result<T, E>,
    ) -> Result<Self, (E, Vec<T>)> {
        let count = count.max(1);
        let mut slots = Vec::with_capacity(count);
        for _ in 0..count {
            match factory() {
                Ok(slot) => slots.push(slot),
                Err(err) => return Err((err, slots)),
            }
        }
        Ok(Self {
            slots,
            current: 0,
            flips: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    #[inline]
    pub fn current(&self) -> &T {
        &self.slots[self.current]
    }

    #[inline]
    pub fn current_mut(&mut self) -> &mut T {
        &mut self.slots[self.current]
    }

    /// Slot that was current `frames_back` flips ago.
    ///
    /// # Panics
    /// If `frames_back >= len()`: that history does not exist.
    pub fn previous(&self, frames_back: usize) -> &T {
        assert!(
            frames_back < self.slots.len(),
            "requested {} frames of history from a ring of {}",
            frames_back,
            self.slots.len()
        );
        let len = self.slots.len();
        &self.slots[(self.current + len - frames_back) % len]
    }

    pub fn flip(&mut self) {
        self.current = (self.current + 1) % self.slots.len();
        self.flips += 1;
    }

    /// Number of flips performed since construction.
    pub fn flips(&self) -> u64 {
        self.flips
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.slots.iter()
    }

    pub fn for_each_mut(&mut self, mut f: impl FnMut(&mut T)) {
        for slot in &mut self.slots {
            f(slot);
        }
    }

    /// Consumes the ring, yielding every slot.
    pub fn into_slots(self) -> Vec<T> {
        self.slots
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flip_moves_current_to_previous() {
        let mut data = BufferedData::new(2, || 0);
        *data.current_mut() = 7;
        data.flip();
        assert_eq!(*data.previous(1), 7);

        *data.current_mut() = 9;
        data.flip();
        assert_eq!(*data.previous(1), 9);
        assert_eq!(*data.current(), 7);
    }

    #[test]
    fn test_second_flip_without_write_exposes_older_slot() {
        let mut counter = 0;
        let mut data = BufferedData::new(2, || {
            counter += 1;
            counter * 10
        });
        // slots: [10, 20]
        *data.current_mut() = 1;
        data.flip();
        assert_eq!(*data.previous(1), 1);
        data.flip();
        // Nothing was written in between: previous is the slot that was current
        // after the first flip, still holding its factory value.
        assert_eq!(*data.previous(1), 20);
        assert_eq!(*data.current(), 1);
        assert_eq!(data.flips(), 2);
    }

    #[test]
    fn test_single_slot_ring() {
        let mut data = BufferedData::new(1, || 3);
        data.flip();
        assert_eq!(*data.current(), 3);
        assert_eq!(*data.previous(0), 3);
    }

    #[test]
    #[should_panic]
    fn test_previous_out_of_range_panics() {
        let data = BufferedData::new(2, || 0);
        let _ = data.previous(2);
    }

    #[test]
    fn test_try_new_returns_partial_slots_on_error() {
        let mut made = 0;
        let result = BufferedData::<u32>::try_new(2, || {
            made += 1;
            if made == 2 {
                Err("out of memory")
            } else {
                Ok(made)
            }
        });
        let (err, partial) = result.unwrap_err();
        assert_eq!(err, "out of memory");
        assert_eq!(partial, vec![1]);
    }
}
