use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use crate::constants::SORT_KEY_QUEUE_STRIDE;

use super::LodInput;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InputId(u64);

/// Draw order of an input: `queue * 1000 + tiebreak`, then registration
/// order. Registration order only matters when two inputs collide, which is
/// a caller bug caught in debug builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SortKey {
    pub composite: i64,
    pub sequence: u64,
}

impl SortKey {
    pub fn composite(queue: i32, tiebreak: i32) -> i64 {
        queue as i64 * SORT_KEY_QUEUE_STRIDE + tiebreak as i64
    }
}

struct Registration {
    id: InputId,
    queue: i32,
    tiebreak: i32,
    input: Rc<dyn LodInput>,
}

/// Ordered inputs of one grid. Mutated only between ticks.
#[derive(Default)]
pub struct InputRegistry {
    entries: BTreeMap<SortKey, Registration>,
    keys: HashMap<InputId, SortKey>,
    next_id: u64,
    next_sequence: u64,
}

impl InputRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: InputId) -> bool {
        self.keys.contains_key(&id)
    }

    /// Attaches `input`. `tiebreak` orders siblings within one queue and
    /// must stay below the queue stride in magnitude.
    pub fn register(&mut self, input: Rc<dyn LodInput>, queue: i32, tiebreak: i32) -> InputId {
        let id = InputId(self.next_id);
        self.next_id += 1;
        self.insert(Registration {
            id,
            queue,
            tiebreak,
            input,
        });
        id
    }

    pub fn unregister(&mut self, id: InputId) -> Option<Rc<dyn LodInput>> {
        let key = self.keys.remove(&id)?;
        self.entries.remove(&key).map(|registration| registration.input)
    }

    /// Moves an input to another queue, re-sorting it. Returns false for an
    /// unknown id.
    pub fn set_queue(&mut self, id: InputId, queue: i32) -> bool {
        let Some(key) = self.keys.remove(&id) else {
            return false;
        };
        let Some(mut registration) = self.entries.remove(&key) else {
            return false;
        };
        registration.queue = queue;
        self.insert(registration);
        true
    }

    pub fn queue(&self, id: InputId) -> Option<i32> {
        let key = self.keys.get(&id)?;
        self.entries.get(key).map(|registration| registration.queue)
    }

    /// Inputs in draw order.
    pub fn iter(&self) -> impl Iterator<Item = (InputId, &Rc<dyn LodInput>)> {
        self.entries
            .values()
            .map(|registration| (registration.id, &registration.input))
    }

    fn insert(&mut self, registration: Registration) {
        debug_assert!(
            (registration.tiebreak as i64).abs() < SORT_KEY_QUEUE_STRIDE,
            "tiebreak {} overflows into neighbouring queues",
            registration.tiebreak
        );
        let composite = SortKey::composite(registration.queue, registration.tiebreak);
        let clash = self
            .entries
            .range(
                SortKey {
                    composite,
                    sequence: 0,
                }..=SortKey {
                    composite,
                    sequence: u64::MAX,
                },
            )
            .next()
            .is_some();
        debug_assert!(
            !clash,
            "two inputs share sort key {} (queue {}, tiebreak {})",
            composite, registration.queue, registration.tiebreak
        );

        let key = SortKey {
            composite,
            sequence: self.next_sequence,
        };
        self.next_sequence += 1;
        self.keys.insert(registration.id, key);
        self.entries.insert(key, registration);
    }
}
