use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

/// Application-assigned identifier shared by objects, vehicles and constraints.
///
/// IDs start at 1, grow monotonically and are never reused.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord, Default,
)]
#[serde(transparent)]
pub struct ObjectId(pub u32);

impl ObjectId {
    pub fn index(&self) -> usize {
        self.0 as usize
    }

    /// Encodes the id as a report value. Exact for ids below 2^24.
    pub fn to_f32(self) -> f32 {
        self.0 as f32
    }

    /// Decodes an id written by [`ObjectId::to_f32`].
    pub fn from_f32(value: f32) -> Option<Self> {
        if value.is_finite() && value >= 0.0 && value.fract() == 0.0 {
            Some(Self(value as u32))
        } else {
            None
        }
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonic id source owned by the main-thread bridge.
#[derive(Debug, Clone)]
pub struct IdCounter {
    next: u32,
}

impl Default for IdCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl IdCounter {
    pub fn new() -> Self {
        Self { next: 1 }
    }

    pub fn next_id(&mut self) -> ObjectId {
        let id = ObjectId(self.next);
        self.next += 1;
        id
    }

    /// Number of ids handed out so far.
    pub fn issued(&self) -> u32 {
        self.next - 1
    }
}

/// Id-indexed table where removed entries leave a tombstone slot behind.
///
/// Slots are never compacted or reused, mirroring the never-reused id space.
#[derive(Debug, Clone)]
pub struct SparseTable<T> {
    slots: Vec<Option<T>>,
    live: usize,
}

impl<T> Default for SparseTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SparseTable<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            live: 0,
        }
    }

    /// Stores `item` under `id`, returning whatever occupied the slot before.
    pub fn insert(&mut self, id: ObjectId, item: T) -> Option<T> {
        let index = id.index();
        if index >= self.slots.len() {
            self.slots.resize_with(index + 1, || None);
        }
        let previous = self.slots[index].replace(item);
        if previous.is_none() {
            self.live += 1;
        }
        previous
    }

    pub fn get(&self, id: ObjectId) -> Option<&T> {
        self.slots.get(id.index()).and_then(|slot| slot.as_ref())
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut T> {
        self.slots.get_mut(id.index()).and_then(|slot| slot.as_mut())
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.get(id).is_some()
    }

    /// Clears the slot for `id`; the slot itself stays allocated.
    pub fn remove(&mut self, id: ObjectId) -> Option<T> {
        let taken = self.slots.get_mut(id.index()).and_then(|slot| slot.take());
        if taken.is_some() {
            self.live -= 1;
        }
        taken
    }

    /// Live entries in ascending id order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (ObjectId, &T)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|item| (ObjectId(index as u32), item)))
    }

    pub fn iter_mut(&mut self) -> impl DoubleEndedIterator<Item = (ObjectId, &mut T)> + '_ {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_mut().map(|item| (ObjectId(index as u32), item)))
    }

    pub fn ids(&self) -> Vec<ObjectId> {
        self.iter().map(|(id, _)| id).collect()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Number of slots including tombstones.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }
}

/// Unique identifier with generation tracking to prevent stale references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct GenerationalId {
    pub index: usize,
    pub generation: u32,
}

impl GenerationalId {
    pub fn new(index: usize, generation: u32) -> Self {
        Self { index, generation }
    }
}

/// Handle to a node in the main-thread scene graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct NodeId(pub GenerationalId);

impl NodeId {
    pub fn new(index: usize, generation: u32) -> Self {
        Self(GenerationalId::new(index, generation))
    }

    pub fn index(&self) -> usize {
        self.0.index
    }

    pub fn generation(&self) -> u32 {
        self.0.generation
    }
}

/// Generational arena that hands out stable handles while preventing use-after-free.
///
/// Unlike [`SparseTable`], freed slots are recycled; stale handles are rejected
/// through the generation check.
#[derive(Debug)]
pub struct Arena<T> {
    items: Vec<Option<T>>,
    generations: Vec<u32>,
    free_list: VecDeque<usize>,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Arena<T> {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            generations: Vec::new(),
            free_list: VecDeque::new(),
        }
    }

    pub fn insert(&mut self, item: T) -> NodeId {
        if let Some(index) = self.free_list.pop_front() {
            let generation = self.generations[index];
            self.items[index] = Some(item);
            return NodeId::new(index, generation);
        }

        let index = self.items.len();
        self.items.push(Some(item));
        self.generations.push(0);
        NodeId::new(index, 0)
    }

    pub fn get(&self, id: NodeId) -> Option<&T> {
        if self.is_valid(id) {
            self.items.get(id.index()).and_then(|slot| slot.as_ref())
        } else {
            None
        }
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut T> {
        if self.is_valid(id) {
            self.items.get_mut(id.index()).and_then(|slot| slot.as_mut())
        } else {
            None
        }
    }

    pub fn remove(&mut self, id: NodeId) -> Option<T> {
        if !self.is_valid(id) {
            return None;
        }
        let slot = self.items.get_mut(id.index())?;
        if slot.is_some() {
            self.generations[id.index()] = self.generations[id.index()].wrapping_add(1);
            self.free_list.push_back(id.index());
        }
        slot.take()
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.items.iter().enumerate().filter_map(|(index, slot)| {
            slot.as_ref()
                .map(|_| NodeId::new(index, self.generations[index]))
        })
    }

    pub fn len(&self) -> usize {
        self.items.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn is_valid(&self, id: NodeId) -> bool {
        self.generations
            .get(id.index())
            .copied()
            .map(|gen| gen == id.generation())
            .unwrap_or(false)
    }
}
