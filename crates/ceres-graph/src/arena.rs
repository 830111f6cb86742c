//! Generational arena backing the node collection
//!
//! Nodes and ports refer to each other through [`NodeHandle`]s rather than
//! pointers. Removing a node bumps its slot's generation, so a handle kept
//! across a removal resolves to `None` instead of aliasing a new node.

use serde::{Deserialize, Serialize};

/// Stable index + generation handle to a node in a graph
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct NodeHandle {
    index: u32,
    generation: u32,
}

impl NodeHandle {
    /// Slot index
    pub fn index(self) -> usize {
        self.index as usize
    }

    pub fn generation(self) -> u32 {
        self.generation
    }
}

#[derive(Debug)]
struct Slot<T> {
    generation: u32,
    item: Option<T>,
}

/// Arena of items addressed by generational handles
#[derive(Debug)]
pub struct Arena<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    len: usize,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Arena<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
        }
    }

    /// Insert an item, reusing a free slot if one exists
    pub fn insert(&mut self, item: T) -> NodeHandle {
        self.len += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.item = Some(item);
            return NodeHandle {
                index,
                generation: slot.generation,
            };
        }
        let index = u32::try_from(self.slots.len()).unwrap_or(u32::MAX);
        self.slots.push(Slot {
            generation: 0,
            item: Some(item),
        });
        NodeHandle {
            index,
            generation: 0,
        }
    }

    /// Remove an item; its handle becomes stale
    pub fn remove(&mut self, handle: NodeHandle) -> Option<T> {
        let slot = self.slots.get_mut(handle.index())?;
        if slot.generation != handle.generation {
            return None;
        }
        let item = slot.item.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        self.len -= 1;
        Some(item)
    }

    pub fn get(&self, handle: NodeHandle) -> Option<&T> {
        let slot = self.slots.get(handle.index())?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.item.as_ref()
    }

    pub fn get_mut(&mut self, handle: NodeHandle) -> Option<&mut T> {
        let slot = self.slots.get_mut(handle.index())?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.item.as_mut()
    }

    /// Live items in slot order
    pub fn iter(&self) -> impl Iterator<Item = (NodeHandle, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.item.as_ref().map(|item| {
                (
                    NodeHandle {
                        index: index as u32,
                        generation: slot.generation,
                    },
                    item,
                )
            })
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (NodeHandle, &mut T)> {
        self.slots.iter_mut().enumerate().filter_map(|(index, slot)| {
            let generation = slot.generation;
            slot.item.as_mut().map(|item| {
                (
                    NodeHandle {
                        index: index as u32,
                        generation,
                    },
                    item,
                )
            })
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stale_handle_after_remove() {
        let mut arena = Arena::new();
        let a = arena.insert("a");
        assert_eq!(arena.get(a), Some(&"a"));

        assert_eq!(arena.remove(a), Some("a"));
        assert!(arena.get(a).is_none());

        let b = arena.insert("b");
        assert_eq!(a.index(), b.index());
        assert_ne!(a.generation(), b.generation());
        assert!(arena.get(a).is_none());
        assert_eq!(arena.get(b), Some(&"b"));
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn test_iter_skips_vacant_slots() {
        let mut arena = Arena::new();
        let a = arena.insert(1);
        arena.insert(2);
        arena.insert(3);
        arena.remove(a);
        let items: Vec<i32> = arena.iter().map(|(_, v)| *v).collect();
        assert_eq!(items, vec![2, 3]);
    }
}
