//! Freelist-backed record pool.
//!
//! Records live in one `Vec` and are addressed by [`Handle`]s. Freed slots are
//! chained into a freelist and reused; every release bumps the slot's
//! generation so a handle kept past its record's lifetime stops resolving
//! instead of aliasing whatever reuses the slot. When the freelist is empty
//! the pool grows by a whole batch at once.

use core::ops::{Index, IndexMut};

use crate::error::IndexError;

/// Generation-checked index into a [`Pool`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle {
    index: u32,
    generation: u32,
}

impl Handle {
    pub fn index(self) -> u32 {
        self.index
    }

    pub fn generation(self) -> u32 {
        self.generation
    }
}

enum Slot<T> {
    Free { next: Option<u32> },
    Used(T),
}

struct Entry<T> {
    generation: u32,
    slot: Slot<T>,
}

pub struct Pool<T> {
    entries: Vec<Entry<T>>,
    free_head: Option<u32>,
    free_len: usize,
    batch: usize,
}

impl<T> Pool<T> {
    /// Empty pool that grows `batch` records at a time.
    pub fn new(batch: usize) -> Self {
        Self {
            entries: Vec::new(),
            free_head: None,
            free_len: 0,
            batch: batch.max(1),
        }
    }

    /// Stores `value` in a recycled slot (growing the pool if none is free).
    pub fn acquire(&mut self, value: T) -> Result<Handle, IndexError> {
        if self.free_head.is_none() {
            self.grow()?;
        }
        let index = self
            .free_head
            .ok_or(IndexError::Corrupt("pool freelist empty after growth"))?;
        let entry = &mut self.entries[index as usize];
        let next = match entry.slot {
            Slot::Free { next } => next,
            Slot::Used(_) => return Err(IndexError::Corrupt("pool freelist points at a live record")),
        };
        self.free_head = next;
        self.free_len -= 1;
        entry.slot = Slot::Used(value);
        Ok(Handle { index, generation: entry.generation })
    }

    /// Returns the record to the freelist. Stale handles are ignored.
    pub fn release(&mut self, handle: Handle) -> Option<T> {
        let entry = self.entries.get_mut(handle.index as usize)?;
        if entry.generation != handle.generation || matches!(entry.slot, Slot::Free { .. }) {
            return None;
        }
        let old = core::mem::replace(&mut entry.slot, Slot::Free { next: self.free_head });
        entry.generation = entry.generation.wrapping_add(1);
        self.free_head = Some(handle.index);
        self.free_len += 1;
        match old {
            Slot::Used(value) => Some(value),
            Slot::Free { .. } => None,
        }
    }

    pub fn get(&self, handle: Handle) -> Option<&T> {
        match self.entries.get(handle.index as usize) {
            Some(Entry { generation, slot: Slot::Used(value) }) if *generation == handle.generation => Some(value),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut T> {
        match self.entries.get_mut(handle.index as usize) {
            Some(Entry { generation, slot: Slot::Used(value) }) if *generation == handle.generation => Some(value),
            _ => None,
        }
    }

    pub fn contains(&self, handle: Handle) -> bool {
        self.get(handle).is_some()
    }

    /// Records currently handed out.
    pub fn live(&self) -> usize {
        self.entries.len() - self.free_len
    }

    /// Records waiting in the freelist.
    pub fn pooled(&self) -> usize {
        self.free_len
    }

    fn grow(&mut self) -> Result<(), IndexError> {
        let start = self.entries.len();
        let end = start
            .checked_add(self.batch)
            .filter(|&end| end <= u32::MAX as usize)
            .ok_or(IndexError::CapacityExhausted)?;
        self.entries
            .try_reserve_exact(self.batch)
            .map_err(|_| IndexError::AllocationFailed)?;
        for i in start..end {
            let next = if i + 1 < end { Some((i + 1) as u32) } else { self.free_head };
            self.entries.push(Entry { generation: 0, slot: Slot::Free { next } });
        }
        self.free_head = Some(start as u32);
        self.free_len += self.batch;
        Ok(())
    }
}

impl<T> Index<Handle> for Pool<T> {
    type Output = T;

    fn index(&self, handle: Handle) -> &T {
        match self.get(handle) {
            Some(value) => value,
            None => panic!("stale pool handle {handle:?}"),
        }
    }
}

impl<T> IndexMut<Handle> for Pool<T> {
    fn index_mut(&mut self, handle: Handle) -> &mut T {
        match self.get_mut(handle) {
            Some(value) => value,
            None => panic!("stale pool handle {handle:?}"),
        }
    }
}
