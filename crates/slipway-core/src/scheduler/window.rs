//! Bounded slot arena holding the active workers.
//!
//! Slots are indexed by position, and the job id is stored alongside each
//! worker. Slots are created on demand up to the capacity, so a huge limit
//! costs nothing until workers actually run. Iteration always goes in slot
//! order, so "terminate everything else" is deterministic.

use rustc_hash::FxHashMap;

use crate::job::JobId;

struct Slot<W> {
    job_id: JobId,
    worker: W,
}

/// The set of admitted, not yet released workers.
pub struct Window<W> {
    slots: Vec<Option<Slot<W>>>,
    /// Job id -> slot index.
    index: FxHashMap<JobId, usize>,
    capacity: usize,
}

impl<W> Window<W> {
    /// Create a window holding at most `capacity` workers.
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Vec::new(),
            index: FxHashMap::default(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity()
    }

    pub fn contains(&self, job_id: JobId) -> bool {
        self.index.contains_key(&job_id)
    }

    /// Put a worker into the first free slot, opening a new one if none is
    /// free. Returns the slot index, or the worker back if the window is full.
    pub fn admit(&mut self, job_id: JobId, worker: W) -> Result<usize, W> {
        debug_assert!(!self.contains(job_id), "{} admitted twice", job_id);
        if self.is_full() {
            return Err(worker);
        }

        let entry = Some(Slot { job_id, worker });
        let slot = match self.slots.iter().position(Option::is_none) {
            Some(slot) => {
                self.slots[slot] = entry;
                slot
            }
            None => {
                self.slots.push(entry);
                self.slots.len() - 1
            }
        };
        self.index.insert(job_id, slot);
        Ok(slot)
    }

    /// Take a worker out of the window.
    pub fn release(&mut self, job_id: JobId) -> Option<W> {
        let slot = self.index.remove(&job_id)?;
        self.slots[slot].take().map(|s| s.worker)
    }

    /// Workers in slot order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (JobId, &mut W)> {
        self.slots
            .iter_mut()
            .flatten()
            .map(|slot| (slot.job_id, &mut slot.worker))
    }

    /// Remove every worker, in slot order.
    pub fn drain(&mut self) -> impl Iterator<Item = (JobId, W)> + '_ {
        self.index.clear();
        self.slots
            .iter_mut()
            .filter_map(Option::take)
            .map(|slot| (slot.job_id, slot.worker))
    }
}
