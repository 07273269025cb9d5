use alloc::vec::Vec;

use hashbrown::HashMap;
use rand::Rng;
use rand::RngExt;
use smallvec::SmallVec;

use crate::mask;
use crate::Coord2;

const NIL: u32 = u32::MAX;

/// "The cells selected by `mask` in the 3×3 window at `(x, y)` contain exactly
/// `mines` mines." Always stored canonical: leftmost occupied column and
/// topmost occupied row at offset 0.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Constraint {
    pub x: i16,
    pub y: i16,
    pub mask: u16,
    pub mines: u8,
}

impl Constraint {
    pub fn cell_count(&self) -> u8 {
        self.mask.count_ones() as u8
    }

    /// Iterates the board coordinates selected by the mask.
    pub fn cells(&self) -> impl Iterator<Item = Coord2> + use<> {
        mask::cells(self.x, self.y, self.mask)
    }

    pub fn covers(&self, coords: Coord2) -> bool {
        let dx = coords.0 as i16 - self.x;
        let dy = coords.1 as i16 - self.y;
        (0..3).contains(&dx) && (0..3).contains(&dy) && self.mask & mask::bit_at(dx, dy) != 0
    }
}

#[derive(Debug)]
struct Slot {
    constraint: Constraint,
    queued: bool,
    prev: u32,
    next: u32,
    live_pos: u32,
}

/// Session-scoped set of constraints with three access paths: a
/// content-addressed index for dedup, an intrusive FIFO work-list, and a
/// dense slot array for O(1) uniform sampling.
#[derive(Debug)]
pub struct ConstraintStore {
    slots: Vec<Option<Slot>>,
    free: Vec<u32>,
    index: HashMap<(i16, i16, u16), u32>,
    live: Vec<u32>,
    head: u32,
    tail: u32,
}

impl Default for ConstraintStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstraintStore {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            index: HashMap::new(),
            live: Vec::new(),
            head: NIL,
            tail: NIL,
        }
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.index.clear();
        self.live.clear();
        self.head = NIL;
        self.tail = NIL;
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    pub fn get(&self, slot: u32) -> &Constraint {
        &self.slot(slot).constraint
    }

    /// Present constraint slots; the order is stable between mutations.
    pub(crate) fn live(&self) -> &[u32] {
        &self.live
    }

    /// Canonicalizes and inserts, enqueueing new entries on the work-list.
    /// An empty mask is a no-op; a duplicate key resolves to the existing
    /// constraint without touching its queue state.
    pub fn add(&mut self, x: i16, y: i16, mask_bits: u16, mines: u8) -> Option<u32> {
        let (x, y, mask_bits) = mask::canonicalize(x, y, mask_bits);
        if mask_bits == 0 {
            return None;
        }
        debug_assert!(u32::from(mines) <= mask_bits.count_ones());

        if let Some(&slot) = self.index.get(&(x, y, mask_bits)) {
            return Some(slot);
        }

        let slot = Slot {
            constraint: Constraint {
                x,
                y,
                mask: mask_bits,
                mines,
            },
            queued: false,
            prev: NIL,
            next: NIL,
            live_pos: self.live.len() as u32,
        };
        let idx = match self.free.pop() {
            Some(idx) => {
                self.slots[idx as usize] = Some(slot);
                idx
            }
            None => {
                self.slots.push(Some(slot));
                (self.slots.len() - 1) as u32
            }
        };
        self.index.insert((x, y, mask_bits), idx);
        self.live.push(idx);
        self.enqueue(idx);
        Some(idx)
    }

    pub fn remove(&mut self, slot: u32) {
        self.unlink(slot);
        let state = self.slots[slot as usize]
            .take()
            .expect("removing a vacant constraint slot");
        let c = state.constraint;
        self.index.remove(&(c.x, c.y, c.mask));

        let pos = state.live_pos as usize;
        let last = self.live.pop().expect("live registry out of sync");
        if last != slot {
            self.live[pos] = last;
            self.slot_mut(last).live_pos = pos as u32;
        }
        self.free.push(slot);
    }

    /// Puts a constraint (back) on the FIFO work-list; a no-op while queued.
    pub fn enqueue(&mut self, slot: u32) {
        if self.slot(slot).queued {
            return;
        }
        let tail = self.tail;
        {
            let state = self.slot_mut(slot);
            state.queued = true;
            state.prev = tail;
            state.next = NIL;
        }
        if tail == NIL {
            self.head = slot;
        } else {
            self.slot_mut(tail).next = slot;
        }
        self.tail = slot;
    }

    /// Dequeues the oldest work-list entry; it stays present in the store.
    pub fn pop_work(&mut self) -> Option<u32> {
        if self.head == NIL {
            return None;
        }
        let slot = self.head;
        self.unlink(slot);
        Some(slot)
    }

    /// Every constraint whose window lies within two cells of `(x, y)` on
    /// both axes and whose aligned mask intersects `mask_bits`.
    pub fn overlapping_with(&self, x: i16, y: i16, mask_bits: u16) -> SmallVec<[u32; 8]> {
        let mut found = SmallVec::new();
        for &slot in &self.live {
            let c = self.get(slot);
            let dx = c.x - x;
            let dy = c.y - y;
            if dx.abs() < 3 && dy.abs() < 3 && mask::align(c.mask, dx, dy) & mask_bits != 0 {
                found.push(slot);
            }
        }
        found
    }

    /// Constraints whose cell set includes `coords`.
    pub fn containing_cell(&self, coords: Coord2) -> SmallVec<[u32; 8]> {
        self.overlapping_with(coords.0 as i16, coords.1 as i16, 1)
    }

    /// Uniform O(1) sample over the present constraints.
    pub fn pick_random<R: Rng>(&self, rng: &mut R) -> Option<u32> {
        if self.live.is_empty() {
            return None;
        }
        Some(self.live[rng.random_range(0..self.live.len())])
    }

    pub fn adjust_mines(&mut self, slot: u32, delta: i8) {
        let state = self.slot_mut(slot);
        let limit = state.constraint.mask.count_ones() as i16;
        let mines = state.constraint.mines as i16 + delta as i16;
        debug_assert!((0..=limit).contains(&mines));
        state.constraint.mines = mines.clamp(0, limit) as u8;
    }

    fn unlink(&mut self, slot: u32) {
        let (queued, prev, next) = {
            let state = self.slot(slot);
            (state.queued, state.prev, state.next)
        };
        if !queued {
            return;
        }
        if prev == NIL {
            self.head = next;
        } else {
            self.slot_mut(prev).next = next;
        }
        if next == NIL {
            self.tail = prev;
        } else {
            self.slot_mut(next).prev = prev;
        }
        let state = self.slot_mut(slot);
        state.queued = false;
        state.prev = NIL;
        state.next = NIL;
    }

    fn slot(&self, slot: u32) -> &Slot {
        self.slots[slot as usize]
            .as_ref()
            .expect("vacant constraint slot")
    }

    fn slot_mut(&mut self, slot: u32) -> &mut Slot {
        self.slots[slot as usize]
            .as_mut()
            .expect("vacant constraint slot")
    }

    #[cfg(test)]
    fn is_queued(&self, slot: u32) -> bool {
        self.slot(slot).queued
    }
}
