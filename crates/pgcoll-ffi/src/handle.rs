//! Generic slot+generation handle table for FFI lifetime management.
//!
//! Prevents use-after-free across the C boundary: destroyed handles have
//! stale generation counters and safely return `None` instead of causing UB.
//! Double-destroy is a safe no-op (returns `None`). The value `0` is never
//! issued, so callers can use it as the null handle.

/// The null handle. Returned by constructors that signal failure by value
/// and never resolved by any table.
pub const PGCOLL_NULL_HANDLE: u64 = 0;

/// Handle encoding: upper 32 bits = slot index + 1, lower 32 bits = generation.
fn encode(slot: u32, generation: u32) -> u64 {
    ((u64::from(slot) + 1) << 32) | u64::from(generation)
}

fn decode(handle: u64) -> Option<(u32, u32)> {
    let slot = ((handle >> 32) as u32).checked_sub(1)?;
    let generation = handle as u32;
    Some((slot, generation))
}

struct Slot<T> {
    generation: u32,
    data: Option<T>,
}

/// A slot+generation handle table mapping `u64` handles to owned values.
///
/// Reuses slots via a free list. Generation counters increment on removal,
/// making stale handles detectable without UB.
pub(crate) struct HandleTable<T> {
    slots: Vec<Slot<T>>,
    free_list: Vec<u32>,
    max_slots: u32,
}

impl<T> HandleTable<T> {
    /// Largest slot count representable by the handle encoding.
    pub const MAX_SLOTS: u32 = u32::MAX - 1;

    /// Create an empty handle table.
    pub const fn new() -> Self {
        Self::with_max_slots(Self::MAX_SLOTS)
    }

    /// Create an empty table that refuses to grow past `max_slots` slots.
    pub const fn with_max_slots(max_slots: u32) -> Self {
        Self {
            slots: Vec::new(),
            free_list: Vec::new(),
            max_slots,
        }
    }

    /// Insert a value and return its handle.
    ///
    /// Returns `None` (dropping `value`) when every slot is occupied or
    /// retired and the table is at its slot limit.
    pub fn insert(&mut self, value: T) -> Option<u64> {
        if let Some(slot_idx) = self.free_list.pop() {
            let slot = &mut self.slots[slot_idx as usize];
            slot.data = Some(value);
            return Some(encode(slot_idx, slot.generation));
        }
        if self.slots.len() >= self.max_slots.min(Self::MAX_SLOTS) as usize {
            return None;
        }
        let slot_idx = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            data: Some(value),
        });
        Some(encode(slot_idx, 0))
    }

    /// Get an immutable reference to the value behind a handle.
    ///
    /// Returns `None` if the handle is null, stale (wrong generation) or
    /// was never valid.
    pub fn get(&self, handle: u64) -> Option<&T> {
        let (slot_idx, generation) = decode(handle)?;
        let slot = self.slots.get(slot_idx as usize)?;
        if slot.generation != generation {
            return None;
        }
        slot.data.as_ref()
    }

    /// Get a mutable reference to the value behind a handle.
    ///
    /// Returns `None` if the handle is null, stale or invalid.
    pub fn get_mut(&mut self, handle: u64) -> Option<&mut T> {
        let (slot_idx, generation) = decode(handle)?;
        let slot = self.slots.get_mut(slot_idx as usize)?;
        if slot.generation != generation {
            return None;
        }
        slot.data.as_mut()
    }

    /// Remove the value behind a handle, returning it.
    ///
    /// Increments the generation counter and adds the slot to the free list.
    /// If the generation has reached `u32::MAX`, the slot is permanently retired
    /// (not returned to the free list) to prevent ABA handle resurrection after
    /// wraparound.
    /// Returns `None` if the handle is null or stale (double-remove is safe).
    pub fn remove(&mut self, handle: u64) -> Option<T> {
        let (slot_idx, generation) = decode(handle)?;
        let slot = self.slots.get_mut(slot_idx as usize)?;
        if slot.generation != generation {
            return None;
        }
        let value = slot.data.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        // A wrapped generation would collide with stale handles from epoch 0.
        if slot.generation != 0 {
            self.free_list.push(slot_idx);
        }
        Some(value)
    }

    /// Number of live values in the table.
    #[cfg(test)]
    pub fn live(&self) -> usize {
        self.slots.iter().filter(|s| s.data.is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn insert_get_round_trip() {
        let mut table = HandleTable::new();
        let h = table.insert(42i32).unwrap();
        assert_eq!(table.get(h), Some(&42));
    }

    #[test]
    fn issued_handles_are_never_null() {
        let mut table = HandleTable::new();
        for i in 0..16 {
            let h = table.insert(i).unwrap();
            assert_ne!(h, PGCOLL_NULL_HANDLE);
        }
    }

    #[test]
    fn null_handle_never_resolves() {
        let mut table = HandleTable::new();
        table.insert(1i32).unwrap();
        assert_eq!(table.get(PGCOLL_NULL_HANDLE), None);
        assert_eq!(table.get_mut(PGCOLL_NULL_HANDLE), None);
        assert_eq!(table.remove(PGCOLL_NULL_HANDLE), None);
        assert_eq!(table.live(), 1);
    }

    #[test]
    fn get_mut_modifies_value() {
        let mut table = HandleTable::new();
        let h = table.insert(10i32).unwrap();
        *table.get_mut(h).unwrap() = 20;
        assert_eq!(table.get(h), Some(&20));
    }

    #[test]
    fn stale_generation_returns_none() {
        let mut table = HandleTable::new();
        let h = table.insert(1i32).unwrap();
        assert_eq!(table.remove(h), Some(1));
        assert_eq!(table.get(h), None);
        assert_eq!(table.get_mut(h), None);
    }

    #[test]
    fn double_remove_returns_none() {
        let mut table = HandleTable::new();
        let h = table.insert(1i32).unwrap();
        assert_eq!(table.remove(h), Some(1));
        assert_eq!(table.remove(h), None);
    }

    #[test]
    fn free_list_reuses_slots_with_new_generation() {
        let mut table = HandleTable::new();
        let h1 = table.insert(1i32).unwrap();
        table.remove(h1);
        let h2 = table.insert(2i32).unwrap();
        let (slot1, gen1) = decode(h1).unwrap();
        let (slot2, gen2) = decode(h2).unwrap();
        assert_eq!(slot1, slot2);
        assert_eq!(gen2, gen1 + 1);
        assert_eq!(table.get(h2), Some(&2));
        assert_eq!(table.get(h1), None);
    }

    #[test]
    fn slot_limit_refuses_insert() {
        let mut table = HandleTable::with_max_slots(2);
        let a = table.insert("a").unwrap();
        table.insert("b").unwrap();
        assert_eq!(table.insert("c"), None);

        // Freeing a slot makes room again.
        table.remove(a);
        assert!(table.insert("c").is_some());
    }

    #[test]
    fn generation_exhaustion_retires_slot() {
        let mut table = HandleTable::new();
        let h = table.insert(1i32).unwrap();
        table.remove(h);

        table.slots[0].generation = u32::MAX;
        let h2 = table.insert(2i32).unwrap();
        assert_eq!(decode(h2).unwrap().1, u32::MAX);

        // Remove wraps generation to 0; the slot must be retired.
        table.remove(h2);
        assert_eq!(table.slots[0].generation, 0);
        assert!(!table.free_list.contains(&0));
        assert_eq!(table.get(encode(0, 0)), None);

        let h3 = table.insert(3i32).unwrap();
        assert_ne!(decode(h3).unwrap().0, 0, "retired slot must not be reused");
    }

    proptest! {
        #[test]
        fn removed_handles_stay_dead(n in 1usize..40, remove_mask in any::<u64>()) {
            let mut table = HandleTable::new();
            let handles: Vec<u64> = (0..n).map(|i| table.insert(i).unwrap()).collect();
            let mut removed = Vec::new();
            for (i, h) in handles.iter().enumerate() {
                if remove_mask & (1 << (i % 64)) != 0 {
                    prop_assert_eq!(table.remove(*h), Some(i));
                    removed.push(*h);
                }
            }
            // Refill the freed slots; old handles must not see the new values.
            for i in 0..removed.len() {
                table.insert(1000 + i).unwrap();
            }
            for h in &removed {
                prop_assert_eq!(table.get(*h), None);
            }
            prop_assert_eq!(table.live(), n);
        }
    }
}
