//! Bindless texture slots and the pending-upload queue.
//!
//! # Overview
//!
//! - [`PendingUploadQueue`] is a FIFO of texture ids waiting for a slot; an
//!   id is never queued twice at once
//! - [`SlotPool`] hands out dynamic slot indices, lowest first
//! - [`BindlessResidency`] ties the two together: it assigns slots once per
//!   frame, re-queues ids when the pool runs dry, and holds retired slots
//!   back until the GPU can no longer sample through them
//!
//! Slots 0 to 3 are reserved for builtin textures so shaders can hardcode
//! them. The dynamic range starts at [`FIRST_DYNAMIC_SLOT`].
//!
//! # Example
//!
//! ```no_run
//! use vkframe_renderer::bindless::{BindlessResidency, FALLBACK_SLOT};
//! use vkframe_renderer::texture_id::TextureId;
//!
//! let mut residency = BindlessResidency::new(1024, 3);
//! let id = TextureId::try_from_base_frame(12).unwrap();
//!
//! residency.request(id);
//! assert_eq!(residency.slot_or_fallback(id), FALLBACK_SLOT);
//!
//! let assigned = residency.process_pending();
//! assert_eq!(assigned.len(), 1);
//! ```

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use tracing::{debug, warn};

use crate::deferred_release::{Serial, is_due};
use crate::texture_id::TextureId;

/// Slot sampled when a texture is missing or not yet resident.
pub const FALLBACK_SLOT: u32 = 0;
/// Default base-color map.
pub const DEFAULT_BASE_SLOT: u32 = 1;
/// Default normal map.
pub const DEFAULT_NORMAL_SLOT: u32 = 2;
/// Default specular map.
pub const DEFAULT_SPEC_SLOT: u32 = 3;
/// First slot handed out by the dynamic pool.
pub const FIRST_DYNAMIC_SLOT: u32 = 4;
/// Size of the bindless descriptor array.
pub const MAX_BINDLESS_TEXTURES: u32 = 1024;

/// Every reserved builtin slot.
pub const RESERVED_SLOTS: [u32; 4] = [
    FALLBACK_SLOT,
    DEFAULT_BASE_SLOT,
    DEFAULT_NORMAL_SLOT,
    DEFAULT_SPEC_SLOT,
];

const _: () = assert!(FIRST_DYNAMIC_SLOT < MAX_BINDLESS_TEXTURES);

/// Uniqueness-gated FIFO of texture ids awaiting a slot.
#[derive(Debug, Default, Clone)]
pub struct PendingUploadQueue {
    order: VecDeque<TextureId>,
    members: HashSet<TextureId>,
}

impl PendingUploadQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `id` unless it is already queued. Returns whether it was added.
    pub fn enqueue(&mut self, id: TextureId) -> bool {
        if !self.members.insert(id) {
            return false;
        }
        self.order.push_back(id);
        true
    }

    /// Removes `id`, keeping the order of everything else.
    pub fn erase(&mut self, id: TextureId) -> bool {
        if !self.members.remove(&id) {
            return false;
        }
        if let Some(pos) = self.order.iter().position(|&queued| queued == id) {
            self.order.remove(pos);
        }
        true
    }

    /// Empties the queue and returns its contents in FIFO order.
    pub fn take_all(&mut self) -> Vec<TextureId> {
        self.members.clear();
        self.order.drain(..).collect()
    }

    /// Returns true if `id` is queued.
    #[inline]
    pub fn contains(&self, id: TextureId) -> bool {
        self.members.contains(&id)
    }

    /// Returns true when nothing is queued.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Number of queued ids.
    #[inline]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Iterates queued ids in FIFO order.
    pub fn iter(&self) -> impl Iterator<Item = TextureId> + '_ {
        self.order.iter().copied()
    }
}

/// Free list of dynamic bindless slots.
#[derive(Debug, Clone)]
pub struct SlotPool {
    free: BTreeSet<u32>,
    first: u32,
    end: u32,
}

impl SlotPool {
    /// Creates a pool owning `count` slots starting at `first`.
    ///
    /// Reserved slots below [`FIRST_DYNAMIC_SLOT`] are never added, even when
    /// `first` is smaller.
    pub fn new(first: u32, count: u32) -> Self {
        let first = first.max(FIRST_DYNAMIC_SLOT);
        let end = first.saturating_add(count);
        Self {
            free: (first..end).collect(),
            first,
            end,
        }
    }

    /// Pool covering the dynamic range of a descriptor array of `capacity`.
    pub fn for_capacity(capacity: u32) -> Self {
        Self::new(
            FIRST_DYNAMIC_SLOT,
            capacity.saturating_sub(FIRST_DYNAMIC_SLOT),
        )
    }

    /// Takes the lowest free slot.
    pub fn acquire(&mut self) -> Option<u32> {
        self.free.pop_first()
    }

    /// Returns `slot` to the pool.
    ///
    /// Reserved and out-of-range indices are ignored.
    pub fn release(&mut self, slot: u32) {
        if !self.owns(slot) {
            warn!("Ignoring release of bindless slot {} outside the dynamic pool", slot);
            return;
        }
        if !self.free.insert(slot) {
            warn!("Bindless slot {} released twice", slot);
        }
    }

    /// Returns true if `slot` belongs to this pool's range.
    #[inline]
    pub fn owns(&self, slot: u32) -> bool {
        (self.first..self.end).contains(&slot)
    }

    /// Number of free slots.
    #[inline]
    pub fn available(&self) -> usize {
        self.free.len()
    }

    /// Total number of slots in the pool.
    #[inline]
    pub fn capacity(&self) -> u32 {
        self.end - self.first
    }
}

/// A texture that received a slot this frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SlotAssignment {
    /// Texture that became resident.
    pub id: TextureId,
    /// Slot its descriptor must be written to.
    pub slot: u32,
}

/// Slot residency for bindless textures.
#[derive(Debug)]
pub struct BindlessResidency {
    pending: PendingUploadQueue,
    pool: SlotPool,
    resident: HashMap<TextureId, u32>,
    retired: VecDeque<(Serial, u32)>,
    fallback_writes: Vec<u32>,
    window: Serial,
}

impl BindlessResidency {
    /// Creates residency tracking for a descriptor array of `capacity`
    /// slots, holding retired slots for `window` serials.
    pub fn new(capacity: u32, window: Serial) -> Self {
        Self::with_pool(SlotPool::for_capacity(capacity), window)
    }

    /// Creates residency tracking over an explicit pool.
    pub fn with_pool(pool: SlotPool, window: Serial) -> Self {
        Self {
            pending: PendingUploadQueue::new(),
            pool,
            resident: HashMap::new(),
            retired: VecDeque::new(),
            fallback_writes: Vec::new(),
            window,
        }
    }

    /// Queues `id` for a slot. Resident and already-queued ids are ignored.
    pub fn request(&mut self, id: TextureId) -> bool {
        if self.resident.contains_key(&id) {
            return false;
        }
        self.pending.enqueue(id)
    }

    /// Assigns slots to pending ids in FIFO order.
    ///
    /// Ids that find the pool empty go back to the queue, in order, for the
    /// next frame.
    pub fn process_pending(&mut self) -> Vec<SlotAssignment> {
        let mut assigned = Vec::new();
        let mut deferred = 0usize;

        for id in self.pending.take_all() {
            if self.resident.contains_key(&id) {
                continue;
            }
            match self.pool.acquire() {
                Some(slot) => {
                    self.resident.insert(id, slot);
                    assigned.push(SlotAssignment { id, slot });
                }
                None => {
                    self.pending.enqueue(id);
                    deferred += 1;
                }
            }
        }

        if deferred > 0 {
            debug!(
                "Bindless pool exhausted: {} assigned, {} deferred to next frame",
                assigned.len(),
                deferred
            );
        }
        assigned
    }

    /// Slot of a resident texture.
    #[inline]
    pub fn slot_of(&self, id: TextureId) -> Option<u32> {
        self.resident.get(&id).copied()
    }

    /// Slot of a resident texture, or the fallback slot.
    #[inline]
    pub fn slot_or_fallback(&self, id: TextureId) -> u32 {
        self.slot_of(id).unwrap_or(FALLBACK_SLOT)
    }

    /// Drops `id` from residency after GPU work up to `serial` used it.
    ///
    /// The slot stays out of the pool until [`collect`](Self::collect) sees
    /// `serial` complete, and is reported by
    /// [`take_fallback_writes`](Self::take_fallback_writes) meanwhile.
    pub fn retire(&mut self, id: TextureId, serial: Serial) -> Option<u32> {
        self.pending.erase(id);
        let slot = self.resident.remove(&id)?;
        self.retired.push_back((serial, slot));
        self.fallback_writes.push(slot);
        Some(slot)
    }

    /// Releases the slot of a texture no submitted work has referenced.
    pub fn release_now(&mut self, id: TextureId) -> bool {
        self.pending.erase(id);
        match self.resident.remove(&id) {
            Some(slot) => {
                self.pool.release(slot);
                true
            }
            None => false,
        }
    }

    /// Returns retired slots whose serial has completed to the pool.
    pub fn collect(&mut self, completed: Serial) -> usize {
        let before = self.retired.len();
        let window = self.window;
        let pool = &mut self.pool;
        self.retired.retain(|&(serial, slot)| {
            if is_due(serial, completed, window) {
                pool.release(slot);
                false
            } else {
                true
            }
        });
        before - self.retired.len()
    }

    /// Returns every retired slot to the pool. Only valid once the GPU is idle.
    pub fn release_all_retired(&mut self) -> usize {
        let count = self.retired.len();
        for (_, slot) in self.retired.drain(..) {
            self.pool.release(slot);
        }
        count
    }

    /// Slots that must be pointed at the fallback texture, drained.
    pub fn take_fallback_writes(&mut self) -> Vec<u32> {
        std::mem::take(&mut self.fallback_writes)
    }

    /// Returns true if `id` is waiting for a slot.
    #[inline]
    pub fn is_pending(&self, id: TextureId) -> bool {
        self.pending.contains(id)
    }

    /// Pending queue, in FIFO order.
    #[inline]
    pub fn pending(&self) -> &PendingUploadQueue {
        &self.pending
    }

    /// Number of resident textures.
    #[inline]
    pub fn resident_count(&self) -> usize {
        self.resident.len()
    }

    /// Number of retired slots not yet back in the pool.
    #[inline]
    pub fn retired_count(&self) -> usize {
        self.retired.len()
    }

    /// Number of free dynamic slots.
    #[inline]
    pub fn available_slots(&self) -> usize {
        self.pool.available()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tex(n: i32) -> TextureId {
        TextureId::try_from_base_frame(n).unwrap()
    }

    #[test]
    fn test_enqueue_is_unique() {
        let mut queue = PendingUploadQueue::new();
        assert!(queue.enqueue(tex(1)));
        assert!(!queue.enqueue(tex(1)));
        assert!(queue.enqueue(tex(2)));
        assert!(!queue.enqueue(tex(1)));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.iter().collect::<Vec<_>>(), vec![tex(1), tex(2)]);
    }

    #[test]
    fn test_take_all_then_requeue_restores_order() {
        let mut queue = PendingUploadQueue::new();
        for n in [5, 3, 9, 1] {
            queue.enqueue(tex(n));
        }
        let before: Vec<_> = queue.iter().collect();

        let taken = queue.take_all();
        assert!(queue.is_empty());
        assert_eq!(taken, before);

        for id in &taken {
            assert!(queue.enqueue(*id));
        }
        assert_eq!(queue.iter().collect::<Vec<_>>(), before);
    }

    #[test]
    fn test_erase_then_enqueue_refreshes() {
        let mut queue = PendingUploadQueue::new();
        assert!(queue.enqueue(tex(1)));
        queue.enqueue(tex(2));
        assert!(queue.erase(tex(1)));
        assert!(!queue.erase(tex(1)));
        assert!(queue.enqueue(tex(1)));
        assert!(queue.contains(tex(1)));
        assert_eq!(queue.iter().collect::<Vec<_>>(), vec![tex(2), tex(1)]);
    }

    #[test]
    fn test_erase_preserves_order() {
        let mut queue = PendingUploadQueue::new();
        for n in 1..=4 {
            queue.enqueue(tex(n));
        }
        queue.erase(tex(2));
        assert_eq!(
            queue.iter().collect::<Vec<_>>(),
            vec![tex(1), tex(3), tex(4)]
        );
    }

    #[test]
    fn test_reserved_slots_distinct_and_outside_pool() {
        let pool = SlotPool::for_capacity(MAX_BINDLESS_TEXTURES);
        for (i, a) in RESERVED_SLOTS.iter().enumerate() {
            assert!(!pool.owns(*a));
            for b in &RESERVED_SLOTS[i + 1..] {
                assert_ne!(a, b);
            }
        }
        assert_eq!(pool.capacity(), MAX_BINDLESS_TEXTURES - FIRST_DYNAMIC_SLOT);
    }

    #[test]
    fn test_pool_never_hands_out_reserved() {
        let mut pool = SlotPool::new(0, 3);
        assert_eq!(pool.acquire(), Some(FIRST_DYNAMIC_SLOT));
        pool.release(DEFAULT_SPEC_SLOT);
        pool.release(FALLBACK_SLOT);
        assert_eq!(pool.available(), 2);
        while let Some(slot) = pool.acquire() {
            assert!(slot >= FIRST_DYNAMIC_SLOT);
        }
    }

    #[test]
    fn test_pool_lowest_first_and_reuse() {
        let mut pool = SlotPool::new(FIRST_DYNAMIC_SLOT, 3);
        assert_eq!(pool.acquire(), Some(4));
        assert_eq!(pool.acquire(), Some(5));
        pool.release(4);
        assert_eq!(pool.acquire(), Some(4));
        assert_eq!(pool.acquire(), Some(6));
        assert_eq!(pool.acquire(), None);
    }

    #[test]
    fn test_pressure_requeues_and_retries() {
        let mut residency = BindlessResidency::with_pool(SlotPool::new(FIRST_DYNAMIC_SLOT, 2), 0);
        for n in 1..=3 {
            assert!(residency.request(tex(n)));
        }

        let first = residency.process_pending();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].id, tex(1));
        assert_eq!(first[1].id, tex(2));
        assert_eq!(residency.pending().len(), 1);
        assert!(residency.is_pending(tex(3)));

        assert!(residency.release_now(tex(1)));
        let second = residency.process_pending();
        assert_eq!(
            second,
            vec![SlotAssignment {
                id: tex(3),
                slot: FIRST_DYNAMIC_SLOT
            }]
        );
        assert!(residency.pending().is_empty());
    }

    #[test]
    fn test_duplicate_requests_consume_one_slot() {
        let mut residency = BindlessResidency::new(MAX_BINDLESS_TEXTURES, 3);
        residency.request(tex(8));
        residency.request(tex(8));
        let assigned = residency.process_pending();
        assert_eq!(assigned.len(), 1);

        // Resident ids are never queued again
        assert!(!residency.request(tex(8)));
        assert!(residency.process_pending().is_empty());
        assert_eq!(residency.resident_count(), 1);
    }

    #[test]
    fn test_retire_holds_slot_until_serial_completes() {
        let mut residency = BindlessResidency::with_pool(SlotPool::new(FIRST_DYNAMIC_SLOT, 1), 3);
        residency.request(tex(1));
        residency.process_pending();
        assert_eq!(residency.slot_of(tex(1)), Some(FIRST_DYNAMIC_SLOT));

        assert_eq!(residency.retire(tex(1), 10), Some(FIRST_DYNAMIC_SLOT));
        assert_eq!(residency.slot_or_fallback(tex(1)), FALLBACK_SLOT);
        assert_eq!(residency.take_fallback_writes(), vec![FIRST_DYNAMIC_SLOT]);
        assert!(residency.take_fallback_writes().is_empty());

        residency.request(tex(2));
        assert!(residency.process_pending().is_empty());

        assert_eq!(residency.collect(12), 0);
        assert_eq!(residency.collect(13), 1);
        assert_eq!(residency.process_pending().len(), 1);
        assert_eq!(residency.slot_of(tex(2)), Some(FIRST_DYNAMIC_SLOT));
    }

    #[test]
    fn test_retire_unknown_id() {
        let mut residency = BindlessResidency::new(16, 3);
        residency.request(tex(4));
        // Pending but never resident: retire drops the request
        assert_eq!(residency.retire(tex(4), 1), None);
        assert!(!residency.is_pending(tex(4)));
        assert_eq!(residency.retired_count(), 0);
    }

    #[test]
    fn test_release_all_retired() {
        let mut residency = BindlessResidency::new(8, 3);
        residency.request(tex(1));
        residency.request(tex(2));
        residency.process_pending();
        residency.retire(tex(1), 5);
        residency.retire(tex(2), 6);
        let free_before = residency.available_slots();
        assert_eq!(residency.release_all_retired(), 2);
        assert_eq!(residency.available_slots(), free_before + 2);
    }
}
