//! Host buffers whose native storage is retired, never destroyed in place.
//!
//! # Overview
//!
//! A [`BufferHandle`] stays valid while the native buffer behind it is
//! replaced. Storage is created on the first [`update`](BufferManager::update).
//! After that, a [`UpdateHint::Dynamic`] buffer gets fresh storage on every
//! update, since frames still in flight may be reading the old contents. A
//! [`UpdateHint::Static`] buffer is rewritten in place and only re-created
//! when an update outgrows it. Every native buffer that is replaced or
//! deleted goes to the manager's [`DeferredReleaseQueue`], tagged with the
//! serial of the frame that may still read it, and is dropped by a later
//! [`collect`](BufferManager::collect).
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use vkframe_renderer::buffer_manager::{BufferManager, GpuBufferAllocator};
//! use vkframe_rhi::buffer::BufferUsage;
//! use vkframe_rhi::device::Device;
//!
//! # fn example(device: Arc<Device>) -> vkframe_renderer::RenderResult<()> {
//! let mut buffers = BufferManager::new(GpuBufferAllocator::new(device), 3);
//! let handle = buffers.create(BufferUsage::Vertex);
//!
//! buffers.update(handle, &[0u8; 256], 1)?;
//! buffers.update(handle, &[0u8; 256], 2)?; // first storage is retired at serial 2
//!
//! buffers.collect(5); // serial 2 is now old enough
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, warn};

use vkframe_rhi::buffer::{Buffer, BufferUsage};
use vkframe_rhi::device::Device;

use crate::deferred_release::{DeferredReleaseQueue, Serial};
use crate::error::{RenderError, RenderResult};

/// Creates and writes native buffers.
pub trait BufferAllocator {
    /// Owned native buffer. Dropping it destroys the GPU object.
    type Buffer: Send + 'static;

    /// Allocates a host-writable buffer of `size` bytes.
    fn allocate(&mut self, usage: BufferUsage, size: u64) -> RenderResult<Self::Buffer>;

    /// Writes `data` at `offset`.
    fn write(&self, buffer: &Self::Buffer, offset: u64, data: &[u8]) -> RenderResult<()>;

    /// Native handle.
    fn handle(buffer: &Self::Buffer) -> vk::Buffer;

    /// Size in bytes.
    fn size(buffer: &Self::Buffer) -> u64;
}

/// Allocator backed by the rhi [`Buffer`].
#[derive(Clone)]
pub struct GpuBufferAllocator {
    device: Arc<Device>,
}

impl GpuBufferAllocator {
    pub fn new(device: Arc<Device>) -> Self {
        Self { device }
    }
}

impl BufferAllocator for GpuBufferAllocator {
    type Buffer = Buffer;

    fn allocate(&mut self, usage: BufferUsage, size: u64) -> RenderResult<Buffer> {
        Ok(Buffer::new(Arc::clone(&self.device), usage, size)?)
    }

    fn write(&self, buffer: &Buffer, offset: u64, data: &[u8]) -> RenderResult<()> {
        Ok(buffer.write_data(offset, data)?)
    }

    fn handle(buffer: &Buffer) -> vk::Buffer {
        buffer.handle()
    }

    fn size(buffer: &Buffer) -> u64 {
        buffer.size()
    }
}

/// How a buffer's contents change over its lifetime.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum UpdateHint {
    /// Written once, or only while no submitted frame reads it. Updates
    /// that fit are written in place.
    Static,
    /// Rewritten while earlier frames may still read it. Every update
    /// orphans the old storage.
    #[default]
    Dynamic,
}

/// Stable reference to a managed buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BufferHandle(u32);

impl BufferHandle {
    #[inline]
    pub fn index(self) -> u32 {
        self.0
    }
}

struct Entry<B> {
    usage: BufferUsage,
    hint: UpdateHint,
    buffer: Option<B>,
    live: bool,
}

/// Owner of every host-managed buffer.
pub struct BufferManager<A: BufferAllocator> {
    allocator: A,
    entries: Vec<Entry<A::Buffer>>,
    free: Vec<u32>,
    releases: DeferredReleaseQueue,
}

impl<A: BufferAllocator> BufferManager<A> {
    /// Creates a manager whose retired buffers wait `window` serials.
    pub fn new(allocator: A, window: Serial) -> Self {
        Self {
            allocator,
            entries: Vec::new(),
            free: Vec::new(),
            releases: DeferredReleaseQueue::new(window),
        }
    }

    /// Registers a [`UpdateHint::Dynamic`] buffer. Storage is allocated by
    /// the first update.
    pub fn create(&mut self, usage: BufferUsage) -> BufferHandle {
        self.create_with_hint(usage, UpdateHint::Dynamic)
    }

    /// Registers a buffer with an explicit update hint.
    pub fn create_with_hint(&mut self, usage: BufferUsage, hint: UpdateHint) -> BufferHandle {
        let entry = Entry {
            usage,
            hint,
            buffer: None,
            live: true,
        };
        let index = match self.free.pop() {
            Some(index) => {
                self.entries[index as usize] = entry;
                index
            }
            None => {
                self.entries.push(entry);
                (self.entries.len() - 1) as u32
            }
        };
        BufferHandle(index)
    }

    /// Replaces the buffer's contents with `data`.
    ///
    /// Dynamic buffers always get new storage; static buffers only when
    /// `data` does not fit. Replaced storage is retired at `serial`. Empty
    /// data is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::UnknownBuffer`] for a deleted handle, or the
    /// allocator's error.
    pub fn update(&mut self, handle: BufferHandle, data: &[u8], serial: Serial) -> RenderResult<()> {
        if data.is_empty() {
            return Ok(());
        }
        let required = data.len() as u64;

        let entry = self.entry_mut(handle)?;
        let usage = entry.usage;
        let reusable = entry.hint == UpdateHint::Static
            && entry
                .buffer
                .as_ref()
                .is_some_and(|buffer| A::size(buffer) >= required);

        if !reusable {
            let replacement = self.allocator.allocate(usage, required)?;
            let entry = self.entry_mut(handle)?;
            if let Some(old) = entry.buffer.replace(replacement) {
                debug!(
                    "Buffer {} re-allocated ({} bytes); retiring old storage at serial {}",
                    handle.0, required, serial
                );
                self.releases.enqueue(serial, move || drop(old));
            }
        }

        let buffer = self
            .entries
            .get(handle.0 as usize)
            .and_then(|entry| entry.buffer.as_ref())
            .ok_or(RenderError::UnknownBuffer(handle.0))?;
        self.allocator.write(buffer, 0, data)
    }

    /// Deletes the buffer, retiring its storage at `serial`.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::UnknownBuffer`] if the handle is not live.
    pub fn delete(&mut self, handle: BufferHandle, serial: Serial) -> RenderResult<()> {
        let entry = self.entry_mut(handle)?;
        entry.live = false;
        if let Some(old) = entry.buffer.take() {
            self.releases.enqueue(serial, move || drop(old));
        }
        self.free.push(handle.0);
        Ok(())
    }

    /// Native handle of the current storage.
    ///
    /// `None` for unknown handles and for buffers never updated.
    pub fn get(&self, handle: BufferHandle) -> Option<vk::Buffer> {
        self.entries
            .get(handle.0 as usize)
            .filter(|entry| entry.live)
            .and_then(|entry| entry.buffer.as_ref())
            .map(A::handle)
    }

    /// Usage the buffer was created with.
    pub fn usage(&self, handle: BufferHandle) -> Option<BufferUsage> {
        self.entries
            .get(handle.0 as usize)
            .filter(|entry| entry.live)
            .map(|entry| entry.usage)
    }

    /// Update hint the buffer was created with.
    pub fn hint(&self, handle: BufferHandle) -> Option<UpdateHint> {
        self.entries
            .get(handle.0 as usize)
            .filter(|entry| entry.live)
            .map(|entry| entry.hint)
    }

    /// Number of live handles.
    pub fn live_count(&self) -> usize {
        self.entries.iter().filter(|entry| entry.live).count()
    }

    /// Number of retired storages not yet destroyed.
    #[inline]
    pub fn pending_release(&self) -> usize {
        self.releases.len()
    }

    /// Destroys retired storage whose serial has aged out.
    pub fn collect(&mut self, completed: Serial) -> usize {
        self.releases.collect(completed)
    }

    /// Destroys everything, live or retired.
    ///
    /// The GPU must be idle.
    pub fn shutdown(&mut self) {
        let retired = self.releases.clear();
        let live = self.live_count();
        self.entries.clear();
        self.free.clear();
        debug!(
            "Buffer manager shut down ({} live, {} retired)",
            live, retired
        );
    }

    #[inline]
    pub fn allocator(&self) -> &A {
        &self.allocator
    }

    #[inline]
    pub fn allocator_mut(&mut self) -> &mut A {
        &mut self.allocator
    }

    fn entry_mut(&mut self, handle: BufferHandle) -> RenderResult<&mut Entry<A::Buffer>> {
        match self.entries.get_mut(handle.0 as usize) {
            Some(entry) if entry.live => Ok(entry),
            _ => {
                warn!("Operation on unknown buffer handle {}", handle.0);
                Err(RenderError::UnknownBuffer(handle.0))
            }
        }
    }
}

impl<A: BufferAllocator> Drop for BufferManager<A> {
    fn drop(&mut self) {
        if !self.releases.is_empty() {
            debug!(
                "Buffer manager dropped with {} retired buffers",
                self.releases.len()
            );
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use ash::vk::Handle;

    pub(crate) struct FakeBuffer {
        pub(crate) id: u64,
        pub(crate) size: u64,
        drops: Arc<AtomicUsize>,
    }

    impl Drop for FakeBuffer {
        fn drop(&mut self) {
            self.drops.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    pub(crate) struct FakeAllocator {
        next: u64,
        pub(crate) drops: Arc<AtomicUsize>,
        pub(crate) writes: Mutex<Vec<(u64, u64, usize)>>,
    }

    impl BufferAllocator for FakeAllocator {
        type Buffer = FakeBuffer;

        fn allocate(&mut self, _usage: BufferUsage, size: u64) -> RenderResult<FakeBuffer> {
            self.next += 1;
            Ok(FakeBuffer {
                id: self.next,
                size,
                drops: Arc::clone(&self.drops),
            })
        }

        fn write(&self, buffer: &FakeBuffer, offset: u64, data: &[u8]) -> RenderResult<()> {
            if offset + data.len() as u64 > buffer.size {
                return Err(RenderError::UnknownBuffer(buffer.id as u32));
            }
            if let Ok(mut writes) = self.writes.lock() {
                writes.push((buffer.id, offset, data.len()));
            }
            Ok(())
        }

        fn handle(buffer: &FakeBuffer) -> vk::Buffer {
            vk::Buffer::from_raw(buffer.id)
        }

        fn size(buffer: &FakeBuffer) -> u64 {
            buffer.size
        }
    }

    fn drops(manager: &BufferManager<FakeAllocator>) -> usize {
        manager.allocator().drops.load(Ordering::SeqCst)
    }

    #[test]
    fn test_storage_is_lazy() {
        let mut manager = BufferManager::new(FakeAllocator::default(), 3);
        let handle = manager.create(BufferUsage::Uniform);
        assert_eq!(manager.get(handle), None);
        assert_eq!(manager.usage(handle), Some(BufferUsage::Uniform));

        manager.update(handle, &[1, 2, 3, 4], 1).unwrap();
        assert_eq!(manager.get(handle), Some(vk::Buffer::from_raw(1)));
    }

    #[test]
    fn test_dynamic_update_never_overwrites_inflight_storage() {
        let mut manager = BufferManager::new(FakeAllocator::default(), 3);
        let handle = manager.create(BufferUsage::Uniform);
        assert_eq!(manager.hint(handle), Some(UpdateHint::Dynamic));
        manager.update(handle, &[0; 64], 1).unwrap();
        manager.update(handle, &[0; 64], 2).unwrap();
        manager.update(handle, &[0; 32], 2).unwrap();

        assert_eq!(manager.get(handle), Some(vk::Buffer::from_raw(3)));
        assert_eq!(manager.pending_release(), 2);
        let writes = manager.allocator().writes.lock().unwrap().clone();
        assert_eq!(writes, vec![(1, 0, 64), (2, 0, 64), (3, 0, 32)]);

        assert_eq!(manager.collect(4), 0);
        assert_eq!(manager.collect(5), 2);
        assert_eq!(drops(&manager), 2);
    }

    #[test]
    fn test_static_update_in_place_when_it_fits() {
        let mut manager = BufferManager::new(FakeAllocator::default(), 3);
        let handle = manager.create_with_hint(BufferUsage::Vertex, UpdateHint::Static);
        manager.update(handle, &[0; 64], 1).unwrap();
        manager.update(handle, &[0; 32], 2).unwrap();

        assert_eq!(manager.get(handle), Some(vk::Buffer::from_raw(1)));
        assert_eq!(manager.pending_release(), 0);
    }

    #[test]
    fn test_growing_retires_old_storage() {
        let mut manager = BufferManager::new(FakeAllocator::default(), 3);
        let handle = manager.create_with_hint(BufferUsage::Vertex, UpdateHint::Static);
        manager.update(handle, &[0; 64], 1).unwrap();
        manager.update(handle, &[0; 128], 5).unwrap();

        assert_eq!(manager.get(handle), Some(vk::Buffer::from_raw(2)));
        assert_eq!(manager.pending_release(), 1);
        assert_eq!(drops(&manager), 0);

        assert_eq!(manager.collect(7), 0);
        assert_eq!(drops(&manager), 0);
        assert_eq!(manager.collect(8), 1);
        assert_eq!(drops(&manager), 1);
    }

    #[test]
    fn test_delete_retires_and_invalidates() {
        let mut manager = BufferManager::new(FakeAllocator::default(), 2);
        let handle = manager.create(BufferUsage::Index);
        manager.update(handle, &[0; 16], 3).unwrap();
        manager.delete(handle, 4).unwrap();

        assert_eq!(manager.get(handle), None);
        assert_eq!(manager.live_count(), 0);
        assert!(matches!(
            manager.update(handle, &[0; 4], 4),
            Err(RenderError::UnknownBuffer(_))
        ));
        assert!(manager.delete(handle, 4).is_err());

        assert_eq!(drops(&manager), 0);
        manager.collect(6);
        assert_eq!(drops(&manager), 1);
    }

    #[test]
    fn test_deleted_index_is_reused() {
        let mut manager = BufferManager::new(FakeAllocator::default(), 2);
        let a = manager.create(BufferUsage::Vertex);
        manager.delete(a, 1).unwrap();
        let b = manager.create(BufferUsage::Uniform);
        assert_eq!(a.index(), b.index());
        assert_eq!(manager.usage(b), Some(BufferUsage::Uniform));
    }

    #[test]
    fn test_empty_update_is_noop() {
        let mut manager = BufferManager::new(FakeAllocator::default(), 2);
        let handle = manager.create(BufferUsage::Vertex);
        manager.update(handle, &[], 1).unwrap();
        assert_eq!(manager.get(handle), None);
    }

    #[test]
    fn test_writes_reach_allocator() {
        let mut manager = BufferManager::new(FakeAllocator::default(), 2);
        let handle = manager.create(BufferUsage::Storage);
        manager.update(handle, &[7; 48], 1).unwrap();
        let writes = manager.allocator().writes.lock().unwrap().clone();
        assert_eq!(writes, vec![(1, 0, 48)]);
    }

    #[test]
    fn test_shutdown_destroys_everything() {
        let mut manager = BufferManager::new(FakeAllocator::default(), 3);
        let a = manager.create(BufferUsage::Vertex);
        let b = manager.create(BufferUsage::Vertex);
        manager.update(a, &[0; 8], 1).unwrap();
        manager.update(b, &[0; 8], 1).unwrap();
        manager.update(b, &[0; 16], 2).unwrap();

        manager.shutdown();
        assert_eq!(drops(&manager), 3);
        assert_eq!(manager.live_count(), 0);
        assert_eq!(manager.pending_release(), 0);
    }
}
