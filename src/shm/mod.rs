//! Shared-memory backing store
//!
//! Windows paint into `wl_shm` buffers: anonymous shared-memory segments the
//! compositor maps on its side. Each [`ShmBuffer`] owns one segment (the file
//! descriptor is passed once, at `wl_shm_pool` creation, and the buffer is carved
//! from it at offset 0), its mapping, and the wire objects.
//!
//! [`ShmPool`] tracks a bounded set of those buffers per window. A buffer is *busy*
//! from the commit that attaches it until the compositor sends its `release`, and a
//! busy buffer is never handed out again: reusing it would corrupt pixels the
//! compositor may still be reading. When every slot is busy and the pool is at
//! capacity, acquisition stalls (the caller pumps the event queue) until a release
//! arrives. That backpressure is deliberate; growing the pool without bound under a
//! slow compositor is not an acceptable failure mode.

use std::io;
use std::os::fd::{AsFd, OwnedFd};
use std::ptr::{self, NonNull};
use std::slice;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rustix::fs::MemfdFlags;
use rustix::mm::{MapFlags, ProtFlags};
use tracing::{debug, trace};
use wayland_client::protocol::{wl_buffer, wl_shm, wl_shm_pool};
use wayland_client::{Connection, Dispatch, Proxy, QueueHandle};

use crate::client::ClientState;
use crate::display::EngineError;
use crate::utils::Size;

/// Bytes per pixel of the supported formats (ARGB8888 / XRGB8888)
const PIXEL_SIZE: i32 = 4;

/// Upper bound on the number of buffers a single window's pool may hold.
///
/// Two buffers suffice for steady-state double buffering; the extra headroom covers
/// resize bursts where differently-sized buffers are briefly in flight.
pub const MAX_BUFFERS: usize = 5;

/// Bookkeeping shared between the pool and the `wl_buffer` user data
///
/// The release event may arrive on the queue after the pool has already torn the
/// buffer down locally; the `Arc` keeps the flags alive so that late release is a
/// harmless store.
#[derive(Debug, Default)]
pub(crate) struct BufferSlot {
    busy: AtomicBool,
    dead: AtomicBool,
}

impl BufferSlot {
    pub(crate) fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    fn set_busy(&self, busy: bool) {
        self.busy.store(busy, Ordering::Release);
    }
}

/// A memory-mapped shared-memory segment
struct MemMap {
    ptr: NonNull<u8>,
    len: usize,
    _fd: OwnedFd,
}

// The mapping is only ever accessed through &mut MemMap on the owning queue's
// thread; the pointer itself is safe to move between threads.
unsafe impl Send for MemMap {}

impl std::fmt::Debug for MemMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemMap").field("len", &self.len).finish()
    }
}

impl MemMap {
    fn new(fd: OwnedFd, len: usize) -> io::Result<MemMap> {
        let ptr = unsafe {
            rustix::mm::mmap(
                ptr::null_mut(),
                len,
                ProtFlags::READ | ProtFlags::WRITE,
                MapFlags::SHARED,
                &fd,
                0,
            )
        }
        .map_err(io::Error::from)?;
        let ptr = NonNull::new(ptr as *mut u8)
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "mmap returned NULL"))?;
        Ok(MemMap { ptr, len, _fd: fd })
    }

    fn bytes(&self) -> &[u8] {
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for MemMap {
    fn drop(&mut self) {
        let _ = unsafe { rustix::mm::munmap(self.ptr.as_ptr().cast(), self.len) };
    }
}

/// Allocate an anonymous shared-memory segment of `len` bytes
///
/// memfd is the first choice; a sealed temporary file is the fallback on systems
/// without it.
fn allocate_segment(len: usize) -> io::Result<OwnedFd> {
    match rustix::fs::memfd_create("bellows-shm", MemfdFlags::CLOEXEC | MemfdFlags::ALLOW_SEALING) {
        Ok(fd) => {
            rustix::fs::ftruncate(&fd, len as u64).map_err(io::Error::from)?;
            Ok(fd)
        }
        Err(_) => {
            let file = tempfile::tempfile()?;
            file.set_len(len as u64)?;
            Ok(OwnedFd::from(file))
        }
    }
}

/// One shared-memory buffer: segment, mapping and wire objects
#[derive(Debug)]
pub struct ShmBuffer {
    slot: Arc<BufferSlot>,
    wire: wl_buffer::WlBuffer,
    pool: wl_shm_pool::WlShmPool,
    map: MemMap,
    size: Size<i32>,
}

impl ShmBuffer {
    fn allocate(
        shm: &wl_shm::WlShm,
        qh: &QueueHandle<ClientState>,
        size: Size<i32>,
        format: wl_shm::Format,
    ) -> Result<ShmBuffer, EngineError> {
        debug_assert!(size.is_positive());
        let stride = size.w * PIXEL_SIZE;
        let len = (stride * size.h) as usize;
        let fd = allocate_segment(len)?;
        let slot = Arc::new(BufferSlot::default());
        let pool = shm.create_pool(fd.as_fd(), len as i32, qh, ());
        let wire = pool.create_buffer(0, size.w, size.h, stride, format, qh, slot.clone());
        let map = MemMap::new(fd, len)?;
        debug!(?size, len, "allocated shm buffer");
        Ok(ShmBuffer {
            slot,
            wire,
            pool,
            map,
            size,
        })
    }

    /// The wire buffer object
    pub fn wl_buffer(&self) -> &wl_buffer::WlBuffer {
        &self.wire
    }

    /// Logical size of the buffer, in pixels
    pub fn size(&self) -> Size<i32> {
        self.size
    }

    /// Row stride, in bytes
    pub fn stride(&self) -> i32 {
        self.size.w * PIXEL_SIZE
    }

    /// Whether the compositor still holds this buffer
    pub fn is_busy(&self) -> bool {
        self.slot.is_busy()
    }

    /// The writable pixel contents
    ///
    /// Callers must only write here while the buffer is not busy.
    pub fn canvas(&mut self) -> &mut [u8] {
        self.map.bytes_mut()
    }

    pub(crate) fn mark_busy(&self) {
        self.slot.set_busy(true);
    }

    fn destroy(self) {
        self.slot.dead.store(true, Ordering::Release);
        self.wire.destroy();
        self.pool.destroy();
        // mapping is unmapped on drop
    }
}

/// What to do for an acquisition, given the pool contents
///
/// Factored out of the wire plumbing so the bound and reuse rules are testable as
/// plain data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotDecision {
    /// Reuse the free, size-matching buffer at this index
    Reuse(usize),
    /// Destroy the free but wrongly-sized buffer at this index and allocate anew
    Recycle(usize),
    /// Allocate a new buffer; the pool is below capacity
    Allocate,
    /// Everything is busy and the pool is full: wait for a release
    Stall,
}

fn plan_acquire(slots: &[(bool, Size<i32>)], want: Size<i32>, capacity: usize) -> SlotDecision {
    if let Some(idx) = slots.iter().position(|&(busy, size)| !busy && size == want) {
        return SlotDecision::Reuse(idx);
    }
    // A free buffer of the wrong size is stale capacity: a resize invalidated its
    // content anyway, so reclaim the memory rather than hoarding it.
    if let Some(idx) = slots.iter().position(|&(busy, _)| !busy) {
        return SlotDecision::Recycle(idx);
    }
    if slots.len() < capacity {
        return SlotDecision::Allocate;
    }
    SlotDecision::Stall
}

/// The buffer that should seed the content of the buffer at `idx`, if any
///
/// Only a same-size source is usable; after a resize the old content is invalid
/// and the fresh buffer starts from scratch.
fn seed_source(recent: Option<usize>, sizes: &[Size<i32>], idx: usize) -> Option<usize> {
    let recent = recent?;
    if recent == idx || recent >= sizes.len() || idx >= sizes.len() {
        return None;
    }
    (sizes[recent] == sizes[idx]).then_some(recent)
}

/// A bounded pool of shared-memory buffers backing one window
#[derive(Debug)]
pub struct ShmPool {
    buffers: Vec<ShmBuffer>,
    /// Index of the most recently committed buffer, the copy-forward source
    recent: Option<usize>,
    format: wl_shm::Format,
}

impl ShmPool {
    pub(crate) fn new(format: wl_shm::Format) -> ShmPool {
        ShmPool {
            buffers: Vec::new(),
            recent: None,
            format,
        }
    }

    /// The buffers currently held by the pool
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    /// Whether the pool holds no buffers
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Access a buffer by pool index
    pub fn buffer(&self, idx: usize) -> Option<&ShmBuffer> {
        self.buffers.get(idx)
    }

    /// Access a buffer by pool index, mutably
    pub fn buffer_mut(&mut self, idx: usize) -> Option<&mut ShmBuffer> {
        self.buffers.get_mut(idx)
    }

    /// Try to acquire a free buffer of the given size
    ///
    /// Returns `Ok(None)` when the pool is exhausted; the caller is expected to
    /// block-dispatch and retry ([`crate::display::Display::acquire_buffer`] does).
    pub(crate) fn try_acquire(
        &mut self,
        shm: &wl_shm::WlShm,
        qh: &QueueHandle<ClientState>,
        size: Size<i32>,
    ) -> Result<Option<usize>, EngineError> {
        let slots: Vec<(bool, Size<i32>)> = self
            .buffers
            .iter()
            .map(|b| (b.is_busy(), b.size()))
            .collect();
        match plan_acquire(&slots, size, MAX_BUFFERS) {
            SlotDecision::Reuse(idx) => {
                self.copy_forward(idx);
                Ok(Some(idx))
            }
            SlotDecision::Recycle(idx) => {
                trace!(index = idx, "recycling wrongly-sized free buffer");
                let replacement = ShmBuffer::allocate(shm, qh, size, self.format)?;
                let old = std::mem::replace(&mut self.buffers[idx], replacement);
                old.destroy();
                if self.recent == Some(idx) {
                    // resize invalidates content, nothing to copy forward from
                    self.recent = None;
                }
                Ok(Some(idx))
            }
            SlotDecision::Allocate => {
                self.buffers
                    .push(ShmBuffer::allocate(shm, qh, size, self.format)?);
                let idx = self.buffers.len() - 1;
                // The previous frame's pixels seed the fresh buffer, so a
                // damage-only repaint right after the pool grows still presents a
                // complete image. Reading the busy source is fine: the compositor
                // only ever reads it.
                self.copy_forward(idx);
                Ok(Some(idx))
            }
            SlotDecision::Stall => Ok(None),
        }
    }

    /// Copy the most recent buffer's content into the buffer at `idx`
    ///
    /// Only performed when the sizes match: incremental (damage-region) repaints
    /// stay valid across a buffer swap, while a resize starts from scratch.
    fn copy_forward(&mut self, idx: usize) {
        let sizes: Vec<Size<i32>> = self.buffers.iter().map(|b| b.size()).collect();
        let Some(recent) = seed_source(self.recent, &sizes, idx) else {
            return;
        };
        let (src, dst) = if recent < idx {
            let (a, b) = self.buffers.split_at_mut(idx);
            (&a[recent], &mut b[0])
        } else {
            let (a, b) = self.buffers.split_at_mut(recent);
            let dst = &mut a[idx];
            (&b[0], dst)
        };
        dst.map.bytes_mut().copy_from_slice(src.map.bytes());
    }

    /// Note that the buffer at `idx` was just committed
    pub(crate) fn note_committed(&mut self, idx: usize) {
        if let Some(buffer) = self.buffers.get(idx) {
            buffer.mark_busy();
            self.recent = Some(idx);
        }
    }

    pub(crate) fn destroy(&mut self) {
        for buffer in self.buffers.drain(..) {
            buffer.destroy();
        }
        self.recent = None;
    }
}

impl Dispatch<wl_shm::WlShm, ()> for ClientState {
    fn event(
        state: &mut Self,
        _shm: &wl_shm::WlShm,
        event: wl_shm::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        if let wl_shm::Event::Format { format } = event {
            if let wayland_client::WEnum::Value(format) = format {
                state.shm_formats.push(format);
            }
        }
    }
}

impl Dispatch<wl_shm_pool::WlShmPool, ()> for ClientState {
    fn event(
        _state: &mut Self,
        _pool: &wl_shm_pool::WlShmPool,
        _event: <wl_shm_pool::WlShmPool as Proxy>::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        // wl_shm_pool has no events
    }
}

impl Dispatch<wl_buffer::WlBuffer, Arc<BufferSlot>> for ClientState {
    fn event(
        _state: &mut Self,
        _buffer: &wl_buffer::WlBuffer,
        event: wl_buffer::Event,
        data: &Arc<BufferSlot>,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        if let wl_buffer::Event::Release = event {
            if data.dead.load(Ordering::Acquire) {
                // Local teardown already started; the compositor's release crossing
                // it on the wire is expected and ignored.
                trace!("release for locally destroyed buffer");
                return;
            }
            data.set_busy(false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: Size<i32> = Size { w: 640, h: 480 };
    const B: Size<i32> = Size { w: 800, h: 600 };

    #[test]
    fn acquire_prefers_free_matching_buffer() {
        let slots = [(true, A), (false, A), (false, B)];
        assert_eq!(plan_acquire(&slots, A, MAX_BUFFERS), SlotDecision::Reuse(1));
    }

    #[test]
    fn busy_buffers_are_never_handed_out() {
        let slots = [(true, A), (true, A)];
        assert_eq!(plan_acquire(&slots, A, MAX_BUFFERS), SlotDecision::Allocate);
    }

    #[test]
    fn wrongly_sized_free_buffer_is_recycled() {
        let slots = [(true, B), (false, A)];
        assert_eq!(plan_acquire(&slots, B, MAX_BUFFERS), SlotDecision::Recycle(1));
    }

    #[test]
    fn pool_never_exceeds_capacity() {
        // capacity 2, both busy: the only legal outcome is to stall
        let slots = [(true, A), (true, A)];
        assert_eq!(plan_acquire(&slots, A, 2), SlotDecision::Stall);
    }

    #[test]
    fn stall_resolves_once_a_release_arrives() {
        let mut slots = vec![(true, A), (true, A)];
        assert_eq!(plan_acquire(&slots, A, 2), SlotDecision::Stall);
        // the compositor releases the first buffer
        slots[0].0 = false;
        assert_eq!(plan_acquire(&slots, A, 2), SlotDecision::Reuse(0));
    }

    #[test]
    fn fresh_buffer_is_seeded_from_the_committed_one() {
        // steady-state double buffering: buffer 0 committed and busy, buffer 1
        // freshly allocated at the same size
        assert_eq!(seed_source(Some(0), &[A, A], 1), Some(0));
    }

    #[test]
    fn resize_never_seeds_across_sizes() {
        assert_eq!(seed_source(Some(0), &[A, B], 1), None);
        assert_eq!(seed_source(None, &[A, A], 1), None);
        assert_eq!(seed_source(Some(1), &[A, A], 1), None);
    }

    #[test]
    fn slot_release_is_idempotent_after_teardown() {
        let slot = BufferSlot::default();
        slot.set_busy(true);
        slot.dead.store(true, Ordering::Release);
        // a late release must not panic nor resurrect the slot
        slot.set_busy(false);
        assert!(!slot.is_busy());
    }
}
