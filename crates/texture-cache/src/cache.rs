//! [`TextureCache`]: a fixed ring of texture slots with an atomically
//! published current slot.
//!
//! The producer writes slot `cursor % N`, which is never the current slot,
//! and stores the new current index only after the upload finished. Readers
//! load the current index and pin that slot with a non-blocking `try_read`.
//! If the writer has lapped the ring and holds the slot they loaded, they
//! reload the index and land on a slot the writer is not touching.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, TryLockError};

use cvcam_core::{ImageError, PixelFormat, ProcessedImage};
use thiserror::Error;
use tracing::{debug, trace};

use crate::backend::{BackendError, TextureBackend};

/// Number of slots used by [`TextureCache::new`].
pub const DEFAULT_CACHE_SIZE: usize = 3;

/// Sentinel stored in `current` while nothing is published.
const NO_SLOT: usize = usize::MAX;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PublishError {
    #[error("invalid image: {0}")]
    InvalidImage(#[from] ImageError),
    #[error("texture allocation failed: {0}")]
    AllocationFailure(BackendError),
    #[error("texture upload failed: {0}")]
    UploadFailure(BackendError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    #[error("a texture cache needs at least 2 slots, got {0}")]
    InvalidCapacity(usize),
}

/// What a reader gets for the current texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureHandle {
    /// Ring slot holding the texture.
    pub slot: usize,
    /// Backend handle, see [`TextureBackend::raw_handle`].
    pub raw: u64,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// Zero-based count of the successful publish that produced this
    /// texture.
    pub sequence: u64,
}

impl TextureHandle {
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

struct TextureSlot<T> {
    texture: Option<T>,
    width: u32,
    height: u32,
    format: Option<PixelFormat>,
    initialized: bool,
    /// Image currently resident in the slot; dropped when the slot is
    /// reused or invalidated.
    image: Option<ProcessedImage>,
    raw: u64,
    sequence: u64,
}

impl<T> TextureSlot<T> {
    fn empty() -> Self {
        Self {
            texture: None,
            width: 0,
            height: 0,
            format: None,
            initialized: false,
            image: None,
            raw: 0,
            sequence: 0,
        }
    }

    fn reusable(&mut self, width: u32, height: u32, format: PixelFormat) -> Option<&mut T> {
        if self.width == width && self.height == height && self.format == Some(format) {
            self.texture.as_mut()
        } else {
            None
        }
    }

    fn handle(&self, slot: usize) -> Option<TextureHandle> {
        if !self.initialized {
            return None;
        }
        Some(TextureHandle {
            slot,
            raw: self.raw,
            width: self.width,
            height: self.height,
            format: self.format?,
            sequence: self.sequence,
        })
    }
}

/// Ring-buffered texture cache.
///
/// `publish` and `current_texture` may run concurrently from different
/// threads; concurrent `publish` calls are serialised.
pub struct TextureCache<B: TextureBackend> {
    /// Owns the backend and serialises writers.
    writer: Mutex<B>,
    slots: Box<[RwLock<TextureSlot<B::Texture>>]>,
    /// Index of the most recently completed slot, or [`NO_SLOT`].
    current: AtomicUsize,
    /// Successful publishes so far. Only advanced under `writer`.
    cursor: AtomicU64,
}

impl<B: TextureBackend> std::fmt::Debug for TextureCache<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextureCache")
            .field("capacity", &self.slots.len())
            .field("current", &self.current_slot())
            .field("published", &self.published_count())
            .finish()
    }
}

impl<B: TextureBackend> TextureCache<B> {
    /// Cache with [`DEFAULT_CACHE_SIZE`] slots.
    pub fn new(backend: B) -> Self {
        Self::build(backend, DEFAULT_CACHE_SIZE)
    }

    /// Cache with `slots` slots. At least two are needed so the slot being
    /// written is never the one being read.
    pub fn with_capacity(backend: B, slots: usize) -> Result<Self, CacheError> {
        if slots < 2 {
            return Err(CacheError::InvalidCapacity(slots));
        }
        Ok(Self::build(backend, slots))
    }

    fn build(backend: B, slots: usize) -> Self {
        debug!(backend = backend.name(), slots, "creating texture cache");
        Self {
            writer: Mutex::new(backend),
            slots: (0..slots).map(|_| RwLock::new(TextureSlot::empty())).collect(),
            current: AtomicUsize::new(NO_SLOT),
            cursor: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of successful publishes, i.e. the ring cursor.
    pub fn published_count(&self) -> u64 {
        self.cursor.load(Ordering::Acquire)
    }

    /// Upload `image` into the next slot and make it current.
    ///
    /// On error the frame is dropped: the current texture, the cursor and
    /// every slot other than the target stay as they were. An allocation
    /// failure also leaves the target slot untouched.
    pub fn publish(&self, image: ProcessedImage) -> Result<TextureHandle, PublishError> {
        image.validate()?;

        let mut backend = self.lock_writer();
        let sequence = self.cursor.load(Ordering::Relaxed);
        let index = (sequence % self.slots.len() as u64) as usize;
        debug_assert_ne!(index, self.current.load(Ordering::Acquire));

        let mut slot = self.slots[index]
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let (width, height) = image.dimensions();
        let format = image.format();

        let raw = match slot.reusable(width, height, format) {
            Some(texture) => {
                let raw = B::raw_handle(texture);
                if let Err(err) = backend.upload(texture, &image) {
                    // Possibly half written; the slot is not current, keep
                    // it out of reach until the next successful upload.
                    slot.initialized = false;
                    return Err(PublishError::UploadFailure(err));
                }
                raw
            }
            None => {
                let mut texture = backend
                    .allocate(width, height, format)
                    .map_err(PublishError::AllocationFailure)?;
                if let Err(err) = backend.upload(&mut texture, &image) {
                    backend.release(texture);
                    return Err(PublishError::UploadFailure(err));
                }
                debug!(
                    slot = index,
                    width,
                    height,
                    ?format,
                    "reallocated texture slot"
                );
                let raw = B::raw_handle(&texture);
                if let Some(old) = slot.texture.replace(texture) {
                    backend.release(old);
                }
                slot.width = width;
                slot.height = height;
                slot.format = Some(format);
                raw
            }
        };

        slot.raw = raw;
        slot.image = Some(image);
        slot.initialized = true;
        slot.sequence = sequence;
        let handle = TextureHandle {
            slot: index,
            raw,
            width,
            height,
            format,
            sequence,
        };

        // Publish while still holding the slot: a reader that sees the new
        // index waits for the unlock instead of reading the slot's previous
        // occupant, so `current_texture` never goes backwards.
        self.current.store(index, Ordering::Release);
        self.cursor.store(sequence + 1, Ordering::Release);
        drop(slot);

        trace!(slot = index, sequence, "published texture");
        Ok(handle)
    }

    /// The most recently completed texture, or `None` before the first
    /// publish and after [`invalidate_all`](Self::invalidate_all).
    ///
    /// Never blocks and never allocates.
    pub fn current_texture(&self) -> Option<TextureHandle> {
        self.read_current(|handle, _| *handle)
    }

    /// Run `f` against the current texture while its slot is pinned.
    ///
    /// The writer cannot reuse the slot until `f` returns, so renderers can
    /// issue draw calls against the texture inside `f`. Keep `f` short: a
    /// writer that laps the ring waits for it.
    pub fn read_current<R>(&self, f: impl FnOnce(&TextureHandle, &B::Texture) -> R) -> Option<R> {
        loop {
            let index = self.current.load(Ordering::Acquire);
            if index == NO_SLOT {
                return None;
            }
            let slot = match self.slots[index].try_read() {
                Ok(slot) => slot,
                Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
                Err(TryLockError::WouldBlock) => {
                    // Either lapped by the writer (reload lands elsewhere) or
                    // the slot was just published and is being unlocked.
                    std::hint::spin_loop();
                    continue;
                }
            };
            match (slot.handle(index), slot.texture.as_ref()) {
                (Some(handle), Some(texture)) => return Some(f(&handle, texture)),
                // Stale index whose slot failed an upload or was
                // invalidated since; reload.
                _ => continue,
            }
        }
    }

    /// Drop every texture and resident image, e.g. when the render surface
    /// that owns the textures is destroyed.
    ///
    /// The cursor keeps counting; the next publish simply reallocates.
    pub fn invalidate_all(&self) {
        let mut backend = self.lock_writer();
        self.current.store(NO_SLOT, Ordering::Release);

        let mut released = 0usize;
        for slot in self.slots.iter() {
            let mut slot = slot.write().unwrap_or_else(PoisonError::into_inner);
            if let Some(texture) = slot.texture.take() {
                backend.release(texture);
                released += 1;
            }
            *slot = TextureSlot::empty();
        }
        debug!(released, "invalidated texture cache");
    }

    /// Dimensions of the texture stored in slot `index`, if any.
    pub fn slot_dimensions(&self, index: usize) -> Option<(u32, u32)> {
        let slot = self
            .slots
            .get(index)?
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        slot.texture.as_ref().map(|_| (slot.width, slot.height))
    }

    /// Number of processed images currently owned by the cache.
    pub fn resident_images(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| {
                slot.read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .image
                    .is_some()
            })
            .count()
    }

    /// Index of the current slot.
    pub fn current_slot(&self) -> Option<usize> {
        let index = self.current.load(Ordering::Acquire);
        (index != NO_SLOT).then_some(index)
    }

    /// Run `f` with the backend. Blocks while a publish is in progress.
    pub fn with_backend<R>(&self, f: impl FnOnce(&B) -> R) -> R {
        f(&self.lock_writer())
    }

    fn lock_writer(&self) -> MutexGuard<'_, B> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<B: TextureBackend> Drop for TextureCache<B> {
    fn drop(&mut self) {
        let backend = self
            .writer
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        for slot in self.slots.iter_mut() {
            let slot = slot.get_mut().unwrap_or_else(PoisonError::into_inner);
            if let Some(texture) = slot.texture.take() {
                backend.release(texture);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{HostBackend, HostTexture};
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;
    use std::thread;

    fn image(width: u32, height: u32, value: u8) -> ProcessedImage {
        ProcessedImage::filled(width, height, PixelFormat::Rgb8, value)
    }

    fn current_pixels(cache: &TextureCache<HostBackend>) -> Option<Vec<u8>> {
        cache.read_current(|_, texture: &HostTexture| texture.pixels().to_vec())
    }

    #[test]
    fn fresh_cache_has_no_current_texture() {
        let cache = TextureCache::new(HostBackend::new());
        assert_eq!(cache.current_texture(), None);
        assert_eq!(cache.capacity(), DEFAULT_CACHE_SIZE);
        assert_eq!(cache.published_count(), 0);
    }

    #[test]
    fn rejects_single_slot_ring() {
        assert_eq!(
            TextureCache::with_capacity(HostBackend::new(), 1).err(),
            Some(CacheError::InvalidCapacity(1))
        );
        assert!(TextureCache::with_capacity(HostBackend::new(), 2).is_ok());
    }

    #[test]
    fn current_follows_each_publish() {
        let cache = TextureCache::new(HostBackend::new());
        for k in 0..7u8 {
            let handle = cache.publish(image(4, 4, k)).unwrap();
            let current = cache.current_texture().unwrap();
            assert_eq!(current, handle);
            assert_eq!(current.sequence, k as u64);
            assert_eq!(current.slot, k as usize % DEFAULT_CACHE_SIZE);
            assert_eq!(current_pixels(&cache).unwrap(), vec![k; 48]);
        }
        assert_eq!(cache.published_count(), 7);
    }

    #[test]
    fn invalid_image_leaves_current_unchanged() {
        let cache = TextureCache::new(HostBackend::new());
        let before = cache.publish(image(4, 4, 1)).unwrap();

        let short = ProcessedImage::rgb(4, 4, vec![0u8; 3]);
        assert!(matches!(
            cache.publish(short),
            Err(PublishError::InvalidImage(ImageError::LengthMismatch {
                expected: 48,
                actual: 3
            }))
        ));
        assert!(matches!(
            cache.publish(ProcessedImage::rgb(0, 0, Vec::new())),
            Err(PublishError::InvalidImage(_))
        ));

        assert_eq!(cache.current_texture(), Some(before));
        assert_eq!(cache.published_count(), 1);
    }

    #[test]
    fn fourth_image_reuses_slot_zero() {
        let cache = TextureCache::new(HostBackend::new());
        let a = cache.publish(image(2, 2, 0xA)).unwrap();
        cache.publish(image(2, 2, 0xB)).unwrap();
        cache.publish(image(2, 2, 0xC)).unwrap();
        assert_eq!(cache.resident_images(), 3);

        let d = cache.publish(image(2, 2, 0xD)).unwrap();
        assert_eq!(a.slot, 0);
        assert_eq!(d.slot, 0);
        // Same dimensions, so the slot's texture storage is reused.
        assert_eq!(d.raw, a.raw);
        assert_eq!(current_pixels(&cache).unwrap(), vec![0xD; 12]);
        assert_eq!(cache.resident_images(), 3);
        assert_eq!(cache.with_backend(|b| b.live_textures()), 3);
    }

    #[test]
    fn dimension_change_reallocates_slot() {
        let cache = TextureCache::new(HostBackend::new());
        let first = cache.publish(image(4, 4, 1)).unwrap();
        cache.publish(image(4, 4, 2)).unwrap();
        cache.publish(image(4, 4, 3)).unwrap();

        let resized = cache.publish(image(8, 2, 4)).unwrap();
        assert_eq!(resized.slot, first.slot);
        assert_ne!(resized.raw, first.raw);
        assert_eq!(cache.current_texture().unwrap().dimensions(), (8, 2));
        assert_eq!(cache.slot_dimensions(0), Some((8, 2)));
        assert_eq!(cache.slot_dimensions(1), Some((4, 4)));
        // Old slot-0 storage was released, not leaked.
        assert_eq!(cache.with_backend(|b| b.live_textures()), 3);
        assert_eq!(cache.with_backend(|b| b.allocated_bytes()), 48 * 3);
    }

    #[test]
    fn allocation_failure_keeps_previous_content() {
        // Room for three 4x4 RGB textures (48 bytes each) and nothing more.
        let cache = TextureCache::new(HostBackend::with_budget(48 * 3));
        cache.publish(image(4, 4, 1)).unwrap();
        cache.publish(image(4, 4, 2)).unwrap();
        let before = cache.publish(image(4, 4, 3)).unwrap();

        let err = cache.publish(image(8, 8, 9)).unwrap_err();
        assert!(matches!(err, PublishError::AllocationFailure(_)));

        assert_eq!(cache.current_texture(), Some(before));
        assert_eq!(current_pixels(&cache).unwrap(), vec![3; 48]);
        assert_eq!(cache.slot_dimensions(0), Some((4, 4)));
        assert_eq!(cache.published_count(), 3);
        assert_eq!(cache.resident_images(), 3);

        // Same-size frames still fit and continue the ring at slot 0.
        let next = cache.publish(image(4, 4, 4)).unwrap();
        assert_eq!((next.slot, next.sequence), (0, 3));
    }

    #[test]
    fn invalidate_all_releases_everything() {
        let cache = TextureCache::new(HostBackend::new());
        cache.publish(image(2, 2, 1)).unwrap();
        cache.publish(image(2, 2, 2)).unwrap();

        cache.invalidate_all();
        assert_eq!(cache.current_texture(), None);
        assert_eq!(cache.resident_images(), 0);
        assert_eq!(cache.with_backend(|b| b.live_textures()), 0);

        let next = cache.publish(image(2, 2, 3)).unwrap();
        assert_eq!(next.sequence, 2);
        assert_eq!(next.slot, 2);
        assert_eq!(cache.current_texture(), Some(next));
    }

    #[test]
    fn readers_never_observe_partial_uploads() {
        const FRAMES: u64 = 2_000;
        let cache = Arc::new(TextureCache::new(HostBackend::new()));
        let done = Arc::new(AtomicBool::new(false));

        let readers: Vec<_> = (0..3)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let done = Arc::clone(&done);
                thread::spawn(move || {
                    let mut last_sequence = 0u64;
                    let mut observed = 0u64;
                    while !done.load(Ordering::Acquire) {
                        let seen = cache.read_current(|handle, texture| {
                            let expected = (handle.sequence % 251) as u8;
                            let whole = texture.pixels().iter().all(|&b| b == expected);
                            (handle.sequence, whole, texture.dimensions() == handle.dimensions())
                        });
                        if let Some((sequence, whole, dims_match)) = seen {
                            assert!(whole, "torn texture at sequence {sequence}");
                            assert!(dims_match);
                            assert!(sequence >= last_sequence, "current went backwards");
                            last_sequence = sequence;
                            observed += 1;
                        }
                    }
                    observed
                })
            })
            .collect();

        for k in 0..FRAMES {
            // Alternate sizes so slots are reallocated as well as rewritten.
            let (w, h) = if (k / 7) % 2 == 0 { (32, 16) } else { (16, 32) };
            cache.publish(image(w, h, (k % 251) as u8)).unwrap();
        }
        done.store(true, Ordering::Release);

        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(cache.current_texture().unwrap().sequence, FRAMES - 1);
    }
}
