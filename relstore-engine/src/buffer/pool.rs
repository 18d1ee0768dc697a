//! The buffer pool caches file pages in a fixed number of frames.
//!
//! Pages are pinned into frames, mutated in place, marked dirty, and written
//! back when their frame is evicted or the pool is flushed. Replacement is
//! least-recently-used over the unpinned frames. A pinned page must never be
//! touched after `unpin`.

use lru::LruCache;
use std::num::NonZeroUsize;

use crate::error::{EngineError, EngineResult};
use crate::storage::page_file::{PageFile, PAGE_SIZE};

/// Handle to a pinned frame, valid until the matching `unpin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameId(usize);

struct Frame {
    page: u32,
    data: Vec<u8>,
    dirty: bool,
    pins: u32,
}

/// A pool of page frames over one open page file.
pub struct BufferPool {
    file: PageFile,
    frames: Vec<Frame>,
    /// Page number to frame index, most recently used first.
    recency: LruCache<u32, usize>,
    free: Vec<usize>,
}

impl BufferPool {
    /// Build a pool of `capacity` frames over `file`.
    pub fn new(file: PageFile, capacity: usize) -> BufferPool {
        let capacity = capacity.max(1);
        let frames = (0..capacity)
            .map(|_| Frame {
                page: 0,
                data: vec![0; PAGE_SIZE],
                dirty: false,
                pins: 0,
            })
            .collect();
        BufferPool {
            file,
            frames,
            recency: LruCache::new(NonZeroUsize::new(capacity).unwrap()),
            free: (0..capacity).rev().collect(),
        }
    }

    /// Pin `page` into a frame, reading it from disk on a miss. Pinning a
    /// page past the end of the file grows the file with zeroed blocks.
    pub fn pin(&mut self, page: u32) -> EngineResult<FrameId> {
        if let Some(&idx) = self.recency.get(&page) {
            self.frames[idx].pins += 1;
            return Ok(FrameId(idx));
        }

        let idx = match self.free.pop() {
            Some(idx) => idx,
            None => self.evict()?,
        };

        let read = self
            .file
            .ensure_capacity(page + 1)
            .and_then(|_| self.file.read_block(page, &mut self.frames[idx].data));
        if let Err(e) = read {
            self.free.push(idx);
            return Err(e);
        }

        let frame = &mut self.frames[idx];
        frame.page = page;
        frame.dirty = false;
        frame.pins = 1;
        self.recency.put(page, idx);
        Ok(FrameId(idx))
    }

    /// Bytes of a pinned page.
    pub fn data(&self, id: FrameId) -> &[u8] {
        &self.frames[id.0].data
    }

    /// Mutable bytes of a pinned page. Mutators still call `mark_dirty`.
    pub fn data_mut(&mut self, id: FrameId) -> &mut [u8] {
        &mut self.frames[id.0].data
    }

    pub fn mark_dirty(&mut self, id: FrameId) {
        self.frames[id.0].dirty = true;
    }

    /// Release one pin. The page stays cached until its frame is evicted.
    pub fn unpin(&mut self, id: FrameId) {
        let frame = &mut self.frames[id.0];
        debug_assert!(frame.pins > 0, "unpin without a matching pin");
        frame.pins = frame.pins.saturating_sub(1);
    }

    /// Write every dirty cached page back to the file.
    pub fn flush_all(&mut self) -> EngineResult<()> {
        let cached: Vec<(u32, usize)> = self.recency.iter().map(|(&p, &i)| (p, i)).collect();
        for (page, idx) in cached {
            if self.frames[idx].dirty {
                self.file.write_block(page, &self.frames[idx].data)?;
                self.frames[idx].dirty = false;
            }
        }
        self.file.sync()
    }

    /// Direct access to the underlying file for writes that bypass the
    /// pool; the page directory is persisted this way.
    pub fn file_mut(&mut self) -> &mut PageFile {
        &mut self.file
    }

    /// Evict the least recently used unpinned frame, writing it back first
    /// when dirty. Returns the freed frame index.
    fn evict(&mut self) -> EngineResult<usize> {
        // iteration runs most-recent-first, so the last unpinned hit is the
        // least recently used
        let mut victim = None;
        for (&page, &idx) in self.recency.iter() {
            if self.frames[idx].pins == 0 {
                victim = Some((page, idx));
            }
        }
        let (page, idx) = victim.ok_or(EngineError::PoolExhausted)?;

        if self.frames[idx].dirty {
            tracing::trace!(page, "writing back dirty page on eviction");
            self.file.write_block(page, &self.frames[idx].data)?;
            self.frames[idx].dirty = false;
        }
        self.recency.pop(&page);
        Ok(idx)
    }
}

impl Drop for BufferPool {
    fn drop(&mut self) {
        if self.flush_all().is_err() {
            tracing::warn!(
                path = %self.file.path().display(),
                "buffer pool dropped with unflushed dirty pages"
            );
        }
    }
}

impl std::fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferPool")
            .field("file", &self.file)
            .field("capacity", &self.frames.len())
            .field("cached", &self.recency.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn fresh_file(dir: &tempfile::TempDir, name: &str) -> (PathBuf, PageFile) {
        let path = dir.path().join(name);
        PageFile::create(&path).unwrap();
        let file = PageFile::open(&path).unwrap();
        (path, file)
    }

    #[test]
    fn test_pin_extends_file_with_zeroes() {
        let dir = tempfile::tempdir().unwrap();
        let (_, file) = fresh_file(&dir, "extend.tbl");
        let mut pool = BufferPool::new(file, 3);

        let frame = pool.pin(4).unwrap();
        assert!(pool.data(frame).iter().all(|&b| b == 0));
        pool.unpin(frame);
        assert_eq!(pool.file_mut().num_blocks().unwrap(), 5);
    }

    #[test]
    fn test_dirty_page_survives_eviction() {
        let dir = tempfile::tempdir().unwrap();
        let (_, file) = fresh_file(&dir, "evict.tbl");
        let mut pool = BufferPool::new(file, 2);

        let frame = pool.pin(0).unwrap();
        pool.data_mut(frame)[10] = 0x5A;
        pool.mark_dirty(frame);
        pool.unpin(frame);

        // push page 0 out of the two-frame pool
        for page in 1..3 {
            let frame = pool.pin(page).unwrap();
            pool.unpin(frame);
        }

        let frame = pool.pin(0).unwrap();
        assert_eq!(pool.data(frame)[10], 0x5A);
        pool.unpin(frame);
    }

    #[test]
    fn test_pin_hit_reuses_frame() {
        let dir = tempfile::tempdir().unwrap();
        let (_, file) = fresh_file(&dir, "hit.tbl");
        let mut pool = BufferPool::new(file, 2);

        let a = pool.pin(7).unwrap();
        let b = pool.pin(7).unwrap();
        assert_eq!(a, b);
        pool.unpin(a);
        pool.unpin(b);
    }

    #[test]
    fn test_all_frames_pinned_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let (_, file) = fresh_file(&dir, "full.tbl");
        let mut pool = BufferPool::new(file, 1);

        let held = pool.pin(0).unwrap();
        assert!(matches!(pool.pin(1), Err(EngineError::PoolExhausted)));
        pool.unpin(held);
        assert!(pool.pin(1).is_ok());
    }

    #[test]
    fn test_flush_all_writes_dirty_pages() {
        let dir = tempfile::tempdir().unwrap();
        let (path, file) = fresh_file(&dir, "flush.tbl");
        let mut pool = BufferPool::new(file, 4);

        let frame = pool.pin(2).unwrap();
        pool.data_mut(frame)[0] = 0x42;
        pool.mark_dirty(frame);
        pool.unpin(frame);
        pool.flush_all().unwrap();

        let mut check = PageFile::open(&path).unwrap();
        let mut block = vec![0u8; PAGE_SIZE];
        check.read_block(2, &mut block).unwrap();
        assert_eq!(block[0], 0x42);
    }

    #[test]
    fn test_least_recently_used_is_evicted() {
        let dir = tempfile::tempdir().unwrap();
        let (_, file) = fresh_file(&dir, "lru.tbl");
        let mut pool = BufferPool::new(file, 2);

        for page in [0, 1] {
            let frame = pool.pin(page).unwrap();
            pool.data_mut(frame)[0] = page as u8 + 1;
            pool.mark_dirty(frame);
            pool.unpin(frame);
        }
        // touch page 0 so page 1 is the LRU victim
        let frame = pool.pin(0).unwrap();
        pool.unpin(frame);

        let frame = pool.pin(5).unwrap();
        pool.unpin(frame);

        // page 0 must still be cached with its contents intact
        let frame = pool.pin(0).unwrap();
        assert_eq!(pool.data(frame)[0], 1);
        pool.unpin(frame);
    }
}
