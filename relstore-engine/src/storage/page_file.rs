//! Block-granular I/O on a table file.
//!
//! A table file is an ordered sequence of fixed-size pages. This module maps
//! the file to that sequence and nothing more; which page plays which role
//! is decided by the layers above.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::EngineResult;

/// Size of every page in a table file, shared with the buffer pool.
pub const PAGE_SIZE: usize = 4096;

/// An open table file addressed in whole blocks.
pub struct PageFile {
    file: File,
    path: PathBuf,
}

impl PageFile {
    /// Create a new, empty page file. Fails if the file already exists.
    pub fn create(path: &Path) -> EngineResult<()> {
        OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;
        tracing::debug!(path = %path.display(), "created page file");
        Ok(())
    }

    /// Open an existing page file for reading and writing.
    pub fn open(path: &Path) -> EngineResult<PageFile> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(PageFile {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Remove a page file from disk.
    pub fn destroy(path: &Path) -> EngineResult<()> {
        fs::remove_file(path)?;
        tracing::debug!(path = %path.display(), "destroyed page file");
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of whole blocks currently in the file.
    pub fn num_blocks(&mut self) -> EngineResult<u32> {
        let end = self.file.seek(SeekFrom::End(0))?;
        Ok((end / PAGE_SIZE as u64) as u32)
    }

    /// Read block `pos` into `buf`. The block must exist.
    pub fn read_block(&mut self, pos: u32, buf: &mut [u8]) -> EngineResult<()> {
        debug_assert_eq!(buf.len(), PAGE_SIZE);
        self.file
            .seek(SeekFrom::Start(pos as u64 * PAGE_SIZE as u64))?;
        self.file.read_exact(buf)?;
        Ok(())
    }

    /// Write block `pos`, extending the file with zeroed blocks first when
    /// `pos` lies past the current end.
    pub fn write_block(&mut self, pos: u32, buf: &[u8]) -> EngineResult<()> {
        debug_assert_eq!(buf.len(), PAGE_SIZE);
        self.ensure_capacity(pos + 1)?;
        self.file
            .seek(SeekFrom::Start(pos as u64 * PAGE_SIZE as u64))?;
        self.file.write_all(buf)?;
        Ok(())
    }

    /// Append one zeroed block, returning its position.
    pub fn append_empty_block(&mut self) -> EngineResult<u32> {
        let pos = self.num_blocks()?;
        self.file.seek(SeekFrom::End(0))?;
        self.file.write_all(&[0u8; PAGE_SIZE])?;
        Ok(pos)
    }

    /// Grow the file with zeroed blocks until it holds at least `blocks`.
    pub fn ensure_capacity(&mut self, blocks: u32) -> EngineResult<()> {
        while self.num_blocks()? < blocks {
            self.append_empty_block()?;
        }
        Ok(())
    }

    /// Flush buffered writes down to the operating system.
    pub fn sync(&mut self) -> EngineResult<()> {
        self.file.flush()?;
        Ok(())
    }
}

impl std::fmt::Debug for PageFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageFile").field("path", &self.path).finish()
    }
}
