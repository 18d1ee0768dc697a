//! Table lifecycle: the record manager entry point and the open-table
//! handle.

use std::path::Path;

use tracing::debug;

use crate::buffer::BufferPool;
use crate::config::RecordManagerConfig;
use crate::error::{EngineError, EngineResult};
use crate::storage::directory::PageDirectory;
use crate::storage::page_file::{PageFile, PAGE_SIZE};
use crate::storage::schema::Schema;
use crate::storage::slot::SlotEntry;

/// Entry point of the record manager. Owns the configuration applied to
/// every table it opens; holds no other state.
#[derive(Debug, Clone, Default)]
pub struct RecordManager {
    config: RecordManagerConfig,
}

impl RecordManager {
    pub fn new(config: RecordManagerConfig) -> RecordManager {
        RecordManager { config }
    }

    pub fn config(&self) -> &RecordManagerConfig {
        &self.config
    }

    /// Create the on-disk artifact for a table: the page file, the schema
    /// page, and the initial directory page.
    pub fn create_table(&self, path: &Path, schema: &Schema) -> EngineResult<()> {
        validate_name(path)?;
        let record_size = schema.record_size();
        if record_size == 0 {
            return Err(EngineError::InvalidInput("schema has a zero record size"));
        }
        if record_size + SlotEntry::SIZE > PAGE_SIZE {
            return Err(EngineError::PageFull);
        }

        let schema_page = schema.to_page()?;
        PageFile::create(path)?;
        let mut file = PageFile::open(path)?;
        file.write_block(0, &schema_page)?;
        PageDirectory::new_table().save(&mut file)?;
        file.sync()?;

        debug!(table = %path.display(), record_size, "created table");
        Ok(())
    }

    /// Open a table: build its buffer pool, parse the schema page, and read
    /// the directory chain.
    pub fn open_table(&self, path: &Path) -> EngineResult<Table> {
        validate_name(path)?;
        let file = PageFile::open(path)?;
        let mut pool = BufferPool::new(file, self.config.buffer_pool_frames);

        let frame = pool.pin(0)?;
        let schema = Schema::from_page(pool.data(frame));
        pool.unpin(frame);
        let schema = schema?;

        let directory = PageDirectory::load(&mut pool)?;
        debug!(
            table = %path.display(),
            data_pages = directory.data_page_count(),
            "opened table"
        );

        Ok(Table {
            name: path.display().to_string(),
            schema,
            pool,
            directory,
        })
    }

    /// Destroy a table's page file.
    pub fn delete_table(&self, path: &Path) -> EngineResult<()> {
        validate_name(path)?;
        PageFile::destroy(path)
    }
}

fn validate_name(path: &Path) -> EngineResult<()> {
    if path.as_os_str().is_empty() {
        return Err(EngineError::InvalidName);
    }
    Ok(())
}

/// An open table: the owned aggregate of everything the record operations
/// need. Closing (or dropping) the handle flushes buffered pages.
pub struct Table {
    pub(crate) name: String,
    pub(crate) schema: Schema,
    pub(crate) pool: BufferPool,
    pub(crate) directory: PageDirectory,
}

impl Table {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Live records across all data pages.
    pub fn num_tuples(&self) -> u64 {
        self.directory.num_tuples()
    }

    /// Persist the directory, flush buffered pages, and release the handle.
    /// Dropping an unclosed table flushes best-effort; `close` surfaces the
    /// errors.
    pub fn close(mut self) -> EngineResult<()> {
        self.directory.save(self.pool.file_mut())?;
        self.pool.flush_all()?;
        debug!(table = %self.name, "closed table");
        Ok(())
    }
}

impl std::fmt::Debug for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table")
            .field("name", &self.name)
            .field("data_pages", &self.directory.data_page_count())
            .field("tuples", &self.num_tuples())
            .finish()
    }
}
