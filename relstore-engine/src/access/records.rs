//! Record operations: insert, get, update, delete.
//!
//! Every mutating operation follows the same discipline: pin the data page,
//! mutate its bytes, mark it dirty, unpin, then persist the page directory.
//! At most one page is pinned at a time, and every exit path releases it.

use tracing::debug;

use crate::access::record::{Record, Rid};
use crate::access::table::Table;
use crate::error::{EngineError, EngineResult};
use crate::storage::directory::{DirectoryEntry, PageDirectory};
use crate::storage::page_file::PAGE_SIZE;
use crate::storage::slot::{self, SlotEntry, TOMBSTONE};

impl Table {
    /// Insert `record`, assigning its id. Grows the table by a data page,
    /// and the directory chain by a directory page, as needed.
    pub fn insert(&mut self, record: &mut Record) -> EngineResult<()> {
        let record_size = self.schema.record_size();
        if record.data.len() != record_size {
            return Err(EngineError::InvalidInput(
                "record data does not match the schema's record size",
            ));
        }

        // grow the directory chain before its entry array can overflow it
        if self.directory.needs_directory_page() {
            self.directory.push_directory_page();
            let pos =
                PageDirectory::directory_page_position(self.directory.num_directory_pages - 1);
            self.pool.file_mut().write_block(pos, &[0u8; PAGE_SIZE])?;
            debug!(table = %self.name, position = pos, "appended directory page");
        }

        // first fit over the directory; allocate a fresh data page when
        // every tracked page is full
        let page_idx = match self.directory.find_free_page() {
            Some(idx) => idx,
            None => {
                let idx = self.directory.push_data_page();
                let pos = PageDirectory::data_page_position(idx as u32);
                self.pool.file_mut().ensure_capacity(pos + 1)?;
                idx
            }
        };

        let entry = self.directory.entries[page_idx];
        let page_id = entry.page_id;
        let frame = self.pool.pin(PageDirectory::data_page_position(page_id))?;

        // reuse the first tombstoned slot at its stored offset; otherwise
        // take a fresh slot at the end of the directory
        let page = self.pool.data_mut(frame);
        let (slot_idx, offset, reused) = match slot::find_free_slot(page, entry.record_count) {
            Some(idx) => (idx, SlotEntry::read(page, idx).offset, true),
            None => {
                let idx = entry.record_count;
                (idx, slot::packed_offset(idx, record_size), false)
            }
        };

        SlotEntry {
            offset,
            free: false,
        }
        .write(page, slot_idx);
        let off = offset as usize;
        page[off..off + record_size].copy_from_slice(&record.data);

        record.id = Some(Rid::new(page_id, slot_idx));

        // the slot entry bytes are charged on every insert and never
        // credited back by delete
        let entry = &mut self.directory.entries[page_idx];
        if reused {
            entry.free_slots -= 1;
        } else {
            entry.record_count += 1;
        }
        entry.free_space -= (record_size + SlotEntry::SIZE) as u32;
        entry.has_free_slot = entry.free_space >= (record_size + SlotEntry::SIZE) as u32;

        self.pool.mark_dirty(frame);
        self.pool.unpin(frame);
        self.directory.save(self.pool.file_mut())?;

        debug!(table = %self.name, page = page_id, slot = slot_idx, "inserted record");
        Ok(())
    }

    /// Materialize the record at `rid` into `record`, reusing the caller's
    /// buffer when it is already sized for the schema.
    pub fn get(&mut self, rid: Rid, record: &mut Record) -> EngineResult<()> {
        let record_size = self.schema.record_size();
        let entry = self.entry_for(rid)?;
        if rid.slot >= entry.record_count {
            return Err(EngineError::RecordNotFound {
                page: rid.page,
                slot: rid.slot,
            });
        }

        let frame = self.pool.pin(PageDirectory::data_page_position(rid.page))?;
        let page = self.pool.data(frame);
        let slot_entry = SlotEntry::read(page, rid.slot);
        if slot_entry.free {
            self.pool.unpin(frame);
            return Err(EngineError::RecordNotFound {
                page: rid.page,
                slot: rid.slot,
            });
        }

        if record.data.len() != record_size {
            record.data.resize(record_size, 0);
        }
        let off = slot_entry.offset as usize;
        record.data.copy_from_slice(&page[off..off + record_size]);
        record.id = Some(rid);

        self.pool.unpin(frame);
        Ok(())
    }

    /// Tombstone the record at `rid`. The slot index stays reserved and is
    /// reused by a later insert.
    pub fn delete(&mut self, rid: Rid) -> EngineResult<()> {
        let record_size = self.schema.record_size();
        let entry = self.entry_for(rid)?;
        if rid.slot >= entry.record_count {
            return Err(EngineError::RecordNotFound {
                page: rid.page,
                slot: rid.slot,
            });
        }

        let frame = self.pool.pin(PageDirectory::data_page_position(rid.page))?;
        let page = self.pool.data_mut(frame);
        let mut slot_entry = SlotEntry::read(page, rid.slot);
        if slot_entry.free {
            self.pool.unpin(frame);
            return Err(EngineError::RecordNotFound {
                page: rid.page,
                slot: rid.slot,
            });
        }

        slot_entry.free = true;
        slot_entry.write(page, rid.slot);
        page[slot_entry.offset as usize] = TOMBSTONE;

        // only the record bytes come back; the slot entry stays reserved
        let entry = &mut self.directory.entries[rid.page as usize];
        entry.free_slots += 1;
        entry.free_space += record_size as u32;
        entry.has_free_slot = entry.free_space >= (record_size + SlotEntry::SIZE) as u32;

        self.pool.mark_dirty(frame);
        self.pool.unpin(frame);
        self.directory.save(self.pool.file_mut())?;

        debug!(table = %self.name, page = rid.page, slot = rid.slot, "deleted record");
        Ok(())
    }

    /// Overwrite the record at `record.id`. Falls back to delete plus
    /// reinsert when the new bytes cannot be placed at the old offset, in
    /// which case the record's id changes and no forwarding state is kept.
    pub fn update(&mut self, record: &mut Record) -> EngineResult<()> {
        let record_size = self.schema.record_size();
        if record.data.len() != record_size {
            return Err(EngineError::InvalidInput(
                "record data does not match the schema's record size",
            ));
        }
        let rid = record
            .id
            .ok_or(EngineError::InvalidInput("record has no id"))?;
        let entry = self.entry_for(rid)?;
        if rid.slot >= entry.record_count {
            return Err(EngineError::RecordNotFound {
                page: rid.page,
                slot: rid.slot,
            });
        }

        let frame = self.pool.pin(PageDirectory::data_page_position(rid.page))?;
        let page = self.pool.data(frame);
        let slot_entry = SlotEntry::read(page, rid.slot);
        if slot_entry.free {
            self.pool.unpin(frame);
            return Err(EngineError::RecordNotFound {
                page: rid.page,
                slot: rid.slot,
            });
        }

        // room at the old offset: the page's free space plus the gap
        // between the slot entry and its record
        let available = entry.free_space as usize + slot_entry.offset as usize
            - rid.slot as usize * SlotEntry::SIZE;
        if record_size > available {
            self.pool.unpin(frame);
            self.delete(rid)?;
            self.insert(record)?;
        } else {
            let page = self.pool.data_mut(frame);
            let off = slot_entry.offset as usize;
            page[off..off + record_size].copy_from_slice(&record.data);
            self.pool.mark_dirty(frame);
            self.pool.unpin(frame);
        }

        debug!(table = %self.name, page = rid.page, slot = rid.slot, "updated record");
        Ok(())
    }

    fn entry_for(&self, rid: Rid) -> EngineResult<DirectoryEntry> {
        if rid.page >= self.directory.data_page_count() {
            return Err(EngineError::InvalidRid {
                page: rid.page,
                slot: rid.slot,
            });
        }
        Ok(self.directory.entries[rid.page as usize])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::table::RecordManager;
    use crate::expr::Value;
    use crate::storage::page_file::PageFile;
    use crate::storage::schema::{Attribute, DataType, Schema};
    use std::path::PathBuf;

    fn people_schema() -> Schema {
        Schema::new(
            vec![
                Attribute::new("id", DataType::Int, 0),
                Attribute::new("name", DataType::String, 8),
            ],
            vec![0],
        )
    }

    fn open_fresh(dir: &tempfile::TempDir, name: &str, schema: &Schema) -> (PathBuf, Table) {
        let rm = RecordManager::default();
        let path = dir.path().join(name);
        rm.create_table(&path, schema).unwrap();
        (path.clone(), rm.open_table(&path).unwrap())
    }

    fn person(schema: &Schema, id: i32, name: &str) -> Record {
        let mut record = Record::new(schema);
        record.set_attr(schema, 0, &Value::Int(id)).unwrap();
        record
            .set_attr(schema, 1, &Value::Str(name.to_string()))
            .unwrap();
        record
    }

    #[test]
    fn test_single_record_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let schema = people_schema();
        let (_, mut table) = open_fresh(&dir, "single.tbl", &schema);

        let mut record = person(&schema, 1, "alice");
        table.insert(&mut record).unwrap();
        assert_eq!(record.id, Some(Rid::new(0, 0)));
        assert_eq!(table.num_tuples(), 1);

        let mut fetched = Record::new(&schema);
        table.get(Rid::new(0, 0), &mut fetched).unwrap();
        assert_eq!(fetched.data, record.data);
        assert_eq!(fetched.get_attr(&schema, 0).unwrap(), Value::Int(1));
        assert_eq!(
            fetched.get_attr(&schema, 1).unwrap(),
            Value::Str("alice".into())
        );
        table.close().unwrap();
    }

    #[test]
    fn test_get_allocates_an_unsized_buffer() {
        let dir = tempfile::tempdir().unwrap();
        let schema = people_schema();
        let (_, mut table) = open_fresh(&dir, "alloc.tbl", &schema);

        let mut record = person(&schema, 9, "iris");
        table.insert(&mut record).unwrap();

        // an empty record buffer is sized by the engine
        let mut fetched = Record::default();
        table.get(record.id.unwrap(), &mut fetched).unwrap();
        assert_eq!(fetched.data, record.data);
        table.close().unwrap();
    }

    #[test]
    fn test_insert_fills_page_then_overflows() {
        let dir = tempfile::tempdir().unwrap();
        let schema = people_schema();
        let (_, mut table) = open_fresh(&dir, "overflow.tbl", &schema);

        // 12-byte records plus 8-byte slot entries: 204 fit on one page
        let per_page = PAGE_SIZE / (schema.record_size() + SlotEntry::SIZE);
        let total = per_page + 1;
        let mut last_rid = None;
        for i in 0..total {
            let mut record = person(&schema, i as i32, "bulk");
            table.insert(&mut record).unwrap();
            last_rid = record.id;
        }

        assert_eq!(last_rid, Some(Rid::new(1, 0)));
        assert_eq!(table.num_tuples(), total as u64);
        assert_eq!(table.directory.data_page_count(), 2);
        table.close().unwrap();
    }

    #[test]
    fn test_delete_hides_record_and_reuses_slot() {
        let dir = tempfile::tempdir().unwrap();
        let schema = people_schema();
        let (_, mut table) = open_fresh(&dir, "reuse.tbl", &schema);

        for (i, name) in ["ann", "bea", "cal"].iter().enumerate() {
            let mut record = person(&schema, i as i32, name);
            table.insert(&mut record).unwrap();
        }
        assert_eq!(table.num_tuples(), 3);

        table.delete(Rid::new(0, 1)).unwrap();
        assert_eq!(table.num_tuples(), 2);

        let mut fetched = Record::new(&schema);
        assert!(matches!(
            table.get(Rid::new(0, 1), &mut fetched),
            Err(EngineError::RecordNotFound { page: 0, slot: 1 })
        ));
        assert!(matches!(
            table.delete(Rid::new(0, 1)),
            Err(EngineError::RecordNotFound { .. })
        ));

        // the tombstoned slot is the first choice for the next insert
        let mut fourth = person(&schema, 42, "dot");
        table.insert(&mut fourth).unwrap();
        assert_eq!(fourth.id, Some(Rid::new(0, 1)));
        assert_eq!(table.num_tuples(), 3);

        table.get(Rid::new(0, 1), &mut fetched).unwrap();
        assert_eq!(fetched.data, fourth.data);
        table.close().unwrap();
    }

    #[test]
    fn test_delete_writes_tombstone_byte() {
        let dir = tempfile::tempdir().unwrap();
        let schema = people_schema();
        let (path, mut table) = open_fresh(&dir, "tombstone.tbl", &schema);

        let mut record = person(&schema, 5, "eve");
        table.insert(&mut record).unwrap();
        table.delete(record.id.unwrap()).unwrap();
        table.close().unwrap();

        // slot 0's record sits at the very end of data page 0 (file block 2)
        let mut file = PageFile::open(&path).unwrap();
        let mut block = vec![0u8; PAGE_SIZE];
        file.read_block(2, &mut block).unwrap();
        assert_eq!(block[PAGE_SIZE - schema.record_size()], TOMBSTONE);
    }

    #[test]
    fn test_update_in_place_keeps_rid() {
        let dir = tempfile::tempdir().unwrap();
        let schema = people_schema();
        let (_, mut table) = open_fresh(&dir, "update.tbl", &schema);

        let mut record = person(&schema, 1, "old");
        table.insert(&mut record).unwrap();
        let rid = record.id.unwrap();

        record.set_attr(&schema, 1, &Value::Str("new".into())).unwrap();
        table.update(&mut record).unwrap();
        assert_eq!(record.id, Some(rid));

        let mut fetched = Record::new(&schema);
        table.get(rid, &mut fetched).unwrap();
        assert_eq!(fetched.get_attr(&schema, 1).unwrap(), Value::Str("new".into()));
        assert_eq!(table.num_tuples(), 1);
        table.close().unwrap();
    }

    #[test]
    fn test_update_of_deleted_record_fails() {
        let dir = tempfile::tempdir().unwrap();
        let schema = people_schema();
        let (_, mut table) = open_fresh(&dir, "update_gone.tbl", &schema);

        let mut record = person(&schema, 1, "gone");
        table.insert(&mut record).unwrap();
        table.delete(record.id.unwrap()).unwrap();
        assert!(matches!(
            table.update(&mut record),
            Err(EngineError::RecordNotFound { .. })
        ));
        table.close().unwrap();
    }

    #[test]
    fn test_rid_validation() {
        let dir = tempfile::tempdir().unwrap();
        let schema = people_schema();
        let (_, mut table) = open_fresh(&dir, "rids.tbl", &schema);

        let mut record = person(&schema, 1, "one");
        table.insert(&mut record).unwrap();

        let mut fetched = Record::new(&schema);
        assert!(matches!(
            table.get(Rid::new(7, 0), &mut fetched),
            Err(EngineError::InvalidRid { page: 7, slot: 0 })
        ));
        // a slot that was never occupied is simply not found
        assert!(matches!(
            table.get(Rid::new(0, 99), &mut fetched),
            Err(EngineError::RecordNotFound { .. })
        ));
        assert!(matches!(
            table.delete(Rid::new(7, 0)),
            Err(EngineError::InvalidRid { .. })
        ));
        table.close().unwrap();
    }

    #[test]
    fn test_counts_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let schema = people_schema();
        let (path, mut table) = open_fresh(&dir, "persist.tbl", &schema);

        for i in 0..10 {
            let mut record = person(&schema, i, "keep");
            table.insert(&mut record).unwrap();
        }
        table.delete(Rid::new(0, 3)).unwrap();
        table.close().unwrap();

        let rm = RecordManager::default();
        let mut table = rm.open_table(&path).unwrap();
        assert_eq!(table.num_tuples(), 9);

        let mut fetched = Record::new(&schema);
        table.get(Rid::new(0, 4), &mut fetched).unwrap();
        assert_eq!(fetched.get_attr(&schema, 0).unwrap(), Value::Int(4));
        assert!(matches!(
            table.get(Rid::new(0, 3), &mut fetched),
            Err(EngineError::RecordNotFound { .. })
        ));
        table.close().unwrap();
    }

    #[test]
    fn test_directory_chain_growth_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        // one record fills a page, so every insert allocates a data page
        let schema = Schema::new(
            vec![
                Attribute::new("id", DataType::Int, 0),
                Attribute::new("payload", DataType::String, 2100),
            ],
            vec![0],
        );
        let (path, mut table) = open_fresh(&dir, "chain.tbl", &schema);

        let total = PageDirectory::ENTRIES_PER_PAGE + 1;
        for i in 0..total {
            let mut record = Record::new(&schema);
            record.set_attr(&schema, 0, &Value::Int(i as i32)).unwrap();
            table.insert(&mut record).unwrap();
            assert_eq!(record.id, Some(Rid::new(i, 0)));
        }

        assert_eq!(table.directory.num_directory_pages, 2);
        assert_eq!(table.num_tuples(), total as u64);

        // inserts keep working after the chain grew
        let mut extra = Record::new(&schema);
        extra.set_attr(&schema, 0, &Value::Int(-1)).unwrap();
        table.insert(&mut extra).unwrap();
        assert_eq!(table.num_tuples(), total as u64 + 1);
        table.close().unwrap();

        let rm = RecordManager::default();
        let mut table = rm.open_table(&path).unwrap();
        assert_eq!(table.directory.num_directory_pages, 2);
        assert_eq!(table.num_tuples(), total as u64 + 1);

        // records on both sides of the interleaved directory page resolve
        let mut fetched = Record::new(&schema);
        table.get(Rid::new(0, 0), &mut fetched).unwrap();
        assert_eq!(fetched.get_attr(&schema, 0).unwrap(), Value::Int(0));
        table
            .get(Rid::new(PageDirectory::ENTRIES_PER_PAGE, 0), &mut fetched)
            .unwrap();
        assert_eq!(
            fetched.get_attr(&schema, 0).unwrap(),
            Value::Int(PageDirectory::ENTRIES_PER_PAGE as i32)
        );
        table.close().unwrap();
    }
}
