//! Sequential scans with predicate pushdown.

use tracing::trace;

use crate::access::record::{Record, Rid};
use crate::access::table::Table;
use crate::error::{EngineError, EngineResult};
use crate::expr::{eval_expr, Expr, Value};
use crate::storage::directory::PageDirectory;
use crate::storage::schema::DataType;
use crate::storage::slot::SlotEntry;

/// A sequential scan over a table's live records in RID order.
///
/// The `(page, slot)` cursor is carried between calls to [`TableScan::next`];
/// each call pins at most one data page and releases it before returning, so
/// no pin ever outlives a call. The scan borrows its table and predicate, it
/// owns neither.
pub struct TableScan<'s> {
    table: &'s mut Table,
    predicate: Option<&'s Expr>,
    current_page: u32,
    current_slot: u32,
}

impl Table {
    /// Begin a scan. A `None` predicate matches every live record.
    pub fn scan<'s>(&'s mut self, predicate: Option<&'s Expr>) -> TableScan<'s> {
        TableScan {
            table: self,
            predicate,
            current_page: 0,
            current_slot: 0,
        }
    }
}

impl TableScan<'_> {
    /// Advance to the next live record satisfying the predicate and
    /// materialize it into `record`. Exhaustion is
    /// [`EngineError::NoMoreTuples`].
    pub fn next(&mut self, record: &mut Record) -> EngineResult<()> {
        let record_size = self.table.schema.record_size();

        while self.current_page < self.table.directory.data_page_count() {
            let position = PageDirectory::data_page_position(self.current_page);
            let frame = self.table.pool.pin(position)?;
            let record_count =
                self.table.directory.entries[self.current_page as usize].record_count;

            while self.current_slot < record_count {
                let slot = self.current_slot;
                self.current_slot += 1;

                let page = self.table.pool.data(frame);
                let slot_entry = SlotEntry::read(page, slot);
                if slot_entry.free {
                    continue;
                }

                if record.data.len() != record_size {
                    record.data.resize(record_size, 0);
                }
                let off = slot_entry.offset as usize;
                record.data.copy_from_slice(&page[off..off + record_size]);
                record.id = Some(Rid::new(self.current_page, slot));

                let matched = match self.predicate {
                    None => true,
                    Some(expr) => match eval_expr(record, &self.table.schema, expr) {
                        Ok(Value::Bool(b)) => b,
                        Ok(other) => {
                            self.table.pool.unpin(frame);
                            return Err(EngineError::AttributeTypeMismatch {
                                expected: DataType::Bool,
                                found: other.data_type(),
                            });
                        }
                        Err(e) => {
                            self.table.pool.unpin(frame);
                            return Err(e);
                        }
                    },
                };
                if matched {
                    self.table.pool.unpin(frame);
                    trace!(page = self.current_page, slot, "scan produced a record");
                    return Ok(());
                }
            }

            self.table.pool.unpin(frame);
            self.current_slot = 0;
            self.current_page += 1;
        }

        Err(EngineError::NoMoreTuples)
    }

    /// End the scan. No resources outlive the call; consuming the handle
    /// makes a second close unrepresentable.
    pub fn close(self) {}
}
