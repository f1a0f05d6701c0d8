use crate::core::db::error::DatabaseError;
use crate::types::{Code, DeadlineKey};
use redb::{ReadTransaction, ReadableTable, TableDefinition, WriteTransaction};
use std::time::SystemTime;

/// Stores `DeadlineKey { timestamp, code }` entries ordered by timestamp, so
/// the codes that are due can be read off the front of the table.
pub struct DeadlineTable {
    definition: TableDefinition<'static, DeadlineKey, ()>,
}

impl DeadlineTable {
    pub const fn new(name: &'static str) -> Self {
        Self {
            definition: TableDefinition::new(name),
        }
    }

    pub fn init(&self, txn: &WriteTransaction) -> Result<(), DatabaseError> {
        txn.open_table(self.definition)?;
        Ok(())
    }

    pub fn insert(&self, txn: &WriteTransaction, key: &DeadlineKey) -> Result<(), DatabaseError> {
        let mut table = txn.open_table(self.definition)?;
        table.insert(key, &())?;
        Ok(())
    }

    /// Returns `true` if the key was present.
    pub fn remove(&self, txn: &WriteTransaction, key: &DeadlineKey) -> Result<bool, DatabaseError> {
        let mut table = txn.open_table(self.definition)?;
        Ok(table.remove(key)?.is_some())
    }

    /// Returns codes whose deadline is strictly before `now`, oldest first.
    pub fn due(&self, txn: &ReadTransaction, now: SystemTime) -> Result<Vec<DeadlineKey>, DatabaseError> {
        let table = txn.open_table(self.definition)?;
        let mut due = Vec::new();

        for entry in table.iter()? {
            let (key_guard, _) = entry?;
            let key = key_guard.value();
            if key.timestamp < now {
                due.push(key);
            } else {
                // Sorted by timestamp, nothing later can be due.
                break;
            }
        }

        Ok(due)
    }

    #[cfg(test)]
    pub fn all_codes(&self, txn: &ReadTransaction) -> Result<Vec<Code>, DatabaseError> {
        let table = txn.open_table(self.definition)?;
        let mut codes = Vec::new();

        for entry in table.iter()? {
            let (key_guard, _) = entry?;
            codes.push(key_guard.value().code);
        }

        Ok(codes)
    }
}
