use std::marker::PhantomData;
use std::sync::Arc;

use crate::connection::{materialize_row, Connection};
use crate::core::Result;
use crate::database::Database;
use crate::driver::DriverRows;
use crate::model::{Persistent, TypeDesc};

/// Forward-only streaming reader over a SELECT result.
///
/// Borrows the connection for its whole lifetime, so it cannot outlive
/// it. `read` materializes the next entity or returns `None` at the end
/// of the set.
pub struct EntityReader<'c, T: Persistent> {
    database: Arc<Database>,
    desc: Arc<TypeDesc>,
    cursor: Box<dyn DriverRows>,
    columns: Vec<String>,
    eof: bool,
    _connection: PhantomData<&'c mut Connection>,
    _entity: PhantomData<T>,
}

impl<'c, T: Persistent> EntityReader<'c, T> {
    pub(crate) fn new(database: Arc<Database>, desc: Arc<TypeDesc>, cursor: Box<dyn DriverRows>) -> Self {
        let columns = cursor.columns().to_vec();
        Self {
            database,
            desc,
            cursor,
            columns,
            eof: false,
            _connection: PhantomData,
            _entity: PhantomData,
        }
    }

    /// Next materialized entity, or `None` once the set is exhausted.
    pub fn read(&mut self) -> Result<Option<T>> {
        if self.eof {
            return Ok(None);
        }
        match self.cursor.next_row()? {
            Some(row) => Ok(Some(materialize_row(
                &self.database,
                &self.desc,
                &self.columns,
                row,
            )?)),
            None => {
                self.eof = true;
                Ok(None)
            }
        }
    }

    pub fn eof(&self) -> bool {
        self.eof
    }

    pub fn close(self) {}
}
