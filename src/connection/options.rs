use crate::core::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderMode {
    Ascending,
    Descending,
    None,
}

type Filter<T> = Box<dyn Fn(&T) -> bool + Send>;

/// Options recognized by the read and save operations.
///
/// Built with chained setters; the default reads every non-delayed
/// field with no cap and writes only tracked changes.
pub struct ReadOptions<T> {
    pub force_create: bool,
    pub order_by: Option<String>,
    pub order_mode: OrderMode,
    pub group_on: Option<String>,
    pub fields: Vec<String>,
    /// 0 means unlimited.
    pub max_records: u64,
    pub ignore_delayed: bool,
    pub write_all_fields: bool,
    filter: Option<Filter<T>>,
}

impl<T> Default for ReadOptions<T> {
    fn default() -> Self {
        Self {
            force_create: false,
            order_by: None,
            order_mode: OrderMode::None,
            group_on: None,
            fields: Vec::new(),
            max_records: 0,
            ignore_delayed: false,
            write_all_fields: false,
            filter: None,
        }
    }
}

impl<T> ReadOptions<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Treat the next save as an insert regardless of key state.
    pub fn force_create(mut self) -> Self {
        self.force_create = true;
        self
    }

    pub fn order_by(mut self, field: impl Into<String>) -> Self {
        self.order_by = Some(field.into());
        if self.order_mode == OrderMode::None {
            self.order_mode = OrderMode::Ascending;
        }
        self
    }

    pub fn order_mode(mut self, mode: OrderMode) -> Self {
        self.order_mode = mode;
        self
    }

    pub fn group_on(mut self, field: impl Into<String>) -> Self {
        self.group_on = Some(field.into());
        self
    }

    /// Restrict the projection (read) or the written columns (save).
    pub fn fields(mut self, fields: &[&str]) -> Self {
        self.fields = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn max_records(mut self, max: u64) -> Self {
        self.max_records = max;
        self
    }

    /// Include delayed fields in the SELECT projection.
    pub fn ignore_delayed(mut self) -> Self {
        self.ignore_delayed = true;
        self
    }

    /// Force-write unchanged fields on update.
    pub fn write_all_fields(mut self) -> Self {
        self.write_all_fields = true;
        self
    }

    /// Predicate applied after row materialization; rejected rows are
    /// omitted from the result.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&T) -> bool + Send + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    pub(crate) fn accepts(&self, entity: &T) -> bool {
        self.filter.as_ref().map_or(true, |f| f(entity))
    }
}

/// Raw tabular result returned by the untyped select.
#[derive(Debug, Clone, Default)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl RowSet {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options: ReadOptions<()> = ReadOptions::new();
        assert!(!options.force_create);
        assert_eq!(options.max_records, 0);
        assert_eq!(options.order_mode, OrderMode::None);
        assert!(options.accepts(&()));
    }

    #[test]
    fn test_order_by_defaults_ascending() {
        let options: ReadOptions<()> = ReadOptions::new().order_by("NAME");
        assert_eq!(options.order_mode, OrderMode::Ascending);
        let descending: ReadOptions<()> =
            ReadOptions::new().order_by("NAME").order_mode(OrderMode::Descending);
        assert_eq!(descending.order_mode, OrderMode::Descending);
    }

    #[test]
    fn test_filter() {
        let options: ReadOptions<i32> = ReadOptions::new().filter(|v| *v > 2);
        assert!(options.accepts(&3));
        assert!(!options.accepts(&1));
    }
}
