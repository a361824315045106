use crate::core::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TrackMode {
    Tracked,
    Untracked,
    Rollback,
}

/// Per-instance buffer of pre-change values.
///
/// Records, for each property first mutated since the last commit, the
/// value it had before the mutation, in insertion order. The buffer never
/// touches the owning entity; setters consult `track` and perform the
/// assignment themselves when it returns true.
#[derive(Debug, Clone)]
pub struct ChangeBuffer {
    changes: Vec<(String, Value)>,
    dirty: bool,
    mode: TrackMode,
}

impl Default for ChangeBuffer {
    fn default() -> Self {
        Self {
            changes: Vec::new(),
            dirty: false,
            mode: TrackMode::Tracked,
        }
    }
}

/// String NULL and the empty string are the same value for tracking.
fn normalize_pair(old: &Value, new: &Value) -> (Value, Value) {
    match (old, new) {
        (Value::Text(_), Value::Null) => (old.clone(), Value::Text(String::new())),
        (Value::Null, Value::Text(_)) => (Value::Text(String::new()), new.clone()),
        _ => (old.clone(), new.clone()),
    }
}

impl ChangeBuffer {
    /// Decide whether a mutation `old -> new` of `name` should proceed.
    ///
    /// Returns false when the values are equal (the mutation is a no-op).
    /// In tracked mode the first mutation of a property records its
    /// pre-change value and marks the buffer dirty.
    pub fn track(&mut self, name: &str, old: &Value, new: &Value) -> bool {
        let (old, new) = normalize_pair(old, new);
        if old == new {
            return false;
        }

        if self.mode == TrackMode::Tracked {
            if !self.changes.iter().any(|(n, _)| n.eq_ignore_ascii_case(name)) {
                self.changes.push((name.to_string(), old));
            }
            self.dirty = true;
        }
        true
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn commit(&mut self) {
        self.changes.clear();
        self.dirty = false;
    }

    pub fn changed_properties(&self) -> Vec<String> {
        self.changes.iter().map(|(n, _)| n.clone()).collect()
    }

    pub fn original_value(&self, name: &str) -> Option<&Value> {
        self.changes
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }

    pub fn entries(&self) -> &[(String, Value)] {
        &self.changes
    }

    pub fn set_tracked(&mut self) {
        self.mode = TrackMode::Tracked;
    }

    /// Subsequent mutations bypass the buffer and do not dirty it.
    pub fn set_untracked(&mut self) {
        self.mode = TrackMode::Untracked;
    }

    /// Drain the buffered values and switch into rollback mode so the
    /// inverse writes are not themselves tracked.
    pub(crate) fn begin_rollback(&mut self) -> Vec<(String, Value)> {
        self.mode = TrackMode::Rollback;
        self.dirty = false;
        std::mem::take(&mut self.changes)
    }

    pub(crate) fn end_rollback(&mut self) {
        self.mode = TrackMode::Tracked;
    }
}
