//! The playout list owned by the hub.

/// Errors from list operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ListError {
    #[error("index {index} out of range for list of {len} item(s)")]
    OutOfRange { index: usize, len: usize },
}

/// An ordered list of items plus the auto-advance mode flag.
///
/// Only ever touched from the hub's event loop, so it needs no locking.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct List {
    auto_mode: bool,
    items: Vec<String>,
}

impl List {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn auto_mode(&self) -> bool {
        self.auto_mode
    }

    pub fn set_auto_mode(&mut self, auto_mode: bool) {
        self.auto_mode = auto_mode;
    }

    pub fn items(&self) -> &[String] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Inserts `item` before `index`; `index == len` appends.
    pub fn enqueue(&mut self, index: usize, item: String) -> Result<(), ListError> {
        if index > self.items.len() {
            return Err(ListError::OutOfRange {
                index,
                len: self.items.len(),
            });
        }
        self.items.insert(index, item);
        Ok(())
    }

    /// Removes and returns the item at `index`.
    pub fn dequeue(&mut self, index: usize) -> Result<String, ListError> {
        if index >= self.items.len() {
            return Err(ListError::OutOfRange {
                index,
                len: self.items.len(),
            });
        }
        Ok(self.items.remove(index))
    }
}
