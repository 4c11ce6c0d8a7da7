/// Highest event id already handed to the broadcaster.
///
/// Owned by the event source task alone. It only moves forward: a lower
/// value passed to [`advance`](Self::advance) is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    last_delivered_id: i64,
}

impl Cursor {
    pub fn new(start: i64) -> Self {
        Self {
            last_delivered_id: start,
        }
    }

    pub fn last_delivered_id(&self) -> i64 {
        self.last_delivered_id
    }

    /// Move to `id` if it is ahead. Returns whether the cursor moved.
    pub fn advance(&mut self, id: i64) -> bool {
        if id > self.last_delivered_id {
            self.last_delivered_id = id;
            true
        } else {
            false
        }
    }
}

impl Default for Cursor {
    fn default() -> Self {
        Self::new(i64::MIN)
    }
}
