use strata_store::{BufferRecipe, RawBuffer, StoreError};

use crate::mask::Mask;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// The per-row validity marker of a status-tracked column.
pub enum Status {
    /// The row has been allocated but never written.
    Empty = 0,
    /// The row was explicitly cleared as an error.
    Invalid = 1,
    Valid = 2,
    /// The row was explicitly unset.
    Cleared = 3,
}

impl Status {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => Status::Empty,
            1 => Status::Invalid,
            2 => Status::Valid,
            3 => Status::Cleared,
            other => panic!("Invalid status byte {other} in validity buffer"),
        }
    }
}

#[derive(Debug)]
/// A per-row status buffer, one byte per row.
///
/// Every column owns one of these even when status tracking is disabled;
/// the disabled case wraps an inert empty buffer so access sites never
/// branch on presence.
pub struct ValidityTrack {
    buf: RawBuffer,
}

impl ValidityTrack {
    /// Creates a track with capacity for `rows` statuses.
    pub fn new(name: impl Into<String>, rows: usize) -> Self {
        Self {
            buf: RawBuffer::new(name, rows),
        }
    }

    /// Creates the inert placeholder used by non-tracking columns.
    pub fn placeholder() -> Self {
        Self {
            buf: RawBuffer::new("", 0),
        }
    }

    /// Attaches a track to a previously captured recipe.
    pub fn from_recipe(recipe: BufferRecipe) -> Result<Self, StoreError> {
        Ok(Self {
            buf: RawBuffer::from_recipe(recipe)?,
        })
    }

    pub fn init(&mut self) {
        self.buf.init();
    }

    /// The diagnostic name of the backing buffer.
    pub fn name(&self) -> &str {
        self.buf.name()
    }

    /// Rows of reserved capacity.
    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }

    /// Rows currently tracked.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn reserve(&mut self, rows: usize) {
        self.buf.reserve(rows);
    }

    pub fn set_len(&mut self, rows: usize) {
        self.buf.set_len(rows);
    }

    pub fn push(&mut self, status: Status) {
        self.buf.push(status as u8);
    }

    pub fn get(&self, idx: usize) -> Status {
        Status::from_u8(self.buf.get::<u8>(idx))
    }

    pub fn set(&mut self, idx: usize, status: Status) {
        self.buf.set(idx, status as u8);
    }

    /// Overwrites every tracked row with the given status.
    pub fn raw_fill(&mut self, status: Status) {
        self.buf.raw_fill(status as u8);
    }

    pub fn append(&mut self, other: &ValidityTrack) {
        self.buf.append(&other.buf);
    }

    pub fn fill(&mut self, other: &ValidityTrack) {
        self.buf.fill(&other.buf);
    }

    /// Compacts the selected rows of another track into this one.
    pub fn fill_masked(&mut self, other: &ValidityTrack, mask: &Mask) {
        self.buf.fill_selected(&other.buf, mask.selected(), 1);
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }

    pub fn recipe(&self) -> BufferRecipe {
        self.buf.recipe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready(rows: usize) -> ValidityTrack {
        let mut track = ValidityTrack::new("col_missing", rows);
        track.init();
        track
    }

    #[test]
    fn test_push_get_round_trip() {
        let mut track = ready(4);
        track.push(Status::Valid);
        track.push(Status::Invalid);
        track.push(Status::Cleared);
        assert_eq!(track.len(), 3);
        assert_eq!(track.get(0), Status::Valid);
        assert_eq!(track.get(1), Status::Invalid);
        assert_eq!(track.get(2), Status::Cleared);
    }

    #[test]
    fn test_untouched_rows_read_empty() {
        let mut track = ready(4);
        track.set_len(2);
        assert_eq!(track.get(0), Status::Empty);
        assert_eq!(track.get(1), Status::Empty);
    }

    #[test]
    fn test_raw_fill_marks_every_row() {
        let mut track = ready(4);
        track.set_len(4);
        track.raw_fill(Status::Valid);
        for idx in 0..4 {
            assert_eq!(track.get(idx), Status::Valid);
        }
    }

    #[test]
    fn test_fill_masked_compacts() {
        let mut src = ready(4);
        src.push(Status::Valid);
        src.push(Status::Invalid);
        src.push(Status::Cleared);
        src.push(Status::Valid);

        let mut mask = Mask::with_len(4);
        mask.set(1, true);
        mask.set(3, true);

        let mut dst = ready(4);
        dst.fill_masked(&src, &mask);
        assert_eq!(dst.len(), 2);
        assert_eq!(dst.get(0), Status::Invalid);
        assert_eq!(dst.get(1), Status::Valid);
    }
}
