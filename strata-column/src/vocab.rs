//! String interning for variable-length columns.
//!
//! A [Vocab] maps string content to stable small integer ids and back.
//! The serializable truth is a pair of raw buffers (concatenated bytes
//! plus an offset/extent table); the lookup index over them is rebuilt
//! after any byte-level bulk load.

use std::sync::Arc;

use parking_lot::RwLock;
use strata_store::{BufferRecipe, RawBuffer, StoreError, DEFAULT_EMPTY_CAPACITY};
use tracing::trace;

/// A dictionary handle that can be shared between columns.
///
/// Sharing is explicit: [crate::Column::borrow_vocabulary] clones the
/// handle so both columns observe one id space, while default
/// construction always creates an independent instance.
pub type SharedVocab = Arc<RwLock<Vocab>>;

#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
/// The byte range of one interned string within the data buffer.
struct Extent {
    begin: u64,
    end: u64,
}

/// A per-column string interning dictionary.
///
/// Id 0 is reserved for the empty string and guaranteed present once
/// the vocabulary is initialized.
pub struct Vocab {
    /// Concatenated bytes of every unique string, in id order.
    vlendata: RawBuffer,
    /// One [Extent] per id, locating its bytes in `vlendata`.
    extents: RawBuffer,
    /// Content to id lookup. Rebuildable from the two buffers.
    map: ahash::HashMap<Arc<str>, u64>,
    /// Id to content lookup. Entries share their allocations with `map`
    /// and with any scalar resolved from this vocabulary.
    by_id: Vec<Arc<str>>,
    /// The next id to assign.
    high_water: u64,
}

impl Vocab {
    /// Creates a vocabulary over the given backing buffers.
    pub fn new(vlendata: RawBuffer, extents: RawBuffer) -> Self {
        Self {
            vlendata,
            extents,
            map: ahash::HashMap::default(),
            by_id: Vec::new(),
            high_water: 0,
        }
    }

    /// Creates a vocabulary with small default-capacity backing buffers
    /// named after the owning column.
    pub fn with_default_capacity(column_name: &str) -> Self {
        Self::new(
            RawBuffer::new(format!("{column_name}_vlendata"), DEFAULT_EMPTY_CAPACITY),
            RawBuffer::new(format!("{column_name}_extents"), DEFAULT_EMPTY_CAPACITY),
        )
    }

    /// Creates the inert placeholder held by fixed-width columns.
    pub fn placeholder() -> Self {
        Self::new(RawBuffer::new("", 0), RawBuffer::new("", 0))
    }

    /// Attaches a vocabulary to previously captured buffer recipes.
    ///
    /// The lookup index stays empty until [Vocab::init] rebuilds it.
    pub fn from_attached(
        vlendata: BufferRecipe,
        extents: BufferRecipe,
        high_water: u64,
    ) -> Result<Self, StoreError> {
        let mut vocab = Self::new(
            RawBuffer::from_recipe(vlendata)?,
            RawBuffer::from_recipe(extents)?,
        );
        vocab.high_water = high_water;
        Ok(vocab)
    }

    /// Finalizes the vocabulary.
    ///
    /// Fresh vocabularies seed the reserved empty-string id; attached
    /// ones rebuild their lookup index from the raw bytes instead.
    pub fn init(&mut self, from_recipe: bool) {
        self.vlendata.init();
        self.extents.init();

        if from_recipe {
            self.rebuild_index();
        } else {
            let id = self.intern("");
            debug_assert_eq!(id, 0);
        }
    }

    /// Interns a string, returning its stable id.
    pub fn intern(&mut self, value: &str) -> u64 {
        if let Some(id) = self.map.get(value) {
            return *id;
        }

        let id = self.high_water;
        let begin = self.vlendata.len() as u64;
        self.vlendata.push_bytes(value.as_bytes());
        let end = self.vlendata.len() as u64;
        self.extents.push(Extent { begin, end });

        let shared: Arc<str> = Arc::from(value);
        self.map.insert(shared.clone(), id);
        self.by_id.push(shared);
        self.high_water += 1;
        id
    }

    /// Resolves an id back to its string content.
    ///
    /// An id outside the assigned range is a contract violation.
    pub fn resolve(&self, id: u64) -> Arc<str> {
        assert!(
            id < self.high_water,
            "Dictionary id {id} out of range (high water {})",
            self.high_water
        );
        self.by_id[id as usize].clone()
    }

    /// Returns whether the given content has already been interned.
    pub fn contains(&self, value: &str) -> bool {
        self.map.contains_key(value)
    }

    #[inline]
    /// The next id to assign.
    pub fn high_water(&self) -> u64 {
        self.high_water
    }

    #[inline]
    /// The number of interned entries, the reserved empty string included.
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Adopts another vocabulary's raw contents wholesale.
    ///
    /// This is a byte-level fill: the lookup index is stale afterwards
    /// and must be refreshed with [Vocab::rebuild_index].
    pub fn fill(&mut self, vlendata: &RawBuffer, extents: &RawBuffer, high_water: u64) {
        self.vlendata.fill(vlendata);
        self.extents.fill(extents);
        self.high_water = high_water;
    }

    /// Reconstructs the lookup index from the raw buffers.
    pub fn rebuild_index(&mut self) {
        self.map.clear();
        self.by_id.clear();

        let bytes = self.vlendata.as_slice();
        for id in 0..self.high_water {
            let extent: Extent = self.extents.get(id as usize);
            let content = &bytes[extent.begin as usize..extent.end as usize];
            let content =
                std::str::from_utf8(content).expect("Dictionary bytes are not valid UTF-8");

            let shared: Arc<str> = Arc::from(content);
            self.map.insert(shared.clone(), id);
            self.by_id.push(shared);
        }

        trace!(entries = self.by_id.len(), "Rebuilt dictionary index");
    }

    /// Content-level copy of another vocabulary, index included.
    pub fn clone_contents(&mut self, other: &Vocab) {
        self.fill(&other.vlendata, &other.extents, other.high_water);
        self.rebuild_index();
    }

    /// Merges another vocabulary's entries into this one.
    ///
    /// Entries keep their content but are assigned ids from this
    /// vocabulary's id space.
    pub fn copy_vocabulary(&mut self, other: &Vocab) {
        for entry in &other.by_id {
            self.intern(entry);
        }
    }

    /// Grows the backing reservations ahead of a bulk load.
    pub fn reserve(&mut self, total_bytes: usize, entry_count: usize) {
        self.vlendata.reserve(total_bytes);
        self.extents.reserve(entry_count * std::mem::size_of::<Extent>());
    }

    /// The concatenated string bytes, for recipe capture.
    pub fn vlendata(&self) -> &RawBuffer {
        &self.vlendata
    }

    /// The extent table, for recipe capture.
    pub fn extents(&self) -> &RawBuffer {
        &self.extents
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready() -> Vocab {
        let mut vocab = Vocab::with_default_capacity("test");
        vocab.init(false);
        vocab
    }

    #[test]
    fn test_empty_string_is_reserved_id_zero() {
        let mut vocab = ready();
        assert_eq!(vocab.high_water(), 1);
        assert_eq!(vocab.intern(""), 0);
        assert_eq!(vocab.resolve(0).as_ref(), "");
    }

    #[test]
    fn test_intern_dedupes_content() {
        let mut vocab = ready();
        let a = vocab.intern("a");
        let b = vocab.intern("b");
        assert_eq!(vocab.intern("a"), a);
        assert_ne!(a, b);
        assert_eq!(vocab.high_water(), 3);
        assert_eq!(vocab.resolve(a).as_ref(), "a");
        assert_eq!(vocab.resolve(b).as_ref(), "b");
    }

    #[test]
    fn test_fill_and_rebuild_preserves_id_space() {
        let mut src = ready();
        src.intern("alpha");
        src.intern("beta");

        let mut dst = ready();
        dst.fill(src.vlendata(), src.extents(), src.high_water());
        dst.rebuild_index();

        assert_eq!(dst.high_water(), src.high_water());
        assert_eq!(dst.resolve(1).as_ref(), "alpha");
        assert_eq!(dst.resolve(2).as_ref(), "beta");
        assert_eq!(dst.intern("alpha"), 1);
        assert_eq!(dst.intern("gamma"), 3);
    }

    #[test]
    fn test_copy_vocabulary_merges_into_own_id_space() {
        let mut src = ready();
        src.intern("x");
        src.intern("y");

        let mut dst = ready();
        dst.intern("y");
        dst.copy_vocabulary(&src);

        assert_eq!(dst.high_water(), 3);
        assert!(dst.contains("x"));
        assert_eq!(dst.intern("y"), 1);
    }

    #[test]
    fn test_reserve_sizes_both_buffers() {
        let mut vocab = ready();
        vocab.reserve(4096, 64);
        assert!(vocab.vlendata().capacity() >= 4096);
        assert!(vocab.extents().capacity() >= 64 * std::mem::size_of::<Extent>());
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_resolve_out_of_range_panics() {
        let vocab = ready();
        vocab.resolve(5);
    }
}
