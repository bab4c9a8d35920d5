//! The typed column store.
//!
//! A [Column] owns one primary buffer of homogeneously-typed values, an
//! always-present dictionary handle (inert for fixed-width dtypes), and
//! an always-present validity track (inert when status tracking is
//! disabled). Every typed entry point dispatches over [Dtype] once per
//! call; bulk operations stay byte-level wherever the algorithm allows.

use std::mem;
use std::sync::Arc;

use bon::Builder;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use strata_store::{BufferRecipe, RawBuffer};
use tracing::{debug, trace};

use crate::dtype::Dtype;
use crate::error::ColumnError;
use crate::mask::Mask;
use crate::scalar::{Date, RatioPair, Scalar, Time, Value};
use crate::validity::{Status, ValidityTrack};
use crate::vocab::{SharedVocab, Vocab};

#[derive(Debug, Builder)]
/// Options used when creating a fresh [Column].
pub struct ColumnOptions {
    /// The physical representation of the column's values.
    pub dtype: Dtype,
    #[builder(default)]
    /// Whether the column tracks a per-row validity status.
    pub status_enabled: bool,
    /// The number of rows to reserve capacity for up front.
    pub capacity: usize,
    #[builder(into, default = String::from("column"))]
    /// The name given to the backing buffers for diagnostics.
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
/// A serializable descriptor of a column's buffer layout and contents.
///
/// Capturing a recipe and reconstructing a column from it reproduces the
/// original scalar sequence without re-deriving any data.
pub struct ColumnRecipe {
    pub dtype: Dtype,
    /// The primary data buffer.
    pub data: BufferRecipe,
    pub is_vlen: bool,
    /// The dictionary's concatenated string bytes, for string columns.
    pub vlendata: Option<BufferRecipe>,
    /// The dictionary's extent table, for string columns.
    pub extents: Option<BufferRecipe>,
    pub status_enabled: bool,
    /// The validity buffer, when status tracking is enabled.
    pub status: Option<BufferRecipe>,
    /// The dictionary's next-id high-water mark.
    pub high_water: u64,
    /// The logical row count.
    pub len: u64,
}

/// A single typed column of an analytics table.
///
/// A column must be initialized with [Column::init] exactly once before
/// any read or write; the logical row count is tracked separately from
/// the backing buffers' byte capacity.
pub struct Column {
    dtype: Dtype,
    init: bool,
    is_vlen: bool,
    /// Logical row count.
    len: usize,
    /// Cached element byte width. Zero for dtypes without a
    /// statically known width.
    elem_width: usize,
    status_enabled: bool,
    /// Set when the column was attached to a captured layout rather
    /// than freshly allocated.
    from_recipe: bool,
    data: RawBuffer,
    vocab: SharedVocab,
    validity: ValidityTrack,
}

impl Column {
    /// Creates a fresh, uninitialized column with empty backing buffers.
    pub fn new(options: ColumnOptions) -> Self {
        let ColumnOptions {
            dtype,
            status_enabled,
            capacity,
            name,
        } = options;

        assert!(
            dtype.has_deterministic_width(),
            "A {dtype} column can only be attached to an explicit buffer descriptor"
        );
        let elem_width = dtype.fixed_width();

        let vocab = if dtype.is_vlen() {
            Vocab::with_default_capacity(&name)
        } else {
            Vocab::placeholder()
        };
        let validity = if status_enabled {
            ValidityTrack::new(format!("{name}_missing"), capacity)
        } else {
            ValidityTrack::placeholder()
        };

        Self {
            dtype,
            init: false,
            is_vlen: dtype.is_vlen(),
            len: 0,
            elem_width,
            status_enabled,
            from_recipe: false,
            data: RawBuffer::new(name, capacity * elem_width),
            vocab: Arc::new(RwLock::new(vocab)),
            validity,
        }
    }

    /// Creates a column over an explicit data-buffer descriptor, deriving
    /// the row capacity from the descriptor's reservation.
    ///
    /// The dictionary and validity buffers are freshly allocated; this is
    /// also the only construction path for [Dtype::UserFixed] columns.
    pub fn from_data_recipe(
        dtype: Dtype,
        status_enabled: bool,
        recipe: BufferRecipe,
    ) -> Result<Self, ColumnError> {
        let elem_width = if dtype.has_deterministic_width() {
            dtype.fixed_width()
        } else {
            0
        };
        let row_capacity = if elem_width > 0 {
            recipe.capacity as usize / elem_width
        } else {
            0
        };
        let name = recipe.name.clone();

        let vocab = if dtype.is_vlen() {
            Vocab::with_default_capacity(&name)
        } else {
            Vocab::placeholder()
        };
        let validity = if status_enabled {
            ValidityTrack::new(format!("{name}_missing"), row_capacity)
        } else {
            ValidityTrack::placeholder()
        };

        Ok(Self {
            dtype,
            init: false,
            is_vlen: dtype.is_vlen(),
            len: 0,
            elem_width,
            status_enabled,
            from_recipe: false,
            data: RawBuffer::from_recipe(recipe)?,
            vocab: Arc::new(RwLock::new(vocab)),
            validity,
        })
    }

    /// Reconstructs a column from a previously captured recipe.
    ///
    /// Every described buffer is attached rather than re-derived; the
    /// column still requires [Column::init] before use.
    pub fn from_recipe(recipe: ColumnRecipe) -> Result<Self, ColumnError> {
        let ColumnRecipe {
            dtype,
            data,
            is_vlen,
            vlendata,
            extents,
            status_enabled,
            status,
            high_water,
            len,
        } = recipe;

        if is_vlen != dtype.is_vlen() {
            return Err(ColumnError::VlenFlagMismatch(dtype));
        }

        let data = RawBuffer::from_recipe(data)?;
        let vocab = if is_vlen {
            let vlendata = vlendata.ok_or(ColumnError::MissingBuffer("vlendata"))?;
            let extents = extents.ok_or(ColumnError::MissingBuffer("extents"))?;
            Vocab::from_attached(vlendata, extents, high_water)?
        } else {
            Vocab::placeholder()
        };
        let validity = if status_enabled {
            let status = status.ok_or(ColumnError::MissingBuffer("status"))?;
            ValidityTrack::from_recipe(status)?
        } else {
            ValidityTrack::placeholder()
        };

        let elem_width = if dtype.has_deterministic_width() {
            dtype.fixed_width()
        } else {
            0
        };

        debug!(dtype = %dtype, rows = len, "Attach column from recipe");

        Ok(Self {
            dtype,
            init: false,
            is_vlen,
            len: len as usize,
            elem_width,
            status_enabled,
            from_recipe: true,
            data,
            vocab: Arc::new(RwLock::new(vocab)),
            validity,
        })
    }

    /// Creates a status-enabled column holding the given values, in order.
    pub fn build(dtype: Dtype, values: impl IntoIterator<Item = Scalar>) -> Column {
        let values: Vec<Scalar> = values.into_iter().collect();
        let options = ColumnOptions::builder()
            .dtype(dtype)
            .status_enabled(true)
            .capacity(values.len())
            .build();

        let mut column = Column::new(options);
        column.init();
        for value in values {
            column.push_scalar(value);
        }
        column
    }

    /// Finalizes the column: initializes every owned buffer, rebuilds or
    /// seeds the dictionary, and caches the element width.
    ///
    /// Must be called exactly once; any read or write beforehand panics.
    pub fn init(&mut self) {
        assert!(!self.init, "Column was initialized more than once");

        self.data.init();
        if self.is_vlen {
            self.vocab.write().init(self.from_recipe);
        }
        if self.status_enabled {
            self.validity.init();
        }
        if self.dtype.has_deterministic_width() {
            self.elem_width = self.dtype.fixed_width();
        }
        self.init = true;

        trace!(dtype = %self.dtype, rows = self.len, "Column ready");
        self.verify_size();
    }

    /// Creates an uninitialized column whose buffer capacity layout
    /// mirrors this one's, with no content.
    ///
    /// The result is never marked as recipe-attached, even when the
    /// source was.
    pub fn structural_clone(&self) -> Column {
        let vocab = if self.is_vlen {
            let src = self.vocab.read();
            Vocab::new(
                RawBuffer::new(src.vlendata().name(), src.vlendata().capacity()),
                RawBuffer::new(src.extents().name(), src.extents().capacity()),
            )
        } else {
            Vocab::placeholder()
        };
        let validity = if self.status_enabled {
            ValidityTrack::new(self.validity.name(), self.validity.capacity())
        } else {
            ValidityTrack::placeholder()
        };

        Column {
            dtype: self.dtype,
            init: false,
            is_vlen: self.is_vlen,
            len: self.len,
            elem_width: self.elem_width,
            status_enabled: self.status_enabled,
            from_recipe: false,
            data: RawBuffer::new(self.data.name(), self.data.capacity()),
            vocab: Arc::new(RwLock::new(vocab)),
            validity,
        }
    }

    #[inline]
    pub fn dtype(&self) -> Dtype {
        self.dtype
    }

    #[inline]
    /// The logical row count.
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn is_vlen(&self) -> bool {
        self.is_vlen
    }

    #[inline]
    pub fn is_status_enabled(&self) -> bool {
        self.status_enabled
    }

    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.init
    }

    #[inline]
    pub fn is_from_recipe(&self) -> bool {
        self.from_recipe
    }

    /// The primary data buffer.
    pub fn data_buffer(&self) -> &RawBuffer {
        &self.data
    }

    /// The dictionary's next-id high-water mark.
    pub fn high_water(&self) -> u64 {
        self.vocab.read().high_water()
    }

    // ---- typed value access -------------------------------------------

    /// Reads the value at `idx` as a [Scalar], with its per-row status
    /// attached when tracking is enabled.
    pub fn get_scalar(&self, idx: usize) -> Scalar {
        self.check_access(idx);

        let mut scalar = match self.dtype {
            Dtype::None => Scalar::null(),
            Dtype::I8 => Scalar::from(self.data.get::<i8>(idx)),
            Dtype::I16 => Scalar::from(self.data.get::<i16>(idx)),
            Dtype::I32 => Scalar::from(self.data.get::<i32>(idx)),
            Dtype::I64 => Scalar::from(self.data.get::<i64>(idx)),
            Dtype::U8 => Scalar::from(self.data.get::<u8>(idx)),
            Dtype::U16 => Scalar::from(self.data.get::<u16>(idx)),
            Dtype::U32 => Scalar::from(self.data.get::<u32>(idx)),
            Dtype::U64 => Scalar::from(self.data.get::<u64>(idx)),
            Dtype::F32 => Scalar::from(self.data.get::<f32>(idx)),
            Dtype::F64 => Scalar::from(self.data.get::<f64>(idx)),
            Dtype::Bool => Scalar::from(self.data.get::<u8>(idx) != 0),
            Dtype::Time => Scalar::from(Time::new(self.data.get::<i64>(idx))),
            Dtype::Date => Scalar::from(Date::new(self.data.get::<u32>(idx))),
            Dtype::Ratio => {
                let pair: RatioPair = self.data.get(idx);
                Scalar::from(pair.num / pair.den)
            },
            Dtype::Str => {
                let id = self.data.get::<u64>(idx);
                Scalar {
                    value: Value::Str(self.vocab.read().resolve(id)),
                    status: Status::Valid,
                }
            },
            Dtype::UserFixed => {
                panic!("Cannot read a scalar from a user-fixed column")
            },
        };

        if self.status_enabled {
            scalar.status = self.validity.get(idx);
        }
        scalar
    }

    /// Writes a scalar at `idx`, coercing its value through this column's
    /// own dtype; the incoming tag is not trusted.
    pub fn set_scalar(&mut self, idx: usize, value: Scalar) {
        self.check_access(idx);

        match self.dtype {
            Dtype::None => {},
            Dtype::I8 => self.set_raw_with(idx, value.as_i8(), value.status),
            Dtype::I16 => self.set_raw_with(idx, value.as_i16(), value.status),
            Dtype::I32 => self.set_raw_with(idx, value.as_i32(), value.status),
            Dtype::I64 => self.set_raw_with(idx, value.as_i64(), value.status),
            Dtype::U8 => self.set_raw_with(idx, value.as_u8(), value.status),
            Dtype::U16 => self.set_raw_with(idx, value.as_u16(), value.status),
            Dtype::U32 => self.set_raw_with(idx, value.as_u32(), value.status),
            Dtype::U64 => self.set_raw_with(idx, value.as_u64(), value.status),
            Dtype::F32 => self.set_raw_with(idx, value.as_f32(), value.status),
            Dtype::F64 => self.set_raw_with(idx, value.as_f64(), value.status),
            Dtype::Bool => self.set_raw_with(idx, value.as_bool() as u8, value.status),
            Dtype::Time => self.set_raw_with(idx, value.as_time().raw(), value.status),
            Dtype::Date => self.set_raw_with(idx, value.as_date().raw(), value.status),
            Dtype::Str => {
                self.set_str_with(idx, value.as_str().unwrap_or(""), value.status)
            },
            Dtype::Ratio | Dtype::UserFixed => {
                panic!("Cannot set a scalar on a {} column", self.dtype)
            },
        }
    }

    /// Writes a string at `idx`, marking the row valid.
    pub fn set_str(&mut self, idx: usize, value: &str) {
        self.set_str_with(idx, value, Status::Valid);
    }

    /// Writes a string at `idx` with an explicit status.
    pub fn set_str_with(&mut self, idx: usize, value: &str, status: Status) {
        self.check_access(idx);
        self.check_strcol();

        let id = self.vocab.write().intern(value);
        self.data.set(idx, id);
        if self.status_enabled {
            self.validity.set(idx, status);
        }
    }

    /// Appends one raw fixed-width value.
    ///
    /// The status buffer is left untouched; use
    /// [Column::push_with_status] to record one.
    pub fn push<T: bytemuck::Pod>(&mut self, value: T) {
        self.check_init();
        self.check_width::<T>();
        self.data.push(value);
        self.len += 1;
    }

    /// Appends one raw fixed-width value together with its status.
    pub fn push_with_status<T: bytemuck::Pod>(&mut self, value: T, status: Status) {
        self.check_status_enabled();
        self.check_init();
        self.check_width::<T>();
        self.data.push(value);
        self.validity.push(status);
        self.len += 1;
    }

    /// Interns and appends one string.
    ///
    /// The status buffer is left untouched; use
    /// [Column::push_str_with_status] to record one.
    pub fn push_str(&mut self, value: &str) {
        self.check_init();
        self.check_strcol();
        let id = self.vocab.write().intern(value);
        self.data.push(id);
        self.len += 1;
    }

    /// Interns and appends one string together with its status.
    pub fn push_str_with_status(&mut self, value: &str, status: Status) {
        self.check_status_enabled();
        self.check_init();
        self.check_strcol();
        let id = self.vocab.write().intern(value);
        self.data.push(id);
        self.validity.push(status);
        self.len += 1;
    }

    /// Appends one scalar, dispatching exactly as [Column::set_scalar]
    /// would. The row count grows by exactly 1 on every branch.
    pub fn push_scalar(&mut self, value: Scalar) {
        self.check_init();

        match self.dtype {
            Dtype::None => panic!("Cannot push onto a none-typed column"),
            Dtype::I8 => self.push_fixed(value.as_i8(), value.status),
            Dtype::I16 => self.push_fixed(value.as_i16(), value.status),
            Dtype::I32 => self.push_fixed(value.as_i32(), value.status),
            Dtype::I64 => self.push_fixed(value.as_i64(), value.status),
            Dtype::U8 => self.push_fixed(value.as_u8(), value.status),
            Dtype::U16 => self.push_fixed(value.as_u16(), value.status),
            Dtype::U32 => self.push_fixed(value.as_u32(), value.status),
            Dtype::U64 => self.push_fixed(value.as_u64(), value.status),
            Dtype::F32 => self.push_fixed(value.as_f32(), value.status),
            Dtype::F64 => self.push_fixed(value.as_f64(), value.status),
            Dtype::Bool => self.push_fixed(value.as_bool() as u8, value.status),
            Dtype::Time => self.push_fixed(value.as_time().raw(), value.status),
            Dtype::Date => self.push_fixed(value.as_date().raw(), value.status),
            Dtype::Str => {
                let id = self.vocab.write().intern(value.as_str().unwrap_or(""));
                self.data.push(id);
                if self.status_enabled {
                    self.validity.push(value.status);
                }
            },
            Dtype::Ratio | Dtype::UserFixed => {
                panic!("Cannot push a scalar onto a {} column", self.dtype)
            },
        }

        self.len += 1;
    }

    fn push_fixed<T: bytemuck::Pod>(&mut self, value: T, status: Status) {
        self.data.push(value);
        if self.status_enabled {
            self.validity.push(status);
        }
    }

    /// Overwrites the element at `idx` with the dtype's zero
    /// representation and marks the row invalid.
    pub fn clear_at(&mut self, idx: usize) {
        self.clear_with(idx, Status::Invalid);
    }

    /// Overwrites the element at `idx` with the dtype's zero
    /// representation and marks the row cleared.
    pub fn unset(&mut self, idx: usize) {
        self.clear_with(idx, Status::Cleared);
    }

    /// Zeroes the element at `idx` and records the given status.
    ///
    /// For string columns the zero representation is dictionary id 0,
    /// the reserved empty string.
    pub fn clear_with(&mut self, idx: usize, status: Status) {
        self.check_access(idx);

        match self.dtype {
            Dtype::None => return,
            Dtype::I8 | Dtype::U8 | Dtype::Bool => self.data.set(idx, 0u8),
            Dtype::I16 | Dtype::U16 => self.data.set(idx, 0u16),
            Dtype::I32 | Dtype::U32 | Dtype::F32 | Dtype::Date => self.data.set(idx, 0u32),
            Dtype::I64 | Dtype::U64 | Dtype::F64 | Dtype::Time | Dtype::Str => {
                self.data.set(idx, 0u64)
            },
            Dtype::Ratio => self.data.set(idx, RatioPair { num: 0.0, den: 0.0 }),
            Dtype::UserFixed => panic!("Cannot clear a user-fixed column element"),
        }

        if self.status_enabled {
            self.validity.set(idx, status);
        }
    }

    /// Returns whether the row at `idx` is marked valid.
    ///
    /// Calling this on a column without status tracking is a
    /// contract violation.
    pub fn is_valid(&self, idx: usize) -> bool {
        self.check_status_enabled();
        self.check_access(idx);
        self.validity.get(idx) == Status::Valid
    }

    /// Returns whether the row at `idx` was explicitly unset.
    ///
    /// Calling this on a column without status tracking is a
    /// contract violation.
    pub fn is_cleared(&self, idx: usize) -> bool {
        self.check_status_enabled();
        self.check_access(idx);
        self.validity.get(idx) == Status::Cleared
    }

    pub fn set_valid(&mut self, idx: usize, valid: bool) {
        self.set_status(
            idx,
            if valid { Status::Valid } else { Status::Invalid },
        );
    }

    pub fn set_status(&mut self, idx: usize, status: Status) {
        self.check_status_enabled();
        self.check_access(idx);
        self.validity.set(idx, status);
    }

    /// Bulk-marks every tracked row valid.
    pub fn fill_valid(&mut self) {
        self.check_status_enabled();
        self.check_init();
        self.validity.raw_fill(Status::Valid);
    }

    /// Raw typed read, the fast path used by the bulk operations.
    pub fn get_raw<T: bytemuck::Pod>(&self, idx: usize) -> T {
        self.check_access(idx);
        self.check_width::<T>();
        self.data.get(idx)
    }

    /// Raw typed write. Does not touch the row's status.
    pub fn set_raw<T: bytemuck::Pod>(&mut self, idx: usize, value: T) {
        self.check_access(idx);
        self.check_width::<T>();
        self.data.set(idx, value);
    }

    fn set_raw_with<T: bytemuck::Pod>(&mut self, idx: usize, value: T, status: Status) {
        self.data.set(idx, value);
        if self.status_enabled {
            self.validity.set(idx, status);
        }
    }

    /// Resolves the string stored at `idx`.
    ///
    /// Strings are immutable once interned; overwriting a row always
    /// goes through a fresh intern.
    pub fn get_str(&self, idx: usize) -> Arc<str> {
        self.check_access(idx);
        self.check_strcol();
        let id = self.data.get::<u64>(idx);
        self.vocab.read().resolve(id)
    }

    // ---- dictionary interop -------------------------------------------

    /// Interns a string in this column's dictionary, returning its id.
    pub fn get_interned(&mut self, value: &str) -> u64 {
        self.check_init();
        self.check_strcol();
        self.vocab.write().intern(value)
    }

    /// Resolves a dictionary id to its string content.
    pub fn unintern(&self, id: u64) -> Arc<str> {
        self.check_init();
        self.check_strcol();
        self.vocab.read().resolve(id)
    }

    /// Merges another column's dictionary content into this one's.
    pub fn copy_vocabulary(&mut self, other: &Column) {
        self.check_strcol();
        if Arc::ptr_eq(&self.vocab, &other.vocab) {
            return;
        }
        let src = other.vocab.read();
        self.vocab.write().copy_vocabulary(&src);
    }

    /// Replaces this column's dictionary with a shared reference to
    /// another column's; both then observe one id space and all
    /// subsequent interns.
    pub fn borrow_vocabulary(&mut self, other: &Column) {
        self.vocab = other.vocab.clone();
    }

    /// Bulk-preloads dictionary entries, optionally reserving
    /// `total_size_hint` bytes of string storage first.
    pub fn set_vocabulary(&mut self, entries: &[(Scalar, u64)], total_size_hint: usize) {
        self.check_init();
        self.check_strcol();

        let mut vocab = self.vocab.write();
        if total_size_hint > 0 {
            vocab.reserve(total_size_hint, entries.len() + 1);
        }
        for (value, _id) in entries {
            vocab.intern(value.as_str().unwrap_or(""));
        }
    }

    // ---- bulk structural operations -----------------------------------

    /// Grows the backing reservations to hold `rows` without changing
    /// the logical row count.
    pub fn reserve(&mut self, rows: usize) {
        self.check_init();
        self.data.reserve(rows * self.elem_width);
        if self.status_enabled {
            self.validity.reserve(rows);
        }
    }

    /// Grows the column to `rows`, recomputing the logical row count
    /// from the buffer's byte length so the two can never drift.
    pub fn extend_to(&mut self, rows: usize) {
        self.check_init();
        assert!(
            self.elem_width > 0,
            "Cannot extend a {} column",
            self.dtype
        );

        let bytes = rows * self.elem_width;
        self.data.reserve(bytes);
        self.data.set_len(bytes);
        self.len = self.data.len() / self.elem_width;

        if self.status_enabled {
            self.validity.reserve(rows);
            self.validity.set_len(rows);
        }
        self.verify_size();
    }

    /// Sets the logical row count. The rows must already be reserved.
    pub fn set_len(&mut self, rows: usize) {
        self.check_init();
        self.len = rows;
        if self.dtype.has_deterministic_width() {
            self.data.set_len(rows * self.elem_width);
        }
        if self.status_enabled {
            self.validity.set_len(rows);
        }
        self.verify_size();
    }

    /// Concatenates another column of the same dtype onto this one.
    ///
    /// Appending to an empty string column adopts the other column's
    /// buffers and dictionary wholesale; a non-empty string target
    /// re-interns row by row because the two id spaces are independent.
    pub fn append(&mut self, other: &Column) {
        self.check_init();
        assert!(self.dtype == other.dtype, "Mismatched dtypes detected");

        if self.is_vlen && self.len == 0 {
            debug!(rows = other.len, "Adopt string column contents wholesale");
            self.data.fill(&other.data);
            if self.status_enabled && other.status_enabled {
                self.validity.fill(&other.validity);
            }
            if !Arc::ptr_eq(&self.vocab, &other.vocab) {
                let src = other.vocab.read();
                let mut dst = self.vocab.write();
                dst.fill(src.vlendata(), src.extents(), src.high_water());
                dst.rebuild_index();
            }
            self.len = other.len;
        } else if self.is_vlen {
            for idx in 0..other.len {
                let value = other.get_str(idx);
                self.push_str(&value);
            }
            if self.status_enabled && other.status_enabled {
                self.validity.append(&other.validity);
            }
        } else {
            self.data.append(&other.data);
            if self.status_enabled && other.status_enabled {
                self.validity.append(&other.validity);
            }
            self.len = self.data.len() / self.elem_width;
        }

        if self.status_enabled {
            self.validity.reserve(self.len);
            if self.validity.len() < self.len {
                self.validity.set_len(self.len);
            }
        }
        self.verify_size();
    }

    /// Clones only the rows the mask selects, compacted into a dense
    /// result of `mask.count()` rows.
    ///
    /// A mask selecting every row is exactly equivalent to [Clone::clone].
    /// The dictionary is content-cloned in full either way; entries no
    /// longer referenced by any surviving row are permitted to remain.
    pub fn clone_masked(&self, mask: &Mask) -> Column {
        self.check_init();
        if mask.count() == self.len {
            return self.clone();
        }

        let mut cloned = self.structural_clone();
        cloned.init();
        cloned
            .data
            .fill_selected(&self.data, mask.selected(), self.elem_width);
        if cloned.status_enabled {
            cloned.validity.fill_masked(&self.validity, mask);
        }
        if self.is_vlen {
            let src = self.vocab.read();
            cloned.vocab.write().clone_contents(&src);
        }
        cloned.len = mask.count();
        cloned.verify_size();
        cloned
    }

    /// Gathers rows from another column of the same dtype:
    /// `self[offset + k] = other[indices[k]]` for every `k`.
    ///
    /// The destination must already cover `offset + indices.len()` rows.
    /// The string specialization reserves and iterates only
    /// `min(other.len(), indices.len())` rows, silently truncating an
    /// index list longer than its source; this asymmetry is intentional.
    pub fn copy_from(&mut self, other: &Column, indices: &[usize], offset: usize) {
        self.check_init();
        assert!(
            self.dtype == other.dtype,
            "Cannot copy between mismatched dtypes"
        );

        match self.dtype {
            Dtype::None => {},
            Dtype::I8 => self.copy_fixed::<i8>(other, indices, offset),
            Dtype::I16 => self.copy_fixed::<i16>(other, indices, offset),
            Dtype::I32 => self.copy_fixed::<i32>(other, indices, offset),
            Dtype::I64 => self.copy_fixed::<i64>(other, indices, offset),
            Dtype::U8 => self.copy_fixed::<u8>(other, indices, offset),
            Dtype::U16 => self.copy_fixed::<u16>(other, indices, offset),
            Dtype::U32 => self.copy_fixed::<u32>(other, indices, offset),
            Dtype::U64 => self.copy_fixed::<u64>(other, indices, offset),
            Dtype::F32 => self.copy_fixed::<f32>(other, indices, offset),
            Dtype::F64 => self.copy_fixed::<f64>(other, indices, offset),
            Dtype::Bool => self.copy_fixed::<u8>(other, indices, offset),
            Dtype::Time => self.copy_fixed::<i64>(other, indices, offset),
            Dtype::Date => self.copy_fixed::<u32>(other, indices, offset),
            Dtype::Ratio => self.copy_fixed::<RatioPair>(other, indices, offset),
            Dtype::Str => self.copy_str(other, indices, offset),
            Dtype::UserFixed => panic!("Cannot gather into a user-fixed column"),
        }
        self.verify_size();
    }

    fn copy_fixed<T: bytemuck::Pod>(
        &mut self,
        other: &Column,
        indices: &[usize],
        offset: usize,
    ) {
        for (k, &src) in indices.iter().enumerate() {
            let value: T = other.get_raw(src);
            self.data.set(offset + k, value);
            if self.status_enabled {
                let status = if other.status_enabled {
                    other.validity.get(src)
                } else {
                    Status::Valid
                };
                self.validity.set(offset + k, status);
            }
        }
    }

    fn copy_str(&mut self, other: &Column, indices: &[usize], offset: usize) {
        let count = other.len.min(indices.len());
        self.reserve(count + offset);
        for k in 0..count {
            self.set_scalar(offset + k, other.get_scalar(indices[k]));
        }
    }

    /// Resets the column to zero rows.
    ///
    /// String columns additionally drop the primary buffer's backing
    /// storage; fixed-width bytes are simply overwritten on next write.
    pub fn clear(&mut self) {
        self.check_init();
        self.data.set_len(0);
        if self.dtype == Dtype::Str {
            self.data.clear();
        }
        if self.status_enabled {
            self.validity.clear();
        }
        self.len = 0;
    }

    /// Captures a recipe describing this column's complete layout
    /// and contents.
    pub fn recipe(&self) -> ColumnRecipe {
        self.check_init();

        let (vlendata, extents, high_water) = if self.is_vlen {
            let vocab = self.vocab.read();
            (
                Some(vocab.vlendata().recipe()),
                Some(vocab.extents().recipe()),
                vocab.high_water(),
            )
        } else {
            (None, None, 0)
        };

        ColumnRecipe {
            dtype: self.dtype,
            data: self.data.recipe(),
            is_vlen: self.is_vlen,
            vlendata,
            extents,
            status_enabled: self.status_enabled,
            status: if self.status_enabled {
                Some(self.validity.recipe())
            } else {
                None
            },
            high_water,
            len: self.len as u64,
        }
    }

    // ---- invariants ---------------------------------------------------

    fn verify_size(&self) {
        if self.dtype == Dtype::UserFixed {
            return;
        }
        assert!(
            self.len * self.elem_width <= self.data.capacity(),
            "Not enough space reserved for column {:?}",
            self.data.name()
        );
        if self.status_enabled {
            assert!(
                self.len <= self.validity.capacity(),
                "Not enough space reserved for column {:?} status",
                self.data.name()
            );
        }
    }

    #[inline]
    fn check_init(&self) {
        assert!(self.init, "Column was accessed before init");
    }

    #[inline]
    fn check_access(&self, idx: usize) {
        self.check_init();
        assert!(
            idx < self.len,
            "Column index {idx} out of bounds (len {})",
            self.len
        );
    }

    #[inline]
    fn check_strcol(&self) {
        assert!(self.is_vlen, "String operation on a non-string column");
    }

    #[inline]
    fn check_status_enabled(&self) {
        assert!(self.status_enabled, "Status is not tracked for this column");
    }

    #[inline]
    fn check_width<T>(&self) {
        if self.dtype.has_deterministic_width() {
            assert!(
                mem::size_of::<T>() == self.elem_width,
                "Element width mismatch for {} column",
                self.dtype
            );
        }
    }
}

impl Clone for Column {
    /// Deep copy: independent buffers with byte-identical contents and a
    /// content-level copy of the dictionary.
    fn clone(&self) -> Self {
        self.check_init();

        let mut cloned = self.structural_clone();
        cloned.init();
        cloned.data.fill(&self.data);
        if cloned.status_enabled {
            cloned.validity.fill(&self.validity);
        }
        if self.is_vlen {
            let src = self.vocab.read();
            cloned.vocab.write().clone_contents(&src);
        }
        cloned.len = self.len;
        cloned.verify_size();
        cloned
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn col(dtype: Dtype, status_enabled: bool, capacity: usize) -> Column {
        let options = ColumnOptions::builder()
            .dtype(dtype)
            .status_enabled(status_enabled)
            .capacity(capacity)
            .name("test")
            .build();
        let mut column = Column::new(options);
        column.init();
        column
    }

    fn scalars(column: &Column) -> Vec<Scalar> {
        (0..column.len()).map(|idx| column.get_scalar(idx)).collect()
    }

    #[rstest]
    #[case(Dtype::I8, Scalar::from(-5i8))]
    #[case(Dtype::I16, Scalar::from(-300i16))]
    #[case(Dtype::I32, Scalar::from(70_000i32))]
    #[case(Dtype::I64, Scalar::from(-5_000_000_000i64))]
    #[case(Dtype::U8, Scalar::from(200u8))]
    #[case(Dtype::U16, Scalar::from(60_000u16))]
    #[case(Dtype::U32, Scalar::from(4_000_000_000u32))]
    #[case(Dtype::U64, Scalar::from(10_000_000_000u64))]
    #[case(Dtype::F32, Scalar::from(1.5f32))]
    #[case(Dtype::F64, Scalar::from(-2.25f64))]
    #[case(Dtype::Bool, Scalar::from(true))]
    #[case(Dtype::Time, Scalar::from(Time::new(1_489_000_000_000)))]
    #[case(Dtype::Date, Scalar::from(Date::from_ymd(2017, 3, 9)))]
    #[case(Dtype::Str, Scalar::str("hello"))]
    fn test_push_then_get_round_trips(#[case] dtype: Dtype, #[case] value: Scalar) {
        let mut column = col(dtype, true, 4);
        column.push_scalar(value.clone());
        assert_eq!(column.len(), 1);
        assert_eq!(column.get_scalar(0), value);
    }

    #[test]
    fn test_int32_push_with_statuses() {
        let mut column = col(Dtype::I32, true, 4);
        column.push_scalar(Scalar::from(10i32));
        column.push_scalar(Scalar::from(-5i32).with_status(Status::Invalid));

        assert_eq!(column.len(), 2);
        assert_eq!(column.get_scalar(0), Scalar::from(10i32));
        assert!(column.is_valid(0));
        assert_eq!(column.get_scalar(0).status, Status::Valid);
        assert_eq!(column.get_scalar(1).value, Value::I32(-5));
        assert_eq!(column.get_scalar(1).status, Status::Invalid);
        assert!(!column.is_valid(1));
    }

    #[test]
    fn test_string_rows_share_dictionary_ids() {
        let mut column = col(Dtype::Str, true, 4);
        column.push_scalar(Scalar::str("a"));
        column.push_scalar(Scalar::str("b"));
        column.push_scalar(Scalar::str("a"));

        // Two unique pushed strings plus the reserved empty string.
        assert_eq!(column.high_water(), 3);
        assert_eq!(column.get_scalar(0).as_str(), Some("a"));
        assert_eq!(column.get_scalar(2).as_str(), Some("a"));
        assert_eq!(column.get_raw::<u64>(0), column.get_raw::<u64>(2));
        assert_ne!(column.get_raw::<u64>(0), column.get_raw::<u64>(1));
    }

    #[test]
    fn test_set_scalar_coerces_to_column_dtype() {
        let mut column = col(Dtype::I32, true, 4);
        column.push_scalar(Scalar::from(1i32));
        column.set_scalar(0, Scalar::from(3.9f64));
        assert_eq!(column.get_scalar(0).value, Value::I32(3));
    }

    #[test]
    fn test_clear_and_unset_rows() {
        let mut column = col(Dtype::I64, true, 4);
        column.push_scalar(Scalar::from(7i64));
        column.push_scalar(Scalar::from(9i64));

        column.clear_at(0);
        assert!(!column.is_valid(0));
        assert_eq!(column.get_raw::<i64>(0), 0);

        column.unset(1);
        assert!(column.is_cleared(1));
        assert_eq!(column.get_raw::<i64>(1), 0);
    }

    #[test]
    fn test_string_clear_writes_reserved_empty_id() {
        let mut column = col(Dtype::Str, true, 2);
        column.push_scalar(Scalar::str("payload"));
        column.clear_at(0);
        assert_eq!(column.get_raw::<u64>(0), 0);
        assert_eq!(column.get_scalar(0).as_str(), Some(""));
    }

    #[test]
    fn test_clone_is_deeply_independent() {
        let mut column = col(Dtype::I32, true, 4);
        column.push_scalar(Scalar::from(1i32));
        column.push_scalar(Scalar::from(2i32));

        let mut cloned = column.clone();
        assert_eq!(scalars(&cloned), scalars(&column));

        cloned.set_scalar(0, Scalar::from(99i32));
        assert_eq!(column.get_scalar(0).value, Value::I32(1));
    }

    #[test]
    fn test_string_clone_copies_dictionary_content() {
        let mut column = col(Dtype::Str, true, 4);
        column.push_scalar(Scalar::str("left"));
        column.push_scalar(Scalar::str("right"));

        let mut cloned = column.clone();
        assert_eq!(scalars(&cloned), scalars(&column));

        cloned.push_scalar(Scalar::str("only-in-clone"));
        assert_eq!(column.high_water(), 3);
        assert_eq!(cloned.high_water(), 4);
    }

    #[test]
    fn test_masked_clone_selecting_all_matches_full_clone() {
        let mut column = col(Dtype::F64, true, 4);
        column.push_scalar(Scalar::from(1.0f64));
        column.push_scalar(Scalar::from(2.0f64));
        column.push_scalar(Scalar::from(3.0f64));

        let mask: Mask = [true, true, true].into_iter().collect();
        let masked = column.clone_masked(&mask);
        assert_eq!(scalars(&masked), scalars(&column.clone()));
    }

    #[test]
    fn test_masked_clone_compacts_selected_rows() {
        let mut column = col(Dtype::I32, true, 4);
        column.push_scalar(Scalar::from(10i32));
        column.push_scalar(Scalar::from(20i32).with_status(Status::Invalid));
        column.push_scalar(Scalar::from(30i32));
        column.push_scalar(Scalar::from(40i32));

        let mask: Mask = [false, true, false, true].into_iter().collect();
        let masked = column.clone_masked(&mask);

        assert_eq!(masked.len(), 2);
        assert_eq!(masked.get_scalar(0).value, Value::I32(20));
        assert_eq!(masked.get_scalar(0).status, Status::Invalid);
        assert_eq!(masked.get_scalar(1).value, Value::I32(40));
    }

    #[test]
    fn test_append_fixed_width_concatenates() {
        let mut left = col(Dtype::I64, true, 4);
        left.push_scalar(Scalar::from(1i64));
        left.push_scalar(Scalar::from(2i64));

        let mut right = col(Dtype::I64, true, 4);
        right.push_scalar(Scalar::from(3i64).with_status(Status::Invalid));

        left.append(&right);
        assert_eq!(left.len(), 3);
        assert_eq!(left.get_scalar(2).value, Value::I64(3));
        assert_eq!(left.get_scalar(2).status, Status::Invalid);
    }

    #[test]
    fn test_append_to_empty_string_column_adopts_dictionary() {
        let mut source = col(Dtype::Str, true, 4);
        source.push_scalar(Scalar::str("x"));
        source.push_scalar(Scalar::str("y"));
        source.push_scalar(Scalar::str("x"));

        let mut target = col(Dtype::Str, true, 4);
        target.append(&source);

        assert_eq!(scalars(&target), scalars(&source));
        assert_eq!(target.high_water(), source.high_water());

        // New interns must not collide with adopted ids.
        let next = target.get_interned("z");
        assert_eq!(next, source.high_water());
        assert_eq!(target.unintern(next).as_ref(), "z");
    }

    #[test]
    fn test_append_to_nonempty_string_column_reinterns() {
        let mut target = col(Dtype::Str, true, 4);
        target.push_scalar(Scalar::str("a"));

        let mut source = col(Dtype::Str, true, 4);
        source.push_scalar(Scalar::str("b"));
        source.push_scalar(Scalar::str("a"));

        target.append(&source);
        assert_eq!(target.len(), 3);
        assert_eq!(target.get_scalar(1).as_str(), Some("b"));
        assert_eq!(target.get_scalar(2).as_str(), Some("a"));
        // "a" resolves to the id the target already assigned it.
        assert_eq!(target.get_raw::<u64>(0), target.get_raw::<u64>(2));
    }

    #[test]
    fn test_copy_from_gathers_by_index() {
        let mut source = col(Dtype::I32, true, 4);
        for value in [10i32, 20, 30, 40] {
            source.push_scalar(Scalar::from(value));
        }

        let mut target = col(Dtype::I32, true, 8);
        target.extend_to(6);
        target.copy_from(&source, &[3, 0, 2], 2);

        assert_eq!(target.get_scalar(2).value, Value::I32(40));
        assert_eq!(target.get_scalar(3).value, Value::I32(10));
        assert_eq!(target.get_scalar(4).value, Value::I32(30));
        assert_eq!(target.get_scalar(0).value, Value::I32(0));
        assert_eq!(target.get_scalar(5).value, Value::I32(0));
    }

    #[test]
    fn test_copy_from_string_truncates_to_source_length() {
        let mut source = col(Dtype::Str, true, 4);
        source.push_scalar(Scalar::str("a"));
        source.push_scalar(Scalar::str("b"));

        let mut target = col(Dtype::Str, true, 4);
        target.extend_to(3);
        target.copy_from(&source, &[0, 1, 0], 0);

        assert_eq!(target.get_scalar(0).as_str(), Some("a"));
        assert_eq!(target.get_scalar(1).as_str(), Some("b"));
        // The third index is silently dropped; the row keeps id 0.
        assert_eq!(target.get_scalar(2).as_str(), Some(""));
    }

    #[test]
    fn test_whole_column_clear_resets_rows() {
        let mut column = col(Dtype::Str, true, 4);
        column.push_scalar(Scalar::str("gone"));
        column.clear();
        assert_eq!(column.len(), 0);

        column.push_scalar(Scalar::str("fresh"));
        assert_eq!(column.get_scalar(0).as_str(), Some("fresh"));
    }

    #[test]
    fn test_recipe_round_trip_fixed_width() {
        let mut column = col(Dtype::I64, true, 4);
        column.push_scalar(Scalar::from(5i64));
        column.push_scalar(Scalar::from(-6i64).with_status(Status::Invalid));

        let recipe = column.recipe();
        let mut restored = Column::from_recipe(recipe).expect("Attach column");
        assert!(restored.is_from_recipe());
        restored.init();

        assert_eq!(scalars(&restored), scalars(&column));
    }

    #[test]
    fn test_recipe_round_trip_string_column() {
        let mut column = col(Dtype::Str, true, 4);
        column.push_scalar(Scalar::str("one"));
        column.push_scalar(Scalar::str("two"));
        column.push_scalar(Scalar::str("one"));

        let encoded = serde_json::to_string(&column.recipe()).expect("Encode recipe");
        let decoded: ColumnRecipe =
            serde_json::from_str(&encoded).expect("Decode recipe");

        let mut restored = Column::from_recipe(decoded).expect("Attach column");
        restored.init();

        assert_eq!(scalars(&restored), scalars(&column));
        assert_eq!(restored.high_water(), column.high_water());

        // The rebuilt index keeps resolving old ids after new interns.
        restored.push_scalar(Scalar::str("three"));
        assert_eq!(restored.get_scalar(0).as_str(), Some("one"));
    }

    #[test]
    fn test_build_factory_preserves_order() {
        let column = Column::build(
            Dtype::F64,
            vec![
                Scalar::from(0.5f64),
                Scalar::null(),
                Scalar::from(2.5f64),
            ],
        );
        assert_eq!(column.len(), 3);
        assert_eq!(column.get_scalar(0).value, Value::F64(0.5));
        assert_eq!(column.get_scalar(1).status, Status::Invalid);
        assert_eq!(column.get_scalar(2).value, Value::F64(2.5));
    }

    #[test]
    fn test_extend_to_grows_and_zeroes() {
        let mut column = col(Dtype::I32, true, 2);
        column.extend_to(10);
        assert_eq!(column.len(), 10);
        assert_eq!(column.get_raw::<i32>(9), 0);
        assert_eq!(column.get_scalar(9).status, Status::Empty);
    }

    #[test]
    fn test_ratio_raw_write_reads_back_as_quotient() {
        let mut column = col(Dtype::Ratio, false, 2);
        column.push(RatioPair { num: 1.0, den: 4.0 });
        assert_eq!(column.len(), 1);
        assert_eq!(column.get_scalar(0).value, Value::F64(0.25));
    }

    #[test]
    fn test_fill_valid_marks_raw_pushes() {
        let mut column = col(Dtype::I64, true, 4);
        column.push(1i64);
        column.push(2i64);
        column.set_len(2);
        column.fill_valid();
        assert!(column.is_valid(0));
        assert!(column.is_valid(1));
    }

    #[test]
    fn test_borrow_vocabulary_shares_id_space() {
        let mut owner = col(Dtype::Str, true, 4);
        owner.push_scalar(Scalar::str("shared"));

        let mut borrower = col(Dtype::Str, true, 4);
        borrower.borrow_vocabulary(&owner);
        assert_eq!(borrower.get_interned("shared"), 1);

        borrower.push_str("later");
        assert_eq!(owner.high_water(), borrower.high_water());
        assert_eq!(owner.unintern(2).as_ref(), "later");
    }

    #[test]
    fn test_copy_vocabulary_merges_entries() {
        let mut source = col(Dtype::Str, true, 4);
        source.push_scalar(Scalar::str("x"));
        source.push_scalar(Scalar::str("y"));

        let mut target = col(Dtype::Str, true, 4);
        target.copy_vocabulary(&source);
        assert_eq!(target.high_water(), 3);
        assert_eq!(target.get_interned("x"), 1);
    }

    #[test]
    fn test_set_vocabulary_preloads_entries() {
        let mut column = col(Dtype::Str, true, 4);
        column.set_vocabulary(
            &[(Scalar::str("aa"), 1), (Scalar::str("bb"), 2)],
            64,
        );
        assert_eq!(column.high_water(), 3);
        assert_eq!(column.get_interned("bb"), 2);
    }

    #[test]
    fn test_structural_clone_mirrors_layout_only() {
        let mut column = col(Dtype::I32, true, 16);
        column.push_scalar(Scalar::from(1i32));

        let clone = column.structural_clone();
        assert!(!clone.is_initialized());
        assert!(!clone.is_from_recipe());
        assert_eq!(clone.data_buffer().capacity(), column.data_buffer().capacity());
        assert_eq!(clone.data_buffer().len(), 0);
    }

    #[test]
    fn test_from_data_recipe_derives_row_capacity() {
        let mut backing = RawBuffer::new("ints", 64);
        backing.init();
        backing.push(7i64);
        backing.push(8i64);

        let mut column = Column::from_data_recipe(Dtype::I64, false, backing.recipe())
            .expect("Attach data buffer");
        column.init();
        column.set_len(2);

        assert_eq!(column.get_scalar(0).value, Value::I64(7));
        assert_eq!(column.get_scalar(1).value, Value::I64(8));
        assert!(!column.is_from_recipe());
    }

    #[test]
    fn test_status_writes_and_string_overwrite() {
        let mut column = col(Dtype::Str, true, 4);
        column.push_scalar(Scalar::str("first"));

        column.set_str(0, "second");
        assert_eq!(column.get_scalar(0).as_str(), Some("second"));
        assert!(column.is_valid(0));

        column.set_valid(0, false);
        assert!(!column.is_valid(0));
        column.set_status(0, Status::Cleared);
        assert!(column.is_cleared(0));
    }

    #[test]
    fn test_user_fixed_escape_hatch() {
        let mut backing = RawBuffer::new("opaque", 32);
        backing.init();
        let recipe = backing.recipe();

        let mut column = Column::from_data_recipe(Dtype::UserFixed, false, recipe)
            .expect("Attach user-fixed buffer");
        column.init();
        column.push([1u8, 2, 3]);
        assert_eq!(column.len(), 1);
        assert_eq!(column.get_raw::<[u8; 3]>(0), [1, 2, 3]);
    }

    #[test]
    #[should_panic(expected = "accessed before init")]
    fn test_access_before_init_panics() {
        let options = ColumnOptions::builder()
            .dtype(Dtype::I32)
            .capacity(4)
            .build();
        let column = Column::new(options);
        column.get_scalar(0);
    }

    #[test]
    #[should_panic(expected = "Status is not tracked")]
    fn test_validity_query_on_untracked_column_panics() {
        let mut column = col(Dtype::I32, false, 4);
        column.push_scalar(Scalar::from(1i32));
        column.is_valid(0);
    }

    #[test]
    #[should_panic(expected = "Mismatched dtypes")]
    fn test_append_mismatched_dtypes_panics() {
        let mut left = col(Dtype::I32, false, 4);
        let right = col(Dtype::I64, false, 4);
        left.append(&right);
    }

    #[test]
    #[should_panic(expected = "String operation on a non-string column")]
    fn test_string_push_on_fixed_width_column_panics() {
        let mut column = col(Dtype::I32, false, 4);
        column.push_str("nope");
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn test_out_of_bounds_read_panics() {
        let column = col(Dtype::I32, false, 4);
        column.get_scalar(0);
    }
}
