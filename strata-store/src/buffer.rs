//! Raw growable byte buffers.
//!
//! A [RawBuffer] is the storage primitive every column structure sits on:
//! a named, capacity-tracked byte region whose logical length is accounted
//! for separately from its reservation. The reserved tail is always
//! zero-filled so that recipes and typed reads stay deterministic.

use std::fmt::{Debug, Formatter};
use std::mem;

use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::StoreError;

/// The reservation given to freshly created auxiliary buffers,
/// e.g. a dictionary's string and extent stores.
pub const DEFAULT_EMPTY_CAPACITY: usize = 256;

#[derive(Debug, Clone, Serialize, Deserialize)]
/// A serializable descriptor of a [RawBuffer]'s layout and live contents.
///
/// A recipe captured from a live buffer can be persisted and later handed
/// to [RawBuffer::from_recipe] to reconstruct an equivalent buffer without
/// re-deriving its contents.
pub struct BufferRecipe {
    /// The diagnostic name of the buffer.
    pub name: String,
    /// The number of live bytes captured in `data`.
    pub len: u64,
    /// The reservation the reconstructed buffer should carry.
    pub capacity: u64,
    /// A snapshot of the live byte region.
    pub data: Bytes,
}

/// A growable byte region with explicit length and capacity accounting.
///
/// The buffer must be initialized with [RawBuffer::init] exactly once
/// before any read or write; touching an uninitialized buffer is a
/// programming error and panics.
///
/// Typed element access goes through [bytemuck::Pod] values and is
/// alignment-agnostic, so any fixed-width element type can be laid over
/// the region regardless of how the backing allocation is aligned.
pub struct RawBuffer {
    /// Diagnostic name, surfaced in panic messages and trace output.
    name: String,
    /// Backing storage. Always `capacity` bytes long once initialized,
    /// with the region past `len` zero-filled.
    buf: BytesMut,
    /// Logical length in bytes.
    len: usize,
    /// Reserved bytes. Grows amortized, never shrinks except on [clear].
    ///
    /// [clear]: RawBuffer::clear
    capacity: usize,
    init: bool,
}

impl RawBuffer {
    /// Creates a new, uninitialized buffer with the given reservation.
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        Self {
            name: name.into(),
            buf: BytesMut::new(),
            len: 0,
            capacity,
            init: false,
        }
    }

    /// Reconstructs a buffer from a previously captured recipe.
    ///
    /// When the recipe holds the sole reference to its content bytes the
    /// attach is zero-copy; otherwise the content is copied once. The
    /// returned buffer still requires [RawBuffer::init] before use.
    pub fn from_recipe(recipe: BufferRecipe) -> Result<Self, StoreError> {
        let BufferRecipe {
            name,
            len,
            capacity,
            data,
        } = recipe;
        let len = len as usize;
        let capacity = capacity as usize;

        if len > capacity {
            return Err(StoreError::SizeExceedsCapacity { len, capacity });
        }
        if data.len() != len {
            return Err(StoreError::ContentLengthMismatch {
                expected: len,
                actual: data.len(),
            });
        }

        let buf = match data.try_into_mut() {
            Ok(owned) => {
                debug!(name = %name, len, "Attached buffer without copying");
                owned
            },
            Err(shared) => BytesMut::from(shared.as_ref()),
        };

        Ok(Self {
            name,
            buf,
            len,
            capacity,
            init: false,
        })
    }

    /// Finalizes the buffer, materializing its full reservation.
    ///
    /// Must be called exactly once.
    pub fn init(&mut self) {
        assert!(
            !self.init,
            "Buffer {:?} was initialized more than once",
            self.name
        );
        if self.buf.len() < self.capacity {
            self.buf.resize(self.capacity, 0);
        }
        self.init = true;
        trace!(name = %self.name, capacity = self.capacity, "Buffer ready");
    }

    #[inline]
    fn check_init(&self) {
        assert!(
            self.init,
            "Buffer {:?} was accessed before init",
            self.name
        );
    }

    #[inline]
    /// Returns the diagnostic name of the buffer.
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    /// Returns the logical length in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    /// Returns `true` if the buffer holds no live bytes.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    /// Returns the reserved capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Grows the reservation to hold at least `bytes`.
    ///
    /// Growth is amortized: the new reservation is at least double the
    /// current one so repeated appends do not reallocate per element.
    pub fn reserve(&mut self, bytes: usize) {
        self.check_init();
        if bytes <= self.capacity {
            return;
        }

        let new_capacity = bytes.max(self.capacity * 2);
        trace!(
            name = %self.name,
            old = self.capacity,
            new = new_capacity,
            "Grow buffer reservation"
        );
        self.buf.resize(new_capacity, 0);
        self.capacity = new_capacity;
    }

    /// Sets the logical length. The length must already be reserved.
    pub fn set_len(&mut self, bytes: usize) {
        self.check_init();
        assert!(
            bytes <= self.capacity,
            "Buffer {:?}: length {} exceeds reserved capacity {}",
            self.name,
            bytes,
            self.capacity
        );
        self.len = bytes;
    }

    /// Appends one typed element, growing the reservation if required.
    pub fn push<T: bytemuck::Pod>(&mut self, value: T) {
        self.check_init();
        let width = mem::size_of::<T>();
        if self.len + width > self.capacity {
            self.reserve(self.len + width);
        }
        self.buf[self.len..self.len + width].copy_from_slice(bytemuck::bytes_of(&value));
        self.len += width;
    }

    /// Appends a raw byte run, growing the reservation if required.
    pub fn push_bytes(&mut self, bytes: &[u8]) {
        self.check_init();
        if self.len + bytes.len() > self.capacity {
            self.reserve(self.len + bytes.len());
        }
        self.buf[self.len..self.len + bytes.len()].copy_from_slice(bytes);
        self.len += bytes.len();
    }

    /// Reads the `idx`th element of type `T`.
    pub fn get<T: bytemuck::Pod>(&self, idx: usize) -> T {
        self.check_init();
        let width = mem::size_of::<T>();
        let offset = idx * width;
        assert!(
            offset + width <= self.capacity,
            "Buffer {:?}: element {} read past reserved capacity",
            self.name,
            idx
        );
        bytemuck::pod_read_unaligned(&self.buf[offset..offset + width])
    }

    /// Overwrites the `idx`th element of type `T`.
    ///
    /// Does not advance the logical length.
    pub fn set<T: bytemuck::Pod>(&mut self, idx: usize, value: T) {
        self.check_init();
        let width = mem::size_of::<T>();
        let offset = idx * width;
        assert!(
            offset + width <= self.capacity,
            "Buffer {:?}: element {} written past reserved capacity",
            self.name,
            idx
        );
        self.buf[offset..offset + width].copy_from_slice(bytemuck::bytes_of(&value));
    }

    /// Concatenates another buffer's live bytes onto the end of this one.
    pub fn append(&mut self, other: &RawBuffer) {
        self.check_init();
        self.reserve(self.len + other.len);
        self.buf[self.len..self.len + other.len].copy_from_slice(other.as_slice());
        self.len += other.len;
    }

    /// Overwrites this buffer's contents with another's live bytes.
    pub fn fill(&mut self, other: &RawBuffer) {
        self.check_init();
        self.reserve(other.len);
        self.buf[..other.len].copy_from_slice(other.as_slice());
        self.len = other.len;
    }

    /// Compacts the selected rows of another buffer into this one.
    ///
    /// `selected` yields the row indices to keep, in order; each row is
    /// `elem_width` bytes in the source. The logical length afterwards is
    /// the selected row count times `elem_width`.
    pub fn fill_selected(
        &mut self,
        other: &RawBuffer,
        selected: impl Iterator<Item = usize>,
        elem_width: usize,
    ) {
        self.check_init();

        let mut out = 0;
        for idx in selected {
            let src = idx * elem_width;
            assert!(
                src + elem_width <= other.len,
                "Buffer {:?}: selected row {} past source length",
                other.name,
                idx
            );
            let dst = out * elem_width;
            if dst + elem_width > self.capacity {
                self.reserve(dst + elem_width);
            }
            self.buf[dst..dst + elem_width]
                .copy_from_slice(&other.buf[src..src + elem_width]);
            out += 1;
        }

        self.len = out * elem_width;
    }

    /// Overwrites every live byte with `value`.
    pub fn raw_fill(&mut self, value: u8) {
        self.check_init();
        self.buf[..self.len].fill(value);
    }

    /// Drops the backing storage entirely and resets the length to zero.
    pub fn clear(&mut self) {
        self.check_init();
        trace!(name = %self.name, "Reset buffer storage");
        self.buf = BytesMut::new();
        self.len = 0;
        self.capacity = 0;
    }

    /// Returns the live byte region.
    pub fn as_slice(&self) -> &[u8] {
        self.check_init();
        &self.buf[..self.len]
    }

    /// Captures a recipe describing this buffer's layout and live contents.
    pub fn recipe(&self) -> BufferRecipe {
        self.check_init();
        BufferRecipe {
            name: self.name.clone(),
            len: self.len as u64,
            capacity: self.capacity as u64,
            data: Bytes::copy_from_slice(&self.buf[..self.len]),
        }
    }
}

impl Debug for RawBuffer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "RawBuffer(name={:?}, len={}, capacity={}, init={})",
            self.name, self.len, self.capacity, self.init
        )
    }
}
