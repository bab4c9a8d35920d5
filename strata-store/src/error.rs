#[derive(Debug, thiserror::Error)]
/// An error that can occur when attaching a buffer to a
/// previously captured recipe.
pub enum StoreError {
    #[error("buffer length {len} exceeds reserved capacity {capacity}")]
    /// The recipe describes more live bytes than its reservation allows.
    SizeExceedsCapacity { len: usize, capacity: usize },
    #[error("recipe content is {actual} bytes but its descriptor says {expected}")]
    /// The captured content does not match the descriptor's length field.
    ///
    /// This should never occur unless the serialized recipe was tampered
    /// with or truncated in transit.
    ContentLengthMismatch { expected: usize, actual: usize },
}
