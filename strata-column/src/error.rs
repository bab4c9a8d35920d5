use strata_store::StoreError;

use crate::dtype::Dtype;

#[derive(Debug, thiserror::Error)]
/// An error that can occur when reconstructing a column from
/// a previously captured recipe.
pub enum ColumnError {
    #[error("Store Error: {0}")]
    /// One of the described buffers could not be attached.
    Store(#[from] StoreError),
    #[error("recipe dtype {0} does not match its variable-length flag")]
    /// The recipe's dtype disagrees with its variable-length marker.
    VlenFlagMismatch(Dtype),
    #[error("recipe is missing its {0} buffer")]
    /// A buffer the recipe's flags promise was not captured.
    MissingBuffer(&'static str),
}
