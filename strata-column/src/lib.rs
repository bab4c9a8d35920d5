mod column;
mod dtype;
mod error;
mod mask;
mod scalar;
mod validity;
mod vocab;

pub use self::column::{Column, ColumnOptions, ColumnRecipe};
pub use self::dtype::Dtype;
pub use self::error::ColumnError;
pub use self::mask::Mask;
pub use self::scalar::{Date, RatioPair, Scalar, Time, Value};
pub use self::validity::{Status, ValidityTrack};
pub use self::vocab::{SharedVocab, Vocab};
