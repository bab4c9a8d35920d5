mod buffer;
mod error;

pub use self::buffer::{BufferRecipe, RawBuffer, DEFAULT_EMPTY_CAPACITY};
pub use self::error::StoreError;
