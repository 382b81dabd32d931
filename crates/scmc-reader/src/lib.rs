//! scmc-reader — turns source text into object-heap cells.

mod cursor;
mod error;
mod reader;

pub use cursor::Cursor;
pub use error::{ReadError, Result};
pub use reader::{read, MAX_TOKEN_LEN};
