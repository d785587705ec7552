//! Atomic persistence
//!
//! Durable read/modify/write of JSON documents and opaque byte blobs.
//! No partially written file is ever visible at a final path, and unknown
//! document keys survive every rewrite.

mod atomic;
mod errors;
mod merge;

pub use atomic::{read_document, write_bytes_atomic, write_document_atomic, TEMP_SUFFIX};
pub use errors::{PersistenceError, PersistenceErrorCode, PersistenceResult};
pub use merge::deep_merge;
