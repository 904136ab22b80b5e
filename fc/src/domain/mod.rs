//! Domain types for the filter context
//!
//! Keys identify attachments, type descriptors validate controllers against
//! values, and `QueryRequest` is the outbound object values configure.

mod key;
mod request;
mod type_descriptor;

pub use key::FilterKey;
pub use request::QueryRequest;
pub use type_descriptor::{TypeCompatibility, TypeDescriptor};
