//! Network access to the shared document service.

pub mod http;

pub use http::{HttpDocumentStore, TransportError};
