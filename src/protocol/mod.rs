//! Wire protocol between the page and its host.

pub mod envelope;

pub use envelope::{decode, encode_request, encode_response, Inbound, InboundRequest, InboundResponse};
