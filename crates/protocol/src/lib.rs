//! Wire-level vocabulary for the LogMQ protocol.
//!
//! Everything a client and server must agree on before any stream state
//! exists: offset tokens, cursor arithmetic, content-type canonicalization,
//! header value grammars, and the protocol header names themselves.

pub mod content_type;
pub mod cursor;
pub mod grammar;
pub mod headers;
pub mod offset;
