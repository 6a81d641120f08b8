//! LogMQ server
//!
//! The HTTP front end of the durable streams protocol: append-only logs
//! addressed by URL path, with replay from any offset.
//!
//! # Features
//!
//! - **Append-only streams**: create with PUT, append with POST, guaranteed
//!   ordering through a per-stream serial gate
//! - **Replay support**: read from any offset to catch up on missed records
//! - **Long-polling**: wait for new records with a configurable timeout
//! - **Server-Sent Events**: continuous streaming with injection-safe framing
//! - **TTL/Expiration**: automatic stream cleanup based on time
//! - **JSON mode**: array batching and array-form reads for JSON streams
//! - **Writer coordination**: lexicographic sequence tokens on plain appends
//! - **Idempotent producers**: epoch fencing and sequence-based deduplication
//!   for exactly-once appends across retries
//!
//! # Example
//!
//! ```rust,no_run
//! use logmq_server::{ServerOptions, start_server};
//!
//! #[tokio::main]
//! async fn main() {
//!     let options = ServerOptions {
//!         port: 4610,
//!         host: "127.0.0.1".to_string(),
//!         ..Default::default()
//!     };
//!
//!     start_server(options).await.unwrap();
//! }
//! ```
//!
//! # Protocol
//!
//! ## Creating a stream
//!
//! ```text
//! PUT /orders/events HTTP/1.1
//! Content-Type: application/json
//! Stream-TTL: 3600
//!
//! Response: 201 Created
//! Stream-Next-Offset: 0000000000000000_0000000000000000
//! ```
//!
//! ## Appending
//!
//! ```text
//! POST /orders/events HTTP/1.1
//! Content-Type: application/json
//!
//! [{"order": 1}, {"order": 2}]
//!
//! Response: 204 No Content
//! Stream-Next-Offset: 0000000000000000_0000000000000024
//! ```
//!
//! ## Reading
//!
//! ```text
//! GET /orders/events?offset=-1 HTTP/1.1
//!
//! Response: 200 OK
//! Stream-Next-Offset: 0000000000000000_0000000000000024
//! Stream-Up-To-Date: true
//!
//! [{"order":1},{"order":2}]
//! ```
//!
//! ## Live tailing
//!
//! ```text
//! GET /orders/events?offset=0000000000000000_0000000000000024&live=long-poll HTTP/1.1
//!
//! (waits up to the server timeout for new records)
//!
//! Response: 204 No Content
//! Stream-Up-To-Date: true
//! ```
//!
//! ```text
//! GET /orders/events?offset=-1&live=sse HTTP/1.1
//! Accept: text/event-stream
//!
//! event: data
//! data: [{"order":1},{"order":2}]
//!
//! event: control
//! data: {"streamNextOffset":"0000000000000000_0000000000000024","streamCursor":"81734","upToDate":true}
//! ```

pub mod append;
pub mod config;
pub mod dispatch;
pub mod etag;
pub mod read;
pub mod server;
pub mod sse;

pub use config::ServerOptions;
pub use server::{AppState, create_router, start_server};
