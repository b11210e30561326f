//! Connection setup and framed I/O.

mod framed;
mod stream;

pub use framed::{FramedStream, ReadPolicy, ResponseAccumulator};
pub use stream::{CONNECT_TIMEOUT, connect_tls, create_tls_connector};
