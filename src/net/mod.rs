// Connection to the pose server: socket lifecycle and framed I/O.

pub mod connection;

pub use connection::{ConnectionConfig, ConnectionManager, ConnectionState, ImageCallback};
