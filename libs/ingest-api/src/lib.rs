pub mod error;
pub mod record;
pub mod sink;

pub use error::{ErrorKind, SinkError};
pub use record::{InvalidRecord, Lane, Priority, Record};
pub use sink::{BoxFuture, Sink, StatusObserver};

