mod client;
mod errors;
pub mod message;
mod request;
pub mod timestamp;
pub mod types;
pub use self::client::{Client, Stage, TransportFailure};
pub use self::errors::Error;
pub use self::message::{Node, TagBuilder, UidGenerator};
pub use self::request::{DateWindow, RequestKind, Session, StatementRequest, DISCOVERY_EPOCH};
