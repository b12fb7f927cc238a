mod error;
mod job;
mod message;
mod ports;

pub use error::*;
pub use job::*;
pub use message::*;
pub use ports::*;
