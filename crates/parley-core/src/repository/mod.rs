pub mod checkpoint;
pub mod message;
pub mod thread;
