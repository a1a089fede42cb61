//! Outbound side of the relay protocol

mod sender;

pub use sender::{FileSender, HopReceipt};
