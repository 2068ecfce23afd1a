pub mod args;
pub mod channel;
pub mod codec;
pub mod conditioner;
pub mod consumer;
pub mod endpoint;
pub mod error;
pub mod peaks;
pub mod producer;
pub mod savgol;
pub mod source;

pub use channel::{ChannelKind, Samples};
pub use error::{Error, Result};

// Default ports, one per channel
pub const PORT_A: u16 = 30000;
pub const PORT_B: u16 = 30001;
