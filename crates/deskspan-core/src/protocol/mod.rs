//! Protocol module containing message types and the binary codec.

pub mod codec;
pub mod messages;

pub use codec::{
    decode_client, decode_server, encode_client, encode_server, ProtocolError,
};
pub use messages::*;
