//! Protocol module containing the wire vocabulary and the line codec.

pub mod codec;
pub mod messages;

pub use codec::{
    encode_announcement, encode_header, encode_reply, parse_announcement, parse_header, parse_reply,
    ProtocolError,
};
pub use messages::*;
