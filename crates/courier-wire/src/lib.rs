//! Wire protocol shared by the Courier gateway and its backend services.
//!
//! Peers exchange JSON Lines over a byte stream. Each request carries a
//! [`CorrelationId`] that the service echoes in its response, which lets the
//! gateway keep many requests in flight on one connection and match replies
//! that arrive out of order.

mod codec;
mod error;
mod frame;

pub use codec::{FrameReader, MAX_FRAME_BYTES, decode, encode_frame, write_frame};
pub use error::WireError;
pub use frame::{
    Command, CorrelationId, Outcome, RemoteError, RemoteErrorKind, RequestFrame, ResponseFrame,
};
