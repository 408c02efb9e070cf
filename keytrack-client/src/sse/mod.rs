//! Client side of the streamed analysis protocol
//!
//! Bytes → frames ([`frame`]) → typed events ([`decode`]).

pub mod decode;
pub mod frame;

pub use decode::{decode_frame, AnalysisPayload, DecodedEvent, ParseError, DATA_PREFIX};
pub use frame::{FrameSplitter, Utf8StreamDecoder, FRAME_DELIMITER};
