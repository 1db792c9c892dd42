//! Sensor stream protocol: hex-word lines in, fixed-size frames out.

pub mod assembler;
pub mod token;

pub use assembler::{CancelToken, FrameAssembler, FramePoll, TokenBuffer, WaitPolicy};
pub use token::{encode_lines, extract_into, parse_token, tokens};
