//! Encoder invocation

pub mod ffmpeg;

pub use ffmpeg::{build_encode_args, build_encode_command, run_encode, EncodeError, EncodeRequest};
