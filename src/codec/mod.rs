//! Streaming conversion between Tony-format byte streams and [Event]
//! streams. The Tony textual parser is external (consumed as
//! a [Tokenizer]); this module only implements the decoder that folds
//! tokens into events and the encoder that writes events back out as bytes.

mod decoder;
mod encoder;
mod token;

pub use decoder::Decoder;
pub use encoder::{Encoder, EncoderOpts};
pub use token::{Token, Tokenizer};
