//! Length-delimited framing shared by every sync/state/light-client protocol: an unsigned-varint
//! byte length followed by a protobuf-encoded payload, all on one substream.
//!
//! Grounded on sc-network's request-response codecs, which layer `unsigned_varint::codec` under
//! `prost::Message` the same way; the varint here is the frame length only; protobuf's own
//! field-level varints are handled by `prost`.

use alloc::vec::Vec;
use prost::Message;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("length-prefix varint is malformed")]
    BadVarint,
    #[error("frame declares a length too small to hold the remaining buffer")]
    Truncated,
    #[error("protobuf payload failed to decode: {0}")]
    Protobuf(#[from] prost::DecodeError),
}

/// Frames `message` as `unsigned_varint(len) || encoded_bytes`.
pub fn encode_framed(message: &impl Message) -> Vec<u8> {
    let payload = message.encode_to_vec();
    let mut buf = unsigned_varint::encode::usize_buffer();
    let prefix = unsigned_varint::encode::usize(payload.len(), &mut buf);
    let mut framed = Vec::with_capacity(prefix.len() + payload.len());
    framed.extend_from_slice(prefix);
    framed.extend_from_slice(&payload);
    framed
}

/// Reverses [`encode_framed`]: reads the varint length prefix, then decodes exactly that many
/// bytes as `M`. Trailing bytes past the declared length are an error — one frame per call.
pub fn decode_framed<M: Message + Default>(framed: &[u8]) -> Result<M, Error> {
    let (len, rest) = unsigned_varint::decode::usize(framed).map_err(|_| Error::BadVarint)?;
    if rest.len() != len {
        return Err(Error::Truncated);
    }
    Ok(M::decode(rest)?)
}
