//! Codec: converts between Rust types and the tagged binary encoding used
//! on the wire, and between [`Packet`] and its 4-/6-element array form.
//!
//! A "codec" (coder/decoder) converts between Rust types and raw bytes.
//! Nothing above this layer cares HOW a `cborData` payload is serialized —
//! it only needs something that implements [`Codec`]. [`CborCodec`] is the
//! production implementation; tests may swap in others.

use ciborium::Value;
use serde::{de::DeserializeOwned, Serialize};

use crate::error::WireError;
use crate::packet::{Packet, PacketType, REQUEST_ID_NOTIFICATION};

/// A codec that can encode Rust types to bytes and decode bytes back.
///
/// `Send + Sync + 'static`: safe to share across the Tokio thread pool and
/// store in long-lived tasks.
pub trait Codec: Send + Sync + 'static {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, WireError>;
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, WireError>;
}

/// The production [`Codec`]: canonical CBOR (RFC 8949) via `ciborium`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CborCodec;

impl Codec for CborCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, WireError> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)?;
        Ok(buf)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, WireError> {
        Ok(ciborium::from_reader(data)?)
    }
}

/// Encodes a [`Packet`] into its wire array form: four elements for
/// notifications and replies, six for requests (`timeout`, `timestamp`
/// appended).
pub fn encode_packet(packet: &Packet) -> Result<Vec<u8>, WireError> {
    let mut elems = vec![
        Value::Integer(packet.request_id.into()),
        Value::Integer(packet.packet_type.bits().into()),
        Value::Text(packet.command.clone()),
        Value::Bytes(packet.data.clone()),
    ];
    if let (Some(timeout), Some(timestamp)) = (packet.timeout, packet.timestamp) {
        elems.push(Value::Integer(timeout.into()));
        elems.push(Value::Integer(timestamp.into()));
    }
    let mut buf = Vec::new();
    ciborium::into_writer(&Value::Array(elems), &mut buf)?;
    Ok(buf)
}

/// Decodes a wire frame into a [`Packet`]. Accepts either the 4- or
/// 6-element array form; any other shape is [`WireError::InvalidPacket`].
pub fn decode_packet(data: &[u8]) -> Result<Packet, WireError> {
    let value: Value = ciborium::from_reader(data)?;
    let Value::Array(elems) = value else {
        return Err(WireError::InvalidPacket("top-level value is not an array".into()));
    };
    if elems.len() != 4 && elems.len() != 6 {
        return Err(WireError::InvalidPacket(format!(
            "expected 4 or 6 elements, got {}",
            elems.len()
        )));
    }

    let request_id = as_i64(&elems[0])?;
    let type_bits = as_i64(&elems[1])? as u8;
    let packet_type = PacketType::from_bits(type_bits)
        .ok_or_else(|| WireError::InvalidPacket(format!("unknown type bits {type_bits:#x}")))?;
    let command = elems[2]
        .as_text()
        .ok_or_else(|| WireError::InvalidPacket("command is not text".into()))?
        .to_string();
    let bytes = elems[3]
        .as_bytes()
        .ok_or_else(|| WireError::InvalidPacket("cborData is not a byte string".into()))?
        .clone();

    let (timeout, timestamp) = if elems.len() == 6 {
        (Some(as_i64(&elems[4])?), Some(as_i64(&elems[5])?))
    } else {
        (None, None)
    };

    if packet_type.is_request() && timeout.is_none() {
        return Err(WireError::InvalidPacket(
            "request packet missing timeout/timestamp".into(),
        ));
    }
    if request_id == REQUEST_ID_NOTIFICATION && !packet_type.is_notification() {
        return Err(WireError::InvalidPacket(
            "requestId -2 reserved for notifications".into(),
        ));
    }

    Ok(Packet {
        request_id,
        packet_type,
        command,
        data: bytes,
        timeout,
        timestamp,
    })
}

fn as_i64(value: &Value) -> Result<i64, WireError> {
    value
        .as_integer()
        .and_then(|i| i128::from(i).try_into().ok())
        .ok_or_else(|| WireError::InvalidPacket("expected an integer".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::PacketType;

    #[test]
    fn round_trips_notification() {
        let packet = Packet::notify("Heartbeat", vec![0xA0]);
        let bytes = encode_packet(&packet).unwrap();
        let decoded = decode_packet(&bytes).unwrap();
        assert_eq!(packet, decoded);
    }

    #[test]
    fn round_trips_request() {
        let packet = Packet::request(42, "PlayCard", vec![1, 2, 3], 15, 1_700_000_000);
        let bytes = encode_packet(&packet).unwrap();
        let decoded = decode_packet(&bytes).unwrap();
        assert_eq!(packet, decoded);
    }

    #[test]
    fn rejects_wrong_arity() {
        let mut buf = Vec::new();
        ciborium::into_writer(&Value::Array(vec![Value::Integer(1.into())]), &mut buf).unwrap();
        assert!(decode_packet(&buf).is_err());
    }

    #[test]
    fn rejects_request_without_timeout() {
        let mut buf = Vec::new();
        let elems = vec![
            Value::Integer(1.into()),
            Value::Integer(PacketType::server_to_client_request().bits().into()),
            Value::Text("PlayCard".into()),
            Value::Bytes(vec![]),
        ];
        ciborium::into_writer(&Value::Array(elems), &mut buf).unwrap();
        assert!(decode_packet(&buf).is_err());
    }

    #[test]
    fn cbor_codec_round_trips_structured_payload() {
        #[derive(serde::Serialize, serde::Deserialize, PartialEq, Debug)]
        struct Chat {
            r#type: u8,
            msg: String,
        }
        let codec = CborCodec;
        let value = Chat { r#type: 2, msg: "hello".into() };
        let bytes = codec.encode(&value).unwrap();
        let decoded: Chat = codec.decode(&bytes).unwrap();
        assert_eq!(value, decoded);
    }
}
