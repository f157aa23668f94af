//! Frame encoding/decoding.
//!
//! Every frame starts with the [`FRAME_HEADER`] byte and ends with an XOR
//! checksum of all bytes before it. Two shapes exist on the wire:
//!
//! ```text
//! command  (host → gateway):  | 0x53 | opcode | len | payload[len] | chk |
//! response (gateway → host):  | 0x53 | opcode | status | len | payload[len] | chk |
//! ```
//!
//! The shape is selected by the opcode: opcodes with the high bit set
//! (responses and the node notification event) carry a status byte.

use std::fmt;

use bytes::{BufMut, Bytes};

use crate::constants::*;
use crate::error::ProtocolError;

/// XOR-fold of every byte.
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc ^ b)
}

/// Returns true if frames with this opcode carry a status byte.
pub fn is_response_opcode(opcode: u8) -> bool {
    opcode >= RESPONSE_OPCODE_MIN
}

/// A single validated protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Operation code.
    pub opcode: u8,
    /// Status byte; present only on response-shaped frames.
    pub status: Option<u8>,
    /// Frame payload (at most [`MAX_PAYLOAD_LEN`] bytes).
    pub payload: Bytes,
}

impl Frame {
    /// Build a command-shaped frame.
    pub fn command(opcode: u8, payload: impl Into<Bytes>) -> Self {
        Frame {
            opcode,
            status: None,
            payload: payload.into(),
        }
    }

    /// Build a response-shaped frame.
    pub fn response(opcode: u8, status: u8, payload: impl Into<Bytes>) -> Self {
        Frame {
            opcode,
            status: Some(status),
            payload: payload.into(),
        }
    }

    /// Serialize this frame, including header and checksum.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        if self.payload.len() > MAX_PAYLOAD_LEN {
            return Err(ProtocolError::PayloadTooLong {
                max: MAX_PAYLOAD_LEN,
                actual: self.payload.len(),
            });
        }

        let overhead = if self.status.is_some() {
            RESPONSE_FRAME_OVERHEAD
        } else {
            COMMAND_FRAME_OVERHEAD
        };
        let mut buf = Vec::with_capacity(overhead + self.payload.len());
        buf.put_u8(FRAME_HEADER);
        buf.put_u8(self.opcode);
        if let Some(status) = self.status {
            buf.put_u8(status);
        }
        buf.put_u8(self.payload.len() as u8);
        buf.extend_from_slice(&self.payload);
        let chk = checksum(&buf);
        buf.put_u8(chk);
        Ok(buf)
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(0x{:02X}", opcode_name(self.opcode), self.opcode)?;
        if let Some(status) = self.status {
            write!(f, ", status=0x{:02X}", status)?;
        }
        write!(f, ", payload={})", hex::encode_upper(&self.payload))
    }
}

/// Result of trying to decode one frame from the front of a buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeOutcome {
    /// A complete, valid frame occupying the first `consumed` bytes.
    Frame {
        /// The decoded frame.
        frame: Frame,
        /// Number of bytes the frame occupied.
        consumed: usize,
    },
    /// The buffer ends before the frame does.
    NeedMoreBytes,
    /// The candidate is complete but its checksum does not match, or the
    /// buffer does not begin with a header byte.
    Corrupt,
}

/// Stateless frame encoder/decoder.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameCodec;

impl FrameCodec {
    /// Encode a command frame for host → gateway transmission.
    pub fn encode(opcode: u8, payload: &[u8]) -> Result<Vec<u8>, ProtocolError> {
        Frame::command(opcode, Bytes::copy_from_slice(payload)).to_bytes()
    }

    /// Encode a response/event frame, as the gateway would send it.
    pub fn encode_response(
        opcode: u8,
        status: u8,
        payload: &[u8],
    ) -> Result<Vec<u8>, ProtocolError> {
        Frame::response(opcode, status, Bytes::copy_from_slice(payload)).to_bytes()
    }

    /// Try to decode a single frame starting at `buf[0]`.
    pub fn decode(buf: &[u8]) -> DecodeOutcome {
        if buf.is_empty() {
            return DecodeOutcome::NeedMoreBytes;
        }
        if buf[0] != FRAME_HEADER {
            return DecodeOutcome::Corrupt;
        }
        if buf.len() < 2 {
            return DecodeOutcome::NeedMoreBytes;
        }

        let opcode = buf[1];
        let (len_index, overhead) = if is_response_opcode(opcode) {
            (3, RESPONSE_FRAME_OVERHEAD)
        } else {
            (2, COMMAND_FRAME_OVERHEAD)
        };
        if buf.len() <= len_index {
            return DecodeOutcome::NeedMoreBytes;
        }

        let len = buf[len_index] as usize;
        let total = overhead + len;
        if buf.len() < total {
            return DecodeOutcome::NeedMoreBytes;
        }

        let expected = checksum(&buf[..total - 1]);
        if buf[total - 1] != expected {
            return DecodeOutcome::Corrupt;
        }

        let payload_start = len_index + 1;
        let payload = Bytes::copy_from_slice(&buf[payload_start..payload_start + len]);
        let status = is_response_opcode(opcode).then(|| buf[2]);
        DecodeOutcome::Frame {
            frame: Frame {
                opcode,
                status,
                payload,
            },
            consumed: total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEVICE_LIST_SAMPLE: [u8; 21] = [
        0x53, 0x92, 0x00, 0x10, 0x0B, 0x00, 0x1A, 0xD0, 0x7D, 0x3D, 0x44, 0x9C, 0x1B, 0x01, 0x7B,
        0x00, 0x14, 0x00, 0x00, 0x00, 0xFD,
    ];

    #[test]
    fn test_checksum_xor_fold() {
        assert_eq!(checksum(&[]), 0);
        assert_eq!(checksum(&[0x53]), 0x53);
        assert_eq!(checksum(&[0x53, 0x12, 0x00]), 0x41);
        assert_eq!(checksum(&DEVICE_LIST_SAMPLE[..20]), 0xFD);
    }

    #[test]
    fn test_encode_read_device_list() {
        let encoded = FrameCodec::encode(OP_DEVICE_LIST, &[]).expect("should encode");
        assert_eq!(encoded, vec![0x53, 0x12, 0x00, 0x41]);
    }

    #[test]
    fn test_encode_control_frame() {
        // naddr 0x0102, switch, channel 1 on
        let encoded =
            FrameCodec::encode(OP_DEVICE_CONTROL, &[0x02, 0x01, MSG_TYPE_SWITCH, 0x02])
                .expect("should encode");
        assert_eq!(&encoded[..3], &[0x53, 0x30, 0x04]);
        assert_eq!(&encoded[3..7], &[0x02, 0x01, 0x02, 0x02]);
        assert_eq!(encoded[7], checksum(&encoded[..7]));
    }

    #[test]
    fn test_encode_rejects_oversized_payload() {
        let payload = vec![0u8; MAX_PAYLOAD_LEN + 1];
        let err = FrameCodec::encode(OP_DEVICE_CONTROL, &payload).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::PayloadTooLong {
                max: MAX_PAYLOAD_LEN,
                actual: MAX_PAYLOAD_LEN + 1
            }
        );
    }

    #[test]
    fn test_decode_command_round_trip() {
        let payload = [0x1B, 0x01, MSG_TYPE_BRIGHTNESS, 0x40];
        let encoded = FrameCodec::encode(OP_DEVICE_CONTROL, &payload).unwrap();

        match FrameCodec::decode(&encoded) {
            DecodeOutcome::Frame { frame, consumed } => {
                assert_eq!(consumed, encoded.len());
                assert_eq!(frame.opcode, OP_DEVICE_CONTROL);
                assert_eq!(frame.status, None);
                assert_eq!(&frame.payload[..], &payload);
            }
            other => panic!("expected frame, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_device_list_sample() {
        match FrameCodec::decode(&DEVICE_LIST_SAMPLE) {
            DecodeOutcome::Frame { frame, consumed } => {
                assert_eq!(consumed, 21);
                assert_eq!(frame.opcode, OP_DEVICE_LIST_RSP);
                assert_eq!(frame.status, Some(STATUS_SUCCESS));
                assert_eq!(frame.payload.len(), 16);
            }
            other => panic!("expected frame, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_node_event_carries_status() {
        let encoded =
            FrameCodec::encode_response(OP_NODE_NOTIFY, STATUS_NODE_STATUS, &[0x1B, 0x01, 0x02, 0x06])
                .unwrap();
        match FrameCodec::decode(&encoded) {
            DecodeOutcome::Frame { frame, .. } => {
                assert_eq!(frame.status, Some(STATUS_NODE_STATUS));
                assert_eq!(&frame.payload[..], &[0x1B, 0x01, 0x02, 0x06]);
            }
            other => panic!("expected frame, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_needs_more_bytes() {
        assert_eq!(FrameCodec::decode(&[]), DecodeOutcome::NeedMoreBytes);
        assert_eq!(FrameCodec::decode(&[0x53]), DecodeOutcome::NeedMoreBytes);
        // Response shape needs the length at index 3
        assert_eq!(
            FrameCodec::decode(&[0x53, 0x92, 0x00]),
            DecodeOutcome::NeedMoreBytes
        );
        for cut in 4..DEVICE_LIST_SAMPLE.len() {
            assert_eq!(
                FrameCodec::decode(&DEVICE_LIST_SAMPLE[..cut]),
                DecodeOutcome::NeedMoreBytes,
                "cut at {}",
                cut
            );
        }
    }

    #[test]
    fn test_decode_bad_checksum_is_corrupt() {
        let mut bad = DEVICE_LIST_SAMPLE;
        bad[20] ^= 0xFF;
        assert_eq!(FrameCodec::decode(&bad), DecodeOutcome::Corrupt);
    }

    #[test]
    fn test_decode_without_header_is_corrupt() {
        assert_eq!(FrameCodec::decode(&[0x00, 0x53]), DecodeOutcome::Corrupt);
    }

    #[test]
    fn test_frame_display() {
        let frame = Frame::response(OP_START_SCAN_RSP, STATUS_SUCCESS, vec![0xAB]);
        assert_eq!(
            frame.to_string(),
            "start_scan(0x90, status=0x00, payload=AB)"
        );
    }
}
