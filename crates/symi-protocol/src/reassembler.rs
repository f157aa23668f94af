//! Stream reassembly.
//!
//! The gateway link delivers bytes in arbitrary chunks and occasionally
//! injects noise. [`FrameReassembler`] buffers chunks across reads, hunts for
//! the header byte, and resynchronizes one byte at a time on checksum
//! failures so that a valid frame hidden behind a false header is still found.

use bytes::{Buf, BytesMut};
use tracing::{debug, trace};

use crate::constants::FRAME_HEADER;
use crate::frame::{DecodeOutcome, Frame, FrameCodec};

/// Initial buffer capacity; grows as needed.
const INITIAL_CAPACITY: usize = 512;

/// Smallest candidate worth handing to the decoder.
const MIN_CANDIDATE_LEN: usize = 4;

/// Cumulative reassembly counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReassemblerStats {
    /// Valid frames emitted.
    pub frames: u64,
    /// Candidates rejected by checksum.
    pub corrupt: u64,
    /// Bytes dropped while searching for a header or after a corrupt candidate.
    pub discarded_bytes: u64,
}

/// Buffers inbound bytes and emits complete frames in arrival order.
#[derive(Debug)]
pub struct FrameReassembler {
    buffer: BytesMut,
    stats: ReassemblerStats,
}

impl Default for FrameReassembler {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameReassembler {
    /// Create an empty reassembler.
    pub fn new() -> Self {
        FrameReassembler {
            buffer: BytesMut::with_capacity(INITIAL_CAPACITY),
            stats: ReassemblerStats::default(),
        }
    }

    /// Append `data` and return every frame that is now complete.
    pub fn feed(&mut self, data: &[u8]) -> Vec<Frame> {
        self.buffer.extend_from_slice(data);
        let mut frames = Vec::new();

        loop {
            if !self.skip_to_header() {
                break;
            }
            if self.buffer.len() < MIN_CANDIDATE_LEN {
                break;
            }

            match FrameCodec::decode(&self.buffer) {
                DecodeOutcome::NeedMoreBytes => break,
                DecodeOutcome::Corrupt => {
                    debug!(
                        buffered = self.buffer.len(),
                        "checksum mismatch, dropping header byte to resync"
                    );
                    self.buffer.advance(1);
                    self.stats.corrupt += 1;
                    self.stats.discarded_bytes += 1;
                }
                DecodeOutcome::Frame { frame, consumed } => {
                    trace!(%frame, "frame reassembled");
                    self.buffer.advance(consumed);
                    self.stats.frames += 1;
                    frames.push(frame);
                }
            }
        }

        frames
    }

    /// Drop any bytes before the next header. Returns false if no header is
    /// buffered, in which case the buffer is emptied.
    fn skip_to_header(&mut self) -> bool {
        match self.buffer.iter().position(|&b| b == FRAME_HEADER) {
            Some(0) => true,
            Some(pos) => {
                trace!(skipped = pos, "discarding bytes before header");
                self.buffer.advance(pos);
                self.stats.discarded_bytes += pos as u64;
                true
            }
            None => {
                self.stats.discarded_bytes += self.buffer.len() as u64;
                self.buffer.clear();
                false
            }
        }
    }

    /// Number of bytes waiting for the rest of a frame.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Counters accumulated since creation.
    pub fn stats(&self) -> ReassemblerStats {
        self.stats
    }

    /// Discard all buffered bytes.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::*;

    fn node_event(naddr: u16, msg_type: u8, value: u8) -> Vec<u8> {
        let [lo, hi] = naddr.to_le_bytes();
        FrameCodec::encode_response(OP_NODE_NOTIFY, STATUS_NODE_STATUS, &[lo, hi, msg_type, value])
            .unwrap()
    }

    #[test]
    fn test_feed_single_frame() {
        let mut reassembler = FrameReassembler::new();
        let frames = reassembler.feed(&node_event(0x011B, MSG_TYPE_SWITCH, 0x02));
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].opcode, OP_NODE_NOTIFY);
        assert_eq!(reassembler.buffered_len(), 0);
    }

    #[test]
    fn test_feed_partial_then_rest() {
        let mut reassembler = FrameReassembler::new();
        let bytes = node_event(0x011B, MSG_TYPE_BRIGHTNESS, 50);

        assert!(reassembler.feed(&bytes[..5]).is_empty());
        assert_eq!(reassembler.buffered_len(), 5);

        let frames = reassembler.feed(&bytes[5..]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload[3], 50);
    }

    #[test]
    fn test_garbage_before_header_is_skipped() {
        let mut reassembler = FrameReassembler::new();
        let mut bytes = vec![0x00, 0xFF, 0x12];
        bytes.extend(node_event(0x0131, MSG_TYPE_SWITCH, 0x06));

        let frames = reassembler.feed(&bytes);
        assert_eq!(frames.len(), 1);
        assert_eq!(reassembler.stats().discarded_bytes, 3);
    }

    #[test]
    fn test_no_header_clears_buffer() {
        let mut reassembler = FrameReassembler::new();
        assert!(reassembler.feed(&[0x01, 0x02, 0x03]).is_empty());
        assert_eq!(reassembler.buffered_len(), 0);
    }

    #[test]
    fn test_corrupt_frame_resyncs_one_byte() {
        let mut reassembler = FrameReassembler::new();
        let mut bad = node_event(0x011B, MSG_TYPE_SWITCH, 0x02);
        let last = bad.len() - 1;
        bad[last] ^= 0x5A;
        let good = node_event(0x0131, MSG_TYPE_SWITCH, 0x04);

        let mut bytes = bad.clone();
        bytes.extend_from_slice(&good);
        let frames = reassembler.feed(&bytes);

        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0].payload[..2], &[0x31, 0x01]);
        assert_eq!(reassembler.stats().corrupt, 1);
        assert_eq!(reassembler.buffered_len(), 0);
    }

    #[test]
    fn test_frame_inside_false_candidate_is_recovered() {
        let mut reassembler = FrameReassembler::new();
        let good = node_event(0x0131, MSG_TYPE_BRIGHTNESS, 75);

        // Stray header whose declared length spans the whole good frame
        let mut bytes = vec![FRAME_HEADER, 0x10, (good.len() - 1) as u8];
        bytes.extend_from_slice(&good);

        let frames = reassembler.feed(&bytes);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].opcode, OP_NODE_NOTIFY);
        assert_eq!(&frames[0].payload[..], &[0x31, 0x01, MSG_TYPE_BRIGHTNESS, 75]);

        let stats = reassembler.stats();
        assert_eq!(stats.corrupt, 1);
        assert_eq!(stats.discarded_bytes, 3);
        assert_eq!(reassembler.buffered_len(), 0);
    }

    #[test]
    fn test_clear_drops_partial_frame() {
        let mut reassembler = FrameReassembler::new();
        let bytes = node_event(0x011B, MSG_TYPE_SWITCH, 0x02);
        reassembler.feed(&bytes[..6]);
        reassembler.clear();
        assert_eq!(reassembler.buffered_len(), 0);

        // The tail alone never forms a frame
        assert!(reassembler.feed(&bytes[6..]).is_empty());
    }
}
