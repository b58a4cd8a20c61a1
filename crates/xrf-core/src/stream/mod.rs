//! Binary per-pixel count records for pub/sub listeners.
//!
//! Layout, all integers little-endian `u32`:
//!
//! ```text
//! detector | row | col | height | width | block count
//! per block: routine id | entry count | entries (name bytes, 0x00, f64 LE)
//! ```

use crate::domain::{FittingRoutineKind, XrfError};
use crate::fitting::FitOutcome;
use bytes::{Buf, BufMut};
use parking_lot::Mutex;

/// Topic frame sent ahead of every count record.
pub const XRF_COUNTS_TOPIC: &str = "XRF-Counts";

const HEADER_FIELDS: usize = 6;
const U32_LEN: usize = 4;
const F64_LEN: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamDecodeError {
    #[error("record truncated while reading {field}: need {needed} bytes, {remaining} left")]
    Truncated {
        field: &'static str,
        needed: usize,
        remaining: usize,
    },
    #[error("element name at offset {offset} has no terminator")]
    MissingTerminator { offset: usize },
    #[error("element name at offset {offset} is not valid UTF-8")]
    InvalidName { offset: usize },
    #[error("unknown fitting routine id {id}")]
    UnknownRoutine { id: u32 },
    #[error("{count} trailing bytes after record")]
    TrailingBytes { count: usize },
}

impl From<StreamDecodeError> for XrfError {
    fn from(error: StreamDecodeError) -> Self {
        XrfError::input_validation("INPUT.STREAM_RECORD", error.to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StreamFittingBlock {
    pub routine: FittingRoutineKind,
    /// Counts in fit order, diagnostics last.
    pub counts: Vec<(String, f64)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StreamBlock {
    pub detector: u32,
    pub row: u32,
    pub col: u32,
    pub height: u32,
    pub width: u32,
    pub fitting_blocks: Vec<StreamFittingBlock>,
}

impl StreamBlock {
    pub fn new(detector: u32, row: u32, col: u32, height: u32, width: u32) -> Self {
        Self {
            detector,
            row,
            col,
            height,
            width,
            fitting_blocks: Vec::new(),
        }
    }

    pub fn push_outcome(&mut self, routine: FittingRoutineKind, outcome: &FitOutcome) {
        self.fitting_blocks.push(StreamFittingBlock {
            routine,
            counts: outcome.counts(),
        });
    }

    pub fn encoded_len(&self) -> usize {
        let blocks: usize = self
            .fitting_blocks
            .iter()
            .map(|block| {
                2 * U32_LEN
                    + block
                        .counts
                        .iter()
                        .map(|(name, _)| name.len() + 1 + F64_LEN)
                        .sum::<usize>()
            })
            .sum();
        HEADER_FIELDS * U32_LEN + blocks
    }

    /// Names containing a NUL byte are truncated at it by listeners.
    pub fn encode(&self) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(self.encoded_len());
        self.encode_into(&mut buffer);
        buffer
    }

    pub fn encode_into<B: BufMut>(&self, buffer: &mut B) {
        buffer.put_u32_le(self.detector);
        buffer.put_u32_le(self.row);
        buffer.put_u32_le(self.col);
        buffer.put_u32_le(self.height);
        buffer.put_u32_le(self.width);
        buffer.put_u32_le(self.fitting_blocks.len() as u32);
        for block in &self.fitting_blocks {
            buffer.put_u32_le(block.routine.wire_id());
            buffer.put_u32_le(block.counts.len() as u32);
            for (name, value) in &block.counts {
                buffer.put_slice(name.as_bytes());
                buffer.put_u8(0);
                buffer.put_f64_le(*value);
            }
        }
    }

    pub fn decode(record: &[u8]) -> Result<Self, StreamDecodeError> {
        let mut reader = Reader::new(record);
        let detector = reader.u32("detector")?;
        let row = reader.u32("row")?;
        let col = reader.u32("col")?;
        let height = reader.u32("height")?;
        let width = reader.u32("width")?;
        let block_count = reader.u32("block count")?;

        let mut fitting_blocks = Vec::new();
        for _ in 0..block_count {
            let id = reader.u32("routine id")?;
            let routine = FittingRoutineKind::from_wire_id(id)
                .ok_or(StreamDecodeError::UnknownRoutine { id })?;
            let entry_count = reader.u32("entry count")?;
            let mut counts = Vec::new();
            for _ in 0..entry_count {
                let name = reader.name()?;
                let value = reader.f64("count value")?;
                counts.push((name, value));
            }
            fitting_blocks.push(StreamFittingBlock { routine, counts });
        }

        let trailing = reader.remaining();
        if trailing > 0 {
            return Err(StreamDecodeError::TrailingBytes { count: trailing });
        }
        Ok(Self {
            detector,
            row,
            col,
            height,
            width,
            fitting_blocks,
        })
    }
}

struct Reader<'a> {
    buffer: &'a [u8],
    len: usize,
}

impl<'a> Reader<'a> {
    fn new(buffer: &'a [u8]) -> Self {
        Self {
            buffer,
            len: buffer.len(),
        }
    }

    fn offset(&self) -> usize {
        self.len - self.buffer.remaining()
    }

    fn remaining(&self) -> usize {
        self.buffer.remaining()
    }

    fn ensure(&self, field: &'static str, needed: usize) -> Result<(), StreamDecodeError> {
        if self.buffer.remaining() < needed {
            return Err(StreamDecodeError::Truncated {
                field,
                needed,
                remaining: self.buffer.remaining(),
            });
        }
        Ok(())
    }

    fn u32(&mut self, field: &'static str) -> Result<u32, StreamDecodeError> {
        self.ensure(field, U32_LEN)?;
        Ok(self.buffer.get_u32_le())
    }

    fn f64(&mut self, field: &'static str) -> Result<f64, StreamDecodeError> {
        self.ensure(field, F64_LEN)?;
        Ok(self.buffer.get_f64_le())
    }

    fn name(&mut self) -> Result<String, StreamDecodeError> {
        let offset = self.offset();
        let terminator = self
            .buffer
            .iter()
            .position(|byte| *byte == 0)
            .ok_or(StreamDecodeError::MissingTerminator { offset })?;
        let name = std::str::from_utf8(&self.buffer[..terminator])
            .map_err(|_| StreamDecodeError::InvalidName { offset })?
            .to_string();
        self.buffer.advance(terminator + 1);
        Ok(name)
    }
}

/// Writes `record` prefixed by its `u32` little-endian length.
pub fn put_frame<B: BufMut>(buffer: &mut B, record: &StreamBlock) {
    buffer.put_u32_le(record.encoded_len() as u32);
    record.encode_into(buffer);
}

/// Splits a buffer of length-prefixed frames into records.
pub fn decode_frames(mut buffer: &[u8]) -> Result<Vec<StreamBlock>, StreamDecodeError> {
    let mut records = Vec::new();
    while buffer.has_remaining() {
        if buffer.remaining() < U32_LEN {
            return Err(StreamDecodeError::Truncated {
                field: "frame length",
                needed: U32_LEN,
                remaining: buffer.remaining(),
            });
        }
        let len = buffer.get_u32_le() as usize;
        if buffer.remaining() < len {
            return Err(StreamDecodeError::Truncated {
                field: "frame body",
                needed: len,
                remaining: buffer.remaining(),
            });
        }
        records.push(StreamBlock::decode(&buffer[..len])?);
        buffer.advance(len);
    }
    Ok(records)
}

/// Receives one record per fitted pixel from the scan workers.
pub trait StreamSink: Send + Sync {
    fn publish(&self, record: StreamBlock);
}

/// Sink that keeps every record in memory.
#[derive(Debug, Default)]
pub struct CollectingSink {
    records: Mutex<Vec<StreamBlock>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records in scan order.
    pub fn into_records(self) -> Vec<StreamBlock> {
        let mut records = self.records.into_inner();
        records.sort_by_key(|record| (record.row, record.col));
        records
    }
}

impl StreamSink for CollectingSink {
    fn publish(&self, record: StreamBlock) {
        self.records.lock().push(record);
    }
}

#[cfg(test)]
mod tests {
    use super::{
        CollectingSink, StreamBlock, StreamDecodeError, StreamFittingBlock, StreamSink,
        decode_frames, put_frame,
    };
    use crate::domain::FittingRoutineKind;

    fn sample() -> StreamBlock {
        let mut block = StreamBlock::new(1, 2, 3, 10, 20);
        block.fitting_blocks.push(StreamFittingBlock {
            routine: FittingRoutineKind::Nnls,
            counts: vec![("Fe".to_string(), 1.5), ("NUM_ITR".to_string(), 4.0)],
        });
        block
    }

    #[test]
    fn encoding_matches_documented_byte_layout() {
        let bytes = sample().encode();

        let mut expected = Vec::new();
        for field in [1_u32, 2, 3, 10, 20, 1, 16, 2] {
            expected.extend_from_slice(&field.to_le_bytes());
        }
        expected.extend_from_slice(b"Fe\0");
        expected.extend_from_slice(&1.5_f64.to_le_bytes());
        expected.extend_from_slice(b"NUM_ITR\0");
        expected.extend_from_slice(&4.0_f64.to_le_bytes());

        assert_eq!(bytes, expected);
        assert_eq!(sample().encoded_len(), expected.len());
        assert_eq!(StreamBlock::decode(&bytes).expect("decode"), sample());
    }

    #[test]
    fn malformed_records_are_rejected() {
        let bytes = sample().encode();
        assert!(matches!(
            StreamBlock::decode(&bytes[..14]),
            Err(StreamDecodeError::Truncated { field: "height", .. })
        ));

        let name_start = 8 * 4;
        assert!(matches!(
            StreamBlock::decode(&bytes[..name_start + 2]),
            Err(StreamDecodeError::MissingTerminator { offset }) if offset == name_start
        ));

        let mut unknown = bytes.clone();
        unknown[24..28].copy_from_slice(&7_u32.to_le_bytes());
        assert_eq!(
            StreamBlock::decode(&unknown),
            Err(StreamDecodeError::UnknownRoutine { id: 7 })
        );

        let mut trailing = bytes;
        trailing.push(0xff);
        assert_eq!(
            StreamBlock::decode(&trailing),
            Err(StreamDecodeError::TrailingBytes { count: 1 })
        );
    }

    #[test]
    fn frames_split_back_into_records() {
        let mut second = sample();
        second.col = 4;
        let mut buffer = Vec::new();
        put_frame(&mut buffer, &sample());
        put_frame(&mut buffer, &second);

        let records = decode_frames(&buffer).expect("frames");
        assert_eq!(records, vec![sample(), second]);
        assert!(decode_frames(&buffer[..buffer.len() - 1]).is_err());
    }

    #[test]
    fn collecting_sink_orders_records_by_pixel() {
        let sink = CollectingSink::new();
        for (row, col) in [(1, 0), (0, 1), (0, 0)] {
            sink.publish(StreamBlock::new(0, row, col, 2, 2));
        }
        let order: Vec<(u32, u32)> = sink
            .into_records()
            .iter()
            .map(|record| (record.row, record.col))
            .collect();
        assert_eq!(order, [(0, 0), (0, 1), (1, 0)]);
    }
}
