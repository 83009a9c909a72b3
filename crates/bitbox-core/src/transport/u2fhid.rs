//! U2FHID-style report framing.
//!
//! A frame is split into 64-byte HID reports: one init report
//! (`CID | CMD | LEN_HI LEN_LO | data`) followed by continuation reports
//! (`CID | SEQ | data`). Unused trailing bytes are padded with `0xEE`.

use std::io::Cursor;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use thiserror::Error;

/// HID report size in both directions.
pub const REPORT_SIZE: usize = 64;

/// Channel id used by the host for every frame.
pub const DEFAULT_CID: u32 = 0xFF00_0000;

/// Hardware wallet command (`0x80 | 0x41`).
pub const HWW_CMD: u8 = 0x80 + 0x40 + 0x01;

const INIT_HEADER_LEN: usize = 4 + 1 + 2;
const CONT_HEADER_LEN: usize = 4 + 1;
const INIT_DATA_LEN: usize = REPORT_SIZE - INIT_HEADER_LEN;
const CONT_DATA_LEN: usize = REPORT_SIZE - CONT_HEADER_LEN;
const MAX_SEQ: usize = 0x80;
const PADDING: u8 = 0xEE;

/// Largest frame that fits one init report plus all continuation reports.
pub const MAX_FRAME_LEN: usize = INIT_DATA_LEN + MAX_SEQ * CONT_DATA_LEN;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("Frame of {0} bytes exceeds maximum of {MAX_FRAME_LEN}")]
    TooLarge(usize),
    #[error("Report has {0} bytes, expected {REPORT_SIZE}")]
    BadReportSize(usize),
    #[error("Unexpected channel id 0x{actual:08X}, expected 0x{expected:08X}")]
    WrongChannel { expected: u32, actual: u32 },
    #[error("Unexpected command 0x{actual:02X}, expected 0x{expected:02X}")]
    WrongCommand { expected: u8, actual: u8 },
    #[error("Out of order continuation: expected seq {expected}, got {actual}")]
    OutOfOrder { expected: u8, actual: u8 },
    #[error("Declared length {0} exceeds maximum of {MAX_FRAME_LEN}")]
    BadLength(usize),
}

/// Split a frame into HID reports.
pub fn encode_frame(cid: u32, cmd: u8, data: &[u8]) -> Result<Vec<[u8; REPORT_SIZE]>, FrameError> {
    if data.len() > MAX_FRAME_LEN {
        return Err(FrameError::TooLarge(data.len()));
    }

    let mut reports = Vec::new();
    let mut rest = data;

    let mut header = Vec::with_capacity(INIT_HEADER_LEN);
    header.write_u32::<BigEndian>(cid).unwrap();
    header.write_u8(cmd).unwrap();
    header.write_u16::<BigEndian>(data.len() as u16).unwrap();
    reports.push(fill_report(&header, &mut rest));

    let mut seq: u8 = 0;
    while !rest.is_empty() {
        let mut header = Vec::with_capacity(CONT_HEADER_LEN);
        header.write_u32::<BigEndian>(cid).unwrap();
        header.write_u8(seq).unwrap();
        reports.push(fill_report(&header, &mut rest));
        seq += 1;
    }

    Ok(reports)
}

fn fill_report(header: &[u8], rest: &mut &[u8]) -> [u8; REPORT_SIZE] {
    let mut report = [PADDING; REPORT_SIZE];
    report[..header.len()].copy_from_slice(header);
    let take = rest.len().min(REPORT_SIZE - header.len());
    report[header.len()..header.len() + take].copy_from_slice(&rest[..take]);
    *rest = &rest[take..];
    report
}

/// Reassembles a frame from incoming reports.
#[derive(Debug)]
pub struct FrameAssembler {
    cid: u32,
    cmd: u8,
    expected_len: Option<usize>,
    next_seq: u8,
    data: Vec<u8>,
}

impl FrameAssembler {
    pub fn new(cid: u32, cmd: u8) -> Self {
        Self {
            cid,
            cmd,
            expected_len: None,
            next_seq: 0,
            data: Vec::new(),
        }
    }

    /// Feed one report. Returns the complete frame once all data arrived.
    pub fn push(&mut self, report: &[u8]) -> Result<Option<Vec<u8>>, FrameError> {
        if report.len() != REPORT_SIZE {
            return Err(FrameError::BadReportSize(report.len()));
        }
        let mut cursor = Cursor::new(report);
        // Reads from a 64-byte slice cannot fail for the header lengths used here.
        let cid = cursor.read_u32::<BigEndian>().unwrap_or_default();
        if cid != self.cid {
            return Err(FrameError::WrongChannel {
                expected: self.cid,
                actual: cid,
            });
        }

        match self.expected_len {
            None => {
                let cmd = cursor.read_u8().unwrap_or_default();
                if cmd != self.cmd {
                    return Err(FrameError::WrongCommand {
                        expected: self.cmd,
                        actual: cmd,
                    });
                }
                let len = cursor.read_u16::<BigEndian>().unwrap_or_default() as usize;
                if len > MAX_FRAME_LEN {
                    return Err(FrameError::BadLength(len));
                }
                self.expected_len = Some(len);
                self.data.reserve(len);
                self.take(&report[INIT_HEADER_LEN..], len);
            }
            Some(len) => {
                let seq = cursor.read_u8().unwrap_or_default();
                if seq != self.next_seq {
                    return Err(FrameError::OutOfOrder {
                        expected: self.next_seq,
                        actual: seq,
                    });
                }
                self.next_seq = self.next_seq.wrapping_add(1);
                self.take(&report[CONT_HEADER_LEN..], len);
            }
        }

        match self.expected_len {
            Some(len) if self.data.len() >= len => Ok(Some(std::mem::take(&mut self.data))),
            _ => Ok(None),
        }
    }

    fn take(&mut self, chunk: &[u8], len: usize) {
        let missing = len - self.data.len();
        self.data.extend_from_slice(&chunk[..missing.min(chunk.len())]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_report() {
        let reports = encode_frame(DEFAULT_CID, HWW_CMD, b"h").unwrap();
        assert_eq!(reports.len(), 1);
        let r = &reports[0];
        assert_eq!(&r[..4], &[0xFF, 0x00, 0x00, 0x00]);
        assert_eq!(r[4], 0xC1);
        assert_eq!(&r[5..7], &[0x00, 0x01]);
        assert_eq!(r[7], b'h');
        assert!(r[8..].iter().all(|&b| b == 0xEE));
    }

    #[test]
    fn test_continuation_reports() {
        let data: Vec<u8> = (0..200u32).map(|i| i as u8).collect();
        let reports = encode_frame(DEFAULT_CID, HWW_CMD, &data).unwrap();
        // 57 in the init report, then 59 + 59 + 25
        assert_eq!(reports.len(), 4);
        assert_eq!(reports[1][4], 0);
        assert_eq!(reports[3][4], 2);

        let mut assembler = FrameAssembler::new(DEFAULT_CID, HWW_CMD);
        assert_eq!(assembler.push(&reports[0]).unwrap(), None);
        assert_eq!(assembler.push(&reports[1]).unwrap(), None);
        assert_eq!(assembler.push(&reports[2]).unwrap(), None);
        assert_eq!(assembler.push(&reports[3]).unwrap(), Some(data));
    }

    #[test]
    fn test_too_large() {
        let data = vec![0u8; MAX_FRAME_LEN + 1];
        assert_eq!(
            encode_frame(DEFAULT_CID, HWW_CMD, &data).unwrap_err(),
            FrameError::TooLarge(MAX_FRAME_LEN + 1)
        );
    }

    #[test]
    fn test_rejects_foreign_channel_and_order() {
        let data = vec![0x42u8; 100];
        let reports = encode_frame(DEFAULT_CID, HWW_CMD, &data).unwrap();

        let mut other = FrameAssembler::new(0x1234_5678, HWW_CMD);
        assert!(matches!(
            other.push(&reports[0]),
            Err(FrameError::WrongChannel { .. })
        ));

        let mut assembler = FrameAssembler::new(DEFAULT_CID, HWW_CMD);
        assembler.push(&reports[0]).unwrap();
        let mut skipped = reports[1];
        skipped[4] = 3;
        assert_eq!(
            assembler.push(&skipped).unwrap_err(),
            FrameError::OutOfOrder {
                expected: 0,
                actual: 3
            }
        );
    }
}
