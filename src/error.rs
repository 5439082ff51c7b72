//! Per-stage error types.
//!
//! Matches the error taxonomy in the spec: everything here except
//! [`DemuxError::Io`] is a local-recovery condition a caller logs and moves
//! past; I/O failure during xRIT emission is the one fatal path and
//! propagates out of the worker loop.

use thiserror::Error;

use crate::bits::BitsError;

#[derive(Debug, Error)]
pub enum VcduError {
    #[error("VCDU frame must be exactly {expected} bytes, got {actual}")]
    WrongLength { expected: usize, actual: usize },
    #[error(transparent)]
    Bits(#[from] BitsError),
}

#[derive(Debug, Error)]
pub enum MPduError {
    #[error("M_PDU packet zone must be exactly {expected} bytes, got {actual}")]
    WrongLength { expected: usize, actual: usize },
    #[error(transparent)]
    Bits(#[from] BitsError),
}

#[derive(Debug, Error)]
pub enum CpPduError {
    #[error("CP_PDU header requires at least 6 bytes, got {0}")]
    HeaderTooShort(usize),
    #[error("invalid sequence flag value {0} (must be 0-3)")]
    BadSeqFlag(u8),
    #[error(transparent)]
    Bits(#[from] BitsError),
}

#[derive(Debug, Error)]
pub enum TpFileError {
    #[error("TP_File header requires at least 10 bytes, got {0}")]
    HeaderTooShort(usize),
    #[error("TP_File length mismatch: declared {declared} bytes, accumulated {actual}")]
    LengthMismatch { declared: usize, actual: usize },
    #[error(transparent)]
    Bits(#[from] BitsError),
}

#[derive(Debug, Error)]
pub enum SpduError {
    #[error("xRIT data too short to contain a 16 byte primary header")]
    PrimaryHeaderTooShort,
    #[error("header chain record at offset {0} has a length shorter than its own header")]
    MalformedHeaderChain(usize),
}

#[derive(Debug, Error)]
pub enum XritError {
    #[error("xRIT data too short to contain a 16 byte primary header")]
    PrimaryHeaderTooShort,
    #[error("annotation text header (type 4) not found in header chain")]
    MissingAnnotation,
    #[error("annotation filename {0:?} doesn't match a known naming convention")]
    UnrecognizedFilename(String),
    #[error("header chain record at offset {0} has a length shorter than its own header")]
    MalformedHeaderChain(usize),
}

#[derive(Debug, Error)]
pub enum DemuxError {
    #[error("I/O failure writing output: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Xrit(#[from] XritError),
}
