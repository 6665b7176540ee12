//! Big-endian cursor and zlib helpers for block records.

use flate2::{Decompress, FlushDecompress, Status};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReadError {
    #[error("truncated at byte {offset}: wanted {wanted} more bytes, {left} left")]
    Truncated { offset: usize, wanted: usize, left: usize },
    #[error("zlib stream: {0}")]
    Inflate(#[from] flate2::DecompressError),
    #[error("zlib stream ended early after {0} bytes")]
    UnexpectedEnd(usize),
    #[error("invalid utf-8 in name: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn bytes(&mut self, n: usize) -> Result<&'a [u8], ReadError> {
        let left = self.data.len() - self.pos;
        if n > left {
            return Err(ReadError::Truncated { offset: self.pos, wanted: n, left });
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    pub fn skip(&mut self, n: usize) -> Result<(), ReadError> {
        self.bytes(n).map(|_| ())
    }

    pub fn u8(&mut self) -> Result<u8, ReadError> {
        Ok(self.bytes(1)?[0])
    }

    pub fn u16(&mut self) -> Result<u16, ReadError> {
        let b = self.bytes(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn u32(&mut self) -> Result<u32, ReadError> {
        let b = self.bytes(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn string(&mut self, n: usize) -> Result<String, ReadError> {
        Ok(String::from_utf8(self.bytes(n)?.to_vec())?)
    }
}

/// Inflate one zlib stream from the front of `input`.
///
/// Returns the payload and the number of input bytes the stream occupied,
/// so the caller can continue parsing whatever follows it.
pub fn inflate(input: &[u8], size_hint: usize) -> Result<(Vec<u8>, usize), ReadError> {
    let mut z = Decompress::new(true);
    let mut out = Vec::with_capacity(size_hint.max(64));

    loop {
        if out.len() == out.capacity() {
            out.reserve(out.capacity());
        }
        let (before_in, before_out) = (z.total_in(), z.total_out());
        let status = z.decompress_vec(&input[before_in as usize..], &mut out, FlushDecompress::None)?;

        if status == Status::StreamEnd {
            return Ok((out, z.total_in() as usize));
        }
        // No progress with spare output room: input ran out mid-stream.
        if z.total_in() == before_in && z.total_out() == before_out && out.len() < out.capacity() {
            return Err(ReadError::UnexpectedEnd(input.len()));
        }
    }
}
