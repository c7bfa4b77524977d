//! On-disk framing of the collection file.
//!
//! ```text
//! header:  b"DRDB" | version: u16 LE
//! frame:   len: u64 LE | fnv1a64(payload): u64 LE | payload: [u8; len]
//! ```

use super::error::StoreError;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

pub const MAGIC: &[u8; 4] = b"DRDB";
pub const VERSION: u16 = 1;
pub const FILE_HEADER_LEN: u64 = 6;
pub const FRAME_HEADER_LEN: u64 = 16;

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

pub fn fnv1a64(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET_BASIS, |hash, &b| {
        (hash ^ u64::from(b)).wrapping_mul(FNV_PRIME)
    })
}

pub fn write_file_header(writer: &mut impl Write) -> io::Result<()> {
    writer.write_all(MAGIC)?;
    writer.write_u16::<LittleEndian>(VERSION)
}

/// Reads and checks the file header. `Ok(false)` means the magic did not match.
pub fn read_file_header(reader: &mut impl Read) -> Result<bool, StoreError> {
    let mut magic = [0u8; 4];
    if let Err(e) = reader.read_exact(&mut magic) {
        return match e.kind() {
            io::ErrorKind::UnexpectedEof => Ok(false),
            _ => Err(e.into()),
        };
    }
    if &magic != MAGIC {
        return Ok(false);
    }
    let version = reader.read_u16::<LittleEndian>()?;
    if version != VERSION {
        return Err(StoreError::UnsupportedVersion {
            found: version,
            expected: VERSION,
        });
    }
    Ok(true)
}

/// Encodes a complete frame (header and payload) into one buffer so it can be
/// appended with a single write.
pub fn encode_frame(payload: &[u8]) -> io::Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(FRAME_HEADER_LEN as usize + payload.len());
    buf.write_u64::<LittleEndian>(payload.len() as u64)?;
    buf.write_u64::<LittleEndian>(fnv1a64(payload))?;
    buf.extend_from_slice(payload);
    Ok(buf)
}

#[derive(Debug, PartialEq, Eq)]
pub enum FrameRead {
    Frame(Vec<u8>),
    /// Clean end of file on a frame boundary.
    End,
    /// The trailing frame is incomplete or fails its checksum.
    Torn,
}

/// Reads the frame starting at `offset`. `file_len` lets a bad checksum on
/// the last frame be told apart from corruption in the middle of the log.
pub fn read_frame(
    reader: &mut impl Read,
    offset: u64,
    file_len: u64,
) -> Result<FrameRead, StoreError> {
    if offset == file_len {
        return Ok(FrameRead::End);
    }
    if file_len - offset < FRAME_HEADER_LEN {
        return Ok(FrameRead::Torn);
    }
    let len = reader.read_u64::<LittleEndian>()?;
    let checksum = reader.read_u64::<LittleEndian>()?;
    let available = file_len - offset - FRAME_HEADER_LEN;
    if len > available {
        return Ok(FrameRead::Torn);
    }
    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload)?;
    if fnv1a64(&payload) != checksum {
        if len == available {
            return Ok(FrameRead::Torn);
        }
        return Err(StoreError::Corrupt {
            offset,
            reason: "payload checksum mismatch".into(),
        });
    }
    Ok(FrameRead::Frame(payload))
}
