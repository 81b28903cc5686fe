//! Binary layout of a matrix snapshot image.
//!
//! ```text
//! [magic: u32 LE = "PSM1"][matrix_count: u32 LE]
//! repeated matrix_count times:
//!   [body_len: u32 LE][crc32: u32 LE][body ...]
//!
//! body: matrix_id u32 | clock_count u32 | (task u32, clock u32)*
//!       | row_count u64 | (row u64, value f64)*
//! ```
//!
//! All integers are little-endian. The CRC covers the body only. Unlike a
//! WAL, a snapshot image is only ever read whole, so a truncated record,
//! a checksum mismatch or bytes after the last record are all corruption.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use crc32fast::Hasher as Crc32;
use std::collections::BTreeMap;
use std::io::{self, Read, Write};

use crate::{MatrixError, MatrixId, MatrixPartition};

/// "PSM1" read as a little-endian u32.
pub const MATRIX_MAGIC: u32 = 0x314D_5350;

/// Upper bound on a single matrix record, to reject garbage lengths before
/// allocating.
pub const MAX_RECORD_SIZE: u32 = 256 * 1024 * 1024;

/// Writes every partition in `matrices` to `out`.
pub fn encode(
    matrices: &BTreeMap<MatrixId, MatrixPartition>,
    out: &mut dyn Write,
) -> Result<(), MatrixError> {
    let count = u32::try_from(matrices.len())
        .map_err(|_| MatrixError::Corrupt("too many matrices".to_string()))?;
    out.write_u32::<LittleEndian>(MATRIX_MAGIC)?;
    out.write_u32::<LittleEndian>(count)?;

    let mut body = Vec::with_capacity(256);
    for (&id, partition) in matrices {
        body.clear();
        body.write_u32::<LittleEndian>(id)?;
        body.write_u32::<LittleEndian>(partition.clocks.len() as u32)?;
        for (&task, &clock) in &partition.clocks {
            body.write_u32::<LittleEndian>(task)?;
            body.write_u32::<LittleEndian>(clock)?;
        }
        body.write_u64::<LittleEndian>(partition.rows.len() as u64)?;
        for (&row, &value) in &partition.rows {
            body.write_u64::<LittleEndian>(row)?;
            body.write_f64::<LittleEndian>(value)?;
        }

        if body.len() as u64 > MAX_RECORD_SIZE as u64 {
            return Err(MatrixError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("matrix {} record exceeds {} bytes", id, MAX_RECORD_SIZE),
            )));
        }

        let mut hasher = Crc32::new();
        hasher.update(&body);
        out.write_u32::<LittleEndian>(body.len() as u32)?;
        out.write_u32::<LittleEndian>(hasher.finalize())?;
        out.write_all(&body)?;
    }
    Ok(())
}

/// Reads a full image from `input`.
pub fn decode(input: &mut dyn Read) -> Result<BTreeMap<MatrixId, MatrixPartition>, MatrixError> {
    let magic = read_u32(input, "magic")?;
    if magic != MATRIX_MAGIC {
        return Err(MatrixError::Corrupt(format!("bad magic 0x{:08x}", magic)));
    }
    let count = read_u32(input, "matrix count")?;

    let mut matrices = BTreeMap::new();
    let mut body = Vec::new();
    for i in 0..count {
        let body_len = read_u32(input, "record length")?;
        if body_len > MAX_RECORD_SIZE {
            return Err(MatrixError::Corrupt(format!(
                "record {} length {} exceeds limit",
                i, body_len
            )));
        }
        let crc = read_u32(input, "record crc")?;

        body.clear();
        body.resize(body_len as usize, 0);
        input.read_exact(&mut body).map_err(|e| truncated(e, "record body"))?;

        let mut hasher = Crc32::new();
        hasher.update(&body);
        if hasher.finalize() != crc {
            return Err(MatrixError::Corrupt(format!("record {} checksum mismatch", i)));
        }

        let (id, partition) = decode_body(&body)
            .map_err(|e| MatrixError::Corrupt(format!("record {}: {}", i, e)))?;
        if matrices.insert(id, partition).is_some() {
            return Err(MatrixError::Corrupt(format!("duplicate matrix {}", id)));
        }
    }

    let mut probe = [0u8; 1];
    loop {
        match input.read(&mut probe) {
            Ok(0) => break,
            Ok(_) => return Err(MatrixError::Corrupt("trailing bytes after last record".to_string())),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(MatrixError::Io(e)),
        }
    }

    Ok(matrices)
}

fn decode_body(body: &[u8]) -> io::Result<(MatrixId, MatrixPartition)> {
    let mut br = body;
    let id = br.read_u32::<LittleEndian>()?;

    let mut partition = MatrixPartition::default();
    let clock_count = br.read_u32::<LittleEndian>()?;
    for _ in 0..clock_count {
        let task = br.read_u32::<LittleEndian>()?;
        let clock = br.read_u32::<LittleEndian>()?;
        partition.clocks.insert(task, clock);
    }

    let row_count = br.read_u64::<LittleEndian>()?;
    // each row takes 16 bytes; guard before looping on a garbage count
    if row_count > (br.len() as u64) / 16 {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "row count exceeds body"));
    }
    for _ in 0..row_count {
        let row = br.read_u64::<LittleEndian>()?;
        let value = br.read_f64::<LittleEndian>()?;
        partition.rows.insert(row, value);
    }

    if !br.is_empty() {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "unused bytes in record"));
    }
    Ok((id, partition))
}

fn read_u32(input: &mut dyn Read, what: &str) -> Result<u32, MatrixError> {
    input
        .read_u32::<LittleEndian>()
        .map_err(|e| truncated(e, what))
}

fn truncated(e: io::Error, what: &str) -> MatrixError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        MatrixError::Corrupt(format!("truncated {}", what))
    } else {
        MatrixError::Io(e)
    }
}
