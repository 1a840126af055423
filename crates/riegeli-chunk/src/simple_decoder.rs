//! Simple Chunk Decoding
//!
//! Inverse of the simple encoder: decompress, rebuild the cumulative
//! record ends from the size varints, validate everything against the
//! chunk header, and expose the records as one flat buffer plus an end
//! vector. All format violations are `DataLoss` so the record layer can
//! skip the chunk and keep reading.

use bytes::Bytes;
use riegeli_core::{varint, Error, Result};

use crate::chunk_decoder::DecodedRecords;
use crate::decompressor;
use crate::types::CompressionType;

/// Decodes a simple chunk payload.
///
/// `pos` is the chunk's file position, used in error messages.
pub fn decode(
    payload: &Bytes,
    num_records: u64,
    decoded_data_size: u64,
    pos: u64,
) -> Result<DecodedRecords> {
    let Some((&type_byte, compressed)) = payload.split_first() else {
        return Err(Error::data_loss(format!("empty simple chunk at {pos}")));
    };
    let kind = CompressionType::try_from(type_byte)?;
    let stream = decompressor::decompress_fully(kind, compressed, pos)?;

    let mut cursor = stream.as_ref();
    let mut limits = Vec::with_capacity(num_records.min(1 << 20) as usize);
    let mut end = 0u64;
    for index in 0..num_records {
        let size = varint::read_u64(&mut cursor).ok_or_else(|| {
            Error::data_loss(format!(
                "truncated record sizes in chunk at {pos} (record {index})"
            ))
        })?;
        end = end.checked_add(size).ok_or_else(|| {
            Error::data_loss(format!("record ends overflow in chunk at {pos}"))
        })?;
        if end > decoded_data_size {
            return Err(Error::data_loss(format!(
                "record ends exceed decoded size in chunk at {pos}"
            )));
        }
        limits.push(end as usize);
    }

    let values_at = stream.len() - cursor.len();
    let values = stream.slice(values_at..);
    if values.len() as u64 != end {
        return Err(Error::data_loss(format!(
            "record bytes length {} does not match final record end {} in chunk at {pos}",
            values.len(),
            end
        )));
    }
    if end != decoded_data_size {
        return Err(Error::data_loss(format!(
            "decoded size mismatch in chunk at {pos}: got {end}, header says {decoded_data_size}"
        )));
    }

    Ok(DecodedRecords::new(values, limits))
}
