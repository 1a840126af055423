//! Corruption and recovery scenarios: damaged payloads, truncation,
//! and the two recovery paths (chunk reader vs chunk decoder).

use bytes::Bytes;
use riegeli_chunk::{Chunk, ChunkType, CompressorOptions, CHUNK_HEADER_SIZE};
use riegeli_core::{BytesReader, Chain, ChainWriter};
use riegeli_records::{
    ChunkWriter, RecordReader, RecordReaderOptions, RecordWriter, RecordWriterOptions,
    Recoverable, BLOCK_HEADER_SIZE,
};

/// Three uncompressed chunks of distinguishable records.
fn three_chunk_file() -> (Vec<u8>, Vec<Vec<u8>>) {
    let records: Vec<Vec<u8>> = (0..30u8).map(|i| vec![i; 50]).collect();
    let options = RecordWriterOptions {
        compression: CompressorOptions::uncompressed(),
        chunk_size: 500, // 10 records per chunk
        ..Default::default()
    };
    let mut writer = RecordWriter::new(ChainWriter::new(), options).unwrap();
    for record in &records {
        writer.write_record(record).unwrap();
    }
    let file = writer.close().unwrap().into_chain().to_bytes().to_vec();
    (file, records)
}

/// Begin offsets of all chunks in `file`, including the signature.
fn chunk_begins(file: &[u8]) -> Vec<u64> {
    let mut reader = riegeli_records::ChunkReader::new(BytesReader::new(
        Bytes::from(file.to_vec()),
    ));
    let mut begins = Vec::new();
    loop {
        begins.push(reader.pos());
        match reader.read_chunk().unwrap() {
            Some(_) => {}
            None => break,
        }
    }
    begins.pop(); // end-of-file position
    begins
}

fn reader_over(file: Vec<u8>) -> RecordReader<BytesReader> {
    RecordReader::new(
        BytesReader::new(Bytes::from(file)),
        RecordReaderOptions::default(),
    )
}

// ---------------------------------------------------------------
// Chunk-reader recovery (damaged bytes, truncation)
// ---------------------------------------------------------------

#[test]
fn corrupt_middle_chunk_skips_exactly_that_chunk() {
    let (mut file, records) = three_chunk_file();
    let begins = chunk_begins(&file);
    assert_eq!(begins.len(), 4); // signature + 3 data chunks

    // Flip one byte in the middle of the second data chunk's payload.
    let target = begins[2] + CHUNK_HEADER_SIZE + 250;
    file[target as usize] ^= 0x01;

    let mut reader = reader_over(file);
    // First chunk reads fine.
    for i in 0..10u8 {
        assert_eq!(reader.read_record().unwrap().unwrap().as_ref(), &[i; 50][..]);
    }
    // Second chunk fails with a recoverable chunk-reader error.
    let err = reader.read_record().unwrap_err();
    assert!(err.is_recoverable());
    assert_eq!(reader.recoverable(), Recoverable::ChunkReader);

    let region = reader.recover().unwrap().unwrap();
    assert_eq!(region.begin(), begins[2]);
    assert_eq!(region.end(), begins[3]);
    assert!(region.begin() <= target && target < region.end());

    // Third chunk records follow undisturbed.
    for record in &records[20..] {
        assert_eq!(reader.read_record().unwrap().unwrap().as_ref(), &record[..]);
    }
    assert!(reader.read_record().unwrap().is_none());
}

#[test]
fn truncated_file_recovers_to_healthy_eof() {
    let (mut file, _) = three_chunk_file();
    let begins = chunk_begins(&file);
    // Cut in the middle of the last chunk.
    let cut = (begins[3] + CHUNK_HEADER_SIZE + 100) as usize;
    file.truncate(cut);

    let mut reader = reader_over(file);
    for _ in 0..20 {
        reader.read_record().unwrap().unwrap();
    }
    assert!(reader.read_record().unwrap_err().is_recoverable());
    let region = reader.recover().unwrap().unwrap();
    assert_eq!(region.begin(), begins[3]);
    assert_eq!(region.end(), cut as u64);
    // No more data, but the reader is healthy.
    assert!(reader.read_record().unwrap().is_none());
    assert_eq!(reader.recoverable(), Recoverable::None);
}

#[test]
fn corrupt_chunk_header_resynchronizes_at_block_boundary() {
    // One chunk spanning several blocks, then a small one.
    let big: Vec<u8> = vec![7; 150_000];
    let options = RecordWriterOptions {
        compression: CompressorOptions::uncompressed(),
        chunk_size: 1, // close each chunk after one record
        ..Default::default()
    };
    let mut writer = RecordWriter::new(ChainWriter::new(), options).unwrap();
    writer.write_record(&big).unwrap();
    writer.write_record(b"tail-record").unwrap();
    let mut file = writer.close().unwrap().into_chain().to_bytes().to_vec();

    // Destroy the big chunk's header so its extent is unknown.
    let begin = (BLOCK_HEADER_SIZE + CHUNK_HEADER_SIZE) as usize;
    for byte in &mut file[begin + 8..begin + 16] {
        *byte ^= 0xFF;
    }

    let mut reader = reader_over(file);
    assert!(reader.read_record().unwrap_err().is_recoverable());
    let region = reader.recover().unwrap().unwrap();
    assert!(region.length() >= big.len() as u64);
    assert_eq!(
        reader.read_record().unwrap().unwrap().as_ref(),
        b"tail-record"
    );
}

// ---------------------------------------------------------------
// Chunk-decoder recovery (valid hashes, bad payload)
// ---------------------------------------------------------------

/// A chunk whose hashes verify but whose payload cannot decode.
fn undecodable_chunk() -> Chunk {
    // Claims 5 records, carries an empty uncompressed stream.
    Chunk::new(ChunkType::Simple, 5, 100, Chain::from(&[0u8][..])).unwrap()
}

#[test]
fn bad_payload_under_valid_hashes_is_decoder_recovery() {
    let mut chunk_writer = ChunkWriter::new(ChainWriter::new());
    chunk_writer.write_chunk(&Chunk::file_signature()).unwrap();
    let bad_begin = chunk_writer.pos();
    chunk_writer.write_chunk(&undecodable_chunk()).unwrap();
    let bad_end = chunk_writer.pos();
    let good = {
        let mut encoder = riegeli_chunk::ChunkEncoder::new(
            false,
            CompressorOptions::uncompressed(),
        );
        encoder.add_record(b"survivor").unwrap();
        encoder.encode().unwrap()
    };
    chunk_writer.write_chunk(&good).unwrap();
    let file = chunk_writer.into_dest().into_chain().to_bytes().to_vec();

    let mut reader = reader_over(file);
    let err = reader.read_record().unwrap_err();
    assert!(err.is_recoverable());
    assert_eq!(reader.recoverable(), Recoverable::ChunkDecoder);

    let region = reader.recover().unwrap().unwrap();
    assert_eq!(region.begin(), bad_begin);
    assert_eq!(region.end(), bad_end);

    assert_eq!(reader.read_record().unwrap().unwrap().as_ref(), b"survivor");
    assert!(reader.read_record().unwrap().is_none());
}

// ---------------------------------------------------------------
// Automatic recovery via callback
// ---------------------------------------------------------------

#[test]
fn recovery_callback_skips_automatically() {
    let (mut file, records) = three_chunk_file();
    let begins = chunk_begins(&file);
    file[(begins[1] + CHUNK_HEADER_SIZE + 10) as usize] ^= 0xFF;

    let skipped = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = skipped.clone();
    let options = RecordReaderOptions {
        recovery: Some(Box::new(move |region| {
            sink.lock().unwrap().push(*region);
        })),
        ..Default::default()
    };
    let mut reader = RecordReader::new(BytesReader::new(Bytes::from(file)), options);

    let mut restored = Vec::new();
    while let Some(record) = reader.read_record().unwrap() {
        restored.push(record);
    }
    // The first data chunk was skipped silently; the rest came through.
    assert_eq!(restored.len(), 20);
    assert_eq!(restored[0].as_ref(), &records[10][..]);

    let regions = skipped.lock().unwrap();
    assert_eq!(regions.len(), 1);
    assert_eq!(regions[0].begin(), begins[1]);
    assert_eq!(regions[0].end(), begins[2]);
}
