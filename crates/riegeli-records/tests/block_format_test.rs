//! Physical layout invariants: block headers at every 64 KiB boundary
//! point at real chunk boundaries, and padding aligns files exactly.

use bytes::Bytes;
use riegeli_core::{BytesReader, ChainWriter};
use riegeli_records::{
    BlockHeader, ChunkReader, RecordWriter, RecordWriterOptions, BLOCK_SIZE,
};

/// A file big enough to cross several block boundaries, with varied
/// record sizes so chunk boundaries fall at odd offsets.
fn large_file() -> Vec<u8> {
    let options = RecordWriterOptions {
        chunk_size: 10_000,
        compression: riegeli_chunk::CompressorOptions::uncompressed(),
        ..Default::default()
    };
    let mut writer = RecordWriter::new(ChainWriter::new(), options).unwrap();
    for i in 0..2_000u32 {
        let record = vec![(i % 251) as u8; 17 + (i as usize * 13) % 400];
        writer.write_record(&record).unwrap();
    }
    writer.close().unwrap().into_chain().to_bytes().to_vec()
}

/// All chunk begin offsets, by walking the chunks.
fn chunk_begins(file: &[u8]) -> Vec<u64> {
    let mut reader = ChunkReader::new(BytesReader::new(Bytes::from(file.to_vec())));
    let mut begins = Vec::new();
    while reader.read_chunk().unwrap().is_some() {
        begins.push(reader.pos());
    }
    let eof = begins.pop();
    assert_eq!(eof, Some(file.len() as u64));
    let mut all = vec![0];
    all.extend(begins);
    all
}

#[test]
fn every_block_boundary_carries_a_consistent_header() {
    let file = large_file();
    assert!(
        file.len() as u64 > 4 * BLOCK_SIZE,
        "test file too small to exercise boundaries"
    );
    let begins = chunk_begins(&file);

    let mut boundary = 0u64;
    while boundary < file.len() as u64 {
        let header = BlockHeader::decode(&file[boundary as usize..], boundary).unwrap();

        // previous_chunk points at a real chunk begin at or before the
        // boundary; next_chunk points at a real chunk begin (or EOF).
        let previous = boundary - header.previous_chunk;
        assert!(
            begins.contains(&previous),
            "boundary {boundary}: previous {previous} is not a chunk begin"
        );
        let next = boundary + header.next_chunk;
        assert!(
            begins.contains(&next) || next == file.len() as u64,
            "boundary {boundary}: next {next} is not a chunk begin"
        );
        boundary += BLOCK_SIZE;
    }
}

#[test]
fn seeking_from_any_boundary_reaches_a_valid_chunk() {
    let file = large_file();
    let begins = chunk_begins(&file);
    let mut reader = ChunkReader::new(BytesReader::new(Bytes::from(file.clone())));

    let mut boundary = 0u64;
    while boundary < file.len() as u64 {
        reader.seek_to_chunk_containing(boundary).unwrap();
        assert!(
            begins.contains(&reader.pos()),
            "boundary {boundary} led to {}",
            reader.pos()
        );
        // The chunk there reads cleanly.
        assert!(reader.read_chunk().unwrap().is_some());
        boundary += BLOCK_SIZE;
    }
}

#[test]
fn padded_files_align_and_read_back() {
    let options = RecordWriterOptions {
        pad_to_block_boundary: true,
        chunk_size: 3_000,
        ..Default::default()
    };
    let mut writer = RecordWriter::new(ChainWriter::new(), options).unwrap();
    let mut expected = Vec::new();
    for i in 0..50u8 {
        let record = vec![i; 100];
        writer.write_record(&record).unwrap();
        expected.push(record);
        if i % 10 == 9 {
            // Every flush re-pads; files stay block-aligned throughout.
            writer.flush().unwrap();
        }
    }
    let file = writer.close().unwrap().into_chain().to_bytes();
    assert_eq!(file.len() as u64 % BLOCK_SIZE, 0);

    let mut reader = riegeli_records::RecordReader::new(
        BytesReader::new(file),
        riegeli_records::RecordReaderOptions::default(),
    );
    for record in &expected {
        assert_eq!(reader.read_record().unwrap().unwrap().as_ref(), &record[..]);
    }
    assert!(reader.read_record().unwrap().is_none());
}
