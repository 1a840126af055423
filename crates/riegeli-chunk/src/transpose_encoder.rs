//! Transposed Chunk Encoding
//!
//! For batches of similar messages, storing the same field across all
//! records next to each other compresses far better than storing records
//! whole, and lets a reader skip fields it never asked for. The encoder
//! takes each record apart along the proto wire format and regroups it
//! column-wise:
//!
//! - a **tag dictionary** interning each distinct `(parent, tag)` node
//! - per-node **value buffers** (varints, fixed-width values, byte-field
//!   lengths and contents)
//! - a **tag sequence**: per record, which nodes appeared in what order,
//!   as dictionary references, with `0` closing a submessage/group scope
//!   or, at root, the end of the record
//!
//! Records that do not parse as wire-format messages (the container never
//! requires them to) are stored intact in a dedicated non-proto column
//! and referenced by the `1` op. Reconstruction is byte-exact either way.
//!
//! The stream layout is: dictionary, buffer table, buffer contents, tag
//! sequence, all inside one compressed payload after the
//! compression-type byte.

use std::collections::HashMap;

use bytes::{BufMut, BytesMut};
use riegeli_core::{varint, Chain, Error, Result};

use crate::compressor::{Compressor, CompressorOptions};
use crate::header::Chunk;
use crate::types::ChunkType;
use crate::wire;

/// Closes the current scope, or ends the record at root.
pub(crate) const OP_CLOSE: u64 = 0;
/// Emits one record from the non-proto column; root scope only.
pub(crate) const OP_NON_PROTO: u64 = 1;
/// Ops at and above this reference dictionary entry `op - OP_ENTRY_BASE`.
pub(crate) const OP_ENTRY_BASE: u64 = 2;

struct Entry {
    parent: Option<u32>,
    tag: u32,
    /// Submessage or group: opens a scope instead of carrying a value.
    structural: bool,
    /// Varint bytes / fixed-width values / byte-field contents.
    values: BytesMut,
    /// Byte-field lengths (wire type 2 leaves only).
    lengths: BytesMut,
}

/// Accumulates records and encodes them as a transposed chunk.
pub struct TransposeEncoder {
    compressor: Compressor,
    entries: Vec<Entry>,
    interned: HashMap<(u32, u32, bool), u32>,
    non_proto_lengths: BytesMut,
    non_proto_values: Chain,
    ops: BytesMut,
    num_records: u64,
    decoded_size: u64,
}

impl TransposeEncoder {
    pub fn new(options: CompressorOptions) -> Self {
        Self {
            compressor: Compressor::new(options),
            entries: Vec::new(),
            interned: HashMap::new(),
            non_proto_lengths: BytesMut::new(),
            non_proto_values: Chain::new(),
            ops: BytesMut::new(),
            num_records: 0,
            decoded_size: 0,
        }
    }

    pub fn add_record(&mut self, record: &[u8]) -> Result<()> {
        if wire::check_message(record, 0) {
            let consumed = self.encode_fields(record, None, 0, None)?;
            if consumed != record.len() {
                return Err(Error::internal("message walk left trailing bytes"));
            }
        } else {
            varint::write_u64(&mut self.ops, OP_NON_PROTO);
            varint::write_u64(&mut self.non_proto_lengths, record.len() as u64);
            self.non_proto_values.append_slice(record);
        }
        varint::write_u64(&mut self.ops, OP_CLOSE);
        self.num_records += 1;
        self.decoded_size += record.len() as u64;
        Ok(())
    }

    pub fn num_records(&self) -> u64 {
        self.num_records
    }

    pub fn decoded_size(&self) -> u64 {
        self.decoded_size
    }

    pub fn is_empty(&self) -> bool {
        self.num_records == 0
    }

    /// Finishes the batch into a transposed chunk.
    pub fn encode(self) -> Result<Chunk> {
        let num_records = self.num_records;
        self.encode_as(ChunkType::Transposed, num_records)
    }

    /// Finishes with an explicit chunk type and record count.
    ///
    /// The file-metadata chunk is a one-record transposed body whose
    /// header nevertheless declares zero records; this is its entry
    /// point.
    pub fn encode_as(self, chunk_type: ChunkType, num_records: u64) -> Result<Chunk> {
        let decoded_size = self.decoded_size;
        let compressor = self.compressor;
        let stream = self.build_stream();

        let mut data = Chain::new();
        let mut type_byte = BytesMut::with_capacity(1);
        type_byte.put_u8(compressor.kind() as u8);
        data.append_bytes(type_byte.freeze());
        data.append_chain(compressor.compress(&stream)?);

        Chunk::new(chunk_type, num_records, decoded_size, data)
    }

    /// Walks the fields of one message level, filling buffers and ops.
    ///
    /// Returns the number of bytes consumed. With `end_group` set, stops
    /// after the matching group-close tag. `record` has passed
    /// [`wire::check_message`], so malformed input here is an internal
    /// error, not data loss.
    fn encode_fields(
        &mut self,
        data: &[u8],
        parent: Option<u32>,
        depth: u32,
        end_group: Option<u32>,
    ) -> Result<usize> {
        let mut pos = 0usize;
        while pos < data.len() {
            let (tag_raw, tag_len) = wire::read_varint(&data[pos..])
                .ok_or_else(|| Error::internal("unreadable tag in validated message"))?;
            let tag = tag_raw as u32;
            let field = wire::field_number(tag);
            pos += tag_len;
            match wire::wire_type(tag) {
                wire::WIRETYPE_VARINT => {
                    let (_, len) = wire::read_varint(&data[pos..])
                        .ok_or_else(|| Error::internal("unreadable varint value"))?;
                    let id = self.intern(parent, tag, false);
                    self.push_entry_op(id);
                    self.entries[id as usize].values.put_slice(&data[pos..pos + len]);
                    pos += len;
                }
                wire::WIRETYPE_FIXED64 => {
                    let id = self.intern(parent, tag, false);
                    self.push_entry_op(id);
                    self.entries[id as usize].values.put_slice(&data[pos..pos + 8]);
                    pos += 8;
                }
                wire::WIRETYPE_FIXED32 => {
                    let id = self.intern(parent, tag, false);
                    self.push_entry_op(id);
                    self.entries[id as usize].values.put_slice(&data[pos..pos + 4]);
                    pos += 4;
                }
                wire::WIRETYPE_LENGTH_DELIMITED => {
                    let (len, len_len) = wire::read_varint(&data[pos..])
                        .ok_or_else(|| Error::internal("unreadable length prefix"))?;
                    pos += len_len;
                    let value = &data[pos..pos + len as usize];
                    pos += len as usize;
                    if !value.is_empty()
                        && depth < wire::MAX_RECURSION_DEPTH
                        && wire::check_message(value, depth + 1)
                    {
                        let id = self.intern(parent, tag, true);
                        self.push_entry_op(id);
                        self.encode_fields(value, Some(id), depth + 1, None)?;
                        varint::write_u64(&mut self.ops, OP_CLOSE);
                    } else {
                        let id = self.intern(parent, tag, false);
                        self.push_entry_op(id);
                        let entry = &mut self.entries[id as usize];
                        varint::write_u64(&mut entry.lengths, value.len() as u64);
                        entry.values.put_slice(value);
                    }
                }
                wire::WIRETYPE_START_GROUP => {
                    let id = self.intern(parent, tag, true);
                    self.push_entry_op(id);
                    let consumed =
                        self.encode_fields(&data[pos..], Some(id), depth + 1, Some(field))?;
                    pos += consumed;
                    varint::write_u64(&mut self.ops, OP_CLOSE);
                }
                wire::WIRETYPE_END_GROUP => {
                    if end_group == Some(field) {
                        return Ok(pos);
                    }
                    return Err(Error::internal("stray group close in validated message"));
                }
                _ => return Err(Error::internal("reserved wire type in validated message")),
            }
        }
        if end_group.is_some() {
            return Err(Error::internal("unterminated group in validated message"));
        }
        Ok(pos)
    }

    fn intern(&mut self, parent: Option<u32>, tag: u32, structural: bool) -> u32 {
        let key = (parent.map_or(0, |p| p + 1), tag, structural);
        if let Some(&id) = self.interned.get(&key) {
            return id;
        }
        let id = self.entries.len() as u32;
        self.entries.push(Entry {
            parent,
            tag,
            structural,
            values: BytesMut::new(),
            lengths: BytesMut::new(),
        });
        self.interned.insert(key, id);
        id
    }

    fn push_entry_op(&mut self, id: u32) {
        varint::write_u64(&mut self.ops, id as u64 + OP_ENTRY_BASE);
    }

    /// Lays out dictionary, buffer table, buffer contents and ops.
    fn build_stream(self) -> Chain {
        let mut head = BytesMut::new();
        varint::write_u64(&mut head, self.entries.len() as u64);
        for entry in &self.entries {
            varint::write_u64(&mut head, entry.parent.map_or(0, |p| p as u64 + 1));
            varint::write_u64(&mut head, entry.tag as u64);
            let kind = u64::from(
                entry.structural && wire::wire_type(entry.tag) == wire::WIRETYPE_LENGTH_DELIMITED,
            );
            varint::write_u64(&mut head, kind);
        }

        // Buffer table, then contents, in the fixed derived order.
        let mut contents = Chain::new();
        varint::write_u64(&mut head, self.non_proto_lengths.len() as u64);
        contents.append_slice(&self.non_proto_lengths);
        varint::write_u64(&mut head, self.non_proto_values.len() as u64);
        contents.append_chain(self.non_proto_values);
        for entry in self.entries {
            if entry.structural {
                continue;
            }
            if wire::wire_type(entry.tag) == wire::WIRETYPE_LENGTH_DELIMITED {
                varint::write_u64(&mut head, entry.lengths.len() as u64);
                contents.append_bytes(entry.lengths.freeze());
            }
            varint::write_u64(&mut head, entry.values.len() as u64);
            contents.append_bytes(entry.values.freeze());
        }

        let mut stream = Chain::new();
        stream.append_bytes(head.freeze());
        stream.append_chain(contents);
        stream.append_bytes(self.ops.freeze());
        stream
    }
}
