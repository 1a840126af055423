//! Transposed Chunk Decoding
//!
//! A small interpreter over the transposed stream, in two passes:
//!
//! 1. **Forward validation**: parse the tag dictionary and the buffer
//!    table, pre-split every buffer into per-occurrence values, then walk
//!    the tag sequence start to end, checking scope discipline, parent
//!    links and value counts, while assigning each surviving op its
//!    value and applying the field projection. A projected-out subtree
//!    still consumes its ops and values; it just contributes nothing.
//! 2. **Reverse replay**: records are rebuilt last-to-first through a
//!    [`ChainBackwardWriter`]. Within a record the surviving ops run in
//!    reverse, so by the time a submessage's opening tag is reached the
//!    byte length of its content is known and can be prepended as the
//!    length prefix. Group closes are emitted when their scope is left
//!    (reverse: entered), group opens when it is entered.
//!
//! Every format violation is `DataLoss`: the chunk is skippable, the
//! reader survives.

use bytes::Bytes;
use riegeli_core::{varint, ChainBackwardWriter, Error, Result};

use crate::chunk_decoder::DecodedRecords;
use crate::decompressor;
use crate::projection::FieldProjection;
use crate::transpose_encoder::{OP_CLOSE, OP_ENTRY_BASE, OP_NON_PROTO};
use crate::types::CompressionType;
use crate::wire;

/// One tag-dictionary node.
struct Entry {
    parent: Option<u32>,
    tag: u32,
    structural: bool,
    /// Projection verdict for the node's full field path.
    materialized: bool,
}

/// Pre-split values of one buffer: offsets of each occurrence.
struct Values {
    buffer: Bytes,
    /// `bounds[i]..bounds[i + 1]` is occurrence `i`.
    bounds: Vec<usize>,
}

impl Values {
    fn empty() -> Self {
        Values {
            buffer: Bytes::new(),
            bounds: vec![0],
        }
    }

    fn count(&self) -> usize {
        self.bounds.len() - 1
    }

    fn get(&self, index: usize) -> Bytes {
        self.buffer.slice(self.bounds[index]..self.bounds[index + 1])
    }
}

/// An op that survived validation and projection.
enum PlanOp {
    Leaf { entry: u32, value: u32 },
    NonProto { value: u32 },
    Enter { entry: u32 },
    Exit { entry: u32 },
}

/// Decodes a transposed chunk payload located at file position `pos`.
pub fn decode(
    payload: &Bytes,
    num_records: u64,
    decoded_data_size: u64,
    projection: &FieldProjection,
    pos: u64,
) -> Result<DecodedRecords> {
    let Some((&type_byte, compressed)) = payload.split_first() else {
        return Err(Error::data_loss(format!("empty transposed chunk at {pos}")));
    };
    let kind = CompressionType::try_from(type_byte)?;
    let stream = decompressor::decompress_fully(kind, compressed, pos)?;

    let mut parser = Parser {
        stream: &stream,
        at: 0,
        pos,
    };
    let entries = parser.parse_dictionary(projection)?;
    let (non_proto, values) = parser.parse_buffers(&entries)?;
    let (plan, bounds) = parser.parse_ops(&entries, &non_proto, &values, num_records)?;

    replay(
        &entries,
        &non_proto,
        &values,
        &plan,
        &bounds,
        projection,
        decoded_data_size,
        pos,
    )
}

struct Parser<'a> {
    stream: &'a Bytes,
    at: usize,
    pos: u64,
}

impl<'a> Parser<'a> {
    fn corrupt(&self, what: &str) -> Error {
        Error::data_loss(format!("{what} in transposed chunk at {}", self.pos))
    }

    fn read_varint(&mut self, what: &str) -> Result<u64> {
        let (value, len) = wire::read_varint(&self.stream[self.at..])
            .ok_or_else(|| self.corrupt(what))?;
        self.at += len;
        Ok(value)
    }

    fn parse_dictionary(&mut self, projection: &FieldProjection) -> Result<Vec<Entry>> {
        let num_entries = self.read_varint("truncated dictionary size")?;
        if num_entries > (self.stream.len() - self.at) as u64 {
            return Err(self.corrupt("oversized dictionary"));
        }
        let mut entries: Vec<Entry> = Vec::with_capacity(num_entries as usize);
        let mut paths: Vec<Vec<u32>> = Vec::with_capacity(num_entries as usize);
        for index in 0..num_entries {
            let parent_plus_1 = self.read_varint("truncated dictionary entry")?;
            let tag_raw = self.read_varint("truncated dictionary entry")?;
            let kind = self.read_varint("truncated dictionary entry")?;
            if parent_plus_1 > index {
                return Err(self.corrupt("dictionary parent out of order"));
            }
            let parent = (parent_plus_1 != 0).then(|| (parent_plus_1 - 1) as u32);
            if tag_raw == 0 || tag_raw > u32::MAX as u64 {
                return Err(self.corrupt("invalid dictionary tag"));
            }
            let tag = tag_raw as u32;
            let field = wire::field_number(tag);
            let wire_type = wire::wire_type(tag);
            if field == 0 || field > wire::MAX_FIELD_NUMBER {
                return Err(self.corrupt("invalid dictionary field number"));
            }
            if !matches!(
                wire_type,
                wire::WIRETYPE_VARINT
                    | wire::WIRETYPE_FIXED64
                    | wire::WIRETYPE_LENGTH_DELIMITED
                    | wire::WIRETYPE_START_GROUP
                    | wire::WIRETYPE_FIXED32
            ) {
                return Err(self.corrupt("reserved wire type in dictionary"));
            }
            if kind > 1 || (kind == 1 && wire_type != wire::WIRETYPE_LENGTH_DELIMITED) {
                return Err(self.corrupt("invalid dictionary node kind"));
            }
            // Parents must be able to hold children.
            if let Some(parent) = parent {
                if !entries[parent as usize].structural {
                    return Err(self.corrupt("dictionary child of a leaf node"));
                }
            }
            let structural = kind == 1 || wire_type == wire::WIRETYPE_START_GROUP;
            let mut path = parent
                .map(|p| paths[p as usize].clone())
                .unwrap_or_default();
            path.push(field);
            let materialized = parent.map_or(true, |p| entries[p as usize].materialized)
                && projection.includes(&path);
            paths.push(path);
            entries.push(Entry {
                parent,
                tag,
                structural,
                materialized,
            });
        }
        Ok(entries)
    }

    /// Parses the buffer table and contents, pre-splitting occurrences.
    ///
    /// Returns the non-proto column and one `Values` per dictionary
    /// entry (structural entries get an empty placeholder).
    fn parse_buffers(&mut self, entries: &[Entry]) -> Result<(Values, Vec<Values>)> {
        // Table first: non-proto lengths + data, then per-entry buffers.
        let mut sizes = Vec::new();
        let mut buffer_count = 2usize;
        for entry in entries {
            if entry.structural {
                continue;
            }
            buffer_count += match wire::wire_type(entry.tag) {
                wire::WIRETYPE_LENGTH_DELIMITED => 2,
                _ => 1,
            };
        }
        let mut total = 0u64;
        for _ in 0..buffer_count {
            let size = self.read_varint("truncated buffer table")?;
            total = total
                .checked_add(size)
                .ok_or_else(|| self.corrupt("buffer sizes overflow"))?;
            sizes.push(size as usize);
        }
        if total > (self.stream.len() - self.at) as u64 {
            return Err(self.corrupt("buffer contents truncated"));
        }

        let mut regions = Vec::with_capacity(buffer_count);
        for size in sizes {
            let region = self.stream.slice(self.at..self.at + size);
            self.at += size;
            regions.push(region);
        }
        let mut regions = regions.into_iter();
        let non_proto_lengths = regions.next().unwrap_or_default();
        let non_proto_data = regions.next().unwrap_or_default();
        let non_proto = self.split_delimited(&non_proto_lengths, non_proto_data)?;

        let mut values = Vec::with_capacity(entries.len());
        for entry in entries {
            if entry.structural {
                values.push(Values::empty());
                continue;
            }
            let split = match wire::wire_type(entry.tag) {
                wire::WIRETYPE_VARINT => {
                    let buffer = regions.next().unwrap_or_default();
                    self.split_varints(buffer)?
                }
                wire::WIRETYPE_FIXED64 => {
                    let buffer = regions.next().unwrap_or_default();
                    self.split_fixed(buffer, 8)?
                }
                wire::WIRETYPE_FIXED32 => {
                    let buffer = regions.next().unwrap_or_default();
                    self.split_fixed(buffer, 4)?
                }
                wire::WIRETYPE_LENGTH_DELIMITED => {
                    let lengths = regions.next().unwrap_or_default();
                    let data = regions.next().unwrap_or_default();
                    self.split_delimited(&lengths, data)?
                }
                _ => return Err(self.corrupt("unexpected wire type")),
            };
            values.push(split);
        }
        Ok((non_proto, values))
    }

    fn split_varints(&self, buffer: Bytes) -> Result<Values> {
        let mut bounds = vec![0usize];
        let mut at = 0usize;
        while at < buffer.len() {
            let (_, len) = wire::read_varint(&buffer[at..])
                .ok_or_else(|| self.corrupt("malformed varint value buffer"))?;
            at += len;
            bounds.push(at);
        }
        Ok(Values { buffer, bounds })
    }

    fn split_fixed(&self, buffer: Bytes, width: usize) -> Result<Values> {
        if buffer.len() % width != 0 {
            return Err(self.corrupt("misaligned fixed-width value buffer"));
        }
        let bounds = (0..=buffer.len() / width).map(|i| i * width).collect();
        Ok(Values { buffer, bounds })
    }

    fn split_delimited(&self, lengths: &Bytes, data: Bytes) -> Result<Values> {
        let mut bounds = vec![0usize];
        let mut cursor = lengths.as_ref();
        let mut end = 0u64;
        while !cursor.is_empty() {
            let len = varint::read_u64(&mut cursor)
                .ok_or_else(|| self.corrupt("malformed length buffer"))?;
            end = end
                .checked_add(len)
                .ok_or_else(|| self.corrupt("length buffer overflow"))?;
            if end > data.len() as u64 {
                return Err(self.corrupt("length buffer exceeds data buffer"));
            }
            bounds.push(end as usize);
        }
        if end != data.len() as u64 {
            return Err(self.corrupt("data buffer not fully covered by lengths"));
        }
        Ok(Values {
            buffer: data,
            bounds,
        })
    }

    /// Pass 1: validates the tag sequence and builds the replay plan.
    ///
    /// Returns the plan and, per record, the plan index where it ends.
    fn parse_ops(
        &mut self,
        entries: &[Entry],
        non_proto: &Values,
        values: &[Values],
        num_records: u64,
    ) -> Result<(Vec<PlanOp>, Vec<usize>)> {
        let mut plan = Vec::new();
        let mut bounds = Vec::with_capacity(num_records.min(1 << 20) as usize);
        let mut cursors: Vec<u32> = vec![0; entries.len()];
        let mut non_proto_cursor = 0u32;
        // (entry, materialized) per open scope.
        let mut scopes: Vec<(u32, bool)> = Vec::new();
        let mut after_non_proto = false;

        while self.at < self.stream.len() {
            let op = self.read_varint("malformed tag sequence")?;
            if after_non_proto && op != OP_CLOSE {
                return Err(self.corrupt("non-proto record not closed"));
            }
            if op == OP_CLOSE {
                after_non_proto = false;
                match scopes.pop() {
                    Some((entry, materialized)) => {
                        if materialized {
                            plan.push(PlanOp::Exit { entry });
                        }
                    }
                    None => {
                        bounds.push(plan.len());
                        if bounds.len() as u64 > num_records {
                            return Err(self.corrupt("more records than declared"));
                        }
                    }
                }
            } else if op == OP_NON_PROTO {
                if !scopes.is_empty() {
                    return Err(self.corrupt("non-proto op inside a message scope"));
                }
                if non_proto_cursor as usize >= non_proto.count() {
                    return Err(self.corrupt("non-proto column exhausted"));
                }
                plan.push(PlanOp::NonProto {
                    value: non_proto_cursor,
                });
                non_proto_cursor += 1;
                after_non_proto = true;
            } else {
                let id = op - OP_ENTRY_BASE;
                if id >= entries.len() as u64 {
                    return Err(self.corrupt("tag sequence references unknown node"));
                }
                let id = id as u32;
                let entry = &entries[id as usize];
                let scope_entry = scopes.last().map(|&(entry, _)| entry);
                if entry.parent != scope_entry {
                    return Err(self.corrupt("tag sequence violates node parentage"));
                }
                let materialized =
                    scopes.last().map_or(true, |&(_, m)| m) && entry.materialized;
                if entry.structural {
                    scopes.push((id, materialized));
                    if scopes.len() as u32 > wire::MAX_RECURSION_DEPTH {
                        return Err(self.corrupt("tag sequence nests too deeply"));
                    }
                    if materialized {
                        plan.push(PlanOp::Enter { entry: id });
                    }
                } else {
                    let cursor = &mut cursors[id as usize];
                    if *cursor as usize >= values[id as usize].count() {
                        return Err(self.corrupt("value column exhausted"));
                    }
                    if materialized {
                        plan.push(PlanOp::Leaf {
                            entry: id,
                            value: *cursor,
                        });
                    }
                    *cursor += 1;
                }
            }
        }

        if !scopes.is_empty() {
            return Err(self.corrupt("tag sequence ends inside a scope"));
        }
        if bounds.len() as u64 != num_records {
            return Err(self.corrupt("fewer records than declared"));
        }
        if plan.len() != bounds.last().copied().unwrap_or(0) {
            return Err(self.corrupt("tag sequence continues past the last record"));
        }
        if non_proto_cursor as usize != non_proto.count() {
            return Err(self.corrupt("unused non-proto values"));
        }
        for (id, cursor) in cursors.iter().enumerate() {
            if *cursor as usize != values[id].count() {
                return Err(self.corrupt("unused buffer values"));
            }
        }
        Ok((plan, bounds))
    }
}

/// Pass 2: rebuilds the records back-to-front through a backward writer.
#[allow(clippy::too_many_arguments)]
fn replay(
    entries: &[Entry],
    non_proto: &Values,
    values: &[Values],
    plan: &[PlanOp],
    bounds: &[usize],
    projection: &FieldProjection,
    decoded_data_size: u64,
    pos: u64,
) -> Result<DecodedRecords> {
    let mut writer = ChainBackwardWriter::new();
    let mut lengths_reversed = Vec::with_capacity(bounds.len());
    let mut scope_marks: Vec<u64> = Vec::new();

    for record in (0..bounds.len()).rev() {
        let begin = if record == 0 { 0 } else { bounds[record - 1] };
        let before = writer.len();
        for op in plan[begin..bounds[record]].iter().rev() {
            match op {
                PlanOp::Exit { entry } => {
                    scope_marks.push(writer.len());
                    let node = &entries[*entry as usize];
                    if wire::wire_type(node.tag) == wire::WIRETYPE_START_GROUP {
                        let close = wire::make_tag(wire::field_number(node.tag), wire::WIRETYPE_END_GROUP);
                        let (buf, len) = wire::encode_tag(close);
                        writer.prepend_slice(&buf[..len]);
                    }
                }
                PlanOp::Enter { entry } => {
                    let mark = scope_marks
                        .pop()
                        .ok_or_else(|| Error::internal("unbalanced replay plan"))?;
                    let node = &entries[*entry as usize];
                    if wire::wire_type(node.tag) == wire::WIRETYPE_LENGTH_DELIMITED {
                        writer.prepend_varint_u64(writer.len() - mark);
                    }
                    let (buf, len) = wire::encode_tag(node.tag);
                    writer.prepend_slice(&buf[..len]);
                }
                PlanOp::Leaf { entry, value } => {
                    let node = &entries[*entry as usize];
                    let bytes = values[*entry as usize].get(*value as usize);
                    if wire::wire_type(node.tag) == wire::WIRETYPE_LENGTH_DELIMITED {
                        writer.prepend_slice(&bytes);
                        writer.prepend_varint_u64(bytes.len() as u64);
                    } else {
                        writer.prepend_slice(&bytes);
                    }
                    let (buf, len) = wire::encode_tag(node.tag);
                    writer.prepend_slice(&buf[..len]);
                }
                PlanOp::NonProto { value } => {
                    writer.prepend_slice(&non_proto.get(*value as usize));
                }
            }
        }
        lengths_reversed.push(writer.len() - before);
    }

    if !scope_marks.is_empty() {
        return Err(Error::internal("unbalanced replay plan"));
    }
    if projection.is_all() && writer.len() != decoded_data_size {
        return Err(Error::data_loss(format!(
            "transposed chunk at {pos} decoded to {} bytes, header says {decoded_data_size}",
            writer.len()
        )));
    }

    let mut limits = Vec::with_capacity(lengths_reversed.len());
    let mut end = 0usize;
    for length in lengths_reversed.iter().rev() {
        end += *length as usize;
        limits.push(end);
    }
    Ok(DecodedRecords::new(writer.finish().to_bytes(), limits))
}
