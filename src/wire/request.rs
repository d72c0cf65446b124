//! Request decoding and encoding.
//!
//! The request is a tagged union over three shapes selected by the command
//! field: Register (0), Infer (1), and Shutdown (2). Encoding is the
//! structural inverse of decoding and is byte-exact for round trips.

use super::{Cursor, WireError};

/// Fixed header after the length prefix: command, id, partitions, inputs.
pub const HEADER_LEN: usize = 16;

/// Hex-encoded authentication tag length on the wire (16 bytes -> 32 chars).
pub const TAG_HEX_LEN: usize = 32;

/// Upper bound checked before any parsing, to stop allocation attacks.
pub const MAX_MESSAGE_SIZE: usize = 256 * 1024 * 1024;

const CMD_REGISTER: i32 = 0;
const CMD_INFER: i32 = 1;
const CMD_SHUTDOWN: i32 = 2;

/// One client-supplied tensor. The wire carries raw little-endian f32s;
/// the first four values pack the tensor's shape (zero dims unused).
#[derive(Debug, Clone, PartialEq)]
pub struct WireTensor {
    pub values: Vec<f32>,
}

impl WireTensor {
    /// Build a tensor from an explicit shape (up to 4 dims) and its data.
    pub fn new(shape: &[usize], data: &[f32]) -> Self {
        let mut values = Vec::with_capacity(4 + data.len());
        for i in 0..4 {
            values.push(shape.get(i).copied().unwrap_or(0) as f32);
        }
        values.extend_from_slice(data);
        Self { values }
    }

    /// The declared shape: leading nonzero entries of the 4-float header.
    pub fn shape(&self) -> Vec<usize> {
        self.values
            .iter()
            .take(4)
            .map(|&v| v as usize)
            .filter(|&d| d != 0)
            .collect()
    }

    /// The tensor data after the shape header.
    pub fn data(&self) -> &[f32] {
        if self.values.len() < 4 {
            &[]
        } else {
            &self.values[4..]
        }
    }

    /// Size of this tensor on the wire, in bytes.
    pub fn wire_len(&self) -> usize {
        self.values.len() * 4
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegisterRequest {
    /// Sentinel on the wire; must be -1 (validated by the dispatcher).
    pub id: i32,
    pub partition_names: Vec<String>,
    pub partitions: Vec<Vec<u8>>,
    pub inputs: Vec<WireTensor>,
    pub tokenizer: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InferRequest {
    pub model_id: i32,
    pub inputs: Vec<WireTensor>,
    /// One 32-char hex tag per partition of the target pipeline.
    pub tags: Vec<String>,
    pub tokenizer: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Register(RegisterRequest),
    Infer(InferRequest),
    Shutdown,
}

/// Decode a request payload (length prefix already stripped by the server).
///
/// The size limit is enforced before parsing; every section read is bounds
/// checked by the cursor, so truncated or lying length fields surface as
/// [`WireError::Malformed`].
pub fn decode_request(payload: &[u8]) -> Result<Request, WireError> {
    if payload.len() > MAX_MESSAGE_SIZE {
        return Err(WireError::MessageTooLarge {
            size: payload.len(),
            max: MAX_MESSAGE_SIZE,
        });
    }

    let mut cur = Cursor::new(payload);
    let command = cur.read_i32()?;
    let id = cur.read_i32()?;
    let num_partitions = cur.read_count("partition count")?;
    let num_inputs = cur.read_count("input count")?;

    let request = match command {
        CMD_REGISTER => decode_register(&mut cur, id, num_partitions, num_inputs)?,
        CMD_INFER => decode_infer(&mut cur, id, num_partitions, num_inputs)?,
        CMD_SHUTDOWN => Request::Shutdown,
        other => return Err(WireError::UnknownCommand(other)),
    };

    if !cur.is_empty() {
        return Err(WireError::Malformed(format!(
            "{} trailing bytes after request body",
            cur.remaining()
        )));
    }
    Ok(request)
}

fn decode_register(
    cur: &mut Cursor<'_>,
    id: i32,
    num_partitions: usize,
    num_inputs: usize,
) -> Result<Request, WireError> {
    // Each name needs at least a terminator byte; rejects absurd counts
    // before any allocation sized by them.
    if num_partitions > cur.remaining() {
        return Err(WireError::Malformed(format!(
            "partition count {num_partitions} exceeds message size"
        )));
    }

    let mut partition_names = Vec::with_capacity(num_partitions);
    for _ in 0..num_partitions {
        partition_names.push(cur.read_cstr()?);
    }

    let mut sizes = Vec::with_capacity(num_partitions);
    for _ in 0..num_partitions {
        sizes.push(cur.read_count("partition size")?);
    }

    let mut partitions = Vec::with_capacity(num_partitions);
    for size in sizes {
        partitions.push(cur.take(size)?.to_vec());
    }

    let inputs = decode_tensors(cur, num_inputs)?;
    let tokenizer = decode_tokenizer(cur)?;

    Ok(Request::Register(RegisterRequest {
        id,
        partition_names,
        partitions,
        inputs,
        tokenizer,
    }))
}

fn decode_infer(
    cur: &mut Cursor<'_>,
    id: i32,
    num_partitions: usize,
    num_inputs: usize,
) -> Result<Request, WireError> {
    let inputs = decode_tensors(cur, num_inputs)?;

    if num_partitions
        .checked_mul(TAG_HEX_LEN)
        .map(|total| total > cur.remaining())
        .unwrap_or(true)
    {
        return Err(WireError::Malformed(format!(
            "tag count {num_partitions} exceeds message size"
        )));
    }

    let mut tags = Vec::with_capacity(num_partitions);
    for _ in 0..num_partitions {
        let raw = cur.take(TAG_HEX_LEN)?;
        if !raw.iter().all(|b| b.is_ascii_hexdigit()) {
            return Err(WireError::Malformed("tag is not hex".into()));
        }
        // Validated as ASCII hex above.
        tags.push(String::from_utf8(raw.to_vec()).expect("ascii hex"));
    }

    let tokenizer = decode_tokenizer(cur)?;

    Ok(Request::Infer(InferRequest {
        model_id: id,
        inputs,
        tags,
        tokenizer,
    }))
}

fn decode_tensors(cur: &mut Cursor<'_>, num_inputs: usize) -> Result<Vec<WireTensor>, WireError> {
    if num_inputs
        .checked_mul(4)
        .map(|total| total > cur.remaining())
        .unwrap_or(true)
    {
        return Err(WireError::Malformed(format!(
            "input count {num_inputs} exceeds message size"
        )));
    }

    let mut sizes = Vec::with_capacity(num_inputs);
    for _ in 0..num_inputs {
        let size = cur.read_count("input size")?;
        if size % 4 != 0 {
            return Err(WireError::Malformed(format!(
                "input byte size {size} is not a multiple of 4"
            )));
        }
        sizes.push(size);
    }

    let mut tensors = Vec::with_capacity(num_inputs);
    for size in sizes {
        let raw = cur.take(size)?;
        let values = raw
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        tensors.push(WireTensor { values });
    }
    Ok(tensors)
}

fn decode_tokenizer(cur: &mut Cursor<'_>) -> Result<Option<Vec<u8>>, WireError> {
    let size = cur.read_count("tokenizer size")?;
    if size == 0 {
        return Ok(None);
    }
    Ok(Some(cur.take(size)?.to_vec()))
}

/// Encode a request to its payload bytes (without the length prefix).
pub fn encode_request(request: &Request) -> Result<Vec<u8>, WireError> {
    let mut out = Vec::new();
    match request {
        Request::Register(reg) => {
            write_header(
                &mut out,
                CMD_REGISTER,
                reg.id,
                reg.partition_names.len(),
                reg.inputs.len(),
            );
            for name in &reg.partition_names {
                out.extend_from_slice(name.as_bytes());
                out.push(0);
            }
            for blob in &reg.partitions {
                out.extend_from_slice(&(blob.len() as i32).to_le_bytes());
            }
            for blob in &reg.partitions {
                out.extend_from_slice(blob);
            }
            write_tensors(&mut out, &reg.inputs);
            write_tokenizer(&mut out, &reg.tokenizer);
        }
        Request::Infer(inf) => {
            write_header(&mut out, CMD_INFER, inf.model_id, inf.tags.len(), inf.inputs.len());
            write_tensors(&mut out, &inf.inputs);
            for tag in &inf.tags {
                if tag.len() != TAG_HEX_LEN || !tag.bytes().all(|b| b.is_ascii_hexdigit()) {
                    return Err(WireError::Malformed(format!("invalid tag {tag:?}")));
                }
                out.extend_from_slice(tag.as_bytes());
            }
            write_tokenizer(&mut out, &inf.tokenizer);
        }
        Request::Shutdown => {
            write_header(&mut out, CMD_SHUTDOWN, -1, 0, 0);
        }
    }
    Ok(out)
}

fn write_header(out: &mut Vec<u8>, command: i32, id: i32, partitions: usize, inputs: usize) {
    out.extend_from_slice(&command.to_le_bytes());
    out.extend_from_slice(&id.to_le_bytes());
    out.extend_from_slice(&(partitions as i32).to_le_bytes());
    out.extend_from_slice(&(inputs as i32).to_le_bytes());
}

fn write_tensors(out: &mut Vec<u8>, tensors: &[WireTensor]) {
    for t in tensors {
        out.extend_from_slice(&(t.wire_len() as i32).to_le_bytes());
    }
    for t in tensors {
        for v in &t.values {
            out.extend_from_slice(&v.to_le_bytes());
        }
    }
}

fn write_tokenizer(out: &mut Vec<u8>, tokenizer: &Option<Vec<u8>>) {
    match tokenizer {
        Some(bytes) => {
            out.extend_from_slice(&(bytes.len() as i32).to_le_bytes());
            out.extend_from_slice(bytes);
        }
        None => out.extend_from_slice(&0i32.to_le_bytes()),
    }
}
