//! Reader and writer for the `.npy` binary array format (versions 1 and 2, little-endian,
//! C order).

use crate::codec::value::{DType, NumArray, NumData};
use crate::foundation::error::{RecipeError, RecipeResult};

const MAGIC: &[u8; 6] = b"\x93NUMPY";

fn descr(dtype: DType) -> &'static str {
    match dtype {
        DType::Float64 => "<f8",
        DType::Float32 => "<f4",
        DType::Int64 => "<i8",
        DType::Int32 => "<i4",
        DType::Uint8 => "|u1",
    }
}

/// Encode an array as `.npy` version 1.0 bytes.
pub(crate) fn write_npy(arr: &NumArray) -> Vec<u8> {
    let shape = match arr.shape() {
        [n] => format!("({n},)"),
        dims => format!(
            "({})",
            dims.iter()
                .map(|d| d.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ),
    };
    let mut header = format!(
        "{{'descr': '{}', 'fortran_order': False, 'shape': {shape}, }}",
        descr(arr.dtype())
    );
    // Preamble (10 bytes) + header + newline is padded to a multiple of 64.
    let unpadded = 10 + header.len() + 1;
    header.push_str(&" ".repeat((64 - unpadded % 64) % 64));
    header.push('\n');

    let mut out = Vec::with_capacity(10 + header.len() + arr.len() * 8);
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&[1, 0]);
    out.extend_from_slice(&(header.len() as u16).to_le_bytes());
    out.extend_from_slice(header.as_bytes());
    match (arr.dtype(), arr.data()) {
        (DType::Float32, NumData::Float(v)) => {
            v.iter().for_each(|x| out.extend_from_slice(&(*x as f32).to_le_bytes()))
        }
        (_, NumData::Float(v)) => v.iter().for_each(|x| out.extend_from_slice(&x.to_le_bytes())),
        (DType::Int32, NumData::Int(v)) => {
            v.iter().for_each(|x| out.extend_from_slice(&(*x as i32).to_le_bytes()))
        }
        (DType::Uint8, NumData::Int(v)) => v.iter().for_each(|x| out.push(*x as u8)),
        (_, NumData::Int(v)) => v.iter().for_each(|x| out.extend_from_slice(&x.to_le_bytes())),
    }
    out
}

fn header_field<'a>(header: &'a str, key: &str) -> Option<&'a str> {
    let needle = format!("'{key}':");
    let start = header.find(&needle)? + needle.len();
    Some(header[start..].trim_start())
}

fn parse_shape(header: &str) -> RecipeResult<Vec<usize>> {
    let bad = || RecipeError::serde("npy header has a malformed 'shape'");
    let rest = header_field(header, "shape").ok_or_else(bad)?;
    let rest = rest.strip_prefix('(').ok_or_else(bad)?;
    let inner = &rest[..rest.find(')').ok_or_else(bad)?];
    inner
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<usize>().map_err(|_| bad()))
        .collect()
}

/// Decode `.npy` bytes into an array.
pub(crate) fn read_npy(bytes: &[u8]) -> RecipeResult<NumArray> {
    if bytes.len() < 10 || &bytes[..6] != MAGIC {
        return Err(RecipeError::serde("not an npy payload (bad magic)"));
    }
    let (header_len, offset) = match bytes[6] {
        1 => (usize::from(u16::from_le_bytes([bytes[8], bytes[9]])), 10),
        2 | 3 if bytes.len() >= 12 => (
            u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize,
            12,
        ),
        v => return Err(RecipeError::serde(format!("unsupported npy version {v}"))),
    };
    let body_start = offset + header_len;
    if bytes.len() < body_start {
        return Err(RecipeError::serde("npy header is truncated"));
    }
    let header = std::str::from_utf8(&bytes[offset..body_start])
        .map_err(|e| RecipeError::serde(format!("npy header is not utf-8: {e}")))?;

    let descr_raw = header_field(header, "descr")
        .and_then(|s| s.strip_prefix('\''))
        .and_then(|s| s.split('\'').next())
        .ok_or_else(|| RecipeError::serde("npy header has no 'descr'"))?;
    let dtype = DType::parse(descr_raw)
        .ok_or_else(|| RecipeError::serde(format!("unsupported npy dtype '{descr_raw}'")))?;
    let shape = parse_shape(header)?;
    let fortran = header_field(header, "fortran_order").is_some_and(|s| s.starts_with("True"));
    if fortran && shape.len() > 1 {
        return Err(RecipeError::serde("fortran-ordered npy arrays are not supported"));
    }

    let count: usize = shape.iter().product();
    let body = &bytes[body_start..];
    let width = match dtype {
        DType::Float64 | DType::Int64 => 8,
        DType::Float32 | DType::Int32 => 4,
        DType::Uint8 => 1,
    };
    if body.len() < count * width {
        return Err(RecipeError::serde(format!(
            "npy body holds {} bytes, expected {}",
            body.len(),
            count * width
        )));
    }
    let chunks = body[..count * width].chunks_exact(width);
    let data = match dtype {
        DType::Float64 => NumData::Float(
            chunks
                .map(|c| f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
                .collect(),
        ),
        DType::Float32 => NumData::Float(
            chunks
                .map(|c| f64::from(f32::from_le_bytes([c[0], c[1], c[2], c[3]])))
                .collect(),
        ),
        DType::Int64 => NumData::Int(
            chunks
                .map(|c| i64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
                .collect(),
        ),
        DType::Int32 => NumData::Int(
            chunks
                .map(|c| i64::from(i32::from_le_bytes([c[0], c[1], c[2], c[3]])))
                .collect(),
        ),
        DType::Uint8 => NumData::Int(chunks.map(|c| i64::from(c[0])).collect()),
    };
    NumArray::new(dtype, shape, data)
}

#[cfg(test)]
#[path = "../../tests/unit/codec/npy.rs"]
mod tests;
