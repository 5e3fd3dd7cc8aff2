//! Minimal `.npy` support for cached index tables.
//!
//! Handles exactly what precomputed tables use: integer dtypes, C order,
//! one or two dimensions. Anything else is a decode error, which the
//! provider treats as a cache miss.

use std::fs;
use std::io::Write;
use std::path::Path;

use crate::error::{HealpixError, Result};
use crate::index::IndexTable;

const MAGIC: &[u8] = b"\x93NUMPY";
/// Header block alignment written by numpy >= 1.9.
const ALIGN: usize = 64;

/// Integer element layout parsed from a `descr` string such as `<i8`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Dtype {
    signed: bool,
    size: usize,
    big_endian: bool,
}

impl Dtype {
    fn parse(descr: &str) -> Result<Self> {
        let mut chars = descr.chars();
        let big_endian = match chars.next() {
            Some('<') | Some('|') => false,
            Some('=') => cfg!(target_endian = "big"),
            Some('>') => true,
            _ => return Err(npy_err(format!("unsupported descr '{}'", descr))),
        };
        let signed = match chars.next() {
            Some('i') => true,
            Some('u') => false,
            _ => return Err(npy_err(format!("non-integer dtype '{}'", descr))),
        };
        let size: usize = chars
            .as_str()
            .parse()
            .map_err(|_| npy_err(format!("bad item size in '{}'", descr)))?;
        if ![1, 2, 4, 8].contains(&size) {
            return Err(npy_err(format!("unsupported item size {}", size)));
        }
        Ok(Self {
            signed,
            size,
            big_endian,
        })
    }

    fn decode(&self, raw: &[u8]) -> Result<usize> {
        let mut buf = [0u8; 8];
        if self.big_endian {
            buf[8 - self.size..].copy_from_slice(raw);
            buf.reverse();
        } else {
            buf[..self.size].copy_from_slice(raw);
        }
        let unsigned = u64::from_le_bytes(buf);
        let value = if self.signed {
            // Sign-extend from the item width.
            let shift = 64 - 8 * self.size as u32;
            ((unsigned << shift) as i64) >> shift
        } else {
            if unsigned > i64::MAX as u64 {
                return Err(npy_err(format!("index {} out of range", unsigned)));
            }
            unsigned as i64
        };
        usize::try_from(value).map_err(|_| npy_err(format!("negative index {}", value)))
    }
}

fn npy_err(msg: String) -> HealpixError {
    HealpixError::Npy(msg)
}

/// Raw text following `'key':` in the header dict.
fn dict_value<'a>(header: &'a str, key: &str) -> Result<&'a str> {
    let pattern = format!("'{}'", key);
    let start = header
        .find(&pattern)
        .ok_or_else(|| npy_err(format!("header has no '{}'", key)))?;
    let rest = header[start + pattern.len()..].trim_start();
    rest.strip_prefix(':')
        .map(str::trim_start)
        .ok_or_else(|| npy_err(format!("malformed '{}' entry", key)))
}

fn parse_descr(header: &str) -> Result<Dtype> {
    let value = dict_value(header, "descr")?;
    let quote = value.chars().next().filter(|c| *c == '\'' || *c == '"');
    let quote = quote.ok_or_else(|| npy_err("descr is not a string".into()))?;
    let inner = &value[1..];
    let end = inner
        .find(quote)
        .ok_or_else(|| npy_err("unterminated descr".into()))?;
    Dtype::parse(&inner[..end])
}

fn parse_fortran(header: &str) -> Result<bool> {
    let value = dict_value(header, "fortran_order")?;
    if value.starts_with("True") {
        Ok(true)
    } else if value.starts_with("False") {
        Ok(false)
    } else {
        Err(npy_err("fortran_order is not a bool".into()))
    }
}

fn parse_shape(header: &str) -> Result<Vec<usize>> {
    let value = dict_value(header, "shape")?;
    let inner = value
        .strip_prefix('(')
        .and_then(|v| v.find(')').map(|end| &v[..end]))
        .ok_or_else(|| npy_err("shape is not a tuple".into()))?;
    inner
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.trim_end_matches('L')
                .parse::<usize>()
                .map_err(|_| npy_err(format!("bad dimension '{}'", s)))
        })
        .collect()
}

/// Decode an in-memory `.npy` image into an index table.
pub fn decode(bytes: &[u8]) -> Result<IndexTable> {
    if bytes.len() < 10 || &bytes[..6] != MAGIC {
        return Err(npy_err("missing NUMPY magic".into()));
    }
    let major = bytes[6];
    let (header_len, header_start) = match major {
        1 => (u16::from_le_bytes([bytes[8], bytes[9]]) as usize, 10),
        2 | 3 => {
            if bytes.len() < 12 {
                return Err(npy_err("truncated header length".into()));
            }
            let len = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
            (len as usize, 12)
        }
        v => return Err(npy_err(format!("unsupported format version {}", v))),
    };
    let data_start = header_start + header_len;
    if bytes.len() < data_start {
        return Err(npy_err("truncated header".into()));
    }
    let header = std::str::from_utf8(&bytes[header_start..data_start])
        .map_err(|_| npy_err("header is not text".into()))?;

    let dtype = parse_descr(header)?;
    let fortran = parse_fortran(header)?;
    let shape = parse_shape(header)?;

    let width = match shape.as_slice() {
        [_] => 1,
        [_, w] => *w,
        _ => {
            return Err(npy_err(format!(
                "expected 1-D or 2-D table, got shape {:?}",
                shape
            )))
        }
    };
    if fortran && width > 1 {
        return Err(npy_err("Fortran-ordered grids are not supported".into()));
    }

    let expected = shape
        .iter()
        .try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
        .and_then(|count| count.checked_mul(dtype.size))
        .ok_or_else(|| npy_err(format!("shape {:?} is too large", shape)))?;
    let data = &bytes[data_start..];
    if data.len() != expected {
        return Err(npy_err(format!(
            "expected {} bytes of data, found {}",
            expected,
            data.len()
        )));
    }

    let values = data
        .chunks_exact(dtype.size)
        .map(|raw| dtype.decode(raw))
        .collect::<Result<Vec<_>>>()?;

    if width == 0 {
        return Err(npy_err("zero-width grid".into()));
    }
    IndexTable::new(values, width)
}

/// Read a cached table from disk.
pub fn read_table(path: &Path) -> Result<IndexTable> {
    let bytes = fs::read(path)?;
    decode(&bytes)
}

/// Encode a table as a version 1.0 `.npy` image of little-endian int64.
pub fn encode(table: &IndexTable) -> Vec<u8> {
    let shape = if table.width() == 1 {
        format!("({},)", table.len())
    } else {
        format!("({}, {})", table.rows(), table.width())
    };
    let mut header = format!(
        "{{'descr': '<i8', 'fortran_order': False, 'shape': {}, }}",
        shape
    );
    // Pad so magic + version + length + header (incl. newline) is aligned.
    let unpadded = MAGIC.len() + 4 + header.len() + 1;
    let padding = (ALIGN - unpadded % ALIGN) % ALIGN;
    header.extend(std::iter::repeat(' ').take(padding));
    header.push('\n');

    let mut out = Vec::with_capacity(MAGIC.len() + 4 + header.len() + table.len() * 8);
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&[1, 0]);
    out.extend_from_slice(&(header.len() as u16).to_le_bytes());
    out.extend_from_slice(header.as_bytes());
    for &v in table.values() {
        out.extend_from_slice(&(v as i64).to_le_bytes());
    }
    out
}

/// Write a table to disk, creating parent directories as needed.
pub fn write_table(path: &Path, table: &IndexTable) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = fs::File::create(path)?;
    file.write_all(&encode(table))?;
    Ok(())
}
