use std::collections::HashMap;

use log::{debug, warn};

use crate::error::PlyError;

/// Only this many leading bytes are searched for the header.
pub const HEADER_SCAN_LIMIT: usize = 1024 * 10;

const HEADER_END: &[u8] = b"end_header\n";
const VERTEX_DECL: &str = "element vertex ";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlyScalarType {
    Char,
    UChar,
    Short,
    UShort,
    Int,
    UInt,
    Float,
    Double,
}

impl PlyScalarType {
    /// Maps a header type name to a scalar type. Unknown names read as `Char`.
    pub fn parse(s: &str) -> Self {
        match s {
            "double" => Self::Double,
            "int" => Self::Int,
            "uint" => Self::UInt,
            "float" => Self::Float,
            "short" => Self::Short,
            "ushort" => Self::UShort,
            "uchar" => Self::UChar,
            _ => Self::Char,
        }
    }

    pub fn size_bytes(&self) -> usize {
        match self {
            PlyScalarType::Char => 1,
            PlyScalarType::UChar => 1,
            PlyScalarType::Short => 2,
            PlyScalarType::UShort => 2,
            PlyScalarType::Int => 4,
            PlyScalarType::UInt => 4,
            PlyScalarType::Float => 4,
            PlyScalarType::Double => 8,
        }
    }
}

/// One `property <type> <name>` declaration and where it sits in a record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlyField {
    pub name: String,
    pub ty: PlyScalarType,
    pub offset: usize,
}

/// Parsed PLY header: record count, record layout and where the body starts.
#[derive(Clone, Debug)]
pub struct PlyHeader {
    pub vertex_count: usize,
    pub fields: Vec<PlyField>,
    /// Bytes per record, the sum of all field widths.
    pub stride: usize,
    /// Byte offset of the binary body, right after `end_header\n`.
    pub data_offset: usize,
    by_name: HashMap<String, usize>,
}

impl PlyHeader {
    pub fn field(&self, name: &str) -> Option<&PlyField> {
        self.by_name.get(name).map(|&i| &self.fields[i])
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    fn layout(&self) -> String {
        self.fields
            .iter()
            .map(|f| format!("{}:{:?}@{}", f.name, f.ty, f.offset))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn find_header_end(window: &[u8]) -> Option<usize> {
    window
        .windows(HEADER_END.len())
        .position(|w| w == HEADER_END)
}

fn parse_vertex_count(header_text: &str) -> Result<usize, PlyError> {
    for line in header_text.split('\n') {
        let Some(pos) = line.find(VERTEX_DECL) else {
            continue;
        };
        let digits = &line[pos + VERTEX_DECL.len()..];
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            continue;
        }
        return digits.parse().map_err(|_| {
            PlyError::MalformedHeader(format!("vertex count `{digits}` out of range"))
        });
    }
    Err(PlyError::MalformedHeader(
        "missing `element vertex <N>` declaration".to_string(),
    ))
}

pub fn parse_header(bytes: &[u8]) -> Result<PlyHeader, PlyError> {
    parse_header_with_limit(bytes, HEADER_SCAN_LIMIT)
}

/// Parses the header found within the first `scan_limit` bytes of `bytes`.
pub fn parse_header_with_limit(bytes: &[u8], scan_limit: usize) -> Result<PlyHeader, PlyError> {
    let window = &bytes[..bytes.len().min(scan_limit)];
    let end = find_header_end(window).ok_or(PlyError::HeaderNotFound {
        scanned: window.len(),
    })?;
    let header_text = String::from_utf8_lossy(&window[..end]);

    let vertex_count = parse_vertex_count(&header_text)?;

    let mut fields: Vec<PlyField> = Vec::new();
    let mut by_name: HashMap<String, usize> = HashMap::new();
    let mut stride = 0usize;
    for line in header_text
        .split('\n')
        .filter(|l| l.starts_with("property "))
    {
        let mut it = line.split_whitespace().skip(1);
        let (Some(type_name), Some(name)) = (it.next(), it.next()) else {
            return Err(PlyError::MalformedHeader(format!(
                "property line `{line}` needs a type and a name"
            )));
        };
        if type_name == "list" {
            warn!("PLY: list property `{line}` is not supported, reading it as a 1-byte field");
        }
        let ty = PlyScalarType::parse(type_name);
        by_name.insert(name.to_string(), fields.len());
        fields.push(PlyField {
            name: name.to_string(),
            ty,
            offset: stride,
        });
        stride += ty.size_bytes();
    }

    let header = PlyHeader {
        vertex_count,
        fields,
        stride,
        data_offset: end + HEADER_END.len(),
        by_name,
    };
    debug!("PLY: vertex count {}", header.vertex_count);
    debug!("PLY: bytes per row {}, fields {}", header.stride, header.layout());
    Ok(header)
}
