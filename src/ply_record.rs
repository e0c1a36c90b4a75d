use crate::error::PlyError;
use crate::ply_header::{PlyField, PlyHeader, PlyScalarType};

/// Decodes one little-endian scalar at `offset`, or `None` if it runs past the buffer.
pub fn read_scalar(bytes: &[u8], offset: usize, ty: PlyScalarType) -> Option<f64> {
    let end = offset.checked_add(ty.size_bytes())?;
    let b = bytes.get(offset..end)?;
    let v = match ty {
        PlyScalarType::Char => i8::from_le_bytes([b[0]]) as f64,
        PlyScalarType::UChar => b[0] as f64,
        PlyScalarType::Short => i16::from_le_bytes([b[0], b[1]]) as f64,
        PlyScalarType::UShort => u16::from_le_bytes([b[0], b[1]]) as f64,
        PlyScalarType::Int => i32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64,
        PlyScalarType::UInt => u32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64,
        PlyScalarType::Float => f32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64,
        PlyScalarType::Double => {
            f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]])
        }
    };
    Some(v)
}

/// A field looked up once by name, reusable for every record.
#[derive(Clone, Copy, Debug)]
pub struct FieldRef<'a> {
    field: &'a PlyField,
}

impl FieldRef<'_> {
    pub fn name(&self) -> &str {
        &self.field.name
    }
}

/// Named-field view over the fixed-stride binary body of a PLY buffer.
#[derive(Clone, Copy, Debug)]
pub struct PlyRecords<'a> {
    bytes: &'a [u8],
    header: &'a PlyHeader,
}

impl<'a> PlyRecords<'a> {
    /// `bytes` is the whole buffer the header was parsed from.
    pub fn new(bytes: &'a [u8], header: &'a PlyHeader) -> Self {
        Self { bytes, header }
    }

    pub fn header(&self) -> &'a PlyHeader {
        self.header
    }

    /// Number of records declared by the header.
    pub fn len(&self) -> usize {
        self.header.vertex_count
    }

    pub fn is_empty(&self) -> bool {
        self.header.vertex_count == 0
    }

    /// Checks that the body holds every declared record.
    pub fn validate(&self) -> Result<(), PlyError> {
        let header = self.header;
        if header.stride == 0 && header.vertex_count > 0 {
            return Err(PlyError::MalformedHeader(format!(
                "{} vertices declared without any property",
                header.vertex_count
            )));
        }
        let available = self.bytes.len().saturating_sub(header.data_offset);
        let needed = header.vertex_count.checked_mul(header.stride);
        if needed.is_some_and(|n| n <= available) {
            return Ok(());
        }
        // stride is non-zero here, otherwise `needed` would be 0
        let index = available / header.stride;
        let within = available % header.stride;
        let field = header
            .fields
            .iter()
            .find(|f| f.offset + f.ty.size_bytes() > within)
            .map(|f| (f.name.clone(), f.offset))
            .unwrap_or_default();
        Err(PlyError::TruncatedBody {
            field: field.0,
            index,
            offset: header.data_offset + index * header.stride + field.1,
            len: self.bytes.len(),
        })
    }

    pub fn resolve(&self, name: &str) -> Result<FieldRef<'a>, PlyError> {
        self.try_resolve(name)
            .ok_or_else(|| PlyError::UnknownField(name.to_string()))
    }

    pub fn try_resolve(&self, name: &str) -> Option<FieldRef<'a>> {
        self.header.field(name).map(|field| FieldRef { field })
    }

    pub fn read(&self, index: usize, field: FieldRef<'_>) -> Result<f64, PlyError> {
        let truncated = |offset: usize| PlyError::TruncatedBody {
            field: field.field.name.clone(),
            index,
            offset,
            len: self.bytes.len(),
        };
        let offset = index
            .checked_mul(self.header.stride)
            .and_then(|o| o.checked_add(self.header.data_offset + field.field.offset))
            .ok_or_else(|| truncated(usize::MAX))?;
        read_scalar(self.bytes, offset, field.field.ty).ok_or_else(|| truncated(offset))
    }

    /// Reads `field` of record `index`, with an absent field reading as 0.
    pub fn read_or_zero(&self, index: usize, field: Option<FieldRef<'_>>) -> Result<f64, PlyError> {
        match field {
            Some(f) => self.read(index, f),
            None => Ok(0.0),
        }
    }

    pub fn get(&self, index: usize, name: &str) -> Result<f64, PlyError> {
        self.read(index, self.resolve(name)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ply_header::parse_header;

    fn sample() -> Vec<u8> {
        let mut bytes = b"ply\nformat binary_little_endian 1.0\nelement vertex 2\nproperty float x\nproperty uchar red\nproperty short s\nproperty double d\nproperty char c\nend_header\n".to_vec();
        for (x, red, s, d, c) in [(1.5f32, 200u8, -3i16, 2.25f64, -5i8), (-4.0, 7, 1000, -0.5, 9)] {
            bytes.extend_from_slice(&x.to_le_bytes());
            bytes.push(red);
            bytes.extend_from_slice(&s.to_le_bytes());
            bytes.extend_from_slice(&d.to_le_bytes());
            bytes.extend_from_slice(&c.to_le_bytes());
        }
        bytes
    }

    #[test]
    fn test_named_access() {
        let bytes = sample();
        let header = parse_header(&bytes).unwrap();
        let records = PlyRecords::new(&bytes, &header);
        assert_eq!(records.len(), 2);
        records.validate().unwrap();

        assert_eq!(records.get(0, "x").unwrap(), 1.5);
        assert_eq!(records.get(0, "red").unwrap(), 200.0);
        assert_eq!(records.get(0, "s").unwrap(), -3.0);
        assert_eq!(records.get(0, "d").unwrap(), 2.25);
        assert_eq!(records.get(0, "c").unwrap(), -5.0);

        let d = records.resolve("d").unwrap();
        assert_eq!(records.read(1, d).unwrap(), -0.5);
        assert_eq!(records.get(1, "s").unwrap(), 1000.0);
        assert_eq!(records.get(1, "x").unwrap(), -4.0);
    }

    #[test]
    fn test_unknown_field() {
        let bytes = sample();
        let header = parse_header(&bytes).unwrap();
        let records = PlyRecords::new(&bytes, &header);
        assert!(matches!(records.get(0, "opacity"), Err(PlyError::UnknownField(name)) if name == "opacity"));
        assert!(records.try_resolve("opacity").is_none());
        assert_eq!(records.read_or_zero(1, None).unwrap(), 0.0);
    }

    #[test]
    fn test_vertices_without_properties() {
        let bytes = b"ply\nformat binary_little_endian 1.0\nelement vertex 10000000000000\nend_header\n";
        let header = parse_header(bytes).unwrap();
        assert_eq!(header.stride, 0);
        let records = PlyRecords::new(bytes, &header);
        assert!(matches!(records.validate(), Err(PlyError::MalformedHeader(_))));

        let empty = b"ply\nelement vertex 0\nend_header\n";
        let header = parse_header(empty).unwrap();
        PlyRecords::new(empty, &header).validate().unwrap();
    }

    #[test]
    fn test_truncated_body() {
        let mut bytes = sample();
        bytes.truncate(bytes.len() - 3);
        let header = parse_header(&bytes).unwrap();
        let records = PlyRecords::new(&bytes, &header);

        match records.validate() {
            Err(PlyError::TruncatedBody { field, index, offset, len }) => {
                assert_eq!(field, "d");
                assert_eq!(index, 1);
                assert_eq!(offset, header.data_offset + 16 + 7);
                assert_eq!(len, bytes.len());
            }
            other => panic!("expected TruncatedBody, got {other:?}"),
        }

        assert_eq!(records.get(1, "x").unwrap(), -4.0);
        match records.get(1, "d") {
            Err(PlyError::TruncatedBody { field, index, .. }) => {
                assert_eq!(field, "d");
                assert_eq!(index, 1);
            }
            other => panic!("expected TruncatedBody, got {other:?}"),
        }
    }
}
