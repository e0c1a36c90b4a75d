/// Errors raised while converting a PLY buffer to the splatv texture layout.
#[derive(Debug, thiserror::Error)]
pub enum PlyError {
    /// No `end_header` line inside the scanned prefix of the buffer.
    #[error("PLY: can't find end_header within the first {scanned} bytes")]
    HeaderNotFound { scanned: usize },

    /// The header is missing a declaration the converter depends on.
    #[error("PLY: malformed header: {0}")]
    MalformedHeader(String),

    /// A field was requested that the header does not declare.
    #[error("PLY: property `{0}` not found")]
    UnknownField(String),

    /// The body ended before the requested record field.
    #[error(
        "PLY: body truncated reading `{field}` of record {index} at byte {offset} (buffer is {len} bytes)"
    )]
    TruncatedBody {
        field: String,
        index: usize,
        offset: usize,
        len: usize,
    },

    /// Texture width must be non-zero.
    #[error("splatv: invalid texture width {0}")]
    InvalidTextureWidth(u32),
}
