use log::{debug, warn};
use serde::Serialize;

use crate::error::PlyError;
use crate::half_core::pack_half_2x16;
use crate::ply_header::{HEADER_SCAN_LIMIT, parse_header_with_limit};
use crate::ply_record::{FieldRef, PlyRecords};

/// Texels per texture row.
pub const TEXTURE_WIDTH: u32 = 1024 * 4;

/// Each splat takes 4 RGBA32 texels.
const WORDS_PER_SPLAT: usize = 16;

#[derive(Debug, Clone)]
pub struct ConvertOptions {
    pub texture_width: u32,
    pub header_scan_limit: usize,
    /// Log min/max of every declared field before packing.
    pub report_field_ranges: bool,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            texture_width: TEXTURE_WIDTH,
            header_scan_limit: HEADER_SCAN_LIMIT,
            report_field_ranges: false,
        }
    }
}

impl ConvertOptions {
    pub fn with_texture_width(mut self, texture_width: u32) -> Self {
        self.texture_width = texture_width;
        self
    }

    pub fn with_header_scan_limit(mut self, header_scan_limit: usize) -> Self {
        self.header_scan_limit = header_scan_limit;
        self
    }

    pub fn with_field_ranges(mut self, report_field_ranges: bool) -> Self {
        self.report_field_ranges = report_field_ranges;
        self
    }
}

/// Splat data laid out as a `texwidth x texheight` RGBA32UI texture.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SplatvTextureCore {
    pub texdata: Box<[u32]>, // texwidth * texheight * 4
    pub texwidth: u32,
    pub texheight: u32,
    pub vertex_count: u32,
    /// xyz per splat, same order as `texdata`.
    #[serde(skip)]
    pub positions: Box<[f32]>, // 3N
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldRange {
    pub name: String,
    pub min: f64,
    pub max: f64,
}

fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        let z = (-x).exp();
        1.0 / (1.0 + z)
    } else {
        let z = x.exp();
        z / (1.0 + z)
    }
}

fn clamp255(x: f64) -> u8 {
    if x <= 0.0 {
        0
    } else if x >= 255.0 {
        255
    } else {
        x.floor() as u8
    }
}

fn pack(x: f64, y: f64) -> u32 {
    pack_half_2x16(x as f32, y as f32)
}

/// Every field the packer knows about, resolved once against the header.
struct SplatFields<'a> {
    position: [Option<FieldRef<'a>>; 3],
    rot: [Option<FieldRef<'a>>; 4],
    scale: [Option<FieldRef<'a>>; 3],
    color: [Option<FieldRef<'a>>; 3],
    opacity: Option<FieldRef<'a>>,
    motion: [Option<FieldRef<'a>>; 9],
    omega: [Option<FieldRef<'a>>; 4],
    trbf_center: Option<FieldRef<'a>>,
    trbf_scale: Option<FieldRef<'a>>,
}

impl<'a> SplatFields<'a> {
    fn resolve(records: &PlyRecords<'a>) -> Self {
        let pick = |prefix: &str, i: usize| records.try_resolve(&format!("{prefix}_{i}"));
        Self {
            position: ["x", "y", "z"].map(|n| records.try_resolve(n)),
            rot: std::array::from_fn(|i| pick("rot", i)),
            scale: std::array::from_fn(|i| pick("scale", i)),
            color: std::array::from_fn(|i| pick("f_dc", i)),
            opacity: records.try_resolve("opacity"),
            motion: std::array::from_fn(|i| pick("motion", i)),
            omega: std::array::from_fn(|i| pick("omega", i)),
            trbf_center: records.try_resolve("trbf_center"),
            trbf_scale: records.try_resolve("trbf_scale"),
        }
    }

    fn warn_incomplete(&self) {
        let groups = [
            ("position", self.position.iter().all(Option::is_some)),
            ("scale", self.scale.iter().all(Option::is_some)),
            ("color", self.color.iter().all(Option::is_some)),
        ];
        for (group, present) in groups {
            if !present {
                warn!("splatv: {group} fields incomplete, missing values are packed as 0");
            }
        }
    }
}

/// Reads splat attributes of one record. Absent fields decode to 0.
struct SplatReader<'a> {
    records: PlyRecords<'a>,
    fields: SplatFields<'a>,
}

impl<'a> SplatReader<'a> {
    fn new(records: PlyRecords<'a>) -> Self {
        let fields = SplatFields::resolve(&records);
        Self { records, fields }
    }

    fn raw(&self, row: usize, field: Option<FieldRef<'_>>) -> Result<f64, PlyError> {
        self.records.read_or_zero(row, field)
    }

    /// Decodes a log-encoded field.
    fn exp(&self, row: usize, field: Option<FieldRef<'_>>) -> Result<f64, PlyError> {
        match field {
            Some(f) => Ok(self.records.read(row, f)?.exp()),
            None => Ok(0.0),
        }
    }

    /// Decodes a logit-encoded field.
    fn sigmoid(&self, row: usize, field: Option<FieldRef<'_>>) -> Result<f64, PlyError> {
        match field {
            Some(f) => Ok(sigmoid(self.records.read(row, f)?)),
            None => Ok(0.0),
        }
    }

    fn has_scale(&self) -> bool {
        self.fields.scale.iter().all(Option::is_some)
    }

    fn importance(&self, row: usize) -> Result<f32, PlyError> {
        let [s0, s1, s2] = self.fields.scale;
        let size = self.exp(row, s0)? * self.exp(row, s1)? * self.exp(row, s2)?;
        let opacity = self.sigmoid(row, self.fields.opacity)?;
        Ok((size * opacity) as f32)
    }

    fn position(&self, row: usize) -> Result<[f32; 3], PlyError> {
        let [x, y, z] = self.fields.position;
        Ok([
            self.raw(row, x)? as f32,
            self.raw(row, y)? as f32,
            self.raw(row, z)? as f32,
        ])
    }

    /// Writes the 16 words of record `row`.
    fn pack_into(&self, row: usize, position: [f32; 3], out: &mut [u32]) -> Result<(), PlyError> {
        let f = &self.fields;

        // position, full precision
        out[0] = position[0].to_bits();
        out[1] = position[1].to_bits();
        out[2] = position[2].to_bits();

        // quaternion
        out[3] = pack(self.raw(row, f.rot[0])?, self.raw(row, f.rot[1])?);
        out[4] = pack(self.raw(row, f.rot[2])?, self.raw(row, f.rot[3])?);

        // scale
        out[5] = pack(self.exp(row, f.scale[0])?, self.exp(row, f.scale[1])?);
        out[6] = pack(self.exp(row, f.scale[2])?, 0.0);

        // rgba8
        let r = clamp255(self.raw(row, f.color[0])? * 255.0);
        let g = clamp255(self.raw(row, f.color[1])? * 255.0);
        let b = clamp255(self.raw(row, f.color[2])? * 255.0);
        let a = (self.sigmoid(row, f.opacity)? * 255.0) as u8;
        out[7] = u32::from_le_bytes([r, g, b, a]);

        // movement over time
        let mut motion = [0.0f64; 10];
        for (m, field) in motion.iter_mut().zip(f.motion) {
            *m = self.raw(row, field)?;
        }
        for (k, pair) in motion.chunks_exact(2).enumerate() {
            out[8 + k] = pack(pair[0], pair[1]);
        }

        // rotation over time
        out[13] = pack(self.raw(row, f.omega[0])?, self.raw(row, f.omega[1])?);
        out[14] = pack(self.raw(row, f.omega[2])?, self.raw(row, f.omega[3])?);

        // temporal radial basis
        out[15] = pack(
            self.raw(row, f.trbf_center)?,
            self.exp(row, f.trbf_scale)?,
        );
        Ok(())
    }
}

/// Per-record importance `exp(scale_0) * exp(scale_1) * exp(scale_2) * sigmoid(opacity)`.
///
/// Every score is 0 when the header lacks any of the scale fields.
pub fn importance_scores(records: &PlyRecords<'_>) -> Result<Vec<f32>, PlyError> {
    let reader = SplatReader::new(*records);
    if !reader.has_scale() {
        return Ok(vec![0.0; records.len()]);
    }
    (0..records.len()).map(|row| reader.importance(row)).collect()
}

/// Record indices ordered by descending score.
///
/// The sort is stable: equal scores keep ascending index order. NaN scores go last.
pub fn sort_by_importance(scores: &[f32]) -> Vec<usize> {
    let key = |i: usize| {
        let s = scores[i];
        if s.is_nan() { f32::NEG_INFINITY } else { s }
    };
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| key(b).total_cmp(&key(a)));
    order
}

/// Min and max of every declared field over all records.
pub fn field_ranges(records: &PlyRecords<'_>) -> Result<Vec<FieldRange>, PlyError> {
    let mut ranges = Vec::with_capacity(records.header().fields.len());
    for field in &records.header().fields {
        let field_ref = records.resolve(&field.name)?;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for row in 0..records.len() {
            let v = records.read(row, field_ref)?;
            min = min.min(v);
            max = max.max(v);
        }
        ranges.push(FieldRange {
            name: field.name.clone(),
            min,
            max,
        });
    }
    Ok(ranges)
}

/// Texture height and word count for `count` splats, checked against overflow.
fn texture_size(count: usize, texture_width: u32) -> Result<(u32, u32, usize), PlyError> {
    if texture_width == 0 {
        return Err(PlyError::InvalidTextureWidth(texture_width));
    }
    let too_many = || PlyError::MalformedHeader(format!("vertex count {count} is too large"));
    let vertex_count = u32::try_from(count).map_err(|_| too_many())?;

    let width = texture_width as usize;
    let height = count.checked_mul(4).ok_or_else(too_many)?.div_ceil(width);
    let texheight = u32::try_from(height).map_err(|_| too_many())?;
    let words = width
        .checked_mul(height)
        .and_then(|t| t.checked_mul(4))
        .ok_or_else(too_many)?;
    Ok((vertex_count, texheight, words))
}

/// Packs records in `order` into the splatv texture layout.
pub fn pack_texture(
    records: &PlyRecords<'_>,
    order: &[usize],
    texture_width: u32,
) -> Result<SplatvTextureCore, PlyError> {
    let count = order.len();
    let (vertex_count, texheight, words) = texture_size(count, texture_width)?;

    let reader = SplatReader::new(*records);
    if count > 0 {
        reader.fields.warn_incomplete();
    }
    let mut texdata = vec![0u32; words];
    let mut positions = vec![0.0f32; 3 * count];

    for ((&row, out), pos) in order
        .iter()
        .zip(texdata.chunks_exact_mut(WORDS_PER_SPLAT))
        .zip(positions.chunks_exact_mut(3))
    {
        let position = reader.position(row)?;
        pos.copy_from_slice(&position);
        reader.pack_into(row, position, out)?;
    }

    Ok(SplatvTextureCore {
        texdata: texdata.into_boxed_slice(),
        texwidth: texture_width,
        texheight,
        vertex_count,
        positions: positions.into_boxed_slice(),
    })
}

pub fn convert_ply_to_splatv(bytes: &[u8]) -> Result<SplatvTextureCore, PlyError> {
    convert_ply_to_splatv_with_opts(bytes, &ConvertOptions::default())
}

pub fn convert_ply_to_splatv_with_opts(
    bytes: &[u8],
    opts: &ConvertOptions,
) -> Result<SplatvTextureCore, PlyError> {
    if opts.texture_width == 0 {
        return Err(PlyError::InvalidTextureWidth(opts.texture_width));
    }
    let header = parse_header_with_limit(bytes, opts.header_scan_limit)?;
    let records = PlyRecords::new(bytes, &header);
    records.validate()?;
    // size the texture before scoring allocates anything per record
    texture_size(records.len(), opts.texture_width)?;

    let scores = importance_scores(&records)?;
    debug!("splatv: importance computed for {} splats", scores.len());

    if opts.report_field_ranges {
        for range in field_ranges(&records)? {
            debug!("splatv: {} min {} max {}", range.name, range.min, range.max);
        }
    }

    let order = sort_by_importance(&scores);
    drop(scores);
    debug!("splatv: sorted {} splats by importance", order.len());

    let texture = pack_texture(&records, &order, opts.texture_width)?;
    debug!(
        "splatv: built {}x{} texture, scene bytes {}",
        texture.texwidth,
        texture.texheight,
        texture.texdata.len() * 4
    );
    Ok(texture)
}
