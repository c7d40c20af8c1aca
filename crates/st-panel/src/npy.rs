// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Minimal reader and writer for NumPy `.npy` arrays.
//!
//! Only C-ordered, little-endian (or byte-order free) payloads are accepted:
//! that is what `np.save` produces on every platform the training tree runs
//! on. Fortran-ordered or big-endian files are rejected instead of being
//! silently transposed or byte-swapped.

use std::fs;
use std::path::Path;

use ndarray::{ArrayD, IxDyn};

use crate::error::{PanelError, PanelResult};

const MAGIC: &[u8; 6] = b"\x93NUMPY";
const HEADER_ALIGN: usize = 64;

/// Element type recorded in the `descr` field of the header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dtype {
    F32,
    F64,
    U8,
    I8,
    I16,
    I32,
    I64,
    U16,
    U32,
    U64,
    Bool,
}

impl Dtype {
    fn parse(descr: &str) -> Option<Self> {
        let mut chars = descr.chars();
        let order = chars.next()?;
        let code = chars.as_str();
        let dtype = match code {
            "f4" => Dtype::F32,
            "f8" => Dtype::F64,
            "u1" => Dtype::U8,
            "i1" => Dtype::I8,
            "i2" => Dtype::I16,
            "i4" => Dtype::I32,
            "i8" => Dtype::I64,
            "u2" => Dtype::U16,
            "u4" => Dtype::U32,
            "u8" => Dtype::U64,
            "b1" => Dtype::Bool,
            _ => return None,
        };
        let little = match order {
            '<' | '|' => true,
            '=' => cfg!(target_endian = "little"),
            _ => false,
        };
        if little || dtype.item_size() == 1 {
            Some(dtype)
        } else {
            None
        }
    }

    pub fn item_size(self) -> usize {
        match self {
            Dtype::U8 | Dtype::I8 | Dtype::Bool => 1,
            Dtype::I16 | Dtype::U16 => 2,
            Dtype::F32 | Dtype::I32 | Dtype::U32 => 4,
            Dtype::F64 | Dtype::I64 | Dtype::U64 => 8,
        }
    }

    fn descr(self) -> &'static str {
        match self {
            Dtype::F32 => "<f4",
            Dtype::F64 => "<f8",
            Dtype::U8 => "|u1",
            Dtype::I8 => "|i1",
            Dtype::I16 => "<i2",
            Dtype::I32 => "<i4",
            Dtype::I64 => "<i8",
            Dtype::U16 => "<u2",
            Dtype::U32 => "<u4",
            Dtype::U64 => "<u8",
            Dtype::Bool => "|b1",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
enum NpyData {
    F32(Vec<f32>),
    F64(Vec<f64>),
    U8(Vec<u8>),
    /// Every other integer (and boolean) dtype, widened.
    Int(Vec<i64>),
}

/// A decoded array: shape plus typed, C-ordered values.
#[derive(Clone, Debug, PartialEq)]
pub struct NpyArray {
    shape: Vec<usize>,
    dtype: Dtype,
    data: NpyData,
}

impl NpyArray {
    pub fn from_f64(array: ArrayD<f64>) -> Self {
        Self {
            shape: array.shape().to_vec(),
            dtype: Dtype::F64,
            data: NpyData::F64(array.iter().copied().collect()),
        }
    }

    pub fn from_f32(array: ArrayD<f32>) -> Self {
        Self {
            shape: array.shape().to_vec(),
            dtype: Dtype::F32,
            data: NpyData::F32(array.iter().copied().collect()),
        }
    }

    pub fn from_u8(array: ArrayD<u8>) -> Self {
        Self {
            shape: array.shape().to_vec(),
            dtype: Dtype::U8,
            data: NpyData::U8(array.iter().copied().collect()),
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    pub fn dtype(&self) -> Dtype {
        self.dtype
    }

    /// Values widened to `f64`, keeping the stored shape.
    pub fn to_f64(&self) -> ArrayD<f64> {
        let values: Vec<f64> = match &self.data {
            NpyData::F32(v) => v.iter().map(|&x| x as f64).collect(),
            NpyData::F64(v) => v.clone(),
            NpyData::U8(v) => v.iter().map(|&x| x as f64).collect(),
            NpyData::Int(v) => v.iter().map(|&x| x as f64).collect(),
        };
        // length was validated against the shape at construction
        ArrayD::from_shape_vec(IxDyn(&self.shape), values)
            .unwrap_or_else(|_| ArrayD::zeros(IxDyn(&self.shape)))
    }

    /// Values as 8-bit channels. Non-`u8` data is rounded and saturated.
    pub fn to_u8(&self) -> ArrayD<u8> {
        let values: Vec<u8> = match &self.data {
            NpyData::U8(v) => v.clone(),
            NpyData::F32(v) => v.iter().map(|&x| saturate_u8(x as f64)).collect(),
            NpyData::F64(v) => v.iter().map(|&x| saturate_u8(x)).collect(),
            NpyData::Int(v) => v.iter().map(|&x| x.clamp(0, 255) as u8).collect(),
        };
        ArrayD::from_shape_vec(IxDyn(&self.shape), values)
            .unwrap_or_else(|_| ArrayD::zeros(IxDyn(&self.shape)))
    }

    /// Serialises the array as a version 1.0 `.npy` payload.
    pub fn encode(&self) -> Vec<u8> {
        let (dtype, body): (Dtype, Vec<u8>) = match &self.data {
            NpyData::F32(v) => (Dtype::F32, v.iter().flat_map(|x| x.to_le_bytes()).collect()),
            NpyData::F64(v) => (Dtype::F64, v.iter().flat_map(|x| x.to_le_bytes()).collect()),
            NpyData::U8(v) => (Dtype::U8, v.clone()),
            NpyData::Int(v) => (Dtype::I64, v.iter().flat_map(|x| x.to_le_bytes()).collect()),
        };
        let shape = match self.shape.as_slice() {
            [] => "()".to_string(),
            [single] => format!("({single},)"),
            dims => format!(
                "({})",
                dims.iter()
                    .map(|d| d.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        };
        let mut header = format!(
            "{{'descr': '{}', 'fortran_order': False, 'shape': {}, }}",
            dtype.descr(),
            shape
        );
        // magic + version + u16 length + header + '\n'
        let unpadded = MAGIC.len() + 2 + 2 + header.len() + 1;
        let padding = (HEADER_ALIGN - unpadded % HEADER_ALIGN) % HEADER_ALIGN;
        header.extend(std::iter::repeat(' ').take(padding));
        header.push('\n');

        let mut out = Vec::with_capacity(MAGIC.len() + 4 + header.len() + body.len());
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&[1, 0]);
        out.extend_from_slice(&(header.len() as u16).to_le_bytes());
        out.extend_from_slice(header.as_bytes());
        out.extend_from_slice(&body);
        out
    }

    /// Decodes an in-memory `.npy` payload; `origin` is only used in errors.
    pub fn decode(bytes: &[u8], origin: &Path) -> PanelResult<Self> {
        if bytes.len() < MAGIC.len() + 2 || &bytes[..MAGIC.len()] != MAGIC {
            return Err(PanelError::malformed(origin, "missing NUMPY magic string"));
        }
        let major = bytes[MAGIC.len()];
        let (len_width, header_start) = match major {
            1 => (2, MAGIC.len() + 2 + 2),
            2 | 3 => (4, MAGIC.len() + 2 + 4),
            other => {
                return Err(PanelError::malformed(
                    origin,
                    format!("unsupported format version {other}"),
                ))
            }
        };
        if bytes.len() < header_start {
            return Err(PanelError::malformed(origin, "truncated header length"));
        }
        let len_bytes = &bytes[MAGIC.len() + 2..header_start];
        let header_len = if len_width == 2 {
            u16::from_le_bytes([len_bytes[0], len_bytes[1]]) as usize
        } else {
            u32::from_le_bytes([len_bytes[0], len_bytes[1], len_bytes[2], len_bytes[3]]) as usize
        };
        let data_start = header_start + header_len;
        if bytes.len() < data_start {
            return Err(PanelError::malformed(origin, "truncated header"));
        }
        let header = std::str::from_utf8(&bytes[header_start..data_start])
            .map_err(|_| PanelError::malformed(origin, "header is not valid text"))?;
        let header = Header::parse(header).map_err(|reason| PanelError::malformed(origin, reason))?;

        let expected = header
            .shape
            .iter()
            .try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
            .and_then(|count| count.checked_mul(header.dtype.item_size()))
            .ok_or_else(|| PanelError::malformed(origin, "shape overflows"))?;
        let body = &bytes[data_start..];
        if body.len() != expected {
            return Err(PanelError::malformed(
                origin,
                format!(
                    "payload holds {} bytes but shape {:?} of {:?} needs {expected}",
                    body.len(),
                    header.shape,
                    header.dtype
                ),
            ));
        }

        let data = decode_body(header.dtype, body);
        Ok(Self {
            shape: header.shape,
            dtype: header.dtype,
            data,
        })
    }
}

fn saturate_u8(value: f64) -> u8 {
    if value.is_nan() {
        0
    } else {
        value.round().clamp(0.0, 255.0) as u8
    }
}

fn decode_body(dtype: Dtype, body: &[u8]) -> NpyData {
    fn words<const N: usize>(body: &[u8]) -> impl Iterator<Item = [u8; N]> + '_ {
        body.chunks_exact(N).map(|chunk| {
            let mut word = [0u8; N];
            word.copy_from_slice(chunk);
            word
        })
    }

    match dtype {
        Dtype::F32 => NpyData::F32(words::<4>(body).map(f32::from_le_bytes).collect()),
        Dtype::F64 => NpyData::F64(words::<8>(body).map(f64::from_le_bytes).collect()),
        Dtype::U8 => NpyData::U8(body.to_vec()),
        Dtype::Bool => NpyData::Int(body.iter().map(|&b| (b != 0) as i64).collect()),
        Dtype::I8 => NpyData::Int(body.iter().map(|&b| b as i8 as i64).collect()),
        Dtype::I16 => NpyData::Int(
            words::<2>(body)
                .map(|w| i16::from_le_bytes(w) as i64)
                .collect(),
        ),
        Dtype::U16 => NpyData::Int(
            words::<2>(body)
                .map(|w| u16::from_le_bytes(w) as i64)
                .collect(),
        ),
        Dtype::I32 => NpyData::Int(
            words::<4>(body)
                .map(|w| i32::from_le_bytes(w) as i64)
                .collect(),
        ),
        Dtype::U32 => NpyData::Int(
            words::<4>(body)
                .map(|w| u32::from_le_bytes(w) as i64)
                .collect(),
        ),
        Dtype::I64 => NpyData::Int(words::<8>(body).map(i64::from_le_bytes).collect()),
        Dtype::U64 => NpyData::Int(
            words::<8>(body)
                .map(|w| i64::try_from(u64::from_le_bytes(w)).unwrap_or(i64::MAX))
                .collect(),
        ),
    }
}

#[derive(Debug)]
struct Header {
    dtype: Dtype,
    shape: Vec<usize>,
}

impl Header {
    fn parse(text: &str) -> Result<Self, String> {
        let descr = dict_value(text, "descr").ok_or("header has no 'descr'")?;
        let descr = descr
            .strip_prefix(['\'', '"'])
            .and_then(|rest| rest.split(['\'', '"']).next())
            .ok_or("'descr' is not a string")?;
        let dtype = Dtype::parse(descr).ok_or_else(|| format!("unsupported dtype '{descr}'"))?;

        let fortran = dict_value(text, "fortran_order").ok_or("header has no 'fortran_order'")?;
        if fortran.starts_with("True") {
            return Err("fortran-ordered arrays are not supported".into());
        }
        if !fortran.starts_with("False") {
            return Err("'fortran_order' is not a boolean".into());
        }

        let shape = dict_value(text, "shape").ok_or("header has no 'shape'")?;
        let inner = shape
            .strip_prefix('(')
            .and_then(|rest| rest.split(')').next())
            .ok_or("'shape' is not a tuple")?;
        let shape = inner
            .split(',')
            .map(str::trim)
            .filter(|dim| !dim.is_empty())
            .map(|dim| {
                dim.trim_end_matches('L')
                    .parse::<usize>()
                    .map_err(|_| format!("invalid dimension '{dim}'"))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { dtype, shape })
    }
}

fn dict_value<'a>(text: &'a str, key: &str) -> Option<&'a str> {
    for quote in ['\'', '"'] {
        let needle = format!("{quote}{key}{quote}");
        if let Some(pos) = text.find(&needle) {
            let rest = text[pos + needle.len()..].trim_start();
            return rest.strip_prefix(':').map(str::trim_start);
        }
    }
    None
}

/// Reads and decodes the `.npy` file at `path`.
pub fn read_npy(path: &Path) -> PanelResult<NpyArray> {
    let bytes = fs::read(path).map_err(|err| PanelError::io(path, err))?;
    NpyArray::decode(&bytes, path)
}

/// Writes `array` to `path` as a version 1.0 `.npy` file.
pub fn write_npy(path: &Path, array: &NpyArray) -> PanelResult<()> {
    fs::write(path, array.encode()).map_err(|err| PanelError::io(path, err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn raw(header: &str, body: &[u8]) -> Vec<u8> {
        let mut out = MAGIC.to_vec();
        out.extend_from_slice(&[1, 0]);
        out.extend_from_slice(&(header.len() as u16).to_le_bytes());
        out.extend_from_slice(header.as_bytes());
        out.extend_from_slice(body);
        out
    }

    #[test]
    fn encoded_header_is_aligned() {
        let array = NpyArray::from_f64(array![[1.0, 2.0, 3.0]].into_dyn());
        let bytes = array.encode();
        let header_len = u16::from_le_bytes([bytes[8], bytes[9]]) as usize;
        assert_eq!((10 + header_len) % 64, 0);
        assert_eq!(bytes[10 + header_len - 1], b'\n');
        assert_eq!(bytes.len(), 10 + header_len + 3 * 8);
    }

    #[test]
    fn decodes_numpy_style_float32_header() {
        let body: Vec<u8> = [1.5f32, -2.0, 0.25, 4.0]
            .iter()
            .flat_map(|x| x.to_le_bytes())
            .collect();
        let bytes = raw(
            "{'descr': '<f4', 'fortran_order': False, 'shape': (2, 2), }   \n",
            &body,
        );
        let array = NpyArray::decode(&bytes, Path::new("hx.npy")).unwrap();
        assert_eq!(array.shape(), &[2, 2]);
        assert_eq!(array.dtype(), Dtype::F32);
        assert_eq!(array.to_f64(), array![[1.5, -2.0], [0.25, 4.0]].into_dyn());
    }

    #[test]
    fn decodes_version_two_headers_and_scalars() {
        let header = "{'descr': '<i8', 'fortran_order': False, 'shape': (), }\n";
        let mut bytes = MAGIC.to_vec();
        bytes.extend_from_slice(&[2, 0]);
        bytes.extend_from_slice(&(header.len() as u32).to_le_bytes());
        bytes.extend_from_slice(header.as_bytes());
        bytes.extend_from_slice(&7i64.to_le_bytes());
        let array = NpyArray::decode(&bytes, Path::new("scalar.npy")).unwrap();
        assert_eq!(array.ndim(), 0);
        assert_eq!(array.to_f64().iter().copied().collect::<Vec<_>>(), vec![7.0]);
    }

    #[test]
    fn zero_length_leading_axis_is_valid() {
        let bytes = raw(
            "{'descr': '|u1', 'fortran_order': False, 'shape': (0, 4, 4, 3), }\n",
            &[],
        );
        let array = NpyArray::decode(&bytes, Path::new("obs.npy")).unwrap();
        assert_eq!(array.shape(), &[0, 4, 4, 3]);
        assert_eq!(array.to_u8().len(), 0);
    }

    #[test]
    fn rejects_fortran_order_and_big_endian() {
        let fortran = raw(
            "{'descr': '<f8', 'fortran_order': True, 'shape': (1,), }\n",
            &1.0f64.to_le_bytes(),
        );
        let err = NpyArray::decode(&fortran, Path::new("f.npy")).unwrap_err();
        assert!(matches!(err, PanelError::Malformed { .. }));

        let big = raw(
            "{'descr': '>f8', 'fortran_order': False, 'shape': (1,), }\n",
            &1.0f64.to_be_bytes(),
        );
        assert!(NpyArray::decode(&big, Path::new("b.npy")).is_err());
    }

    #[test]
    fn rejects_short_payloads() {
        let bytes = raw(
            "{'descr': '<f8', 'fortran_order': False, 'shape': (3,), }\n",
            &1.0f64.to_le_bytes(),
        );
        let err = NpyArray::decode(&bytes, Path::new("short.npy")).unwrap_err();
        assert!(err.to_string().contains("short.npy"));
    }

    #[test]
    fn oversized_shapes_are_malformed() {
        let bytes = raw(
            "{'descr': '<f8', 'fortran_order': False, 'shape': (4294967296, 4294967296, 2), }\n",
            &[],
        );
        let err = NpyArray::decode(&bytes, Path::new("huge.npy")).unwrap_err();
        assert!(matches!(
            err,
            PanelError::Malformed { ref reason, .. } if reason == "shape overflows"
        ));
    }

    #[test]
    fn float_pixels_saturate_into_bytes() {
        let array = NpyArray::from_f64(array![-3.0, 12.4, 12.6, 400.0, f64::NAN].into_dyn());
        let bytes: Vec<u8> = array.to_u8().iter().copied().collect();
        assert_eq!(bytes, vec![0, 12, 13, 255, 0]);
    }

    #[test]
    fn files_round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("obs.npy");
        let array = NpyArray::from_u8(array![[[1u8, 2, 3]]].into_dyn());
        write_npy(&path, &array).unwrap();
        assert_eq!(read_npy(&path).unwrap(), array);
    }
}
