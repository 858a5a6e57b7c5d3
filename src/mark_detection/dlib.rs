//! Reader for dlib's serialized `shape_predictor` models.
//!
//! dlib writes integers as a control byte (bit 7 = sign, low nibble = byte count)
//! followed by little-endian magnitude bytes, and floats as an integer mantissa
//! and exponent pair.

use super::shape_predictor::{CascadeStage, RegressionTree, ShapePredictor, SplitNode};
use crate::{types::Point2f, Error, Result};
use std::io::Read;

const SHAPE_PREDICTOR_VERSION: i64 = 1;

/// Upper bound on preallocation so a corrupt length cannot exhaust memory up front
const MAX_PREALLOCATION: usize = 4096;

struct DlibReader<R: Read> {
    inner: R,
}

impl<R: Read> DlibReader<R> {
    fn new(inner: R) -> Self {
        Self { inner }
    }

    fn byte(&mut self) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.inner.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    fn int(&mut self) -> Result<i64> {
        let control = self.byte()?;
        let size = usize::from(control & 0x0F);
        if size > 8 {
            return Err(Error::ModelValidationError(format!(
                "Integer field of {size} bytes in dlib stream"
            )));
        }

        let mut magnitude = 0u64;
        for shift in 0..size {
            magnitude |= u64::from(self.byte()?) << (8 * shift);
        }

        let value = i64::try_from(magnitude).map_err(|_| {
            Error::ModelValidationError(format!("Integer {magnitude} overflows in dlib stream"))
        })?;
        Ok(if control & 0x80 != 0 { -value } else { value })
    }

    fn count(&mut self) -> Result<usize> {
        let value = self.int()?;
        usize::try_from(value)
            .map_err(|_| Error::ModelValidationError(format!("Negative count {value} in dlib stream")))
    }

    fn index(&mut self) -> Result<u32> {
        let value = self.int()?;
        u32::try_from(value)
            .map_err(|_| Error::ModelValidationError(format!("Invalid index {value} in dlib stream")))
    }

    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    fn float(&mut self) -> Result<f32> {
        let mantissa = self.int()?;
        let exponent = self.int()?;
        if mantissa == 0 {
            return Ok(0.0);
        }

        let exponent = i32::try_from(exponent)
            .map_err(|_| Error::ModelValidationError(format!("Float exponent {exponent} out of range")))?;
        Ok((mantissa as f64 * 2f64.powi(exponent)) as f32)
    }

    /// A column vector of interleaved x, y values.
    fn points(&mut self) -> Result<Vec<Point2f>> {
        // Current dlib writes negated dimensions; older files wrote them as is
        let rows = self.int()?.unsigned_abs();
        let cols = self.int()?.unsigned_abs();
        if cols != 1 || rows % 2 != 0 {
            return Err(Error::ModelValidationError(format!(
                "Expected a 2N x 1 shape matrix, got {rows} x {cols}"
            )));
        }

        let num_points = usize::try_from(rows / 2)
            .map_err(|_| Error::ModelValidationError(format!("Shape matrix with {rows} rows")))?;
        let mut points = Vec::with_capacity(num_points.min(MAX_PREALLOCATION));
        for _ in 0..num_points {
            let x = self.float()?;
            let y = self.float()?;
            points.push(Point2f::new(x, y));
        }
        Ok(points)
    }

    fn vec_of<T>(&mut self, mut item: impl FnMut(&mut Self) -> Result<T>) -> Result<Vec<T>> {
        let len = self.count()?;
        let mut items = Vec::with_capacity(len.min(MAX_PREALLOCATION));
        for _ in 0..len {
            items.push(item(self)?);
        }
        Ok(items)
    }

    fn tree(&mut self) -> Result<RegressionTree> {
        let splits = self.vec_of(|r| {
            Ok(SplitNode {
                feature1: r.index()?,
                feature2: r.index()?,
                threshold: r.float()?,
            })
        })?;
        let leaf_values = self.vec_of(Self::points)?;
        Ok(RegressionTree::new(splits, leaf_values))
    }
}

/// Parse a dlib `shape_predictor` stream.
///
/// # Errors
///
/// Returns an error on a truncated stream, an unsupported version, or a model
/// that fails [`ShapePredictor::new`] validation.
pub(crate) fn read_shape_predictor<R: Read>(reader: R) -> Result<ShapePredictor> {
    let mut r = DlibReader::new(reader);

    let version = r.int()?;
    if version != SHAPE_PREDICTOR_VERSION {
        return Err(Error::ModelValidationError(format!(
            "Unsupported shape_predictor version {version}"
        )));
    }

    let mean_shape = r.points()?;
    let forests = r.vec_of(|r| r.vec_of(DlibReader::tree))?;
    let anchors = r.vec_of(|r| r.vec_of(DlibReader::index))?;
    let offsets = r.vec_of(|r| {
        r.vec_of(|r| {
            let x = r.float()?;
            let y = r.float()?;
            Ok(Point2f::new(x, y))
        })
    })?;

    if anchors.len() != forests.len() || offsets.len() != forests.len() {
        return Err(Error::ModelValidationError(format!(
            "{} forests but {} anchor tables and {} offset tables",
            forests.len(),
            anchors.len(),
            offsets.len()
        )));
    }

    let stages = forests
        .into_iter()
        .zip(anchors)
        .zip(offsets)
        .map(|((trees, anchors), offsets)| CascadeStage::new(trees, anchors, offsets))
        .collect();

    ShapePredictor::new(mean_shape, stages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mark_detection::shape_predictor::tests::two_leaf_predictor;

    /// Minimal dlib stream writer for building fixtures.
    #[derive(Default)]
    struct Writer(Vec<u8>);

    impl Writer {
        fn int(&mut self, value: i64) -> &mut Self {
            let magnitude = value.unsigned_abs();
            let bytes: Vec<u8> = magnitude
                .to_le_bytes()
                .into_iter()
                .take_while({
                    let mut remaining = magnitude;
                    move |_| {
                        let more = remaining != 0;
                        remaining >>= 8;
                        more
                    }
                })
                .collect();
            let sign = if value < 0 { 0x80 } else { 0x00 };
            self.0.push(sign | bytes.len() as u8);
            self.0.extend(bytes);
            self
        }

        /// Exact for the dyadic values the fixtures use
        fn float(&mut self, value: f32) -> &mut Self {
            let mantissa = (f64::from(value) * 1024.0) as i64;
            self.int(mantissa);
            if mantissa == 0 {
                self.int(0)
            } else {
                self.int(-10)
            }
        }

        fn points(&mut self, points: &[(f32, f32)]) -> &mut Self {
            self.int(-(points.len() as i64 * 2)).int(-1);
            for &(x, y) in points {
                self.float(x).float(y);
            }
            self
        }
    }

    /// The same model as `two_leaf_predictor`, in dlib's encoding.
    fn two_leaf_stream() -> Vec<u8> {
        let mut w = Writer::default();
        w.int(1);
        w.points(&[(0.25, 0.5), (0.75, 0.5), (0.5, 0.5)]);

        // One forest holding one tree
        w.int(1).int(1);
        w.int(1).int(0).int(1).float(0.0);
        w.int(2);
        w.points(&[(0.125, 0.0); 3]).points(&[(0.0, 0.125); 3]);

        // Anchor table
        w.int(1).int(2).int(0).int(1);

        // Offset table
        w.int(1).int(2);
        w.float(0.0).float(0.0).float(0.0).float(0.0);
        w.0
    }

    #[test]
    fn test_integer_encoding() {
        let mut w = Writer::default();
        for v in [0, 1, 127, 128, 255, 256, -1, -300, 70_000] {
            w.int(v);
        }

        let mut r = DlibReader::new(&w.0[..]);
        for v in [0, 1, 127, 128, 255, 256, -1, -300, 70_000] {
            assert_eq!(r.int().unwrap(), v);
        }
    }

    #[test]
    fn test_float_encoding() {
        let mut w = Writer::default();
        for v in [0.0, 1.0, -1.0, 0.5, 0.125, 3.75] {
            w.float(v);
        }

        let mut r = DlibReader::new(&w.0[..]);
        for v in [0.0f32, 1.0, -1.0, 0.5, 0.125, 3.75] {
            assert_eq!(r.float().unwrap(), v);
        }
    }

    #[test]
    fn test_read_shape_predictor() {
        let predictor = read_shape_predictor(&two_leaf_stream()[..]).unwrap();
        assert_eq!(predictor.num_landmarks(), 3);
        assert_eq!(predictor.num_stages(), 1);
        assert_eq!(predictor.mean_shape(), two_leaf_predictor().mean_shape());
    }

    #[test]
    fn test_truncated_stream() {
        let stream = two_leaf_stream();
        let result = read_shape_predictor(&stream[..stream.len() - 3]);
        assert!(matches!(result, Err(Error::Io(_))));
    }

    #[test]
    fn test_unsupported_version() {
        let mut stream = two_leaf_stream();
        // Version 1 is encoded as [0x01, 0x01]; bump the value byte
        stream[1] = 2;
        assert!(matches!(
            read_shape_predictor(&stream[..]),
            Err(Error::ModelValidationError(_))
        ));
    }

    #[test]
    fn test_oversized_integer_rejected() {
        let mut r = DlibReader::new(&[0x0Fu8, 0, 0][..]);
        assert!(r.int().is_err());
    }
}
