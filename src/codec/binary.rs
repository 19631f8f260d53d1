//! Big-endian particle record codec
//!
//! Record layout, in order:
//! - `n_doubles` doubles. The first three are positions (scaled by the caller's
//!   factor and the distance scale), the next three velocities (distance
//!   scale). Doubles past the record's double slots are narrowed into the
//!   float array.
//! - `n_floats` floats after the narrowed doubles. The size slot is scaled by
//!   the distance scale.
//! - HIP number as `i32`, kept in the HIP float slot.
//! - Three padding `i32` when the layout has extended ids.
//! - Source id as `i64`.
//! - Name block: `i32` length in UTF-16 units, then the units.

use std::io::{self, Read, Write};

use byteorder::{BigEndian, ByteOrder, ReadBytesExt, WriteBytesExt};

use crate::codec::record::split_names;
use crate::codec::{BinaryLayout, BinaryVersion, ParticleRecord};
use crate::constants::record::{
    EXTENDED_ID_FILL, EXTENDED_ID_SLOTS, I_FHIP, I_FSIZE, POSITION_SLOTS, STAR_SIZE_D,
    STAR_SIZE_F,
};
use crate::constants::units::DISTANCE_SCALE_FACTOR;
use crate::error::StreamResult;

/// Name units reserved up front when the source length is unknown
const NAME_PREALLOC_UNITS: usize = 64;

/// Scalar reads shared by stream and mapped sources
pub trait RecordSource {
    fn read_f64(&mut self) -> io::Result<f64>;
    fn read_f32(&mut self) -> io::Result<f32>;
    fn read_i32(&mut self) -> io::Result<i32>;
    fn read_i64(&mut self) -> io::Result<i64>;
    fn read_u16(&mut self) -> io::Result<u16>;

    /// Bytes left, when the source knows it
    fn remaining_hint(&self) -> Option<usize> {
        None
    }
}

/// Sequential source over any reader
pub struct StreamSource<R> {
    inner: R,
}

impl<R: Read> StreamSource<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> RecordSource for StreamSource<R> {
    fn read_f64(&mut self) -> io::Result<f64> {
        self.inner.read_f64::<BigEndian>()
    }

    fn read_f32(&mut self) -> io::Result<f32> {
        self.inner.read_f32::<BigEndian>()
    }

    fn read_i32(&mut self) -> io::Result<i32> {
        self.inner.read_i32::<BigEndian>()
    }

    fn read_i64(&mut self) -> io::Result<i64> {
        self.inner.read_i64::<BigEndian>()
    }

    fn read_u16(&mut self) -> io::Result<u16> {
        self.inner.read_u16::<BigEndian>()
    }
}

/// Positional source over a mapped (or any in-memory) buffer
#[derive(Debug)]
pub struct MappedSource<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> MappedSource<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn set_position(&mut self, pos: usize) {
        self.pos = pos.min(self.buf.len());
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }

    fn take(&mut self, n: usize) -> io::Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "record truncated: need {} bytes at offset {}, {} left",
                    n,
                    self.pos,
                    self.remaining()
                ),
            ));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }
}

impl RecordSource for MappedSource<'_> {
    fn read_f64(&mut self) -> io::Result<f64> {
        self.take(8).map(BigEndian::read_f64)
    }

    fn read_f32(&mut self) -> io::Result<f32> {
        self.take(4).map(BigEndian::read_f32)
    }

    fn read_i32(&mut self) -> io::Result<i32> {
        self.take(4).map(BigEndian::read_i32)
    }

    fn read_i64(&mut self) -> io::Result<i64> {
        self.take(8).map(BigEndian::read_i64)
    }

    fn read_u16(&mut self) -> io::Result<u16> {
        self.take(2).map(BigEndian::read_u16)
    }

    fn remaining_hint(&self) -> Option<usize> {
        Some(self.remaining())
    }
}

/// Encoder/decoder for one record layout
#[derive(Debug, Clone, Copy)]
pub struct BinaryCodec {
    layout: BinaryLayout,
    distance_scale: f64,
}

impl BinaryCodec {
    pub fn new(layout: BinaryLayout) -> StreamResult<Self> {
        layout.validate()?;
        Ok(Self {
            layout,
            distance_scale: DISTANCE_SCALE_FACTOR,
        })
    }

    pub fn for_version(version: BinaryVersion) -> Self {
        Self {
            layout: version.layout(),
            distance_scale: DISTANCE_SCALE_FACTOR,
        }
    }

    pub fn with_distance_scale(mut self, distance_scale: f64) -> Self {
        self.distance_scale = distance_scale;
        self
    }

    pub fn layout(&self) -> BinaryLayout {
        self.layout
    }

    pub fn distance_scale(&self) -> f64 {
        self.distance_scale
    }

    /// Decode one record
    pub fn decode<S: RecordSource>(&self, src: &mut S, factor: f64) -> io::Result<ParticleRecord> {
        let mut data_d = [0.0f64; STAR_SIZE_D];
        let mut data_f = [0.0f32; STAR_SIZE_F];
        let mut float_offset = 0;

        for i in 0..self.layout.n_doubles {
            let value = src.read_f64()?;
            if i < STAR_SIZE_D {
                let mut value = value;
                if i < POSITION_SLOTS {
                    value *= factor;
                }
                data_d[i] = value * self.distance_scale;
            } else {
                // Narrowed on purpose: old files store float fields as doubles
                let idx = i - STAR_SIZE_D;
                data_f[idx] = value as f32;
                float_offset = idx + 1;
            }
        }

        for i in 0..self.layout.n_floats {
            let idx = i + float_offset;
            let mut value = src.read_f32()?;
            if idx == I_FSIZE {
                value = (value as f64 * self.distance_scale) as f32;
            }
            data_f[idx] = value;
        }

        data_f[I_FHIP] = src.read_i32()? as f32;

        if self.layout.has_extended_id {
            for _ in 0..EXTENDED_ID_SLOTS {
                src.read_i32()?;
            }
        }

        let id = src.read_i64()?;

        let name_len = src.read_i32()?;
        if name_len < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("negative name length {} in record {}", name_len, id),
            ));
        }
        let name_len = name_len as usize;
        if src.remaining_hint().is_some_and(|r| r / 2 < name_len) {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("name of record {} runs past the end of the data", id),
            ));
        }
        let mut units = Vec::with_capacity(name_len.min(NAME_PREALLOC_UNITS));
        for _ in 0..name_len {
            units.push(src.read_u16()?);
        }
        let concat = String::from_utf16(&units).map_err(|e| {
            io::Error::new(io::ErrorKind::InvalidData, format!("record {} name: {}", id, e))
        })?;

        Ok(ParticleRecord::new(data_d, data_f, id, split_names(&concat)))
    }

    pub fn decode_stream<R: Read>(&self, reader: R, factor: f64) -> io::Result<ParticleRecord> {
        self.decode(&mut StreamSource::new(reader), factor)
    }

    /// Encode one record; stored values are written unscaled
    pub fn encode<W: Write>(&self, record: &ParticleRecord, out: &mut W) -> io::Result<()> {
        let data_d = record.data_d();
        let data_f = record.data_f();

        for i in 0..self.layout.n_doubles {
            if i < STAR_SIZE_D {
                out.write_f64::<BigEndian>(data_d[i])?;
            } else {
                out.write_f64::<BigEndian>(data_f[i - STAR_SIZE_D] as f64)?;
            }
        }

        let float_offset = self.layout.narrowed_doubles();
        for i in 0..self.layout.n_floats {
            out.write_f32::<BigEndian>(data_f[i + float_offset])?;
        }

        out.write_i32::<BigEndian>(record.hip())?;

        if self.layout.has_extended_id {
            for _ in 0..EXTENDED_ID_SLOTS {
                out.write_i32::<BigEndian>(EXTENDED_ID_FILL)?;
            }
        }

        out.write_i64::<BigEndian>(record.id())?;

        let units: Vec<u16> = record.names_concat().encode_utf16().collect();
        out.write_i32::<BigEndian>(units.len() as i32)?;
        for unit in units {
            out.write_u16::<BigEndian>(unit)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::record::{I_FCOL, I_FMUALPHA};
    use glam::DVec3;
    use std::io::Cursor;

    fn sample() -> ParticleRecord {
        ParticleRecord::star(
            DVec3::new(1.5e3, -2.25e2, 7.0),
            DVec3::new(0.1, 0.2, -0.3),
            (12.5, -3.75, 41.0),
            (8.25, 1.5),
            0.42,
            1.25e6,
            71683,
            4_472_832_130_942_575_872,
            vec!["alf Cen A".to_string(), "Rigil Kentaurus".to_string()],
        )
    }

    #[test]
    fn test_stream_round_trip_scales_positions() {
        let codec = BinaryCodec::for_version(BinaryVersion::V1).with_distance_scale(2.0);
        let record = sample();

        let mut buf = Vec::new();
        codec.encode(&record, &mut buf).expect("Failed to encode record");
        let decoded = codec
            .decode_stream(Cursor::new(&buf), 3.0)
            .expect("Failed to decode record");

        assert_eq!(decoded.id(), record.id());
        assert_eq!(decoded.names(), record.names());
        assert_eq!(decoded.hip(), 71683);
        assert_eq!(decoded.position(), record.position() * 3.0 * 2.0);
        assert_eq!(decoded.velocity(), record.velocity() * 2.0);
        assert_eq!(decoded.size(), record.size() * 2.0);
        assert_eq!(decoded.appmag(), record.appmag());
        assert_eq!(decoded.col(), record.col());
    }

    #[test]
    fn test_mapped_and_stream_agree() {
        let codec = BinaryCodec::for_version(BinaryVersion::V1);
        let mut buf = Vec::new();
        codec.encode(&sample(), &mut buf).expect("Failed to encode record");

        let from_stream = codec.decode_stream(Cursor::new(&buf), 1.0).expect("stream decode");
        let mut mapped = MappedSource::new(&buf);
        let from_mapped = codec.decode(&mut mapped, 1.0).expect("mapped decode");

        assert_eq!(from_stream, from_mapped);
        assert!(mapped.is_exhausted());
    }

    #[test]
    fn test_compat_layout_narrows_trailing_doubles() {
        let codec = BinaryCodec::for_version(BinaryVersion::V0);
        let mut buf = Vec::new();
        // Six position/velocity doubles, then six doubles narrowed into floats
        for value in [1.0f64, 2.0, 3.0, 4.0, 5.0, 6.0] {
            buf.extend_from_slice(&value.to_be_bytes());
        }
        let precise = 0.1f64;
        for value in [precise, 2.0, 3.0, 4.0, 5.0, 0.3] {
            buf.extend_from_slice(&value.to_be_bytes());
        }
        buf.extend_from_slice(&9.0f32.to_be_bytes()); // size
        buf.extend_from_slice(&(-1i32).to_be_bytes()); // hip
        for _ in 0..3 {
            buf.extend_from_slice(&(-1i32).to_be_bytes());
        }
        buf.extend_from_slice(&77i64.to_be_bytes());
        buf.extend_from_slice(&0i32.to_be_bytes());

        let record = codec.decode(&mut MappedSource::new(&buf), 1.0).expect("compat decode");
        assert_eq!(record.data_f()[I_FMUALPHA], precise as f32);
        assert_eq!(record.data_f()[I_FCOL], 0.3f64 as f32);
        assert_eq!(record.size(), 9.0);
        assert_eq!(record.hip(), -1);
        assert_eq!(record.id(), 77);
        assert_eq!(record.names(), &[String::new()]);

        let mut reencoded = Vec::new();
        codec.encode(&record, &mut reencoded).expect("compat encode");
        let again = codec.decode(&mut MappedSource::new(&reencoded), 1.0).expect("re-decode");
        assert_eq!(again, record);
    }

    #[test]
    fn test_truncated_record_is_io_error() {
        let codec = BinaryCodec::for_version(BinaryVersion::V1);
        let mut buf = Vec::new();
        codec.encode(&sample(), &mut buf).expect("Failed to encode record");
        buf.truncate(buf.len() - 3);

        let err = codec
            .decode(&mut MappedSource::new(&buf), 1.0)
            .expect_err("Truncated record must fail");
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);

        let err = codec
            .decode_stream(Cursor::new(&buf), 1.0)
            .expect_err("Truncated stream must fail");
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_oversized_name_length_fails_cleanly() {
        let codec = BinaryCodec::for_version(BinaryVersion::V1);
        let record = ParticleRecord::new([0.0; 6], [0.0; 8], 5, vec![String::new()]);
        let mut buf = Vec::new();
        codec.encode(&record, &mut buf).expect("Failed to encode record");

        // Empty name, so the length field is the last four bytes
        let at = buf.len() - 4;
        buf[at..].copy_from_slice(&i32::MAX.to_be_bytes());

        let err = codec
            .decode(&mut MappedSource::new(&buf), 1.0)
            .expect_err("Oversized name must fail");
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);

        let err = codec
            .decode_stream(Cursor::new(&buf), 1.0)
            .expect_err("Oversized name must fail");
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
