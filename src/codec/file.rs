use std::fs::File;
use std::io::{BufRead, Write};
use std::path::Path;

use memmap2::Mmap;

use crate::codec::{BinaryCodec, MappedSource, ParticleRecord, StreamSource};
use crate::error::StreamResult;

impl BinaryCodec {
    /// Decode every record of a memory-mapped particle file
    pub fn read_all_mapped(&self, path: &Path, factor: f64) -> StreamResult<Vec<ParticleRecord>> {
        let file = File::open(path)?;
        if file.metadata()?.len() == 0 {
            return Ok(Vec::new());
        }

        // SAFETY: the particle files are written once by the offline generator
        // and only read afterwards; the map is dropped before this returns
        let mmap = unsafe { Mmap::map(&file)? };

        let mut src = MappedSource::new(&mmap);
        let mut records = Vec::new();
        while !src.is_exhausted() {
            records.push(self.decode(&mut src, factor)?);
        }
        Ok(records)
    }

    /// Decode records from a stream until a clean end of input
    pub fn read_all<R: BufRead>(
        &self,
        reader: R,
        factor: f64,
    ) -> StreamResult<Vec<ParticleRecord>> {
        let mut src = StreamSource::new(reader);
        let mut records = Vec::new();
        while !src.get_mut().fill_buf()?.is_empty() {
            records.push(self.decode(&mut src, factor)?);
        }
        Ok(records)
    }

    /// Encode all records back to back
    pub fn write_all<W: Write>(&self, records: &[ParticleRecord], out: &mut W) -> StreamResult<()> {
        for record in records {
            self.encode(record, out)?;
        }
        out.flush()?;
        Ok(())
    }

    /// Write a particle file
    pub fn write_file(&self, path: &Path, records: &[ParticleRecord]) -> StreamResult<()> {
        let mut out = std::io::BufWriter::new(File::create(path)?);
        self.write_all(records, &mut out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::BinaryVersion;
    use glam::DVec3;
    use std::io::BufReader;
    use tempfile::TempDir;

    fn records(n: usize) -> Vec<ParticleRecord> {
        (0..n)
            .map(|i| {
                ParticleRecord::star(
                    DVec3::splat(i as f64),
                    DVec3::ZERO,
                    (0.0, 0.0, 0.0),
                    (10.0 + i as f32, 2.0),
                    0.5,
                    1.0,
                    -1,
                    i as i64,
                    vec![format!("star-{}", i)],
                )
            })
            .collect()
    }

    #[test]
    fn test_mapped_file_reads_all_records() {
        let temp_dir = TempDir::new().expect("Failed to create temporary directory for test");
        let path = temp_dir.path().join("particles_000001.bin");
        let codec = BinaryCodec::for_version(BinaryVersion::V1);
        let written = records(25);

        codec.write_file(&path, &written).expect("Failed to write particle file");
        let mapped = codec.read_all_mapped(&path, 1.0).expect("Failed to map particle file");
        let streamed = codec
            .read_all(BufReader::new(File::open(&path).expect("open")), 1.0)
            .expect("Failed to stream particle file");

        assert_eq!(mapped, written);
        assert_eq!(streamed, written);
    }

    #[test]
    fn test_empty_file_has_no_records() {
        let temp_dir = TempDir::new().expect("Failed to create temporary directory for test");
        let path = temp_dir.path().join("particles_000002.bin");
        File::create(&path).expect("Failed to create empty file");

        let codec = BinaryCodec::for_version(BinaryVersion::V1);
        assert!(codec.read_all_mapped(&path, 1.0).expect("empty read").is_empty());
    }

    #[test]
    fn test_trailing_garbage_fails_batch() {
        let temp_dir = TempDir::new().expect("Failed to create temporary directory for test");
        let path = temp_dir.path().join("particles_000003.bin");
        let codec = BinaryCodec::for_version(BinaryVersion::V1);

        let mut buf = Vec::new();
        codec.write_all(&records(2), &mut buf).expect("encode");
        buf.extend_from_slice(&[0u8; 5]);
        std::fs::write(&path, &buf).expect("write");

        assert!(codec.read_all_mapped(&path, 1.0).is_err());
    }
}
