// Binary particle record codec
// Fixed-layout star records, read from streams or memory-mapped files

pub mod binary;
pub mod file;
pub mod layout;
pub mod record;

pub use binary::{BinaryCodec, MappedSource, RecordSource, StreamSource};
pub use layout::{BinaryLayout, BinaryVersion};
pub use record::ParticleRecord;
