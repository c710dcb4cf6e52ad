//! Output naming: the mapping from original to final names.

mod mapping;

pub use mapping::MappingWriter;
