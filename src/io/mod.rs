//! Raster input/output modules

pub mod artifacts;
pub mod band_reader;
pub mod quicklook;
pub mod raster_writer;

pub use artifacts::{evict_expired, ArtifactManifest};
pub use band_reader::BandReader;
pub use quicklook::Quicklook;
pub use raster_writer::RasterWriter;
