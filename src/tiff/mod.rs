//! The TIFF/BigTIFF container codec (component E): header and IFD parsing,
//! tag vocabulary, value resolution, tile/strip I/O, and the write-side
//! placement engine.

mod header;
mod ifd;
mod reader;
mod tags;
mod value;
mod writer;

pub use header::{TiffHeader, BIGTIFF_HEADER_SIZE, TIFF_HEADER_SIZE};
pub use ifd::{Directory, Value};
pub use reader::{Ifd, TiffReader};
pub use tags::{Compression, FieldType, TiffTag};
pub use writer::{write_tiff, IfdPlan, TiffFormat};
