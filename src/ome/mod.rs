//! The OME-XML data model (§3), parser (component C, §4.C) and generator
//! (component D, §4.D).

mod generator;
mod model;
mod parser;

pub use generator::{generate_ome_xml, GeneratorChannel, GeneratorInput};
pub use model::{
    Dimension, DimensionOrder, OmeChannel, OmeDocument, OmeImage, OmePixels, PhysicalUnit,
    PlaneSelection, PyramidInfo, TiffDataEntry,
};
pub use parser::{is_ome_xml, parse_ome_xml};
