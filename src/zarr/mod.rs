//! The OME-Zarr v3 read side: metadata synthesis (§6.1) and the
//! key-addressed facade over an open OME-TIFF (component G, §4.G).

mod facade;
mod metadata;

pub use facade::ZarrFacade;
pub use metadata::{
    array_document, emitted_axes, level_geometry, root_group_document, ArrayDocument, Axis,
    AxisKind, LevelGeometry, OmeMultiscale, RootGroupDocument,
};
