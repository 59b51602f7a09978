//! A bidirectional bridge between OME-TIFF and OME-Zarr v0.5.
//!
//! Pixel data is never materialized whole: reading presents an open
//! OME-TIFF as a key-addressed Zarr v3 store, resolving each chunk
//! request against exactly the tiles it covers; writing tiles and
//! compresses one plane at a time from a caller-supplied source,
//! streaming the result out as a single OME-TIFF.
//!
//! ## Architecture
//!
//! - [`dtype`] — the three-way bijection between TIFF sample format,
//!   OME `Type` strings, and Zarr `data_type`.
//! - [`error`] — the layered error types every other module resolves to.
//! - [`io`] — the [`io::ByteSource`] abstraction (file, HTTP range, and
//!   in-memory backends) that both codecs read through.
//! - [`ome`] — the OME-XML data model, tolerant parser, and generator.
//! - [`tiff`] — the TIFF/BigTIFF container codec: header, IFD, tag
//!   vocabulary, and the read/write engines.
//! - [`compression`] — the zlib-wrapped deflate codec used for tile and
//!   strip payloads.
//! - [`indexer`] — plane↔IFD resolution and pyramid detection.
//! - [`zarr`] — Zarr v3 metadata synthesis and the read-side facade.
//! - [`writer`] — the plane-reader collaborator and write orchestrator.
//! - [`cli`] — the `ome-bridge-cli` argument model.
//! - [`convert`] — the thin glue between the library and a local
//!   filesystem, used by `ome-bridge-cli`.
//!
//! ## Example
//!
//! ```no_run
//! use clap::Parser;
//! use ome_bridge::cli::Cli;
//!
//! let cli = Cli::parse();
//! println!("{:?}", cli.command);
//! ```

pub mod cli;
pub mod compression;
pub mod convert;
pub mod dtype;
pub mod error;
pub mod indexer;
pub mod io;
pub mod ome;
pub mod tiff;
pub mod writer;
pub mod zarr;

pub use dtype::{ArrayDType, RasterSampleFormat};
pub use error::{BridgeError, BridgeResult, IoError};
pub use indexer::Indexer;
pub use io::{ByteSource, FileByteSource, HttpRangeByteSource, MemoryByteSource};
pub use ome::{DimensionOrder, OmeChannel, OmeDocument, OmeImage, OmePixels, PlaneSelection};
pub use tiff::{Directory, Ifd, TiffReader};
pub use writer::{write_ome_tiff, PlaneReader, WriteRequest};
pub use zarr::ZarrFacade;
