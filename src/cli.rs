//! Command-line argument model for `ome-bridge-cli`: two subcommands,
//! `to-zarr` and `to-tiff`, each carrying only the flags its direction
//! of conversion actually needs. No server, auth, or cache-tuning flags
//! exist here — there is no long-running process to tune.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::tiff::{Compression, TiffFormat};
use crate::writer::DEFAULT_MAX_CONCURRENCY;

pub const DEFAULT_TILE_SIZE: u32 = 512;
pub const DEFAULT_DEFLATE_LEVEL: u32 = 6;

#[derive(Parser, Debug)]
#[command(name = "ome-bridge-cli")]
#[command(author, version, about = "Convert between OME-TIFF and OME-Zarr v0.5", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose (debug-level) logging.
    #[arg(short, long, global = true, default_value_t = false, env = "OME_BRIDGE_VERBOSE")]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Read an OME-TIFF file and materialize it as an OME-Zarr v0.5 store on disk.
    ToZarr(ToZarrArgs),
    /// Read a local OME-Zarr v0.5 store and write it out as a single OME-TIFF file.
    ToTiff(ToTiffArgs),
}

#[derive(clap::Args, Debug)]
pub struct ToZarrArgs {
    /// Path to the source OME-TIFF (or BigTIFF) file.
    pub input: PathBuf,

    /// Directory the Zarr store is written into; created if missing.
    pub output: PathBuf,
}

#[derive(clap::Args, Debug)]
pub struct ToTiffArgs {
    /// Path to the source OME-Zarr v0.5 store directory.
    pub input: PathBuf,

    /// Path of the OME-TIFF file to write.
    pub output: PathBuf,

    /// Tile edge length for the emitted IFDs; 0 writes single-strip IFDs.
    #[arg(long, default_value_t = DEFAULT_TILE_SIZE, env = "OME_BRIDGE_TILE_SIZE")]
    pub tile_size: u32,

    /// Compress tile/strip payloads with zlib-wrapped deflate.
    #[arg(long, default_value_t = true, env = "OME_BRIDGE_COMPRESS")]
    pub compress: bool,

    /// Deflate level, 1 (fastest) to 9 (smallest); only consulted with `--compress`.
    #[arg(long, default_value_t = DEFAULT_DEFLATE_LEVEL, env = "OME_BRIDGE_DEFLATE_LEVEL")]
    pub deflate_level: u32,

    /// Force classic (32-bit offset) or BigTIFF (64-bit offset) output; omitted auto-selects by size.
    #[arg(long, value_enum, env = "OME_BRIDGE_FORMAT")]
    pub format: Option<TiffFormatArg>,

    /// Maximum number of planes encoded concurrently.
    #[arg(long, default_value_t = DEFAULT_MAX_CONCURRENCY, env = "OME_BRIDGE_CONCURRENCY")]
    pub max_concurrency: usize,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum TiffFormatArg {
    Classic,
    BigTiff,
}

impl ToTiffArgs {
    pub fn compression(&self) -> Compression {
        if self.compress {
            Compression::AdobeDeflate
        } else {
            Compression::None
        }
    }

    pub fn tiff_format(&self) -> TiffFormat {
        match self.format {
            Some(TiffFormatArg::Classic) => TiffFormat::Classic,
            Some(TiffFormatArg::BigTiff) => TiffFormat::BigTiff,
            None => TiffFormat::Auto,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_zarr_parses_positional_paths() {
        let cli = Cli::parse_from(["ome-bridge-cli", "to-zarr", "in.ome.tif", "out-dir"]);
        match cli.command {
            Command::ToZarr(args) => {
                assert_eq!(args.input, PathBuf::from("in.ome.tif"));
                assert_eq!(args.output, PathBuf::from("out-dir"));
            }
            Command::ToTiff(_) => panic!("expected ToZarr"),
        }
    }

    #[test]
    fn to_tiff_defaults_match_constants() {
        let cli = Cli::parse_from(["ome-bridge-cli", "to-tiff", "store", "out.ome.tif"]);
        match cli.command {
            Command::ToTiff(args) => {
                assert_eq!(args.tile_size, DEFAULT_TILE_SIZE);
                assert_eq!(args.deflate_level, DEFAULT_DEFLATE_LEVEL);
                assert!(args.compress);
                assert_eq!(args.compression(), Compression::AdobeDeflate);
                assert!(matches!(args.tiff_format(), TiffFormat::Auto));
            }
            Command::ToZarr(_) => panic!("expected ToTiff"),
        }
    }

    #[test]
    fn no_compress_selects_none() {
        let cli = Cli::parse_from([
            "ome-bridge-cli",
            "to-tiff",
            "store",
            "out.ome.tif",
            "--compress=false",
        ]);
        match cli.command {
            Command::ToTiff(args) => assert_eq!(args.compression(), Compression::None),
            Command::ToZarr(_) => panic!("expected ToTiff"),
        }
    }
}
