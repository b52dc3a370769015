//! Reconstructs a directory tree of files, symlinks, hardlinks, and special
//! device nodes from a raw image of a YAFFS2 volume.
//!
//! The log replay engine (geometry detection, chunk scanning, sequence-number
//! reconciliation, tree materialization) lives in the modules below; `main.rs`
//! and `cli.rs` are thin collaborators that turn command-line arguments into
//! calls against this library.

pub mod byte_reader;
pub mod error;
pub mod geometry;
pub mod header;
pub mod object;
pub mod oracle;
pub mod scanner;
pub mod spare;
pub mod tree;

pub use error::{Result, YaffsError};
pub use geometry::Geometry;
pub use object::ResolvedObject;
pub use oracle::GeometryRequest;
pub use tree::{ExtractOptions, MaterializeCounts};

/// Scans `data` under a fixed `geometry` and returns the finalized object
/// set (§4.E + §4.F). This is the entry point the fuzz target exercises: it
/// must never panic on arbitrary bytes, however short or malformed.
pub fn scan(data: &[u8], geometry: &Geometry, block_size: Option<u32>) -> Vec<ResolvedObject> {
    let mut reconstructor = object::Reconstructor::new();
    for event in scanner::LogScanner::new(data, *geometry, block_size) {
        reconstructor.apply(&event, geometry);
    }
    reconstructor.finalize()
}

/// Outcome of a full extraction run, reported back to the CLI for its
/// summary banner (§6).
#[derive(Debug, Clone, Copy)]
pub struct ExtractSummary {
    pub geometry: Geometry,
    pub counts: MaterializeCounts,
    pub object_count: usize,
}

/// End-to-end extraction: resolve geometry (§4.H), scan and reconcile the
/// object graph, then materialize it under `outdir` (§4.G).
pub fn extract_from_bytes(
    data: &[u8],
    outdir: &std::path::Path,
    request: &GeometryRequest,
    options: &ExtractOptions,
) -> Result<ExtractSummary> {
    let (geometry, objects) = oracle::resolve(data, request)?;
    let counts = tree::materialize(outdir, &objects, data, &geometry, options)?;
    Ok(ExtractSummary {
        geometry,
        counts,
        object_count: objects.len(),
    })
}

/// Resolves geometry and the object graph without writing anything to disk,
/// for `--ls` (§6).
pub fn list_from_bytes(data: &[u8], request: &GeometryRequest) -> Result<(Geometry, Vec<ResolvedObject>)> {
    oracle::resolve(data, request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use byte_reader::Endian;

    #[test]
    fn scan_never_panics_on_truncated_input() {
        let geometry = Geometry::default_geometry();
        for len in 0..300 {
            let data = vec![0u8; len];
            let _ = scan(&data, &geometry, None);
        }
    }

    #[test]
    fn scan_never_panics_on_random_looking_bytes() {
        let geometry = Geometry {
            page_size: 512,
            spare_size: 16,
            endian: Endian::Little,
            ecclayout: true,
        };
        let mut data = Vec::new();
        for i in 0..4096u32 {
            data.push((i.wrapping_mul(2654435761)) as u8);
        }
        let _ = scan(&data, &geometry, Some(4));
    }
}
