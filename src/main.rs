mod cli;

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use cli::Args;
use yaffs2_extract::{extract_from_bytes, list_from_bytes, GeometryRequest};
use yaffs2_extract::tree::ExtractOptions;

fn init_logging(debug: bool) {
    let default_filter = if debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .init();
}

fn build_request(args: &Args) -> GeometryRequest {
    GeometryRequest {
        page_size: args.page_size,
        spare_size: args.spare_size,
        endian: args.endianess.map(Into::into),
        ecclayout: if args.no_ecc { Some(false) } else { None },
        block_size: args.block_size,
        auto_detect: args.auto,
        brute_force: args.brute_force,
    }
}

fn run(args: Args) -> yaffs2_extract::Result<()> {
    if !args.ls && args.dir.is_none() {
        return Err(yaffs2_extract::YaffsError::Fatal(
            "--dir is required unless --ls is given".to_string(),
        ));
    }

    log::info!(
        "reading {} (auto={} brute_force={} ownership={})",
        args.file,
        args.auto,
        args.brute_force,
        args.ownership
    );
    let data = fs::read(&args.file)
        .map_err(|e| yaffs2_extract::YaffsError::Fatal(format!("cannot read {}: {e}", args.file)))?;

    let request = build_request(&args);

    if args.ls {
        let (geometry, objects) = list_from_bytes(&data, &request)?;
        log::info!(
            "geometry: page={} spare={} endian={:?} ecclayout={}",
            geometry.page_size,
            geometry.spare_size,
            geometry.endian,
            geometry.ecclayout
        );
        let mut sorted: Vec<_> = objects.iter().collect();
        sorted.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        for obj in sorted {
            println!(
                "{:>6}  {:?}  /{}",
                obj.obj_id,
                obj.header.obj_type,
                obj.relative_path.display()
            );
        }
        return Ok(());
    }

    let outdir = PathBuf::from(args.dir.as_ref().unwrap());
    let options = ExtractOptions {
        preserve_mode: true,
        preserve_owner: args.ownership,
    };

    let summary = extract_from_bytes(&data, &outdir, &request, &options)?;
    log::info!(
        "geometry: page={} spare={} endian={:?} ecclayout={}",
        summary.geometry.page_size,
        summary.geometry.spare_size,
        summary.geometry.endian,
        summary.geometry.ecclayout
    );
    log::info!(
        "extracted {} objects: {} directories, {} files, {} symlinks, {} hardlinks, {} special",
        summary.object_count,
        summary.counts.directories,
        summary.counts.files,
        summary.counts.symlinks,
        summary.counts.hardlinks,
        summary.counts.special
    );

    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.debug);

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}
