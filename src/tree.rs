use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;

use crate::error::{Result, YaffsError};
use crate::geometry::Geometry;
use crate::header::ObjectType;
use crate::object::ResolvedObject;

/// Materializer-level knobs; never consults `std::env` directly.
#[derive(Clone, Copy, Debug)]
pub struct ExtractOptions {
    pub preserve_mode: bool,
    pub preserve_owner: bool,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        ExtractOptions {
            preserve_mode: false,
            preserve_owner: false,
        }
    }
}

/// Counts of what actually landed on disk, reported back to the caller for
/// the CLI's summary banner (§6).
#[derive(Default, Debug, Clone, Copy)]
pub struct MaterializeCounts {
    pub directories: usize,
    pub files: usize,
    pub symlinks: usize,
    pub hardlinks: usize,
    pub special: usize,
}

/// Walks the resolved object set and writes it to `outdir` in three ordered
/// passes (§4.G): directories first (so every path prefix exists before it's
/// needed), then files and device nodes, then symlinks and hardlinks last
/// (since a hardlink's target must already exist on disk).
pub fn materialize(
    outdir: &Path,
    objects: &[ResolvedObject],
    data: &[u8],
    geometry: &Geometry,
    options: &ExtractOptions,
) -> Result<MaterializeCounts> {
    fs::create_dir_all(outdir)?;

    let mut counts = MaterializeCounts::default();
    let mut failed: std::collections::HashSet<usize> = std::collections::HashSet::new();

    let mut by_depth: Vec<&ResolvedObject> = objects.iter().collect();
    by_depth.sort_by_key(|o| o.depth());

    for obj in by_depth.iter().filter(|o| is_directory(o)) {
        let path = obj.full_path(outdir);
        if let Err(e) = fs::create_dir_all(&path) {
            log::warn!("{}: failed to create directory: {e}", path.display());
            failed.insert(obj.obj_id as usize);
            continue;
        }
        apply_permissions(&path, obj, options);
        counts.directories += 1;
    }

    for obj in by_depth.iter().filter(|o| !is_directory(o) && !is_link(o)) {
        if parent_failed(obj, &failed) {
            log::warn!("object {}: parent directory failed, skipping", obj.obj_id);
            failed.insert(obj.obj_id as usize);
            continue;
        }
        let path = obj.full_path(outdir);
        let result = match obj.header.obj_type {
            ObjectType::File => write_file(&path, obj, data, geometry),
            ObjectType::Special => write_special(&path, obj),
            other => {
                log::warn!("object {}: unexpected type {other:?} in file pass", obj.obj_id);
                Ok(())
            }
        };
        match result {
            Ok(()) => {
                apply_permissions(&path, obj, options);
                match obj.header.obj_type {
                    ObjectType::File => counts.files += 1,
                    ObjectType::Special => counts.special += 1,
                    _ => {}
                }
            }
            Err(e) => {
                log::warn!("{}: {e}", path.display());
                failed.insert(obj.obj_id as usize);
            }
        }
    }

    for obj in by_depth
        .iter()
        .filter(|o| o.header.obj_type == ObjectType::Symlink)
    {
        if parent_failed(obj, &failed) {
            continue;
        }
        let path = obj.full_path(outdir);
        match write_symlink(&path, obj) {
            Ok(()) => counts.symlinks += 1,
            Err(e) => log::warn!("{}: {e}", path.display()),
        }
    }

    let by_id: HashMap<u32, &ResolvedObject> = objects.iter().map(|o| (o.obj_id, o)).collect();
    for obj in by_depth
        .iter()
        .filter(|o| o.header.obj_type == ObjectType::HardLink)
    {
        if parent_failed(obj, &failed) {
            continue;
        }
        let path = obj.full_path(outdir);
        let Some(target) = by_id.get(&obj.header.equiv_id) else {
            log::warn!("object {}: hardlink target {} missing", obj.obj_id, obj.header.equiv_id);
            continue;
        };
        let target_path = target.full_path(outdir);
        match fs::hard_link(&target_path, &path) {
            Ok(()) => counts.hardlinks += 1,
            Err(e) => log::warn!("{}: failed to create hardlink: {e}", path.display()),
        }
    }

    Ok(counts)
}

fn is_directory(obj: &ResolvedObject) -> bool {
    obj.header.obj_type == ObjectType::Directory || obj.is_well_known()
}

fn is_link(obj: &ResolvedObject) -> bool {
    matches!(obj.header.obj_type, ObjectType::Symlink | ObjectType::HardLink)
}

fn parent_failed(obj: &ResolvedObject, failed: &std::collections::HashSet<usize>) -> bool {
    failed.contains(&(obj.header.parent_obj_id as usize))
}

fn apply_permissions(path: &Path, obj: &ResolvedObject, options: &ExtractOptions) {
    #[cfg(unix)]
    {
        if options.preserve_mode {
            if let Err(e) = std::fs::set_permissions(path, std::fs::Permissions::from_mode(obj.header.mode)) {
                log::warn!("{}: failed to set mode: {e}", path.display());
            }
        }
        if options.preserve_owner {
            let uid = nix::unistd::Uid::from_raw(obj.header.uid);
            let gid = nix::unistd::Gid::from_raw(obj.header.gid);
            if let Err(e) = nix::unistd::chown(path, Some(uid), Some(gid)) {
                log::warn!("{}: failed to set ownership: {e}", path.display());
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = (path, obj, options);
    }
}

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

fn write_file(path: &Path, obj: &ResolvedObject, data: &[u8], geometry: &Geometry) -> Result<()> {
    let mut file = File::create(path)?;
    let total_size = obj.header.file_size();
    let chunk_size = geometry.chunk_size();

    for (&chunk_id, chunk_ref) in obj.chunks.iter() {
        // §3/GLOSSARY: a data chunk's payload belongs at logical position
        // (chunk_id - 1) * page_size, independent of write order. `chunks`
        // is sparse (a corrupted/erased/never-observed chunk leaves a gap),
        // so this must seek rather than rely on ascending-chunk_id writes
        // landing at the right offset.
        let offset_in_file = (chunk_id - 1) as u64 * geometry.page_size as u64;
        if offset_in_file >= total_size && total_size > 0 {
            continue;
        }
        let start = chunk_ref.nand_chunk_index as usize * chunk_size;
        let end = start + geometry.page_size;
        if end > data.len() {
            log::warn!("object {}: chunk {chunk_id} points past end of image", obj.obj_id);
            continue;
        }
        let page = &data[start..end];

        let remaining = if total_size > 0 {
            (total_size - offset_in_file).min(geometry.page_size as u64) as usize
        } else {
            geometry.page_size
        };
        let usable = if chunk_ref.n_bytes as usize <= geometry.page_size && chunk_ref.n_bytes != 0 {
            (chunk_ref.n_bytes as usize).min(remaining)
        } else {
            remaining
        };

        file.seek(SeekFrom::Start(offset_in_file))?;
        file.write_all(&page[..usable.min(page.len())])?;
    }
    // A gap at the tail of `chunks` (its last chunk never observed) would
    // otherwise leave the file shorter than the header's recorded size.
    if total_size > 0 {
        file.set_len(total_size)?;
    }
    Ok(())
}

fn write_special(path: &Path, obj: &ResolvedObject) -> Result<()> {
    #[cfg(unix)]
    {
        use nix::sys::stat::{mknod, Mode, SFlag};
        let kind = if obj.header.rdev == 0 {
            SFlag::S_IFIFO
        } else {
            SFlag::S_IFCHR
        };
        let mode = Mode::from_bits_truncate(obj.header.mode & 0o7777);
        mknod(path, kind, mode, obj.header.rdev as u64)
            .map_err(|e| YaffsError::Fatal(format!("mknod failed: {e}")))?;
        Ok(())
    }
    #[cfg(not(unix))]
    {
        Err(YaffsError::Fatal(
            "special device nodes are only supported on unix targets".to_string(),
        ))
    }
}

fn write_symlink(path: &Path, obj: &ResolvedObject) -> Result<()> {
    let target = std::str::from_utf8(&obj.header.alias)
        .map_err(|_| YaffsError::HostilePath("symlink alias is not valid UTF-8".to_string()))?;
    #[cfg(unix)]
    {
        std::os::unix::fs::symlink(target, path)
            .map_err(|e| YaffsError::Fatal(format!("symlink failed: {e}")))
    }
    #[cfg(not(unix))]
    {
        let _ = target;
        Err(YaffsError::Fatal(
            "symlinks are only supported on unix targets".to_string(),
        ))
    }
}
