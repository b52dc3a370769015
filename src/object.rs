use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::geometry::Geometry;
use crate::header::{decode_header, Header, ObjectType};
use crate::scanner::ScanEvent;

pub const ROOT_ID: u32 = 1;
pub const LOST_N_FOUND_ID: u32 = 2;
pub const UNLINKED_ID: u32 = 3;
pub const DELETED_ID: u32 = 4;

const WELL_KNOWN_IDS: [u32; 4] = [ROOT_ID, LOST_N_FOUND_ID, UNLINKED_ID, DELETED_ID];

/// Where a surviving data chunk's bytes physically live in the image, and
/// how many of its bytes are valid (the last chunk of a file is usually a
/// partial page).
#[derive(Clone, Copy, Debug)]
pub struct ChunkRef {
    pub seq: u32,
    pub nand_chunk_index: u32,
    pub n_bytes: u32,
}

#[derive(Default)]
struct Object {
    header: Option<Header>,
    header_seq: u32,
    chunks: BTreeMap<u32, ChunkRef>,
}

/// Builds the live object set from a stream of scan events by applying the
/// sequence-number merge rules of §4.F. Owns every `Object` it creates; no
/// decoder holds a reference into it.
#[derive(Default)]
pub struct Reconstructor {
    objects: HashMap<u32, Object>,
}

impl Reconstructor {
    pub fn new() -> Self {
        Reconstructor::default()
    }

    pub fn object_count(&self) -> usize {
        self.objects.iter().filter(|(_, o)| o.header.is_some()).count()
    }

    /// Applies one scanner event, following the rules of §4.F.
    pub fn apply(&mut self, event: &ScanEvent, geometry: &Geometry) {
        let obj_id = event.spare.obj_id;

        if event.spare.chunk_id == 0 {
            self.apply_header(obj_id, event, geometry);
        } else {
            let obj = self.objects.entry(obj_id).or_default();
            let seq = event.spare.seq_number;
            let replace = obj
                .chunks
                .get(&event.spare.chunk_id)
                .map(|prev| seq > prev.seq)
                .unwrap_or(true);
            if replace {
                obj.chunks.insert(
                    event.spare.chunk_id,
                    ChunkRef {
                        seq,
                        nand_chunk_index: event.nand_chunk_index,
                        n_bytes: event.spare.n_bytes,
                    },
                );
            }
        }
    }

    fn apply_header(&mut self, obj_id: u32, event: &ScanEvent, geometry: &Geometry) {
        let header = match decode_header(event.page, geometry) {
            Ok(h) => h,
            Err(e) => {
                log::debug!("object {obj_id}: malformed header, skipping: {e}");
                return;
            }
        };
        let seq = event.spare.seq_number;

        let should_replace = {
            let obj = self.objects.entry(obj_id).or_default();
            obj.header.is_none() || seq > obj.header_seq
        };
        if !should_replace {
            return;
        }

        let obj = self.objects.get_mut(&obj_id).unwrap();
        obj.header = Some(header);
        obj.header_seq = seq;
    }

    /// Finalizes the scan: drops unreachable objects and hardlinks with no
    /// live target, then resolves every surviving object's logical path.
    /// See §4.F "Finalization".
    pub fn finalize(mut self) -> Vec<ResolvedObject> {
        let total = self.objects.len().max(1);

        for &id in WELL_KNOWN_IDS.iter() {
            self.objects.entry(id).or_default();
        }

        let mut reachable: HashMap<u32, PathBuf> = HashMap::new();
        reachable.insert(ROOT_ID, PathBuf::new());
        reachable.insert(LOST_N_FOUND_ID, PathBuf::from("lost_n_found"));
        reachable.insert(UNLINKED_ID, PathBuf::from("unlinked"));
        reachable.insert(DELETED_ID, PathBuf::from("deleted"));

        let ids: Vec<u32> = self.objects.keys().copied().collect();
        for id in ids {
            if WELL_KNOWN_IDS.contains(&id) {
                continue;
            }
            if self.anchor(id, total) != Some(ROOT_ID) && self.anchor(id, total) != Some(LOST_N_FOUND_ID) {
                log::warn!("object {id}: unreachable from a well-known root, dropping");
            }
        }

        // Resolve paths for every object whose ancestry reaches root or
        // lost_n_found, in increasing depth order so a parent's path is
        // always available before its children's.
        let mut depth_order: Vec<u32> = self.objects.keys().copied().collect();
        depth_order.retain(|id| {
            !WELL_KNOWN_IDS.contains(id)
                && self.objects[id].header.is_some()
                && matches!(self.anchor(*id, total), Some(ROOT_ID) | Some(LOST_N_FOUND_ID))
        });

        loop {
            let mut progressed = false;
            depth_order.retain(|&id| {
                if reachable.contains_key(&id) {
                    return false;
                }
                let parent = self.objects[&id].header.as_ref().unwrap().parent_obj_id;
                if let Some(parent_path) = reachable.get(&parent).cloned() {
                    let name = sanitize_component(&self.objects[&id].header.as_ref().unwrap().name);
                    let Some(n) = name else {
                        // A hostile/empty name is dropped without ever
                        // entering `reachable`; any children that depend on
                        // it as their parent never resolve either and are
                        // dropped in turn when the fixed-point loop ends.
                        log::warn!("object {id}: hostile or empty name, dropping");
                        progressed = true;
                        return false;
                    };
                    reachable.insert(id, parent_path.join(n));
                    progressed = true;
                    false
                } else {
                    true
                }
            });
            if !progressed || depth_order.is_empty() {
                break;
            }
        }

        let mut resolved = Vec::new();
        for &id in WELL_KNOWN_IDS.iter() {
            let header = self.objects[&id]
                .header
                .clone()
                .unwrap_or_else(|| synthetic_well_known_header(id));
            resolved.push(ResolvedObject {
                obj_id: id,
                header,
                relative_path: reachable[&id].clone(),
                chunks: self.objects[&id].chunks.clone(),
            });
        }

        for (&id, obj) in self.objects.iter() {
            if WELL_KNOWN_IDS.contains(&id) {
                continue;
            }
            let (Some(header), Some(path)) = (obj.header.clone(), reachable.get(&id).cloned())
            else {
                continue;
            };
            resolved.push(ResolvedObject {
                obj_id: id,
                header,
                relative_path: path,
                chunks: obj.chunks.clone(),
            });
        }

        // Hardlinks whose target is not a live non-hardlink object are
        // dropped with a warning (§4.F).
        let live_non_hardlink: HashSet<u32> = resolved
            .iter()
            .filter(|o| o.header.obj_type != ObjectType::HardLink)
            .map(|o| o.obj_id)
            .collect();
        resolved.retain(|o| {
            if o.header.obj_type == ObjectType::HardLink && !live_non_hardlink.contains(&o.header.equiv_id) {
                log::warn!(
                    "object {}: hardlink target {} is not live, dropping",
                    o.obj_id,
                    o.header.equiv_id
                );
                false
            } else {
                true
            }
        });

        resolved
    }

    /// Walks `parent_obj_id` from `id` up to a well-known root, bounded by
    /// `max_steps` to turn a cycle into `None` instead of an infinite loop.
    fn anchor(&self, id: u32, max_steps: usize) -> Option<u32> {
        let mut cur = id;
        let mut steps = 0usize;
        loop {
            if WELL_KNOWN_IDS.contains(&cur) {
                return Some(cur);
            }
            steps += 1;
            if steps > max_steps {
                return None;
            }
            let parent = self.objects.get(&cur)?.header.as_ref()?.parent_obj_id;
            cur = parent;
        }
    }
}

/// A fallback header for a well-known object id whose header chunk never
/// appeared in the log (e.g. an image with no files ever unlinked, so id 3
/// has no recorded header). Always a directory, owned by root.
fn synthetic_well_known_header(_id: u32) -> Header {
    Header {
        obj_type: ObjectType::Directory,
        parent_obj_id: ROOT_ID,
        name: Vec::new(),
        mode: 0o755,
        uid: 0,
        gid: 0,
        atime: 0,
        mtime: 0,
        ctime: 0,
        file_size_low: 0,
        equiv_id: 0,
        alias: Vec::new(),
        rdev: 0,
        file_size_high: 0xFFFF_FFFF,
    }
}

/// A single path component, rejecting anything YAFFS names should never
/// contain: `..`, embedded separators, or an empty/invalid string. See
/// §4.G "Path-traversal defense".
fn sanitize_component(name: &[u8]) -> Option<PathBuf> {
    if name.is_empty() {
        return None;
    }
    let text = std::str::from_utf8(name).ok()?;
    if text == ".." || text == "." {
        return None;
    }
    if text.contains('/') || text.contains('\\') {
        return None;
    }
    Some(PathBuf::from(text))
}

/// A finalized, path-resolved object ready for materialization.
pub struct ResolvedObject {
    pub obj_id: u32,
    pub header: Header,
    pub relative_path: PathBuf,
    pub chunks: BTreeMap<u32, ChunkRef>,
}

impl ResolvedObject {
    pub fn depth(&self) -> usize {
        self.relative_path.components().count()
    }

    pub fn is_well_known(&self) -> bool {
        WELL_KNOWN_IDS.contains(&self.obj_id)
    }

    pub fn full_path(&self, outdir: &Path) -> PathBuf {
        outdir.join(&self.relative_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::byte_reader::Endian;
    use crate::spare::SpareRecord;

    fn geom() -> Geometry {
        Geometry {
            page_size: 2048,
            spare_size: 64,
            endian: Endian::Little,
            ecclayout: true,
        }
    }

    fn header_event(obj_id: u32, parent: u32, name: &str, seq: u32) -> (SpareRecord, Vec<u8>) {
        let spare = SpareRecord {
            seq_number: seq,
            obj_id,
            chunk_id: 0,
            n_bytes: 0,
        };
        let mut page = Vec::new();
        page.extend_from_slice(&(ObjectType::File as u32).to_le_bytes());
        page.extend_from_slice(&parent.to_le_bytes());
        page.extend_from_slice(&[0u8; 2]);
        let mut name_field = name.as_bytes().to_vec();
        name_field.resize(crate::header::MAX_NAME_LENGTH + 1, 0);
        page.extend_from_slice(&name_field);
        page.extend_from_slice(&0xFFFF_FFFFu32.to_le_bytes());
        page.extend_from_slice(&[0u8; 4 * 6]); // mode..ctime
        page.extend_from_slice(&0u32.to_le_bytes()); // size low
        page.extend_from_slice(&0u32.to_le_bytes()); // equiv_id
        page.resize(page.len() + crate::header::MAX_ALIAS_LENGTH + 1, 0);
        page.extend_from_slice(&0u32.to_le_bytes()); // rdev
        page.extend_from_slice(&[0u8; 24]);
        page.extend_from_slice(&0u32.to_le_bytes());
        page.extend_from_slice(&0u32.to_le_bytes());
        page.extend_from_slice(&0xFFFF_FFFFu32.to_le_bytes()); // size high unused
        page.resize(2048, 0);
        (spare, page)
    }

    #[test]
    fn overwrite_keeps_later_sequence_number() {
        let mut r = Reconstructor::new();
        let g = geom();
        let (spare_a, page_a) = header_event(256, ROOT_ID, "a", 10);
        let (spare_b, page_b) = header_event(256, ROOT_ID, "b", 20);
        r.apply(
            &ScanEvent { nand_chunk_index: 0, spare: spare_a, page: &page_a },
            &g,
        );
        r.apply(
            &ScanEvent { nand_chunk_index: 1, spare: spare_b, page: &page_b },
            &g,
        );
        let resolved = r.finalize();
        let file = resolved.iter().find(|o| o.obj_id == 256).unwrap();
        assert_eq!(file.relative_path, PathBuf::from("b"));
    }

    #[test]
    fn equal_sequence_number_keeps_first_observation() {
        let mut r = Reconstructor::new();
        let g = geom();
        let (spare_a, page_a) = header_event(256, ROOT_ID, "first", 10);
        let (spare_b, page_b) = header_event(256, ROOT_ID, "second", 10);
        r.apply(
            &ScanEvent { nand_chunk_index: 0, spare: spare_a, page: &page_a },
            &g,
        );
        r.apply(
            &ScanEvent { nand_chunk_index: 1, spare: spare_b, page: &page_b },
            &g,
        );
        let resolved = r.finalize();
        let file = resolved.iter().find(|o| o.obj_id == 256).unwrap();
        assert_eq!(file.relative_path, PathBuf::from("first"));
    }

    #[test]
    fn hostile_name_is_dropped() {
        let mut r = Reconstructor::new();
        let g = geom();
        let (spare, page) = header_event(300, ROOT_ID, "../etc/passwd", 1);
        r.apply(&ScanEvent { nand_chunk_index: 0, spare, page: &page }, &g);
        let resolved = r.finalize();
        assert!(resolved.iter().all(|o| o.obj_id != 300));
    }

    #[test]
    fn object_reachable_only_through_unlinked_is_dropped() {
        let mut r = Reconstructor::new();
        let g = geom();
        let (spare, page) = header_event(400, UNLINKED_ID, "ghost", 1);
        r.apply(&ScanEvent { nand_chunk_index: 0, spare, page: &page }, &g);
        let resolved = r.finalize();
        assert!(resolved.iter().all(|o| o.obj_id != 400));
    }

    #[test]
    fn well_known_ids_always_materialize() {
        let r = Reconstructor::new();
        let resolved = r.finalize();
        let names: HashSet<_> = resolved.iter().map(|o| o.relative_path.clone()).collect();
        assert!(names.contains(&PathBuf::new()));
        assert!(names.contains(&PathBuf::from("lost_n_found")));
        assert!(names.contains(&PathBuf::from("unlinked")));
        assert!(names.contains(&PathBuf::from("deleted")));
    }
}
