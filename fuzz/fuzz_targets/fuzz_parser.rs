#![no_main]
use libfuzzer_sys::fuzz_target;
use yaffs2_extract::geometry::Geometry;

const MAX_INPUT_SIZE: usize = 1024;

fn do_fuzz(data: &[u8]) {
    if data.len() > MAX_INPUT_SIZE {
        return;
    }
    let geometry = Geometry::default_geometry();
    let _ = yaffs2_extract::scan(data, &geometry, Some(4));
    let _ = yaffs2_extract::geometry::detect_geometry(data);
}

fuzz_target!(|data: &[u8]| {
    do_fuzz(data);
});
