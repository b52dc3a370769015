use crate::geometry::Geometry;
use crate::spare::{decode_spare, is_erased, SpareRecord, CHECKPOINT_SEQ};

/// One decoded, non-skipped chunk: its physical NAND chunk index, its spare
/// record, and a borrow of its page bytes.
pub struct ScanEvent<'a> {
    pub nand_chunk_index: u32,
    pub spare: SpareRecord,
    pub page: &'a [u8],
}

/// Walks an image chunk-by-chunk, classifying and skipping bad/checkpoint
/// blocks, and yields a lazy sequence of decoded events (§4.E). Consumed
/// once by the reconstructor; not restartable, which is fine since each
/// geometry-oracle retry (§4.H) builds a fresh scanner over the same bytes.
pub struct LogScanner<'a> {
    data: &'a [u8],
    geometry: Geometry,
    block_size: Option<u32>,
    cursor: usize,
    next_nand_chunk_index: u32,
}

impl<'a> LogScanner<'a> {
    pub fn new(data: &'a [u8], geometry: Geometry, block_size: Option<u32>) -> Self {
        LogScanner {
            data,
            geometry,
            block_size,
            cursor: 0,
            next_nand_chunk_index: 0,
        }
    }

    fn advance_one_chunk(&mut self) -> bool {
        let chunk_size = self.geometry.chunk_size();
        if self.cursor + chunk_size > self.data.len() {
            return false;
        }
        self.cursor += chunk_size;
        self.next_nand_chunk_index += 1;
        true
    }
}

impl<'a> Iterator for LogScanner<'a> {
    type Item = ScanEvent<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let page_size = self.geometry.page_size;
        let chunk_size = self.geometry.chunk_size();

        loop {
            if self.cursor + chunk_size > self.data.len() {
                return None;
            }

            let page = &self.data[self.cursor..self.cursor + page_size];
            let spare_bytes = &self.data[self.cursor + page_size..self.cursor + chunk_size];
            let index = self.next_nand_chunk_index;

            self.cursor += chunk_size;
            self.next_nand_chunk_index += 1;

            if is_erased(spare_bytes) {
                continue;
            }

            let spare = match decode_spare(spare_bytes, &self.geometry) {
                Ok(s) => s,
                Err(e) => {
                    log::debug!("chunk {index}: malformed spare, skipping: {e}");
                    continue;
                }
            };

            if spare.seq_number == CHECKPOINT_SEQ {
                log::debug!("chunk {index}: checkpoint block marker, skipping containing block");
                if let Some(block_size) = self.block_size {
                    for _ in 0..block_size.saturating_sub(1) {
                        if !self.advance_one_chunk() {
                            break;
                        }
                    }
                }
                continue;
            }

            return Some(ScanEvent {
                nand_chunk_index: index,
                spare,
                page,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::byte_reader::Endian;

    fn geom() -> Geometry {
        Geometry {
            page_size: 16,
            spare_size: 16,
            endian: Endian::Little,
            ecclayout: true,
        }
    }

    fn chunk(seq: u32, obj_id: u32, chunk_id: u32) -> Vec<u8> {
        let mut buf = vec![0u8; 16]; // page
        buf.extend_from_slice(&seq.to_le_bytes());
        buf.extend_from_slice(&obj_id.to_le_bytes());
        buf.extend_from_slice(&chunk_id.to_le_bytes());
        buf.extend_from_slice(&0u32.to_le_bytes());
        buf
    }

    #[test]
    fn yields_valid_chunks_in_order() {
        let mut data = Vec::new();
        data.extend(chunk(1, 1, 0));
        data.extend(chunk(2, 256, 0));
        let events: Vec<_> = LogScanner::new(&data, geom(), None).collect();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].nand_chunk_index, 0);
        assert_eq!(events[1].nand_chunk_index, 1);
        assert_eq!(events[1].spare.obj_id, 256);
    }

    #[test]
    fn skips_erased_chunks() {
        let mut data = Vec::new();
        data.extend(vec![0xFFu8; 32]);
        data.extend(chunk(1, 1, 0));
        let events: Vec<_> = LogScanner::new(&data, geom(), None).collect();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].nand_chunk_index, 1);
    }

    #[test]
    fn checkpoint_block_is_skipped_with_known_block_size() {
        let mut data = Vec::new();
        data.extend(chunk(0x21, 0, 0)); // checkpoint marker
        data.extend(chunk(0xAB, 0xCD, 0xEF)); // garbage, part of same block
        data.extend(chunk(5, 300, 0)); // valid, next block
        let events: Vec<_> = LogScanner::new(&data, geom(), Some(2)).collect();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].spare.obj_id, 300);
    }

    #[test]
    fn checkpoint_block_degrades_to_per_chunk_without_block_size() {
        let mut data = Vec::new();
        data.extend(chunk(0x21, 0, 0));
        data.extend(chunk(5, 300, 0));
        let events: Vec<_> = LogScanner::new(&data, geom(), None).collect();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].spare.obj_id, 300);
    }
}
