//! Ring regions: named shared memory segments laid out as described in
//! [`layout`].
//!
//! A region is created once, formatted, and then mapped independently by every
//! process that opens a handle on it. Its lifetime is the OS object's: handles
//! never unlink it, [`RingRegion::remove`] does.

pub mod layout;
pub mod shm;

use std::ptr;
use std::sync::atomic::{ fence, Ordering };

use memmap2::MmapRaw;
use tracing::{ debug, info };

use crate::error::{ Result, RingError };
use layout::{ control_bytes, CursorRecord, Geometry, RingHeader };

/// A mapped ring region.
#[derive(Debug)]
pub struct RingRegion {
    name: String,
    map: MmapRaw,
    header: RingHeader,
}

impl RingRegion {
    /// Create and format a new region holding at least `data_bytes` of ring
    /// data and `max_consumers` consumer slots.
    ///
    /// The object is sized to a whole number of pages, so the formatted
    /// `data_bytes` may be larger than requested.
    pub fn create(name: &str, data_bytes: usize, max_consumers: usize) -> Result<()> {
        if data_bytes < 2 {
            return Err(RingError::config("ring must hold at least 2 data bytes"));
        }
        if max_consumers == 0 {
            return Err(RingError::config("ring must have at least one consumer slot"));
        }
        let object = shm::object_name(name)?;
        let total = control_bytes(max_consumers)
            .and_then(|c| c.checked_add(data_bytes))
            .and_then(shm::round_to_pages)
            .ok_or_else(|| RingError::config("requested ring size overflows"))?;

        let file = shm::create(&object)?;
        if let Err(e) = file.set_len(total as u64) {
            drop(file);
            let _ = shm::unlink(&object);
            return Err(e.into());
        }
        drop(file);

        if let Err(e) = Self::format(&object, max_consumers) {
            let _ = shm::unlink(&object);
            return Err(e);
        }
        info!(ring = %object, total, max_consumers, "created ring");
        Ok(())
    }

    /// (Re)format an existing object at its current size: write the header
    /// and mark every cursor unowned at the start of the data area.
    ///
    /// Any data and slot ownership in the region is lost. Handles still open
    /// on the region lose their claims and fail their next transfer with
    /// [`RingError::SlotLost`]; they must be dropped and reopened, since
    /// their cached layout may no longer match. Reformat only rings nobody
    /// has attached.
    pub fn format(name: &str, max_consumers: usize) -> Result<()> {
        let object = shm::object_name(name)?;
        let file = shm::open(&object)?;
        let len = file.metadata()?.len() as usize;
        let mut header = RingHeader::for_region(len, max_consumers).ok_or_else(||
            RingError::config(
                format!("{} bytes is too small for {} consumer slots", len, max_consumers)
            )
        )?;
        let map = MmapRaw::map_raw(&file)?;
        let base = map.as_mut_ptr();

        // Magic goes in last so a half-formatted region never validates.
        let magic = header.magic;
        header.magic = [0; 32];
        // SAFETY: the mapping is page aligned and at least `len` bytes long,
        // which `for_region` checked covers header and cursor records.
        unsafe {
            ptr::write(base as *mut RingHeader, header);
        }
        let region = Self { name: object, map, header };
        region.producer().reset(header.data_offset);
        for slot in 0..max_consumers {
            region.consumer(slot).reset(header.data_offset);
        }
        fence(Ordering::Release);
        // SAFETY: as above; the magic is the first field of the header.
        unsafe {
            ptr::copy_nonoverlapping(magic.as_ptr(), base, magic.len());
        }
        region.map.flush()?;
        info!(
            ring = %region.name,
            data_bytes = header.data_bytes,
            max_consumers,
            "formatted ring"
        );
        Ok(())
    }

    /// Map an existing, formatted region.
    pub fn map(name: &str) -> Result<Self> {
        let object = shm::object_name(name)?;
        let file = shm::open(&object)?;
        let len = file.metadata()?.len() as usize;
        if len < layout::HEADER_SIZE {
            return Err(RingError::not_a_ring(object, "object smaller than a ring header"));
        }
        let map = MmapRaw::map_raw(&file)?;
        // SAFETY: mapping is page aligned and holds at least a header.
        let header = unsafe { ptr::read(map.as_ptr() as *const RingHeader) };
        fence(Ordering::Acquire);
        header.validate(map.len()).map_err(|reason| RingError::not_a_ring(&object, reason))?;
        debug!(ring = %object, len, "mapped ring");
        Ok(Self { name: object, map, header })
    }

    /// Unlink the named object. Processes with the region mapped keep working;
    /// the memory is released when the last of them unmaps it.
    pub fn remove(name: &str) -> Result<()> {
        let object = shm::object_name(name)?;
        shm::unlink(&object)?;
        info!(ring = %object, "removed ring");
        Ok(())
    }

    /// Whether `name` exists and carries a valid ring header.
    pub fn is_ring(name: &str) -> bool {
        Self::map(name).is_ok()
    }

    /// Shared memory object name (with leading `/`)
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn header(&self) -> &RingHeader {
        &self.header
    }

    #[inline]
    pub fn geometry(&self) -> Geometry {
        self.header.geometry()
    }

    pub fn max_consumers(&self) -> usize {
        self.header.max_consumer as usize
    }

    pub fn data_bytes(&self) -> usize {
        self.header.data_bytes as usize
    }

    /// Mapped length in bytes
    pub fn mapped_len(&self) -> usize {
        self.map.len()
    }

    #[inline]
    fn record(&self, offset: usize) -> &CursorRecord {
        // SAFETY: offsets come from a validated header and lie inside the
        // mapping; records are 64-byte aligned and made only of atomics.
        unsafe { &*(self.map.as_ptr().add(offset) as *const CursorRecord) }
    }

    #[inline]
    pub fn producer(&self) -> &CursorRecord {
        self.record(self.header.producer_info_offset as usize)
    }

    /// Consumer cursor record `slot`. Panics if `slot` is out of range.
    #[inline]
    pub fn consumer(&self, slot: usize) -> &CursorRecord {
        assert!(slot < self.max_consumers(), "consumer slot {} out of range", slot);
        self.record(self.header.consumer_offset(slot))
    }

    pub fn consumers(&self) -> impl Iterator<Item = (usize, &CursorRecord)> + '_ {
        (0..self.max_consumers()).map(move |slot| (slot, self.consumer(slot)))
    }

    /// Copy `src` into the data area at `offset`, wrapping at the top.
    /// Returns the offset just past the written bytes.
    ///
    /// `src` must be shorter than the data area and `offset` inside it.
    pub fn write_at(&self, offset: usize, src: &[u8]) -> usize {
        let geometry = self.geometry();
        let (first, second) = geometry.split(offset, src.len());
        let base = self.map.as_mut_ptr();
        // SAFETY: split() keeps both chunks within [data_offset, top_offset].
        // Only the producer writes these bytes, and only ahead of every
        // attached consumer.
        unsafe {
            ptr::copy_nonoverlapping(src.as_ptr(), base.add(offset), first);
            if second > 0 {
                ptr::copy_nonoverlapping(
                    src.as_ptr().add(first),
                    base.add(geometry.data_offset),
                    second
                );
            }
        }
        geometry.advance(offset, src.len())
    }

    /// Copy `dst.len()` bytes out of the data area starting at `offset`,
    /// wrapping at the top.
    pub fn read_at(&self, offset: usize, dst: &mut [u8]) {
        let geometry = self.geometry();
        let (first, second) = geometry.split(offset, dst.len());
        let base = self.map.as_ptr();
        // SAFETY: as in write_at; the producer does not write bytes a
        // consumer has not yet passed.
        unsafe {
            ptr::copy_nonoverlapping(base.add(offset), dst.as_mut_ptr(), first);
            if second > 0 {
                ptr::copy_nonoverlapping(
                    base.add(geometry.data_offset),
                    dst.as_mut_ptr().add(first),
                    second
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring_name(tag: &str) -> String {
        format!("/daqring-region-{}-{}", tag, std::process::id())
    }

    #[test]
    fn test_create_format_map() {
        let name = ring_name("create");
        let _ = RingRegion::remove(&name);

        RingRegion::create(&name, 1024, 2).unwrap();
        let region = RingRegion::map(&name).unwrap();

        assert_eq!(region.mapped_len() % shm::page_size(), 0);
        assert_eq!(region.max_consumers(), 2);
        assert!(region.data_bytes() >= 1024);
        assert_eq!(region.data_bytes(), region.mapped_len() - region.header().data_offset as usize);

        let data_offset = region.header().data_offset;
        assert_eq!(region.producer().offset.load(Ordering::Relaxed), data_offset);
        assert_eq!(region.producer().owner_pid(), None);
        for (_, record) in region.consumers() {
            assert_eq!(record.offset.load(Ordering::Relaxed), data_offset);
            assert_eq!(record.owner_pid(), None);
        }

        RingRegion::remove(&name).unwrap();
    }

    #[test]
    fn test_create_existing_fails() {
        let name = ring_name("exists");
        let _ = RingRegion::remove(&name);

        RingRegion::create(&name, 1024, 1).unwrap();
        let err = RingRegion::create(&name, 1024, 1).unwrap_err();
        assert!(err.is_resource_error());

        RingRegion::remove(&name).unwrap();
    }

    #[test]
    fn test_create_rejects_bad_sizes() {
        let name = ring_name("badsize");
        assert!(matches!(RingRegion::create(&name, 1, 1), Err(RingError::InvalidConfig { .. })));
        assert!(matches!(RingRegion::create(&name, 1024, 0), Err(RingError::InvalidConfig { .. })));
        assert!(!RingRegion::is_ring(&name));
    }

    #[test]
    fn test_reformat_keeps_size() {
        let name = ring_name("reformat");
        let _ = RingRegion::remove(&name);

        RingRegion::create(&name, 4096, 4).unwrap();
        let before = RingRegion::map(&name).unwrap();
        let token = before.producer().try_claim(1234).unwrap();

        RingRegion::format(&name, 8).unwrap();
        let after = RingRegion::map(&name).unwrap();
        assert_eq!(after.mapped_len(), before.mapped_len());
        assert_eq!(after.max_consumers(), 8);
        assert!(after.data_bytes() < before.data_bytes());
        assert_eq!(after.producer().owner_pid(), None);
        assert!(!before.producer().holds(token));

        RingRegion::remove(&name).unwrap();
    }

    #[test]
    fn test_map_missing_and_is_ring() {
        let name = ring_name("missing");
        let _ = RingRegion::remove(&name);
        assert!(RingRegion::map(&name).unwrap_err().is_resource_error());
        assert!(!RingRegion::is_ring(&name));

        RingRegion::create(&name, 1024, 1).unwrap();
        assert!(RingRegion::is_ring(&name));
        RingRegion::remove(&name).unwrap();
        assert!(!RingRegion::is_ring(&name));
    }

    #[test]
    fn test_map_rejects_unformatted_object() {
        let name = ring_name("raw");
        let object = shm::object_name(&name).unwrap();
        let _ = shm::unlink(&object);

        let file = shm::create(&object).unwrap();
        file.set_len(4096).unwrap();
        drop(file);

        assert!(matches!(RingRegion::map(&name), Err(RingError::NotARing { .. })));
        shm::unlink(&object).unwrap();
    }

    #[test]
    fn test_wrapping_write_read() {
        let name = ring_name("wrap");
        let _ = RingRegion::remove(&name);
        RingRegion::create(&name, 1024, 1).unwrap();
        let region = RingRegion::map(&name).unwrap();
        let g = region.geometry();

        let src: Vec<u8> = (0..100u8).collect();
        let start = g.top_offset - 39;
        let next = region.write_at(start, &src);
        assert_eq!(next, g.data_offset + 60);

        let mut dst = vec![0u8; 100];
        region.read_at(start, &mut dst);
        assert_eq!(dst, src);

        RingRegion::remove(&name).unwrap();
    }
}
