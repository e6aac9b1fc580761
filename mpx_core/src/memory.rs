pub mod memory {
    use tracing::debug;

    use crate::error::error::{KernelError, KernelResult, ValidationError};

    pub const PAGE_SIZE: usize = 0x1000;

    /// Page allocator over a flat physical arena.
    ///
    /// phys_bitmap tracks availability per physical page. a region handed
    /// out by alloc is a list of page bases; the pages form a contiguous
    /// virtual range for the owner but may be scattered physically.
    pub struct PhysMemory {
        phys_mem: Vec<u8>,
        phys_bitmap: Vec<bool>,
    }

    /// Pages owned by exactly one process, addressed from 0 upward.
    #[derive(Clone, Debug, PartialEq, Eq)]
    pub struct Region {
        pages: Vec<u32>,
    }

    impl Region {
        pub fn len(&self) -> usize {
            self.pages.len() * PAGE_SIZE
        }

        pub fn is_empty(&self) -> bool {
            self.pages.is_empty()
        }

        pub fn pages(&self) -> &[u32] {
            &self.pages
        }

        // translate an owner-relative address into a physical address.
        pub fn translate(&self, vaddr: u32) -> Option<usize> {
            let vaddr = vaddr as usize;
            let base = *self.pages.get(vaddr / PAGE_SIZE)? as usize;
            Some(base + vaddr % PAGE_SIZE)
        }

        pub fn contains(&self, vaddr: u32, len: usize) -> bool {
            (vaddr as usize)
                .checked_add(len)
                .is_some_and(|end| end <= self.len())
        }
    }

    impl PhysMemory {
        pub fn new(page_count: usize) -> PhysMemory {
            PhysMemory {
                phys_mem: vec![0; page_count * PAGE_SIZE],
                phys_bitmap: vec![false; page_count],
            }
        }

        pub fn free_pages(&self) -> usize {
            self.phys_bitmap.iter().filter(|used| !**used).count()
        }

        /// first-fit allocation of `pages` zeroed pages.
        ///
        /// free pages are collected before anything is marked so a failed
        /// request leaves the bitmap untouched.
        pub fn alloc(&mut self, pages: u16) -> KernelResult<Region> {
            if pages == 0 {
                return Err(ValidationError::InvalidLength.into());
            }

            let mut free_indices: Vec<usize> = Vec::with_capacity(pages as usize);
            for (idx, used) in self.phys_bitmap.iter().enumerate() {
                if !*used {
                    free_indices.push(idx);
                    if free_indices.len() == pages as usize {
                        break;
                    }
                }
            }

            if free_indices.len() < pages as usize {
                return Err(KernelError::ResourceExhausted);
            }

            let mut allocated: Vec<u32> = Vec::with_capacity(pages as usize);
            for idx in free_indices {
                self.phys_bitmap[idx] = true;
                let base = idx * PAGE_SIZE;
                self.phys_mem[base..base + PAGE_SIZE].fill(0);
                allocated.push(base as u32);
            }

            debug!(pages, free = self.free_pages(), "allocated region");
            Ok(Region { pages: allocated })
        }

        // return every page of the region to the pool.
        pub fn free(&mut self, region: Region) {
            for base in region.pages {
                if let Some(used) = self.phys_bitmap.get_mut(base as usize / PAGE_SIZE) {
                    *used = false;
                }
            }
        }

        pub fn read_u8(&self, region: &Region, vaddr: u32) -> KernelResult<u8> {
            let phys = region
                .translate(vaddr)
                .ok_or(ValidationError::InvalidBuffer)?;
            self.phys_mem
                .get(phys)
                .copied()
                .ok_or(ValidationError::InvalidBuffer.into())
        }

        pub fn write_u8(&mut self, region: &Region, vaddr: u32, value: u8) -> KernelResult<()> {
            let phys = region
                .translate(vaddr)
                .ok_or(ValidationError::InvalidBuffer)?;
            let slot = self
                .phys_mem
                .get_mut(phys)
                .ok_or(ValidationError::InvalidBuffer)?;
            *slot = value;
            Ok(())
        }

        // copy bytes into the region, crossing page boundaries if needed.
        pub fn write_bytes(&mut self, region: &Region, vaddr: u32, data: &[u8]) -> KernelResult<()> {
            if !region.contains(vaddr, data.len()) {
                return Err(ValidationError::InvalidBuffer.into());
            }
            for (idx, byte) in data.iter().enumerate() {
                self.write_u8(region, vaddr + idx as u32, *byte)?;
            }
            Ok(())
        }

        pub fn read_bytes(&self, region: &Region, vaddr: u32, len: usize) -> KernelResult<Vec<u8>> {
            if !region.contains(vaddr, len) {
                return Err(ValidationError::InvalidBuffer.into());
            }
            let mut data = Vec::with_capacity(len);
            for idx in 0..len {
                data.push(self.read_u8(region, vaddr + idx as u32)?);
            }
            Ok(data)
        }
    }
}
