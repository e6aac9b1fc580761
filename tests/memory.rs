use mpx_core::error::error::{KernelError, ValidationError};
use mpx_core::memory::memory::{PAGE_SIZE, PhysMemory};

#[test]
fn alloc_failure_does_not_leak_pages() {
    let mut mem = PhysMemory::new(4);
    assert_eq!(mem.alloc(5), Err(KernelError::ResourceExhausted));
    assert_eq!(mem.free_pages(), 4);

    let region = mem.alloc(4).unwrap();
    assert_eq!(region.len(), 4 * PAGE_SIZE);
    assert_eq!(mem.free_pages(), 0);
}

#[test]
fn zero_page_request_is_rejected() {
    let mut mem = PhysMemory::new(1);
    assert_eq!(
        mem.alloc(0),
        Err(KernelError::Validation(ValidationError::InvalidLength))
    );
}

#[test]
fn freed_pages_are_reused_and_zeroed() {
    let mut mem = PhysMemory::new(2);
    let first = mem.alloc(1).unwrap();
    mem.write_bytes(&first, 0x10, b"stale").unwrap();
    mem.free(first);

    let second = mem.alloc(2).unwrap();
    assert_eq!(mem.read_bytes(&second, 0x10, 5).unwrap(), vec![0; 5]);
}

#[test]
fn region_access_is_bounds_checked() {
    let mut mem = PhysMemory::new(2);
    let region = mem.alloc(1).unwrap();
    let last = (PAGE_SIZE - 1) as u32;

    assert!(mem.write_u8(&region, last, 0xAA).is_ok());
    assert_eq!(mem.read_u8(&region, last).unwrap(), 0xAA);
    assert!(mem.write_u8(&region, PAGE_SIZE as u32, 0xAA).is_err());
    assert!(mem.read_bytes(&region, last, 2).is_err());
    assert!(mem.write_bytes(&region, u32::MAX, b"x").is_err());
}

#[test]
fn writes_cross_scattered_pages() {
    let mut mem = PhysMemory::new(3);
    let hole = mem.alloc(1).unwrap();
    let keep = mem.alloc(1).unwrap();
    mem.free(hole);

    // pages 0 and 2 are free; the region spans both.
    let region = mem.alloc(2).unwrap();
    assert_ne!(region.pages()[1], region.pages()[0] + PAGE_SIZE as u32);

    let at = (PAGE_SIZE - 2) as u32;
    mem.write_bytes(&region, at, b"abcd").unwrap();
    assert_eq!(mem.read_bytes(&region, at, 4).unwrap(), b"abcd");
    assert_eq!(mem.read_bytes(&keep, 0, 2).unwrap(), vec![0, 0]);
}
