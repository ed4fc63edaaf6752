// Masked raw-pointer view of video memory.
//
// The device core owns the backing buffer and hands copies of this view to
// the worker threads; every access wraps at the buffer size, so no address
// ever faults. Concurrent host access during a draw can observe partial
// results, which is what the real part does.

#[derive(Copy, Clone, Debug)]
pub struct VramView {
    ptr: *mut u8,
    mask: u32,
}

unsafe impl Send for VramView {}
unsafe impl Sync for VramView {}

impl VramView {
    /// `len` must be a power of two; the address mask is derived from it.
    pub fn new(ptr: *mut u8, len: usize) -> Self {
        debug_assert!(len.is_power_of_two());
        VramView {
            ptr,
            mask: (len - 1) as u32,
        }
    }

    #[inline]
    pub fn mask(&self) -> u32 {
        self.mask
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.mask as usize + 1
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        false
    }

    #[inline(always)]
    pub fn read8(&self, addr: u32) -> u8 {
        unsafe { *self.ptr.add((addr & self.mask) as usize) }
    }

    #[inline(always)]
    pub fn write8(&self, addr: u32, data: u8) {
        unsafe { *self.ptr.add((addr & self.mask) as usize) = data }
    }

    // 16/32-bit accesses are assembled bytewise so a value that straddles the
    // wrap point still lands inside the buffer.
    #[inline(always)]
    pub fn read16(&self, addr: u32) -> u16 {
        self.read8(addr) as u16 | ((self.read8(addr.wrapping_add(1)) as u16) << 8)
    }

    #[inline(always)]
    pub fn write16(&self, addr: u32, data: u16) {
        self.write8(addr, data as u8);
        self.write8(addr.wrapping_add(1), (data >> 8) as u8);
    }

    #[inline(always)]
    pub fn read32(&self, addr: u32) -> u32 {
        self.read16(addr) as u32 | ((self.read16(addr.wrapping_add(2)) as u32) << 16)
    }

    #[inline(always)]
    pub fn write32(&self, addr: u32, data: u32) {
        self.write16(addr, data as u16);
        self.write16(addr.wrapping_add(2), (data >> 16) as u16);
    }

    #[inline(always)]
    pub fn read24(&self, addr: u32) -> u32 {
        self.read8(addr) as u32
            | ((self.read8(addr.wrapping_add(1)) as u32) << 8)
            | ((self.read8(addr.wrapping_add(2)) as u32) << 16)
    }

    #[inline(always)]
    pub fn write24(&self, addr: u32, data: u32) {
        self.write8(addr, data as u8);
        self.write8(addr.wrapping_add(1), (data >> 8) as u8);
        self.write8(addr.wrapping_add(2), (data >> 16) as u8);
    }
}
