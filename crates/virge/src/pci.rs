// PCI configuration space.
//
// A flat 256-byte image with a per-byte write mask; the memory BAR is held
// aside so size probes (write all-ones, read back) see the decode mask
// instead of stored bits. Command-register gating is queried by the MMIO
// dispatcher before any aperture access.

use refrast::ChipGen;

pub const PCI_VENDOR_S3: u16 = 0x5333;

const CMD_IO_EN: u16 = 1 << 0;
const CMD_MEM_EN: u16 = 1 << 1;
const CMD_MASTER_EN: u16 = 1 << 2;

// Linear aperture decode sizes by the 3-bit strap code.
const BAR_SIZES: [u32; 8] = [
    4 << 20,
    8 << 20,
    16 << 20,
    32 << 20,
    64 << 20,
    128 << 20,
    128 << 20,
    128 << 20,
];

#[derive(Clone)]
pub struct PciConfig {
    bytes: [u8; 256],
    wmask: [u8; 256],
    bar0: u32,
    bar0_mask: u32,
}

fn device_id(gen: ChipGen) -> u16 {
    match gen {
        ChipGen::Virge325 => 0x5631,
        ChipGen::VirgeDx => 0x8A01,
        ChipGen::VirgeGx2 => 0x8A10,
    }
}

impl PciConfig {
    pub fn new(gen: ChipGen, bar_size_code: u32) -> Self {
        let mut c = PciConfig {
            bytes: [0; 256],
            wmask: [0; 256],
            bar0: 0,
            bar0_mask: !(BAR_SIZES[(bar_size_code & 7) as usize] - 1),
        };
        let dev = device_id(gen);
        c.put16(0x00, PCI_VENDOR_S3);
        c.put16(0x02, dev);
        c.bytes[0x0B] = 0x03; // display controller, VGA-compatible
        c.bytes[0x3D] = 0x01; // INTA#
        c.put16(0x2C, PCI_VENDOR_S3);
        c.put16(0x2E, dev);

        c.wmask[0x04] = (CMD_IO_EN | CMD_MEM_EN | CMD_MASTER_EN) as u8;
        c.wmask[0x0C] = 0xFF; // cache line size
        c.wmask[0x0D] = 0xFF; // latency timer
        c.wmask[0x3C] = 0xFF; // interrupt line

        match gen {
            ChipGen::Virge325 => {}
            ChipGen::VirgeDx => c.add_pm_cap(0xDC, 0x00),
            ChipGen::VirgeGx2 => {
                c.add_agp_cap(0x80, 0xDC);
                c.add_pm_cap(0xDC, 0x00);
            }
        }
        c
    }

    fn put16(&mut self, off: usize, v: u16) {
        self.bytes[off] = v as u8;
        self.bytes[off + 1] = (v >> 8) as u8;
    }

    fn link_cap(&mut self, off: u8) {
        if self.bytes[0x34] == 0 {
            self.bytes[0x34] = off;
            self.bytes[0x06] |= 0x10; // capabilities-list status bit
        }
    }

    fn add_pm_cap(&mut self, off: u8, next: u8) {
        self.link_cap(off);
        let o = off as usize;
        self.bytes[o] = 0x01;
        self.bytes[o + 1] = next;
        self.put16(o + 2, 0x0021); // PM 1.1, no D1/D2
        self.wmask[o + 4] = 0x03; // PMCSR power-state field
    }

    fn add_agp_cap(&mut self, off: u8, next: u8) {
        self.link_cap(off);
        let o = off as usize;
        self.bytes[o] = 0x02;
        self.bytes[o + 1] = next;
        self.bytes[o + 2] = 0x20; // AGP 2.0
        self.bytes[o + 4] = 0x03; // 1x/2x data rates
        for k in 8..12 {
            self.wmask[o + k] = 0xFF; // AGP command
        }
    }

    fn read8(&self, off: u32) -> u8 {
        let off = (off & 0xFF) as usize;
        if (0x10..=0x13).contains(&off) {
            // Prefetchable memory BAR; low bits reflect the decode mask.
            let v = (self.bar0 & self.bar0_mask) | 0x8;
            (v >> ((off - 0x10) * 8)) as u8
        } else {
            self.bytes[off]
        }
    }

    fn write8(&mut self, off: u32, value: u8) {
        let off = (off & 0xFF) as usize;
        match off {
            0x10..=0x13 => {
                let sh = (off - 0x10) * 8;
                self.bar0 = (self.bar0 & !(0xFFu32 << sh)) | ((value as u32) << sh);
            }
            // Status is write-one-to-clear on its RW1C bits.
            0x07 => self.bytes[0x07] &= !(value & 0xF9),
            _ => {
                let m = self.wmask[off];
                self.bytes[off] = (self.bytes[off] & !m) | (value & m);
            }
        }
    }

    pub fn read(&self, off: u32, size: usize) -> u32 {
        let mut v = 0u32;
        for k in 0..size.min(4) as u32 {
            v |= (self.read8(off + k) as u32) << (k * 8);
        }
        v
    }

    pub fn write(&mut self, off: u32, value: u32, size: usize) {
        for k in 0..size.min(4) as u32 {
            self.write8(off + k, (value >> (k * 8)) as u8);
        }
    }

    fn command(&self) -> u16 {
        self.bytes[0x04] as u16 | ((self.bytes[0x05] as u16) << 8)
    }

    pub fn io_enabled(&self) -> bool {
        self.command() & CMD_IO_EN != 0
    }

    pub fn mem_enabled(&self) -> bool {
        self.command() & CMD_MEM_EN != 0
    }

    pub fn bar0_addr(&self) -> u32 {
        self.bar0 & self.bar0_mask
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_and_class() {
        let c = PciConfig::new(ChipGen::Virge325, 2);
        assert_eq!(c.read(0x00, 4), 0x5631_5333);
        assert_eq!(c.read(0x08, 4) >> 8, 0x03_0000);
        // No capability list on the 325.
        assert_eq!(c.read(0x34, 1), 0);
    }

    #[test]
    fn bar_probe_reports_aperture_size() {
        // Code 3: 32 MiB decode.
        let mut c = PciConfig::new(ChipGen::VirgeDx, 3);
        c.write(0x10, 0xFFFF_FFFF, 4);
        assert_eq!(c.read(0x10, 4), 0xFE00_0008);
        c.write(0x10, 0xF200_0000, 4);
        assert_eq!(c.bar0_addr(), 0xF200_0000);
        assert_eq!(c.read(0x10, 4), 0xF200_0008);
    }

    #[test]
    fn command_register_gates_and_masks() {
        let mut c = PciConfig::new(ChipGen::VirgeDx, 0);
        assert!(!c.mem_enabled());
        c.write(0x04, 0xFFFF, 2);
        assert!(c.io_enabled());
        assert!(c.mem_enabled());
        // Only the three low bits stick.
        assert_eq!(c.read(0x04, 2), 0x0007);
        c.write(0x04, 0, 2);
        assert!(!c.mem_enabled());
    }

    #[test]
    fn read_only_bytes_ignore_writes() {
        let mut c = PciConfig::new(ChipGen::VirgeGx2, 1);
        c.write(0x00, 0x1234_5678, 4);
        assert_eq!(c.read(0x00, 4), 0x8A10_5333);
    }

    #[test]
    fn capability_chain_walks_agp_then_pm() {
        let c = PciConfig::new(ChipGen::VirgeGx2, 1);
        assert_ne!(c.read(0x06, 2) & 0x10, 0);
        let first = c.read(0x34, 1);
        assert_eq!(first, 0x80);
        assert_eq!(c.read(first, 1), 0x02); // AGP
        let next = c.read(first + 1, 1);
        assert_eq!(next, 0xDC);
        assert_eq!(c.read(next, 1), 0x01); // power management
        assert_eq!(c.read(next + 1, 1), 0);
    }
}
