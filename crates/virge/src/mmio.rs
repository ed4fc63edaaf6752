// Host-side access paths: the MMIO register file, the linear framebuffer,
// the legacy banked window, the VGA port block and PCI configuration.
//
// Accelerator register writes do not touch engine state here; they are
// queued and the FIFO worker applies them in order. The dispatcher only
// keeps shadow copies of the last command-set words so it can tell which
// writes start an auto-executing primitive and must respect the FIFO
// reserve.

use std::sync::atomic::Ordering;

use crate::fifo::{AccessWidth, FifoEntry, FIFO_AUTOEXEC_RESERVE};
use crate::irq::INT_FIFO_OVF;
use crate::s3d::{REG_CMD, REG_DEST_XY, REG_LINE_YCNT, REG_POLY_YCNT};
use crate::tri::{TRI_CMD, TRI_TRIGGER};
use crate::Virge;

const OPEN_BUS: u32 = 0xFFFF_FFFF;

// Bit 0 of both command-set words.
#[inline]
fn autoexec(cmd_word: u32) -> bool {
    cmd_word & 1 != 0
}

// The FIFO reserve holds back only the writes that start an auto-executing
// primitive; everything else, command-set writes included, is admitted until
// the queue is full.
fn reserve_2d(shadow: u32, win: usize, reg: u32) -> usize {
    if !autoexec(shadow) {
        return 0;
    }
    let trigger = match win {
        0 => reg == REG_DEST_XY,
        1 => reg == REG_LINE_YCNT,
        _ => reg == REG_POLY_YCNT,
    };
    if trigger {
        FIFO_AUTOEXEC_RESERVE
    } else {
        0
    }
}

// MMIO register file offsets outside the queued windows.
pub const MMIO_STATUS: u32 = 0x8504;
pub const MMIO_ADV_FUNC: u32 = 0x850C;
pub const MMIO_DMA_BASE: u32 = 0x8590;
pub const MMIO_DMA_COUNT: u32 = 0x8594;
pub const MMIO_DMA_CTRL: u32 = 0x8598;
pub const MMIO_SERIAL: u32 = 0xFF20;

impl Virge {
    pub fn pci_cfg_read(&self, off: u32, size: usize) -> u32 {
        self.pci.read(off, size)
    }

    pub fn pci_cfg_write(&mut self, off: u32, value: u32, size: usize) {
        self.pci.write(off, value, size);
    }

    fn push_fifo(&self, entry: FifoEntry, min_free: usize) {
        if self.shared.fifo.push(entry, min_free) {
            self.shared.irq.raise(INT_FIFO_OVF);
        }
    }

    fn push_2d(&mut self, off: u32, value: u32, width: AccessWidth) {
        let win = ((off - 0xA400) / 0x400) as usize;
        let reg = off & 0x3FF;
        if reg == REG_CMD {
            self.cmd2d_shadow[win] = value;
        }
        let min_free = reserve_2d(self.cmd2d_shadow[win], win, reg);
        self.push_fifo(
            FifoEntry {
                addr: off,
                value,
                width,
            },
            min_free,
        );
    }

    fn push_3d(&mut self, off: u32, value: u32, width: AccessWidth) {
        if off == TRI_CMD {
            self.cmd3d_shadow = value;
        }
        let min_free = if off == TRI_TRIGGER && autoexec(self.cmd3d_shadow) {
            FIFO_AUTOEXEC_RESERVE
        } else {
            0
        };
        self.push_fifo(
            FifoEntry {
                addr: off,
                value,
                width,
            },
            min_free,
        );
    }

    // Status: subsystem interrupt bits in the low byte, a 5-bit free-slot
    // indication above it. Reading also wakes the FIFO worker, so a host
    // spinning on the status register cannot stall a parked queue.
    fn status_read(&self) -> u32 {
        self.shared.fifo.kick();
        let free = (self.shared.fifo.free() >> 11).min(0x1F) as u32;
        (self.shared.irq.status() & 0xFF) | (free << 8)
    }

    fn mmio_read32(&self, off: u32) -> u32 {
        match off {
            0x8180..=0x81FF => self.streams.read_reg(off),
            MMIO_STATUS => self.status_read(),
            MMIO_ADV_FUNC => self.adv_ctrl,
            MMIO_DMA_BASE => self.dma_base,
            MMIO_DMA_COUNT => self.dma_count,
            MMIO_DMA_CTRL => self.dma_ctrl,
            // DDC bit-bang: the written clock/data lines read back on the
            // sense bits.
            MMIO_SERIAL => self.serial | (self.serial << 2),
            _ => OPEN_BUS,
        }
    }

    // Sub-word reads return the addressed byte lanes of the containing
    // dword.
    pub fn mmio_read(&self, off: u32, size: usize) -> u32 {
        let v = if self.pci.mem_enabled() {
            self.mmio_read32(off & !3)
        } else {
            OPEN_BUS
        };
        match size {
            1 => (v >> ((off & 3) * 8)) & 0xFF,
            2 => (v >> ((off & 2) * 8)) & 0xFFFF,
            _ => v,
        }
    }

    pub fn mmio_write(&mut self, off: u32, value: u32, size: usize) {
        if !self.pci.mem_enabled() {
            return;
        }
        let width = AccessWidth::from_size(size);
        match off {
            // Image-transfer window: raw width-tagged data for the 2D
            // engine's host-sourced transfers.
            0x0000..=0x7FFF => self.push_fifo(
                FifoEntry {
                    addr: off,
                    value,
                    width,
                },
                0,
            ),
            0x8180..=0x81FF => self.streams.write_reg(off, value),
            MMIO_STATUS => self.shared.irq.control_write(value),
            MMIO_ADV_FUNC => self.adv_ctrl = value,
            MMIO_DMA_BASE => self.dma_base = value,
            MMIO_DMA_COUNT => self.dma_count = value,
            MMIO_DMA_CTRL => {
                self.dma_ctrl = value;
                self.shared
                    .dma_active
                    .store(value & 1 != 0, Ordering::Relaxed);
            }
            0xA400..=0xAFFF => self.push_2d(off, value, width),
            0xB400..=0xB7FF => self.push_3d(off, value, width),
            MMIO_SERIAL => self.serial = value & 3,
            _ => {}
        }
    }

    /// Linear framebuffer aperture.
    pub fn lfb_read(&self, off: u32, size: usize) -> u32 {
        if !self.pci.mem_enabled() {
            return OPEN_BUS;
        }
        match size {
            1 => self.view.read8(off) as u32,
            2 => self.view.read16(off) as u32,
            _ => self.view.read32(off),
        }
    }

    pub fn lfb_write(&self, off: u32, value: u32, size: usize) {
        if !self.pci.mem_enabled() {
            return;
        }
        match size {
            1 => self.view.write8(off, value as u8),
            2 => self.view.write16(off, value as u16),
            _ => self.view.write32(off, value),
        }
    }

    /// Legacy 64 KiB window at A0000, routed through the bank latch.
    pub fn legacy_read8(&self, off: u32) -> u8 {
        if !self.pci.mem_enabled() {
            return 0xFF;
        }
        self.view.read8((self.vga.bank() << 16) + (off & 0xFFFF))
    }

    pub fn legacy_write8(&self, off: u32, value: u8) {
        if self.pci.mem_enabled() {
            self.view
                .write8((self.vga.bank() << 16) + (off & 0xFFFF), value);
        }
    }

    pub fn io_read(&mut self, port: u16) -> u8 {
        if !self.pci.io_enabled() {
            return 0xFF;
        }
        self.vga.port_read(port)
    }

    pub fn io_write(&mut self, port: u16, value: u8) {
        if self.pci.io_enabled() {
            self.vga.port_write(port, value);
        }
    }
}
