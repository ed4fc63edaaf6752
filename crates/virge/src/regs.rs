// Legacy VGA I/O ports plus the S3 extended-register locks and banking.
//
// Extended CRTC registers stay write-locked out of reset: CR38 must see
// 0x48 in its high five bits to open CR30-CR3F, and CR39 must see 0xA0 in
// its high nibble to open CR40 and up. Locked writes are dropped; reads are
// always allowed. The linear-aperture bank is latched from CR6A, or from
// the legacy CR35 / CR51 split fields.

#[derive(Clone)]
pub struct VgaRegs {
    misc: u8,
    seq_idx: u8,
    seq: [u8; 0x20],
    crtc_idx: u8,
    crtc: [u8; 0x80],
    gdc_idx: u8,
    gdc: [u8; 0x10],
    atc_idx: u8,
    atc: [u8; 0x20],
    atc_flip: bool,
    dac_mask: u8,
    dac_read_idx: u16,
    dac_write_idx: u16,
    palette: [u8; 768],
    status_toggle: bool,
    bank: u8,
}

impl VgaRegs {
    pub fn new() -> Self {
        VgaRegs {
            misc: 0x01, // color-mode CRTC addressing
            seq_idx: 0,
            seq: [0; 0x20],
            crtc_idx: 0,
            crtc: [0; 0x80],
            gdc_idx: 0,
            gdc: [0; 0x10],
            atc_idx: 0,
            atc: [0; 0x20],
            atc_flip: false,
            dac_mask: 0xFF,
            dac_read_idx: 0,
            dac_write_idx: 0,
            palette: [0; 768],
            status_toggle: false,
            bank: 0,
        }
    }

    fn crtc_base(&self) -> u16 {
        if self.misc & 1 != 0 {
            0x3D4
        } else {
            0x3B4
        }
    }

    fn seq_unlocked(&self) -> bool {
        self.seq[0x08] == 0x06
    }

    fn crtc_write_allowed(&self, idx: u8) -> bool {
        match idx {
            0x00..=0x2F => true,
            0x30..=0x3F => self.crtc[0x38] & 0xF8 == 0x48,
            _ => self.crtc[0x39] & 0xF0 == 0xA0,
        }
    }

    fn crtc_data_write(&mut self, value: u8) {
        let idx = self.crtc_idx & 0x7F;
        if !self.crtc_write_allowed(idx) && idx != 0x38 && idx != 0x39 {
            return;
        }
        self.crtc[idx as usize] = value;
        match idx {
            0x35 => self.bank = (self.bank & 0x30) | (value & 0x0F),
            0x51 => self.bank = (self.bank & 0x0F) | ((value & 0x0C) << 2),
            0x6A => self.bank = value & 0x3F,
            _ => {}
        }
    }

    pub fn port_write(&mut self, port: u16, value: u8) {
        match port {
            0x3C2 => self.misc = value,
            0x3C4 => self.seq_idx = value & 0x1F,
            0x3C5 => {
                let idx = self.seq_idx;
                if idx < 0x09 || self.seq_unlocked() {
                    self.seq[idx as usize] = value;
                }
            }
            0x3C6 => self.dac_mask = value,
            0x3C7 => {
                self.dac_read_idx = value as u16 * 3;
            }
            0x3C8 => {
                self.dac_write_idx = value as u16 * 3;
            }
            0x3C9 => {
                self.palette[self.dac_write_idx as usize % 768] = value & 0x3F;
                self.dac_write_idx = (self.dac_write_idx + 1) % 768;
            }
            0x3C0 => {
                if self.atc_flip {
                    self.atc[(self.atc_idx & 0x1F) as usize] = value;
                } else {
                    self.atc_idx = value & 0x3F;
                }
                self.atc_flip = !self.atc_flip;
            }
            0x3CE => self.gdc_idx = value & 0x0F,
            0x3CF => self.gdc[(self.gdc_idx & 0x0F) as usize] = value,
            p if p == self.crtc_base() => self.crtc_idx = value,
            p if p == self.crtc_base() + 1 => self.crtc_data_write(value),
            _ => {}
        }
    }

    pub fn port_read(&mut self, port: u16) -> u8 {
        match port {
            0x3CC => self.misc,
            0x3C4 => self.seq_idx,
            0x3C5 => self.seq[(self.seq_idx & 0x1F) as usize],
            0x3C6 => self.dac_mask,
            0x3C9 => {
                let v = self.palette[self.dac_read_idx as usize % 768];
                self.dac_read_idx = (self.dac_read_idx + 1) % 768;
                v
            }
            0x3C0 => self.atc_idx,
            0x3C1 => self.atc[(self.atc_idx & 0x1F) as usize],
            0x3CE => self.gdc_idx,
            0x3CF => self.gdc[(self.gdc_idx & 0x0F) as usize],
            p if p == self.crtc_base() => self.crtc_idx,
            p if p == self.crtc_base() + 1 => self.crtc[(self.crtc_idx & 0x7F) as usize],
            p if p == self.crtc_base() + 6 => {
                // Input status 1: toggles so retrace polls make progress,
                // and resets the attribute flip-flop.
                self.atc_flip = false;
                self.status_toggle = !self.status_toggle;
                if self.status_toggle {
                    0x09
                } else {
                    0x00
                }
            }
            _ => 0xFF,
        }
    }

    /// 64 KiB bank selected for the legacy window.
    pub fn bank(&self) -> u32 {
        self.bank as u32
    }

    pub fn palette_rgb(&self, index: u8) -> (u8, u8, u8) {
        let o = index as usize * 3;
        (self.palette[o], self.palette[o + 1], self.palette[o + 2])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn crtc_write(v: &mut VgaRegs, idx: u8, val: u8) {
        v.port_write(0x3D4, idx);
        v.port_write(0x3D5, val);
    }

    fn crtc_read(v: &mut VgaRegs, idx: u8) -> u8 {
        v.port_write(0x3D4, idx);
        v.port_read(0x3D5)
    }

    #[test]
    fn extended_crtc_locked_until_unlock() {
        let mut v = VgaRegs::new();
        crtc_write(&mut v, 0x31, 0x55);
        assert_eq!(crtc_read(&mut v, 0x31), 0);
        crtc_write(&mut v, 0x38, 0x48);
        crtc_write(&mut v, 0x31, 0x55);
        assert_eq!(crtc_read(&mut v, 0x31), 0x55);
        // 0x40+ needs the second key.
        crtc_write(&mut v, 0x58, 0x13);
        assert_eq!(crtc_read(&mut v, 0x58), 0);
        crtc_write(&mut v, 0x39, 0xA0);
        crtc_write(&mut v, 0x58, 0x13);
        assert_eq!(crtc_read(&mut v, 0x58), 0x13);
        // Relock drops writes again.
        crtc_write(&mut v, 0x38, 0x00);
        crtc_write(&mut v, 0x31, 0x77);
        assert_eq!(crtc_read(&mut v, 0x31), 0x55);
    }

    #[test]
    fn bank_latch_composes_legacy_fields() {
        let mut v = VgaRegs::new();
        crtc_write(&mut v, 0x38, 0x48);
        crtc_write(&mut v, 0x39, 0xA0);
        crtc_write(&mut v, 0x35, 0x05);
        assert_eq!(v.bank(), 0x05);
        crtc_write(&mut v, 0x51, 0x08); // bank bits 5:4 = 0b10
        assert_eq!(v.bank(), 0x25);
        crtc_write(&mut v, 0x6A, 0x3F);
        assert_eq!(v.bank(), 0x3F);
    }

    #[test]
    fn sequencer_extended_lock() {
        let mut v = VgaRegs::new();
        v.port_write(0x3C4, 0x0A);
        v.port_write(0x3C5, 0x42);
        assert_eq!(v.port_read(0x3C5), 0);
        v.port_write(0x3C4, 0x08);
        v.port_write(0x3C5, 0x06); // unlock
        v.port_write(0x3C4, 0x0A);
        v.port_write(0x3C5, 0x42);
        assert_eq!(v.port_read(0x3C5), 0x42);
    }

    #[test]
    fn dac_writes_autoincrement() {
        let mut v = VgaRegs::new();
        v.port_write(0x3C8, 1);
        for c in [0x10, 0x20, 0x30, 0x11, 0x21, 0x31] {
            v.port_write(0x3C9, c);
        }
        assert_eq!(v.palette_rgb(1), (0x10, 0x20, 0x30));
        assert_eq!(v.palette_rgb(2), (0x11, 0x21, 0x31));
        v.port_write(0x3C7, 2);
        assert_eq!(v.port_read(0x3C9), 0x11);
    }

    #[test]
    fn status_read_resets_attribute_flipflop() {
        let mut v = VgaRegs::new();
        v.port_write(0x3C0, 0x05);
        v.port_read(0x3DA);
        // Next 0x3C0 write is an index again.
        v.port_write(0x3C0, 0x07);
        v.port_write(0x3C0, 0x99);
        assert_eq!(v.port_read(0x3C1), 0x99);
        assert_ne!(v.port_read(0x3DA), v.port_read(0x3DA));
    }
}
