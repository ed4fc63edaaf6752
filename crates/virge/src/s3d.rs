// S3D 2D engine: BitBlt, rectangle fill, line and polygon-fill primitives.
//
// All state arrives through the command FIFO as register writes into one of
// the three mirrored primitive windows; the engine runs entirely on the FIFO
// worker thread. Image-transfer data for host-sourced blits arrives through
// the same FIFO tagged with the original access width, and sub-pixel
// leftovers carry across entries until the primitive completes.

use bitfield::bitfield;
use log::warn;
use refrast::VramView;

use crate::fifo::AccessWidth;
use crate::irq::{Irq, INT_HOST_DONE, INT_S3D_DONE};
use crate::rop::rop3;

pub const CMD2D_BITBLT: u32 = 0;
pub const CMD2D_RECTFILL: u32 = 2;
pub const CMD2D_LINE: u32 = 3;
pub const CMD2D_POLYFILL: u32 = 5;
pub const CMD2D_NOP: u32 = 15;

bitfield! {
    /// 2D command-set word.
    #[derive(Copy, Clone)]
    pub struct Cmd2d(u32);
    impl Debug;

    pub autoexec, set_autoexec: 0;
    pub clip_en, set_clip_en: 1;
    pub format, set_format: 3, 2;          // 0 = 8bpp, 1 = 16bpp, 2 = 24bpp
    pub mirror_swap, set_mirror_swap: 6;
    pub ids, set_ids: 7;                   // image data from system
    pub mono_pat, set_mono_pat: 8;
    pub transp, set_transp: 9;
    pub ita, set_ita: 11, 10;              // alignment: 0 byte, 1 word, 2 dword
    pub pat_vram, set_pat_vram: 12;
    pub u8, rop, set_rop: 24, 17;
    pub x_pos, set_x_pos: 25;
    pub y_pos, set_y_pos: 26;
    pub cmd, set_cmd: 30, 27;
}

impl Cmd2d {
    #[inline]
    pub const fn full(&self) -> u32 {
        self.0
    }
}

/// The three mirrored register windows.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Win2d {
    BitBlt,
    Line,
    Poly,
}

// Common layout within each window (offset & 0x3FF).
pub const REG_SRC_BASE: u32 = 0x0D4;
pub const REG_DEST_BASE: u32 = 0x0D8;
pub const REG_CLIP_LR: u32 = 0x0DC;
pub const REG_CLIP_TB: u32 = 0x0E0;
pub const REG_STRIDE: u32 = 0x0E4;
pub const REG_MONO_PAT0: u32 = 0x0E8;
pub const REG_MONO_PAT1: u32 = 0x0EC;
pub const REG_PAT_BG: u32 = 0x0F0;
pub const REG_PAT_FG: u32 = 0x0F4;
pub const REG_SRC_BG: u32 = 0x0F8;
pub const REG_SRC_FG: u32 = 0x0FC;
pub const REG_CMD: u32 = 0x100;
pub const REG_WIDTH_HEIGHT: u32 = 0x104;
pub const REG_SRC_XY: u32 = 0x108;
pub const REG_DEST_XY: u32 = 0x10C;

// Line window extras.
pub const REG_LINE_END01: u32 = 0x16C;
pub const REG_LINE_DX: u32 = 0x170;
pub const REG_LINE_XSTART: u32 = 0x174;
pub const REG_LINE_YSTART: u32 = 0x178;
pub const REG_LINE_YCNT: u32 = 0x17C;

// Polygon window extras.
pub const REG_POLY_RDX: u32 = 0x168;
pub const REG_POLY_RXSTART: u32 = 0x16C;
pub const REG_POLY_LDX: u32 = 0x174;
pub const REG_POLY_LXSTART: u32 = 0x178;
pub const REG_POLY_YSTART: u32 = 0x17C;
pub const REG_POLY_YCNT: u32 = 0x180;

// Host-sourced transfer in flight: destination cursor plus the sub-pixel
// bit accumulator that carries across FIFO entries.
#[derive(Clone)]
struct Xfer {
    i: i32,
    j: i32,
    scan_bits: u32,
    discard: u32,
    acc: u64,
    acc_bits: u32,
}

#[derive(Clone)]
pub struct S3d {
    pub cmd: Cmd2d,
    src_base: u32,
    dest_base: u32,
    clip_l: i32,
    clip_r: i32,
    clip_t: i32,
    clip_b: i32,
    dest_stride: i32,
    src_stride: i32,
    mono_pat: [u32; 2],
    pat_bg: u32,
    pat_fg: u32,
    src_bg: u32,
    src_fg: u32,
    width: i32,
    height: i32,
    src_x: i32,
    src_y: i32,
    dest_x: i32,
    dest_y: i32,

    line_end0: i32,
    line_end1: i32,
    line_dx: i32,
    line_xstart: i32,
    line_ystart: i32,
    line_ycnt: i32,
    line_dir_down: bool,

    poly_rdx: i32,
    poly_rxstart: i32,
    poly_ldx: i32,
    poly_lxstart: i32,
    poly_ystart: i32,
    poly_ycnt: i32,

    xfer: Option<Xfer>,
    pattern: [u8; 192], // 8x8 color pattern, up to 24bpp
}

impl S3d {
    pub fn new() -> Self {
        S3d {
            cmd: Cmd2d(CMD2D_NOP << 27),
            src_base: 0,
            dest_base: 0,
            clip_l: 0,
            clip_r: 0,
            clip_t: 0,
            clip_b: 0,
            dest_stride: 0,
            src_stride: 0,
            mono_pat: [0; 2],
            pat_bg: 0,
            pat_fg: 0,
            src_bg: 0,
            src_fg: 0,
            width: 0,
            height: 0,
            src_x: 0,
            src_y: 0,
            dest_x: 0,
            dest_y: 0,
            line_end0: 0,
            line_end1: 0,
            line_dx: 0,
            line_xstart: 0,
            line_ystart: 0,
            line_ycnt: 0,
            line_dir_down: true,
            poly_rdx: 0,
            poly_rxstart: 0,
            poly_ldx: 0,
            poly_lxstart: 0,
            poly_ystart: 0,
            poly_ycnt: 0,
            xfer: None,
            pattern: [0; 192],
        }
    }

    pub fn write_reg(&mut self, win: Win2d, off: u32, value: u32, vram: &VramView, irq: &Irq) {
        match off {
            REG_SRC_BASE => self.src_base = value,
            REG_DEST_BASE => self.dest_base = value,
            REG_CLIP_LR => {
                self.clip_l = ((value >> 16) & 0x7FF) as i32;
                self.clip_r = (value & 0x7FF) as i32;
            }
            REG_CLIP_TB => {
                self.clip_t = ((value >> 16) & 0x7FF) as i32;
                self.clip_b = (value & 0x7FF) as i32;
            }
            REG_STRIDE => {
                self.dest_stride = (value >> 16) as i16 as i32;
                self.src_stride = value as i16 as i32;
            }
            REG_MONO_PAT0 => self.mono_pat[0] = value,
            REG_MONO_PAT1 => self.mono_pat[1] = value,
            REG_PAT_BG => self.pat_bg = value,
            REG_PAT_FG => self.pat_fg = value,
            REG_SRC_BG => self.src_bg = value,
            REG_SRC_FG => self.src_fg = value,
            REG_CMD => {
                self.cmd = Cmd2d(value);
                if !self.cmd.autoexec() {
                    self.begin(vram, irq);
                }
            }
            REG_WIDTH_HEIGHT => {
                self.width = ((value >> 16) & 0xFFFF) as i32;
                self.height = (value & 0xFFFF) as i32;
            }
            REG_SRC_XY => {
                self.src_x = ((value >> 16) & 0xFFFF) as i16 as i32;
                self.src_y = (value & 0xFFFF) as i16 as i32;
            }
            REG_DEST_XY => {
                self.dest_x = ((value >> 16) & 0xFFFF) as i16 as i32;
                self.dest_y = (value & 0xFFFF) as i16 as i32;
                if win == Win2d::BitBlt && self.cmd.autoexec() {
                    self.begin(vram, irq);
                }
            }
            _ => match win {
                Win2d::Line => self.write_line_reg(off, value, vram, irq),
                Win2d::Poly => self.write_poly_reg(off, value, vram, irq),
                Win2d::BitBlt => {}
            },
        }
    }

    fn write_line_reg(&mut self, off: u32, value: u32, vram: &VramView, irq: &Irq) {
        match off {
            REG_LINE_END01 => {
                self.line_end0 = ((value >> 16) & 0xFFFF) as i16 as i32;
                self.line_end1 = (value & 0xFFFF) as i16 as i32;
            }
            REG_LINE_DX => self.line_dx = value as i32,
            REG_LINE_XSTART => self.line_xstart = value as i32,
            REG_LINE_YSTART => self.line_ystart = value as i16 as i32,
            REG_LINE_YCNT => {
                self.line_dir_down = value & (1 << 31) != 0;
                self.line_ycnt = (value & 0xFFFF) as i32;
                if self.cmd.autoexec() {
                    self.begin(vram, irq);
                }
            }
            _ => {}
        }
    }

    fn write_poly_reg(&mut self, off: u32, value: u32, vram: &VramView, irq: &Irq) {
        match off {
            REG_POLY_RDX => self.poly_rdx = value as i32,
            REG_POLY_RXSTART => self.poly_rxstart = value as i32,
            REG_POLY_LDX => self.poly_ldx = value as i32,
            REG_POLY_LXSTART => self.poly_lxstart = value as i32,
            REG_POLY_YSTART => self.poly_ystart = value as i16 as i32,
            REG_POLY_YCNT => {
                self.poly_ycnt = (value & 0xFFFF) as i32;
                if self.cmd.autoexec() {
                    self.begin(vram, irq);
                }
            }
            _ => {}
        }
    }

    // Begin-of-primitive: latch the pattern, reset the transfer cursor and
    // run anything that is not fed by host data to completion.
    fn begin(&mut self, vram: &VramView, irq: &Irq) {
        self.xfer = None;
        match self.cmd.cmd() {
            CMD2D_NOP => irq.raise(INT_S3D_DONE),
            CMD2D_BITBLT => {
                self.latch_pattern(vram);
                if self.cmd.ids() {
                    if self.width <= 0 || self.height <= 0 {
                        irq.raise(INT_S3D_DONE | INT_HOST_DONE);
                        return;
                    }
                    self.xfer = Some(Xfer {
                        i: 0,
                        j: 0,
                        scan_bits: 0,
                        discard: 0,
                        acc: 0,
                        acc_bits: 0,
                    });
                } else {
                    self.blit_screen(vram);
                    irq.raise(INT_S3D_DONE);
                }
            }
            CMD2D_RECTFILL => {
                self.latch_pattern(vram);
                self.rect_fill(vram);
                irq.raise(INT_S3D_DONE);
            }
            CMD2D_LINE => {
                self.draw_line(vram);
                irq.raise(INT_S3D_DONE);
            }
            CMD2D_POLYFILL => {
                self.latch_pattern(vram);
                self.poly_fill(vram);
                irq.raise(INT_S3D_DONE);
            }
            other => panic!("s3d: unimplemented 2D command {:#x}", other),
        }
    }

    /// Host image data routed from the FIFO, width-tagged. Bytes accumulate
    /// until whole pixels are available; the remainder stays for the next
    /// entry.
    pub fn image_data(&mut self, vram: &VramView, irq: &Irq, value: u32, width: AccessWidth) {
        let Some(mut xf) = self.xfer.take() else {
            warn!("s3d: image data with no transfer in flight");
            return;
        };

        let nbytes = width.bytes();
        for k in 0..nbytes {
            let shift = if self.cmd.mirror_swap() {
                (nbytes - 1 - k) * 8
            } else {
                k * 8
            };
            let byte = (value >> shift) & 0xFF;
            xf.acc |= (byte as u64) << xf.acc_bits;
            xf.acc_bits += 8;
        }

        let bits = self.bpp_bits();
        let mask = self.pix_mask() as u64;
        let mut finished = false;

        loop {
            if xf.discard > 0 {
                let take = xf.discard.min(xf.acc_bits);
                xf.acc >>= take;
                xf.acc_bits -= take;
                xf.discard -= take;
                if xf.discard > 0 {
                    break;
                }
            }
            if xf.acc_bits < bits {
                break;
            }

            let pix = (xf.acc & mask) as u32;
            xf.acc >>= bits;
            xf.acc_bits -= bits;
            xf.scan_bits += bits;

            let dx = self.dest_x + if self.cmd.x_pos() { xf.i } else { -xf.i };
            let dy = self.dest_y + if self.cmd.y_pos() { xf.j } else { -xf.j };
            self.blit_pixel(vram, dx, dy, pix, true);

            xf.i += 1;
            if xf.i == self.width {
                xf.i = 0;
                xf.j += 1;
                let align = 8u32 << self.cmd.ita();
                let rem = xf.scan_bits % align;
                xf.discard = (align - rem) % align;
                xf.scan_bits = 0;
                if xf.j == self.height {
                    finished = true;
                    break;
                }
            }
        }

        if finished {
            irq.raise(INT_S3D_DONE | INT_HOST_DONE);
        } else {
            self.xfer = Some(xf);
        }
    }

    pub fn transfer_active(&self) -> bool {
        self.xfer.is_some()
    }

    /// Latched register image with any in-flight host transfer abandoned.
    pub fn register_image(&self) -> S3d {
        let mut img = self.clone();
        img.xfer = None;
        img
    }

    fn bpp_bytes(&self) -> u32 {
        // Format field value 3 is undefined; the engine treats it as 24bpp.
        self.cmd.format().min(2) + 1
    }

    fn bpp_bits(&self) -> u32 {
        self.bpp_bytes() * 8
    }

    fn pix_mask(&self) -> u32 {
        match self.bpp_bytes() {
            1 => 0xFF,
            2 => 0xFFFF,
            _ => 0xFF_FFFF,
        }
    }

    fn latch_pattern(&mut self, vram: &VramView) {
        if self.cmd.mono_pat() || !self.cmd.pat_vram() {
            return;
        }
        let len = 64 * self.bpp_bytes();
        for k in 0..len {
            self.pattern[k as usize] = vram.read8(self.src_base.wrapping_add(k));
        }
    }

    fn pattern_pixel(&self, x: i32, y: i32) -> u32 {
        if self.cmd.mono_pat() {
            let word = self.mono_pat[((y & 7) >> 2) as usize];
            let bit = (word >> (((y & 3) * 8 + (x & 7)) as u32)) & 1;
            if bit != 0 {
                self.pat_fg
            } else {
                self.pat_bg
            }
        } else if self.cmd.pat_vram() {
            let bpp = self.bpp_bytes();
            let idx = (((y & 7) * 8 + (x & 7)) as u32 * bpp) as usize;
            let mut v = 0u32;
            for k in 0..bpp as usize {
                v |= (self.pattern[idx + k] as u32) << (k * 8);
            }
            v
        } else {
            self.pat_fg
        }
    }

    fn px_read(&self, vram: &VramView, base: u32, stride: i32, x: i32, y: i32) -> u32 {
        let addr = base
            .wrapping_add((y.wrapping_mul(stride)) as u32)
            .wrapping_add((x as u32).wrapping_mul(self.bpp_bytes()));
        match self.bpp_bytes() {
            1 => vram.read8(addr) as u32,
            2 => vram.read16(addr) as u32,
            _ => vram.read24(addr),
        }
    }

    fn px_write(&self, vram: &VramView, x: i32, y: i32, value: u32) {
        let addr = self
            .dest_base
            .wrapping_add((y.wrapping_mul(self.dest_stride)) as u32)
            .wrapping_add((x as u32).wrapping_mul(self.bpp_bytes()));
        match self.bpp_bytes() {
            1 => vram.write8(addr, value as u8),
            2 => vram.write16(addr, value as u16),
            _ => vram.write24(addr, value),
        }
    }

    // Clipping is computed for every pixel; a rejected pixel suppresses the
    // write while the iteration counters run on in the caller.
    fn blit_pixel(&self, vram: &VramView, x: i32, y: i32, src: u32, use_transp: bool) -> bool {
        if self.cmd.clip_en()
            && (x < self.clip_l || x > self.clip_r || y < self.clip_t || y > self.clip_b)
        {
            return false;
        }
        let mask = self.pix_mask();
        if use_transp && self.cmd.transp() && (src & mask) == (self.src_bg & mask) {
            return false;
        }
        let dst = self.px_read(vram, self.dest_base, self.dest_stride, x, y);
        let pat = self.pattern_pixel(x, y);
        let out = rop3(self.cmd.rop(), pat, src, dst) & mask;
        self.px_write(vram, x, y, out);
        true
    }

    fn blit_screen(&self, vram: &VramView) {
        for j in 0..self.height {
            let (sy, dy) = if self.cmd.y_pos() {
                (self.src_y + j, self.dest_y + j)
            } else {
                (self.src_y - j, self.dest_y - j)
            };
            for i in 0..self.width {
                let (sx, dx) = if self.cmd.x_pos() {
                    (self.src_x + i, self.dest_x + i)
                } else {
                    (self.src_x - i, self.dest_x - i)
                };
                let src = self.px_read(vram, self.src_base, self.src_stride, sx, sy);
                self.blit_pixel(vram, dx, dy, src, true);
            }
        }
    }

    fn rect_fill(&self, vram: &VramView) {
        for j in 0..self.height {
            let dy = self.dest_y + if self.cmd.y_pos() { j } else { -j };
            for i in 0..self.width {
                let dx = self.dest_x + if self.cmd.x_pos() { i } else { -i };
                self.blit_pixel(vram, dx, dy, self.src_fg, false);
            }
        }
    }

    // One pixel per scanline at the integer part of the X accumulator,
    // clamped between the two endpoint columns.
    fn draw_line(&self, vram: &VramView) {
        let lo = self.line_end0.min(self.line_end1);
        let hi = self.line_end0.max(self.line_end1);
        let mut xf = self.line_xstart;
        let mut y = self.line_ystart;
        for _ in 0..self.line_ycnt {
            let xi = (xf >> 16).clamp(lo, hi);
            self.blit_pixel(vram, xi, y, self.src_fg, false);
            xf = xf.wrapping_add(self.line_dx);
            y += if self.line_dir_down { 1 } else { -1 };
        }
    }

    fn poly_fill(&self, vram: &VramView) {
        let mut lx = self.poly_lxstart;
        let mut rx = self.poly_rxstart;
        let mut y = self.poly_ystart;
        for _ in 0..self.poly_ycnt {
            for x in (lx >> 16)..(rx >> 16) {
                self.blit_pixel(vram, x, y, self.src_fg, false);
            }
            lx = lx.wrapping_add(self.poly_ldx);
            rx = rx.wrapping_add(self.poly_rdx);
            y += 1;
        }
    }
}
