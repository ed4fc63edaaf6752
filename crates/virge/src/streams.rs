// Streams processor: primary graphics stream plus a scaled secondary video
// window composited at scan-out.
//
// Horizontal and vertical scaling share one DDA rule: the accumulator starts
// at -1 for each line; for every output pixel the current source pixel is
// emitted, K1 is added, and while the accumulator is non-negative the source
// cursor advances and K2 is added. Source pixels are decoded through an
// 8-entry rolling cache refilled four pixels at a time, which keeps the
// grouped YUV formats on their natural byte boundaries.

use refrast::vram::VramView;
use refrast::types::{argb1555_32, argb565_32};

pub const STR_P_CTRL: u32 = 0x8180;
pub const STR_S_CTRL: u32 = 0x8190;
pub const STR_BLEND: u32 = 0x81A0;
pub const STR_P_BASE: u32 = 0x81C0;
pub const STR_P_STRIDE: u32 = 0x81C8;
pub const STR_S_BASE: u32 = 0x81D0;
pub const STR_S_STRIDE: u32 = 0x81D8;
pub const STR_K1: u32 = 0x81E0;
pub const STR_K2: u32 = 0x81E4;
pub const STR_V_INIT: u32 = 0x81E8;
pub const STR_V_K: u32 = 0x81EC;
pub const STR_WIN_XY: u32 = 0x81F0;
pub const STR_WIN_WH: u32 = 0x81F4;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum StreamFormat {
    Rgb555,
    Rgb565,
    Rgb888,
    Xrgb8888,
    Yuv422,
    Yuv211,
    YCbCr422,
}

impl StreamFormat {
    fn from_ctrl(ctrl: u32) -> Self {
        match (ctrl >> 24) & 7 {
            0 => StreamFormat::Rgb555,
            1 => StreamFormat::Rgb565,
            2 => StreamFormat::Rgb888,
            3 => StreamFormat::Xrgb8888,
            4 => StreamFormat::Yuv422,
            5 => StreamFormat::Yuv211,
            _ => StreamFormat::YCbCr422,
        }
    }
}

#[derive(Clone, Default)]
pub struct Streams {
    pub p_ctrl: u32,
    pub s_ctrl: u32,
    pub blend: u32,
    pub p_base: u32,
    pub p_stride: u32,
    pub s_base: u32,
    pub s_stride: u32,
    pub k1: u32,
    pub k2: u32,
    pub v_init: u32,
    pub v_k: u32,
    pub win_xy: u32,
    pub win_wh: u32,
}

fn clamp8(v: i32) -> u32 {
    v.clamp(0, 255) as u32
}

// Full-range BT.601.
fn yuv_rgb(y: i32, u: i32, v: i32) -> u32 {
    let d = u - 128;
    let e = v - 128;
    let r = clamp8(y + ((359 * e) >> 8));
    let g = clamp8(y - ((88 * d + 183 * e) >> 8));
    let b = clamp8(y + ((454 * d) >> 8));
    0xFF00_0000 | (r << 16) | (g << 8) | b
}

// Video-range luma, expanded to full range before conversion.
fn ycbcr_rgb(y: i32, cb: i32, cr: i32) -> u32 {
    yuv_rgb(((y - 16) * 255) / 219, cb, cr)
}

struct RowCache {
    pix: [u32; 8],
    base: u32,
}

impl Streams {
    pub fn write_reg(&mut self, off: u32, value: u32) {
        match off {
            STR_P_CTRL => self.p_ctrl = value,
            STR_S_CTRL => self.s_ctrl = value,
            STR_BLEND => self.blend = value,
            STR_P_BASE => self.p_base = value,
            STR_P_STRIDE => self.p_stride = value,
            STR_S_BASE => self.s_base = value,
            STR_S_STRIDE => self.s_stride = value,
            STR_K1 => self.k1 = value,
            STR_K2 => self.k2 = value,
            STR_V_INIT => self.v_init = value,
            STR_V_K => self.v_k = value,
            STR_WIN_XY => self.win_xy = value,
            STR_WIN_WH => self.win_wh = value,
            _ => {}
        }
    }

    pub fn read_reg(&self, off: u32) -> u32 {
        match off {
            STR_P_CTRL => self.p_ctrl,
            STR_S_CTRL => self.s_ctrl,
            STR_BLEND => self.blend,
            STR_P_BASE => self.p_base,
            STR_P_STRIDE => self.p_stride,
            STR_S_BASE => self.s_base,
            STR_S_STRIDE => self.s_stride,
            STR_K1 => self.k1,
            STR_K2 => self.k2,
            STR_V_INIT => self.v_init,
            STR_V_K => self.v_k,
            STR_WIN_XY => self.win_xy,
            STR_WIN_WH => self.win_wh,
            _ => 0xFFFF_FFFF,
        }
    }

    fn win_x(&self) -> i32 {
        ((self.win_xy >> 16) & 0x7FF) as i32
    }

    fn win_y(&self) -> i32 {
        (self.win_xy & 0x7FF) as i32
    }

    fn win_w(&self) -> i32 {
        (((self.win_wh >> 16) & 0x7FF) as i32) + 1
    }

    fn win_h(&self) -> i32 {
        ((self.win_wh & 0x7FF) as i32) + 1
    }

    fn decode4(&self, vram: &VramView, fmt: StreamFormat, row: u32, idx: u32) -> [u32; 4] {
        let mut out = [0u32; 4];
        match fmt {
            StreamFormat::Rgb555 => {
                for (k, o) in out.iter_mut().enumerate() {
                    *o = argb1555_32(vram.read16(row + (idx + k as u32) * 2)) | 0xFF00_0000;
                }
            }
            StreamFormat::Rgb565 => {
                for (k, o) in out.iter_mut().enumerate() {
                    *o = argb565_32(vram.read16(row + (idx + k as u32) * 2));
                }
            }
            StreamFormat::Rgb888 => {
                for (k, o) in out.iter_mut().enumerate() {
                    *o = vram.read24(row + (idx + k as u32) * 3) | 0xFF00_0000;
                }
            }
            StreamFormat::Xrgb8888 => {
                for (k, o) in out.iter_mut().enumerate() {
                    *o = vram.read32(row + (idx + k as u32) * 4) | 0xFF00_0000;
                }
            }
            // Y0 U Y1 V, one chroma pair per two pixels.
            StreamFormat::Yuv422 => {
                for pair in 0..2u32 {
                    let a = row + (idx + pair * 2) * 2;
                    let y0 = vram.read8(a) as i32;
                    let u = vram.read8(a + 1) as i32;
                    let y1 = vram.read8(a + 2) as i32;
                    let v = vram.read8(a + 3) as i32;
                    out[(pair * 2) as usize] = yuv_rgb(y0, u, v);
                    out[(pair * 2 + 1) as usize] = yuv_rgb(y1, u, v);
                }
            }
            // Four lumas and one chroma pair in six bytes.
            StreamFormat::Yuv211 => {
                let a = row + (idx / 4) * 6;
                let u = vram.read8(a + 4) as i32;
                let v = vram.read8(a + 5) as i32;
                for (k, o) in out.iter_mut().enumerate() {
                    *o = yuv_rgb(vram.read8(a + k as u32) as i32, u, v);
                }
            }
            // Cb Y0 Cr Y1, video-range luma.
            StreamFormat::YCbCr422 => {
                for pair in 0..2u32 {
                    let a = row + (idx + pair * 2) * 2;
                    let cb = vram.read8(a) as i32;
                    let y0 = vram.read8(a + 1) as i32;
                    let cr = vram.read8(a + 2) as i32;
                    let y1 = vram.read8(a + 3) as i32;
                    out[(pair * 2) as usize] = ycbcr_rgb(y0, cb, cr);
                    out[(pair * 2 + 1) as usize] = ycbcr_rgb(y1, cb, cr);
                }
            }
        }
        out
    }

    fn cache_fetch(
        &self,
        vram: &VramView,
        fmt: StreamFormat,
        row: u32,
        cache: &mut RowCache,
        cursor: u32,
    ) -> u32 {
        while cursor >= cache.base + 8 {
            cache.pix.copy_within(4.., 0);
            cache.base += 4;
            let next = self.decode4(vram, fmt, row, cache.base + 4);
            cache.pix[4..].copy_from_slice(&next);
        }
        cache.pix[(cursor - cache.base) as usize]
    }

    /// Source row for output line `y`, per the vertical DDA.
    fn source_row(&self, y_rel: i32) -> u32 {
        let vk1 = (self.v_k >> 16) as i16 as i32;
        let vk2 = self.v_k as i16 as i32;
        let mut acc = self.v_init as i32;
        let mut row = 0i64;
        for _ in 0..y_rel {
            acc += vk1;
            while acc >= 0 {
                row += 1;
                acc += vk2;
            }
        }
        let stride = self.s_stride as i16 as i32 as i64;
        self.s_base.wrapping_add((row * stride) as u32)
    }

    /// Compose one output scanline: primary stream pixels, with the
    /// secondary window scaled on top when compositing selects it.
    pub fn scan_out(&self, vram: &VramView, y: i32, out: &mut [u32]) {
        let p_fmt = StreamFormat::from_ctrl(self.p_ctrl);
        let p_row = self
            .p_base
            .wrapping_add((y.wrapping_mul(self.p_stride as i16 as i32)) as u32);
        let mut cache = RowCache {
            pix: [0; 8],
            base: 0,
        };
        let first = self.decode4(vram, p_fmt, p_row, 0);
        cache.pix[..4].copy_from_slice(&first);
        cache.pix[4..].copy_from_slice(&self.decode4(vram, p_fmt, p_row, 4));
        for (x, o) in out.iter_mut().enumerate() {
            *o = self.cache_fetch(vram, p_fmt, p_row, &mut cache, x as u32);
        }

        if (self.blend >> 24) & 7 == 0 {
            return;
        }
        let wy = self.win_y();
        if y < wy || y >= wy + self.win_h() {
            return;
        }

        let s_fmt = StreamFormat::from_ctrl(self.s_ctrl);
        let s_row = self.source_row(y - wy);
        let mut cache = RowCache {
            pix: [0; 8],
            base: 0,
        };
        cache.pix[..4].copy_from_slice(&self.decode4(vram, s_fmt, s_row, 0));
        cache.pix[4..].copy_from_slice(&self.decode4(vram, s_fmt, s_row, 4));

        let k1 = self.k1 as i32;
        let k2 = self.k2 as i32;
        let mut acc = -1i32;
        let mut cursor = 0u32;
        let wx = self.win_x();
        for i in 0..self.win_w() {
            let x = wx + i;
            if x >= 0 && (x as usize) < out.len() {
                out[x as usize] = self.cache_fetch(vram, s_fmt, s_row, &mut cache, cursor);
            }
            acc += k1;
            while acc >= 0 {
                cursor += 1;
                acc += k2;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup(buf: &mut Vec<u8>) -> (VramView, Streams) {
        let view = VramView::new(buf.as_mut_ptr(), buf.len());
        let mut st = Streams::default();
        // Primary: XRGB8888 at 0, stride 4096.
        st.write_reg(STR_P_CTRL, 3 << 24);
        st.write_reg(STR_P_BASE, 0);
        st.write_reg(STR_P_STRIDE, 4096);
        (view, st)
    }

    #[test]
    fn primary_only_passes_pixels_through() {
        let mut buf = vec![0u8; 1 << 20];
        let (view, st) = setup(&mut buf);
        for x in 0..6u32 {
            view.write32(x * 4, 0x0011_2200 + x);
        }
        let mut out = [0u32; 6];
        st.scan_out(&view, 0, &mut out);
        for x in 0..6u32 {
            assert_eq!(out[x as usize], 0xFF11_2200 + x);
        }
    }

    #[test]
    fn secondary_one_to_one_maps_window() {
        let mut buf = vec![0u8; 1 << 20];
        let (view, mut st) = setup(&mut buf);
        st.write_reg(STR_S_CTRL, 1 << 24); // RGB565
        st.write_reg(STR_S_BASE, 0x40000);
        st.write_reg(STR_S_STRIDE, 2048);
        st.write_reg(STR_BLEND, 1 << 24);
        st.write_reg(STR_K1, 1);
        st.write_reg(STR_K2, -1i32 as u32);
        st.write_reg(STR_V_INIT, -1i32 as u32);
        st.write_reg(STR_V_K, 0x0001_FFFF); // vk1=1, vk2=-1
        st.write_reg(STR_WIN_XY, (4 << 16) | 2);
        st.write_reg(STR_WIN_WH, (3 << 16) | 0); // 4x1
        for x in 0..4u32 {
            view.write16(0x40000 + x * 2, 0xF800 | x as u16); // red-ish
        }
        let mut out = [0u32; 10];
        st.scan_out(&view, 2, &mut out);
        assert_eq!(out[3], 0xFF00_0000); // primary (black) outside window
        for x in 0..4usize {
            assert_eq!(out[4 + x] & 0x00F8_0000, 0x00F8_0000);
        }
        assert_eq!(out[8], 0xFF00_0000);
        // Off the window's line: no overlay.
        let mut out2 = [0u32; 10];
        st.scan_out(&view, 3, &mut out2);
        assert_eq!(out2[4], 0xFF00_0000);
    }

    #[test]
    fn horizontal_dda_replicates_on_upscale() {
        let mut buf = vec![0u8; 1 << 20];
        let (view, mut st) = setup(&mut buf);
        st.write_reg(STR_S_CTRL, 3 << 24); // XRGB8888
        st.write_reg(STR_S_BASE, 0x40000);
        st.write_reg(STR_S_STRIDE, 2048);
        st.write_reg(STR_BLEND, 1 << 24);
        st.write_reg(STR_K1, 1);
        st.write_reg(STR_K2, -2i32 as u32);
        st.write_reg(STR_WIN_XY, 0);
        st.write_reg(STR_WIN_WH, 4 << 16); // 5 wide
        for s in 0..4u32 {
            view.write32(0x40000 + s * 4, s);
        }
        let mut out = [0u32; 5];
        st.scan_out(&view, 0, &mut out);
        let got: Vec<u32> = out.iter().map(|p| p & 0xFF).collect();
        assert_eq!(got, vec![0, 1, 1, 2, 2]);
    }

    #[test]
    fn yuv422_grey_decodes_grey() {
        let mut buf = vec![0u8; 1 << 20];
        let (view, mut st) = setup(&mut buf);
        st.write_reg(STR_S_CTRL, 4 << 24); // YUV422
        st.write_reg(STR_S_BASE, 0x40000);
        st.write_reg(STR_S_STRIDE, 2048);
        st.write_reg(STR_BLEND, 1 << 24);
        st.write_reg(STR_K1, 1);
        st.write_reg(STR_K2, -1i32 as u32);
        st.write_reg(STR_WIN_XY, 0);
        st.write_reg(STR_WIN_WH, 1 << 16); // 2 wide
        // Y=128, U=V=128: mid grey.
        for b in 0..16u32 {
            view.write8(0x40000 + b, 128);
        }
        let mut out = [0u32; 2];
        st.scan_out(&view, 0, &mut out);
        assert_eq!(out[0], 0xFF80_8080);
        assert_eq!(out[1], 0xFF80_8080);
    }

    #[test]
    fn vertical_dda_selects_source_row() {
        let mut buf = vec![0u8; 1 << 20];
        let (view, mut st) = setup(&mut buf);
        st.write_reg(STR_S_CTRL, 3 << 24);
        st.write_reg(STR_S_BASE, 0x40000);
        st.write_reg(STR_S_STRIDE, 64);
        st.write_reg(STR_BLEND, 1 << 24);
        st.write_reg(STR_K1, 1);
        st.write_reg(STR_K2, -1i32 as u32);
        st.write_reg(STR_V_INIT, -1i32 as u32);
        st.write_reg(STR_V_K, 0x0001_FFFE); // vk1=1, vk2=-2: each row twice
        st.write_reg(STR_WIN_XY, 0);
        st.write_reg(STR_WIN_WH, 3); // 1 wide, 4 tall
        for r in 0..3u32 {
            view.write32(0x40000 + r * 64, 0x10 + r);
        }
        let mut rows = Vec::new();
        for y in 0..4 {
            let mut out = [0u32; 1];
            st.scan_out(&view, y, &mut out);
            rows.push(out[0] & 0xFF);
        }
        assert_eq!(rows, vec![0x10, 0x11, 0x11, 0x12]);
    }
}
