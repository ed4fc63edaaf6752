// Texture fetch, mip chain walking and filtering.

use crate::types::*;
use crate::vram::VramView;

// Convert u8 to 256 scale (adds half bit for rounding).
#[inline(always)]
pub fn to_u8_256(v: u8) -> u32 {
    v as u32 + ((v as u32) >> 7)
}

/// Per-triangle sampling state derived from the command word. Mip level base
/// offsets are precomputed by walking the chain from the 1x1 level upward,
/// accumulating texel-count * bytes-per-texel per level; the texture base
/// register points at the smallest level.
#[derive(Copy, Clone)]
pub struct TexSampler {
    base: u32,
    border: Color,
    fmt: TexFormat,
    size_log2: u32,
    wrap: bool,
    mip: bool,
    bilinear: bool,
    persp: bool,
    bias: i32,
    chip: ChipGen,
    chain_offs: [u32; 11],
}

impl TexSampler {
    pub fn new(tri: &TriSetup, chip: ChipGen) -> Self {
        let cmd = tri.cmd_word();
        let fmt = TexFormat::from_bits(cmd.tex_fmt());
        let size_log2 = cmd.tex_size().min(10);
        let filter = cmd.filter();

        let bpp = fmt.bytes_per_texel();
        let mut chain_offs = [0u32; 11];
        let mut acc = 0u32;
        for edge_log2 in 0..11usize {
            chain_offs[edge_log2] = acc;
            let edge = 1u32 << edge_log2;
            acc += edge * edge * bpp;
        }

        TexSampler {
            base: tri.tex_base,
            border: Color::from_raw(tri.border_color),
            fmt,
            size_log2,
            wrap: cmd.wrap_en(),
            mip: (filter & 1) != 0,
            bilinear: (filter & 2) != 0,
            persp: (filter & 4) != 0,
            bias: cmd.mip_bias() as i32,
            chip,
            chain_offs,
        }
    }

    #[inline]
    pub fn perspective(&self) -> bool {
        self.persp
    }

    /// u/v are 11.20, w is 1.31 reciprocal-W, d is the 4.27 LOD term.
    pub fn sample(&self, vram: &VramView, u: i32, v: i32, w: i32, d: i32) -> Color {
        let (u, v) = if self.persp {
            (self.persp_div(u, w), self.persp_div(v, w))
        } else {
            (u, v)
        };

        let level = if self.mip {
            ((d >> 27) - self.bias).clamp(0, self.size_log2 as i32) as u32
        } else {
            0
        };

        let uf = u >> level;
        let vf = v >> level;

        if !self.bilinear {
            return self.fetch(vram, uf >> 20, vf >> 20, level);
        }

        let t00 = self.fetch(vram, uf >> 20, vf >> 20, level);
        let t10 = self.fetch(vram, (uf >> 20) + 1, vf >> 20, level);
        let t01 = self.fetch(vram, uf >> 20, (vf >> 20) + 1, level);
        let t11 = self.fetch(vram, (uf >> 20) + 1, (vf >> 20) + 1, level);

        let ub = to_u8_256(((uf >> 12) & 0xFF) as u8);
        let vb = to_u8_256(((vf >> 12) & 0xFF) as u8);
        let nub = 256 - ub;
        let nvb = 256 - vb;

        Color {
            b: ((t00.b as u32 * nub * nvb
                + t10.b as u32 * ub * nvb
                + t01.b as u32 * nub * vb
                + t11.b as u32 * ub * vb)
                / 65536) as u8,
            g: ((t00.g as u32 * nub * nvb
                + t10.g as u32 * ub * nvb
                + t01.g as u32 * nub * vb
                + t11.g as u32 * ub * vb)
                / 65536) as u8,
            r: ((t00.r as u32 * nub * nvb
                + t10.r as u32 * ub * nvb
                + t01.r as u32 * nub * vb
                + t11.r as u32 * ub * vb)
                / 65536) as u8,
            a: ((t00.a as u32 * nub * nvb
                + t10.a as u32 * ub * nvb
                + t01.a as u32 * nub * vb
                + t11.a as u32 * ub * vb)
                / 65536) as u8,
        }
    }

    // The 325 runs the reciprocal divide with the low 15 fraction bits of W
    // dropped; later parts use the full 31.
    #[inline]
    fn persp_div(&self, coord: i32, w: i32) -> i32 {
        let w = match self.chip {
            ChipGen::Virge325 => (w as u32 & !0x7FFF) as i32,
            _ => w,
        };
        if w <= 0 {
            return coord;
        }
        (((coord as i64) << 31) / w as i64) as i32
    }

    fn fetch(&self, vram: &VramView, ut: i32, vt: i32, level: u32) -> Color {
        let edge_log2 = self.size_log2 - level;
        let edge = 1i32 << edge_log2;

        let outside = ut < 0 || ut >= edge || vt < 0 || vt >= edge;
        if outside && (!self.wrap || self.fmt == TexFormat::Argb1555Border) {
            return self.border;
        }
        let ut = (ut & (edge - 1)) as u32;
        let vt = (vt & (edge - 1)) as u32;

        let bpp = self.fmt.bytes_per_texel();
        let addr = self
            .base
            .wrapping_add(self.chain_offs[edge_log2 as usize])
            .wrapping_add(((vt << edge_log2) + ut) * bpp);

        let raw = match self.fmt {
            TexFormat::Argb8888 => vram.read32(addr),
            TexFormat::Argb4444 => argb4444_32(vram.read16(addr)),
            TexFormat::Argb1555 | TexFormat::Argb1555Border => argb1555_32(vram.read16(addr)),
        };
        Color::from_raw(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup(cmd: Cmd3d, tex_base: u32, border: u32) -> TriSetup {
        TriSetup {
            cmd: cmd.full(),
            tex_base,
            border_color: border,
            ..Default::default()
        }
    }

    fn cmd(fmt: u32, size_log2: u32) -> Cmd3d {
        let mut c = Cmd3d(0);
        c.set_cmd(CMD3D_TRIANGLE);
        c.set_tex_fmt(fmt);
        c.set_tex_size(size_log2);
        c
    }

    #[test]
    fn chain_offsets_accumulate_from_smallest() {
        let tri = setup(cmd(0, 3), 0, 0);
        let s = TexSampler::new(&tri, ChipGen::VirgeDx);
        // ARGB8888: 1x1 at 0, 2x2 after 4 bytes, 4x4 after 4+16, ...
        assert_eq!(s.chain_offs[0], 0);
        assert_eq!(s.chain_offs[1], 4);
        assert_eq!(s.chain_offs[2], 4 + 16);
        assert_eq!(s.chain_offs[3], 4 + 16 + 64);
    }

    #[test]
    fn nearest_fetch_addresses_base_level() {
        let mut buf = vec![0u8; 4096];
        let view = VramView::new(buf.as_mut_ptr(), buf.len());
        let tri = setup(cmd(0, 1), 0, 0);
        let s = TexSampler::new(&tri, ChipGen::VirgeDx);
        // 2x2 level lives after the 1x1 level (4 bytes in).
        view.write32(4 + (1 * 2 + 1) * 4, 0xFF11_2233);
        let c = s.sample(&view, 1 << 20, 1 << 20, 0, 0);
        assert_eq!(c.to_raw(), 0xFF11_2233);
    }

    #[test]
    fn wrap_disabled_extreme_coords_return_border() {
        let mut buf = vec![0u8; 4096];
        let view = VramView::new(buf.as_mut_ptr(), buf.len());
        let mut c = cmd(2, 4);
        c.set_wrap_en(false);
        let tri = setup(c, 0, 0xDEAD_BEEF);
        let s = TexSampler::new(&tri, ChipGen::VirgeDx);
        // All high bits of U and V set: far outside [0, 16).
        let c = s.sample(&view, -1, -1, 0, 0);
        assert_eq!(c.to_raw(), 0xDEAD_BEEF);
        let c = s.sample(&view, i32::MAX, i32::MAX, 0, 0);
        assert_eq!(c.to_raw(), 0xDEAD_BEEF);
        // Bilinear blends four border taps back to the border color.
        let mut cb = cmd(2, 4);
        cb.set_wrap_en(false);
        cb.set_filter(2);
        let tri = setup(cb, 0, 0xDEAD_BEEF);
        let sb = TexSampler::new(&tri, ChipGen::VirgeDx);
        let got = sb.sample(&view, i32::MIN / 2, i32::MIN / 2, 0, 0);
        assert_eq!(got.to_raw(), 0xDEAD_BEEF);
    }

    #[test]
    fn border_format_ignores_wrap_enable() {
        let mut buf = vec![0u8; 4096];
        let view = VramView::new(buf.as_mut_ptr(), buf.len());
        let mut c = cmd(3, 2);
        c.set_wrap_en(true);
        let tri = setup(c, 0, 0x1234_5678);
        let s = TexSampler::new(&tri, ChipGen::VirgeDx);
        let c = s.sample(&view, 5 << 20, 0, 0, 0);
        assert_eq!(c.to_raw(), 0x1234_5678);
    }

    #[test]
    fn lod_bias_clamps_at_zero() {
        let mut c = cmd(0, 4);
        c.set_filter(1); // mip nearest
        c.set_mip_bias(7);
        let tri = setup(c, 0, 0);
        let s = TexSampler::new(&tri, ChipGen::VirgeDx);
        // d selects level 2, bias 7 would go negative: clamps to base level.
        let mut buf = vec![0u8; 8192];
        let view = VramView::new(buf.as_mut_ptr(), buf.len());
        // Texel (0,0) of the 16x16 base level.
        let base_off = s.chain_offs[4];
        view.write32(base_off, 0xFFAA_BBCC);
        let got = s.sample(&view, 0, 0, 0, 2 << 27);
        assert_eq!(got.to_raw(), 0xFFAA_BBCC);
    }
}
