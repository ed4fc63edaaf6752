// Triangle setup state and the 3D command-set word.

use bitfield::bitfield;

pub const CMD3D_NOP: u32 = 0b000;
pub const CMD3D_TRIANGLE: u32 = 0b101;

bitfield! {
    /// 3D command-set word (one per queued triangle).
    #[derive(Copy, Clone)]
    pub struct Cmd3d(u32);
    impl Debug;

    pub autoexec, set_autoexec: 0;
    pub clip_en, set_clip_en: 1;
    pub dest_24bpp, set_dest_24bpp: 2;
    pub dither_en, set_dither_en: 3;
    pub shade, set_shade: 5, 4;            // 0 flat, 1 gouraud, 2 unlit tex, 3 lit tex
    pub lit_blend, set_lit_blend: 7, 6;    // 0 decal, 1 modulate, 2 reflection
    pub wrap_en, set_wrap_en: 8;
    pub filter, set_filter: 11, 9;         // bit0 mip, bit1 bilinear, bit2 perspective
    pub tex_fmt, set_tex_fmt: 13, 12;
    pub tex_size, set_tex_size: 17, 14;    // log2 of the base level edge
    pub mip_bias, set_mip_bias: 21, 18;
    pub fog_en, set_fog_en: 22;
    pub alpha_mode, set_alpha_mode: 24, 23; // 0 none, 1 interpolated, 2 texel
    pub z_mode, set_z_mode: 27, 25;        // 0 never .. 7 always
    pub z_update_dis, set_z_update_dis: 28;
    pub cmd, set_cmd: 31, 29;
}

impl Cmd3d {
    #[inline]
    pub const fn full(&self) -> u32 {
        self.0
    }

    #[inline]
    pub fn set_full(&mut self, val: u32) {
        self.0 = val;
    }
}

/// Chip generation; selects the perspective-divide precision.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ChipGen {
    Virge325,
    VirgeDx,
    VirgeGx2,
}

#[repr(u32)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TexFormat {
    Argb8888 = 0,
    Argb4444 = 1,
    Argb1555 = 2,
    // 1555 texels, but out-of-range coordinates substitute the border color
    // even with wrap enabled.
    Argb1555Border = 3,
}

impl TexFormat {
    pub fn from_bits(bits: u32) -> Self {
        match bits & 3 {
            0 => TexFormat::Argb8888,
            1 => TexFormat::Argb4444,
            2 => TexFormat::Argb1555,
            _ => TexFormat::Argb1555Border,
        }
    }

    pub fn bytes_per_texel(self) -> u32 {
        match self {
            TexFormat::Argb8888 => 4,
            _ => 2,
        }
    }
}

/// Triangle register image, filled in by the setup-register writes and
/// consumed whole by the rasterizer.
///
/// Fixed-point formats: edge X interpolants are 12.20, colors and the fog
/// weight carry a 16-bit fraction, Z is 16.15 against a 16-bit Z buffer,
/// U/V are 11.20, reciprocal-W is 1.31 and the LOD term is 4.27.
#[derive(Copy, Clone, Debug, Default)]
pub struct TriSetup {
    pub cmd: u32,

    pub z_base: u32,
    pub dest_base: u32,
    pub tex_base: u32,
    pub border_color: u32,
    pub fog_color: u32,

    pub clip_l: i32,
    pub clip_r: i32,
    pub clip_t: i32,
    pub clip_b: i32,

    pub dest_stride: i32,
    pub z_stride: i32,

    // Color gradients: per-pixel (x), per-scanline along the long edge (y),
    // and the value at the apex.
    pub dbdx: i32,
    pub dbdy: i32,
    pub bs: i32,
    pub dgdx: i32,
    pub dgdy: i32,
    pub gs: i32,
    pub drdx: i32,
    pub drdy: i32,
    pub rs: i32,
    pub dadx: i32,
    pub dady: i32,
    pub a_s: i32,

    pub dzdx: i32,
    pub dzdy: i32,
    pub zs: i32,

    pub dwdx: i32,
    pub dwdy: i32,
    pub ws: i32,

    pub dudx: i32,
    pub dudy: i32,
    pub us: i32,
    pub dvdx: i32,
    pub dvdy: i32,
    pub vs: i32,

    pub dddx: i32,
    pub dddy: i32,
    pub ds: i32,

    // Edge walkers: the long edge 02 spans both halves, 01 bounds the top
    // half and 12 the bottom half.
    pub dxdy02: i32,
    pub dxdy01: i32,
    pub dxdy12: i32,
    pub xs02: i32,
    pub xs01: i32,
    pub xs12: i32,

    pub ys: i32,
    pub y01_count: u32,
    pub y12_count: u32,
}

impl TriSetup {
    #[inline]
    pub fn cmd_word(&self) -> Cmd3d {
        Cmd3d(self.cmd)
    }
}

/// BGRA byte order in memory, matching a little-endian ARGB word.
#[repr(C)]
#[derive(Copy, Clone, Default, Debug, PartialEq, Eq)]
pub struct Color {
    pub b: u8,
    pub g: u8,
    pub r: u8,
    pub a: u8,
}

impl Color {
    pub fn from_raw(raw: u32) -> Self {
        Color {
            b: (raw & 0xFF) as u8,
            g: ((raw >> 8) & 0xFF) as u8,
            r: ((raw >> 16) & 0xFF) as u8,
            a: ((raw >> 24) & 0xFF) as u8,
        }
    }

    pub fn to_raw(&self) -> u32 {
        self.b as u32 | ((self.g as u32) << 8) | ((self.r as u32) << 16) | ((self.a as u32) << 24)
    }
}

// Unpack texel/framebuffer words to 32-bit ARGB.
#[inline]
pub const fn argb1555_32(word: u16) -> u32 {
    let word = word as u32;
    let a = if (word & 0x8000) != 0 { 0xFF000000 } else { 0 };
    let r = ((word >> 10) & 0x1F) << 19;
    let g = ((word >> 5) & 0x1F) << 11;
    let b = (word & 0x1F) << 3;
    a | r | g | b
}

#[inline]
pub const fn argb565_32(word: u16) -> u32 {
    let word = word as u32;
    let r = ((word >> 11) & 0x1F) << 19;
    let g = ((word >> 5) & 0x3F) << 10;
    let b = (word & 0x1F) << 3;
    0xFF000000 | r | g | b
}

#[inline]
pub const fn argb4444_32(word: u16) -> u32 {
    let word = word as u32;
    let a = ((word >> 12) & 0xF) << 28;
    let r = ((word >> 8) & 0xF) << 20;
    let g = ((word >> 4) & 0xF) << 12;
    let b = (word & 0xF) << 4;
    a | r | g | b
}

#[inline]
pub const fn pack_565(r: u8, g: u8, b: u8) -> u16 {
    (((r as u16) >> 3) << 11) | (((g as u16) >> 2) << 5) | ((b as u16) >> 3)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cmd3d_field_roundtrip() {
        let mut cmd = Cmd3d(0);
        cmd.set_cmd(CMD3D_TRIANGLE);
        cmd.set_shade(3);
        cmd.set_z_mode(4);
        cmd.set_tex_size(9);
        cmd.set_mip_bias(0xF);
        assert_eq!(cmd.cmd(), CMD3D_TRIANGLE);
        assert_eq!(cmd.shade(), 3);
        assert_eq!(cmd.z_mode(), 4);
        assert_eq!(cmd.tex_size(), 9);
        assert_eq!(cmd.mip_bias(), 0xF);
        assert!(!cmd.autoexec());
    }

    #[test]
    fn unpack_1555_extremes() {
        assert_eq!(argb1555_32(0x8000), 0xFF000000);
        assert_eq!(argb1555_32(0x7FFF), 0x00F8F8F8);
    }

    #[test]
    fn pack_565_roundtrip_msbs() {
        let p = pack_565(0xFF, 0xFF, 0xFF);
        assert_eq!(p, 0xFFFF);
        assert_eq!(argb565_32(p) & 0x00F8FCF8, 0x00F8FCF8);
    }
}
