// Triangle scan conversion and the per-pixel pipeline.
//
// A triangle arrives as two halves sharing the long edge 02: the top half is
// bounded by edge 01, the bottom half by edge 12. Each half walks scanlines
// downward, recomputing the left/right X bounds from the 12.20 edge
// accumulators, then runs the pixel pipeline across the half-open span.

use crate::tex::{to_u8_256, TexSampler};
use crate::types::*;
use crate::vram::VramView;

const BAYER4: [[u32; 4]; 4] = [
    [0, 8, 2, 10],
    [12, 4, 14, 6],
    [3, 11, 1, 9],
    [15, 7, 13, 5],
];

#[inline(always)]
fn clamp8(v: i32) -> u8 {
    (v >> 16).clamp(0, 255) as u8
}

#[inline(always)]
fn depth_passes(mode: u32, new: u16, old: u16) -> bool {
    match mode {
        0 => false,
        1 => new < old,
        2 => new == old,
        3 => new <= old,
        4 => new > old,
        5 => new != old,
        6 => new >= old,
        7 => true,
        _ => false,
    }
}

/// Gradient accumulators for one scanline start (the value at the long-edge
/// column), stepped by the *dY deltas between scanlines.
#[derive(Copy, Clone)]
struct Channels {
    b: i32,
    g: i32,
    r: i32,
    a: i32,
    z: i32,
    w: i32,
    u: i32,
    v: i32,
    d: i32,
}

impl Channels {
    fn start(tri: &TriSetup) -> Self {
        Channels {
            b: tri.bs,
            g: tri.gs,
            r: tri.rs,
            a: tri.a_s,
            z: tri.zs,
            w: tri.ws,
            u: tri.us,
            v: tri.vs,
            d: tri.ds,
        }
    }

    fn step_y(&mut self, tri: &TriSetup) {
        self.b = self.b.wrapping_add(tri.dbdy);
        self.g = self.g.wrapping_add(tri.dgdy);
        self.r = self.r.wrapping_add(tri.drdy);
        self.a = self.a.wrapping_add(tri.dady);
        self.z = self.z.wrapping_add(tri.dzdy);
        self.w = self.w.wrapping_add(tri.dwdy);
        self.u = self.u.wrapping_add(tri.dudy);
        self.v = self.v.wrapping_add(tri.dvdy);
        self.d = self.d.wrapping_add(tri.dddy);
    }

    #[inline(always)]
    fn at(&self, tri: &TriSetup, dx: i32) -> Channels {
        Channels {
            b: self.b.wrapping_add(tri.dbdx.wrapping_mul(dx)),
            g: self.g.wrapping_add(tri.dgdx.wrapping_mul(dx)),
            r: self.r.wrapping_add(tri.drdx.wrapping_mul(dx)),
            a: self.a.wrapping_add(tri.dadx.wrapping_mul(dx)),
            z: self.z.wrapping_add(tri.dzdx.wrapping_mul(dx)),
            w: self.w.wrapping_add(tri.dwdx.wrapping_mul(dx)),
            u: self.u.wrapping_add(tri.dudx.wrapping_mul(dx)),
            v: self.v.wrapping_add(tri.dvdx.wrapping_mul(dx)),
            d: self.d.wrapping_add(tri.dddx.wrapping_mul(dx)),
        }
    }
}

struct Raster<'a> {
    vram: &'a VramView,
    tri: &'a TriSetup,
    cmd: Cmd3d,
    sampler: Option<TexSampler>,
    written: u32,
}

impl<'a> Raster<'a> {
    fn scanline(&mut self, y: i32, x02: i32, xo: i32, ch: &Channels) {
        let tri = self.tri;
        let cmd = self.cmd;

        if cmd.clip_en() && (y < tri.clip_t || y > tri.clip_b) {
            return;
        }

        let xa = x02 >> 20;
        let xb = xo >> 20;
        let (mut lx, mut rx) = if xa <= xb { (xa, xb) } else { (xb, xa) };
        if cmd.clip_en() {
            lx = lx.max(tri.clip_l);
            rx = rx.min(tri.clip_r + 1);
        }

        let x02_int = x02 >> 20;
        for x in lx..rx {
            let p = ch.at(tri, x - x02_int);
            self.pixel(x, y, &p);
        }
    }

    fn pixel(&mut self, x: i32, y: i32, p: &Channels) {
        let tri = self.tri;
        let cmd = self.cmd;

        let z_mode = cmd.z_mode();
        let z_new = (p.z >> 15).clamp(0, 0xFFFF) as u16;
        if z_mode != 7 || !cmd.z_update_dis() {
            let z_addr = tri
                .z_base
                .wrapping_add((y.wrapping_mul(tri.z_stride)) as u32)
                .wrapping_add((x as u32).wrapping_mul(2));
            let z_old = self.vram.read16(z_addr);
            if !depth_passes(z_mode, z_new, z_old) {
                return;
            }
            if !cmd.z_update_dis() {
                self.vram.write16(z_addr, z_new);
            }
        }

        let base = Color {
            b: clamp8(p.b),
            g: clamp8(p.g),
            r: clamp8(p.r),
            a: clamp8(p.a),
        };

        let mut col = match cmd.shade() {
            0 | 1 => base,
            _ => {
                let tex = match &self.sampler {
                    Some(s) => s.sample(self.vram, p.u, p.v, p.w, p.d),
                    None => Color::from_raw(0xFFFFFFFF),
                };
                if cmd.shade() == 2 {
                    tex
                } else {
                    match cmd.lit_blend() {
                        0 => tex,
                        1 => Color {
                            b: (tex.b as u32 * to_u8_256(base.b) / 256) as u8,
                            g: (tex.g as u32 * to_u8_256(base.g) / 256) as u8,
                            r: (tex.r as u32 * to_u8_256(base.r) / 256) as u8,
                            a: tex.a,
                        },
                        _ => Color {
                            b: tex.b.saturating_add(base.b),
                            g: tex.g.saturating_add(base.g),
                            r: tex.r.saturating_add(base.r),
                            a: base.a,
                        },
                    }
                }
            }
        };

        if cmd.fog_en() {
            let fog = Color::from_raw(tri.fog_color);
            let fa = to_u8_256(base.a);
            let fi = 256 - fa;
            col.b = ((col.b as u32 * fi + fog.b as u32 * fa) >> 8) as u8;
            col.g = ((col.g as u32 * fi + fog.g as u32 * fa) >> 8) as u8;
            col.r = ((col.r as u32 * fi + fog.r as u32 * fa) >> 8) as u8;
        }

        let bpp: u32 = if cmd.dest_24bpp() { 3 } else { 2 };
        let addr = tri
            .dest_base
            .wrapping_add((y.wrapping_mul(tri.dest_stride)) as u32)
            .wrapping_add((x as u32).wrapping_mul(bpp));

        let alpha_mode = cmd.alpha_mode();
        if alpha_mode != 0 {
            let sa = to_u8_256(if alpha_mode == 1 { base.a } else { col.a });
            let da = 256 - sa;
            let dst = if cmd.dest_24bpp() {
                Color::from_raw(self.vram.read24(addr) | 0xFF00_0000)
            } else {
                Color::from_raw(argb565_32(self.vram.read16(addr)))
            };
            col.b = ((col.b as u32 * sa + dst.b as u32 * da) >> 8) as u8;
            col.g = ((col.g as u32 * sa + dst.g as u32 * da) >> 8) as u8;
            col.r = ((col.r as u32 * sa + dst.r as u32 * da) >> 8) as u8;
        }

        if cmd.dest_24bpp() {
            self.vram.write24(addr, col.to_raw());
        } else {
            let (mut r, mut g, mut b) = (col.r as u32, col.g as u32, col.b as u32);
            if cmd.dither_en() {
                let d = BAYER4[(y & 3) as usize][(x & 3) as usize];
                r = (r + (d >> 1)).min(255);
                g = (g + (d >> 2)).min(255);
                b = (b + (d >> 1)).min(255);
            }
            self.vram.write16(addr, pack_565(r as u8, g as u8, b as u8));
        }
        self.written += 1;
    }
}

/// Rasterize one queued triangle. Returns the number of pixels written.
pub fn render_triangle(vram: &VramView, chip: ChipGen, tri: &TriSetup) -> u32 {
    let cmd = tri.cmd_word();
    debug_assert_eq!(cmd.cmd(), CMD3D_TRIANGLE);

    let sampler = if cmd.shade() >= 2 {
        Some(TexSampler::new(tri, chip))
    } else {
        None
    };

    let mut raster = Raster {
        vram,
        tri,
        cmd,
        sampler,
        written: 0,
    };

    let mut ch = Channels::start(tri);
    let mut x02 = tri.xs02;
    let mut y = tri.ys;

    let mut xo = tri.xs01;
    for _ in 0..tri.y01_count {
        raster.scanline(y, x02, xo, &ch);
        x02 = x02.wrapping_add(tri.dxdy02);
        xo = xo.wrapping_add(tri.dxdy01);
        ch.step_y(tri);
        y += 1;
    }

    let mut xo = tri.xs12;
    for _ in 0..tri.y12_count {
        raster.scanline(y, x02, xo, &ch);
        x02 = x02.wrapping_add(tri.dxdy02);
        xo = xo.wrapping_add(tri.dxdy12);
        ch.step_y(tri);
        y += 1;
    }

    raster.written
}

#[cfg(test)]
mod tests {
    use super::*;

    const VRAM_LEN: usize = 1 << 20;

    fn flat_cmd() -> Cmd3d {
        let mut c = Cmd3d(0);
        c.set_cmd(CMD3D_TRIANGLE);
        c.set_z_mode(7); // always
        c.set_z_update_dis(true);
        c
    }

    fn right_triangle(cmd: Cmd3d) -> TriSetup {
        // Vertical long edge at x=10, right edge opening 1px per scanline,
        // five scanlines: spans of 0,1,2,3,4 pixels.
        TriSetup {
            cmd: cmd.full(),
            dest_base: 0,
            dest_stride: 2048,
            xs02: 10 << 20,
            xs01: 10 << 20,
            dxdy02: 0,
            dxdy01: 1 << 20,
            ys: 5,
            y01_count: 5,
            y12_count: 0,
            rs: 0xFF << 16,
            ..Default::default()
        }
    }

    #[test]
    fn flat_right_triangle_covers_expected_area() {
        let mut buf = vec![0u8; VRAM_LEN];
        let view = VramView::new(buf.as_mut_ptr(), buf.len());
        let tri = right_triangle(flat_cmd());
        let written = render_triangle(&view, ChipGen::VirgeDx, &tri);
        assert_eq!(written, 0 + 1 + 2 + 3 + 4);
        // Row y=6 has exactly one pixel at x=10, red in 565.
        assert_eq!(view.read16(6 * 2048 + 10 * 2), 0xF800);
        assert_eq!(view.read16(6 * 2048 + 11 * 2), 0);
    }

    #[test]
    fn z_mode_never_writes_nothing() {
        let mut buf = vec![0u8; VRAM_LEN];
        let view = VramView::new(buf.as_mut_ptr(), buf.len());
        let mut cmd = flat_cmd();
        cmd.set_z_mode(0);
        cmd.set_z_update_dis(false);
        let tri = right_triangle(cmd);
        assert_eq!(render_triangle(&view, ChipGen::VirgeDx, &tri), 0);
    }

    #[test]
    fn z_less_keeps_front_pixels() {
        let mut buf = vec![0u8; VRAM_LEN];
        let view = VramView::new(buf.as_mut_ptr(), buf.len());
        let mut cmd = flat_cmd();
        cmd.set_z_mode(1); // less
        cmd.set_z_update_dis(false);
        let mut tri = right_triangle(cmd);
        tri.z_base = 0x40000;
        tri.z_stride = 2048;
        tri.zs = 5 << 15; // z = 5 everywhere
        // Prime the z buffer: row y=6 column 10 already closer (z=3).
        view.write16(0x40000 + 6 * 2048 + 10 * 2, 3);
        // Everything else farther.
        for y in 5..10 {
            for x in 10..15 {
                if y == 6 && x == 10 {
                    continue;
                }
                view.write16(0x40000 + y * 2048 + x * 2, 0xFFFF);
            }
        }
        let written = render_triangle(&view, ChipGen::VirgeDx, &tri);
        assert_eq!(written, 10 - 1);
        // The occluded pixel kept its depth.
        assert_eq!(view.read16(0x40000 + 6 * 2048 + 10 * 2), 3);
        // A passing pixel updated its depth.
        assert_eq!(view.read16(0x40000 + 7 * 2048 + 10 * 2), 5);
    }

    #[test]
    fn clip_box_suppresses_rows_and_columns() {
        let mut buf = vec![0u8; VRAM_LEN];
        let view = VramView::new(buf.as_mut_ptr(), buf.len());
        let mut cmd = flat_cmd();
        cmd.set_clip_en(true);
        let mut tri = right_triangle(cmd);
        tri.clip_t = 7;
        tri.clip_b = 8;
        tri.clip_l = 0;
        tri.clip_r = 11; // inclusive
        let written = render_triangle(&view, ChipGen::VirgeDx, &tri);
        // y=7 span 10..12, y=8 span 10..12 (clamped from 10..13).
        assert_eq!(written, 2 + 2);
    }

    #[test]
    fn gouraud_ramp_interpolates_along_scanline() {
        let mut buf = vec![0u8; VRAM_LEN];
        let view = VramView::new(buf.as_mut_ptr(), buf.len());
        let mut cmd = flat_cmd();
        cmd.set_shade(1);
        let mut tri = right_triangle(cmd);
        tri.y01_count = 5;
        tri.rs = 0;
        tri.drdx = 64 << 16; // +64 red per pixel
        let _ = render_triangle(&view, ChipGen::VirgeDx, &tri);
        // y=9 spans x=10..14 with red 0,64,128,192.
        assert_eq!(view.read16(9 * 2048 + 10 * 2), pack_565(0, 0, 0));
        assert_eq!(view.read16(9 * 2048 + 12 * 2), pack_565(128, 0, 0));
        assert_eq!(view.read16(9 * 2048 + 13 * 2), pack_565(192, 0, 0));
    }

    #[test]
    fn dest_24bpp_writes_three_bytes() {
        let mut buf = vec![0u8; VRAM_LEN];
        let view = VramView::new(buf.as_mut_ptr(), buf.len());
        let mut cmd = flat_cmd();
        cmd.set_dest_24bpp(true);
        let mut tri = right_triangle(cmd);
        tri.rs = 0xAB << 16;
        tri.gs = 0xCD << 16;
        tri.bs = 0xEF << 16;
        let _ = render_triangle(&view, ChipGen::VirgeDx, &tri);
        let at = 6 * 2048 + 10 * 3;
        assert_eq!(view.read24(at), 0x00AB_CDEF);
    }
}
