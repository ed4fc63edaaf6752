// 3D setup-register window: routes FIFO dwords into a `TriSetup` image.
//
// The triangle launches on the Y12 count write, which is always the last
// register of a setup burst; everything before it only latches state.

use refrast::TriSetup;

pub const TRI_Z_BASE: u32 = 0xB4D4;
pub const TRI_DEST_BASE: u32 = 0xB4D8;
pub const TRI_CLIP_LR: u32 = 0xB4DC;
pub const TRI_CLIP_TB: u32 = 0xB4E0;
pub const TRI_DEST_STRIDE: u32 = 0xB4E4;
pub const TRI_Z_STRIDE: u32 = 0xB4E8;
pub const TRI_TEX_BASE: u32 = 0xB4EC;
pub const TRI_BORDER_COLOR: u32 = 0xB4F0;
pub const TRI_FOG_COLOR: u32 = 0xB4F4;
pub const TRI_CMD: u32 = 0xB500;

pub const TRI_DBDX: u32 = 0xB504;
pub const TRI_DGDX: u32 = 0xB508;
pub const TRI_DRDX: u32 = 0xB50C;
pub const TRI_DADX: u32 = 0xB510;
pub const TRI_DBDY: u32 = 0xB514;
pub const TRI_DGDY: u32 = 0xB518;
pub const TRI_DRDY: u32 = 0xB51C;
pub const TRI_DADY: u32 = 0xB520;
pub const TRI_BS: u32 = 0xB524;
pub const TRI_GS: u32 = 0xB528;
pub const TRI_RS: u32 = 0xB52C;
pub const TRI_AS: u32 = 0xB530;
pub const TRI_DZDX: u32 = 0xB534;
pub const TRI_DZDY: u32 = 0xB538;
pub const TRI_ZS: u32 = 0xB53C;
pub const TRI_DWDX: u32 = 0xB540;
pub const TRI_DWDY: u32 = 0xB544;
pub const TRI_WS: u32 = 0xB548;
pub const TRI_DUDX: u32 = 0xB54C;
pub const TRI_DUDY: u32 = 0xB550;
pub const TRI_US: u32 = 0xB554;
pub const TRI_DVDX: u32 = 0xB558;
pub const TRI_DVDY: u32 = 0xB55C;
pub const TRI_VS: u32 = 0xB560;
pub const TRI_DDDX: u32 = 0xB564;
pub const TRI_DDDY: u32 = 0xB568;
pub const TRI_DS: u32 = 0xB56C;
pub const TRI_DXDY02: u32 = 0xB570;
pub const TRI_DXDY01: u32 = 0xB574;
pub const TRI_DXDY12: u32 = 0xB578;
pub const TRI_XS02: u32 = 0xB57C;
pub const TRI_XS01: u32 = 0xB580;
pub const TRI_XS12: u32 = 0xB584;
pub const TRI_YS: u32 = 0xB588;
pub const TRI_Y01_COUNT: u32 = 0xB58C;
pub const TRI_Y12_COUNT: u32 = 0xB590;

pub const TRI_TRIGGER: u32 = TRI_Y12_COUNT;

/// Latch one setup register. Returns true when the write is the launch
/// register and the accumulated image should be executed.
pub fn apply_tri_reg(tri: &mut TriSetup, off: u32, value: u32) -> bool {
    match off {
        TRI_Z_BASE => tri.z_base = value,
        TRI_DEST_BASE => tri.dest_base = value,
        TRI_CLIP_LR => {
            tri.clip_l = ((value >> 16) & 0x7FF) as i32;
            tri.clip_r = (value & 0x7FF) as i32;
        }
        TRI_CLIP_TB => {
            tri.clip_t = ((value >> 16) & 0x7FF) as i32;
            tri.clip_b = (value & 0x7FF) as i32;
        }
        TRI_DEST_STRIDE => tri.dest_stride = value as i16 as i32,
        TRI_Z_STRIDE => tri.z_stride = value as i16 as i32,
        TRI_TEX_BASE => tri.tex_base = value,
        TRI_BORDER_COLOR => tri.border_color = value,
        TRI_FOG_COLOR => tri.fog_color = value,
        TRI_CMD => tri.cmd = value,
        TRI_DBDX => tri.dbdx = value as i32,
        TRI_DGDX => tri.dgdx = value as i32,
        TRI_DRDX => tri.drdx = value as i32,
        TRI_DADX => tri.dadx = value as i32,
        TRI_DBDY => tri.dbdy = value as i32,
        TRI_DGDY => tri.dgdy = value as i32,
        TRI_DRDY => tri.drdy = value as i32,
        TRI_DADY => tri.dady = value as i32,
        TRI_BS => tri.bs = value as i32,
        TRI_GS => tri.gs = value as i32,
        TRI_RS => tri.rs = value as i32,
        TRI_AS => tri.a_s = value as i32,
        TRI_DZDX => tri.dzdx = value as i32,
        TRI_DZDY => tri.dzdy = value as i32,
        TRI_ZS => tri.zs = value as i32,
        TRI_DWDX => tri.dwdx = value as i32,
        TRI_DWDY => tri.dwdy = value as i32,
        TRI_WS => tri.ws = value as i32,
        TRI_DUDX => tri.dudx = value as i32,
        TRI_DUDY => tri.dudy = value as i32,
        TRI_US => tri.us = value as i32,
        TRI_DVDX => tri.dvdx = value as i32,
        TRI_DVDY => tri.dvdy = value as i32,
        TRI_VS => tri.vs = value as i32,
        TRI_DDDX => tri.dddx = value as i32,
        TRI_DDDY => tri.dddy = value as i32,
        TRI_DS => tri.ds = value as i32,
        TRI_DXDY02 => tri.dxdy02 = value as i32,
        TRI_DXDY01 => tri.dxdy01 = value as i32,
        TRI_DXDY12 => tri.dxdy12 = value as i32,
        TRI_XS02 => tri.xs02 = value as i32,
        TRI_XS01 => tri.xs01 = value as i32,
        TRI_XS12 => tri.xs12 = value as i32,
        TRI_YS => tri.ys = value as i16 as i32,
        TRI_Y01_COUNT => tri.y01_count = value & 0xFFFF,
        TRI_Y12_COUNT => {
            tri.y12_count = value & 0xFFFF;
            return true;
        }
        _ => {}
    }
    false
}
