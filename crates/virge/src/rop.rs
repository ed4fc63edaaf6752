// Ternary raster operations.
//
// A ROP3 code *is* its own truth table: bit ((p << 2) | (s << 1) | d) of the
// code gives the output for that pattern/source/destination combination. The
// evaluator ORs the minterm mask for every set code bit, which applies the
// table to all lanes of a word at once and is exact for all 256 codes.

/// Apply ROP3 `rop` to full words of pattern, source and destination data.
/// Callers mask the result to the destination depth.
#[inline]
pub fn rop3(rop: u8, pat: u32, src: u32, dst: u32) -> u32 {
    let mut out = 0u32;
    let mut idx = 0u8;
    while idx < 8 {
        if (rop >> idx) & 1 != 0 {
            let p = if idx & 4 != 0 { pat } else { !pat };
            let s = if idx & 2 != 0 { src } else { !src };
            let d = if idx & 1 != 0 { dst } else { !dst };
            out |= p & s & d;
        }
        idx += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::rop3;

    // Bit-serial reference: evaluate the truth table one bit lane at a time.
    fn rop3_ref(rop: u8, pat: u32, src: u32, dst: u32) -> u32 {
        let mut out = 0u32;
        for bit in 0..32 {
            let p = (pat >> bit) & 1;
            let s = (src >> bit) & 1;
            let d = (dst >> bit) & 1;
            let idx = (p << 2) | (s << 1) | d;
            out |= (((rop as u32) >> idx) & 1) << bit;
        }
        out
    }

    #[test]
    fn named_codes() {
        let p = 0xF0F0_F0F0;
        let s = 0xCCCC_CCCC;
        let d = 0xAAAA_AAAA;
        assert_eq!(rop3(0x00, p, s, d), 0); // BLACKNESS
        assert_eq!(rop3(0xFF, p, s, d), !0); // WHITENESS
        assert_eq!(rop3(0xCC, p, s, d), s); // SRCCOPY
        assert_eq!(rop3(0xF0, p, s, d), p); // PATCOPY
        assert_eq!(rop3(0x55, p, s, d), !d); // DSTINVERT
        assert_eq!(rop3(0x66, p, s, d), s ^ d); // SRCINVERT
        assert_eq!(rop3(0x88, p, s, d), s & d); // SRCAND
    }

    #[test]
    fn all_256_codes_match_truth_table() {
        let vectors = [
            (0xF0F0_F0F0u32, 0xCCCC_CCCCu32, 0xAAAA_AAAAu32),
            (0x1234_5678, 0x9ABC_DEF0, 0x0F1E_2D3C),
            (0, !0, 0x8000_0001),
        ];
        for rop in 0..=255u8 {
            for &(p, s, d) in &vectors {
                assert_eq!(rop3(rop, p, s, d), rop3_ref(rop, p, s, d), "rop {:02X}", rop);
            }
        }
    }
}
