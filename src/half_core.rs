/// Converts an `f32` to IEEE-754 binary16 bits.
///
/// The fraction is truncated rather than rounded. Inputs with a zero exponent
/// keep their (shifted) fraction, values below the half normal range become
/// half denormals, and anything at or above 2^15 saturates to infinity with
/// the sign kept. NaN saturates to infinity as well.
pub fn float_to_half(value: f32) -> u16 {
    let f = value.to_bits();
    let sign = (f >> 31) & 0x0001;
    let exp = (f >> 23) & 0x00ff;
    let mut frac = f & 0x007f_ffff;

    let new_exp = if exp == 0 {
        0
    } else if exp < 113 {
        frac |= 0x0080_0000;
        // shifts of 32 and more flush to zero
        frac = frac.checked_shr(113 - exp).unwrap_or(0);
        if frac & 0x0100_0000 != 0 {
            frac = 0;
            1
        } else {
            0
        }
    } else if exp < 142 {
        exp - 112
    } else {
        frac = 0;
        31
    };

    ((sign << 15) | (new_exp << 10) | (frac >> 13)) as u16
}

/// Packs two floats as halves into one word: `x` in the low 16 bits, `y` in the high 16 bits.
pub fn pack_half_2x16(x: f32, y: f32) -> u32 {
    float_to_half(x) as u32 | ((float_to_half(y) as u32) << 16)
}
