//S3TC block decoding (DXT1, DXT3, DXT5)
//
//every block covers 4x4 texels; texels of a partial edge block that fall
//outside the image are dropped

/// Bytes per 4x4 block for the DXT1 layout.
pub const DXT1_BLOCK_SIZE: usize = 8;
/// Bytes per 4x4 block for the DXT3/DXT5 layouts.
pub const DXT5_BLOCK_SIZE: usize = 16;

/// Size of a whole image of `block_size`-byte blocks.
pub fn compressed_size(width: usize, height: usize, block_size: usize) -> usize {
    width.div_ceil(4).max(1) * height.div_ceil(4).max(1) * block_size
}

pub fn decode_dxt1(data: &[u8], width: usize, height: usize) -> Vec<u8> {
    decode_blocks(data, width, height, DXT1_BLOCK_SIZE, |block, texels| {
        let colors = expand_colors(&block[0..4], true);
        let lookup = u32::from_le_bytes([block[4], block[5], block[6], block[7]]);
        for (i, texel) in texels.iter_mut().enumerate() {
            *texel = colors[((lookup >> (i * 2)) & 0x3) as usize];
        }
    })
}

pub fn decode_dxt3(data: &[u8], width: usize, height: usize) -> Vec<u8> {
    decode_blocks(data, width, height, DXT5_BLOCK_SIZE, |block, texels| {
        // explicit 4-bit alpha, low nibble first
        let alpha = &block[0..8];
        let colors = expand_colors(&block[8..12], false);
        let lookup = u32::from_le_bytes([block[12], block[13], block[14], block[15]]);
        for (i, texel) in texels.iter_mut().enumerate() {
            let mut color = colors[((lookup >> (i * 2)) & 0x3) as usize];
            let nibble = (alpha[i / 2] >> ((i % 2) * 4)) & 0x0F;
            color[3] = nibble * 17;
            *texel = color;
        }
    })
}

pub fn decode_dxt5(data: &[u8], width: usize, height: usize) -> Vec<u8> {
    decode_blocks(data, width, height, DXT5_BLOCK_SIZE, |block, texels| {
        let alpha_palette = expand_alpha(block[0], block[1]);
        // 16 3-bit indices packed into 48 bits
        let alpha_bits = u64::from_le_bytes([
            block[2], block[3], block[4], block[5], block[6], block[7], 0, 0,
        ]);
        let colors = expand_colors(&block[8..12], false);
        let lookup = u32::from_le_bytes([block[12], block[13], block[14], block[15]]);
        for (i, texel) in texels.iter_mut().enumerate() {
            let mut color = colors[((lookup >> (i * 2)) & 0x3) as usize];
            color[3] = alpha_palette[((alpha_bits >> (i * 3)) & 0x7) as usize];
            *texel = color;
        }
    })
}

fn decode_blocks<F>(data: &[u8], width: usize, height: usize, block_size: usize, decode: F) -> Vec<u8>
where
    F: Fn(&[u8], &mut [[u8; 4]; 16]),
{
    let mut rgba = vec![0u8; width * height * 4];
    let block_width = width.div_ceil(4);
    let block_height = height.div_ceil(4);
    let mut texels = [[0u8; 4]; 16];

    for by in 0..block_height {
        for bx in 0..block_width {
            let start = (by * block_width + bx) * block_size;
            let Some(block) = data.get(start..start + block_size) else {
                continue;
            };
            decode(block, &mut texels);

            for y in 0..4 {
                for x in 0..4 {
                    let px = bx * 4 + x;
                    let py = by * 4 + y;
                    if px >= width || py >= height {
                        continue;
                    }
                    let dest = (py * width + px) * 4;
                    rgba[dest..dest + 4].copy_from_slice(&texels[y * 4 + x]);
                }
            }
        }
    }

    rgba
}

fn unpack_565(color: u16) -> [u8; 3] {
    let r = ((color >> 11) & 0x1F) as u8;
    let g = ((color >> 5) & 0x3F) as u8;
    let b = (color & 0x1F) as u8;
    // replicate high bits into the low ones
    [(r << 3) | (r >> 2), (g << 2) | (g >> 4), (b << 3) | (b >> 2)]
}

/// Four-entry color table of a block. With `allow_punch_through` (DXT1 only)
/// a block whose first endpoint is not greater than the second switches to
/// three colors plus transparent black.
fn expand_colors(endpoints: &[u8], allow_punch_through: bool) -> [[u8; 4]; 4] {
    let c0 = u16::from_le_bytes([endpoints[0], endpoints[1]]);
    let c1 = u16::from_le_bytes([endpoints[2], endpoints[3]]);
    let a = unpack_565(c0);
    let b = unpack_565(c1);

    let blend = |wa: u16, wb: u16, div: u16| -> [u8; 4] {
        let mix = |i: usize| ((wa * a[i] as u16 + wb * b[i] as u16) / div) as u8;
        [mix(0), mix(1), mix(2), 255]
    };

    let mut colors = [[0u8; 4]; 4];
    colors[0] = [a[0], a[1], a[2], 255];
    colors[1] = [b[0], b[1], b[2], 255];

    if c0 > c1 || !allow_punch_through {
        colors[2] = blend(2, 1, 3);
        colors[3] = blend(1, 2, 3);
    } else {
        colors[2] = blend(1, 1, 2);
        colors[3] = [0, 0, 0, 0];
    }

    colors
}

/// Eight-entry alpha gradient of a DXT5 block.
fn expand_alpha(a0: u8, a1: u8) -> [u8; 8] {
    let mut palette = [0u8; 8];
    palette[0] = a0;
    palette[1] = a1;

    if a0 > a1 {
        for (i, slot) in palette.iter_mut().enumerate().skip(2) {
            *slot = (((8 - i) as u16 * a0 as u16 + (i - 1) as u16 * a1 as u16) / 7) as u8;
        }
    } else {
        for (i, slot) in palette.iter_mut().enumerate().take(6).skip(2) {
            *slot = (((6 - i) as u16 * a0 as u16 + (i - 1) as u16 * a1 as u16) / 5) as u8;
        }
        palette[6] = 0;
        palette[7] = 255;
    }

    palette
}
