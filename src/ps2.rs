//PS2 indexed texture decoding
//
//8-bit textures are stored in the GS PSMT8 swizzled order and read through
//a CSM1 ordered CLUT; 4-bit textures are linear, low nibble first. PS2
//alpha runs 0..=0x80

/// Storage offset of texel (`x`, `y`) in a PSMT8 swizzled image `width` texels wide.
pub fn swizzled_offset(x: usize, y: usize, width: usize) -> usize {
    let block_location = (y & !0xF) * width + (x & !0xF) * 2;
    let swap_selector = (((y + 2) >> 2) & 0x1) * 4;
    let pos_y = (((y & !3) >> 1) + (y & 1)) & 0x7;
    let column_location = pos_y * width * 2 + ((x + swap_selector) & 0x7) * 4;
    let byte_num = ((y >> 1) & 1) + ((x >> 2) & 2);
    block_location + column_location + byte_num
}

/// Whether an image of this size is stored swizzled; small mips are linear.
pub fn is_swizzled(width: usize, height: usize) -> bool {
    width % 16 == 0 && height % 4 == 0
}

/// CLUT slot holding palette entry `index` (CSM1 swaps bits 3 and 4).
pub fn clut_slot(index: usize) -> usize {
    (index & !0x18) | ((index & 0x08) << 1) | ((index & 0x10) >> 1)
}

/// Expand a GS alpha (0x80 = opaque) to 0..=255.
pub fn expand_alpha(alpha: u8) -> u8 {
    (alpha as u16 * 2).min(255) as u8
}

/// Reorder a CSM1 CLUT into plain palette order.
pub fn unswizzle_clut(clut: &[[u8; 4]]) -> Vec<[u8; 4]> {
    (0..clut.len())
        .map(|i| clut.get(clut_slot(i)).copied().unwrap_or(clut[i]))
        .collect()
}

/// Linear palette indices of an 8-bit image.
pub fn unswizzle8(data: &[u8], width: usize, height: usize) -> Vec<u8> {
    if !is_swizzled(width, height) {
        let mut linear = data.to_vec();
        linear.resize(width * height, 0);
        return linear;
    }

    let mut indices = vec![0u8; width * height];
    for y in 0..height {
        for x in 0..width {
            indices[y * width + x] = data
                .get(swizzled_offset(x, y, width))
                .copied()
                .unwrap_or(0);
        }
    }
    indices
}

/// Decode a swizzled 8-bit image through a palette already in plain order.
pub fn decode_indexed8(data: &[u8], palette: &[[u8; 4]], width: usize, height: usize) -> Vec<u8> {
    let indices = unswizzle8(data, width, height);
    resolve(indices.into_iter(), palette, width * height)
}

/// Decode a linear 4-bit image (low nibble is the left texel).
pub fn decode_indexed4(data: &[u8], palette: &[[u8; 4]], width: usize, height: usize) -> Vec<u8> {
    let indices = data.iter().flat_map(|&b| [b & 0x0F, b >> 4]);
    resolve(indices, palette, width * height)
}

fn resolve(indices: impl Iterator<Item = u8>, palette: &[[u8; 4]], count: usize) -> Vec<u8> {
    let mut rgba = Vec::with_capacity(count * 4);
    for index in indices.take(count) {
        let color = palette.get(index as usize).copied().unwrap_or([0, 0, 0, 0]);
        rgba.extend_from_slice(&color);
    }
    rgba.resize(count * 4, 0);
    rgba
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_known_swizzle_offsets() {
        let expected = [
            ((0, 0), 0),
            ((1, 0), 4),
            ((4, 0), 16),
            ((8, 0), 2),
            ((0, 1), 32),
            ((0, 2), 17),
            ((0, 3), 49),
            ((15, 3), 47),
        ];
        for ((x, y), offset) in expected {
            assert_eq!(swizzled_offset(x, y, 16), offset, "texel ({x}, {y})");
        }
    }

    #[test]
    fn test_swizzle_is_a_permutation() {
        for (width, height) in [(16, 4), (16, 16), (32, 16), (64, 32), (16, 20)] {
            let offsets: HashSet<usize> = (0..height)
                .flat_map(|y| (0..width).map(move |x| swizzled_offset(x, y, width)))
                .collect();
            assert_eq!(offsets.len(), width * height);
            assert!(offsets.iter().all(|&o| o < width * height));
        }
    }

    #[test]
    fn test_unswizzle_restores_row_order() {
        let (width, height) = (16, 4);
        let mut stored = vec![0u8; width * height];
        for y in 0..height {
            for x in 0..width {
                stored[swizzled_offset(x, y, width)] = (y * width + x) as u8;
            }
        }
        let linear = unswizzle8(&stored, width, height);
        let expected: Vec<u8> = (0..(width * height) as u8).collect();
        assert_eq!(linear, expected);
    }

    #[test]
    fn test_small_images_are_linear() {
        assert!(!is_swizzled(8, 8));
        let data: Vec<u8> = (0..64).collect();
        assert_eq!(unswizzle8(&data, 8, 8), data);
    }

    #[test]
    fn test_clut_slot_swaps_bits_three_and_four() {
        assert_eq!(clut_slot(0), 0);
        assert_eq!(clut_slot(7), 7);
        assert_eq!(clut_slot(8), 16);
        assert_eq!(clut_slot(16), 8);
        assert_eq!(clut_slot(24), 24);
        assert_eq!(clut_slot(0x29), 0x31);
    }

    #[test]
    fn test_alpha_expansion() {
        assert_eq!(expand_alpha(0x80), 255);
        assert_eq!(expand_alpha(0x40), 128);
        assert_eq!(expand_alpha(0xFF), 255);
    }

    #[test]
    fn test_decode_indexed4() {
        let palette = [[1, 2, 3, 255], [9, 9, 9, 255]];
        let rgba = decode_indexed4(&[0x10, 0x01], &palette, 2, 2);
        assert_eq!(
            rgba,
            vec![1, 2, 3, 255, 9, 9, 9, 255, 9, 9, 9, 255, 1, 2, 3, 255]
        );
    }
}
