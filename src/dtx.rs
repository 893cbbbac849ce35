//DTX texture reader
//
//supports the LithTech 1.0, 1.5 and 2.x PC containers plus the PS2
//container; only the base mip is decoded, the rest of the chain is skipped

use std::fs::{self, File};
use std::io::{BufReader, Read, Seek};
use std::path::{Path, PathBuf};

use crate::cursor::BinaryCursor;
use crate::diagnostics::Diagnostics;
use crate::error::{Error, Result};
use crate::{ps2, s3tc};

const COMMAND_STRING_LEN: usize = 128;

/// Container revision, stored as a negative version number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DtxVersion {
    Lt1,
    Lt15,
    Lt2,
    Ps2,
}

impl DtxVersion {
    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            -2 => Some(DtxVersion::Lt1),
            -3 => Some(DtxVersion::Lt15),
            -5 => Some(DtxVersion::Lt2),
            -6 => Some(DtxVersion::Ps2),
            _ => None,
        }
    }
}

// Pixel format tags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Bpp8Palette = 0,
    Bpp8 = 1,
    Bpp16 = 2,
    Bpp32 = 3,
    Dxt1 = 4,
    Dxt3 = 5,
    Dxt5 = 6,
    Bpp32Palette = 7,
    Ps2Indexed8 = 8,
    Ps2Indexed4 = 9,
}

impl PixelFormat {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(PixelFormat::Bpp8Palette),
            1 => Some(PixelFormat::Bpp8),
            2 => Some(PixelFormat::Bpp16),
            3 => Some(PixelFormat::Bpp32),
            4 => Some(PixelFormat::Dxt1),
            5 => Some(PixelFormat::Dxt3),
            6 => Some(PixelFormat::Dxt5),
            7 => Some(PixelFormat::Bpp32Palette),
            8 => Some(PixelFormat::Ps2Indexed8),
            9 => Some(PixelFormat::Ps2Indexed4),
            _ => None,
        }
    }

    /// Stored size of one mip level.
    pub fn level_size(self, width: usize, height: usize) -> usize {
        match self {
            PixelFormat::Bpp8Palette
            | PixelFormat::Bpp8
            | PixelFormat::Bpp32Palette
            | PixelFormat::Ps2Indexed8 => width * height,
            PixelFormat::Bpp16 => width * height * 2,
            PixelFormat::Bpp32 => width * height * 4,
            PixelFormat::Ps2Indexed4 => (width * height).div_ceil(2),
            PixelFormat::Dxt1 => s3tc::compressed_size(width, height, s3tc::DXT1_BLOCK_SIZE),
            PixelFormat::Dxt3 | PixelFormat::Dxt5 => {
                s3tc::compressed_size(width, height, s3tc::DXT5_BLOCK_SIZE)
            }
        }
    }
}

/// Decoded DTX texture. `pixels` is always `width * height * 4` RGBA bytes.
#[derive(Debug, Clone)]
pub struct Texture {
    pub resource_type: u32,
    pub version: DtxVersion,
    pub width: u32,
    pub height: u32,
    pub mipmap_count: u16,
    pub section_count: u16,
    pub flags: u32,
    pub user_flags: u32,
    pub format: PixelFormat,

    // Extra data (LT1.5 and later, texture group also on PS2)
    pub texture_group: u8,
    pub mipmaps_to_use: u8,
    pub mipmap_offset: u8,
    pub texture_priority: u8,
    pub detail_scale: f32,
    pub detail_angle: i16,
    pub command_string: String,

    pub pixels: Vec<u8>,
}

pub struct DtxReader<'a> {
    diag: Diagnostics<'a>,
}

impl<'a> DtxReader<'a> {
    pub fn new(diag: Diagnostics<'a>) -> Self {
        Self { diag }
    }

    /// Read a DTX file from disk. Failures carry the path and the offset.
    pub fn read_from_file<P: AsRef<Path>>(&self, path: P) -> Result<Texture> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| Error::from(e).in_file(path, 0))?;
        let mut cursor =
            BinaryCursor::new(BufReader::new(file)).map_err(|e| e.in_file(path, 0))?;
        self.read(&mut cursor).map_err(|source| {
            diag!(
                self.diag,
                Error,
                "Failed to read {} at 0x{:08X}: {}",
                path.display(),
                cursor.tell(),
                source
            );
            source.in_file(path, cursor.tell())
        })
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<Texture> {
        self.read(&mut BinaryCursor::from_bytes(bytes))
    }

    pub fn read<R: Read + Seek>(&self, cursor: &mut BinaryCursor<R>) -> Result<Texture> {
        let resource_type = cursor.read::<u32>()?;
        let raw_version = cursor.read::<i32>()?;
        let version = DtxVersion::from_i32(raw_version)
            .ok_or_else(|| Error::unsupported(format!("DTX version {raw_version}")))?;

        let mut texture = if version == DtxVersion::Ps2 {
            self.read_ps2_header(cursor, resource_type)?
        } else {
            self.read_pc_header(cursor, resource_type, version)?
        };

        if texture.width == 0 || texture.height == 0 || texture.mipmap_count == 0 {
            return Err(Error::mismatch(format!(
                "empty texture {}x{} with {} mips",
                texture.width, texture.height, texture.mipmap_count
            )));
        }

        diag!(
            self.diag,
            Debug,
            "DTX {:?} {}x{} {:?}, {} mips",
            texture.version,
            texture.width,
            texture.height,
            texture.format,
            texture.mipmap_count
        );

        texture.pixels = self.read_pixels(cursor, &texture)?;
        Ok(texture)
    }

    fn read_pc_header<R: Read + Seek>(
        &self,
        cursor: &mut BinaryCursor<R>,
        resource_type: u32,
        version: DtxVersion,
    ) -> Result<Texture> {
        let width = cursor.read::<u16>()? as u32;
        let height = cursor.read::<u16>()? as u32;
        let mipmap_count = cursor.read::<u16>()?;
        let section_count = cursor.read::<u16>()?;
        let flags = cursor.read::<u32>()?;
        let user_flags = cursor.read::<u32>()?;

        let mut texture = Texture {
            resource_type,
            version,
            width,
            height,
            mipmap_count,
            section_count,
            flags,
            user_flags,
            format: PixelFormat::Bpp8Palette,
            texture_group: 0,
            mipmaps_to_use: 0,
            mipmap_offset: 0,
            texture_priority: 0,
            detail_scale: 0.0,
            detail_angle: 0,
            command_string: String::new(),
            pixels: Vec::new(),
        };

        if version == DtxVersion::Lt1 {
            return Ok(texture);
        }

        texture.texture_group = cursor.read()?;
        texture.mipmaps_to_use = cursor.read()?;
        let bytes_per_pixel = cursor.read::<u8>()?;
        texture.mipmap_offset = cursor.read()?;
        let _mipmap_tex_coord_offset = cursor.read::<u8>()?;
        texture.texture_priority = cursor.read()?;
        texture.detail_scale = cursor.read()?;
        texture.detail_angle = cursor.read()?;

        // 128 bytes, null terminated
        let command = cursor.read_array::<COMMAND_STRING_LEN>()?;
        texture.command_string = command
            .iter()
            .take_while(|&&c| c != 0)
            .map(|&c| c as char)
            .collect();

        // LT1.5 always uses the 8-bit palette
        if version == DtxVersion::Lt2 {
            texture.format = match PixelFormat::from_u8(bytes_per_pixel) {
                Some(format @ (PixelFormat::Bpp8 | PixelFormat::Bpp16)) => {
                    return Err(Error::unsupported(format!("DTX pixel format {format:?}")));
                }
                Some(PixelFormat::Ps2Indexed8 | PixelFormat::Ps2Indexed4) | None => {
                    return Err(Error::unsupported(format!(
                        "DTX pixel format tag {bytes_per_pixel}"
                    )));
                }
                Some(format) => format,
            };
        }

        Ok(texture)
    }

    fn read_ps2_header<R: Read + Seek>(
        &self,
        cursor: &mut BinaryCursor<R>,
        resource_type: u32,
    ) -> Result<Texture> {
        let width = cursor.read::<u32>()?;
        let height = cursor.read::<u32>()?;
        let mipmap_count = cursor.read::<u16>()?;
        let section_count = cursor.read::<u16>()?;
        let flags = cursor.read::<u32>()?;
        let user_flags = cursor.read::<u32>()?;
        let tag = cursor.read::<u8>()?;
        let texture_group = cursor.read::<u8>()?;
        cursor.skip(2)?;

        let format = match PixelFormat::from_u8(tag) {
            Some(format @ (PixelFormat::Ps2Indexed8 | PixelFormat::Ps2Indexed4)) => format,
            _ => {
                return Err(Error::unsupported(format!(
                    "PS2 DTX pixel format tag {tag}"
                )))
            }
        };

        Ok(Texture {
            resource_type,
            version: DtxVersion::Ps2,
            width,
            height,
            mipmap_count,
            section_count,
            flags,
            user_flags,
            format,
            texture_group,
            mipmaps_to_use: 0,
            mipmap_offset: 0,
            texture_priority: 0,
            detail_scale: 0.0,
            detail_angle: 0,
            command_string: String::new(),
            pixels: Vec::new(),
        })
    }

    fn read_pixels<R: Read + Seek>(
        &self,
        cursor: &mut BinaryCursor<R>,
        texture: &Texture,
    ) -> Result<Vec<u8>> {
        let width = texture.width as usize;
        let height = texture.height as usize;
        let format = texture.format;

        let pixels = match format {
            PixelFormat::Bpp8Palette => {
                let palette = Self::read_argb_palette(cursor)?;
                let indices = self.read_mip_chain(cursor, texture)?;
                lookup(&indices, &palette)
            }
            PixelFormat::Bpp32Palette => {
                let indices = self.read_mip_chain(cursor, texture)?;
                // section header, section length, packed ARGB palette
                cursor.skip(12)?;
                let _section_length = cursor.read::<u32>()?;
                let mut palette = Vec::with_capacity(256);
                for _ in 0..256 {
                    palette.push(unpack_argb(cursor.read::<u32>()?));
                }
                lookup(&indices, &palette)
            }
            PixelFormat::Bpp32 => {
                let data = self.read_mip_chain(cursor, texture)?;
                data.chunks_exact(4)
                    .flat_map(|c| unpack_argb(u32::from_le_bytes([c[0], c[1], c[2], c[3]])))
                    .collect()
            }
            PixelFormat::Dxt1 => s3tc::decode_dxt1(&self.read_mip_chain(cursor, texture)?, width, height),
            PixelFormat::Dxt3 => s3tc::decode_dxt3(&self.read_mip_chain(cursor, texture)?, width, height),
            PixelFormat::Dxt5 => s3tc::decode_dxt5(&self.read_mip_chain(cursor, texture)?, width, height),
            PixelFormat::Ps2Indexed8 => {
                let clut = Self::read_ps2_clut(cursor, 256)?;
                let palette = ps2::unswizzle_clut(&clut);
                let data = self.read_mip_chain(cursor, texture)?;
                ps2::decode_indexed8(&data, &palette, width, height)
            }
            PixelFormat::Ps2Indexed4 => {
                let palette = Self::read_ps2_clut(cursor, 16)?;
                let data = self.read_mip_chain(cursor, texture)?;
                ps2::decode_indexed4(&data, &palette, width, height)
            }
            PixelFormat::Bpp8 | PixelFormat::Bpp16 => {
                return Err(Error::unsupported(format!("DTX pixel format {format:?}")));
            }
        };

        if pixels.len() != width * height * 4 {
            return Err(Error::mismatch(format!(
                "decoded {} bytes for a {width}x{height} texture",
                pixels.len()
            )));
        }
        Ok(pixels)
    }

    /// Read the base mip and skip every smaller level.
    fn read_mip_chain<R: Read + Seek>(
        &self,
        cursor: &mut BinaryCursor<R>,
        texture: &Texture,
    ) -> Result<Vec<u8>> {
        let width = texture.width as usize;
        let height = texture.height as usize;
        let base = cursor.read_bytes(texture.format.level_size(width, height))?;

        let mut skipped = 0u64;
        for level in 1..texture.mipmap_count as u32 {
            let w = width.checked_shr(level).unwrap_or(0).max(1);
            let h = height.checked_shr(level).unwrap_or(0).max(1);
            let size = texture.format.level_size(w, h) as u64;
            cursor.skip(size)?;
            skipped += size;
        }
        if skipped > 0 {
            diag!(
                self.diag,
                Trace,
                "Skipped {} mips ({} bytes)",
                texture.mipmap_count - 1,
                skipped
            );
        }

        Ok(base)
    }

    // 2 unknown u32s then 256 ARGB entries
    fn read_argb_palette<R: Read + Seek>(cursor: &mut BinaryCursor<R>) -> Result<Vec<[u8; 4]>> {
        let _palette_header_1 = cursor.read::<u32>()?;
        let _palette_header_2 = cursor.read::<u32>()?;

        let mut palette = Vec::with_capacity(256);
        for _ in 0..256 {
            let [a, r, g, b] = cursor.read_array::<4>()?;
            palette.push([r, g, b, opaque_if_zero(a)]);
        }
        Ok(palette)
    }

    fn read_ps2_clut<R: Read + Seek>(
        cursor: &mut BinaryCursor<R>,
        entries: usize,
    ) -> Result<Vec<[u8; 4]>> {
        let mut clut = Vec::with_capacity(entries);
        for _ in 0..entries {
            let [r, g, b, a] = cursor.read_array::<4>()?;
            clut.push([r, g, b, ps2::expand_alpha(a)]);
        }
        Ok(clut)
    }
}

// alpha 0 is stored by textures that never used the channel
fn opaque_if_zero(alpha: u8) -> u8 {
    if alpha == 0 {
        255
    } else {
        alpha
    }
}

fn unpack_argb(packed: u32) -> [u8; 4] {
    let a = ((packed >> 24) & 0xFF) as u8;
    let r = ((packed >> 16) & 0xFF) as u8;
    let g = ((packed >> 8) & 0xFF) as u8;
    let b = (packed & 0xFF) as u8;
    [r, g, b, opaque_if_zero(a)]
}

fn lookup(indices: &[u8], palette: &[[u8; 4]]) -> Vec<u8> {
    let mut rgba = Vec::with_capacity(indices.len() * 4);
    for &idx in indices {
        rgba.extend_from_slice(&palette[idx as usize]);
    }
    rgba
}

/// Skin texture for a model, resolved as `../SKINS/<STEM>.DTX` relative to
/// the model file. Name matching is case-insensitive.
pub fn find_skin(model_path: &Path) -> Option<PathBuf> {
    let stem = model_path.file_stem()?.to_string_lossy().to_uppercase();
    let models_dir = model_path.parent()?;
    let root = models_dir.parent().unwrap_or(Path::new(".."));
    let target = format!("{stem}.DTX");

    let skins_dir = find_entry(root, "SKINS")?;
    find_entry(&skins_dir, &target)
}

fn find_entry(dir: &Path, upper_name: &str) -> Option<PathBuf> {
    fs::read_dir(dir)
        .ok()?
        .flatten()
        .map(|entry| entry.path())
        .find(|path| {
            path.file_name()
                .is_some_and(|name| name.to_string_lossy().to_uppercase() == upper_name)
        })
}
