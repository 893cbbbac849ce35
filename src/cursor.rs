//forward reading cursor over a LithTech file
//
//everything is little endian with no implicit alignment; padding and
//reserved fields must be read (or skipped) explicitly by the caller

use std::io::{self, Cursor, Read, Seek, SeekFrom};

use byteorder::{LittleEndian, ReadBytesExt};
use cgmath::{Matrix, Matrix4, Quaternion, Vector2, Vector3};

use crate::error::{Error, Result};

/// Fixed-width little endian primitive.
pub trait Fixed: Sized {
    const SIZE: u64;

    fn read_le<R: Read>(reader: &mut R) -> io::Result<Self>;
}

impl Fixed for u8 {
    const SIZE: u64 = 1;

    fn read_le<R: Read>(reader: &mut R) -> io::Result<Self> {
        reader.read_u8()
    }
}

impl Fixed for i8 {
    const SIZE: u64 = 1;

    fn read_le<R: Read>(reader: &mut R) -> io::Result<Self> {
        reader.read_i8()
    }
}

macro_rules! fixed_le {
    ($($ty:ty => $read:ident),* $(,)?) => {
        $(
            impl Fixed for $ty {
                const SIZE: u64 = std::mem::size_of::<$ty>() as u64;

                fn read_le<R: Read>(reader: &mut R) -> io::Result<Self> {
                    reader.$read::<LittleEndian>()
                }
            }
        )*
    };
}

fixed_le! {
    u16 => read_u16,
    i16 => read_i16,
    u32 => read_u32,
    i32 => read_i32,
    f32 => read_f32,
}

/// Cursor over an in-memory buffer.
pub type ByteCursor<'a> = BinaryCursor<Cursor<&'a [u8]>>;

/// Width of a string length prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefixWidth {
    U16,
    U32,
}

pub struct BinaryCursor<R> {
    inner: R,
    pos: u64,
    len: u64,
}

impl<'a> ByteCursor<'a> {
    pub fn from_bytes(bytes: &'a [u8]) -> Self {
        Self {
            inner: Cursor::new(bytes),
            pos: 0,
            len: bytes.len() as u64,
        }
    }
}

impl<R: Read + Seek> BinaryCursor<R> {
    /// Wrap a stream, measuring its length once. Reading starts at offset 0.
    pub fn new(mut inner: R) -> Result<Self> {
        let len = inner.seek(SeekFrom::End(0))?;
        inner.seek(SeekFrom::Start(0))?;
        Ok(Self { inner, pos: 0, len })
    }

    pub fn tell(&self) -> u64 {
        self.pos
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn remaining(&self) -> u64 {
        self.len.saturating_sub(self.pos)
    }

    fn ensure(&self, needed: u64) -> Result<()> {
        if needed > self.remaining() {
            return Err(Error::Truncated {
                offset: self.pos,
                needed,
                available: self.remaining(),
            });
        }
        Ok(())
    }

    fn truncated_on_eof(&self, needed: u64, err: io::Error) -> Error {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            Error::Truncated {
                offset: self.pos,
                needed,
                available: self.remaining(),
            }
        } else {
            Error::Io(err)
        }
    }

    pub fn read<T: Fixed>(&mut self) -> Result<T> {
        self.ensure(T::SIZE)?;
        let value = T::read_le(&mut self.inner).map_err(|e| self.truncated_on_eof(T::SIZE, e))?;
        self.pos += T::SIZE;
        Ok(value)
    }

    pub fn read_bytes(&mut self, count: usize) -> Result<Vec<u8>> {
        let needed = count as u64;
        self.ensure(needed)?;
        let mut buffer = vec![0u8; count];
        self.inner
            .read_exact(&mut buffer)
            .map_err(|e| self.truncated_on_eof(needed, e))?;
        self.pos += needed;
        Ok(buffer)
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        self.ensure(N as u64)?;
        let mut buffer = [0u8; N];
        self.inner
            .read_exact(&mut buffer)
            .map_err(|e| self.truncated_on_eof(N as u64, e))?;
        self.pos += N as u64;
        Ok(buffer)
    }

    /// Advance past `count` bytes without materializing them.
    pub fn skip(&mut self, count: u64) -> Result<()> {
        self.ensure(count)?;
        let offset = i64::try_from(count).map_err(|_| Error::mismatch("skip distance overflows"))?;
        self.inner.seek(SeekFrom::Current(offset))?;
        self.pos += count;
        Ok(())
    }

    /// Jump to an absolute offset. Offsets past the end are truncation.
    pub fn seek(&mut self, offset: u64) -> Result<()> {
        if offset > self.len {
            return Err(Error::Truncated {
                offset,
                needed: offset - self.len,
                available: 0,
            });
        }
        self.inner.seek(SeekFrom::Start(offset))?;
        self.pos = offset;
        Ok(())
    }

    /// Length-prefixed string, one character per byte.
    pub fn read_string(&mut self, width: PrefixWidth) -> Result<String> {
        let length = match width {
            PrefixWidth::U16 => self.read::<u16>()? as usize,
            PrefixWidth::U32 => self.read::<u32>()? as usize,
        };
        let bytes = self.read_bytes(length)?;
        Ok(bytes.iter().map(|&b| b as char).collect())
    }

    pub fn read_short_string(&mut self) -> Result<String> {
        self.read_string(PrefixWidth::U16)
    }

    pub fn read_long_string(&mut self) -> Result<String> {
        self.read_string(PrefixWidth::U32)
    }

    pub fn read_vector2(&mut self) -> Result<Vector2<f32>> {
        Ok(Vector2::new(self.read()?, self.read()?))
    }

    pub fn read_vector3(&mut self) -> Result<Vector3<f32>> {
        Ok(Vector3::new(self.read()?, self.read()?, self.read()?))
    }

    /// Quaternion stored as x, y, z, w.
    pub fn read_quaternion(&mut self) -> Result<Quaternion<f32>> {
        let x = self.read()?;
        let y = self.read()?;
        let z = self.read()?;
        let w = self.read()?;
        Ok(Quaternion::new(w, x, y, z))
    }

    /// 4x4 matrix stored as 16 row-major floats.
    pub fn read_matrix(&mut self) -> Result<Matrix4<f32>> {
        let mut rows = [[0f32; 4]; 4];
        for row in &mut rows {
            for cell in row.iter_mut() {
                *cell = self.read()?;
            }
        }
        // cgmath arrays are column-major
        Ok(Matrix4::from(rows).transpose())
    }

    /// Capacity for `count` records of at least `record_size` bytes, capped
    /// by what the stream can still hold.
    pub fn capacity_hint(&self, count: usize, record_size: usize) -> usize {
        let fits = self.remaining() / record_size.max(1) as u64;
        count.min(usize::try_from(fits).unwrap_or(usize::MAX))
    }
}
