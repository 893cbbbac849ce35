//little endian fixture builder for the reader tests

use byteorder::{LittleEndian, WriteBytesExt};

#[derive(Default)]
pub struct ByteWriter {
    bytes: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn finish(self) -> Vec<u8> {
        self.bytes
    }

    pub fn u8(mut self, v: u8) -> Self {
        self.bytes.write_u8(v).unwrap();
        self
    }

    pub fn i8(mut self, v: i8) -> Self {
        self.bytes.write_i8(v).unwrap();
        self
    }

    pub fn u16(mut self, v: u16) -> Self {
        self.bytes.write_u16::<LittleEndian>(v).unwrap();
        self
    }

    pub fn i16(mut self, v: i16) -> Self {
        self.bytes.write_i16::<LittleEndian>(v).unwrap();
        self
    }

    pub fn u32(mut self, v: u32) -> Self {
        self.bytes.write_u32::<LittleEndian>(v).unwrap();
        self
    }

    pub fn i32(mut self, v: i32) -> Self {
        self.bytes.write_i32::<LittleEndian>(v).unwrap();
        self
    }

    pub fn f32(mut self, v: f32) -> Self {
        self.bytes.write_f32::<LittleEndian>(v).unwrap();
        self
    }

    pub fn raw(mut self, data: &[u8]) -> Self {
        self.bytes.extend_from_slice(data);
        self
    }

    pub fn zeros(mut self, count: usize) -> Self {
        self.bytes.resize(self.bytes.len() + count, 0);
        self
    }

    pub fn str16(self, s: &str) -> Self {
        self.u16(s.len() as u16).raw(s.as_bytes())
    }

    pub fn str32(self, s: &str) -> Self {
        self.u32(s.len() as u32).raw(s.as_bytes())
    }

    pub fn vec2(self, v: [f32; 2]) -> Self {
        self.f32(v[0]).f32(v[1])
    }

    pub fn vec3(self, v: [f32; 3]) -> Self {
        self.f32(v[0]).f32(v[1]).f32(v[2])
    }

    /// x, y, z, w
    pub fn quat(self, q: [f32; 4]) -> Self {
        self.f32(q[0]).f32(q[1]).f32(q[2]).f32(q[3])
    }

    pub fn matrix(mut self, rows: &[f32]) -> Self {
        assert_eq!(rows.len(), 16);
        for &v in rows {
            self = self.f32(v);
        }
        self
    }

    pub fn identity(self) -> Self {
        self.matrix(&[
            1.0, 0.0, 0.0, 0.0, //
            0.0, 1.0, 0.0, 0.0, //
            0.0, 0.0, 1.0, 0.0, //
            0.0, 0.0, 0.0, 1.0,
        ])
    }

    /// Row-major translation matrix.
    pub fn translation(self, t: [f32; 3]) -> Self {
        self.matrix(&[
            1.0, 0.0, 0.0, t[0], //
            0.0, 1.0, 0.0, t[1], //
            0.0, 0.0, 1.0, t[2], //
            0.0, 0.0, 0.0, 1.0,
        ])
    }

    /// Overwrite a previously written u32 (for offsets known only later).
    pub fn patch_u32(mut self, at: usize, v: u32) -> Self {
        self.bytes[at..at + 4].copy_from_slice(&v.to_le_bytes());
        self
    }

    pub fn patch_i32(self, at: usize, v: i32) -> Self {
        self.patch_u32(at, v as u32)
    }

    /// ABC style section: name, offset of the next section (-1 when last), body.
    pub fn section(self, name: &str, last: bool, body: impl FnOnce(Self) -> Self) -> Self {
        let writer = self.str16(name);
        let next_at = writer.len();
        let writer = body(writer.i32(-1));
        if last {
            return writer;
        }
        let next = writer.len() as i32;
        writer.patch_i32(next_at, next)
    }
}
