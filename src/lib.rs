//decoders for LithTech engine assets: models (ABC, LTB), worlds (DAT) and
//textures (DTX)

#[macro_use]
pub mod diagnostics;

pub mod abc;
pub mod abc_v6;
pub mod cursor;
pub mod dat;
pub mod dtx;
pub mod error;
pub mod loader;
pub mod ltb;
pub mod ltb_ps2;
pub mod model;
pub mod ps2;
pub mod s3tc;

#[cfg(test)]
mod testutil;

pub use cursor::BinaryCursor;
pub use dat::{DatReader, World};
pub use diagnostics::Diagnostics;
pub use dtx::{DtxReader, Texture};
pub use error::{Error, Result};
pub use loader::{decode_model, read_model_file, ModelFamily, ModelReader};
pub use model::{Model, ModelFormat};
