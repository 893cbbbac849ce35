//model loading by ordered trial
//
//no magic number tells the ABC layouts (or the LTB layouts) apart, so every
//candidate of a family is tried in order and the first clean decode wins

use std::fs;
use std::path::Path;

use crate::abc::AbcReader;
use crate::abc_v6::AbcV6Reader;
use crate::cursor::{BinaryCursor, ByteCursor};
use crate::diagnostics::Diagnostics;
use crate::error::{CandidateFailure, Error, Result};
use crate::ltb::LtbReader;
use crate::ltb_ps2::LtbPs2Reader;
use crate::model::{Model, ModelFormat};

/// A reader for one model layout.
pub trait ModelReader {
    fn format(&self) -> ModelFormat;

    fn read_model(&self, cursor: &mut ByteCursor<'_>) -> Result<Model>;
}

macro_rules! model_reader {
    ($reader:ident => $format:expr) => {
        impl ModelReader for $reader<'_> {
            fn format(&self) -> ModelFormat {
                $format
            }

            fn read_model(&self, cursor: &mut ByteCursor<'_>) -> Result<Model> {
                self.read(cursor)
            }
        }
    };
}

model_reader!(AbcV6Reader => ModelFormat::AbcV6);
model_reader!(AbcReader => ModelFormat::Abc);
model_reader!(LtbReader => ModelFormat::LtbPc);
model_reader!(LtbPs2Reader => ModelFormat::LtbPs2);

/// Model file family; each has an ordered list of candidate layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFamily {
    Abc,
    Ltb,
}

impl ModelFamily {
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_string_lossy().to_ascii_lowercase();
        match extension.as_str() {
            "abc" => Some(ModelFamily::Abc),
            "ltb" => Some(ModelFamily::Ltb),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ModelFamily::Abc => "ABC",
            ModelFamily::Ltb => "LTB",
        }
    }

    pub fn candidates(self) -> &'static [ModelFormat] {
        match self {
            ModelFamily::Abc => &[ModelFormat::AbcV6, ModelFormat::Abc],
            ModelFamily::Ltb => &[ModelFormat::LtbPc, ModelFormat::LtbPs2],
        }
    }
}

pub fn reader_for<'a>(format: ModelFormat, diag: Diagnostics<'a>) -> Box<dyn ModelReader + 'a> {
    match format {
        ModelFormat::AbcV6 => Box::new(AbcV6Reader::new(diag)),
        ModelFormat::Abc => Box::new(AbcReader::new(diag)),
        ModelFormat::LtbPc => Box::new(LtbReader::new(diag)),
        ModelFormat::LtbPs2 => Box::new(LtbPs2Reader::new(diag)),
    }
}

/// Try `readers` in order. Failures are kept, not surfaced, unless every
/// reader fails.
pub fn decode_with(
    family: &'static str,
    readers: &[&dyn ModelReader],
    bytes: &[u8],
    diag: Diagnostics<'_>,
) -> Result<Model> {
    let mut failures = Vec::with_capacity(readers.len());
    for reader in readers {
        let mut cursor = BinaryCursor::from_bytes(bytes);
        match reader.read_model(&mut cursor) {
            Ok(model) => {
                diag!(diag, Debug, "Decoded as {}", reader.format());
                return Ok(model);
            }
            Err(error) => {
                diag!(
                    diag,
                    Debug,
                    "{} reader gave up at 0x{:08X}: {}",
                    reader.format(),
                    cursor.tell(),
                    error
                );
                failures.push(CandidateFailure {
                    format: reader.format(),
                    offset: cursor.tell(),
                    error,
                });
            }
        }
    }
    Err(Error::NoMatchingReader { family, failures })
}

pub fn decode_model(family: ModelFamily, bytes: &[u8], diag: Diagnostics<'_>) -> Result<Model> {
    let readers: Vec<_> = family
        .candidates()
        .iter()
        .map(|&format| reader_for(format, diag))
        .collect();
    let readers: Vec<&dyn ModelReader> = readers.iter().map(|reader| reader.as_ref()).collect();
    decode_with(family.name(), &readers, bytes, diag)
}

/// Read a model file. The family comes from the extension unless given;
/// the model is named after the file stem.
pub fn read_model_file(
    path: &Path,
    family: Option<ModelFamily>,
    diag: Diagnostics<'_>,
) -> Result<Model> {
    let family = family
        .or_else(|| ModelFamily::from_path(path))
        .ok_or_else(|| Error::unsupported(format!("unknown model type {}", path.display())))?;
    let bytes = fs::read(path).map_err(|e| Error::from(e).in_file(path, 0))?;

    match decode_model(family, &bytes, diag) {
        Ok(mut model) => {
            model.name = path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default();
            Ok(model)
        }
        Err(error) => {
            let offset = match &error {
                Error::NoMatchingReader { failures, .. } => {
                    failures.iter().map(|f| f.offset).max().unwrap_or(0)
                }
                _ => 0,
            };
            diag!(diag, Error, "Failed to read {}: {}", path.display(), error);
            Err(error.in_file(path, offset))
        }
    }
}
