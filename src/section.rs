//! Binary image & section codec (§4.2).
//!
//! An image is a concatenation of independently framed sections. Each
//! section is a fixed 64-byte big-endian header followed by `image_size`
//! bytes of payload, optionally zlib-compressed; the header's digest is
//! always computed over the *uncompressed* payload and is re-verified
//! after decompression on load.

use crate::symbol::{Section as SymSection, Symbol};
use crate::value::Value;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use num::BigRational;
use sha2::{Digest, Sha256};
use std::fmt;
use std::io::{self, Cursor, Read, Write};

pub const HEADER_LEN: usize = 64;
pub const DIGEST_LEN: usize = 32;
pub const VERSION: u64 = 1;

pub const CODE_ID: u64 = 2;
pub const CONST_ID: u64 = 3;
pub const VARIABLE_ID: u64 = 4;
pub const OS_ID: u64 = 5;

pub const FLAG_EXECUTE: u64 = 1 << 0;
pub const FLAG_WRITE: u64 = 1 << 1;
pub const FLAG_READ: u64 = 1 << 2;
pub const FLAG_COMPRESS: u64 = 1 << 3;

/// Wire discriminant for a symbol entry's value. `Number` and `Label`
/// match the source's `SymNumId`/`SymLabelId`; `Integer` is an addition
/// this workspace makes to carry machine integers distinctly from
/// rationals on the wire (see DESIGN.md).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SymbolType {
    Number = 1,
    Label = 2,
    Integer = 3,
}

impl SymbolType {
    fn from_u64(v: u64) -> Result<SymbolType, CodecError> {
        match v {
            1 => Ok(SymbolType::Number),
            2 => Ok(SymbolType::Label),
            3 => Ok(SymbolType::Integer),
            other => Err(CodecError::UnknownSymbolType(other)),
        }
    }
}

#[derive(Debug)]
pub enum CodecError {
    Io(io::Error),
    ShortHeader,
    VersionMismatch { found: u64 },
    DigestMismatch,
    UnknownSectionId(u64),
    DuplicateSection(u64),
    EmptyCodeSection,
    EmptySection(u64),
    UnknownSymbolType(u64),
    InvalidValueString(String),
    Utf8,
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CodecError::Io(e) => write!(f, "i/o error: {}", e),
            CodecError::ShortHeader => write!(f, "section header truncated"),
            CodecError::VersionMismatch { found } => {
                write!(f, "unsupported image version {}", found)
            }
            CodecError::DigestMismatch => write!(f, "section digest mismatch"),
            CodecError::UnknownSectionId(id) => write!(f, "unknown section id {:#x}", id),
            CodecError::DuplicateSection(id) => write!(f, "duplicate section id {:#x}", id),
            CodecError::EmptyCodeSection => write!(f, "code section must not be empty"),
            CodecError::EmptySection(id) => write!(f, "section {:#x} must not be empty", id),
            CodecError::UnknownSymbolType(t) => write!(f, "unknown symbol type {}", t),
            CodecError::InvalidValueString(s) => write!(f, "cannot parse value {:?}", s),
            CodecError::Utf8 => write!(f, "symbol name/value is not valid utf-8"),
        }
    }
}

impl std::error::Error for CodecError {}

impl From<io::Error> for CodecError {
    fn from(e: io::Error) -> Self {
        CodecError::Io(e)
    }
}

/// Write a length-prefixed (u32 big-endian length) UTF-8 string.
fn write_string(w: &mut impl Write, s: &str) -> io::Result<()> {
    w.write_u32::<BigEndian>(s.len() as u32)?;
    w.write_all(s.as_bytes())
}

fn read_string(r: &mut impl Read) -> Result<String, CodecError> {
    let len = r.read_u32::<BigEndian>()? as usize;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|_| CodecError::Utf8)
}

fn encode_symbol(sym: &Symbol) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.write_u64::<BigEndian>(sym.id).unwrap();
    let (ty, value_str) = match &sym.value {
        Value::Number(r) => (SymbolType::Number, r.to_string()),
        Value::Integer(n) => (SymbolType::Integer, n.to_string()),
        Value::Label(addr) => (SymbolType::Label, addr.to_string()),
    };
    buf.write_u64::<BigEndian>(ty as u64).unwrap();
    write_string(&mut buf, &sym.name).unwrap();
    write_string(&mut buf, &value_str).unwrap();
    buf
}

fn decode_symbol(buf: &[u8], section: SymSection, consumed: &mut usize) -> Result<Symbol, CodecError> {
    let mut cur = Cursor::new(buf);
    let id = cur.read_u64::<BigEndian>()?;
    let ty = SymbolType::from_u64(cur.read_u64::<BigEndian>()?)?;
    let name = read_string(&mut cur)?;
    let value_str = read_string(&mut cur)?;

    let value = match ty {
        SymbolType::Number => {
            let r: BigRational = value_str
                .parse()
                .map_err(|_| CodecError::InvalidValueString(value_str.clone()))?;
            Value::Number(r)
        }
        SymbolType::Integer => {
            let n: i64 = value_str
                .parse()
                .map_err(|_| CodecError::InvalidValueString(value_str.clone()))?;
            Value::Integer(n)
        }
        SymbolType::Label => {
            let addr: u64 = value_str
                .parse()
                .map_err(|_| CodecError::InvalidValueString(value_str.clone()))?;
            Value::Label(addr)
        }
    };

    *consumed = cur.position() as usize;
    Ok(Symbol::new(id, name, section, value, 1))
}

fn decode_symbols(mut buf: &[u8], section: SymSection) -> Result<Vec<Symbol>, CodecError> {
    let mut out = Vec::new();
    while !buf.is_empty() {
        let mut consumed = 0;
        let sym = decode_symbol(buf, section, &mut consumed)?;
        out.push(sym);
        buf = &buf[consumed..];
    }
    Ok(out)
}

/// A section's payload, already decoded into its logical shape.
#[derive(Clone, Debug)]
pub enum Payload {
    Code(Vec<u64>),
    Symbols(Vec<Symbol>),
}

#[derive(Clone, Debug)]
pub struct Section {
    pub id: u64,
    pub flags: u64,
    pub payload: Payload,
}

impl Section {
    pub fn new_code(code: Vec<u64>) -> Result<Section, CodecError> {
        if code.is_empty() {
            return Err(CodecError::EmptyCodeSection);
        }
        Ok(Section {
            id: CODE_ID,
            flags: FLAG_READ | FLAG_EXECUTE,
            payload: Payload::Code(code),
        })
    }

    pub fn new_variables(vars: Vec<Symbol>) -> Result<Section, CodecError> {
        if vars.is_empty() {
            return Err(CodecError::EmptySection(VARIABLE_ID));
        }
        Ok(Section {
            id: VARIABLE_ID,
            flags: FLAG_READ | FLAG_WRITE,
            payload: Payload::Symbols(vars),
        })
    }

    pub fn new_consts(consts: Vec<Symbol>) -> Result<Section, CodecError> {
        if consts.is_empty() {
            return Err(CodecError::EmptySection(CONST_ID));
        }
        Ok(Section {
            id: CONST_ID,
            flags: FLAG_READ,
            payload: Payload::Symbols(consts),
        })
    }

    pub fn new_os(calls: Vec<Symbol>) -> Result<Section, CodecError> {
        if calls.is_empty() {
            return Err(CodecError::EmptySection(OS_ID));
        }
        Ok(Section {
            id: OS_ID,
            flags: FLAG_READ | FLAG_EXECUTE,
            payload: Payload::Symbols(calls),
        })
    }

    fn uncompressed_payload(&self) -> Vec<u8> {
        match &self.payload {
            Payload::Code(words) => {
                let mut buf = Vec::with_capacity(words.len() * 8);
                for w in words {
                    buf.write_u64::<BigEndian>(*w).unwrap();
                }
                buf
            }
            Payload::Symbols(syms) => {
                let mut buf = Vec::new();
                for s in syms {
                    buf.extend(encode_symbol(s));
                }
                buf
            }
        }
    }

    /// Header-framed bytes for this section, as they appear in an image.
    pub fn raw(&self, compress: bool) -> Result<Vec<u8>, CodecError> {
        let payload = self.uncompressed_payload();
        let digest = sha256(&payload);

        let (on_disk, flags) = if compress {
            (compress_zlib(&payload), self.flags | FLAG_COMPRESS)
        } else {
            (payload, self.flags)
        };

        let mut out = Vec::with_capacity(HEADER_LEN + on_disk.len());
        out.write_u64::<BigEndian>(VERSION)?;
        out.write_u64::<BigEndian>(on_disk.len() as u64)?;
        out.write_u64::<BigEndian>(flags)?;
        out.write_u64::<BigEndian>(self.id)?;
        out.write_all(&digest)?;
        out.write_all(&on_disk)?;
        Ok(out)
    }
}

fn sha256(data: &[u8]) -> [u8; DIGEST_LEN] {
    let mut hasher = Sha256::new();
    hasher.input(data);
    let result = hasher.result();
    let mut digest = [0u8; DIGEST_LEN];
    digest.copy_from_slice(&result);
    digest
}

fn compress_zlib(data: &[u8]) -> Vec<u8> {
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
    enc.write_all(data).expect("in-memory writer cannot fail");
    enc.finish().expect("in-memory writer cannot fail")
}

fn decompress_zlib(data: &[u8]) -> io::Result<Vec<u8>> {
    use flate2::read::ZlibDecoder;
    let mut dec = ZlibDecoder::new(data);
    let mut out = Vec::new();
    dec.read_to_end(&mut out)?;
    Ok(out)
}

/// Parse one header-framed section from the front of `buf`, returning the
/// section and the number of bytes consumed.
fn section_from_bytes(buf: &[u8]) -> Result<(Section, usize), CodecError> {
    if buf.len() < HEADER_LEN {
        return Err(CodecError::ShortHeader);
    }
    let mut cur = Cursor::new(&buf[..HEADER_LEN]);
    let version = cur.read_u64::<BigEndian>()?;
    if version != VERSION {
        return Err(CodecError::VersionMismatch { found: version });
    }
    let image_size = cur.read_u64::<BigEndian>()? as usize;
    let flags = cur.read_u64::<BigEndian>()?;
    let section_id = cur.read_u64::<BigEndian>()?;
    let mut digest = [0u8; DIGEST_LEN];
    cur.read_exact(&mut digest)?;

    let total = HEADER_LEN + image_size;
    if buf.len() < total {
        return Err(CodecError::ShortHeader);
    }
    let on_disk = &buf[HEADER_LEN..total];

    let payload_bytes = if flags & FLAG_COMPRESS != 0 {
        decompress_zlib(on_disk)?
    } else {
        on_disk.to_vec()
    };

    if sha256(&payload_bytes) != digest {
        return Err(CodecError::DigestMismatch);
    }

    let payload = match section_id {
        CODE_ID => {
            let mut words = Vec::with_capacity(payload_bytes.len() / 8);
            let mut cur = Cursor::new(&payload_bytes[..]);
            while (cur.position() as usize) < payload_bytes.len() {
                words.push(cur.read_u64::<BigEndian>()?);
            }
            Payload::Code(words)
        }
        VARIABLE_ID => Payload::Symbols(decode_symbols(&payload_bytes, SymSection::Variable)?),
        CONST_ID => Payload::Symbols(decode_symbols(&payload_bytes, SymSection::Const)?),
        OS_ID => Payload::Symbols(decode_symbols(&payload_bytes, SymSection::Os)?),
        other => return Err(CodecError::UnknownSectionId(other)),
    };

    Ok((
        Section {
            id: section_id,
            flags,
            payload,
        },
        total,
    ))
}

/// A loadable program: a concatenation of sections, each with a unique
/// id (§4.2).
#[derive(Default)]
pub struct Image {
    bytes: Vec<u8>,
    seen: std::collections::HashSet<u64>,
}

impl Image {
    pub fn new() -> Image {
        Image::default()
    }

    pub fn add_section(&mut self, section: &Section, compress: bool) -> Result<(), CodecError> {
        if !self.seen.insert(section.id) {
            return Err(CodecError::DuplicateSection(section.id));
        }
        self.bytes.extend(section.raw(compress)?);
        Ok(())
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Parse every section out of a raw image, in the order they appear.
pub fn sections_from_image(mut buf: &[u8]) -> Result<Vec<Section>, CodecError> {
    let mut out = Vec::new();
    let mut seen = std::collections::HashSet::new();
    while !buf.is_empty() {
        let (section, consumed) = section_from_bytes(buf)?;
        if !seen.insert(section.id) {
            return Err(CodecError::DuplicateSection(section.id));
        }
        buf = &buf[consumed..];
        out.push(section);
    }
    Ok(out)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::symbol::Section as SymSection;

    fn sample_symbol(id: u64, value: Value) -> Symbol {
        Symbol::new(id, String::new(), SymSection::Variable, value, 1)
    }

    #[test]
    fn code_section_round_trips_uncompressed() {
        let code = vec![1, 2, 3, 4, 5];
        let section = Section::new_code(code.clone()).unwrap();
        let raw = section.raw(false).unwrap();
        let (decoded, consumed) = section_from_bytes(&raw).unwrap();
        assert_eq!(consumed, raw.len());
        match decoded.payload {
            Payload::Code(words) => assert_eq!(words, code),
            _ => panic!("wrong payload kind"),
        }
    }

    #[test]
    fn code_section_round_trips_compressed() {
        let code = vec![10, 20, 30];
        let section = Section::new_code(code.clone()).unwrap();
        let raw = section.raw(true).unwrap();
        let (decoded, _) = section_from_bytes(&raw).unwrap();
        match decoded.payload {
            Payload::Code(words) => assert_eq!(words, code),
            _ => panic!("wrong payload kind"),
        }
    }

    #[test]
    fn variable_section_round_trips_mixed_values() {
        let vars = vec![
            sample_symbol(300, Value::Integer(-7)),
            sample_symbol(301, Value::Number(BigRational::new(3.into(), 4.into()))),
        ];
        let section = Section::new_variables(vars.clone()).unwrap();
        let raw = section.raw(false).unwrap();
        let (decoded, _) = section_from_bytes(&raw).unwrap();
        match decoded.payload {
            Payload::Symbols(syms) => {
                assert_eq!(syms.len(), 2);
                assert_eq!(syms[0].value, vars[0].value);
                assert_eq!(syms[1].value, vars[1].value);
            }
            _ => panic!("wrong payload kind"),
        }
    }

    #[test]
    fn digest_mismatch_is_fatal() {
        let section = Section::new_code(vec![1, 2]).unwrap();
        let mut raw = section.raw(false).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0xff;
        assert!(matches!(section_from_bytes(&raw), Err(CodecError::DigestMismatch)));
    }

    #[test]
    fn version_mismatch_is_fatal() {
        let section = Section::new_code(vec![1]).unwrap();
        let mut raw = section.raw(false).unwrap();
        raw[7] = 9;
        assert!(matches!(
            section_from_bytes(&raw),
            Err(CodecError::VersionMismatch { .. })
        ));
    }

    #[test]
    fn empty_code_section_rejected() {
        assert!(matches!(Section::new_code(vec![]), Err(CodecError::EmptyCodeSection)));
    }

    #[test]
    fn image_rejects_duplicate_section_ids() {
        let mut image = Image::new();
        let a = Section::new_code(vec![1]).unwrap();
        let b = Section::new_code(vec![2]).unwrap();
        image.add_section(&a, false).unwrap();
        assert!(matches!(
            image.add_section(&b, false),
            Err(CodecError::DuplicateSection(CODE_ID))
        ));
    }

    #[test]
    fn image_round_trip_preserves_all_sections() {
        let code = (0u64..10).collect::<Vec<_>>();
        let vars = vec![sample_symbol(300, Value::Integer(1)), sample_symbol(301, Value::Integer(2))];
        let consts = vec![
            Symbol::new(1000, String::new(), SymSection::Const, Value::Integer(5), 1),
            Symbol::new(1001, String::new(), SymSection::Const, Value::Integer(6), 1),
        ];

        let mut image = Image::new();
        image.add_section(&Section::new_code(code.clone()).unwrap(), true).unwrap();
        image.add_section(&Section::new_variables(vars).unwrap(), true).unwrap();
        image.add_section(&Section::new_consts(consts).unwrap(), false).unwrap();

        let bytes = image.into_bytes();
        let sections = sections_from_image(&bytes).unwrap();
        assert_eq!(sections.len(), 3);
        let code_section = sections.iter().find(|s| s.id == CODE_ID).unwrap();
        match &code_section.payload {
            Payload::Code(words) => assert_eq!(words, &code),
            _ => panic!("wrong payload kind"),
        }
    }
}
