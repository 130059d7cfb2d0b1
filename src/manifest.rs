//! The link manifest: a line-oriented UTF-16 stream that describes the link
//! topology of a tree.
//!
//! Each record is
//!
//! ```text
//! "link" SP kind SP linklen SP link-path SP targetlen SP target-path "\n"
//! kind := "d" | "f" | "j"
//! ```
//!
//! where `linklen`/`targetlen` are decimal counts of UTF-16 code units and
//! the path fields carry exactly that many units, unterminated. The stream
//! is written in native-endian code units and must be opened in binary
//! mode; backups append to it, restores consume it front to back.

use std::io::{self, Read, Write};

use thiserror::Error;

use crate::wide::utf16s;

const SPACE: u16 = b' ' as u16;
const NEWLINE: u16 = b'\n' as u16;
const MAGIC: [u16; 5] = utf16s(b"link ");

/// What flavor of link a record reinstates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordKind {
    /// `d`: a directory symlink.
    DirectorySymlink,
    /// `f`: a file symlink (or its hardlink stand-in on hosts without
    /// native symlinks).
    FileLink,
    /// `j`: a mount-point junction.
    Junction,
}

impl RecordKind {
    fn code(self) -> u16 {
        match self {
            RecordKind::DirectorySymlink => b'd' as u16,
            RecordKind::FileLink => b'f' as u16,
            RecordKind::Junction => b'j' as u16,
        }
    }

    fn from_code(u: u16) -> Option<Self> {
        match u {
            u if u == b'd' as u16 => Some(RecordKind::DirectorySymlink),
            u if u == b'f' as u16 => Some(RecordKind::FileLink),
            u if u == b'j' as u16 => Some(RecordKind::Junction),
            _ => None,
        }
    }
}

/// One manifest line: reinstate `link` pointing at `target`.
///
/// `link` is relative to the tree root; `target` is whatever the original
/// link stored (absolute, or relativized when the backup ran in
/// relative-junction mode).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    pub kind: RecordKind,
    pub link: Vec<u16>,
    pub target: Vec<u16>,
}

/// Structural failures while parsing a record. Each stage of the grammar
/// has its own variant so a broken stream can be diagnosed precisely; any
/// of these ends the restore.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("record does not begin with `link `")]
    BadMagic,
    #[error("missing or unknown link kind")]
    BadKind,
    #[error("malformed length field")]
    BadLength,
    #[error("record body ends early")]
    ShortBody,
    #[error("missing field terminator")]
    MissingTerminator,
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl From<ParseError> for io::Error {
    fn from(e: ParseError) -> io::Error {
        match e {
            ParseError::Io(inner) => inner,
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}

/// Streaming manifest writer.
pub struct Writer<W> {
    inner: W,
}

impl<W: Write> Writer<W> {
    pub fn new(inner: W) -> Self {
        Writer { inner }
    }

    pub fn write_record(&mut self, record: &Record) -> io::Result<()> {
        let mut line: Vec<u16> =
            Vec::with_capacity(MAGIC.len() + record.link.len() + record.target.len() + 16);
        line.extend_from_slice(&MAGIC);
        line.push(record.kind.code());
        line.push(SPACE);
        push_decimal(&mut line, record.link.len());
        line.push(SPACE);
        line.extend_from_slice(&record.link);
        line.push(SPACE);
        push_decimal(&mut line, record.target.len());
        line.push(SPACE);
        line.extend_from_slice(&record.target);
        line.push(NEWLINE);

        let mut bytes = Vec::with_capacity(line.len() * 2);
        for u in &line {
            bytes.extend_from_slice(&u.to_ne_bytes());
        }
        self.inner.write_all(&bytes)
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Streaming manifest reader.
pub struct Reader<R> {
    inner: R,
}

impl<R: Read> Reader<R> {
    pub fn new(inner: R) -> Self {
        Reader { inner }
    }

    /// Parses the next record. `Ok(None)` on a clean end of stream, i.e.
    /// when the stream ends exactly between records.
    pub fn read_record(&mut self) -> Result<Option<Record>, ParseError> {
        let first = match self.read_unit()? {
            None => return Ok(None),
            Some(u) => u,
        };
        if first != MAGIC[0] {
            return Err(ParseError::BadMagic);
        }
        for &expected in &MAGIC[1..] {
            if self.unit_or(ParseError::BadMagic)? != expected {
                return Err(ParseError::BadMagic);
            }
        }

        let kind = RecordKind::from_code(self.unit_or(ParseError::BadKind)?)
            .ok_or(ParseError::BadKind)?;
        if self.unit_or(ParseError::BadKind)? != SPACE {
            return Err(ParseError::BadKind);
        }

        let link = self.read_field()?;
        if self.unit_or(ParseError::MissingTerminator)? != SPACE {
            return Err(ParseError::MissingTerminator);
        }
        let target = self.read_field()?;
        if self.unit_or(ParseError::MissingTerminator)? != NEWLINE {
            return Err(ParseError::MissingTerminator);
        }
        Ok(Some(Record { kind, link, target }))
    }

    /// Decimal length, one space, then exactly that many units.
    fn read_field(&mut self) -> Result<Vec<u16>, ParseError> {
        let mut len: usize = 0;
        let mut digits = 0usize;
        let terminator = loop {
            let u = self.unit_or(ParseError::BadLength)?;
            if (b'0' as u16..=b'9' as u16).contains(&u) {
                len = len
                    .checked_mul(10)
                    .and_then(|l| l.checked_add(usize::from(u - b'0' as u16)))
                    .ok_or(ParseError::BadLength)?;
                digits += 1;
            } else {
                break u;
            }
        };
        if digits == 0 || len == 0 || terminator != SPACE {
            return Err(ParseError::BadLength);
        }
        let mut body = Vec::new();
        for _ in 0..len {
            body.push(self.unit_or(ParseError::ShortBody)?);
        }
        Ok(body)
    }

    fn unit_or(&mut self, missing: ParseError) -> Result<u16, ParseError> {
        self.read_unit()?.ok_or(missing)
    }

    /// One UTF-16 unit, or `None` at end of stream. A stray odd byte at the
    /// end counts as a short body.
    fn read_unit(&mut self) -> Result<Option<u16>, ParseError> {
        let mut buf = [0u8; 2];
        let mut got = 0;
        while got < 2 {
            match self.inner.read(&mut buf[got..])? {
                0 => break,
                n => got += n,
            }
        }
        match got {
            0 => Ok(None),
            2 => Ok(Some(u16::from_ne_bytes(buf))),
            _ => Err(ParseError::ShortBody),
        }
    }
}

fn push_decimal(out: &mut Vec<u16>, n: usize) {
    out.extend(n.to_string().bytes().map(u16::from));
}
