//! Ruby Marshal 4.8 writer.
//!
//! Only the subset needed by gem clients is supported: nil, booleans,
//! integers, UTF-8 strings, symbols, arrays, hashes and user-marshalled
//! objects (`Gem::Version`). Objects are never shared, so no object links are
//! emitted; symbols are deduplicated through the symbol table as Ruby does.

use flate2::Compression;
use flate2::write::GzEncoder;
use std::io::Write;

const MAJOR: u8 = 4;
const MINOR: u8 = 8;

/// Ruby Fixnum bounds as written by Marshal; larger values become Bignums.
const FIXNUM_MAX: i64 = (1 << 30) - 1;
const FIXNUM_MIN: i64 = -(1 << 30);

/// A value that can be dumped in Marshal format.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MarshalValue {
    Nil,
    Bool(bool),
    Int(i64),
    /// UTF-8 string (dumped with the `E` encoding ivar).
    String(String),
    Symbol(String),
    Array(Vec<MarshalValue>),
    Hash(Vec<(MarshalValue, MarshalValue)>),
    /// Object dumped through `marshal_dump` (`U` type).
    UserMarshal {
        class: String,
        data: Box<MarshalValue>,
    },
}

impl MarshalValue {
    pub fn string(value: impl Into<String>) -> Self {
        Self::String(value.into())
    }

    pub fn symbol(value: impl Into<String>) -> Self {
        Self::Symbol(value.into())
    }

    /// `Gem::Version.new(version)`, which dumps as `[version]`.
    pub fn gem_version(version: impl Into<String>) -> Self {
        Self::UserMarshal {
            class: "Gem::Version".to_string(),
            data: Box::new(Self::Array(vec![Self::string(version)])),
        }
    }

    /// Serialize with the 4.8 header.
    pub fn dump(&self) -> Vec<u8> {
        let mut writer = Writer::default();
        writer.out.extend_from_slice(&[MAJOR, MINOR]);
        writer.value(self);
        writer.out
    }
}

#[derive(Default)]
struct Writer {
    out: Vec<u8>,
    symbols: Vec<String>,
}

impl Writer {
    fn value(&mut self, value: &MarshalValue) {
        match value {
            MarshalValue::Nil => self.out.push(b'0'),
            MarshalValue::Bool(true) => self.out.push(b'T'),
            MarshalValue::Bool(false) => self.out.push(b'F'),
            MarshalValue::Int(n) if (FIXNUM_MIN..=FIXNUM_MAX).contains(n) => {
                self.out.push(b'i');
                self.long(*n);
            }
            MarshalValue::Int(n) => self.bignum(*n),
            MarshalValue::String(s) => {
                self.out.push(b'I');
                self.out.push(b'"');
                self.bytes(s.as_bytes());
                // one ivar: E => true (UTF-8)
                self.long(1);
                self.symbol("E");
                self.out.push(b'T');
            }
            MarshalValue::Symbol(s) => self.symbol(s),
            MarshalValue::Array(items) => {
                self.out.push(b'[');
                self.len(items.len());
                for item in items {
                    self.value(item);
                }
            }
            MarshalValue::Hash(pairs) => {
                self.out.push(b'{');
                self.len(pairs.len());
                for (key, value) in pairs {
                    self.value(key);
                    self.value(value);
                }
            }
            MarshalValue::UserMarshal { class, data } => {
                self.out.push(b'U');
                self.symbol(class);
                self.value(data);
            }
        }
    }

    fn symbol(&mut self, name: &str) {
        if let Some(index) = self.symbols.iter().position(|s| s == name) {
            self.out.push(b';');
            self.len(index);
        } else {
            self.out.push(b':');
            self.bytes(name.as_bytes());
            self.symbols.push(name.to_string());
        }
    }

    fn bytes(&mut self, bytes: &[u8]) {
        self.len(bytes.len());
        self.out.extend_from_slice(bytes);
    }

    fn len(&mut self, len: usize) {
        self.long(i64::try_from(len).unwrap_or(FIXNUM_MAX));
    }

    /// Marshal's variable-length integer (`w_long`).
    fn long(&mut self, n: i64) {
        match n {
            0 => self.out.push(0),
            1..=122 => self.out.push((n + 5) as u8),
            -123..=-1 => self.out.push(((n - 5) & 0xff) as u8),
            _ => {
                let mut buf = [0u8; 9];
                let mut rest = n;
                let mut used = 0;
                for (i, slot) in buf.iter_mut().enumerate().skip(1) {
                    *slot = (rest & 0xff) as u8;
                    rest >>= 8;
                    used = i;
                    if rest == 0 || rest == -1 {
                        break;
                    }
                }
                let used_len = used as i8;
                let signed_len = if rest == -1 { -used_len } else { used_len };
                buf[0] = signed_len as u8;
                self.out.extend_from_slice(&buf[..=used]);
            }
        }
    }

    fn bignum(&mut self, n: i64) {
        self.out.push(b'l');
        self.out.push(if n < 0 { b'-' } else { b'+' });
        let mut magnitude = n.unsigned_abs().to_le_bytes().to_vec();
        while magnitude.last() == Some(&0) {
            magnitude.pop();
        }
        if magnitude.len() % 2 == 1 {
            magnitude.push(0);
        }
        // length is counted in 16-bit words
        self.len(magnitude.len() / 2);
        self.out.extend_from_slice(&magnitude);
    }
}

/// Gzip a buffer (used for `*.4.8.gz` indexes).
pub fn gzip(data: &[u8]) -> crate::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| crate::Error::Serialization(format!("gzip failed: {e}")))?;
    encoder
        .finish()
        .map_err(|e| crate::Error::Serialization(format!("gzip failed: {e}")))
}
