use crate::types::{Error, Result};
use std::fmt::{self, Debug, Formatter};
use std::io::{ErrorKind, Read};

pub const CHAR_LF: char = '\u{000A}';
pub const CHAR_CR: char = '\u{000D}';

/// A pull source of raw bytes. The stream drains a source exactly once: after
/// the first `Ok(None)` it will not call `read_byte` again. An `Err` is fatal
/// and propagates out of every downstream call.
pub trait ByteSource {
    fn read_byte(&mut self) -> Result<Option<u8>>;
}

impl ByteSource for &[u8] {
    fn read_byte(&mut self) -> Result<Option<u8>> {
        match self.split_first() {
            Some((b, rest)) => {
                *self = rest;
                Ok(Some(*b))
            }
            None => Ok(None),
        }
    }
}

/// Adapts any [`std::io::Read`] into a [`ByteSource`].
pub struct ReaderSource<R: Read> {
    inner: R,
}

impl<R: Read> ReaderSource<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }
}

impl<R: Read> ByteSource for ReaderSource<R> {
    fn read_byte(&mut self) -> Result<Option<u8>> {
        let mut buf = [0u8; 1];
        loop {
            match self.inner.read(&mut buf) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(buf[0])),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::IO(e).into()),
            }
        }
    }
}

/// Defines a single character/element in the stream. Note that characters are
/// not the same as bytes, since a single character can span multiple bytes.
///
/// An undecodable byte sequence is a separate element: the tokenizer turns it
/// into U+FFFD and reports it, the stream only flags it. End of input is also
/// a separate element, so the state machine can match on it directly.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Character {
    /// Standard unicode scalar value
    Ch(char),
    /// Placeholder for a byte sequence that did not decode as UTF-8
    Invalid,
    /// The byte source is drained
    StreamEnd,
}

use Character::*;

/// Converts the given element to a char. Invalid and StreamEnd elements are
/// converted to 0x0000
impl From<Character> for char {
    fn from(c: Character) -> Self {
        match c {
            Ch(c) => c,
            Invalid | StreamEnd => 0x0000 as char,
        }
    }
}

impl fmt::Display for Character {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Ch(ch) => write!(f, "{ch}"),
            Invalid => write!(f, "U+FFFD"),
            StreamEnd => write!(f, "StreamEnd"),
        }
    }
}

impl Character {
    /// Returns true when the character is a whitespace
    pub fn is_whitespace(&self) -> bool {
        matches!(self, Ch(c) if c.is_whitespace())
    }

    /// Returns true when the character is a numerical
    pub fn is_numeric(&self) -> bool {
        matches!(self, Ch(c) if c.is_numeric())
    }
}

/// Location holds the position of a given element in the source
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Location {
    /// Line number, starting with 1
    pub line: usize,
    /// Column number, starting with 1
    pub column: usize,
    /// Count of source bytes consumed up to and including this element,
    /// starting with 1 for the first element
    pub offset: usize,
}

impl Default for Location {
    /// Default to line 1, column 1
    fn default() -> Self {
        Self::new(1, 1, 0)
    }
}

impl Location {
    /// Create a new Location
    pub fn new(line: usize, column: usize, offset: usize) -> Self {
        Self {
            line,
            column,
            offset,
        }
    }
}

impl Debug for Location {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "({}:{})", self.line, self.column)
    }
}

/// One element of the decoded stream together with where it came from.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InputItem {
    pub ch: Character,
    pub location: Location,
}

/// Decodes a [`ByteSource`] into a lazy sequence of code points.
///
/// Newlines are normalized on the way through: a CR becomes LF, and an LF
/// directly following a CR is consumed silently, so CR, LF and CRLF all
/// surface as a single LF. Decoding is strict UTF-8; an invalid sequence
/// surfaces as a single [`Character::Invalid`] element.
pub struct InputStream<S: ByteSource> {
    source: S,
    /// Byte handed back by the decoder when a sequence ended early
    pending: Option<u8>,
    /// Set after a CR was folded to LF, so a paired LF can be skipped
    last_was_cr: bool,
    /// True once the source reported end-of-stream
    ended: bool,
    line: usize,
    column: usize,
    offset: usize,
}

impl<S: ByteSource> InputStream<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            pending: None,
            last_was_cr: false,
            ended: false,
            line: 1,
            column: 1,
            offset: 0,
        }
    }

    /// Current position of the stream. After an item was produced this points
    /// one past it, which is where the next item will be placed.
    pub fn location(&self) -> Location {
        Location::new(self.line, self.column, self.offset)
    }

    /// Produces the next element. After the source is drained this keeps
    /// returning `StreamEnd` items and never touches the source again.
    pub fn next_item(&mut self) -> Result<InputItem> {
        loop {
            let Some(b) = self.next_byte()? else {
                return Ok(InputItem {
                    ch: StreamEnd,
                    location: self.location(),
                });
            };

            if self.last_was_cr {
                self.last_was_cr = false;
                if b == CHAR_LF as u8 {
                    // Second half of a CRLF pair; its byte is charged to the
                    // item that follows.
                    continue;
                }
            }

            if b == CHAR_CR as u8 {
                self.last_was_cr = true;
                return Ok(self.emit(CHAR_LF));
            }

            if b < 0x80 {
                return Ok(self.emit(b as char));
            }

            return self.decode_multibyte(b);
        }
    }

    /// Reads one byte, preferring a byte the decoder pushed back.
    fn next_byte(&mut self) -> Result<Option<u8>> {
        if let Some(b) = self.pending.take() {
            self.offset += 1;
            return Ok(Some(b));
        }

        if self.ended {
            return Ok(None);
        }

        match self.source.read_byte()? {
            Some(b) => {
                self.offset += 1;
                Ok(Some(b))
            }
            None => {
                self.ended = true;
                Ok(None)
            }
        }
    }

    fn push_back_byte(&mut self, b: u8) {
        self.pending = Some(b);
        self.offset -= 1;
    }

    /// Decodes the continuation of a multi-byte UTF-8 sequence. The lead byte
    /// has already been consumed.
    fn decode_multibyte(&mut self, lead: u8) -> Result<InputItem> {
        let width: usize = match lead {
            0xC2..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF4 => 4,
            // 0x80..=0xC1 (stray continuation or overlong lead) and
            // 0xF5..=0xFF can never start a valid sequence
            _ => return Ok(self.emit_invalid()),
        };

        let mut cp = match width {
            2 => u32::from(lead) & 0x1F,
            3 => u32::from(lead) & 0x0F,
            _ => u32::from(lead) & 0x07,
        };

        for _ in 1..width {
            match self.next_byte()? {
                Some(b) if b & 0xC0 == 0x80 => {
                    cp = (cp << 6) | (u32::from(b) & 0x3F);
                }
                Some(b) => {
                    // Not a continuation byte; it starts the next element
                    self.push_back_byte(b);
                    return Ok(self.emit_invalid());
                }
                None => return Ok(self.emit_invalid()),
            }
        }

        const MIN_FOR_WIDTH: [u32; 5] = [0, 0, 0x80, 0x800, 0x1_0000];
        if cp < MIN_FOR_WIDTH[width] {
            // Overlong encoding
            return Ok(self.emit_invalid());
        }

        // from_u32 rejects surrogates and anything above 0x10FFFF
        match char::from_u32(cp) {
            Some(c) => Ok(self.emit(c)),
            None => Ok(self.emit_invalid()),
        }
    }

    fn emit(&mut self, c: char) -> InputItem {
        let item = InputItem {
            ch: Ch(c),
            location: self.location(),
        };

        if c == CHAR_LF {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }

        item
    }

    fn emit_invalid(&mut self) -> InputItem {
        log::trace!(
            "invalid utf-8 sequence at {}:{}",
            self.line,
            self.column
        );

        let item = InputItem {
            ch: Invalid,
            location: self.location(),
        };
        self.column += 1;

        item
    }
}

impl<'a> InputStream<&'a [u8]> {
    /// Stream over an in-memory string
    pub fn from_str(s: &'a str) -> Self {
        Self::new(s.as_bytes())
    }

    /// Stream over an in-memory byte slice
    pub fn from_bytes(bytes: &'a [u8]) -> Self {
        Self::new(bytes)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn ch(stream: &mut InputStream<&[u8]>) -> Character {
        stream.next_item().unwrap().ch
    }

    #[test]
    fn test_stream() {
        let mut stream = InputStream::from_str("f👽f");
        assert_eq!(ch(&mut stream), Ch('f'));
        assert_eq!(ch(&mut stream), Ch('👽'));
        assert_eq!(ch(&mut stream), Ch('f'));
        assert!(matches!(ch(&mut stream), StreamEnd));
    }

    #[test]
    fn test_eof_is_idempotent() {
        let mut stream = InputStream::from_str("a");
        assert_eq!(ch(&mut stream), Ch('a'));
        assert!(matches!(ch(&mut stream), StreamEnd));
        assert!(matches!(ch(&mut stream), StreamEnd));
        assert!(matches!(ch(&mut stream), StreamEnd));
    }

    #[test]
    fn test_crlf() {
        let mut stream = InputStream::from_str("a\r\nb\nc\r\nd\r\r\n\ne");

        assert_eq!(ch(&mut stream), Ch('a'));
        assert_eq!(ch(&mut stream), Ch('\n'));
        assert_eq!(ch(&mut stream), Ch('b'));
        assert_eq!(ch(&mut stream), Ch('\n'));
        assert_eq!(ch(&mut stream), Ch('c'));
        assert_eq!(ch(&mut stream), Ch('\n'));
        assert_eq!(ch(&mut stream), Ch('d'));
        assert_eq!(ch(&mut stream), Ch('\n'));
        assert_eq!(ch(&mut stream), Ch('\n'));
        assert_eq!(ch(&mut stream), Ch('\n'));
        assert_eq!(ch(&mut stream), Ch('e'));
        assert!(matches!(ch(&mut stream), StreamEnd));
    }

    #[test]
    fn test_offsets() {
        let mut stream = InputStream::from_str("ab\ncd");

        let item = stream.next_item().unwrap();
        assert_eq!(item.ch, Ch('a'));
        assert_eq!(item.location, Location::new(1, 1, 1));

        let item = stream.next_item().unwrap();
        assert_eq!(item.ch, Ch('b'));
        assert_eq!(item.location, Location::new(1, 2, 2));

        let item = stream.next_item().unwrap();
        assert_eq!(item.ch, Ch('\n'));
        assert_eq!(item.location, Location::new(1, 3, 3));

        let item = stream.next_item().unwrap();
        assert_eq!(item.ch, Ch('c'));
        assert_eq!(item.location, Location::new(2, 1, 4));

        let item = stream.next_item().unwrap();
        assert_eq!(item.ch, Ch('d'));
        assert_eq!(item.location, Location::new(2, 2, 5));

        let item = stream.next_item().unwrap();
        assert_eq!(item.ch, StreamEnd);
        assert_eq!(item.location.offset, 5);
    }

    #[test]
    fn test_offsets_count_bytes_not_chars() {
        // 👽 is a 4-byte sequence
        let mut stream = InputStream::from_str("a👽b");

        let item = stream.next_item().unwrap();
        assert_eq!(item.location.offset, 1);
        let item = stream.next_item().unwrap();
        assert_eq!(item.ch, Ch('👽'));
        assert_eq!(item.location.offset, 5);
        let item = stream.next_item().unwrap();
        assert_eq!(item.location.offset, 6);
    }

    #[test]
    fn test_crlf_offsets() {
        let mut stream = InputStream::from_str("a\r\nb");

        let item = stream.next_item().unwrap();
        assert_eq!(item.ch, Ch('a'));
        assert_eq!(item.location.offset, 1);

        // The CR surfaces as LF, the paired LF byte is charged to 'b'
        let item = stream.next_item().unwrap();
        assert_eq!(item.ch, Ch('\n'));
        assert_eq!(item.location.offset, 2);

        let item = stream.next_item().unwrap();
        assert_eq!(item.ch, Ch('b'));
        assert_eq!(item.location, Location::new(2, 1, 4));
    }

    #[test]
    fn test_invalid_utf8() {
        // Stray continuation byte
        let mut stream = InputStream::from_bytes(b"a\x80b");
        assert_eq!(ch(&mut stream), Ch('a'));
        assert_eq!(ch(&mut stream), Invalid);
        assert_eq!(ch(&mut stream), Ch('b'));
        assert!(matches!(ch(&mut stream), StreamEnd));

        // Truncated sequence at end of input
        let mut stream = InputStream::from_bytes(b"a\xE2\x98");
        assert_eq!(ch(&mut stream), Ch('a'));
        assert_eq!(ch(&mut stream), Invalid);
        assert!(matches!(ch(&mut stream), StreamEnd));

        // Sequence interrupted by an ASCII byte; the byte is not lost
        let mut stream = InputStream::from_bytes(b"\xE2\x98x");
        assert_eq!(ch(&mut stream), Invalid);
        assert_eq!(ch(&mut stream), Ch('x'));

        // Overlong encoding of '/'
        let mut stream = InputStream::from_bytes(b"\xE0\x80\xAF");
        assert_eq!(ch(&mut stream), Invalid);
        assert!(matches!(ch(&mut stream), StreamEnd));

        // Encoded surrogate (U+D800)
        let mut stream = InputStream::from_bytes(b"\xED\xA0\x80");
        assert_eq!(ch(&mut stream), Invalid);

        // Lead byte above the UTF-8 range
        let mut stream = InputStream::from_bytes(b"\xFF");
        assert_eq!(ch(&mut stream), Invalid);
    }

    #[test]
    fn test_valid_boundaries() {
        let mut stream = InputStream::from_bytes("\u{7F}\u{80}\u{7FF}\u{800}\u{FFFD}\u{10000}\u{10FFFF}".as_bytes());
        assert_eq!(ch(&mut stream), Ch('\u{7F}'));
        assert_eq!(ch(&mut stream), Ch('\u{80}'));
        assert_eq!(ch(&mut stream), Ch('\u{7FF}'));
        assert_eq!(ch(&mut stream), Ch('\u{800}'));
        assert_eq!(ch(&mut stream), Ch('\u{FFFD}'));
        assert_eq!(ch(&mut stream), Ch('\u{10000}'));
        assert_eq!(ch(&mut stream), Ch('\u{10FFFF}'));
        assert!(matches!(ch(&mut stream), StreamEnd));
    }

    #[test]
    fn test_reader_source() {
        let data = b"ab\r\nc".to_vec();
        let mut stream = InputStream::new(ReaderSource::new(std::io::Cursor::new(data)));
        assert_eq!(stream.next_item().unwrap().ch, Ch('a'));
        assert_eq!(stream.next_item().unwrap().ch, Ch('b'));
        assert_eq!(stream.next_item().unwrap().ch, Ch('\n'));
        assert_eq!(stream.next_item().unwrap().ch, Ch('c'));
        assert!(matches!(stream.next_item().unwrap().ch, StreamEnd));
    }

    #[test]
    fn test_character() {
        let ch = Ch('a');
        assert_eq!(char::from(ch), 'a');
        assert_eq!(format!("{}", ch), "a");

        let ch = Ch('0');
        assert!(ch.is_numeric());
        let ch = Ch('b');
        assert!(!ch.is_numeric());
        let ch = Ch(' ');
        assert!(ch.is_whitespace());
        let ch = Ch('\t');
        assert!(ch.is_whitespace());
        assert!(!StreamEnd.is_whitespace());
    }
}
