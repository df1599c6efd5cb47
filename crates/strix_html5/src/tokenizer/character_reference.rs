use crate::errors::ParserError;
use crate::tokenizer::entity_trie::ENTITY_TRIE;
use crate::tokenizer::replacement_tables::TOKEN_REPLACEMENTS;
use crate::tokenizer::state::State;
use crate::tokenizer::{Tokenizer, CHAR_REPLACEMENT};
use strix_shared::byte_stream::ByteSource;
use strix_shared::byte_stream::Character::Ch;
use strix_shared::types::Result;

/// Longest entity name matched so far during a named character reference
pub(crate) struct EntityMatch {
    /// Length of the temporary buffer at match time, `&` included
    pub(crate) len: usize,
    /// The replacement code points for the matched name
    pub(crate) replacement: &'static str,
    /// Whether the matched name ends in a semicolon
    pub(crate) has_semicolon: bool,
}

impl<S: ByteSource> Tokenizer<'_, S> {
    /// 13.2.5.72 Character reference state. The `&` has been consumed by the
    /// return state; `return_state` is already set.
    pub(crate) fn character_reference_state(&mut self) -> Result<()> {
        self.temporary_buffer.clear();
        self.temporary_buffer.push('&');

        let c = self.read_char()?;
        match c {
            Ch(ch) if ch.is_ascii_alphanumeric() => {
                self.entity_node = ENTITY_TRIE.root().child(b'&');
                self.entity_items.clear();
                self.entity_match = None;

                self.reconsume();
                self.state = State::NamedCharacterReference;
            }
            Ch('#') => {
                self.temporary_buffer.push('#');
                self.state = State::NumericCharacterReference;
            }
            _ => {
                self.flush_temporary_buffer();
                self.reconsume();
                self.state = self.return_state;
            }
        }

        Ok(())
    }

    /// 13.2.5.73 Named character reference state. Greedily descends the
    /// entity trie, remembering the longest terminal passed on the way down.
    pub(crate) fn named_character_reference_state(&mut self) -> Result<()> {
        let c = self.read_char()?;

        if let Ch(ch) = c {
            if ch.is_ascii() {
                if let Some(node) = self.entity_node.and_then(|node| node.child(ch as u8)) {
                    self.temporary_buffer.push(ch);
                    self.entity_items.push(self.current_item);
                    self.entity_node = Some(node);

                    if let Some(replacement) = node.value() {
                        self.entity_match = Some(EntityMatch {
                            len: self.temporary_buffer.len(),
                            replacement,
                            has_semicolon: ch == ';',
                        });
                    }

                    return Ok(());
                }
            }
        }

        // The current character extends no entity name; resolve what we have
        self.entity_node = None;

        match self.entity_match.take() {
            Some(matched) => {
                // Characters consumed past the matched name go back to the
                // state machine, together with the current character
                let tail = self.entity_items.split_off(matched.len - 1);
                self.entity_items.clear();

                let next_char = tail.first().map_or(c, |item| item.ch);
                let blocks_expansion = matches!(
                    next_char,
                    Ch(next) if next == '=' || next.is_ascii_alphanumeric()
                );

                if !matched.has_semicolon
                    && self.return_state_is_attribute()
                    && blocks_expansion
                {
                    // Historical entities inside attribute values stay as
                    // written when more name-ish text follows
                    self.temporary_buffer.truncate(matched.len);
                    self.flush_temporary_buffer();
                } else {
                    if !matched.has_semicolon {
                        self.parse_error(ParserError::MissingSemicolonAfterCharacterReference);
                    }
                    self.temporary_buffer.clear();
                    self.temporary_buffer.push_str(matched.replacement);
                    self.flush_temporary_buffer();
                }

                self.replay(tail, true);
                self.state = self.return_state;
            }
            None => {
                self.flush_temporary_buffer();
                self.reconsume();
                self.state = State::AmbiguousAmpersand;
            }
        }

        Ok(())
    }

    /// 13.2.5.74 Ambiguous ampersand state
    pub(crate) fn ambiguous_ampersand_state(&mut self) -> Result<()> {
        let c = self.read_char()?;
        match c {
            Ch(ch) if ch.is_ascii_alphanumeric() => {
                if self.return_state_is_attribute() {
                    self.current_attr_value.push(ch);
                } else {
                    self.emit_char(ch);
                }
            }
            Ch(';') => {
                self.parse_error(ParserError::UnknownNamedCharacterReference);
                self.reconsume();
                self.state = self.return_state;
            }
            _ => {
                self.reconsume();
                self.state = self.return_state;
            }
        }

        Ok(())
    }

    /// 13.2.5.75 Numeric character reference state
    pub(crate) fn numeric_character_reference_state(&mut self) -> Result<()> {
        self.character_reference_code = Some(0);

        let c = self.read_char()?;
        match c {
            Ch(ch @ ('x' | 'X')) => {
                self.temporary_buffer.push(ch);
                self.state = State::HexadecimalCharacterReferenceStart;
            }
            _ => {
                self.reconsume();
                self.state = State::DecimalCharacterReferenceStart;
            }
        }

        Ok(())
    }

    /// 13.2.5.76 Hexadecimal character reference start state
    pub(crate) fn hexadecimal_character_reference_start_state(&mut self) -> Result<()> {
        let c = self.read_char()?;
        match c {
            Ch(ch) if ch.is_ascii_hexdigit() => {
                self.reconsume();
                self.state = State::HexadecimalCharacterReference;
            }
            _ => {
                self.parse_error(ParserError::AbsenceOfDigitsInNumericCharacterReference);
                self.flush_temporary_buffer();
                self.reconsume();
                self.state = self.return_state;
            }
        }

        Ok(())
    }

    /// 13.2.5.77 Decimal character reference start state
    pub(crate) fn decimal_character_reference_start_state(&mut self) -> Result<()> {
        let c = self.read_char()?;
        match c {
            Ch(ch) if ch.is_ascii_digit() => {
                self.reconsume();
                self.state = State::DecimalCharacterReference;
            }
            _ => {
                self.parse_error(ParserError::AbsenceOfDigitsInNumericCharacterReference);
                self.flush_temporary_buffer();
                self.reconsume();
                self.state = self.return_state;
            }
        }

        Ok(())
    }

    /// 13.2.5.78 Hexadecimal character reference state
    pub(crate) fn hexadecimal_character_reference_state(&mut self) -> Result<()> {
        let c = self.read_char()?;
        match c {
            Ch(ch @ '0'..='9') => self.accumulate_reference_code(16, u32::from(ch) - 0x30),
            Ch(ch @ 'A'..='F') => self.accumulate_reference_code(16, u32::from(ch) - 0x37),
            Ch(ch @ 'a'..='f') => self.accumulate_reference_code(16, u32::from(ch) - 0x57),
            Ch(';') => self.state = State::NumericCharacterReferenceEnd,
            _ => {
                self.parse_error(ParserError::MissingSemicolonAfterCharacterReference);
                self.reconsume();
                self.state = State::NumericCharacterReferenceEnd;
            }
        }

        Ok(())
    }

    /// 13.2.5.79 Decimal character reference state
    pub(crate) fn decimal_character_reference_state(&mut self) -> Result<()> {
        let c = self.read_char()?;
        match c {
            Ch(ch @ '0'..='9') => self.accumulate_reference_code(10, u32::from(ch) - 0x30),
            Ch(';') => self.state = State::NumericCharacterReferenceEnd,
            _ => {
                self.parse_error(ParserError::MissingSemicolonAfterCharacterReference);
                self.reconsume();
                self.state = State::NumericCharacterReferenceEnd;
            }
        }

        Ok(())
    }

    /// 13.2.5.80 Numeric character reference end state. Consumes no input;
    /// applies the value fixups and flushes the resulting code point.
    pub(crate) fn numeric_character_reference_end_state(&mut self) {
        let overflowed = self.character_reference_code.is_none();
        let mut code = self.character_reference_code.take().unwrap_or(0);

        if code == 0 && !overflowed {
            self.parse_error(ParserError::NullCharacterReference);
            code = CHAR_REPLACEMENT as u32;
        }

        if code > 0x10FFFF || overflowed {
            self.parse_error(ParserError::CharacterReferenceOutsideUnicodeRange);
            code = CHAR_REPLACEMENT as u32;
        }

        if self.is_surrogate(code) {
            self.parse_error(ParserError::SurrogateCharacterReference);
            code = CHAR_REPLACEMENT as u32;
        }

        if self.is_noncharacter(code) {
            // Noncharacters are reported but kept
            self.parse_error(ParserError::NoncharacterCharacterReference);
        }

        if code == 0x0D || self.is_control_char(code) {
            self.parse_error(ParserError::ControlCharacterReference);

            if let Some(replacement) = TOKEN_REPLACEMENTS.get(&code) {
                code = *replacement as u32;
            }
        }

        self.temporary_buffer.clear();
        self.temporary_buffer
            .push(char::from_u32(code).unwrap_or(CHAR_REPLACEMENT));
        self.flush_temporary_buffer();

        self.state = self.return_state;
    }

    fn accumulate_reference_code(&mut self, base: u32, digit: u32) {
        // Overflow sticks as None and resolves to out-of-range
        self.character_reference_code = self
            .character_reference_code
            .and_then(|value| value.checked_mul(base))
            .and_then(|value| value.checked_add(digit));
    }

    pub(crate) fn is_surrogate(&self, num: u32) -> bool {
        (0xD800..=0xDFFF).contains(&num)
    }

    pub(crate) fn is_noncharacter(&self, num: u32) -> bool {
        (0xFDD0..=0xFDEF).contains(&num)
            || [
                0xFFFE, 0xFFFF, 0x1FFFE, 0x1FFFF, 0x2FFFE, 0x2FFFF, 0x3FFFE, 0x3FFFF, 0x4FFFE,
                0x4FFFF, 0x5FFFE, 0x5FFFF, 0x6FFFE, 0x6FFFF, 0x7FFFE, 0x7FFFF, 0x8FFFE, 0x8FFFF,
                0x9FFFE, 0x9FFFF, 0xAFFFE, 0xAFFFF, 0xBFFFE, 0xBFFFF, 0xCFFFE, 0xCFFFF, 0xDFFFE,
                0xDFFFF, 0xEFFFE, 0xEFFFF, 0xFFFFE, 0xFFFFF, 0x10FFFE, 0x10FFFF,
            ]
            .contains(&num)
    }

    pub(crate) fn is_control_char(&self, num: u32) -> bool {
        // White spaces are ok
        if [0x0009, 0x000A, 0x000C, 0x000D, 0x0020].contains(&num) {
            return false;
        }

        (0x0001..=0x001F).contains(&num) || (0x007F..=0x009F).contains(&num)
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::ErrorLogger;
    use crate::tokenizer::token::Token;
    use crate::tokenizer::Tokenizer;
    use std::cell::RefCell;
    use std::rc::Rc;
    use strix_shared::byte_stream::InputStream;

    /// Runs the tokenizer over character data and concatenates the emitted
    /// character tokens.
    fn tokenize_text(input: &str) -> String {
        let mut stream = InputStream::from_str(input);
        let error_logger = Rc::new(RefCell::new(ErrorLogger::new()));
        let mut tokenizer = Tokenizer::new(&mut stream, None, error_logger.clone());

        let mut result = String::new();
        loop {
            match tokenizer.next_token().unwrap() {
                Token::Character(ch) => result.push(ch),
                Token::Eof { .. } => break,
                other => panic!("unexpected token {other:?}"),
            }
        }
        result
    }

    macro_rules! entity_tests {
        ($($name:ident : $value:expr)*) => {
            $(
                #[test]
                fn $name() {
                    let (input, expected) = $value;
                    assert_eq!(tokenize_text(input), expected);
                }
            )*
        }
    }

    entity_tests! {
        // Numbers
        entity_0: ("&#10;", "\n")
        entity_1: ("&#0;", "\u{FFFD}")
        entity_2: ("&#x0;", "\u{FFFD}")
        entity_3: ("&#xdeadbeef;", "\u{FFFD}")  // overflows out of range
        entity_4: ("&#xd888;", "\u{FFFD}")      // surrogate
        entity_5: ("&#xbeef;", "\u{BEEF}")
        entity_6: ("&#;", "&#;")
        entity_7: ("&;", "&;")
        entity_8: ("&", "&")
        entity_9: ("&#x0009;", "\t")
        entity_10: ("&#x80;", "\u{20AC}")
        entity_11: ("&#X8c;", "\u{0152}")
        entity_12: ("&#x8d;", "\u{8D}")         // no Windows-1252 remap
        entity_13: ("&#31;", "\u{1F}")
        entity_14: ("&#xD800;", "\u{FFFD}")
        entity_15: ("&#9999999;", "\u{FFFD}")
        entity_16: ("&#xFDD0;", "\u{FDD0}")     // noncharacter is kept
        entity_17: ("&#169X ", "\u{A9}X ")
        entity_18: ("&#xA9;", "\u{A9}")

        // Named references
        entity_100: ("&copy;", "\u{A9}")
        entity_101: ("&copyThing;", "\u{A9}Thing;")
        entity_102: ("&raquo;", "\u{BB}")
        entity_103: ("&not;", "\u{AC}")
        entity_104: ("&notit;", "\u{AC}it;")
        entity_105: ("&notin;", "\u{2209}")
        entity_106: ("&fo", "&fo")
        entity_107: ("&xxx", "&xxx")
        entity_108: ("&copy", "\u{A9}")
        entity_109: ("&copy ", "\u{A9} ")
        entity_110: ("&copya", "\u{A9}a")
        entity_111: ("&copy&", "\u{A9}&")
        entity_112: ("&COPY;", "\u{A9}")
        entity_113: ("&unknown;", "&unknown;")
        entity_114: ("&lt;", "<")
        entity_115: ("&amp;", "&")
        entity_116: ("&ampb", "&b")
        entity_117: ("&euro;", "\u{20AC}")
        entity_118: ("&quot;", "\"")
        entity_119: ("&minus;", "\u{2212}")
        entity_120: ("&NotEqualTilde;", "\u{2242}\u{338}")
    }

    #[test]
    fn unknown_reference_reports_on_semicolon() {
        use crate::errors::ParserError;

        let mut stream = InputStream::from_str("&unknown;");
        let error_logger = Rc::new(RefCell::new(ErrorLogger::new()));
        let mut tokenizer = Tokenizer::new(&mut stream, None, error_logger.clone());

        loop {
            if tokenizer.next_token().unwrap().is_eof() {
                break;
            }
        }

        let errors = error_logger.borrow().get_errors();
        assert!(errors
            .iter()
            .any(|e| e.error == ParserError::UnknownNamedCharacterReference));
    }

    #[test]
    fn missing_semicolon_is_reported() {
        use crate::errors::ParserError;

        let mut stream = InputStream::from_str("&copy");
        let error_logger = Rc::new(RefCell::new(ErrorLogger::new()));
        let mut tokenizer = Tokenizer::new(&mut stream, None, error_logger.clone());

        loop {
            if tokenizer.next_token().unwrap().is_eof() {
                break;
            }
        }

        let errors = error_logger.borrow().get_errors();
        assert!(errors
            .iter()
            .any(|e| e.error == ParserError::MissingSemicolonAfterCharacterReference));
    }
}
