pub mod state;
pub mod token;

mod character_reference;
pub mod entity_trie;
pub mod named_characters;
mod replacement_tables;

use self::character_reference::EntityMatch;
use crate::errors::{ErrorSink, ParserError};
use crate::tokenizer::entity_trie::EntityNode;
use crate::tokenizer::state::State;
use crate::tokenizer::token::{Attribute, Token};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use strix_shared::byte_stream::Character::{Ch, Invalid, StreamEnd};
use strix_shared::byte_stream::{ByteSource, Character, InputItem, InputStream, Location};
use strix_shared::types::Result;

/// Constants that are not directly captured as visible chars
pub const CHAR_NUL: char = '\u{0000}';
pub const CHAR_TAB: char = '\u{0009}';
pub const CHAR_LF: char = '\u{000A}';
pub const CHAR_FF: char = '\u{000C}';
pub const CHAR_SPACE: char = '\u{0020}';
pub const CHAR_REPLACEMENT: char = '\u{FFFD}';

/// Receives tokens in emission order. Returning an error halts the tokenizer
/// and propagates to the caller of [`Tokenizer::run`].
pub trait TokenSink {
    fn accept(&mut self, token: Token) -> Result<()>;
}

impl TokenSink for Vec<Token> {
    fn accept(&mut self, token: Token) -> Result<()> {
        self.push(token);
        Ok(())
    }
}

/// Options that can be passed to the tokenizer. Mostly needed when a tree
/// builder drives the machine, or when dealing with tests.
pub struct Options {
    /// Sets the initial state of the tokenizer. Normally only needed when dealing with tests
    pub initial_state: State,
    /// Sets the last starting tag in the tokenizer. Normally only needed when dealing with tests
    pub last_start_tag: String,
    /// Whether the adjusted current node sits in foreign content, which makes
    /// `<![CDATA[` open a real CDATA section instead of a bogus comment
    pub foreign_content: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            initial_state: State::Data,
            last_start_tag: String::new(),
            foreign_content: false,
        }
    }
}

/// Convert a character to lower case value (assumes character is in A-Z range)
macro_rules! to_lowercase {
    ($c:expr) => {
        // Converts A-Z to a-z
        ((($c) as u8) + 0x20) as char
    };
}

/// The tokenizer will read the input stream and emit tokens that can be used by the parser.
pub struct Tokenizer<'stream, S: ByteSource> {
    /// Code point input stream
    pub stream: &'stream mut InputStream<S>,
    /// Current state of the tokenizer
    pub state: State,
    /// The state to resume once a character reference completes
    pub return_state: State,
    /// Items handed back for reconsumption, in consumption order
    pushback: VecDeque<InputItem>,
    /// The item most recently handed to the state machine
    current_item: InputItem,
    /// Token that is currently in the making (if any)
    pub current_token: Option<Token>,
    /// Current attribute name that we need to store temporary in case we are parsing attributes
    current_attr_name: String,
    /// Current attribute value that we need to store temporary in case we are parsing attributes
    current_attr_value: String,
    /// Set when the current attribute name duplicates a stored one
    current_attr_dropped: bool,
    /// Temporary buffer
    pub temporary_buffer: String,
    /// Characters collected after `<!` while deciding what is being opened
    current_open_markup: String,
    /// The items behind `current_open_markup`, replayed on a mismatch
    open_markup_items: Vec<InputItem>,
    /// Characters collected after the DOCTYPE name (PUBLIC/SYSTEM keyword)
    after_doctype_string: String,
    /// The items behind `after_doctype_string`, replayed on a mismatch
    after_doctype_items: Vec<InputItem>,
    /// Trie cursor while a named character reference is being matched
    entity_node: Option<&'static EntityNode>,
    /// The items consumed while descending the entity trie
    entity_items: Vec<InputItem>,
    /// Longest entity name matched so far
    entity_match: Option<EntityMatch>,
    /// Accumulator for numeric character references; None after overflow
    character_reference_code: Option<u32>,
    /// Queue of emitted tokens. Needed because we can generate multiple tokens during iteration
    token_queue: VecDeque<Token>,
    /// The last emitted non-self-closing start tag name (or empty if none)
    pub last_start_token: String,
    /// Whether the adjusted current node is in foreign content
    pub foreign_content: bool,
    /// Set once the Eof token has been queued
    eof_emitted: bool,
    /// Error sink to report parse errors to
    error_sink: Rc<RefCell<dyn ErrorSink>>,
}

impl<'stream, S: ByteSource> Tokenizer<'stream, S> {
    /// Creates a new tokenizer with the given input stream and additional options if any
    pub fn new(
        stream: &'stream mut InputStream<S>,
        opts: Option<Options>,
        error_sink: Rc<RefCell<dyn ErrorSink>>,
    ) -> Self {
        let location = stream.location();

        Tokenizer {
            stream,
            state: opts.as_ref().map_or(State::Data, |o| o.initial_state),
            return_state: State::Data,
            pushback: VecDeque::new(),
            current_item: InputItem {
                ch: StreamEnd,
                location,
            },
            current_token: None,
            current_attr_name: String::new(),
            current_attr_value: String::new(),
            current_attr_dropped: false,
            temporary_buffer: String::new(),
            current_open_markup: String::with_capacity(7),
            open_markup_items: Vec::with_capacity(7),
            after_doctype_string: String::with_capacity(6),
            after_doctype_items: Vec::with_capacity(6),
            entity_node: None,
            entity_items: Vec::new(),
            entity_match: None,
            character_reference_code: None,
            token_queue: VecDeque::new(),
            last_start_token: opts
                .as_ref()
                .map_or(String::new(), |o| o.last_start_tag.clone()),
            foreign_content: opts.as_ref().is_some_and(|o| o.foreign_content),
            eof_emitted: false,
            error_sink,
        }
    }

    /// Returns the position of the item the state machine is looking at
    pub fn get_location(&self) -> Location {
        self.current_item.location
    }

    /// Retrieves the next token from the input stream, or `Token::Eof` once
    /// the end has been reached. After the first Eof the tokenizer halts and
    /// keeps answering Eof without touching the stream.
    pub fn next_token(&mut self) -> Result<Token> {
        if self.eof_emitted && self.token_queue.is_empty() {
            return Ok(Token::Eof {
                location: self.get_location(),
            });
        }

        while self.token_queue.is_empty() {
            self.step()?;
        }

        Ok(self.token_queue.pop_front().expect("token queue"))
    }

    /// Drives the tokenizer to completion, handing every token to the sink in
    /// emission order. Stops after the Eof token, or when the sink rejects a
    /// token.
    pub fn run(&mut self, sink: &mut impl TokenSink) -> Result<()> {
        loop {
            let token = self.next_token()?;
            let is_eof = token.is_eof();

            sink.accept(token)?;

            if is_eof {
                log::debug!("tokenization complete");
                return Ok(());
            }
        }
    }

    /// Runs the state machine for one dispatch: most states consume a single
    /// input item and may queue zero or more tokens.
    pub fn step(&mut self) -> Result<()> {
        match self.state {
            State::Data => {
                let c = self.read_char()?;
                match c {
                    Ch('&') => {
                        self.return_state = State::Data;
                        self.state = State::CharacterReference;
                    }
                    Ch('<') => self.state = State::TagOpen,
                    Ch(CHAR_NUL) => {
                        self.parse_error(ParserError::UnexpectedNullCharacter);
                        self.emit_char(CHAR_NUL);
                    }
                    StreamEnd => self.emit_eof(),
                    _ => self.emit_char(c.into()),
                }
            }
            State::RCDATA => {
                let c = self.read_char()?;
                match c {
                    Ch('&') => {
                        self.return_state = State::RCDATA;
                        self.state = State::CharacterReference;
                    }
                    Ch('<') => self.state = State::RCDATALessThanSign,
                    Ch(CHAR_NUL) => {
                        self.parse_error(ParserError::UnexpectedNullCharacter);
                        self.emit_char(CHAR_REPLACEMENT);
                    }
                    StreamEnd => self.emit_eof(),
                    _ => self.emit_char(c.into()),
                }
            }
            State::RAWTEXT => {
                let c = self.read_char()?;
                match c {
                    Ch('<') => self.state = State::RAWTEXTLessThanSign,
                    Ch(CHAR_NUL) => {
                        self.parse_error(ParserError::UnexpectedNullCharacter);
                        self.emit_char(CHAR_REPLACEMENT);
                    }
                    StreamEnd => self.emit_eof(),
                    _ => self.emit_char(c.into()),
                }
            }
            State::ScriptData => {
                let c = self.read_char()?;
                match c {
                    Ch('<') => self.state = State::ScriptDataLessThanSign,
                    Ch(CHAR_NUL) => {
                        self.parse_error(ParserError::UnexpectedNullCharacter);
                        self.emit_char(CHAR_REPLACEMENT);
                    }
                    StreamEnd => self.emit_eof(),
                    _ => self.emit_char(c.into()),
                }
            }
            State::PLAINTEXT => {
                let c = self.read_char()?;
                match c {
                    Ch(CHAR_NUL) => {
                        self.parse_error(ParserError::UnexpectedNullCharacter);
                        self.emit_char(CHAR_REPLACEMENT);
                    }
                    StreamEnd => self.emit_eof(),
                    _ => self.emit_char(c.into()),
                }
            }
            State::TagOpen => {
                let c = self.read_char()?;
                match c {
                    Ch('!') => {
                        self.current_open_markup.clear();
                        self.open_markup_items.clear();
                        self.state = State::MarkupDeclarationOpen;
                    }
                    Ch('/') => self.state = State::EndTagOpen,
                    Ch(ch) if ch.is_ascii_alphabetic() => {
                        self.current_token = Some(Token::StartTag {
                            name: String::new(),
                            is_self_closing: false,
                            attributes: Vec::new(),
                        });
                        self.reconsume();
                        self.state = State::TagName;
                    }
                    Ch('?') => {
                        self.parse_error(ParserError::UnexpectedQuestionMarkInsteadOfTagName);
                        self.current_token = Some(Token::Comment(String::new()));
                        self.reconsume();
                        self.state = State::BogusComment;
                    }
                    StreamEnd => {
                        self.parse_error(ParserError::EofBeforeTagName);
                        self.emit_char('<');
                        self.state = State::Data;
                    }
                    _ => {
                        self.parse_error(ParserError::InvalidFirstCharacterOfTagName);
                        self.emit_char('<');
                        self.reconsume();
                        self.state = State::Data;
                    }
                }
            }
            State::EndTagOpen => {
                let c = self.read_char()?;
                match c {
                    Ch(ch) if ch.is_ascii_alphabetic() => {
                        self.current_token = Some(Token::EndTag {
                            name: String::new(),
                            is_self_closing: false,
                            attributes: Vec::new(),
                        });
                        self.reconsume();
                        self.state = State::TagName;
                    }
                    Ch('>') => {
                        self.parse_error(ParserError::MissingEndTagName);
                        self.state = State::Data;
                    }
                    StreamEnd => {
                        self.parse_error(ParserError::EofBeforeTagName);
                        self.emit_char('<');
                        self.emit_char('/');
                        self.state = State::Data;
                    }
                    _ => {
                        self.parse_error(ParserError::InvalidFirstCharacterOfTagName);
                        self.current_token = Some(Token::Comment(String::new()));
                        self.reconsume();
                        self.state = State::BogusComment;
                    }
                }
            }
            State::TagName => {
                let c = self.read_char()?;
                match c {
                    Ch(CHAR_TAB | CHAR_LF | CHAR_FF | CHAR_SPACE) => {
                        self.state = State::BeforeAttributeName;
                    }
                    Ch('/') => self.state = State::SelfClosingStart,
                    Ch('>') => {
                        self.emit_current_token();
                        self.state = State::Data;
                    }
                    Ch(ch @ 'A'..='Z') => self.add_to_token_name(to_lowercase!(ch)),
                    Ch(CHAR_NUL) => {
                        self.parse_error(ParserError::UnexpectedNullCharacter);
                        self.add_to_token_name(CHAR_REPLACEMENT);
                    }
                    StreamEnd => {
                        self.parse_error(ParserError::EofInTag);
                        self.state = State::Data;
                    }
                    _ => self.add_to_token_name(c.into()),
                }
            }
            State::RCDATALessThanSign => {
                let c = self.read_char()?;
                match c {
                    Ch('/') => {
                        self.temporary_buffer.clear();
                        self.state = State::RCDATAEndTagOpen;
                    }
                    _ => {
                        self.emit_char('<');
                        self.reconsume();
                        self.state = State::RCDATA;
                    }
                }
            }
            State::RCDATAEndTagOpen => {
                let c = self.read_char()?;
                match c {
                    Ch(ch) if ch.is_ascii_alphabetic() => {
                        self.current_token = Some(Token::EndTag {
                            name: String::new(),
                            is_self_closing: false,
                            attributes: Vec::new(),
                        });
                        self.reconsume();
                        self.state = State::RCDATAEndTagName;
                    }
                    _ => {
                        self.emit_char('<');
                        self.emit_char('/');
                        self.reconsume();
                        self.state = State::RCDATA;
                    }
                }
            }
            State::RCDATAEndTagName => self.end_tag_name_state(State::RCDATA)?,
            State::RAWTEXTLessThanSign => {
                let c = self.read_char()?;
                match c {
                    Ch('/') => {
                        self.temporary_buffer.clear();
                        self.state = State::RAWTEXTEndTagOpen;
                    }
                    _ => {
                        self.emit_char('<');
                        self.reconsume();
                        self.state = State::RAWTEXT;
                    }
                }
            }
            State::RAWTEXTEndTagOpen => {
                let c = self.read_char()?;
                match c {
                    Ch(ch) if ch.is_ascii_alphabetic() => {
                        self.current_token = Some(Token::EndTag {
                            name: String::new(),
                            is_self_closing: false,
                            attributes: Vec::new(),
                        });
                        self.reconsume();
                        self.state = State::RAWTEXTEndTagName;
                    }
                    _ => {
                        self.emit_char('<');
                        self.emit_char('/');
                        self.reconsume();
                        self.state = State::RAWTEXT;
                    }
                }
            }
            State::RAWTEXTEndTagName => self.end_tag_name_state(State::RAWTEXT)?,
            State::ScriptDataLessThanSign => {
                let c = self.read_char()?;
                match c {
                    Ch('/') => {
                        self.temporary_buffer.clear();
                        self.state = State::ScriptDataEndTagOpen;
                    }
                    Ch('!') => {
                        self.emit_char('<');
                        self.emit_char('!');
                        self.state = State::ScriptDataEscapeStart;
                    }
                    _ => {
                        self.emit_char('<');
                        self.reconsume();
                        self.state = State::ScriptData;
                    }
                }
            }
            State::ScriptDataEndTagOpen => {
                let c = self.read_char()?;
                match c {
                    Ch(ch) if ch.is_ascii_alphabetic() => {
                        self.current_token = Some(Token::EndTag {
                            name: String::new(),
                            is_self_closing: false,
                            attributes: Vec::new(),
                        });
                        self.reconsume();
                        self.state = State::ScriptDataEndTagName;
                    }
                    _ => {
                        self.emit_char('<');
                        self.emit_char('/');
                        self.reconsume();
                        self.state = State::ScriptData;
                    }
                }
            }
            State::ScriptDataEndTagName => self.end_tag_name_state(State::ScriptData)?,
            State::ScriptDataEscapeStart => {
                let c = self.read_char()?;
                match c {
                    Ch('-') => {
                        self.emit_char('-');
                        self.state = State::ScriptDataEscapeStartDash;
                    }
                    _ => {
                        self.reconsume();
                        self.state = State::ScriptData;
                    }
                }
            }
            State::ScriptDataEscapeStartDash => {
                let c = self.read_char()?;
                match c {
                    Ch('-') => {
                        self.emit_char('-');
                        self.state = State::ScriptDataEscapedDashDash;
                    }
                    _ => {
                        self.reconsume();
                        self.state = State::ScriptData;
                    }
                }
            }
            State::ScriptDataEscaped => {
                let c = self.read_char()?;
                match c {
                    Ch('-') => {
                        self.emit_char('-');
                        self.state = State::ScriptDataEscapedDash;
                    }
                    Ch('<') => self.state = State::ScriptDataEscapedLessThanSign,
                    Ch(CHAR_NUL) => {
                        self.parse_error(ParserError::UnexpectedNullCharacter);
                        self.emit_char(CHAR_REPLACEMENT);
                    }
                    StreamEnd => {
                        self.parse_error(ParserError::EofInScriptHtmlCommentLikeText);
                        self.state = State::Data;
                    }
                    _ => self.emit_char(c.into()),
                }
            }
            State::ScriptDataEscapedDash => {
                let c = self.read_char()?;
                match c {
                    Ch('-') => {
                        self.emit_char('-');
                        self.state = State::ScriptDataEscapedDashDash;
                    }
                    Ch('<') => self.state = State::ScriptDataEscapedLessThanSign,
                    Ch(CHAR_NUL) => {
                        self.parse_error(ParserError::UnexpectedNullCharacter);
                        self.emit_char(CHAR_REPLACEMENT);
                        self.state = State::ScriptDataEscaped;
                    }
                    StreamEnd => {
                        self.parse_error(ParserError::EofInScriptHtmlCommentLikeText);
                        self.state = State::Data;
                    }
                    _ => {
                        self.emit_char(c.into());
                        self.state = State::ScriptDataEscaped;
                    }
                }
            }
            State::ScriptDataEscapedDashDash => {
                let c = self.read_char()?;
                match c {
                    Ch('-') => self.emit_char('-'),
                    Ch('<') => self.state = State::ScriptDataEscapedLessThanSign,
                    Ch('>') => {
                        self.emit_char('>');
                        self.state = State::ScriptData;
                    }
                    Ch(CHAR_NUL) => {
                        self.parse_error(ParserError::UnexpectedNullCharacter);
                        self.emit_char(CHAR_REPLACEMENT);
                        self.state = State::ScriptDataEscaped;
                    }
                    StreamEnd => {
                        self.parse_error(ParserError::EofInScriptHtmlCommentLikeText);
                        self.state = State::Data;
                    }
                    _ => {
                        self.emit_char(c.into());
                        self.state = State::ScriptDataEscaped;
                    }
                }
            }
            State::ScriptDataEscapedLessThanSign => {
                let c = self.read_char()?;
                match c {
                    Ch('/') => {
                        self.temporary_buffer.clear();
                        self.state = State::ScriptDataEscapedEndTagOpen;
                    }
                    Ch(ch) if ch.is_ascii_alphabetic() => {
                        self.temporary_buffer.clear();
                        self.emit_char('<');
                        self.reconsume();
                        self.state = State::ScriptDataDoubleEscapeStart;
                    }
                    _ => {
                        self.emit_char('<');
                        self.reconsume();
                        self.state = State::ScriptDataEscaped;
                    }
                }
            }
            State::ScriptDataEscapedEndTagOpen => {
                let c = self.read_char()?;
                match c {
                    Ch(ch) if ch.is_ascii_alphabetic() => {
                        self.current_token = Some(Token::EndTag {
                            name: String::new(),
                            is_self_closing: false,
                            attributes: Vec::new(),
                        });
                        self.reconsume();
                        self.state = State::ScriptDataEscapedEndTagName;
                    }
                    _ => {
                        self.emit_char('<');
                        self.emit_char('/');
                        self.reconsume();
                        self.state = State::ScriptDataEscaped;
                    }
                }
            }
            State::ScriptDataEscapedEndTagName => {
                self.end_tag_name_state(State::ScriptDataEscaped)?;
            }
            State::ScriptDataDoubleEscapeStart => {
                let c = self.read_char()?;
                match c {
                    Ch(CHAR_TAB | CHAR_LF | CHAR_FF | CHAR_SPACE | '/' | '>') => {
                        if self.temporary_buffer == "script" {
                            self.state = State::ScriptDataDoubleEscaped;
                        } else {
                            self.state = State::ScriptDataEscaped;
                        }
                        self.emit_char(c.into());
                    }
                    Ch(ch @ 'A'..='Z') => {
                        self.temporary_buffer.push(to_lowercase!(ch));
                        self.emit_char(ch);
                    }
                    Ch(ch @ 'a'..='z') => {
                        self.temporary_buffer.push(ch);
                        self.emit_char(ch);
                    }
                    _ => {
                        self.reconsume();
                        self.state = State::ScriptDataEscaped;
                    }
                }
            }
            State::ScriptDataDoubleEscaped => {
                let c = self.read_char()?;
                match c {
                    Ch('-') => {
                        self.emit_char('-');
                        self.state = State::ScriptDataDoubleEscapedDash;
                    }
                    Ch('<') => {
                        self.emit_char('<');
                        self.state = State::ScriptDataDoubleEscapedLessThanSign;
                    }
                    Ch(CHAR_NUL) => {
                        self.parse_error(ParserError::UnexpectedNullCharacter);
                        self.emit_char(CHAR_REPLACEMENT);
                    }
                    StreamEnd => {
                        self.parse_error(ParserError::EofInScriptHtmlCommentLikeText);
                        self.state = State::Data;
                    }
                    _ => self.emit_char(c.into()),
                }
            }
            State::ScriptDataDoubleEscapedDash => {
                let c = self.read_char()?;
                match c {
                    Ch('-') => {
                        self.emit_char('-');
                        self.state = State::ScriptDataDoubleEscapedDashDash;
                    }
                    Ch('<') => {
                        self.emit_char('<');
                        self.state = State::ScriptDataDoubleEscapedLessThanSign;
                    }
                    Ch(CHAR_NUL) => {
                        self.parse_error(ParserError::UnexpectedNullCharacter);
                        self.emit_char(CHAR_REPLACEMENT);
                        self.state = State::ScriptDataDoubleEscaped;
                    }
                    StreamEnd => {
                        self.parse_error(ParserError::EofInScriptHtmlCommentLikeText);
                        self.state = State::Data;
                    }
                    _ => {
                        self.emit_char(c.into());
                        self.state = State::ScriptDataDoubleEscaped;
                    }
                }
            }
            State::ScriptDataDoubleEscapedDashDash => {
                let c = self.read_char()?;
                match c {
                    Ch('-') => self.emit_char('-'),
                    Ch('<') => {
                        self.emit_char('<');
                        self.state = State::ScriptDataDoubleEscapedLessThanSign;
                    }
                    Ch('>') => {
                        self.emit_char('>');
                        self.state = State::ScriptData;
                    }
                    Ch(CHAR_NUL) => {
                        self.parse_error(ParserError::UnexpectedNullCharacter);
                        self.emit_char(CHAR_REPLACEMENT);
                        self.state = State::ScriptDataDoubleEscaped;
                    }
                    StreamEnd => {
                        self.parse_error(ParserError::EofInScriptHtmlCommentLikeText);
                        self.state = State::Data;
                    }
                    _ => {
                        self.emit_char(c.into());
                        self.state = State::ScriptDataDoubleEscaped;
                    }
                }
            }
            State::ScriptDataDoubleEscapedLessThanSign => {
                let c = self.read_char()?;
                match c {
                    Ch('/') => {
                        self.temporary_buffer.clear();
                        self.emit_char('/');
                        self.state = State::ScriptDataDoubleEscapeEnd;
                    }
                    _ => {
                        self.reconsume();
                        self.state = State::ScriptDataDoubleEscaped;
                    }
                }
            }
            State::ScriptDataDoubleEscapeEnd => {
                let c = self.read_char()?;
                match c {
                    Ch(CHAR_TAB | CHAR_LF | CHAR_FF | CHAR_SPACE | '/' | '>') => {
                        if self.temporary_buffer == "script" {
                            self.state = State::ScriptDataEscaped;
                        } else {
                            self.state = State::ScriptDataDoubleEscaped;
                        }
                        self.emit_char(c.into());
                    }
                    Ch(ch @ 'A'..='Z') => {
                        self.temporary_buffer.push(to_lowercase!(ch));
                        self.emit_char(ch);
                    }
                    Ch(ch @ 'a'..='z') => {
                        self.temporary_buffer.push(ch);
                        self.emit_char(ch);
                    }
                    _ => {
                        self.reconsume();
                        self.state = State::ScriptDataDoubleEscaped;
                    }
                }
            }
            State::BeforeAttributeName => {
                let c = self.read_char()?;
                match c {
                    Ch(CHAR_TAB | CHAR_LF | CHAR_FF | CHAR_SPACE) => {
                        // Ignore character
                    }
                    Ch('/' | '>') | StreamEnd => {
                        self.reconsume();
                        self.state = State::AfterAttributeName;
                    }
                    Ch('=') => {
                        self.parse_error(ParserError::UnexpectedEqualsSignBeforeAttributeName);
                        self.store_and_clear_current_attribute();
                        self.current_attr_name.push('=');
                        self.state = State::AttributeName;
                    }
                    _ => {
                        // Store an existing attribute if any and start a new one
                        self.store_and_clear_current_attribute();
                        self.reconsume();
                        self.state = State::AttributeName;
                    }
                }
            }
            State::AttributeName => {
                let c = self.read_char()?;
                match c {
                    Ch(CHAR_TAB | CHAR_LF | CHAR_FF | CHAR_SPACE | '/' | '>') | StreamEnd => {
                        self.finish_attribute_name();
                        self.reconsume();
                        self.state = State::AfterAttributeName;
                    }
                    Ch('=') => {
                        self.finish_attribute_name();
                        self.state = State::BeforeAttributeValue;
                    }
                    Ch(ch @ 'A'..='Z') => self.current_attr_name.push(to_lowercase!(ch)),
                    Ch(CHAR_NUL) => {
                        self.parse_error(ParserError::UnexpectedNullCharacter);
                        self.current_attr_name.push(CHAR_REPLACEMENT);
                    }
                    Ch(ch @ ('"' | '\'' | '<')) => {
                        self.parse_error(ParserError::UnexpectedCharacterInAttributeName);
                        self.current_attr_name.push(ch);
                    }
                    _ => self.current_attr_name.push(c.into()),
                }
            }
            State::AfterAttributeName => {
                let c = self.read_char()?;
                match c {
                    Ch(CHAR_TAB | CHAR_LF | CHAR_FF | CHAR_SPACE) => {
                        // Ignore
                    }
                    Ch('/') => self.state = State::SelfClosingStart,
                    Ch('=') => self.state = State::BeforeAttributeValue,
                    Ch('>') => {
                        self.store_and_clear_current_attribute();
                        self.emit_current_token();
                        self.state = State::Data;
                    }
                    StreamEnd => {
                        self.parse_error(ParserError::EofInTag);
                        self.state = State::Data;
                    }
                    _ => {
                        self.store_and_clear_current_attribute();
                        self.reconsume();
                        self.state = State::AttributeName;
                    }
                }
            }
            State::BeforeAttributeValue => {
                let c = self.read_char()?;
                match c {
                    Ch(CHAR_TAB | CHAR_LF | CHAR_FF | CHAR_SPACE) => {
                        // Ignore
                    }
                    Ch('"') => self.state = State::AttributeValueDoubleQuoted,
                    Ch('\'') => self.state = State::AttributeValueSingleQuoted,
                    Ch('>') => {
                        self.parse_error(ParserError::MissingAttributeValue);
                        self.store_and_clear_current_attribute();
                        self.emit_current_token();
                        self.state = State::Data;
                    }
                    _ => {
                        self.reconsume();
                        self.state = State::AttributeValueUnquoted;
                    }
                }
            }
            State::AttributeValueDoubleQuoted => {
                let c = self.read_char()?;
                match c {
                    Ch('"') => self.state = State::AfterAttributeValueQuoted,
                    Ch('&') => {
                        self.return_state = State::AttributeValueDoubleQuoted;
                        self.state = State::CharacterReference;
                    }
                    Ch(CHAR_NUL) => {
                        self.parse_error(ParserError::UnexpectedNullCharacter);
                        self.current_attr_value.push(CHAR_REPLACEMENT);
                    }
                    StreamEnd => {
                        self.parse_error(ParserError::EofInTag);
                        self.state = State::Data;
                    }
                    _ => self.current_attr_value.push(c.into()),
                }
            }
            State::AttributeValueSingleQuoted => {
                let c = self.read_char()?;
                match c {
                    Ch('\'') => self.state = State::AfterAttributeValueQuoted,
                    Ch('&') => {
                        self.return_state = State::AttributeValueSingleQuoted;
                        self.state = State::CharacterReference;
                    }
                    Ch(CHAR_NUL) => {
                        self.parse_error(ParserError::UnexpectedNullCharacter);
                        self.current_attr_value.push(CHAR_REPLACEMENT);
                    }
                    StreamEnd => {
                        self.parse_error(ParserError::EofInTag);
                        self.state = State::Data;
                    }
                    _ => self.current_attr_value.push(c.into()),
                }
            }
            State::AttributeValueUnquoted => {
                let c = self.read_char()?;
                match c {
                    Ch(CHAR_TAB | CHAR_LF | CHAR_FF | CHAR_SPACE) => {
                        self.state = State::BeforeAttributeName;
                    }
                    Ch('&') => {
                        self.return_state = State::AttributeValueUnquoted;
                        self.state = State::CharacterReference;
                    }
                    Ch('>') => {
                        self.store_and_clear_current_attribute();
                        self.emit_current_token();
                        self.state = State::Data;
                    }
                    Ch(CHAR_NUL) => {
                        self.parse_error(ParserError::UnexpectedNullCharacter);
                        self.current_attr_value.push(CHAR_REPLACEMENT);
                    }
                    Ch(ch @ ('"' | '\'' | '<' | '=' | '`')) => {
                        self.parse_error(ParserError::UnexpectedCharacterInUnquotedAttributeValue);
                        self.current_attr_value.push(ch);
                    }
                    StreamEnd => {
                        self.parse_error(ParserError::EofInTag);
                        self.state = State::Data;
                    }
                    _ => self.current_attr_value.push(c.into()),
                }
            }
            State::AfterAttributeValueQuoted => {
                let c = self.read_char()?;
                match c {
                    Ch(CHAR_TAB | CHAR_LF | CHAR_FF | CHAR_SPACE) => {
                        self.state = State::BeforeAttributeName;
                    }
                    Ch('/') => self.state = State::SelfClosingStart,
                    Ch('>') => {
                        self.store_and_clear_current_attribute();
                        self.emit_current_token();
                        self.state = State::Data;
                    }
                    StreamEnd => {
                        self.parse_error(ParserError::EofInTag);
                        self.state = State::Data;
                    }
                    _ => {
                        self.parse_error(ParserError::MissingWhitespaceBetweenAttributes);
                        self.reconsume();
                        self.state = State::BeforeAttributeName;
                    }
                }
            }
            State::SelfClosingStart => {
                let c = self.read_char()?;
                match c {
                    Ch('>') => {
                        self.set_self_closing();
                        self.store_and_clear_current_attribute();
                        self.emit_current_token();
                        self.state = State::Data;
                    }
                    StreamEnd => {
                        self.parse_error(ParserError::EofInTag);
                        self.state = State::Data;
                    }
                    _ => {
                        self.parse_error(ParserError::UnexpectedSolidusInTag);
                        self.reconsume();
                        self.state = State::BeforeAttributeName;
                    }
                }
            }
            State::BogusComment => {
                let c = self.read_char()?;
                match c {
                    Ch('>') => {
                        self.emit_current_token();
                        self.state = State::Data;
                    }
                    StreamEnd => {
                        self.emit_current_token();
                        self.state = State::Data;
                    }
                    Ch(CHAR_NUL) => {
                        self.parse_error(ParserError::UnexpectedNullCharacter);
                        self.add_to_token_value(CHAR_REPLACEMENT);
                    }
                    _ => self.add_to_token_value(c.into()),
                }
            }
            State::MarkupDeclarationOpen => {
                let c = self.read_char()?;
                match c {
                    Ch(ch) => {
                        self.current_open_markup.push(ch);
                        self.open_markup_items.push(self.current_item);

                        if self.current_open_markup == "--" {
                            self.current_open_markup.clear();
                            self.open_markup_items.clear();
                            self.current_token = Some(Token::Comment(String::new()));
                            self.state = State::CommentStart;
                        } else if self.current_open_markup.eq_ignore_ascii_case("DOCTYPE") {
                            self.current_open_markup.clear();
                            self.open_markup_items.clear();
                            self.state = State::DOCTYPE;
                        } else if self.current_open_markup == "[CDATA[" {
                            self.current_open_markup.clear();
                            self.open_markup_items.clear();
                            if self.foreign_content {
                                self.state = State::CDATASection;
                            } else {
                                self.parse_error(ParserError::CdataInHtmlContent);
                                self.current_token = Some(Token::Comment("[CDATA[".into()));
                                self.state = State::BogusComment;
                            }
                        } else if is_keyword_prefix(&self.current_open_markup, "DOCTYPE")
                            || "--".starts_with(self.current_open_markup.as_str())
                            || "[CDATA[".starts_with(self.current_open_markup.as_str())
                        {
                            // Still deciding; keep collecting
                        } else {
                            self.parse_error(ParserError::IncorrectlyOpenedComment);
                            self.current_token = Some(Token::Comment(String::new()));
                            self.state = State::CommentStart;

                            let items = std::mem::take(&mut self.open_markup_items);
                            self.current_open_markup.clear();
                            self.replay(items, false);
                        }
                    }
                    _ => {
                        self.parse_error(ParserError::IncorrectlyOpenedComment);
                        self.current_token = Some(Token::Comment(String::new()));
                        self.state = State::CommentStart;

                        let items = std::mem::take(&mut self.open_markup_items);
                        self.current_open_markup.clear();
                        self.replay(items, true);
                    }
                }
            }
            State::CommentStart => {
                let c = self.read_char()?;
                match c {
                    Ch('-') => self.state = State::CommentStartDash,
                    Ch('>') => {
                        self.parse_error(ParserError::AbruptClosingOfEmptyComment);
                        self.emit_current_token();
                        self.state = State::Data;
                    }
                    _ => {
                        self.reconsume();
                        self.state = State::Comment;
                    }
                }
            }
            State::CommentStartDash => {
                let c = self.read_char()?;
                match c {
                    Ch('-') => self.state = State::CommentEnd,
                    Ch('>') => {
                        self.parse_error(ParserError::AbruptClosingOfEmptyComment);
                        self.emit_current_token();
                        self.state = State::Data;
                    }
                    StreamEnd => {
                        self.parse_error(ParserError::EofInComment);
                        self.emit_current_token();
                        self.state = State::Data;
                    }
                    _ => {
                        self.add_to_token_value('-');
                        self.reconsume();
                        self.state = State::Comment;
                    }
                }
            }
            State::Comment => {
                let c = self.read_char()?;
                match c {
                    Ch('<') => {
                        self.add_to_token_value('<');
                        self.state = State::CommentLessThanSign;
                    }
                    Ch('-') => self.state = State::CommentEndDash,
                    Ch(CHAR_NUL) => {
                        self.parse_error(ParserError::UnexpectedNullCharacter);
                        self.add_to_token_value(CHAR_REPLACEMENT);
                    }
                    StreamEnd => {
                        self.parse_error(ParserError::EofInComment);
                        self.emit_current_token();
                        self.state = State::Data;
                    }
                    _ => self.add_to_token_value(c.into()),
                }
            }
            State::CommentLessThanSign => {
                let c = self.read_char()?;
                match c {
                    Ch('!') => {
                        self.add_to_token_value('!');
                        self.state = State::CommentLessThanSignBang;
                    }
                    Ch('<') => self.add_to_token_value('<'),
                    _ => {
                        self.reconsume();
                        self.state = State::Comment;
                    }
                }
            }
            State::CommentLessThanSignBang => {
                let c = self.read_char()?;
                match c {
                    Ch('-') => self.state = State::CommentLessThanSignBangDash,
                    _ => {
                        self.reconsume();
                        self.state = State::Comment;
                    }
                }
            }
            State::CommentLessThanSignBangDash => {
                let c = self.read_char()?;
                match c {
                    Ch('-') => self.state = State::CommentLessThanSignBangDashDash,
                    _ => {
                        self.reconsume();
                        self.state = State::CommentEndDash;
                    }
                }
            }
            State::CommentLessThanSignBangDashDash => {
                let c = self.read_char()?;
                match c {
                    Ch('>') | StreamEnd => {
                        self.reconsume();
                        self.state = State::CommentEnd;
                    }
                    _ => {
                        self.parse_error(ParserError::NestedComment);
                        self.reconsume();
                        self.state = State::CommentEnd;
                    }
                }
            }
            State::CommentEndDash => {
                let c = self.read_char()?;
                match c {
                    Ch('-') => self.state = State::CommentEnd,
                    StreamEnd => {
                        self.parse_error(ParserError::EofInComment);
                        self.emit_current_token();
                        self.state = State::Data;
                    }
                    _ => {
                        self.add_to_token_value('-');
                        self.reconsume();
                        self.state = State::Comment;
                    }
                }
            }
            State::CommentEnd => {
                let c = self.read_char()?;
                match c {
                    Ch('>') => {
                        self.emit_current_token();
                        self.state = State::Data;
                    }
                    Ch('!') => self.state = State::CommentEndBang,
                    Ch('-') => self.add_to_token_value('-'),
                    StreamEnd => {
                        self.parse_error(ParserError::EofInComment);
                        self.emit_current_token();
                        self.state = State::Data;
                    }
                    _ => {
                        self.add_to_token_value('-');
                        self.add_to_token_value('-');
                        self.reconsume();
                        self.state = State::Comment;
                    }
                }
            }
            State::CommentEndBang => {
                let c = self.read_char()?;
                match c {
                    Ch('-') => {
                        self.add_to_token_value('-');
                        self.add_to_token_value('-');
                        self.add_to_token_value('!');
                        self.state = State::CommentEndDash;
                    }
                    Ch('>') => {
                        self.parse_error(ParserError::IncorrectlyClosedComment);
                        self.emit_current_token();
                        self.state = State::Data;
                    }
                    StreamEnd => {
                        self.parse_error(ParserError::EofInComment);
                        self.emit_current_token();
                        self.state = State::Data;
                    }
                    _ => {
                        self.add_to_token_value('-');
                        self.add_to_token_value('-');
                        self.add_to_token_value('!');
                        self.reconsume();
                        self.state = State::Comment;
                    }
                }
            }
            State::DOCTYPE => {
                let c = self.read_char()?;
                match c {
                    Ch(CHAR_TAB | CHAR_LF | CHAR_FF | CHAR_SPACE) => {
                        self.state = State::BeforeDOCTYPEName;
                    }
                    Ch('>') => {
                        self.reconsume();
                        self.state = State::BeforeDOCTYPEName;
                    }
                    StreamEnd => {
                        self.parse_error(ParserError::EofInDoctype);
                        self.emit_token(Token::DocType {
                            name: None,
                            force_quirks: true,
                            pub_identifier: None,
                            sys_identifier: None,
                        });
                        self.state = State::Data;
                    }
                    _ => {
                        self.parse_error(ParserError::MissingWhitespaceBeforeDoctypeName);
                        self.reconsume();
                        self.state = State::BeforeDOCTYPEName;
                    }
                }
            }
            State::BeforeDOCTYPEName => {
                let c = self.read_char()?;
                match c {
                    Ch(CHAR_TAB | CHAR_LF | CHAR_FF | CHAR_SPACE) => {
                        // ignore
                    }
                    Ch(ch @ 'A'..='Z') => {
                        self.current_token = Some(new_doctype_token());
                        self.add_to_token_name(to_lowercase!(ch));
                        self.state = State::DOCTYPEName;
                    }
                    Ch(CHAR_NUL) => {
                        self.parse_error(ParserError::UnexpectedNullCharacter);
                        self.current_token = Some(new_doctype_token());
                        self.add_to_token_name(CHAR_REPLACEMENT);
                        self.state = State::DOCTYPEName;
                    }
                    Ch('>') => {
                        self.parse_error(ParserError::MissingDoctypeName);
                        self.emit_token(Token::DocType {
                            name: None,
                            force_quirks: true,
                            pub_identifier: None,
                            sys_identifier: None,
                        });
                        self.state = State::Data;
                    }
                    StreamEnd => {
                        self.parse_error(ParserError::EofInDoctype);
                        self.emit_token(Token::DocType {
                            name: None,
                            force_quirks: true,
                            pub_identifier: None,
                            sys_identifier: None,
                        });
                        self.state = State::Data;
                    }
                    _ => {
                        self.current_token = Some(new_doctype_token());
                        self.add_to_token_name(c.into());
                        self.state = State::DOCTYPEName;
                    }
                }
            }
            State::DOCTYPEName => {
                let c = self.read_char()?;
                match c {
                    Ch(CHAR_TAB | CHAR_LF | CHAR_FF | CHAR_SPACE) => {
                        self.after_doctype_string.clear();
                        self.after_doctype_items.clear();
                        self.state = State::AfterDOCTYPEName;
                    }
                    Ch('>') => {
                        self.emit_current_token();
                        self.state = State::Data;
                    }
                    Ch(ch @ 'A'..='Z') => self.add_to_token_name(to_lowercase!(ch)),
                    Ch(CHAR_NUL) => {
                        self.parse_error(ParserError::UnexpectedNullCharacter);
                        self.add_to_token_name(CHAR_REPLACEMENT);
                    }
                    StreamEnd => {
                        self.parse_error(ParserError::EofInDoctype);
                        self.set_quirks_mode(true);
                        self.emit_current_token();
                        self.state = State::Data;
                    }
                    _ => self.add_to_token_name(c.into()),
                }
            }
            State::AfterDOCTYPEName => {
                let c = self.read_char()?;

                if self.after_doctype_string.is_empty() {
                    match c {
                        Ch(CHAR_TAB | CHAR_LF | CHAR_FF | CHAR_SPACE) => return Ok(()),
                        Ch('>') => {
                            self.emit_current_token();
                            self.state = State::Data;
                            return Ok(());
                        }
                        StreamEnd => {
                            self.parse_error(ParserError::EofInDoctype);
                            self.set_quirks_mode(true);
                            self.emit_current_token();
                            self.state = State::Data;
                            return Ok(());
                        }
                        _ => {}
                    }
                }

                // Anything else is either a PUBLIC/SYSTEM keyword in the
                // making or a bogus doctype
                match c {
                    Ch(ch) => {
                        self.after_doctype_string.push(ch);
                        self.after_doctype_items.push(self.current_item);

                        if self.after_doctype_string.eq_ignore_ascii_case("PUBLIC") {
                            self.after_doctype_string.clear();
                            self.after_doctype_items.clear();
                            self.state = State::AfterDOCTYPEPublicKeyword;
                        } else if self.after_doctype_string.eq_ignore_ascii_case("SYSTEM") {
                            self.after_doctype_string.clear();
                            self.after_doctype_items.clear();
                            self.state = State::AfterDOCTYPESystemKeyword;
                        } else if is_keyword_prefix(&self.after_doctype_string, "PUBLIC")
                            || is_keyword_prefix(&self.after_doctype_string, "SYSTEM")
                        {
                            // Still deciding; keep collecting
                        } else {
                            self.parse_error(ParserError::InvalidCharacterSequenceAfterDoctypeName);
                            self.set_quirks_mode(true);
                            self.state = State::BogusDOCTYPE;

                            let items = std::mem::take(&mut self.after_doctype_items);
                            self.after_doctype_string.clear();
                            self.replay(items, false);
                        }
                    }
                    _ => {
                        self.parse_error(ParserError::InvalidCharacterSequenceAfterDoctypeName);
                        self.set_quirks_mode(true);
                        self.state = State::BogusDOCTYPE;

                        let items = std::mem::take(&mut self.after_doctype_items);
                        self.after_doctype_string.clear();
                        self.replay(items, true);
                    }
                }
            }
            State::AfterDOCTYPEPublicKeyword => {
                let c = self.read_char()?;
                match c {
                    Ch(CHAR_TAB | CHAR_LF | CHAR_FF | CHAR_SPACE) => {
                        self.state = State::BeforeDOCTYPEPublicIdentifier;
                    }
                    Ch('"') => {
                        self.parse_error(ParserError::MissingWhitespaceAfterDoctypePublicKeyword);
                        self.set_public_identifier(String::new());
                        self.state = State::DOCTYPEPublicIdentifierDoubleQuoted;
                    }
                    Ch('\'') => {
                        self.parse_error(ParserError::MissingWhitespaceAfterDoctypePublicKeyword);
                        self.set_public_identifier(String::new());
                        self.state = State::DOCTYPEPublicIdentifierSingleQuoted;
                    }
                    Ch('>') => {
                        self.parse_error(ParserError::MissingDoctypePublicIdentifier);
                        self.set_quirks_mode(true);
                        self.emit_current_token();
                        self.state = State::Data;
                    }
                    StreamEnd => {
                        self.parse_error(ParserError::EofInDoctype);
                        self.set_quirks_mode(true);
                        self.emit_current_token();
                        self.state = State::Data;
                    }
                    _ => {
                        self.parse_error(ParserError::MissingQuoteBeforeDoctypePublicIdentifier);
                        self.set_quirks_mode(true);
                        self.reconsume();
                        self.state = State::BogusDOCTYPE;
                    }
                }
            }
            State::BeforeDOCTYPEPublicIdentifier => {
                let c = self.read_char()?;
                match c {
                    Ch(CHAR_TAB | CHAR_LF | CHAR_FF | CHAR_SPACE) => {
                        // ignore
                    }
                    Ch('"') => {
                        self.set_public_identifier(String::new());
                        self.state = State::DOCTYPEPublicIdentifierDoubleQuoted;
                    }
                    Ch('\'') => {
                        self.set_public_identifier(String::new());
                        self.state = State::DOCTYPEPublicIdentifierSingleQuoted;
                    }
                    Ch('>') => {
                        self.parse_error(ParserError::MissingDoctypePublicIdentifier);
                        self.set_quirks_mode(true);
                        self.emit_current_token();
                        self.state = State::Data;
                    }
                    StreamEnd => {
                        self.parse_error(ParserError::EofInDoctype);
                        self.set_quirks_mode(true);
                        self.emit_current_token();
                        self.state = State::Data;
                    }
                    _ => {
                        self.parse_error(ParserError::MissingQuoteBeforeDoctypePublicIdentifier);
                        self.set_quirks_mode(true);
                        self.reconsume();
                        self.state = State::BogusDOCTYPE;
                    }
                }
            }
            State::DOCTYPEPublicIdentifierDoubleQuoted => {
                let c = self.read_char()?;
                match c {
                    Ch('"') => self.state = State::AfterDOCTYPEPublicIdentifier,
                    Ch(CHAR_NUL) => {
                        self.parse_error(ParserError::UnexpectedNullCharacter);
                        self.add_public_identifier(CHAR_REPLACEMENT);
                    }
                    Ch('>') => {
                        self.parse_error(ParserError::AbruptDoctypePublicIdentifier);
                        self.set_quirks_mode(true);
                        self.emit_current_token();
                        self.state = State::Data;
                    }
                    StreamEnd => {
                        self.parse_error(ParserError::EofInDoctype);
                        self.set_quirks_mode(true);
                        self.emit_current_token();
                        self.state = State::Data;
                    }
                    _ => self.add_public_identifier(c.into()),
                }
            }
            State::DOCTYPEPublicIdentifierSingleQuoted => {
                let c = self.read_char()?;
                match c {
                    Ch('\'') => self.state = State::AfterDOCTYPEPublicIdentifier,
                    Ch(CHAR_NUL) => {
                        self.parse_error(ParserError::UnexpectedNullCharacter);
                        self.add_public_identifier(CHAR_REPLACEMENT);
                    }
                    Ch('>') => {
                        self.parse_error(ParserError::AbruptDoctypePublicIdentifier);
                        self.set_quirks_mode(true);
                        self.emit_current_token();
                        self.state = State::Data;
                    }
                    StreamEnd => {
                        self.parse_error(ParserError::EofInDoctype);
                        self.set_quirks_mode(true);
                        self.emit_current_token();
                        self.state = State::Data;
                    }
                    _ => self.add_public_identifier(c.into()),
                }
            }
            State::AfterDOCTYPEPublicIdentifier => {
                let c = self.read_char()?;
                match c {
                    Ch(CHAR_TAB | CHAR_LF | CHAR_FF | CHAR_SPACE) => {
                        self.state = State::BetweenDOCTYPEPublicAndSystemIdentifiers;
                    }
                    Ch('>') => {
                        self.emit_current_token();
                        self.state = State::Data;
                    }
                    Ch('"') => {
                        self.parse_error(
                            ParserError::MissingWhitespaceBetweenDoctypePublicAndSystemIdentifiers,
                        );
                        self.set_system_identifier(String::new());
                        self.state = State::DOCTYPESystemIdentifierDoubleQuoted;
                    }
                    Ch('\'') => {
                        self.parse_error(
                            ParserError::MissingWhitespaceBetweenDoctypePublicAndSystemIdentifiers,
                        );
                        self.set_system_identifier(String::new());
                        self.state = State::DOCTYPESystemIdentifierSingleQuoted;
                    }
                    StreamEnd => {
                        self.parse_error(ParserError::EofInDoctype);
                        self.set_quirks_mode(true);
                        self.emit_current_token();
                        self.state = State::Data;
                    }
                    _ => {
                        self.parse_error(ParserError::MissingQuoteBeforeDoctypeSystemIdentifier);
                        self.set_quirks_mode(true);
                        self.reconsume();
                        self.state = State::BogusDOCTYPE;
                    }
                }
            }
            State::BetweenDOCTYPEPublicAndSystemIdentifiers => {
                let c = self.read_char()?;
                match c {
                    Ch(CHAR_TAB | CHAR_LF | CHAR_FF | CHAR_SPACE) => {
                        // ignore
                    }
                    Ch('>') => {
                        self.emit_current_token();
                        self.state = State::Data;
                    }
                    Ch('"') => {
                        self.set_system_identifier(String::new());
                        self.state = State::DOCTYPESystemIdentifierDoubleQuoted;
                    }
                    Ch('\'') => {
                        self.set_system_identifier(String::new());
                        self.state = State::DOCTYPESystemIdentifierSingleQuoted;
                    }
                    StreamEnd => {
                        self.parse_error(ParserError::EofInDoctype);
                        self.set_quirks_mode(true);
                        self.emit_current_token();
                        self.state = State::Data;
                    }
                    _ => {
                        self.parse_error(ParserError::MissingQuoteBeforeDoctypeSystemIdentifier);
                        self.set_quirks_mode(true);
                        self.reconsume();
                        self.state = State::BogusDOCTYPE;
                    }
                }
            }
            State::AfterDOCTYPESystemKeyword => {
                let c = self.read_char()?;
                match c {
                    Ch(CHAR_TAB | CHAR_LF | CHAR_FF | CHAR_SPACE) => {
                        self.state = State::BeforeDOCTYPESystemIdentifier;
                    }
                    Ch('"') => {
                        self.parse_error(ParserError::MissingWhitespaceAfterDoctypeSystemKeyword);
                        self.set_system_identifier(String::new());
                        self.state = State::DOCTYPESystemIdentifierDoubleQuoted;
                    }
                    Ch('\'') => {
                        self.parse_error(ParserError::MissingWhitespaceAfterDoctypeSystemKeyword);
                        self.set_system_identifier(String::new());
                        self.state = State::DOCTYPESystemIdentifierSingleQuoted;
                    }
                    Ch('>') => {
                        self.parse_error(ParserError::MissingDoctypeSystemIdentifier);
                        self.set_quirks_mode(true);
                        self.emit_current_token();
                        self.state = State::Data;
                    }
                    StreamEnd => {
                        self.parse_error(ParserError::EofInDoctype);
                        self.set_quirks_mode(true);
                        self.emit_current_token();
                        self.state = State::Data;
                    }
                    _ => {
                        self.parse_error(ParserError::MissingQuoteBeforeDoctypeSystemIdentifier);
                        self.set_quirks_mode(true);
                        self.reconsume();
                        self.state = State::BogusDOCTYPE;
                    }
                }
            }
            State::BeforeDOCTYPESystemIdentifier => {
                let c = self.read_char()?;
                match c {
                    Ch(CHAR_TAB | CHAR_LF | CHAR_FF | CHAR_SPACE) => {
                        // ignore
                    }
                    Ch('"') => {
                        self.set_system_identifier(String::new());
                        self.state = State::DOCTYPESystemIdentifierDoubleQuoted;
                    }
                    Ch('\'') => {
                        self.set_system_identifier(String::new());
                        self.state = State::DOCTYPESystemIdentifierSingleQuoted;
                    }
                    Ch('>') => {
                        self.parse_error(ParserError::MissingDoctypeSystemIdentifier);
                        self.set_quirks_mode(true);
                        self.emit_current_token();
                        self.state = State::Data;
                    }
                    StreamEnd => {
                        self.parse_error(ParserError::EofInDoctype);
                        self.set_quirks_mode(true);
                        self.emit_current_token();
                        self.state = State::Data;
                    }
                    _ => {
                        self.parse_error(ParserError::MissingQuoteBeforeDoctypeSystemIdentifier);
                        self.set_quirks_mode(true);
                        self.reconsume();
                        self.state = State::BogusDOCTYPE;
                    }
                }
            }
            State::DOCTYPESystemIdentifierDoubleQuoted => {
                let c = self.read_char()?;
                match c {
                    Ch('"') => self.state = State::AfterDOCTYPESystemIdentifier,
                    Ch(CHAR_NUL) => {
                        self.parse_error(ParserError::UnexpectedNullCharacter);
                        self.add_system_identifier(CHAR_REPLACEMENT);
                    }
                    Ch('>') => {
                        self.parse_error(ParserError::AbruptDoctypeSystemIdentifier);
                        self.set_quirks_mode(true);
                        self.emit_current_token();
                        self.state = State::Data;
                    }
                    StreamEnd => {
                        self.parse_error(ParserError::EofInDoctype);
                        self.set_quirks_mode(true);
                        self.emit_current_token();
                        self.state = State::Data;
                    }
                    _ => self.add_system_identifier(c.into()),
                }
            }
            State::DOCTYPESystemIdentifierSingleQuoted => {
                let c = self.read_char()?;
                match c {
                    Ch('\'') => self.state = State::AfterDOCTYPESystemIdentifier,
                    Ch(CHAR_NUL) => {
                        self.parse_error(ParserError::UnexpectedNullCharacter);
                        self.add_system_identifier(CHAR_REPLACEMENT);
                    }
                    Ch('>') => {
                        self.parse_error(ParserError::AbruptDoctypeSystemIdentifier);
                        self.set_quirks_mode(true);
                        self.emit_current_token();
                        self.state = State::Data;
                    }
                    StreamEnd => {
                        self.parse_error(ParserError::EofInDoctype);
                        self.set_quirks_mode(true);
                        self.emit_current_token();
                        self.state = State::Data;
                    }
                    _ => self.add_system_identifier(c.into()),
                }
            }
            State::AfterDOCTYPESystemIdentifier => {
                let c = self.read_char()?;
                match c {
                    Ch(CHAR_TAB | CHAR_LF | CHAR_FF | CHAR_SPACE) => {
                        // ignore
                    }
                    Ch('>') => {
                        self.emit_current_token();
                        self.state = State::Data;
                    }
                    StreamEnd => {
                        self.parse_error(ParserError::EofInDoctype);
                        self.set_quirks_mode(true);
                        self.emit_current_token();
                        self.state = State::Data;
                    }
                    _ => {
                        self.parse_error(
                            ParserError::UnexpectedCharacterAfterDoctypeSystemIdentifier,
                        );
                        self.reconsume();
                        self.state = State::BogusDOCTYPE;
                    }
                }
            }
            State::BogusDOCTYPE => {
                let c = self.read_char()?;
                match c {
                    Ch('>') => {
                        self.emit_current_token();
                        self.state = State::Data;
                    }
                    Ch(CHAR_NUL) => self.parse_error(ParserError::UnexpectedNullCharacter),
                    StreamEnd => {
                        self.emit_current_token();
                        self.state = State::Data;
                    }
                    _ => {
                        // ignore
                    }
                }
            }
            State::CDATASection => {
                let c = self.read_char()?;
                match c {
                    Ch(']') => self.state = State::CDATASectionBracket,
                    StreamEnd => {
                        self.parse_error(ParserError::EofInCdata);
                        self.state = State::Data;
                    }
                    _ => self.emit_char(c.into()),
                }
            }
            State::CDATASectionBracket => {
                let c = self.read_char()?;
                match c {
                    Ch(']') => self.state = State::CDATASectionEnd,
                    _ => {
                        self.emit_char(']');
                        self.reconsume();
                        self.state = State::CDATASection;
                    }
                }
            }
            State::CDATASectionEnd => {
                let c = self.read_char()?;
                match c {
                    Ch(']') => self.emit_char(']'),
                    Ch('>') => self.state = State::Data,
                    _ => {
                        self.emit_char(']');
                        self.emit_char(']');
                        self.reconsume();
                        self.state = State::CDATASection;
                    }
                }
            }
            State::CharacterReference => self.character_reference_state()?,
            State::NamedCharacterReference => self.named_character_reference_state()?,
            State::AmbiguousAmpersand => self.ambiguous_ampersand_state()?,
            State::NumericCharacterReference => self.numeric_character_reference_state()?,
            State::HexadecimalCharacterReferenceStart => {
                self.hexadecimal_character_reference_start_state()?;
            }
            State::DecimalCharacterReferenceStart => {
                self.decimal_character_reference_start_state()?;
            }
            State::HexadecimalCharacterReference => {
                self.hexadecimal_character_reference_state()?;
            }
            State::DecimalCharacterReference => self.decimal_character_reference_state()?,
            State::NumericCharacterReferenceEnd => self.numeric_character_reference_end_state(),
        }

        Ok(())
    }

    /// Shared contract of the RCDATA/RAWTEXT/script-data end tag name states.
    /// `fallback` is the outer text state to abandon into when the end tag is
    /// not the appropriate one.
    fn end_tag_name_state(&mut self, fallback: State) -> Result<()> {
        let c = self.read_char()?;

        // we use this flag because a lot of matches will actually do the same thing
        let mut consume_anything_else = false;

        match c {
            Ch(CHAR_TAB | CHAR_LF | CHAR_FF | CHAR_SPACE) => {
                if self.is_appropriate_end_token() {
                    self.state = State::BeforeAttributeName;
                } else {
                    consume_anything_else = true;
                }
            }
            Ch('/') => {
                if self.is_appropriate_end_token() {
                    self.state = State::SelfClosingStart;
                } else {
                    consume_anything_else = true;
                }
            }
            Ch('>') => {
                if self.is_appropriate_end_token() {
                    self.emit_current_token();
                    self.last_start_token = String::new();
                    self.state = State::Data;
                } else {
                    consume_anything_else = true;
                }
            }
            Ch(ch @ 'A'..='Z') => {
                self.add_to_token_name(to_lowercase!(ch));
                self.temporary_buffer.push(ch);
            }
            Ch(ch @ 'a'..='z') => {
                self.add_to_token_name(ch);
                self.temporary_buffer.push(ch);
            }
            _ => {
                consume_anything_else = true;
            }
        }

        if consume_anything_else {
            self.abandon_end_tag(fallback);
        }

        Ok(())
    }

    /// Reads the next item, preferring the pushback queue, and converts what
    /// the state machine should never see. Invalid UTF-8 becomes U+FFFD with
    /// a parse error; control and noncharacter input is reported as well.
    /// Both checks run only for items fresh from the stream, so reconsumed
    /// items report once.
    fn read_char(&mut self) -> Result<Character> {
        let (item, fresh) = match self.pushback.pop_front() {
            Some(item) => (item, false),
            None => (self.stream.next_item()?, true),
        };

        let ch = match item.ch {
            Invalid => Ch(CHAR_REPLACEMENT),
            other => other,
        };

        self.current_item = InputItem {
            ch,
            location: item.location,
        };

        if fresh {
            match item.ch {
                Invalid => self.parse_error(ParserError::InvalidUtf8),
                Ch(c) if self.is_control_char(c as u32) => {
                    self.parse_error(ParserError::ControlCharacterInInputStream);
                }
                Ch(c) if self.is_noncharacter(c as u32) => {
                    self.parse_error(ParserError::NoncharacterInInputStream);
                }
                _ => {}
            }
        }

        Ok(ch)
    }

    /// Makes the state machine see the current item again in whatever state
    /// comes next
    fn reconsume(&mut self) {
        self.pushback.push_front(self.current_item);
    }

    /// Queues collected items for reprocessing, in their original order and
    /// ahead of fresh input. With `include_current` the current item goes
    /// last.
    fn replay(&mut self, mut items: Vec<InputItem>, include_current: bool) {
        if include_current {
            items.push(self.current_item);
        }

        for item in items.into_iter().rev() {
            self.pushback.push_front(item);
        }
    }

    /// Emits a single character of character data
    fn emit_char(&mut self, c: char) {
        self.emit_token(Token::Character(c));
    }

    fn emit_eof(&mut self) {
        self.emit_token(Token::Eof {
            location: self.get_location(),
        });
    }

    /// Emits the current stored token
    fn emit_current_token(&mut self) {
        if let Some(token) = self.current_token.take() {
            self.emit_token(token);
        }
    }

    /// Emits the given token. It does not have to be stored first.
    fn emit_token(&mut self, token: Token) {
        // Save the start token name if we are pushing it. This helps us in detecting matching tags.
        // Self-closing tags never become the pending end tag.
        if let Token::StartTag {
            name,
            is_self_closing,
            ..
        } = &token
        {
            if !is_self_closing {
                self.last_start_token = name.clone();
            }
        }

        if token.is_eof() {
            self.eof_emitted = true;
        }

        self.token_queue.push_back(token);
    }

    /// Return true when the current end tag token matches the stored start
    /// token (ie: 'table' matches when last_start_token = 'table')
    fn is_appropriate_end_token(&self) -> bool {
        match &self.current_token {
            Some(Token::EndTag { name, .. }) => *name == self.last_start_token,
            _ => false,
        }
    }

    /// Emits the raw `</` plus whatever end tag name was collected, drops the
    /// provisional end tag token and resumes the outer text state
    fn abandon_end_tag(&mut self, to: State) {
        self.current_token = None;
        self.emit_char('<');
        self.emit_char('/');

        let buffer = std::mem::take(&mut self.temporary_buffer);
        for ch in buffer.chars() {
            self.emit_char(ch);
        }

        self.reconsume();
        self.state = to;
    }

    /// Adds the given character to the current token's name (if applicable)
    fn add_to_token_name(&mut self, c: char) {
        match &mut self.current_token {
            Some(Token::StartTag { name, .. }) => name.push(c),
            Some(Token::EndTag { name, .. }) => name.push(c),
            Some(Token::DocType { name, .. }) => {
                // Doctype can have an optional name
                match name {
                    Some(name) => name.push(c),
                    None => *name = Some(c.to_string()),
                }
            }
            _ => {}
        }
    }

    /// Adds the given character to the current comment token's data (if applicable)
    fn add_to_token_value(&mut self, c: char) {
        if let Some(Token::Comment(value)) = &mut self.current_token {
            value.push(c);
        }
    }

    /// Sets the public identifier of the current token (if applicable)
    fn set_public_identifier(&mut self, s: String) {
        if let Some(Token::DocType { pub_identifier, .. }) = &mut self.current_token {
            *pub_identifier = Some(s);
        }
    }

    /// Adds the given character to the current token's public identifier (if applicable)
    fn add_public_identifier(&mut self, c: char) {
        if let Some(Token::DocType {
            pub_identifier: Some(pid),
            ..
        }) = &mut self.current_token
        {
            pid.push(c);
        }
    }

    /// Sets the system identifier of the current token (if applicable)
    fn set_system_identifier(&mut self, s: String) {
        if let Some(Token::DocType { sys_identifier, .. }) = &mut self.current_token {
            *sys_identifier = Some(s);
        }
    }

    /// Adds the given character to the current token's system identifier (if applicable)
    fn add_system_identifier(&mut self, c: char) {
        if let Some(Token::DocType {
            sys_identifier: Some(sid),
            ..
        }) = &mut self.current_token
        {
            sid.push(c);
        }
    }

    /// Set force_quirks mode in the current token
    fn set_quirks_mode(&mut self, quirky: bool) {
        if let Some(Token::DocType { force_quirks, .. }) = &mut self.current_token {
            *force_quirks = quirky;
        }
    }

    /// Set the self-closing flag on the current tag token
    fn set_self_closing(&mut self) {
        if let Some(
            Token::StartTag {
                is_self_closing, ..
            }
            | Token::EndTag {
                is_self_closing, ..
            },
        ) = &mut self.current_token
        {
            *is_self_closing = true;
        }
    }

    /// Called when the attribute name is complete: a duplicate name is
    /// reported once and marks the whole attribute to be dropped
    fn finish_attribute_name(&mut self) {
        if self.attr_already_exists() {
            self.parse_error(ParserError::DuplicateAttribute);
            self.current_attr_dropped = true;
        }
    }

    /// This function checks to see if there is already an attribute name like
    /// the one in current_attr_name.
    fn attr_already_exists(&self) -> bool {
        match &self.current_token {
            Some(Token::StartTag { attributes, .. } | Token::EndTag { attributes, .. }) => {
                attributes
                    .iter()
                    .any(|attr| attr.name == self.current_attr_name)
            }
            _ => false,
        }
    }

    /// Stores the completed attribute onto the current tag token, unless it
    /// was marked as a duplicate, and clears the accumulation buffers
    fn store_and_clear_current_attribute(&mut self) {
        if !self.current_attr_name.is_empty() && !self.current_attr_dropped {
            let attr = Attribute {
                name: std::mem::take(&mut self.current_attr_name),
                value: std::mem::take(&mut self.current_attr_value),
            };

            if let Some(Token::StartTag { attributes, .. } | Token::EndTag { attributes, .. }) =
                &mut self.current_token
            {
                attributes.push(attr);
            }
        }

        self.current_attr_name.clear();
        self.current_attr_value.clear();
        self.current_attr_dropped = false;
    }

    /// Flushes the temporary buffer to wherever the return state sends
    /// character reference output: the attribute value under construction, or
    /// the character token stream
    pub(crate) fn flush_temporary_buffer(&mut self) {
        if self.return_state_is_attribute() {
            self.current_attr_value.push_str(&self.temporary_buffer);
            self.temporary_buffer.clear();
        } else {
            let buffer = std::mem::take(&mut self.temporary_buffer);
            for ch in buffer.chars() {
                self.emit_char(ch);
            }
        }
    }

    pub(crate) fn return_state_is_attribute(&self) -> bool {
        matches!(
            self.return_state,
            State::AttributeValueDoubleQuoted
                | State::AttributeValueSingleQuoted
                | State::AttributeValueUnquoted
        )
    }

    /// Reports a parse error at the position of the current input item
    pub(crate) fn parse_error(&mut self, error: ParserError) {
        self.error_sink
            .borrow_mut()
            .accept_error(error, self.get_location());
    }
}

fn new_doctype_token() -> Token {
    Token::DocType {
        name: None,
        force_quirks: false,
        pub_identifier: None,
        sys_identifier: None,
    }
}

/// True when `collected` is an ASCII-case-insensitive prefix of `keyword`
fn is_keyword_prefix(collected: &str, keyword: &str) -> bool {
    collected.len() <= keyword.len() && keyword[..collected.len()].eq_ignore_ascii_case(collected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{ErrorLogger, ParseError};

    fn tokenize_with(input: &str, opts: Option<Options>) -> (Vec<Token>, Vec<ParseError>) {
        let mut stream = InputStream::from_str(input);
        let error_logger = Rc::new(RefCell::new(ErrorLogger::new()));
        let mut tokenizer = Tokenizer::new(&mut stream, opts, error_logger.clone());

        let mut tokens = Vec::new();
        tokenizer.run(&mut tokens).unwrap();

        let errors = error_logger.borrow().get_errors();
        (tokens, errors)
    }

    fn tokenize(input: &str) -> (Vec<Token>, Vec<ParseError>) {
        tokenize_with(input, None)
    }

    fn tokenize_bytes(input: &[u8]) -> (Vec<Token>, Vec<ParseError>) {
        let mut stream = InputStream::from_bytes(input);
        let error_logger = Rc::new(RefCell::new(ErrorLogger::new()));
        let mut tokenizer = Tokenizer::new(&mut stream, None, error_logger.clone());

        let mut tokens = Vec::new();
        tokenizer.run(&mut tokens).unwrap();

        let errors = error_logger.borrow().get_errors();
        (tokens, errors)
    }

    /// Asserts the token stream equals the expectation plus a trailing Eof
    fn assert_tokens(tokens: &[Token], expected: &[Token]) {
        let (last, rest) = tokens.split_last().expect("empty token stream");
        assert!(last.is_eof(), "stream must end in Eof, got {last:?}");
        assert_eq!(rest, expected);
    }

    fn error_kinds(errors: &[ParseError]) -> Vec<ParserError> {
        errors.iter().map(|e| e.error).collect()
    }

    /// Concatenates all character tokens in the stream
    fn text(tokens: &[Token]) -> String {
        tokens
            .iter()
            .filter_map(|t| match t {
                Token::Character(ch) => Some(*ch),
                _ => None,
            })
            .collect()
    }

    fn start_tag(name: &str, attributes: Vec<Attribute>) -> Token {
        Token::StartTag {
            name: name.into(),
            is_self_closing: false,
            attributes,
        }
    }

    fn end_tag(name: &str) -> Token {
        Token::EndTag {
            name: name.into(),
            is_self_closing: false,
            attributes: Vec::new(),
        }
    }

    #[test]
    fn test_doctype() {
        let (tokens, errors) = tokenize("<!DOCTYPE html>");
        assert_tokens(
            &tokens,
            &[Token::DocType {
                name: Some("html".into()),
                force_quirks: false,
                pub_identifier: None,
                sys_identifier: None,
            }],
        );
        assert!(errors.is_empty());
    }

    #[test]
    fn test_doctype_lowercase_no_whitespace() {
        let (tokens, errors) = tokenize("<!doctypehtml>");
        assert_tokens(
            &tokens,
            &[Token::DocType {
                name: Some("html".into()),
                force_quirks: false,
                pub_identifier: None,
                sys_identifier: None,
            }],
        );
        assert_eq!(
            error_kinds(&errors),
            vec![ParserError::MissingWhitespaceBeforeDoctypeName]
        );
    }

    #[test]
    fn test_doctype_missing_name() {
        let (tokens, errors) = tokenize("<!DOCTYPE>");
        assert_tokens(
            &tokens,
            &[Token::DocType {
                name: None,
                force_quirks: true,
                pub_identifier: None,
                sys_identifier: None,
            }],
        );
        assert_eq!(error_kinds(&errors), vec![ParserError::MissingDoctypeName]);
    }

    #[test]
    fn test_doctype_public() {
        let (tokens, errors) = tokenize(
            r#"<!DOCTYPE html PUBLIC "-//W3C//DTD HTML 4.01//EN" "http://www.w3.org/TR/html4/strict.dtd">"#,
        );
        assert_tokens(
            &tokens,
            &[Token::DocType {
                name: Some("html".into()),
                force_quirks: false,
                pub_identifier: Some("-//W3C//DTD HTML 4.01//EN".into()),
                sys_identifier: Some("http://www.w3.org/TR/html4/strict.dtd".into()),
            }],
        );
        assert!(errors.is_empty());
    }

    #[test]
    fn test_doctype_system_single_quoted() {
        let (tokens, errors) = tokenize("<!DOCTYPE html SYSTEM 'about:legacy-compat'>");
        assert_tokens(
            &tokens,
            &[Token::DocType {
                name: Some("html".into()),
                force_quirks: false,
                pub_identifier: None,
                sys_identifier: Some("about:legacy-compat".into()),
            }],
        );
        assert!(errors.is_empty());
    }

    #[test]
    fn test_doctype_lowercase_keywords() {
        let (tokens, errors) = tokenize("<!doctype html public 'a' 'b'>");
        assert_tokens(
            &tokens,
            &[Token::DocType {
                name: Some("html".into()),
                force_quirks: false,
                pub_identifier: Some("a".into()),
                sys_identifier: Some("b".into()),
            }],
        );
        assert!(errors.is_empty());
    }

    #[test]
    fn test_doctype_bogus_keyword() {
        let (tokens, errors) = tokenize("<!DOCTYPE html foo>");
        assert_tokens(
            &tokens,
            &[Token::DocType {
                name: Some("html".into()),
                force_quirks: true,
                pub_identifier: None,
                sys_identifier: None,
            }],
        );
        assert_eq!(
            error_kinds(&errors),
            vec![ParserError::InvalidCharacterSequenceAfterDoctypeName]
        );
    }

    #[test]
    fn test_doctype_abrupt_public_identifier() {
        let (tokens, errors) = tokenize(r#"<!DOCTYPE html PUBLIC "x>"#);
        assert_tokens(
            &tokens,
            &[Token::DocType {
                name: Some("html".into()),
                force_quirks: true,
                pub_identifier: Some("x".into()),
                sys_identifier: None,
            }],
        );
        assert_eq!(
            error_kinds(&errors),
            vec![ParserError::AbruptDoctypePublicIdentifier]
        );
    }

    #[test]
    fn test_doctype_eof() {
        let (tokens, errors) = tokenize("<!DOCTYPE html");
        assert_tokens(
            &tokens,
            &[Token::DocType {
                name: Some("html".into()),
                force_quirks: true,
                pub_identifier: None,
                sys_identifier: None,
            }],
        );
        assert_eq!(error_kinds(&errors), vec![ParserError::EofInDoctype]);
    }

    #[test]
    fn test_start_tag_with_entity_in_data() {
        let (tokens, errors) = tokenize("<p class='x'>a&amp;b</p>");
        assert_tokens(
            &tokens,
            &[
                start_tag("p", vec![Attribute::new("class", "x")]),
                Token::Character('a'),
                Token::Character('&'),
                Token::Character('b'),
                end_tag("p"),
            ],
        );
        assert!(errors.is_empty());
    }

    #[test]
    fn test_historical_reference_in_attribute() {
        let (tokens, errors) = tokenize(r#"<a href="?x=1&foo=2">"#);
        assert_tokens(
            &tokens,
            &[start_tag("a", vec![Attribute::new("href", "?x=1&foo=2")])],
        );
        assert!(errors.is_empty());
    }

    #[test]
    fn test_historical_entity_kept_in_attribute() {
        // &amp without semicolon followed by '=' stays literal in attributes
        let (tokens, errors) = tokenize(r#"<a href="?x&amp=1">"#);
        assert_tokens(
            &tokens,
            &[start_tag("a", vec![Attribute::new("href", "?x&amp=1")])],
        );
        assert!(errors.is_empty());
    }

    #[test]
    fn test_entity_expanded_in_attribute() {
        let (tokens, _) = tokenize(r#"<a href="a&amp;b">"#);
        assert_tokens(
            &tokens,
            &[start_tag("a", vec![Attribute::new("href", "a&b")])],
        );
    }

    #[test]
    fn test_empty_comment() {
        let (tokens, errors) = tokenize("<!---->");
        assert_tokens(&tokens, &[Token::Comment(String::new())]);
        assert!(errors.is_empty());
    }

    #[test]
    fn test_abruptly_closed_comment() {
        let (tokens, errors) = tokenize("<!--->");
        assert_tokens(&tokens, &[Token::Comment(String::new())]);
        assert_eq!(
            error_kinds(&errors),
            vec![ParserError::AbruptClosingOfEmptyComment]
        );
    }

    #[test]
    fn test_comment_with_data() {
        let (tokens, errors) = tokenize("<!-- hello -->");
        assert_tokens(&tokens, &[Token::Comment(" hello ".into())]);
        assert!(errors.is_empty());
    }

    #[test]
    fn test_comment_crlf_normalized() {
        let (tokens, _) = tokenize("<!--a\r\nb-->");
        assert_tokens(&tokens, &[Token::Comment("a\nb".into())]);
    }

    #[test]
    fn test_nested_comment() {
        let (tokens, errors) = tokenize("<!--a<!--b-->");
        assert_tokens(&tokens, &[Token::Comment("a<!--b".into())]);
        assert_eq!(error_kinds(&errors), vec![ParserError::NestedComment]);
    }

    #[test]
    fn test_comment_less_than_bang_without_dashes() {
        let (tokens, errors) = tokenize("<!--a<!b-->");
        assert_tokens(&tokens, &[Token::Comment("a<!b".into())]);
        assert!(errors.is_empty());
    }

    #[test]
    fn test_incorrectly_closed_comment() {
        let (tokens, errors) = tokenize("<!--x--!>");
        assert_tokens(&tokens, &[Token::Comment("x".into())]);
        assert_eq!(
            error_kinds(&errors),
            vec![ParserError::IncorrectlyClosedComment]
        );
    }

    #[test]
    fn test_incorrectly_opened_comment_replays() {
        let (tokens, errors) = tokenize("<!-x-->");
        // The collected "-x" is re-fed through the comment start state
        assert_tokens(&tokens, &[Token::Comment("-x".into())]);
        assert_eq!(
            error_kinds(&errors),
            vec![ParserError::IncorrectlyOpenedComment]
        );
    }

    #[test]
    fn test_eof_in_comment() {
        let (tokens, errors) = tokenize("<!--abc");
        assert_tokens(&tokens, &[Token::Comment("abc".into())]);
        assert_eq!(error_kinds(&errors), vec![ParserError::EofInComment]);
    }

    #[test]
    fn test_bogus_comment_from_question_mark() {
        let (tokens, errors) = tokenize("<?xml version='1.0'?>");
        assert_tokens(&tokens, &[Token::Comment("?xml version='1.0'?".into())]);
        assert_eq!(
            error_kinds(&errors),
            vec![ParserError::UnexpectedQuestionMarkInsteadOfTagName]
        );
    }

    #[test]
    fn test_end_tag_open_invalid_char() {
        let (tokens, errors) = tokenize("</ x>");
        assert_tokens(&tokens, &[Token::Comment(" x".into())]);
        assert_eq!(
            error_kinds(&errors),
            vec![ParserError::InvalidFirstCharacterOfTagName]
        );
    }

    #[test]
    fn test_missing_end_tag_name() {
        let (tokens, errors) = tokenize("</>");
        assert_tokens(&tokens, &[]);
        assert_eq!(error_kinds(&errors), vec![ParserError::MissingEndTagName]);
    }

    #[test]
    fn test_self_closing_tag() {
        let (tokens, errors) = tokenize("<img/>");
        assert_tokens(
            &tokens,
            &[Token::StartTag {
                name: "img".into(),
                is_self_closing: true,
                attributes: Vec::new(),
            }],
        );
        assert!(errors.is_empty());
    }

    #[test]
    fn test_tag_names_are_lowercased() {
        let (tokens, _) = tokenize("<DiV CLASS=Foo></DIV>");
        assert_tokens(
            &tokens,
            &[
                start_tag("div", vec![Attribute::new("class", "Foo")]),
                end_tag("div"),
            ],
        );
    }

    #[test]
    fn test_attribute_quoting_styles() {
        let (tokens, errors) = tokenize(r#"<a a=1 b='2' c="3" d>"#);
        assert_tokens(
            &tokens,
            &[start_tag(
                "a",
                vec![
                    Attribute::new("a", "1"),
                    Attribute::new("b", "2"),
                    Attribute::new("c", "3"),
                    Attribute::new("d", ""),
                ],
            )],
        );
        assert!(errors.is_empty());
    }

    #[test]
    fn test_duplicate_attribute_dropped() {
        let (tokens, errors) = tokenize("<a x=1 x=2>");
        assert_tokens(&tokens, &[start_tag("a", vec![Attribute::new("x", "1")])]);
        assert_eq!(error_kinds(&errors), vec![ParserError::DuplicateAttribute]);
    }

    #[test]
    fn test_missing_attribute_value() {
        let (tokens, errors) = tokenize("<a x=>");
        assert_tokens(&tokens, &[start_tag("a", vec![Attribute::new("x", "")])]);
        assert_eq!(
            error_kinds(&errors),
            vec![ParserError::MissingAttributeValue]
        );
    }

    #[test]
    fn test_equals_sign_before_attribute_name() {
        let (tokens, errors) = tokenize("<a =1>");
        assert_tokens(&tokens, &[start_tag("a", vec![Attribute::new("=1", "")])]);
        assert_eq!(
            error_kinds(&errors),
            vec![ParserError::UnexpectedEqualsSignBeforeAttributeName]
        );
    }

    #[test]
    fn test_missing_whitespace_between_attributes() {
        let (tokens, errors) = tokenize(r#"<a x="1"y="2">"#);
        assert_tokens(
            &tokens,
            &[start_tag(
                "a",
                vec![Attribute::new("x", "1"), Attribute::new("y", "2")],
            )],
        );
        assert_eq!(
            error_kinds(&errors),
            vec![ParserError::MissingWhitespaceBetweenAttributes]
        );
    }

    #[test]
    fn test_stray_solidus_in_tag() {
        let (tokens, errors) = tokenize("<a / x>");
        assert_tokens(&tokens, &[start_tag("a", vec![Attribute::new("x", "")])]);
        assert_eq!(
            error_kinds(&errors),
            vec![ParserError::UnexpectedSolidusInTag]
        );
    }

    #[test]
    fn test_unquoted_value_with_bad_chars() {
        let (tokens, errors) = tokenize("<a x=a<b>");
        assert_tokens(
            &tokens,
            &[start_tag("a", vec![Attribute::new("x", "a<b")])],
        );
        assert_eq!(
            error_kinds(&errors),
            vec![ParserError::UnexpectedCharacterInUnquotedAttributeValue]
        );
    }

    #[test]
    fn test_end_tag_keeps_attributes() {
        let (tokens, _) = tokenize(r#"</p class="x">"#);
        assert_tokens(
            &tokens,
            &[Token::EndTag {
                name: "p".into(),
                is_self_closing: false,
                attributes: vec![Attribute::new("class", "x")],
            }],
        );
    }

    #[test]
    fn test_null_in_data_is_passed_through() {
        let (tokens, errors) = tokenize("a\u{0}b");
        assert_eq!(text(&tokens), "a\u{0}b");
        assert_eq!(
            error_kinds(&errors),
            vec![ParserError::UnexpectedNullCharacter]
        );
    }

    #[test]
    fn test_null_in_tag_name_is_replaced() {
        let (tokens, errors) = tokenize("<a\u{0}>");
        assert_tokens(&tokens, &[start_tag("a\u{FFFD}", Vec::new())]);
        assert_eq!(
            error_kinds(&errors),
            vec![ParserError::UnexpectedNullCharacter]
        );
    }

    #[test]
    fn test_gt_in_data_is_character() {
        let (tokens, errors) = tokenize("a>b");
        assert_eq!(text(&tokens), "a>b");
        assert!(errors.is_empty());
    }

    #[test]
    fn test_eof_before_tag_name() {
        let (tokens, errors) = tokenize("<");
        assert_tokens(&tokens, &[Token::Character('<')]);
        assert_eq!(error_kinds(&errors), vec![ParserError::EofBeforeTagName]);

        let (tokens, errors) = tokenize("</");
        assert_tokens(&tokens, &[Token::Character('<'), Token::Character('/')]);
        assert_eq!(error_kinds(&errors), vec![ParserError::EofBeforeTagName]);
    }

    #[test]
    fn test_eof_in_tag() {
        let (tokens, errors) = tokenize("<a href=");
        assert_tokens(&tokens, &[]);
        assert_eq!(error_kinds(&errors), vec![ParserError::EofInTag]);
    }

    #[test]
    fn test_cdata_in_html_content() {
        let (tokens, errors) = tokenize("<![CDATA[x]]>");
        assert_tokens(&tokens, &[Token::Comment("[CDATA[x]]".into())]);
        assert_eq!(error_kinds(&errors), vec![ParserError::CdataInHtmlContent]);
    }

    #[test]
    fn test_cdata_in_foreign_content() {
        let opts = Options {
            foreign_content: true,
            ..Options::default()
        };
        let (tokens, errors) = tokenize_with("<![CDATA[a]]b]]>x", opts.into());
        assert_eq!(text(&tokens), "a]]bx");
        assert!(errors.is_empty());
    }

    #[test]
    fn test_eof_in_cdata() {
        let opts = Options {
            foreign_content: true,
            ..Options::default()
        };
        let (tokens, errors) = tokenize_with("<![CDATA[x", opts.into());
        assert_eq!(text(&tokens), "x");
        assert_eq!(error_kinds(&errors), vec![ParserError::EofInCdata]);
    }

    #[test]
    fn test_rcdata_appropriate_end_tag() {
        let opts = Options {
            initial_state: State::RCDATA,
            last_start_tag: "title".into(),
            foreign_content: false,
        };
        let (tokens, errors) = tokenize_with("foo</title>bar", opts.into());
        assert_tokens(
            &tokens,
            &[
                Token::Character('f'),
                Token::Character('o'),
                Token::Character('o'),
                end_tag("title"),
                Token::Character('b'),
                Token::Character('a'),
                Token::Character('r'),
            ],
        );
        assert!(errors.is_empty());
    }

    #[test]
    fn test_rcdata_inappropriate_end_tag_stays_text() {
        let opts = Options {
            initial_state: State::RCDATA,
            last_start_tag: "title".into(),
            foreign_content: false,
        };
        let (tokens, _) = tokenize_with("</div>", opts.into());
        assert_eq!(text(&tokens), "</div>");
        assert!(!tokens.iter().any(|t| matches!(t, Token::EndTag { .. })));
    }

    #[test]
    fn test_rcdata_expands_references() {
        let opts = Options {
            initial_state: State::RCDATA,
            ..Options::default()
        };
        let (tokens, _) = tokenize_with("a&amp;b", opts.into());
        assert_eq!(text(&tokens), "a&b");
    }

    #[test]
    fn test_rawtext_keeps_references_literal() {
        let opts = Options {
            initial_state: State::RAWTEXT,
            ..Options::default()
        };
        let (tokens, _) = tokenize_with("a&amp;b", opts.into());
        assert_eq!(text(&tokens), "a&amp;b");
    }

    #[test]
    fn test_plaintext() {
        let opts = Options {
            initial_state: State::PLAINTEXT,
            ..Options::default()
        };
        let (tokens, errors) = tokenize_with("a<b\u{0}c", opts.into());
        assert_eq!(text(&tokens), "a<b\u{FFFD}c");
        assert_eq!(
            error_kinds(&errors),
            vec![ParserError::UnexpectedNullCharacter]
        );
    }

    #[test]
    fn test_script_data_literal_less_than() {
        let mut stream = InputStream::from_str(r#"<script>var s = "<"; </script>"#);
        let error_logger = Rc::new(RefCell::new(ErrorLogger::new()));
        let mut tokenizer = Tokenizer::new(&mut stream, None, error_logger.clone());

        let first = tokenizer.next_token().unwrap();
        assert!(first.is_start_tag("script"));

        // The tree builder switches the tokenizer for script content
        tokenizer.state = State::ScriptData;

        let mut tokens = Vec::new();
        tokenizer.run(&mut tokens).unwrap();

        assert_eq!(text(&tokens), r#"var s = "<"; "#);
        assert_eq!(tokens[tokens.len() - 2], end_tag("script"));
        assert!(error_logger.borrow().get_errors().is_empty());
    }

    #[test]
    fn test_script_data_double_escaped() {
        let opts = Options {
            initial_state: State::ScriptData,
            last_start_tag: "script".into(),
            foreign_content: false,
        };
        let (tokens, errors) =
            tokenize_with("<!--<script>a</script>--></script>", opts.into());
        assert_eq!(text(&tokens), "<!--<script>a</script>-->");
        assert!(tokens.last().unwrap().is_eof());
        assert_eq!(tokens[tokens.len() - 2], end_tag("script"));
        assert!(errors.is_empty());
    }

    #[test]
    fn test_script_data_escaped_eof() {
        let opts = Options {
            initial_state: State::ScriptData,
            last_start_tag: "script".into(),
            foreign_content: false,
        };
        let (tokens, errors) = tokenize_with("<!--x", opts.into());
        assert_eq!(text(&tokens), "<!--x");
        assert_eq!(
            error_kinds(&errors),
            vec![ParserError::EofInScriptHtmlCommentLikeText]
        );
    }

    #[test]
    fn test_numeric_reference_snowman() {
        let (tokens, errors) = tokenize("&#9731;");
        assert_tokens(&tokens, &[Token::Character('\u{2603}')]);
        assert!(errors.is_empty());
    }

    #[test]
    fn test_numeric_reference_non_bmp() {
        let (tokens, errors) = tokenize("&#x1D538;");
        assert_tokens(&tokens, &[Token::Character('\u{1D538}')]);
        assert!(errors.is_empty());
    }

    #[test]
    fn test_numeric_reference_c1_remap() {
        let (tokens, errors) = tokenize("&#128;");
        assert_tokens(&tokens, &[Token::Character('\u{20AC}')]);
        assert_eq!(
            error_kinds(&errors),
            vec![ParserError::ControlCharacterReference]
        );
    }

    #[test]
    fn test_exactly_one_eof() {
        let (tokens, _) = tokenize("<p>x");
        assert_eq!(tokens.iter().filter(|t| t.is_eof()).count(), 1);

        // A halted tokenizer keeps answering Eof
        let mut stream = InputStream::from_str("x");
        let error_logger = Rc::new(RefCell::new(ErrorLogger::new()));
        let mut tokenizer = Tokenizer::new(&mut stream, None, error_logger);
        assert_eq!(tokenizer.next_token().unwrap(), Token::Character('x'));
        assert!(tokenizer.next_token().unwrap().is_eof());
        assert!(tokenizer.next_token().unwrap().is_eof());
    }

    #[test]
    fn test_self_closing_tag_is_not_appropriate_end_tag() {
        let mut stream = InputStream::from_str("<b/><i>");
        let error_logger = Rc::new(RefCell::new(ErrorLogger::new()));
        let mut tokenizer = Tokenizer::new(&mut stream, None, error_logger);

        let token = tokenizer.next_token().unwrap();
        assert!(token.is_start_tag("b"));
        assert_eq!(tokenizer.last_start_token, "");

        let token = tokenizer.next_token().unwrap();
        assert!(token.is_start_tag("i"));
        assert_eq!(tokenizer.last_start_token, "i");
    }

    #[test]
    fn test_invalid_utf8_replaced() {
        let (tokens, errors) = tokenize_bytes(b"a\x80b");
        assert_eq!(text(&tokens), "a\u{FFFD}b");
        assert_eq!(error_kinds(&errors), vec![ParserError::InvalidUtf8]);
    }

    #[test]
    fn test_control_character_in_input_reported() {
        let (tokens, errors) = tokenize("a\u{1}b");
        assert_eq!(text(&tokens), "a\u{1}b");
        assert_eq!(
            error_kinds(&errors),
            vec![ParserError::ControlCharacterInInputStream]
        );
    }

    #[test]
    fn test_crlf_in_attribute_value() {
        let (tokens, _) = tokenize("<a x='1\r\n2'>");
        assert_tokens(&tokens, &[start_tag("a", vec![Attribute::new("x", "1\n2")])]);
    }

    #[test]
    fn test_sink_error_halts_run() {
        struct RejectingSink;

        impl TokenSink for RejectingSink {
            fn accept(&mut self, _token: Token) -> Result<()> {
                Err(strix_shared::types::Error::Sink("not accepting".into()).into())
            }
        }

        let mut stream = InputStream::from_str("<p>");
        let error_logger = Rc::new(RefCell::new(ErrorLogger::new()));
        let mut tokenizer = Tokenizer::new(&mut stream, None, error_logger);

        assert!(tokenizer.run(&mut RejectingSink).is_err());
    }

    #[test]
    fn test_tag_attributes_survive_crlf_and_order() {
        let (tokens, _) = tokenize("<a one=1\r\ntwo=2>");
        assert_tokens(
            &tokens,
            &[start_tag(
                "a",
                vec![Attribute::new("one", "1"), Attribute::new("two", "2")],
            )],
        );
    }
}
