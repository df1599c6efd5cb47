//! HTML5 tokenization
//!
//! The tokenizer's job is to take a stream of bytes and turn it into the
//! token stream a tree builder consumes: DOCTYPE, start/end tags, comments,
//! characters, end-of-file. It is implemented as the WHATWG tokenization
//! state machine and runs in the current thread, pulled by the consumer one
//! token at a time.
//!
//! ```
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use strix_html5::errors::ErrorLogger;
//! use strix_html5::tokenizer::token::Token;
//! use strix_html5::tokenizer::Tokenizer;
//! use strix_shared::byte_stream::InputStream;
//!
//! let mut stream = InputStream::from_str("<p>hi</p>");
//! let error_logger = Rc::new(RefCell::new(ErrorLogger::new()));
//! let mut tokenizer = Tokenizer::new(&mut stream, None, error_logger.clone());
//!
//! let mut tokens: Vec<Token> = Vec::new();
//! tokenizer.run(&mut tokens).unwrap();
//! assert!(tokens.last().unwrap().is_eof());
//! ```

pub mod errors;
pub mod tokenizer;
