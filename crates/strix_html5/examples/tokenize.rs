use std::cell::RefCell;
use std::rc::Rc;
use strix_html5::errors::ErrorLogger;
use strix_html5::tokenizer::token::Token;
use strix_html5::tokenizer::Tokenizer;
use strix_shared::byte_stream::InputStream;

fn main() {
    let html = r#"<!DOCTYPE html><p class="greeting">Hello&comma; <b>world</b>!</p>"#;

    // Creates an input stream over the document and a sink for parse errors
    let mut stream = InputStream::from_str(html);
    let error_logger = Rc::new(RefCell::new(ErrorLogger::new()));
    let mut tokenizer = Tokenizer::new(&mut stream, None, error_logger.clone());

    // Drive the tokenizer to completion, collecting the tokens
    let mut tokens: Vec<Token> = Vec::new();
    tokenizer.run(&mut tokens).expect("tokenization failed");

    for token in &tokens {
        println!("{token:?}");
    }

    for error in error_logger.borrow().get_errors() {
        println!("parse error: {} at {:?}", error.error.as_str(), error.location);
    }
}
