use strix_shared::byte_stream::Location;

/// Possible tokenization errors, as enumerated by the WHATWG parsing
/// specification, plus the input-stream conditions the decoder can hit.
/// None of these are fatal; they are reported and tokenization continues.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParserError {
    AbruptClosingOfEmptyComment,
    AbruptDoctypePublicIdentifier,
    AbruptDoctypeSystemIdentifier,
    AbsenceOfDigitsInNumericCharacterReference,
    CdataInHtmlContent,
    CharacterReferenceOutsideUnicodeRange,
    ControlCharacterInInputStream,
    ControlCharacterReference,
    DuplicateAttribute,
    EofBeforeTagName,
    EofInCdata,
    EofInComment,
    EofInDoctype,
    EofInScriptHtmlCommentLikeText,
    EofInTag,
    IncorrectlyClosedComment,
    IncorrectlyOpenedComment,
    InvalidCharacterSequenceAfterDoctypeName,
    InvalidFirstCharacterOfTagName,
    InvalidUtf8,
    MissingAttributeValue,
    MissingDoctypeName,
    MissingDoctypePublicIdentifier,
    MissingDoctypeSystemIdentifier,
    MissingEndTagName,
    MissingQuoteBeforeDoctypePublicIdentifier,
    MissingQuoteBeforeDoctypeSystemIdentifier,
    MissingSemicolonAfterCharacterReference,
    MissingWhitespaceAfterDoctypePublicKeyword,
    MissingWhitespaceAfterDoctypeSystemKeyword,
    MissingWhitespaceBeforeDoctypeName,
    MissingWhitespaceBetweenAttributes,
    MissingWhitespaceBetweenDoctypePublicAndSystemIdentifiers,
    NestedComment,
    NoncharacterCharacterReference,
    NoncharacterInInputStream,
    NullCharacterReference,
    SurrogateCharacterReference,
    UnexpectedCharacterAfterDoctypeSystemIdentifier,
    UnexpectedCharacterInAttributeName,
    UnexpectedCharacterInUnquotedAttributeValue,
    UnexpectedEqualsSignBeforeAttributeName,
    UnexpectedNullCharacter,
    UnexpectedQuestionMarkInsteadOfTagName,
    UnexpectedSolidusInTag,
    UnknownNamedCharacterReference,
}

// Parser errors as their specification code string
impl ParserError {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParserError::AbruptClosingOfEmptyComment => "abrupt-closing-of-empty-comment",
            ParserError::AbruptDoctypePublicIdentifier => "abrupt-doctype-public-identifier",
            ParserError::AbruptDoctypeSystemIdentifier => "abrupt-doctype-system-identifier",
            ParserError::AbsenceOfDigitsInNumericCharacterReference => {
                "absence-of-digits-in-numeric-character-reference"
            }
            ParserError::CdataInHtmlContent => "cdata-in-html-content",
            ParserError::CharacterReferenceOutsideUnicodeRange => {
                "character-reference-outside-unicode-range"
            }
            ParserError::ControlCharacterInInputStream => "control-character-in-input-stream",
            ParserError::ControlCharacterReference => "control-character-reference",
            ParserError::DuplicateAttribute => "duplicate-attribute",
            ParserError::EofBeforeTagName => "eof-before-tag-name",
            ParserError::EofInCdata => "eof-in-cdata",
            ParserError::EofInComment => "eof-in-comment",
            ParserError::EofInDoctype => "eof-in-doctype",
            ParserError::EofInScriptHtmlCommentLikeText => "eof-in-script-html-comment-like-text",
            ParserError::EofInTag => "eof-in-tag",
            ParserError::IncorrectlyClosedComment => "incorrectly-closed-comment",
            ParserError::IncorrectlyOpenedComment => "incorrectly-opened-comment",
            ParserError::InvalidCharacterSequenceAfterDoctypeName => {
                "invalid-character-sequence-after-doctype-name"
            }
            ParserError::InvalidFirstCharacterOfTagName => "invalid-first-character-of-tag-name",
            ParserError::InvalidUtf8 => "invalid-utf8-in-input-stream",
            ParserError::MissingAttributeValue => "missing-attribute-value",
            ParserError::MissingDoctypeName => "missing-doctype-name",
            ParserError::MissingDoctypePublicIdentifier => "missing-doctype-public-identifier",
            ParserError::MissingDoctypeSystemIdentifier => "missing-doctype-system-identifier",
            ParserError::MissingEndTagName => "missing-end-tag-name",
            ParserError::MissingQuoteBeforeDoctypePublicIdentifier => {
                "missing-quote-before-doctype-public-identifier"
            }
            ParserError::MissingQuoteBeforeDoctypeSystemIdentifier => {
                "missing-quote-before-doctype-system-identifier"
            }
            ParserError::MissingSemicolonAfterCharacterReference => {
                "missing-semicolon-after-character-reference"
            }
            ParserError::MissingWhitespaceAfterDoctypePublicKeyword => {
                "missing-whitespace-after-doctype-public-keyword"
            }
            ParserError::MissingWhitespaceAfterDoctypeSystemKeyword => {
                "missing-whitespace-after-doctype-system-keyword"
            }
            ParserError::MissingWhitespaceBeforeDoctypeName => {
                "missing-whitespace-before-doctype-name"
            }
            ParserError::MissingWhitespaceBetweenAttributes => {
                "missing-whitespace-between-attributes"
            }
            ParserError::MissingWhitespaceBetweenDoctypePublicAndSystemIdentifiers => {
                "missing-whitespace-between-doctype-public-and-system-identifiers"
            }
            ParserError::NestedComment => "nested-comment",
            ParserError::NoncharacterCharacterReference => "noncharacter-character-reference",
            ParserError::NoncharacterInInputStream => "noncharacter-in-input-stream",
            ParserError::NullCharacterReference => "null-character-reference",
            ParserError::SurrogateCharacterReference => "surrogate-character-reference",
            ParserError::UnexpectedCharacterAfterDoctypeSystemIdentifier => {
                "unexpected-character-after-doctype-system-identifier"
            }
            ParserError::UnexpectedCharacterInAttributeName => {
                "unexpected-character-in-attribute-name"
            }
            ParserError::UnexpectedCharacterInUnquotedAttributeValue => {
                "unexpected-character-in-unquoted-attribute-value"
            }
            ParserError::UnexpectedEqualsSignBeforeAttributeName => {
                "unexpected-equals-sign-before-attribute-name"
            }
            ParserError::UnexpectedNullCharacter => "unexpected-null-character",
            ParserError::UnexpectedQuestionMarkInsteadOfTagName => {
                "unexpected-question-mark-instead-of-tag-name"
            }
            ParserError::UnexpectedSolidusInTag => "unexpected-solidus-in-tag",
            ParserError::UnknownNamedCharacterReference => "unknown-named-character-reference",
        }
    }
}

/// Receives parse errors in detection order. Never fatal: implementations
/// cannot stop tokenization.
pub trait ErrorSink {
    fn accept_error(&mut self, error: ParserError, location: Location);
}

/// A parse error pinned to the position it was detected at
#[derive(Clone, Debug, PartialEq)]
pub struct ParseError {
    pub error: ParserError,
    pub location: Location,
}

/// Error sink that collects everything it is handed
#[derive(Clone, Default)]
pub struct ErrorLogger {
    errors: Vec<ParseError>,
}

impl ErrorLogger {
    // Creates a new error logger
    pub fn new() -> Self {
        ErrorLogger { errors: Vec::new() }
    }

    // Returns a cloned instance of the errors
    pub fn get_errors(&self) -> Vec<ParseError> {
        self.errors.clone()
    }
}

impl ErrorSink for ErrorLogger {
    fn accept_error(&mut self, error: ParserError, location: Location) {
        // The same error on the same position is only stored once
        for err in &self.errors {
            if err.location == location && err.error == error {
                return;
            }
        }

        self.errors.push(ParseError { error, location });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_logger_dedups() {
        let mut logger = ErrorLogger::new();

        for _ in 0..5 {
            logger.accept_error(ParserError::EofInTag, Location::new(1, 1, 1));
        }

        assert_eq!(logger.get_errors().len(), 1);
    }

    #[test]
    fn test_error_logger_distinct_positions() {
        let mut logger = ErrorLogger::new();

        for col in 1..=5 {
            logger.accept_error(ParserError::EofInTag, Location::new(1, col, col));
        }

        assert_eq!(logger.get_errors().len(), 5);
    }

    #[test]
    fn test_error_logger_distinct_errors() {
        let mut logger = ErrorLogger::new();

        logger.accept_error(ParserError::EofInTag, Location::new(1, 1, 1));
        logger.accept_error(ParserError::EofInComment, Location::new(1, 1, 1));
        logger.accept_error(ParserError::EofInTag, Location::new(1, 1, 1));

        assert_eq!(logger.get_errors().len(), 2);
    }

    #[test]
    fn test_error_code_strings() {
        assert_eq!(
            ParserError::AbruptClosingOfEmptyComment.as_str(),
            "abrupt-closing-of-empty-comment"
        );
        assert_eq!(
            ParserError::UnexpectedNullCharacter.as_str(),
            "unexpected-null-character"
        );
    }
}
