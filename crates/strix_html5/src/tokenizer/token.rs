use strix_shared::byte_stream::Location;

/// A single completed attribute on a start or end tag. Names are lowercased
/// during accumulation; attribute order is the order of completion in the
/// source.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

impl Attribute {
    pub fn new(name: &str, value: &str) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// The different token structures that can be emitted by the tokenizer
#[derive(Clone, Debug, PartialEq)]
pub enum Token {
    DocType {
        name: Option<String>,
        force_quirks: bool,
        pub_identifier: Option<String>,
        sys_identifier: Option<String>,
    },
    StartTag {
        name: String,
        is_self_closing: bool,
        attributes: Vec<Attribute>,
    },
    EndTag {
        name: String,
        is_self_closing: bool,
        attributes: Vec<Attribute>,
    },
    Comment(String),
    /// A single code point of character data
    Character(char),
    Eof {
        location: Location,
    },
}

impl Token {
    /// Returns true when the token is an EOF token
    pub fn is_eof(&self) -> bool {
        matches!(self, Token::Eof { .. })
    }

    /// Returns true when the token is a start tag with the wanted name
    pub fn is_start_tag(&self, wanted_name: &str) -> bool {
        if let Token::StartTag { name, .. } = self {
            name == wanted_name
        } else {
            false
        }
    }

    pub fn is_any_start_tag(&self) -> bool {
        matches!(self, Token::StartTag { .. })
    }

    pub fn is_character(&self) -> bool {
        matches!(self, Token::Character(_))
    }
}

// Each token can be displayed as a string
impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Token::DocType {
                name,
                pub_identifier,
                sys_identifier,
                ..
            } => {
                let mut result = format!("<!DOCTYPE {}", name.clone().unwrap_or_default());
                if let Some(pub_id) = pub_identifier {
                    result.push_str(&format!(r#" PUBLIC "{pub_id}""#));
                }
                if let Some(sys_id) = sys_identifier {
                    result.push_str(&format!(r#" SYSTEM "{sys_id}""#));
                }
                result.push_str(" />");
                write!(f, "{result}")
            }
            Token::Comment(value) => write!(f, "<!-- {value} -->"),
            Token::Character(ch) => write!(f, "{ch}"),
            Token::StartTag {
                name,
                is_self_closing,
                attributes,
            } => {
                let mut result = format!("<{name}");
                for attr in attributes {
                    result.push_str(&format!(r#" {}="{}""#, attr.name, attr.value));
                }
                if *is_self_closing {
                    result.push_str(" /");
                }
                result.push('>');
                write!(f, "{result}")
            }
            Token::EndTag { name, .. } => write!(f, "</{name}>"),
            Token::Eof { .. } => write!(f, "EOF"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_is_eof() {
        let token = Token::Eof {
            location: Location::default(),
        };
        assert!(token.is_eof());
        assert!(!Token::Character('x').is_eof());
    }

    #[test]
    fn test_token_display() {
        let token = Token::DocType {
            name: Some("html".to_string()),
            force_quirks: false,
            pub_identifier: None,
            sys_identifier: None,
        };
        assert_eq!(format!("{token}"), "<!DOCTYPE html />");

        let token = Token::DocType {
            name: Some("html".to_string()),
            force_quirks: false,
            pub_identifier: Some("foo".to_string()),
            sys_identifier: Some("bar".to_string()),
        };
        assert_eq!(
            format!("{token}"),
            r#"<!DOCTYPE html PUBLIC "foo" SYSTEM "bar" />"#
        );
    }

    #[test]
    fn test_token_display_comment() {
        let token = Token::Comment("Hello World".to_string());
        assert_eq!(format!("{token}"), "<!-- Hello World -->");

        let token = Token::Comment("<p>Hello world</p>".to_string());
        assert_eq!(format!("{token}"), "<!-- <p>Hello world</p> -->");
    }

    #[test]
    fn test_token_display_start_tag() {
        let token = Token::StartTag {
            name: "html".to_string(),
            is_self_closing: false,
            attributes: Vec::new(),
        };
        assert_eq!(format!("{token}"), "<html>");

        let token = Token::StartTag {
            name: "html".to_string(),
            is_self_closing: false,
            attributes: vec![Attribute::new("foo", "bar")],
        };
        assert_eq!(format!("{token}"), r#"<html foo="bar">"#);

        let token = Token::StartTag {
            name: "br".to_string(),
            is_self_closing: true,
            attributes: Vec::new(),
        };
        assert_eq!(format!("{token}"), "<br />");
    }

    #[test]
    fn test_token_display_end_tag() {
        let token = Token::EndTag {
            name: "html".to_string(),
            is_self_closing: false,
            attributes: Vec::new(),
        };
        assert_eq!(format!("{token}"), "</html>");
    }

    #[test]
    fn test_is_start_tag() {
        let token = Token::StartTag {
            name: "div".to_string(),
            is_self_closing: false,
            attributes: Vec::new(),
        };
        assert!(token.is_start_tag("div"));
        assert!(!token.is_start_tag("span"));
        assert!(token.is_any_start_tag());
        assert!(!Token::Character('d').is_any_start_tag());
    }
}
