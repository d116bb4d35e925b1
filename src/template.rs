use crate::errors::{Error, Result};
use regex::{Captures, Regex};

/// A reference to a capture group inside a replacement template.
#[derive(Debug, Clone, PartialEq, Eq)]
enum GroupRef {
    Index(usize),
    Name(String),
}

/// A parsed replacement template.
///
/// Templates use backslash references: `\1`..`\99` and `\g<1>` refer to
/// groups by number, `\g<name>` by name, `\g<0>` to the whole match. `\\`,
/// `\n`, `\r` and `\t` are the usual escapes; `\0` (up to two more octal
/// digits) and three octal digits such as `\101` are character codes. Every
/// other character, including `$`, is copied literally.
///
/// The template is translated once into the `regex` crate's expansion
/// syntax so each occurrence can be expanded straight from its own
/// captures.
#[derive(Debug, Clone)]
pub struct Template {
    source: String,
    expansion: String,
    literal: String,
    refs: Vec<GroupRef>,
}

impl Template {
    pub fn parse(source: &str) -> Result<Self> {
        let mut expansion = String::with_capacity(source.len());
        let mut literal = String::with_capacity(source.len());
        let mut refs = Vec::new();

        let mut chars = source.chars().peekable();
        while let Some(c) = chars.next() {
            if c != '\\' {
                push_literal(&mut expansion, &mut literal, c);
                continue;
            }
            match chars.next() {
                Some('0') => {
                    let mut code = 0;
                    for _ in 0..2 {
                        match chars.peek().and_then(|c| c.to_digit(8)) {
                            Some(digit) => {
                                code = code * 8 + digit;
                                chars.next();
                            }
                            None => break,
                        }
                    }
                    push_literal(&mut expansion, &mut literal, octal_char(code)?);
                }
                Some(d) if d.is_ascii_digit() => {
                    let mut digits = String::from(d);
                    if let Some(&next) = chars.peek() {
                        if next.is_ascii_digit() {
                            digits.push(next);
                            chars.next();
                        }
                    }
                    // Three octal digits are a character code, not a group
                    let third = chars.peek().and_then(|c| c.to_digit(8));
                    let code = u32::from_str_radix(&digits, 8).ok();
                    if let (2, Some(third), Some(code)) = (digits.len(), third, code) {
                        chars.next();
                        push_literal(&mut expansion, &mut literal, octal_char(code * 8 + third)?);
                        continue;
                    }
                    let index: usize = digits
                        .parse()
                        .map_err(|_| Error::InvalidTemplate(format!("bad group reference \\{digits}")))?;
                    expansion.push_str(&format!("${{{index}}}"));
                    refs.push(GroupRef::Index(index));
                }
                Some('g') => {
                    if chars.next() != Some('<') {
                        return Err(Error::InvalidTemplate("missing '<' after \\g".into()));
                    }
                    let mut name = String::new();
                    loop {
                        match chars.next() {
                            Some('>') => break,
                            Some(ch) => name.push(ch),
                            None => {
                                return Err(Error::InvalidTemplate(format!(
                                    "missing '>' after \\g<{name}"
                                )));
                            }
                        }
                    }
                    let group = parse_group_name(&name)?;
                    match &group {
                        GroupRef::Index(i) => expansion.push_str(&format!("${{{i}}}")),
                        GroupRef::Name(n) => expansion.push_str(&format!("${{{n}}}")),
                    }
                    refs.push(group);
                }
                Some('\\') => push_literal(&mut expansion, &mut literal, '\\'),
                Some('n') => push_literal(&mut expansion, &mut literal, '\n'),
                Some('r') => push_literal(&mut expansion, &mut literal, '\r'),
                Some('t') => push_literal(&mut expansion, &mut literal, '\t'),
                Some(other) => {
                    push_literal(&mut expansion, &mut literal, '\\');
                    push_literal(&mut expansion, &mut literal, other);
                }
                None => {
                    return Err(Error::InvalidTemplate("dangling backslash at end of template".into()));
                }
            }
        }

        Ok(Self {
            source: source.to_string(),
            expansion,
            literal,
            refs,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn has_backreferences(&self) -> bool {
        !self.refs.is_empty()
    }

    /// The replacement text of a template without back-references.
    pub fn literal(&self) -> Option<&str> {
        if self.has_backreferences() {
            None
        } else {
            Some(&self.literal)
        }
    }

    /// Checks that every referenced group exists in `regex`.
    pub fn validate(&self, regex: &Regex) -> Result<()> {
        for group in &self.refs {
            match group {
                GroupRef::Index(i) if *i >= regex.captures_len() => {
                    return Err(Error::InvalidTemplate(format!(
                        "group {i} does not exist in pattern '{}'",
                        regex.as_str()
                    )));
                }
                GroupRef::Name(n) if !regex.capture_names().flatten().any(|c| c == n) => {
                    return Err(Error::InvalidTemplate(format!(
                        "group '{n}' does not exist in pattern '{}'",
                        regex.as_str()
                    )));
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Expands the template for one match.
    pub fn expand(&self, caps: &Captures<'_>) -> String {
        let mut dst = String::new();
        caps.expand(&self.expansion, &mut dst);
        dst
    }
}

fn push_literal(expansion: &mut String, literal: &mut String, c: char) {
    if c == '$' {
        expansion.push_str("$$");
    } else {
        expansion.push(c);
    }
    literal.push(c);
}

fn octal_char(code: u32) -> Result<char> {
    if code > 0o377 {
        return Err(Error::InvalidTemplate(format!("octal escape \\{code:o} out of range")));
    }
    char::from_u32(code).ok_or_else(|| Error::InvalidTemplate(format!("bad octal escape \\{code:o}")))
}

fn parse_group_name(name: &str) -> Result<GroupRef> {
    if name.is_empty() {
        return Err(Error::InvalidTemplate("empty group name in \\g<>".into()));
    }
    if name.chars().all(|c| c.is_ascii_digit()) {
        return name
            .parse()
            .map(GroupRef::Index)
            .map_err(|_| Error::InvalidTemplate(format!("bad group reference \\g<{name}>")));
    }
    let valid = name.chars().all(|c| c.is_alphanumeric() || c == '_')
        && !name.starts_with(|c: char| c.is_ascii_digit());
    if valid {
        Ok(GroupRef::Name(name.to_string()))
    } else {
        Err(Error::InvalidTemplate(format!("bad group name '{name}'")))
    }
}
