//! Compound selector subset understood by [`MemoryDom`](super::MemoryDom).
//!
//! Supported: an optional tag (or `*`), `#id`, `.class`, `[attr]` and
//! `[attr="value"]` / `[attr='value']` / `[attr=value]`, all on one element.
//! Combinators and selector lists are rejected.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttrMatcher {
    pub name: String,
    pub value: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selector {
    pub tag: Option<String>,
    pub id: Option<String>,
    pub classes: Vec<String>,
    pub attrs: Vec<AttrMatcher>,
}

impl Selector {
    /// Parse a compound selector. Returns `None` for empty or unsupported input.
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        if input.is_empty() {
            return None;
        }

        let mut selector = Selector::default();
        let chars: Vec<char> = input.chars().collect();
        let mut pos = 0;

        if chars[0] == '*' {
            pos = 1;
        } else if is_ident_char(chars[0]) {
            let tag = read_ident(&chars, &mut pos);
            selector.tag = Some(tag.to_ascii_lowercase());
        }

        while pos < chars.len() {
            match chars[pos] {
                '#' => {
                    pos += 1;
                    let id = read_ident(&chars, &mut pos);
                    if id.is_empty() {
                        return None;
                    }
                    selector.id = Some(id);
                }
                '.' => {
                    pos += 1;
                    let class = read_ident(&chars, &mut pos);
                    if class.is_empty() {
                        return None;
                    }
                    selector.classes.push(class);
                }
                '[' => {
                    pos += 1;
                    selector.attrs.push(read_attr(&chars, &mut pos)?);
                }
                _ => return None,
            }
        }

        Some(selector)
    }

    /// Test an element given its tag name and an attribute lookup.
    pub fn matches<F>(&self, tag: &str, attribute: F) -> bool
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(expected) = &self.tag {
            if !expected.eq_ignore_ascii_case(tag) {
                return false;
            }
        }

        if let Some(id) = &self.id {
            if attribute("id").as_deref() != Some(id.as_str()) {
                return false;
            }
        }

        if !self.classes.is_empty() {
            let class_attr = attribute("class").unwrap_or_default();
            let present: Vec<&str> = class_attr.split_whitespace().collect();
            if !self.classes.iter().all(|c| present.contains(&c.as_str())) {
                return false;
            }
        }

        self.attrs.iter().all(|matcher| match attribute(&matcher.name) {
            None => false,
            Some(actual) => matcher.value.as_ref().is_none_or(|v| *v == actual),
        })
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_'
}

fn read_ident(chars: &[char], pos: &mut usize) -> String {
    let start = *pos;
    while *pos < chars.len() && is_ident_char(chars[*pos]) {
        *pos += 1;
    }
    chars[start..*pos].iter().collect()
}

fn read_attr(chars: &[char], pos: &mut usize) -> Option<AttrMatcher> {
    let name = read_ident(chars, pos);
    if name.is_empty() {
        return None;
    }

    match chars.get(*pos)? {
        ']' => {
            *pos += 1;
            Some(AttrMatcher { name, value: None })
        }
        '=' => {
            *pos += 1;
            let value = match chars.get(*pos)? {
                quote @ ('"' | '\'') => {
                    let quote = *quote;
                    *pos += 1;
                    let start = *pos;
                    while *pos < chars.len() && chars[*pos] != quote {
                        *pos += 1;
                    }
                    if *pos >= chars.len() {
                        return None;
                    }
                    let value: String = chars[start..*pos].iter().collect();
                    *pos += 1;
                    value
                }
                _ => read_ident(chars, pos),
            };
            if chars.get(*pos) != Some(&']') {
                return None;
            }
            *pos += 1;
            Some(AttrMatcher {
                name,
                value: Some(value),
            })
        }
        _ => None,
    }
}
