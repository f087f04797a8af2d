//! Reading and writing deb822 control stanzas.
//!
//! Used for `DEBIAN/control` members, `Packages` indices and `Release` manifests alike.

use crate::{AptRepositoryError, Result};
use std::fmt;

/// An ordered set of `Key: value` fields.
///
/// Lookups ignore ASCII case; the spelling of the first insertion is kept for output. Values of
/// multi-line fields hold their continuation lines separated by `\n`, with the leading space of
/// each continuation line removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ControlParagraph {
    fields: Vec<(String, String)>,
}

impl ControlParagraph {
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.fields
            .iter()
            .position(|(k, _)| k.eq_ignore_ascii_case(name))
    }

    /// Get the value of a field.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.position(name).map(|i| self.fields[i].1.as_str())
    }

    /// Get the value of a field, failing when it is absent.
    pub fn required(&self, name: &str) -> Result<&str> {
        self.get(name)
            .ok_or_else(|| AptRepositoryError::missing_field(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Set a field, replacing an existing value in place or appending a new field.
    pub fn set<K: Into<String>, V: Into<String>>(&mut self, name: K, value: V) {
        let name = name.into();
        let value = value.into();
        match self.position(&name) {
            Some(i) => self.fields[i].1 = value,
            None => self.fields.push((name, value)),
        }
    }

    /// Remove a field, returning its value.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.position(name).map(|i| self.fields.remove(i).1)
    }

    /// Iterate over `(name, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Parse exactly one paragraph.
    ///
    /// Fails when the text holds no paragraph or more than one.
    pub fn parse(text: &str) -> Result<Self> {
        let mut paragraphs = parse_paragraphs(text)?;
        match paragraphs.len() {
            1 => Ok(paragraphs.remove(0)),
            0 => Err(AptRepositoryError::invalid_control("no paragraph found")),
            n => Err(AptRepositoryError::invalid_control(format!(
                "expected a single paragraph, found {}",
                n
            ))),
        }
    }

    /// Render the paragraph, with a trailing newline but no blank separator line.
    pub fn dump(&self) -> String {
        self.to_string()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ControlParagraph {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut paragraph = Self::new();
        for (k, v) in iter {
            paragraph.set(k, v);
        }
        paragraph
    }
}

impl fmt::Display for ControlParagraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.fields {
            let mut lines = value.split('\n');
            let first = lines.next().unwrap_or_default();
            if first.is_empty() {
                writeln!(f, "{}:", name)?;
            } else {
                writeln!(f, "{}: {}", name, first)?;
            }
            for line in lines {
                // An empty continuation line would end the paragraph.
                if line.is_empty() {
                    writeln!(f, " .")?;
                } else {
                    writeln!(f, " {}", line)?;
                }
            }
        }
        Ok(())
    }
}

/// Split control text into paragraphs.
///
/// Paragraphs are separated by one or more blank lines. Lines starting with `#` at the
/// beginning of a line are comments.
pub fn parse_paragraphs(text: &str) -> Result<Vec<ControlParagraph>> {
    let mut paragraphs = Vec::new();
    let mut current = ControlParagraph::new();

    for (lineno, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                paragraphs.push(std::mem::take(&mut current));
            }
            continue;
        }

        if line.starts_with('#') {
            continue;
        }

        if line.starts_with(' ') || line.starts_with('\t') {
            let Some((_, value)) = current.fields.last_mut() else {
                return Err(AptRepositoryError::invalid_control(format!(
                    "line {}: continuation line without a field",
                    lineno + 1
                )));
            };
            value.push('\n');
            value.push_str(&line[1..]);
            continue;
        }

        let Some((name, value)) = line.split_once(':') else {
            return Err(AptRepositoryError::invalid_control(format!(
                "line {}: expected 'Key: value', got '{}'",
                lineno + 1,
                line
            )));
        };

        let name = name.trim_end();
        if name.is_empty() || name.contains(char::is_whitespace) {
            return Err(AptRepositoryError::invalid_control(format!(
                "line {}: invalid field name '{}'",
                lineno + 1,
                name
            )));
        }
        if current.contains(name) {
            return Err(AptRepositoryError::invalid_control(format!(
                "line {}: duplicate field '{}'",
                lineno + 1,
                name
            )));
        }

        current
            .fields
            .push((name.to_string(), value.trim().to_string()));
    }

    if !current.is_empty() {
        paragraphs.push(current);
    }

    Ok(paragraphs)
}

/// Render paragraphs as a control file, each followed by a blank line.
pub fn dump_paragraphs<'a, I>(paragraphs: I) -> String
where
    I: IntoIterator<Item = &'a ControlParagraph>,
{
    let mut output = String::new();
    for paragraph in paragraphs {
        output.push_str(&paragraph.to_string());
        output.push('\n');
    }
    output
}
