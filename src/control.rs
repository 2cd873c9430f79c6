// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Control file primitives.

Repository metadata is expressed as *control files*: paragraphs of
colon-separated key-value fields, where continuation lines begin with
whitespace and an empty line terminates a paragraph. See
<https://www.debian.org/doc/debian-policy/ch-controlfields.html>.
*/

use {
    crate::error::{Result, RootfsError},
    futures::{AsyncBufRead, AsyncBufReadExt},
    std::io::{BufRead, Write},
};

/// A field in a control paragraph.
///
/// The value retains its original formatting, including embedded newlines
/// for multiline fields.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ControlField {
    name: String,
    value: String,
}

impl ControlField {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// Iterate over whitespace-separated words in the value.
    pub fn iter_words(&self) -> impl Iterator<Item = &str> {
        self.value.split_ascii_whitespace()
    }

    /// Iterate over lines in the value, with leading whitespace stripped.
    pub fn iter_lines(&self) -> impl Iterator<Item = &str> {
        self.value.lines().map(|line| line.trim_start())
    }

    /// Write the field to a writer, including the trailing newline.
    pub fn write<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writeln!(writer, "{}: {}", self.name, self.value)
    }
}

/// A paragraph in a control file.
///
/// Paragraphs are ordered sequences of fields. Field names are
/// case-insensitive on read and case-preserving on set. A paragraph holds at
/// most one field per name.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ControlParagraph {
    fields: Vec<ControlField>,
}

impl ControlParagraph {
    /// Whether the paragraph has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Set a field, replacing any existing field of the same name.
    pub fn set_field(&mut self, field: ControlField) {
        self.fields
            .retain(|f| !f.name.eq_ignore_ascii_case(&field.name));
        self.fields.push(field);
    }

    /// Obtain the field with the given name.
    pub fn field(&self, name: &str) -> Option<&ControlField> {
        self.fields.iter().find(|f| f.name.eq_ignore_ascii_case(name))
    }

    /// Obtain the string value of the named field.
    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.field(name).map(|f| f.value())
    }

    /// Obtain the string value of a field that must be present.
    pub fn required_field_str(&self, name: &'static str) -> Result<&str> {
        self.field_str(name)
            .ok_or(RootfsError::ControlRequiredFieldMissing(name))
    }

    /// Iterate fields in insertion order.
    pub fn iter_fields(&self) -> impl Iterator<Item = &ControlField> {
        self.fields.iter()
    }

    /// Serialize the paragraph. A trailing newline terminates the last field
    /// but no paragraph separator is emitted.
    pub fn write<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        for field in &self.fields {
            field.write(writer)?;
        }

        Ok(())
    }
}

/// Incremental parser for control files.
///
/// Feed lines via [Self::write_line]; completed paragraphs are returned as
/// they are terminated.
#[derive(Clone, Debug, Default)]
pub struct ControlFileParser {
    paragraph: ControlParagraph,
    pending: Option<String>,
}

impl ControlFileParser {
    /// Write a line to the parser.
    ///
    /// Returns a paragraph when the line completes one, else `Ok(None)`.
    pub fn write_line(&mut self, line: &str) -> Result<Option<ControlParagraph>> {
        let is_blank = line.trim().is_empty();
        let is_continuation = line.starts_with(' ') && line.len() > 1;

        let pending = self.pending.take();

        if is_blank {
            if let Some(pending) = pending {
                self.flush_field(pending)?;
            }

            return Ok(if self.paragraph.is_empty() {
                None
            } else {
                Some(std::mem::take(&mut self.paragraph))
            });
        }

        match (pending, is_continuation) {
            // Continuation of the field currently being accumulated.
            (Some(pending), true) => {
                self.pending = Some(pending + line);
            }
            // A new field begins; flush the previous one.
            (Some(pending), false) => {
                self.flush_field(pending)?;
                self.pending = Some(line.to_string());
            }
            (None, _) => {
                self.pending = Some(line.to_string());
            }
        }

        Ok(None)
    }

    /// Finish parsing, returning any unterminated paragraph.
    pub fn finish(mut self) -> Result<Option<ControlParagraph>> {
        if let Some(pending) = self.pending.take() {
            self.flush_field(pending)?;
        }

        Ok(if self.paragraph.is_empty() {
            None
        } else {
            Some(self.paragraph)
        })
    }

    fn flush_field(&mut self, raw: String) -> Result<()> {
        let (name, value) = raw.split_once(':').ok_or_else(|| {
            RootfsError::ControlParseError(format!("missing colon in line {:?}", raw))
        })?;

        self.paragraph
            .set_field(ControlField::new(name.trim_end(), value.trim()));

        Ok(())
    }
}

/// Iterator of [ControlParagraph] read from a [BufRead].
pub struct ControlParagraphReader<R: BufRead> {
    reader: R,
    parser: Option<ControlFileParser>,
}

impl<R: BufRead> ControlParagraphReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            parser: Some(ControlFileParser::default()),
        }
    }

    fn get_next(&mut self) -> Result<Option<ControlParagraph>> {
        let mut parser = self.parser.take().expect("parser should be present");

        loop {
            let mut line = String::new();

            if self.reader.read_line(&mut line)? == 0 {
                return parser.finish();
            }

            if let Some(paragraph) = parser.write_line(&line)? {
                self.parser.replace(parser);
                return Ok(Some(paragraph));
            }
        }
    }
}

impl<R: BufRead> Iterator for ControlParagraphReader<R> {
    type Item = Result<ControlParagraph>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.parser.is_none() {
            None
        } else {
            match self.get_next() {
                Ok(Some(paragraph)) => Some(Ok(paragraph)),
                Ok(None) => None,
                Err(e) => Some(Err(e)),
            }
        }
    }
}

/// Asynchronous reader of [ControlParagraph].
pub struct ControlParagraphAsyncReader<R> {
    reader: R,
    parser: Option<ControlFileParser>,
}

impl<R> ControlParagraphAsyncReader<R>
where
    R: AsyncBufRead + Unpin,
{
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            parser: Some(ControlFileParser::default()),
        }
    }

    /// Read the next paragraph. Resolves to [None] at end of input.
    pub async fn read_paragraph(&mut self) -> Result<Option<ControlParagraph>> {
        let mut parser = match self.parser.take() {
            Some(parser) => parser,
            None => return Ok(None),
        };

        loop {
            let mut line = String::new();

            if self.reader.read_line(&mut line).await? == 0 {
                return parser.finish();
            }

            if let Some(paragraph) = parser.write_line(&line)? {
                self.parser.replace(parser);
                return Ok(Some(paragraph));
            }
        }
    }
}
