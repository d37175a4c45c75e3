//! NDJSON and JSON array input/output for records and converted resources.

use serde::Serialize;
use std::io::{BufRead, Write};

/// Error type for serialization operations
#[derive(Debug)]
pub enum SerializationError {
    JsonError(serde_json::Error),
    IoError(std::io::Error),
    /// A line of an NDJSON input is not valid JSON.
    InvalidLine { line: usize, source: serde_json::Error },
}

impl From<serde_json::Error> for SerializationError {
    fn from(err: serde_json::Error) -> Self {
        SerializationError::JsonError(err)
    }
}

impl From<std::io::Error> for SerializationError {
    fn from(err: std::io::Error) -> Self {
        SerializationError::IoError(err)
    }
}

impl std::fmt::Display for SerializationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SerializationError::JsonError(e) => write!(f, "JSON error: {}", e),
            SerializationError::IoError(e) => write!(f, "IO error: {}", e),
            SerializationError::InvalidLine { line, source } => {
                write!(f, "Invalid JSON on line {}: {}", line, source)
            }
        }
    }
}

impl std::error::Error for SerializationError {}

/// Read NDJSON, one value per non-blank line.
pub fn read_ndjson<R: BufRead>(reader: R) -> Result<Vec<serde_json::Value>, SerializationError> {
    let mut values = Vec::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let value = serde_json::from_str(&line).map_err(|source| SerializationError::InvalidLine {
            line: line_no + 1,
            source,
        })?;
        values.push(value);
    }
    Ok(values)
}

/// Writes one JSON value per line.
pub struct NdjsonWriter<W: Write> {
    writer: W,
    written: usize,
}

impl<W: Write> NdjsonWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, written: 0 }
    }

    pub fn write<T: Serialize>(&mut self, item: &T) -> Result<(), SerializationError> {
        let json = serde_json::to_string(item)?;
        writeln!(self.writer, "{}", json)?;
        self.written += 1;
        Ok(())
    }

    pub fn written(&self) -> usize {
        self.written
    }

    pub fn flush(&mut self) -> Result<(), SerializationError> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Writes values as a single JSON array.
pub struct JsonArrayWriter<W: Write> {
    writer: W,
    first: bool,
}

impl<W: Write> JsonArrayWriter<W> {
    /// Create the writer and open the array.
    pub fn new(mut writer: W) -> Result<Self, SerializationError> {
        write!(writer, "[")?;
        Ok(Self {
            writer,
            first: true,
        })
    }

    pub fn write<T: Serialize>(&mut self, item: &T) -> Result<(), SerializationError> {
        if !self.first {
            write!(self.writer, ",")?;
        }
        self.first = false;

        let json = serde_json::to_string(item)?;
        write!(self.writer, "{}", json)?;
        Ok(())
    }

    /// Close the array and flush.
    pub fn finish(mut self) -> Result<(), SerializationError> {
        write!(self.writer, "]")?;
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::TargetResource;

    fn resources() -> Vec<TargetResource> {
        vec![
            TargetResource::new().with_literal("dcterms:title", "Foo"),
            TargetResource::new().with_literal("dcterms:title", "Bar"),
        ]
    }

    #[test]
    fn test_ndjson_writer() {
        let mut buf = Vec::new();
        let mut writer = NdjsonWriter::new(&mut buf);
        for resource in resources() {
            writer.write(&resource).unwrap();
        }
        assert_eq!(writer.written(), 2);
        writer.flush().unwrap();

        let output = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = output.lines().collect();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], r#"{"dcterms:title":[{"value":"Foo"}]}"#);
        assert!(lines[1].contains("Bar"));
    }

    #[test]
    fn test_json_array_writer() {
        let mut buf = Vec::new();
        let mut writer = JsonArrayWriter::new(&mut buf).unwrap();
        for resource in resources() {
            writer.write(&resource).unwrap();
        }
        writer.finish().unwrap();

        let parsed: Vec<TargetResource> = serde_json::from_slice(&buf).unwrap();
        assert_eq!(parsed, resources());
    }

    #[test]
    fn test_read_ndjson() {
        let input = "{\"id\": \"A1\"}\n\n{\"id\": \"A2\"}\n";
        let values = read_ndjson(input.as_bytes()).unwrap();
        assert_eq!(values.len(), 2);
        assert_eq!(values[1]["id"], "A2");

        let broken = read_ndjson("{\"id\": 1}\n{oops\n".as_bytes());
        assert!(matches!(broken, Err(SerializationError::InvalidLine { line: 2, .. })));
    }
}
