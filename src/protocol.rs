// MIT License - Copyright (c) 2026 Peter Wright
// Command encoding and reply decoding

use std::fmt;

use crate::constants::{ATTRIBUTE_MAX, ATTRIBUTE_MIN, CR, ETX};
use crate::error::{F4Error, Result};

/// One parameter of a command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Param {
    /// Emitted bare, e.g. the area of `GET string5`.
    Arg(String),
    /// Emitted as `-name` or `-name=value`.
    Flag { name: String, value: Option<String> },
}

/// A command for the sensor: a verb followed by ordered parameters.
///
/// Build with the named constructors (`Command::get`, `Command::job_load`, ...)
/// or with [`Command::new`] and the builder methods. `encode` appends the
/// carriage return terminator.
///
/// ```
/// use f4_sensor::protocol::Command;
///
/// let cmd = Command::new("JOBSAVEAS").flag_value("slot", 3).flag_value("name", "demo");
/// assert_eq!(cmd.encode(), b"JOBSAVEAS -slot=3 -name=demo\r");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    verb: String,
    params: Vec<Param>,
}

impl Command {
    pub fn new(verb: impl Into<String>) -> Self {
        Self {
            verb: verb.into(),
            params: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl fmt::Display) -> Self {
        self.params.push(Param::Arg(arg.to_string()));
        self
    }

    pub fn flag(mut self, name: impl Into<String>) -> Self {
        self.params.push(Param::Flag {
            name: name.into(),
            value: None,
        });
        self
    }

    pub fn flag_value(mut self, name: impl Into<String>, value: impl fmt::Display) -> Self {
        self.params.push(Param::Flag {
            name: name.into(),
            value: Some(value.to_string()),
        });
        self
    }

    fn flag_opt(self, name: &str, value: Option<impl fmt::Display>) -> Self {
        match value {
            Some(v) => self.flag_value(name, v),
            None => self,
        }
    }

    pub fn verb(&self) -> &str {
        &self.verb
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    /// The command line without its terminator.
    pub fn to_wire_string(&self) -> String {
        let mut line = self.verb.clone();
        for param in &self.params {
            line.push(' ');
            match param {
                Param::Arg(arg) => line.push_str(arg),
                Param::Flag { name, value } => {
                    line.push('-');
                    line.push_str(name);
                    if let Some(value) = value {
                        line.push('=');
                        line.push_str(value);
                    }
                }
            }
        }
        line
    }

    /// Wire bytes: the command line followed by `\r`.
    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = self.to_wire_string().into_bytes();
        bytes.push(CR);
        bytes
    }

    // -- Named constructors, one per verb ----------------------------------

    pub fn get(area: impl fmt::Display) -> Self {
        Command::new("GET").arg(area)
    }

    pub fn set(area: impl fmt::Display, value: impl fmt::Display) -> Self {
        Command::new("SET").arg(area).arg(value)
    }

    pub fn help() -> Self {
        Command::new("HELP")
    }

    pub fn info(path: Option<&str>) -> Self {
        match path.filter(|p| !p.is_empty()) {
            Some(p) => Command::new("INFO").arg(p),
            None => Command::new("INFO"),
        }
    }

    pub fn trigger() -> Self {
        Command::new("TRIGGER")
    }

    pub fn get_image(request: &ImageRequest) -> Self {
        Command::new("GETIMAGE")
            .flag_opt("format", request.format.as_deref())
            .flag_opt("quality", request.quality)
            .flag_opt("inspection", request.inspection)
    }

    pub fn offline() -> Self {
        Command::new("OFFLINE")
    }

    pub fn online() -> Self {
        Command::new("ONLINE")
    }

    pub fn online_status() -> Self {
        Command::new("ONLINE?")
    }

    pub fn job_save(slot: Option<u32>) -> Self {
        Command::new("JOBSAVE").flag_opt("slot", slot)
    }

    pub fn job_save_as(name: &str, slot: Option<u32>) -> Self {
        Command::new("JOBSAVEAS")
            .flag_opt("slot", slot)
            .flag_value("name", name)
    }

    /// `-r` asks the sensor to run the job once loaded.
    pub fn job_load(slot: u32) -> Self {
        Command::new("JOBLOAD").flag_value("slot", slot).flag("r")
    }

    pub fn job_delete(slot: u32) -> Self {
        Command::new("JOBDELETE").flag_value("slot", slot)
    }

    pub fn job_delete_all() -> Self {
        Command::new("JOBDELETE").flag("all")
    }

    pub fn job_info(query: Option<&str>) -> Self {
        match query.filter(|q| !q.is_empty()) {
            Some(q) => Command::new("JOBINFO").arg(q),
            None => Command::new("JOBINFO"),
        }
    }

    pub fn job_download(size_in_bytes: Option<u64>) -> Self {
        Command::new("JOBDOWNLOAD")
            .flag_value("transfer", "ftp")
            .flag_opt("size", size_in_bytes.filter(|s| *s > 0))
    }

    pub fn job_download_cancel() -> Self {
        Command::new("JOBDOWNLOAD").flag("c")
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_wire_string())
    }
}

/// Encode `verb` followed by bare `name` / `name=value` words.
pub fn encode_command(verb: &str, words: &[(&str, Option<&str>)]) -> Vec<u8> {
    let mut cmd = Command::new(verb);
    for (name, value) in words {
        cmd = match value {
            Some(v) => cmd.arg(format!("{name}={v}")),
            None => cmd.arg(name),
        };
    }
    cmd.encode()
}

// ---------------------------------------------------------------------------
// Attribute addressing
// ---------------------------------------------------------------------------

/// The five attribute tables of the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeKind {
    String,
    Bool,
    /// 16-bit integer
    Int,
    /// 32-bit integer
    Long,
    Float,
}

impl AttributeKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Long => "long",
            Self::Float => "float",
        }
    }

    pub fn from_prefix(s: &str) -> Option<Self> {
        match s {
            "string" => Some(Self::String),
            "bool" => Some(Self::Bool),
            "int" => Some(Self::Int),
            "long" => Some(Self::Long),
            "float" => Some(Self::Float),
            _ => None,
        }
    }
}

impl fmt::Display for AttributeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// An attribute number, guaranteed to be within 1-200.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AttributeNumber(u32);

impl AttributeNumber {
    pub fn new(number: u32) -> Result<Self> {
        if (ATTRIBUTE_MIN..=ATTRIBUTE_MAX).contains(&number) {
            Ok(Self(number))
        } else {
            Err(F4Error::AttributeRange { number })
        }
    }

    pub fn get(&self) -> u32 {
        self.0
    }
}

/// A typed attribute address, rendered on the wire as e.g. `bool12`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Attribute {
    pub kind: AttributeKind,
    pub number: AttributeNumber,
}

impl Attribute {
    pub fn new(kind: AttributeKind, number: AttributeNumber) -> Self {
        Self { kind, number }
    }

    /// Validate `number` and build the address.
    pub fn checked(kind: AttributeKind, number: u32) -> Result<Self> {
        Ok(Self::new(kind, AttributeNumber::new(number)?))
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.kind.prefix(), self.number.0)
    }
}

// ---------------------------------------------------------------------------
// Image capture
// ---------------------------------------------------------------------------

/// A rectangle of the sensor image, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageRegion {
    pub upper_left_x: i32,
    pub upper_left_y: i32,
    pub lower_right_x: i32,
    pub lower_right_y: i32,
}

/// Options for `GETIMAGE`.
///
/// `region` is accepted for API compatibility but the sensor command has no
/// known parameter for it, so it is not sent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageRequest {
    pub format: Option<String>,
    pub quality: Option<u8>,
    pub inspection: Option<u32>,
    pub region: Option<ImageRegion>,
}

// ---------------------------------------------------------------------------
// Reply decoding
// ---------------------------------------------------------------------------

fn strip_framing(raw: &[u8]) -> String {
    let body = raw.strip_suffix(&[ETX]).unwrap_or(raw);
    String::from_utf8_lossy(body).trim_end().to_string()
}

/// Decode a text reply: drop one trailing ETX, then trailing whitespace.
pub fn decode_text(raw: &[u8]) -> String {
    strip_framing(raw)
}

/// Decode a multi-line reply into its non-empty lines.
pub fn decode_lines(raw: &[u8]) -> Vec<String> {
    strip_framing(raw)
        .split("\r\n")
        .filter(|line| !line.trim().is_empty())
        .map(str::to_string)
        .collect()
}

/// One line of a `JOBINFO` listing, e.g. `job3=Inspection.avp`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct JobEntry {
    pub slot: u32,
    pub name: String,
}

/// Parse a single `jobN=name` line.
pub fn parse_job_entry(line: &str) -> Result<JobEntry> {
    let invalid = || F4Error::InvalidResponse {
        details: format!("job listing line: {line:?}"),
    };
    let (key, name) = line.trim().split_once('=').ok_or_else(invalid)?;
    let slot = key
        .strip_prefix("job")
        .and_then(|n| n.parse::<u32>().ok())
        .ok_or_else(invalid)?;
    Ok(JobEntry {
        slot,
        name: name.to_string(),
    })
}

/// Parse a `JOBINFO` listing, keeping the device's order.
pub fn parse_job_list(reply: &str) -> Result<Vec<JobEntry>> {
    reply
        .split("\r\n")
        .filter(|line| !line.trim().is_empty())
        .map(parse_job_entry)
        .collect()
}

/// Find the first free slot in an ascending list of used slots.
///
/// Returns `Some(1)` when slot 1 is free (including an empty list), the first
/// gap otherwise, and `None` when the slots are contiguous from 1. The list is
/// not sorted first; the sensor reports slots in ascending order.
pub fn next_available_slot(used: &[u32]) -> Option<u32> {
    match used.first() {
        None => Some(1),
        Some(&first) if first != 1 => Some(1),
        Some(_) => used
            .iter()
            .zip(1u32..)
            .find(|(slot, expected)| **slot != *expected)
            .map(|(_, expected)| expected),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_bare_words() {
        assert_eq!(encode_command("GET", &[("string5", None)]), b"GET string5\r");
        assert_eq!(
            encode_command("SET", &[("bool1", None), ("1", None)]),
            b"SET bool1 1\r"
        );
        assert_eq!(encode_command("HELP", &[]), b"HELP\r");
    }

    #[test]
    fn test_encode_flags() {
        let cmd = Command::new("JOBDELETE").flag("all");
        assert_eq!(cmd.encode(), b"JOBDELETE -all\r");

        let cmd = Command::new("JOBLOAD").flag_value("slot", 2).flag("r");
        assert_eq!(cmd.to_wire_string(), "JOBLOAD -slot=2 -r");
        assert!(!cmd.encode().ends_with(b"\n"));
    }

    #[test]
    fn test_command_wire_strings() {
        let area = Attribute::checked(AttributeKind::Float, 7).unwrap();
        assert_eq!(Command::get(area).to_wire_string(), "GET float7");
        assert_eq!(Command::set(area, 1.5).to_wire_string(), "SET float7 1.5");
        assert_eq!(Command::info(None).to_wire_string(), "INFO");
        assert_eq!(Command::info(Some("system")).to_wire_string(), "INFO system");
        assert_eq!(Command::online_status().to_wire_string(), "ONLINE?");
        assert_eq!(Command::job_save(None).to_wire_string(), "JOBSAVE");
        assert_eq!(Command::job_save(Some(4)).to_wire_string(), "JOBSAVE -slot=4");
        assert_eq!(
            Command::job_save_as("line 1", Some(2)).to_wire_string(),
            "JOBSAVEAS -slot=2 -name=line 1"
        );
        assert_eq!(Command::job_delete(9).to_wire_string(), "JOBDELETE -slot=9");
        assert_eq!(Command::job_info(Some("3")).to_wire_string(), "JOBINFO 3");
        assert_eq!(
            Command::job_download(Some(2048)).to_wire_string(),
            "JOBDOWNLOAD -transfer=ftp -size=2048"
        );
        assert_eq!(
            Command::job_download(None).to_wire_string(),
            "JOBDOWNLOAD -transfer=ftp"
        );
        assert_eq!(Command::job_download_cancel().to_wire_string(), "JOBDOWNLOAD -c");
    }

    #[test]
    fn test_get_image_ignores_region() {
        let request = ImageRequest {
            format: Some("bmp".to_string()),
            quality: Some(80),
            inspection: Some(2),
            region: Some(ImageRegion {
                upper_left_x: 0,
                upper_left_y: 0,
                lower_right_x: 64,
                lower_right_y: 48,
            }),
        };
        assert_eq!(
            Command::get_image(&request).to_wire_string(),
            "GETIMAGE -format=bmp -quality=80 -inspection=2"
        );
        assert_eq!(
            Command::get_image(&ImageRequest::default()).to_wire_string(),
            "GETIMAGE"
        );
    }

    #[test]
    fn test_attribute_number_range() {
        assert!(AttributeNumber::new(1).is_ok());
        assert!(AttributeNumber::new(200).is_ok());
        assert!(matches!(
            AttributeNumber::new(0),
            Err(F4Error::AttributeRange { number: 0 })
        ));
        assert!(matches!(
            AttributeNumber::new(201),
            Err(F4Error::AttributeRange { number: 201 })
        ));
    }

    #[test]
    fn test_attribute_display() {
        let attr = Attribute::checked(AttributeKind::String, 5).unwrap();
        assert_eq!(attr.to_string(), "string5");
        let attr = Attribute::checked(AttributeKind::Long, 200).unwrap();
        assert_eq!(attr.to_string(), "long200");
        assert_eq!(AttributeKind::from_prefix("bool"), Some(AttributeKind::Bool));
        assert_eq!(AttributeKind::from_prefix("double"), None);
    }

    #[test]
    fn test_decode_text() {
        assert_eq!(decode_text(b"value\r\n\x03"), "value");
        assert_eq!(decode_text(b"value"), "value");
        assert_eq!(decode_text(b""), "");
        // Only one ETX is framing.
        assert_eq!(decode_text(b"a\x03\x03"), "a\x03");
    }

    #[test]
    fn test_decode_lines() {
        assert_eq!(
            decode_lines(b"system\r\nimage\r\n\r\n\x03"),
            vec!["system".to_string(), "image".to_string()]
        );
        assert!(decode_lines(b"\x03").is_empty());
    }

    #[test]
    fn test_parse_job_list() {
        let jobs = parse_job_list("job1=a.avp\r\njob2=b.avp\r\njob10=c.avp").unwrap();
        assert_eq!(
            jobs.iter().map(|j| j.slot).collect::<Vec<_>>(),
            vec![1, 2, 10]
        );
        assert_eq!(jobs[2].name, "c.avp");
        assert!(parse_job_list("").unwrap().is_empty());
        assert!(matches!(
            parse_job_list("ERROR"),
            Err(F4Error::InvalidResponse { .. })
        ));
        assert!(parse_job_entry("jobx=a").is_err());
    }

    #[test]
    fn test_next_available_slot() {
        assert_eq!(next_available_slot(&[1, 2, 4]), Some(3));
        assert_eq!(next_available_slot(&[2, 3, 4]), Some(1));
        assert_eq!(next_available_slot(&[1, 2, 3]), None);
        assert_eq!(next_available_slot(&[]), Some(1));
        // First gap wins.
        assert_eq!(next_available_slot(&[1, 3, 5]), Some(2));
    }
}
