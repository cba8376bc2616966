//! S7 address notation
//!
//! Turns the textual PLC addresses used on HMI screens into an
//! [`AddressDescriptor`] carrying the wire parameters of a read/write job.
//!
//! Supported forms, matched in this order (case-insensitive, anchored):
//!
//! ```text
//! EB1000  AW4  MD0        <area><B|W|D><offset>
//! E5.5    A0.0 M100.2     <area><offset>.<bit>
//! DB1000.DBW100           DB<n>.DB<B|W|D><offset>
//! DB1.DBX5.1              DB<n>.DBX<offset>.<bit>
//! ```
//!
//! Areas: `E` process inputs, `A` process outputs, `M` merkers, `DB` data blocks.

use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use crate::error::AddressParseError;

// ============================================================================
// Memory Area / Word Length
// ============================================================================

/// PLC memory area, discriminants are the protocol area codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u8)]
pub enum MemoryArea {
    /// Process inputs (PE)
    ProcessInputs = 0x81,
    /// Process outputs (PA)
    ProcessOutputs = 0x82,
    /// Merkers / flag memory (MK)
    Merkers = 0x83,
    /// Data blocks (DB)
    DataBlock = 0x84,
    /// Counters (CT)
    Counters = 0x1C,
    /// Timers (TM)
    Timers = 0x1D,
}

impl MemoryArea {
    /// Area code sent to the transport
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// German mnemonic used in address notation
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Self::ProcessInputs => "E",
            Self::ProcessOutputs => "A",
            Self::Merkers => "M",
            Self::DataBlock => "DB",
            Self::Counters => "Z",
            Self::Timers => "T",
        }
    }

    /// Resolve the area letters of an address (E, A, M, DB)
    pub fn from_letters(letters: &str) -> Option<Self> {
        if letters.eq_ignore_ascii_case("E") {
            Some(Self::ProcessInputs)
        } else if letters.eq_ignore_ascii_case("A") {
            Some(Self::ProcessOutputs)
        } else if letters.eq_ignore_ascii_case("M") {
            Some(Self::Merkers)
        } else if letters.eq_ignore_ascii_case("DB") {
            Some(Self::DataBlock)
        } else {
            None
        }
    }
}

impl TryFrom<u8> for MemoryArea {
    type Error = u8;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0x81 => Ok(Self::ProcessInputs),
            0x82 => Ok(Self::ProcessOutputs),
            0x83 => Ok(Self::Merkers),
            0x84 => Ok(Self::DataBlock),
            0x1C => Ok(Self::Counters),
            0x1D => Ok(Self::Timers),
            other => Err(other),
        }
    }
}

impl fmt::Display for MemoryArea {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// Transfer unit, discriminants are the protocol word length codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u8)]
pub enum WordLength {
    Bit = 0x01,
    Byte = 0x02,
    Word = 0x04,
    DWord = 0x06,
    Real = 0x08,
    Counter = 0x1C,
    Timer = 0x1D,
}

impl WordLength {
    /// Word length code sent to the transport
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Bytes occupied by one element on the wire
    pub const fn unit_size(self) -> usize {
        match self {
            Self::Bit | Self::Byte => 1,
            Self::Word | Self::Counter | Self::Timer => 2,
            Self::DWord | Self::Real => 4,
        }
    }
}

impl TryFrom<u8> for WordLength {
    type Error = u8;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0x01 => Ok(Self::Bit),
            0x02 => Ok(Self::Byte),
            0x04 => Ok(Self::Word),
            0x06 => Ok(Self::DWord),
            0x08 => Ok(Self::Real),
            0x1C => Ok(Self::Counter),
            0x1D => Ok(Self::Timer),
            other => Err(other),
        }
    }
}

/// Width letter of a byte-aligned address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AccessWidth {
    /// `B`, 1 byte
    Byte,
    /// `W`, 2 bytes
    Word,
    /// `D`, 4 bytes
    DWord,
}

impl AccessWidth {
    pub fn from_letter(letter: char) -> Option<Self> {
        match letter.to_ascii_uppercase() {
            'B' => Some(Self::Byte),
            'W' => Some(Self::Word),
            'D' => Some(Self::DWord),
            _ => None,
        }
    }

    pub const fn size(self) -> usize {
        match self {
            Self::Byte => 1,
            Self::Word => 2,
            Self::DWord => 4,
        }
    }

    pub const fn letter(self) -> char {
        match self {
            Self::Byte => 'B',
            Self::Word => 'W',
            Self::DWord => 'D',
        }
    }

    fn from_size(size: usize) -> Self {
        match size {
            2 => Self::Word,
            4 => Self::DWord,
            _ => Self::Byte,
        }
    }
}

// ============================================================================
// Address Descriptor
// ============================================================================

/// Parsed S7 address
///
/// Immutable; built by [`parse`] or the checked constructors and consumed by
/// a single read/write job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct AddressDescriptor {
    area: MemoryArea,
    length: WordLength,
    size: usize,
    db_number: u16,
    offset: u32,
    bit_offset: u8,
}

impl AddressDescriptor {
    /// Byte-aligned address in E, A or M
    ///
    /// Counters, timers and data blocks have no byte notation here; data
    /// blocks go through [`AddressDescriptor::db_byte`].
    pub fn byte(area: MemoryArea, offset: u32, width: AccessWidth) -> Result<Self, AddressParseError> {
        require_process_area(area)?;
        Ok(Self::raw(area, WordLength::Byte, width.size(), 0, offset, 0))
    }

    /// Byte-aligned address inside a data block
    pub fn db_byte(db_number: u16, offset: u32, width: AccessWidth) -> Self {
        Self::raw(
            MemoryArea::DataBlock,
            WordLength::Byte,
            width.size(),
            db_number,
            offset,
            0,
        )
    }

    /// Single bit in E, A or M
    pub fn bit(area: MemoryArea, offset: u32, bit_offset: u8) -> Result<Self, AddressParseError> {
        require_process_area(area)?;
        Self::bit_in(area, 0, offset, bit_offset)
    }

    /// Single bit inside a data block
    pub fn db_bit(db_number: u16, offset: u32, bit_offset: u8) -> Result<Self, AddressParseError> {
        Self::bit_in(MemoryArea::DataBlock, db_number, offset, bit_offset)
    }

    fn bit_in(
        area: MemoryArea,
        db_number: u16,
        offset: u32,
        bit_offset: u8,
    ) -> Result<Self, AddressParseError> {
        if bit_offset > 7 {
            return Err(AddressParseError::BitOffsetOutOfRange(bit_offset));
        }
        // Effective offset is an absolute bit index and must stay addressable
        if offset.checked_mul(8).and_then(|bits| bits.checked_add(u32::from(bit_offset))).is_none() {
            return Err(AddressParseError::NumericOverflowOrFormat(format!(
                "{offset}.{bit_offset}"
            )));
        }
        Ok(Self::raw(area, WordLength::Bit, 1, db_number, offset, bit_offset))
    }

    fn raw(
        area: MemoryArea,
        length: WordLength,
        size: usize,
        db_number: u16,
        offset: u32,
        bit_offset: u8,
    ) -> Self {
        Self {
            area,
            length,
            size,
            db_number,
            offset,
            bit_offset,
        }
    }

    pub fn area(&self) -> MemoryArea {
        self.area
    }

    pub fn length(&self) -> WordLength {
        self.length
    }

    /// Byte width of the addressed value (1, 2 or 4)
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn db_number(&self) -> u16 {
        self.db_number
    }

    pub fn offset(&self) -> u32 {
        self.offset
    }

    pub fn bit_offset(&self) -> u8 {
        self.bit_offset
    }

    pub fn is_bit(&self) -> bool {
        self.length == WordLength::Bit
    }

    /// Start offset passed to the transport
    ///
    /// Bit addresses are indexed by absolute bit position, everything else by byte.
    pub fn effective_offset(&self) -> u32 {
        match self.length {
            WordLength::Bit => self.offset * 8 + u32::from(self.bit_offset),
            _ => self.offset,
        }
    }

    /// Element count passed to the transport
    pub fn amount(&self) -> u32 {
        (self.size / self.length.unit_size()) as u32
    }
}

impl fmt::Display for AddressDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = AccessWidth::from_size(self.size).letter();
        match (self.area, self.length) {
            (MemoryArea::DataBlock, WordLength::Bit) => write!(
                f,
                "DB{}.DBX{}.{}",
                self.db_number, self.offset, self.bit_offset
            ),
            (MemoryArea::DataBlock, _) => {
                write!(f, "DB{}.DB{}{}", self.db_number, width, self.offset)
            },
            (area, WordLength::Bit) => write!(f, "{}{}.{}", area, self.offset, self.bit_offset),
            (area, _) => write!(f, "{}{}{}", area, width, self.offset),
        }
    }
}

impl FromStr for AddressDescriptor {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse(s)
    }
}

/// E, A and M are the only areas addressed without a block number
fn require_process_area(area: MemoryArea) -> Result<(), AddressParseError> {
    match area {
        MemoryArea::ProcessInputs | MemoryArea::ProcessOutputs | MemoryArea::Merkers => Ok(()),
        other => Err(AddressParseError::UnknownArea(other.mnemonic().to_string())),
    }
}

// ============================================================================
// Parser
// ============================================================================

/// Parse an address such as `EB1000`, `E5.5`, `DB1000.DBW100` or `DB1.DBX5.1`
pub fn parse(text: &str) -> Result<AddressDescriptor, AddressParseError> {
    let mut scanner = Scanner::new(text);

    if scanner.at_db_number() {
        return parse_data_block(text, scanner);
    }

    let letters = scanner.take_while(|c| c.is_ascii_alphabetic());
    let digits = scanner.take_while(|c| c.is_ascii_digit());
    if letters.is_empty() || digits.is_empty() {
        return Err(no_match(text));
    }

    match letters.len() {
        // <area><width><offset>
        2 if scanner.at_end() => {
            let (area_letter, width_letter) = letters.split_at(1);
            let area = process_area(area_letter)?;
            let width = width(width_letter.chars().next())?;
            AddressDescriptor::byte(area, number(digits)?, width)
        },
        // <area><offset>.<bit>
        1 if scanner.eat(b'.') => {
            let bit = scanner.bit_digit().ok_or_else(|| no_match(text))?;
            if !scanner.at_end() {
                return Err(no_match(text));
            }
            let area = process_area(letters)?;
            AddressDescriptor::bit(area, number(digits)?, bit)
        },
        _ => Err(no_match(text)),
    }
}

/// DB<n>.DB<B|W|D><offset> and DB<n>.DBX<offset>.<bit>
fn parse_data_block(
    text: &str,
    mut scanner: Scanner<'_>,
) -> Result<AddressDescriptor, AddressParseError> {
    scanner.eat_keyword("DB");
    let db_digits = scanner.take_while(|c| c.is_ascii_digit());

    if !scanner.eat(b'.') || !scanner.eat_keyword("DB") {
        return Err(no_match(text));
    }
    let width_letter = match scanner.bump() {
        Some(c) if c.is_ascii_alphabetic() => char::from(c),
        _ => return Err(no_match(text)),
    };
    let digits = scanner.take_while(|c| c.is_ascii_digit());
    if digits.is_empty() {
        return Err(no_match(text));
    }

    if width_letter.eq_ignore_ascii_case(&'X') {
        if !scanner.eat(b'.') {
            return Err(no_match(text));
        }
        let bit = scanner.bit_digit().ok_or_else(|| no_match(text))?;
        if !scanner.at_end() {
            return Err(no_match(text));
        }
        AddressDescriptor::db_bit(db_number(db_digits)?, number(digits)?, bit)
    } else {
        if !scanner.at_end() {
            return Err(no_match(text));
        }
        let width = width(Some(width_letter))?;
        Ok(AddressDescriptor::db_byte(
            db_number(db_digits)?,
            number(digits)?,
            width,
        ))
    }
}

fn no_match(text: &str) -> AddressParseError {
    AddressParseError::NoMatch(text.to_string())
}

/// Areas reachable without a block number
fn process_area(letters: &str) -> Result<MemoryArea, AddressParseError> {
    match MemoryArea::from_letters(letters) {
        Some(area) if area != MemoryArea::DataBlock => Ok(area),
        _ => Err(AddressParseError::UnknownArea(letters.to_string())),
    }
}

fn width(letter: Option<char>) -> Result<AccessWidth, AddressParseError> {
    let letter = letter.unwrap_or_default();
    AccessWidth::from_letter(letter).ok_or(AddressParseError::UnknownWidth(letter))
}

fn number(digits: &str) -> Result<u32, AddressParseError> {
    digits
        .parse()
        .map_err(|_| AddressParseError::NumericOverflowOrFormat(digits.to_string()))
}

fn db_number(digits: &str) -> Result<u16, AddressParseError> {
    digits
        .parse()
        .map_err(|_| AddressParseError::NumericOverflowOrFormat(digits.to_string()))
}

/// Byte cursor over ASCII address text
struct Scanner<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn new(text: &'a str) -> Self {
        Self { text, pos: 0 }
    }

    fn peek_at(&self, ahead: usize) -> Option<u8> {
        self.text.as_bytes().get(self.pos + ahead).copied()
    }

    fn at_end(&self) -> bool {
        self.pos >= self.text.len()
    }

    fn bump(&mut self) -> Option<u8> {
        let c = self.peek_at(0)?;
        self.pos += 1;
        Some(c)
    }

    fn eat(&mut self, expected: u8) -> bool {
        match self.peek_at(0) {
            Some(c) if c.eq_ignore_ascii_case(&expected) => {
                self.pos += 1;
                true
            },
            _ => false,
        }
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        let start = self.pos;
        if keyword.bytes().all(|k| self.eat(k)) {
            true
        } else {
            self.pos = start;
            false
        }
    }

    /// `DB` immediately followed by a digit
    fn at_db_number(&self) -> bool {
        matches!(
            (self.peek_at(0), self.peek_at(1), self.peek_at(2)),
            (Some(d), Some(b), Some(n))
                if d.eq_ignore_ascii_case(&b'D') && b.eq_ignore_ascii_case(&b'B') && n.is_ascii_digit()
        )
    }

    /// Consume a run of ASCII bytes; always ends on a char boundary
    fn take_while(&mut self, pred: impl Fn(u8) -> bool) -> &'a str {
        let start = self.pos;
        while matches!(self.peek_at(0), Some(c) if pred(c)) {
            self.pos += 1;
        }
        &self.text[start..self.pos]
    }

    /// Exactly one decimal digit; `None` when absent or followed by more digits
    fn bit_digit(&mut self) -> Option<u8> {
        let digits = self.take_while(|c| c.is_ascii_digit());
        match digits.as_bytes() {
            [d] => Some(d - b'0'),
            _ => None,
        }
    }
}
