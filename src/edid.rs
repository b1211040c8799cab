//! Minimal EDID base-block parser.
//!
//! Only the identity fields are extracted: the PNP manufacturer id, the
//! product code, the serial number and the product-name and serial-string
//! display descriptors.

use thiserror::Error;

const MAGIC: [u8; 8] = [0, 255, 255, 255, 255, 255, 255, 0];
const DESCRIPTOR_OFFSETS: [usize; 4] = [54, 72, 90, 108];
const DESCRIPTOR_LEN: usize = 18;

const TAG_SERIAL_STRING: u8 = 0xff;
const TAG_PRODUCT_NAME: u8 = 0xfc;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EdidError {
    #[error("Unexpected end-of-file at offset {0}")]
    UnexpectedEof(usize),
    #[error("Invalid magic header")]
    InvalidMagic,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EdidIdentity {
    /// Three-letter PNP id. `None` when the encoded letters are out of range.
    pub manufacturer_code: Option<String>,
    pub product_code: u16,
    pub serial_number: u32,
    pub product_name: Option<String>,
    pub serial_string: Option<String>,
}

struct EdidParser<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> EdidParser<'a> {
    fn read_n<const N: usize>(&mut self) -> Result<[u8; N], EdidError> {
        let Some(bytes) = self.data.get(self.pos..self.pos + N) else {
            return Err(EdidError::UnexpectedEof(self.pos));
        };
        let mut out = [0; N];
        out.copy_from_slice(bytes);
        self.pos += N;
        Ok(out)
    }

    fn read_u16(&mut self) -> Result<u16, EdidError> {
        Ok(u16::from_le_bytes(self.read_n()?))
    }

    fn read_u32(&mut self) -> Result<u32, EdidError> {
        Ok(u32::from_le_bytes(self.read_n()?))
    }

    fn parse_magic(&mut self) -> Result<(), EdidError> {
        if self.read_n::<8>()? != MAGIC {
            return Err(EdidError::InvalidMagic);
        }
        Ok(())
    }

    fn parse_manufacturer(&mut self) -> Result<Option<String>, EdidError> {
        let name = self.read_n::<2>()?;
        let letters = [
            (name[0] >> 2) & 0b11111,
            ((name[0] & 0b11) << 3) | (name[1] >> 5),
            name[1] & 0b11111,
        ];
        if letters.iter().any(|&l| !(1..=26).contains(&l)) {
            return Ok(None);
        }
        Ok(Some(letters.iter().map(|&l| (l + b'@') as char).collect()))
    }

    fn descriptor(&self, offset: usize) -> Option<(u8, &'a [u8])> {
        let b = self.data.get(offset..offset + DESCRIPTOR_LEN)?;
        // Display descriptors start with a zero pixel clock.
        if b[0] != 0 || b[1] != 0 {
            return None;
        }
        Some((b[3], &b[5..]))
    }
}

fn descriptor_string(payload: &[u8]) -> Option<String> {
    let end = payload
        .iter()
        .position(|&b| b == b'\n')
        .unwrap_or(payload.len());
    let text = std::str::from_utf8(&payload[..end]).ok()?;
    let text = text.trim_matches(|c: char| c.is_whitespace() || c == '\0');
    (!text.is_empty()).then(|| text.to_string())
}

pub fn parse_identity(data: &[u8]) -> Result<EdidIdentity, EdidError> {
    let mut parser = EdidParser { data, pos: 0 };
    parser.parse_magic()?;
    let manufacturer_code = parser.parse_manufacturer()?;
    let product_code = parser.read_u16()?;
    let serial_number = parser.read_u32()?;

    let mut identity = EdidIdentity {
        manufacturer_code,
        product_code,
        serial_number,
        product_name: None,
        serial_string: None,
    };

    for offset in DESCRIPTOR_OFFSETS {
        match parser.descriptor(offset) {
            Some((TAG_PRODUCT_NAME, payload)) if identity.product_name.is_none() => {
                identity.product_name = descriptor_string(payload);
            }
            Some((TAG_SERIAL_STRING, payload)) if identity.serial_string.is_none() => {
                identity.serial_string = descriptor_string(payload);
            }
            _ => {}
        }
    }

    Ok(identity)
}
