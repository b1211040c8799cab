//! `monitors.xml` reader and writer.

use std::io;

use quick_xml::escape::EscapeError;
use quick_xml::events::attributes::AttrError;
use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use thiserror::Error;

use super::{Configuration, OutputConfig, OutputKey};
use crate::rect::Rectangle;
use crate::transform::MonitorTransform;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Could not read the next event")]
    ReadEvent(#[from] quick_xml::Error),
    #[error("Malformed attribute")]
    Attribute(#[from] AttrError),
    #[error("Invalid escape sequence")]
    Escape(#[from] EscapeError),
    #[error("Text is not valid UTF-8")]
    DecodeUtf8(#[from] std::str::Utf8Error),
    #[error("Missing <monitors> root element")]
    MissingRoot,
    #[error("Unsupported version {0:?}")]
    UnknownVersion(Option<String>),
    #[error("Unexpected element <{element}> inside <{parent}>")]
    UnexpectedElement {
        element: String,
        parent: &'static str,
    },
    #[error("Unexpected text {text:?} inside <{parent}>")]
    UnexpectedText { text: String, parent: &'static str },
    #[error("Unexpected end of file inside <{0}>")]
    UnexpectedEof(&'static str),
    #[error("<output> has no name attribute")]
    MissingOutputName,
    #[error("Invalid number {value:?} in <{field}>")]
    InvalidNumber { field: &'static str, value: String },
    #[error("Invalid boolean {value:?} in <{field}>")]
    InvalidBool { field: &'static str, value: String },
    #[error("Unknown rotation {0:?}")]
    UnknownRotation(String),
}

const SUPPORTED_VERSION: &str = "1";

fn element_name(start: &BytesStart) -> String {
    String::from_utf8_lossy(start.local_name().as_ref()).into_owned()
}

fn unexpected(start: &BytesStart, parent: &'static str) -> ParseError {
    ParseError::UnexpectedElement {
        element: element_name(start),
        parent,
    }
}

/// Only whitespace may appear between structural elements.
fn check_whitespace(text: &[u8], parent: &'static str) -> Result<(), ParseError> {
    let text = std::str::from_utf8(text)?;
    if text.trim().is_empty() {
        Ok(())
    } else {
        Err(ParseError::UnexpectedText {
            text: text.trim().to_string(),
            parent,
        })
    }
}

fn attribute(start: &BytesStart, name: &[u8]) -> Result<Option<String>, ParseError> {
    for attr in start.attributes() {
        let attr = attr?;
        if attr.key.local_name().as_ref() == name {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

/// Parse a whole file into its configurations, in file order.
pub fn parse(input: &str) -> Result<Vec<Configuration>, ParseError> {
    let mut reader = Reader::from_str(input);
    loop {
        match reader.read_event()? {
            Event::Start(start) => {
                check_root(&start)?;
                return parse_monitors(&mut reader);
            }
            Event::Empty(start) => {
                check_root(&start)?;
                return Ok(Vec::new());
            }
            Event::Text(text) => check_whitespace(&text, "document")?,
            Event::Eof => return Err(ParseError::MissingRoot),
            _ => continue,
        }
    }
}

fn check_root(start: &BytesStart) -> Result<(), ParseError> {
    if start.local_name().as_ref() != b"monitors" {
        return Err(unexpected(start, "document"));
    }
    match attribute(start, b"version")? {
        Some(version) if version == SUPPORTED_VERSION => Ok(()),
        other => Err(ParseError::UnknownVersion(other)),
    }
}

fn parse_monitors(reader: &mut Reader<&[u8]>) -> Result<Vec<Configuration>, ParseError> {
    let mut configs = Vec::new();
    loop {
        match reader.read_event()? {
            Event::Start(start) if start.local_name().as_ref() == b"configuration" => {
                if let Some(config) = parse_configuration(reader)? {
                    configs.push(config);
                }
            }
            Event::Empty(start) if start.local_name().as_ref() == b"configuration" => {}
            Event::Start(start) | Event::Empty(start) => {
                return Err(unexpected(&start, "monitors"));
            }
            Event::Text(text) => check_whitespace(&text, "monitors")?,
            Event::End(_) => return Ok(configs),
            Event::Eof => return Err(ParseError::UnexpectedEof("monitors")),
            _ => continue,
        }
    }
}

fn parse_configuration(reader: &mut Reader<&[u8]>) -> Result<Option<Configuration>, ParseError> {
    let mut keys = Vec::new();
    let mut outputs = Vec::new();
    loop {
        match reader.read_event()? {
            Event::Start(start) => match start.local_name().as_ref() {
                b"clone" => {
                    // Accepted for compatibility, clone mode is implied by
                    // overlapping rectangles.
                    let text = read_text(reader, "clone")?;
                    parse_bool("clone", &text)?;
                }
                b"output" => {
                    let name =
                        attribute(&start, b"name")?.ok_or(ParseError::MissingOutputName)?;
                    if let Some((key, config)) = parse_output(reader, name)? {
                        keys.push(key);
                        outputs.push(config);
                    }
                }
                _ => return Err(unexpected(&start, "configuration")),
            },
            Event::Empty(start) => match start.local_name().as_ref() {
                // An output without identity is a disconnected one.
                b"clone" | b"output" => {}
                _ => return Err(unexpected(&start, "configuration")),
            },
            Event::Text(text) => check_whitespace(&text, "configuration")?,
            Event::End(_) => break,
            Event::Eof => return Err(ParseError::UnexpectedEof("configuration")),
            _ => continue,
        }
    }

    if keys.is_empty() {
        return Ok(None);
    }
    Ok(Some(Configuration::new(keys, outputs)))
}

#[derive(Default)]
struct OutputFields {
    vendor: Option<String>,
    product: Option<String>,
    serial: Option<String>,
    width: i32,
    height: i32,
    rate: f32,
    x: i32,
    y: i32,
    rotation: MonitorTransform,
    reflect_x: bool,
    reflect_y: bool,
    primary: bool,
    presentation: bool,
    underscanning: bool,
}

fn parse_output(
    reader: &mut Reader<&[u8]>,
    name: String,
) -> Result<Option<(OutputKey, OutputConfig)>, ParseError> {
    let mut fields = OutputFields::default();
    loop {
        let (start, empty) = match reader.read_event()? {
            Event::Start(start) => (start, false),
            Event::Empty(start) => (start, true),
            Event::Text(text) => {
                check_whitespace(&text, "output")?;
                continue;
            }
            Event::End(_) => break,
            Event::Eof => return Err(ParseError::UnexpectedEof("output")),
            _ => continue,
        };

        let field = match start.local_name().as_ref() {
            b"vendor" => "vendor",
            b"product" => "product",
            b"serial" => "serial",
            b"width" => "width",
            b"height" => "height",
            b"rate" => "rate",
            b"x" => "x",
            b"y" => "y",
            b"rotation" => "rotation",
            b"reflect_x" => "reflect_x",
            b"reflect_y" => "reflect_y",
            b"primary" => "primary",
            b"presentation" => "presentation",
            b"underscanning" => "underscanning",
            _ => return Err(unexpected(&start, "output")),
        };
        let text = if empty {
            String::new()
        } else {
            read_text(reader, field)?
        };

        match field {
            "vendor" => fields.vendor = Some(text),
            "product" => fields.product = Some(text),
            "serial" => fields.serial = Some(text),
            "width" => fields.width = parse_number(field, &text)?,
            "height" => fields.height = parse_number(field, &text)?,
            "rate" => fields.rate = parse_number(field, &text)?,
            "x" => fields.x = parse_number(field, &text)?,
            "y" => fields.y = parse_number(field, &text)?,
            "rotation" => fields.rotation = parse_rotation(&text)?,
            "reflect_x" => fields.reflect_x = parse_bool(field, &text)?,
            "reflect_y" => fields.reflect_y = parse_bool(field, &text)?,
            "primary" => fields.primary = parse_bool(field, &text)?,
            "presentation" => fields.presentation = parse_bool(field, &text)?,
            _ => fields.underscanning = parse_bool(field, &text)?,
        }
    }

    let (Some(vendor), Some(product), Some(serial)) = (fields.vendor, fields.product, fields.serial)
    else {
        return Ok(None);
    };

    let mut transform = fields.rotation;
    if fields.reflect_x {
        transform = MonitorTransform::from_rotation_and_flip(
            transform.rotation(),
            !transform.is_flipped(),
        );
    }
    if fields.reflect_y {
        transform = transform.transform(MonitorTransform::Flipped180);
    }

    let key = OutputKey {
        connector: name,
        vendor,
        product,
        serial,
    };
    let config = OutputConfig {
        enabled: fields.width > 0 && fields.height > 0,
        rect: Rectangle::new(fields.x, fields.y, fields.width, fields.height),
        refresh_rate: fields.rate,
        transform,
        is_primary: fields.primary,
        is_presentation: fields.presentation,
        is_underscanning: fields.underscanning,
    };
    Ok(Some((key, config)))
}

/// Collect the text content of a leaf element up to its end tag.
fn read_text(reader: &mut Reader<&[u8]>, parent: &'static str) -> Result<String, ParseError> {
    let mut raw = String::new();
    loop {
        match reader.read_event()? {
            Event::Text(text) => raw.push_str(std::str::from_utf8(&text)?),
            Event::CData(data) => raw.push_str(std::str::from_utf8(&data)?),
            Event::GeneralRef(reference) => {
                raw.push('&');
                raw.push_str(std::str::from_utf8(&reference)?);
                raw.push(';');
            }
            Event::Start(start) | Event::Empty(start) => return Err(unexpected(&start, parent)),
            Event::End(_) => break,
            Event::Eof => return Err(ParseError::UnexpectedEof(parent)),
            _ => continue,
        }
    }
    let text = quick_xml::escape::unescape(&raw)?;
    Ok(text.trim().to_string())
}

fn parse_number<T: std::str::FromStr>(field: &'static str, text: &str) -> Result<T, ParseError> {
    text.parse().map_err(|_| ParseError::InvalidNumber {
        field,
        value: text.to_string(),
    })
}

fn parse_bool(field: &'static str, text: &str) -> Result<bool, ParseError> {
    match text {
        "yes" => Ok(true),
        "no" => Ok(false),
        _ => Err(ParseError::InvalidBool {
            field,
            value: text.to_string(),
        }),
    }
}

fn parse_rotation(text: &str) -> Result<MonitorTransform, ParseError> {
    match text {
        "normal" => Ok(MonitorTransform::Normal),
        "left" => Ok(MonitorTransform::Rotate90),
        "upside_down" => Ok(MonitorTransform::Rotate180),
        "right" => Ok(MonitorTransform::Rotate270),
        _ => Err(ParseError::UnknownRotation(text.to_string())),
    }
}

fn rotation_name(transform: MonitorTransform) -> &'static str {
    match transform.rotation() {
        1 => "left",
        2 => "upside_down",
        3 => "right",
        _ => "normal",
    }
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

/// Serialize `configs` into the `monitors.xml` grammar.
pub fn serialize<'a>(configs: impl IntoIterator<Item = &'a Configuration>) -> String {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    let result = writer
        .create_element("monitors")
        .with_attribute(("version", SUPPORTED_VERSION))
        .write_inner_content(|w| {
            for config in configs {
                w.create_element("configuration").write_inner_content(|w| {
                    w.create_element("clone")
                        .write_text_content(BytesText::new("no"))?;
                    for (key, output) in config.iter() {
                        write_output(w, key, output)?;
                    }
                    Ok(())
                })?;
            }
            Ok(())
        });
    // Writing into a Vec cannot fail.
    debug_assert!(result.is_ok());

    let mut contents = String::from_utf8(writer.into_inner())
        .unwrap_or_else(|err| String::from_utf8_lossy(err.as_bytes()).into_owned());
    contents.push('\n');
    contents
}

fn text_element<W: io::Write>(w: &mut Writer<W>, name: &str, value: &str) -> io::Result<()> {
    w.create_element(name)
        .write_text_content(BytesText::new(value))?;
    Ok(())
}

fn write_output<W: io::Write>(
    w: &mut Writer<W>,
    key: &OutputKey,
    output: &OutputConfig,
) -> io::Result<()> {
    w.create_element("output")
        .with_attribute(("name", key.connector.as_str()))
        .write_inner_content(|w| {
            text_element(w, "vendor", &key.vendor)?;
            text_element(w, "product", &key.product)?;
            text_element(w, "serial", &key.serial)?;
            if !output.enabled {
                return Ok(());
            }
            text_element(w, "width", &output.rect.width.to_string())?;
            text_element(w, "height", &output.rect.height.to_string())?;
            text_element(w, "rate", &output.refresh_rate.to_string())?;
            text_element(w, "x", &output.rect.x.to_string())?;
            text_element(w, "y", &output.rect.y.to_string())?;
            text_element(w, "rotation", rotation_name(output.transform))?;
            text_element(w, "reflect_x", yes_no(output.transform.is_flipped()))?;
            text_element(w, "reflect_y", "no")?;
            text_element(w, "primary", yes_no(output.is_primary))?;
            text_element(w, "presentation", yes_no(output.is_presentation))?;
            text_element(w, "underscanning", yes_no(output.is_underscanning))?;
            Ok(())
        })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::ALL_TRANSFORMS;
    use proptest::prelude::*;

    const SAMPLE: &str = r#"<monitors version="1">
  <configuration>
    <clone>no</clone>
    <output name="eDP-1">
      <vendor>AUO</vendor>
      <product>0x213e</product>
      <serial>0x00000000</serial>
      <width>1920</width>
      <height>1080</height>
      <rate>60.01</rate>
      <x>0</x>
      <y>0</y>
      <rotation>normal</rotation>
      <reflect_x>no</reflect_x>
      <reflect_y>no</reflect_y>
      <primary>yes</primary>
      <presentation>no</presentation>
      <underscanning>no</underscanning>
    </output>
    <output name="HDMI-1">
      <vendor>GSM</vendor>
      <product>LG &amp; Co</product>
      <serial>0x0001</serial>
      <width>1280</width>
      <height>1024</height>
      <rate>75</rate>
      <x>1920</x>
      <y>0</y>
      <rotation>left</rotation>
      <reflect_x>yes</reflect_x>
    </output>
    <output name="DP-1">
      <vendor>DEL</vendor>
      <product>U2415</product>
      <serial>ABC</serial>
    </output>
  </configuration>
</monitors>
"#;

    #[test]
    fn test_parse_sample() {
        let configs = parse(SAMPLE).unwrap();
        assert_eq!(configs.len(), 1);
        let config = &configs[0];
        assert_eq!(config.len(), 3);

        let (key, edp) = config.iter().next().unwrap();
        assert_eq!(key.connector, "eDP-1");
        assert_eq!(key.vendor, "AUO");
        assert!(edp.enabled && edp.is_primary);
        assert_eq!(edp.rect, Rectangle::new(0, 0, 1920, 1080));
        assert_eq!(edp.refresh_rate, 60.01);

        assert_eq!(config.keys()[1].product, "LG & Co");
        assert_eq!(config.outputs()[1].transform, MonitorTransform::Flipped90);
        assert_eq!(config.outputs()[2], OutputConfig::default());
    }

    #[test]
    fn test_round_trip_is_fully_equal() {
        let configs = parse(SAMPLE).unwrap();
        let reparsed = parse(&serialize(&configs)).unwrap();
        assert_eq!(configs.len(), reparsed.len());
        for (a, b) in configs.iter().zip(&reparsed) {
            assert!(a.equal_full(b), "{:?} != {:?}", a, b);
        }
    }

    #[test]
    fn test_serialize() {
        let configs = parse(SAMPLE).unwrap();
        insta::assert_snapshot!(serialize(&configs), @r#"
<monitors version="1">
  <configuration>
    <clone>no</clone>
    <output name="eDP-1">
      <vendor>AUO</vendor>
      <product>0x213e</product>
      <serial>0x00000000</serial>
      <width>1920</width>
      <height>1080</height>
      <rate>60.01</rate>
      <x>0</x>
      <y>0</y>
      <rotation>normal</rotation>
      <reflect_x>no</reflect_x>
      <reflect_y>no</reflect_y>
      <primary>yes</primary>
      <presentation>no</presentation>
      <underscanning>no</underscanning>
    </output>
    <output name="HDMI-1">
      <vendor>GSM</vendor>
      <product>LG &amp; Co</product>
      <serial>0x0001</serial>
      <width>1280</width>
      <height>1024</height>
      <rate>75</rate>
      <x>1920</x>
      <y>0</y>
      <rotation>left</rotation>
      <reflect_x>yes</reflect_x>
      <reflect_y>no</reflect_y>
      <primary>no</primary>
      <presentation>no</presentation>
      <underscanning>no</underscanning>
    </output>
    <output name="DP-1">
      <vendor>DEL</vendor>
      <product>U2415</product>
      <serial>ABC</serial>
    </output>
  </configuration>
</monitors>
"#);
    }

    #[test]
    fn test_missing_vendor_drops_output() {
        let input = r#"<monitors version="1">
  <configuration>
    <output name="DP-1">
      <product>U2415</product>
      <serial>ABC</serial>
      <width>1920</width>
      <height>1200</height>
    </output>
    <output name="DP-2">
      <vendor>DEL</vendor>
      <product>U2415</product>
      <serial>DEF</serial>
      <width>1920</width>
      <height>1200</height>
    </output>
  </configuration>
</monitors>"#;
        let configs = parse(input).unwrap();
        assert_eq!(configs.len(), 1);
        assert_eq!(configs[0].len(), 1);
        assert_eq!(configs[0].keys()[0].connector, "DP-2");
    }

    #[test]
    fn test_zero_size_disables() {
        let input = r#"<monitors version="1"><configuration><output name="DP-1">
            <vendor>DEL</vendor><product>U2415</product><serial>A</serial>
            <width>0</width><height>1200</height><x>5</x>
        </output></configuration></monitors>"#;
        let configs = parse(input).unwrap();
        assert_eq!(configs[0].outputs()[0], OutputConfig::default());
    }

    #[test]
    fn test_reflect_y() {
        let input = r#"<monitors version="1"><configuration><output name="DP-1">
            <vendor>DEL</vendor><product>U2415</product><serial>A</serial>
            <width>1920</width><height>1200</height>
            <rotation>normal</rotation><reflect_y>yes</reflect_y>
        </output></configuration></monitors>"#;
        let configs = parse(input).unwrap();
        assert_eq!(configs[0].outputs()[0].transform, MonitorTransform::Flipped180);

        // A vertical flip after a quarter turn mirrors the turn.
        let input = r#"<monitors version="1"><configuration><output name="DP-1">
            <vendor>DEL</vendor><product>U2415</product><serial>A</serial>
            <width>1200</width><height>1920</height>
            <rotation>left</rotation><reflect_y>yes</reflect_y>
        </output></configuration></monitors>"#;
        let configs = parse(input).unwrap();
        assert_eq!(configs[0].outputs()[0].transform, MonitorTransform::Flipped90);
    }

    #[test]
    fn test_errors() {
        assert!(matches!(
            parse(r#"<monitors version="2"></monitors>"#),
            Err(ParseError::UnknownVersion(Some(v))) if v == "2"
        ));
        assert!(matches!(parse(""), Err(ParseError::MissingRoot)));
        assert!(matches!(
            parse(r#"<monitors version="1"><output name="x"/></monitors>"#),
            Err(ParseError::UnexpectedElement { parent: "monitors", .. })
        ));
        assert!(matches!(
            parse(
                r#"<monitors version="1"><configuration><output name="DP-1">
                <width>wide</width></output></configuration></monitors>"#
            ),
            Err(ParseError::InvalidNumber { field: "width", .. })
        ));
        assert!(matches!(
            parse(
                r#"<monitors version="1"><configuration><output name="DP-1">
                <primary>maybe</primary></output></configuration></monitors>"#
            ),
            Err(ParseError::InvalidBool { field: "primary", .. })
        ));
        assert!(matches!(
            parse(
                r#"<monitors version="1"><configuration><output name="DP-1">
                <rotation>sideways</rotation></output></configuration></monitors>"#
            ),
            Err(ParseError::UnknownRotation(_))
        ));
        assert!(parse(r#"<monitors version="1"><configuration>"#).is_err());
        assert!(parse(r#"<monitors version="1"/>"#).unwrap().is_empty());
    }

    /// Identity strings with markup characters; whitespace only inside
    /// since element text is trimmed on read.
    const KEY_TEXT: &str = "[A-Za-z0-9&<>\"'][A-Za-z0-9 &<>\"'.-]{0,8}[A-Za-z0-9&<>\"']";

    fn output_key() -> impl Strategy<Value = OutputKey> {
        (KEY_TEXT, KEY_TEXT, KEY_TEXT, KEY_TEXT).prop_map(|(connector, vendor, product, serial)| {
            OutputKey {
                connector,
                vendor,
                product,
                serial,
            }
        })
    }

    fn output_config() -> impl Strategy<Value = OutputConfig> {
        (
            any::<bool>(),
            (-16384..16384i32, -16384..16384i32, 1..8192i32, 1..8192i32),
            1.0f32..500.0,
            prop::sample::select(ALL_TRANSFORMS.to_vec()),
            any::<[bool; 3]>(),
        )
            .prop_map(
                |(enabled, (x, y, width, height), refresh_rate, transform, flags)| OutputConfig {
                    enabled,
                    rect: Rectangle::new(x, y, width, height),
                    refresh_rate,
                    transform,
                    is_primary: flags[0],
                    is_presentation: flags[1],
                    is_underscanning: flags[2],
                },
            )
    }

    fn configuration() -> impl Strategy<Value = Configuration> {
        prop::collection::vec((output_key(), output_config()), 1..5).prop_map(|outputs| {
            let (keys, outputs) = outputs.into_iter().unzip();
            Configuration::new(keys, outputs)
        })
    }

    proptest! {
        #[test]
        fn serialized_configs_parse_back_unchanged(
            configs in prop::collection::vec(configuration(), 0..4),
        ) {
            let parsed = parse(&serialize(&configs)).unwrap();
            prop_assert_eq!(parsed.len(), configs.len());
            for (parsed, config) in parsed.iter().zip(&configs) {
                prop_assert_eq!(parsed.keys(), config.keys());
                prop_assert_eq!(parsed.outputs(), config.outputs());
                prop_assert!(parsed.equal_full(config));
            }
        }
    }
}
