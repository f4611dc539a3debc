//! GDAL's XML metadata dialects, read and written with `quick_xml`.
//!
//! Two shapes share one reader:
//!
//! ```text
//! GDAL_METADATA tag      <GDALMetadata>
//!                          <Item name="AREA_OR_POINT">Area</Item>
//!                          <Item name="STATISTICS_MEAN" sample="0">12.5</Item>
//!                        </GDALMetadata>
//!
//! .aux.xml sidecar       <PAMDataset>
//!                          <SRS>EPSG:4326</SRS>
//!                          <Metadata><MDI key="AREA_OR_POINT">Area</MDI></Metadata>
//!                          <PAMRasterBand band="1"><Metadata>..</Metadata></PAMRasterBand>
//!                        </PAMDataset>
//! ```
//!
//! `sample` is zero-based, `band` is one-based; both end up as zero-based
//! band indices. Items in a named metadata domain (`<Metadata domain="..">`)
//! are ignored.

use super::GeoError;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::collections::BTreeMap;

pub type ItemMap = BTreeMap<String, String>;

/// Band-level items keyed by zero-based band index.
pub type BandItems = BTreeMap<usize, ItemMap>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GdalMetadata {
    /// `<SRS>` text of a sidecar.
    pub srs: Option<String>,
    pub dataset: ItemMap,
    pub bands: BandItems,
}

enum Field {
    Srs,
    Item { name: String, band: Option<usize> },
}

impl GdalMetadata {
    fn insert(&mut self, field: Field, value: String) {
        match field {
            Field::Srs => self.srs = Some(value.trim().to_string()),
            Field::Item { name, band: Some(band) } => {
                self.bands.entry(band).or_default().insert(name, value);
            }
            Field::Item { name, band: None } => {
                self.dataset.insert(name, value);
            }
        }
    }
}

fn attr(e: &BytesStart<'_>, name: &str) -> Result<Option<String>, GeoError> {
    match e.try_get_attribute(name).map_err(quick_xml::Error::from)? {
        Some(a) => Ok(Some(a.unescape_value()?.into_owned())),
        None => Ok(None),
    }
}

fn index_attr(e: &BytesStart<'_>, name: &str) -> Result<Option<usize>, GeoError> {
    Ok(attr(e, name)?.and_then(|v| v.trim().parse().ok()))
}

fn field_for(e: &BytesStart<'_>, band: Option<usize>) -> Result<Option<Field>, GeoError> {
    let field = match e.name().as_ref() {
        b"SRS" => Some(Field::Srs),
        b"Item" => match attr(e, "name")? {
            Some(name) => Some(Field::Item {
                name,
                band: index_attr(e, "sample")?,
            }),
            None => None,
        },
        b"MDI" => attr(e, "key")?.map(|name| Field::Item { name, band }),
        _ => None,
    };
    Ok(field)
}

/// Parse a `<GDALMetadata>` tag value or a `<PAMDataset>` sidecar.
pub fn parse(xml: &str) -> Result<GdalMetadata, GeoError> {
    let mut reader = Reader::from_str(xml);
    let mut doc = GdalMetadata::default();
    let mut band = None;
    let mut other_domain = false;
    let mut field = None;
    let mut text = String::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                match e.name().as_ref() {
                    b"PAMRasterBand" => {
                        band = index_attr(&e, "band")?.and_then(|b| b.checked_sub(1));
                    }
                    b"Metadata" => {
                        other_domain = attr(&e, "domain")?.is_some_and(|d| !d.is_empty());
                    }
                    _ => {}
                }
                field = field_for(&e, band)?;
                text.clear();
            }
            Event::Empty(e) => {
                if let Some(empty) = field_for(&e, band)?
                    && !other_domain
                {
                    doc.insert(empty, String::new());
                }
            }
            Event::Text(t) if field.is_some() => text.push_str(&t.unescape()?),
            Event::CData(c) if field.is_some() => text.push_str(&String::from_utf8_lossy(&c)),
            Event::End(e) => match e.name().as_ref() {
                b"PAMRasterBand" => band = None,
                b"Metadata" => other_domain = false,
                _ => {
                    if let Some(done) = field.take()
                        && !other_domain
                    {
                        doc.insert(done, std::mem::take(&mut text));
                    }
                }
            },
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(doc)
}

fn write_element<W: std::io::Write>(
    writer: &mut Writer<W>,
    tag: &str,
    attrs: &[(&str, &str)],
    text: &str,
) -> Result<(), GeoError> {
    let mut start = BytesStart::new(tag);
    start.extend_attributes(attrs.iter().copied());
    writer.write_event(Event::Start(start))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(tag)))?;
    Ok(())
}

fn write_mdi_block<W: std::io::Write>(writer: &mut Writer<W>, items: &ItemMap) -> Result<(), GeoError> {
    writer.write_event(Event::Start(BytesStart::new("Metadata")))?;
    for (key, value) in items {
        write_element(writer, "MDI", &[("key", key.as_str())], value)?;
    }
    writer.write_event(Event::End(BytesEnd::new("Metadata")))?;
    Ok(())
}

fn into_string(writer: Writer<Vec<u8>>) -> Result<String, GeoError> {
    String::from_utf8(writer.into_inner())
        .map_err(|e| GeoError::InvalidRaster(format!("metadata XML: {e}")))
}

/// Value of the GDAL_METADATA TIFF tag.
pub fn gdal_metadata_xml(dataset: &ItemMap, bands: &BandItems) -> Result<String, GeoError> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer.write_event(Event::Start(BytesStart::new("GDALMetadata")))?;
    for (name, value) in dataset {
        write_element(&mut writer, "Item", &[("name", name.as_str())], value)?;
    }
    for (band, items) in bands {
        let sample = band.to_string();
        for (name, value) in items {
            write_element(
                &mut writer,
                "Item",
                &[("name", name.as_str()), ("sample", sample.as_str())],
                value,
            )?;
        }
    }
    writer.write_event(Event::End(BytesEnd::new("GDALMetadata")))?;
    into_string(writer)
}

/// Contents of a `<file>.aux.xml` sidecar.
pub fn pam_xml(srs: Option<&str>, dataset: &ItemMap, bands: &BandItems) -> Result<String, GeoError> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer.write_event(Event::Start(BytesStart::new("PAMDataset")))?;
    if let Some(srs) = srs {
        write_element(&mut writer, "SRS", &[], srs)?;
    }
    if !dataset.is_empty() {
        write_mdi_block(&mut writer, dataset)?;
    }
    for (band, items) in bands {
        let number = (band + 1).to_string();
        let mut start = BytesStart::new("PAMRasterBand");
        start.push_attribute(("band", number.as_str()));
        writer.write_event(Event::Start(start))?;
        write_mdi_block(&mut writer, items)?;
        writer.write_event(Event::End(BytesEnd::new("PAMRasterBand")))?;
    }
    writer.write_event(Event::End(BytesEnd::new("PAMDataset")))?;
    into_string(writer)
}
