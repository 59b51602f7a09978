//! Tolerant OME-XML scanner (component C, §4.C).
//!
//! The OME schema is large; this scanner recognises exactly the elements
//! and attributes `spec.md` §4.C names (`Image`, `Pixels`, `Channel`,
//! `TiffData`, `UUID`) and ignores everything else, which is sufficient
//! because every writer observed in the wild emits a strict superset of
//! this subset. No DOM is built — `quick_xml`'s pull-event `Reader` is
//! walked once, tracking just enough state (an element-name stack, plus
//! the in-progress `Image`/`Pixels`/`TiffData`) to extract the model.

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use crate::error::BridgeError;

use super::model::{DimensionOrder, OmeChannel, OmeDocument, OmeImage, OmePixels, TiffDataEntry};

const DEFAULT_ELEMENT_TYPE: &str = "uint16";
const DEFAULT_UNIT: &str = "µm";

/// Whether `text` looks like OME-XML: after optional whitespace, it
/// begins with an XML processing instruction or an `OME` element
/// (optionally namespace-prefixed).
pub fn is_ome_xml(text: &str) -> bool {
    let trimmed = text.trim_start();
    if trimmed.starts_with("<?xml") {
        return true;
    }
    let Some(rest) = trimmed.strip_prefix('<') else {
        return false;
    };
    let local = rest.rsplit(':').next().unwrap_or(rest);
    local.starts_with("OME")
        && matches!(
            local.as_bytes().get(3),
            None | Some(b' ') | Some(b'\t') | Some(b'\n') | Some(b'\r') | Some(b'>') | Some(b'/')
        )
}

/// Parse an OME-XML document into its `Image`/`Pixels` contents.
///
/// Images without a `Pixels` child are dropped silently (§4.C); only the
/// first `Pixels` child of each `Image` is used.
pub fn parse_ome_xml(text: &str) -> Result<OmeDocument, BridgeError> {
    if !is_ome_xml(text) {
        return Err(BridgeError::InvalidXml(
            "document does not begin with an XML declaration or an OME element".to_string(),
        ));
    }

    let mut reader = Reader::from_reader(text.as_bytes());
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    let mut root_uuid = None;
    let mut images = Vec::new();
    let mut stack: Vec<String> = Vec::new();

    let mut current_image: Option<ImageDraft> = None;
    let mut current_pixels: Option<OmePixels> = None;
    let mut current_tiff_data: Option<TiffDataEntry> = None;
    let mut uuid_text: Option<String> = None;

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| BridgeError::InvalidXml(e.to_string()))?;
        match event {
            Event::Eof => break,
            Event::Start(e) => {
                let name = local_name(&e);
                match name.as_str() {
                    "OME" => root_uuid = attr(&e, "UUID").or(root_uuid),
                    "Image" => {
                        current_image = Some(ImageDraft {
                            id: attr(&e, "ID").unwrap_or_default(),
                            name: attr(&e, "Name"),
                            pixels: None,
                        })
                    }
                    "Pixels" if capturing_pixels(&current_image, &current_pixels) => {
                        current_pixels = Some(parse_pixels_attrs(&e)?);
                    }
                    "Channel" if stack.last().map(String::as_str) == Some("Pixels") => {
                        if let Some(pixels) = current_pixels.as_mut() {
                            let index = pixels.channels.len();
                            pixels.channels.push(parse_channel(&e, index));
                        }
                    }
                    "TiffData"
                        if stack.last().map(String::as_str) == Some("Pixels")
                            && current_pixels.is_some() =>
                    {
                        current_tiff_data = Some(parse_tiff_data_attrs(&e));
                    }
                    "UUID"
                        if stack.last().map(String::as_str) == Some("TiffData")
                            && current_tiff_data.is_some() =>
                    {
                        if let Some(entry) = current_tiff_data.as_mut() {
                            entry.file_name = attr(&e, "FileName");
                        }
                        uuid_text = Some(String::new());
                    }
                    _ => {}
                }
                stack.push(name);
            }
            Event::Empty(e) => {
                let name = local_name(&e);
                match name.as_str() {
                    "Pixels" if capturing_pixels(&current_image, &current_pixels) => {
                        let mut pixels = parse_pixels_attrs(&e)?;
                        synthesize_default_channels(&mut pixels);
                        if let Some(img) = current_image.as_mut() {
                            img.pixels = Some(pixels);
                        }
                    }
                    "Channel" if stack.last().map(String::as_str) == Some("Pixels") => {
                        if let Some(pixels) = current_pixels.as_mut() {
                            let index = pixels.channels.len();
                            pixels.channels.push(parse_channel(&e, index));
                        }
                    }
                    "TiffData" if stack.last().map(String::as_str) == Some("Pixels") => {
                        if let Some(pixels) = current_pixels.as_mut() {
                            pixels.tiff_data.push(parse_tiff_data_attrs(&e));
                        }
                    }
                    "UUID" if stack.last().map(String::as_str) == Some("TiffData") => {
                        if let Some(entry) = current_tiff_data.as_mut() {
                            entry.file_name = attr(&e, "FileName");
                        }
                    }
                    _ => {}
                }
            }
            Event::Text(t) => {
                if let Some(buffer) = uuid_text.as_mut() {
                    let decoded = t
                        .unescape()
                        .map_err(|e| BridgeError::InvalidXml(e.to_string()))?;
                    buffer.push_str(&decoded);
                }
            }
            Event::End(e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                stack.pop();
                match name.as_str() {
                    "UUID" => {
                        if let Some(text) = uuid_text.take() {
                            if let Some(entry) = current_tiff_data.as_mut() {
                                entry.uuid = Some(text);
                            }
                        }
                    }
                    "TiffData" => {
                        if let Some(entry) = current_tiff_data.take() {
                            if let Some(pixels) = current_pixels.as_mut() {
                                pixels.tiff_data.push(entry);
                            }
                        }
                    }
                    "Pixels" => {
                        if let Some(mut pixels) = current_pixels.take() {
                            synthesize_default_channels(&mut pixels);
                            if let Some(img) = current_image.as_mut() {
                                if img.pixels.is_none() {
                                    img.pixels = Some(pixels);
                                }
                            }
                        }
                    }
                    "Image" => {
                        if let Some(img) = current_image.take() {
                            if let Some(pixels) = img.pixels {
                                images.push(OmeImage {
                                    id: img.id,
                                    name: img.name,
                                    pixels,
                                });
                            }
                            // else: an Image without a Pixels child is dropped.
                        }
                    }
                    _ => {}
                }
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(OmeDocument { images, root_uuid })
}

struct ImageDraft {
    id: String,
    name: Option<String>,
    pixels: Option<OmePixels>,
}

/// True while we're inside the `Image` whose first `Pixels` hasn't been
/// seen yet and no `Pixels` is currently open (so a new one should start
/// capturing, rather than be silently ignored as a second `Pixels`).
fn capturing_pixels(image: &Option<ImageDraft>, current_pixels: &Option<OmePixels>) -> bool {
    current_pixels.is_none() && image.as_ref().is_some_and(|img| img.pixels.is_none())
}

fn local_name(start: &BytesStart) -> String {
    String::from_utf8_lossy(start.local_name().as_ref()).into_owned()
}

fn attr(start: &BytesStart, name: &str) -> Option<String> {
    start.attributes().flatten().find_map(|a| {
        let key = String::from_utf8_lossy(a.key.local_name().as_ref()).into_owned();
        (key == name).then(|| String::from_utf8_lossy(&a.value).into_owned())
    })
}

fn attr_u32(start: &BytesStart, name: &str, default: u32) -> u32 {
    attr(start, name)
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn attr_f64(start: &BytesStart, name: &str) -> Option<f64> {
    attr(start, name).and_then(|s| s.parse().ok())
}

fn attr_bool(start: &BytesStart, name: &str, default: bool) -> bool {
    attr(start, name)
        .map(|s| s.eq_ignore_ascii_case("true"))
        .unwrap_or(default)
}

fn parse_pixels_attrs(e: &BytesStart) -> Result<OmePixels, BridgeError> {
    let size_x = attr(e, "SizeX")
        .ok_or_else(|| BridgeError::InvalidXml("Pixels missing required SizeX".to_string()))?
        .parse::<u32>()
        .map_err(|_| BridgeError::InvalidXml("SizeX is not an integer".to_string()))?;
    let size_y = attr(e, "SizeY")
        .ok_or_else(|| BridgeError::InvalidXml("Pixels missing required SizeY".to_string()))?
        .parse::<u32>()
        .map_err(|_| BridgeError::InvalidXml("SizeY is not an integer".to_string()))?;
    let dimension_order_str = attr(e, "DimensionOrder")
        .ok_or_else(|| BridgeError::InvalidXml("Pixels missing required DimensionOrder".to_string()))?;
    let dimension_order = DimensionOrder::from_str(&dimension_order_str)?;

    Ok(OmePixels {
        size_x,
        size_y,
        size_z: attr_u32(e, "SizeZ", 1),
        size_c: attr_u32(e, "SizeC", 1),
        size_t: attr_u32(e, "SizeT", 1),
        dimension_order,
        element_type: attr(e, "Type").unwrap_or_else(|| DEFAULT_ELEMENT_TYPE.to_string()),
        physical_size_x: attr_f64(e, "PhysicalSizeX"),
        physical_size_y: attr_f64(e, "PhysicalSizeY"),
        physical_size_z: attr_f64(e, "PhysicalSizeZ"),
        physical_size_x_unit: attr(e, "PhysicalSizeXUnit").unwrap_or_else(|| DEFAULT_UNIT.to_string()),
        physical_size_y_unit: attr(e, "PhysicalSizeYUnit").unwrap_or_else(|| DEFAULT_UNIT.to_string()),
        physical_size_z_unit: attr(e, "PhysicalSizeZUnit").unwrap_or_else(|| DEFAULT_UNIT.to_string()),
        big_endian: attr_bool(e, "BigEndian", false),
        interleaved: attr_bool(e, "Interleaved", false),
        channels: Vec::new(),
        tiff_data: Vec::new(),
    })
}

fn parse_channel(e: &BytesStart, index: usize) -> OmeChannel {
    OmeChannel {
        id: attr(e, "ID").unwrap_or_else(|| format!("Channel:0:{index}")),
        name: attr(e, "Name"),
        samples_per_pixel: attr_u32(e, "SamplesPerPixel", 1),
        color: attr(e, "Color").and_then(|s| s.parse::<i32>().ok()),
    }
}

fn parse_tiff_data_attrs(e: &BytesStart) -> TiffDataEntry {
    TiffDataEntry {
        first_c: attr_u32(e, "FirstC", 0) as usize,
        first_z: attr_u32(e, "FirstZ", 0) as usize,
        first_t: attr_u32(e, "FirstT", 0) as usize,
        ifd: attr_u32(e, "IFD", 0) as usize,
        plane_count: attr_u32(e, "PlaneCount", 1) as usize,
        uuid: None,
        file_name: None,
    }
}

fn synthesize_default_channels(pixels: &mut OmePixels) {
    if pixels.channels.is_empty() {
        pixels.channels = (0..pixels.size_c as usize)
            .map(OmeChannel::default_for_index)
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SINGLE_CHANNEL: &str = r#"<?xml version="1.0" encoding="UTF-8"?><OME xmlns="http://www.openmicroscopy.org/Schemas/OME/2016-06" Creator="OME Bio-Formats 5.2.2" UUID="urn:uuid:2bc2aa39-30d2-44ee-8399-c513492dd5de"><Image ID="Image:0" Name="single-channel.ome.tif"><Pixels BigEndian="true" DimensionOrder="XYZCT" ID="Pixels:0" SizeC="1" SizeT="1" SizeX="439" SizeY="167" SizeZ="1" Type="int8"><Channel ID="Channel:0:0" SamplesPerPixel="1"><LightPath/></Channel><TiffData FirstC="0" FirstT="0" FirstZ="0" IFD="0" PlaneCount="1"><UUID FileName="single-channel.ome.tif">urn:uuid:2bc2aa39-30d2-44ee-8399-c513492dd5de</UUID></TiffData></Pixels></Image></OME>"#;

    #[test]
    fn recognises_ome_xml() {
        assert!(is_ome_xml(SINGLE_CHANNEL));
        assert!(is_ome_xml("  <OME UUID=\"x\"></OME>"));
        assert!(is_ome_xml("<ns:OME></ns:OME>"));
        assert!(!is_ome_xml("<notOme></notOme>"));
        assert!(!is_ome_xml("plain text"));
    }

    #[test]
    fn parses_real_world_single_channel_ome_xml() {
        let doc = parse_ome_xml(SINGLE_CHANNEL).unwrap();
        assert_eq!(
            doc.root_uuid.as_deref(),
            Some("urn:uuid:2bc2aa39-30d2-44ee-8399-c513492dd5de")
        );
        assert_eq!(doc.images.len(), 1);
        let pixels = &doc.images[0].pixels;
        assert_eq!(pixels.size_x, 439);
        assert_eq!(pixels.size_y, 167);
        assert_eq!(pixels.size_z, 1);
        assert_eq!(pixels.size_c, 1);
        assert_eq!(pixels.size_t, 1);
        assert_eq!(pixels.element_type, "int8");
        assert!(pixels.big_endian);
        assert_eq!(pixels.channels.len(), 1);
        assert_eq!(pixels.channels[0].id, "Channel:0:0");
        assert_eq!(pixels.tiff_data.len(), 1);
        let tiff_data = &pixels.tiff_data[0];
        assert_eq!(tiff_data.ifd, 0);
        assert_eq!(tiff_data.plane_count, 1);
        assert_eq!(
            tiff_data.uuid.as_deref(),
            Some("urn:uuid:2bc2aa39-30d2-44ee-8399-c513492dd5de")
        );
        assert_eq!(tiff_data.file_name.as_deref(), Some("single-channel.ome.tif"));
    }

    #[test]
    fn images_without_pixels_are_dropped() {
        let xml = r#"<OME><Image ID="Image:0" Name="no-pixels"></Image><Image ID="Image:1"><Pixels SizeX="4" SizeY="4" DimensionOrder="XYZCT"/></Image></OME>"#;
        let doc = parse_ome_xml(xml).unwrap();
        assert_eq!(doc.images.len(), 1);
        assert_eq!(doc.images[0].id, "Image:1");
    }

    #[test]
    fn only_first_pixels_child_is_used() {
        let xml = r#"<OME><Image ID="Image:0"><Pixels SizeX="4" SizeY="4" SizeC="2" DimensionOrder="XYZCT"/><Pixels SizeX="999" SizeY="999" DimensionOrder="XYZCT"/></Image></OME>"#;
        let doc = parse_ome_xml(xml).unwrap();
        assert_eq!(doc.images[0].pixels.size_x, 4);
        assert_eq!(doc.images[0].pixels.channels.len(), 2);
    }

    #[test]
    fn default_channels_synthesised_when_absent() {
        let xml = r#"<OME><Image ID="Image:0"><Pixels SizeX="4" SizeY="4" SizeC="3" DimensionOrder="XYZCT"/></Image></OME>"#;
        let doc = parse_ome_xml(xml).unwrap();
        let channels = &doc.images[0].pixels.channels;
        assert_eq!(channels.len(), 3);
        assert_eq!(channels[2].id, "Channel:0:2");
    }

    #[test]
    fn invalid_dimension_order_fails() {
        let xml = r#"<OME><Image ID="Image:0"><Pixels SizeX="4" SizeY="4" DimensionOrder="XYQCT"/></Image></OME>"#;
        assert!(matches!(
            parse_ome_xml(xml),
            Err(BridgeError::InvalidDimensionOrder(_))
        ));
    }

    #[test]
    fn rejects_non_xml_input() {
        assert!(matches!(
            parse_ome_xml("not xml at all"),
            Err(BridgeError::InvalidXml(_))
        ));
    }

    #[test]
    fn multi_file_tiff_data_routing() {
        let xml = r#"<OME UUID="urn:uuid:local"><Image ID="Image:0"><Pixels SizeX="4" SizeY="4" SizeC="2" SizeT="2" DimensionOrder="XYZCT"><TiffData FirstC="0" FirstT="0" IFD="0" PlaneCount="1"><UUID FileName="local.ome.tif">urn:uuid:local</UUID></TiffData><TiffData FirstC="1" FirstT="0" IFD="0" PlaneCount="1"><UUID FileName="remote.ome.tif">urn:uuid:remote</UUID></TiffData></Pixels></Image></OME>"#;
        let doc = parse_ome_xml(xml).unwrap();
        let entries = &doc.images[0].pixels.tiff_data;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].uuid.as_deref(), Some("urn:uuid:local"));
        assert_eq!(entries[1].uuid.as_deref(), Some("urn:uuid:remote"));
        assert_eq!(entries[1].file_name.as_deref(), Some("remote.ome.tif"));
    }
}
