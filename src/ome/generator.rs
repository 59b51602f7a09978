//! OME-XML generator (component D, §4.D): the inverse of the parser for
//! the write path. Builds the document embedded in the first main IFD's
//! `ImageDescription` tag.
//!
//! Hand-built string generation rather than a serde derive: the output
//! shape is small and fixed (one `Image`, one `Pixels`, N `Channel`s, one
//! self-closing `TiffData`), so a templated `format!` is simpler than
//! round-tripping through a serde model, and it keeps attribute escaping
//! explicit and auditable in one helper.

use super::model::DimensionOrder;

const OME_NAMESPACE: &str = "http://www.openmicroscopy.org/Schemas/OME/2016-06";

/// One channel to emit as a `Channel` element.
#[derive(Debug, Clone)]
pub struct GeneratorChannel {
    pub id: String,
    pub name: Option<String>,
    /// Signed 32-bit RGBA, as OME's `Color` attribute expects.
    pub color: Option<i32>,
}

/// Everything the generator needs to emit a complete OME-XML document
/// for one image (§4.D).
#[derive(Debug, Clone)]
pub struct GeneratorInput {
    pub creator: String,
    pub name: String,
    pub size_x: u32,
    pub size_y: u32,
    pub size_z: u32,
    pub size_c: u32,
    pub size_t: u32,
    pub dimension_order: DimensionOrder,
    /// OME `Type` string (`array_dtype_to_ome_type`'s output).
    pub element_type: String,
    pub physical_size_x: Option<f64>,
    pub physical_size_y: Option<f64>,
    pub physical_size_z: Option<f64>,
    /// Axis-kind unit names (e.g. `"micrometer"`), mapped to OME unit
    /// symbols on emit. Only consulted when the matching physical size is
    /// `Some`.
    pub physical_size_x_unit_name: Option<String>,
    pub physical_size_y_unit_name: Option<String>,
    pub physical_size_z_unit_name: Option<String>,
    pub channels: Vec<GeneratorChannel>,
}

/// `unit-kind name -> OME unit symbol`; unrecognised names pass through
/// unchanged (§4.D).
fn ome_unit_symbol(unit_name: &str) -> &str {
    match unit_name {
        "micrometer" | "micrometre" => "µm",
        "nanometer" | "nanometre" => "nm",
        "millimeter" | "millimetre" => "mm",
        "centimeter" | "centimetre" => "cm",
        "meter" | "metre" => "m",
        "angstrom" => "Å",
        "picometer" | "picometre" => "pm",
        other => other,
    }
}

/// Escape `&`, `<`, `>`, `"` for safe use inside a double-quoted XML
/// attribute value.
fn escape_xml_attr(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            other => out.push(other),
        }
    }
    out
}

fn push_physical_size(out: &mut String, axis: char, size: Option<f64>, unit_name: Option<&str>) {
    if let Some(size) = size {
        out.push_str(&format!(" PhysicalSize{axis}=\"{size}\""));
        let symbol = ome_unit_symbol(unit_name.unwrap_or("micrometer"));
        out.push_str(&format!(
            " PhysicalSize{axis}Unit=\"{}\"",
            escape_xml_attr(symbol)
        ));
    }
}

/// Emit a complete OME-XML document for one image (§4.D). Round-tripping
/// the result through [`super::parser::parse_ome_xml`] must yield
/// identical dimension sizes, element type, dimension order, and channel
/// identifiers (§4.D's round-trip property).
pub fn generate_ome_xml(input: &GeneratorInput) -> String {
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>");
    out.push_str(&format!(
        "<OME xmlns=\"{OME_NAMESPACE}\" Creator=\"{}\">",
        escape_xml_attr(&input.creator)
    ));
    out.push_str(&format!(
        "<Image ID=\"Image:0\" Name=\"{}\">",
        escape_xml_attr(&input.name)
    ));

    out.push_str("<Pixels ID=\"Pixels:0\"");
    out.push_str(&format!(" Type=\"{}\"", escape_xml_attr(&input.element_type)));
    out.push_str(&format!(" SizeX=\"{}\"", input.size_x));
    out.push_str(&format!(" SizeY=\"{}\"", input.size_y));
    out.push_str(&format!(" SizeZ=\"{}\"", input.size_z));
    out.push_str(&format!(" SizeC=\"{}\"", input.size_c));
    out.push_str(&format!(" SizeT=\"{}\"", input.size_t));
    out.push_str(&format!(
        " DimensionOrder=\"{}\"",
        input.dimension_order.as_str()
    ));
    out.push_str(" BigEndian=\"false\"");
    push_physical_size(
        &mut out,
        'X',
        input.physical_size_x,
        input.physical_size_x_unit_name.as_deref(),
    );
    push_physical_size(
        &mut out,
        'Y',
        input.physical_size_y,
        input.physical_size_y_unit_name.as_deref(),
    );
    push_physical_size(
        &mut out,
        'Z',
        input.physical_size_z,
        input.physical_size_z_unit_name.as_deref(),
    );
    out.push('>');

    for channel in &input.channels {
        out.push_str(&format!(
            "<Channel ID=\"{}\"",
            escape_xml_attr(&channel.id)
        ));
        if let Some(name) = &channel.name {
            out.push_str(&format!(" Name=\"{}\"", escape_xml_attr(name)));
        }
        out.push_str(" SamplesPerPixel=\"1\"");
        if let Some(color) = channel.color {
            out.push_str(&format!(" Color=\"{color}\""));
        }
        out.push_str("/>");
    }

    out.push_str("<TiffData/>");
    out.push_str("</Pixels></Image></OME>");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ome::parse_ome_xml;

    fn sample_input() -> GeneratorInput {
        GeneratorInput {
            creator: "ome-bridge".to_string(),
            name: "image & <data>".to_string(),
            size_x: 512,
            size_y: 256,
            size_z: 2,
            size_c: 3,
            size_t: 1,
            dimension_order: DimensionOrder::Xyzct,
            element_type: "uint16".to_string(),
            physical_size_x: Some(0.25),
            physical_size_y: Some(0.25),
            physical_size_z: Some(1.0),
            physical_size_x_unit_name: Some("micrometer".to_string()),
            physical_size_y_unit_name: Some("micrometer".to_string()),
            physical_size_z_unit_name: Some("micrometer".to_string()),
            channels: vec![
                GeneratorChannel {
                    id: "Channel:0:0".to_string(),
                    name: Some("DAPI".to_string()),
                    color: Some(-16776961),
                },
                GeneratorChannel {
                    id: "Channel:0:1".to_string(),
                    name: None,
                    color: None,
                },
                GeneratorChannel {
                    id: "Channel:0:2".to_string(),
                    name: Some("GFP".to_string()),
                    color: Some(16711935),
                },
            ],
        }
    }

    #[test]
    fn escapes_special_characters_in_attribute_values() {
        let xml = generate_ome_xml(&sample_input());
        assert!(xml.contains("Name=\"image &amp; &lt;data&gt;\""));
    }

    #[test]
    fn emits_unit_symbol_and_exactly_one_tiff_data() {
        let xml = generate_ome_xml(&sample_input());
        assert!(xml.contains("PhysicalSizeXUnit=\"µm\""));
        assert_eq!(xml.matches("<TiffData").count(), 1);
        assert!(xml.contains("<TiffData/>"));
    }

    #[test]
    fn round_trips_through_the_parser() {
        let input = sample_input();
        let xml = generate_ome_xml(&input);
        let doc = parse_ome_xml(&xml).unwrap();
        assert_eq!(doc.images.len(), 1);
        let pixels = &doc.images[0].pixels;
        assert_eq!(pixels.size_x, input.size_x);
        assert_eq!(pixels.size_y, input.size_y);
        assert_eq!(pixels.size_z, input.size_z);
        assert_eq!(pixels.size_c, input.size_c);
        assert_eq!(pixels.size_t, input.size_t);
        assert_eq!(pixels.dimension_order, input.dimension_order);
        assert_eq!(pixels.element_type, input.element_type);
        assert_eq!(pixels.channels.len(), input.channels.len());
        for (got, want) in pixels.channels.iter().zip(input.channels.iter()) {
            assert_eq!(&got.id, &want.id);
        }
    }

    #[test]
    fn omits_physical_size_attributes_when_unknown() {
        let mut input = sample_input();
        input.physical_size_x = None;
        input.physical_size_y = None;
        input.physical_size_z = None;
        let xml = generate_ome_xml(&input);
        assert!(!xml.contains("PhysicalSize"));
    }
}
