use chrono::NaiveDate;
use exif::{Exif, Field, In, Reader, Tag, Value};
use serde::Serialize;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExifData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_time_original: Option<String>,
    pub camera_make: String,
    pub camera_model: String,
    pub orientation: u32,
    pub latitude: f64,
    pub longitude: f64,
    pub has_location: bool,
}

/// Reads the common EXIF fields from any container kamadak-exif understands.
pub fn extract_exif(path: &Path) -> Result<ExifData, exif::Error> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let exif = Reader::new().read_from_container(&mut reader)?;
    Ok(ExifData::from_exif(&exif))
}

impl ExifData {
    fn from_exif(exif: &Exif) -> Self {
        let date_time_original = exif
            .get_field(Tag::DateTimeOriginal, In::PRIMARY)
            .or_else(|| exif.get_field(Tag::DateTime, In::PRIMARY))
            .and_then(field_datetime);

        let (latitude, longitude, has_location) = match (
            gps_coordinate(exif, Tag::GPSLatitude, Tag::GPSLatitudeRef, b'S'),
            gps_coordinate(exif, Tag::GPSLongitude, Tag::GPSLongitudeRef, b'W'),
        ) {
            (Some(lat), Some(lon)) => (lat, lon, true),
            _ => (0.0, 0.0, false),
        };

        Self {
            date_time_original,
            camera_make: exif
                .get_field(Tag::Make, In::PRIMARY)
                .and_then(field_ascii)
                .unwrap_or_default(),
            camera_model: exif
                .get_field(Tag::Model, In::PRIMARY)
                .and_then(field_ascii)
                .unwrap_or_default(),
            orientation: exif
                .get_field(Tag::Orientation, In::PRIMARY)
                .and_then(|f| f.value.get_uint(0))
                .unwrap_or(0),
            latitude,
            longitude,
            has_location,
        }
    }
}

fn field_ascii(field: &Field) -> Option<String> {
    match &field.value {
        Value::Ascii(values) => values.first().map(|raw| {
            String::from_utf8_lossy(raw)
                .trim_end_matches('\0')
                .trim()
                .to_string()
        }),
        _ => None,
    }
}

fn field_datetime(field: &Field) -> Option<String> {
    let raw = match &field.value {
        Value::Ascii(values) => values.first()?,
        _ => return None,
    };
    let dt = exif::DateTime::from_ascii(raw).ok()?;
    NaiveDate::from_ymd_opt(dt.year.into(), dt.month.into(), dt.day.into())
        .and_then(|d| d.and_hms_opt(dt.hour.into(), dt.minute.into(), dt.second.into()))
        .map(|naive| naive.format("%Y-%m-%dT%H:%M:%S").to_string())
}

fn gps_coordinate(exif: &Exif, value_tag: Tag, ref_tag: Tag, negative_ref: u8) -> Option<f64> {
    let dms = match &exif.get_field(value_tag, In::PRIMARY)?.value {
        Value::Rational(parts) if parts.len() >= 3 => [
            parts[0].to_f64(),
            parts[1].to_f64(),
            parts[2].to_f64(),
        ],
        _ => return None,
    };
    let negative = exif
        .get_field(ref_tag, In::PRIMARY)
        .and_then(field_ascii)
        .map(|r| r.as_bytes().first() == Some(&negative_ref))
        .unwrap_or(false);
    dms_to_decimal(dms, negative)
}

fn dms_to_decimal(dms: [f64; 3], negative: bool) -> Option<f64> {
    let value = dms[0] + dms[1] / 60.0 + dms[2] / 3600.0;
    if !value.is_finite() {
        return None;
    }
    Some(if negative { -value } else { value })
}
