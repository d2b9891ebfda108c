//! Product name parsing.
//!
//! Level-1 product identifiers encode the satellite, sensing timestamps and
//! the tile or dataset they belong to. Everything the pipeline knows about a
//! product before opening it comes from these names.

use std::sync::OnceLock;

use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{HindcastError, HindcastResult};

fn date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d{8}").expect("valid regex"))
}

fn datetime_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d{8}T\d{6}").expect("valid regex"))
}

/// Sensor families handled by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sensor {
    #[serde(rename = "OLCI")]
    Olci,
    #[serde(rename = "MSI")]
    Msi,
    #[serde(rename = "OLI_TIRS")]
    OliTirs,
}

impl Sensor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sensor::Olci => "OLCI",
            Sensor::Msi => "MSI",
            Sensor::OliTirs => "OLI_TIRS",
        }
    }
}

impl std::str::FromStr for Sensor {
    type Err = HindcastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "OLCI" => Ok(Sensor::Olci),
            "MSI" => Ok(Sensor::Msi),
            "OLI_TIRS" => Ok(Sensor::OliTirs),
            other => Err(HindcastError::UnknownSensor(other.to_string())),
        }
    }
}

impl std::fmt::Display for Sensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Satellites whose products carry a recognizable name prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Satellite {
    S3A,
    S3B,
    S2A,
    S2B,
    L8,
}

impl Satellite {
    /// The mission the satellite belongs to.
    pub fn platform(&self) -> &'static str {
        match self {
            Satellite::S3A | Satellite::S3B => "Sentinel-3",
            Satellite::S2A | Satellite::S2B => "Sentinel-2",
            Satellite::L8 => "Landsat8",
        }
    }

    /// The sensor family carried by the satellite.
    pub fn sensor(&self) -> Sensor {
        match self {
            Satellite::S3A | Satellite::S3B => Sensor::Olci,
            Satellite::S2A | Satellite::S2B => Sensor::Msi,
            Satellite::L8 => Sensor::OliTirs,
        }
    }
}

impl std::fmt::Display for Satellite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Satellite::S3A => "S3A",
            Satellite::S3B => "S3B",
            Satellite::S2A => "S2A",
            Satellite::S2B => "S2B",
            Satellite::L8 => "L8",
        };
        f.write_str(s)
    }
}

/// Identity extracted from a product name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneId {
    pub satellite: Satellite,
    pub sensing_date: NaiveDate,
    pub sensing_datetime: Option<NaiveDateTime>,
    /// Tile id for gridded products, dataset id otherwise.
    pub dataset: String,
}

/// Timestamp fields carried by Sentinel-3 style names.
///
/// Names of this family repeat the sensing window and append the product
/// creation time, which is what distinguishes reprocessed copies of the same
/// acquisition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3NameFields {
    pub satellite: String,
    pub sensing_start: String,
    pub sensing_end: String,
    pub creation_time: NaiveDateTime,
}

/// Baseline grouping key for Sentinel-2 style names.
///
/// The group key is every name component except the processing-baseline
/// field, so reprocessings of one datatake/tile collapse into one group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MsiBaseline {
    pub group_key: String,
    pub baseline: String,
}

/// Return the satellite encoded in a product name.
pub fn satellite_from_name(name: &str) -> HindcastResult<Satellite> {
    if name.contains("S3A") {
        Ok(Satellite::S3A)
    } else if name.contains("S3B") {
        Ok(Satellite::S3B)
    } else if name.contains("S2A") {
        Ok(Satellite::S2A)
    } else if name.contains("S2B") {
        Ok(Satellite::S2B)
    } else if name.contains("LC08") {
        Ok(Satellite::L8)
    } else {
        Err(HindcastError::UnknownSatellite(name.to_string()))
    }
}

/// Read the sensing date from a product name (first 8-digit token).
pub fn sensing_date_from_name(name: &str) -> HindcastResult<NaiveDate> {
    let token = date_re()
        .find(name)
        .ok_or_else(|| HindcastError::MissingSensingDate(name.to_string()))?;
    NaiveDate::parse_from_str(token.as_str(), "%Y%m%d").map_err(|_| {
        HindcastError::InvalidTimestamp {
            name: name.to_string(),
            value: token.as_str().to_string(),
        }
    })
}

/// Read the full sensing timestamp from a product name, where present.
pub fn sensing_datetime_from_name(name: &str) -> Option<NaiveDateTime> {
    let token = datetime_re().find(name)?;
    NaiveDateTime::parse_from_str(token.as_str(), "%Y%m%dT%H%M%S").ok()
}

/// Parse the full identity of a product name.
pub fn parse_scene_id(name: &str) -> HindcastResult<SceneId> {
    let satellite = satellite_from_name(name)?;
    let sensing_date = sensing_date_from_name(name)?;
    let dataset = match satellite {
        // e.g. S3A_OL_1_EFR____... -> "OL_1_EFR"
        Satellite::S3A | Satellite::S3B => name.get(4..12).unwrap_or_default().to_string(),
        // Sentinel-2 names carry the tile id as the sixth underscore field.
        Satellite::S2A | Satellite::S2B => name
            .split('_')
            .nth(5)
            .unwrap_or_default()
            .to_string(),
        // e.g. LC08_L1TP_... -> "L1TP"
        Satellite::L8 => name.get(5..9).unwrap_or_default().to_string(),
    };

    Ok(SceneId {
        satellite,
        sensing_date,
        sensing_datetime: sensing_datetime_from_name(name),
        dataset,
    })
}

/// Parse the sensing/creation fields of a Sentinel-3 style name.
///
/// Returns `None` for names outside this family; callers treat those as
/// exempt from timeliness handling.
pub fn parse_s3_fields(name: &str) -> Option<S3NameFields> {
    if !name.contains("S3A_") && !name.contains("S3B_") {
        return None;
    }
    let parts: Vec<&str> = name.split('_').collect();
    if parts.len() < 10 {
        return None;
    }
    let creation_time = NaiveDateTime::parse_from_str(parts[9], "%Y%m%dT%H%M%S").ok()?;
    Some(S3NameFields {
        satellite: parts[0].to_string(),
        sensing_start: parts[7].to_string(),
        sensing_end: parts[8].to_string(),
        creation_time,
    })
}

/// Parse the baseline grouping key of a Sentinel-2 style name.
pub fn parse_msi_baseline(name: &str) -> Option<MsiBaseline> {
    let parts: Vec<&str> = name.split('_').collect();
    if parts.len() < 6 || !parts[3].starts_with('N') {
        return None;
    }
    Some(MsiBaseline {
        group_key: format!(
            "{}{}{}{}{}",
            parts[0], parts[1], parts[2], parts[4], parts[5]
        ),
        baseline: parts[3].to_string(),
    })
}

/// Fill the placeholders of a local-archive path template with values
/// derived from a product name.
///
/// Supported placeholders: `{product_name}`, `{satellite}`, `{sensor}`,
/// `{dataset}`, `{year}`, `{month}`, `{day}`.
pub fn l1_product_path(template: &str, product_name: &str) -> HindcastResult<String> {
    let scene = parse_scene_id(product_name)?;
    Ok(template
        .replace("{product_name}", product_name)
        .replace("{satellite}", scene.satellite.platform())
        .replace("{sensor}", scene.satellite.sensor().as_str())
        .replace("{dataset}", &scene.dataset)
        .replace("{year}", &scene.sensing_date.format("%Y").to_string())
        .replace("{month}", &scene.sensing_date.format("%m").to_string())
        .replace("{day}", &scene.sensing_date.format("%d").to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const S3_NAME: &str = "S3A_OL_1_EFR____20210104T093232_20210104T093532_20210105T134312_0180_067_036_2160_LN1_O_NT_002.SEN3";
    const S2_NAME: &str = "S2A_MSIL1C_20210104T102411_N0209_R065_T32TLS_20210104T123456.SAFE";
    const L8_NAME: &str = "LC08_L1TP_195028_20210104_20210112_01_T1";

    #[test]
    fn satellite_detection() {
        assert_eq!(satellite_from_name(S3_NAME).unwrap(), Satellite::S3A);
        assert_eq!(satellite_from_name(S2_NAME).unwrap(), Satellite::S2A);
        assert_eq!(satellite_from_name(L8_NAME).unwrap(), Satellite::L8);
        assert!(satellite_from_name("GOES16_whatever").is_err());
    }

    #[test]
    fn sensing_date_extraction() {
        let date = sensing_date_from_name(S3_NAME).unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2021, 1, 4).unwrap());
        assert!(sensing_date_from_name("no-digits-here").is_err());
    }

    #[test]
    fn sensing_datetime_extraction() {
        let dt = sensing_datetime_from_name(S2_NAME).unwrap();
        assert_eq!(dt.format("%Y%m%dT%H%M%S").to_string(), "20210104T102411");
        assert!(sensing_datetime_from_name("LC08_plain").is_none());
    }

    #[test]
    fn scene_id_fields() {
        let scene = parse_scene_id(S3_NAME).unwrap();
        assert_eq!(scene.dataset, "OL_1_EFR");
        assert_eq!(scene.satellite.sensor(), Sensor::Olci);

        let scene = parse_scene_id(S2_NAME).unwrap();
        assert_eq!(scene.dataset, "T32TLS");
    }

    #[test]
    fn s3_fields_parse() {
        let fields = parse_s3_fields(S3_NAME).unwrap();
        assert_eq!(fields.sensing_start, "20210104T093232");
        assert_eq!(fields.sensing_end, "20210104T093532");
        assert_eq!(
            fields.creation_time.format("%Y%m%dT%H%M%S").to_string(),
            "20210105T134312"
        );
        assert!(parse_s3_fields(S2_NAME).is_none());
    }

    #[test]
    fn msi_baseline_parse() {
        let baseline = parse_msi_baseline(S2_NAME).unwrap();
        assert_eq!(baseline.baseline, "N0209");
        assert!(baseline.group_key.contains("T32TLS"));
        assert!(!baseline.group_key.contains("N0209"));
        assert!(parse_msi_baseline(S3_NAME).is_none());
    }

    #[test]
    fn path_template_fill() {
        let path = l1_product_path(
            "/dias/{satellite}/{sensor}/{dataset}/{year}/{month}/{day}/{product_name}",
            S3_NAME,
        )
        .unwrap();
        assert_eq!(
            path,
            format!("/dias/Sentinel-3/OLCI/OL_1_EFR/2021/01/04/{}", S3_NAME)
        );
    }
}
