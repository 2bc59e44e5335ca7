use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use log::debug;
use serde::Deserialize;

use crate::error::Error;
use crate::model::{Border, PictureSlotSpec, TextDistances, VerticalReference, WrapMode};

fn default_student_column() -> String {
    "Estudiant".into()
}

fn default_name_marker() -> String {
    "NOM: ".into()
}

fn default_wrap() -> String {
    "square".into()
}

fn default_v_relative() -> String {
    "paragraph".into()
}

fn default_border_pt() -> f64 {
    1.0
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    table: PathBuf,
    template: PathBuf,
    pictures_dir: PathBuf,
    output_dir: PathBuf,
    #[serde(default)]
    sheet: Option<String>,
    #[serde(default = "default_student_column")]
    student_column: String,
    #[serde(default = "default_name_marker")]
    name_marker: String,
    #[serde(default)]
    grades: BTreeMap<String, String>,
    #[serde(default)]
    pictures: Vec<RawSlot>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSlot {
    stem: String,
    #[serde(default)]
    anchor_text: Option<String>,
    width_in: f64,
    #[serde(default)]
    x_in: f64,
    #[serde(default)]
    y_in: f64,
    #[serde(default = "default_wrap")]
    wrap: String,
    #[serde(default = "default_v_relative")]
    v_relative: String,
    #[serde(default)]
    dist_t: f64,
    #[serde(default)]
    dist_b: f64,
    #[serde(default)]
    dist_l: f64,
    #[serde(default)]
    dist_r: f64,
    #[serde(default)]
    border_color: Option<String>,
    #[serde(default = "default_border_pt")]
    border_pt: f64,
}

/// Everything one batch run needs. Built once and never mutated.
#[derive(Clone, Debug)]
pub struct Config {
    pub table: PathBuf,
    pub sheet: Option<String>,
    pub template: PathBuf,
    pub pictures_dir: PathBuf,
    pub output_dir: PathBuf,
    pub student_column: String,
    pub name_marker: String,
    /// Semantic grade key -> column label in the table.
    pub grades: BTreeMap<String, String>,
    /// Picture slots, in the order they are placed.
    pub pictures: Vec<PictureSlotSpec>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Config, Error> {
        if !path.is_file() {
            return Err(Error::Config(format!("config file not found: {}", path.display())));
        }
        let text = std::fs::read_to_string(path)?;
        let base = path.parent().unwrap_or_else(|| Path::new(""));
        let config = Config::from_toml(&text, base)?;
        debug!(
            "Loaded config {} with {} picture slot(s)",
            path.display(),
            config.pictures.len()
        );
        Ok(config)
    }

    /// Parses a config; relative paths are resolved against `base`.
    pub fn from_toml(text: &str, base: &Path) -> Result<Config, Error> {
        let raw: RawConfig = toml::from_str(text)?;

        let mut seen = HashSet::new();
        let mut pictures = Vec::with_capacity(raw.pictures.len());
        for slot in raw.pictures {
            let spec = slot.validate()?;
            if !seen.insert(spec.stem.clone()) {
                return Err(Error::Config(format!("duplicate picture stem {:?}", spec.stem)));
            }
            pictures.push(spec);
        }

        if raw.student_column.trim().is_empty() {
            return Err(Error::Config("student_column must not be empty".into()));
        }

        Ok(Config {
            table: base.join(raw.table),
            sheet: raw.sheet,
            template: base.join(raw.template),
            pictures_dir: base.join(raw.pictures_dir),
            output_dir: base.join(raw.output_dir),
            student_column: raw.student_column,
            name_marker: raw.name_marker,
            grades: raw.grades,
            pictures,
        })
    }
}

fn parse_hex_color(val: &str) -> Option<[u8; 3]> {
    let val = val.trim_start_matches('#');
    if val.len() != 6 || !val.is_ascii() {
        return None;
    }
    let r = u8::from_str_radix(&val[0..2], 16).ok()?;
    let g = u8::from_str_radix(&val[2..4], 16).ok()?;
    let b = u8::from_str_radix(&val[4..6], 16).ok()?;
    Some([r, g, b])
}

impl RawSlot {
    fn validate(self) -> Result<PictureSlotSpec, Error> {
        let stem = self.stem.trim().to_lowercase();
        if stem.is_empty() {
            return Err(Error::Config("picture slot with empty stem".into()));
        }
        let context = |e: Error| match e {
            Error::Config(reason) => Error::Config(format!("slot {stem:?}: {reason}")),
            other => other,
        };
        if !self.width_in.is_finite() || self.width_in <= 0.0 {
            let reason = format!("width_in must be positive, got {}", self.width_in);
            return Err(context(Error::Config(reason)));
        }
        let lengths = [self.x_in, self.y_in, self.dist_t, self.dist_b, self.dist_l, self.dist_r];
        if lengths.iter().any(|v| !v.is_finite()) {
            return Err(context(Error::Config("lengths must be finite numbers".into())));
        }
        if [self.dist_t, self.dist_b, self.dist_l, self.dist_r].iter().any(|&v| v < 0.0) {
            return Err(context(Error::Config("text distances must not be negative".into())));
        }
        let wrap: WrapMode = self.wrap.parse().map_err(context)?;
        let vertical_reference: VerticalReference = self.v_relative.parse().map_err(context)?;

        let border = match self.border_color.as_deref() {
            None => None,
            Some(color) => {
                let color = parse_hex_color(color).ok_or_else(|| {
                    context(Error::Config(format!("border_color {color:?} is not RRGGBB")))
                })?;
                if !self.border_pt.is_finite() || self.border_pt <= 0.0 {
                    return Err(context(Error::Config("border_pt must be positive".into())));
                }
                Some(Border { color, weight_pt: self.border_pt })
            }
        };

        let anchor_text = self.anchor_text.filter(|t| !t.trim().is_empty());

        Ok(PictureSlotSpec {
            stem,
            anchor_text,
            width_in: self.width_in,
            x_in: self.x_in,
            y_in: self.y_in,
            wrap,
            vertical_reference,
            distances: TextDistances {
                top: self.dist_t,
                bottom: self.dist_b,
                left: self.dist_l,
                right: self.dist_r,
            },
            border,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = r#"
table = "grades.xlsx"
template = "informe.docx"
pictures_dir = "fotos"
output_dir = "/tmp/out"

[grades]
phonics = "(vocals + P L M D G F C)"
"#;

    fn with_slot(slot: &str) -> Result<Config, Error> {
        Config::from_toml(&format!("{BASE}\n[[pictures]]\n{slot}"), Path::new("/data"))
    }

    #[test]
    fn resolves_paths_and_defaults() {
        let config = with_slot(
            r#"stem = "Port"
width_in = 2.0
x_in = 1.0
y_in = 0.5
wrap = "behind"
v_relative = "page"
border_color = "1f4e79"
"#,
        )
        .unwrap();
        assert_eq!(config.table, PathBuf::from("/data/grades.xlsx"));
        assert_eq!(config.output_dir, PathBuf::from("/tmp/out"));
        assert_eq!(config.student_column, "Estudiant");
        assert_eq!(config.name_marker, "NOM: ");
        assert_eq!(config.grades["phonics"], "(vocals + P L M D G F C)");

        let slot = &config.pictures[0];
        assert_eq!(slot.stem, "port");
        assert_eq!(slot.anchor_text, None);
        assert_eq!(slot.wrap, WrapMode::Behind);
        assert_eq!(slot.vertical_reference, VerticalReference::Page);
        assert_eq!(slot.border, Some(Border { color: [0x1F, 0x4E, 0x79], weight_pt: 1.0 }));
    }

    #[test]
    fn unknown_wrap_mode_is_rejected() {
        let err = with_slot("stem = \"a\"\nwidth_in = 1.0\nwrap = \"through\"\n").unwrap_err();
        assert!(matches!(err, Error::Config(ref m) if m.contains("through")), "{err}");
    }

    #[test]
    fn malformed_slots_are_rejected() {
        assert!(with_slot("stem = \"a\"\nwidth_in = 0.0\n").is_err());
        assert!(with_slot("stem = \" \"\nwidth_in = 1.0\n").is_err());
        assert!(with_slot("stem = \"a\"\nwidth_in = 1.0\nborder_color = \"blue\"\n").is_err());
        assert!(with_slot("stem = \"a\"\nwidth_in = 1.0\nv_relative = \"margin\"\n").is_err());
        assert!(with_slot("stem = \"a\"\nwidth_in = 1.0\nheight_in = 2.0\n").is_err());
    }

    #[test]
    fn duplicate_stems_are_rejected() {
        let slots = "stem = \"a\"\nwidth_in = 1.0\n[[pictures]]\nstem = \"A\"\nwidth_in = 2.0\n";
        let err = with_slot(slots).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
