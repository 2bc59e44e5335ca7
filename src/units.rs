use crate::error::Error;

pub const EMU_PER_INCH: i64 = 914_400;
pub const EMU_PER_POINT: i64 = 12_700;

/// English Metric Unit, the integer length unit of DrawingML.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Emu(pub i64);

impl Emu {
    pub const ZERO: Emu = Emu(0);

    pub fn from_inches(inches: f64) -> Emu {
        Emu((inches * EMU_PER_INCH as f64).round() as i64)
    }

    pub fn from_points(points: f64) -> Emu {
        Emu((points * EMU_PER_POINT as f64).round() as i64)
    }

    pub fn to_inches(self) -> f64 {
        self.0 as f64 / EMU_PER_INCH as f64
    }

    pub fn to_points(self) -> f64 {
        self.0 as f64 / EMU_PER_POINT as f64
    }
}

impl std::fmt::Display for Emu {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Height matching `width` at the pixel aspect ratio, rounded half up.
pub fn scale_height(width: Emu, pixel_width: u32, pixel_height: u32) -> Result<Emu, Error> {
    if pixel_width == 0 {
        return Err(Error::Structure("image has zero pixel width".into()));
    }
    let num = width.0 as i128 * pixel_height as i128;
    let den = pixel_width as i128;
    Ok(Emu(((2 * num + den) / (2 * den)) as i64))
}
