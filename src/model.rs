use std::str::FromStr;

use crate::error::Error;
use crate::units::Emu;
use crate::xml::NodeId;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WrapMode {
    Front,
    Behind,
    Square,
    Tight,
    TopBottom,
}

impl FromStr for WrapMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "front" => Ok(WrapMode::Front),
            "behind" => Ok(WrapMode::Behind),
            "square" => Ok(WrapMode::Square),
            "tight" => Ok(WrapMode::Tight),
            "top_bottom" | "topBottom" => Ok(WrapMode::TopBottom),
            other => Err(Error::Config(format!("unknown wrap mode {other:?}"))),
        }
    }
}

/// The `wp:wrap*` element written into a floating anchor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WrapElement {
    None,
    SquareBothSides,
    TightBothSides,
    TopAndBottom,
}

impl WrapElement {
    pub fn tag(self) -> &'static str {
        match self {
            WrapElement::None => "wrapNone",
            WrapElement::SquareBothSides => "wrapSquare",
            WrapElement::TightBothSides => "wrapTight",
            WrapElement::TopAndBottom => "wrapTopAndBottom",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VerticalReference {
    Page,
    Paragraph,
}

impl VerticalReference {
    pub fn relative_from(self) -> &'static str {
        match self {
            VerticalReference::Page => "page",
            VerticalReference::Paragraph => "paragraph",
        }
    }
}

impl FromStr for VerticalReference {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "page" => Ok(VerticalReference::Page),
            "paragraph" => Ok(VerticalReference::Paragraph),
            other => Err(Error::Config(format!("unknown vertical reference {other:?}"))),
        }
    }
}

/// Minimum clearance between a floating picture and the surrounding text, in inches.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TextDistances {
    pub top: f64,
    pub bottom: f64,
    pub left: f64,
    pub right: f64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Border {
    pub color: [u8; 3],
    pub weight_pt: f64,
}

/// One named picture position in the template.
#[derive(Clone, Debug, PartialEq)]
pub struct PictureSlotSpec {
    pub stem: String,
    pub anchor_text: Option<String>,
    pub width_in: f64,
    pub x_in: f64,
    pub y_in: f64,
    pub wrap: WrapMode,
    pub vertical_reference: VerticalReference,
    pub distances: TextDistances,
    pub border: Option<Border>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EmuDistances {
    pub top: Emu,
    pub bottom: Emu,
    pub left: Emu,
    pub right: Emu,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BorderStroke {
    pub color: [u8; 3],
    pub width: Emu,
}

impl BorderStroke {
    /// `RRGGBB`, as DrawingML `a:srgbClr` expects it.
    pub fn hex(&self) -> String {
        let [r, g, b] = self.color;
        format!("{r:02X}{g:02X}{b:02X}")
    }
}

/// Final geometry of one picture, ready to be written as `wp:anchor`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedPlacement {
    pub width: Emu,
    pub height: Emu,
    pub x: Emu,
    pub y: Emu,
    pub vertical_reference: VerticalReference,
    pub behind_doc: bool,
    pub wrap: WrapElement,
    pub distances: EmuDistances,
    pub border: Option<BorderStroke>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AnchorResolution {
    /// Positioned on the page; carried by the first paragraph.
    Absolute,
    ParagraphAnchor(NodeId),
}
