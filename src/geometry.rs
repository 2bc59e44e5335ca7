use crate::error::Error;
use crate::model::{
    BorderStroke, EmuDistances, PictureSlotSpec, ResolvedPlacement, WrapElement, WrapMode,
};
use crate::units::{Emu, scale_height};

/// `(behindDoc, wrap element)` written for each wrap mode.
pub fn wrap_layout(mode: WrapMode) -> (bool, WrapElement) {
    match mode {
        WrapMode::Front => (false, WrapElement::None),
        WrapMode::Behind => (true, WrapElement::None),
        WrapMode::Square => (false, WrapElement::SquareBothSides),
        WrapMode::Tight => (false, WrapElement::TightBothSides),
        WrapMode::TopBottom => (false, WrapElement::TopAndBottom),
    }
}

pub fn resolve(
    slot: &PictureSlotSpec,
    pixel_width: u32,
    pixel_height: u32,
) -> Result<ResolvedPlacement, Error> {
    let width = Emu::from_inches(slot.width_in);
    if width.0 <= 0 {
        return Err(Error::Config(format!(
            "slot {:?} has non-positive width {}",
            slot.stem, slot.width_in
        )));
    }
    let height = scale_height(width, pixel_width, pixel_height)?;
    let (behind_doc, wrap) = wrap_layout(slot.wrap);

    // Text never flows around front/behind pictures, so clearances are moot there.
    let distances = match wrap {
        WrapElement::None => EmuDistances {
            top: Emu::ZERO,
            bottom: Emu::ZERO,
            left: Emu::ZERO,
            right: Emu::ZERO,
        },
        _ => EmuDistances {
            top: Emu::from_inches(slot.distances.top),
            bottom: Emu::from_inches(slot.distances.bottom),
            left: Emu::from_inches(slot.distances.left),
            right: Emu::from_inches(slot.distances.right),
        },
    };

    Ok(ResolvedPlacement {
        width,
        height,
        x: Emu::from_inches(slot.x_in),
        y: Emu::from_inches(slot.y_in),
        vertical_reference: slot.vertical_reference,
        behind_doc,
        wrap,
        distances,
        border: slot.border.map(|b| BorderStroke {
            color: b.color,
            width: Emu::from_points(b.weight_pt),
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Border, TextDistances, VerticalReference};
    use std::collections::HashSet;

    fn slot(wrap: WrapMode) -> PictureSlotSpec {
        PictureSlotSpec {
            stem: "x".into(),
            anchor_text: None,
            width_in: 2.0,
            x_in: 2.0,
            y_in: 3.0,
            wrap,
            vertical_reference: VerticalReference::Page,
            distances: TextDistances { top: 0.1, bottom: 0.1, left: 0.2, right: 0.2 },
            border: Some(Border { color: [0x1F, 0x4E, 0x79], weight_pt: 1.5 }),
        }
    }

    #[test]
    fn wrap_modes_map_to_distinct_layouts() {
        let modes = [
            WrapMode::Front,
            WrapMode::Behind,
            WrapMode::Square,
            WrapMode::Tight,
            WrapMode::TopBottom,
        ];
        let layouts: HashSet<_> = modes.iter().map(|m| wrap_layout(*m)).collect();
        assert_eq!(layouts.len(), modes.len());
        assert_eq!(wrap_layout(WrapMode::Behind), (true, WrapElement::None));
        assert_eq!(wrap_layout(WrapMode::Front), (false, WrapElement::None));
        assert_eq!(wrap_layout(WrapMode::Tight), (false, WrapElement::TightBothSides));
    }

    #[test]
    fn unknown_wrap_mode_is_a_config_error() {
        assert!(matches!("through".parse::<WrapMode>(), Err(Error::Config(_))));
        assert_eq!("top_bottom".parse::<WrapMode>().unwrap(), WrapMode::TopBottom);
    }

    #[test]
    fn resolves_geometry_in_emu() {
        let placement = resolve(&slot(WrapMode::Square), 800, 600).unwrap();
        assert_eq!(placement.width, Emu(1_828_800));
        assert_eq!(placement.height, Emu(1_371_600));
        assert_eq!(placement.x, Emu(1_828_800));
        assert_eq!(placement.y, Emu(2_743_200));
        assert_eq!(placement.distances.left, Emu(182_880));
        let border = placement.border.unwrap();
        assert_eq!(border.width, Emu(19_050));
    }

    #[test]
    fn floating_modes_drop_text_distances() {
        let placement = resolve(&slot(WrapMode::Behind), 100, 100).unwrap();
        assert!(placement.behind_doc);
        assert_eq!(placement.distances.top, Emu::ZERO);
        assert_eq!(placement.distances.right, Emu::ZERO);
    }
}
