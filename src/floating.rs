//! Turns an embedded picture into a floating `wp:anchor` attached to a paragraph.
//!
//! The picture is first embedded with [`Docx::append_picture`], which registers
//! the media part and relationship and leaves an inline picture in a throwaway
//! paragraph. Its `a:graphic` is moved into a new anchor, the throwaway
//! paragraph is removed, and the anchor is appended as a new run at the end of
//! the target paragraph. Existing runs are never touched.
//!
//! Object ids come from a fresh scan of the document on every call, so
//! injections into one document must not run concurrently.

use log::debug;

use crate::docx::{DML_NS, Docx, PIC_NS, WML_NS, WPD_NS};
use crate::error::Error;
use crate::image_prep::PreparedImage;
use crate::model::{AnchorResolution, BorderStroke, ResolvedPlacement, WrapElement};
use crate::units::Emu;
use crate::xml::{NodeId, XmlTree};

/// Base z-order for floating pictures, matching what Word writes.
const RELATIVE_HEIGHT_BASE: u32 = 251_658_240;
/// Wrap polygon coordinates run from 0 to 21600 on each axis.
const WRAP_POLYGON_SIZE: &str = "21600";

fn target_paragraph(doc: &Docx, anchor: AnchorResolution) -> Result<NodeId, Error> {
    match anchor {
        AnchorResolution::Absolute => doc
            .paragraphs()
            .first()
            .copied()
            .ok_or_else(|| Error::Structure("document has no paragraph to carry a picture".into())),
        AnchorResolution::ParagraphAnchor(p) => {
            let tree = doc.tree();
            if tree.is(p, WML_NS, "p") && tree.is_attached(p) {
                Ok(p)
            } else {
                Err(Error::Structure("anchor paragraph is no longer in the document".into()))
            }
        }
    }
}

/// Places `image` as a floating picture and returns its object id.
///
/// Not idempotent: a second call with the same arguments adds a second picture.
pub fn inject(
    doc: &mut Docx,
    anchor: AnchorResolution,
    placement: &ResolvedPlacement,
    image: PreparedImage,
) -> Result<u32, Error> {
    let paragraph = target_paragraph(doc, anchor)?;
    // The placeholder takes this same id and is removed before the anchor is built.
    // Both values are checked before the package is touched.
    let object_id = doc.next_object_id()?;
    let relative_height = RELATIVE_HEIGHT_BASE.checked_add(object_id).ok_or_else(|| {
        Error::Structure(format!("drawing id {object_id} overflows relativeHeight"))
    })?;

    let placeholder = doc.append_picture(image.path(), placement.width)?;
    let graphic = doc.tree().find_descendant(placeholder, DML_NS, "graphic");
    doc.remove_paragraph(placeholder);
    let graphic = graphic
        .ok_or_else(|| Error::Structure("embedded picture has no a:graphic".into()))?;
    doc.tree_mut().detach(graphic);

    let tree = doc.tree_mut();
    fit_graphic(tree, graphic, placement)?;
    if let Some(border) = placement.border {
        add_outline(tree, graphic, border)?;
    }

    let tree = doc.tree_mut();
    let run = tree.create_element(WML_NS, "w", "r");
    let drawing = tree.append_element(run, WML_NS, "w", "drawing")?;
    let anchor_node = build_anchor(tree, drawing, placement, object_id, relative_height)?;
    tree.append_child(anchor_node, graphic)?;
    tree.append_child(paragraph, run)?;

    debug!(
        "Injected floating picture {object_id} ({}x{} EMU at {}, {} from {})",
        placement.width,
        placement.height,
        placement.x,
        placement.y,
        placement.vertical_reference.relative_from()
    );
    drop(image);
    Ok(object_id)
}

fn fit_graphic(
    tree: &mut XmlTree,
    graphic: NodeId,
    placement: &ResolvedPlacement,
) -> Result<(), Error> {
    let ext = tree
        .find_descendant(graphic, PIC_NS, "spPr")
        .and_then(|sp_pr| tree.find_child(sp_pr, DML_NS, "xfrm"))
        .and_then(|xfrm| tree.find_child(xfrm, DML_NS, "ext"))
        .ok_or_else(|| Error::Structure("picture has no a:xfrm/a:ext".into()))?;
    tree.set_attr(ext, "cx", placement.width.to_string());
    tree.set_attr(ext, "cy", placement.height.to_string());
    Ok(())
}

fn add_outline(tree: &mut XmlTree, graphic: NodeId, border: BorderStroke) -> Result<(), Error> {
    let sp_pr = tree
        .find_descendant(graphic, PIC_NS, "spPr")
        .ok_or_else(|| Error::Structure("picture has no pic:spPr".into()))?;
    let ln = tree.append_element(sp_pr, DML_NS, "a", "ln")?;
    tree.set_attr(ln, "w", border.width.to_string());
    let fill = tree.append_element(ln, DML_NS, "a", "solidFill")?;
    let color = tree.append_element(fill, DML_NS, "a", "srgbClr")?;
    tree.set_attr(color, "val", border.hex());
    Ok(())
}

fn position(
    tree: &mut XmlTree,
    parent: NodeId,
    axis: &str,
    relative_from: &str,
    offset: Emu,
) -> Result<(), Error> {
    let pos = tree.append_element(parent, WPD_NS, "wp", axis)?;
    tree.set_attr(pos, "relativeFrom", relative_from);
    let value = tree.append_element(pos, WPD_NS, "wp", "posOffset")?;
    let text = tree.create_text(&offset.to_string());
    tree.append_child(value, text)
}

fn build_anchor(
    tree: &mut XmlTree,
    drawing: NodeId,
    placement: &ResolvedPlacement,
    object_id: u32,
    relative_height: u32,
) -> Result<NodeId, Error> {
    let anchor = tree.append_element(drawing, WPD_NS, "wp", "anchor")?;
    let d = placement.distances;
    tree.set_attr(anchor, "distT", d.top.to_string());
    tree.set_attr(anchor, "distB", d.bottom.to_string());
    tree.set_attr(anchor, "distL", d.left.to_string());
    tree.set_attr(anchor, "distR", d.right.to_string());
    tree.set_attr(anchor, "simplePos", "0");
    tree.set_attr(anchor, "relativeHeight", relative_height.to_string());
    tree.set_attr(anchor, "behindDoc", if placement.behind_doc { "1" } else { "0" });
    tree.set_attr(anchor, "locked", "0");
    tree.set_attr(anchor, "layoutInCell", "1");
    tree.set_attr(anchor, "allowOverlap", "1");

    let simple_pos = tree.append_element(anchor, WPD_NS, "wp", "simplePos")?;
    tree.set_attr(simple_pos, "x", "0");
    tree.set_attr(simple_pos, "y", "0");
    position(tree, anchor, "positionH", "page", placement.x)?;
    position(
        tree,
        anchor,
        "positionV",
        placement.vertical_reference.relative_from(),
        placement.y,
    )?;

    let extent = tree.append_element(anchor, WPD_NS, "wp", "extent")?;
    tree.set_attr(extent, "cx", placement.width.to_string());
    tree.set_attr(extent, "cy", placement.height.to_string());
    let effect = tree.append_element(anchor, WPD_NS, "wp", "effectExtent")?;
    for side in ["l", "t", "r", "b"] {
        tree.set_attr(effect, side, "0");
    }

    let wrap = tree.append_element(anchor, WPD_NS, "wp", placement.wrap.tag())?;
    match placement.wrap {
        WrapElement::None | WrapElement::TopAndBottom => {}
        WrapElement::SquareBothSides => tree.set_attr(wrap, "wrapText", "bothSides"),
        WrapElement::TightBothSides => {
            tree.set_attr(wrap, "wrapText", "bothSides");
            wrap_polygon(tree, wrap)?;
        }
    }

    let doc_pr = tree.append_element(anchor, WPD_NS, "wp", "docPr")?;
    tree.set_attr(doc_pr, "id", object_id.to_string());
    tree.set_attr(doc_pr, "name", format!("Picture {object_id}"));
    let frame_pr = tree.append_element(anchor, WPD_NS, "wp", "cNvGraphicFramePr")?;
    let locks = tree.append_element(frame_pr, DML_NS, "a", "graphicFrameLocks")?;
    tree.set_attr(locks, "noChangeAspect", "1");
    Ok(anchor)
}

/// Rectangle covering the whole picture; `wp:wrapTight` requires a polygon.
fn wrap_polygon(tree: &mut XmlTree, wrap: NodeId) -> Result<(), Error> {
    let polygon = tree.append_element(wrap, WPD_NS, "wp", "wrapPolygon")?;
    tree.set_attr(polygon, "edited", "0");
    let corners = [
        ("start", "0", "0"),
        ("lineTo", "0", WRAP_POLYGON_SIZE),
        ("lineTo", WRAP_POLYGON_SIZE, WRAP_POLYGON_SIZE),
        ("lineTo", WRAP_POLYGON_SIZE, "0"),
        ("lineTo", "0", "0"),
    ];
    for (tag, x, y) in corners {
        let point = tree.append_element(polygon, WPD_NS, "wp", tag)?;
        tree.set_attr(point, "x", x);
        tree.set_attr(point, "y", y);
    }
    Ok(())
}
