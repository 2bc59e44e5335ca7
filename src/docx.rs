use std::fs::File;
use std::io::{Read, Seek, Write};
use std::path::Path;

use log::debug;
use regex::{NoExpand, RegexBuilder};

use crate::error::Error;
use crate::units::{Emu, scale_height};
use crate::xml::{NodeId, XmlTree};

pub const WML_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";
pub const DML_NS: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";
pub const WPD_NS: &str = "http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing";
pub const PIC_NS: &str = "http://schemas.openxmlformats.org/drawingml/2006/picture";
pub const REL_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

const PKG_REL_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
const CONTENT_TYPES_NS: &str = "http://schemas.openxmlformats.org/package/2006/content-types";
const CONTENT_TYPES_PART: &str = "[Content_Types].xml";
const OFFICE_DOCUMENT_REL: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument";
const IMAGE_REL: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";
const HEADER_REL: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/header";
const FOOTER_REL: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/footer";

struct Part {
    name: String,
    data: Vec<u8>,
}

/// A WordprocessingML package held in memory.
///
/// Parts that are never edited are written back byte-for-byte; the main
/// document, its relationships and the content types are re-serialised.
pub struct Docx {
    parts: Vec<Part>,
    main_part: String,
    rels_part: String,
    document: XmlTree,
    rels: XmlTree,
    content_types: XmlTree,
    /// Largest `wp:docPr` id in headers and footers; those parts are never edited.
    header_footer_max_id: Option<u32>,
}

fn image_content_type(ext: &str) -> Option<&'static str> {
    match ext {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "bmp" => Some("image/bmp"),
        "tif" | "tiff" => Some("image/tiff"),
        _ => None,
    }
}

fn rels_part_for(part: &str) -> String {
    match part.rsplit_once('/') {
        Some((dir, file)) => format!("{dir}/_rels/{file}.rels"),
        None => format!("_rels/{part}.rels"),
    }
}

impl Docx {
    pub fn open(path: &Path) -> Result<Docx, Error> {
        if !path.is_file() {
            return Err(Error::SourceNotFound(path.to_path_buf()));
        }
        debug!("Opening DOCX package {}", path.display());
        Docx::from_reader(File::open(path)?)
    }

    pub fn from_reader<R: Read + Seek>(reader: R) -> Result<Docx, Error> {
        let mut zip = zip::ZipArchive::new(reader)?;
        let mut parts = Vec::with_capacity(zip.len());
        for i in 0..zip.len() {
            let mut entry = zip.by_index(i)?;
            if entry.is_dir() {
                continue;
            }
            let mut data = Vec::with_capacity(entry.size() as usize);
            entry.read_to_end(&mut data)?;
            parts.push(Part { name: entry.name().to_string(), data });
        }

        let main_part = find_main_part(&parts)?;
        let rels_part = rels_part_for(&main_part);

        let document = parse_part(&parts, &main_part)?
            .ok_or_else(|| Error::Structure(format!("missing main document part {main_part}")))?;
        let content_types = parse_part(&parts, CONTENT_TYPES_PART)?
            .ok_or_else(|| Error::Structure("missing [Content_Types].xml".into()))?;
        let rels = match parse_part(&parts, &rels_part)? {
            Some(tree) => tree,
            None => {
                parts.push(Part { name: rels_part.clone(), data: Vec::new() });
                XmlTree::parse(&format!(r#"<Relationships xmlns="{PKG_REL_NS}"/>"#))?
            }
        };

        let header_footer_max_id = header_footer_max_id(&parts, &main_part, &rels)?;
        let docx = Docx {
            parts,
            main_part,
            rels_part,
            document,
            rels,
            content_types,
            header_footer_max_id,
        };
        docx.body()?;
        debug!(
            "Loaded {} package parts, {} body paragraphs",
            docx.parts.len(),
            docx.paragraphs().len()
        );
        Ok(docx)
    }

    pub fn tree(&self) -> &XmlTree {
        &self.document
    }

    pub fn tree_mut(&mut self) -> &mut XmlTree {
        &mut self.document
    }

    pub fn part_names(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().map(|p| p.name.as_str())
    }

    /// Raw bytes of a part that is not re-serialised (media, styles, ...).
    pub fn part(&self, name: &str) -> Option<&[u8]> {
        self.parts.iter().find(|p| p.name == name).map(|p| p.data.as_slice())
    }

    pub fn body(&self) -> Result<NodeId, Error> {
        let root = self
            .document
            .root_element()
            .filter(|&r| self.document.is(r, WML_NS, "document"))
            .ok_or_else(|| Error::Structure("missing w:document".into()))?;
        self.document
            .find_child(root, WML_NS, "body")
            .ok_or_else(|| Error::Structure("missing w:body".into()))
    }

    /// Body-level paragraphs in document order. Paragraphs inside tables are not included.
    pub fn paragraphs(&self) -> Vec<NodeId> {
        match self.body() {
            Ok(body) => self.document.child_elements(body, WML_NS, "p").collect(),
            Err(_) => Vec::new(),
        }
    }

    pub fn tables(&self) -> Vec<NodeId> {
        match self.body() {
            Ok(body) => self.document.child_elements(body, WML_NS, "tbl").collect(),
            Err(_) => Vec::new(),
        }
    }

    pub fn paragraph_text(&self, paragraph: NodeId) -> String {
        let tree = &self.document;
        let mut text = String::new();
        let mut stack: Vec<NodeId> = tree.children(paragraph).iter().rev().copied().collect();
        while let Some(node) = stack.pop() {
            let Some(name) = tree.name(node) else {
                continue;
            };
            if name.namespace.as_deref() == Some(WML_NS) {
                match name.local.as_str() {
                    "t" => {
                        text.push_str(&tree.text_content(node));
                        continue;
                    }
                    "tab" => text.push('\t'),
                    "br" | "cr" => text.push('\n'),
                    // Text boxes inside pictures are not part of the paragraph's own text.
                    "drawing" | "pict" => continue,
                    _ => {}
                }
            } else if name.local == "AlternateContent" {
                continue;
            }
            stack.extend(tree.children(node).iter().rev().copied());
        }
        text
    }

    pub fn paragraph_texts(&self) -> Vec<String> {
        self.paragraphs().into_iter().map(|p| self.paragraph_text(p)).collect()
    }

    /// Rows of cell texts for one `w:tbl`.
    pub fn table_text(&self, table: NodeId) -> Vec<Vec<String>> {
        let tree = &self.document;
        tree.child_elements(table, WML_NS, "tr")
            .map(|row| {
                tree.child_elements(row, WML_NS, "tc")
                    .map(|cell| {
                        tree.child_elements(cell, WML_NS, "p")
                            .map(|p| self.paragraph_text(p))
                            .collect::<Vec<_>>()
                            .join("\n")
                    })
                    .collect()
            })
            .collect()
    }

    /// Case-insensitive literal replacement inside every `w:t`.
    /// Text split across runs is not matched. Returns the number of text nodes changed.
    pub fn find_and_replace(&mut self, old: &str, new: &str) -> Result<usize, Error> {
        if old.is_empty() {
            return Ok(0);
        }
        let pattern = RegexBuilder::new(&regex::escape(old))
            .case_insensitive(true)
            .build()
            .map_err(|e| Error::Config(format!("bad search text {old:?}: {e}")))?;

        let texts: Vec<NodeId> = self
            .document
            .descendants(self.document.document())
            .into_iter()
            .filter(|&n| self.document.is(n, WML_NS, "t"))
            .flat_map(|t| self.document.children(t).to_vec())
            .collect();

        let mut changed = 0;
        for node in texts {
            let Some(current) = self.document.text(node) else {
                continue;
            };
            if !pattern.is_match(current) {
                continue;
            }
            let replaced = pattern.replace_all(current, NoExpand(new)).into_owned();
            self.document.set_text(node, replaced);
            changed += 1;
        }
        debug!("Replaced {old:?} in {changed} text node(s)");
        Ok(changed)
    }

    /// One more than the largest `wp:docPr` id in the document body, headers and footers.
    ///
    /// Ids are `xsd:unsignedInt`; a document already holding `u32::MAX` has no id left.
    pub fn next_object_id(&self) -> Result<u32, Error> {
        let tree = &self.document;
        let body_max = tree
            .descendants(tree.document())
            .into_iter()
            .filter(|&n| tree.is(n, WPD_NS, "docPr"))
            .filter_map(|n| tree.attr(n, "id").and_then(|v| v.trim().parse::<u32>().ok()))
            .max();
        match body_max.max(self.header_footer_max_id) {
            None => Ok(1),
            Some(max) => max
                .checked_add(1)
                .ok_or_else(|| Error::Structure(format!("no drawing id left after {max}"))),
        }
    }

    /// Embeds the image and appends a paragraph holding it inline, before the
    /// section properties. Returns that paragraph.
    pub fn append_picture(&mut self, path: &Path, width: Emu) -> Result<NodeId, Error> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        let content_type = image_content_type(&ext)
            .ok_or_else(|| Error::Structure(format!("unsupported picture type {ext:?}")))?;
        let (pixel_width, pixel_height) = image::image_dimensions(path)?;
        let height = scale_height(width, pixel_width, pixel_height)?;
        let data = std::fs::read(path)?;
        let object_id = self.next_object_id()?;

        let r_id = self.add_image_part(&ext, content_type, data)?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("image")
            .to_string();

        let body = self.body()?;
        let sect_pr = self.document.find_child(body, WML_NS, "sectPr");
        let tree = &mut self.document;

        let paragraph = tree.create_element(WML_NS, "w", "p");
        let run = tree.append_element(paragraph, WML_NS, "w", "r")?;
        let drawing = tree.append_element(run, WML_NS, "w", "drawing")?;
        let inline = tree.append_element(drawing, WPD_NS, "wp", "inline")?;
        for dist in ["distT", "distB", "distL", "distR"] {
            tree.set_attr(inline, dist, "0");
        }
        let extent = tree.append_element(inline, WPD_NS, "wp", "extent")?;
        tree.set_attr(extent, "cx", width.to_string());
        tree.set_attr(extent, "cy", height.to_string());
        let doc_pr = tree.append_element(inline, WPD_NS, "wp", "docPr")?;
        tree.set_attr(doc_pr, "id", object_id.to_string());
        tree.set_attr(doc_pr, "name", format!("Picture {object_id}"));
        let frame_pr = tree.append_element(inline, WPD_NS, "wp", "cNvGraphicFramePr")?;
        let locks = tree.append_element(frame_pr, DML_NS, "a", "graphicFrameLocks")?;
        tree.set_attr(locks, "noChangeAspect", "1");

        let graphic = tree.append_element(inline, DML_NS, "a", "graphic")?;
        let graphic_data = tree.append_element(graphic, DML_NS, "a", "graphicData")?;
        tree.set_attr(graphic_data, "uri", PIC_NS);
        let pic = tree.append_element(graphic_data, PIC_NS, "pic", "pic")?;
        let nv_pic_pr = tree.append_element(pic, PIC_NS, "pic", "nvPicPr")?;
        let c_nv_pr = tree.append_element(nv_pic_pr, PIC_NS, "pic", "cNvPr")?;
        tree.set_attr(c_nv_pr, "id", "0");
        tree.set_attr(c_nv_pr, "name", file_name);
        tree.append_element(nv_pic_pr, PIC_NS, "pic", "cNvPicPr")?;
        let blip_fill = tree.append_element(pic, PIC_NS, "pic", "blipFill")?;
        let blip = tree.append_element(blip_fill, DML_NS, "a", "blip")?;
        tree.set_attr_ns(blip, REL_NS, "r", "embed", r_id);
        let stretch = tree.append_element(blip_fill, DML_NS, "a", "stretch")?;
        tree.append_element(stretch, DML_NS, "a", "fillRect")?;
        let sp_pr = tree.append_element(pic, PIC_NS, "pic", "spPr")?;
        let xfrm = tree.append_element(sp_pr, DML_NS, "a", "xfrm")?;
        let off = tree.append_element(xfrm, DML_NS, "a", "off")?;
        tree.set_attr(off, "x", "0");
        tree.set_attr(off, "y", "0");
        let ext_node = tree.append_element(xfrm, DML_NS, "a", "ext")?;
        tree.set_attr(ext_node, "cx", width.to_string());
        tree.set_attr(ext_node, "cy", height.to_string());
        let geom = tree.append_element(sp_pr, DML_NS, "a", "prstGeom")?;
        tree.set_attr(geom, "prst", "rect");
        tree.append_element(geom, DML_NS, "a", "avLst")?;

        match sect_pr {
            Some(sect_pr) => tree.insert_before(body, sect_pr, paragraph)?,
            None => tree.append_child(body, paragraph)?,
        }
        debug!(
            "Appended picture paragraph for {} ({pixel_width}x{pixel_height}px)",
            path.display()
        );
        Ok(paragraph)
    }

    pub fn remove_paragraph(&mut self, paragraph: NodeId) {
        self.document.detach(paragraph);
    }

    /// Adds `word/media/imageN.ext` and returns the new relationship id.
    fn add_image_part(
        &mut self,
        ext: &str,
        content_type: &str,
        data: Vec<u8>,
    ) -> Result<String, Error> {
        let base_dir = self
            .main_part
            .rsplit_once('/')
            .map(|(dir, _)| format!("{dir}/"))
            .unwrap_or_default();
        let mut n = 1;
        let (part_name, target) = loop {
            let target = format!("media/image{n}.{ext}");
            let part_name = format!("{base_dir}{target}");
            // Part names compare case-insensitively.
            if !self.parts.iter().any(|p| p.name.eq_ignore_ascii_case(&part_name)) {
                break (part_name, target);
            }
            n += 1;
        };
        self.parts.push(Part { name: part_name, data });
        self.register_content_type(ext, content_type)?;

        let rels_root = self
            .rels
            .root_element()
            .ok_or_else(|| Error::Structure(format!("empty {}", self.rels_part)))?;
        let existing: Vec<String> = self
            .rels
            .child_elements(rels_root, PKG_REL_NS, "Relationship")
            .filter_map(|r| self.rels.attr(r, "Id").map(str::to_string))
            .collect();
        let mut next = existing
            .iter()
            .filter_map(|id| id.strip_prefix("rId").and_then(|n| n.parse::<u32>().ok()))
            .max()
            .unwrap_or(0)
            + 1;
        while existing.contains(&format!("rId{next}")) {
            next += 1;
        }
        let r_id = format!("rId{next}");

        let rel = self.rels.append_element(rels_root, PKG_REL_NS, "", "Relationship")?;
        self.rels.set_attr(rel, "Id", r_id.clone());
        self.rels.set_attr(rel, "Type", IMAGE_REL);
        self.rels.set_attr(rel, "Target", target);
        Ok(r_id)
    }

    fn register_content_type(&mut self, ext: &str, content_type: &str) -> Result<(), Error> {
        let tree = &mut self.content_types;
        let root = tree
            .root_element()
            .ok_or_else(|| Error::Structure("empty [Content_Types].xml".into()))?;
        let known = tree
            .child_elements(root, CONTENT_TYPES_NS, "Default")
            .any(|d| tree.attr(d, "Extension").is_some_and(|e| e.eq_ignore_ascii_case(ext)));
        if !known {
            let default = tree.append_element(root, CONTENT_TYPES_NS, "", "Default")?;
            tree.set_attr(default, "Extension", ext);
            tree.set_attr(default, "ContentType", content_type);
        }
        Ok(())
    }

    pub fn save(&self, path: &Path) -> Result<(), Error> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut zip = zip::ZipWriter::new(File::create(path)?);
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);

        for part in &self.parts {
            let serialized;
            let data: &[u8] = if part.name == self.main_part {
                serialized = self.document.serialize();
                &serialized
            } else if part.name == self.rels_part {
                serialized = self.rels.serialize();
                &serialized
            } else if part.name == CONTENT_TYPES_PART {
                serialized = self.content_types.serialize();
                &serialized
            } else {
                &part.data
            };
            zip.start_file(part.name.as_str(), options)?;
            zip.write_all(data)?;
        }
        zip.finish()?;
        debug!("Saved DOCX package {}", path.display());
        Ok(())
    }
}

fn parse_part(parts: &[Part], name: &str) -> Result<Option<XmlTree>, Error> {
    parts
        .iter()
        .find(|p| p.name == name)
        .map(|p| XmlTree::parse_bytes(&p.data))
        .transpose()
}

/// Resolves a relationship target against the directory of `source`.
fn resolve_target(source: &str, target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return absolute.to_string();
    }
    let mut segments: Vec<&str> = match source.rsplit_once('/') {
        Some((dir, _)) => dir.split('/').collect(),
        None => Vec::new(),
    };
    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

fn header_footer_max_id(
    parts: &[Part],
    main_part: &str,
    rels: &XmlTree,
) -> Result<Option<u32>, Error> {
    let Some(root) = rels.root_element() else {
        return Ok(None);
    };
    let mut max = None;
    for rel in rels.child_elements(root, PKG_REL_NS, "Relationship") {
        if !matches!(rels.attr(rel, "Type"), Some(HEADER_REL | FOOTER_REL)) {
            continue;
        }
        if rels.attr(rel, "TargetMode") == Some("External") {
            continue;
        }
        let Some(target) = rels.attr(rel, "Target") else {
            continue;
        };
        let name = resolve_target(main_part, target);
        let Some(part) = parts.iter().find(|p| p.name.eq_ignore_ascii_case(&name)) else {
            continue;
        };
        let text = std::str::from_utf8(&part.data)
            .map_err(|e| Error::Structure(format!("{name} is not UTF-8: {e}")))?;
        let doc = roxmltree::Document::parse(text.strip_prefix('\u{feff}').unwrap_or(text))?;
        let part_max = doc
            .descendants()
            .filter(|n| n.has_tag_name((WPD_NS, "docPr")))
            .filter_map(|n| n.attribute("id").and_then(|v| v.trim().parse::<u32>().ok()))
            .max();
        max = max.max(part_max);
    }
    if let Some(id) = max {
        debug!("Headers and footers use drawing ids up to {id}");
    }
    Ok(max)
}

fn find_main_part(parts: &[Part]) -> Result<String, Error> {
    let Some(package_rels) = parse_part(parts, "_rels/.rels")? else {
        return Ok("word/document.xml".into());
    };
    let Some(root) = package_rels.root_element() else {
        return Ok("word/document.xml".into());
    };
    let target = package_rels
        .child_elements(root, PKG_REL_NS, "Relationship")
        .find(|&r| package_rels.attr(r, "Type") == Some(OFFICE_DOCUMENT_REL))
        .and_then(|r| package_rels.attr(r, "Target"))
        .map(|t| t.trim_start_matches('/').to_string());
    Ok(target.unwrap_or_else(|| "word/document.xml".into()))
}
