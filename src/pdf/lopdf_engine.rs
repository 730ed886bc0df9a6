//! [`PdfEngine`] backed by `lopdf`.

use std::collections::BTreeMap;

use lopdf::{Dictionary, Document, Object, ObjectId, Stream};

use super::engine::{PageBox, PdfEngine, StampImage, DEFAULT_MEDIA_BOX};
use crate::error::{Error, Result};
use crate::geometry::Rect;

/// Page attributes that may be inherited from an ancestor `Pages` node.
const INHERITABLE: [&[u8]; 4] = [b"MediaBox", b"CropBox", b"Resources", b"Rotate"];

/// Bound on page tree depth, guarding against `Parent` cycles.
const MAX_TREE_DEPTH: usize = 64;

/// Prefix of XObject resource names given to stamps.
const STAMP_RESOURCE_PREFIX: &str = "QrSeal";

/// Pure-Rust PDF engine built on `lopdf`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LopdfEngine;

impl LopdfEngine {
    /// Create the engine.
    pub fn new() -> Self {
        Self
    }
}

impl PdfEngine for LopdfEngine {
    type Document = Document;

    fn name(&self) -> &str {
        "lopdf"
    }

    fn load(&self, bytes: &[u8]) -> Result<Document> {
        let doc = Document::load_mem(bytes)
            .map_err(|e| Error::Validation(format!("Malformed PDF: {}", e)))?;
        if doc.is_encrypted() {
            return Err(Error::Capability("Encrypted PDFs cannot be stamped".to_string()));
        }
        if doc.get_pages().is_empty() {
            return Err(Error::Validation("PDF has no pages".to_string()));
        }
        Ok(doc)
    }

    fn page_count(&self, doc: &Document) -> usize {
        doc.get_pages().len()
    }

    fn page_box(&self, doc: &Document, page_index: usize) -> Result<PageBox> {
        let page_id = page_id(doc, page_index)?;

        let media_box = inherited_attribute(doc, page_id, b"MediaBox")
            .and_then(|obj| rect_from_object(doc, &obj))
            .filter(Rect::is_drawable)
            .unwrap_or(DEFAULT_MEDIA_BOX);
        let crop_box = inherited_attribute(doc, page_id, b"CropBox")
            .and_then(|obj| rect_from_object(doc, &obj))
            .filter(Rect::is_drawable);
        let rotate = inherited_attribute(doc, page_id, b"Rotate")
            .and_then(|obj| obj.as_i64().ok())
            .unwrap_or(0)
            .rem_euclid(360);

        Ok(PageBox {
            media_box,
            crop_box,
            rotate,
        })
    }

    fn copy_pages(&self, source: &Document) -> Result<Document> {
        let pages = source.get_pages();
        if pages.is_empty() {
            return Err(Error::Validation("PDF has no pages".to_string()));
        }

        // Resolve inheritance before the page tree is replaced.
        let inherited: Vec<(ObjectId, Vec<(&[u8], Object)>)> = pages
            .values()
            .map(|&id| {
                let attrs = INHERITABLE
                    .iter()
                    .filter_map(|&key| inherited_attribute(source, id, key).map(|v| (key, v)))
                    .collect();
                (id, attrs)
            })
            .collect();

        let mut output = Document::with_version(source.version.clone());
        output.objects = source
            .objects
            .iter()
            .filter(|(_, object)| !is_structural(object))
            .map(|(&id, object)| (id, object.clone()))
            .collect();
        output.max_id = source.max_id;

        let pages_id = output.new_object_id();
        let catalog_id = output.new_object_id();

        let mut kids = Vec::with_capacity(inherited.len());
        for (page_id, attrs) in inherited {
            let page = output
                .get_object_mut(page_id)
                .and_then(Object::as_dict_mut)
                .map_err(|e| {
                    Error::Validation(format!("Page {:?} is not a dictionary: {}", page_id, e))
                })?;
            for (key, value) in attrs {
                page.set(key, value);
            }
            page.set("Type", Object::Name(b"Page".to_vec()));
            page.set("Parent", Object::Reference(pages_id));
            kids.push(Object::Reference(page_id));
        }

        let mut pages_dict = Dictionary::new();
        pages_dict.set("Type", Object::Name(b"Pages".to_vec()));
        pages_dict.set("Count", Object::Integer(kids.len() as i64));
        pages_dict.set("Kids", Object::Array(kids));
        output.objects.insert(pages_id, Object::Dictionary(pages_dict));

        let mut catalog = Dictionary::new();
        catalog.set("Type", Object::Name(b"Catalog".to_vec()));
        catalog.set("Pages", Object::Reference(pages_id));
        output.objects.insert(catalog_id, Object::Dictionary(catalog));

        output.trailer.set("Root", Object::Reference(catalog_id));
        if let Ok(info) = source.trailer.get(b"Info").and_then(Object::as_reference) {
            if output.objects.contains_key(&info) {
                output.trailer.set("Info", Object::Reference(info));
            }
        }

        log::debug!("Copied {} pages into new document", output.get_pages().len());
        Ok(output)
    }

    fn draw_image(
        &self,
        doc: &mut Document,
        page_index: usize,
        image: &StampImage,
        rect: Rect,
    ) -> Result<()> {
        if !rect.is_drawable() {
            return Err(Error::Validation(format!("Stamp rectangle is empty: {:?}", rect)));
        }
        let page_id = page_id(doc, page_index)?;

        let image_id = add_image(doc, image);
        let mut resources = page_resources(doc, page_id);
        let mut xobjects = resolve_dict(doc, resources.get(b"XObject").ok());
        let name = free_resource_name(&xobjects);
        xobjects.set(name.as_bytes().to_vec(), Object::Reference(image_id));
        resources.set("XObject", Object::Dictionary(xobjects));

        let mut contents = vec![Object::Reference(
            doc.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec())),
        )];
        contents.extend(existing_contents(doc, page_id));
        let operators = format!(
            "Q\nq\n{} 0 0 {} {} {} cm\n/{} Do\nQ\n",
            fmt_number(rect.width),
            fmt_number(rect.height),
            fmt_number(rect.x),
            fmt_number(rect.y),
            name
        );
        contents.push(Object::Reference(
            doc.add_object(Stream::new(Dictionary::new(), operators.into_bytes())),
        ));

        let page = doc
            .get_object_mut(page_id)
            .and_then(Object::as_dict_mut)
            .map_err(|e| Error::Capability(format!("Cannot update page: {}", e)))?;
        page.set("Resources", Object::Dictionary(resources));
        page.set("Contents", Object::Array(contents));

        log::debug!(
            "Drew {}x{} image as /{} on page {}",
            image.width,
            image.height,
            name,
            page_index + 1
        );
        Ok(())
    }

    fn serialize(&self, doc: &mut Document) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        doc.save_to(&mut buf)
            .map_err(|e| Error::Capability(format!("Failed to write PDF: {}", e)))?;
        Ok(buf)
    }
}

fn page_id(doc: &Document, page_index: usize) -> Result<ObjectId> {
    let pages: BTreeMap<u32, ObjectId> = doc.get_pages();
    pages.values().nth(page_index).copied().ok_or_else(|| {
        Error::Validation(format!(
            "Page index {} out of range (document has {} pages)",
            page_index,
            pages.len()
        ))
    })
}

/// Catalog, page tree nodes and cross-reference machinery, all of which are
/// rebuilt by [`LopdfEngine::copy_pages`].
fn is_structural(object: &Object) -> bool {
    let dict = match object {
        Object::Dictionary(dict) => dict,
        Object::Stream(stream) => &stream.dict,
        _ => return false,
    };
    matches!(
        dict.get(b"Type").and_then(Object::as_name),
        Ok(b"Catalog" | b"Pages" | b"XRef" | b"ObjStm")
    )
}

/// Look `key` up on the page, then on each ancestor `Pages` node.
fn inherited_attribute(doc: &Document, page_id: ObjectId, key: &[u8]) -> Option<Object> {
    let mut node = doc.get_dictionary(page_id).ok()?;
    for _ in 0..MAX_TREE_DEPTH {
        if let Ok(value) = node.get(key) {
            return Some(value.clone());
        }
        let parent = node.get(b"Parent").and_then(Object::as_reference).ok()?;
        node = doc.get_dictionary(parent).ok()?;
    }
    None
}

fn rect_from_object(doc: &Document, object: &Object) -> Option<Rect> {
    let (_, object) = doc.dereference(object).ok()?;
    let items = object.as_array().ok()?;
    if items.len() != 4 {
        return None;
    }
    let mut coords = [0f32; 4];
    for (slot, item) in coords.iter_mut().zip(items) {
        let (_, item) = doc.dereference(item).ok()?;
        *slot = item.as_float().ok()?;
    }
    Some(Rect::from_points(coords[0], coords[1], coords[2], coords[3]))
}

/// An owned copy of the dictionary `object` is or points to; empty if absent.
fn resolve_dict(doc: &Document, object: Option<&Object>) -> Dictionary {
    object
        .and_then(|obj| doc.dereference(obj).ok())
        .and_then(|(_, obj)| obj.as_dict().ok())
        .cloned()
        .unwrap_or_else(Dictionary::new)
}

fn page_resources(doc: &Document, page_id: ObjectId) -> Dictionary {
    let inherited = inherited_attribute(doc, page_id, b"Resources");
    resolve_dict(doc, inherited.as_ref())
}

fn free_resource_name(xobjects: &Dictionary) -> String {
    (0..)
        .map(|n| format!("{}{}", STAMP_RESOURCE_PREFIX, n))
        .find(|name| !xobjects.has(name.as_bytes()))
        .unwrap_or_else(|| STAMP_RESOURCE_PREFIX.to_string())
}

/// The page's content streams as a flat list of references.
fn existing_contents(doc: &Document, page_id: ObjectId) -> Vec<Object> {
    let Ok(page) = doc.get_dictionary(page_id) else {
        return Vec::new();
    };
    match page.get(b"Contents") {
        Ok(Object::Array(items)) => items.clone(),
        Ok(reference @ Object::Reference(id)) => match doc.get_object(*id) {
            Ok(Object::Array(items)) => items.clone(),
            _ => vec![reference.clone()],
        },
        Ok(Object::Stream(stream)) => vec![Object::Stream(stream.clone())],
        _ => Vec::new(),
    }
}

fn add_image(doc: &mut Document, image: &StampImage) -> ObjectId {
    let mut dict = image_dict(image.width, image.height, b"DeviceRGB");

    if let Some(mask) = &image.soft_mask {
        let mask_dict = image_dict(image.width, image.height, b"DeviceGray");
        let mask_id = doc.add_object(Stream::new(mask_dict, mask.clone()).with_compression(false));
        dict.set("SMask", Object::Reference(mask_id));
    }

    doc.add_object(Stream::new(dict, image.data.clone()).with_compression(false))
}

fn image_dict(width: u32, height: u32, color_space: &[u8]) -> Dictionary {
    let mut dict = Dictionary::new();
    dict.set("Type", Object::Name(b"XObject".to_vec()));
    dict.set("Subtype", Object::Name(b"Image".to_vec()));
    dict.set("Width", Object::Integer(i64::from(width)));
    dict.set("Height", Object::Integer(i64::from(height)));
    dict.set("ColorSpace", Object::Name(color_space.to_vec()));
    dict.set("BitsPerComponent", Object::Integer(8));
    dict.set("Filter", Object::Name(b"FlateDecode".to_vec()));
    dict
}

/// Content stream number: at most four decimals, no trailing zeros.
fn fmt_number(value: f32) -> String {
    let s = format!("{:.4}", value);
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s == "-0" {
        "0".to_string()
    } else {
        s.to_string()
    }
}
