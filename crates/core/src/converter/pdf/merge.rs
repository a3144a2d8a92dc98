//! Page-level PDF merge and lossless compression.

use lopdf::{dictionary, Dictionary, Document, Object, ObjectId};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::text::load;
use crate::converter::ConverterError;

/// Page attributes a page may inherit from its ancestors in the page tree.
const INHERITABLE: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Guard against cyclic Parent chains.
const MAX_TREE_DEPTH: usize = 64;

/// Append the pages of every input, in the order given.
///
/// Nothing is reordered or deduplicated: the same file passed twice
/// contributes its pages twice.
pub fn merge_documents(inputs: &[PathBuf], output: &Path) -> Result<usize, ConverterError> {
    let mut max_id = 1;
    let mut pages: Vec<(ObjectId, Dictionary)> = Vec::new();
    let mut objects: BTreeMap<ObjectId, Object> = BTreeMap::new();

    for input in inputs {
        let mut doc = load(input)?;
        doc.renumber_objects_with(max_id);
        max_id = doc.max_id + 1;

        let page_ids: Vec<ObjectId> = doc.get_pages().into_values().collect();
        if page_ids.is_empty() {
            return Err(ConverterError::invalid_input(format!(
                "{} has no pages",
                input.file_name().unwrap_or_default().to_string_lossy()
            )));
        }

        for page_id in page_ids {
            let mut page = doc
                .get_dictionary(page_id)
                .map_err(|e| ConverterError::invalid_input(format!("broken page tree: {e}")))?
                .clone();
            for key in INHERITABLE {
                if !page.has(key) {
                    if let Some(value) = inherited_attribute(&doc, page_id, key) {
                        page.set(key.to_vec(), value);
                    }
                }
            }
            pages.push((page_id, page));
        }

        for (id, object) in doc.objects {
            match object_type(&object) {
                Some(b"Catalog") | Some(b"Pages") | Some(b"Page") | Some(b"Outlines")
                | Some(b"Outline") => {}
                _ => {
                    objects.insert(id, object);
                }
            }
        }
    }

    let mut merged = Document::with_version("1.5");
    merged.max_id = max_id;
    merged.objects.extend(objects);

    let pages_id = merged.new_object_id();
    let kids: Vec<Object> = pages.iter().map(|(id, _)| Object::Reference(*id)).collect();
    let count = pages.len();
    for (id, mut page) in pages {
        page.set("Parent", pages_id);
        merged.objects.insert(id, Object::Dictionary(page));
    }
    merged.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count as i64,
        }),
    );
    let catalog_id = merged.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    merged.trailer.set("Root", catalog_id);

    merged.renumber_objects();
    merged.compress();
    merged
        .save(output)
        .map_err(|e| ConverterError::conversion_failed(format!("failed to write PDF: {e}"), None))?;
    Ok(count)
}

/// Drop unreferenced objects and empty streams, then deflate every stream.
pub fn compress_document(input: &Path, output: &Path) -> Result<(), ConverterError> {
    let mut doc = load(input)?;
    if doc.get_pages().is_empty() {
        return Err(ConverterError::empty_output("PDF has no pages"));
    }
    doc.prune_objects();
    doc.delete_zero_length_streams();
    doc.renumber_objects();
    doc.compress();
    doc.save(output)
        .map_err(|e| ConverterError::conversion_failed(format!("failed to write PDF: {e}"), None))?;
    Ok(())
}

fn object_type(object: &Object) -> Option<&[u8]> {
    let dict = match object {
        Object::Dictionary(dict) => dict,
        Object::Stream(stream) => &stream.dict,
        _ => return None,
    };
    dict.get(b"Type").and_then(Object::as_name).ok()
}

fn inherited_attribute(doc: &Document, page_id: ObjectId, key: &[u8]) -> Option<Object> {
    let mut parent = doc
        .get_dictionary(page_id)
        .ok()?
        .get(b"Parent")
        .and_then(Object::as_reference)
        .ok();

    for _ in 0..MAX_TREE_DEPTH {
        let node = doc.get_dictionary(parent?).ok()?;
        if let Ok(value) = node.get(key) {
            return Some(value.clone());
        }
        parent = node.get(b"Parent").and_then(Object::as_reference).ok();
    }
    None
}
