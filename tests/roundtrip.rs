//! Load/save symmetry over hand-assembled streams and hand-built documents.

use bamlscope::{ElementFlags, IdRef, Image, NodeId, NodeKind, RecordType, VersionPair};

/// Standard stream header: "MSBAML" feature id and three 0.96 version pairs.
fn header() -> Vec<u8> {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&12i32.to_le_bytes());
    for unit in "MSBAML".encode_utf16() {
        bytes.extend_from_slice(&unit.to_le_bytes());
    }
    for _ in 0..3 {
        bytes.extend_from_slice(&0u16.to_le_bytes());
        bytes.extend_from_slice(&0x60u16.to_le_bytes());
    }
    bytes
}

/// Whole-tree pre-order, root included.
fn preorder(image: &Image) -> Vec<NodeId> {
    let mut nodes = Vec::new();
    let mut cur = image.root();
    while let Some(node) = cur {
        nodes.push(node);
        cur = image.tree().get_next(node);
    }
    nodes
}

/// Compare two documents node by node. Both sides allocate nodes in stream
/// order, so handles line up and payloads (including declaration references
/// and resolved key values) compare directly.
fn assert_same_document(a: &Image, b: &Image) {
    assert_eq!(a.signature(), b.signature());
    assert_eq!(a.reader_version(), b.reader_version());
    assert_eq!(a.updater_version(), b.updater_version());
    assert_eq!(a.writer_version(), b.writer_version());

    let na = preorder(a);
    let nb = preorder(b);
    assert_eq!(na.len(), nb.len(), "documents differ in record count");
    for (&x, &y) in na.iter().zip(&nb) {
        assert_eq!(x, y, "allocation order diverged");
        assert_eq!(a.tree().kind(x), b.tree().kind(y));
        assert_eq!(a.tree().is_closed(x), b.tree().is_closed(y));
        assert_eq!(a.tree().parent(x), b.tree().parent(y));
    }
}

#[test]
fn minimal_document_loads_and_reencodes_identically() {
    let mut bytes = header();
    // DocumentStart: load_async=false, max_async_records=0, debug_baml=false
    bytes.push(0x01);
    bytes.push(0x00);
    bytes.extend_from_slice(&0u32.to_le_bytes());
    bytes.push(0x00);
    // ElementStart: type=-42 (well-known 42), flags=0
    bytes.push(0x03);
    bytes.extend_from_slice(&(-42i16).to_le_bytes());
    bytes.push(0x00);
    // ElementEnd, DocumentEnd
    bytes.push(0x04);
    bytes.push(0x02);

    let image = Image::from_mem(&bytes).unwrap();
    assert_eq!(image.signature(), "MSBAML");
    for version in [
        image.reader_version(),
        image.updater_version(),
        image.writer_version(),
    ] {
        assert_eq!(version, VersionPair { major: 0, minor: 0x60 });
    }

    let root = image.root().unwrap();
    assert_eq!(
        *image.tree().kind(root),
        NodeKind::Document {
            load_async: false,
            max_async_records: 0,
            debug_baml: false,
        }
    );
    assert!(image.tree().is_closed(root));

    let element = image.tree().first_child(root).unwrap();
    assert_eq!(
        *image.tree().kind(element),
        NodeKind::Element {
            type_id: IdRef::Known(42),
            flags: ElementFlags::empty(),
        }
    );
    assert!(image.tree().is_closed(element));
    assert_eq!(image.tree().next(element), None);

    assert_eq!(image.to_vec().unwrap(), bytes);
}

#[test]
fn empty_image_is_header_only() {
    let image = Image::new();
    assert_eq!(image.to_vec().unwrap(), header());
}

/// A document exercising declarations, every reference namespace, variable-size
/// records, deferred content and both key flavors.
fn rich_document() -> Image {
    let mut image = Image::new();
    let tree = image.tree_mut();

    // Allocation happens in pre-order, matching the loader's stream order.
    let doc = tree.alloc(NodeKind::Document {
        load_async: false,
        max_async_records: 0,
        debug_baml: false,
    });
    let asm = tree.alloc(NodeKind::AssemblyInfo {
        full_name: "PresentationFramework, Version=4.0.0.0".into(),
    });
    let xmlns = tree.alloc(NodeKind::XmlnsProperty {
        prefix: String::new(),
        xml_namespace: "http://schemas.microsoft.com/winfx/2006/xaml/presentation".into(),
        assembly_ids: vec![IdRef::Declaration(asm)],
    });
    let ti = tree.alloc(NodeKind::TypeInfo {
        assembly_id: IdRef::Declaration(asm),
        type_full_name: "MyApp.MainWindow".into(),
    });
    let pi = tree.alloc(NodeKind::PropertyInfo {
        owner_type_id: IdRef::Declaration(ti),
        usage: 0,
        name: "Content".into(),
    });
    let si = tree.alloc(NodeKind::StringInfo {
        value: "Brush1".into(),
    });
    let elem = tree.alloc(NodeKind::Element {
        type_id: IdRef::Declaration(ti),
        flags: ElementFlags::CREATE_USING_TYPE_CONVERTER,
    });
    let connection = tree.alloc(NodeKind::ConnectionId { id: 1 });
    let prop = tree.alloc(NodeKind::Property {
        attribute_id: IdRef::Declaration(pi),
        value: "Hello".into(),
    });
    let converter = tree.alloc(NodeKind::PropertyWithConverter {
        attribute_id: IdRef::Known(1),
        value: "12,4,12,4".into(),
        converter_type_id: IdRef::Known(100),
    });
    let custom = tree.alloc(NodeKind::PropertyCustom {
        attribute_id: IdRef::Declaration(pi),
        serializer_type_id: 0x02E8,
        data: vec![0x01, 0x02, 0x03, 0x04],
    });
    let dict = tree.alloc(NodeKind::PropertyDictionary {
        attribute_id: IdRef::Known(2),
    });
    let defer = tree.alloc(NodeKind::DeferableContent);
    let key1 = tree.alloc(NodeKind::DefAttributeKeyString {
        value_id: IdRef::Declaration(si),
        value: None, // patched below once the value nodes exist
        shared: false,
        shared_set: false,
    });
    let key2 = tree.alloc(NodeKind::DefAttributeKeyType {
        type_id: IdRef::Declaration(ti),
        flags: ElementFlags::empty(),
        value: None,
        shared: true,
        shared_set: true,
    });
    let optimized = tree.alloc(NodeKind::OptimizedStaticResource {
        flags: 0,
        value_id: 7,
    });
    let val1 = tree.alloc(NodeKind::Element {
        type_id: IdRef::Known(42),
        flags: ElementFlags::empty(),
    });
    let text = tree.alloc(NodeKind::Text {
        value: "red".into(),
    });
    let val2 = tree.alloc(NodeKind::Element {
        type_id: IdRef::Declaration(ti),
        flags: ElementFlags::empty(),
    });
    let named = tree.alloc(NodeKind::NamedElement {
        type_id: IdRef::Declaration(ti),
        runtime_name: "button1".into(),
    });

    for child in [asm, xmlns, ti, pi, si, elem] {
        tree.add(doc, child);
    }
    for child in [connection, prop, converter, custom, dict, named] {
        tree.add(elem, child);
    }
    tree.add(dict, defer);
    for child in [key1, key2, optimized, val1, val2] {
        tree.add(defer, child);
    }
    tree.add(val1, text);

    if let NodeKind::DefAttributeKeyString { value, .. } = tree.kind_mut(key1) {
        *value = Some(val1);
    }
    if let NodeKind::DefAttributeKeyType { value, .. } = tree.kind_mut(key2) {
        *value = Some(val2);
    }

    for block in [doc, elem, dict, defer, val1, val2] {
        tree.set_closed(block, true);
    }

    image.set_root(Some(doc));
    image
}

#[test]
fn rich_document_round_trips_structurally() {
    let original = rich_document();
    let bytes = original.to_vec().unwrap();
    let reloaded = Image::from_mem(&bytes).unwrap();
    assert_same_document(&original, &reloaded);
}

#[test]
fn reencoding_a_loaded_document_is_byte_identical() {
    let bytes = rich_document().to_vec().unwrap();
    let reloaded = Image::from_mem(&bytes).unwrap();
    assert_eq!(reloaded.to_vec().unwrap(), bytes);
}

#[test]
fn key_offsets_resolve_to_their_value_nodes() {
    let bytes = rich_document().to_vec().unwrap();
    let image = Image::from_mem(&bytes).unwrap();

    let root = image.root().unwrap();
    let defer = image
        .tree()
        .find_first_child(root, RecordType::DeferableContentStart, false)
        .unwrap();

    let key1 = image
        .tree()
        .find_first_child(defer, RecordType::DefAttributeKeyString, true)
        .unwrap();
    let key2 = image
        .tree()
        .find_first_child(defer, RecordType::DefAttributeKeyType, true)
        .unwrap();

    // The value area starts at the first non-key child; the string key maps to
    // it, the type key to the element after it.
    let val1 = image.tree().kind(key1).key_value().unwrap();
    let val2 = image.tree().kind(key2).key_value().unwrap();
    assert_eq!(
        *image.tree().kind(val1),
        NodeKind::Element {
            type_id: IdRef::Known(42),
            flags: ElementFlags::empty(),
        }
    );
    assert_eq!(image.tree().parent(val1), Some(defer));
    assert_eq!(image.tree().parent(val2), Some(defer));
    // val2 directly follows val1's subtree (val1 contains one text node).
    assert_eq!(image.tree().get_previous(val2), image.tree().first_child(val1));
}

#[test]
fn known_and_declared_references_never_alias() {
    let bytes = rich_document().to_vec().unwrap();
    let image = Image::from_mem(&bytes).unwrap();
    let root = image.root().unwrap();

    let type_info = image
        .tree()
        .find_first_child(root, RecordType::TypeInfo, false)
        .unwrap();
    let elements: Vec<NodeId> = {
        let mut found = Vec::new();
        let mut cur = image.tree().find_next(root, RecordType::ElementStart, false);
        while let Some(node) = cur {
            found.push(node);
            cur = image.tree().find_next(node, RecordType::ElementStart, false);
        }
        found
    };
    assert_eq!(elements.len(), 3);

    // Declared slot 0 resolves to the declaration node, well-known 42 stays in
    // its own namespace even though both encode near zero on the wire.
    assert_eq!(
        *image.tree().kind(elements[0]),
        NodeKind::Element {
            type_id: IdRef::Declaration(type_info),
            flags: ElementFlags::CREATE_USING_TYPE_CONVERTER,
        }
    );
    assert!(matches!(
        image.tree().kind(elements[1]),
        NodeKind::Element {
            type_id: IdRef::Known(42),
            ..
        }
    ));
}

#[test]
fn non_default_header_survives_a_round_trip() {
    let mut image = rich_document();
    image.set_signature("CUSTOM");
    image.set_versions(
        VersionPair { major: 1, minor: 2 },
        VersionPair { major: 3, minor: 4 },
        VersionPair { major: 5, minor: 6 },
    );
    let bytes = image.to_vec().unwrap();
    let reloaded = Image::from_mem(&bytes).unwrap();
    assert_eq!(reloaded.signature(), "CUSTOM");
    assert_eq!(reloaded.reader_version(), VersionPair { major: 1, minor: 2 });
    assert_eq!(reloaded.updater_version(), VersionPair { major: 3, minor: 4 });
    assert_eq!(reloaded.writer_version(), VersionPair { major: 5, minor: 6 });
    assert_eq!(reloaded.to_vec().unwrap(), bytes);
}

#[test]
fn open_blocks_emit_no_end_tag() {
    // A document under incremental construction: the root was never closed,
    // so no DocumentEnd is written. The truncated stream is rejected on load.
    let mut image = Image::new();
    let doc = image.tree_mut().alloc(NodeKind::Document {
        load_async: true,
        max_async_records: 8,
        debug_baml: false,
    });
    image.set_root(Some(doc));

    let bytes = image.to_vec().unwrap();
    assert_eq!(bytes.len(), header().len() + 7); // tag + bool + u32 + bool
    assert!(Image::from_mem(&bytes).is_err());

    image.tree_mut().set_closed(doc, true);
    let closed = image.to_vec().unwrap();
    assert_eq!(closed.len(), bytes.len() + 1);
    assert!(Image::from_mem(&closed).is_ok());
}

#[test]
fn edits_between_load_and_save_reassign_pool_slots() {
    let bytes = rich_document().to_vec().unwrap();
    let mut image = Image::from_mem(&bytes).unwrap();
    let root = image.root().unwrap();

    // Put a fresh declaration in front of the existing one; slots must come
    // out 0 and 1 in the new order, and the old references must follow.
    let extra = image.tree_mut().alloc(NodeKind::AssemblyInfo {
        full_name: "mscorlib".into(),
    });
    image.tree_mut().insert(root, 0, extra);

    let edited = image.to_vec().unwrap();
    let reloaded = Image::from_mem(&edited).unwrap();

    let root = reloaded.root().unwrap();
    let first = reloaded
        .tree()
        .find_first_child(root, RecordType::AssemblyInfo, true)
        .unwrap();
    assert_eq!(
        *reloaded.tree().kind(first),
        NodeKind::AssemblyInfo {
            full_name: "mscorlib".into(),
        }
    );
    let second = reloaded
        .tree()
        .find_next(first, RecordType::AssemblyInfo, true)
        .unwrap();
    let type_info = reloaded
        .tree()
        .find_first_child(root, RecordType::TypeInfo, true)
        .unwrap();
    assert_eq!(
        *reloaded.tree().kind(type_info),
        NodeKind::TypeInfo {
            assembly_id: IdRef::Declaration(second),
            type_full_name: "MyApp.MainWindow".into(),
        }
    );
}

#[test]
fn detached_subtrees_are_not_serialized() {
    let mut image = rich_document();
    let root = image.root().unwrap();
    let elem = image
        .tree()
        .find_first_child(root, RecordType::ElementStart, true)
        .unwrap();
    let named = image
        .tree()
        .find_first_child(elem, RecordType::NamedElement, true)
        .unwrap();
    image.tree_mut().detach(named);

    let bytes = image.to_vec().unwrap();
    let reloaded = Image::from_mem(&bytes).unwrap();
    let root = reloaded.root().unwrap();
    assert!(reloaded
        .tree()
        .find_first_child(root, RecordType::NamedElement, false)
        .is_none());
}
