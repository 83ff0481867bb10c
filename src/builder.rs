//! Stream encoder: [`Image`] in, bytes out.
//!
//! The builder mirrors the loader. It walks the tree iteratively in pre-order
//! with an explicit frame stack, writing each node's record and recording the
//! output position of every tag byte. Declaration pool ids are assigned in
//! write order and memoized per node, so a tree can be reordered or pruned
//! freely between load and save and still produce gap-free pools. Two values
//! cannot be known while writing forward: the byte length of deferred content
//! and the relative offsets of dictionary keys. Both are written as
//! placeholders and patched, the former when its scope pops, the latter in a
//! final pass once all positions exist.

use std::collections::HashMap;

use crate::{
    document::{
        image::Image,
        node::{IdRef, NodeId, NodeKind},
        tree::Tree,
    },
    file::writer::Writer,
    loader::is_key_section,
    records::RecordType,
    Result,
};

/// Slot ids are written as non-negative `i16`, so a pool holds at most
/// `i16::MAX + 1` declarations.
const MAX_POOL_SLOT: usize = i16::MAX as usize;

pub(crate) fn build(image: &Image) -> Result<Vec<u8>> {
    Builder::new(image.tree()).run(image)
}

/// One block being walked, with a cursor over its remaining children.
struct Frame {
    node: NodeId,
    next_child: Option<NodeId>,
}

/// Patch bookkeeping for one deferred-content block.
struct DeferOut {
    block: NodeId,
    /// Output position of the reserved 4-byte content size.
    size_field: usize,
    /// `(placeholder position, value node)` per key written inside this block.
    keys: Vec<(usize, NodeId)>,
}

struct Builder<'a> {
    tree: &'a Tree,
    out: Writer,
    /// Output tag position of every written node.
    pos_of: HashMap<NodeId, usize>,
    assemblies: HashMap<NodeId, u16>,
    types: HashMap<NodeId, u16>,
    properties: HashMap<NodeId, u16>,
    strings: HashMap<NodeId, u16>,
    defers: Vec<DeferOut>,
    /// Indices into `defers` for the deferred scopes currently open.
    defer_stack: Vec<usize>,
}

impl<'a> Builder<'a> {
    fn new(tree: &'a Tree) -> Self {
        Builder {
            tree,
            out: Writer::new(),
            pos_of: HashMap::new(),
            assemblies: HashMap::new(),
            types: HashMap::new(),
            properties: HashMap::new(),
            strings: HashMap::new(),
            defers: Vec::new(),
            defer_stack: Vec::new(),
        }
    }

    fn run(mut self, image: &Image) -> Result<Vec<u8>> {
        self.write_header(image);

        if let Some(root) = image.root() {
            self.write_node(root)?;
            let mut frames = vec![Frame {
                node: root,
                next_child: self.tree.first_child(root),
            }];

            while let Some(frame) = frames.last_mut() {
                match frame.next_child {
                    Some(child) => {
                        frame.next_child = self.tree.next(child);
                        self.write_node(child)?;
                        if self.tree.is_block(child) {
                            frames.push(Frame {
                                node: child,
                                next_child: self.tree.first_child(child),
                            });
                        }
                    }
                    None => {
                        let frame = frames.pop().unwrap_or_else(|| unreachable!());
                        self.close_block(frame.node)?;
                    }
                }
            }

            self.patch_keys()?;
        }

        Ok(self.out.into_vec())
    }

    fn write_header(&mut self, image: &Image) {
        let signature = image.signature();
        let byte_len = signature.encode_utf16().count() * 2;
        self.out.write_le::<i32>(byte_len as i32);
        self.out.write_string_utf16(signature);
        for pair in [
            image.reader_version(),
            image.updater_version(),
            image.writer_version(),
        ] {
            self.out.write_le(pair.major);
            self.out.write_le(pair.minor);
        }
    }

    /// Emit a block's end. Ordinary blocks write their end tag only when
    /// closed; deferred content never has one, its reserved size field is
    /// patched instead.
    fn close_block(&mut self, node: NodeId) -> Result<()> {
        if matches!(self.tree.kind(node), NodeKind::DeferableContent) {
            let defer = self.defer_stack.pop().unwrap_or_else(|| unreachable!());
            let size_field = self.defers[defer].size_field;
            let size = self.out.pos() - (size_field + 4);
            let size = i32::try_from(size)
                .map_err(|_| malformed_error!("deferred content larger than 2 GiB"))?;
            self.out.patch_le(size_field, size)?;
            return Ok(());
        }
        if self.tree.is_closed(node) {
            let end = self
                .tree
                .kind(node)
                .record_type()
                .end_tag()
                .unwrap_or_else(|| unreachable!());
            self.out.write_le(end.tag());
        }
        Ok(())
    }

    /// Encode one reference as a sign-split i16: declarations by memoized pool
    /// slot, known codes negated.
    fn write_reference(
        pool: &HashMap<NodeId, u16>,
        name: &'static str,
        out: &mut Writer,
        id: IdRef,
    ) -> Result<()> {
        match id {
            IdRef::Known(code) => {
                if code == 0 || u32::from(code) > 0x8000 {
                    return Err(malformed_error!(
                        "known {} code {} is outside the encodable range",
                        name,
                        code
                    ));
                }
                #[allow(clippy::cast_possible_truncation)]
                out.write_le((-i32::from(code)) as i16);
            }
            IdRef::Declaration(node) => {
                let Some(&slot) = pool.get(&node) else {
                    return Err(malformed_error!(
                        "reference to a {} declaration that is not part of the document",
                        name
                    ));
                };
                #[allow(clippy::cast_possible_wrap)]
                out.write_le(slot as i16);
            }
        }
        Ok(())
    }

    /// Reserve the next slot of a pool for `node`. Slots are handed out in
    /// write order; callers insert the node after its own record is written,
    /// matching the load-side visibility of self references.
    fn next_slot(pool: &HashMap<NodeId, u16>, name: &'static str) -> Result<u16> {
        let slot = pool.len();
        if slot > MAX_POOL_SLOT {
            return Err(malformed_error!("{} pool exceeds {} slots", name, MAX_POOL_SLOT + 1));
        }
        #[allow(clippy::cast_possible_truncation)]
        let slot = slot as u16;
        Ok(slot)
    }

    /// Write the tag, 7-bit total size and payload of a variable-size record.
    /// The total counts its own encoded bytes, which makes it self-referential;
    /// the fixed point always exists and is found by trying each prefix width.
    /// Returns the output position where the payload starts.
    fn emit_sized(&mut self, rt: RecordType, payload: &Writer) -> Result<usize> {
        let payload_len = u32::try_from(payload.len())
            .map_err(|_| malformed_error!("record payload larger than 4 GiB"))?;
        let mut total = 0u32;
        for prefix in 1..=5u32 {
            if payload_len
                .checked_add(prefix)
                .is_some_and(|t| Writer::size_of_7bit_encoded_int(t) == prefix)
            {
                total = payload_len + prefix;
                break;
            }
        }
        if total == 0 {
            return Err(malformed_error!("record payload larger than 4 GiB"));
        }
        self.out.write_le(rt.tag());
        self.out.write_7bit_encoded_int(total);
        let start = self.out.pos();
        self.out.write_bytes(payload.data());
        Ok(start)
    }

    /// Register a key's placeholder with the innermost deferred scope. A key
    /// that carries no value is serialized with a zero offset and never
    /// patched.
    fn register_key(&mut self, placeholder: usize, value: Option<NodeId>) -> Result<()> {
        let Some(value) = value else {
            return Ok(());
        };
        let Some(&defer) = self.defer_stack.last() else {
            return Err(malformed_error!(
                "key record with a value outside deferred content"
            ));
        };
        self.defers[defer].keys.push((placeholder, value));
        Ok(())
    }

    #[allow(clippy::too_many_lines)]
    fn write_node(&mut self, node: NodeId) -> Result<()> {
        self.pos_of.insert(node, self.out.pos());

        match self.tree.kind(node) {
            NodeKind::Document {
                load_async,
                max_async_records,
                debug_baml,
            } => {
                self.out.write_le(RecordType::DocumentStart.tag());
                self.out.write_bool(*load_async);
                self.out.write_le(*max_async_records);
                self.out.write_bool(*debug_baml);
            }
            NodeKind::Element { type_id, flags } => {
                self.out.write_le(RecordType::ElementStart.tag());
                Self::write_reference(&self.types, "type", &mut self.out, *type_id)?;
                self.out.write_le(flags.bits());
            }
            NodeKind::PropertyComplex { attribute_id } => {
                self.out.write_le(RecordType::PropertyComplexStart.tag());
                Self::write_reference(&self.properties, "property", &mut self.out, *attribute_id)?;
            }
            NodeKind::PropertyArray { attribute_id } => {
                self.out.write_le(RecordType::PropertyArrayStart.tag());
                Self::write_reference(&self.properties, "property", &mut self.out, *attribute_id)?;
            }
            NodeKind::PropertyList { attribute_id } => {
                self.out.write_le(RecordType::PropertyListStart.tag());
                Self::write_reference(&self.properties, "property", &mut self.out, *attribute_id)?;
            }
            NodeKind::PropertyDictionary { attribute_id } => {
                self.out.write_le(RecordType::PropertyDictionaryStart.tag());
                Self::write_reference(&self.properties, "property", &mut self.out, *attribute_id)?;
            }
            NodeKind::ConstructorParameters => {
                self.out
                    .write_le(RecordType::ConstructorParametersStart.tag());
            }
            NodeKind::StaticResource { type_id, flags } => {
                self.out.write_le(RecordType::StaticResourceStart.tag());
                Self::write_reference(&self.types, "type", &mut self.out, *type_id)?;
                self.out.write_le(flags.bits());
            }
            NodeKind::DeferableContent => {
                self.out.write_le(RecordType::DeferableContentStart.tag());
                let size_field = self.out.reserve(4);
                let defer = self.defers.len();
                self.defers.push(DeferOut {
                    block: node,
                    size_field,
                    keys: Vec::new(),
                });
                self.defer_stack.push(defer);
            }
            NodeKind::KeyElement {
                type_id,
                flags,
                value,
                shared,
                shared_set,
            } => {
                let (value, shared, shared_set) = (*value, *shared, *shared_set);
                self.out.write_le(RecordType::KeyElementStart.tag());
                Self::write_reference(&self.types, "type", &mut self.out, *type_id)?;
                self.out.write_le(flags.bits());
                let placeholder = self.out.reserve(4);
                self.out.write_bool(shared);
                self.out.write_bool(shared_set);
                self.register_key(placeholder, value)?;
            }
            NodeKind::DefAttributeKeyType {
                type_id,
                flags,
                value,
                shared,
                shared_set,
            } => {
                let (value, shared, shared_set) = (*value, *shared, *shared_set);
                self.out.write_le(RecordType::DefAttributeKeyType.tag());
                Self::write_reference(&self.types, "type", &mut self.out, *type_id)?;
                self.out.write_le(flags.bits());
                let placeholder = self.out.reserve(4);
                self.out.write_bool(shared);
                self.out.write_bool(shared_set);
                self.register_key(placeholder, value)?;
            }
            NodeKind::ContentProperty { attribute_id } => {
                self.out.write_le(RecordType::ContentProperty.tag());
                Self::write_reference(&self.properties, "property", &mut self.out, *attribute_id)?;
            }
            NodeKind::PropertyStringReference {
                attribute_id,
                string_id,
            } => {
                self.out.write_le(RecordType::PropertyStringReference.tag());
                Self::write_reference(&self.properties, "property", &mut self.out, *attribute_id)?;
                Self::write_reference(&self.strings, "string", &mut self.out, *string_id)?;
            }
            NodeKind::PropertyTypeReference {
                attribute_id,
                type_id,
            } => {
                self.out.write_le(RecordType::PropertyTypeReference.tag());
                Self::write_reference(&self.properties, "property", &mut self.out, *attribute_id)?;
                Self::write_reference(&self.types, "type", &mut self.out, *type_id)?;
            }
            NodeKind::PropertyWithExtension {
                attribute_id,
                flags,
                value_id,
            } => {
                let (flags, value_id) = (*flags, *value_id);
                self.out.write_le(RecordType::PropertyWithExtension.tag());
                Self::write_reference(&self.properties, "property", &mut self.out, *attribute_id)?;
                self.out.write_le(flags);
                self.out.write_le(value_id);
            }
            NodeKind::ConstructorParameterType { type_id } => {
                self.out.write_le(RecordType::ConstructorParameterType.tag());
                Self::write_reference(&self.types, "type", &mut self.out, *type_id)?;
            }
            NodeKind::ConnectionId { id } => {
                let id = *id;
                self.out.write_le(RecordType::ConnectionId.tag());
                self.out.write_le(id);
            }
            NodeKind::StaticResourceId { id } => {
                let id = *id;
                self.out.write_le(RecordType::StaticResourceId.tag());
                self.out.write_le(id);
            }
            NodeKind::OptimizedStaticResource { flags, value_id } => {
                let (flags, value_id) = (*flags, *value_id);
                self.out.write_le(RecordType::OptimizedStaticResource.tag());
                self.out.write_le(flags);
                self.out.write_le(value_id);
            }
            NodeKind::PropertyWithStaticResourceId {
                attribute_id,
                resource_id,
            } => {
                let resource_id = *resource_id;
                self.out
                    .write_le(RecordType::PropertyWithStaticResourceId.tag());
                Self::write_reference(&self.properties, "property", &mut self.out, *attribute_id)?;
                self.out.write_le(resource_id);
            }
            NodeKind::LineNumberAndPosition {
                line_number,
                line_position,
            } => {
                let (line_number, line_position) = (*line_number, *line_position);
                self.out.write_le(RecordType::LineNumberAndPosition.tag());
                self.out.write_le(line_number);
                self.out.write_le(line_position);
            }
            NodeKind::LinePosition { line_position } => {
                let line_position = *line_position;
                self.out.write_le(RecordType::LinePosition.tag());
                self.out.write_le(line_position);
            }

            NodeKind::Property {
                attribute_id,
                value,
            } => {
                let mut payload = Writer::new();
                Self::write_reference(&self.properties, "property", &mut payload, *attribute_id)?;
                payload.write_prefixed_string_utf8(value);
                self.emit_sized(RecordType::Property, &payload)?;
            }
            NodeKind::PropertyCustom {
                attribute_id,
                serializer_type_id,
                data,
            } => {
                let mut payload = Writer::new();
                Self::write_reference(&self.properties, "property", &mut payload, *attribute_id)?;
                payload.write_le(*serializer_type_id);
                payload.write_bytes(data);
                self.emit_sized(RecordType::PropertyCustom, &payload)?;
            }
            NodeKind::PropertyWithConverter {
                attribute_id,
                value,
                converter_type_id,
            } => {
                let mut payload = Writer::new();
                Self::write_reference(&self.properties, "property", &mut payload, *attribute_id)?;
                payload.write_prefixed_string_utf8(value);
                Self::write_reference(&self.types, "type", &mut payload, *converter_type_id)?;
                self.emit_sized(RecordType::PropertyWithConverter, &payload)?;
            }
            NodeKind::LiteralContent {
                value,
                reserved0,
                reserved1,
            } => {
                let mut payload = Writer::new();
                payload.write_prefixed_string_utf8(value);
                payload.write_le(*reserved0);
                payload.write_le(*reserved1);
                self.emit_sized(RecordType::LiteralContent, &payload)?;
            }
            NodeKind::Text { value } => {
                let mut payload = Writer::new();
                payload.write_prefixed_string_utf8(value);
                self.emit_sized(RecordType::Text, &payload)?;
            }
            NodeKind::TextWithConverter {
                value,
                converter_type_id,
            } => {
                let mut payload = Writer::new();
                payload.write_prefixed_string_utf8(value);
                Self::write_reference(&self.types, "type", &mut payload, *converter_type_id)?;
                self.emit_sized(RecordType::TextWithConverter, &payload)?;
            }
            NodeKind::TextWithId { value_id } => {
                let mut payload = Writer::new();
                Self::write_reference(&self.strings, "string", &mut payload, *value_id)?;
                self.emit_sized(RecordType::TextWithId, &payload)?;
            }
            NodeKind::RoutedEvent {
                attribute_id,
                value,
            } => {
                let mut payload = Writer::new();
                Self::write_reference(&self.properties, "property", &mut payload, *attribute_id)?;
                payload.write_prefixed_string_utf8(value);
                self.emit_sized(RecordType::RoutedEvent, &payload)?;
            }
            NodeKind::XmlnsProperty {
                prefix,
                xml_namespace,
                assembly_ids,
            } => {
                let mut payload = Writer::new();
                payload.write_prefixed_string_utf8(prefix);
                payload.write_prefixed_string_utf8(xml_namespace);
                let count = u16::try_from(assembly_ids.len())
                    .map_err(|_| malformed_error!("xmlns record with more than 65535 assemblies"))?;
                payload.write_le(count);
                for &assembly_id in assembly_ids {
                    Self::write_reference(&self.assemblies, "assembly", &mut payload, assembly_id)?;
                }
                self.emit_sized(RecordType::XmlnsProperty, &payload)?;
            }
            NodeKind::PiMapping {
                xml_namespace,
                clr_namespace,
                assembly_id,
            } => {
                let mut payload = Writer::new();
                payload.write_prefixed_string_utf8(xml_namespace);
                payload.write_prefixed_string_utf8(clr_namespace);
                Self::write_reference(&self.assemblies, "assembly", &mut payload, *assembly_id)?;
                self.emit_sized(RecordType::PiMapping, &payload)?;
            }
            NodeKind::AssemblyInfo { full_name } => {
                let slot = Self::next_slot(&self.assemblies, "assembly")?;
                let mut payload = Writer::new();
                payload.write_le(slot);
                payload.write_prefixed_string_utf8(full_name);
                self.emit_sized(RecordType::AssemblyInfo, &payload)?;
                self.assemblies.insert(node, slot);
            }
            NodeKind::TypeInfo {
                assembly_id,
                type_full_name,
            } => {
                let slot = Self::next_slot(&self.types, "type")?;
                let mut payload = Writer::new();
                payload.write_le(slot);
                Self::write_reference(&self.assemblies, "assembly", &mut payload, *assembly_id)?;
                payload.write_prefixed_string_utf8(type_full_name);
                self.emit_sized(RecordType::TypeInfo, &payload)?;
                self.types.insert(node, slot);
            }
            NodeKind::TypeSerializerInfo {
                assembly_id,
                type_full_name,
                serializer_type_id,
            } => {
                let slot = Self::next_slot(&self.types, "type")?;
                let mut payload = Writer::new();
                payload.write_le(slot);
                Self::write_reference(&self.assemblies, "assembly", &mut payload, *assembly_id)?;
                payload.write_prefixed_string_utf8(type_full_name);
                Self::write_reference(&self.types, "type", &mut payload, *serializer_type_id)?;
                self.emit_sized(RecordType::TypeSerializerInfo, &payload)?;
                self.types.insert(node, slot);
            }
            NodeKind::PropertyInfo {
                owner_type_id,
                usage,
                name,
            } => {
                let slot = Self::next_slot(&self.properties, "property")?;
                let mut payload = Writer::new();
                payload.write_le(slot);
                Self::write_reference(&self.types, "type", &mut payload, *owner_type_id)?;
                payload.write_le(*usage);
                payload.write_prefixed_string_utf8(name);
                self.emit_sized(RecordType::PropertyInfo, &payload)?;
                self.properties.insert(node, slot);
            }
            NodeKind::StringInfo { value } => {
                let slot = Self::next_slot(&self.strings, "string")?;
                let mut payload = Writer::new();
                payload.write_le(slot);
                payload.write_prefixed_string_utf8(value);
                self.emit_sized(RecordType::StringInfo, &payload)?;
                self.strings.insert(node, slot);
            }
            NodeKind::DefAttributeKeyString {
                value_id,
                value,
                shared,
                shared_set,
            } => {
                let (value, shared, shared_set) = (*value, *shared, *shared_set);
                let mut payload = Writer::new();
                Self::write_reference(&self.strings, "string", &mut payload, *value_id)?;
                payload.write_le(0i32);
                payload.write_bool(shared);
                payload.write_bool(shared_set);
                let payload_start = self.emit_sized(RecordType::DefAttributeKeyString, &payload)?;
                // The i16 string reference precedes the offset field.
                self.register_key(payload_start + 2, value)?;
            }
            NodeKind::DefAttribute { value, name_id } => {
                let mut payload = Writer::new();
                payload.write_prefixed_string_utf8(value);
                Self::write_reference(&self.strings, "string", &mut payload, *name_id)?;
                self.emit_sized(RecordType::DefAttribute, &payload)?;
            }
            NodeKind::NamedElement {
                type_id,
                runtime_name,
            } => {
                let mut payload = Writer::new();
                Self::write_reference(&self.types, "type", &mut payload, *type_id)?;
                payload.write_prefixed_string_utf8(runtime_name);
                self.emit_sized(RecordType::NamedElement, &payload)?;
            }
            NodeKind::PresentationOptionsAttribute { value, name_id } => {
                let mut payload = Writer::new();
                payload.write_prefixed_string_utf8(value);
                Self::write_reference(&self.strings, "string", &mut payload, *name_id)?;
                self.emit_sized(RecordType::PresentationOptionsAttribute, &payload)?;
            }
        }
        Ok(())
    }

    /// Resolve every registered key to its relative offset and patch the
    /// placeholders. Offsets are relative to the first direct child of the
    /// deferred block outside the key section; a key whose value precedes that
    /// point cannot be expressed.
    fn patch_keys(&mut self) -> Result<()> {
        for defer in &self.defers {
            if defer.keys.is_empty() {
                continue;
            }
            let Some(start) = self
                .tree
                .children(defer.block)
                .find(|&n| !is_key_section(self.tree.kind(n).record_type()))
            else {
                return Err(malformed_error!(
                    "deferred content has keys but no value section"
                ));
            };
            let base = self.pos_of[&start];

            for &(placeholder, value) in &defer.keys {
                let Some(&value_pos) = self.pos_of.get(&value) else {
                    return Err(malformed_error!(
                        "key value node was not serialized within the document"
                    ));
                };
                if value_pos < base {
                    return Err(malformed_error!(
                        "key value precedes the deferred value section"
                    ));
                }
                let offset = i32::try_from(value_pos - base)
                    .map_err(|_| malformed_error!("key value offset exceeds 2 GiB"))?;
                self.out.patch_le(placeholder, offset)?;
            }
        }
        Ok(())
    }
}
