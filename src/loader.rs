//! Stream decoder: bytes in, [`Image`] out.
//!
//! The loader is a single-use state machine over a forward-only
//! [`crate::Parser`]. It reads the header, then the record stream, maintaining
//! a stack of open scopes. A scope is bounded either by an end tag (ordinary
//! blocks) or by a byte count (deferred content, which has no end tag on the
//! wire). Declarations feed four id pools as they stream past, so every
//! sign-encoded reference resolves the moment it is read. Dictionary keys carry
//! byte offsets relative to the start of the deferred content body; those are
//! resolved to node handles in a post-pass once all record positions are known.

use std::collections::HashMap;

use crate::{
    document::{
        image::{Image, VersionPair},
        node::{ElementFlags, IdRef, NodeId, NodeKind},
        tree::Tree,
    },
    file::parser::Parser,
    records::RecordType,
    Result,
};

/// Which declaration pool a reference field indexes.
#[derive(Clone, Copy, Debug)]
enum Pool {
    Assembly,
    Type,
    Property,
    String,
}

impl Pool {
    fn name(self) -> &'static str {
        match self {
            Pool::Assembly => "assembly",
            Pool::Type => "type",
            Pool::Property => "property",
            Pool::String => "string",
        }
    }
}

/// How an open scope ends.
enum Bound {
    /// Closed explicitly by this end tag.
    EndTag(RecordType),
    /// Self-terminating at this stream position (deferred content).
    Bytes(usize),
}

/// One open block on the scope stack.
struct Scope {
    block: NodeId,
    bound: Bound,
    /// Last child appended so far, for O(1) appends.
    tail: Option<NodeId>,
    /// Index into `Loader::defers` when this scope is deferred content.
    defer: Option<usize>,
}

/// Pending key bookkeeping for one deferred-content block. Outlives the scope
/// itself: keys are resolved after the whole stream has been read.
struct DeferScope {
    block: NodeId,
    /// `(key node, declared offset)` in stream order.
    keys: Vec<(NodeId, i32)>,
}

pub(crate) fn load(data: &[u8]) -> Result<Image> {
    Loader::new(data).run()
}

struct Loader<'a> {
    parser: Parser<'a>,
    tree: Tree,
    root: Option<NodeId>,
    scopes: Vec<Scope>,
    defers: Vec<DeferScope>,
    /// Tag byte position of every record, both directions.
    node_at: HashMap<usize, NodeId>,
    pos_of: HashMap<NodeId, usize>,
    assemblies: Vec<NodeId>,
    types: Vec<NodeId>,
    properties: Vec<NodeId>,
    strings: Vec<NodeId>,
}

impl<'a> Loader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Loader {
            parser: Parser::new(data),
            tree: Tree::new(),
            root: None,
            scopes: Vec::new(),
            defers: Vec::new(),
            node_at: HashMap::new(),
            pos_of: HashMap::new(),
            assemblies: Vec::new(),
            types: Vec::new(),
            properties: Vec::new(),
            strings: Vec::new(),
        }
    }

    fn run(mut self) -> Result<Image> {
        let (signature, reader, updater, writer) = self.read_header()?;

        while self.parser.has_more_data() {
            self.pop_exhausted_byte_scopes()?;
            if !self.parser.has_more_data() {
                break;
            }

            let tag_pos = self.parser.pos();
            let tag: u8 = self.parser.read_le()?;
            let Some(rt) = RecordType::from_tag(tag) else {
                return Err(malformed_error!(
                    "unknown record tag 0x{:02X} at offset {}",
                    tag,
                    tag_pos
                ));
            };
            if rt.is_forbidden() {
                return Err(malformed_error!(
                    "record type {:?} marks an uncompiled stream and is not processable",
                    rt
                ));
            }
            if rt.is_end_tag() {
                self.end_scope(rt)?;
                continue;
            }
            self.read_record(rt, tag_pos)?;
        }

        self.pop_exhausted_byte_scopes()?;
        if let Some(open) = self.scopes.last() {
            return Err(malformed_error!(
                "stream ended with an unterminated {:?} scope",
                self.tree.kind(open.block).record_type()
            ));
        }

        self.resolve_keys();

        Ok(Image::from_parts(
            signature, reader, updater, writer, self.tree, self.root,
        ))
    }

    fn read_header(&mut self) -> Result<(String, VersionPair, VersionPair, VersionPair)> {
        let byte_len: i32 = self.parser.read_le()?;
        if byte_len < 0 || byte_len % 2 != 0 {
            return Err(malformed_error!(
                "invalid feature id length {} in header",
                byte_len
            ));
        }
        #[allow(clippy::cast_sign_loss)]
        let signature = self.parser.read_string_utf16(byte_len as usize)?;

        let mut versions = [VersionPair::default(); 3];
        for pair in &mut versions {
            pair.major = self.parser.read_le()?;
            pair.minor = self.parser.read_le()?;
        }
        Ok((signature, versions[0], versions[1], versions[2]))
    }

    /// Close every byte-bounded scope whose bound has been reached. A record
    /// that straddles the bound means the declared content size was wrong.
    fn pop_exhausted_byte_scopes(&mut self) -> Result<()> {
        while let Some(scope) = self.scopes.last() {
            let Bound::Bytes(end) = scope.bound else {
                break;
            };
            if self.parser.pos() < end {
                break;
            }
            if self.parser.pos() > end {
                return Err(malformed_error!(
                    "record crosses the deferred content boundary at offset {}",
                    end
                ));
            }
            let scope = self.scopes.pop().unwrap_or_else(|| unreachable!());
            self.tree.set_closed(scope.block, true);
        }
        Ok(())
    }

    fn end_scope(&mut self, rt: RecordType) -> Result<()> {
        let Some(scope) = self.scopes.last() else {
            return Err(malformed_error!("end tag {:?} with no open scope", rt));
        };
        match scope.bound {
            Bound::EndTag(expected) if expected == rt => {}
            Bound::EndTag(expected) => {
                return Err(malformed_error!(
                    "end tag mismatch: expected {:?}, found {:?}",
                    expected,
                    rt
                ));
            }
            Bound::Bytes(_) => {
                return Err(malformed_error!(
                    "end tag {:?} inside deferred content with no open scope",
                    rt
                ));
            }
        }
        let scope = self.scopes.pop().unwrap_or_else(|| unreachable!());
        self.tree.set_closed(scope.block, true);
        Ok(())
    }

    /// Allocate the node, attach it to the innermost scope (or install it as
    /// the root) and index its tag position.
    fn add_node(&mut self, kind: NodeKind, tag_pos: usize, rt: RecordType) -> Result<NodeId> {
        if self.scopes.is_empty() {
            if self.root.is_some() {
                return Err(malformed_error!(
                    "data after the document scope closed, at offset {}",
                    tag_pos
                ));
            }
            if rt != RecordType::DocumentStart {
                return Err(malformed_error!(
                    "stream must begin with DocumentStart, found {:?}",
                    rt
                ));
            }
        }

        let node = self.tree.alloc(kind);
        match self.scopes.last_mut() {
            Some(scope) => {
                let (block, tail) = (scope.block, scope.tail);
                scope.tail = Some(node);
                self.tree.attach_after(block, tail, node);
            }
            None => self.root = Some(node),
        }
        self.node_at.insert(tag_pos, node);
        self.pos_of.insert(node, tag_pos);
        Ok(node)
    }

    fn begin_scope(&mut self, block: NodeId, end: RecordType) {
        self.scopes.push(Scope {
            block,
            bound: Bound::EndTag(end),
            tail: None,
            defer: None,
        });
    }

    /// Resolve a sign-encoded i16 reference against a pool.
    fn read_reference(&mut self, pool: Pool) -> Result<IdRef> {
        let raw: i16 = self.parser.read_le()?;
        if raw < 0 {
            #[allow(clippy::cast_sign_loss)]
            return Ok(IdRef::Known((-i32::from(raw)) as u16));
        }
        let slot = raw as usize;
        let declarations = match pool {
            Pool::Assembly => &self.assemblies,
            Pool::Type => &self.types,
            Pool::Property => &self.properties,
            Pool::String => &self.strings,
        };
        declarations.get(slot).copied().map(IdRef::Declaration).ok_or_else(|| {
            malformed_error!("reference to undeclared {} id {}", pool.name(), raw)
        })
    }

    /// Check a declaration's slot id against the pool it feeds. Slots must be
    /// declared gap-free in stream order.
    fn check_slot(&self, pool: Pool, slot: u16) -> Result<()> {
        let expected = match pool {
            Pool::Assembly => self.assemblies.len(),
            Pool::Type => self.types.len(),
            Pool::Property => self.properties.len(),
            Pool::String => self.strings.len(),
        };
        if slot as usize != expected {
            return Err(malformed_error!(
                "{} declaration with slot {} where {} was expected",
                pool.name(),
                slot,
                expected
            ));
        }
        Ok(())
    }

    /// Register `(key, declared offset)` with the innermost deferred-content
    /// scope.
    fn register_key(&mut self, key: NodeId, offset: i32, rt: RecordType) -> Result<()> {
        let Some(defer) = self.scopes.iter().rev().find_map(|s| s.defer) else {
            return Err(malformed_error!(
                "{:?} record outside deferred content",
                rt
            ));
        };
        self.defers[defer].keys.push((key, offset));
        Ok(())
    }

    fn read_record(&mut self, rt: RecordType, tag_pos: usize) -> Result<()> {
        if rt.has_size_prefix() {
            return self.read_sized_record(rt, tag_pos);
        }

        match rt {
            RecordType::DocumentStart => {
                let load_async = self.parser.read_bool()?;
                let max_async_records: u32 = self.parser.read_le()?;
                let debug_baml = self.parser.read_bool()?;
                let node = self.add_node(
                    NodeKind::Document {
                        load_async,
                        max_async_records,
                        debug_baml,
                    },
                    tag_pos,
                    rt,
                )?;
                self.begin_scope(node, RecordType::DocumentEnd);
            }
            RecordType::ElementStart => {
                let type_id = self.read_reference(Pool::Type)?;
                let flags = ElementFlags::from_bits_retain(self.parser.read_le()?);
                let node = self.add_node(NodeKind::Element { type_id, flags }, tag_pos, rt)?;
                self.begin_scope(node, RecordType::ElementEnd);
            }
            RecordType::PropertyComplexStart => {
                let attribute_id = self.read_reference(Pool::Property)?;
                let node =
                    self.add_node(NodeKind::PropertyComplex { attribute_id }, tag_pos, rt)?;
                self.begin_scope(node, RecordType::PropertyComplexEnd);
            }
            RecordType::PropertyArrayStart => {
                let attribute_id = self.read_reference(Pool::Property)?;
                let node = self.add_node(NodeKind::PropertyArray { attribute_id }, tag_pos, rt)?;
                self.begin_scope(node, RecordType::PropertyArrayEnd);
            }
            RecordType::PropertyListStart => {
                let attribute_id = self.read_reference(Pool::Property)?;
                let node = self.add_node(NodeKind::PropertyList { attribute_id }, tag_pos, rt)?;
                self.begin_scope(node, RecordType::PropertyListEnd);
            }
            RecordType::PropertyDictionaryStart => {
                let attribute_id = self.read_reference(Pool::Property)?;
                let node =
                    self.add_node(NodeKind::PropertyDictionary { attribute_id }, tag_pos, rt)?;
                self.begin_scope(node, RecordType::PropertyDictionaryEnd);
            }
            RecordType::ConstructorParametersStart => {
                let node = self.add_node(NodeKind::ConstructorParameters, tag_pos, rt)?;
                self.begin_scope(node, RecordType::ConstructorParametersEnd);
            }
            RecordType::StaticResourceStart => {
                let type_id = self.read_reference(Pool::Type)?;
                let flags = ElementFlags::from_bits_retain(self.parser.read_le()?);
                let node =
                    self.add_node(NodeKind::StaticResource { type_id, flags }, tag_pos, rt)?;
                self.begin_scope(node, RecordType::StaticResourceEnd);
            }
            RecordType::KeyElementStart => {
                let type_id = self.read_reference(Pool::Type)?;
                let flags = ElementFlags::from_bits_retain(self.parser.read_le()?);
                let value_offset: i32 = self.parser.read_le()?;
                let shared = self.parser.read_bool()?;
                let shared_set = self.parser.read_bool()?;
                let node = self.add_node(
                    NodeKind::KeyElement {
                        type_id,
                        flags,
                        value: None,
                        shared,
                        shared_set,
                    },
                    tag_pos,
                    rt,
                )?;
                self.register_key(node, value_offset, rt)?;
                self.begin_scope(node, RecordType::KeyElementEnd);
            }
            RecordType::DeferableContentStart => {
                let content_size: i32 = self.parser.read_le()?;
                if content_size < 0 {
                    return Err(malformed_error!(
                        "negative deferred content size {}",
                        content_size
                    ));
                }
                #[allow(clippy::cast_sign_loss)]
                let end = self.parser.pos() + content_size as usize;
                if end > self.parser.len() {
                    return Err(malformed_error!(
                        "deferred content size {} exceeds the stream",
                        content_size
                    ));
                }
                let node = self.add_node(NodeKind::DeferableContent, tag_pos, rt)?;
                let defer = self.defers.len();
                self.defers.push(DeferScope {
                    block: node,
                    keys: Vec::new(),
                });
                self.scopes.push(Scope {
                    block: node,
                    bound: Bound::Bytes(end),
                    tail: None,
                    defer: Some(defer),
                });
            }
            RecordType::DefAttributeKeyType => {
                let type_id = self.read_reference(Pool::Type)?;
                let flags = ElementFlags::from_bits_retain(self.parser.read_le()?);
                let value_offset: i32 = self.parser.read_le()?;
                let shared = self.parser.read_bool()?;
                let shared_set = self.parser.read_bool()?;
                let node = self.add_node(
                    NodeKind::DefAttributeKeyType {
                        type_id,
                        flags,
                        value: None,
                        shared,
                        shared_set,
                    },
                    tag_pos,
                    rt,
                )?;
                self.register_key(node, value_offset, rt)?;
            }
            RecordType::ContentProperty => {
                let attribute_id = self.read_reference(Pool::Property)?;
                self.add_node(NodeKind::ContentProperty { attribute_id }, tag_pos, rt)?;
            }
            RecordType::PropertyStringReference => {
                let attribute_id = self.read_reference(Pool::Property)?;
                let string_id = self.read_reference(Pool::String)?;
                self.add_node(
                    NodeKind::PropertyStringReference {
                        attribute_id,
                        string_id,
                    },
                    tag_pos,
                    rt,
                )?;
            }
            RecordType::PropertyTypeReference => {
                let attribute_id = self.read_reference(Pool::Property)?;
                let type_id = self.read_reference(Pool::Type)?;
                self.add_node(
                    NodeKind::PropertyTypeReference {
                        attribute_id,
                        type_id,
                    },
                    tag_pos,
                    rt,
                )?;
            }
            RecordType::PropertyWithExtension => {
                let attribute_id = self.read_reference(Pool::Property)?;
                let flags: u16 = self.parser.read_le()?;
                let value_id: u16 = self.parser.read_le()?;
                self.add_node(
                    NodeKind::PropertyWithExtension {
                        attribute_id,
                        flags,
                        value_id,
                    },
                    tag_pos,
                    rt,
                )?;
            }
            RecordType::ConstructorParameterType => {
                let type_id = self.read_reference(Pool::Type)?;
                self.add_node(NodeKind::ConstructorParameterType { type_id }, tag_pos, rt)?;
            }
            RecordType::ConnectionId => {
                let id: u32 = self.parser.read_le()?;
                self.add_node(NodeKind::ConnectionId { id }, tag_pos, rt)?;
            }
            RecordType::StaticResourceId => {
                let id: u16 = self.parser.read_le()?;
                self.add_node(NodeKind::StaticResourceId { id }, tag_pos, rt)?;
            }
            RecordType::OptimizedStaticResource => {
                let flags: u8 = self.parser.read_le()?;
                let value_id: u16 = self.parser.read_le()?;
                self.add_node(
                    NodeKind::OptimizedStaticResource { flags, value_id },
                    tag_pos,
                    rt,
                )?;
            }
            RecordType::PropertyWithStaticResourceId => {
                let attribute_id = self.read_reference(Pool::Property)?;
                let resource_id: u16 = self.parser.read_le()?;
                self.add_node(
                    NodeKind::PropertyWithStaticResourceId {
                        attribute_id,
                        resource_id,
                    },
                    tag_pos,
                    rt,
                )?;
            }
            RecordType::LineNumberAndPosition => {
                let line_number: u32 = self.parser.read_le()?;
                let line_position: u32 = self.parser.read_le()?;
                self.add_node(
                    NodeKind::LineNumberAndPosition {
                        line_number,
                        line_position,
                    },
                    tag_pos,
                    rt,
                )?;
            }
            RecordType::LinePosition => {
                let line_position: u32 = self.parser.read_le()?;
                self.add_node(NodeKind::LinePosition { line_position }, tag_pos, rt)?;
            }
            _ => {
                // End tags and sized records are handled before dispatch.
                return Err(malformed_error!(
                    "unexpected record type {:?} at offset {}",
                    rt,
                    tag_pos
                ));
            }
        }
        Ok(())
    }

    /// Decode a record carrying a 7-bit-encoded total size (the total counts
    /// its own encoded bytes plus the payload).
    fn read_sized_record(&mut self, rt: RecordType, tag_pos: usize) -> Result<()> {
        let size_start = self.parser.pos();
        let total = self.parser.read_7bit_encoded_int()? as usize;
        let payload_end = size_start + total;
        if payload_end < self.parser.pos() || payload_end > self.parser.len() {
            return Err(malformed_error!(
                "record size {} at offset {} is out of range",
                total,
                tag_pos
            ));
        }

        match rt {
            RecordType::Property => {
                let attribute_id = self.read_reference(Pool::Property)?;
                let value = self.parser.read_prefixed_string_utf8()?;
                self.add_node(
                    NodeKind::Property {
                        attribute_id,
                        value,
                    },
                    tag_pos,
                    rt,
                )?;
            }
            RecordType::PropertyCustom => {
                let attribute_id = self.read_reference(Pool::Property)?;
                let serializer_type_id: u16 = self.parser.read_le()?;
                if payload_end < self.parser.pos() {
                    return Err(malformed_error!(
                        "custom property record at offset {} is truncated",
                        tag_pos
                    ));
                }
                let data = self
                    .parser
                    .read_bytes(payload_end - self.parser.pos())?
                    .to_vec();
                self.add_node(
                    NodeKind::PropertyCustom {
                        attribute_id,
                        serializer_type_id,
                        data,
                    },
                    tag_pos,
                    rt,
                )?;
            }
            RecordType::PropertyWithConverter => {
                let attribute_id = self.read_reference(Pool::Property)?;
                let value = self.parser.read_prefixed_string_utf8()?;
                let converter_type_id = self.read_reference(Pool::Type)?;
                self.add_node(
                    NodeKind::PropertyWithConverter {
                        attribute_id,
                        value,
                        converter_type_id,
                    },
                    tag_pos,
                    rt,
                )?;
            }
            RecordType::LiteralContent => {
                let value = self.parser.read_prefixed_string_utf8()?;
                let reserved0: u32 = self.parser.read_le()?;
                let reserved1: u32 = self.parser.read_le()?;
                self.add_node(
                    NodeKind::LiteralContent {
                        value,
                        reserved0,
                        reserved1,
                    },
                    tag_pos,
                    rt,
                )?;
            }
            RecordType::Text => {
                let value = self.parser.read_prefixed_string_utf8()?;
                self.add_node(NodeKind::Text { value }, tag_pos, rt)?;
            }
            RecordType::TextWithConverter => {
                let value = self.parser.read_prefixed_string_utf8()?;
                let converter_type_id = self.read_reference(Pool::Type)?;
                self.add_node(
                    NodeKind::TextWithConverter {
                        value,
                        converter_type_id,
                    },
                    tag_pos,
                    rt,
                )?;
            }
            RecordType::TextWithId => {
                let value_id = self.read_reference(Pool::String)?;
                self.add_node(NodeKind::TextWithId { value_id }, tag_pos, rt)?;
            }
            RecordType::RoutedEvent => {
                let attribute_id = self.read_reference(Pool::Property)?;
                let value = self.parser.read_prefixed_string_utf8()?;
                self.add_node(
                    NodeKind::RoutedEvent {
                        attribute_id,
                        value,
                    },
                    tag_pos,
                    rt,
                )?;
            }
            RecordType::XmlnsProperty => {
                let prefix = self.parser.read_prefixed_string_utf8()?;
                let xml_namespace = self.parser.read_prefixed_string_utf8()?;
                let count: u16 = self.parser.read_le()?;
                let mut assembly_ids = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    assembly_ids.push(self.read_reference(Pool::Assembly)?);
                }
                self.add_node(
                    NodeKind::XmlnsProperty {
                        prefix,
                        xml_namespace,
                        assembly_ids,
                    },
                    tag_pos,
                    rt,
                )?;
            }
            RecordType::PiMapping => {
                let xml_namespace = self.parser.read_prefixed_string_utf8()?;
                let clr_namespace = self.parser.read_prefixed_string_utf8()?;
                let assembly_id = self.read_reference(Pool::Assembly)?;
                self.add_node(
                    NodeKind::PiMapping {
                        xml_namespace,
                        clr_namespace,
                        assembly_id,
                    },
                    tag_pos,
                    rt,
                )?;
            }
            RecordType::AssemblyInfo => {
                let slot: u16 = self.parser.read_le()?;
                self.check_slot(Pool::Assembly, slot)?;
                let full_name = self.parser.read_prefixed_string_utf8()?;
                let node = self.add_node(NodeKind::AssemblyInfo { full_name }, tag_pos, rt)?;
                self.assemblies.push(node);
            }
            RecordType::TypeInfo => {
                let slot: u16 = self.parser.read_le()?;
                self.check_slot(Pool::Type, slot)?;
                let assembly_id = self.read_reference(Pool::Assembly)?;
                let type_full_name = self.parser.read_prefixed_string_utf8()?;
                let node = self.add_node(
                    NodeKind::TypeInfo {
                        assembly_id,
                        type_full_name,
                    },
                    tag_pos,
                    rt,
                )?;
                self.types.push(node);
            }
            RecordType::TypeSerializerInfo => {
                let slot: u16 = self.parser.read_le()?;
                self.check_slot(Pool::Type, slot)?;
                let assembly_id = self.read_reference(Pool::Assembly)?;
                let type_full_name = self.parser.read_prefixed_string_utf8()?;
                let serializer_type_id = self.read_reference(Pool::Type)?;
                let node = self.add_node(
                    NodeKind::TypeSerializerInfo {
                        assembly_id,
                        type_full_name,
                        serializer_type_id,
                    },
                    tag_pos,
                    rt,
                )?;
                self.types.push(node);
            }
            RecordType::PropertyInfo => {
                let slot: u16 = self.parser.read_le()?;
                self.check_slot(Pool::Property, slot)?;
                let owner_type_id = self.read_reference(Pool::Type)?;
                let usage: u8 = self.parser.read_le()?;
                let name = self.parser.read_prefixed_string_utf8()?;
                let node = self.add_node(
                    NodeKind::PropertyInfo {
                        owner_type_id,
                        usage,
                        name,
                    },
                    tag_pos,
                    rt,
                )?;
                self.properties.push(node);
            }
            RecordType::StringInfo => {
                let slot: u16 = self.parser.read_le()?;
                self.check_slot(Pool::String, slot)?;
                let value = self.parser.read_prefixed_string_utf8()?;
                let node = self.add_node(NodeKind::StringInfo { value }, tag_pos, rt)?;
                self.strings.push(node);
            }
            RecordType::DefAttributeKeyString => {
                let value_id = self.read_reference(Pool::String)?;
                let value_offset: i32 = self.parser.read_le()?;
                let shared = self.parser.read_bool()?;
                let shared_set = self.parser.read_bool()?;
                let node = self.add_node(
                    NodeKind::DefAttributeKeyString {
                        value_id,
                        value: None,
                        shared,
                        shared_set,
                    },
                    tag_pos,
                    rt,
                )?;
                self.register_key(node, value_offset, rt)?;
            }
            RecordType::DefAttribute => {
                let value = self.parser.read_prefixed_string_utf8()?;
                let name_id = self.read_reference(Pool::String)?;
                self.add_node(NodeKind::DefAttribute { value, name_id }, tag_pos, rt)?;
            }
            RecordType::NamedElement => {
                let type_id = self.read_reference(Pool::Type)?;
                let runtime_name = self.parser.read_prefixed_string_utf8()?;
                self.add_node(
                    NodeKind::NamedElement {
                        type_id,
                        runtime_name,
                    },
                    tag_pos,
                    rt,
                )?;
            }
            RecordType::PresentationOptionsAttribute => {
                let value = self.parser.read_prefixed_string_utf8()?;
                let name_id = self.read_reference(Pool::String)?;
                self.add_node(
                    NodeKind::PresentationOptionsAttribute { value, name_id },
                    tag_pos,
                    rt,
                )?;
            }
            _ => {
                return Err(malformed_error!(
                    "unexpected sized record type {:?} at offset {}",
                    rt,
                    tag_pos
                ));
            }
        }

        if self.parser.pos() != payload_end {
            return Err(malformed_error!(
                "record {:?} at offset {} declares size {} but decoded {} bytes",
                rt,
                tag_pos,
                total,
                self.parser.pos() - size_start
            ));
        }
        Ok(())
    }

    /// Turn declared key offsets into node handles. The offsets are relative
    /// to the first direct child of the deferred block that is not part of the
    /// key section; offsets that land on no record are skipped silently, as
    /// shipped streams do contain dangling ones.
    fn resolve_keys(&mut self) {
        for defer in &self.defers {
            let Some(start) = self
                .tree
                .children(defer.block)
                .find(|&n| !is_key_section(self.tree.kind(n).record_type()))
            else {
                continue;
            };
            let base = self.pos_of[&start] as i64;

            for &(key, offset) in &defer.keys {
                let target = base + i64::from(offset);
                let resolved = usize::try_from(target)
                    .ok()
                    .and_then(|pos| self.node_at.get(&pos).copied());
                let Some(resolved) = resolved else {
                    continue;
                };
                match self.tree.kind_mut(key) {
                    NodeKind::DefAttributeKeyString { value, .. }
                    | NodeKind::DefAttributeKeyType { value, .. }
                    | NodeKind::KeyElement { value, .. } => *value = Some(resolved),
                    _ => {}
                }
            }
        }
    }
}

/// The record types that form a deferred block's key section. The value area
/// starts at the first direct child outside this exact set.
pub(crate) fn is_key_section(rt: RecordType) -> bool {
    matches!(
        rt,
        RecordType::DefAttributeKeyString
            | RecordType::DefAttributeKeyType
            | RecordType::KeyElementStart
            | RecordType::StaticResourceStart
            | RecordType::OptimizedStaticResource
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_section_is_the_exact_record_set() {
        assert!(is_key_section(RecordType::DefAttributeKeyString));
        assert!(is_key_section(RecordType::OptimizedStaticResource));
        // Close relatives stay outside the set.
        assert!(!is_key_section(RecordType::StaticResourceId));
        assert!(!is_key_section(RecordType::PropertyWithStaticResourceId));
        assert!(!is_key_section(RecordType::DefAttribute));
    }
}
