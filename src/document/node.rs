//! Node identity and the typed payloads of the document tree.
//!
//! Nodes live in an arena ([`crate::document::tree::Tree`]) and refer to each other
//! by stable [`NodeId`] handles; only the arena owns memory. The parent→first-child
//! edge is the owning relationship, while sibling links, parent back-pointers and
//! dictionary key→value cross-links are plain non-owning indices, which sidesteps
//! the aliasing hazards of the classic doubly-linked representation.
//!
//! [`NodeKind`] is the closed set of logical records a document can contain, one
//! variant per record with its decoded fields. Wire-level artifacts (slot ids,
//! sign-encoded references, relative key offsets, end tags) never appear here: they
//! are reconstructed by the builder and absorbed by the loader.

use crate::records::RecordType;

/// Stable handle to a node in a [`crate::document::tree::Tree`].
///
/// Handles are plain indices into the arena; they stay valid for the lifetime of
/// the tree (nodes are never deallocated, only detached) and are meaningless when
/// applied to a different tree.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    /// The arena index of this handle.
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A reference into one of the four per-document declaration pools (assembly,
/// type, property, string), or into the fixed system table of well-known
/// identifiers.
///
/// The sign-based wire encoding (`id >= 0` = declaration slot, `id < 0` =
/// `-code` into the known table) exists only at the stream boundary; in memory
/// the two namespaces are distinct constructors and never alias. A declaration
/// reference points at the declaring record node itself, so it stays valid across
/// arbitrary tree edits and id reassignment on save.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum IdRef {
    /// Declared in this document; the handle of the declaring record
    /// (`AssemblyInfo`, `TypeInfo`/`TypeSerializerInfo`, `PropertyInfo` or
    /// `StringInfo`, depending on the pool the field belongs to).
    Declaration(NodeId),
    /// Index into the externally-defined system table. Codes start at 1; the
    /// table contents are resolved by external collaborators, this codec carries
    /// the code opaquely.
    Known(u16),
}

bitflags::bitflags! {
    /// Flag byte carried by `ElementStart`, `KeyElementStart`,
    /// `DefAttributeKeyType` and `StaticResourceStart` records.
    ///
    /// Unknown bits are preserved verbatim so foreign streams round-trip.
    #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
    pub struct ElementFlags: u8 {
        /// The element is instantiated through its type converter.
        const CREATE_USING_TYPE_CONVERTER = 0x01;
        /// The element was injected by the markup compiler.
        const IS_INJECTED = 0x02;

        const _ = !0;
    }
}

/// The typed payload of a document node: one variant per logical BAML record.
///
/// Block variants ([`NodeKind::is_block`]) own a child list in the tree; the
/// separate wire End tags have no node representation. The three key-bearing
/// variants (`DefAttributeKeyString`, `DefAttributeKeyType`, `KeyElement`) carry
/// an optional `value` handle: the node elsewhere in the same deferable-content
/// subtree that holds the dictionary value. On disk that association is a
/// relative byte offset; resolving it in either direction is a post-pass of the
/// loader and builder.
#[derive(Clone, PartialEq, Debug)]
pub enum NodeKind {
    /// Root of a document (block). `DocumentEnd` closes it.
    Document {
        /// Whether the document is loaded asynchronously.
        load_async: bool,
        /// Maximum records per async chunk.
        max_async_records: u32,
        /// Whether the stream carries line-info debug records.
        debug_baml: bool,
    },
    /// An object element (block).
    Element {
        /// The element's type.
        type_id: IdRef,
        /// Instantiation flags.
        flags: ElementFlags,
    },
    /// A property set from a string value.
    Property {
        /// The property being set.
        attribute_id: IdRef,
        /// Its string value.
        value: String,
    },
    /// A property whose value was serialized by a custom binary serializer.
    PropertyCustom {
        /// The property being set.
        attribute_id: IdRef,
        /// Raw serializer type id, including the value-type flag bit (0x4000).
        /// Interpreting it requires the external type resolver, so it passes
        /// through unchanged.
        serializer_type_id: u16,
        /// The serializer's opaque payload.
        data: Vec<u8>,
    },
    /// A property whose value is a nested object (block).
    PropertyComplex {
        /// The property being set.
        attribute_id: IdRef,
    },
    /// A property holding an array of children (block).
    PropertyArray {
        /// The property being set.
        attribute_id: IdRef,
    },
    /// A property holding an `IList` of children (block).
    PropertyList {
        /// The property being set.
        attribute_id: IdRef,
    },
    /// A property holding an `IDictionary` of children (block).
    PropertyDictionary {
        /// The property being set.
        attribute_id: IdRef,
    },
    /// Literal XML content preserved inside an element.
    LiteralContent {
        /// The literal text.
        value: String,
        /// Reserved field, always round-tripped.
        reserved0: u32,
        /// Reserved field, always round-tripped.
        reserved1: u32,
    },
    /// Plain text content.
    Text {
        /// The text.
        value: String,
    },
    /// Text content converted through a type converter.
    TextWithConverter {
        /// The text.
        value: String,
        /// The converter's type.
        converter_type_id: IdRef,
    },
    /// Text content referenced by string id.
    TextWithId {
        /// The string holding the text (string pool).
        value_id: IdRef,
    },
    /// A routed event wired by name.
    RoutedEvent {
        /// The event's attribute.
        attribute_id: IdRef,
        /// Handler name.
        value: String,
    },
    /// An XML namespace declaration on an element.
    XmlnsProperty {
        /// Namespace prefix (may be empty for the default namespace).
        prefix: String,
        /// The XML namespace URI.
        xml_namespace: String,
        /// The assemblies that map into this namespace.
        assembly_ids: Vec<IdRef>,
    },
    /// A processing-instruction mapping from an XML namespace to a CLR namespace.
    PiMapping {
        /// The XML namespace URI.
        xml_namespace: String,
        /// The CLR namespace it maps to.
        clr_namespace: String,
        /// The assembly the CLR namespace lives in.
        assembly_id: IdRef,
    },
    /// Declaration of an assembly into the assembly pool.
    AssemblyInfo {
        /// Full reflection-style assembly name.
        full_name: String,
    },
    /// Declaration of a type into the type pool.
    TypeInfo {
        /// The assembly the type lives in.
        assembly_id: IdRef,
        /// Namespace-qualified type name.
        type_full_name: String,
    },
    /// Declaration of a type with an associated serializer into the type pool.
    TypeSerializerInfo {
        /// The assembly the type lives in.
        assembly_id: IdRef,
        /// Namespace-qualified type name.
        type_full_name: String,
        /// The serializer's type.
        serializer_type_id: IdRef,
    },
    /// Declaration of a property into the property pool.
    PropertyInfo {
        /// The type declaring the property.
        owner_type_id: IdRef,
        /// Attribute usage discriminator.
        usage: u8,
        /// The property's name.
        name: String,
    },
    /// Declaration of a string into the string pool.
    StringInfo {
        /// The string value.
        value: String,
    },
    /// A property referencing a pooled string.
    PropertyStringReference {
        /// The property being set.
        attribute_id: IdRef,
        /// The referenced string (string pool).
        string_id: IdRef,
    },
    /// A property referencing a type.
    PropertyTypeReference {
        /// The property being set.
        attribute_id: IdRef,
        /// The referenced type.
        type_id: IdRef,
    },
    /// A property set from a markup extension.
    PropertyWithExtension {
        /// The property being set.
        attribute_id: IdRef,
        /// Extension discriminator and namespace flags.
        flags: u16,
        /// Raw extension operand; its namespace depends on `flags` and is
        /// resolved by external collaborators, so it passes through unchanged.
        value_id: u16,
    },
    /// A property set from a string through a type converter.
    PropertyWithConverter {
        /// The property being set.
        attribute_id: IdRef,
        /// The string value.
        value: String,
        /// The converter's type.
        converter_type_id: IdRef,
    },
    /// A length-prefixed, lazily-loadable subtree, e.g. a resource dictionary
    /// body (block). Self-delimiting: no end tag on the wire; its byte length is
    /// backpatched on save.
    DeferableContent,
    /// A dictionary key given as a pooled string (key-bearing).
    DefAttributeKeyString {
        /// The string holding the key (string pool).
        value_id: IdRef,
        /// The node holding the dictionary value, once resolved.
        value: Option<NodeId>,
        /// Whether the keyed resource is shared.
        shared: bool,
        /// Whether `shared` was set explicitly.
        shared_set: bool,
    },
    /// A dictionary key given as a type (key-bearing).
    DefAttributeKeyType {
        /// The key type.
        type_id: IdRef,
        /// Instantiation flags.
        flags: ElementFlags,
        /// The node holding the dictionary value, once resolved.
        value: Option<NodeId>,
        /// Whether the keyed resource is shared.
        shared: bool,
        /// Whether `shared` was set explicitly.
        shared_set: bool,
    },
    /// An `x:` directive attribute.
    DefAttribute {
        /// The attribute's string value.
        value: String,
        /// The directive's name (string pool).
        name_id: IdRef,
    },
    /// A dictionary key built as an element subtree (block, key-bearing).
    KeyElement {
        /// The key element's type.
        type_id: IdRef,
        /// Instantiation flags.
        flags: ElementFlags,
        /// The node holding the dictionary value, once resolved.
        value: Option<NodeId>,
        /// Whether the keyed resource is shared.
        shared: bool,
        /// Whether `shared` was set explicitly.
        shared_set: bool,
    },
    /// Container for constructor arguments of a markup extension (block).
    ConstructorParameters,
    /// A constructor parameter given as a type.
    ConstructorParameterType {
        /// The parameter's type.
        type_id: IdRef,
    },
    /// An event-wiring connection id assigned by the markup compiler.
    ConnectionId {
        /// The connection id.
        id: u32,
    },
    /// Marks the content property of the enclosing element.
    ContentProperty {
        /// The content property.
        attribute_id: IdRef,
    },
    /// A named element registered with the namescope.
    NamedElement {
        /// The element's type.
        type_id: IdRef,
        /// The runtime name it registers under.
        runtime_name: String,
    },
    /// A static-resource reference subtree in a deferable key section (block).
    StaticResource {
        /// The extension's type.
        type_id: IdRef,
        /// Instantiation flags.
        flags: ElementFlags,
    },
    /// A back-reference to a static resource collected earlier.
    StaticResourceId {
        /// Index into the enclosing deferable content's static-resource list;
        /// not a pool reference, passes through unchanged.
        id: u16,
    },
    /// A pre-resolved static resource in a deferable key section.
    OptimizedStaticResource {
        /// Namespace discriminator for `value_id`.
        flags: u8,
        /// Raw operand; its namespace depends on `flags` and is resolved by
        /// external collaborators, so it passes through unchanged.
        value_id: u16,
    },
    /// A property set from a static resource by list index.
    PropertyWithStaticResourceId {
        /// The property being set.
        attribute_id: IdRef,
        /// Index into the enclosing deferable content's static-resource list.
        resource_id: u16,
    },
    /// A `PresentationOptions:` attribute.
    PresentationOptionsAttribute {
        /// The attribute's string value.
        value: String,
        /// The option's name (string pool).
        name_id: IdRef,
    },
    /// Debug line info: line and column of the originating markup.
    LineNumberAndPosition {
        /// 1-based source line.
        line_number: u32,
        /// 1-based source column.
        line_position: u32,
    },
    /// Debug line info: column only.
    LinePosition {
        /// 1-based source column.
        line_position: u32,
    },
}

impl NodeKind {
    /// Whether this kind owns a child list.
    #[must_use]
    pub fn is_block(&self) -> bool {
        matches!(
            self,
            NodeKind::Document { .. }
                | NodeKind::Element { .. }
                | NodeKind::PropertyComplex { .. }
                | NodeKind::PropertyArray { .. }
                | NodeKind::PropertyList { .. }
                | NodeKind::PropertyDictionary { .. }
                | NodeKind::DeferableContent
                | NodeKind::KeyElement { .. }
                | NodeKind::ConstructorParameters
                | NodeKind::StaticResource { .. }
        )
    }

    /// The wire tag that starts a record of this kind.
    #[must_use]
    pub fn record_type(&self) -> RecordType {
        match self {
            NodeKind::Document { .. } => RecordType::DocumentStart,
            NodeKind::Element { .. } => RecordType::ElementStart,
            NodeKind::Property { .. } => RecordType::Property,
            NodeKind::PropertyCustom { .. } => RecordType::PropertyCustom,
            NodeKind::PropertyComplex { .. } => RecordType::PropertyComplexStart,
            NodeKind::PropertyArray { .. } => RecordType::PropertyArrayStart,
            NodeKind::PropertyList { .. } => RecordType::PropertyListStart,
            NodeKind::PropertyDictionary { .. } => RecordType::PropertyDictionaryStart,
            NodeKind::LiteralContent { .. } => RecordType::LiteralContent,
            NodeKind::Text { .. } => RecordType::Text,
            NodeKind::TextWithConverter { .. } => RecordType::TextWithConverter,
            NodeKind::TextWithId { .. } => RecordType::TextWithId,
            NodeKind::RoutedEvent { .. } => RecordType::RoutedEvent,
            NodeKind::XmlnsProperty { .. } => RecordType::XmlnsProperty,
            NodeKind::PiMapping { .. } => RecordType::PiMapping,
            NodeKind::AssemblyInfo { .. } => RecordType::AssemblyInfo,
            NodeKind::TypeInfo { .. } => RecordType::TypeInfo,
            NodeKind::TypeSerializerInfo { .. } => RecordType::TypeSerializerInfo,
            NodeKind::PropertyInfo { .. } => RecordType::PropertyInfo,
            NodeKind::StringInfo { .. } => RecordType::StringInfo,
            NodeKind::PropertyStringReference { .. } => RecordType::PropertyStringReference,
            NodeKind::PropertyTypeReference { .. } => RecordType::PropertyTypeReference,
            NodeKind::PropertyWithExtension { .. } => RecordType::PropertyWithExtension,
            NodeKind::PropertyWithConverter { .. } => RecordType::PropertyWithConverter,
            NodeKind::DeferableContent => RecordType::DeferableContentStart,
            NodeKind::DefAttributeKeyString { .. } => RecordType::DefAttributeKeyString,
            NodeKind::DefAttributeKeyType { .. } => RecordType::DefAttributeKeyType,
            NodeKind::DefAttribute { .. } => RecordType::DefAttribute,
            NodeKind::KeyElement { .. } => RecordType::KeyElementStart,
            NodeKind::ConstructorParameters => RecordType::ConstructorParametersStart,
            NodeKind::ConstructorParameterType { .. } => RecordType::ConstructorParameterType,
            NodeKind::ConnectionId { .. } => RecordType::ConnectionId,
            NodeKind::ContentProperty { .. } => RecordType::ContentProperty,
            NodeKind::NamedElement { .. } => RecordType::NamedElement,
            NodeKind::StaticResource { .. } => RecordType::StaticResourceStart,
            NodeKind::StaticResourceId { .. } => RecordType::StaticResourceId,
            NodeKind::OptimizedStaticResource { .. } => RecordType::OptimizedStaticResource,
            NodeKind::PropertyWithStaticResourceId { .. } => {
                RecordType::PropertyWithStaticResourceId
            }
            NodeKind::PresentationOptionsAttribute { .. } => {
                RecordType::PresentationOptionsAttribute
            }
            NodeKind::LineNumberAndPosition { .. } => RecordType::LineNumberAndPosition,
            NodeKind::LinePosition { .. } => RecordType::LinePosition,
        }
    }

    /// The dictionary value association of a key-bearing kind, `None` for every
    /// other kind (and for unresolved keys).
    #[must_use]
    pub fn key_value(&self) -> Option<NodeId> {
        match self {
            NodeKind::DefAttributeKeyString { value, .. }
            | NodeKind::DefAttributeKeyType { value, .. }
            | NodeKind::KeyElement { value, .. } => *value,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_kinds_open_scopes() {
        let element = NodeKind::Element {
            type_id: IdRef::Known(42),
            flags: ElementFlags::empty(),
        };
        assert!(element.is_block());
        assert_eq!(
            element.record_type().end_tag(),
            Some(RecordType::ElementEnd)
        );

        let text = NodeKind::Text {
            value: "hi".into(),
        };
        assert!(!text.is_block());
        assert_eq!(text.record_type().end_tag(), None);
    }

    #[test]
    fn deferable_content_has_no_end_tag() {
        let defer = NodeKind::DeferableContent;
        assert!(defer.is_block());
        assert_eq!(defer.record_type().end_tag(), None);
    }

    #[test]
    fn element_flags_preserve_unknown_bits() {
        let flags = ElementFlags::from_bits_retain(0xF3);
        assert!(flags.contains(ElementFlags::CREATE_USING_TYPE_CONVERTER));
        assert_eq!(flags.bits(), 0xF3);
    }
}
