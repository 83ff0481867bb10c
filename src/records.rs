//! Wire-level record tags and the record-layout contract shared by the loader and
//! builder.
//!
//! Every unit in a BAML stream is a record: one tag byte, then either a fixed field
//! layout or a 7-bit-encoded total size followed by the payload. This module defines
//! the closed set of tags ([`RecordType`]), which tags open and close scopes, which
//! are forbidden in compiled BAML, and which carry the variable-size envelope. The
//! loader and builder both dispatch on this enum, so the compiler guarantees every
//! tag is handled on both sides of the codec.

use strum::{EnumCount, EnumIter, FromRepr};

/// The tag byte of a BAML record.
///
/// This is a closed enum: the numeric values are fixed by the BAML format and the
/// set never grows at runtime. Six of the tags (`ClrEvent`, `XmlAttribute`,
/// `ProcessingInstruction`, `Comment`, `DefTag`, `EndAttributes`) belong to the
/// uncompiled/debug BAML variant and are rejected by this codec.
///
/// Scoped records come in Start/End pairs ([`RecordType::end_tag`]);
/// `DeferableContentStart` is the exception, bounded by a declared byte length
/// instead of an end tag.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, FromRepr, EnumIter, EnumCount)]
#[repr(u8)]
#[allow(missing_docs)] // the variants are the wire tags; the type doc covers them
pub enum RecordType {
    DocumentStart = 0x01,
    DocumentEnd = 0x02,
    ElementStart = 0x03,
    ElementEnd = 0x04,
    Property = 0x05,
    PropertyCustom = 0x06,
    PropertyComplexStart = 0x07,
    PropertyComplexEnd = 0x08,
    PropertyArrayStart = 0x09,
    PropertyArrayEnd = 0x0A,
    PropertyListStart = 0x0B,
    PropertyListEnd = 0x0C,
    PropertyDictionaryStart = 0x0D,
    PropertyDictionaryEnd = 0x0E,
    LiteralContent = 0x0F,
    Text = 0x10,
    TextWithConverter = 0x11,
    RoutedEvent = 0x12,
    ClrEvent = 0x13,
    XmlnsProperty = 0x14,
    XmlAttribute = 0x15,
    ProcessingInstruction = 0x16,
    Comment = 0x17,
    DefTag = 0x18,
    DefAttribute = 0x19,
    EndAttributes = 0x1A,
    PiMapping = 0x1B,
    AssemblyInfo = 0x1C,
    TypeInfo = 0x1D,
    TypeSerializerInfo = 0x1E,
    PropertyInfo = 0x1F,
    StringInfo = 0x20,
    PropertyStringReference = 0x21,
    PropertyTypeReference = 0x22,
    PropertyWithExtension = 0x23,
    PropertyWithConverter = 0x24,
    DeferableContentStart = 0x25,
    DefAttributeKeyString = 0x26,
    DefAttributeKeyType = 0x27,
    KeyElementStart = 0x28,
    KeyElementEnd = 0x29,
    ConstructorParametersStart = 0x2A,
    ConstructorParametersEnd = 0x2B,
    ConstructorParameterType = 0x2C,
    ConnectionId = 0x2D,
    ContentProperty = 0x2E,
    NamedElement = 0x2F,
    StaticResourceStart = 0x30,
    StaticResourceEnd = 0x31,
    StaticResourceId = 0x32,
    TextWithId = 0x33,
    PresentationOptionsAttribute = 0x34,
    LineNumberAndPosition = 0x35,
    LinePosition = 0x36,
    OptimizedStaticResource = 0x37,
    PropertyWithStaticResourceId = 0x38,
}

impl RecordType {
    /// Decode a tag byte into a record type, `None` for tags outside the closed set.
    #[must_use]
    pub fn from_tag(tag: u8) -> Option<RecordType> {
        RecordType::from_repr(tag)
    }

    /// The wire value of this tag.
    #[must_use]
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Records that only occur in the uncompiled/debug BAML variant. Encountering
    /// one of these in a compiled stream is a fatal format error.
    #[must_use]
    pub fn is_forbidden(self) -> bool {
        matches!(
            self,
            RecordType::ClrEvent
                | RecordType::XmlAttribute
                | RecordType::ProcessingInstruction
                | RecordType::Comment
                | RecordType::DefTag
                | RecordType::EndAttributes
        )
    }

    /// For a Start tag that opens a tag-bounded scope, the End tag that closes it.
    ///
    /// `DeferableContentStart` returns `None`: its scope is bounded by a declared
    /// byte length and terminates without an explicit end record.
    #[must_use]
    pub fn end_tag(self) -> Option<RecordType> {
        match self {
            RecordType::DocumentStart => Some(RecordType::DocumentEnd),
            RecordType::ElementStart => Some(RecordType::ElementEnd),
            RecordType::PropertyComplexStart => Some(RecordType::PropertyComplexEnd),
            RecordType::PropertyArrayStart => Some(RecordType::PropertyArrayEnd),
            RecordType::PropertyListStart => Some(RecordType::PropertyListEnd),
            RecordType::PropertyDictionaryStart => Some(RecordType::PropertyDictionaryEnd),
            RecordType::KeyElementStart => Some(RecordType::KeyElementEnd),
            RecordType::ConstructorParametersStart => Some(RecordType::ConstructorParametersEnd),
            RecordType::StaticResourceStart => Some(RecordType::StaticResourceEnd),
            _ => None,
        }
    }

    /// Whether this tag closes a tag-bounded scope.
    #[must_use]
    pub fn is_end_tag(self) -> bool {
        matches!(
            self,
            RecordType::DocumentEnd
                | RecordType::ElementEnd
                | RecordType::PropertyComplexEnd
                | RecordType::PropertyArrayEnd
                | RecordType::PropertyListEnd
                | RecordType::PropertyDictionaryEnd
                | RecordType::KeyElementEnd
                | RecordType::ConstructorParametersEnd
                | RecordType::StaticResourceEnd
        )
    }

    /// Whether this record carries the variable-size envelope: a 7-bit-encoded
    /// total size (covering the size prefix itself plus the payload) between the
    /// tag and the payload.
    #[must_use]
    pub fn has_size_prefix(self) -> bool {
        matches!(
            self,
            RecordType::Property
                | RecordType::PropertyCustom
                | RecordType::PropertyWithConverter
                | RecordType::LiteralContent
                | RecordType::Text
                | RecordType::TextWithConverter
                | RecordType::TextWithId
                | RecordType::RoutedEvent
                | RecordType::XmlnsProperty
                | RecordType::PiMapping
                | RecordType::DefAttribute
                | RecordType::AssemblyInfo
                | RecordType::TypeInfo
                | RecordType::TypeSerializerInfo
                | RecordType::PropertyInfo
                | RecordType::StringInfo
                | RecordType::DefAttributeKeyString
                | RecordType::NamedElement
                | RecordType::PresentationOptionsAttribute
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn tag_round_trip() {
        for rt in RecordType::iter() {
            assert_eq!(RecordType::from_tag(rt.tag()), Some(rt));
        }
    }

    #[test]
    fn unknown_tags_rejected() {
        assert_eq!(RecordType::from_tag(0x00), None);
        assert_eq!(RecordType::from_tag(0x39), None);
        assert_eq!(RecordType::from_tag(0xFF), None);
    }

    #[test]
    fn end_tags_pair_with_starts() {
        for rt in RecordType::iter() {
            if let Some(end) = rt.end_tag() {
                assert!(end.is_end_tag(), "{:?} must map to an end tag", rt);
                // Every Start/End pair is adjacent on the wire.
                assert_eq!(end.tag(), rt.tag() + 1);
            }
        }
    }

    #[test]
    fn end_tags_never_open_scopes() {
        for rt in RecordType::iter() {
            if rt.is_end_tag() {
                assert_eq!(rt.end_tag(), None);
                assert!(!rt.has_size_prefix());
            }
        }
    }

    #[test]
    fn forbidden_set_is_exact() {
        let forbidden: Vec<RecordType> =
            RecordType::iter().filter(|rt| rt.is_forbidden()).collect();
        assert_eq!(
            forbidden,
            vec![
                RecordType::ClrEvent,
                RecordType::XmlAttribute,
                RecordType::ProcessingInstruction,
                RecordType::Comment,
                RecordType::DefTag,
                RecordType::EndAttributes,
            ]
        );
    }
}
