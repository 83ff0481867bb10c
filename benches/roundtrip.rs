//! Benchmarks for stream decoding and encoding.
//!
//! Measures the full load and save paths over synthetic documents:
//! - A minimal document (header fixture cost)
//! - A wide document with many sibling records
//! - A resource dictionary with deferred content and key patching

extern crate bamlscope;

use bamlscope::{ElementFlags, IdRef, Image, NodeKind};
use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;

/// A flat document with `count` text properties under one element.
fn wide_document(count: usize) -> Image {
    let mut image = Image::new();
    let tree = image.tree_mut();
    let doc = tree.alloc(NodeKind::Document {
        load_async: false,
        max_async_records: 0,
        debug_baml: false,
    });
    let elem = tree.alloc(NodeKind::Element {
        type_id: IdRef::Known(42),
        flags: ElementFlags::empty(),
    });
    tree.add(doc, elem);
    for i in 0..count {
        let prop = tree.alloc(NodeKind::Property {
            attribute_id: IdRef::Known(1),
            value: format!("value number {i}"),
        });
        tree.add(elem, prop);
    }
    tree.set_closed(doc, true);
    tree.set_closed(elem, true);
    image.set_root(Some(doc));
    image
}

/// A resource dictionary: one deferred block with `count` keyed elements.
fn dictionary_document(count: usize) -> Image {
    let mut image = Image::new();
    let tree = image.tree_mut();
    let doc = tree.alloc(NodeKind::Document {
        load_async: false,
        max_async_records: 0,
        debug_baml: false,
    });
    let dict = tree.alloc(NodeKind::PropertyDictionary {
        attribute_id: IdRef::Known(2),
    });
    let defer = tree.alloc(NodeKind::DeferableContent);
    tree.add(doc, dict);
    tree.add(dict, defer);

    let mut keys = Vec::with_capacity(count);
    for _ in 0..count {
        keys.push(tree.alloc(NodeKind::DefAttributeKeyType {
            type_id: IdRef::Known(42),
            flags: ElementFlags::empty(),
            value: None,
            shared: false,
            shared_set: false,
        }));
    }
    for &key in &keys {
        tree.add(defer, key);
    }
    for &key in &keys {
        let value = tree.alloc(NodeKind::Element {
            type_id: IdRef::Known(42),
            flags: ElementFlags::empty(),
        });
        tree.add(defer, value);
        tree.set_closed(value, true);
        if let NodeKind::DefAttributeKeyType { value: slot, .. } = tree.kind_mut(key) {
            *slot = Some(value);
        }
    }

    tree.set_closed(doc, true);
    tree.set_closed(dict, true);
    tree.set_closed(defer, true);
    image.set_root(Some(doc));
    image
}

fn bench_load_minimal(c: &mut Criterion) {
    let bytes = wide_document(0).to_vec().unwrap();
    c.bench_function("load_minimal", |b| {
        b.iter(|| {
            let image = Image::from_mem(black_box(&bytes)).unwrap();
            black_box(image)
        });
    });
}

fn bench_load_wide(c: &mut Criterion) {
    let bytes = wide_document(1000).to_vec().unwrap();
    c.bench_function("load_wide_1000", |b| {
        b.iter(|| {
            let image = Image::from_mem(black_box(&bytes)).unwrap();
            black_box(image)
        });
    });
}

fn bench_save_wide(c: &mut Criterion) {
    let image = wide_document(1000);
    c.bench_function("save_wide_1000", |b| {
        b.iter(|| {
            let bytes = black_box(&image).to_vec().unwrap();
            black_box(bytes)
        });
    });
}

fn bench_roundtrip_dictionary(c: &mut Criterion) {
    let bytes = dictionary_document(200).to_vec().unwrap();
    c.bench_function("roundtrip_dictionary_200", |b| {
        b.iter(|| {
            let image = Image::from_mem(black_box(&bytes)).unwrap();
            let out = image.to_vec().unwrap();
            black_box(out)
        });
    });
}

criterion_group!(
    benches,
    bench_load_minimal,
    bench_load_wide,
    bench_save_wide,
    bench_roundtrip_dictionary
);
criterion_main!(benches);
