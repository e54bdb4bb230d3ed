//! Integration tests for the round-trip/idempotence properties of
//! spec.md §8: a legacy file promoted to the flat native model and then
//! back-translated yields the same nesting and field numbers it started
//! with, and compiling twice from the same source yields identical
//! descriptors (determinism).

use idlc::backtranslate::backtranslate;
use idlc::convert::legacy::convert_legacy_file;
use idlc::convert::native::convert_module;
use idlc::error::Reporter;
use idlc::linker::link;
use idlc::model::Image;
use idlc::parser::parse_source;
use idlc::typecheck::check;
use idlc::wire;

fn sample_legacy_file() -> wire::FileDescriptorProto {
    wire::FileDescriptorProto {
        name: Some("widgets.proto".into()),
        package: Some("acme.widgets".into()),
        dependency: vec![],
        message_type: vec![wire::DescriptorProto {
            name: Some("Widget".into()),
            field: vec![
                wire::FieldDescriptorProto {
                    name: Some("id".into()),
                    number: Some(1),
                    label: Some(wire::FieldProtoLabel::Optional as i32),
                    r#type: Some(wire::FieldProtoType::Int64 as i32),
                    type_name: None,
                    oneof_index: None,
                },
                wire::FieldDescriptorProto {
                    name: Some("label".into()),
                    number: Some(2),
                    label: Some(wire::FieldProtoLabel::Optional as i32),
                    r#type: Some(wire::FieldProtoType::String as i32),
                    type_name: None,
                    oneof_index: None,
                },
            ],
            nested_type: vec![wire::DescriptorProto {
                name: Some("Metadata".into()),
                field: vec![wire::FieldDescriptorProto {
                    name: Some("tag".into()),
                    number: Some(1),
                    label: Some(wire::FieldProtoLabel::Optional as i32),
                    r#type: Some(wire::FieldProtoType::String as i32),
                    type_name: None,
                    oneof_index: None,
                }],
                nested_type: vec![],
                enum_type: vec![],
                oneof_decl: vec![],
            }],
            enum_type: vec![],
            oneof_decl: vec![],
        }],
        enum_type: vec![],
        service: vec![],
        syntax: Some("proto3".into()),
    }
}

#[test]
fn legacy_nested_message_survives_promotion_and_backtranslation() {
    let reporter = Reporter::new();
    let original = sample_legacy_file();
    let module = convert_legacy_file(&original, "widgets.proto", &reporter);
    assert!(reporter.is_empty());

    // Promotion flattens Widget.Metadata into a top-level "Widget_Metadata".
    assert_eq!(module.structs.len(), 2);
    assert!(module.structs.iter().any(|s| s.name == "Widget_Metadata"));

    let mut image = Image::new();
    image.modules.insert(module.uid, module);
    link(&mut image, &reporter);
    assert!(reporter.is_empty());

    let set = backtranslate(&image, &reporter);
    assert!(reporter.is_empty());
    assert_eq!(set.file.len(), 1);

    let rebuilt = &set.file[0];
    assert_eq!(rebuilt.package.as_deref(), Some("acme.widgets"));
    let widget = rebuilt
        .message_type
        .iter()
        .find(|m| m.name.as_deref() == Some("Widget"))
        .expect("Widget is promoted back to top level");
    assert_eq!(widget.field.len(), 2);
    let field_numbers: Vec<i32> = widget.field.iter().filter_map(|f| f.number).collect();
    assert_eq!(field_numbers, vec![1, 2]);

    let metadata = widget
        .nested_type
        .iter()
        .find(|m| m.name.as_deref() == Some("Metadata"))
        .expect("Metadata is re-nested under Widget, not left top level");
    assert_eq!(metadata.field[0].name.as_deref(), Some("tag"));
}

#[test]
fn compiling_the_same_native_source_twice_yields_identical_descriptors() {
    let source = "syntax = \"mglot0\"\nmodule = @7\nstruct Point { X :Int32 @0; Y :Int32 @1 } @1";

    let compile_once = || {
        let reporter = Reporter::new();
        let ast = parse_source(source, "geom.mgdl", &reporter);
        let module = convert_module(&ast, "geom.mgdl", &reporter);
        let mut image = Image::new();
        image.modules.insert(module.uid, module);
        link(&mut image, &reporter);
        check(&image, &reporter);
        assert!(reporter.is_empty());
        backtranslate(&image, &reporter)
    };

    let first = compile_once();
    let second = compile_once();
    assert_eq!(first, second);
}

#[test]
fn native_struct_compiles_cleanly_end_to_end() {
    let reporter = Reporter::new();
    let source = "syntax = \"mglot0\"\nmodule = @1\nenum Color { Red @1 Green @2 Blue @3 } @1\nstruct Shape { Name :Text @0; Fill :Color @1 } @2";
    let ast = parse_source(source, "shapes.mgdl", &reporter);
    let module = convert_module(&ast, "shapes.mgdl", &reporter);
    let mut image = Image::new();
    image.modules.insert(module.uid, module);
    link(&mut image, &reporter);
    check(&image, &reporter);
    assert!(reporter.is_empty(), "{:?}", reporter.sorted());

    let fill_field = &image.modules[&1]
        .structs
        .iter()
        .find(|s| s.name == "Shape")
        .unwrap()
        .fields[1];
    match &fill_field.ty {
        idlc::model::TypeSpecifier::Resolved { module, .. } => assert_eq!(*module, 1),
        other => panic!("expected a resolved reference, got {other:?}"),
    }
}
