//! Reverses the legacy importer (spec.md §4.7): walks a fully linked and
//! type-checked [`Image`] and re-emits legacy-originated modules as a
//! [`wire::FileDescriptorSet`], undoing nested-type promotion and
//! `Presence<T>` synthesis bit for bit so existing legacy consumers see
//! the same shape they always did.

use crate::error::{DiagnosticCode, Reporter};
use crate::model::*;
use crate::span::Location;
use crate::wire;

fn legacy_scalar_type(uid: TypeUid) -> Option<wire::FieldProtoType> {
    use wire::FieldProtoType as T;
    Some(match uid {
        PRIMITIVE_BOOL_UID => T::Bool,
        PRIMITIVE_INT32_UID | PRIMITIVE_INT8_UID | PRIMITIVE_INT16_UID => T::Int32,
        PRIMITIVE_UINT32_UID | PRIMITIVE_UINT8_UID | PRIMITIVE_UINT16_UID => T::Uint32,
        PRIMITIVE_INT64_UID => T::Int64,
        PRIMITIVE_UINT64_UID => T::Uint64,
        PRIMITIVE_FLOAT32_UID => T::Float,
        PRIMITIVE_FLOAT64_UID => T::Double,
        PRIMITIVE_TEXT_UID => T::String,
        PRIMITIVE_DATA_UID => T::Bytes,
        _ => return None,
    })
}

struct Lowered {
    r#type: Option<wire::FieldProtoType>,
    type_name: Option<String>,
    /// `Some(inner)` when the source type was `Presence<inner>`; the
    /// caller emits a single-field synthetic oneof for it.
    presence_inner: Option<TypeSpecifier>,
}

fn lower_field_type(ty: &TypeSpecifier, image: &Image, loc: &Location, reporter: &Reporter) -> Lowered {
    let TypeSpecifier::Resolved { module, ty: uid, arguments } = ty else {
        reporter.report(
            DiagnosticCode::InternalInvariantViolation,
            loc.clone(),
            "unresolved type reached back-translation",
        );
        return Lowered { r#type: None, type_name: None, presence_inner: None };
    };

    if *module == BUILTIN_MODULE_UID && *uid == VIRTUAL_PRESENCE_UID {
        return Lowered {
            r#type: None,
            type_name: None,
            presence_inner: arguments.first().cloned(),
        };
    }

    if *module == BUILTIN_MODULE_UID {
        if let Some(scalar) = legacy_scalar_type(*uid) {
            return Lowered { r#type: Some(scalar), type_name: None, presence_inner: None };
        }
    }

    let kind = image.type_kind(*module, *uid);
    let name = image
        .module(*module)
        .and_then(|m| m.structs.iter().find(|s| s.uid == *uid).map(|s| s.name.clone()))
        .or_else(|| image.module(*module).and_then(|m| m.enums.iter().find(|e| e.uid == *uid).map(|e| e.name.clone())));

    let wire_type = match kind {
        Some(TypeKind::Struct) => Some(wire::FieldProtoType::Message),
        Some(TypeKind::Enum) => Some(wire::FieldProtoType::Enum),
        _ => {
            reporter.report(
                DiagnosticCode::UnsupportedValue,
                loc.clone(),
                "this type has no legacy-dialect representation",
            );
            None
        }
    };

    Lowered {
        r#type: wire_type,
        type_name: name.map(|n| format!(".{n}")),
        presence_inner: None,
    }
}

fn build_descriptor_proto(
    s: &Struct,
    image: &Image,
    reporter: &Reporter,
) -> wire::DescriptorProto {
    let mut fields = Vec::new();
    let mut oneof_decl = Vec::new();

    for (union_idx, union) in s.unions.iter().enumerate() {
        oneof_decl.push(wire::OneofDescriptorProto {
            name: union.name.clone().or_else(|| Some(format!("union_{union_idx}"))),
        });
    }

    for field in &s.fields {
        let lowered = lower_field_type(&field.ty, image, &s.location, reporter);

        if let Some(inner) = &lowered.presence_inner {
            let inner_lowered = lower_field_type(inner, image, &s.location, reporter);
            let oneof_idx = oneof_decl.len() as i32;
            oneof_decl.push(wire::OneofDescriptorProto { name: Some(format!("_{}", field.name)) });
            fields.push(wire::FieldDescriptorProto {
                name: Some(field.name.clone()),
                number: Some(field.uid as i32),
                label: Some(wire::FieldProtoLabel::Optional as i32),
                r#type: inner_lowered.r#type.map(|t| t as i32),
                type_name: inner_lowered.type_name,
                oneof_index: Some(oneof_idx),
            });
            continue;
        }

        fields.push(wire::FieldDescriptorProto {
            name: Some(field.name.clone()),
            number: Some(field.uid as i32),
            label: Some(wire::FieldProtoLabel::Optional as i32),
            r#type: lowered.r#type.map(|t| t as i32),
            type_name: lowered.type_name,
            oneof_index: field.union_index.map(|i| i as i32),
        });
    }

    wire::DescriptorProto {
        name: Some(
            s.nested_info
                .as_ref()
                .map(|n| n.original_name.clone())
                .unwrap_or_else(|| s.name.clone()),
        ),
        field: fields,
        nested_type: Vec::new(),
        enum_type: Vec::new(),
        oneof_decl,
    }
}

fn build_enum_proto(e: &Enum) -> wire::EnumDescriptorProto {
    wire::EnumDescriptorProto {
        name: Some(
            e.nested_info
                .as_ref()
                .map(|n| n.original_name.clone())
                .unwrap_or_else(|| e.name.clone()),
        ),
        value: e
            .enumerants
            .iter()
            .map(|v| wire::EnumValueDescriptorProto {
                name: Some(v.name.clone()),
                number: Some(v.uid as i32),
            })
            .collect(),
    }
}

/// Re-nests a flat, promoted list of structs/enums back under their
/// original enclosing type, deepest levels first.
fn renest(
    structs: &[Struct],
    enums: &[Enum],
    image: &Image,
    reporter: &Reporter,
) -> (Vec<wire::DescriptorProto>, Vec<wire::EnumDescriptorProto>) {
    let mut built: std::collections::HashMap<String, wire::DescriptorProto> = structs
        .iter()
        .map(|s| (s.name.clone(), build_descriptor_proto(s, image, reporter)))
        .collect();
    let built_enums: std::collections::HashMap<String, wire::EnumDescriptorProto> =
        enums.iter().map(|e| (e.name.clone(), build_enum_proto(e))).collect();

    let mut max_depth = 0u32;
    for s in structs {
        if let Some(info) = &s.nested_info {
            max_depth = max_depth.max(info.depth);
        }
    }
    for e in enums {
        if let Some(info) = &e.nested_info {
            max_depth = max_depth.max(info.depth);
        }
    }

    // Attach deepest-first so each level's `nested_type`/`enum_type`
    // list is complete before its own enclosing type absorbs it.
    for depth in (1..=max_depth).rev() {
        for s in structs.iter().filter(|s| s.nested_info.as_ref().map(|i| i.depth) == Some(depth)) {
            let info = s.nested_info.as_ref().unwrap();
            if let Some(child) = built.get(&s.name).cloned() {
                if let Some(parent) = built.get_mut(&info.enclosing_type) {
                    parent.nested_type.push(child);
                }
            }
        }
        for e in enums.iter().filter(|e| e.nested_info.as_ref().map(|i| i.depth) == Some(depth)) {
            let info = e.nested_info.as_ref().unwrap();
            if let Some(child) = built_enums.get(&e.name).cloned() {
                if let Some(parent) = built.get_mut(&info.enclosing_type) {
                    parent.enum_type.push(child);
                }
            }
        }
    }

    let top_structs = structs
        .iter()
        .filter(|s| s.nested_info.is_none())
        .filter_map(|s| built.get(&s.name).cloned())
        .collect();
    let top_enums = enums
        .iter()
        .filter(|e| e.nested_info.is_none())
        .filter_map(|e| built_enums.get(&e.name).cloned())
        .collect();
    (top_structs, top_enums)
}

fn method_legacy_name(ty: &TypeSpecifier, image: &Image) -> String {
    if let TypeSpecifier::Resolved { module, ty: uid, .. } = ty {
        if let Some(m) = image.module(*module) {
            if let Some(s) = m.structs.iter().find(|s| s.uid == *uid) {
                return format!(".{}", s.name);
            }
        }
    }
    String::new()
}

pub fn backtranslate(image: &Image, reporter: &Reporter) -> wire::FileDescriptorSet {
    let mut set = wire::FileDescriptorSet::default();
    for module in image.modules.values() {
        let (message_type, enum_type) = renest(&module.structs, &module.enums, image, reporter);
        let service = module
            .apis
            .iter()
            .map(|api| wire::ServiceDescriptorProto {
                name: Some(api.name.clone()),
                method: api
                    .methods
                    .iter()
                    .map(|m| wire::MethodDescriptorProto {
                        name: Some(m.name.clone()),
                        input_type: Some(method_legacy_name(&m.input, image)),
                        output_type: Some(method_legacy_name(&m.output, image)),
                    })
                    .collect(),
            })
            .collect();

        set.file.push(wire::FileDescriptorProto {
            name: Some(module.uri.trim_start_matches('/').to_string()),
            package: module.legacy_package.clone(),
            dependency: module.imports.iter().map(|i| i.path.clone()).collect(),
            message_type,
            enum_type,
            service,
            syntax: Some("proto3".to_string()),
        });
    }
    set
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::legacy::convert_legacy_file;
    use crate::wire;

    #[test]
    fn promoted_nested_message_round_trips_back_under_its_parent() {
        let fd = wire::FileDescriptorProto {
            name: Some("x.proto".into()),
            package: Some("pkg".into()),
            dependency: vec![],
            message_type: vec![wire::DescriptorProto {
                name: Some("Outer".into()),
                field: vec![],
                nested_type: vec![wire::DescriptorProto {
                    name: Some("Inner".into()),
                    field: vec![],
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
        };
        let reporter = Reporter::new();
        let module = convert_legacy_file(&fd, "x.proto", &reporter);
        let mut image = Image::new();
        image.modules.insert(module.uid, module);

        let set = backtranslate(&image, &reporter);
        assert_eq!(set.file.len(), 1);
        let outer = &set.file[0].message_type[0];
        assert_eq!(outer.name.as_deref(), Some("Outer"));
        assert_eq!(outer.nested_type[0].name.as_deref(), Some("Inner"));
    }
}
