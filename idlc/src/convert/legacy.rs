//! Legacy-dialect (protobuf2/3) importer (spec.md §4.4): parses with the
//! third-party `protobuf-parse` crate, then re-decodes the result
//! through our own hand-authored [`crate::wire`] structs (both are the
//! same protobuf wire bytes, so this sidesteps depending on
//! `protobuf-parse`'s exact generated-struct field names) before
//! promoting nested types to the flat module shape spec.md §3 requires.

use crate::error::{DiagnosticCode, Reporter};
use crate::model::*;
use crate::span::{Location, Span};
use crate::wire;
use prost::Message as _;
use sha2::{Digest, Sha256};
use std::path::Path;

/// `SHA-256(package || name)`, first 8 bytes read little-endian, giving
/// a stable module UID derived purely from legacy identity (spec.md
/// §4.4 open question: legacy files carry no native `@uid`).
pub fn legacy_module_uid(package: &str, name: &str) -> ModuleUid {
    let mut hasher = Sha256::new();
    hasher.update(package.as_bytes());
    hasher.update(name.as_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    let uid = u64::from_le_bytes(bytes);
    if uid == INCOMPLETE_UID { uid - 1 } else { uid }
}

/// Parses a `.proto` file (protobuf2 or protobuf3 syntax) on disk and
/// returns the decoded [`wire::FileDescriptorSet`] for it and everything
/// it depends on.
pub fn parse_legacy_file(
    path: &Path,
    include_dirs: &[std::path::PathBuf],
) -> Result<wire::FileDescriptorSet, crate::error::IdlcError> {
    use protobuf::Message as ProtobufMessage;

    let mut parser = protobuf_parse::Parser::new();
    parser.pure();
    for dir in include_dirs {
        parser.include(dir);
    }
    parser.input(path);
    let parsed = parser
        .parse_and_typecheck()
        .map_err(|e| crate::error::IdlcError::Other(anyhow::anyhow!(e)))?;

    let mut file = wire::FileDescriptorSet::default();
    for fd in parsed.file_descriptors {
        let bytes = fd
            .write_to_bytes()
            .map_err(|e| crate::error::IdlcError::Other(anyhow::anyhow!(e)))?;
        let decoded = wire::FileDescriptorProto::decode(bytes.as_slice())
            .map_err(|e| crate::error::IdlcError::Other(anyhow::anyhow!(e)))?;
        file.file.push(decoded);
    }
    Ok(file)
}

fn scalar_type_name(ty: i32) -> Option<&'static str> {
    use wire::FieldProtoType as T;
    Some(match T::try_from(ty).ok()? {
        T::Double => "Float64",
        T::Float => "Float32",
        T::Int64 => "Int64",
        T::Uint64 => "UInt64",
        T::Int32 => "Int32",
        T::Fixed64 => "UInt64",
        T::Fixed32 => "UInt32",
        T::Bool => "Bool",
        T::String => "Text",
        T::Bytes => "Data",
        T::Uint32 => "UInt32",
        T::Message | T::Enum => return None,
    })
}

/// A single-field synthetic oneof is how protobuf3 represents `optional
/// scalar`; every other oneof is a genuine union (spec.md §4.4).
fn is_synthetic_oneof(oneof_name: &str, fields_in_oneof: usize) -> bool {
    fields_in_oneof == 1 && oneof_name.starts_with('_')
}

struct Flattener<'a> {
    uri: String,
    package: &'a str,
    structs: Vec<Struct>,
    enums: Vec<Enum>,
    next_synthetic_uid: TypeUid,
}

impl<'a> Flattener<'a> {
    fn fresh_uid(&mut self) -> TypeUid {
        let uid = self.next_synthetic_uid;
        self.next_synthetic_uid += 1;
        uid
    }

    fn loc(&self) -> Location {
        Location::new(self.uri.clone(), Span::file_start())
    }

    fn field_type(&mut self, field: &wire::FieldDescriptorProto) -> TypeSpecifier {
        if let Some(prim) = field.r#type.and_then(scalar_type_name) {
            return TypeSpecifier::Forward {
                qualifier: None,
                name: prim.to_string(),
                arguments: Vec::new(),
            };
        }
        let name = field
            .type_name
            .clone()
            .unwrap_or_default()
            .trim_start_matches('.')
            .replace('.', "_");
        TypeSpecifier::Forward { qualifier: None, name, arguments: Vec::new() }
    }

    /// Flattens one message, recursing into its nested types first so
    /// they're promoted before their enclosing type's fields reference
    /// them by their new flat name.
    fn flatten_message(
        &mut self,
        msg: &wire::DescriptorProto,
        enclosing: Option<&str>,
        depth: u32,
        reporter: &Reporter,
    ) -> String {
        let raw_name = msg.name.clone().unwrap_or_default();
        let flat_name = match enclosing {
            Some(parent) => format!("{parent}_{raw_name}"),
            None => raw_name.clone(),
        };

        for nested in &msg.nested_type {
            self.flatten_message(nested, Some(&flat_name), depth + 1, reporter);
        }
        for nested_enum in &msg.enum_type {
            self.flatten_enum(nested_enum, Some(&flat_name), depth + 1);
        }

        let oneof_field_counts: Vec<usize> = msg
            .oneof_decl
            .iter()
            .enumerate()
            .map(|(idx, _)| {
                msg.field
                    .iter()
                    .filter(|f| f.oneof_index == Some(idx as i32))
                    .count()
            })
            .collect();

        let mut fields = Vec::new();
        let mut unions = Vec::new();
        let mut union_field_uids: Vec<Vec<AttributeUid>> = vec![Vec::new(); msg.oneof_decl.len()];

        for field in &msg.field {
            let uid = field.number.unwrap_or(0) as u64;
            let mut ty = self.field_type(field);
            let mut union_index = None;

            if let Some(oneof_idx) = field.oneof_index {
                let oneof_idx = oneof_idx as usize;
                let oneof_name = msg
                    .oneof_decl
                    .get(oneof_idx)
                    .and_then(|o| o.name.as_deref())
                    .unwrap_or("");
                if is_synthetic_oneof(oneof_name, oneof_field_counts[oneof_idx]) {
                    ty = TypeSpecifier::Forward {
                        qualifier: None,
                        name: "Presence".to_string(),
                        arguments: vec![ty],
                    };
                } else {
                    union_index = Some(oneof_idx);
                    union_field_uids[oneof_idx].push(uid);
                }
            }

            fields.push(Field {
                uid,
                name: field.name.clone().unwrap_or_default(),
                ty,
                default: None,
                annotations: Vec::new(),
                union_index,
                location: self.loc(),
            });
        }

        for (idx, decl) in msg.oneof_decl.iter().enumerate() {
            if union_field_uids[idx].is_empty() {
                continue;
            }
            unions.push(Union {
                name: decl.name.clone(),
                field_uids: union_field_uids[idx].clone(),
            });
        }

        let uid = self.fresh_uid();
        self.structs.push(Struct {
            uid,
            name: flat_name.clone(),
            fields,
            unions,
            annotations: vec![package_annotation(self.package)],
            nested_info: enclosing.map(|parent| NestedTypeInfo {
                original_name: raw_name,
                enclosing_type: parent.to_string(),
                depth,
            }),
            location: self.loc(),
        });
        flat_name
    }

    fn flatten_enum(&mut self, e: &wire::EnumDescriptorProto, enclosing: Option<&str>, depth: u32) -> String {
        let raw_name = e.name.clone().unwrap_or_default();
        let flat_name = match enclosing {
            Some(parent) => format!("{parent}_{raw_name}"),
            None => raw_name.clone(),
        };
        let enumerants = e
            .value
            .iter()
            .map(|v| Enumerant {
                uid: v.number.unwrap_or(0) as u64,
                name: v.name.clone().unwrap_or_default(),
                annotations: Vec::new(),
            })
            .collect();
        let uid = self.fresh_uid();
        self.enums.push(Enum {
            uid,
            name: flat_name.clone(),
            enumerants,
            annotations: vec![package_annotation(self.package)],
            nested_info: enclosing.map(|parent| NestedTypeInfo {
                original_name: raw_name,
                enclosing_type: parent.to_string(),
                depth,
            }),
            location: self.loc(),
        });
        flat_name
    }
}

fn package_annotation(package: &str) -> Annotation {
    Annotation {
        attribute: AttributeReference::Forward {
            qualifier: Some("Protobuf".to_string()),
            name: "Package".to_string(),
        },
        value: Some(Value::Text(package.to_string())),
        location: Location::new(String::new(), Span::file_start()),
    }
}

/// Converts one parsed legacy file into a [`Module`], promoting every
/// nested message/enum to the top level (spec.md §4.4).
pub fn convert_legacy_file(fd: &wire::FileDescriptorProto, uri: &str, reporter: &Reporter) -> Module {
    let package = fd.package.clone().unwrap_or_default();
    let name = fd.name.clone().unwrap_or_else(|| uri.to_string());
    let module_uid = legacy_module_uid(&package, &name);

    let mut flattener = Flattener {
        uri: uri.to_string(),
        package: &package,
        structs: Vec::new(),
        enums: Vec::new(),
        next_synthetic_uid: 1,
    };

    for msg in &fd.message_type {
        flattener.flatten_message(msg, None, 0, reporter);
    }
    for e in &fd.enum_type {
        flattener.flatten_enum(e, None, 0);
    }

    let apis = fd
        .service
        .iter()
        .map(|svc| {
            let methods = svc
                .method
                .iter()
                .enumerate()
                .map(|(idx, m)| ApiMethod {
                    uid: idx as u64,
                    name: m.name.clone().unwrap_or_default(),
                    input: TypeSpecifier::Forward {
                        qualifier: None,
                        name: m.input_type.clone().unwrap_or_default().trim_start_matches('.').replace('.', "_"),
                        arguments: Vec::new(),
                    },
                    output: TypeSpecifier::Forward {
                        qualifier: None,
                        name: m.output_type.clone().unwrap_or_default().trim_start_matches('.').replace('.', "_"),
                        arguments: Vec::new(),
                    },
                    annotations: Vec::new(),
                })
                .collect();
            Api {
                uid: 0,
                name: svc.name.clone().unwrap_or_default(),
                methods,
                extends: Vec::new(),
                annotations: vec![package_annotation(&package)],
                location: Location::new(uri.to_string(), Span::file_start()),
            }
        })
        .collect();

    if package.is_empty() {
        reporter.report(
            DiagnosticCode::InvalidAnnotation,
            Location::new(uri.to_string(), Span::file_start()),
            "legacy file has no package; module identity may collide",
        );
    }

    Module {
        uid: module_uid,
        uri: uri.to_string(),
        legacy_package: Some(package),
        imports: fd
            .dependency
            .iter()
            .map(|d| Import {
                path: d.clone(),
                alias: None,
                is_dot_import: false,
                resolved_module: None,
                location: Location::new(uri.to_string(), Span::file_start()),
            })
            .collect(),
        structs: flattener.structs,
        enums: flattener.enums,
        apis,
        sdks: Vec::new(),
        consts: Vec::new(),
        annotation_decls: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_uid_is_deterministic_and_stable_across_calls() {
        let a = legacy_module_uid("foo.bar", "a.proto");
        let b = legacy_module_uid("foo.bar", "a.proto");
        let c = legacy_module_uid("foo.bar", "b.proto");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn nested_message_is_promoted_with_uniquified_name() {
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
        assert_eq!(module.structs.len(), 2);
        let inner = module.structs.iter().find(|s| s.name == "Outer_Inner").unwrap();
        assert_eq!(inner.nested_info.as_ref().unwrap().enclosing_type, "Outer");
    }

    #[test]
    fn synthetic_oneof_becomes_presence_not_union() {
        let fd = wire::FileDescriptorProto {
            name: Some("x.proto".into()),
            package: Some("pkg".into()),
            dependency: vec![],
            message_type: vec![wire::DescriptorProto {
                name: Some("M".into()),
                field: vec![wire::FieldDescriptorProto {
                    name: Some("x".into()),
                    number: Some(1),
                    label: None,
                    r#type: Some(wire::FieldProtoType::Int32 as i32),
                    type_name: None,
                    oneof_index: Some(0),
                }],
                nested_type: vec![],
                enum_type: vec![],
                oneof_decl: vec![wire::OneofDescriptorProto { name: Some("_x".into()) }],
            }],
            enum_type: vec![],
            service: vec![],
            syntax: Some("proto3".into()),
        };
        let reporter = Reporter::new();
        let module = convert_legacy_file(&fd, "x.proto", &reporter);
        let field = &module.structs[0].fields[0];
        assert!(field.union_index.is_none());
        assert!(matches!(&field.ty, TypeSpecifier::Forward { name, .. } if name == "Presence"));
    }
}
