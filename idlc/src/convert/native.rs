//! Native-dialect AST to [`crate::model::Module`] conversion (spec.md
//! §4.3). Produces a module whose type references are all `Forward`;
//! nothing here touches another file, so this runs fully in parallel
//! across the file set (spec.md §5).

use super::{lower_type_expr, lower_value};
use crate::ast::{
    AnnotationApplication, AnnotationScope as AstAnnotationScope, ApiAst, ConstAst, EnumAst,
    ImportAst, ModuleAst, SdkAst, StructAst,
};
use crate::error::{DiagnosticCode, Reporter};
use crate::model::{
    AnnotationDecl, AnnotationScope, Api, ApiMethod, AttributeReference, Constant, Enum,
    Enumerant, Field, Import, Module, Sdk, SdkMethod, SdkParam, Struct, TypeSpecifier, Union,
};
use crate::span::{Location, Span};

/// An attribute UID (field/enumerant/method) has no sequential
/// fallback: an omitted `@uid` is rejected outright rather than
/// invented (spec.md §4.3 open question).
fn attribute_uid(uid: Option<u64>, kind: &str, name: &str, loc: &Location, reporter: &Reporter) -> u64 {
    match uid {
        Some(u) => u,
        None => {
            reporter.report(
                DiagnosticCode::InvalidAnnotation,
                loc.clone(),
                format!("{kind} '{name}' has no UID; add '@<uid>'"),
            );
            crate::model::INCOMPLETE_UID
        }
    }
}

fn attr_ref(app: &AnnotationApplication) -> AttributeReference {
    AttributeReference::Forward {
        qualifier: app.qualifier.clone(),
        name: app.name.clone(),
    }
}

fn lower_annotations(apps: &[AnnotationApplication], uri: &str) -> Vec<crate::model::Annotation> {
    apps.iter()
        .map(|app| crate::model::Annotation {
            attribute: attr_ref(app),
            value: app.value.as_ref().map(lower_value),
            location: Location::new(uri.to_string(), app.span),
        })
        .collect()
}

fn lower_scope(scope: &AstAnnotationScope) -> AnnotationScope {
    match scope {
        AstAnnotationScope::Module => AnnotationScope::Module,
        AstAnnotationScope::Union => AnnotationScope::Union,
        AstAnnotationScope::Struct => AnnotationScope::Struct,
        AstAnnotationScope::Field => AnnotationScope::Field,
        AstAnnotationScope::Enumerant => AnnotationScope::Enumerant,
        AstAnnotationScope::Enum => AnnotationScope::Enum,
        AstAnnotationScope::Api => AnnotationScope::Api,
        AstAnnotationScope::ApiMethod => AnnotationScope::ApiMethod,
        AstAnnotationScope::Sdk => AnnotationScope::Sdk,
        AstAnnotationScope::SdkMethod => AnnotationScope::SdkMethod,
        AstAnnotationScope::Const => AnnotationScope::Const,
        AstAnnotationScope::Import => AnnotationScope::Import,
        AstAnnotationScope::Star => AnnotationScope::Star,
    }
}

fn convert_import(ast: &ImportAst, uri: &str) -> Import {
    Import {
        path: ast.path.clone(),
        alias: ast.alias.clone(),
        is_dot_import: ast.is_dot_import,
        resolved_module: None,
        location: Location::new(uri.to_string(), ast.span),
    }
}

fn convert_struct(ast: &StructAst, uri: &str, reporter: &Reporter) -> Struct {
    let mut fields = Vec::new();
    let mut unions = Vec::new();

    for field in &ast.fields {
        let loc = Location::new(uri.to_string(), field.span);
        let uid = attribute_uid(field.meta.uid, "field", &field.name, &loc, reporter);
        fields.push(Field {
            uid,
            name: field.name.clone(),
            ty: lower_type_expr(&field.ty),
            default: field.default.as_ref().map(lower_value),
            annotations: lower_annotations(&field.meta.annotations, uri),
            union_index: None,
            location: loc,
        });
    }

    for (idx, union_ast) in ast.unions.iter().enumerate() {
        let mut field_uids = Vec::new();
        for field in &union_ast.fields {
            let loc = Location::new(uri.to_string(), field.span);
            let uid = attribute_uid(field.meta.uid, "field", &field.name, &loc, reporter);
            fields.push(Field {
                uid,
                name: field.name.clone(),
                ty: lower_type_expr(&field.ty),
                default: field.default.as_ref().map(lower_value),
                annotations: lower_annotations(&field.meta.annotations, uri),
                union_index: Some(idx),
                location: loc,
            });
            field_uids.push(uid);
        }
        unions.push(Union {
            name: union_ast.name.clone(),
            field_uids,
        });
    }

    if ast.meta.uid.is_none() {
        reporter.report(
            DiagnosticCode::MissingModuleUid,
            Location::new(uri.to_string(), ast.span),
            format!("struct '{}' has no UID", ast.name),
        );
    }

    Struct {
        uid: ast.meta.uid.unwrap_or(crate::model::INCOMPLETE_UID),
        name: ast.name.clone(),
        fields,
        unions,
        annotations: lower_annotations(&ast.meta.annotations, uri),
        nested_info: None,
        location: Location::new(uri.to_string(), ast.span),
    }
}

fn convert_enum(ast: &EnumAst, uri: &str, reporter: &Reporter) -> Enum {
    let mut enumerants: Vec<Enumerant> = ast
        .enumerants
        .iter()
        .map(|e| {
            let loc = Location::new(uri.to_string(), e.span);
            let uid = attribute_uid(e.meta.uid, "enumerant", &e.name, &loc, reporter);
            Enumerant {
                uid,
                name: e.name.clone(),
                annotations: lower_annotations(&e.meta.annotations, uri),
            }
        })
        .collect();

    if !enumerants.iter().any(|e| e.uid == 0) {
        enumerants.insert(
            0,
            Enumerant {
                uid: 0,
                name: "None".to_string(),
                annotations: Vec::new(),
            },
        );
    }
    enumerants.sort_by_key(|e| e.uid);

    Enum {
        uid: ast.meta.uid.unwrap_or(crate::model::INCOMPLETE_UID),
        name: ast.name.clone(),
        enumerants,
        annotations: lower_annotations(&ast.meta.annotations, uri),
        nested_info: None,
        location: Location::new(uri.to_string(), ast.span),
    }
}

fn convert_api(ast: &ApiAst, uri: &str, reporter: &Reporter) -> Api {
    let methods = ast
        .methods
        .iter()
        .map(|m| {
            let loc = Location::new(uri.to_string(), m.span);
            let uid = attribute_uid(m.meta.uid, "method", &m.name, &loc, reporter);
            ApiMethod {
                uid,
                name: m.name.clone(),
                input: lower_type_expr(&m.input),
                output: lower_type_expr(&m.output),
                annotations: lower_annotations(&m.meta.annotations, uri),
            }
        })
        .collect();
    Api {
        uid: ast.meta.uid.unwrap_or(crate::model::INCOMPLETE_UID),
        name: ast.name.clone(),
        methods,
        extends: ast
            .extends
            .iter()
            .map(|q| TypeSpecifier::Forward {
                qualifier: q.qualifier.clone(),
                name: q.name.clone(),
                arguments: Vec::new(),
            })
            .collect(),
        annotations: lower_annotations(&ast.meta.annotations, uri),
        location: Location::new(uri.to_string(), ast.span),
    }
}

fn convert_sdk(ast: &SdkAst, uri: &str, reporter: &Reporter) -> Sdk {
    let methods = ast
        .methods
        .iter()
        .map(|m| {
            let loc = Location::new(uri.to_string(), m.span);
            let uid = attribute_uid(m.meta.uid, "method", &m.name, &loc, reporter);
            SdkMethod {
                uid,
                name: m.name.clone(),
                params: m
                    .params
                    .iter()
                    .map(|p| SdkParam {
                        name: p.name.clone(),
                        ty: lower_type_expr(&p.ty),
                    })
                    .collect(),
                output: m.output.as_ref().map(lower_type_expr),
                nothrows: m.nothrows,
                annotations: lower_annotations(&m.meta.annotations, uri),
            }
        })
        .collect();
    Sdk {
        uid: ast.meta.uid.unwrap_or(crate::model::INCOMPLETE_UID),
        name: ast.name.clone(),
        methods,
        extends: ast
            .extends
            .iter()
            .map(|q| TypeSpecifier::Forward {
                qualifier: q.qualifier.clone(),
                name: q.name.clone(),
                arguments: Vec::new(),
            })
            .collect(),
        annotations: lower_annotations(&ast.meta.annotations, uri),
        location: Location::new(uri.to_string(), ast.span),
    }
}

fn convert_const(ast: &ConstAst, uri: &str) -> Constant {
    Constant {
        uid: ast.meta.uid.unwrap_or(crate::model::INCOMPLETE_UID),
        name: ast.name.clone(),
        ty: lower_type_expr(&ast.ty),
        value: lower_value(&ast.value),
        annotations: lower_annotations(&ast.meta.annotations, uri),
        location: Location::new(uri.to_string(), ast.span),
    }
}

/// The module's legacy dot-path package: an explicit `Protobuf.Package`
/// annotation wins; absent that, the URI with its extension stripped
/// and path separators replaced by dots (spec.md §4.3).
fn derive_legacy_package(module: &ModuleAst, uri: &str) -> Option<String> {
    for app in &module.module_meta.annotations {
        if app.qualifier.as_deref() == Some("Protobuf") && app.name == "Package" {
            if let Some(crate::ast::ValueAst::Text(text, _)) = &app.value {
                return Some(text.clone());
            }
        }
    }
    let stem = uri.rsplit_once('.').map(|(s, _)| s).unwrap_or(uri);
    let dotted = stem.replace(['/', '\\'], ".");
    Some(dotted)
}

pub fn convert_module(ast: &ModuleAst, uri: &str, reporter: &Reporter) -> Module {
    if ast.module_meta.uid.is_none() {
        reporter.report(
            DiagnosticCode::MissingModuleUid,
            Location::new(uri.to_string(), Span::file_start()),
            "module has no UID; add 'module = @<uid>'",
        );
    }

    let annotation_decls = ast
        .annotations
        .iter()
        .enumerate()
        .map(|(idx, a)| AnnotationDecl {
            uid: a.meta.uid.unwrap_or(idx as u64),
            name: a.name.clone(),
            value_type: lower_type_expr(&a.value_type),
            scopes: a.scopes.iter().map(lower_scope).collect(),
            location: Location::new(uri.to_string(), a.span),
        })
        .collect();

    Module {
        uid: ast.module_meta.uid.unwrap_or(crate::model::INCOMPLETE_UID),
        uri: uri.to_string(),
        legacy_package: derive_legacy_package(ast, uri),
        imports: ast.imports.iter().map(|i| convert_import(i, uri)).collect(),
        structs: ast
            .structs
            .iter()
            .map(|s| convert_struct(s, uri, reporter))
            .collect(),
        enums: ast.enums.iter().map(|e| convert_enum(e, uri, reporter)).collect(),
        apis: ast.apis.iter().map(|a| convert_api(a, uri, reporter)).collect(),
        sdks: ast.sdks.iter().map(|s| convert_sdk(s, uri, reporter)).collect(),
        consts: ast.consts.iter().map(|c| convert_const(c, uri)).collect(),
        annotation_decls,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_source;

    fn convert(src: &str) -> (Module, Reporter) {
        let reporter = Reporter::new();
        let ast = parse_source(src, "t.idl", &reporter);
        let module = convert_module(&ast, "t.idl", &reporter);
        (module, reporter)
    }

    #[test]
    fn missing_module_uid_is_reported() {
        let (_, r) = convert("syntax = \"mglot0\"\nstruct S { } @1");
        assert!(r.sorted().iter().any(|d| d.code == DiagnosticCode::MissingModuleUid));
    }

    #[test]
    fn struct_fields_and_union_fields_share_uid_space() {
        let (m, r) = convert(
            "syntax = \"mglot0\"\nmodule = @1\nstruct S { A :Int32 @0; union U { B :Text @1 } } @1",
        );
        assert!(r.is_empty());
        let s = &m.structs[0];
        let uids: Vec<u64> = s.fields.iter().map(|f| f.uid).collect();
        assert_eq!(uids.len(), uids.iter().collect::<std::collections::HashSet<_>>().len());
    }

    #[test]
    fn field_without_uid_is_rejected_not_auto_assigned() {
        let (m, r) = convert("syntax = \"mglot0\"\nmodule = @1\nstruct S { A :Int32 } @1");
        assert!(r.sorted().iter().any(|d| d.code == DiagnosticCode::InvalidAnnotation));
        assert_eq!(m.structs[0].fields[0].uid, crate::model::INCOMPLETE_UID);
    }

    #[test]
    fn enum_gets_synthesized_zero_value_when_absent() {
        let (m, r) = convert("syntax = \"mglot0\"\nmodule = @1\nenum E { Bar @3 } @1");
        assert!(r.is_empty());
        let e = &m.enums[0];
        assert_eq!(e.enumerants[0].uid, 0);
        assert_eq!(e.enumerants[0].name, "None");
    }

    #[test]
    fn legacy_package_prefers_explicit_annotation() {
        let (m, r) = convert(
            "syntax = \"mglot0\"\nmodule = @1 $(Protobuf.Package(\"foo.bar\"))",
        );
        assert!(r.is_empty());
        assert_eq!(m.legacy_package.as_deref(), Some("foo.bar"));
    }
}
