//! Post-linking type checking (spec.md §4.6): kind-set checks per
//! reference position, parameterized-type arity, primitive widening,
//! constant-value restrictions, and annotation-scope enforcement.

use crate::error::{DiagnosticCode, Reporter};
use crate::model::{
    Annotation, AnnotationScope, AttributeReference, Image, Module, TypeKind, TypeSpecifier, Value,
    VIRTUAL_MAP_UID,
};
use crate::span::Location;

fn arity_of(virtual_uid: u64) -> usize {
    if virtual_uid == VIRTUAL_MAP_UID {
        2
    } else {
        1
    }
}

/// Struct field types, SDK method parameters/returns, and annotation
/// declaration types all share this kind set (spec.md §4.6).
const FIELD_POSITION_KINDS: &[TypeKind] = &[
    TypeKind::Primitive,
    TypeKind::Data,
    TypeKind::Virtual,
    TypeKind::Struct,
    TypeKind::Enum,
];

/// An API method's input/output must name a struct (spec.md §4.6).
const API_METHOD_KINDS: &[TypeKind] = &[TypeKind::Struct];

/// An API's `extends` list may only name other APIs.
const API_EXTENDS_KINDS: &[TypeKind] = &[TypeKind::Api];

/// An SDK's `extends` list may only name other SDKs.
const SDK_EXTENDS_KINDS: &[TypeKind] = &[TypeKind::Sdk];

/// A constant's declared type must be a primitive (spec.md §4.6).
const CONST_KINDS: &[TypeKind] = &[TypeKind::Primitive];

fn check_type_specifier(
    spec: &TypeSpecifier,
    allowed: &[TypeKind],
    image: &Image,
    loc: &Location,
    reporter: &Reporter,
) {
    match spec {
        TypeSpecifier::Forward { name, .. } => {
            reporter.report(
                DiagnosticCode::InternalInvariantViolation,
                loc.clone(),
                format!("type '{name}' reached the checker unresolved"),
            );
        }
        TypeSpecifier::Resolved { module, ty, arguments } => {
            match image.type_kind(*module, *ty) {
                None => reporter.report(
                    DiagnosticCode::InternalInvariantViolation,
                    loc.clone(),
                    "resolved reference points at a nonexistent type",
                ),
                Some(kind) => {
                    if !allowed.contains(&kind) {
                        reporter.report(
                            DiagnosticCode::KindMismatch,
                            loc.clone(),
                            format!("{kind:?} cannot be used in this position"),
                        );
                    }
                    if kind == TypeKind::Virtual {
                        let expected = arity_of(*ty);
                        if arguments.len() != expected {
                            reporter.report(
                                DiagnosticCode::WrongArity,
                                loc.clone(),
                                format!(
                                    "expected {expected} type parameter(s), found {}",
                                    arguments.len()
                                ),
                            );
                        }
                    } else if !arguments.is_empty() {
                        reporter.report(
                            DiagnosticCode::WrongArity,
                            loc.clone(),
                            "only parameterized container types take type arguments",
                        );
                    }
                }
            }
            for arg in arguments {
                check_type_specifier(arg, FIELD_POSITION_KINDS, image, loc, reporter);
            }
        }
    }
}

fn check_value(value: &Value, loc: &Location, reporter: &Reporter) {
    match value {
        Value::Identifier { name, .. } => {
            reporter.report(
                DiagnosticCode::InternalInvariantViolation,
                loc.clone(),
                format!("value identifier '{name}' was never reclassified by the linker"),
            );
        }
        Value::List(items) => items.iter().for_each(|v| check_value(v, loc, reporter)),
        Value::Struct(fields) => fields.iter().for_each(|(_, v)| check_value(v, loc, reporter)),
        Value::Unary(_, inner) => check_value(inner, loc, reporter),
        Value::Binary(_, lhs, rhs) => {
            check_value(lhs, loc, reporter);
            check_value(rhs, loc, reporter);
        }
        Value::ConstRef(crate::model::AttributeReference::Forward { .. }) => {
            reporter.report(
                DiagnosticCode::InternalInvariantViolation,
                loc.clone(),
                "const reference reached the checker unresolved",
            );
        }
        Value::Bool(_)
        | Value::Int(_)
        | Value::Float(_)
        | Value::Text(_)
        | Value::Data(_)
        | Value::EnumerantRef { .. }
        | Value::ConstRef(_) => {}
    }
}

/// Fields whose type resolved to a primitive and whose literal default
/// doesn't fit without narrowing get a `TypeMismatch` (spec.md §4.6:
/// widening is one-directional, narrowing is always rejected; every
/// other primitive kind must match the target exactly).
fn check_widening(ty: &TypeSpecifier, value: &Value, loc: &Location, reporter: &Reporter) {
    use crate::model::*;
    let TypeSpecifier::Resolved { module, ty: target, .. } = ty else { return };
    if *module != BUILTIN_MODULE_UID {
        return;
    }
    match value {
        Value::Int(literal) => {
            if let Some(minimal) = minimal_fit_uid(*literal) {
                if !primitive_widens_to(minimal, *target) {
                    reporter.report(
                        DiagnosticCode::TypeMismatch,
                        loc.clone(),
                        format!("integer literal {literal} does not fit without narrowing"),
                    );
                }
            }
        }
        Value::Bool(_) if *target != PRIMITIVE_BOOL_UID => {
            reporter.report(DiagnosticCode::TypeMismatch, loc.clone(), "bool literal assigned to a non-bool type");
        }
        Value::Text(_) if *target != PRIMITIVE_TEXT_UID => {
            reporter.report(DiagnosticCode::TypeMismatch, loc.clone(), "text literal assigned to a non-text type");
        }
        Value::Float(_) if *target != PRIMITIVE_FLOAT32_UID && *target != PRIMITIVE_FLOAT64_UID => {
            reporter.report(DiagnosticCode::TypeMismatch, loc.clone(), "float literal assigned to a non-float type");
        }
        _ => {}
    }
}

/// Whether `value` may stand as an operand of a unary/binary operator
/// inside a constant's initializer: a literal, or a reference that
/// resolves to another constant (spec.md §4.6 constant-value
/// restrictions).
fn is_constant_operand(value: &Value, image: &Image) -> bool {
    match value {
        Value::Bool(_) | Value::Int(_) | Value::Float(_) => true,
        Value::ConstRef(AttributeReference::Resolved { module, ty }) => {
            image.type_kind(*module, *ty) == Some(TypeKind::Constant)
        }
        Value::Unary(_, inner) => is_constant_operand(inner, image),
        Value::Binary(_, lhs, rhs) => is_constant_operand(lhs, image) && is_constant_operand(rhs, image),
        _ => false,
    }
}

/// Enforces spec.md §4.6's constant-value restrictions: identifiers in
/// a constant's initializer may reference only other constants, and
/// unary/binary operators only apply to constant operands.
fn check_constant_value(value: &Value, image: &Image, loc: &Location, reporter: &Reporter) {
    match value {
        Value::ConstRef(AttributeReference::Resolved { module, ty }) => {
            if image.type_kind(*module, *ty) != Some(TypeKind::Constant) {
                reporter.report(
                    DiagnosticCode::UnsupportedValue,
                    loc.clone(),
                    "a constant initializer may only reference other constants",
                );
            }
        }
        Value::Unary(_, inner) => {
            if !is_constant_operand(inner, image) {
                reporter.report(
                    DiagnosticCode::UnsupportedValue,
                    loc.clone(),
                    "unary operator applied to a non-constant operand",
                );
            }
            check_constant_value(inner, image, loc, reporter);
        }
        Value::Binary(_, lhs, rhs) => {
            if !is_constant_operand(lhs, image) || !is_constant_operand(rhs, image) {
                reporter.report(
                    DiagnosticCode::UnsupportedValue,
                    loc.clone(),
                    "binary operator applied to a non-constant operand",
                );
            }
            check_constant_value(lhs, image, loc, reporter);
            check_constant_value(rhs, image, loc, reporter);
        }
        Value::List(items) => items.iter().for_each(|v| check_constant_value(v, image, loc, reporter)),
        Value::Struct(fields) => fields.iter().for_each(|(_, v)| check_constant_value(v, image, loc, reporter)),
        _ => {}
    }
}

fn minimal_fit_uid(v: i128) -> Option<u64> {
    use crate::model::*;
    if v < 0 {
        if v >= i8::MIN as i128 {
            Some(PRIMITIVE_INT8_UID)
        } else if v >= i16::MIN as i128 {
            Some(PRIMITIVE_INT16_UID)
        } else if v >= i32::MIN as i128 {
            Some(PRIMITIVE_INT32_UID)
        } else {
            Some(PRIMITIVE_INT64_UID)
        }
    } else if v <= u8::MAX as i128 {
        Some(PRIMITIVE_UINT8_UID)
    } else if v <= u16::MAX as i128 {
        Some(PRIMITIVE_UINT16_UID)
    } else if v <= u32::MAX as i128 {
        Some(PRIMITIVE_UINT32_UID)
    } else {
        Some(PRIMITIVE_UINT64_UID)
    }
}

/// Flags an annotation applied outside the scope set its declaration
/// allows (spec.md §9 open question, resolved in the affirmative: scope
/// enforcement lives in the checker rather than being left advisory).
fn check_annotation_scope(ann: &Annotation, applied: AnnotationScope, image: &Image, reporter: &Reporter) {
    let AttributeReference::Resolved { module, ty } = &ann.attribute else {
        return;
    };
    let Some(decl) = image
        .module(*module)
        .and_then(|m| m.annotation_decls.iter().find(|a| a.uid == *ty))
    else {
        return;
    };
    if !decl.scopes.contains(&applied) && !decl.scopes.contains(&AnnotationScope::Star) {
        reporter.report(
            DiagnosticCode::KindMismatch,
            ann.location.clone(),
            format!("annotation '{}' is not declared for this position", decl.name),
        );
    }
}

fn check_annotations(annotations: &[Annotation], scope: AnnotationScope, image: &Image, reporter: &Reporter) {
    for ann in annotations {
        check_annotation_scope(ann, scope, image, reporter);
    }
}

fn check_module(module: &Module, image: &Image, reporter: &Reporter) {
    for s in &module.structs {
        check_annotations(&s.annotations, AnnotationScope::Struct, image, reporter);
        for field in &s.fields {
            check_type_specifier(&field.ty, FIELD_POSITION_KINDS, image, &field.location, reporter);
            check_annotations(&field.annotations, AnnotationScope::Field, image, reporter);
            if let Some(default) = &field.default {
                check_value(default, &field.location, reporter);
                check_widening(&field.ty, default, &field.location, reporter);
            }
        }
    }
    for e in &module.enums {
        check_annotations(&e.annotations, AnnotationScope::Enum, image, reporter);
        for enumerant in &e.enumerants {
            check_annotations(&enumerant.annotations, AnnotationScope::Enumerant, image, reporter);
        }
    }
    for api in &module.apis {
        check_annotations(&api.annotations, AnnotationScope::Api, image, reporter);
        for ext in &api.extends {
            check_type_specifier(ext, API_EXTENDS_KINDS, image, &api.location, reporter);
        }
        for m in &api.methods {
            check_type_specifier(&m.input, API_METHOD_KINDS, image, &api.location, reporter);
            check_type_specifier(&m.output, API_METHOD_KINDS, image, &api.location, reporter);
            check_annotations(&m.annotations, AnnotationScope::ApiMethod, image, reporter);
        }
    }
    for sdk in &module.sdks {
        check_annotations(&sdk.annotations, AnnotationScope::Sdk, image, reporter);
        for ext in &sdk.extends {
            check_type_specifier(ext, SDK_EXTENDS_KINDS, image, &sdk.location, reporter);
        }
        for m in &sdk.methods {
            for p in &m.params {
                check_type_specifier(&p.ty, FIELD_POSITION_KINDS, image, &sdk.location, reporter);
            }
            if let Some(output) = &m.output {
                check_type_specifier(output, FIELD_POSITION_KINDS, image, &sdk.location, reporter);
            }
            check_annotations(&m.annotations, AnnotationScope::SdkMethod, image, reporter);
        }
    }
    for c in &module.consts {
        check_type_specifier(&c.ty, CONST_KINDS, image, &c.location, reporter);
        check_value(&c.value, &c.location, reporter);
        check_widening(&c.ty, &c.value, &c.location, reporter);
        check_constant_value(&c.value, image, &c.location, reporter);
        check_annotations(&c.annotations, AnnotationScope::Const, image, reporter);
    }
    for a in &module.annotation_decls {
        check_type_specifier(&a.value_type, FIELD_POSITION_KINDS, image, &a.location, reporter);
    }
}

pub fn check(image: &Image, reporter: &Reporter) {
    for module in image.modules.values() {
        check_module(module, image, reporter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::native::convert_module;
    use crate::parser::parse_source;

    fn build_and_check(src: &str) -> Reporter {
        let reporter = Reporter::new();
        let ast = parse_source(src, "t.idl", &reporter);
        let module = convert_module(&ast, "t.idl", &reporter);
        let mut image = Image::new();
        image.modules.insert(module.uid, module);
        crate::linker::link(&mut image, &reporter);
        check(&image, &reporter);
        reporter
    }

    #[test]
    fn well_formed_struct_has_no_diagnostics() {
        let r = build_and_check("syntax = \"mglot0\"\nmodule = @1\nstruct S { X :Int32 @0 } @1");
        assert!(r.is_empty());
    }

    #[test]
    fn list_without_type_argument_is_wrong_arity() {
        let r = build_and_check("syntax = \"mglot0\"\nmodule = @1\nstruct S { X :List @0 } @1");
        assert!(r.sorted().iter().any(|d| d.code == DiagnosticCode::WrongArity));
    }

    #[test]
    fn narrowing_default_is_a_type_mismatch() {
        let r = build_and_check(
            "syntax = \"mglot0\"\nmodule = @1\nstruct S { X :Int8 @0 = 1000 } @1",
        );
        assert!(r.sorted().iter().any(|d| d.code == DiagnosticCode::TypeMismatch));
    }

    #[test]
    fn map_requires_two_type_arguments() {
        let r = build_and_check(
            "syntax = \"mglot0\"\nmodule = @1\nstruct S { X :Map<Text> @0 } @1",
        );
        assert!(r.sorted().iter().any(|d| d.code == DiagnosticCode::WrongArity));
    }

    #[test]
    fn api_method_returning_an_enum_is_a_kind_mismatch() {
        let r = build_and_check(
            "syntax = \"mglot0\"\nmodule = @1\nenum E { Bar @1 } @2\napi Svc { Call(:E) returns (:E) @1 } @3",
        );
        assert!(r.sorted().iter().any(|d| d.code == DiagnosticCode::KindMismatch));
    }

    #[test]
    fn api_extending_an_sdk_is_a_kind_mismatch() {
        let r = build_and_check(
            "syntax = \"mglot0\"\nmodule = @1\nsdk S { Do() nothrows @1 } @2\napi Svc : S { } @3",
        );
        assert!(r.sorted().iter().any(|d| d.code == DiagnosticCode::KindMismatch));
    }

    #[test]
    fn const_typed_as_a_struct_is_a_kind_mismatch() {
        let r = build_and_check(
            "syntax = \"mglot0\"\nmodule = @1\nstruct S { } @1\nconst X :S = {}",
        );
        assert!(r.sorted().iter().any(|d| d.code == DiagnosticCode::KindMismatch));
    }

    #[test]
    fn bool_literal_assigned_to_int_field_is_a_type_mismatch() {
        let r = build_and_check(
            "syntax = \"mglot0\"\nmodule = @1\nstruct S { X :Int32 @0 = true } @1",
        );
        assert!(r.sorted().iter().any(|d| d.code == DiagnosticCode::TypeMismatch));
    }

    #[test]
    fn annotation_applied_outside_its_declared_scope_is_a_kind_mismatch() {
        let r = build_and_check(
            "syntax = \"mglot0\"\nmodule = @1\nannotation Scale(const): Int32 @2\nstruct S { X :Int32 @0 $(Scale(5)) } @1",
        );
        assert!(r.sorted().iter().any(|d| d.code == DiagnosticCode::KindMismatch));
    }

    #[test]
    fn annotation_applied_within_its_declared_scope_is_clean() {
        let r = build_and_check(
            "syntax = \"mglot0\"\nmodule = @1\nannotation Scale(field): Int32 @2\nstruct S { X :Int32 @0 $(Scale(5)) } @1",
        );
        assert!(r.is_empty(), "{:?}", r.sorted());
    }
}
