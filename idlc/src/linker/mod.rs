//! Forward-reference resolution (spec.md §4.5). Strictly serial: it is
//! the first stage that needs every module's namespace at once, so it
//! runs after the embarrassingly-parallel per-file conversion pass
//! completes (spec.md §5).

use crate::error::{DiagnosticCode, Reporter};
use crate::model::{
    AttributeReference, Image, Module, ModuleUid, TypeKind, TypeSpecifier, TypeUid, Value,
    BUILTIN_MODULE_UID,
};
use crate::span::Location;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Resolution {
    module: ModuleUid,
    ty: TypeUid,
}

/// One module's resolvable name table: its own declarations, its
/// explicit import aliases, and the modules it dot-imports (whose
/// top-level names become visible unqualified).
struct Namespace {
    local: HashMap<String, Resolution>,
    aliases: HashMap<String, ModuleUid>,
    dot_imported: Vec<ModuleUid>,
    /// This module's own UID, and every module it imports (by any import
    /// form): the only modules a legacy-qualified reference may search
    /// (spec.md §4.5 item 3).
    own_module: ModuleUid,
    imported_modules: Vec<ModuleUid>,
}

fn local_names(module: &Module) -> HashMap<String, Resolution> {
    let mut out = HashMap::new();
    for s in &module.structs {
        out.insert(s.name.clone(), Resolution { module: module.uid, ty: s.uid });
    }
    for e in &module.enums {
        out.insert(e.name.clone(), Resolution { module: module.uid, ty: e.uid });
    }
    for a in &module.apis {
        out.insert(a.name.clone(), Resolution { module: module.uid, ty: a.uid });
    }
    for s in &module.sdks {
        out.insert(s.name.clone(), Resolution { module: module.uid, ty: s.uid });
    }
    for c in &module.consts {
        out.insert(c.name.clone(), Resolution { module: module.uid, ty: c.uid });
    }
    for a in &module.annotation_decls {
        out.insert(a.name.clone(), Resolution { module: module.uid, ty: a.uid });
    }
    out
}

fn build_namespace(module: &Module, _image: &Image, uri_to_module: &HashMap<String, ModuleUid>) -> Namespace {
    let mut aliases = HashMap::new();
    let mut dot_imported = Vec::new();
    let mut imported_modules = Vec::new();
    for import in &module.imports {
        let Some(target_uid) = import.resolved_module.or_else(|| uri_to_module.get(&import.path).copied()) else {
            continue;
        };
        imported_modules.push(target_uid);
        if import.is_dot_import {
            dot_imported.push(target_uid);
        } else if let Some(alias) = &import.alias {
            aliases.insert(alias.clone(), target_uid);
        }
        // Unaliased, non-dot imports expose only their package-qualified
        // names, via `imported_modules` below.
    }
    Namespace {
        local: local_names(module),
        aliases,
        dot_imported,
        own_module: module.uid,
        imported_modules,
    }
}

fn resolve_name(
    image: &Image,
    ns: &Namespace,
    qualifier: Option<&str>,
    name: &str,
    loc: &Location,
    reporter: &Reporter,
) -> Option<Resolution> {
    if qualifier.is_none() {
        // spec.md §4.5 item 1: search, in order, (a) the current
        // module's own declarations, (b) the built-in types, (c) its
        // dot-imports. A local declaration always shadows a built-in of
        // the same name.
        if let Some(res) = ns.local.get(name) {
            return Some(*res);
        }
        if let Some(uid) = crate::model::builtin_primitive_uid(name) {
            return Some(Resolution { module: BUILTIN_MODULE_UID, ty: uid });
        }
    }

    if let Some(q) = qualifier {
        if let Some(&target_module) = ns.aliases.get(q) {
            if let Some(m) = image.module(target_module) {
                if let Some(res) = local_names(m).get(name) {
                    return Some(*res);
                }
            }
            reporter.report(
                DiagnosticCode::UnresolvedReference,
                loc.clone(),
                format!("'{name}' not found in module imported as '{q}'"),
            );
            return None;
        }
        // Longest-prefix match against legacy packages, restricted to
        // (a) this module's own legacy package and (b) every module it
        // imports (spec.md §4.5 item 3) — never the whole image.
        let mut scope: Vec<ModuleUid> = Vec::with_capacity(ns.imported_modules.len() + 1);
        scope.push(ns.own_module);
        scope.extend(ns.imported_modules.iter().copied());

        let mut candidates: Vec<&Module> = scope
            .iter()
            .filter_map(|uid| image.module(*uid))
            .filter(|m| {
                m.legacy_package
                    .as_deref()
                    .map(|p| p == q || p.ends_with(&format!(".{q}")))
                    .unwrap_or(false)
            })
            .collect();
        candidates.sort_by_key(|m| std::cmp::Reverse(m.legacy_package.as_ref().map(|p| p.len()).unwrap_or(0)));
        for m in candidates {
            if let Some(res) = local_names(m).get(name) {
                return Some(*res);
            }
        }
        reporter.report(
            DiagnosticCode::UnresolvedReference,
            loc.clone(),
            format!("could not resolve '{q}.{name}'"),
        );
        return None;
    }

    let mut found: Vec<Resolution> = Vec::new();
    for &module_uid in &ns.dot_imported {
        if let Some(m) = image.module(module_uid) {
            if let Some(res) = local_names(m).get(name) {
                found.push(*res);
            }
        }
    }
    match found.len() {
        0 => {
            reporter.report(
                DiagnosticCode::UnresolvedReference,
                loc.clone(),
                format!("unresolved reference to '{name}'"),
            );
            None
        }
        1 => Some(found[0]),
        _ => {
            reporter.report(
                DiagnosticCode::AmbiguousReference,
                loc.clone(),
                format!("'{name}' is visible from more than one dot-import"),
            );
            None
        }
    }
}

fn resolve_type_specifier(
    spec: &TypeSpecifier,
    image: &Image,
    ns: &Namespace,
    loc: &Location,
    reporter: &Reporter,
) -> TypeSpecifier {
    match spec {
        TypeSpecifier::Resolved { .. } => spec.clone(),
        TypeSpecifier::Forward { qualifier, name, arguments } => {
            let args: Vec<_> = arguments
                .iter()
                .map(|a| resolve_type_specifier(a, image, ns, loc, reporter))
                .collect();
            if let Some(uid) = crate::model::builtin_primitive_uid(name) {
                if qualifier.is_none() && crate::model::VIRTUAL_TYPE_UIDS.contains(&uid) {
                    return TypeSpecifier::Resolved { module: BUILTIN_MODULE_UID, ty: uid, arguments: args };
                }
            }
            match resolve_name(image, ns, qualifier.as_deref(), name, loc, reporter) {
                Some(res) => TypeSpecifier::Resolved { module: res.module, ty: res.ty, arguments: args },
                None => TypeSpecifier::Forward { qualifier: qualifier.clone(), name: name.clone(), arguments: args },
            }
        }
    }
}

fn resolve_attr_ref(
    attr: &AttributeReference,
    image: &Image,
    ns: &Namespace,
    loc: &Location,
    reporter: &Reporter,
) -> AttributeReference {
    match attr {
        AttributeReference::Resolved { .. } => attr.clone(),
        AttributeReference::Forward { qualifier, name } => {
            match resolve_name(image, ns, qualifier.as_deref(), name, loc, reporter) {
                Some(res) => AttributeReference::Resolved { module: res.module, ty: res.ty },
                None => attr.clone(),
            }
        }
    }
}

/// Reclassifies a bare `Value::Identifier` once the position's expected
/// type is known: an enumerant name if that type is an enum, otherwise
/// a constant reference. Only the top-level value is reclassified;
/// identifiers nested inside list/struct literals are left for a future
/// pass (recorded as a known limitation in DESIGN.md).
fn reclassify_value(
    value: Value,
    expected: &TypeSpecifier,
    image: &Image,
    ns: &Namespace,
    loc: &Location,
    reporter: &Reporter,
) -> Value {
    let Value::Identifier { qualifier, name } = value else {
        return value;
    };
    if let TypeSpecifier::Resolved { module, ty, .. } = expected {
        if image.type_kind(*module, *ty) == Some(TypeKind::Enum) {
            return Value::EnumerantRef {
                ty: expected.clone(),
                enumerant: name,
            };
        }
    }
    let attr = AttributeReference::Forward { qualifier, name };
    Value::ConstRef(resolve_attr_ref(&attr, image, ns, loc, reporter))
}

/// Resolves every `Forward` reference across the whole image in place.
pub fn link(image: &mut Image, reporter: &Reporter) {
    let uri_to_module: HashMap<String, ModuleUid> =
        image.modules.values().map(|m| (m.uri.clone(), m.uid)).collect();

    let namespaces: HashMap<ModuleUid, Namespace> = image
        .modules
        .values()
        .map(|m| (m.uid, build_namespace(m, image, &uri_to_module)))
        .collect();

    let snapshot = image.clone();
    for module in image.modules.values_mut() {
        let ns = &namespaces[&module.uid];

        for import in &mut module.imports {
            import.resolved_module = uri_to_module.get(&import.path).copied();
            if import.resolved_module.is_none() {
                reporter.report(
                    DiagnosticCode::UnresolvedReference,
                    import.location.clone(),
                    format!("could not resolve import '{}'", import.path),
                );
            }
        }

        for s in &mut module.structs {
            for app in &mut s.annotations {
                app.attribute = resolve_attr_ref(&app.attribute, &snapshot, ns, &app.location, reporter);
            }
            for field in &mut s.fields {
                field.ty = resolve_type_specifier(&field.ty, &snapshot, ns, &field.location, reporter);
                if let Some(default) = field.default.take() {
                    field.default = Some(reclassify_value(default, &field.ty, &snapshot, ns, &field.location, reporter));
                }
                for app in &mut field.annotations {
                    app.attribute = resolve_attr_ref(&app.attribute, &snapshot, ns, &field.location, reporter);
                }
            }
        }
        for e in &mut module.enums {
            for app in &mut e.annotations {
                app.attribute = resolve_attr_ref(&app.attribute, &snapshot, ns, &app.location, reporter);
            }
            for enumerant in &mut e.enumerants {
                for app in &mut enumerant.annotations {
                    app.attribute = resolve_attr_ref(&app.attribute, &snapshot, ns, &e.location, reporter);
                }
            }
        }
        for api in &mut module.apis {
            for app in &mut api.annotations {
                app.attribute = resolve_attr_ref(&app.attribute, &snapshot, ns, &api.location, reporter);
            }
            for ext in &mut api.extends {
                *ext = resolve_type_specifier(ext, &snapshot, ns, &api.location, reporter);
            }
            for m in &mut api.methods {
                m.input = resolve_type_specifier(&m.input, &snapshot, ns, &api.location, reporter);
                m.output = resolve_type_specifier(&m.output, &snapshot, ns, &api.location, reporter);
                for app in &mut m.annotations {
                    app.attribute = resolve_attr_ref(&app.attribute, &snapshot, ns, &api.location, reporter);
                }
            }
        }
        for sdk in &mut module.sdks {
            for app in &mut sdk.annotations {
                app.attribute = resolve_attr_ref(&app.attribute, &snapshot, ns, &sdk.location, reporter);
            }
            for ext in &mut sdk.extends {
                *ext = resolve_type_specifier(ext, &snapshot, ns, &sdk.location, reporter);
            }
            for m in &mut sdk.methods {
                for p in &mut m.params {
                    p.ty = resolve_type_specifier(&p.ty, &snapshot, ns, &sdk.location, reporter);
                }
                if let Some(output) = &m.output {
                    m.output = Some(resolve_type_specifier(output, &snapshot, ns, &sdk.location, reporter));
                }
                for app in &mut m.annotations {
                    app.attribute = resolve_attr_ref(&app.attribute, &snapshot, ns, &sdk.location, reporter);
                }
            }
        }
        for c in &mut module.consts {
            c.ty = resolve_type_specifier(&c.ty, &snapshot, ns, &c.location, reporter);
            let value = std::mem::replace(&mut c.value, Value::Bool(false));
            c.value = reclassify_value(value, &c.ty, &snapshot, ns, &c.location, reporter);
            for app in &mut c.annotations {
                app.attribute = resolve_attr_ref(&app.attribute, &snapshot, ns, &c.location, reporter);
            }
        }
        for a in &mut module.annotation_decls {
            a.value_type = resolve_type_specifier(&a.value_type, &snapshot, ns, &a.location, reporter);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::native::convert_module;
    use crate::parser::parse_source;

    fn build_image(sources: &[(&str, &str)]) -> (Image, Reporter) {
        let reporter = Reporter::new();
        let mut image = Image::new();
        for (uri, src) in sources {
            let ast = parse_source(src, *uri, &reporter);
            let module = convert_module(&ast, uri, &reporter);
            image.modules.insert(module.uid, module);
        }
        link(&mut image, &reporter);
        (image, reporter)
    }

    #[test]
    fn resolves_field_type_within_same_module() {
        let (image, r) = build_image(&[(
            "a.idl",
            "syntax = \"mglot0\"\nmodule = @1\nstruct A { B :B @0 } @1\nstruct B { } @2",
        )]);
        assert!(r.is_empty());
        let a = &image.modules[&1];
        let field = &a.structs.iter().find(|s| s.name == "A").unwrap().fields[0];
        assert!(matches!(field.ty, TypeSpecifier::Resolved { .. }));
    }

    #[test]
    fn unresolved_reference_is_reported() {
        let (_, r) = build_image(&[(
            "a.idl",
            "syntax = \"mglot0\"\nmodule = @1\nstruct A { B :Missing @0 } @1",
        )]);
        assert!(r.sorted().iter().any(|d| d.code == DiagnosticCode::UnresolvedReference));
    }

    #[test]
    fn builtin_primitives_resolve_without_import() {
        let (image, r) = build_image(&[(
            "a.idl",
            "syntax = \"mglot0\"\nmodule = @1\nstruct A { X :Int32 @0 } @1",
        )]);
        assert!(r.is_empty());
        let field = &image.modules[&1].structs[0].fields[0];
        assert_eq!(
            field.ty,
            TypeSpecifier::Resolved { module: BUILTIN_MODULE_UID, ty: crate::model::PRIMITIVE_INT32_UID, arguments: vec![] }
        );
    }
}
