//! Native code generation (spec.md §4.8): a thin emitter. The heavy
//! lifting (actual target-language output) is delegated to external
//! plugins over the protocol in [`crate::driver`]; what lives here is
//! building the [`wire::CodeGeneratorRequest`] every plugin receives,
//! plus a built-in JSON summary generator for `--out-format=json`,
//! useful for debugging a build without wiring up a real backend.

use crate::model::{Image, Module, TypeKind};
use crate::wire;
use serde::Serialize;

/// Builds the plugin-protocol request for one invocation: every file
/// the user asked to generate, plus the full transitive descriptor set
/// a plugin might need to resolve cross-file references.
pub fn build_request(
    image: &Image,
    reporter: &crate::error::Reporter,
    files_to_generate: Vec<String>,
    parameter: Option<String>,
) -> wire::CodeGeneratorRequest {
    let set = crate::backtranslate::backtranslate(image, reporter);
    wire::CodeGeneratorRequest {
        file_to_generate: files_to_generate,
        parameter,
        proto_file: set.file,
    }
}

/// Splits a back-translated descriptor set by legacy package, for
/// `--per-package-mode` (spec.md §6: some legacy plugins cannot handle
/// multi-package input in one invocation). Order follows first
/// appearance of each package.
pub fn partition_by_package(set: wire::FileDescriptorSet) -> Vec<(Option<String>, wire::FileDescriptorSet)> {
    let mut order: Vec<Option<String>> = Vec::new();
    let mut groups: std::collections::HashMap<Option<String>, Vec<wire::FileDescriptorProto>> =
        std::collections::HashMap::new();
    for file in set.file {
        let key = file.package.clone();
        if !groups.contains_key(&key) {
            order.push(key.clone());
        }
        groups.entry(key).or_default().push(file);
    }
    order
        .into_iter()
        .map(|key| {
            let file = groups.remove(&key).unwrap_or_default();
            (key, wire::FileDescriptorSet { file })
        })
        .collect()
}

#[derive(Serialize)]
struct ModuleSummary {
    uid: u64,
    uri: String,
    structs: Vec<String>,
    enums: Vec<String>,
    apis: Vec<String>,
    sdks: Vec<String>,
    consts: Vec<String>,
}

impl ModuleSummary {
    fn from_module(module: &Module) -> Self {
        Self {
            uid: module.uid,
            uri: module.uri.clone(),
            structs: module.structs.iter().map(|s| s.name.clone()).collect(),
            enums: module.enums.iter().map(|e| e.name.clone()).collect(),
            apis: module.apis.iter().map(|a| a.name.clone()).collect(),
            sdks: module.sdks.iter().map(|s| s.name.clone()).collect(),
            consts: module.consts.iter().map(|c| c.name.clone()).collect(),
        }
    }
}

/// Renders every module in the image as indented JSON. Used by
/// `idlc build --out-format=json` when no external plugin is given.
pub fn generate_json_summary(image: &Image) -> Result<String, serde_json::Error> {
    let mut modules: Vec<&Module> = image.modules.values().collect();
    modules.sort_by_key(|m| m.uid);
    let summaries: Vec<ModuleSummary> = modules.into_iter().map(ModuleSummary::from_module).collect();
    serde_json::to_string_pretty(&summaries)
}

/// Counts declarations by kind across the whole image, used for the
/// `idlc build --summary` human-readable report.
pub fn kind_counts(image: &Image) -> std::collections::HashMap<&'static str, usize> {
    let mut counts = std::collections::HashMap::new();
    for module in image.modules.values() {
        *counts.entry(kind_label(TypeKind::Struct)).or_insert(0) += module.structs.len();
        *counts.entry(kind_label(TypeKind::Enum)).or_insert(0) += module.enums.len();
        *counts.entry(kind_label(TypeKind::Api)).or_insert(0) += module.apis.len();
        *counts.entry(kind_label(TypeKind::Sdk)).or_insert(0) += module.sdks.len();
        *counts.entry(kind_label(TypeKind::Constant)).or_insert(0) += module.consts.len();
        *counts.entry(kind_label(TypeKind::Annotation)).or_insert(0) += module.annotation_decls.len();
    }
    counts
}

fn kind_label(kind: TypeKind) -> &'static str {
    match kind {
        TypeKind::Primitive => "primitive",
        TypeKind::Data => "data",
        TypeKind::Virtual => "virtual",
        TypeKind::Struct => "struct",
        TypeKind::Enum => "enum",
        TypeKind::Api => "api",
        TypeKind::Sdk => "sdk",
        TypeKind::Annotation => "annotation",
        TypeKind::Constant => "const",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::native::convert_module;
    use crate::error::Reporter;
    use crate::parser::parse_source;

    #[test]
    fn json_summary_lists_every_module() {
        let reporter = Reporter::new();
        let ast = parse_source(
            "syntax = \"mglot0\"\nmodule = @1\nstruct S { } @1",
            "t.idl",
            &reporter,
        );
        let module = convert_module(&ast, "t.idl", &reporter);
        let mut image = Image::new();
        image.modules.insert(module.uid, module);
        let json = generate_json_summary(&image).unwrap();
        assert!(json.contains("\"S\""));
    }

    #[test]
    fn kind_counts_tally_structs() {
        let reporter = Reporter::new();
        let ast = parse_source(
            "syntax = \"mglot0\"\nmodule = @1\nstruct S { } @1",
            "t.idl",
            &reporter,
        );
        let module = convert_module(&ast, "t.idl", &reporter);
        let mut image = Image::new();
        image.modules.insert(module.uid, module);
        let counts = kind_counts(&image);
        assert_eq!(counts["struct"], 1);
    }

    #[test]
    fn partition_by_package_groups_files_by_legacy_package() {
        let set = wire::FileDescriptorSet {
            file: vec![
                wire::FileDescriptorProto { name: Some("a.proto".into()), package: Some("pkg.one".into()), ..Default::default() },
                wire::FileDescriptorProto { name: Some("b.proto".into()), package: Some("pkg.two".into()), ..Default::default() },
                wire::FileDescriptorProto { name: Some("c.proto".into()), package: Some("pkg.one".into()), ..Default::default() },
            ],
        };
        let groups = partition_by_package(set);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0.as_deref(), Some("pkg.one"));
        assert_eq!(groups[0].1.file.len(), 2);
        assert_eq!(groups[1].0.as_deref(), Some("pkg.two"));
    }
}
