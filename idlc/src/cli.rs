//! Command-line surface (spec.md §6): a single flag-based invocation
//! rather than subcommands — entry files are positional, everything
//! else is a repeatable or optional flag.

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "idlc", version, about = "Interface definition language compiler")]
pub struct Cli {
    /// Entry files to compile (native-dialect or legacy `.proto`,
    /// dispatched by extension).
    pub files: Vec<String>,

    /// Root search path for resolving `import` statements, checked in
    /// the order given (first match wins). Repeatable; defaults to the
    /// current directory when empty.
    #[arg(long = "root")]
    pub roots: Vec<PathBuf>,

    /// Where generated output is written. The literal `-` means stdout.
    #[arg(long = "output", default_value = "-")]
    pub output: String,

    /// Print the native-dialect token stream for each entry file and
    /// exit, bypassing compilation.
    #[arg(long = "dump-tokens")]
    pub dump_tokens: bool,

    /// Print the parsed AST for each entry file and exit, bypassing
    /// compilation.
    #[arg(long = "dump-tree")]
    pub dump_tree: bool,

    /// Write a legacy-compatible `FileDescriptorSet` to this path
    /// (spec.md §4.7).
    #[arg(long = "descriptor_set_out")]
    pub descriptor_set_out: Option<PathBuf>,

    /// Invoke a legacy protoc-style plugin: `name[:key=v,key=v,...]`.
    /// Repeatable.
    #[arg(long = "pbplugin")]
    pub pbplugins: Vec<String>,

    /// Invoke a built-in plugin: `name[:params]`. Currently one name is
    /// recognized. Repeatable.
    #[arg(long = "plugin")]
    pub plugins: Vec<String>,

    /// Batch legacy-plugin invocations by package; some legacy plugins
    /// cannot handle multi-package input in one invocation.
    #[arg(long = "per-package-mode")]
    pub per_package_mode: bool,

    /// Caps in-flight per-file conversion tasks; defaults to the number
    /// of available CPUs.
    #[arg(long = "jobs")]
    pub jobs: Option<usize>,

    #[arg(long = "quiet", short = 'q')]
    pub quiet: bool,

    /// Repeatable: `-v` for debug logging, `-vv` for trace.
    #[arg(short = 'v', action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Run the pipeline through the type checker and report diagnostics
    /// without invoking any plugin or writing output.
    #[arg(long = "check")]
    pub check: bool,
}

/// One `--pbplugin`/`--plugin` occurrence, parsed into its name and its
/// `key=value` parameter list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginInvocation {
    pub name: String,
    pub params: Vec<(String, String)>,
}

/// Parses `name[:key=v,key=v,...]`. A parameter without `=` is kept
/// with an empty value rather than rejected, mirroring protoc's own
/// plugin-option parser.
pub fn parse_plugin_spec(raw: &str) -> PluginInvocation {
    match raw.split_once(':') {
        None => PluginInvocation { name: raw.to_string(), params: Vec::new() },
        Some((name, rest)) => {
            let params = rest
                .split(',')
                .filter(|s| !s.is_empty())
                .map(|kv| match kv.split_once('=') {
                    Some((k, v)) => (k.to_string(), v.to_string()),
                    None => (kv.to_string(), String::new()),
                })
                .collect();
            PluginInvocation { name: name.to_string(), params }
        }
    }
}

/// Where generated output should land: a directory on disk, or stdout
/// when `--output -` (the default) is given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputSink {
    Stdout,
    Directory(PathBuf),
}

impl Cli {
    /// Roots to search, defaulting to the current directory when the
    /// user supplied none (spec.md §6).
    pub fn effective_roots(&self) -> Vec<PathBuf> {
        if self.roots.is_empty() {
            vec![PathBuf::from(".")]
        } else {
            self.roots.clone()
        }
    }

    pub fn output_sink(&self) -> OutputSink {
        if self.output == "-" {
            OutputSink::Stdout
        } else {
            OutputSink::Directory(PathBuf::from(&self.output))
        }
    }

    pub fn pbplugin_invocations(&self) -> Vec<PluginInvocation> {
        self.pbplugins.iter().map(|s| parse_plugin_spec(s)).collect()
    }

    pub fn plugin_invocations(&self) -> Vec<PluginInvocation> {
        self.plugins.iter().map(|s| parse_plugin_spec(s)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_entry_files_and_roots() {
        let cli = Cli::parse_from(["idlc", "--root", "a", "--root", "b", "x.mgdl", "y.mgdl"]);
        assert_eq!(cli.files, vec!["x.mgdl", "y.mgdl"]);
        assert_eq!(cli.roots, vec![PathBuf::from("a"), PathBuf::from("b")]);
    }

    #[test]
    fn empty_roots_default_to_current_directory() {
        let cli = Cli::parse_from(["idlc", "x.mgdl"]);
        assert_eq!(cli.effective_roots(), vec![PathBuf::from(".")]);
    }

    #[test]
    fn output_dash_is_stdout() {
        let cli = Cli::parse_from(["idlc", "x.mgdl"]);
        assert_eq!(cli.output_sink(), OutputSink::Stdout);
    }

    #[test]
    fn output_path_is_a_directory_sink() {
        let cli = Cli::parse_from(["idlc", "--output", "out/gen", "x.mgdl"]);
        assert_eq!(cli.output_sink(), OutputSink::Directory(PathBuf::from("out/gen")));
    }

    #[test]
    fn parses_plugin_spec_with_params() {
        let inv = parse_plugin_spec("cpp:lite_runtime=true,dllexport_decl=FOO");
        assert_eq!(inv.name, "cpp");
        assert_eq!(
            inv.params,
            vec![
                ("lite_runtime".to_string(), "true".to_string()),
                ("dllexport_decl".to_string(), "FOO".to_string()),
            ]
        );
    }

    #[test]
    fn parses_plugin_spec_without_params() {
        let inv = parse_plugin_spec("json");
        assert_eq!(inv.name, "json");
        assert!(inv.params.is_empty());
    }

    #[test]
    fn repeatable_pbplugin_flags_collect_in_order() {
        let cli = Cli::parse_from(["idlc", "--pbplugin", "cpp", "--pbplugin", "python:opt=1", "x.proto"]);
        let invocations = cli.pbplugin_invocations();
        assert_eq!(invocations.len(), 2);
        assert_eq!(invocations[0].name, "cpp");
        assert_eq!(invocations[1].name, "python");
        assert_eq!(invocations[1].params, vec![("opt".to_string(), "1".to_string())]);
    }

    #[test]
    fn per_package_mode_defaults_off() {
        let cli = Cli::parse_from(["idlc", "x.proto"]);
        assert!(!cli.per_package_mode);
    }

    #[test]
    fn verbose_flag_is_repeatable() {
        let cli = Cli::parse_from(["idlc", "-vv", "x.mgdl"]);
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn check_flag_defaults_off() {
        let cli = Cli::parse_from(["idlc", "x.mgdl"]);
        assert!(!cli.check);
        let cli = Cli::parse_from(["idlc", "--check", "x.mgdl"]);
        assert!(cli.check);
    }
}
