//! Binary entry point: installs tracing, parses the CLI, drives the
//! pipeline, and maps outcomes to the exit codes of spec.md §6
//! (0 = success, 1 = diagnostics, 2 = CLI misuse / process failure).

use clap::Parser;
use idlc::cli::{Cli, OutputSink, PluginInvocation};
use idlc::driver::CompileOptions;
use idlc::error::IdlcError;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn install_tracing(quiet: bool, verbose: u8) {
    let default = if quiet {
        "error"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with_target(false)
        .init();
}

fn print_diagnostics(reporter: &idlc::error::Reporter) {
    for diag in reporter.sorted() {
        eprintln!("{diag}");
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    install_tracing(cli.quiet, cli.verbose);

    match run(cli).await {
        Ok(true) => ExitCode::from(0),
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("idlc: {e}");
            ExitCode::from(2)
        }
    }
}

fn dump_tokens(files: &[String]) -> Result<(), IdlcError> {
    for path in files {
        let source = std::fs::read_to_string(path).map_err(|e| IdlcError::Io {
            path: path.into(),
            source: e,
        })?;
        let (tokens, err) = idlc::lexer::tokenize(&source);
        println!("// === {path} ===");
        for tok in &tokens {
            println!("{:?}", tok.kind);
        }
        if let Some(err) = err {
            return Err(IdlcError::Other(anyhow::anyhow!("{path}: {err:?}")));
        }
    }
    Ok(())
}

fn dump_tree(files: &[String]) -> Result<(), IdlcError> {
    let reporter = idlc::error::Reporter::new();
    for path in files {
        let source = std::fs::read_to_string(path).map_err(|e| IdlcError::Io {
            path: path.into(),
            source: e,
        })?;
        let ast = idlc::parser::parse_source(&source, path.clone(), &reporter);
        println!("// === {path} ===");
        println!("{ast:#?}");
    }
    if !reporter.is_empty() {
        print_diagnostics(&reporter);
        return Err(IdlcError::Other(anyhow::anyhow!("parse errors while dumping tree")));
    }
    Ok(())
}

async fn write_output(sink: &OutputSink, name: &str, bytes: &[u8]) -> Result<(), IdlcError> {
    match sink {
        OutputSink::Stdout => {
            println!("// === {name} ===");
            println!("{}", String::from_utf8_lossy(bytes));
            Ok(())
        }
        OutputSink::Directory(dir) => {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| IdlcError::Io { path: dir.clone(), source: e })?;
            let path = dir.join(name);
            tokio::fs::write(&path, bytes)
                .await
                .map_err(|e| IdlcError::Io { path, source: e })
        }
    }
}

async fn run_pbplugins(
    invocations: &[PluginInvocation],
    image: &idlc::model::Image,
    reporter: &idlc::error::Reporter,
    files: &[String],
    sink: &OutputSink,
    per_package_mode: bool,
) -> Result<(), IdlcError> {
    let set = idlc::backtranslate::backtranslate(image, reporter);
    let groups = if per_package_mode {
        idlc::codegen::partition_by_package(set)
    } else {
        vec![(None, set)]
    };

    for invocation in invocations {
        let parameter = if invocation.params.is_empty() {
            None
        } else {
            Some(
                invocation
                    .params
                    .iter()
                    .map(|(k, v)| if v.is_empty() { k.clone() } else { format!("{k}={v}") })
                    .collect::<Vec<_>>()
                    .join(","),
            )
        };
        for (_package, group) in &groups {
            let request = idlc::wire::CodeGeneratorRequest {
                file_to_generate: files.to_vec(),
                parameter: parameter.clone(),
                proto_file: group.file.clone(),
            };
            let response = idlc::driver::invoke_plugin(&invocation.name, &request).await?;
            if let Some(err) = response.error {
                return Err(IdlcError::PluginFailed { name: invocation.name.clone(), message: err });
            }
            for file in response.file {
                let name = file.name.unwrap_or_default();
                let content = file.content.unwrap_or_default();
                write_output(sink, &name, content.as_bytes()).await?;
            }
        }
    }
    Ok(())
}

/// Runs a recognized built-in plugin by name. Only `json` and
/// `summary` are currently recognized (spec.md §6: "Currently one name
/// is recognized" for `--plugin`, though this front end offers two for
/// parity with `idlc build`'s old `--out-format`).
async fn run_builtin_plugins(
    invocations: &[PluginInvocation],
    image: &idlc::model::Image,
    sink: &OutputSink,
) -> Result<(), IdlcError> {
    for invocation in invocations {
        let rendered = match invocation.name.as_str() {
            "json" => idlc::codegen::generate_json_summary(image)
                .map_err(|e| IdlcError::Other(anyhow::anyhow!(e)))?,
            "summary" => {
                let counts = idlc::codegen::kind_counts(image);
                let mut lines: Vec<String> = counts.into_iter().map(|(k, v)| format!("{k}: {v}")).collect();
                lines.sort();
                lines.join("\n")
            }
            other => {
                return Err(IdlcError::PluginFailed {
                    name: other.to_string(),
                    message: "unrecognized built-in plugin".to_string(),
                });
            }
        };
        write_output(sink, &format!("{}.out", invocation.name), rendered.as_bytes()).await?;
    }
    Ok(())
}

/// Returns `Ok(true)` on a clean compile, `Ok(false)` when diagnostics
/// were reported (already printed), and `Err` for a process-level
/// failure.
async fn run(cli: Cli) -> Result<bool, IdlcError> {
    if cli.dump_tokens {
        dump_tokens(&cli.files)?;
        return Ok(true);
    }
    if cli.dump_tree {
        dump_tree(&cli.files)?;
        return Ok(true);
    }

    let options = CompileOptions::new(cli.effective_roots(), cli.jobs);
    let (image, reporter) = idlc::compile(&cli.files, options).await?;
    if !reporter.is_empty() {
        print_diagnostics(&reporter);
        return Ok(false);
    }

    if cli.check {
        return Ok(true);
    }

    let sink = cli.output_sink();

    if let Some(out_path) = &cli.descriptor_set_out {
        use prost::Message;
        let set = idlc::backtranslate::backtranslate(&image, &reporter);
        let bytes = set.encode_to_vec();
        tokio::fs::write(out_path, bytes)
            .await
            .map_err(|e| IdlcError::Io { path: out_path.clone(), source: e })?;
    }

    let pbplugins = cli.pbplugin_invocations();
    if !pbplugins.is_empty() {
        run_pbplugins(&pbplugins, &image, &reporter, &cli.files, &sink, cli.per_package_mode).await?;
    }

    let plugins = cli.plugin_invocations();
    if !plugins.is_empty() {
        run_builtin_plugins(&plugins, &image, &sink).await?;
    }

    if cli.descriptor_set_out.is_none() && pbplugins.is_empty() && plugins.is_empty() {
        let rendered = idlc::codegen::generate_json_summary(&image)
            .map_err(|e| IdlcError::Other(anyhow::anyhow!(e)))?;
        write_output(&sink, "summary.json", rendered.as_bytes()).await?;
    }

    Ok(true)
}
