// Command-line interface for sts conversions
//
// This binary drives the sts-babel pipeline: it converts one standards XML
// document at a time into target markup, and gives access to the shared
// cross-reference store the conversions populate.
//
// Every command that converts needs the document to be listed in the
// registry file (see `registry.path` in the configuration). Conversions of
// different documents may run at the same time against the same store.
//
// Usage:
//  stsconv convert <document> <source> [-o <file>] [--tree-dump <file>]  - Convert to markup
//  stsconv tree <document> <source> <tree>                              - Build the intermediate tree only
//  stsconv render <document> <tree> [-o <file>]                         - Generate markup from a tree
//  stsconv xref get|list|delete|rebuild                                 - Inspect or repair the store
//  stsconv --list-documents                                             - List registered documents
//
// Configuration overrides:
//
// Any configuration key can be overridden with --extra-<section>.<key> <value>.
// Dashes in the key are read as underscores; a missing value means "true".
// Example:
//  stsconv convert DOC doc.xml --extra-render.enabled --extra-store.lock-timeout-ms 500

use clap::{Arg, ArgAction, ArgMatches, Command, ValueHint};
use std::collections::{BTreeMap, HashMap};
use std::fmt::Display;
use std::path::{Path, PathBuf};
use sts_babel::render::{
    ChromeImageRenderer, CommandFormulaConverter, DirectoryPublisher, FormulaConverter,
    MathTextConverter,
};
use sts_babel::{
    Artifact, ConversionResult, ConversionSpec, Converter, DocumentRegistry, GeneratorSettings,
    XrefStore,
};
use sts_config::{ConfigError, Loader, StsConfig};
use tracing_subscriber::EnvFilter;

const CONFIG_SECTIONS: &[&str] = &["store", "registry", "generator", "render", "formula", "logging"];

/// Parse extra-* arguments from command line args
/// Returns (cleaned_args_without_extras, extra_params_map)
///
/// Supports both:
/// - `--extra-<key> <value>` (explicit value)
/// - `--extra-<key>` (boolean flag, defaults to "true")
fn parse_extra_args(args: &[String]) -> (Vec<String>, HashMap<String, String>) {
    let mut cleaned_args = Vec::new();
    let mut extra_params = HashMap::new();
    let mut i = 0;

    while i < args.len() {
        let arg = &args[i];

        if let Some(key) = arg.strip_prefix("--extra-") {
            let has_value = args.get(i + 1).is_some_and(|next| !next.starts_with('-'));
            if has_value {
                extra_params.insert(key.to_string(), args[i + 1].clone());
                i += 2;
            } else {
                extra_params.insert(key.to_string(), "true".to_string());
                i += 1;
            }
            continue;
        }

        cleaned_args.push(arg.clone());
        i += 1;
    }

    (cleaned_args, extra_params)
}

fn document_arg() -> Arg {
    Arg::new("document")
        .help("Registry id of the document")
        .required(true)
        .index(1)
        .value_hint(ValueHint::Other)
}

fn resource_dir_arg() -> Arg {
    Arg::new("resource-dir")
        .long("resource-dir")
        .value_name("DIR")
        .help("Directory source graphics are resolved from (defaults to the source's directory)")
        .value_hint(ValueHint::DirPath)
}

fn output_arg() -> Arg {
    Arg::new("output")
        .long("output")
        .short('o')
        .help("Output file path (defaults to stdout)")
        .long_help(
            "Path to write the markup to.\n\n\
            The file is replaced in one step once rendering has finished, so a\n\
            failed run never leaves partial output behind. Without it the markup\n\
            is written to stdout.",
        )
        .value_hint(ValueHint::FilePath)
}

fn report_arg() -> Arg {
    Arg::new("report")
        .long("report")
        .help("Format of the conversion summary")
        .value_parser(["text", "json"])
        .default_value("text")
}

fn build_cli() -> Command {
    Command::new("stsconv")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Convert standards XML documents into target markup")
        .long_about(
            "stsconv converts standards XML documents into line-oriented target markup\n\
            and maintains the cross-reference store shared by all conversions.\n\n\
            Commands:\n  \
            - convert: build the intermediate tree, then generate markup\n  \
            - tree:    build and keep the intermediate tree only\n  \
            - render:  generate markup from a kept tree\n  \
            - xref:    inspect or repair the cross-reference store\n\n\
            Configuration Overrides:\n  \
            Use --extra-<section>.<key> [value] to override a configuration key.\n  \
            Boolean keys can omit the value (defaults to 'true').\n\n\
            Examples:\n  \
            stsconv convert ISO-1000 iso-1000.xml                 # Markup to stdout\n  \
            stsconv convert ISO-1000 iso-1000.xml -o out.txt      # Markup to a file\n  \
            stsconv xref list --document ISO-1000                 # Store entries of one document\n  \
            stsconv convert ISO-1000 iso-1000.xml --extra-render.enabled",
        )
        .arg_required_else_help(true)
        .subcommand_required(false)
        .arg(
            Arg::new("list-documents")
                .long("list-documents")
                .help("List the documents of the registry")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("PATH")
                .help("Path to an sts.toml configuration file")
                .value_hint(ValueHint::FilePath)
                .global(true),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .value_name("FILTER")
                .help("Log filter, e.g. 'debug' or 'sts_babel=debug' (overrides logging.level)")
                .global(true),
        )
        .subcommand(
            Command::new("convert")
                .about("Convert a document into target markup")
                .long_about(
                    "Convert one registered document.\n\n\
                    The source is first streamed into an intermediate tree while every\n\
                    source id is registered in the cross-reference store. The tree is\n\
                    then replayed into the markup generator, so links to targets later\n\
                    in the document resolve. Queued tables and graphics are rendered\n\
                    when render.enabled is set, and listed as pending otherwise.\n\n\
                    Examples:\n  \
                    stsconv convert ISO-1000 iso-1000.xml -o iso-1000.txt\n  \
                    stsconv convert ISO-1000 iso-1000.xml --tree-dump work/iso-1000.json",
                )
                .arg(document_arg())
                .arg(
                    Arg::new("source")
                        .help("Source XML file")
                        .required(true)
                        .index(2)
                        .value_hint(ValueHint::FilePath),
                )
                .arg(output_arg())
                .arg(
                    Arg::new("tree-dump")
                        .long("tree-dump")
                        .value_name("PATH")
                        .help("Keep the intermediate tree at this path")
                        .value_hint(ValueHint::FilePath),
                )
                .arg(resource_dir_arg())
                .arg(report_arg()),
        )
        .subcommand(
            Command::new("tree")
                .about("Build the intermediate tree of a document without generating markup")
                .arg(document_arg())
                .arg(
                    Arg::new("source")
                        .help("Source XML file")
                        .required(true)
                        .index(2)
                        .value_hint(ValueHint::FilePath),
                )
                .arg(
                    Arg::new("tree")
                        .help("Where to write the tree")
                        .required(true)
                        .index(3)
                        .value_hint(ValueHint::FilePath),
                )
                .arg(resource_dir_arg()),
        )
        .subcommand(
            Command::new("render")
                .about("Generate markup from an intermediate tree")
                .arg(document_arg())
                .arg(
                    Arg::new("tree")
                        .help("Tree written by 'convert --tree-dump' or 'tree'")
                        .required(true)
                        .index(2)
                        .value_hint(ValueHint::FilePath),
                )
                .arg(output_arg())
                .arg(report_arg()),
        )
        .subcommand(
            Command::new("xref")
                .about("Inspect or repair the cross-reference store")
                .subcommand_required(true)
                .arg_required_else_help(true)
                .subcommand(
                    Command::new("get")
                        .about("Show the entry of a source id")
                        .arg(Arg::new("id").help("Source id").required(true).index(1)),
                )
                .subcommand(
                    Command::new("list").about("List store entries").arg(
                        Arg::new("document")
                            .long("document")
                            .value_name("ID")
                            .help("Only entries registered by this document"),
                    ),
                )
                .subcommand(
                    Command::new("delete")
                        .about("Delete the entry of a source id")
                        .arg(Arg::new("id").help("Source id").required(true).index(1)),
                )
                .subcommand(
                    Command::new("rebuild")
                        .about("Replace a document's entries by re-reading its source")
                        .arg(document_arg())
                        .arg(
                            Arg::new("source")
                                .help("Source XML file")
                                .required(true)
                                .index(2)
                                .value_hint(ValueHint::FilePath),
                        ),
                ),
        )
}

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let (cleaned_args, extra_params) = parse_extra_args(&args);

    let matches = build_cli()
        .try_get_matches_from(&cleaned_args)
        .unwrap_or_else(|e| e.exit());

    let config = load_cli_config(
        matches.get_one::<String>("config").map(String::as_str),
        &extra_params,
    );
    let level = matches
        .get_one::<String>("log-level")
        .cloned()
        .unwrap_or_else(|| config.logging.level.clone());
    init_logging(&level);

    if matches.get_flag("list-documents") {
        handle_list_documents_command(&config);
        return;
    }

    match matches.subcommand() {
        Some(("convert", sub_matches)) => handle_convert_command(&config, sub_matches),
        Some(("tree", sub_matches)) => handle_tree_command(&config, sub_matches),
        Some(("render", sub_matches)) => handle_render_command(&config, sub_matches),
        Some(("xref", sub_matches)) => handle_xref_command(&config, sub_matches),
        _ => {
            eprintln!("Unknown subcommand. Use --help for usage information.");
            std::process::exit(1);
        }
    }
}

fn exit_with(context: &str, err: impl Display) -> ! {
    eprintln!("{context}: {err}");
    std::process::exit(1);
}

fn required<'m>(matches: &'m ArgMatches, name: &str) -> &'m str {
    matches
        .get_one::<String>(name)
        .map(String::as_str)
        .unwrap_or_else(|| exit_with("Missing argument", name))
}

/// Everything a conversion borrows from.
struct Session {
    registry: DocumentRegistry,
    store: XrefStore,
    settings: GeneratorSettings,
    formulas: Box<dyn FormulaConverter>,
    rendering: Option<(ChromeImageRenderer, DirectoryPublisher)>,
}

impl Session {
    fn open(config: &StsConfig) -> Self {
        let settings = GeneratorSettings::try_from(&config.generator)
            .unwrap_or_else(|e| exit_with("Invalid generator settings", e));
        let formulas: Box<dyn FormulaConverter> = match config.formula.command() {
            Some(command) => Box::new(
                CommandFormulaConverter::from_command_line(command)
                    .unwrap_or_else(|e| exit_with("Invalid formula command", e)),
            ),
            None => Box::new(MathTextConverter),
        };
        let rendering = config.render.enabled.then(|| rendering_from_config(config));

        Session {
            registry: open_registry(config),
            store: open_store(config),
            settings,
            formulas,
            rendering,
        }
    }

    fn converter(&self) -> Converter<'_> {
        let converter = Converter::new(
            &self.registry,
            &self.store,
            &self.settings,
            self.formulas.as_ref(),
        );
        match &self.rendering {
            Some((renderer, publisher)) => converter.with_renderer(renderer, publisher),
            None => converter,
        }
    }
}

fn rendering_from_config(config: &StsConfig) -> (ChromeImageRenderer, DirectoryPublisher) {
    let render = &config.render;
    let mut renderer = ChromeImageRenderer::new(&render.output_dir)
        .with_viewport(render.viewport_width, render.viewport_height);
    if let Some(binary) = render.chrome_binary() {
        renderer = renderer.with_binary(binary);
    }
    let publisher = DirectoryPublisher::new(&render.public_dir, &config.generator.asset_base_url)
        .unwrap_or_else(|e| exit_with("Invalid asset base URL", e));
    (renderer, publisher)
}

fn open_registry(config: &StsConfig) -> DocumentRegistry {
    DocumentRegistry::load(&config.registry.path).unwrap_or_else(|e| {
        exit_with(
            &format!("Error loading registry '{}'", config.registry.path.display()),
            e,
        )
    })
}

fn open_store(config: &StsConfig) -> XrefStore {
    XrefStore::open(&config.store.path, (&config.store).into()).unwrap_or_else(|e| {
        exit_with(
            &format!("Error opening store '{}'", config.store.path.display()),
            e,
        )
    })
}

/// Handle the convert command
fn handle_convert_command(config: &StsConfig, matches: &ArgMatches) {
    let document = required(matches, "document");
    let mut spec = ConversionSpec::new(document, required(matches, "source"));
    if let Some(output) = matches.get_one::<String>("output") {
        spec = spec.with_output_path(output);
    }
    if let Some(tree) = matches.get_one::<String>("tree-dump") {
        spec = spec.with_tree_dump(tree);
    }
    if let Some(dir) = matches.get_one::<String>("resource-dir") {
        spec = spec.with_resource_dir(dir);
    }

    let session = Session::open(config);
    let result = session
        .converter()
        .convert(&spec)
        .unwrap_or_else(|e| exit_with("Conversion failed", e));
    emit_result(&result, report_format(matches));
}

/// Handle the tree command
fn handle_tree_command(config: &StsConfig, matches: &ArgMatches) {
    let tree = required(matches, "tree");
    let mut spec = ConversionSpec::new(required(matches, "document"), required(matches, "source"))
        .with_tree_dump(tree);
    if let Some(dir) = matches.get_one::<String>("resource-dir") {
        spec = spec.with_resource_dir(dir);
    }

    let session = Session::open(config);
    let report = session
        .converter()
        .build_tree(&spec)
        .unwrap_or_else(|e| exit_with("Tree build failed", e));
    eprint!("{}", report.render_consistency_report());
    println!("Tree written to {tree}");
}

/// Handle the render command
fn handle_render_command(config: &StsConfig, matches: &ArgMatches) {
    let document = required(matches, "document");
    let tree = PathBuf::from(required(matches, "tree"));
    let output = matches.get_one::<String>("output").map(Path::new);

    let session = Session::open(config);
    let result = session
        .converter()
        .render_tree(document, &tree, output)
        .unwrap_or_else(|e| exit_with("Rendering failed", e));
    emit_result(&result, report_format(matches));
}

/// Handle the xref subcommands
fn handle_xref_command(config: &StsConfig, matches: &ArgMatches) {
    match matches.subcommand() {
        Some(("get", sub_matches)) => {
            let id = required(sub_matches, "id");
            let store = open_store(config);
            match store.get(id) {
                Ok(Some(entry)) => {
                    let json = serde_json::to_string_pretty(&entry)
                        .unwrap_or_else(|e| exit_with("Serialization error", e));
                    println!("{json}");
                }
                Ok(None) => exit_with("No entry", id),
                Err(e) => exit_with("Store error", e),
            }
        }
        Some(("list", sub_matches)) => {
            let store = open_store(config);
            let entries = store
                .get_all()
                .unwrap_or_else(|e| exit_with("Store error", e));
            let document = sub_matches.get_one::<String>("document");
            for (id, entry) in entries.iter() {
                if document.is_some_and(|doc| *doc != entry.remark) {
                    continue;
                }
                println!(
                    "{id}\t{}\t{}\t{}",
                    entry.anchor_id, entry.parent_anchor_id, entry.remark
                );
            }
        }
        Some(("delete", sub_matches)) => {
            let id = required(sub_matches, "id");
            let store = open_store(config);
            match store.delete(id) {
                Ok(true) => println!("Deleted '{id}'"),
                Ok(false) => exit_with("No entry", id),
                Err(e) => exit_with("Store error", e),
            }
        }
        Some(("rebuild", sub_matches)) => {
            let document = required(sub_matches, "document");
            let source = PathBuf::from(required(sub_matches, "source"));
            let session = Session::open(config);
            let result = session
                .converter()
                .rebuild_xrefs(document, &source)
                .unwrap_or_else(|e| exit_with("Rebuild failed", e));
            eprint!("{}", result.report.render_consistency_report());
            println!("Rebuilt '{document}': {} entries replaced", result.removed);
        }
        _ => {
            eprintln!("Unknown xref subcommand. Use --help for usage information.");
            std::process::exit(1);
        }
    }
}

/// Handle the list-documents flag
fn handle_list_documents_command(config: &StsConfig) {
    let registry = open_registry(config);
    for id in registry.list_documents() {
        let Ok(entry) = registry.get(&id) else {
            continue;
        };
        let aliases = entry.aliases.join(", ");
        println!("{id}\t{}\t{}\t{aliases}", entry.target_id, entry.language);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReportFormat {
    Text,
    Json,
}

fn report_format(matches: &ArgMatches) -> ReportFormat {
    match matches.get_one::<String>("report").map(String::as_str) {
        Some("json") => ReportFormat::Json,
        _ => ReportFormat::Text,
    }
}

/// Write the markup and the conversion summary.
///
/// Markup without an output file goes to stdout, with the summary on stderr.
/// When the markup went to a file, stdout carries the summary instead.
fn emit_result(result: &ConversionResult, format: ReportFormat) {
    let summary = render_summary(result, format);
    match &result.artifact {
        Artifact::InMemory(markup) => {
            print!("{markup}");
            eprint!("{summary}");
        }
        Artifact::File(path) => {
            tracing::info!(output = %path.display(), "markup written");
            print!("{summary}");
        }
    }
}

fn render_summary(result: &ConversionResult, format: ReportFormat) -> String {
    match format {
        ReportFormat::Text => {
            let mut out = result.report.render_consistency_report();
            out.push_str(&format!(
                "{} bits, {} assets published, {} renders pending\n",
                result.bits,
                result.assets.len(),
                result.pending.len()
            ));
            for request in &result.pending {
                out.push_str(&format!("pending\t{}\t{}\n", request.filename(), request.url()));
            }
            out
        }
        ReportFormat::Json => {
            let value = serde_json::json!({
                "bits": result.bits,
                "report": &result.report,
                "assets": &result.assets,
                "pending": &result.pending,
            });
            let mut out = serde_json::to_string_pretty(&value)
                .unwrap_or_else(|e| exit_with("Serialization error", e));
            out.push('\n');
            out
        }
    }
}

fn load_cli_config(explicit_path: Option<&str>, extra_params: &HashMap<String, String>) -> StsConfig {
    let loader = Loader::new().with_optional_file("sts.toml");
    let loader = if let Some(path) = explicit_path {
        loader.with_file(path)
    } else {
        loader
    };

    apply_config_overrides(loader, extra_params)
        .and_then(Loader::build)
        .unwrap_or_else(|err| exit_with("Failed to load configuration", err))
}

/// Layer `--extra-<section>.<key>` values over the loaded files.
fn apply_config_overrides(
    mut loader: Loader,
    extra_params: &HashMap<String, String>,
) -> Result<Loader, ConfigError> {
    let sorted: BTreeMap<_, _> = extra_params.iter().collect();
    for (raw_key, raw) in sorted {
        let key = override_key(raw_key)?;
        loader = if let Some(flag) = parse_bool_arg(raw) {
            loader.set_override(&key, flag)?
        } else if let Ok(number) = raw.parse::<i64>() {
            loader.set_override(&key, number)?
        } else {
            loader.set_override(&key, raw.as_str())?
        };
    }
    Ok(loader)
}

fn override_key(raw_key: &str) -> Result<String, ConfigError> {
    let key = raw_key.replace('-', "_");
    match key.split_once('.') {
        Some((section, field)) if CONFIG_SECTIONS.contains(&section) && !field.is_empty() => {
            Ok(key)
        }
        _ => Err(ConfigError::Message(format!(
            "unknown configuration key '--extra-{raw_key}' (expected <section>.<key>, sections: {})",
            CONFIG_SECTIONS.join(", ")
        ))),
    }
}

fn parse_bool_arg(raw: &str) -> Option<bool> {
    match raw.to_lowercase().as_str() {
        "true" | "yes" => Some(true),
        "false" | "no" => Some(false),
        _ => None,
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
