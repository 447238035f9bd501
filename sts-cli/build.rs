use clap::{Arg, ArgAction, Command, ValueHint};
use clap_complete::{generate_to, shells::*};
use std::env;
use std::io::Error;

// Mirror of the command tree in src/main.rs; build scripts can't reach src/.
fn document_arg() -> Arg {
    Arg::new("document")
        .help("Registry id of the document")
        .required(true)
        .index(1)
        .value_hint(ValueHint::Other)
}

fn file_arg(name: &'static str, index: usize) -> Arg {
    Arg::new(name)
        .required(true)
        .index(index)
        .value_hint(ValueHint::FilePath)
}

fn main() -> Result<(), Error> {
    let outdir = match env::var_os("OUT_DIR") {
        None => return Ok(()),
        Some(outdir) => outdir,
    };

    let mut cmd = Command::new("stsconv")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Convert standards XML documents into target markup")
        .arg_required_else_help(true)
        .arg(
            Arg::new("list-documents")
                .long("list-documents")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .value_hint(ValueHint::FilePath)
                .global(true),
        )
        .arg(Arg::new("log-level").long("log-level").global(true))
        .subcommand(
            Command::new("convert")
                .arg(document_arg())
                .arg(file_arg("source", 2))
                .arg(
                    Arg::new("output")
                        .long("output")
                        .short('o')
                        .value_hint(ValueHint::FilePath),
                )
                .arg(
                    Arg::new("tree-dump")
                        .long("tree-dump")
                        .value_hint(ValueHint::FilePath),
                )
                .arg(
                    Arg::new("resource-dir")
                        .long("resource-dir")
                        .value_hint(ValueHint::DirPath),
                )
                .arg(
                    Arg::new("report")
                        .long("report")
                        .value_parser(["text", "json"]),
                ),
        )
        .subcommand(
            Command::new("tree")
                .arg(document_arg())
                .arg(file_arg("source", 2))
                .arg(file_arg("tree", 3))
                .arg(
                    Arg::new("resource-dir")
                        .long("resource-dir")
                        .value_hint(ValueHint::DirPath),
                ),
        )
        .subcommand(
            Command::new("render")
                .arg(document_arg())
                .arg(file_arg("tree", 2))
                .arg(
                    Arg::new("output")
                        .long("output")
                        .short('o')
                        .value_hint(ValueHint::FilePath),
                ),
        )
        .subcommand(
            Command::new("xref")
                .subcommand(Command::new("get").arg(Arg::new("id").required(true).index(1)))
                .subcommand(
                    Command::new("list").arg(Arg::new("document").long("document")),
                )
                .subcommand(Command::new("delete").arg(Arg::new("id").required(true).index(1)))
                .subcommand(
                    Command::new("rebuild")
                        .arg(document_arg())
                        .arg(file_arg("source", 2)),
                ),
        );

    generate_to(Bash, &mut cmd, "stsconv", &outdir)?;
    generate_to(Zsh, &mut cmd, "stsconv", &outdir)?;
    generate_to(Fish, &mut cmd, "stsconv", &outdir)?;

    println!("cargo:warning=Shell completions generated in {outdir:?}");

    Ok(())
}
