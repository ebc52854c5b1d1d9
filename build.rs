// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

/// Common arguments: source folder and its run options
fn source_args() -> Vec<Arg> {
    vec![
        Arg::new("source").required(true).help("Source folder"),
        Arg::new("dest")
            .short('d')
            .long("dest")
            .value_name("DIR")
            .help("Destination folder (default: AIP_/DIP_/CLONE_ sibling of the source)"),
        Arg::new("profile")
            .short('p')
            .long("profile")
            .default_value("archival")
            .help("Preservation profile: archival (aip), distribution (dip), raw-clone"),
        Arg::new("classes")
            .short('c')
            .long("classes")
            .default_value("all")
            .help("Media classes to include: all, or a list such as image,audio,dvd"),
    ]
}

fn build_cli() -> Command {
    Command::new("archivist")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Archivist Contributors")
        .about("Incremental preservation pipeline for personal media archives")
        .subcommand_required(false)
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("FILE")
                .global(true)
                .help("Pipeline configuration file (TOML)"),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Only report warnings and errors"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Enable debug output"),
        )
        .subcommand(
            Command::new("mirror")
                .about("Copy new material from the source and normalize destination names")
                .args(source_args()),
        )
        .subcommand(
            Command::new("process")
                .about("Mirror, convert, remove emptied directories and package the result")
                .args(source_args())
                .arg(
                    Arg::new("package_scope")
                        .long("package-scope")
                        .value_name("SCOPE")
                        .help("What to wrap: each top-level item, or the destination root"),
                )
                .arg(
                    Arg::new("no_package")
                        .long("no-package")
                        .action(ArgAction::SetTrue)
                        .help("Skip the packaging phase"),
                ),
        )
        .subcommand(
            Command::new("validate")
                .about("Validate a package, or every package directly under a folder")
                .arg(Arg::new("path").required(true).help("Package or folder of packages"))
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Print a machine-readable report"),
                ),
        )
        .subcommand(
            Command::new("package")
                .about("Wrap unwrapped items and record additions in wrapped ones")
                .arg(Arg::new("path").required(true).help("Destination folder"))
                .arg(
                    Arg::new("scope")
                        .long("scope")
                        .value_name("SCOPE")
                        .help("What to wrap: each top-level item, or the folder itself"),
                )
                .arg(
                    Arg::new("regenerate")
                        .long("regenerate")
                        .action(ArgAction::SetTrue)
                        .help("Rebuild manifests from scratch instead of appending"),
                ),
        )
        .subcommand(
            Command::new("rename")
                .about("Normalize every file and directory name below a folder")
                .arg(Arg::new("path").required(true).help("Folder to normalize")),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let manifest_dir = match env::var("CARGO_MANIFEST_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(e) => {
            println!("cargo:warning=CARGO_MANIFEST_DIR not set: {}", e);
            return;
        }
    };
    let man_dir = manifest_dir.join("man");

    if let Err(e) = fs::create_dir_all(&man_dir) {
        println!("cargo:warning=Failed to create man directory: {}", e);
        return;
    }

    let man = Man::new(build_cli());
    let mut buffer = Vec::new();
    if let Err(e) = man.render(&mut buffer) {
        println!("cargo:warning=Failed to render man page: {}", e);
        return;
    }

    let man_path = man_dir.join("archivist.1");
    if let Err(e) = fs::write(&man_path, buffer) {
        println!("cargo:warning=Failed to write man page: {}", e);
    }
}
