// build.rs

use clap::{Arg, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

fn build_cli() -> Command {
    Command::new("modcheck")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Modcheck Contributors")
        .about("Audit installed SPT mods against the Forge catalog")
        .arg(
            Arg::new("install_root")
                .value_name("PATH")
                .help("SPT install root (defaults to the current directory)"),
        )
        .arg(
            Arg::new("api_url")
                .long("api-url")
                .value_name("URL")
                .help("Catalog API base URL"),
        )
        .arg(
            Arg::new("spt_version")
                .long("spt-version")
                .value_name("VERSION")
                .help("Target SPT version (defaults to the catalog's latest)"),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // Create man directory
    let out_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    let man_dir = out_dir.join("man");
    fs::create_dir_all(&man_dir).expect("Failed to create man directory");

    // Generate main man page
    let cmd = build_cli();
    let man = Man::new(cmd);
    let mut buffer = Vec::new();
    man.render(&mut buffer).expect("Failed to render man page");

    let man_path = man_dir.join("modcheck.1");
    fs::write(&man_path, buffer).expect("Failed to write man page");
}
