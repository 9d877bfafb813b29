//! Detect subcommand - report whether a domain configuration declares a data grid

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Args;
use podstop_core::detect_file;

#[derive(Args, Debug)]
pub struct DetectArgs {
    /// Domain configuration file (config/config.xml)
    pub config_xml: PathBuf,
}

pub fn run(args: DetectArgs) -> ExitCode {
    let present = detect_file(&args.config_xml);
    println!(
        "{}: data grid {}",
        args.config_xml.display(),
        if present { "present" } else { "absent" }
    );
    ExitCode::SUCCESS
}
