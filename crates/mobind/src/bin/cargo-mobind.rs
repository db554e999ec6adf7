//! `cargo mobind ...` entry point.
//!
//! Cargo invokes `cargo-mobind mobind <args>`, so the repeated subcommand name
//! is dropped before the arguments reach the CLI parser.

fn main() -> anyhow::Result<()> {
    let mut args: Vec<std::ffi::OsString> = std::env::args_os().collect();
    if args.get(1).is_some_and(|arg| arg == "mobind") {
        args.remove(1);
    }
    mobind::run_from(args)
}
