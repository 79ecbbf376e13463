//! Which invocations the gate needs to see.

use std::path::Path;

use diff_engine::Operation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    Npm,
    Npx,
}

impl Tool {
    pub fn bin_name(self) -> &'static str {
        match self {
            Tool::Npm => "npm",
            Tool::Npx => "npx",
        }
    }
}

const INSTALL: &[&str] = &[
    "install", "i", "in", "ins", "inst", "insta", "instal", "isnt", "isnta", "isntal", "isntall",
    "add", "install-test", "it", "update", "up", "upgrade", "udpate", "uninstall", "un", "unlink",
    "remove", "rm", "r", "dedupe", "ddp",
];

const CLEAN_INSTALL: &[&str] = &[
    "ci",
    "clean-install",
    "ic",
    "install-clean",
    "isntall-clean",
    "install-ci-test",
    "cit",
    "clean-install-test",
    "sit",
];

const EXEC: &[&str] = &["exec", "x"];

/// Global options that consume the next argument.
const VALUE_FLAGS: &[&str] = &[
    "--prefix",
    "-C",
    "--registry",
    "--cache",
    "--userconfig",
    "--workspace",
    "-w",
];

/// `npm`/`npx` when this binary was started under one of those names.
pub fn invoked_as(arg0: &str) -> Option<Tool> {
    match Path::new(arg0).file_name()?.to_str()? {
        "npm" => Some(Tool::Npm),
        "npx" => Some(Tool::Npx),
        _ => None,
    }
}

/// The npm subcommand: the first argument that is neither a flag nor a
/// flag's value.
pub fn subcommand(args: &[String]) -> Option<&str> {
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if VALUE_FLAGS.contains(&arg.as_str()) {
            iter.next();
        } else if !arg.starts_with('-') {
            return Some(arg);
        }
    }
    None
}

/// How to gate an invocation, or `None` to pass it straight through.
pub fn classify(tool: Tool, args: &[String]) -> Option<Operation> {
    if tool == Tool::Npx {
        return Some(Operation::Exec);
    }
    let command = subcommand(args)?;
    if INSTALL.contains(&command) {
        Some(Operation::Install)
    } else if CLEAN_INSTALL.contains(&command) {
        Some(Operation::CleanInstall)
    } else if EXEC.contains(&command) {
        Some(Operation::Exec)
    } else {
        None
    }
}
