// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use clap::CommandFactory;

#[test]
fn cli_definition_is_consistent() {
    Cli::command().debug_assert();
}

#[test]
fn start_application_parses_attach_flags() {
    let cli = Cli::try_parse_from([
        "appman-controller",
        "start-application",
        "-i",
        "-o",
        "-e",
        "com.x.a",
        "doc://page",
    ])
    .unwrap();
    match cli.command {
        Commands::StartApplication {
            attach_stdin,
            attach_stdout,
            attach_stderr,
            id,
            document_url,
        } => {
            assert!(attach_stdin && attach_stdout && attach_stderr);
            assert_eq!(id, "com.x.a");
            assert_eq!(document_url.as_deref(), Some("doc://page"));
        }
        _ => panic!("wrong command"),
    }
}

#[test]
fn install_package_defaults_to_internal_zero() {
    let cli = Cli::try_parse_from(["appman-controller", "install-package", "pkgA.pkg"]).unwrap();
    match cli.command {
        Commands::InstallPackage { package, location } => {
            assert_eq!(package, "pkgA.pkg");
            assert_eq!(location, "internal-0");
        }
        _ => panic!("wrong command"),
    }
}

#[test]
fn install_package_accepts_stdin_marker_and_location() {
    let cli = Cli::try_parse_from([
        "appman-controller",
        "install-package",
        "-",
        "-l",
        "removable-1",
    ])
    .unwrap();
    match cli.command {
        Commands::InstallPackage { package, location } => {
            assert_eq!(package, "-");
            assert_eq!(location, "removable-1");
        }
        _ => panic!("wrong command"),
    }
}

#[test]
fn remove_package_flags() {
    let cli = Cli::try_parse_from([
        "appman-controller",
        "remove-package",
        "com.x.a",
        "-k",
        "-f",
    ])
    .unwrap();
    match cli.command {
        Commands::RemovePackage {
            id,
            keep_documents,
            force,
        } => {
            assert_eq!(id, "com.x.a");
            assert!(keep_documents);
            assert!(force);
        }
        _ => panic!("wrong command"),
    }
}

#[test]
fn debug_application_needs_wrapper_and_id() {
    assert!(Cli::try_parse_from(["appman-controller", "debug-application", "gdb"]).is_err());
    let cli = Cli::try_parse_from([
        "appman-controller",
        "debug-application",
        "gdb",
        "com.x.a",
    ])
    .unwrap();
    assert!(matches!(cli.command, Commands::DebugApplication { .. }));
}

#[test]
fn unknown_subcommands_are_rejected() {
    assert!(Cli::try_parse_from(["appman-controller", "frobnicate"]).is_err());
}
