// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! appman-controller - command-line control of a running appmand
//!
//! Exit codes: 0 success, 1 generic error, 2 negative reply from the
//! manager, 3 failure reported while processing installer events.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod client;
mod commands;
mod exit_error;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "appman-controller",
    version,
    about = "Controller for a running application manager instance"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an application
    StartApplication {
        /// Attach the app's stdin to the controller's stdin
        #[arg(short = 'i', long = "attach-stdin")]
        attach_stdin: bool,
        /// Attach the app's stdout to the controller's stdout
        #[arg(short = 'o', long = "attach-stdout")]
        attach_stdout: bool,
        /// Attach the app's stderr to the controller's stderr
        #[arg(short = 'e', long = "attach-stderr")]
        attach_stderr: bool,
        /// The id of an installed application
        id: String,
        /// The optional document-url
        document_url: Option<String>,
    },

    /// Debug an application through a configured wrapper
    DebugApplication {
        /// The name of a configured debug-wrapper
        debug_wrapper: String,
        /// The id of an installed application
        id: String,
        /// The optional document-url
        document_url: Option<String>,
    },

    /// Stop an application
    StopApplication {
        /// The id of an installed application
        id: String,
    },

    /// List all installed applications
    ListApplications,

    /// Show application meta-data
    ShowApplication {
        /// The id of an installed application
        id: String,
    },

    /// Install a package
    InstallPackage {
        /// The file name of the package; can be - for stdin
        package: String,
        /// Set a custom installation location
        #[arg(short = 'l', long = "location", default_value = "internal-0")]
        location: String,
    },

    /// Remove a package
    RemovePackage {
        /// The id of an installed application
        id: String,
        /// Keep the document folder of the application
        #[arg(short = 'k', long = "keep-documents")]
        keep_documents: bool,
        /// Force removal of the package
        #[arg(short = 'f', long = "force")]
        force: bool,
    },

    /// List all installation locations
    ListInstallationLocations,

    /// Show details for an installation location
    ShowInstallationLocation {
        /// The id of an installation location
        id: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        let code = e
            .downcast_ref::<exit_error::ExitError>()
            .map_or(1, |c| c.code);
        let message = e.to_string();
        if !message.is_empty() {
            eprintln!("ERROR: {message}");
        }
        std::process::exit(code);
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::StartApplication {
            attach_stdin,
            attach_stdout,
            attach_stderr,
            id,
            document_url,
        } => {
            commands::start_application(
                &id,
                document_url,
                attach_stdin,
                attach_stdout,
                attach_stderr,
            )
            .await
        }
        Commands::DebugApplication {
            debug_wrapper,
            id,
            document_url,
        } => commands::debug_application(&debug_wrapper, &id, document_url).await,
        Commands::StopApplication { id } => commands::stop_application(&id).await,
        Commands::ListApplications => commands::list_applications().await,
        Commands::ShowApplication { id } => commands::show_application(&id).await,
        Commands::InstallPackage { package, location } => {
            commands::install_package(&package, &location).await
        }
        Commands::RemovePackage {
            id,
            keep_documents,
            force,
        } => commands::remove_package(&id, keep_documents, force).await,
        Commands::ListInstallationLocations => commands::list_installation_locations().await,
        Commands::ShowInstallationLocation { id } => {
            commands::show_installation_location(&id).await
        }
    }
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;
