//! Output rendering and formatting

use comfy_table::{presets::UTF8_FULL, Attribute, Cell, Color, ContentArrangement, Table};
use console::{Style, Term};
use serde::Serialize;
use sideload_types::{
    InstallPreview, InstalledPackageRecord, OperationOutcome, SessionId, TrustVerdict,
};
use std::io;

/// What a command produced, rendered once it finishes
#[derive(Debug, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum CommandResult {
    Preview(InstallPreview),
    Outcome {
        operation: &'static str,
        target: String,
        outcome: OperationOutcome,
    },
    Packages {
        packages: Vec<InstalledPackageRecord>,
    },
    Sessions {
        sessions: Vec<SessionId>,
    },
    Cleanup {
        abandoned: usize,
    },
}

impl CommandResult {
    /// The command ran but its operation did not succeed
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            CommandResult::Outcome {
                outcome: OperationOutcome::Failed(_) | OperationOutcome::Cancelled,
                ..
            }
        )
    }
}

/// Output renderer for CLI results
#[derive(Clone)]
pub struct OutputRenderer {
    json_output: bool,
    colors: bool,
}

impl OutputRenderer {
    pub fn new(json_output: bool) -> Self {
        Self {
            json_output,
            colors: Term::stdout().features().colors_supported(),
        }
    }

    pub fn render_result(&self, result: &CommandResult) -> io::Result<()> {
        if self.json_output {
            let json = serde_json::to_string_pretty(result).map_err(io::Error::other)?;
            println!("{json}");
            return Ok(());
        }

        match result {
            CommandResult::Preview(preview) => self.render_preview(preview),
            CommandResult::Outcome {
                operation,
                target,
                outcome,
            } => self.render_outcome(operation, target, outcome),
            CommandResult::Packages { packages } => self.render_packages(packages),
            CommandResult::Sessions { sessions } => {
                if sessions.is_empty() {
                    println!("No installer sessions.");
                } else {
                    for id in sessions {
                        println!("session {id}");
                    }
                }
            }
            CommandResult::Cleanup { abandoned } => {
                println!("Abandoned {abandoned} stale session(s).");
            }
        }
        Ok(())
    }

    fn style(&self, style: Style) -> Style {
        if self.colors {
            style
        } else {
            Style::new()
        }
    }

    fn render_preview(&self, preview: &InstallPreview) {
        let bundle = &preview.bundle;
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic);

        let installed = preview
            .installed
            .as_ref()
            .map_or_else(|| "-".to_string(), |record| record.version.to_string());
        let trust = match preview.trust {
            TrustVerdict::Trusted => Cell::new("trusted").fg(Color::Green),
            TrustVerdict::Untrusted => Cell::new("signature mismatch")
                .fg(Color::Red)
                .add_attribute(Attribute::Bold),
        };

        let rows = [
            ("Package", Cell::new(&bundle.package_id)),
            ("Label", Cell::new(&bundle.label)),
            ("Version", Cell::new(bundle.version.to_string())),
            ("Installed", Cell::new(installed)),
            ("Size", Cell::new(bundle.size_formatted())),
            (
                "Platform",
                Cell::new(format!(
                    "min {} / target {}",
                    bundle.min_platform, bundle.target_platform
                )),
            ),
            ("Signers", Cell::new(bundle.signatures.len().to_string())),
            ("Trust", trust),
        ];
        for (name, value) in rows {
            table.add_row(vec![Cell::new(name).add_attribute(Attribute::Bold), value]);
        }
        println!("{table}");

        let permissions = bundle.permission_labels();
        if !permissions.is_empty() {
            println!("Permissions:");
            for (raw, label) in permissions {
                println!("  {label} ({raw})");
            }
        }
        if preview.is_downgrade() {
            let warn = self.style(Style::new().yellow());
            println!("{}", warn.apply_to("Warning: this is a downgrade."));
        }
    }

    fn render_outcome(&self, operation: &str, target: &str, outcome: &OperationOutcome) {
        let ok = self.style(Style::new().green().bold());
        let bad = self.style(Style::new().red().bold());
        match outcome {
            OperationOutcome::Succeeded => {
                println!("{} {operation} {target}", ok.apply_to("✓"));
            }
            OperationOutcome::Failed(reason) => {
                println!("{} {operation} {target} failed: {reason}", bad.apply_to("✗"));
            }
            OperationOutcome::Cancelled => {
                println!("{} {operation} {target} cancelled", bad.apply_to("✗"));
            }
            OperationOutcome::Pending | OperationOutcome::InProgress => {
                println!("{operation} {target} still in progress");
            }
        }
    }

    fn render_packages(&self, packages: &[InstalledPackageRecord]) {
        if packages.is_empty() {
            println!("No packages installed.");
            return;
        }

        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(vec![
            Cell::new("Package").add_attribute(Attribute::Bold),
            Cell::new("Version").add_attribute(Attribute::Bold),
            Cell::new("Signers").add_attribute(Attribute::Bold),
        ]);
        for package in packages {
            table.add_row(vec![
                Cell::new(&package.package_id),
                Cell::new(package.version.to_string()),
                Cell::new(package.signatures.len().to_string()),
            ]);
        }
        println!("{table}");
    }
}
