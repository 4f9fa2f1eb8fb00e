//! rolesync policy command

use clap::{Args, Subcommand};
use console::style;
use rbac::PermissionRegistry;
use shared::{DataDomain, Role};

#[derive(Debug, Args)]
pub struct PolicyCommand {
    #[command(subcommand)]
    pub command: PolicySubcommand,
}

#[derive(Debug, Subcommand)]
pub enum PolicySubcommand {
    /// Check permissions for a role
    Check {
        /// Role to check
        #[arg(short, long)]
        role: Role,
        /// Print the profile as JSON
        #[arg(long)]
        json: bool,
    },
    /// List all roles and the domains they can read
    Roles,
}

impl PolicyCommand {
    pub fn run(&self) -> anyhow::Result<()> {
        let registry = PermissionRegistry::new();
        match &self.command {
            PolicySubcommand::Check { role, json } => {
                if *json {
                    println!("{}", serde_json::to_string_pretty(registry.profile(*role))?);
                } else {
                    print!("{}", describe_role(&registry, *role));
                }
            }
            PolicySubcommand::Roles => {
                println!("{}", style("Available roles:").bold());
                for &role in Role::all() {
                    println!(
                        "  {:<10} {}",
                        style(role.as_str()).cyan(),
                        join(registry.allowed_domains(role).iter())
                    );
                }
            }
        }
        Ok(())
    }
}

/// Human-readable permission profile
pub fn describe_role(registry: &PermissionRegistry, role: Role) -> String {
    let mut out = format!("Permissions for {}\n", style(role.display_name()).bold());

    out.push_str("  Readable domains:\n");
    for &domain in DataDomain::all() {
        let mark = if registry.allows(role, domain) {
            style("✓").green()
        } else {
            style("✗").red()
        };
        out.push_str(&format!("    {} {}\n", mark, domain));
    }

    out.push_str(&format!(
        "  Notification categories: {}\n",
        join(registry.allowed_notification_categories(role).iter())
    ));
    out.push_str(&format!(
        "  Report domains: {}\n",
        join(registry.allowed_report_domains(role).iter())
    ));
    out
}

fn join<T: std::fmt::Display>(items: impl Iterator<Item = T>) -> String {
    let joined: Vec<String> = items.map(|i| i.to_string()).collect();
    if joined.is_empty() {
        "(none)".to_string()
    } else {
        joined.join(", ")
    }
}
