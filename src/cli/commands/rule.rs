//! Automation rule commands.

use anyhow::{anyhow, Context, Result};
use clap::{Args, Subcommand};
use uuid::Uuid;

use super::unwrap_response;
use crate::cli::output::format_rule_table;
use crate::cli::CliContext;
use crate::domain::models::AutomationRule;

#[derive(Args)]
pub struct RuleArgs {
    #[command(subcommand)]
    pub command: RuleCommands,
}

#[derive(Subcommand)]
pub enum RuleCommands {
    /// List automation rules
    List {
        /// Only show enabled rules
        #[arg(long)]
        enabled_only: bool,
    },

    /// Show one rule in full
    Show {
        /// Rule id (or unique prefix) or name
        id_or_name: String,
    },

    /// Register a rule from a JSON definition file
    Add {
        /// Path to a JSON file with name, trigger, conditions, action
        file: String,
    },

    /// Enable a rule
    Enable {
        /// Rule id (or unique prefix) or name
        id_or_name: String,
    },

    /// Disable a rule
    Disable {
        /// Rule id (or unique prefix) or name
        id_or_name: String,
    },

    /// Delete a rule
    Delete {
        /// Rule id (or unique prefix) or name
        id_or_name: String,
    },

    /// Install the builtin rule set
    Seed,
}

/// Resolve a rule by full id, unique id prefix, or exact name.
async fn resolve(ctx: &CliContext, id_or_name: &str) -> Result<AutomationRule> {
    let rules = unwrap_response(ctx.api.list_automation_rules().await)?;

    if let Ok(id) = id_or_name.parse::<Uuid>() {
        return rules
            .into_iter()
            .find(|r| r.id == id)
            .ok_or_else(|| anyhow!("no rule with id {id}"));
    }

    if let Some(rule) = rules.iter().find(|r| r.name == id_or_name) {
        return Ok(rule.clone());
    }

    let prefix_matches: Vec<&AutomationRule> = rules
        .iter()
        .filter(|r| r.id.to_string().starts_with(id_or_name))
        .collect();
    match prefix_matches.as_slice() {
        [rule] => Ok((*rule).clone()),
        [] => Err(anyhow!("no rule matches {id_or_name:?}")),
        _ => Err(anyhow!("{id_or_name:?} is ambiguous; use the full id")),
    }
}

pub async fn execute(args: RuleArgs, ctx: &CliContext, json: bool) -> Result<()> {
    match args.command {
        RuleCommands::List { enabled_only } => {
            let mut rules = unwrap_response(ctx.api.list_automation_rules().await)?;
            if enabled_only {
                rules.retain(|r| r.enabled);
            }
            if json {
                println!("{}", serde_json::to_string_pretty(&rules)?);
            } else if rules.is_empty() {
                println!("No automation rules found.");
            } else {
                println!("{}", format_rule_table(&rules));
                println!("Showing {} rule(s)", rules.len());
            }
        }

        RuleCommands::Show { id_or_name } => {
            let rule = resolve(ctx, &id_or_name).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&rule)?);
            } else {
                println!("  ID: {}", rule.id);
                println!("  Name: {}", rule.name);
                if !rule.description.is_empty() {
                    println!("  Description: {}", rule.description);
                }
                println!("  Enabled: {}", rule.enabled);
                println!("  Trigger: {}", serde_json::to_string(&rule.trigger)?);
                if !rule.conditions.is_empty() {
                    println!("  Conditions:");
                    for condition in &rule.conditions {
                        println!("    - {}", serde_json::to_string(condition)?);
                    }
                }
                println!("  Action: {}", serde_json::to_string(&rule.action)?);
                println!(
                    "  Created: {}",
                    rule.created_at.format("%Y-%m-%d %H:%M:%S UTC")
                );
            }
        }

        RuleCommands::Add { file } => {
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {file}"))?;
            let definition: RuleDefinition = serde_json::from_str(&raw)
                .with_context(|| format!("{file} is not a valid rule definition"))?;

            let mut rule =
                AutomationRule::new(definition.name, definition.trigger, definition.action)
                    .with_description(definition.description);
            rule.conditions = definition.conditions;
            rule.enabled = definition.enabled;

            let rule = unwrap_response(ctx.api.add_automation_rule(rule).await)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&rule)?);
            } else {
                println!("Rule {:?} registered with id {}.", rule.name, rule.id);
            }
        }

        RuleCommands::Enable { id_or_name } => {
            let rule = resolve(ctx, &id_or_name).await?;
            unwrap_response(ctx.api.set_rule_enabled(rule.id, true).await)?;
            report_toggle(&rule, true, json)?;
        }

        RuleCommands::Disable { id_or_name } => {
            let rule = resolve(ctx, &id_or_name).await?;
            unwrap_response(ctx.api.set_rule_enabled(rule.id, false).await)?;
            report_toggle(&rule, false, json)?;
        }

        RuleCommands::Delete { id_or_name } => {
            let rule = resolve(ctx, &id_or_name).await?;
            let existed = unwrap_response(ctx.api.remove_automation_rule(rule.id).await)?;
            if json {
                println!("{}", serde_json::json!({ "deleted": existed, "id": rule.id }));
            } else {
                println!("Rule {:?} deleted.", rule.name);
            }
        }

        RuleCommands::Seed => {
            let installed = ctx.api.engine().install_builtin_rules().await?;
            if json {
                println!("{}", serde_json::json!({ "installed": installed }));
            } else {
                println!("Installed {installed} builtin rule(s).");
            }
        }
    }

    Ok(())
}

fn report_toggle(rule: &AutomationRule, enabled: bool, json: bool) -> Result<()> {
    if json {
        println!(
            "{}",
            serde_json::json!({ "id": rule.id, "enabled": enabled })
        );
    } else {
        println!(
            "Rule {:?} {}.",
            rule.name,
            if enabled { "enabled" } else { "disabled" }
        );
    }
    Ok(())
}

/// Rule definition as read from a JSON file; id and creation time are
/// assigned on registration.
#[derive(serde::Deserialize)]
struct RuleDefinition {
    name: String,
    #[serde(default)]
    description: String,
    trigger: crate::domain::models::Trigger,
    #[serde(default)]
    conditions: Vec<crate::domain::models::Condition>,
    action: crate::domain::models::RuleAction,
    #[serde(default = "default_enabled")]
    enabled: bool,
}

fn default_enabled() -> bool {
    true
}
