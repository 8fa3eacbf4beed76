//! Administrative CLI.
//!
//! Exit code 0 on success, non-zero on error. Destructive commands
//! print a dry-run description unless `--yes` is given.

use std::sync::Arc;

use clap::{Parser, Subcommand};

use px_domain::config::Config;
use px_vault::{Keychain, PlatformKeychain, VaultStore};

use crate::control::ControlPlane;

/// Pincer, a credential-isolation gateway for autonomous agents.
#[derive(Debug, Parser)]
#[command(name = "pincer", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create the vault master key in the OS credential store.
    Init,
    /// Store an encrypted secret for a tool.
    Set {
        /// Vault secret name, e.g. "gemini_api_key".
        tool: String,
        /// Secret value. Prompted for when omitted (keeps it out of
        /// shell history).
        value: Option<String>,
        /// Secret label, e.g. "dev" or "production".
        #[arg(long, default_value = "default")]
        label: String,
    },
    /// List stored secrets (names and labels only, never values).
    List,
    /// Agent management.
    #[command(subcommand)]
    Agent(AgentCommand),
    /// Delete the master key only (stored secrets become undecryptable).
    Reset,
    /// Delete all secrets, agents, and authorizations; keep the master key.
    Clear {
        /// Actually do it instead of describing what would happen.
        #[arg(long)]
        yes: bool,
    },
    /// Delete the master key, the vault database, and its sidecar files.
    Destroy {
        /// Actually do it instead of describing what would happen.
        #[arg(long)]
        yes: bool,
    },
    /// Audit log utilities.
    #[command(subcommand)]
    Audit(AuditCommand),
}

#[derive(Debug, Subcommand)]
pub enum AgentCommand {
    /// Register an agent and print its proxy token.
    Add {
        /// Agent identifier.
        id: String,
        /// Use this token instead of generating one.
        #[arg(long)]
        token: Option<String>,
    },
    /// Grant an agent access to a tool.
    Authorize {
        id: String,
        tool: String,
        /// Secret label the agent uses for this tool.
        #[arg(long = "key", default_value = "default")]
        key: String,
    },
    /// List agents with masked tokens and their grants.
    List,
    /// Withdraw an agent's access to a tool.
    Revoke { id: String, tool: String },
    /// Remove an agent and all its authorizations.
    Remove { id: String },
}

#[derive(Debug, Subcommand)]
pub enum AuditCommand {
    /// Replay the audit log and verify the hash chain.
    Verify,
}

// ── dispatch ──────────────────────────────────────────────────────────

/// Run one CLI command against the configured vault.
pub fn run(cli: Cli, config: &Config) -> anyhow::Result<()> {
    let keychain: Arc<dyn Keychain> = Arc::new(PlatformKeychain::new());
    let store = Arc::new(VaultStore::open(&config.vault_db_path, keychain.clone())?);
    let control = ControlPlane::new(store, keychain);

    match cli.command {
        Command::Init => {
            control.init()?;
            println!("Vault initialized; master key stored in the OS keychain.");
        }
        Command::Set { tool, value, label } => {
            let value = match value {
                Some(value) => value,
                None => {
                    rpassword::prompt_password_stdout(&format!("Secret for {tool} ({label}): "))?
                }
            };
            control.set_secret(&tool, &label, &value)?;
            println!("Secret stored for {tool} ({label}).");
        }
        Command::List => {
            let secrets = control.list_secrets()?;
            if secrets.is_empty() {
                println!("No secrets stored.");
            }
            for (tool, labels) in secrets {
                println!("{tool}: {}", labels.join(", "));
            }
        }
        Command::Agent(cmd) => run_agent(cmd, &control)?,
        Command::Reset => {
            if control.reset()? {
                println!("Master key deleted. Stored secrets can no longer be decrypted.");
            } else {
                println!("No master key was present.");
            }
        }
        Command::Clear { yes } => {
            if !yes {
                println!(
                    "Would delete every secret, agent, and authorization in {} \
                     (master key kept). Re-run with --yes to confirm.",
                    config.vault_db_path.display()
                );
                return Ok(());
            }
            control.clear_all()?;
            println!("Vault cleared; master key kept.");
        }
        Command::Destroy { yes } => {
            if !yes {
                println!(
                    "Would delete the master key, {} and its sidecar files. \
                     Re-run with --yes to confirm.",
                    config.vault_db_path.display()
                );
                return Ok(());
            }
            let key_existed = control.destroy()?;
            if key_existed {
                println!("Vault destroyed; master key removed.");
            } else {
                println!("Vault destroyed; no master key was present.");
            }
        }
        Command::Audit(AuditCommand::Verify) => {
            let report = px_audit::verify_chain(&config.audit_log_path)?;
            match report.first_break {
                None => println!(
                    "Audit chain intact: {} entr{} in {}.",
                    report.entries,
                    if report.entries == 1 { "y" } else { "ies" },
                    config.audit_log_path.display()
                ),
                Some(broken) => {
                    println!(
                        "Audit chain BROKEN at line {}: {}",
                        broken.line, broken.reason
                    );
                    std::process::exit(1);
                }
            }
        }
    }
    Ok(())
}

fn run_agent(cmd: AgentCommand, control: &ControlPlane) -> anyhow::Result<()> {
    match cmd {
        AgentCommand::Add { id, token } => {
            let token = control.add_agent(&id, token.as_deref())?;
            println!("Agent '{id}' registered.");
            println!("Proxy token (shown once, store it now): {token}");
        }
        AgentCommand::Authorize { id, tool, key } => {
            control.authorize(&id, &tool, &key)?;
            println!("Agent '{id}' may now call {tool} (label {key}).");
        }
        AgentCommand::List => {
            let agents = control.list_agents()?;
            if agents.is_empty() {
                println!("No agents registered.");
            }
            for agent in agents {
                println!("{} ({})", agent.agent_id, mask_token(&agent.proxy_token));
                for grant in agent.grants {
                    println!("  {} -> {}", grant.tool_name, grant.key_label);
                }
            }
        }
        AgentCommand::Revoke { id, tool } => {
            control.revoke(&id, &tool)?;
            println!("Agent '{id}' access to {tool} revoked.");
        }
        AgentCommand::Remove { id } => {
            control.remove_agent(&id)?;
            println!("Agent '{id}' removed.");
        }
    }
    Ok(())
}

/// Shorten a proxy token to its prefix and last four characters.
fn mask_token(token: &str) -> String {
    if token.len() <= 8 {
        return "…".into();
    }
    format!("{}…{}", &token[..4], &token[token.len() - 4..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_tree_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn masked_tokens_keep_only_the_edges() {
        let masked = mask_token("pxr_abcdefghijklmnopqrstu");
        assert_eq!(masked, "pxr_…rstu");
        assert!(!masked.contains("abcdefghijklmnopq"));
        assert_eq!(mask_token("short"), "…");
    }

    #[test]
    fn set_parses_optional_value_and_label() {
        let cli = Cli::parse_from(["pincer", "set", "gemini_api_key", "AIza", "--label", "dev"]);
        match cli.command {
            Command::Set { tool, value, label } => {
                assert_eq!(tool, "gemini_api_key");
                assert_eq!(value.as_deref(), Some("AIza"));
                assert_eq!(label, "dev");
            }
            other => panic!("unexpected command {other:?}"),
        }

        let cli = Cli::parse_from(["pincer", "set", "gemini_api_key"]);
        assert!(matches!(cli.command, Command::Set { value: None, .. }));
    }

    #[test]
    fn agent_authorize_takes_key_flag() {
        let cli = Cli::parse_from([
            "pincer", "agent", "authorize", "bot", "gemini_generate", "--key", "prod",
        ]);
        match cli.command {
            Command::Agent(AgentCommand::Authorize { id, tool, key }) => {
                assert_eq!(id, "bot");
                assert_eq!(tool, "gemini_generate");
                assert_eq!(key, "prod");
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
