//! Configuration management commands.

use reelhouse_core::config::IssueSeverity;
use reelhouse_core::Config;

use crate::{AppContext, ConfigAction};

pub async fn handle(action: ConfigAction, ctx: &AppContext) -> anyhow::Result<()> {
    match action {
        ConfigAction::Show => {
            println!("{}", toml::to_string_pretty(&ctx.config)?);
        }
        ConfigAction::Validate => {
            let result = ctx.config.validate();
            if result.issues.is_empty() {
                println!("✓ Configuration is valid");
                return Ok(());
            }
            for issue in &result.issues {
                let mark = match issue.severity {
                    IssueSeverity::Error => "✗",
                    IssueSeverity::Warning => "!",
                };
                println!("  {} {}: {}", mark, issue.field, issue.message);
            }
            if !result.is_ok() {
                anyhow::bail!("{} configuration error(s)", result.errors().len());
            }
        }
        ConfigAction::Path => {
            println!("{}", Config::config_dir().join("config.toml").display());
        }
    }
    Ok(())
}
