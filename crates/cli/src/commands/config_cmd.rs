//! `guildpilot config` — Configuration management commands.

use guildpilot_config::AppConfig;
use std::path::Path;

/// Load from `path` when given, otherwise from the default location with
/// environment overrides.
pub fn load(path: Option<&Path>) -> Result<AppConfig, guildpilot_config::ConfigError> {
    match path {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    }
}

/// Soft problems that do not stop a run but are probably mistakes.
pub fn warnings(config: &AppConfig) -> Vec<String> {
    let mut warnings = Vec::new();
    let orchestrator = &config.orchestrator;

    if orchestrator.loop_guard_threshold > orchestrator.max_rounds {
        warnings.push(format!(
            "loop_guard_threshold ({}) exceeds max_rounds ({}); the loop guard can never trip first",
            orchestrator.loop_guard_threshold, orchestrator.max_rounds
        ));
    }

    if let Some(guarded) = orchestrator
        .repeat_guard
        .as_ref()
        .filter(|name| orchestrator.single_execution.contains(name))
    {
        warnings.push(format!(
            "'{guarded}' is listed both as repeat-guarded and single-execution"
        ));
    }

    if config.planner.enabled
        && !config.planner.search_keywords.is_empty()
        && config.planner.search_operation.trim().is_empty()
    {
        warnings.push("Planner has search keywords but no search_operation".to_string());
    }

    if config.context.inline_mime_types.is_empty() {
        warnings.push("No inline MIME types; every attachment will be sent by reference".to_string());
    }

    if config.provider.model == config.provider.light_model {
        warnings.push("Main and light models are the same".to_string());
    }

    warnings
}

pub async fn validate(path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Validating configuration...");

    match load(path) {
        Ok(config) => {
            println!("   ✅ Config parsed successfully");

            let warnings = warnings(&config);
            if warnings.is_empty() {
                println!("   ✅ All checks passed");
            } else {
                println!();
                for w in &warnings {
                    println!("   ⚠️  {w}");
                }
            }

            let orchestrator = &config.orchestrator;
            println!();
            println!("   Model:        {}", config.provider.model);
            println!("   Light model:  {}", config.provider.light_model);
            println!("   Max rounds:   {}", orchestrator.max_rounds);
            println!("   Loop guard:   {} skips", orchestrator.loop_guard_threshold);
            println!("   Pacing:       {} ms", orchestrator.pacing_ms);
            println!("   Planner:      {}", if config.planner.enabled { "on" } else { "off" });
            println!(
                "   Single-run:   {}",
                orchestrator.single_execution.join(", ")
            );
        }
        Err(e) => {
            println!("   ❌ Config error: {e}");
            return Err(e.into());
        }
    }

    Ok(())
}

pub async fn show(path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = load(path).map_err(|e| format!("Failed to load config: {e}"))?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

pub async fn path() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = AppConfig::config_dir().join("config.toml");
    println!("{}", config_path.display());
    Ok(())
}

pub async fn init() -> Result<(), Box<dyn std::error::Error>> {
    print!("{}", AppConfig::default_toml());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_path_is_valid() {
        let path = AppConfig::config_dir().join("config.toml");
        assert!(path.to_str().unwrap().contains("config.toml"));
    }

    #[test]
    fn defaults_only_warn_about_nothing_serious() {
        let warnings = warnings(&AppConfig::default());
        assert!(warnings.is_empty(), "unexpected warnings: {warnings:?}");
    }

    #[test]
    fn overlapping_guards_are_flagged() {
        let mut config = AppConfig::default();
        config.orchestrator.single_execution.push("screenshotWebsite".into());
        config.orchestrator.loop_guard_threshold = 9;
        let warnings = warnings(&config);
        assert_eq!(warnings.len(), 2);
        assert!(warnings.iter().any(|w| w.contains("screenshotWebsite")));
        assert!(warnings.iter().any(|w| w.contains("max_rounds")));
    }

    #[test]
    fn explicit_path_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("config.toml");
        std::fs::write(&file, "[orchestrator]\nmax_rounds = 3\n").unwrap();
        let config = load(Some(&file)).unwrap();
        assert_eq!(config.orchestrator.max_rounds, 3);
    }
}
