//! `subrelay config` — validation and masked display.

use sr_domain::config::{Config, ConfigSeverity};

/// Print every issue; returns `false` when any error-severity issue exists.
pub fn validate(config: &Config) -> bool {
    let issues = config.validate();
    if issues.is_empty() {
        println!("config OK");
        return true;
    }
    let mut ok = true;
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => println!("warning: {issue}"),
            ConfigSeverity::Error => {
                ok = false;
                println!("error: {issue}");
            }
        }
    }
    ok
}

/// Print the effective config as YAML with credentials masked.
pub fn show(config: &Config) {
    let masked = masked(config);
    match serde_yaml::to_string(&masked) {
        Ok(yaml) => print!("{yaml}"),
        Err(e) => eprintln!("failed to render config: {e}"),
    }
}

fn masked(config: &Config) -> Config {
    let mut masked = config.clone();
    if !masked.translation.api_key.is_empty() {
        masked.translation.api_key = "***".into();
    }
    for account in &mut masked.accounts {
        if !account.credentials.cookie.is_empty() {
            account.credentials.cookie = "***".into();
        }
        if !account.credentials.csrf.is_empty() {
            account.credentials.csrf = "***".into();
        }
    }
    masked
}
