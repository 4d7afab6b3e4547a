use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, path::PathBuf, time::Duration};
use url::Url;

use crate::types::GenerationKind;

#[derive(Parser, Debug)]
#[command(name = "aigate", about = "Credit-gated AI generation backend")]
pub struct Args {
    /// Path to a YAML configuration file
    #[arg(long, short, env = "AIGATE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Postgres connection string
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Port to listen on
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,
}

/// Per-operation credit costs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CreditCosts {
    pub chat: i64,
    pub prompt: i64,
    pub image: i64,
    pub video: i64,
}

impl Default for CreditCosts {
    fn default() -> Self {
        Self {
            chat: 1,
            prompt: 2,
            image: 10,
            video: 40,
        }
    }
}

impl CreditCosts {
    pub fn cost(&self, kind: GenerationKind) -> i64 {
        match kind {
            GenerationKind::Chat => self.chat,
            GenerationKind::Prompt => self.prompt,
            GenerationKind::Image => self.image,
            GenerationKind::Video => self.video,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database_url: String,
    pub host: String,
    pub port: u16,

    /// Secret for signing bearer tokens.
    pub jwt_secret: String,
    /// Lifetime of issued bearer tokens.
    #[serde(with = "humantime_serde")]
    pub token_ttl: Duration,

    /// Shared secret for vendor webhook signatures. When unset, signature
    /// verification is skipped (local development only).
    pub webhook_secret: Option<String>,

    /// Initial admin account created at startup when both are set.
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,

    pub costs: CreditCosts,

    /// Vendor offer code -> credit quantity.
    pub offers: HashMap<String, i64>,

    /// Upstream generation service. When unset, generation endpoints return
    /// 502 rather than failing at startup.
    pub generator_url: Option<Url>,
    pub generator_api_key: Option<String>,

    /// Idle chat sessions are evicted after this long.
    #[serde(with = "humantime_serde")]
    pub session_ttl: Duration,

    pub enable_metrics: bool,
}

/// The vendor's published offer catalogue. Overridable per deployment via the
/// `offers` config table.
fn default_offers() -> HashMap<String, i64> {
    [
        ("b25quAR", 100),
        ("OHJeYkb", 200),
        ("Ypa4tzr", 300),
        ("iRNfqB9", 500),
        ("zbugEDV", 1000),
        ("LFJ342L", 2000),
        ("jM0siPY", 500),
        ("q0rFdNB", 1500),
        ("KFXdvJv", 5000),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "postgres://localhost/aigate".to_string(),
            host: "0.0.0.0".to_string(),
            port: 5000,
            jwt_secret: "development-secret".to_string(),
            token_ttl: Duration::from_secs(7 * 24 * 60 * 60),
            webhook_secret: None,
            admin_email: None,
            admin_password: None,
            costs: CreditCosts::default(),
            offers: default_offers(),
            generator_url: None,
            generator_api_key: None,
            session_ttl: Duration::from_secs(30 * 60),
            enable_metrics: false,
        }
    }
}

impl Config {
    /// Defaults, overridden by the YAML file, overridden by `AIGATE_*`
    /// environment variables, overridden by explicit CLI flags.
    pub fn load(args: &Args) -> anyhow::Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = &args.config {
            figment = figment.merge(Yaml::file(path));
        }
        figment = figment.merge(Env::prefixed("AIGATE_").split("__"));

        let mut config: Config = figment.extract()?;
        if let Some(url) = &args.database_url {
            config.database_url = url.clone();
        }
        if let Some(port) = args.port {
            config.port = port;
        }
        Ok(config)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_args() -> Args {
        Args {
            config: None,
            database_url: None,
            port: None,
        }
    }

    #[test]
    fn default_costs_match_catalogue() {
        let costs = CreditCosts::default();
        assert_eq!(costs.cost(GenerationKind::Chat), 1);
        assert_eq!(costs.cost(GenerationKind::Prompt), 2);
        assert_eq!(costs.cost(GenerationKind::Image), 10);
        assert_eq!(costs.cost(GenerationKind::Video), 40);
    }

    #[test]
    fn default_offer_table_is_complete() {
        let offers = default_offers();
        assert_eq!(offers.len(), 9);
        assert_eq!(offers.get("b25quAR"), Some(&100));
        assert_eq!(offers.get("KFXdvJv"), Some(&5000));
    }

    #[test]
    fn env_overrides_defaults() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("AIGATE_PORT", "9999");
            jail.set_env("AIGATE_WEBHOOK_SECRET", "shhh");
            let config = Config::load(&no_args()).expect("Failed to load config");
            assert_eq!(config.port, 9999);
            assert_eq!(config.webhook_secret.as_deref(), Some("shhh"));
            Ok(())
        });
    }

    #[test]
    fn yaml_file_overrides_defaults() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "aigate.yaml",
                r#"
                port: 8080
                costs:
                  video: 50
                session_ttl: 10m
                "#,
            )?;
            let args = Args {
                config: Some("aigate.yaml".into()),
                database_url: None,
                port: None,
            };
            let config = Config::load(&args).expect("Failed to load config");
            assert_eq!(config.port, 8080);
            assert_eq!(config.costs.video, 50);
            assert_eq!(config.costs.chat, 1);
            assert_eq!(config.session_ttl, Duration::from_secs(600));
            Ok(())
        });
    }

    #[test]
    fn cli_args_win_over_everything() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("AIGATE_PORT", "9999");
            let args = Args {
                config: None,
                database_url: Some("postgres://db/override".to_string()),
                port: Some(3000),
            };
            let config = Config::load(&args).expect("Failed to load config");
            assert_eq!(config.port, 3000);
            assert_eq!(config.database_url, "postgres://db/override");
            Ok(())
        });
    }
}
