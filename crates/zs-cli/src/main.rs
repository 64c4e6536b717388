//! Zero Six CLI
//!
//! Desktop companion: inspects and edits the companion's settings file,
//! previews the styles a page would get, and runs as the native messaging
//! host the extension talks to.

mod native;
mod storage;

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use clap::{Parser, Subcommand};

use zs_core::{
    Background, ChangeDistributor, ChangeEvent, Config, NativeBridge, RuleEngine, Schema, SettingsRepository,
    StyleSheetSet, SyncOutcome,
};

use crate::native::{ChildTransport, Host};
use crate::storage::{FileStorage, COMPANION_CONTEXT};

#[derive(Parser)]
#[command(name = "zs-cli")]
#[command(about = "Zero Six companion: settings tools and native messaging host")]
struct Cli {
    /// Settings file (JSON object mapping storage key to document)
    #[arg(long, global = true)]
    file: Option<PathBuf>,

    /// JSON config overriding storage key, host name or style prefix
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the default settings document
    Defaults,

    /// Print the current settings
    Show {
        /// Only print one site
        #[arg(long)]
        site: Option<String>,
    },

    /// Set one feature flag (`enabled` toggles the whole site)
    Set {
        site: String,
        feature: String,
        #[arg(action = clap::ArgAction::Set)]
        value: bool,

        /// Mirror the new document to this host executable
        #[arg(long)]
        host_cmd: Option<PathBuf>,

        /// Argument passed to the host executable
        #[arg(long = "host-arg")]
        host_args: Vec<String>,
    },

    /// Print the stylesheets a page of this site would get
    Css { site: String },

    /// Print the full document as key-sorted JSON
    Export,

    /// Run as native messaging host on stdin/stdout
    Host,

    /// Adopt the settings of a native host executable
    Pull {
        /// Host executable, spawned once per request
        #[arg(long)]
        host_cmd: PathBuf,

        /// Argument passed to the host executable
        #[arg(long = "host-arg")]
        host_args: Vec<String>,
    },
}

fn main() {
    let cli = Cli::parse();

    // stdout belongs to the native messaging channel
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .target(env_logger::Target::Stderr)
        .init();

    if let Err(e) = run(cli) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

struct Companion {
    config: Config,
    schema: Rc<Schema>,
    storage: FileStorage,
}

impl Companion {
    fn repository(&self) -> SettingsRepository<FileStorage> {
        SettingsRepository::new(self.storage.clone(), self.schema.clone(), &self.config)
    }

    fn distributor(&self) -> ChangeDistributor {
        ChangeDistributor::new(
            Rc::new(self.storage.clone()),
            self.schema.clone(),
            &self.config,
            COMPANION_CONTEXT,
        )
    }

    fn background(&self, host_cmd: &Path, host_args: Vec<String>) -> Background<FileStorage, ChildTransport> {
        let bridge = NativeBridge::new(ChildTransport::new(host_cmd, host_args), &self.config);
        Background::new(self.repository(), bridge)
    }
}

fn run(cli: Cli) -> Result<(), String> {
    let config = load_config(cli.config.as_deref())?;
    let path = match cli.file {
        Some(path) => path,
        None => default_settings_path()?,
    };
    log::debug!("Using settings file {}", path.display());

    let companion = Companion {
        storage: FileStorage::new(path, &config.storage_area),
        schema: Rc::new(Schema::builtin()),
        config,
    };

    let command = cli.command;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("Failed to start tokio runtime: {}", e))?;

    let output = runtime.block_on(async {
        match command {
            Commands::Defaults => cmd_defaults(&companion),
            Commands::Show { site } => cmd_show(&companion, site.as_deref()).await,
            Commands::Set {
                site,
                feature,
                value,
                host_cmd,
                host_args,
            } => cmd_set(&companion, &site, &feature, value, host_cmd.as_deref(), host_args).await,
            Commands::Css { site } => cmd_css(&companion, &site).await,
            Commands::Export => cmd_export(&companion).await,
            Commands::Host => cmd_host(&companion).await,
            Commands::Pull { host_cmd, host_args } => cmd_pull(&companion, &host_cmd, host_args).await,
        }
    })?;

    if !output.is_empty() {
        println!("{output}");
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<Config, String> {
    let Some(path) = path else {
        return Ok(Config::default());
    };
    let text = fs::read_to_string(path).map_err(|e| format!("Failed to read '{}': {}", path.display(), e))?;
    Config::from_json_str(&text).map_err(|e| format!("Failed to load '{}': {}", path.display(), e))
}

fn default_settings_path() -> Result<PathBuf, String> {
    let base = std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config")))
        .ok_or_else(|| "Cannot locate a config directory; pass --file".to_string())?;
    Ok(base.join("zero-six").join("settings.json"))
}

fn json_text(value: &serde_json::Value) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("Failed to encode JSON: {}", e))
}

fn check_site(companion: &Companion, site: &str) -> Result<(), String> {
    if companion.schema.has_site(site) {
        Ok(())
    } else {
        Err(format!(
            "Unknown site '{}' (known: {})",
            site,
            companion.schema.site_keys().join(", ")
        ))
    }
}

// Commands return what they print; `host` speaks on stdout itself.

fn cmd_defaults(companion: &Companion) -> Result<String, String> {
    json_text(&companion.schema.defaults().to_value())
}

async fn cmd_show(companion: &Companion, site: Option<&str>) -> Result<String, String> {
    let document = companion.repository().read_all().await;
    match site {
        Some(site) => {
            check_site(companion, site)?;
            let settings = document.site(site);
            json_text(&serde_json::Value::Object(settings.as_map().clone()))
        }
        None => json_text(&document.to_value()),
    }
}

async fn cmd_set(
    companion: &Companion,
    site: &str,
    feature: &str,
    value: bool,
    host_cmd: Option<&Path>,
    host_args: Vec<String>,
) -> Result<String, String> {
    check_site(companion, site)?;
    if !companion.schema.has_feature(site, feature) {
        return Err(format!("Unknown feature '{}' for site '{}'", feature, site));
    }

    let distributor = companion.distributor();
    let events: Rc<RefCell<Vec<ChangeEvent>>> = Rc::default();
    let sink = events.clone();
    distributor.subscribe(move |event| sink.borrow_mut().push(event.clone()));

    companion
        .repository()
        .write_site_feature(site, feature, value)
        .await
        .map_err(|e| format!("Failed to save settings: {}", e))?;
    let mut output = format!("{site}.{feature} = {value}");

    if let Some(host_cmd) = host_cmd {
        let background = companion.background(host_cmd, host_args);
        let pending: Vec<ChangeEvent> = events.borrow_mut().drain(..).collect();
        for event in &pending {
            background.on_document_changed(event).await;
        }
        let status = if background.bridge().is_available() { "mirrored" } else { "host unavailable" };
        output.push_str(&format!("\nNative host: {status}"));
    }

    Ok(output)
}

async fn cmd_css(companion: &Companion, site: &str) -> Result<String, String> {
    let mut engine = RuleEngine::for_site(site, StyleSheetSet::new(), &companion.config)
        .ok_or_else(|| format!("No rules for site '{}'", site))?;

    let settings = companion.repository().read_site(site).await;
    let active = engine.apply(&settings);
    if active == 0 {
        return Ok(format!("/* {site}: nothing suppressed */"));
    }

    let sheets: Vec<String> = engine
        .host()
        .iter()
        .map(|(id, css)| format!("/* {id} */\n{css}"))
        .collect();
    log::info!("{active} rule(s) active on {site}: {}", engine.active_rules().join(", "));
    Ok(sheets.join("\n"))
}

async fn cmd_export(companion: &Companion) -> Result<String, String> {
    // Map is key-sorted without serde_json's preserve_order
    let document = companion.repository().read_all().await;
    json_text(&document.to_value())
}

async fn cmd_host(companion: &Companion) -> Result<String, String> {
    let host = Host::new(companion.repository());
    let mut stdin = tokio::io::stdin();
    let mut stdout = tokio::io::stdout();
    host.serve(&mut stdin, &mut stdout)
        .await
        .map(|_| String::new())
        .map_err(|e| format!("Native messaging failed: {}", e))
}

async fn cmd_pull(companion: &Companion, host_cmd: &Path, host_args: Vec<String>) -> Result<String, String> {
    let distributor = companion.distributor();
    distributor.subscribe(|event| log::info!("Settings changed ({:?})", event.source));

    let background = companion.background(host_cmd, host_args);
    let outcome = background
        .start()
        .await
        .map_err(|e| format!("Failed to save settings: {}", e))?;

    let summary = match outcome {
        SyncOutcome::Synced(_) => format!("Adopted settings from {}", host_cmd.display()),
        SyncOutcome::NoSettings => "Host has no settings; kept local ones".to_string(),
        SyncOutcome::Unavailable => "Host unavailable; kept local settings".to_string(),
    };
    Ok(format!(
        "{summary}\nNative messaging available: {}",
        background.bridge().is_available()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn companion(dir: &tempfile::TempDir) -> Companion {
        let config = Config::default();
        Companion {
            storage: FileStorage::new(dir.path().join("settings.json"), &config.storage_area),
            schema: Rc::new(Schema::builtin()),
            config,
        }
    }

    fn stored(companion: &Companion) -> Value {
        let text = fs::read_to_string(companion.storage.path()).unwrap();
        let file: Value = serde_json::from_str(&text).unwrap();
        file["zeroSixSettings"].clone()
    }

    #[tokio::test]
    async fn test_show_site_and_unknown_site() {
        let dir = tempfile::tempdir().unwrap();
        let companion = companion(&dir);

        let shown: Value = serde_json::from_str(&cmd_show(&companion, Some("reddit")).await.unwrap()).unwrap();
        assert_eq!(shown, companion.schema.defaults().to_value()["reddit"]);

        let err = cmd_show(&companion, Some("myspace")).await.unwrap_err();
        assert!(err.contains("Unknown site 'myspace'"));
        assert!(!companion.storage.path().exists());
    }

    #[tokio::test]
    async fn test_set_persists_one_flag() {
        let dir = tempfile::tempdir().unwrap();
        let companion = companion(&dir);

        let output = cmd_set(&companion, "twitter", "hideTrends", false, None, Vec::new()).await.unwrap();
        assert_eq!(output, "twitter.hideTrends = false");

        let document = stored(&companion);
        assert_eq!(document["twitter"]["hideTrends"], json!(false));
        assert_eq!(document["twitter"]["enabled"], json!(true));
        assert_eq!(document["version"], json!(1));
    }

    #[tokio::test]
    async fn test_set_rejects_unknown_feature() {
        let dir = tempfile::tempdir().unwrap();
        let companion = companion(&dir);

        let err = cmd_set(&companion, "twitter", "hideEverything", true, None, Vec::new())
            .await
            .unwrap_err();
        assert!(err.contains("Unknown feature"));
        assert!(!companion.storage.path().exists());
    }

    #[tokio::test]
    async fn test_set_with_missing_host_still_saves() {
        let dir = tempfile::tempdir().unwrap();
        let companion = companion(&dir);
        let host = dir.path().join("no-such-host");

        let output = cmd_set(&companion, "facebook", "enabled", false, Some(host.as_path()), Vec::new())
            .await
            .unwrap();
        assert!(output.ends_with("Native host: host unavailable"));
        assert_eq!(stored(&companion)["facebook"]["enabled"], json!(false));
    }

    #[tokio::test]
    async fn test_css_follows_settings() {
        let dir = tempfile::tempdir().unwrap();
        let companion = companion(&dir);

        let css = cmd_css(&companion, "youtube").await.unwrap();
        assert!(css.contains("youtube-home-feed"));
        assert!(css.contains("display: none !important"));
        assert!(!css.contains("youtube-comments"));

        cmd_set(&companion, "youtube", "enabled", false, None, Vec::new()).await.unwrap();
        assert_eq!(cmd_css(&companion, "youtube").await.unwrap(), "/* youtube: nothing suppressed */");

        assert!(cmd_css(&companion, "myspace").await.is_err());
    }

    #[tokio::test]
    async fn test_export_is_normalized_and_key_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let companion = companion(&dir);
        fs::write(
            companion.storage.path(),
            r#"{"zeroSixSettings": {"reddit": {"enabled": false}, "stale": 1}}"#,
        )
        .unwrap();

        let text = cmd_export(&companion).await.unwrap();
        let exported: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(exported["reddit"]["enabled"], json!(false));
        assert_eq!(exported["reddit"]["hideHomeFeed"], json!(true));
        assert!(exported.get("stale").is_none());

        let keys: Vec<&String> = exported.as_object().unwrap().keys().collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
        let facebook = text.find("\"facebook\"").unwrap();
        let youtube = text.find("\"youtube\"").unwrap();
        assert!(facebook < youtube);
    }

    #[test]
    fn test_defaults_match_schema() {
        let dir = tempfile::tempdir().unwrap();
        let companion = companion(&dir);
        let defaults: Value = serde_json::from_str(&cmd_defaults(&companion).unwrap()).unwrap();
        assert_eq!(defaults, companion.schema.defaults().to_value());
    }
}
